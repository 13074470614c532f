//! Catalog builds
//!
//! A [`BuildRequest`] names where a catalog comes from: a catalog document
//! on disk, or a source directory handed to the configured compiler. Both
//! sides of a diff are built as tasks on the task engine, each validated
//! before the diff may use it.

use crate::config::CompilerConfig;
use anyhow::{Context, Result, bail};
use catalog_diff::{Catalog, ValidationOptions};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use taskpool::{ExecutionMode, ProgressCallback, RunOptions, Task, TaskContext};

/// Where one catalog comes from
#[derive(Debug, Clone, PartialEq)]
pub enum BuildRequest {
    /// A catalog document
    Document(PathBuf),
    /// A source directory compiled by an external command
    Compile {
        dir: PathBuf,
        compiler: CompilerConfig,
    },
}

impl BuildRequest {
    /// Directories are compiled, anything else is read as a document.
    pub fn resolve(path: &Path, compiler: Option<&CompilerConfig>) -> Result<Self> {
        if !path.is_dir() {
            return Ok(Self::Document(path.to_path_buf()));
        }
        match compiler {
            Some(compiler) => Ok(Self::Compile {
                dir: path.to_path_buf(),
                compiler: compiler.clone(),
            }),
            None => bail!(
                "{} is a directory, but no [compiler] is configured",
                path.display()
            ),
        }
    }
}

impl fmt::Display for BuildRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document(path) => write!(f, "{}", path.display()),
            Self::Compile { dir, compiler } => {
                write!(f, "{} (via {})", dir.display(), compiler.program)
            }
        }
    }
}

/// Produce a catalog for one request
pub fn build(ctx: &TaskContext, request: &BuildRequest) -> Result<Catalog> {
    ctx.check_cancelled()?;
    match request {
        BuildRequest::Document(path) => Catalog::from_path(path)
            .with_context(|| format!("Could not load catalog {}", path.display())),
        BuildRequest::Compile { dir, compiler } => compile(ctx, dir, compiler),
    }
}

fn compile(ctx: &TaskContext, dir: &Path, compiler: &CompilerConfig) -> Result<Catalog> {
    let program = compiler.program_path();
    let mut command = Command::new(&program);
    command
        .args(&compiler.args)
        .envs(&compiler.env)
        .current_dir(dir);

    log::debug!("Compiling {} with {}", dir.display(), program.display());
    let output = ctx.run_command(command)?;
    if !output.success {
        let code = output
            .code
            .map_or_else(|| "signal".to_string(), |c| c.to_string());
        bail!(
            "compiler exited with {} in {}: {}",
            code,
            dir.display(),
            output.stderr_str().trim()
        );
    }

    let catalog = Catalog::from_json_str(&output.stdout_str())
        .with_context(|| format!("Compiler output for {} is not a catalog", dir.display()))?;
    Ok(catalog.with_compilation_dir(dir.display().to_string()))
}

/// A build task whose output must pass catalog validation
pub fn build_task(
    label: &str,
    request: BuildRequest,
    validation: ValidationOptions,
) -> Task<BuildRequest, Catalog> {
    Task::new(format!("build {label}: {request}"), request, build).with_validator(
        move |catalog| {
            catalog_diff::validate(catalog, validation)?;
            Ok(true)
        },
    )
}

/// Build the old and new catalogs.
///
/// The first failing build is reported with its own error; the other
/// build is stopped.
pub fn build_pair<P: ProgressCallback>(
    from: BuildRequest,
    to: BuildRequest,
    mode: ExecutionMode,
    validation: ValidationOptions,
    progress: &mut P,
) -> Result<(Catalog, Catalog)> {
    let tasks = vec![
        build_task("from", from, validation),
        build_task("to", to, validation),
    ];
    let opts = RunOptions {
        mode,
        ..RunOptions::default()
    };

    let results = taskpool::run_with_progress(tasks, &opts, progress)?;
    let mut catalogs = results.into_iter().map(|r| {
        r.output
            .with_context(|| format!("{} produced no catalog", r.description))
    });
    match (catalogs.next(), catalogs.next()) {
        (Some(from), Some(to)) => Ok((from?, to?)),
        _ => bail!("expected two build results"),
    }
}
