use crate::Context;
use crate::build::{BuildRequest, build_task};
use crate::cli::ValidateArgs;
use crate::config::Settings;
use crate::ui;
use anyhow::Result;
use taskpool::{ExecutionMode, RunOptions, RunSummary, TaskStatus};

/// Build and validate every catalog, reporting each one.
///
/// Returns whether all of them passed. Validation stops at the first
/// failure, like a diff build would.
pub fn run(ctx: &Context, settings: &Settings, args: ValidateArgs) -> Result<bool> {
    let mut validation = settings.validation();
    if args.no_validate_references {
        validation.check_references = false;
    }

    let tasks = args
        .catalogs
        .iter()
        .map(|path| {
            let request = BuildRequest::resolve(path, settings.compiler.as_ref())?;
            Ok(build_task(&path.display().to_string(), request, validation))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut opts = RunOptions::default().collect();
    if !settings.parallel {
        opts.mode = ExecutionMode::Serial;
    }

    let results = taskpool::run(tasks, &opts)?;

    for result in &results {
        match (result.status, &result.error) {
            (TaskStatus::Succeeded, _) => {
                if !ctx.quiet {
                    ui::success(&result.arguments.to_string());
                }
            }
            (TaskStatus::Failed, Some(error)) => {
                ui::error(&result.arguments.to_string());
                for line in error.to_string().lines() {
                    ui::dim(line);
                }
            }
            (_, error) => {
                let reason = error.as_ref().map(ToString::to_string).unwrap_or_default();
                ui::warn(&format!("{} ({reason})", result.arguments));
            }
        }
    }

    let summary = RunSummary::from_results(&results);
    log::debug!(
        "Validated {} catalogs: {} ok, {} failed, {} not checked",
        summary.total(),
        summary.succeeded,
        summary.failed,
        summary.killed
    );
    Ok(summary.is_success())
}
