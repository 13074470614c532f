mod build;
mod cli;
mod commands;
mod config;
mod paths;
mod progress;
mod render;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use config::Settings;
use std::io;
use std::process::ExitCode;

/// Nothing differs, or a check passed
pub const EXIT_CLEAN: u8 = 0;
/// The run failed: bad configuration, a failed build, an engine error
pub const EXIT_FAILURE: u8 = 1;
/// The catalogs differ
pub const EXIT_DIFFERENCES: u8 = 2;

/// Global context for the application
pub struct Context {
    pub quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context { quiet: cli.quiet };

    match run(&ctx, cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            let category = e
                .chain()
                .find_map(|cause| cause.downcast_ref::<catalog_diff::Error>())
                .map(|cause| cause.category().description());
            match category {
                Some(category) => ui::error(&format!("{category}: {e:#}")),
                None => ui::error(&format!("{e:#}")),
            }
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn run(ctx: &Context, cli: Cli) -> Result<u8> {
    match cli.command {
        Command::Diff(args) => {
            let settings = Settings::load(cli.config.as_deref())?;
            let entries = commands::diff::run(ctx, &settings, args)?;
            Ok(diff_status(entries.len()))
        }
        Command::Validate(args) => {
            let settings = Settings::load(cli.config.as_deref())?;
            let passed = commands::validate::run(ctx, &settings, args)?;
            Ok(if passed { EXIT_CLEAN } else { EXIT_FAILURE })
        }
        Command::Filters => {
            commands::filters::run();
            Ok(EXIT_CLEAN)
        }
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "catdiff", &mut io::stdout());
            Ok(EXIT_CLEAN)
        }
    }
}

/// Exit status for a completed diff
fn diff_status(entries: usize) -> u8 {
    if entries == 0 {
        EXIT_CLEAN
    } else {
        EXIT_DIFFERENCES
    }
}
