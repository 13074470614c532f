use crate::Context;
use crate::build::{BuildRequest, build_pair};
use crate::cli::{DiffArgs, OutputFormat};
use crate::config::{RuleSpec, Settings};
use crate::progress::BuildProgress;
use crate::render::{self, RenderOptions};
use crate::ui;
use anyhow::{Context as _, Result};
use catalog_diff::{DiffEntry, Differ};
use taskpool::ExecutionMode;

/// Settings with command-line flags applied on top
pub fn effective_settings(settings: &Settings, args: &DiffArgs) -> Settings {
    let mut settings = settings.clone();
    settings
        .ignore
        .extend(args.ignore.iter().cloned().map(RuleSpec::Text));
    settings.ignore_tags.extend(args.ignore_tags.iter().cloned());
    settings.filters.extend(args.filters.iter().cloned());
    if args.serial {
        settings.parallel = false;
    }
    if args.display_datatype_changes {
        settings.display_datatype_changes = true;
    }
    if args.no_validate_references {
        settings.validate_references = false;
    }
    settings
}

/// Configure a differ, surfacing every rule or filter error up front
pub fn differ(settings: &Settings) -> Result<Differ> {
    let differ = Differ::new()
        .with_ignore(settings.ignore_rules()?)
        .with_ignore_tags(settings.ignore_tags.iter().cloned())
        .with_filters(settings.filters.as_slice())
        .context("Invalid filter configuration")?;
    log::debug!("Configured differ: {differ:?}");
    Ok(differ)
}

/// Build both catalogs, diff them and print the result.
///
/// Returns the engine's entries; rendering may hide some of them.
pub fn run(ctx: &Context, settings: &Settings, args: DiffArgs) -> Result<Vec<DiffEntry>> {
    let settings = effective_settings(settings, &args);
    let differ = differ(&settings)?;

    let from = BuildRequest::resolve(&args.from, settings.compiler.as_ref())?;
    let to = BuildRequest::resolve(&args.to, settings.compiler.as_ref())?;
    let mode = if settings.parallel {
        ExecutionMode::Parallel
    } else {
        ExecutionMode::Serial
    };

    let mut progress = BuildProgress::new(ctx.quiet);
    let built = build_pair(from, to, mode, settings.validation(), &mut progress);
    progress.finish();
    let (old, new) = built.context("Catalog build failed")?;

    let entries = differ.diff(&old, &new).context("Diff failed")?;
    log::debug!("Diff produced {} entries", entries.len());

    let opts = RenderOptions {
        display_datatype_changes: settings.display_datatype_changes,
    };
    match args.format {
        OutputFormat::Json => println!("{}", render::render_json(&entries, opts)?),
        OutputFormat::Text => {
            print!("{}", render::render_text(&entries, opts));
            if !ctx.quiet {
                let summary = render::render_summary(&entries, opts);
                if entries.is_empty() {
                    ui::success(&summary);
                } else {
                    ui::info(&summary);
                }
            }
        }
    }

    Ok(entries)
}
