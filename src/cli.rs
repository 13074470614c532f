use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "catdiff")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Semantic diff of two compiled configuration catalogs", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Settings file (default: ~/.config/catdiff/config.toml)
    #[arg(long, global = true, env = "CATDIFF_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compare two catalogs
    ///
    /// Each side is either a catalog JSON document or a directory the
    /// configured compiler builds a catalog from.
    Diff(DiffArgs),

    /// Check that catalogs are well-formed and internally consistent
    Validate(ValidateArgs),

    /// List the available post-filters
    Filters,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser)]
pub struct DiffArgs {
    /// Old catalog (JSON file or source directory)
    pub from: PathBuf,

    /// New catalog (JSON file or source directory)
    pub to: PathBuf,

    /// Ignore rule, e.g. 'File[/etc/*]::content' (repeatable)
    #[arg(short, long = "ignore", value_name = "RULE")]
    pub ignore: Vec<String>,

    /// Ignore resources carrying this tag (repeatable)
    #[arg(long = "ignore-tag", value_name = "TAG")]
    pub ignore_tags: Vec<String>,

    /// Apply a post-filter by name (repeatable, see `catdiff filters`)
    #[arg(short, long = "filter", value_name = "NAME")]
    pub filters: Vec<String>,

    /// Build the catalogs one after the other
    #[arg(long)]
    pub serial: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Show changes that only alter a value's type
    #[arg(long)]
    pub display_datatype_changes: bool,

    /// Do not fail builds on dangling relationship references
    #[arg(long)]
    pub no_validate_references: bool,
}

#[derive(Parser)]
pub struct ValidateArgs {
    /// Catalogs to check (JSON file or source directory)
    #[arg(required = true)]
    pub catalogs: Vec<PathBuf>,

    /// Do not check relationship references
    #[arg(long)]
    pub no_validate_references: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_diff_args() {
        let cli = Cli::try_parse_from([
            "catdiff",
            "-vv",
            "diff",
            "old.json",
            "new.json",
            "-i",
            "File[/tmp/*]",
            "--ignore",
            "Exec[*]::+",
            "--ignore-tag",
            "skip",
            "-f",
            "AbsentFile",
            "--serial",
            "--format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Command::Diff(args) = cli.command else {
            panic!("expected diff");
        };
        assert_eq!(args.from, PathBuf::from("old.json"));
        assert_eq!(args.ignore, vec!["File[/tmp/*]", "Exec[*]::+"]);
        assert_eq!(args.ignore_tags, vec!["skip"]);
        assert_eq!(args.filters, vec!["AbsentFile"]);
        assert!(args.serial);
        assert_eq!(args.format, OutputFormat::Json);
        assert!(!args.no_validate_references);
    }

    #[test]
    fn test_validate_requires_catalog() {
        assert!(Cli::try_parse_from(["catdiff", "validate"]).is_err());
    }
}
