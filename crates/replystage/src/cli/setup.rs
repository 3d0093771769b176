use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Returns the version string, including git hash and commit date for non-release builds.
fn get_version() -> &'static str {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    const GIT_HASH: &str = env!("GIT_HASH");
    const GIT_COMMIT_DATE: &str = env!("GIT_COMMIT_DATE");
    const IS_RELEASE: &str = env!("IS_RELEASE");

    use std::sync::OnceLock;
    static VERSION_STRING: OnceLock<String> = OnceLock::new();

    VERSION_STRING.get_or_init(|| {
        if IS_RELEASE == "true" || GIT_HASH.is_empty() {
            format!("v{}", VERSION)
        } else {
            format!("v{}\ndev: {} {}", VERSION, GIT_HASH, GIT_COMMIT_DATE)
        }
    })
}

#[derive(Parser, Debug)]
#[command(
    name = "replystage",
    bin_name = "replystage",
    version = get_version(),
    disable_help_subcommand = true
)]
#[command(about = "Stage attachments for posts that are not submitted yet", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Staging directory (defaults to $REPLYSTAGE_ROOT, then the OS data dir)
    #[arg(long, global = true, help_heading = "Options")]
    pub root: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true, help_heading = "Options")]
    pub json: bool,

    /// Verbose logging on stderr
    #[arg(short, long, global = true, help_heading = "Options")]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List staged files
    #[command(alias = "ls", display_order = 1)]
    List {
        /// Check the files against a target's limits (site/board[/thread])
        #[arg(long = "for", value_name = "TARGET")]
        target: Option<String>,
    },

    /// Copy files into the staging area
    #[command(display_order = 2)]
    Add {
        #[arg(required = true, num_args = 1..)]
        paths: Vec<PathBuf>,

        /// Select the files right away
        #[arg(short, long)]
        select: bool,
    },

    /// Select files for the next post
    #[command(display_order = 3)]
    Select {
        #[arg(required = true, num_args = 1..)]
        ids: Vec<String>,
    },

    /// Unselect files
    #[command(display_order = 4)]
    Unselect {
        #[arg(required = true, num_args = 1..)]
        ids: Vec<String>,
    },

    /// Mark files as spoilers
    #[command(display_order = 5)]
    Spoiler {
        #[arg(required = true, num_args = 1..)]
        ids: Vec<String>,

        /// Remove the spoiler mark instead
        #[arg(long)]
        off: bool,
    },

    /// Change the name a file is posted under
    #[command(display_order = 6)]
    Rename { id: String, name: String },

    /// Delete staged files
    #[command(alias = "rm", display_order = 7)]
    Delete {
        #[arg(required_unless_present_any = ["selected", "all"], conflicts_with_all = ["selected", "all"])]
        ids: Vec<String>,

        /// Delete every selected file
        #[arg(long, conflicts_with = "all")]
        selected: bool,

        /// Delete every staged file
        #[arg(long)]
        all: bool,
    },

    /// Submit the selected files by copying them into a directory
    #[command(display_order = 8)]
    Submit {
        /// Directory receiving the files
        #[arg(long)]
        to: PathBuf,

        /// Where the post goes (site/board[/thread])
        #[arg(long)]
        target: String,

        /// Roll back as if the upload failed
        #[arg(long)]
        fail: bool,
    },

    /// Check the staging area and repair inconsistencies
    #[command(display_order = 9)]
    Doctor,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["replystage", "list", "--json", "--root", "/tmp/x"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.root, Some(PathBuf::from("/tmp/x")));
        assert!(matches!(cli.command, Some(Commands::List { target: None })));
    }

    #[test]
    fn delete_needs_ids_or_a_flag() {
        assert!(Cli::try_parse_from(["replystage", "delete"]).is_err());
        assert!(Cli::try_parse_from(["replystage", "delete", "--all"]).is_ok());
        assert!(Cli::try_parse_from(["replystage", "delete", "1", "--all"]).is_err());
    }

    #[test]
    fn submit_requires_destination_and_target() {
        assert!(Cli::try_parse_from(["replystage", "submit", "--to", "out"]).is_err());
        let cli = Cli::try_parse_from([
            "replystage",
            "submit",
            "--to",
            "out",
            "--target",
            "4chan/g/1",
        ])
        .unwrap();
        assert!(matches!(cli.command, Some(Commands::Submit { fail: false, .. })));
    }
}
