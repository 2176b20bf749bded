use crate::aggregate::FileErrorPolicy;
use crate::source::Backend;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// staged-diff: list staged files and show the diff of each against HEAD
#[derive(Parser, Debug)]
#[command(name = "staged-diff", about, long_about = None, version)]
pub struct Cli {
    /// repository to inspect
    #[arg(short = 'C', long = "repo", global = true, default_value = ".")]
    pub repo: PathBuf,

    /// cap each file's diff at this many bytes (0 disables the cap)
    #[arg(long, global = true, value_name = "BYTES")]
    pub max_diff_bytes: Option<usize>,

    /// what to do when a file's diff cannot be read
    #[arg(long, global = true, value_enum)]
    pub on_file_error: Option<FileErrorPolicy>,

    /// number of diffs fetched in parallel
    #[arg(short, long, global = true)]
    pub jobs: Option<usize>,

    /// how to query git
    #[arg(long, global = true, value_enum)]
    pub backend: Option<Backend>,

    /// lines of context around each change
    #[arg(long = "context", global = true, value_name = "LINES")]
    pub context_lines: Option<u32>,

    /// give up collecting after this many seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// settings file (default: <config dir>/staged-diff/config.json)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// print debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// show the diff of every staged file
    Diff {
        /// only print the names of the staged files
        #[arg(long)]
        name_only: bool,

        /// only print the first CHARS characters of each diff (default 200)
        #[arg(long, value_name = "CHARS")]
        preview: Option<Option<usize>>,

        /// print the change set as JSON
        #[arg(long, conflicts_with_all = ["name_only", "preview"])]
        json: bool,
    },

    /// preview a commit of the staged files (no commit is made)
    Gen {
        /// commit message
        #[arg(short, long)]
        message: String,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_defaults() {
        let cli = Cli::try_parse_from(["staged-diff", "diff"]).unwrap();
        assert_eq!(cli.repo, PathBuf::from("."));
        assert!(matches!(
            cli.command,
            Some(Command::Diff {
                name_only: false,
                preview: None,
                json: false
            })
        ));
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let cli = Cli::try_parse_from([
            "staged-diff",
            "diff",
            "-C",
            "/tmp/repo",
            "--on-file-error",
            "record-error",
            "--backend",
            "git",
            "-j",
            "3",
        ])
        .unwrap();
        assert_eq!(cli.repo, PathBuf::from("/tmp/repo"));
        assert_eq!(cli.on_file_error, Some(FileErrorPolicy::RecordError));
        assert_eq!(cli.backend, Some(Backend::Git));
        assert_eq!(cli.jobs, Some(3));
    }

    #[test]
    fn test_preview_value_is_optional() {
        let cli = Cli::try_parse_from(["staged-diff", "diff", "--preview"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Diff {
                preview: Some(None),
                ..
            })
        ));

        let cli = Cli::try_parse_from(["staged-diff", "diff", "--preview", "50"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Diff {
                preview: Some(Some(50)),
                ..
            })
        ));
    }

    #[test]
    fn test_gen_requires_message() {
        assert!(Cli::try_parse_from(["staged-diff", "gen"]).is_err());
        let cli = Cli::try_parse_from(["staged-diff", "gen", "-m", "fix parser"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Gen { ref message }) if message == "fix parser"));
    }

    #[test]
    fn test_json_conflicts_with_name_only() {
        assert!(Cli::try_parse_from(["staged-diff", "diff", "--json", "--name-only"]).is_err());
    }

    #[test]
    fn test_no_subcommand_parses() {
        let cli = Cli::try_parse_from(["staged-diff"]).unwrap();
        assert!(cli.command.is_none());
    }
}
