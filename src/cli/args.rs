//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--debug`: Enable debug logging

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Stagehand - transactional multi-file commits for git repositories
#[derive(Parser, Debug)]
#[command(name = "stagehand")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a new bare repository
    Init {
        /// Where to create it; must not exist yet
        path: PathBuf,
    },

    /// Apply a JSON commit request
    #[command(
        long_about = "Apply a JSON commit request.\n\n\
            The request is read from a file, or from stdin when given as '-'. \
            With --previous-head, a branch that has moved since that commit is \
            merged automatically when the changes do not overlap.\n\n\
            On success the new commit id is printed. When the branch moved and \
            the merge conflicts, the conflict list is printed as JSON and the \
            exit status is 2.",
        after_help = "\
EXAMPLES:
    # Commit against whatever the branch currently points to
    stagehand commit --repo story.git --request change.json

    # Commit edits made against a known tip, merging if the branch moved
    stagehand commit --repo story.git --request - --previous-head 1a2b3c...

REQUEST FORMAT:
    {
      \"author\": {\"name\": \"Jane\", \"email\": \"jane@example.com\"},
      \"committer\": {\"name\": \"Jane\", \"email\": \"jane@example.com\"},
      \"message\": \"Add story\",
      \"branch\": \"master\",
      \"files\": [
        {\"action\": \"create\", \"path\": \"docs/story.txt\", \"content\": \"Lorem ipsum\"}
      ]
    }"
    )]
    Commit {
        /// Repository path
        #[arg(long)]
        repo: PathBuf,

        /// Request file, or '-' for stdin
        #[arg(long, value_name = "FILE")]
        request: String,

        /// Branch tip the request was built against
        #[arg(long, value_name = "SHA")]
        previous_head: Option<String>,
    },

    /// Print a file as of a revision
    Show {
        /// Repository path
        #[arg(long)]
        repo: PathBuf,

        /// Branch, tag or commit id
        revision: String,

        /// Path of the file within the repository
        file: String,
    },

    /// List branches
    Branches {
        /// Repository path
        #[arg(long)]
        repo: PathBuf,
    },

    /// List tags
    Tags {
        /// Repository path
        #[arg(long)]
        repo: PathBuf,
    },
}
