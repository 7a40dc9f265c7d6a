use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "vstage",
    about = "Stage changes to a versioned object from local files",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file [default: ./vstage.toml if present]
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Stage record location, overriding the configuration
    #[arg(long, global = true, value_name = "FILE")]
    pub stage_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start a new stage for an object
    New(NewArgs),
    /// Stage a file or directory
    Add(AddArgs),
    /// Remove paths from the stage
    Rm(RmArgs),
    /// List staged paths
    Ls(LsArgs),
    /// Summarize the stage and its validity
    Status(StatusArgs),
    /// Compare a local directory with the stage
    Diff(DiffArgs),
    /// Validate the stage for commit
    Check(CheckArgs),
}

#[derive(Args)]
pub struct NewArgs {
    /// Object id
    pub id: String,
    /// Primary digest algorithm (ignored with --baseline)
    #[arg(long)]
    pub alg: Option<String>,
    /// Fixity algorithms, comma separated
    #[arg(long, value_delimiter = ',')]
    pub fixity: Vec<String>,
    /// JSON snapshot of the object's current head version
    #[arg(long, value_name = "FILE")]
    pub baseline: Option<PathBuf>,
}

#[derive(Args)]
pub struct AddArgs {
    /// Local file or directory
    pub path: PathBuf,
    /// Logical name for a file, or logical directory for a tree
    #[arg(long = "as", value_name = "LOGICAL")]
    pub logical: Option<String>,
    /// Include hidden files and directories
    #[arg(short, long)]
    pub all: bool,
    /// Remove staged paths that no longer exist in the directory
    #[arg(long)]
    pub remove: bool,
    /// Digest workers [default: from config, else one per CPU]
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

#[derive(Args)]
pub struct RmArgs {
    /// Logical path (`.` for everything with -r)
    pub path: String,
    /// Remove everything under a directory
    #[arg(short, long)]
    pub recursive: bool,
}

#[derive(Args)]
pub struct LsArgs {
    /// Show primary digests
    #[arg(short, long)]
    pub digests: bool,
}

#[derive(Args)]
pub struct StatusArgs {
    /// JSON snapshot to diff the stage against
    #[arg(long, value_name = "FILE")]
    pub baseline: Option<PathBuf>,
}

#[derive(Args)]
pub struct DiffArgs {
    /// Local directory to compare
    #[arg(long)]
    pub dir: PathBuf,
    /// Include hidden files and directories
    #[arg(short, long)]
    pub all: bool,
}

#[derive(Args)]
pub struct CheckArgs {}
