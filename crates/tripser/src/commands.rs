//! CLI command definitions.

use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Crawl a Tripal web service into one RDF graph
    Crawl(CrawlArgs),

    /// SLURM batch job for running the crawl on a cluster
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },

    /// CI workflow
    Ci {
        #[command(subcommand)]
        command: CiCommands,
    },

    /// Run build targets
    Make {
        /// Target to run (defaults to the first target)
        target: Option<String>,

        /// Print the commands without running them
        #[arg(long)]
        dry_run: bool,

        /// List the targets
        #[arg(long)]
        list: bool,

        /// Print the targets as a Makefile
        #[arg(long)]
        makefile: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Show what this tool does
    Info,
}

#[derive(Args)]
pub struct CrawlArgs {
    /// URL to start crawling from
    pub entry_point: String,

    /// Output file
    #[arg(short, long, default_value = "graph.ttl")]
    pub out: PathBuf,

    /// Also write every page graph to its own Turtle file
    #[arg(short, long)]
    pub serialize_nodes: bool,

    /// Directory for per-page files
    #[arg(long)]
    pub node_dir: Option<PathBuf>,

    /// Number of pages fetched concurrently
    #[arg(long)]
    pub workers: Option<usize>,

    /// Stop after scheduling this many pages
    #[arg(long)]
    pub max_pages: Option<usize>,

    /// N-Triples file merged into the graph before crawling
    #[arg(long)]
    pub seed: Option<PathBuf>,

    /// Output format: turtle or ntriples (default: from the file extension)
    #[arg(long)]
    pub format: Option<String>,

    /// Keep the collection paging triples
    #[arg(long)]
    pub no_cleanup: bool,
}

#[derive(Subcommand)]
pub enum JobCommands {
    /// Print the batch script
    Render {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Check an existing batch script
    Check {
        /// Path to the script
        script: PathBuf,
    },

    /// Submit to the scheduler
    Submit {
        /// Submit this script instead of the configured job
        #[arg(long)]
        script: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum CiCommands {
    /// Print the workflow file
    Render {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// List the matrix runs
    Matrix,

    /// Check the workflow against the build targets
    Check,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Write the default configuration to ./tripser.yaml
    Init {
        /// Overwrite without asking
        #[arg(short, long)]
        force: bool,
    },
}
