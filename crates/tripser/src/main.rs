//! tripser CLI entrypoint.

use clap::Parser;
use console::style;
use std::path::PathBuf;

mod commands;
mod config;
mod handlers;
mod logging;

use commands::{CiCommands, Commands, ConfigCommands, JobCommands};
use config::TripserConfig;

#[derive(Parser)]
#[command(name = "tripser")]
#[command(author, version, about = "Serialize Tripal's JSON-LD API into RDF", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", style("✗").red(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let (config, source) = TripserConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Crawl(args) => handlers::crawl(&config, args).await?,
        Commands::Job { command } => match command {
            JobCommands::Render { out } => handlers::job_render(&config, out)?,
            JobCommands::Check { script } => handlers::job_check(&script)?,
            JobCommands::Submit { script } => handlers::job_submit(&config, script).await?,
        },
        Commands::Ci { command } => match command {
            CiCommands::Render { out } => handlers::ci_render(&config, out)?,
            CiCommands::Matrix => handlers::ci_matrix(&config)?,
            CiCommands::Check => handlers::ci_check(&config)?,
        },
        Commands::Make {
            target,
            dry_run,
            list,
            makefile,
        } => handlers::make(&config, target, dry_run, list, makefile).await?,
        Commands::Config { command } => match command {
            ConfigCommands::Show => handlers::show_config(&config, source.as_deref())?,
            ConfigCommands::Init { force } => handlers::init_config(force)?,
        },
        Commands::Info => handlers::info(),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_crawl() {
        let cli = Cli::try_parse_from([
            "tripser",
            "-vv",
            "crawl",
            "http://pflu.evolbio.mpg.de/web-services/content/v0.1/",
            "-o",
            "pflu.nt",
            "-s",
            "--workers",
            "4",
            "--no-cleanup",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Crawl(args) => {
                assert_eq!(args.out, PathBuf::from("pflu.nt"));
                assert!(args.serialize_nodes);
                assert_eq!(args.workers, Some(4));
                assert!(args.no_cleanup);
                assert_eq!(args.max_pages, None);
            }
            _ => panic!("expected crawl"),
        }
    }

    #[test]
    fn test_missing_subcommand_is_a_usage_error() {
        let err = Cli::try_parse_from(["tripser"]).err().unwrap();
        assert_eq!(err.exit_code(), 2);
        let err = Cli::try_parse_from(["tripser", "job", "check"]).err().unwrap();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let cli = Cli::try_parse_from(["tripser", "make", "--dry-run", "test", "-c", "ci.yaml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("ci.yaml")));
        assert!(matches!(
            cli.command,
            Commands::Make { target: Some(ref t), dry_run: true, .. } if t == "test"
        ));
    }
}
