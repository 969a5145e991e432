//! Command handlers.

use crate::commands::CrawlArgs;
use crate::config::{LOCAL_CONFIG, TripserConfig};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tripser_core::serialize::{RdfFormat, write_graph_file};
use tripser_core::{Graph, ntriples};
use tripser_crawler::{Crawler, CrawlerConfig};
use tripser_launch::{BatchJob, BatchSubmitter, MpiRank, OutputLine, OutputStream, TargetRunner};

type HandlerResult = Result<(), Box<dyn std::error::Error>>;

/// Crawl a web service and write the merged graph.
///
/// Under an MPI launcher only rank 0 crawls and writes the output; the
/// other ranks return at once. The leading rank sizes its worker pool to
/// the allocation.
pub async fn crawl(config: &TripserConfig, args: CrawlArgs) -> HandlerResult {
    let mut crawler_config = crawler_config(&config.crawler, &args);
    if !claim_rank(MpiRank::from_env(), &mut crawler_config, args.workers) {
        return Ok(());
    }
    let format = output_format(&args.out, args.format.as_deref())?;
    let seed = args.seed.as_deref().map(load_seed).transpose()?;

    if !args.entry_point.starts_with(&crawler_config.content_prefix) {
        warn!(
            entry_point = %args.entry_point,
            content_prefix = %crawler_config.content_prefix,
            "Entry point is outside the content prefix, only the entry page will be followed"
        );
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")?);
    spinner.set_message(format!("Crawling {}", args.entry_point));
    spinner.enable_steady_tick(Duration::from_millis(120));

    let crawler = Crawler::http(crawler_config)?;
    let result = crawler.crawl(&args.entry_point, seed.as_ref()).await;
    spinner.finish_and_clear();
    let outcome = result?;

    write_graph_file(&outcome.graph, format, &args.out)?;

    let report = &outcome.report;
    println!(
        "{} Wrote {} triples from {} pages to {}",
        style("✓").green(),
        report.triples,
        report.pages_parsed,
        style(args.out.display()).bold()
    );
    println!("  Paging triples removed: {}", report.removed_by_cleanup);
    println!("  Elapsed: {:.1}s", report.elapsed_ms as f64 / 1000.0);
    if report.truncated {
        println!("{} Stopped at the page limit", style("!").yellow());
    }
    if !report.failed_pages.is_empty() {
        println!("{} {} pages failed:", style("!").yellow(), report.pages_failed);
        for page in &report.failed_pages {
            println!("    - {}", page);
        }
    }

    Ok(())
}

fn crawler_config(base: &CrawlerConfig, args: &CrawlArgs) -> CrawlerConfig {
    let mut config = base.clone();
    if args.serialize_nodes {
        config.serialize_nodes = true;
    }
    if let Some(dir) = &args.node_dir {
        config.node_dir = dir.clone();
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if args.max_pages.is_some() {
        config.max_pages = args.max_pages;
    }
    if args.no_cleanup {
        config.cleanup = false;
    }
    config
}

/// Whether this process runs the crawl. The leading rank of a multi-process
/// launch uses one worker per allocated task unless `--workers` was given.
fn claim_rank(rank: Option<MpiRank>, config: &mut CrawlerConfig, workers_flag: Option<usize>) -> bool {
    let Some(rank) = rank else {
        return true;
    };
    if !rank.is_leader() {
        info!(rank = rank.rank, size = rank.size, "Leaving the crawl to rank 0");
        return false;
    }
    if workers_flag.is_none() {
        config.workers = config.workers.max(rank.size as usize);
    }
    info!(size = rank.size, workers = config.workers, "Crawling as rank 0");
    true
}

fn output_format(out: &Path, explicit: Option<&str>) -> Result<RdfFormat, Box<dyn std::error::Error>> {
    match explicit {
        Some(name) => Ok(name.parse()?),
        None => Ok(RdfFormat::from_path(out)),
    }
}

fn load_seed(path: &Path) -> Result<Graph, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Could not read seed graph {}: {}", path.display(), e))?;
    Ok(ntriples::parse_ntriples(&text)?)
}

/// Print or write the batch script.
pub fn job_render(config: &TripserConfig, out: Option<PathBuf>) -> HandlerResult {
    config.job.validate()?;
    emit(&config.job.render(), out.as_deref())
}

/// Parse and validate an existing batch script.
pub fn job_check(path: &Path) -> HandlerResult {
    let job = check_script(path)?;

    println!("{} {} is valid", style("✓").green(), path.display());
    println!("  Job: {}", job.job_name);
    println!(
        "  Tasks: {} on {} nodes ({} per node)",
        job.ntasks,
        job.nodes,
        job.tasks_per_node()
    );
    println!("  Wall time: {}", job.time_limit);
    println!("  Partition: {}", job.partition);
    println!("  Launcher: {}", job.launcher.render());
    Ok(())
}

fn check_script(path: &Path) -> Result<BatchJob, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    let job = BatchJob::from_script(&text)?;
    job.validate()?;
    Ok(job)
}

/// Submit a batch script, rendering the configured job if none is given.
pub async fn job_submit(config: &TripserConfig, script: Option<PathBuf>) -> HandlerResult {
    let script = match script {
        Some(path) => {
            check_script(&path)?;
            path
        }
        None => {
            config.job.validate()?;
            let path = PathBuf::from(format!("{}.sbatch", config.job.job_name));
            std::fs::write(&path, config.job.render())?;
            println!("{} Wrote {}", style("✓").green(), path.display());
            path
        }
    };

    let job_id = BatchSubmitter::new().submit(&script).await?;
    println!("{} Submitted batch job {}", style("✓").green(), style(job_id).bold());
    Ok(())
}

/// Print or write the workflow file.
pub fn ci_render(config: &TripserConfig, out: Option<PathBuf>) -> HandlerResult {
    config.workflow.validate(&config.build)?;
    emit(&config.workflow.render()?, out.as_deref())
}

/// List the runs the matrix expands to.
pub fn ci_matrix(config: &TripserConfig) -> HandlerResult {
    let cells = config.workflow.cells();
    for cell in &cells {
        println!("{:>3}  {}", cell.index + 1, cell.display_name);
    }
    println!("\n{} runs", style(cells.len()).bold());
    Ok(())
}

/// Validate the workflow and the build targets it calls.
pub fn ci_check(config: &TripserConfig) -> HandlerResult {
    config.build.validate()?;
    config.workflow.validate(&config.build)?;

    println!("{} Workflow \"{}\" is valid", style("✓").green(), config.workflow.name);
    println!("  Matrix runs: {}", config.workflow.cells().len());
    println!("  Steps:");
    for step in &config.workflow.steps {
        println!("    - {}", step.name);
    }
    Ok(())
}

/// Run, list or print build targets.
pub async fn make(
    config: &TripserConfig,
    target: Option<String>,
    dry_run: bool,
    list: bool,
    makefile: bool,
) -> HandlerResult {
    let plan = &config.build;
    plan.validate()?;

    if makefile {
        print!("{}", plan.render());
        return Ok(());
    }

    if list {
        let width = plan.targets.iter().map(|t| t.name.len()).max().unwrap_or(0);
        for t in &plan.targets {
            println!("{:width$}  {}", style(&t.name).cyan(), t.description, width = width);
        }
        return Ok(());
    }

    let target = match target {
        Some(name) => name,
        None => plan
            .default_target()
            .map(|t| t.name.clone())
            .ok_or("No build targets are configured")?,
    };

    let runner = TargetRunner::new(std::env::current_dir()?);

    if dry_run {
        for (name, command) in runner.dry_run(plan, &target)? {
            println!("{} {}", style(format!("[{}]", name)).dim(), command);
        }
        return Ok(());
    }

    let (tx, mut rx) = mpsc::channel::<OutputLine>(256);
    let printer = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            let prefix = style(format!("[{}]", line.target)).dim();
            match line.stream {
                OutputStream::Stdout => println!("{} {}", prefix, line.content),
                OutputStream::Stderr => eprintln!("{} {}", prefix, style(line.content).yellow()),
            }
        }
    });

    let result = runner.run(plan, &target, tx).await;
    printer.await?;
    let summary = result?;

    println!(
        "{} {} finished ({} targets, {:.1}s)",
        style("✓").green(),
        style(&target).bold(),
        summary.targets.len(),
        summary.duration_ms as f64 / 1000.0
    );
    Ok(())
}

/// Show configuration.
pub fn show_config(config: &TripserConfig, source: Option<&Path>) -> HandlerResult {
    print!("{}", serde_yaml::to_string(config)?);
    match source {
        Some(path) => println!("\nConfig file: {}", path.display()),
        None => println!("\nConfig file: (none, using defaults)"),
    }
    Ok(())
}

/// Write the default configuration to `./tripser.yaml`.
pub fn init_config(force: bool) -> HandlerResult {
    use dialoguer::Confirm;

    let path = Path::new(LOCAL_CONFIG);
    if path.exists() && !force {
        let confirmed = Confirm::new()
            .with_prompt(format!("{} exists. Overwrite?", LOCAL_CONFIG))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("{} Cancelled", style("!").yellow());
            return Ok(());
        }
    }

    TripserConfig::default().save(path)?;
    println!("{} Created {}", style("✓").green(), LOCAL_CONFIG);
    Ok(())
}

/// Print the banner.
pub fn info() {
    print!("{}", banner());
}

fn banner() -> String {
    let title = "pytripalserializer";
    format!(
        "{}\n{}\nSerialize Tripal's JSON-LD API into RDF.\n",
        title,
        "=".repeat(title.len())
    )
}

fn emit(text: &str, out: Option<&Path>) -> HandlerResult {
    match out {
        Some(path) => {
            std::fs::write(path, text)?;
            println!("{} Wrote {}", style("✓").green(), path.display());
        }
        None => print!("{}", text),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn crawl_args(out: &str) -> CrawlArgs {
        CrawlArgs {
            entry_point: "http://pflu.evolbio.mpg.de/web-services/content/v0.1/".to_string(),
            out: PathBuf::from(out),
            serialize_nodes: false,
            node_dir: None,
            workers: None,
            max_pages: None,
            seed: None,
            format: None,
            no_cleanup: false,
        }
    }

    #[test]
    fn test_output_format() {
        assert_eq!(output_format(Path::new("graph.ttl"), None).unwrap(), RdfFormat::Turtle);
        assert_eq!(output_format(Path::new("graph.nt"), None).unwrap(), RdfFormat::NTriples);
        assert_eq!(
            output_format(Path::new("graph.ttl"), Some("ntriples")).unwrap(),
            RdfFormat::NTriples
        );
        assert!(output_format(Path::new("graph.ttl"), Some("rdfxml")).is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let base = CrawlerConfig::default();

        let unchanged = crawler_config(&base, &crawl_args("graph.ttl"));
        assert_eq!(unchanged.workers, base.workers);
        assert!(unchanged.cleanup);
        assert!(!unchanged.serialize_nodes);

        let mut args = crawl_args("graph.ttl");
        args.serialize_nodes = true;
        args.node_dir = Some(PathBuf::from("nodes"));
        args.workers = Some(64);
        args.max_pages = Some(3);
        args.no_cleanup = true;
        let config = crawler_config(&base, &args);
        assert!(config.serialize_nodes);
        assert_eq!(config.node_dir, PathBuf::from("nodes"));
        assert_eq!(config.workers, 64);
        assert_eq!(config.max_pages, Some(3));
        assert!(!config.cleanup);
    }

    #[test]
    fn test_only_rank_zero_crawls() {
        let mut config = CrawlerConfig::default();
        assert!(claim_rank(None, &mut config, None));
        assert_eq!(config.workers, 8);

        let follower = MpiRank { rank: 3, size: 200 };
        assert!(!claim_rank(Some(follower), &mut config, None));

        let leader = MpiRank { rank: 0, size: 200 };
        assert!(claim_rank(Some(leader), &mut config, None));
        assert_eq!(config.workers, 200);

        let mut pinned = CrawlerConfig {
            workers: 16,
            ..Default::default()
        };
        assert!(claim_rank(Some(leader), &mut pinned, Some(16)));
        assert_eq!(pinned.workers, 16);
    }

    #[test]
    fn test_load_seed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.nt");
        std::fs::write(
            &path,
            "<http://example.org/a> <http://www.w3.org/2000/01/rdf-schema#label> \"a\" .\n",
        )
        .unwrap();
        assert_eq!(load_seed(&path).unwrap().len(), 1);
        assert!(load_seed(&dir.path().join("missing.nt")).is_err());
    }

    #[test]
    fn test_check_script_accepts_rendered_job() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tripser.sbatch");
        std::fs::write(&path, BatchJob::default().render()).unwrap();
        assert_eq!(check_script(&path).unwrap().ntasks, 200);

        let edited = BatchJob::default().render().replace("--ntasks=200", "--ntasks=100");
        std::fs::write(&path, edited).unwrap();
        assert!(check_script(&path).is_err());
    }

    #[test]
    fn test_banner() {
        assert_eq!(
            banner(),
            "pytripalserializer\n==================\nSerialize Tripal's JSON-LD API into RDF.\n"
        );
    }
}
