use std::process::ExitCode;

use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use covid_genome_crawler::config::ConfigLoader;
use covid_genome_crawler::crawler::Crawler;
use covid_genome_crawler::error::CrawlError;
use covid_genome_crawler::ncbi::NcbiHttpClient;
use covid_genome_crawler::output::JsonOutput;
use covid_genome_crawler::store::CsvStore;

#[derive(Parser)]
#[command(name = "covid-crawl")]
#[command(about = "Incrementally crawl SARS-CoV-2 GenBank records into local CSV stores")]
#[command(version, author)]
struct Cli {
    /// JSON config file (defaults to ./covid-crawl.json when present)
    #[arg(long)]
    config: Option<String>,

    /// Print the remaining accessions without fetching or writing anything
    #[arg(long)]
    dry_run: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<CrawlError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &CrawlError) -> u8 {
    match error {
        CrawlError::ConfigRead(_) | CrawlError::ConfigParse(_) => 2,
        CrawlError::ListingHttp(_) | CrawlError::ListingStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::resolve(cli.config.as_deref())?;

    let client = NcbiHttpClient::new(&config)?;
    let store = CsvStore::new(config.genome_store.clone(), config.cds_store.clone());
    let crawler = Crawler::new(client.clone(), client, store);

    if cli.dry_run {
        let plan = crawler.plan()?;
        JsonOutput::print_plan(&plan).into_diagnostic()?;
        return Ok(());
    }

    let summary = crawler.run(&JsonOutput)?;
    JsonOutput::print_summary(&summary).into_diagnostic()?;
    Ok(())
}
