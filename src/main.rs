mod config;
mod crawl;
mod error;
mod extract;
mod load;
mod normalize;
mod pipeline;
mod table;
mod transform;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::{Settings, SheetsSettings};
use crate::crawl::HttpFetcher;

#[derive(Parser)]
#[command(name = "fashion_etl", about = "Fashion Studio catalogue scraper: extract, clean, load")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl the catalogue, clean the products and write them to every configured sink
    Run {
        #[command(flatten)]
        crawl: CrawlArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Crawl only and save the raw records as CSV
    Scrape {
        #[command(flatten)]
        crawl: CrawlArgs,
        /// Raw CSV destination
        #[arg(short, long, default_value = "products_raw.csv")]
        output: PathBuf,
    },
    /// Clean a previously scraped raw CSV and write it to every configured sink
    Transform {
        /// Raw CSV produced by `scrape`
        #[arg(short, long)]
        input: PathBuf,
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Args)]
struct CrawlArgs {
    /// Catalogue root URL
    #[arg(long)]
    base_url: Option<String>,
    /// First page to fetch
    #[arg(long)]
    start_page: Option<u32>,
    /// Seconds to wait between pages
    #[arg(long)]
    delay: Option<f64>,
    /// Stop after this many pages (0 = follow pagination to the end)
    #[arg(short = 'n', long)]
    max_pages: Option<u32>,
    /// No progress spinner
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Args)]
struct OutputArgs {
    /// Multiplier applied to prices
    #[arg(long)]
    exchange_rate: Option<f64>,
    /// Clean CSV destination
    #[arg(long)]
    csv: Option<PathBuf>,
    /// Google Sheets spreadsheet id
    #[arg(long)]
    sheet_id: Option<String>,
    /// Target range in the spreadsheet
    #[arg(long)]
    sheet_range: Option<String>,
    /// Service-account key file for Google Sheets
    #[arg(long)]
    credentials: Option<PathBuf>,
    /// SQLite database file
    #[arg(long)]
    database: Option<String>,
}

impl CrawlArgs {
    fn apply(self, s: &mut Settings) {
        if let Some(v) = self.base_url {
            s.base_url = v;
        }
        if let Some(v) = self.start_page {
            s.start_page = v;
        }
        if let Some(v) = self.delay {
            s.delay_secs = v;
        }
        if let Some(v) = self.max_pages {
            s.max_pages = (v > 0).then_some(v);
        }
    }
}

impl OutputArgs {
    fn apply(self, s: &mut Settings) {
        if let Some(v) = self.exchange_rate {
            s.exchange_rate = v;
        }
        if let Some(v) = self.csv {
            s.csv_path = Some(v);
        }
        if let Some(v) = self.database {
            s.database_url = Some(v);
        }
        if let Some(id) = self.sheet_id {
            match s.sheets.as_mut() {
                Some(sheets) => sheets.spreadsheet_id = id,
                None => s.sheets = Some(SheetsSettings::new(id)),
            }
        }
        if let Some(sheets) = s.sheets.as_mut() {
            if let Some(v) = self.sheet_range {
                sheets.range = v;
            }
            if let Some(v) = self.credentials {
                sheets.credentials_path = v;
            }
        }
    }
}

fn page_spinner() -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {pos} pages, {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(120));
    Ok(pb)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = Settings::load()?;

    match cli.command {
        Commands::Run { crawl: crawl_args, output } => {
            let quiet = crawl_args.quiet;
            crawl_args.apply(&mut settings);
            output.apply(&mut settings);
            let fetcher = HttpFetcher::new()?;
            println!("Crawling {} ...", settings.base_url);
            let pb = if quiet { ProgressBar::hidden() } else { page_spinner()? };
            let summary = pipeline::run(&settings, &fetcher, &pb);
            summary.print();
        }
        Commands::Scrape { crawl: crawl_args, output } => {
            let quiet = crawl_args.quiet;
            crawl_args.apply(&mut settings);
            let fetcher = HttpFetcher::new()?;
            println!("Crawling {} ...", settings.base_url);
            let options = settings.crawl_options();
            let records = if quiet {
                crawl::crawl(&fetcher, &options)
            } else {
                crawl::crawl_with_progress(&fetcher, &options, &page_spinner()?)
            };
            pipeline::save_raw(&records, &output)?;
            println!("Saved {} raw records to {}", records.len(), output.display());
        }
        Commands::Transform { input, output } => {
            output.apply(&mut settings);
            let raw = load::read_csv(&input)?;
            if raw.is_empty() {
                println!("No rows in {}. Run 'scrape' first.", input.display());
                return Ok(());
            }
            println!("Loaded {} raw rows from {}", raw.len(), input.display());
            let summary =
                pipeline::transform_and_load(&raw, &settings, &pipeline::sinks_from(&settings));
            summary.print();
        }
    }

    println!("\nDone in {:.1}s", t0.elapsed().as_secs_f64());
    Ok(())
}
