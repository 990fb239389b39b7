use std::path::Path;

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use tracing::info;

use crate::config::Settings;
use crate::crawl::{self, Fetch};
use crate::load::{self, CsvSink, SheetsSink, Sink, SqliteSink};
use crate::table::{RawRecord, Table};
use crate::transform;

pub struct RunSummary {
    pub scraped: usize,
    pub cleaned: usize,
    pub sinks: Vec<(String, bool)>,
}

impl RunSummary {
    pub fn print(&self) {
        println!("Scraped {} products, {} after cleaning.", self.scraped, self.cleaned);
        for (name, ok) in &self.sinks {
            println!("  {} {}", if *ok { "saved  " } else { "FAILED " }, name);
        }
    }
}

/// Every sink the settings ask for, in CSV, Sheets, SQLite order.
pub fn sinks_from(settings: &Settings) -> Vec<Box<dyn Sink>> {
    let mut sinks: Vec<Box<dyn Sink>> = Vec::new();
    if let Some(path) = &settings.csv_path {
        sinks.push(Box::new(CsvSink::new(path)));
    }
    if let Some(sheets) = &settings.sheets {
        sinks.push(Box::new(SheetsSink::new(sheets)));
    }
    if let Some(url) = &settings.database_url {
        sinks.push(Box::new(SqliteSink::new(url)));
    }
    sinks
}

/// Crawl, clean and load in one go.
pub fn run(settings: &Settings, fetcher: &impl Fetch, pb: &ProgressBar) -> RunSummary {
    let records = crawl::crawl_with_progress(fetcher, &settings.crawl_options(), pb);
    let raw = Table::from_records(&records);
    transform_and_load(&raw, settings, &sinks_from(settings))
}

pub fn transform_and_load(raw: &Table, settings: &Settings, sinks: &[Box<dyn Sink>]) -> RunSummary {
    let clean = transform::transform(raw, settings.exchange_rate);
    let results = sinks
        .iter()
        .map(|s| (s.name().to_string(), load::load(s.as_ref(), &clean)))
        .collect();

    let summary = RunSummary {
        scraped: raw.len(),
        cleaned: clean.len(),
        sinks: results,
    };
    info!(
        scraped = summary.scraped,
        cleaned = summary.cleaned,
        sinks_ok = summary.sinks.iter().filter(|(_, ok)| *ok).count(),
        "Pipeline finished"
    );
    summary
}

/// Raw records as scraped, one CSV row each.
pub fn save_raw(records: &[RawRecord], path: &Path) -> Result<()> {
    let mut w = csv::Writer::from_path(path).with_context(|| format!("Failed to create {:?}", path))?;
    for r in records {
        w.serialize(r)?;
    }
    w.flush()?;
    Ok(())
}
