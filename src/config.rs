use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::crawl::CrawlOptions;
use crate::transform::DEFAULT_EXCHANGE_RATE;

const CONFIG_FILE: &str = "fashion_etl";
const ENV_PREFIX: &str = "ETL";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub base_url: String,
    pub start_page: u32,
    pub delay_secs: f64,
    pub max_pages: Option<u32>,
    pub exchange_rate: f64,
    pub csv_path: Option<PathBuf>,
    pub database_url: Option<String>,
    pub sheets: Option<SheetsSettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SheetsSettings {
    #[serde(default = "default_credentials")]
    pub credentials_path: PathBuf,
    pub spreadsheet_id: String,
    #[serde(default = "default_range")]
    pub range: String,
}

impl SheetsSettings {
    pub fn new(spreadsheet_id: impl Into<String>) -> Self {
        SheetsSettings {
            credentials_path: default_credentials(),
            spreadsheet_id: spreadsheet_id.into(),
            range: default_range(),
        }
    }
}

fn default_credentials() -> PathBuf {
    PathBuf::from("google-sheets-api.json")
}

fn default_range() -> String {
    "Sheet1!A1".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            base_url: "https://fashion-studio.dicoding.dev".to_string(),
            start_page: 1,
            delay_secs: 1.0,
            max_pages: Some(50),
            exchange_rate: DEFAULT_EXCHANGE_RATE,
            csv_path: Some(PathBuf::from("products.csv")),
            database_url: None,
            sheets: None,
        }
    }
}

impl Settings {
    /// Defaults, then `fashion_etl.{toml,json,...}` if present, then `ETL_*`
    /// environment variables (`__` separates nested keys).
    pub fn load() -> Result<Self> {
        Self::load_from(CONFIG_FILE)
    }

    pub fn load_from(file: &str) -> Result<Self> {
        Config::builder()
            .add_source(File::with_name(file).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn crawl_options(&self) -> CrawlOptions {
        CrawlOptions {
            base_url: self.base_url.clone(),
            start_page: self.start_page,
            delay: Duration::try_from_secs_f64(self.delay_secs).unwrap_or(Duration::ZERO),
            max_pages: self.max_pages,
        }
    }
}
