//! Command-line surface.
//!
//! Thin glue over [`ArchiveService`]: load the configuration file if given,
//! overlay the explicit flags, run one request-and-download cycle.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{NaiveDate, Utc};
use clap::Parser;
use tower::Service;

use crate::config;
use crate::error::ArchiveError;
use crate::service::{ArchiveRequest, ArchiveService};

/// Automatic ESO raw data archive requests and download
#[derive(Debug, Parser)]
#[command(name = "esoarchive", version)]
pub struct Cli {
    /// Configuration file
    #[arg(short = 'c', long)]
    conf: Option<PathBuf>,

    /// Instrument or list of instruments
    #[arg(long)]
    instrument: Option<String>,

    /// Night of observation (YYYYMMDD); defaults to the current UTC date
    #[arg(long, value_parser = parse_night)]
    night: Option<String>,

    /// Output directory
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Maximum number of rows to return
    #[arg(long, default_value_t = 200)]
    rows: u32,

    /// Verbose logging plus a login screenshot in the log
    #[arg(long)]
    debug: bool,
}

impl Cli {
    pub fn debug_enabled(&self) -> bool {
        self.debug
    }

    /// Config-file keys overlaid with the explicit flags.
    fn assemble_options(self) -> Result<BTreeMap<String, String>, ArchiveError> {
        let mut options = match &self.conf {
            Some(path) => config::load_config_file(path)?,
            None => BTreeMap::new(),
        };

        // explicit flags override config-file keys
        if let Some(instrument) = self.instrument {
            options.insert("instrument".to_string(), instrument);
        }
        let night = self
            .night
            .unwrap_or_else(|| Utc::now().format("%Y%m%d").to_string());
        options.insert("nightobs".to_string(), night);
        options.insert("rows".to_string(), self.rows.to_string());
        if let Some(output) = self.output {
            options.insert("output".to_string(), output.display().to_string());
        }
        if self.debug {
            options.insert("debug".to_string(), "true".to_string());
        }

        Ok(options)
    }

    /// Run one request-and-download cycle.
    pub async fn run(self) -> Result<(), ArchiveError> {
        let options = self.assemble_options()?;

        let mut service = ArchiveService::new();
        let outcome = service.call(ArchiveRequest::from_options(options)).await?;

        if outcome.files.is_empty() {
            println!("No files downloaded");
        } else {
            println!(
                "Downloaded {} files to {}",
                outcome.files.len(),
                outcome.output.display()
            );
        }
        Ok(())
    }
}

/// Reject a malformed night before any session is constructed.
fn parse_night(value: &str) -> Result<String, String> {
    let valid = value.len() == 8
        && value.chars().all(|c| c.is_ascii_digit())
        && NaiveDate::parse_from_str(value, "%Y%m%d").is_ok();
    if valid {
        Ok(value.to_string())
    } else {
        Err("night needs to be in format YYYYMMDD".to_string())
    }
}
