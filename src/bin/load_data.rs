//! Reference data import
//!
//! Loads ingredients (`name,measurement_unit`) and tags (`name,slug`) from CSV
//! files. Rows that already exist are left untouched, so the import can be
//! re-run safely.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use foodgram::{
    config::Config,
    db::{
        self,
        repositories::{SqlxIngredientRepository, SqlxTagRepository},
    },
    services::{IngredientService, TagService},
};

/// Foodgram reference data loader.
#[derive(Parser, Debug)]
#[command(name = "load-data", author, version, about)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = "config.yml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Import `name,measurement_unit` rows.
    Ingredients {
        file: PathBuf,
        /// The first row is data, not a header
        #[arg(long)]
        no_header: bool,
    },
    /// Import `name,slug` rows.
    Tags {
        file: PathBuf,
        /// The first row is data, not a header
        #[arg(long)]
        no_header: bool,
    },
}

/// Two-column rows read from a CSV source
#[derive(Debug, Default, PartialEq, Eq)]
struct Rows {
    pairs: Vec<(String, String)>,
    skipped: usize,
}

/// Read two-column rows, trimming fields and skipping blank or short rows
fn read_pairs<R: Read>(source: R, has_header: bool) -> Result<Rows> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(has_header)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(source);

    let mut rows = Rows::default();
    for (index, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Malformed CSV at record {}", index + 1))?;
        match (record.get(0), record.get(1)) {
            (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => {
                rows.pairs.push((a.to_string(), b.to_string()));
            }
            _ => {
                tracing::warn!("Skipping record {}: expected two non-empty fields", index + 1);
                rows.skipped += 1;
            }
        }
    }
    Ok(rows)
}

fn open(path: &Path) -> Result<std::fs::File> {
    std::fs::File::open(path).with_context(|| format!("Failed to open {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "foodgram=info,load_data=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::load_with_env(&cli.config)?;
    let pool = db::create_pool(&config.database).await?;
    db::migrations::run_migrations(&pool).await?;

    let (kind, rows, inserted, invalid) = match cli.command {
        Commands::Ingredients { file, no_header } => {
            let rows = read_pairs(open(&file)?, !no_header)?;
            let service = IngredientService::new(SqlxIngredientRepository::boxed(pool));
            let mut inserted = 0;
            let mut invalid = 0;
            for (name, unit) in &rows.pairs {
                match service.import(name, unit).await {
                    Ok(true) => inserted += 1,
                    Ok(false) => {}
                    Err(foodgram::services::IngredientServiceError::ValidationError(msg)) => {
                        tracing::warn!("Skipping ingredient '{}': {}", name, msg);
                        invalid += 1;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            ("ingredients", rows, inserted, invalid)
        }
        Commands::Tags { file, no_header } => {
            let rows = read_pairs(open(&file)?, !no_header)?;
            let service = TagService::new(SqlxTagRepository::boxed(pool));
            let mut inserted = 0;
            let mut invalid = 0;
            for (name, slug) in &rows.pairs {
                match service.import(name, slug).await {
                    Ok(true) => inserted += 1,
                    Ok(false) => {}
                    Err(foodgram::services::TagServiceError::ValidationError(msg)) => {
                        tracing::warn!("Skipping tag '{}': {}", name, msg);
                        invalid += 1;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            ("tags", rows, inserted, invalid)
        }
    };

    let existing = rows.pairs.len() - inserted - invalid;
    tracing::info!(
        "Imported {}: {} inserted, {} already present, {} skipped",
        kind,
        inserted,
        existing,
        rows.skipped + invalid
    );
    Ok(())
}
