use clap::{Parser, Subcommand, ValueEnum};
use fast_anomaly_engine::export::{write_labeled_csv, write_labeled_json};
use fast_anomaly_engine::{
    ingest_with, AnomalyEngine, Detection, DetectionConfig, MissingValues, RowFilter, Table,
};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fast-anomaly-engine")]
#[command(version)]
#[command(about = "Flag anomalous rows in CSV or JSON tables with an isolation forest", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the numeric columns of a table
    Columns {
        /// Path to a .csv or .json file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Score every row and flag anomalies
    Detect {
        /// Path to a .csv or .json file
        #[arg(short, long)]
        file: PathBuf,

        /// Comma-separated numeric columns to use as features
        #[arg(short = 'F', long, value_delimiter = ',', required = true)]
        features: Vec<String>,

        /// JSON file with detection settings; flags override it
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of trees in the ensemble
        #[arg(short, long)]
        trees: Option<usize>,

        /// Rows drawn per tree (default: min(256, rows))
        #[arg(long)]
        sample_size: Option<usize>,

        /// Detection sensitivity in [0, 1]; higher flags more rows
        #[arg(short, long)]
        sensitivity: Option<f64>,

        /// Random seed for reproducible results
        #[arg(long)]
        seed: Option<u64>,

        /// Worker threads for training and scoring
        #[arg(long)]
        threads: Option<usize>,

        /// Fill missing feature values with the column mean instead of skipping the row
        #[arg(long)]
        impute_mean: bool,

        /// Write the labeled table here
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format (default: from the output file extension)
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,

        /// Only write rows flagged as anomalies
        #[arg(long)]
        anomalies_only: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Csv,
    Json,
}

impl OutputFormat {
    fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => OutputFormat::Json,
            _ => OutputFormat::Csv,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Columns { file } => {
            let table = Table::load(&file)?;
            println!("Loaded table '{}' with {} records", table.name, table.len());
            println!("Numeric columns: {:?}", table.numeric_columns());
        }

        Commands::Detect {
            file,
            features,
            config,
            trees,
            sample_size,
            sensitivity,
            seed,
            threads,
            impute_mean,
            output,
            format,
            anomalies_only,
        } => {
            let table = Table::load(&file)?;
            println!("Loaded table '{}' with {} records", table.name, table.len());

            let mut settings = match config {
                Some(path) => DetectionConfig::load(&path)?,
                None => DetectionConfig::default(),
            };
            if let Some(trees) = trees {
                settings.ensemble_size = trees;
            }
            if sample_size.is_some() {
                settings.sub_sample_size = sample_size;
            }
            if let Some(sensitivity) = sensitivity {
                settings.sensitivity = sensitivity;
            }
            if seed.is_some() {
                settings.seed = seed;
            }
            if threads.is_some() {
                settings.max_threads = threads;
            }

            let policy = if impute_mean {
                MissingValues::ImputeMean
            } else {
                MissingValues::Exclude
            };
            let ingested = ingest_with(&table, features.as_slice(), policy)?;
            if ingested.excluded_count() > 0 {
                println!(
                    "Skipped {} rows with missing or non-numeric values",
                    ingested.excluded_count()
                );
            }
            if ingested.imputed_cells > 0 {
                println!("Imputed {} missing values with column means", ingested.imputed_cells);
            }

            let engine = AnomalyEngine::new(settings)?;
            let detection = engine.detect(&ingested.dataset)?;
            print_summary(&detection);

            if let Some(path) = output {
                let filter = if anomalies_only {
                    RowFilter::AnomaliesOnly
                } else {
                    RowFilter::All
                };
                let writer = BufWriter::new(File::create(&path)?);
                match format.unwrap_or_else(|| OutputFormat::for_path(&path)) {
                    OutputFormat::Csv => write_labeled_csv(&table, &detection.rows, filter, writer)?,
                    OutputFormat::Json => write_labeled_json(&table, &detection.rows, filter, writer)?,
                }
                println!("Wrote labeled rows to {}", path.display());
            }
        }
    }

    Ok(())
}

fn print_summary(detection: &Detection) {
    let summary = &detection.summary;
    println!("\n=== Anomaly detection ===");
    println!("Rows scored: {}", summary.count);
    println!(
        "Anomalies:   {} ({:.1}%)",
        summary.anomalies,
        summary.anomaly_rate * 100.0
    );
    println!("Threshold:   {:.4}", summary.threshold);
    println!(
        "Scores:      min {:.4}  mean {:.4}  max {:.4}",
        summary.min, summary.mean, summary.max
    );
    println!(
        "Forest:      {} trees, {} rows per tree, seed {}",
        detection.n_trees, detection.sample_size, detection.seed
    );
}
