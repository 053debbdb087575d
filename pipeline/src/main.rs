//! Restaurant pipeline CLI
//!
//! # Main Commands
//!
//! ```bash
//! restaurant-pipeline run --config pipeline.json      # Clean + report + manifest
//! restaurant-pipeline clean --config pipeline.json    # Cleaning stage only
//! restaurant-pipeline report --config pipeline.json   # Reporting stage only
//! ```
//!
//! # Debug Commands (for development)
//!
//! ```bash
//! restaurant-pipeline parse orders.csv                # Parse CSV to JSON rows
//! restaurant-pipeline canonicalize tickets.jsonl      # Show cleaned NDJSON rows
//! ```

use clap::{Parser, Subcommand};
use restaurant_pipeline::{
    clean_table, parse_csv_bytes, parse_ndjson, run, run_cleaning, run_reporting,
    CleaningOptions, Entity, MetricValue, PipelineConfig, RawValue,
};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "restaurant-pipeline")]
#[command(about = "Clean raw restaurant data and compute business metrics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Full run: cleaning, reporting and run manifest
    Run {
        /// Pipeline configuration file (JSON)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Cleaning stage only: raw sources → silver parquet
    Clean {
        /// Pipeline configuration file (JSON)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Reporting stage only: silver parquet → gold CSVs
    Report {
        /// Pipeline configuration file (JSON)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Parse a CSV file and output JSON rows
    Parse {
        /// Input CSV file
        input: PathBuf,

        /// CSV delimiter (auto-detect if not specified)
        #[arg(short, long)]
        delimiter: Option<char>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Clean an NDJSON file and output the canonicalized rows
    Canonicalize {
        /// Input NDJSON file
        input: PathBuf,

        /// Entity the rows belong to
        #[arg(short, long, default_value = "tickets")]
        entity: String,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { config } => cmd_run(&config).await,
        Commands::Clean { config } => cmd_clean(&config).await,
        Commands::Report { config } => cmd_report(&config),
        Commands::Parse {
            input,
            delimiter,
            output,
        } => cmd_parse(&input, delimiter, output.as_deref()),
        Commands::Canonicalize {
            input,
            entity,
            output,
        } => cmd_canonicalize(&input, &entity, output.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

async fn cmd_run(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = PipelineConfig::load(config_path)?;
    let manifest = run(&config).await?;

    eprintln!("\n📦 Cleaned {} tables", manifest.cleaning.len());
    print_metrics(
        &manifest.report.average_order_value.average_order_value,
        manifest.report.total_revenue.total_revenue,
    );
    eprintln!("\n✨ Done! Run {}", manifest.run_id);
    Ok(())
}

async fn cmd_clean(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = PipelineConfig::load(config_path)?;
    let reports = run_cleaning(&config).await?;

    for report in &reports {
        eprintln!("   {}", report.summary());
    }
    eprintln!("\n✨ Done!");
    Ok(())
}

fn cmd_report(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = PipelineConfig::load(config_path)?;
    let outcome = run_reporting(&config)?;

    print_metrics(
        &outcome.average_order_value.average_order_value,
        outcome.total_revenue.total_revenue,
    );
    eprintln!("   Orders reported: {}", outcome.tickets_per_order.rows.len());
    eprintln!("\n✨ Done!");
    Ok(())
}

fn print_metrics(aov: &MetricValue, revenue: f64) {
    match aov.value() {
        Some(v) => eprintln!("   Average order value: {:.2}", v),
        None => eprintln!("   Average order value: undefined (no orders)"),
    }
    eprintln!("   Total revenue: {:.2}", revenue);
}

fn cmd_parse(
    input: &Path,
    delimiter: Option<char>,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Parsing CSV: {}", input.display());

    let bytes = fs::read(input)?;
    let result = parse_csv_bytes(&bytes, delimiter)?;

    eprintln!("   Encoding: {}", result.encoding);
    eprintln!(
        "   Delimiter: '{}'{}",
        format_delimiter(result.delimiter),
        if delimiter.is_none() { " (auto-detected)" } else { "" }
    );
    eprintln!("   Columns: {}", result.table.columns.join(", "));
    eprintln!("✅ Parsed {} records", result.table.len());

    let rows: Vec<Value> = result
        .table
        .rows
        .iter()
        .map(|row| {
            let obj = result
                .table
                .columns
                .iter()
                .zip(row)
                .map(|(col, cell)| (col.clone(), raw_to_json(cell)))
                .collect();
            Value::Object(obj)
        })
        .collect();

    let json = serde_json::to_string_pretty(&rows)?;
    write_output(&json, output)?;

    Ok(())
}

fn cmd_canonicalize(
    input: &Path,
    entity: &str,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let entity = Entity::ALL
        .into_iter()
        .find(|e| e.name() == entity)
        .ok_or_else(|| format!("Unknown entity '{}'", entity))?;

    eprintln!("📄 Canonicalizing {}: {}", entity, input.display());

    let content = fs::read_to_string(input)?;
    let raw = parse_ndjson(&content)?;
    let (table, report) = clean_table(entity, raw, &CleaningOptions::default())?;
    eprintln!("✅ {}", report.summary());

    let rows: Vec<Value> = (0..table.len()).map(|i| table.row_to_json(i)).collect();
    let json = serde_json::to_string_pretty(&rows)?;
    write_output(&json, output)?;

    Ok(())
}

/// Parsed CSV cells are never nested, so a flat rendering is enough.
fn raw_to_json(cell: &RawValue) -> Value {
    match cell {
        RawValue::Scalar(s) => s.to_json(),
        RawValue::Null => Value::Null,
        RawValue::Sequence(_) | RawValue::Mapping(_) => json!(format!("{:?}", cell)),
    }
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

fn write_output(content: &str, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match output {
        Some(path) => {
            fs::write(path, content)?;
            eprintln!("💾 Saved to: {}", path.display());
        }
        None => println!("{}", content),
    }
    Ok(())
}
