//! Reshape CLI - reshape and validate CSV files against a column schema
//!
//! # Main Commands
//!
//! ```bash
//! reshape validate input.csv --schema schema.json   # Reshape, validate, write output
//! reshape preview input.csv --schema schema.json    # Show the first reshaped rows
//! reshape serve                                     # Start HTTP server (port 8085)
//! ```
//!
//! # Helper Commands
//!
//! ```bash
//! reshape detect input.csv         # Show detected encoding and delimiter
//! reshape operations               # Show available transformations
//! reshape example-schema           # Show an example schema
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use reshape::{
    example_schema, operations_description, pipeline::format_delimiter, to_delimited,
    to_delimited_preview, to_json_preview, validate_file, write_transformed, PipelineOptions,
    RunOutcome, Schema, Settings, Source,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, Level};

#[derive(Parser)]
#[command(name = "reshape")]
#[command(about = "Reshape and validate CSV files against a column schema", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reshape and validate a CSV file, then write the result
    Validate {
        /// Input CSV file
        input: PathBuf,

        /// Schema JSON file
        #[arg(short, long)]
        schema: PathBuf,

        /// Output file (default: <input>_<timestamp>.csv in the output dir)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Number of row workers (default: RESHAPE_WORKERS)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Truncate the printed report to this many characters (0 = no limit)
        #[arg(long)]
        max_report_chars: Option<usize>,

        /// CSV delimiter (auto-detect if not specified)
        #[arg(short, long)]
        delimiter: Option<char>,
    },

    /// Print the first reshaped rows of a valid CSV file
    Preview {
        /// Input CSV file
        input: PathBuf,

        /// Schema JSON file
        #[arg(short, long)]
        schema: PathBuf,

        /// Number of data rows to show
        #[arg(long, default_value = "10")]
        size: usize,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Json)]
        format: Format,
    },

    /// Show the detected encoding and delimiter of a CSV file
    Detect {
        /// Input CSV file
        input: PathBuf,
    },

    /// Show available transformations
    Operations,

    /// Show an example schema
    ExampleSchema,

    /// Start HTTP server
    Serve {
        /// Port to listen on (default: RESHAPE_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Csv,
}

fn setup_logging(verbose: bool, serving: bool) {
    let level = if verbose {
        Level::DEBUG
    } else if serving {
        Level::INFO
    } else {
        Level::WARN
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    setup_logging(cli.verbose, matches!(cli.command, Commands::Serve { .. }));

    let settings = match Settings::from_env() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("❌ Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    debug!(?settings, "Settings loaded");

    let result = match cli.command {
        Commands::Validate {
            input,
            schema,
            output,
            workers,
            max_report_chars,
            delimiter,
        } => {
            let mut settings = settings;
            if let Some(n) = workers {
                settings.workers = n.max(1);
            }
            if let Some(n) = max_report_chars {
                settings.report_max_chars = n;
            }
            cmd_validate(&input, &schema, output.as_deref(), delimiter, &settings).await
        }

        Commands::Preview {
            input,
            schema,
            size,
            format,
        } => cmd_preview(&input, &schema, size, format, &settings).await,

        Commands::Detect { input } => cmd_detect(&input),

        Commands::Operations => cmd_operations(),

        Commands::ExampleSchema => cmd_example_schema(),

        Commands::Serve { port } => {
            let mut settings = settings;
            if let Some(p) = port {
                settings.port = p;
            }
            cmd_serve(settings).await
        }
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

async fn cmd_validate(
    input: &Path,
    schema_path: &Path,
    output: Option<&Path>,
    delimiter: Option<char>,
    settings: &Settings,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Processing: {}", input.display());

    let schema = Schema::from_file(schema_path)?;
    eprintln!("   Rules: {} column(s)", schema.len());

    let options = PipelineOptions {
        workers: settings.workers,
        delimiter,
        run_id: None,
    };
    let outcome = validate_file(input, schema.clone(), options).await?;

    let table = match outcome {
        RunOutcome::Succeeded(table) => table,
        RunOutcome::Failed(report) => {
            eprintln!("\n❌ Validation failed: {} error(s)\n", report.total());
            println!("{}", report.render_truncated(settings.report_max_chars));
            std::process::exit(1);
        }
    };

    eprintln!("   Encoding: {}", table.encoding);
    eprintln!("   Delimiter: '{}'", format_delimiter(table.delimiter));
    eprintln!("   ✅ All {} rows valid", table.data_rows().len());

    let written = match output {
        Some(path) => {
            let content = to_delimited(&table.rows, &schema, settings.output_delimiter)?;
            fs::write(path, content)?;
            path.to_path_buf()
        }
        None => write_transformed(input, &table.rows, &schema, settings)?,
    };
    eprintln!("💾 Output written to: {}", written.display());

    Ok(())
}

async fn cmd_preview(
    input: &Path,
    schema_path: &Path,
    size: usize,
    format: Format,
    settings: &Settings,
) -> Result<(), Box<dyn std::error::Error>> {
    let schema = Schema::from_file(schema_path)?;
    let options = PipelineOptions {
        workers: settings.workers,
        delimiter: None,
        run_id: None,
    };

    let table = match validate_file(input, schema.clone(), options).await? {
        RunOutcome::Succeeded(table) => table,
        RunOutcome::Failed(report) => {
            eprintln!("❌ Validation failed: {} error(s)\n", report.total());
            println!("{}", report.render_truncated(settings.report_max_chars));
            std::process::exit(1);
        }
    };

    match format {
        Format::Json => {
            let preview = to_json_preview(&table.rows, &schema, size)?;
            println!("{}", serde_json::to_string_pretty(&preview)?);
        }
        Format::Csv => {
            let preview = to_delimited_preview(&table.rows, &schema, size, settings.output_delimiter)?;
            print!("{}", preview);
        }
    }
    Ok(())
}

fn cmd_detect(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let source = Source::from_path(input)?;
    let delimiter = reshape::detect_delimiter(&source.sample_lines());

    println!("Encoding: {}", source.encoding);
    println!("Delimiter: '{}'", format_delimiter(delimiter));
    Ok(())
}

fn cmd_operations() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", operations_description());
    Ok(())
}

fn cmd_example_schema() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(&example_schema())?);
    Ok(())
}

async fn cmd_serve(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    reshape::server::start_server(settings).await?;
    Ok(())
}
