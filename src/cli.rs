//! Command line entry points: run the web server, or tokenize text and analyze
//! datasets straight from the terminal.

use std::error::Error;
use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::batch::{self, BatchOptions, RowSelection};
use crate::config::AppConfig;
use crate::jsonl;
use crate::manager::{TokenizerManager, TokenizerSource};
use crate::metrics::{MetricUnit, TextMetrics};
use crate::shape;
use crate::ui::routes;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct CliArgs {
    /// Raise log verbosity (-v debug, -vv trace).
    #[clap(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the web UI.
    Serve {
        /// JSON config file; every key is optional.
        #[clap(long, value_parser)]
        config: Option<PathBuf>,
        #[clap(long, value_parser)]
        host: Option<String>,
        #[clap(long, value_parser)]
        port: Option<u16>,
        #[clap(long, value_parser)]
        cache_dir: Option<PathBuf>,
    },
    /// Tokenize a piece of text and print every token.
    Tokenize {
        #[clap(long, value_parser, default_value = "gpt-4o")]
        tokenizer: String,
        #[clap(long, value_parser = parse_source, default_value = "tiktoken")]
        source: TokenizerSource,
        #[clap(long, value_parser = parse_unit, default_value = "character")]
        unit: MetricUnit,
        text: String,
    },
    /// Detect the shape of a JSONL dataset and print per-row token counts.
    Analyze {
        #[clap(value_parser)]
        file: PathBuf,
        #[clap(long, value_parser, default_value = "gpt-4o")]
        tokenizer: String,
        #[clap(long, value_parser = parse_source, default_value = "tiktoken")]
        source: TokenizerSource,
        #[clap(long, value_parser = parse_unit, default_value = "character")]
        unit: MetricUnit,
        /// Only analyze the first N rows.
        #[clap(long, value_parser)]
        first: Option<usize>,
        /// Column to tokenize for records of unknown shape.
        #[clap(long, value_parser)]
        column: Option<String>,
    },
}

fn parse_source(raw: &str) -> Result<TokenizerSource, String> {
    TokenizerSource::parse(raw).ok_or_else(|| format!("unknown tokenizer source '{}'", raw))
}

fn parse_unit(raw: &str) -> Result<MetricUnit, String> {
    MetricUnit::parse(raw).ok_or_else(|| format!("unknown metric unit '{}'", raw))
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env = env_logger::Env::default().default_filter_or(default_level);
    let _ = env_logger::Builder::from_env(env).format_timestamp_secs().try_init();
}

pub fn run_cli() -> Result<(), Box<dyn Error>> {
    let args = CliArgs::parse();
    init_logging(args.verbose);

    match args.command {
        Command::Serve { config, host, port, cache_dir } => {
            let mut app_config = match config {
                Some(path) => AppConfig::load(path)?,
                None => AppConfig::default(),
            };
            if let Some(host) = host {
                app_config.host = host;
            }
            if let Some(port) = port {
                app_config.port = port;
            }
            if let Some(cache_dir) = cache_dir {
                app_config.cache_dir = cache_dir;
            }
            app_config.validate()?;
            actix_web::rt::System::new().block_on(routes::run_server(app_config))?;
        }
        Command::Tokenize { tokenizer, source, unit, text } => {
            let manager = TokenizerManager::new();
            let tk = manager.get_tokenizer(&tokenizer, source)?;
            let result = tk.encode(&text)?;
            let metrics = TextMetrics::compute(&text, result.count(), unit, tk.context_size());

            println!("{}", tk.name());
            println!("Token Count: {}", metrics.token_count);
            println!("{}: {}", unit.count_label(), metrics.unit_count);
            println!("{}: {:.2}", unit.average_label(), metrics.average_per_token());
            if let Some(usage) = metrics.context_usage_percent() {
                println!("Context Usage: {:.1}%", usage);
            }
            for token in &result.tokens {
                println!("{:>8}  {:?}", token.id, token.text);
            }
        }
        Command::Analyze { file, tokenizer, source, unit, first, column } => {
            let bytes = fs::read(&file)?;
            let config = AppConfig::default();
            let detected = jsonl::detect_dataset_shape(bytes.as_slice(), config.detection_sample_size)?;
            let records = jsonl::read_records(&bytes)?;
            println!("Loaded {} rows. Detected format: {}", records.len(), detected.label());
            if let shape::Shape::Unknown { candidates } = &detected {
                println!("Candidate columns: {}", candidates.iter().cloned().collect::<Vec<_>>().join(", "));
            }

            let manager = TokenizerManager::new();
            let tk = manager.get_tokenizer(&tokenizer, source)?;
            let options = BatchOptions {
                selection: first.map_or(RowSelection::All, |n| RowSelection::FirstN { n }),
                unit,
                fallback_column: column.as_deref(),
                preview_chars: config.preview_chars,
            };
            let report = batch::analyze(&records, tk.as_ref(), &options)?;

            println!("{:>6}  {:<16} {:>8} {:>8}  Preview", "Index", "Format", "Tokens", unit.count_label());
            for row in &report.rows {
                println!(
                    "{:>6}  {:<16} {:>8} {:>8}  {}",
                    row.index,
                    row.shape,
                    row.token_count,
                    row.unit_count,
                    row.preview.replace('\n', " ")
                );
            }
            let totals = report.totals();
            println!(
                "Total tokens: {}  Total {}: {}  {}: {:.2}",
                report.total_tokens,
                unit.count_label(),
                report.total_units,
                unit.average_label(),
                totals.average_per_token()
            );
        }
    }
    Ok(())
}
