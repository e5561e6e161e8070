use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use commhealth::config::{self, AppConfig};
use commhealth::ingest;
use commhealth::llm;
use commhealth::output::{json as json_out, table};
use commhealth::pipeline::calibrate::{LABEL_THRESHOLDS, WEIGHTS};
use commhealth::pipeline::report::SCHEMA_VERSION;
use commhealth::pipeline::{Analyzer, InputMode};

#[derive(Parser)]
#[command(name = "commhealth", version, about = "Communication health analysis for chat, email and meeting transcripts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Path to config file (default: ~/.commhealth/config.toml)
    #[arg(long, global = true, env = "COMMHEALTH_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a conversation and print a health report
    Analyze {
        /// File, directory or glob paths to analyze
        paths: Vec<String>,

        /// Read from stdin
        #[arg(long)]
        stdin: bool,

        /// Force input format: json, yaml, text
        #[arg(long)]
        format: Option<String>,

        /// Treat input as free text, skipping shape detection
        #[arg(long, conflicts_with = "structured")]
        raw: bool,

        /// Treat input as message records, skipping shape detection
        #[arg(long)]
        structured: bool,

        /// Run without a language model; every model stage uses its fallback
        #[arg(long)]
        offline: bool,

        /// Token budget per extraction chunk
        #[arg(long)]
        max_chunk_tokens: Option<usize>,

        /// Model name override
        #[arg(long)]
        model: Option<String>,

        /// API key (otherwise OPENAI_API_KEY or the config file)
        #[arg(long)]
        api_key: Option<String>,

        /// Also write the JSON report to this file
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Manage the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show scoring weights, label thresholds and report schema version
    Info,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a commented config template if none exists
    Init,
    /// Show the effective config with secrets redacted
    Show,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let json_output = cli.json;
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Analyze {
            paths,
            stdin,
            format,
            raw,
            structured,
            offline,
            max_chunk_tokens,
            model,
            api_key,
            out,
        } => {
            let mut cfg = AppConfig::load(config_path)?;
            if let Some(m) = model {
                cfg.llm.model = m;
            }
            if let Some(n) = max_chunk_tokens {
                if n == 0 {
                    bail!("--max-chunk-tokens must be at least 1");
                }
                cfg.pipeline.max_chunk_tokens = n;
            }

            let format_enum = format
                .as_deref()
                .map(|f| {
                    ingest::Format::from_str(f)
                        .with_context(|| format!("Unknown format: {f}. Use: json, yaml, text"))
                })
                .transpose()?;

            let input = if stdin {
                ingest::load_stdin(format_enum)?
            } else if paths.is_empty() {
                bail!("No paths provided. Use --stdin to read from stdin.");
            } else {
                ingest::load_paths(&paths, format_enum)?
            };

            let mode = if raw {
                InputMode::Raw
            } else if structured {
                InputMode::Structured
            } else {
                InputMode::Auto
            };

            let model = llm::build_model(&cfg.llm, api_key.as_deref(), offline)?;
            let analyzer = Analyzer::new(model, cfg.pipeline);
            let state = analyzer
                .run(input, mode, None)
                .context("Analysis failed")?;
            let report = state.report.context("Analysis produced no report")?;

            if let Some(path) = &out {
                json_out::write_json(&report, path)?;
            }
            if json_output {
                json_out::print_json(&report)?;
            } else {
                table::print_report(&report);
                if let Some(path) = &out {
                    println!("\nReport written to {}", path.display());
                }
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Init => {
                let (path, created) = config::init_config(config_path)?;
                if created {
                    println!("Created config: {}", path.display());
                } else {
                    println!("Config already exists: {}", path.display());
                }
            }
            ConfigAction::Show => {
                let cfg = AppConfig::load(config_path)?;
                if json_output {
                    let mut redacted = cfg.clone();
                    redacted.llm.api_key = redacted.llm.api_key.as_deref().map(config::redact);
                    json_out::print_json(&redacted)?;
                } else {
                    println!("{}", cfg.display_redacted());
                }
            }
        },

        Commands::Info => {
            if json_output {
                let weights: serde_json::Map<String, serde_json::Value> = WEIGHTS
                    .iter()
                    .map(|(d, w)| (d.as_str().to_string(), serde_json::json!(w)))
                    .collect();
                let labels: serde_json::Map<String, serde_json::Value> = LABEL_THRESHOLDS
                    .iter()
                    .map(|(l, min)| (l.as_str().to_string(), serde_json::json!(min)))
                    .collect();
                json_out::print_json(&serde_json::json!({
                    "version": env!("CARGO_PKG_VERSION"),
                    "schema_version": SCHEMA_VERSION,
                    "weights": weights,
                    "label_thresholds": labels,
                }))?;
            } else {
                table::print_info();
            }
        }
    }

    Ok(())
}
