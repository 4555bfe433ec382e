use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use api::report::{Labels, Ranking};
use api::Api;
use clap::{Parser, Subcommand};
use inference::config::{CATALOG_PATH_KEY, MODEL_PATH_KEY};
use inference::ProviderConfig;
use leafpreprocessor::ColorPolicy;
use tracing::info;

/// Recognizes apple and potato leaf diseases from a photograph.
#[derive(Parser)]
#[command(name = "leafscan", version)]
struct Cli {
    /// Model file or .tar/.tar.gz bundle [env: LEAFSCAN_MODEL_PATH]
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    /// Disease catalog json replacing the builtin one [env: LEAFSCAN_CATALOG_PATH]
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// error, warn, info, debug or trace; RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Reject images that are not 3-channel RGB instead of converting them
    #[arg(long, global = true)]
    strict_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Diagnose a leaf photograph (JPEG or PNG)
    Diagnose {
        image: PathBuf,
        /// Print the diagnosis as json
        #[arg(long)]
        json: bool,
        /// Rank the most likely classes instead of the single best one
        #[arg(long)]
        top: Option<usize>,
    },
    /// Write the model input tensor of an image as raw little-endian f32
    Preprocess {
        image: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Run inference on a raw tensor written by `preprocess`
    InferTensor {
        tensor: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Load and warm up the model, then print its metadata
    Prefetch,
    /// List the class labels in model output order
    Labels,
}

/// Validates that a log level string is valid
fn validate_log_level(level: &str) -> Result<()> {
    level
        .parse::<tracing_subscriber::filter::LevelFilter>()
        .map_err(|_| {
            anyhow::anyhow!(
                "Invalid log level: '{}'. Valid levels: error, warn, info, debug, trace",
                level
            )
        })?;
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    validate_log_level(level)?;

    // tract and the data loader log through the `log` facade
    tracing_log::LogTracer::init().context("installing the log bridge")?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("installing the subscriber")?;

    Ok(())
}

fn provider_config(cli: &Cli) -> ProviderConfig {
    let mut config = ProviderConfig::from_env();
    if let Some(model) = &cli.model {
        config = config.set(MODEL_PATH_KEY, model.to_string_lossy());
    }
    if let Some(catalog) = &cli.catalog {
        config = config.set(CATALOG_PATH_KEY, catalog.to_string_lossy());
    }
    config
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading '{}'", path.display()))
}

fn run(cli: Cli) -> Result<()> {
    let color_policy = if cli.strict_color {
        ColorPolicy::Strict
    } else {
        ColorPolicy::Convert
    };
    let api = Api::from_config(provider_config(&cli))?.with_color_policy(color_policy);

    match cli.command {
        Commands::Diagnose { image, json, top } => {
            let bytes = read(&image)?;
            match (top, json) {
                (Some(k), true) => {
                    println!("{}", serde_json::to_string_pretty(&api.top_k(&bytes, k)?)?)
                }
                (Some(k), false) => print!("{}", Ranking(&api.top_k(&bytes, k)?)),
                (None, true) => {
                    println!("{}", serde_json::to_string_pretty(&api.diagnose(&bytes)?)?)
                }
                (None, false) => print!("{}", api.diagnose(&bytes)?),
            }
        }
        Commands::Preprocess { image, output } => {
            let tensor = api.preprocess(&read(&image)?)?;
            std::fs::write(&output, tensor.to_le_bytes())
                .with_context(|| format!("writing '{}'", output.display()))?;
            info!("wrote tensor of shape {:?} to '{}'", tensor.shape(), output.display());
        }
        Commands::InferTensor { tensor, json } => {
            let tensor = api.tensor_from_le_bytes(&read(&tensor)?)?;
            let diagnosis = api.infer_tensor(&tensor)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&diagnosis)?);
            } else {
                print!("{}", diagnosis);
            }
        }
        Commands::Prefetch => {
            println!("{}", serde_json::to_string_pretty(&api.prefetch()?)?);
        }
        Commands::Labels => print!("{}", Labels(api.catalog())),
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli.log_level) {
        eprintln!("{:#}", e);
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{:#}", e);
            let code = e
                .downcast_ref::<api::Error>()
                .map(|e| e.exit_code())
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}
