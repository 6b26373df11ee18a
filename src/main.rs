use std::env;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use serde::Deserialize;
use stashface::{config, storage, Gallery, ResolutionResult, ResolveError, Resolver, SearchParams};

#[derive(Parser)]
#[command(name = "stashface")]
#[command(version, about = "Resolve face embeddings to performer identities")]
struct Cli {
    /// Config file (defaults to the installed location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a 512-float embedding read as JSON
    Search {
        /// JSON file with `[..]` or `{"vector": [..]}`; stdin when omitted or `-`
        vector: Option<PathBuf>,
    },
    /// Resolve a face image through the configured embedding model
    Recognise {
        /// Image cropped to a single face (.jpg, .jpeg, .png, .webp)
        image: PathBuf,
    },
    /// Build the index and slot list from a JSON gallery
    Build {
        /// JSON list of `{"id": "identity[=aux]", "embedding": [..]}`
        gallery: PathBuf,
        /// Number of trees in the forest
        #[arg(short, long, default_value_t = 10)]
        trees: usize,
        /// Seed for the split randomness
        #[arg(short, long, default_value_t = 0)]
        seed: u64,
    },
    /// Load all artifacts and report their sizes
    Info,
    /// Open config file in editor
    Config,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum VectorInput {
    Bare(Vec<f32>),
    Wrapped { vector: Vec<f32> },
}

impl VectorInput {
    fn into_vector(self) -> Vec<f32> {
        match self {
            Self::Bare(v) | Self::Wrapped { vector: v } => v,
        }
    }
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();
    let cfg = config::load_config(config_path)?;

    match cli.command {
        Commands::Search { vector } => search(&cfg, vector.as_deref()),
        Commands::Recognise { image } => recognise(&cfg, &image),
        Commands::Build {
            gallery,
            trees,
            seed,
        } => build(&cfg, &gallery, trees, seed),
        Commands::Info => {
            load_resolver(&cfg)?;
            Ok(())
        }
        Commands::Config => open_config(config_path),
    }
}

fn load_resolver(cfg: &config::Config) -> Result<Resolver> {
    let gallery = Gallery::load(cfg).context("Failed to load gallery")?;
    Ok(Resolver::new(Arc::new(gallery), SearchParams::from(cfg)))
}

fn search(cfg: &config::Config, input: Option<&Path>) -> Result<()> {
    let raw = match input {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?,
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading vector from stdin")?;
            buf
        }
    };
    let vector = serde_json::from_str::<VectorInput>(&raw)
        .context("vector must be a JSON array of numbers or {\"vector\": [...]}")?
        .into_vector();

    let resolver = load_resolver(cfg)?;
    report(resolver.resolve_from_vector(&vector))
}

#[cfg(feature = "onnx")]
fn recognise(cfg: &config::Config, image: &Path) -> Result<()> {
    let model = cfg
        .model
        .as_deref()
        .context("`model` is not set in the config")?;
    let resolver = load_resolver(cfg)?;
    let mut extractor = stashface::extract::OnnxExtractor::from_file(model)?;

    let bytes = std::fs::read(image).with_context(|| format!("reading {}", image.display()))?;
    let file_name = image.to_string_lossy();
    report(resolver.resolve_from_image(&mut extractor, &file_name, &bytes))
}

#[cfg(not(feature = "onnx"))]
fn recognise(_cfg: &config::Config, _image: &Path) -> Result<()> {
    anyhow::bail!("stashface was built without the `onnx` feature; use `search` with a vector")
}

fn report(result: Result<ResolutionResult, ResolveError>) -> Result<()> {
    match result {
        Ok(result) => {
            info!("Request {}: {} performer(s)", result.id, result.performers.len());
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(e) if e.is_client_error() => anyhow::bail!("Rejected request: {e}"),
        Err(e) => Err(anyhow::Error::new(e).context("Internal error while resolving")),
    }
}

fn build(cfg: &config::Config, gallery: &Path, trees: usize, seed: u64) -> Result<()> {
    info!("Reading gallery: {}", gallery.display());
    let records = storage::load_records(gallery)?;
    if records.is_empty() {
        anyhow::bail!("Gallery {} has no records", gallery.display());
    }

    info!("Building {} trees over {} records", trees, records.len());
    let (index, slots) = storage::build_gallery(&records, cfg.dimensions, trees, seed)?;
    storage::save_gallery(&index, &slots, cfg).context("Failed to save gallery")?;

    info!(
        "✓ Wrote {} and {}",
        cfg.index.display(),
        cfg.slots.display()
    );
    Ok(())
}

fn open_config(path: Option<&Path>) -> Result<()> {
    let config_path = path.unwrap_or(&config::CONFIG_PATH);
    if !config_path.exists() {
        config::save_config(&config::Config::default(), Some(config_path))?;
    }
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    info!("Opening config file: {:?}", config_path);

    let status = std::process::Command::new(editor)
        .arg(config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
