use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub static CONFIG_PATH: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(
        option_env!("STASHFACE_CONFIG_PATH").unwrap_or("/usr/local/etc/stashface/config.toml"),
    )
});

pub static DATA_PREFIX: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("STASHFACE_DATA_PREFIX").unwrap_or("/usr/local/share/stashface"))
});

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Annoy forest over the gallery embeddings.
    pub index: PathBuf,
    /// JSON list mapping each index slot to `identity[=aux]`.
    pub slots: PathBuf,
    /// JSON object of identity metadata.
    pub performers: PathBuf,
    pub dimensions: usize,
    /// Raw neighbours fetched before aggregation.
    pub neighbours: usize,
    pub search_k: usize,
    pub max_results: usize,
    /// Subtracted from an identity's distance for each repeated hit.
    pub repeat_bonus: f64,
    /// FaceNet ONNX model, only used by `recognise`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            index: DATA_PREFIX.join("face.db"),
            slots: DATA_PREFIX.join("face.json"),
            performers: DATA_PREFIX.join("performers.json"),
            dimensions: 512,
            neighbours: 50,
            search_k: 10_000,
            max_results: 10,
            repeat_bonus: 0.5,
            model: None,
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}
