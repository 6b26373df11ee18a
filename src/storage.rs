use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use stashface_ann::{AnnoyIndex, IndexBuilder, NearestNeighbours};
use std::path::Path;

use crate::config::Config;
use crate::identity::{SlotEntry, SlotMap};
use crate::metadata::MetadataStore;

/// Immutable state shared by every resolution request.
pub struct Gallery {
    pub index: Box<dyn NearestNeighbours>,
    pub slots: SlotMap,
    pub metadata: MetadataStore,
}

impl Gallery {
    pub fn new(
        index: impl NearestNeighbours + 'static,
        slots: SlotMap,
        metadata: MetadataStore,
    ) -> Self {
        Self {
            index: Box::new(index),
            slots,
            metadata,
        }
    }

    /// Load the index, slot list and performer metadata named in `cfg`.
    /// Any failure here must stop the process from serving.
    pub fn load(cfg: &Config) -> Result<Self> {
        let index = AnnoyIndex::load(&cfg.index, cfg.dimensions)
            .with_context(|| format!("loading index {}", cfg.index.display()))?;
        let slots = SlotMap::load(&cfg.slots)?;
        let metadata = MetadataStore::load(&cfg.performers)?;

        if index.len() > slots.len() {
            anyhow::bail!(
                "index {} has {} slots but {} only maps {}",
                cfg.index.display(),
                index.len(),
                cfg.slots.display(),
                slots.len()
            );
        }
        if index.len() < slots.len() {
            warn!(
                "slot list has {} entries, index only {}; extra entries are unused",
                slots.len(),
                index.len()
            );
        }

        info!(
            "Gallery loaded: {} slots, {} trees, {} performers",
            index.len(),
            index.n_trees(),
            metadata.len()
        );

        Ok(Self::new(index, slots, metadata))
    }
}

/// One reference embedding in a gallery source file.
/// `id` is the slot label, `identity[=aux]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceRecord {
    pub id: String,
    pub embedding: Vec<f32>,
}

pub fn load_records(path: &Path) -> Result<Vec<FaceRecord>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing gallery {}", path.display()))
}

/// Build the forest and slot list for `records`, slot `i` being record `i`.
pub fn build_gallery(
    records: &[FaceRecord],
    dimensions: usize,
    trees: usize,
    seed: u64,
) -> Result<(AnnoyIndex, SlotMap)> {
    let mut builder = IndexBuilder::new(dimensions);
    let mut entries = Vec::with_capacity(records.len());

    for (slot, record) in records.iter().enumerate() {
        let entry = SlotEntry::parse(&record.id)
            .with_context(|| format!("record {slot} has an empty identity key"))?;
        if let Some(index) = record.embedding.iter().position(|v| !v.is_finite()) {
            anyhow::bail!("record {slot} ({}) has a non-finite component at {index}", record.id);
        }
        builder
            .add_item(slot, &record.embedding)
            .with_context(|| format!("adding record {slot} ({})", record.id))?;
        entries.push(entry);
    }

    let index = builder.build(trees, seed).context("building index")?;
    Ok((index, SlotMap::new(entries)))
}

/// Write the index and slot list where `cfg` expects them.
pub fn save_gallery(index: &AnnoyIndex, slots: &SlotMap, cfg: &Config) -> Result<()> {
    for path in [&cfg.index, &cfg.slots] {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
    }
    index
        .save(&cfg.index)
        .with_context(|| format!("writing {}", cfg.index.display()))?;
    slots.save(&cfg.slots)?;
    Ok(())
}
