use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ResolveError;

/// Separates the identity key from per-slot auxiliary text.
pub const SLOT_SEPARATOR: char = '=';

/// One gallery slot: who it belongs to plus whatever the builder attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotEntry {
    pub identity_key: String,
    pub auxiliary: Option<String>,
}

impl SlotEntry {
    /// Split `key[=aux]` at the first separator.
    pub fn parse(raw: &str) -> Option<Self> {
        let (key, aux) = match raw.split_once(SLOT_SEPARATOR) {
            Some((key, aux)) => (key, Some(aux.to_string())),
            None => (raw, None),
        };
        if key.is_empty() {
            return None;
        }
        Some(Self {
            identity_key: key.to_string(),
            auxiliary: aux,
        })
    }

    /// Inverse of [`parse`](Self::parse).
    pub fn encode(&self) -> String {
        match &self.auxiliary {
            Some(aux) => format!("{}{}{}", self.identity_key, SLOT_SEPARATOR, aux),
            None => self.identity_key.clone(),
        }
    }
}

/// Slot → identity lookup, parsed once at load time.
#[derive(Debug, Clone, Default)]
pub struct SlotMap {
    entries: Vec<SlotEntry>,
}

impl SlotMap {
    pub fn new(entries: Vec<SlotEntry>) -> Self {
        Self { entries }
    }

    pub fn from_raw<S: AsRef<str>>(raw: &[S]) -> Result<Self> {
        let entries = raw
            .iter()
            .enumerate()
            .map(|(slot, r)| {
                SlotEntry::parse(r.as_ref())
                    .with_context(|| format!("slot {slot} has an empty identity key"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { entries })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let raw: Vec<String> = serde_json::from_str(&data)
            .with_context(|| format!("parsing slot list {}", path.display()))?;
        Self::from_raw(raw.as_slice())
            .with_context(|| format!("parsing slot list {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let raw: Vec<String> = self.entries.iter().map(SlotEntry::encode).collect();
        let data = serde_json::to_string(&raw)?;
        std::fs::write(path, data).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    pub fn identity_of(&self, slot: usize) -> Result<&str, ResolveError> {
        self.entry(slot).map(|e| e.identity_key.as_str())
    }

    fn entry(&self, slot: usize) -> Result<&SlotEntry, ResolveError> {
        self.entries.get(slot).ok_or(ResolveError::InvalidSlot {
            slot,
            len: self.entries.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
