use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Display metadata for one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformerMeta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

/// Sparse identity → metadata mapping. Absence is not an error.
#[derive(Debug, Clone, Default)]
pub struct MetadataStore {
    performers: HashMap<String, PerformerMeta>,
}

impl MetadataStore {
    pub fn new(performers: HashMap<String, PerformerMeta>) -> Self {
        Self { performers }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let performers = serde_json::from_str(&data)
            .with_context(|| format!("parsing performer metadata {}", path.display()))?;
        Ok(Self { performers })
    }

    pub fn lookup(&self, identity_key: &str) -> Option<&PerformerMeta> {
        self.performers.get(identity_key)
    }

    pub fn len(&self) -> usize {
        self.performers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.performers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_ignores_extra_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("performers.json");
        std::fs::write(
            &path,
            r#"{
                "x": {"name": "Xena", "image": "https://img/x.jpg", "country": "NZ"},
                "y": {"name": "Yuki"}
            }"#,
        )
        .unwrap();

        let store = MetadataStore::load(&path).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.lookup("x").unwrap().name.as_deref(), Some("Xena"));
        assert_eq!(store.lookup("y").unwrap().image, None);
        assert!(store.lookup("z").is_none());
    }

    #[test]
    fn test_load_rejects_non_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("performers.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();
        assert!(MetadataStore::load(&path).is_err());
    }
}
