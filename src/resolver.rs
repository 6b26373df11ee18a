use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::error::ResolveError;
use crate::extract::{self, EmbeddingExtractor};
use crate::matcher::{self, Candidate};
use crate::storage::Gallery;

/// Placeholder for identities without metadata.
pub const UNKNOWN: &str = "N/A";

/// Fixed per-query knobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchParams {
    pub neighbours: usize,
    pub search_k: usize,
    pub max_results: usize,
    pub repeat_bonus: f64,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            neighbours: 50,
            search_k: 10_000,
            max_results: 10,
            repeat_bonus: 0.5,
        }
    }
}

impl From<&Config> for SearchParams {
    fn from(cfg: &Config) -> Self {
        Self {
            neighbours: cfg.neighbours,
            search_k: cfg.search_k,
            max_results: cfg.max_results,
            repeat_bonus: cfg.repeat_bonus,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Performer {
    pub id: String,
    pub name: String,
    pub image: String,
    /// Lower is better.
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    /// Unique per call.
    pub id: String,
    /// Sorted by ascending distance.
    pub performers: Vec<Performer>,
}

/// Resolves embeddings to ranked identities against a shared gallery.
///
/// Cheap to clone; every clone reads the same immutable [`Gallery`].
#[derive(Clone)]
pub struct Resolver {
    gallery: Arc<Gallery>,
    params: SearchParams,
}

impl Resolver {
    pub fn new(gallery: Arc<Gallery>, params: SearchParams) -> Self {
        Self { gallery, params }
    }

    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    pub fn params(&self) -> SearchParams {
        self.params
    }

    pub fn resolve_from_vector(&self, vector: &[f32]) -> Result<ResolutionResult, ResolveError> {
        let want = self.gallery.index.dimensions();
        if vector.len() != want {
            return Err(ResolveError::InvalidVectorSize {
                got: vector.len(),
                want,
            });
        }
        if let Some(index) = vector.iter().position(|v| !v.is_finite()) {
            return Err(ResolveError::NonFiniteVector { index });
        }

        let id = uuid::Uuid::new_v4().to_string();

        let t = Instant::now();
        let hits = self.gallery.index.query(
            vector,
            self.params.neighbours,
            Some(self.params.search_k),
        )?;
        debug!("Search done in {:?} ({} hits)", t.elapsed(), hits.len());

        let candidates = matcher::aggregate(&hits, &self.gallery.slots, self.params.repeat_bonus)?;
        let performers = matcher::rank(candidates, self.params.max_results)
            .into_iter()
            .map(|c| self.enrich(c))
            .collect();

        Ok(ResolutionResult { id, performers })
    }

    /// Validate and decode an upload, extract its embedding, then resolve it.
    pub fn resolve_from_image<E: EmbeddingExtractor + ?Sized>(
        &self,
        extractor: &mut E,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<ResolutionResult, ResolveError> {
        extract::check_file_name(file_name)?;
        let image = extract::decode_image(bytes)?;

        let t = Instant::now();
        let vector = extractor.extract(&image)?;
        debug!("Face embedding in {:?}", t.elapsed());

        self.resolve_from_vector(&vector)
    }

    fn enrich(&self, candidate: Candidate) -> Performer {
        let meta = self.gallery.metadata.lookup(&candidate.identity_key);
        let field = |f: Option<&String>| f.cloned().unwrap_or_else(|| UNKNOWN.to_string());
        Performer {
            name: field(meta.and_then(|m| m.name.as_ref())),
            image: field(meta.and_then(|m| m.image.as_ref())),
            id: candidate.identity_key,
            distance: candidate.distance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::SlotMap;
    use crate::metadata::{MetadataStore, PerformerMeta};
    use stashface_ann::{AnnError, NearestNeighbours, Neighbour};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns canned hits and counts how often it was asked.
    struct FixedHits {
        hits: Vec<Neighbour>,
        queries: Arc<AtomicUsize>,
    }

    impl NearestNeighbours for FixedHits {
        fn dimensions(&self) -> usize {
            512
        }

        fn len(&self) -> usize {
            self.hits.len()
        }

        fn query(
            &self,
            _vector: &[f32],
            k: usize,
            _search_k: Option<usize>,
        ) -> Result<Vec<Neighbour>, AnnError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            Ok(self.hits.iter().take(k).copied().collect())
        }
    }

    fn resolver(hits: Vec<(usize, f32)>, slots: &[&str]) -> (Resolver, Arc<AtomicUsize>) {
        let queries = Arc::new(AtomicUsize::new(0));
        let index = FixedHits {
            hits: hits
                .into_iter()
                .map(|(slot, distance)| Neighbour { slot, distance })
                .collect(),
            queries: queries.clone(),
        };
        let metadata = MetadataStore::new(HashMap::from([(
            "X".to_string(),
            PerformerMeta {
                name: Some("Xena".into()),
                image: Some("https://img/x.jpg".into()),
            },
        )]));
        let gallery = Gallery::new(index, SlotMap::from_raw(slots).unwrap(), metadata);
        (
            Resolver::new(Arc::new(gallery), SearchParams::default()),
            queries,
        )
    }

    #[test]
    fn test_wrong_length_skips_query() {
        let (r, queries) = resolver(vec![(0, 1.0)], &["X"]);
        for len in [0, 128, 511, 513] {
            let err = r.resolve_from_vector(&vec![0.0f32; len]).unwrap_err();
            assert!(matches!(err, ResolveError::InvalidVectorSize { want: 512, .. }));
            assert!(err.is_client_error());
        }
        assert_eq!(queries.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_non_finite_skips_query() {
        let (r, queries) = resolver(vec![(0, 1.0)], &["X"]);
        let mut v = vec![0.0f32; 512];
        v[42] = f32::NAN;
        assert!(matches!(
            r.resolve_from_vector(&v),
            Err(ResolveError::NonFiniteVector { index: 42 })
        ));
        assert_eq!(queries.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_aggregates_and_enriches() {
        let (r, _) = resolver(vec![(0, 1.0), (1, 1.0), (2, 1.2)], &["X=a", "Y=a", "X=b"]);
        let result = r.resolve_from_vector(&[0.1; 512]).unwrap();

        assert_eq!(
            result.performers,
            vec![
                Performer {
                    id: "X".into(),
                    name: "Xena".into(),
                    image: "https://img/x.jpg".into(),
                    distance: 0.5,
                },
                Performer {
                    id: "Y".into(),
                    name: UNKNOWN.into(),
                    image: UNKNOWN.into(),
                    distance: 1.0,
                },
            ]
        );
    }

    #[test]
    fn test_invalid_slot_is_internal_error() {
        let (r, _) = resolver(vec![(0, 1.0), (7, 1.1)], &["X"]);
        let err = r.resolve_from_vector(&[0.0; 512]).unwrap_err();
        assert!(matches!(err, ResolveError::InvalidSlot { slot: 7, len: 1 }));
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_fresh_id_same_performers() {
        let (r, _) = resolver(vec![(0, 0.4), (1, 0.7)], &["X", "Y"]);
        let a = r.resolve_from_vector(&[0.0; 512]).unwrap();
        let b = r.resolve_from_vector(&[0.0; 512]).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.performers, b.performers);
        assert!(uuid::Uuid::parse_str(&a.id).is_ok());
    }

    #[test]
    fn test_result_json_shape() {
        let (r, _) = resolver(vec![(0, 0.25)], &["Y"]);
        let result = r.resolve_from_vector(&[0.0; 512]).unwrap();
        let json = serde_json::to_value(&result).unwrap();

        assert!(json["id"].is_string());
        assert_eq!(json["performers"][0]["id"], "Y");
        assert_eq!(json["performers"][0]["name"], "N/A");
        assert_eq!(json["performers"][0]["image"], "N/A");
        assert_eq!(json["performers"][0]["distance"], 0.25);
    }

    struct StaticExtractor(Result<Vec<f32>, ()>);

    impl EmbeddingExtractor for StaticExtractor {
        fn extract(&mut self, _image: &image::RgbImage) -> Result<Vec<f32>, ResolveError> {
            self.0.clone().map_err(|_| ResolveError::NoFaceDetected)
        }
    }

    fn png_bytes() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(8, 8, image::Rgb([128, 64, 32]));
        let mut buf = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_image_path_uses_extracted_vector() {
        let (r, queries) = resolver(vec![(0, 0.3)], &["X"]);
        let mut ex = StaticExtractor(Ok(vec![0.0; 512]));
        let result = r.resolve_from_image(&mut ex, "face.png", &png_bytes()).unwrap();
        assert_eq!(result.performers[0].name, "Xena");
        assert_eq!(queries.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_image_path_rejections() {
        let (r, queries) = resolver(vec![(0, 0.3)], &["X"]);
        let mut ex = StaticExtractor(Ok(vec![0.0; 512]));

        assert!(matches!(
            r.resolve_from_image(&mut ex, "face.gif", &png_bytes()),
            Err(ResolveError::UnsupportedFileType)
        ));
        assert!(matches!(
            r.resolve_from_image(&mut ex, "face.jpg", b"nope"),
            Err(ResolveError::InvalidImage(_))
        ));

        let mut blind = StaticExtractor(Err(()));
        assert!(matches!(
            r.resolve_from_image(&mut blind, "face.png", &png_bytes()),
            Err(ResolveError::NoFaceDetected)
        ));
        assert_eq!(queries.load(Ordering::SeqCst), 0);
    }
}
