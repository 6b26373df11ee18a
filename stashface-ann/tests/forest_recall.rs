use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stashface_ann::{AnnError, AnnoyIndex, FlatIndex, IndexBuilder, NearestNeighbours};

const DIMS: usize = 512;

fn random_gallery(n: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| (0..DIMS).map(|_| rng.gen_range(-1.0f32..1.0)).collect())
        .collect()
}

fn build_both(gallery: &[Vec<f32>], trees: usize) -> Result<(AnnoyIndex, FlatIndex), AnnError> {
    let mut builder = IndexBuilder::new(DIMS);
    let mut flat = FlatIndex::new(DIMS)?;
    for (slot, v) in gallery.iter().enumerate() {
        builder.add_item(slot, v)?;
        flat.push(v)?;
    }
    Ok((builder.build(trees, 42)?, flat))
}

/// With a search budget covering every tree leaf the forest is exact.
#[test]
fn test_exhaustive_search_matches_flat_scan() -> Result<(), AnnError> {
    env_logger::try_init().ok();
    let gallery = random_gallery(1000, 1);
    let (forest, flat) = build_both(&gallery, 10)?;
    assert_eq!(forest.len(), 1000);

    for query in random_gallery(5, 2) {
        let approx = forest.query(&query, 50, Some(10_000))?;
        let exact = flat.query(&query, 50, None)?;

        let approx_slots: Vec<usize> = approx.iter().map(|n| n.slot).collect();
        let exact_slots: Vec<usize> = exact.iter().map(|n| n.slot).collect();
        assert_eq!(approx_slots, exact_slots);
    }
    Ok(())
}

#[test]
fn test_gallery_item_is_its_own_nearest_neighbour() -> Result<(), AnnError> {
    let gallery = random_gallery(600, 3);
    let (forest, _) = build_both(&gallery, 5)?;

    for slot in [0, 17, 599] {
        let hits = forest.query(&gallery[slot], 1, Some(10_000))?;
        assert_eq!(hits[0].slot, slot);
        assert!(hits[0].distance < 1e-3);
    }
    Ok(())
}

#[test]
fn test_small_budget_is_sorted_and_bounded() -> Result<(), AnnError> {
    let gallery = random_gallery(800, 4);
    let (forest, _) = build_both(&gallery, 4)?;

    let hits = forest.query(&random_gallery(1, 5)[0], 50, Some(60))?;
    assert!(hits.len() <= 50);
    assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    Ok(())
}

#[test]
fn test_file_roundtrip() -> Result<(), AnnError> {
    let gallery = random_gallery(50, 6);
    let (forest, _) = build_both(&gallery, 3)?;

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("face.db");
    forest.save(&path)?;

    let loaded = AnnoyIndex::load(&path, DIMS)?;
    assert_eq!(loaded.len(), forest.len());
    assert_eq!(
        loaded.query(&gallery[7], 5, None)?,
        forest.query(&gallery[7], 5, None)?
    );
    Ok(())
}

#[test]
fn test_load_missing_file() {
    let err = AnnoyIndex::load("/nonexistent/face.db", DIMS).unwrap_err();
    assert!(matches!(err, AnnError::Io(_)));
}
