use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::annoy::AnnoyIndex;
use crate::error::AnnError;
use crate::node;

/// Iterations of the two-means centroid search per split.
const TWO_MEANS_STEPS: usize = 200;

/// Split attempts before falling back to a random partition.
const SPLIT_ATTEMPTS: usize = 3;

/// Offline builder producing an [`AnnoyIndex`].
///
/// Items must be added for every slot in `0..n` before [`build`](Self::build).
pub struct IndexBuilder {
    dims: usize,
    items: Vec<Option<Vec<f32>>>,
}

struct Split {
    normal: Vec<f32>,
    offset: f32,
}

impl Split {
    fn margin(&self, y: &[f32]) -> f32 {
        self.offset + node::dot(&self.normal, y)
    }
}

impl IndexBuilder {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            items: Vec::new(),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dims
    }

    pub fn add_item(&mut self, slot: usize, vector: &[f32]) -> Result<(), AnnError> {
        if vector.len() != self.dims {
            return Err(AnnError::DimensionMismatch {
                got: vector.len(),
                want: self.dims,
            });
        }
        if slot >= self.items.len() {
            self.items.resize(slot + 1, None);
        }
        if self.items[slot].is_some() {
            return Err(AnnError::DuplicateItem(slot));
        }
        self.items[slot] = Some(vector.to_vec());
        Ok(())
    }

    /// Build `n_trees` trees with a deterministic `seed`.
    pub fn build(self, n_trees: usize, seed: u64) -> Result<AnnoyIndex, AnnError> {
        if self.items.is_empty() {
            return Err(AnnError::Empty);
        }
        if n_trees == 0 {
            return Err(AnnError::InvalidFormat("at least one tree is required".into()));
        }
        let items = self
            .items
            .into_iter()
            .enumerate()
            .map(|(slot, v)| v.ok_or(AnnError::MissingItem(slot)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut forest = Forest {
            dims: self.dims,
            n_items: items.len(),
            words: Vec::with_capacity(items.len() * 2 * node::node_words(self.dims)),
            rng: StdRng::seed_from_u64(seed),
        };

        for v in &items {
            node::push_node(&mut forest.words, self.dims, 1, 0.0, [0, 0], v);
        }

        let mut roots = Vec::with_capacity(n_trees);
        for _ in 0..n_trees {
            let indices: Vec<usize> = (0..forest.n_items).collect();
            roots.push(forest.make_tree(&items, indices, true));
        }

        // Roots are copied to the end so a reader can find them.
        let stride = node::node_words(self.dims);
        for root in roots {
            let start = root * stride;
            forest.words.extend_from_within(start..start + stride);
        }

        debug!(
            "built {} trees over {} items ({} nodes)",
            n_trees,
            forest.n_items,
            forest.words.len() / stride
        );

        AnnoyIndex::from_words(forest.words, self.dims)
    }
}

struct Forest {
    dims: usize,
    n_items: usize,
    words: Vec<u32>,
    rng: StdRng,
}

impl Forest {
    fn n_nodes(&self) -> usize {
        self.words.len() / node::node_words(self.dims)
    }

    fn make_tree(&mut self, items: &[Vec<f32>], indices: Vec<usize>, is_root: bool) -> usize {
        let capacity = node::bucket_capacity(self.dims);

        if indices.len() == 1 && !is_root {
            return indices[0];
        }

        if indices.len() <= capacity
            && (!is_root || self.n_items <= capacity || indices.len() == 1)
        {
            let n_descendants = if is_root { self.n_items } else { indices.len() };
            let item = self.n_nodes();
            node::push_bucket(&mut self.words, self.dims, n_descendants as i32, &indices);
            return item;
        }

        let mut split = self.create_split(items, &indices);
        let mut sides = self.partition(items, &indices, &split);
        for _ in 1..SPLIT_ATTEMPTS {
            if imbalance(&sides) < 0.95 {
                break;
            }
            split = self.create_split(items, &indices);
            sides = self.partition(items, &indices, &split);
        }

        // Degenerate data (e.g. identical vectors): split at random.
        while imbalance(&sides) > 0.99 {
            sides = [Vec::new(), Vec::new()];
            split.normal.iter_mut().for_each(|z| *z = 0.0);
            split.offset = 0.0;
            for &j in &indices {
                let side = self.rng.gen_bool(0.5) as usize;
                sides[side].push(j);
            }
        }

        let n_descendants = if is_root { self.n_items } else { indices.len() };
        let [left, right] = sides;
        let left = self.make_tree(items, left, false);
        let right = self.make_tree(items, right, false);

        let item = self.n_nodes();
        node::push_node(
            &mut self.words,
            self.dims,
            n_descendants as i32,
            split.offset,
            [left as i32, right as i32],
            &split.normal,
        );
        item
    }

    fn partition(&mut self, items: &[Vec<f32>], indices: &[usize], split: &Split) -> [Vec<usize>; 2] {
        let mut sides = [Vec::new(), Vec::new()];
        for &j in indices {
            let margin = split.margin(&items[j]);
            let side = if margin != 0.0 {
                margin > 0.0
            } else {
                self.rng.gen_bool(0.5)
            };
            sides[side as usize].push(j);
        }
        sides
    }

    /// Hyperplane equidistant from two centroids found by two-means.
    fn create_split(&mut self, items: &[Vec<f32>], indices: &[usize]) -> Split {
        let (p, q) = self.two_means(items, indices);

        let mut normal: Vec<f32> = p.iter().zip(q.iter()).map(|(a, b)| a - b).collect();
        let norm = node::dot(&normal, &normal).sqrt();
        if norm > 0.0 {
            normal.iter_mut().for_each(|z| *z /= norm);
        }

        let offset = normal
            .iter()
            .zip(p.iter().zip(q.iter()))
            .map(|(n, (a, b))| -n * (a + b) / 2.0)
            .sum();

        Split { normal, offset }
    }

    fn two_means(&mut self, items: &[Vec<f32>], indices: &[usize]) -> (Vec<f32>, Vec<f32>) {
        let count = indices.len();
        let i = self.rng.gen_range(0..count);
        let mut j = self.rng.gen_range(0..count - 1);
        if j >= i {
            j += 1;
        }

        let mut p = items[indices[i]].clone();
        let mut q = items[indices[j]].clone();
        let (mut ic, mut jc) = (1.0f32, 1.0f32);

        for _ in 0..TWO_MEANS_STEPS {
            let k = &items[indices[self.rng.gen_range(0..count)]];
            let di = ic * node::squared_l2(&p, k);
            let dj = jc * node::squared_l2(&q, k);
            if di < dj {
                p.iter_mut()
                    .zip(k.iter())
                    .for_each(|(z, x)| *z = (*z * ic + x) / (ic + 1.0));
                ic += 1.0;
            } else if dj < di {
                q.iter_mut()
                    .zip(k.iter())
                    .for_each(|(z, x)| *z = (*z * jc + x) / (jc + 1.0));
                jc += 1.0;
            }
        }

        (p, q)
    }
}

fn imbalance(sides: &[Vec<usize>; 2]) -> f64 {
    let ls = sides[0].len() as f64;
    let rs = sides[1].len() as f64;
    let f = ls / (ls + rs + 1e-9);
    f.max(1.0 - f)
}
