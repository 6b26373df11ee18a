use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::Path;

use log::debug;

use crate::error::AnnError;
use crate::node::{self, NodeRef};
use crate::{NearestNeighbours, Neighbour};

/// Read-only random-projection forest over Euclidean vectors, stored in the
/// Annoy on-disk layout.
///
/// Items occupy node slots `0..len()`. The trailing run of nodes sharing the
/// same descendant count are the tree roots.
#[derive(Debug, Clone)]
pub struct AnnoyIndex {
    dims: usize,
    words: Vec<u32>,
    n_nodes: usize,
    n_items: usize,
    roots: Vec<usize>,
}

/// Max-heap entry for the tree descent, highest margin first.
struct Pending {
    priority: f32,
    node: usize,
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .total_cmp(&other.priority)
            .then(self.node.cmp(&other.node))
    }
}
impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for Pending {}

impl AnnoyIndex {
    /// Load an index file built for `dims`-dimensional vectors.
    pub fn load(path: impl AsRef<Path>, dims: usize) -> Result<Self, AnnError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let index = Self::from_bytes(&bytes, dims)?;
        debug!(
            "loaded {} ({} items, {} trees, {} nodes)",
            path.display(),
            index.n_items,
            index.roots.len(),
            index.n_nodes
        );
        Ok(index)
    }

    pub fn from_bytes(bytes: &[u8], dims: usize) -> Result<Self, AnnError> {
        if bytes.len() % 4 != 0 {
            return Err(AnnError::InvalidFormat(format!(
                "size {} is not a whole number of words",
                bytes.len()
            )));
        }
        let words = bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Self::from_words(words, dims)
    }

    pub(crate) fn from_words(words: Vec<u32>, dims: usize) -> Result<Self, AnnError> {
        if dims == 0 {
            return Err(AnnError::InvalidFormat("invalid dimension 0".into()));
        }
        if words.is_empty() {
            return Err(AnnError::Empty);
        }
        let stride = node::node_words(dims);
        if words.len() % stride != 0 {
            return Err(AnnError::InvalidFormat(format!(
                "{} words do not divide into {}-dimensional nodes",
                words.len(),
                dims
            )));
        }
        let n_nodes = words.len() / stride;

        let mut index = Self {
            dims,
            words,
            n_nodes,
            n_items: 0,
            roots: Vec::new(),
        };

        let mut descendants: Option<i32> = None;
        for i in (0..n_nodes).rev() {
            let k = index.node_at(i)?.n_descendants();
            match descendants {
                Some(m) if m != k => break,
                _ => {
                    index.roots.push(i);
                    descendants = Some(k);
                }
            }
        }

        // The last original root may sit right before its copy.
        if index.roots.len() > 1 {
            let first = index.node_at(index.roots[0])?.children()[0];
            let last = index.node_at(index.roots[index.roots.len() - 1])?.children()[0];
            if first == last {
                index.roots.pop();
            }
        }

        let n_items = descendants.unwrap_or(0);
        if n_items <= 0 || n_items as usize > n_nodes {
            return Err(AnnError::InvalidFormat(format!(
                "root descendant count {n_items} is out of range for {n_nodes} nodes"
            )));
        }
        index.n_items = n_items as usize;
        index.validate()?;

        Ok(index)
    }

    /// Check every node's links so a query can never leave the node table.
    ///
    /// Children are written before their parent, so a split node may only
    /// point at lower node ids; this also rules out cycles.
    fn validate(&self) -> Result<(), AnnError> {
        let capacity = node::bucket_capacity(self.dims);
        for i in 0..self.n_nodes {
            let nd = self.node_at(i)?;
            let n = nd.n_descendants();
            if i < self.n_items {
                if n != 1 {
                    return Err(AnnError::InvalidFormat(format!(
                        "item node {i} has descendant count {n}"
                    )));
                }
                continue;
            }
            if n < 0 {
                return Err(AnnError::InvalidFormat(format!(
                    "node {i} has negative descendant count {n}"
                )));
            }
            if n as usize <= capacity {
                if let Some(&c) = nd
                    .bucket(n as usize)
                    .iter()
                    .find(|&&c| c < 0 || c as usize >= self.n_items)
                {
                    return Err(AnnError::InvalidFormat(format!(
                        "bucket node {i} holds item {c} outside 0..{}",
                        self.n_items
                    )));
                }
            } else if let Some(&c) = nd
                .children()
                .iter()
                .find(|&&c| c < 0 || c as usize >= i)
            {
                return Err(AnnError::InvalidFormat(format!(
                    "split node {i} links to child {c} outside 0..{i}"
                )));
            }
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), AnnError> {
        std::fs::write(path, self.to_bytes())?;
        Ok(())
    }

    pub fn n_trees(&self) -> usize {
        self.roots.len()
    }

    #[cfg(test)]
    fn item_vector(&self, slot: usize) -> Option<&[f32]> {
        (slot < self.n_items)
            .then(|| self.node(slot))
            .flatten()
            .map(|nd| nd.vector())
    }

    fn node(&self, i: usize) -> Option<NodeRef<'_>> {
        let stride = node::node_words(self.dims);
        let start = i.checked_mul(stride)?;
        self.words.get(start..start.checked_add(stride)?).map(NodeRef::new)
    }

    fn node_at(&self, i: usize) -> Result<NodeRef<'_>, AnnError> {
        self.node(i)
            .ok_or_else(|| AnnError::InvalidFormat(format!("node {i} is out of range")))
    }

    /// Collect at least `search_k` candidate items by descending the forest
    /// along the most promising margins first.
    fn candidates(&self, vector: &[f32], search_k: usize) -> Result<Vec<usize>, AnnError> {
        let capacity = node::bucket_capacity(self.dims);
        let mut queue: BinaryHeap<Pending> = self
            .roots
            .iter()
            .map(|&node| Pending {
                priority: f32::INFINITY,
                node,
            })
            .collect();

        let mut found = Vec::with_capacity(search_k);
        while found.len() < search_k {
            let Some(Pending { priority, node: i }) = queue.pop() else {
                break;
            };
            let nd = self.node_at(i)?;
            let n = nd.n_descendants();
            if n == 1 && i < self.n_items {
                found.push(i);
            } else if n >= 0 && n as usize <= capacity {
                found.extend(nd.bucket(n as usize).iter().map(|&c| c as usize));
            } else {
                let margin = nd.margin(vector);
                let [left, right] = nd.children();
                queue.push(Pending {
                    priority: priority.min(margin),
                    node: right as usize,
                });
                queue.push(Pending {
                    priority: priority.min(-margin),
                    node: left as usize,
                });
            }
        }

        found.sort_unstable();
        found.dedup();
        Ok(found)
    }
}

impl NearestNeighbours for AnnoyIndex {
    fn dimensions(&self) -> usize {
        self.dims
    }

    fn len(&self) -> usize {
        self.n_items
    }

    fn query(
        &self,
        vector: &[f32],
        k: usize,
        search_k: Option<usize>,
    ) -> Result<Vec<Neighbour>, AnnError> {
        if vector.len() != self.dims {
            return Err(AnnError::DimensionMismatch {
                got: vector.len(),
                want: self.dims,
            });
        }
        if k == 0 {
            return Ok(vec![]);
        }

        let search_k = search_k.unwrap_or(k * self.roots.len());
        let mut scored = Vec::new();
        for slot in self.candidates(vector, search_k)? {
            if slot < self.n_items {
                let d = node::squared_l2(self.node_at(slot)?.vector(), vector);
                scored.push((d, slot));
            }
        }

        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(d, slot)| Neighbour {
                slot,
                distance: d.max(0.0).sqrt(),
            })
            .collect())
    }
}
