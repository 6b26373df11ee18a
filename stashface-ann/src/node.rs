//! Word-level layout of a Euclidean forest node.
//!
//! Every node is `4 + dims` little-endian 32-bit words:
//!
//! ```text
//! [n_descendants: i32] [a: f32] [children: 2 x i32] [v: dims x f32]
//! ```
//!
//! Leaf buckets reuse the region starting at `children` to store up to
//! `dims + 2` item ids inline.

/// Words preceding the vector payload.
pub(crate) const HEADER_WORDS: usize = 4;

/// Word offset of the `children` array.
const CHILDREN_OFFSET: usize = 2;

pub(crate) fn node_words(dims: usize) -> usize {
    HEADER_WORDS + dims
}

/// Largest number of item ids a leaf bucket can hold.
pub(crate) fn bucket_capacity(dims: usize) -> usize {
    node_words(dims) - CHILDREN_OFFSET
}

#[derive(Clone, Copy)]
pub(crate) struct NodeRef<'a> {
    words: &'a [u32],
}

impl<'a> NodeRef<'a> {
    pub(crate) fn new(words: &'a [u32]) -> Self {
        Self { words }
    }

    pub(crate) fn n_descendants(&self) -> i32 {
        self.words[0] as i32
    }

    pub(crate) fn offset(&self) -> f32 {
        f32::from_bits(self.words[1])
    }

    pub(crate) fn children(&self) -> [i32; 2] {
        [self.words[2] as i32, self.words[3] as i32]
    }

    /// Item ids stored inline in a leaf bucket.
    pub(crate) fn bucket(&self, len: usize) -> &'a [i32] {
        bytemuck::cast_slice(&self.words[CHILDREN_OFFSET..CHILDREN_OFFSET + len])
    }

    pub(crate) fn vector(&self) -> &'a [f32] {
        bytemuck::cast_slice(&self.words[HEADER_WORDS..])
    }

    /// Signed distance of `y` from this node's split hyperplane.
    pub(crate) fn margin(&self, y: &[f32]) -> f32 {
        self.offset() + dot(self.vector(), y)
    }
}

/// Appends one node to `words`.
pub(crate) fn push_node(
    words: &mut Vec<u32>,
    dims: usize,
    n_descendants: i32,
    offset: f32,
    children: [i32; 2],
    vector: &[f32],
) {
    debug_assert_eq!(vector.len(), dims);
    words.push(n_descendants as u32);
    words.push(offset.to_bits());
    words.push(children[0] as u32);
    words.push(children[1] as u32);
    words.extend(vector.iter().map(|v| v.to_bits()));
}

/// Appends a leaf bucket holding `items`.
pub(crate) fn push_bucket(words: &mut Vec<u32>, dims: usize, n_descendants: i32, items: &[usize]) {
    debug_assert!(items.len() <= bucket_capacity(dims));
    let start = words.len();
    words.resize(start + node_words(dims), 0);
    words[start] = n_descendants as u32;
    for (i, item) in items.iter().enumerate() {
        words[start + CHILDREN_OFFSET + i] = *item as u32;
    }
}

pub(crate) fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Squared Euclidean distance.
pub(crate) fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
