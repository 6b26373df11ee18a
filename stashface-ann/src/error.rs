use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnnError {
    #[error("ann: dimension mismatch: got {got}, want {want}")]
    DimensionMismatch { got: usize, want: usize },

    #[error("ann: {0}")]
    Io(#[from] std::io::Error),

    #[error("ann: invalid format: {0}")]
    InvalidFormat(String),

    #[error("ann: index contains no items")]
    Empty,

    #[error("ann: item {0} added twice")]
    DuplicateItem(usize),

    #[error("ann: item {0} was never added")]
    MissingItem(usize),
}
