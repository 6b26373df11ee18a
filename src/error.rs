use stashface_ann::AnnError;
use thiserror::Error;

/// Failures of a single resolution request.
///
/// Client errors mean the request itself was bad; everything else points at
/// a mismatch between the loaded gallery artifacts and is not retried.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("invalid vector size: got {got}, want {want}")]
    InvalidVectorSize { got: usize, want: usize },

    #[error("vector component {index} is not finite")]
    NonFiniteVector { index: usize },

    #[error("invalid file type (only .jpg, .jpeg, .png and .webp are allowed)")]
    UnsupportedFileType,

    #[error("invalid image file: {0}")]
    InvalidImage(String),

    #[error("no face detected")]
    NoFaceDetected,

    #[error("index returned slot {slot} but the slot map has {len} entries")]
    InvalidSlot { slot: usize, len: usize },

    #[error(transparent)]
    Index(#[from] AnnError),

    #[error("embedding extractor: {0}")]
    Extractor(String),
}

impl ResolveError {
    /// True when the caller sent something unusable.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidVectorSize { .. }
                | Self::NonFiniteVector { .. }
                | Self::UnsupportedFileType
                | Self::InvalidImage(_)
                | Self::NoFaceDetected
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_and_internal_classes() {
        assert!(ResolveError::InvalidVectorSize { got: 3, want: 512 }.is_client_error());
        assert!(ResolveError::NoFaceDetected.is_client_error());
        assert!(!ResolveError::InvalidSlot { slot: 9, len: 4 }.is_client_error());
        assert!(!ResolveError::Index(AnnError::Empty).is_client_error());
    }

    #[test]
    fn test_messages() {
        let err = ResolveError::InvalidVectorSize { got: 3, want: 512 };
        assert_eq!(err.to_string(), "invalid vector size: got 3, want 512");
    }
}
