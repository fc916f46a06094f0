//! MeshFieldError: Unified error type for mesh-field public APIs
//!
//! This error type is used throughout the mesh-field library to provide robust,
//! non-panicking error handling for all public APIs.

use thiserror::Error;

/// Unified error type for mesh-field operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MeshFieldError {
    /// Integer index outside the logical bounds of an array.
    #[error("index {index} out of bounds for array of length {len}")]
    IndexOutOfBounds {
        /// Requested index after negative-index normalization.
        index: i64,
        /// Logical length of the indexed array.
        len: usize,
    },
    /// Index kind not supported by the composite indexing engine.
    #[error("unsupported index type: {0}")]
    UnsupportedIndex(&'static str),
    /// Operand shapes cannot be broadcast together.
    #[error("shape mismatch: cannot broadcast {left:?} with {right:?}")]
    ShapeMismatch {
        /// Shape of the left operand.
        left: Vec<usize>,
        /// Shape of the right operand.
        right: Vec<usize>,
    },
    /// Operation requires a numeric dtype the operand does not have.
    #[error("dtype error: {0}")]
    DTypeError(&'static str),
    /// Buffer allocation for a broadcast-fill append failed.
    #[error("allocation of {elements} elements failed during attribute append")]
    AllocationFailed {
        /// Number of elements the fill would have required.
        elements: usize,
    },
    /// Accessing a native attribute with no native back-reference.
    #[error("array has no native back-reference; attribute `{0}` unavailable")]
    MissingNativeAttribute(&'static str),
    /// A collective operation was requested without a usable controller.
    #[error("operation requires a multi-rank controller: {0}")]
    ControllerRequired(&'static str),
    /// Marshal or unmarshal of a data object failed.
    #[error("serialization of `{type_name}` failed: {reason}")]
    MarshalFailed {
        /// Registry name of the data-object type.
        type_name: String,
        /// Underlying encoder/decoder message.
        reason: String,
    },
    /// A lifted function was invoked through the dispatch layer with a name
    /// the catalog does not carry.
    #[error("unsupported ufunc: {0}")]
    UnsupportedUfunc(String),
    /// Operation on a dataset wrapper that does not carry the requested data.
    #[error("dataset does not support {0:?} attributes")]
    UnsupportedAssociation(crate::dataset::Association),
    /// The owning dataset of a lazily materialized array has been dropped.
    #[error("owning dataset has been dropped; composite array cannot be materialized")]
    DatasetDropped,
    /// Composite operands whose block structures disagree.
    #[error("composite operands have {left} and {right} blocks; structures must match")]
    BlockCountMismatch {
        /// Block count of the left operand.
        left: usize,
        /// Block count of the right operand.
        right: usize,
    },
}
