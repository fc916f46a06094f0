#![cfg_attr(docsrs, feature(doc_cfg))]
//! # mesh-field
//!
//! mesh-field is a typed adapter and algorithm layer for partitioned
//! scientific datasets. It wraps native dataset handles (tables, point sets,
//! meshes, graphs, composite block trees) in array objects that behave like
//! numeric arrays: element-wise arithmetic, comparisons, boolean and fancy
//! indexing, slicing, and reductions, all composite-aware and rank-parallel.
//!
//! ## Features
//! - [`FieldArray`](adapter::FieldArray): dtype-tagged arrays with a `None`
//!   sentinel that absorbs through every operation, so attributes missing on
//!   a rank or a block never poison a pipeline
//! - [`CompositeArray`](adapter::CompositeArray): lazy per-block arrays over
//!   composite datasets, indexable across block boundaries as one array
//! - Attribute views ([`AttributeView`](adapter::AttributeView),
//!   [`CompositeAttributes`](adapter::CompositeAttributes)) that read native
//!   buffers zero-copy and write them back with broadcast-fill and tensor
//!   reorientation
//! - Element-wise ufunc catalog and whole/per-block reductions
//!   ([`algs::reduction`], [`algs::per_block`]) that agree across ranks
//! - Pluggable rank collectives ([`algs::Controller`]): serial, in-process
//!   thread groups for tests, and MPI behind the `mpi-support` feature
//!
//! ## Usage
//! Add `mesh-field` as a dependency in your `Cargo.toml` and enable features
//! as needed:
//!
//! ```toml
//! [dependencies]
//! mesh-field = "0.3"
//! # Optional features:
//! # features = ["mpi-support"]
//! ```

pub mod adapter;
pub mod algs;
pub mod dataset;
pub mod error;
pub mod io;
pub mod values;

pub use error::MeshFieldError;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::adapter::{
        wrap, AppendPolicy, AttributeView, Attributes, CompositeArray, CompositeAttributes,
        CompositeDataSet, CompositeIter, DataArray, FieldArray, Index, MultiCompositeIter,
        SliceSpec, Wrapped,
    };
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::MpiComm;
    pub use crate::algs::{
        global_controller, set_global_controller, Controller, LocalComm, ReduceOp, SelfComm,
    };
    pub use crate::dataset::{
        Association, CompositeHandle, DataObjectHandle, DataSetHandle, DataSetKind, NativeArray,
    };
    pub use crate::error::MeshFieldError;
    pub use crate::io::{marshal, unmarshal, MarshalEnvelope};
    pub use crate::values::{DType, Values};
}
