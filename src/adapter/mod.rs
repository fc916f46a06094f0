//! Adapter layer: typed, lazy views over native datasets.
//!
//! The layering is strict: [`crate::dataset`] owns storage, this module
//! wraps it. Arrays ([`FieldArray`]) carry provenance back to the dataset
//! they were read from; attribute views translate between native arrays and
//! adapter arrays; wrappers give each dataset kind its access surface; the
//! composite pieces make a block tree look like one dataset.

pub mod array;
pub mod attributes;
pub mod composite;
pub mod composite_attributes;
pub mod iter;
pub mod wrap;

pub use array::{DataArray, FieldArray};
pub use attributes::{AppendPolicy, AttributeView};
pub use composite::{CompositeArray, Index, SliceSpec};
pub use composite_attributes::CompositeAttributes;
pub use iter::{CompositeIter, MultiCompositeIter};
pub use wrap::{wrap, Attributes, CompositeDataSet, Wrapped};
