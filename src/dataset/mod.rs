//! Native dataset kernel: attribute containers, typed dataset handles and the
//! composite block tree.
//!
//! Everything in this module is plain owned storage; the adapter layer in
//! [`crate::adapter`] wraps these handles and never owns their buffers.

pub mod attributes;
pub mod composite;
pub mod handle;

pub use attributes::{AttributeContainer, NativeArray};
pub use composite::CompositeHandle;
pub use handle::{CellStorage, DataObjectHandle, DataSetHandle, DataSetKind};

/// The kind of element a named array is indexed by.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum Association {
    /// One tuple per point.
    Point,
    /// One tuple per cell.
    Cell,
    /// Unindexed global data.
    #[default]
    Field,
    /// One tuple per table row.
    Row,
    /// One tuple per graph vertex (molecule atom).
    Vertex,
    /// One tuple per graph edge (molecule bond).
    Edge,
}

/// Ghost-array bit values, as defined by the data model.
pub mod ghost {
    /// Point duplicated on another rank.
    pub const DUPLICATE_POINT: u8 = 1;
    /// Point not to be rendered or processed.
    pub const HIDDEN_POINT: u8 = 2;
    /// Cell duplicated on another rank.
    pub const DUPLICATE_CELL: u8 = 1;
    /// Cell not to be rendered or processed.
    pub const HIDDEN_CELL: u8 = 32;
}
