//! Native dataset handles.
//!
//! A [`DataSetHandle`] owns the attribute containers and geometry buffers of
//! one (non-composite) dataset. A [`DataObjectHandle`] is either a dataset or
//! a composite block tree; adapter wrappers hold `Arc<DataObjectHandle>` and
//! arrays hold `Weak<DataObjectHandle>` back-references.

use crate::dataset::attributes::{AttributeContainer, NativeArray};
use crate::dataset::composite::CompositeHandle;
use crate::dataset::Association;
use crate::values::Values;
use parking_lot::RwLock;

/// Runtime class of a native (non-composite) dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DataSetKind {
    /// Bare data object carrying only field data.
    Generic,
    /// Column-oriented table with row data.
    Table,
    /// Explicit points with point/cell data.
    PointSet,
    /// Point set plus polygon connectivity.
    PolyMesh,
    /// Point set plus explicit cell types/locations/connectivity.
    UnstructuredMesh,
    /// Vertices and edges with per-vertex/per-edge data.
    Graph,
    /// Graph whose vertices are atoms and edges bonds.
    Molecule,
    /// Tree-refined grid exposing cell data only.
    HyperTreeGrid,
}

impl DataSetKind {
    /// Associations this kind of dataset supports (Field is universal).
    pub fn supports(self, assoc: Association) -> bool {
        use Association::*;
        if assoc == Field {
            return true;
        }
        match self {
            DataSetKind::Generic => false,
            DataSetKind::Table => assoc == Row,
            DataSetKind::PointSet | DataSetKind::PolyMesh | DataSetKind::UnstructuredMesh => {
                assoc == Point || assoc == Cell
            }
            DataSetKind::Graph | DataSetKind::Molecule => assoc == Vertex || assoc == Edge,
            DataSetKind::HyperTreeGrid => assoc == Cell,
        }
    }
}

/// Explicit cell storage of an unstructured mesh.
#[derive(Clone, Debug)]
pub struct CellStorage {
    /// Cell type id per cell.
    pub types: NativeArray,
    /// Offset of each cell in the connectivity stream.
    pub locations: NativeArray,
    /// Flattened connectivity stream.
    pub connectivity: NativeArray,
}

/// Element counts that cannot be derived from stored buffers.
#[derive(Clone, Copy, Debug, Default)]
pub struct ElementCounts {
    /// Points, when the dataset has no explicit point buffer.
    pub points: usize,
    /// Cells, when the dataset has no explicit cell storage.
    pub cells: usize,
    /// Table rows.
    pub rows: usize,
    /// Graph vertices.
    pub vertices: usize,
    /// Graph edges.
    pub edges: usize,
}

/// One native dataset: containers per association plus geometry buffers.
#[derive(Debug)]
pub struct DataSetHandle {
    kind: DataSetKind,
    point_data: RwLock<AttributeContainer>,
    cell_data: RwLock<AttributeContainer>,
    field_data: RwLock<AttributeContainer>,
    row_data: RwLock<AttributeContainer>,
    vertex_data: RwLock<AttributeContainer>,
    edge_data: RwLock<AttributeContainer>,
    points: RwLock<Option<NativeArray>>,
    polygons: RwLock<Option<NativeArray>>,
    cells: RwLock<Option<CellStorage>>,
    counts: RwLock<ElementCounts>,
}

impl DataSetHandle {
    /// Empty dataset of the given kind.
    pub fn new(kind: DataSetKind) -> Self {
        DataSetHandle {
            kind,
            point_data: RwLock::new(AttributeContainer::new()),
            cell_data: RwLock::new(AttributeContainer::new()),
            field_data: RwLock::new(AttributeContainer::new()),
            row_data: RwLock::new(AttributeContainer::new()),
            vertex_data: RwLock::new(AttributeContainer::new()),
            edge_data: RwLock::new(AttributeContainer::new()),
            points: RwLock::new(None),
            polygons: RwLock::new(None),
            cells: RwLock::new(None),
            counts: RwLock::new(ElementCounts::default()),
        }
    }

    /// Runtime class.
    #[inline]
    pub fn kind(&self) -> DataSetKind {
        self.kind
    }

    /// Attribute container for an association.
    pub fn attributes(&self, assoc: Association) -> &RwLock<AttributeContainer> {
        match assoc {
            Association::Point => &self.point_data,
            Association::Cell => &self.cell_data,
            Association::Field => &self.field_data,
            Association::Row => &self.row_data,
            Association::Vertex => &self.vertex_data,
            Association::Edge => &self.edge_data,
        }
    }

    /// Point coordinate buffer, if explicit.
    pub fn points(&self) -> Option<NativeArray> {
        self.points.read().clone()
    }

    /// Replace the point buffer and the derived point count.
    pub fn set_points(&self, points: NativeArray) {
        *self.points.write() = Some(points);
    }

    /// Polygon connectivity buffer, if any.
    pub fn polygons(&self) -> Option<NativeArray> {
        self.polygons.read().clone()
    }

    /// Replace the polygon connectivity buffer.
    pub fn set_polygons(&self, polys: NativeArray) {
        *self.polygons.write() = Some(polys);
    }

    /// Explicit cell storage, if any.
    pub fn cells(&self) -> Option<CellStorage> {
        self.cells.read().clone()
    }

    /// Replace the explicit cell storage.
    pub fn set_cells(&self, cells: CellStorage) {
        *self.cells.write() = Some(cells);
    }

    /// Override element counts that are not derivable from buffers.
    pub fn set_counts(&self, counts: ElementCounts) {
        *self.counts.write() = counts;
    }

    /// Stored non-derivable element counts.
    pub fn counts(&self) -> ElementCounts {
        *self.counts.read()
    }

    /// Number of points: explicit point buffer first, stored count otherwise.
    pub fn number_of_points(&self) -> usize {
        match self.points.read().as_ref() {
            Some(p) => p.len(),
            None => self.counts.read().points,
        }
    }

    /// Number of cells: explicit cell storage first, stored count otherwise.
    pub fn number_of_cells(&self) -> usize {
        match self.cells.read().as_ref() {
            Some(c) => c.types.len(),
            None => self.counts.read().cells,
        }
    }

    /// Number of rows: first row-data column, stored count otherwise.
    pub fn number_of_rows(&self) -> usize {
        let rows = self.row_data.read();
        match rows.get_index(0) {
            Some(a) => a.len(),
            None => self.counts.read().rows,
        }
    }

    /// Number of row-data columns.
    pub fn number_of_columns(&self) -> usize {
        self.row_data.read().len()
    }

    /// Number of graph vertices.
    pub fn number_of_vertices(&self) -> usize {
        self.counts.read().vertices
    }

    /// Number of graph edges.
    pub fn number_of_edges(&self) -> usize {
        self.counts.read().edges
    }

    /// Expected tuple count for an association, used by broadcast-fill.
    pub fn expected_count(&self, assoc: Association) -> Option<usize> {
        match assoc {
            Association::Point => Some(self.number_of_points()),
            Association::Cell => Some(self.number_of_cells()),
            Association::Row if self.number_of_columns() > 0 => Some(self.number_of_rows()),
            Association::Vertex => Some(self.number_of_vertices()),
            Association::Edge => Some(self.number_of_edges()),
            _ => None,
        }
    }

    /// Deep structural copy (containers cloned shallowly per array handle).
    pub fn clone_handle(&self) -> DataSetHandle {
        DataSetHandle {
            kind: self.kind,
            point_data: RwLock::new(self.point_data.read().clone()),
            cell_data: RwLock::new(self.cell_data.read().clone()),
            field_data: RwLock::new(self.field_data.read().clone()),
            row_data: RwLock::new(self.row_data.read().clone()),
            vertex_data: RwLock::new(self.vertex_data.read().clone()),
            edge_data: RwLock::new(self.edge_data.read().clone()),
            points: RwLock::new(self.points.read().clone()),
            polygons: RwLock::new(self.polygons.read().clone()),
            cells: RwLock::new(self.cells.read().clone()),
            counts: RwLock::new(*self.counts.read()),
        }
    }
}

/// A native data object: one dataset or a composite tree of blocks.
#[derive(Debug)]
pub enum DataObjectHandle {
    /// A single (leaf) dataset.
    DataSet(DataSetHandle),
    /// A tree of blocks.
    Composite(CompositeHandle),
}

impl DataObjectHandle {
    /// The leaf dataset, when this is not a composite.
    pub fn as_data_set(&self) -> Option<&DataSetHandle> {
        match self {
            DataObjectHandle::DataSet(ds) => Some(ds),
            DataObjectHandle::Composite(_) => None,
        }
    }

    /// The composite tree, when this is one.
    pub fn as_composite(&self) -> Option<&CompositeHandle> {
        match self {
            DataObjectHandle::DataSet(_) => None,
            DataObjectHandle::Composite(c) => Some(c),
        }
    }

    /// Registry name used by the marshal pair.
    pub fn type_name(&self) -> &'static str {
        match self {
            DataObjectHandle::Composite(_) => "CompositeDataSet",
            DataObjectHandle::DataSet(ds) => match ds.kind() {
                DataSetKind::Generic => "DataObject",
                DataSetKind::Table => "Table",
                DataSetKind::PointSet => "PointSet",
                DataSetKind::PolyMesh => "PolyMesh",
                DataSetKind::UnstructuredMesh => "UnstructuredMesh",
                DataSetKind::Graph => "Graph",
                DataSetKind::Molecule => "Molecule",
                DataSetKind::HyperTreeGrid => "HyperTreeGrid",
            },
        }
    }
}

/// Point buffer helper: `(n, 3)` coordinates from flat triples.
pub fn points_from_triples(coords: &[[f64; 3]]) -> NativeArray {
    let flat: Vec<f64> = coords.iter().flatten().copied().collect();
    let values = Values::from_shape_vec_f64(&[coords.len(), 3], flat).expect("triple layout");
    NativeArray::new("Points", values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supports_matrix() {
        assert!(DataSetKind::Table.supports(Association::Row));
        assert!(DataSetKind::Table.supports(Association::Field));
        assert!(!DataSetKind::Table.supports(Association::Point));
        assert!(DataSetKind::PolyMesh.supports(Association::Cell));
        assert!(DataSetKind::HyperTreeGrid.supports(Association::Cell));
        assert!(!DataSetKind::HyperTreeGrid.supports(Association::Point));
        assert!(DataSetKind::Molecule.supports(Association::Vertex));
    }

    #[test]
    fn derived_counts() {
        let ds = DataSetHandle::new(DataSetKind::PointSet);
        ds.set_points(points_from_triples(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]]));
        assert_eq!(ds.number_of_points(), 2);

        let table = DataSetHandle::new(DataSetKind::Table);
        table
            .attributes(Association::Row)
            .write()
            .insert(NativeArray::new("c0", Values::from_vec_f64(vec![1.0, 2.0, 3.0])));
        assert_eq!(table.number_of_rows(), 3);
        assert_eq!(table.number_of_columns(), 1);
    }
}
