//! Typed wrappers over native data objects.
//!
//! [`wrap`] inspects a handle and returns the matching wrapper: tables
//! expose row data, point sets expose points and point/cell data, graphs
//! expose vertex/edge data (molecules rename them atom/bond data), and
//! composites expose union views plus iteration. Wrappers are thin: they
//! hold an `Arc` of the handle and construct attribute views on demand.

use crate::adapter::array::FieldArray;
use crate::adapter::attributes::AttributeView;
use crate::adapter::composite::CompositeArray;
use crate::adapter::composite_attributes::CompositeAttributes;
use crate::adapter::iter::CompositeIter;
use crate::dataset::handle::CellStorage;
use crate::dataset::{Association, DataObjectHandle, DataSetKind, NativeArray};
use crate::error::MeshFieldError;
use once_cell::sync::OnceCell;
use std::sync::Arc;

/// Either face of an attribute view: one dataset or a composite union.
pub enum Attributes {
    /// View over one dataset's container.
    View(AttributeView),
    /// Union view over a composite's leaves.
    Composite(Arc<CompositeAttributes>),
}

impl Attributes {
    /// Array under `name`, or the sentinel.
    pub fn lookup(&self, name: &str) -> FieldArray {
        match self {
            Attributes::View(v) => v.lookup(name),
            Attributes::Composite(c) => c.lookup(name),
        }
    }

    /// Store `value` under `name`.
    ///
    /// # Errors
    /// Propagates the underlying view's append failures.
    pub fn append(&self, value: &FieldArray, name: &str) -> Result<(), MeshFieldError> {
        match self {
            Attributes::View(v) => v.append(value, name),
            Attributes::Composite(c) => c.append(value, name),
        }
    }

    /// Array names in view order.
    pub fn keys(&self) -> Vec<String> {
        match self {
            Attributes::View(v) => v.keys(),
            Attributes::Composite(c) => c.keys(),
        }
    }

    /// True when an array is stored under `name`.
    pub fn contains(&self, name: &str) -> bool {
        match self {
            Attributes::View(v) => v.contains(name),
            Attributes::Composite(c) => c.contains(name),
        }
    }

    /// Snapshot of `(name, array)` pairs.
    pub fn iter(&self) -> Vec<(String, FieldArray)> {
        match self {
            Attributes::View(v) => v.iter(),
            Attributes::Composite(c) => c.iter(),
        }
    }

    /// Shallow-copy every array of `other` into this view.
    pub fn pass_data(&self, other: &Attributes) {
        match (self, other) {
            (Attributes::View(d), Attributes::View(s)) => d.pass_data(s),
            (Attributes::Composite(d), Attributes::Composite(s)) => d.pass_data(s),
            _ => {}
        }
    }
}

/// A wrapped data object of any runtime class.
#[derive(Clone)]
pub enum Wrapped {
    Generic(GenericObject),
    Table(Table),
    PointSet(PointSet),
    PolyMesh(PolyMesh),
    UnstructuredMesh(UnstructuredMesh),
    Graph(Graph),
    Molecule(Molecule),
    HyperTreeGrid(HyperTreeGrid),
    Composite(CompositeDataSet),
}

/// Wrap a native handle in its typed adapter.
pub fn wrap(handle: &Arc<DataObjectHandle>) -> Wrapped {
    match handle.as_ref() {
        DataObjectHandle::Composite(_) => Wrapped::Composite(CompositeDataSet::new(handle.clone())),
        DataObjectHandle::DataSet(ds) => match ds.kind() {
            DataSetKind::Generic => Wrapped::Generic(GenericObject(handle.clone())),
            DataSetKind::Table => Wrapped::Table(Table(handle.clone())),
            DataSetKind::PointSet => Wrapped::PointSet(PointSet(handle.clone())),
            DataSetKind::PolyMesh => Wrapped::PolyMesh(PolyMesh(handle.clone())),
            DataSetKind::UnstructuredMesh => {
                Wrapped::UnstructuredMesh(UnstructuredMesh(handle.clone()))
            }
            DataSetKind::Graph => Wrapped::Graph(Graph(handle.clone())),
            DataSetKind::Molecule => Wrapped::Molecule(Molecule(handle.clone())),
            DataSetKind::HyperTreeGrid => Wrapped::HyperTreeGrid(HyperTreeGrid(handle.clone())),
        },
    }
}

impl Wrapped {
    /// The wrapped native handle.
    pub fn handle(&self) -> &Arc<DataObjectHandle> {
        match self {
            Wrapped::Generic(w) => &w.0,
            Wrapped::Table(w) => &w.0,
            Wrapped::PointSet(w) => &w.0,
            Wrapped::PolyMesh(w) => &w.0,
            Wrapped::UnstructuredMesh(w) => &w.0,
            Wrapped::Graph(w) => &w.0,
            Wrapped::Molecule(w) => &w.0,
            Wrapped::HyperTreeGrid(w) => &w.0,
            Wrapped::Composite(w) => w.handle(),
        }
    }

    /// Attribute view for an association, composite-aware.
    pub fn attributes(&self, assoc: Association) -> Attributes {
        match self {
            Wrapped::Composite(c) => c.attributes(assoc),
            _ => Attributes::View(AttributeView::new(self.handle().clone(), assoc)),
        }
    }

    /// True when this kind of object carries `assoc` data at all (Field for
    /// everyone). For composites, true only when every non-empty leaf does.
    /// A capability check, independent of whether arrays are stored.
    pub fn has_attributes(&self, assoc: Association) -> bool {
        match self {
            Wrapped::Composite(c) => c.has_attributes(assoc),
            _ => match self.handle().as_data_set() {
                Some(ds) => ds.kind().supports(assoc),
                None => false,
            },
        }
    }

    /// Number of elements carrying `assoc` data (summed over leaves for
    /// composites).
    pub fn number_of_elements(&self, assoc: Association) -> usize {
        match self {
            Wrapped::Composite(c) => c.number_of_elements(assoc),
            _ => match self.handle().as_data_set() {
                Some(ds) => match assoc {
                    Association::Point => ds.number_of_points(),
                    Association::Cell => ds.number_of_cells(),
                    Association::Row => ds.number_of_rows(),
                    Association::Vertex => ds.number_of_vertices(),
                    Association::Edge => ds.number_of_edges(),
                    Association::Field => ds.attributes(Association::Field).read().len(),
                },
                None => 0,
            },
        }
    }

    /// Field-data view (universal).
    pub fn field_data(&self) -> Attributes {
        self.attributes(Association::Field)
    }
}

macro_rules! dataset_wrapper {
    ($name:ident) => {
        /// Typed wrapper; see the module docs for the access matrix.
        #[derive(Clone)]
        pub struct $name(Arc<DataObjectHandle>);

        impl $name {
            /// The wrapped native handle.
            pub fn handle(&self) -> &Arc<DataObjectHandle> {
                &self.0
            }

            fn view(&self, assoc: Association) -> AttributeView {
                AttributeView::new(self.0.clone(), assoc)
            }

            /// Field-data view.
            pub fn field_data(&self) -> AttributeView {
                self.view(Association::Field)
            }
        }
    };
}

dataset_wrapper!(GenericObject);
dataset_wrapper!(Table);
dataset_wrapper!(PointSet);
dataset_wrapper!(PolyMesh);
dataset_wrapper!(UnstructuredMesh);
dataset_wrapper!(Graph);
dataset_wrapper!(Molecule);
dataset_wrapper!(HyperTreeGrid);

impl Table {
    /// Per-row columns.
    pub fn row_data(&self) -> AttributeView {
        self.view(Association::Row)
    }

    /// Number of rows.
    pub fn number_of_rows(&self) -> usize {
        self.0.as_data_set().map_or(0, |ds| ds.number_of_rows())
    }

    /// Number of columns.
    pub fn number_of_columns(&self) -> usize {
        self.0.as_data_set().map_or(0, |ds| ds.number_of_columns())
    }
}

macro_rules! point_cell_accessors {
    ($name:ident) => {
        impl $name {
            /// Per-point arrays.
            pub fn point_data(&self) -> AttributeView {
                self.view(Association::Point)
            }

            /// Per-cell arrays.
            pub fn cell_data(&self) -> AttributeView {
                self.view(Association::Cell)
            }

            /// Point coordinates as an adapter array, or the sentinel when
            /// no points are stored.
            pub fn points(&self) -> FieldArray {
                match self.0.as_data_set().and_then(|ds| ds.points()) {
                    Some(native) => crate::adapter::attributes::native_to_field(
                        &native,
                        &self.0,
                        Association::Point,
                    ),
                    None => FieldArray::None,
                }
            }

            /// Replace the point coordinates.
            ///
            /// # Errors
            /// `ShapeMismatch` when a composite value cannot be
            /// concatenated; the sentinel is rejected as `UnsupportedIndex`.
            pub fn set_points(&self, points: &FieldArray) -> Result<(), MeshFieldError> {
                let values = match points {
                    FieldArray::None => {
                        return Err(MeshFieldError::UnsupportedIndex(
                            "cannot store absent points",
                        ));
                    }
                    other => other.to_values()?,
                };
                if let Some(ds) = self.0.as_data_set() {
                    ds.set_points(NativeArray::new("Points", values));
                }
                Ok(())
            }

            /// Replace the point coordinates with a native buffer.
            pub fn set_points_native(&self, points: NativeArray) {
                if let Some(ds) = self.0.as_data_set() {
                    ds.set_points(points);
                }
            }

            /// Number of points.
            pub fn number_of_points(&self) -> usize {
                self.0.as_data_set().map_or(0, |ds| ds.number_of_points())
            }

            /// Number of cells.
            pub fn number_of_cells(&self) -> usize {
                self.0.as_data_set().map_or(0, |ds| ds.number_of_cells())
            }
        }
    };
}

point_cell_accessors!(PointSet);
point_cell_accessors!(PolyMesh);
point_cell_accessors!(UnstructuredMesh);

impl PolyMesh {
    /// Polygon connectivity stream, or the sentinel.
    pub fn polygons(&self) -> FieldArray {
        match self.0.as_data_set().and_then(|ds| ds.polygons()) {
            Some(native) => crate::adapter::attributes::native_to_field(
                &native,
                &self.0,
                Association::Cell,
            ),
            None => FieldArray::None,
        }
    }

    /// Replace the polygon connectivity stream.
    pub fn set_polygons(&self, polys: NativeArray) {
        if let Some(ds) = self.0.as_data_set() {
            ds.set_polygons(polys);
        }
    }
}

impl UnstructuredMesh {
    /// Per-cell type ids, or the sentinel.
    pub fn cell_types(&self) -> FieldArray {
        self.cell_piece(|c| c.types.clone())
    }

    /// Per-cell offsets into the connectivity stream, or the sentinel.
    pub fn cell_locations(&self) -> FieldArray {
        self.cell_piece(|c| c.locations.clone())
    }

    /// Flattened connectivity stream, or the sentinel.
    pub fn cell_connectivity(&self) -> FieldArray {
        self.cell_piece(|c| c.connectivity.clone())
    }

    fn cell_piece(&self, pick: impl Fn(&CellStorage) -> NativeArray) -> FieldArray {
        match self.0.as_data_set().and_then(|ds| ds.cells()) {
            Some(cells) => crate::adapter::attributes::native_to_field(
                &pick(&cells),
                &self.0,
                Association::Cell,
            ),
            None => FieldArray::None,
        }
    }

    /// Replace the explicit cell storage.
    pub fn set_cells(&self, types: NativeArray, locations: NativeArray, connectivity: NativeArray) {
        if let Some(ds) = self.0.as_data_set() {
            ds.set_cells(CellStorage {
                types,
                locations,
                connectivity,
            });
        }
    }
}

macro_rules! graph_accessors {
    ($name:ident) => {
        impl $name {
            /// Per-vertex arrays.
            pub fn vertex_data(&self) -> AttributeView {
                self.view(Association::Vertex)
            }

            /// Per-edge arrays.
            pub fn edge_data(&self) -> AttributeView {
                self.view(Association::Edge)
            }

            /// Number of vertices.
            pub fn number_of_vertices(&self) -> usize {
                self.0.as_data_set().map_or(0, |ds| ds.number_of_vertices())
            }

            /// Number of edges.
            pub fn number_of_edges(&self) -> usize {
                self.0.as_data_set().map_or(0, |ds| ds.number_of_edges())
            }
        }
    };
}

graph_accessors!(Graph);
graph_accessors!(Molecule);

impl Molecule {
    /// Per-atom arrays (the molecule name for vertex data).
    pub fn atom_data(&self) -> AttributeView {
        self.vertex_data()
    }

    /// Per-bond arrays (the molecule name for edge data).
    pub fn bond_data(&self) -> AttributeView {
        self.edge_data()
    }
}

impl HyperTreeGrid {
    /// Per-cell arrays (the only element data a tree grid exposes).
    pub fn cell_data(&self) -> AttributeView {
        self.view(Association::Cell)
    }
}

/// Wrapper over a composite dataset: union attribute views, aggregate
/// counts, composite points and leaf iteration.
#[derive(Clone)]
pub struct CompositeDataSet {
    handle: Arc<DataObjectHandle>,
    point_data: OnceCell<Arc<CompositeAttributes>>,
    cell_data: OnceCell<Arc<CompositeAttributes>>,
    row_data: OnceCell<Arc<CompositeAttributes>>,
    field_data: OnceCell<Arc<CompositeAttributes>>,
}

impl CompositeDataSet {
    /// Wrapper over a composite handle.
    pub fn new(handle: Arc<DataObjectHandle>) -> Self {
        CompositeDataSet {
            handle,
            point_data: OnceCell::new(),
            cell_data: OnceCell::new(),
            row_data: OnceCell::new(),
            field_data: OnceCell::new(),
        }
    }

    /// The wrapped native handle.
    pub fn handle(&self) -> &Arc<DataObjectHandle> {
        &self.handle
    }

    fn cached(&self, assoc: Association) -> Option<&OnceCell<Arc<CompositeAttributes>>> {
        match assoc {
            Association::Point => Some(&self.point_data),
            Association::Cell => Some(&self.cell_data),
            Association::Row => Some(&self.row_data),
            Association::Field => Some(&self.field_data),
            _ => None,
        }
    }

    /// Union attribute view for an association, cached per wrapper.
    pub fn attributes(&self, assoc: Association) -> Attributes {
        match self.cached(assoc) {
            Some(cell) => Attributes::Composite(
                cell.get_or_init(|| {
                    Arc::new(CompositeAttributes::new(self.handle.clone(), assoc))
                })
                .clone(),
            ),
            None => Attributes::Composite(Arc::new(CompositeAttributes::new(
                self.handle.clone(),
                assoc,
            ))),
        }
    }

    /// Union view over per-point arrays.
    pub fn point_data(&self) -> Attributes {
        self.attributes(Association::Point)
    }

    /// Union view over per-cell arrays.
    pub fn cell_data(&self) -> Attributes {
        self.attributes(Association::Cell)
    }

    /// Union view over per-row arrays.
    pub fn row_data(&self) -> Attributes {
        self.attributes(Association::Row)
    }

    /// Union view over per-leaf field data.
    pub fn field_data(&self) -> Attributes {
        self.attributes(Association::Field)
    }

    /// The composite root's own field-data container.
    pub fn global_data(&self) -> AttributeView {
        AttributeView::new(self.handle.clone(), Association::Field)
    }

    /// Per-leaf point coordinates as one composite array. Rebuilt per call
    /// so replaced leaf points are always visible; blocks alias the leaves'
    /// native storage.
    pub fn points(&self) -> FieldArray {
        let Some(comp) = self.handle.as_composite() else {
            return FieldArray::None;
        };
        let blocks: Vec<FieldArray> = comp
            .leaves()
            .into_iter()
            .map(|(_, leaf)| match leaf.as_data_set().and_then(|ds| ds.points()) {
                Some(native) => crate::adapter::attributes::native_to_field(
                    &native,
                    &leaf,
                    Association::Point,
                ),
                None => FieldArray::None,
            })
            .collect();
        FieldArray::Composite(CompositeArray::from_blocks(blocks))
    }

    /// Number of elements for an association, summed over leaves.
    pub fn number_of_elements(&self, assoc: Association) -> usize {
        self.leaves()
            .into_iter()
            .map(|leaf| wrap(&leaf).number_of_elements(assoc))
            .sum()
    }

    /// Total points over all leaves.
    pub fn number_of_points(&self) -> usize {
        self.number_of_elements(Association::Point)
    }

    /// Total cells over all leaves.
    pub fn number_of_cells(&self) -> usize {
        self.number_of_elements(Association::Cell)
    }

    /// True when every non-empty leaf supports `assoc`.
    pub fn has_attributes(&self, assoc: Association) -> bool {
        self.leaves()
            .into_iter()
            .all(|leaf| wrap(&leaf).has_attributes(assoc))
    }

    fn leaves(&self) -> Vec<Arc<DataObjectHandle>> {
        match self.handle.as_composite() {
            Some(c) => c.leaves().into_iter().map(|(_, l)| l).collect(),
            None => Vec::new(),
        }
    }

    /// Iterate non-empty leaves in traversal order, wrapped.
    pub fn iter(&self) -> CompositeIter {
        CompositeIter::new(&self.handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::composite::composite_from_blocks;
    use crate::dataset::handle::points_from_triples;
    use crate::dataset::DataSetHandle;

    fn point_leaf(n: usize) -> Arc<DataObjectHandle> {
        let ds = DataSetHandle::new(DataSetKind::PointSet);
        let coords: Vec<[f64; 3]> = (0..n).map(|i| [i as f64, 0.0, 0.0]).collect();
        ds.set_points(points_from_triples(&coords));
        Arc::new(DataObjectHandle::DataSet(ds))
    }

    #[test]
    fn wrap_dispatches_on_kind() {
        assert!(matches!(wrap(&point_leaf(1)), Wrapped::PointSet(_)));
        let t = Arc::new(DataObjectHandle::DataSet(DataSetHandle::new(
            DataSetKind::Table,
        )));
        assert!(matches!(wrap(&t), Wrapped::Table(_)));
        let g = Arc::new(DataObjectHandle::DataSet(DataSetHandle::new(
            DataSetKind::Graph,
        )));
        assert!(matches!(wrap(&g), Wrapped::Graph(_)));
        let root = composite_from_blocks(vec![Some(point_leaf(1))]);
        assert!(matches!(wrap(&root), Wrapped::Composite(_)));
    }

    #[test]
    fn molecule_renames_graph_views() {
        let m = Arc::new(DataObjectHandle::DataSet(DataSetHandle::new(
            DataSetKind::Molecule,
        )));
        let Wrapped::Molecule(mol) = wrap(&m) else {
            panic!("expected molecule");
        };
        mol.atom_data()
            .append(&FieldArray::from(vec![1.0]), "charge")
            .unwrap();
        assert!(mol.vertex_data().contains("charge"));
    }

    #[test]
    fn composite_points_concatenate_leaves() {
        let root = composite_from_blocks(vec![
            Some(point_leaf(2)),
            None,
            Some(point_leaf(1)),
        ]);
        let Wrapped::Composite(c) = wrap(&root) else {
            panic!("expected composite");
        };
        let pts = c.points();
        assert_eq!(pts.shape(), vec![3, 3]);
        assert_eq!(c.number_of_points(), 3);
    }

    #[test]
    fn has_attributes_is_a_capability_check() {
        // An empty point set still reports Point capability.
        let empty = point_leaf(0);
        assert!(wrap(&empty).has_attributes(Association::Point));
        assert!(wrap(&empty).has_attributes(Association::Field));
        assert!(!wrap(&empty).has_attributes(Association::Row));

        // Every leaf supports Point, stored arrays or not.
        let root = composite_from_blocks(vec![Some(point_leaf(1)), Some(point_leaf(0))]);
        let Wrapped::Composite(c) = wrap(&root) else {
            panic!("expected composite");
        };
        assert!(c.has_attributes(Association::Point));

        // One leaf of an unsupporting kind breaks the capability.
        let t = Arc::new(DataObjectHandle::DataSet(DataSetHandle::new(
            DataSetKind::Table,
        )));
        let mixed = composite_from_blocks(vec![Some(point_leaf(1)), Some(t)]);
        let Wrapped::Composite(c) = wrap(&mixed) else {
            panic!("expected composite");
        };
        assert!(!c.has_attributes(Association::Point));
        assert!(c.has_attributes(Association::Field));
    }

    #[test]
    fn points_setter_round_trip() {
        let leaf = point_leaf(2);
        let Wrapped::PointSet(ps) = wrap(&leaf) else {
            panic!("expected point set");
        };
        let moved = &ps.points() + FieldArray::from(1.0);
        ps.set_points(&moved).unwrap();
        assert_eq!(
            ps.points().to_values().unwrap().iter_real()[0..3],
            [1.0, 1.0, 1.0]
        );
    }
}
