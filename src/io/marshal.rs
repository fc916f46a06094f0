//! Marshal/unmarshal of whole data objects.
//!
//! Handles are converted to a plain serde model (locks flattened, arrays by
//! value), encoded with bincode and wrapped in a [`MarshalEnvelope`] naming
//! the runtime class. Unmarshal resolves that name against the fixed
//! registry of dataset kinds; an unknown or mismatching name is an error,
//! not a fallback.

use crate::dataset::handle::{CellStorage, ElementCounts};
use crate::dataset::{
    Association, AttributeContainer, CompositeHandle, DataObjectHandle, DataSetHandle,
    DataSetKind, NativeArray,
};
use crate::error::MeshFieldError;
use crate::values::Values;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Registry of type names [`unmarshal`] accepts.
const TYPE_REGISTRY: &[&str] = &[
    "DataObject",
    "Table",
    "PointSet",
    "PolyMesh",
    "UnstructuredMesh",
    "Graph",
    "Molecule",
    "HyperTreeGrid",
    "CompositeDataSet",
];

/// A marshalled data object: its registry type name plus the encoded bytes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MarshalEnvelope {
    /// Runtime class name, resolved against the registry on unmarshal.
    pub type_name: String,
    /// bincode-encoded [`DataObjectModel`].
    pub bytes: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct ArrayModel {
    name: String,
    values: Values,
}

#[derive(Serialize, Deserialize)]
struct ContainerModel {
    arrays: Vec<ArrayModel>,
}

#[derive(Serialize, Deserialize)]
struct CountsModel {
    points: usize,
    cells: usize,
    rows: usize,
    vertices: usize,
    edges: usize,
}

#[derive(Serialize, Deserialize)]
struct DataSetModel {
    kind: DataSetKind,
    point_data: ContainerModel,
    cell_data: ContainerModel,
    field_data: ContainerModel,
    row_data: ContainerModel,
    vertex_data: ContainerModel,
    edge_data: ContainerModel,
    points: Option<ArrayModel>,
    polygons: Option<ArrayModel>,
    cells: Option<(ArrayModel, ArrayModel, ArrayModel)>,
    counts: CountsModel,
}

#[derive(Serialize, Deserialize)]
struct CompositeModel {
    blocks: Vec<Option<DataObjectModel>>,
    field_data: ContainerModel,
}

/// Serde mirror of a [`DataObjectHandle`].
#[derive(Serialize, Deserialize)]
enum DataObjectModel {
    DataSet(DataSetModel),
    Composite(CompositeModel),
}

fn container_model(c: &AttributeContainer) -> ContainerModel {
    ContainerModel {
        arrays: c
            .iter()
            .map(|a| ArrayModel {
                name: a.name().to_string(),
                values: a.values().clone(),
            })
            .collect(),
    }
}

fn restore_container(m: ContainerModel, into: &mut AttributeContainer) {
    for a in m.arrays {
        into.insert(NativeArray::new(a.name, a.values));
    }
}

fn array_model(a: &NativeArray) -> ArrayModel {
    ArrayModel {
        name: a.name().to_string(),
        values: a.values().clone(),
    }
}

fn data_set_model(ds: &DataSetHandle) -> DataSetModel {
    let counts = ds.counts();
    DataSetModel {
        kind: ds.kind(),
        point_data: container_model(&ds.attributes(Association::Point).read()),
        cell_data: container_model(&ds.attributes(Association::Cell).read()),
        field_data: container_model(&ds.attributes(Association::Field).read()),
        row_data: container_model(&ds.attributes(Association::Row).read()),
        vertex_data: container_model(&ds.attributes(Association::Vertex).read()),
        edge_data: container_model(&ds.attributes(Association::Edge).read()),
        points: ds.points().as_ref().map(array_model),
        polygons: ds.polygons().as_ref().map(array_model),
        cells: ds.cells().as_ref().map(|c| {
            (
                array_model(&c.types),
                array_model(&c.locations),
                array_model(&c.connectivity),
            )
        }),
        counts: CountsModel {
            points: counts.points,
            cells: counts.cells,
            rows: counts.rows,
            vertices: counts.vertices,
            edges: counts.edges,
        },
    }
}

fn object_model(obj: &DataObjectHandle) -> DataObjectModel {
    match obj {
        DataObjectHandle::DataSet(ds) => DataObjectModel::DataSet(data_set_model(ds)),
        DataObjectHandle::Composite(c) => {
            let blocks = (0..c.num_blocks())
                .map(|i| c.block(i).map(|b| object_model(&b)))
                .collect();
            DataObjectModel::Composite(CompositeModel {
                blocks,
                field_data: container_model(&c.global_data().read()),
            })
        }
    }
}

fn restore_data_set(m: DataSetModel) -> DataSetHandle {
    let ds = DataSetHandle::new(m.kind);
    restore_container(m.point_data, &mut ds.attributes(Association::Point).write());
    restore_container(m.cell_data, &mut ds.attributes(Association::Cell).write());
    restore_container(m.field_data, &mut ds.attributes(Association::Field).write());
    restore_container(m.row_data, &mut ds.attributes(Association::Row).write());
    restore_container(
        m.vertex_data,
        &mut ds.attributes(Association::Vertex).write(),
    );
    restore_container(m.edge_data, &mut ds.attributes(Association::Edge).write());
    if let Some(p) = m.points {
        ds.set_points(NativeArray::new(p.name, p.values));
    }
    if let Some(p) = m.polygons {
        ds.set_polygons(NativeArray::new(p.name, p.values));
    }
    if let Some((t, l, c)) = m.cells {
        ds.set_cells(CellStorage {
            types: NativeArray::new(t.name, t.values),
            locations: NativeArray::new(l.name, l.values),
            connectivity: NativeArray::new(c.name, c.values),
        });
    }
    ds.set_counts(ElementCounts {
        points: m.counts.points,
        cells: m.counts.cells,
        rows: m.counts.rows,
        vertices: m.counts.vertices,
        edges: m.counts.edges,
    });
    ds
}

fn restore_object(m: DataObjectModel) -> DataObjectHandle {
    match m {
        DataObjectModel::DataSet(ds) => DataObjectHandle::DataSet(restore_data_set(ds)),
        DataObjectModel::Composite(c) => {
            let comp = CompositeHandle::new();
            for (i, slot) in c.blocks.into_iter().enumerate() {
                comp.set_block(i, slot.map(|m| Arc::new(restore_object(m))));
            }
            restore_container(c.field_data, &mut comp.global_data().write());
            DataObjectHandle::Composite(comp)
        }
    }
}

/// Encode a data object for transport.
///
/// # Errors
/// [`MeshFieldError::MarshalFailed`] when encoding fails.
pub fn marshal(obj: &DataObjectHandle) -> Result<MarshalEnvelope, MeshFieldError> {
    let model = object_model(obj);
    let bytes = bincode::serialize(&model).map_err(|e| {
        log::error!("marshal of {} failed: {e}", obj.type_name());
        MeshFieldError::MarshalFailed {
            type_name: obj.type_name().to_string(),
            reason: e.to_string(),
        }
    })?;
    Ok(MarshalEnvelope {
        type_name: obj.type_name().to_string(),
        bytes,
    })
}

/// Decode a marshalled data object.
///
/// # Errors
/// [`MeshFieldError::MarshalFailed`] when the envelope names a type outside
/// the registry, when decoding fails, or when the decoded object's class
/// does not match the envelope.
pub fn unmarshal(envelope: &MarshalEnvelope) -> Result<Arc<DataObjectHandle>, MeshFieldError> {
    if !TYPE_REGISTRY.contains(&envelope.type_name.as_str()) {
        return Err(MeshFieldError::MarshalFailed {
            type_name: envelope.type_name.clone(),
            reason: "type name not in registry".into(),
        });
    }
    let model: DataObjectModel = bincode::deserialize(&envelope.bytes).map_err(|e| {
        MeshFieldError::MarshalFailed {
            type_name: envelope.type_name.clone(),
            reason: e.to_string(),
        }
    })?;
    let obj = restore_object(model);
    if obj.type_name() != envelope.type_name {
        return Err(MeshFieldError::MarshalFailed {
            type_name: envelope.type_name.clone(),
            reason: format!("decoded object is a {}", obj.type_name()),
        });
    }
    Ok(Arc::new(obj))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::composite::composite_from_blocks;
    use crate::dataset::handle::points_from_triples;

    fn sample_point_set() -> Arc<DataObjectHandle> {
        let ds = DataSetHandle::new(DataSetKind::PointSet);
        ds.set_points(points_from_triples(&[[0.0, 0.0, 0.0], [1.0, 2.0, 3.0]]));
        ds.attributes(Association::Point)
            .write()
            .insert(NativeArray::new(
                "temp",
                Values::from_vec_f64(vec![10.0, 20.0]),
            ));
        Arc::new(DataObjectHandle::DataSet(ds))
    }

    #[test]
    fn point_set_round_trip() {
        let obj = sample_point_set();
        let env = marshal(&obj).unwrap();
        assert_eq!(env.type_name, "PointSet");
        let back = unmarshal(&env).unwrap();
        let ds = back.as_data_set().unwrap();
        assert_eq!(ds.number_of_points(), 2);
        assert_eq!(
            ds.attributes(Association::Point)
                .read()
                .get("temp")
                .unwrap()
                .values()
                .iter_real(),
            vec![10.0, 20.0]
        );
    }

    #[test]
    fn composite_round_trip_preserves_empty_slots() {
        let root = composite_from_blocks(vec![Some(sample_point_set()), None]);
        root.as_composite()
            .unwrap()
            .global_data()
            .write()
            .insert(NativeArray::new("time", Values::from_vec_f64(vec![0.5])));
        let env = marshal(&root).unwrap();
        assert_eq!(env.type_name, "CompositeDataSet");
        let back = unmarshal(&env).unwrap();
        let comp = back.as_composite().unwrap();
        assert_eq!(comp.num_blocks(), 2);
        assert!(comp.block(0).is_some());
        assert!(comp.block(1).is_none());
        assert_eq!(
            comp.global_data().read().get("time").unwrap().values().iter_real(),
            vec![0.5]
        );
    }

    #[test]
    fn unknown_type_name_is_rejected() {
        let obj = sample_point_set();
        let mut env = marshal(&obj).unwrap();
        env.type_name = "RectilinearGrid".into();
        assert!(matches!(
            unmarshal(&env),
            Err(MeshFieldError::MarshalFailed { .. })
        ));
    }

    #[test]
    fn mismatched_type_name_is_rejected() {
        let obj = sample_point_set();
        let mut env = marshal(&obj).unwrap();
        env.type_name = "Table".into();
        assert!(matches!(
            unmarshal(&env),
            Err(MeshFieldError::MarshalFailed { .. })
        ));
    }
}
