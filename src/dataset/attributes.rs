//! Native named-array containers.
//!
//! An [`AttributeContainer`] maps array names to [`NativeArray`] handles and
//! preserves insertion order for deterministic iteration, the same
//! map-plus-order layout the rest of the crate uses for keyed collections.

use crate::values::Values;
use std::collections::HashMap;
use std::sync::Arc;

/// A named, shared native array.
///
/// Cloning a `NativeArray` clones an `Arc`; the numeric buffer inside is an
/// `ArcArray` so adapter arrays created from it share storage until a
/// computation reallocates.
#[derive(Clone, Debug)]
pub struct NativeArray {
    inner: Arc<NativeArrayInner>,
}

#[derive(Debug)]
struct NativeArrayInner {
    name: String,
    values: Values,
}

impl NativeArray {
    /// New native array with a name and a buffer.
    pub fn new(name: impl Into<String>, values: Values) -> Self {
        NativeArray {
            inner: Arc::new(NativeArrayInner {
                name: name.into(),
                values,
            }),
        }
    }

    /// Array name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Shared numeric buffer.
    #[inline]
    pub fn values(&self) -> &Values {
        &self.inner.values
    }

    /// Number of tuples (leading-axis length).
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.values.leading_len()
    }

    /// True when the array holds no tuples.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Identity test: two handles referring to the same native array.
    #[inline]
    pub fn same(&self, other: &NativeArray) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Keyed collection of named arrays for one association.
///
/// Invariants:
/// - each name appears exactly once in `order`,
/// - `map` contains precisely the names listed in `order`,
/// - replacing an existing name keeps its position.
#[derive(Clone, Debug, Default)]
pub struct AttributeContainer {
    map: HashMap<String, usize>,
    arrays: Vec<NativeArray>,
    order: Vec<String>,
}

impl AttributeContainer {
    /// Empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the array stored under `array.name()`.
    pub fn insert(&mut self, array: NativeArray) {
        let name = array.name().to_string();
        match self.map.get(&name) {
            Some(&i) => self.arrays[i] = array,
            None => {
                self.map.insert(name.clone(), self.arrays.len());
                self.order.push(name);
                self.arrays.push(array);
            }
        }
        debug_assert_eq!(self.order.len(), self.arrays.len());
    }

    /// Look up an array by name.
    #[inline]
    pub fn get(&self, name: &str) -> Option<&NativeArray> {
        self.map.get(name).map(|&i| &self.arrays[i])
    }

    /// Look up an array by insertion position.
    #[inline]
    pub fn get_index(&self, index: usize) -> Option<&NativeArray> {
        self.arrays.get(index)
    }

    /// Remove an array by name, preserving the order of the rest.
    pub fn remove(&mut self, name: &str) -> Option<NativeArray> {
        let i = self.map.remove(name)?;
        self.order.remove(i);
        let removed = self.arrays.remove(i);
        for v in self.map.values_mut() {
            if *v > i {
                *v -= 1;
            }
        }
        Some(removed)
    }

    /// Array names in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Number of arrays.
    #[inline]
    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    /// True when the container holds no arrays.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }

    /// Borrowing iterator over arrays in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &NativeArray> {
        self.arrays.iter()
    }

    /// Shallow copy of every array of `other` into this container.
    pub fn pass_data(&mut self, other: &AttributeContainer) {
        for a in other.iter() {
            self.insert(a.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str, v: Vec<f64>) -> NativeArray {
        NativeArray::new(name, Values::from_vec_f64(v))
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut c = AttributeContainer::new();
        c.insert(named("a", vec![1.0]));
        c.insert(named("b", vec![2.0]));
        c.insert(named("a", vec![3.0]));
        assert_eq!(c.keys(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(c.get("a").unwrap().values().iter_real(), vec![3.0]);
    }

    #[test]
    fn remove_keeps_order() {
        let mut c = AttributeContainer::new();
        c.insert(named("a", vec![1.0]));
        c.insert(named("b", vec![2.0]));
        c.insert(named("c", vec![3.0]));
        c.remove("b");
        assert_eq!(c.keys(), vec!["a".to_string(), "c".to_string()]);
        assert_eq!(c.get("c").unwrap().values().iter_real(), vec![3.0]);
    }

    #[test]
    fn pass_data_is_shallow() {
        let mut src = AttributeContainer::new();
        src.insert(named("t", vec![1.0, 2.0]));
        let mut dst = AttributeContainer::new();
        dst.pass_data(&src);
        assert!(dst.get("t").unwrap().same(src.get("t").unwrap()));
    }
}
