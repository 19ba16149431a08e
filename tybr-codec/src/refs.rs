//! Reference tracking: identity-keyed tables and the cycle pre-scan
//!
//! Three independent tables assign dense, monotonically increasing ids in
//! first-seen order: heap objects (by allocation identity), strings (by
//! content), and byte stores (by allocation identity). Ids are assigned on
//! every full emission regardless of configuration so that the decoder's
//! mirror tables line up for any option combination; the options only gate
//! whether back-reference tags are emitted.

use std::collections::{HashMap, HashSet};

use crate::value::{PropertySlot, Value};

/// Encode-side reference tables
#[derive(Debug, Default)]
pub struct RefTracker {
    objects: HashMap<usize, u32>,
    object_count: u32,
    strings: HashMap<String, u32>,
    string_count: u32,
    buffers: HashMap<usize, u32>,
    buffer_count: u32,
}

impl RefTracker {
    /// Fresh tables for one encode transaction
    pub fn new() -> Self {
        Self::default()
    }

    /// Id previously assigned to a heap object, if any
    pub fn object_id(&self, ptr: usize) -> Option<u32> {
        self.objects.get(&ptr).copied()
    }

    /// Assign the next object id. A re-emission consumes an id but the
    /// first id stays associated with the pointer, so back-references
    /// always resolve to the first full emission.
    pub fn track_object(&mut self, ptr: usize) -> u32 {
        let id = self.object_count;
        self.object_count += 1;
        self.objects.entry(ptr).or_insert(id);
        id
    }

    /// Id previously assigned to string content, if any
    pub fn string_id(&self, s: &str) -> Option<u32> {
        self.strings.get(s).copied()
    }

    /// Assign the next string id
    pub fn track_string(&mut self, s: &str) -> u32 {
        let id = self.string_count;
        self.string_count += 1;
        self.strings.entry(s.to_string()).or_insert(id);
        id
    }

    /// Id previously assigned to a byte store, if any
    pub fn buffer_id(&self, ptr: usize) -> Option<u32> {
        self.buffers.get(&ptr).copied()
    }

    /// Assign the next buffer id
    pub fn track_buffer(&mut self, ptr: usize) -> u32 {
        let id = self.buffer_count;
        self.buffer_count += 1;
        self.buffers.entry(ptr).or_insert(id);
        id
    }
}

fn child_values(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(rc) => rc
            .borrow()
            .elements
            .iter()
            .filter_map(|e| e.clone())
            .collect(),
        Value::Object(rc) => {
            let mut out = Vec::new();
            for (_, prop) in &rc.borrow().properties {
                match &prop.slot {
                    PropertySlot::Data(v) => out.push(v.clone()),
                    PropertySlot::Accessor { getter, setter } => {
                        out.extend(getter.clone());
                        out.extend(setter.clone());
                    }
                }
            }
            out
        }
        Value::Map(rc) => rc
            .borrow()
            .entries
            .iter()
            .flat_map(|(k, v)| [k.clone(), v.clone()])
            .collect(),
        Value::Set(rc) => rc.borrow().entries.clone(),
        Value::Error(rc) => rc.borrow().errors.clone(),
        _ => Vec::new(),
    }
}

fn scan(
    value: &Value,
    on_path: &mut HashSet<usize>,
    visited: &mut HashSet<usize>,
    cycles: &mut HashSet<usize>,
) {
    let ptr = match value.heap_id() {
        Some(ptr) => ptr,
        None => return,
    };
    if on_path.contains(&ptr) {
        cycles.insert(ptr);
        return;
    }
    if !visited.insert(ptr) {
        return;
    }
    on_path.insert(ptr);
    for child in child_values(value) {
        scan(&child, on_path, visited, cycles);
    }
    on_path.remove(&ptr);
}

/// Depth-first pre-scan marking every heap node re-encountered on the
/// current path. The returned set holds the nodes that receive ids before
/// their contents are emitted.
pub fn find_cycles(root: &Value) -> HashSet<usize> {
    let mut on_path = HashSet::new();
    let mut visited = HashSet::new();
    let mut cycles = HashSet::new();
    scan(root, &mut on_path, &mut visited, &mut cycles);
    cycles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ObjectValue;

    #[test]
    fn ids_are_dense_and_first_seen_wins() {
        let mut refs = RefTracker::new();
        assert_eq!(refs.track_object(10), 0);
        assert_eq!(refs.track_object(20), 1);
        // Re-emission consumes an id but keeps the first association
        assert_eq!(refs.track_object(10), 2);
        assert_eq!(refs.object_id(10), Some(0));
        assert_eq!(refs.object_id(20), Some(1));
        assert_eq!(refs.object_id(30), None);
    }

    #[test]
    fn string_ids_key_on_content() {
        let mut refs = RefTracker::new();
        refs.track_string("shared");
        assert_eq!(refs.string_id("shared"), Some(0));
        assert_eq!(refs.string_id("other"), None);
    }

    #[test]
    fn acyclic_graphs_have_an_empty_cycle_set() {
        let shared = Value::array(vec![Value::Number(1.0)]);
        let root = Value::array(vec![shared.clone(), shared]);
        assert!(find_cycles(&root).is_empty());
    }

    #[test]
    fn self_reference_is_detected() {
        let obj = Value::object(ObjectValue::default());
        if let Value::Object(rc) = &obj {
            rc.borrow_mut().set("me", obj.clone());
        }
        let cycles = find_cycles(&obj);
        assert_eq!(cycles.len(), 1);
        assert!(cycles.contains(&obj.heap_id().unwrap()));
    }

    #[test]
    fn two_step_cycle_marks_the_reentry_node() {
        let a = Value::object(ObjectValue::default());
        let b = Value::object(ObjectValue::default());
        if let Value::Object(rc) = &a {
            rc.borrow_mut().set("next", b.clone());
        }
        if let Value::Object(rc) = &b {
            rc.borrow_mut().set("back", a.clone());
        }
        let cycles = find_cycles(&a);
        assert!(cycles.contains(&a.heap_id().unwrap()));
    }

    #[test]
    fn map_keys_participate_in_the_scan() {
        let m = Value::map(vec![]);
        if let Value::Map(rc) = &m {
            rc.borrow_mut().entries.push((m.clone(), Value::Null));
        }
        assert!(!find_cycles(&m).is_empty());
    }
}
