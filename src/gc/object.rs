//! Heap objects and the slot arena that owns them
//!
//! Objects are addressed by `ObjectId`, a slot index plus a generation. When a
//! slot is freed its generation is bumped, so ids held past the object's death
//! resolve to `None` instead of aliasing whatever reuses the slot.

use super::path::Path;
use crate::value::Value;
use std::fmt;

/// Stable handle to a heap object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId {
    index: u32,
    generation: u32,
}

impl ObjectId {
    /// Slot index in the arena
    #[inline]
    pub const fn index(self) -> usize {
        self.index as usize
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// A value owned by the collector
#[derive(Debug, Clone)]
pub struct HeapObject {
    pub value: Value,
    pub(crate) marked: bool,
    references: Vec<ObjectId>,
    pub path: Option<Path>,
}

impl HeapObject {
    /// Create an unmarked object with no edges and no path
    pub fn new(value: Value) -> Self {
        HeapObject {
            value,
            marked: false,
            references: Vec::new(),
            path: None,
        }
    }

    /// Create an object bound to `path`
    pub fn with_path(value: Value, path: Path) -> Self {
        HeapObject {
            path: Some(path),
            ..HeapObject::new(value)
        }
    }

    /// Set the single outgoing edge
    pub fn with_reference(mut self, target: ObjectId) -> Self {
        self.references.clear();
        self.references.push(target);
        self
    }

    /// Set all outgoing edges
    pub fn with_references(mut self, targets: impl IntoIterator<Item = ObjectId>) -> Self {
        self.references = targets.into_iter().collect();
        self
    }

    /// Attach a path
    pub fn bound_to(mut self, path: Path) -> Self {
        self.path = Some(path);
        self
    }

    /// First outgoing edge, if any
    #[inline]
    pub fn reference(&self) -> Option<ObjectId> {
        self.references.first().copied()
    }

    /// All outgoing edges
    #[inline]
    pub fn references(&self) -> &[ObjectId] {
        &self.references
    }

    pub fn add_reference(&mut self, target: ObjectId) {
        self.references.push(target);
    }

    /// Drop every edge to `target`
    pub fn remove_reference(&mut self, target: ObjectId) {
        self.references.retain(|&id| id != target);
    }

    #[inline]
    pub fn is_marked(&self) -> bool {
        self.marked
    }

    #[inline]
    pub fn has_path(&self, path: &Path) -> bool {
        self.path.as_ref() == Some(path)
    }
}

#[derive(Debug)]
enum Slot {
    Occupied { generation: u32, object: HeapObject },
    Vacant { generation: u32 },
}

/// Slot arena backing every heap object
#[derive(Debug, Default)]
pub(crate) struct Arena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl Arena {
    pub fn with_capacity(capacity: usize) -> Self {
        Arena {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Store an object, reusing a vacant slot when one exists
    pub fn insert(&mut self, object: HeapObject) -> ObjectId {
        self.live += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            let generation = match slot {
                Slot::Vacant { generation } => *generation,
                Slot::Occupied { .. } => unreachable!("free list points at an occupied slot"),
            };
            *slot = Slot::Occupied { generation, object };
            return ObjectId { index, generation };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot::Occupied {
            generation: 0,
            object,
        });
        ObjectId {
            index,
            generation: 0,
        }
    }

    /// Free the slot behind `id`, returning its object
    pub fn remove(&mut self, id: ObjectId) -> Option<HeapObject> {
        let slot = self.slots.get_mut(id.index())?;
        match slot {
            Slot::Occupied { generation, .. } if *generation == id.generation => {
                let next = Slot::Vacant {
                    generation: generation.wrapping_add(1),
                };
                let old = std::mem::replace(slot, next);
                self.free.push(id.index);
                self.live -= 1;
                match old {
                    Slot::Occupied { object, .. } => Some(object),
                    Slot::Vacant { .. } => None,
                }
            }
            _ => None,
        }
    }

    pub fn get(&self, id: ObjectId) -> Option<&HeapObject> {
        match self.slots.get(id.index())? {
            Slot::Occupied { generation, object } if *generation == id.generation => Some(object),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut HeapObject> {
        match self.slots.get_mut(id.index())? {
            Slot::Occupied { generation, object } if *generation == id.generation => Some(object),
            _ => None,
        }
    }

    #[inline]
    pub fn contains(&self, id: ObjectId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live objects
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    /// Iterate over live objects with their ids
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &HeapObject)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| match slot {
            Slot::Occupied { generation, object } => Some((
                ObjectId {
                    index: index as u32,
                    generation: *generation,
                },
                object,
            )),
            Slot::Vacant { .. } => None,
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut HeapObject> {
        self.slots.iter_mut().filter_map(|slot| match slot {
            Slot::Occupied { object, .. } => Some(object),
            Slot::Vacant { .. } => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_builders() {
        let mut arena = Arena::default();
        let target = arena.insert(HeapObject::new(Value::int(1)));

        let obj = HeapObject::with_path(Value::int(2), Path::local(0, 0)).with_reference(target);
        assert_eq!(obj.reference(), Some(target));
        assert!(obj.has_path(&Path::local(0, 0)));
        assert!(!obj.is_marked());

        let obj = HeapObject::new(Value::nil()).with_references([target, target]);
        assert_eq!(obj.references().len(), 2);
    }

    #[test]
    fn test_remove_reference() {
        let mut arena = Arena::default();
        let a = arena.insert(HeapObject::new(Value::nil()));
        let b = arena.insert(HeapObject::new(Value::nil()));

        let mut obj = HeapObject::new(Value::nil()).with_references([a, b, a]);
        obj.remove_reference(a);
        assert_eq!(obj.references(), &[b]);
    }

    #[test]
    fn test_arena_insert_get() {
        let mut arena = Arena::with_capacity(4);
        let id = arena.insert(HeapObject::new(Value::int(7)));
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.get(id).unwrap().value, Value::int(7));

        arena.get_mut(id).unwrap().value = Value::int(8);
        assert_eq!(arena.get(id).unwrap().value.to_i64(), Some(8));
    }

    #[test]
    fn test_stale_id_after_reuse() {
        let mut arena = Arena::default();
        let old = arena.insert(HeapObject::new(Value::int(1)));
        assert!(arena.remove(old).is_some());
        assert!(arena.remove(old).is_none());
        assert_eq!(arena.len(), 0);

        let new = arena.insert(HeapObject::new(Value::int(2)));
        assert_eq!(new.index(), old.index());
        assert_ne!(new, old);
        assert!(arena.get(old).is_none());
        assert!(arena.contains(new));
    }

    #[test]
    fn test_iter_skips_vacant() {
        let mut arena = Arena::default();
        let a = arena.insert(HeapObject::new(Value::int(1)));
        let _b = arena.insert(HeapObject::new(Value::int(2)));
        arena.remove(a);

        let values: Vec<_> = arena.iter().map(|(_, o)| o.value.clone()).collect();
        assert_eq!(values, vec![Value::int(2)]);
        assert_eq!(arena.iter_mut().count(), 1);
    }
}
