//! Mark-sweep garbage collector
//!
//! The collector keeps two lists over one object arena:
//! - `objects`: every heap object registered for escaped values
//! - `roots`: objects anchored by live stack slots and globals
//!
//! A cycle works in two phases:
//! 1. Mark: walk from every root along reference edges, setting mark bits
//! 2. Sweep: keep marked objects, free the rest, clear every mark bit
//!
//! Roots are never swept while they are in the root list. A removed root is
//! reclaimed by the next sweep unless something live still points at it.

use super::object::{Arena, HeapObject, ObjectId};
use super::path::Path;
use crate::value::Value;
use std::fmt;

/// Collector tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcConfig {
    /// Arena slots reserved up front
    pub initial_capacity: usize,
    /// Allocations between automatic collections
    pub threshold: usize,
}

impl Default for GcConfig {
    fn default() -> Self {
        GcConfig {
            initial_capacity: 256,
            threshold: 1024,
        }
    }
}

/// Statistics about a GC run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Registered objects before collection
    pub objects_before: usize,
    /// Registered objects after collection
    pub objects_after: usize,
    /// Roots traced from
    pub roots: usize,
    /// Objects marked reachable (roots included)
    pub marked: usize,
    /// Arena slots freed
    pub freed: usize,
}

/// Caller-contract violations reported by the collector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GcError {
    /// `bind_pending_root` found no root without a path
    NoPendingRoot(Path),
    /// The id does not name a live object
    StaleObject(ObjectId),
}

impl fmt::Display for GcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GcError::NoPendingRoot(path) => {
                write!(f, "no pending root to bind to {}", path)
            }
            GcError::StaleObject(id) => write!(f, "object {} is not live", id),
        }
    }
}

impl std::error::Error for GcError {}

/// Object registry and root set for one VM instance
#[derive(Debug)]
pub struct Collector {
    arena: Arena,
    objects: Vec<ObjectId>,
    roots: Vec<ObjectId>,
    config: GcConfig,
    /// Objects created since the last cycle
    allocated: usize,
    cycles: usize,
}

impl Default for Collector {
    fn default() -> Self {
        Collector::new()
    }
}

impl Collector {
    /// Create an empty registry
    pub fn new() -> Self {
        Collector::with_config(GcConfig::default())
    }

    pub fn with_config(config: GcConfig) -> Self {
        Collector {
            arena: Arena::with_capacity(config.initial_capacity),
            objects: Vec::new(),
            roots: Vec::new(),
            config,
            allocated: 0,
            cycles: 0,
        }
    }

    #[inline]
    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    /// Add an object for an escaped value
    ///
    /// The object starts unmarked and is not a root; it survives a cycle only
    /// if some root reaches it.
    pub fn register(&mut self, object: HeapObject) -> ObjectId {
        self.check_edges(&object);
        let id = self.insert(object);
        self.objects.push(id);
        log::trace!("register {} ({} objects)", id, self.objects.len());
        id
    }

    /// Add an object to the root set
    ///
    /// The object may still lack a path; see [`Collector::bind_pending_root`].
    pub fn add_root(&mut self, object: HeapObject) -> ObjectId {
        self.check_edges(&object);
        let id = self.insert(object);
        self.roots.push(id);
        log::trace!("add root {} ({} roots)", id, self.roots.len());
        id
    }

    /// Give the path-less root its path
    ///
    /// Under correct use at most one root is pending at a time. If several
    /// are, the first one in root order is bound.
    pub fn bind_pending_root(&mut self, path: Path) -> Result<ObjectId, GcError> {
        let mut pending = self
            .roots
            .iter()
            .copied()
            .filter(|&id| self.arena.get(id).is_some_and(|o| o.path.is_none()));

        let Some(id) = pending.next() else {
            return Err(GcError::NoPendingRoot(path));
        };
        let extra = pending.count();
        if extra > 0 {
            log::warn!("{} pending roots outstanding while binding {}", extra + 1, path);
        }

        log::trace!("bind root {} to {}", id, path);
        let object = self.arena.get_mut(id).ok_or(GcError::StaleObject(id))?;
        object.path = Some(path);
        Ok(id)
    }

    /// Remove the first root bound to `path`
    ///
    /// Only the root list changes. The object itself stays until a sweep
    /// finds it unreachable. Returns the removed root, or `None` if no root
    /// has this path.
    pub fn remove_root(&mut self, path: &Path) -> Option<ObjectId> {
        let pos = self
            .roots
            .iter()
            .position(|&id| self.arena.get(id).is_some_and(|o| o.has_path(path)))?;
        let id = self.roots.remove(pos);
        log::trace!("remove root {} at {}", id, path);
        Some(id)
    }

    /// Run one full mark-sweep cycle
    pub fn collect(&mut self) -> GcStats {
        let mut stats = GcStats {
            objects_before: self.objects.len(),
            roots: self.roots.len(),
            ..GcStats::default()
        };

        #[cfg(feature = "dump")]
        self.dump();

        stats.marked = self.mark();
        stats.freed = self.sweep();
        stats.objects_after = self.objects.len();

        self.allocated = 0;
        self.cycles += 1;

        log::debug!(
            "gc cycle {}: {} roots, {} marked, {} -> {} objects, {} freed",
            self.cycles,
            stats.roots,
            stats.marked,
            stats.objects_before,
            stats.objects_after,
            stats.freed
        );
        stats
    }

    /// Whether enough allocation happened to warrant a cycle
    pub fn should_collect(&self) -> bool {
        cfg!(feature = "gc-stress") || self.allocated >= self.config.threshold
    }

    /// Collect if [`Collector::should_collect`] says so
    pub fn maybe_collect(&mut self) -> Option<GcStats> {
        if self.should_collect() {
            Some(self.collect())
        } else {
            None
        }
    }

    /// Set the mark bit on everything reachable from the roots
    fn mark(&mut self) -> usize {
        let mut worklist: Vec<ObjectId> = self.roots.clone();
        let mut marked = 0;

        while let Some(id) = worklist.pop() {
            let Some(object) = self.arena.get_mut(id) else {
                debug_assert!(false, "dangling reference to {}", id);
                continue;
            };
            if object.marked {
                continue;
            }
            object.marked = true;
            marked += 1;
            worklist.extend_from_slice(object.references());
        }

        log::trace!("mark: {} reachable", marked);
        marked
    }

    /// Drop unmarked objects and reset mark bits
    fn sweep(&mut self) -> usize {
        let arena = &self.arena;
        self.objects
            .retain(|&id| arena.get(id).is_some_and(|o| o.marked));

        let dead: Vec<ObjectId> = self
            .arena
            .iter()
            .filter(|(_, o)| !o.marked)
            .map(|(id, _)| id)
            .collect();
        for &id in &dead {
            log::trace!("sweep {}", id);
            self.arena.remove(id);
        }

        for object in self.arena.iter_mut() {
            object.marked = false;
        }
        dead.len()
    }

    fn insert(&mut self, object: HeapObject) -> ObjectId {
        self.allocated += 1;
        self.arena.insert(object)
    }

    fn check_edges(&self, object: &HeapObject) {
        for &target in object.references() {
            debug_assert!(
                self.arena.contains(target),
                "reference to {} outside the registry",
                target
            );
        }
    }

    /// Get a live object
    pub fn get(&self, id: ObjectId) -> Option<&HeapObject> {
        self.arena.get(id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut HeapObject> {
        self.arena.get_mut(id)
    }

    /// Replace the value stored in an object
    pub fn set_value(&mut self, id: ObjectId, value: Value) -> Result<(), GcError> {
        let object = self.arena.get_mut(id).ok_or(GcError::StaleObject(id))?;
        object.value = value;
        Ok(())
    }

    /// Add an edge `from -> to`; both must be live
    pub fn add_reference(&mut self, from: ObjectId, to: ObjectId) -> Result<(), GcError> {
        if !self.arena.contains(to) {
            return Err(GcError::StaleObject(to));
        }
        let object = self.arena.get_mut(from).ok_or(GcError::StaleObject(from))?;
        object.add_reference(to);
        Ok(())
    }

    /// Diagnostic lookup of a registered object by path
    ///
    /// Linear scan. Evaluator code reaches values through roots; this is
    /// meant for tests and debugging output.
    pub fn lookup_object(&self, path: &Path) -> Option<&HeapObject> {
        self.objects
            .iter()
            .filter_map(|&id| self.arena.get(id))
            .find(|o| o.has_path(path))
    }

    /// Diagnostic lookup of a root by path
    pub fn lookup_root(&self, path: &Path) -> Option<&HeapObject> {
        self.find_root(path).and_then(|id| self.arena.get(id))
    }

    /// Id of the first root bound to `path`
    pub fn find_root(&self, path: &Path) -> Option<ObjectId> {
        self.roots
            .iter()
            .copied()
            .find(|&id| self.arena.get(id).is_some_and(|o| o.has_path(path)))
    }

    /// Registered objects, in registration order
    pub fn objects(&self) -> impl Iterator<Item = (ObjectId, &HeapObject)> {
        self.objects
            .iter()
            .filter_map(|&id| self.arena.get(id).map(|o| (id, o)))
    }

    /// Current roots, in insertion order
    pub fn roots(&self) -> impl Iterator<Item = (ObjectId, &HeapObject)> {
        self.roots
            .iter()
            .filter_map(|&id| self.arena.get(id).map(|o| (id, o)))
    }

    #[inline]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    #[inline]
    pub fn root_count(&self) -> usize {
        self.roots.len()
    }

    /// Live arena slots, roots and not-yet-swept objects included
    #[inline]
    pub fn live_count(&self) -> usize {
        self.arena.len()
    }

    /// Completed cycles
    #[inline]
    pub fn cycles(&self) -> usize {
        self.cycles
    }

    #[cfg(feature = "dump")]
    fn dump(&self) {
        for (id, root) in self.roots() {
            log::trace!("  root {} {:?} = {}", id, root.path, root.value);
        }
        for (id, object) in self.objects() {
            log::trace!(
                "  object {} {:?} = {} -> {:?}",
                id,
                object.path,
                object.value,
                object.references()
            );
        }
    }
}
