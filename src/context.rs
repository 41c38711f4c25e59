//! VM memory context
//!
//! The Context is the evaluator's entry point to memory management. It owns
//! the collector for one VM instance and the allocation plan produced by
//! escape analysis, and keeps roots in step with stack frames and globals.

use crate::escape::{EscapeAnalyzer, EscapeMode, EscapeSet};
use crate::gc::{Collector, GcConfig, GcError, GcStats, HeapObject, ObjectId, Path};
use crate::syntax::parser::{ParseError, parse_file};
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;

/// Where a local variable lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    /// Held directly in its stack slot's root
    Stack,
    /// Held in a registered heap object the slot's root points at
    Heap,
}

/// Error from a context operation
#[derive(Debug)]
pub enum ContextError {
    /// Source could not be parsed
    Parse(ParseError),
    /// Collector contract violation
    Gc(GcError),
    /// A local operation ran with no active frame
    NoFrame,
    /// No local with this name in the active frame
    UnknownLocal(String),
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextError::Parse(e) => write!(f, "Parse error: {}", e),
            ContextError::Gc(e) => write!(f, "GC error: {}", e),
            ContextError::NoFrame => write!(f, "No active stack frame"),
            ContextError::UnknownLocal(name) => write!(f, "Unknown local: {}", name),
        }
    }
}

impl std::error::Error for ContextError {}

impl From<ParseError> for ContextError {
    fn from(e: ParseError) -> Self {
        ContextError::Parse(e)
    }
}

impl From<GcError> for ContextError {
    fn from(e: GcError) -> Self {
        ContextError::Gc(e)
    }
}

/// One activation record
#[derive(Debug)]
struct Frame {
    func: String,
    /// Local names by slot index
    slots: Vec<String>,
}

/// Memory usage statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStats {
    /// Registered heap objects
    pub objects: usize,
    /// Current roots
    pub roots: usize,
    /// Roots bound to globals
    pub globals: usize,
    /// Live arena slots, including garbage not yet swept
    pub live: usize,
    /// Active stack frames
    pub frames: usize,
}

/// Memory context for one VM instance
pub struct Context {
    /// Heap objects and roots
    collector: Collector,

    analyzer: EscapeAnalyzer,

    /// Escaping variables per prepared function
    plans: HashMap<String, EscapeSet>,

    frames: Vec<Frame>,
}

impl Default for Context {
    fn default() -> Self {
        Context::new()
    }
}

impl Context {
    /// Create a context with default collector settings and legacy analysis
    pub fn new() -> Self {
        Context::with_config(GcConfig::default(), EscapeMode::Legacy)
    }

    pub fn with_config(config: GcConfig, mode: EscapeMode) -> Self {
        Context {
            collector: Collector::with_config(config),
            analyzer: EscapeAnalyzer::new(mode),
            plans: HashMap::new(),
            frames: Vec::new(),
        }
    }

    /// Analyze every function in `source` and record its allocation plan
    ///
    /// Returns the number of functions prepared. Statements the parser
    /// skipped are logged; a function it dropped stays unprepared.
    pub fn prepare(&mut self, source: &str) -> Result<usize, ContextError> {
        let file = parse_file(source)?;
        for err in &file.errors {
            log::warn!("prepare: {}", err);
        }
        for func in &file.funcs {
            let escaping = EscapeSet::from(self.analyzer.analyze(func));
            self.plans.insert(func.name.name.clone(), escaping);
        }
        Ok(file.funcs.len())
    }

    /// Escaping variables of a prepared function
    pub fn plan(&self, func: &str) -> Option<&EscapeSet> {
        self.plans.get(func)
    }

    /// Storage class for `var` in `func`
    ///
    /// Functions that were never prepared get heap storage for everything.
    pub fn storage_class(&self, func: &str, var: &str) -> StorageClass {
        match self.plans.get(func) {
            Some(plan) if !plan.contains(var) => StorageClass::Stack,
            _ => StorageClass::Heap,
        }
    }

    /// Enter a call of `func`; returns the new frame's index
    pub fn push_frame(&mut self, func: &str) -> usize {
        self.frames.push(Frame {
            func: func.to_string(),
            slots: Vec::new(),
        });
        self.frames.len() - 1
    }

    /// Leave the innermost frame, unrooting all its slots
    pub fn pop_frame(&mut self) -> Result<(), ContextError> {
        let frame = self.frames.pop().ok_or(ContextError::NoFrame)?;
        let index = self.frames.len();
        for slot in 0..frame.slots.len() {
            self.collector.remove_root(&Path::local(index, slot));
        }
        debug_assert!(
            !self
                .collector
                .roots()
                .any(|(_, root)| root.path.as_ref().and_then(Path::frame) == Some(index)),
            "roots of frame {} outlived it",
            index
        );
        log::trace!("pop frame {} ({}), {} slots", index, frame.func, frame.slots.len());
        Ok(())
    }

    /// Declare a local in the innermost frame and root it
    pub fn declare_local(&mut self, name: &str, value: Value) -> Result<Path, ContextError> {
        let (index, path) = self.next_slot()?;
        let class = self.commit_slot(index, name);
        match class {
            StorageClass::Stack => {
                self.collector.add_root(HeapObject::with_path(value, path.clone()));
            }
            StorageClass::Heap => {
                let cell = self
                    .collector
                    .register(HeapObject::with_path(value, path.clone()));
                self.collector
                    .add_root(HeapObject::with_path(Value::Nil, path.clone()).with_reference(cell));
            }
        }
        Ok(path)
    }

    /// Root a value whose binding is not known yet
    ///
    /// Must be followed by [`Context::bind_pending_local`] before the next
    /// collection.
    pub fn alloc_pending(&mut self, value: Value) -> ObjectId {
        self.collector.add_root(HeapObject::new(value))
    }

    /// Bind the pending root as local `name` in the innermost frame
    ///
    /// On error the frame is left as it was.
    pub fn bind_pending_local(&mut self, name: &str) -> Result<Path, ContextError> {
        let (index, path) = self.next_slot()?;
        let root = self.collector.bind_pending_root(path.clone())?;
        let class = self.commit_slot(index, name);

        if class == StorageClass::Heap {
            // Move the value into its own heap cell
            let value = self
                .collector
                .get_mut(root)
                .map(|o| std::mem::take(&mut o.value))
                .ok_or(GcError::StaleObject(root))?;
            let cell = self
                .collector
                .register(HeapObject::with_path(value, path.clone()));
            self.collector.add_reference(root, cell)?;
        }
        Ok(path)
    }

    /// Read a local of the innermost frame
    pub fn load_local(&self, name: &str) -> Result<&Value, ContextError> {
        let id = self.local_root(name)?;
        let root = self.collector.get(id).ok_or(GcError::StaleObject(id))?;
        match root.reference() {
            Some(cell) => Ok(&self.collector.get(cell).ok_or(GcError::StaleObject(cell))?.value),
            None => Ok(&root.value),
        }
    }

    /// Overwrite a local of the innermost frame
    pub fn store_local(&mut self, name: &str, value: Value) -> Result<(), ContextError> {
        let id = self.local_root(name)?;
        let target = self
            .collector
            .get(id)
            .ok_or(GcError::StaleObject(id))?
            .reference()
            .unwrap_or(id);
        self.collector.set_value(target, value)?;
        Ok(())
    }

    /// Root a global binding
    pub fn define_global(&mut self, name: &str, value: Value) -> Path {
        let path = Path::global(name);
        self.collector.add_root(HeapObject::with_path(value, path.clone()));
        path
    }

    /// Unroot a global binding; returns false if it did not exist
    pub fn drop_global(&mut self, name: &str) -> bool {
        self.collector.remove_root(&Path::global(name)).is_some()
    }

    /// Read a global binding
    pub fn load_global(&self, name: &str) -> Option<&Value> {
        self.collector
            .lookup_root(&Path::global(name))
            .map(|root| &root.value)
    }

    /// Run the garbage collector
    pub fn gc(&mut self) -> GcStats {
        self.collector.collect()
    }

    /// Run the garbage collector if allocation pressure calls for it
    pub fn maybe_gc(&mut self) -> Option<GcStats> {
        self.collector.maybe_collect()
    }

    /// Get memory usage statistics
    pub fn memory_stats(&self) -> MemoryStats {
        MemoryStats {
            objects: self.collector.object_count(),
            roots: self.collector.root_count(),
            globals: self
                .collector
                .roots()
                .filter(|(_, root)| root.path.as_ref().is_some_and(Path::is_global))
                .count(),
            live: self.collector.live_count(),
            frames: self.frames.len(),
        }
    }

    pub fn collector(&self) -> &Collector {
        &self.collector
    }

    pub fn collector_mut(&mut self) -> &mut Collector {
        &mut self.collector
    }

    /// Path the next local of the innermost frame will get
    fn next_slot(&self) -> Result<(usize, Path), ContextError> {
        let index = self.frames.len().checked_sub(1).ok_or(ContextError::NoFrame)?;
        let slot = self.frames[index].slots.len();
        Ok((index, Path::local(index, slot)))
    }

    /// Record `name` in the slot [`Context::next_slot`] handed out
    fn commit_slot(&mut self, index: usize, name: &str) -> StorageClass {
        let frame = &mut self.frames[index];
        let slot = frame.slots.len();
        frame.slots.push(name.to_string());

        let func = frame.func.clone();
        let class = self.storage_class(&func, name);
        log::trace!("{}: {} -> frame[{}].slot[{}] ({:?})", func, name, index, slot, class);
        class
    }

    /// Root of the innermost binding of `name`
    fn local_root(&self, name: &str) -> Result<ObjectId, ContextError> {
        let index = self.frames.len().checked_sub(1).ok_or(ContextError::NoFrame)?;
        let slot = self.frames[index]
            .slots
            .iter()
            .rposition(|s| s == name)
            .ok_or_else(|| ContextError::UnknownLocal(name.to_string()))?;
        self.collector
            .find_root(&Path::local(index, slot))
            .ok_or_else(|| ContextError::UnknownLocal(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "
package main

func leak() *int {
    var kept int
    var scratch int
    scratch = 1
    return &kept
}

func plain(n int) int {
    var total int
    total = n
    return total
}
";

    fn prepared() -> Context {
        let mut ctx = Context::new();
        assert_eq!(ctx.prepare(SOURCE).unwrap(), 2);
        ctx
    }

    #[test]
    fn test_storage_class_from_plan() {
        let ctx = prepared();
        assert_eq!(ctx.storage_class("leak", "kept"), StorageClass::Heap);
        assert_eq!(ctx.storage_class("leak", "scratch"), StorageClass::Stack);
        assert_eq!(ctx.storage_class("plain", "total"), StorageClass::Stack);
        assert!(ctx.plan("leak").unwrap().contains("kept"));
    }

    #[test]
    fn test_unprepared_function_is_heap() {
        let ctx = prepared();
        assert_eq!(ctx.storage_class("unknown", "x"), StorageClass::Heap);
    }

    #[test]
    fn test_frame_lifecycle() {
        let mut ctx = prepared();
        ctx.push_frame("leak");
        ctx.declare_local("kept", Value::int(1)).unwrap();
        ctx.declare_local("scratch", Value::int(2)).unwrap();

        let stats = ctx.memory_stats();
        assert_eq!(stats.objects, 1); // only `kept` has a heap cell
        assert_eq!(stats.roots, 2);

        ctx.gc();
        assert_eq!(ctx.memory_stats().objects, 1);
        assert_eq!(ctx.load_local("kept").unwrap(), &Value::int(1));

        ctx.pop_frame().unwrap();
        assert_eq!(ctx.memory_stats().roots, 0);
        ctx.gc();
        let stats = ctx.memory_stats();
        assert_eq!(stats.objects, 0);
        assert_eq!(stats.live, 0);
        assert_eq!(stats.frames, 0);
    }

    #[test]
    fn test_load_and_store() {
        let mut ctx = prepared();
        ctx.push_frame("leak");
        ctx.declare_local("kept", Value::int(1)).unwrap();
        ctx.declare_local("scratch", Value::int(2)).unwrap();

        ctx.store_local("kept", Value::int(10)).unwrap();
        ctx.store_local("scratch", Value::int(20)).unwrap();
        assert_eq!(ctx.load_local("kept").unwrap().to_i64(), Some(10));
        assert_eq!(ctx.load_local("scratch").unwrap().to_i64(), Some(20));

        assert!(matches!(
            ctx.load_local("missing"),
            Err(ContextError::UnknownLocal(_))
        ));
    }

    #[test]
    fn test_nested_frames() {
        let mut ctx = prepared();
        ctx.push_frame("plain");
        ctx.declare_local("total", Value::int(1)).unwrap();
        let inner = ctx.push_frame("plain");
        assert_eq!(inner, 1);
        let path = ctx.declare_local("total", Value::int(2)).unwrap();
        assert_eq!(path, Path::local(1, 0));

        ctx.pop_frame().unwrap();
        assert_eq!(ctx.load_local("total").unwrap().to_i64(), Some(1));
        ctx.pop_frame().unwrap();
        assert!(matches!(ctx.pop_frame(), Err(ContextError::NoFrame)));
    }

    #[test]
    fn test_pending_binding() {
        let mut ctx = prepared();
        ctx.push_frame("leak");

        // Right-hand side evaluated before the binding exists
        ctx.alloc_pending(Value::int(7));
        let path = ctx.bind_pending_local("kept").unwrap();
        assert_eq!(path, Path::local(0, 0));
        assert_eq!(ctx.load_local("kept").unwrap().to_i64(), Some(7));
        assert_eq!(ctx.memory_stats().objects, 1);

        ctx.alloc_pending(Value::int(8));
        ctx.bind_pending_local("scratch").unwrap();
        assert_eq!(ctx.load_local("scratch").unwrap().to_i64(), Some(8));
        assert_eq!(ctx.memory_stats().objects, 1);

        ctx.gc();
        assert_eq!(ctx.load_local("kept").unwrap().to_i64(), Some(7));
    }

    #[test]
    fn test_bind_without_pending() {
        let mut ctx = prepared();
        ctx.push_frame("leak");
        let err = ctx.bind_pending_local("kept").unwrap_err();
        assert!(matches!(err, ContextError::Gc(GcError::NoPendingRoot(_))));
    }

    #[test]
    fn test_failed_bind_leaves_frame_intact() {
        let mut ctx = prepared();
        ctx.push_frame("leak");
        ctx.declare_local("x", Value::int(1)).unwrap();

        assert!(ctx.bind_pending_local("x").is_err());
        assert_eq!(ctx.load_local("x").unwrap().to_i64(), Some(1));

        let path = ctx.declare_local("y", Value::int(2)).unwrap();
        assert_eq!(path, Path::local(0, 1));
        assert_eq!(ctx.load_local("y").unwrap().to_i64(), Some(2));
        assert_eq!(ctx.memory_stats().roots, 2);
    }

    #[test]
    fn test_locals_need_a_frame() {
        let mut ctx = prepared();
        assert!(matches!(
            ctx.declare_local("x", Value::nil()),
            Err(ContextError::NoFrame)
        ));
    }

    #[test]
    fn test_globals() {
        let mut ctx = Context::new();
        ctx.define_global("counter", Value::int(3));
        ctx.push_frame("main");
        ctx.declare_local("tmp", Value::nil()).unwrap();
        assert_eq!(ctx.memory_stats().globals, 1);
        ctx.pop_frame().unwrap();
        ctx.gc();
        assert_eq!(ctx.load_global("counter"), Some(&Value::int(3)));

        assert!(ctx.drop_global("counter"));
        assert!(!ctx.drop_global("counter"));
        ctx.gc();
        assert_eq!(ctx.memory_stats().live, 0);
    }

    #[test]
    fn test_prepare_error() {
        let mut ctx = Context::new();
        let err = ctx.prepare("package").unwrap_err();
        assert!(matches!(err, ContextError::Parse(_)));
        assert!(err.to_string().starts_with("Parse error:"));
    }

    #[test]
    fn test_prepare_skips_broken_functions() {
        let mut ctx = Context::new();
        let prepared = ctx
            .prepare(
                "func broken( {
                }
                func ok() *int {
                    var kept int
                    var local int
                    switch local {
                    case 1:
                        return &kept
                    }
                    return nil
                }",
            )
            .unwrap();
        assert_eq!(prepared, 1);
        assert_eq!(ctx.storage_class("ok", "kept"), StorageClass::Heap);
        assert_eq!(ctx.storage_class("ok", "local"), StorageClass::Stack);
        assert!(ctx.plan("broken").is_none());
        assert_eq!(ctx.storage_class("broken", "x"), StorageClass::Heap);
    }

    #[test]
    fn test_scoped_mode() {
        let mut ctx = Context::with_config(GcConfig::default(), EscapeMode::Scoped);
        ctx.prepare(
            "func f() {
                x := 1
                _ = x
                go func() { x := 2; use(x) }()
            }",
        )
        .unwrap();
        assert_eq!(ctx.storage_class("f", "x"), StorageClass::Stack);
    }
}
