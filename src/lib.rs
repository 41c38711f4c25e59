//! vmheap - memory management core for a managed-language VM
//!
//! Two cooperating pieces decide where variables live and when heap storage
//! is reclaimed:
//!
//! - an escape analyzer that inspects a function's syntax tree and reports
//!   which local variables must be heap-allocated
//! - a mark-and-sweep collector over a registry of heap objects reachable
//!   from stack-frame and global roots
//!
//! # Example
//! ```
//! use vmheap::{Context, Value};
//!
//! let mut ctx = Context::new();
//! ctx.prepare("func f() *int { var x int; return &x }").unwrap();
//!
//! ctx.push_frame("f");
//! ctx.declare_local("x", Value::int(1)).unwrap();
//! ctx.pop_frame().unwrap();
//!
//! ctx.gc();
//! assert_eq!(ctx.memory_stats().objects, 0);
//! ```

// Core modules
pub mod context;
pub mod value;

// Garbage collector
pub mod gc;

// Syntax tree and parser
pub mod syntax;

// Escape analysis
pub mod escape;

// Re-export main types
pub use context::{Context, ContextError, MemoryStats, StorageClass};
pub use escape::{EscapeAnalyzer, EscapeMode, EscapeSet, analyze};
pub use gc::{Collector, GcConfig, GcError, GcStats, HeapObject, ObjectId, Path};
pub use value::Value;
