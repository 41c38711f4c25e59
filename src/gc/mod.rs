//! Garbage collector module
//!
//! A stop-the-world mark-sweep collector. One `Collector` belongs to one VM
//! instance and is only ever driven from that instance's evaluator thread,
//! so it takes `&mut self` everywhere and carries no locks.
//!
//! Objects live in a slot arena and point at each other by `ObjectId`, which
//! keeps the mark phase a plain worklist walk over indices.

mod collector;
mod object;
mod path;

pub use collector::{Collector, GcConfig, GcError, GcStats};
pub use object::{HeapObject, ObjectId};
pub use path::{Path, PathParseError};
