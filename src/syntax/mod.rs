//! Syntax tree, lexer and parser for function bodies
//!
//! The escape analyzer works on the tree; the lexer and parser exist so the
//! tree can be built from source text.

pub mod ast;
pub mod lexer;
pub mod parser;

// Re-exports
pub use ast::{FuncDecl, Node, inspect};
pub use lexer::{Lexer, Token};
pub use parser::{ParseError, Parser, parse_body, parse_file, parse_func};
