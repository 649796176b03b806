//! Data model, binary formats, and linker for the WUT-4 YAPL compiler
//! pipeline.
//!
//! This crate is the shared library behind the five pipeline binaries
//! (`ya`, `yalex`, `yaparse`, `yasem`, `yld`): the token/AST/IR data model,
//! the WOF/EXE binary formats, and the linker live here so every stage
//! agrees on one representation even though they communicate over the
//! process boundary via the text/binary wire formats in [`lexer`],
//! [`ast_io`], [`ir::text`], [`wof`], and [`exe`].

pub mod ast;
pub mod ast_io;
pub mod error;
pub mod exe;
pub mod ir;
pub mod lexer;
pub mod link;
pub mod parser;
pub mod semant;
pub mod symtab;
pub mod token;
pub mod types;
pub mod wof;

pub use error::{Error, ErrorKind, Result};
