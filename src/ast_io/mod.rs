//! The serialized AST wire format passed from `yaparse` to `yasem` (spec
//! §4.2 "Serialized AST", §4.3 "grammar is section-keyword-driven").
//!
//! Line-oriented and keyword-driven like the token stream and IR formats,
//! but expressions are written prefix/Polish-style (opcode first, operands
//! follow positionally) so no closing markers are needed for subtrees —
//! only the compound statement forms (`IF…ENDIF`, `WHILE…ENDWHILE`,
//! `FOR…ENDFOR`) and `FUNC…ENDFUNC`/`STRUCT…ENDSTRUCT` carry explicit
//! terminators, exactly as spec.md lists them.

pub mod reader;
pub mod serialize;

use crate::ast::Program;
use crate::symtab::SymbolTable;
use crate::types::StructTable;

pub use reader::read_program;
pub use serialize::write_program;

/// Everything the serialized AST format round-trips: the tree plus the
/// resolved symbol/struct tables the parser computed.
pub struct AstBundle {
    pub program: Program,
    pub symbols: SymbolTable,
    pub structs: StructTable,
}

/// Encode a [`crate::types::Type`] as one hyphen/space-free word so it fits
/// a single slot in the positional word stream.
pub(crate) fn encode_type(ty: &crate::types::Type) -> String {
    use crate::types::Type;
    match ty {
        Type::Void => "void".to_string(),
        Type::Base(b) => b.name().to_string(),
        Type::Pointer(t) => format!("@{}", encode_type(t)),
        Type::Array(t, n) => format!("[{}]{}", n, encode_type(t)),
        Type::Struct(name) => format!("struct:{}", name),
    }
}

/// Inverse of [`encode_type`].
pub(crate) fn decode_type(s: &str) -> Option<crate::types::Type> {
    use crate::types::{BaseType, Type};
    if s == "void" {
        return Some(Type::Void);
    }
    if let Some(rest) = s.strip_prefix('@') {
        return Some(Type::pointer(decode_type(rest)?));
    }
    if let Some(rest) = s.strip_prefix('[') {
        let close = rest.find(']')?;
        let n: u16 = rest[..close].parse().ok()?;
        return Some(Type::array(decode_type(&rest[close + 1..])?, n));
    }
    if let Some(name) = s.strip_prefix("struct:") {
        return Some(Type::Struct(name.to_string()));
    }
    BaseType::from_name(s).map(Type::Base)
}
