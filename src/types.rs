//! The target type system: base types, pointers, arrays, and structs.
//!
//! Sizes and alignments follow spec §3 exactly: 1/2/2/4/8/16 bytes for the
//! six base types, 2 bytes for any pointer, `length * sizeof(elem)` for
//! arrays, and the aligned sum of field offsets for structs (minimum
//! alignment 2).

use std::fmt;

use indexmap::IndexMap;

/// The scalar base types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseType {
    Uint8,
    Int16,
    Uint16,
    Block32,
    Block64,
    Block128,
}

impl BaseType {
    pub fn size(self) -> u16 {
        match self {
            BaseType::Uint8 => 1,
            BaseType::Int16 | BaseType::Uint16 => 2,
            BaseType::Block32 => 4,
            BaseType::Block64 => 8,
            BaseType::Block128 => 16,
        }
    }

    pub fn align(self) -> u16 {
        match self {
            BaseType::Uint8 => 1,
            BaseType::Int16 | BaseType::Uint16 => 2,
            BaseType::Block32 | BaseType::Block64 | BaseType::Block128 => 4,
        }
    }

    /// Whether this is `int16` (the only signed integral base type).
    pub fn is_signed(self) -> bool {
        matches!(self, BaseType::Int16)
    }

    /// Whether arithmetic/comparison operators are defined on this type.
    pub fn is_integral(self) -> bool {
        matches!(self, BaseType::Uint8 | BaseType::Int16 | BaseType::Uint16)
    }

    pub fn name(self) -> &'static str {
        match self {
            BaseType::Uint8 => "uint8",
            BaseType::Int16 => "int16",
            BaseType::Uint16 => "uint16",
            BaseType::Block32 => "block32",
            BaseType::Block64 => "block64",
            BaseType::Block128 => "block128",
        }
    }

    pub fn from_name(s: &str) -> Option<BaseType> {
        match s {
            "uint8" | "byte" => Some(BaseType::Uint8),
            "int16" => Some(BaseType::Int16),
            "uint16" => Some(BaseType::Uint16),
            "block32" => Some(BaseType::Block32),
            "block64" => Some(BaseType::Block64),
            "block128" => Some(BaseType::Block128),
            _ => None,
        }
    }

    /// The inclusive numeric range this type can represent, used for literal
    /// adaptation (spec §4.4).
    pub fn range(self) -> (i64, i64) {
        match self {
            BaseType::Uint8 => (0, 255),
            BaseType::Int16 => (-32768, 32767),
            BaseType::Uint16 | BaseType::Block32 | BaseType::Block64 | BaseType::Block128 => {
                (0, 65535)
            }
        }
    }
}

/// A field of a struct definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub ty: Type,
    /// `Some(n)` for an array field of length `n`; `None` otherwise.
    pub array_length: Option<u16>,
    /// Byte offset within the struct, assigned during layout.
    pub offset: u16,
}

/// A struct type definition: fields in declaration order, plus the computed
/// total size and alignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<Field>,
    pub size: u16,
    pub align: u16,
}

/// The table of struct definitions known to a compilation unit, keyed by
/// name. Insertion-ordered so diagnostics and any future serialization are
/// deterministic (spec §9).
#[derive(Debug, Clone, Default)]
pub struct StructTable {
    structs: IndexMap<String, StructDef>,
}

impl StructTable {
    pub fn new() -> Self {
        StructTable::default()
    }

    pub fn insert(&mut self, def: StructDef) -> Option<StructDef> {
        self.structs.insert(def.name.clone(), def)
    }

    pub fn get(&self, name: &str) -> Option<&StructDef> {
        self.structs.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StructDef> {
        self.structs.values()
    }
}

/// A type in the YAPL type system: a closed, tagged variant (spec §9 —
/// closed ADT rather than an open interface hierarchy).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Void,
    Base(BaseType),
    Pointer(Box<Type>),
    /// `length == 0` means "inferred from initializer" (spec §3).
    Array(Box<Type>, u16),
    Struct(String),
}

impl Type {
    pub fn pointer(to: Type) -> Type {
        Type::Pointer(Box::new(to))
    }

    pub fn array(of: Type, length: u16) -> Type {
        Type::Array(Box::new(of), length)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array(..))
    }

    pub fn is_integral_base(&self) -> bool {
        matches!(self, Type::Base(b) if b.is_integral())
    }

    /// Array-to-pointer decay (spec §4.4): `[N]T` used as a value decays to
    /// `@T`. Used when resolving identifiers and when checking compatibility.
    pub fn decay(&self) -> Type {
        match self {
            Type::Array(elem, _) => Type::pointer((**elem).clone()),
            other => other.clone(),
        }
    }

    /// Size in bytes, given the struct table to resolve named structs.
    pub fn size(&self, structs: &StructTable) -> Option<u16> {
        match self {
            Type::Void => Some(0),
            Type::Base(b) => Some(b.size()),
            Type::Pointer(_) => Some(2),
            Type::Array(elem, len) => elem.size(structs).map(|s| s * len),
            Type::Struct(name) => structs.get(name).map(|d| d.size),
        }
    }

    /// Alignment in bytes, minimum 2 for arrays/structs per spec §3.
    pub fn align(&self, structs: &StructTable) -> Option<u16> {
        match self {
            Type::Void => Some(1),
            Type::Base(b) => Some(b.align()),
            Type::Pointer(_) => Some(2),
            Type::Array(elem, _) => elem.align(structs),
            Type::Struct(name) => structs.get(name).map(|d| d.align),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Base(b) => write!(f, "{}", b.name()),
            Type::Pointer(t) => write!(f, "@{}", t),
            Type::Array(t, n) => write!(f, "[{}]{}", n, t),
            Type::Struct(name) => write!(f, "struct {}", name),
        }
    }
}

/// Align `offset` up to a multiple of `align` (`align` must be a power of
/// two). Used identically for globals, struct fields, and (downward, via
/// [`align_down`]) locals.
pub fn align_up(offset: u16, align: u16) -> u16 {
    if align <= 1 {
        return offset;
    }
    (offset + (align - 1)) & !(align - 1)
}

/// Align `offset` down to a multiple of `align`. Locals grow toward negative
/// offsets, so their magnitude is aligned downward (spec §4.2 "Layout
/// responsibilities").
pub fn align_down(offset: u16, align: u16) -> u16 {
    if align <= 1 {
        return offset;
    }
    offset & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_sizes() {
        assert_eq!(BaseType::Uint8.size(), 1);
        assert_eq!(BaseType::Int16.size(), 2);
        assert_eq!(BaseType::Uint16.size(), 2);
        assert_eq!(BaseType::Block32.size(), 4);
        assert_eq!(BaseType::Block64.size(), 8);
        assert_eq!(BaseType::Block128.size(), 16);
    }

    #[test]
    fn struct_size_rounds_to_alignment() {
        let mut structs = StructTable::new();
        let fields = vec![
            Field {
                name: "a".into(),
                ty: Type::Base(BaseType::Uint8),
                array_length: None,
                offset: 0,
            },
            Field {
                name: "b".into(),
                ty: Type::Base(BaseType::Int16),
                array_length: None,
                offset: 2,
            },
        ];
        let def = StructDef {
            name: "Pair".into(),
            fields,
            size: 4,
            align: 2,
        };
        structs.insert(def);
        let ty = Type::Struct("Pair".into());
        assert_eq!(ty.size(&structs), Some(4));
        assert_eq!(ty.align(&structs), Some(2));
    }

    #[test]
    fn pointer_always_two_bytes() {
        let structs = StructTable::new();
        let ty = Type::pointer(Type::Base(BaseType::Block128));
        assert_eq!(ty.size(&structs), Some(2));
        assert_eq!(ty.align(&structs), Some(2));
    }

    #[test]
    fn align_up_and_down() {
        assert_eq!(align_up(1, 4), 4);
        assert_eq!(align_up(4, 4), 4);
        assert_eq!(align_down(7, 2), 6);
    }
}
