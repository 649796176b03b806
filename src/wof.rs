//! The WOF (Wolf Object Format) relocatable object format: reader and
//! writer (spec §6 "Relocatable object (WOF)").
//!
//! Everything is little-endian. The on-disk layout is a fixed 16-byte
//! header followed by code, data, symbol table, relocation table, and
//! string table sections, each sized by a header field. Reading validates
//! that every size and offset used downstream actually fits in the buffer,
//! the same bounds-checked style as the teacher's
//! `object::read::util::StringTable` and `Bytes` helpers, but specialized
//! to our fixed 16-bit fields instead of the teacher's `Pod`-cast machinery
//! (not needed here: nothing is zero-copy, and the structures are tiny).

use crate::error::{Error, Result};

pub const MAGIC: u16 = 0xDDD2;
pub const HEADER_SIZE: usize = 16;

/// Which section a symbol or relocation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Undef,
    Code,
    Data,
}

impl Section {
    fn to_u8(self) -> u8 {
        match self {
            Section::Undef => 0,
            Section::Code => 1,
            Section::Data => 2,
        }
    }

    fn from_u8(v: u8) -> Result<Section> {
        match v {
            0 => Ok(Section::Undef),
            1 => Ok(Section::Code),
            2 => Ok(Section::Data),
            other => Err(Error::object(format!("bad section tag {}", other))),
        }
    }
}

/// Symbol visibility, stored as a single byte (0 = local/static, 1 =
/// global/public).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Local,
    Global,
}

impl Visibility {
    fn to_u8(self) -> u8 {
        match self {
            Visibility::Local => 0,
            Visibility::Global => 1,
        }
    }

    fn from_u8(v: u8) -> Result<Visibility> {
        match v {
            0 => Ok(Visibility::Local),
            1 => Ok(Visibility::Global),
            other => Err(Error::object(format!("bad visibility tag {}", other))),
        }
    }
}

/// One entry in a WOF symbol table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub value: u16,
    pub section: Section,
    pub visibility: Visibility,
}

/// The five relocation types (spec §6 "Relocation types and patch
/// semantics"). The `Code`/`Data` suffix on `Ldi`/`Word16` is informational
/// only — the patch arithmetic is identical for both and is driven by the
/// referenced symbol's own section (spec §4.5 "relocation symmetry").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocType {
    LdiCode,
    LdiData,
    Jal,
    Word16Code,
    Word16Data,
}

impl RelocType {
    fn to_u8(self) -> u8 {
        match self {
            RelocType::LdiCode => 0x01,
            RelocType::LdiData => 0x02,
            RelocType::Jal => 0x03,
            RelocType::Word16Code => 0x04,
            RelocType::Word16Data => 0x05,
        }
    }

    fn from_u8(v: u8) -> Result<RelocType> {
        match v {
            0x01 => Ok(RelocType::LdiCode),
            0x02 => Ok(RelocType::LdiData),
            0x03 => Ok(RelocType::Jal),
            0x04 => Ok(RelocType::Word16Code),
            0x05 => Ok(RelocType::Word16Data),
            other => Err(Error::object(format!("unknown relocation type 0x{:02x}", other))),
        }
    }

    /// Byte width of the patch site: 4 for the two-instruction `Ldi`/`Jal`
    /// forms, 2 for the raw `Word16` forms.
    pub fn patch_len(self) -> usize {
        match self {
            RelocType::LdiCode | RelocType::LdiData | RelocType::Jal => 4,
            RelocType::Word16Code | RelocType::Word16Data => 2,
        }
    }
}

/// One entry in a WOF relocation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relocation {
    /// Section the patch site lives in (code or data).
    pub section: Section,
    pub kind: RelocType,
    pub offset: u16,
    pub sym_index: u16,
}

/// A fully parsed WOF object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Object {
    pub bootstrap: bool,
    pub code: Vec<u8>,
    pub data: Vec<u8>,
    pub symbols: Vec<Symbol>,
    pub relocations: Vec<Relocation>,
}

const FLAG_BOOTSTRAP: u8 = 0x01;

/// A minimal bounds-checked cursor over a byte slice, in the spirit of the
/// teacher's `Bytes` newtype: every read either succeeds or returns an
/// [`Error::object`], never panics.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&e| e <= self.data.len())
            .ok_or_else(|| Error::object("truncated object file"))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }
}

fn get_str(strings: &[u8], offset: u16) -> Result<String> {
    let start = offset as usize;
    let bytes = strings
        .get(start..)
        .ok_or_else(|| Error::object("string offset out of range"))?;
    let end = bytes
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| Error::object("unterminated string in string table"))?;
    String::from_utf8(bytes[..end].to_vec())
        .map_err(|_| Error::object("non-UTF8 string in string table"))
}

impl Object {
    /// Parse a WOF object from bytes (spec §4.5 phase 1 "Load").
    pub fn parse(data: &[u8]) -> Result<Object> {
        let mut r = Reader::new(data);
        let magic = r.u16()?;
        if magic != MAGIC {
            return Err(Error::object(format!(
                "bad magic: expected 0x{:04x}, found 0x{:04x}",
                MAGIC, magic
            )));
        }
        let _version = r.u8()?;
        let flags = r.u8()?;
        let code_size = r.u16()? as usize;
        let data_size = r.u16()? as usize;
        let sym_count = r.u16()? as usize;
        let reloc_count = r.u16()? as usize;
        let string_table_size = r.u16()? as usize;
        let _reserved = r.u16()?;

        let code = r.take(code_size)?.to_vec();
        let data_bytes = r.take(data_size)?.to_vec();

        let mut raw_symbols = Vec::with_capacity(sym_count);
        for _ in 0..sym_count {
            let name_offset = r.u16()?;
            let value = r.u16()?;
            let section = Section::from_u8(r.u8()?)?;
            let visibility = Visibility::from_u8(r.u8()?)?;
            let _reserved = r.u16()?;
            raw_symbols.push((name_offset, value, section, visibility));
        }

        let mut raw_relocs = Vec::with_capacity(reloc_count);
        for _ in 0..reloc_count {
            let section = Section::from_u8(r.u8()?)?;
            let kind = RelocType::from_u8(r.u8()?)?;
            let offset = r.u16()?;
            let sym_index = r.u16()?;
            let _reserved = r.u16()?;
            raw_relocs.push(Relocation {
                section,
                kind,
                offset,
                sym_index,
            });
        }

        let strings = r.take(string_table_size)?;

        let symbols = raw_symbols
            .into_iter()
            .map(|(name_offset, value, section, visibility)| {
                Ok(Symbol {
                    name: get_str(strings, name_offset)?,
                    value,
                    section,
                    visibility,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        for reloc in &raw_relocs {
            if reloc.sym_index as usize >= symbols.len() {
                return Err(Error::object(format!(
                    "relocation symbol index {} out of range ({} symbols)",
                    reloc.sym_index,
                    symbols.len()
                )));
            }
            let section_len = match reloc.section {
                Section::Code => code.len(),
                Section::Data => data_bytes.len(),
                Section::Undef => {
                    return Err(Error::object("relocation patch site cannot be UNDEF"))
                }
            };
            let end = reloc.offset as usize + reloc.kind.patch_len();
            if end > section_len {
                return Err(Error::object("relocation patch range out of bounds"));
            }
        }

        Ok(Object {
            bootstrap: flags & FLAG_BOOTSTRAP != 0,
            code,
            data: data_bytes,
            symbols,
            relocations: raw_relocs,
        })
    }

    /// Serialize this object back to WOF bytes.
    pub fn write(&self) -> Vec<u8> {
        // String table: offset 0 is the reserved null name, then each
        // symbol's name in insertion order (deduplicated).
        let mut string_table: Vec<u8> = vec![0];
        let mut string_offsets: indexmap::IndexMap<&str, u16> = indexmap::IndexMap::new();
        let mut name_offset_of = |name: &str, table: &mut Vec<u8>| -> u16 {
            if name.is_empty() {
                return 0;
            }
            if let Some(&off) = string_offsets.get(name) {
                return off;
            }
            let off = table.len() as u16;
            table.extend_from_slice(name.as_bytes());
            table.push(0);
            string_offsets.insert(name, off);
            off
        };

        let mut sym_bytes = Vec::with_capacity(self.symbols.len() * 8);
        for sym in &self.symbols {
            let name_offset = name_offset_of(&sym.name, &mut string_table);
            sym_bytes.extend_from_slice(&name_offset.to_le_bytes());
            sym_bytes.extend_from_slice(&sym.value.to_le_bytes());
            sym_bytes.push(sym.section.to_u8());
            sym_bytes.push(sym.visibility.to_u8());
            sym_bytes.extend_from_slice(&0u16.to_le_bytes());
        }

        let mut reloc_bytes = Vec::with_capacity(self.relocations.len() * 8);
        for reloc in &self.relocations {
            reloc_bytes.push(reloc.section.to_u8());
            reloc_bytes.push(reloc.kind.to_u8());
            reloc_bytes.extend_from_slice(&reloc.offset.to_le_bytes());
            reloc_bytes.extend_from_slice(&reloc.sym_index.to_le_bytes());
            reloc_bytes.extend_from_slice(&0u16.to_le_bytes());
        }

        let mut out = Vec::with_capacity(
            HEADER_SIZE + self.code.len() + self.data.len() + sym_bytes.len() + reloc_bytes.len() + string_table.len(),
        );
        out.extend_from_slice(&MAGIC.to_le_bytes());
        out.push(1); // version
        out.push(if self.bootstrap { FLAG_BOOTSTRAP } else { 0 });
        out.extend_from_slice(&(self.code.len() as u16).to_le_bytes());
        out.extend_from_slice(&(self.data.len() as u16).to_le_bytes());
        out.extend_from_slice(&(self.symbols.len() as u16).to_le_bytes());
        out.extend_from_slice(&(self.relocations.len() as u16).to_le_bytes());
        out.extend_from_slice(&(string_table.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // reserved

        out.extend_from_slice(&self.code);
        out.extend_from_slice(&self.data);
        out.extend_from_slice(&sym_bytes);
        out.extend_from_slice(&reloc_bytes);
        out.extend_from_slice(&string_table);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_round_trips() {
        let obj = Object::default();
        let bytes = obj.write();
        assert_eq!(bytes.len(), HEADER_SIZE);
        let parsed = Object::parse(&bytes).unwrap();
        assert_eq!(parsed, obj);
    }

    #[test]
    fn round_trip_preserves_everything() {
        let obj = Object {
            bootstrap: true,
            code: vec![0x01, 0x02, 0x03],
            data: vec![0xaa, 0xbb],
            symbols: vec![
                Symbol {
                    name: "Main".into(),
                    value: 0,
                    section: Section::Code,
                    visibility: Visibility::Global,
                },
                Symbol {
                    name: "counter".into(),
                    value: 0,
                    section: Section::Data,
                    visibility: Visibility::Local,
                },
            ],
            relocations: vec![Relocation {
                section: Section::Code,
                kind: RelocType::Word16Data,
                offset: 0,
                sym_index: 1,
            }],
        };
        let bytes = obj.write();
        let parsed = Object::parse(&bytes).unwrap();
        assert_eq!(parsed, obj);
    }

    #[test]
    fn bad_magic_is_fatal() {
        let mut bytes = Object::default().write();
        bytes[0] = 0xff;
        assert!(Object::parse(&bytes).is_err());
    }

    #[test]
    fn truncated_object_is_fatal() {
        let bytes = vec![0xd2, 0xdd, 1, 0, 2, 0];
        assert!(Object::parse(&bytes).is_err());
    }

    #[test]
    fn out_of_range_symbol_index_is_fatal() {
        let obj = Object {
            code: vec![0, 0],
            relocations: vec![Relocation {
                section: Section::Code,
                kind: RelocType::Word16Code,
                offset: 0,
                sym_index: 5,
            }],
            ..Object::default()
        };
        let bytes = obj.write();
        assert!(Object::parse(&bytes).is_err());
    }
}
