//! The linker: merges WOF objects into one EXE (spec §4.5).
//!
//! Phases, in the order spec §4.5 names them: load (parsing happens before
//! this module, in [`crate::wof`]), symbol resolution (pass A then pass B),
//! layout, section assembly, relocation, and emit. The layout/assembly
//! split mirrors the teacher's ELF writer (`write/elf.rs`): first compute
//! every offset in a dedicated pass, then copy bytes into buffers sized
//! from those offsets, exactly as `SectionOffsets` is computed before any
//! section bytes are written.

mod relocation;

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::exe::Exe;
use crate::wof::{Object, Section};

/// Where a resolved symbol's definition lives: which input object, in
/// which section, at what value.
#[derive(Debug, Clone, Copy)]
struct Resolved {
    obj_index: usize,
    section: Section,
    value: u16,
}

/// Link `objects` (in the given input order) into a single executable.
pub fn link(objects: &[Object]) -> Result<Exe> {
    log::debug!("linking {} object file(s)", objects.len());
    let globals = resolve_symbols(objects)?;
    let layout = Layout::compute(objects);
    log::debug!("layout: {} code byte(s), {} data byte(s)", layout.total_code, layout.total_data);
    let mut code = vec![0u8; layout.total_code];
    let mut data = vec![0u8; layout.total_data];
    assemble_sections(objects, &layout, &mut code, &mut data);
    apply_relocations(objects, &layout, &globals, &mut code, &mut data)?;
    Ok(Exe { code, data })
}

/// Pass A (collect global definitions, rejecting duplicates) then pass B
/// (verify every undefined reference resolves) of spec §4.5 step 2.
fn resolve_symbols(objects: &[Object]) -> Result<IndexMap<String, Resolved>> {
    let mut globals: IndexMap<String, Resolved> = IndexMap::new();

    for (obj_index, obj) in objects.iter().enumerate() {
        for sym in &obj.symbols {
            if sym.visibility == crate::wof::Visibility::Global && sym.section != Section::Undef {
                if globals.contains_key(&sym.name) {
                    return Err(Error::link(format!(
                        "symbol `{}' defined in multiple object files",
                        sym.name
                    )));
                }
                globals.insert(
                    sym.name.clone(),
                    Resolved {
                        obj_index,
                        section: sym.section,
                        value: sym.value,
                    },
                );
            }
        }
    }

    for obj in objects {
        for sym in &obj.symbols {
            if sym.section == Section::Undef && !globals.contains_key(&sym.name) {
                return Err(Error::link(format!(
                    "undefined symbol `{}'",
                    sym.name
                )));
            }
        }
    }

    Ok(globals)
}

/// The per-object code/data offsets chosen in spec §4.5 step 3, plus the
/// merged section totals.
struct Layout {
    code_offsets: Vec<usize>,
    data_offsets: Vec<usize>,
    total_code: usize,
    total_data: usize,
}

impl Layout {
    fn compute(objects: &[Object]) -> Layout {
        let mut code_offsets = Vec::with_capacity(objects.len());
        let mut data_offsets = Vec::with_capacity(objects.len());
        let mut code_cursor = 0usize;
        let mut data_cursor = 0usize;
        for obj in objects {
            code_offsets.push(code_cursor);
            code_cursor += obj.code.len();
            code_cursor = align_even(code_cursor);

            data_offsets.push(data_cursor);
            data_cursor += obj.data.len();
            data_cursor = align_even(data_cursor);
        }
        Layout {
            code_offsets,
            data_offsets,
            total_code: code_cursor,
            total_data: data_cursor,
        }
    }
}

fn align_even(offset: usize) -> usize {
    (offset + 1) & !1
}

fn assemble_sections(objects: &[Object], layout: &Layout, code: &mut [u8], data: &mut [u8]) {
    for (i, obj) in objects.iter().enumerate() {
        let co = layout.code_offsets[i];
        code[co..co + obj.code.len()].copy_from_slice(&obj.code);
        let dof = layout.data_offsets[i];
        data[dof..dof + obj.data.len()].copy_from_slice(&obj.data);
    }
}

/// Tracks already-patched byte ranges within one merged section so
/// overlapping relocations are rejected rather than silently applied in an
/// unspecified order (spec §9, open question).
#[derive(Default)]
struct PatchTracker(Vec<(usize, usize)>);

impl PatchTracker {
    fn claim(&mut self, start: usize, len: usize) -> Result<()> {
        let end = start + len;
        if self.0.iter().any(|&(s, e)| start < e && s < end) {
            return Err(Error::link(format!(
                "overlapping relocation patch at offset {}",
                start
            )));
        }
        self.0.push((start, end));
        Ok(())
    }
}

fn apply_relocations(
    objects: &[Object],
    layout: &Layout,
    globals: &IndexMap<String, Resolved>,
    code: &mut [u8],
    data: &mut [u8],
) -> Result<()> {
    let mut code_patches = PatchTracker::default();
    let mut data_patches = PatchTracker::default();

    for (obj_index, obj) in objects.iter().enumerate() {
        for reloc in &obj.relocations {
            let sym = obj.symbols.get(reloc.sym_index as usize).ok_or_else(|| {
                Error::link(format!(
                    "relocation symbol index {} out of range",
                    reloc.sym_index
                ))
            })?;

            let resolved = if sym.section == Section::Undef {
                *globals.get(&sym.name).ok_or_else(|| {
                    Error::link(format!("undefined symbol `{}'", sym.name))
                })?
            } else {
                Resolved {
                    obj_index,
                    section: sym.section,
                    value: sym.value,
                }
            };

            let final_addr = match resolved.section {
                Section::Code => layout.code_offsets[resolved.obj_index] + resolved.value as usize,
                Section::Data => layout.data_offsets[resolved.obj_index] + resolved.value as usize,
                Section::Undef => {
                    return Err(Error::link(format!(
                        "symbol `{}' resolved to an undefined section",
                        sym.name
                    )))
                }
            } as u16;

            let (buf, base, tracker) = match reloc.section {
                Section::Code => (&mut *code, layout.code_offsets[obj_index], &mut code_patches),
                Section::Data => (&mut *data, layout.data_offsets[obj_index], &mut data_patches),
                Section::Undef => {
                    return Err(Error::link("relocation patch site cannot be UNDEF"))
                }
            };

            let patch_offset = base + reloc.offset as usize;
            let len = reloc.kind.patch_len();
            if patch_offset + len > buf.len() {
                return Err(Error::link("relocation patch range out of bounds"));
            }
            tracker.claim(patch_offset, len)?;
            relocation::apply(reloc.kind, &mut buf[patch_offset..patch_offset + len], final_addr);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wof::{RelocType, Symbol, Visibility};

    #[test]
    fn scenario_s1_single_object_no_relocations() {
        let obj = Object {
            code: vec![0x00, 0x60],
            ..Object::default()
        };
        let exe = link(&[obj]).unwrap();
        assert_eq!(exe.write(), {
            let mut v = vec![0xD1, 0xDD, 0x02, 0x00, 0x00, 0x00];
            v.extend_from_slice(&[0u8; 10]);
            v.extend_from_slice(&[0x00, 0x60]);
            v
        });
    }

    #[test]
    fn scenario_s2_two_object_code_alignment() {
        let a = Object {
            code: vec![0x01, 0x02, 0x03],
            ..Object::default()
        };
        let b = Object {
            code: vec![0x04, 0x05],
            ..Object::default()
        };
        let exe = link(&[a, b]).unwrap();
        assert_eq!(exe.code, vec![0x01, 0x02, 0x03, 0x00, 0x04, 0x05]);
    }

    #[test]
    fn scenario_s5_duplicate_global_is_fatal() {
        let def = |v| Object {
            code: vec![0xAA; 2],
            symbols: vec![Symbol {
                name: "Foo".into(),
                value: v,
                section: Section::Code,
                visibility: Visibility::Global,
            }],
            ..Object::default()
        };
        let err = link(&[def(0), def(0)]).unwrap_err();
        assert!(err.to_string().contains("multiple object files"));
    }

    #[test]
    fn undefined_symbol_is_fatal() {
        let obj = Object {
            code: vec![0, 0],
            symbols: vec![Symbol {
                name: "Missing".into(),
                value: 0,
                section: Section::Undef,
                visibility: Visibility::Global,
            }],
            relocations: vec![crate::wof::Relocation {
                section: Section::Code,
                kind: RelocType::Word16Code,
                offset: 0,
                sym_index: 0,
            }],
            ..Object::default()
        };
        assert!(link(&[obj]).is_err());
    }

    #[test]
    fn padding_bytes_between_objects_are_zero() {
        let a = Object {
            code: vec![0x11, 0x22, 0x33],
            ..Object::default()
        };
        let b = Object {
            code: vec![0x44],
            ..Object::default()
        };
        let exe = link(&[a, b]).unwrap();
        assert_eq!(exe.code[3], 0);
        assert_eq!(exe.code.len() % 2, 0);
    }
}
