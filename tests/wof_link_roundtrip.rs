//! Linker scenarios driven through real serialized WOF bytes rather than
//! `yapl::wof::Object` values built and linked in-process (spec §8 S1-S5,
//! §4.5). `Object::write()` then `Object::parse()` stands in for the file
//! round trip `yld` actually does between reading each `.wof` argument and
//! linking it.

use yapl::exe::Exe;
use yapl::link::link;
use yapl::wof::{Object, RelocType, Section, Symbol, Visibility};

fn through_bytes(obj: &Object) -> Object {
    Object::parse(&obj.write()).unwrap()
}

#[test]
fn scenario_s2_two_object_code_alignment_through_bytes() {
    let a = Object {
        code: vec![0x01, 0x02, 0x03],
        ..Object::default()
    };
    let b = Object {
        code: vec![0x04, 0x05],
        ..Object::default()
    };
    let exe = link(&[through_bytes(&a), through_bytes(&b)]).unwrap();
    assert_eq!(exe.code, vec![0x01, 0x02, 0x03, 0x00, 0x04, 0x05]);

    let bytes = exe.write();
    assert_eq!(Exe::parse(&bytes).unwrap(), exe);
}

#[test]
fn scenario_s3_inter_object_jal_through_bytes() {
    // Object A: LUI r0,0 ; JAL r0,r0,0, referencing undefined global `Bar`.
    let a = Object {
        code: vec![0x00, 0xA0, 0x00, 0xE0],
        symbols: vec![Symbol {
            name: "Bar".into(),
            value: 0,
            section: Section::Undef,
            visibility: Visibility::Global,
        }],
        relocations: vec![yapl::wof::Relocation {
            section: Section::Code,
            kind: RelocType::Jal,
            offset: 0,
            sym_index: 0,
        }],
        ..Object::default()
    };
    // Object B: defines `Bar` at code offset 0.
    let b = Object {
        code: vec![0x00, 0x60],
        symbols: vec![Symbol {
            name: "Bar".into(),
            value: 0,
            section: Section::Code,
            visibility: Visibility::Global,
        }],
        ..Object::default()
    };

    let exe = link(&[through_bytes(&a), through_bytes(&b)]).unwrap();
    assert_eq!(exe.code.len(), 6);
    assert_eq!(u16::from_le_bytes([exe.code[0], exe.code[1]]), 0xA000);
    assert_eq!(u16::from_le_bytes([exe.code[2], exe.code[3]]), 0xE100);
    assert_eq!(&exe.code[4..6], &[0x00, 0x60]);
}

#[test]
fn scenario_s4_inter_object_data_ldi_through_bytes() {
    // Object A: LUI r1,0 ; ADI r1,r1,0, referencing undefined global `Global`.
    let a = Object {
        code: vec![0x01, 0xA0, 0x09, 0x80],
        data: vec![0xAA, 0xBB],
        symbols: vec![Symbol {
            name: "Global".into(),
            value: 0,
            section: Section::Undef,
            visibility: Visibility::Global,
        }],
        relocations: vec![yapl::wof::Relocation {
            section: Section::Code,
            kind: RelocType::LdiData,
            offset: 0,
            sym_index: 0,
        }],
        ..Object::default()
    };
    let b = Object {
        data: vec![0xCC, 0xDD],
        symbols: vec![Symbol {
            name: "Global".into(),
            value: 0,
            section: Section::Data,
            visibility: Visibility::Global,
        }],
        ..Object::default()
    };

    let exe = link(&[through_bytes(&a), through_bytes(&b)]).unwrap();
    assert_eq!(exe.data, vec![0xAA, 0xBB, 0xCC, 0xDD]);
    assert_eq!(u16::from_le_bytes([exe.code[0], exe.code[1]]), 0xA001);
    assert_eq!(u16::from_le_bytes([exe.code[2], exe.code[3]]), 0x8089);
}

#[test]
fn scenario_s5_duplicate_global_is_fatal_through_bytes() {
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
    let a = through_bytes(&def(0));
    let b = through_bytes(&def(0));
    let err = link(&[a, b]).unwrap_err();
    assert!(err.to_string().contains("multiple object files"));
}

#[test]
fn scenario_s1_single_object_end_to_end_via_bytes_and_exe_header() {
    let obj = Object {
        code: vec![0x00, 0x60],
        ..Object::default()
    };
    let exe = link(&[through_bytes(&obj)]).unwrap();
    let bytes = exe.write();
    assert_eq!(
        bytes,
        [&[0xD1, 0xDD, 0x02, 0x00, 0x00, 0x00][..], &[0u8; 10], &[0x00, 0x60]].concat()
    );
}

#[test]
fn bootstrap_flag_survives_the_wof_byte_round_trip() {
    let obj = Object {
        bootstrap: true,
        code: vec![0x01],
        ..Object::default()
    };
    assert!(through_bytes(&obj).bootstrap);
}

#[test]
fn duplicate_symbol_names_share_one_string_table_slot() {
    // Two distinct symbols with the same name (one Code-global `Foo`
    // definition, one Undef reference resolved elsewhere) should still
    // serialize and parse back with both names intact — this exercises
    // `Object::write`'s string de-duplication against `Object::parse`.
    let obj = Object {
        code: vec![0, 0, 0, 0],
        symbols: vec![
            Symbol {
                name: "Foo".into(),
                value: 0,
                section: Section::Code,
                visibility: Visibility::Global,
            },
            Symbol {
                name: "Foo".into(),
                value: 2,
                section: Section::Code,
                visibility: Visibility::Local,
            },
        ],
        ..Object::default()
    };
    let parsed = through_bytes(&obj);
    assert_eq!(parsed.symbols[0].name, "Foo");
    assert_eq!(parsed.symbols[1].name, "Foo");
    assert_eq!(parsed.symbols[1].value, 2);
}
