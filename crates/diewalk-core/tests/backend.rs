//! Tests for the `gimli` backend: `.debug_macro` scanning, string splitting
//! and object loading

use std::path::PathBuf;

use diewalk_core::reader::macro_section::{GimliMacroContext, MacroOperand, MacroUnit};
use diewalk_core::reader::{split_strings, FileBoundary, MacroContext, StrOffsetsScope};
use diewalk_core::{DieWalkError, MacroDecodeError, ObjectImage, Record, Session, SessionOptions, UnhandledTagPolicy};
use gimli::constants;
use gimli::write::{AttributeValue as WriteValue, DwarfUnit, EndianVec, Sections, UnitEntryId};
use gimli::{DebugStr, DebugStrOffsets, DebugStrOffsetsBase, Dwarf, EndianSlice, Format, LittleEndian};
use object::write::Object;
use object::{Architecture, BinaryFormat, Endianness, SectionKind};

type Slice<'a> = EndianSlice<'a, LittleEndian>;

const STRINGS: &[u8] = b"int\0BAR 2\0";

/// One 32-bit string offset: index 0 names "BAR 2".
const STR_OFFSETS: &[u8] = &[0x04, 0x00, 0x00, 0x00];

/// Version 5 unit with a line offset: define, start_file, define_strp,
/// end_file, import, terminator.
const MACRO_UNIT: &[u8] = &[
    0x05, 0x00, // version
    0x02, // flags: line offset present
    0x10, 0x00, 0x00, 0x00, // line offset
    0x01, 0x03, b'F', b'O', b'O', b' ', b'1', 0x00, // define line 3 "FOO 1"
    0x03, 0x00, 0x01, // start_file line 0 file 1
    0x05, 0x07, 0x04, 0x00, 0x00, 0x00, // define_strp line 7 -> "BAR 2"
    0x04, // end_file
    0x07, 0x80, 0x00, 0x00, 0x00, // import 0x80
    0x00,
];

fn dwarf<'a>() -> Dwarf<Slice<'a>>
{
    let mut dwarf = Dwarf::default();
    dwarf.debug_str = DebugStr::new(STRINGS, LittleEndian);
    dwarf
}

fn scan(bytes: &[u8]) -> Result<MacroUnit<Slice<'_>>, MacroDecodeError>
{
    MacroUnit::parse(&EndianSlice::new(bytes, LittleEndian), 0)
}

#[test]
fn test_header_facts()
{
    let unit = scan(MACRO_UNIT).unwrap();
    let header = unit.header();

    assert_eq!(header.version, 5);
    assert_eq!(header.line_offset, Some(0x10));
    assert_eq!(header.op_count, 6);
    assert_eq!(header.data_len, MACRO_UNIT.len() as u64);
}

#[test]
fn test_operators_and_offsets()
{
    let dwarf = dwarf();
    let context = GimliMacroContext::new(scan(MACRO_UNIT).unwrap(), &dwarf, None);

    let operators: Vec<_> = (0..6)
        .map(|index| {
            let operator = context.operator(index).unwrap();
            (operator.section_offset, operator.code, operator.form_count)
        })
        .collect();
    assert_eq!(
        operators,
        vec![
            (7, constants::DW_MACRO_define, 2),
            (15, constants::DW_MACRO_start_file, 2),
            (18, constants::DW_MACRO_define_strp, 2),
            (24, constants::DW_MACRO_end_file, 0),
            (25, constants::DW_MACRO_import, 1),
            (30, gimli::DwMacro(0), 0),
        ]
    );
    assert_eq!(context.operator(6).unwrap_err(), MacroDecodeError::IndexOutOfRange(6));
}

#[test]
fn test_payloads()
{
    let dwarf = dwarf();
    let context = GimliMacroContext::new(scan(MACRO_UNIT).unwrap(), &dwarf, None);

    let inline = context.define_undef(0).unwrap();
    assert_eq!(inline.line, 3);
    assert_eq!(inline.text.as_deref(), Some("FOO 1"));

    let boundary = context.file_boundary(1).unwrap();
    assert_eq!((boundary.line, boundary.file_index), (0, 1));

    let strp = context.define_undef(2).unwrap();
    assert_eq!(strp.str_offset, 4);
    assert_eq!(strp.text.as_deref(), Some("BAR 2"));

    assert_eq!(context.file_boundary(3).unwrap(), FileBoundary::default());
    assert_eq!(context.import(4).unwrap(), 0x80);
}

#[test]
fn test_wrong_operator_kind()
{
    let dwarf = dwarf();
    let context = GimliMacroContext::new(scan(MACRO_UNIT).unwrap(), &dwarf, None);

    assert_eq!(
        context.file_boundary(0).unwrap_err(),
        MacroDecodeError::WrongOperator(constants::DW_MACRO_define)
    );
    assert_eq!(
        context.define_undef(4).unwrap_err(),
        MacroDecodeError::WrongOperator(constants::DW_MACRO_import)
    );
    assert!(context.import(1).is_err());
}

#[test]
fn test_operands_table_describes_vendor_opcode()
{
    let bytes = [
        0x05, 0x00, // version
        0x04, // flags: operands table
        0x01, // one entry
        0xe0, 0x02, 0x0f, 0x08, // 0xe0: udata, string
        0xe0, 0x05, b'x', 0x00, // vendor op
        0x00,
    ];
    let unit = scan(&bytes).unwrap();
    let op = unit.op(0).unwrap();

    assert_eq!(op.code, gimli::DwMacro(0xe0));
    assert_eq!(op.section_offset, 8);
    let operands = unit.operands(op).unwrap();
    assert!(matches!(operands[0], MacroOperand::Constant(5)));
    assert!(matches!(&operands[1], MacroOperand::Inline(text) if text.slice() == b"x"));
}

#[test]
fn test_sixty_four_bit_offsets()
{
    let bytes = [
        0x04, 0x00, // GNU extension version
        0x01, // flags: 64-bit offsets
        0x07, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // import 0x100
        0x00,
    ];
    let dwarf = dwarf();
    let context = GimliMacroContext::new(scan(&bytes).unwrap(), &dwarf, None);

    assert_eq!(context.header().version, 4);
    assert_eq!(context.import(0).unwrap(), 0x100);
}

#[test]
fn test_truncated_stream_keeps_earlier_operations()
{
    let bytes = [
        0x05, 0x00, 0x00, // header
        0x04, // end_file
        0x01, 0x01, b'A', b'B', // define with unterminated text
    ];
    let unit = scan(&bytes).unwrap();

    assert_eq!(unit.header().op_count, 2);
    assert!(unit.op(0).is_ok());
    assert!(matches!(unit.op(1), Err(MacroDecodeError::Read(_))));
}

#[test]
fn test_unknown_opcode()
{
    let bytes = [0x05, 0x00, 0x00, 0xe5, 0x01];
    let unit = scan(&bytes).unwrap();
    assert_eq!(unit.op(0).unwrap_err(), MacroDecodeError::UnknownOpcode(0xe5));
}

#[test]
fn test_unsupported_version()
{
    let bytes = [0x03, 0x00, 0x00, 0x00];
    assert_eq!(scan(&bytes).unwrap_err(), MacroDecodeError::UnsupportedVersion(3));
}

#[test]
fn test_string_index_needs_a_unit()
{
    let bytes = [
        0x05, 0x00, 0x00, // header
        0x0b, 0x02, 0x00, // define_strx line 2 index 0
        0x00,
    ];
    let dwarf = dwarf();
    let context = GimliMacroContext::new(scan(&bytes).unwrap(), &dwarf, None);

    assert_eq!(
        context.define_undef(0).unwrap_err(),
        MacroDecodeError::OperandLayout(constants::DW_MACRO_define_strx)
    );
}

#[test]
fn test_string_index_resolved_through_unit_scope()
{
    let bytes = [
        0x05, 0x00, 0x00, // header
        0x0b, 0x02, 0x00, // define_strx line 2 index 0
        0x00,
    ];
    let mut dwarf = dwarf();
    dwarf.debug_str_offsets = DebugStrOffsets::from(EndianSlice::new(STR_OFFSETS, LittleEndian));
    let scope = StrOffsetsScope::new(Format::Dwarf32, DebugStrOffsetsBase(0));
    let context = GimliMacroContext::new(scan(&bytes).unwrap(), &dwarf, Some(scope));

    let def = context.define_undef(0).unwrap();
    assert_eq!(def.line, 2);
    assert_eq!(def.text.as_deref(), Some("BAR 2"));
}

#[test]
fn test_supplementary_text_without_sup_object()
{
    let bytes = [
        0x05, 0x00, 0x00, // header
        0x08, 0x01, 0x00, 0x00, 0x00, 0x00, // define_sup line 1 offset 0
        0x00,
    ];
    let dwarf = dwarf();
    let context = GimliMacroContext::new(scan(&bytes).unwrap(), &dwarf, None);

    let def = context.define_undef(0).unwrap();
    assert_eq!(def.text, None);
}

#[test]
fn test_split_strings()
{
    let entries = split_strings(b"int\0main\0\0tail");
    let summary: Vec<_> = entries
        .iter()
        .map(|entry| (entry.offset, entry.length, entry.text.as_str()))
        .collect();
    assert_eq!(summary, vec![(0, 3, "int"), (4, 4, "main"), (9, 0, ""), (10, 4, "tail")]);
    assert!(split_strings(b"").is_empty());
}

fn open_error(path: &str) -> DieWalkError
{
    match ObjectImage::open(path) {
        Ok(image) => panic!("{} opened as an object", image.path().display()),
        Err(err) => err,
    }
}

#[test]
fn test_open_missing_file()
{
    let err = open_error("/nonexistent/diewalk-input");
    assert!(matches!(err, DieWalkError::Io(_)));
    assert_eq!(err.primitive(), "io");
}

#[test]
fn test_open_non_object_file()
{
    let manifest = concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml");
    let err = open_error(manifest);
    assert!(matches!(err, DieWalkError::ObjectParse { .. }));
    assert!(format!("{}", err).contains("Cargo.toml"));
}

/// Write an x86-64 ELF relocatable holding `.text` and, when given, the
/// sections of `dwarf`.
fn write_object(name: &str, dwarf: Option<&mut DwarfUnit>) -> PathBuf
{
    let mut object = Object::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);
    let text = object.add_section(Vec::new(), b".text".to_vec(), SectionKind::Text);
    object.append_section_data(text, &[0xc3], 1);

    if let Some(dwarf) = dwarf {
        let mut sections = Sections::new(EndianVec::new(LittleEndian));
        dwarf.write(&mut sections).unwrap();
        sections
            .for_each(|id, data| -> Result<(), std::convert::Infallible> {
                if !data.slice().is_empty() {
                    let section = object.add_section(Vec::new(), id.name().as_bytes().to_vec(), SectionKind::Debug);
                    object.append_section_data(section, data.slice(), 1);
                }
                Ok(())
            })
            .unwrap();
    }

    let path = std::env::temp_dir().join(format!("diewalk-{}-{name}.o", std::process::id()));
    std::fs::write(&path, object.write().unwrap()).unwrap();
    path
}

fn add_named(dwarf: &mut DwarfUnit, parent: UnitEntryId, tag: gimli::DwTag, name: &str) -> UnitEntryId
{
    let id = dwarf.unit.add(parent, tag);
    dwarf
        .unit
        .get_mut(id)
        .set(constants::DW_AT_name, WriteValue::String(name.as_bytes().to_vec()));
    id
}

/// A unit shaped like a small C file: a base type, a structure with two
/// members, a function with a parameter and a nested block, a global.
fn shapes_unit() -> DwarfUnit
{
    let encoding = gimli::Encoding {
        format: Format::Dwarf32,
        version: 4,
        address_size: 8,
    };
    let mut dwarf = DwarfUnit::new(encoding);
    let root = dwarf.unit.root();
    dwarf
        .unit
        .get_mut(root)
        .set(constants::DW_AT_name, WriteValue::String(b"shapes.c".to_vec()));

    let int = add_named(&mut dwarf, root, constants::DW_TAG_base_type, "int");
    let point = add_named(&mut dwarf, root, constants::DW_TAG_structure_type, "point");
    for member in ["x", "y"] {
        let id = add_named(&mut dwarf, point, constants::DW_TAG_member, member);
        dwarf.unit.get_mut(id).set(constants::DW_AT_type, WriteValue::UnitRef(int));
    }
    let main = add_named(&mut dwarf, root, constants::DW_TAG_subprogram, "main");
    add_named(&mut dwarf, main, constants::DW_TAG_formal_parameter, "argc");
    let block = dwarf.unit.add(main, constants::DW_TAG_lexical_block);
    add_named(&mut dwarf, block, constants::DW_TAG_variable, "count");
    add_named(&mut dwarf, root, constants::DW_TAG_variable, "origin");
    dwarf
}

#[test]
fn test_object_without_debug_info()
{
    let path = write_object("stripped", None);
    let err = open_error(path.to_str().unwrap());
    let _ = std::fs::remove_file(&path);

    assert!(matches!(err, DieWalkError::ReaderInit(_)));
    assert_eq!(err.primitive(), "dwarf_init");
    assert!(format!("{}", err).contains(".debug_info"));
}

#[test]
fn test_walk_written_object()
{
    let mut dwarf = shapes_unit();
    let path = write_object("shapes", Some(&mut dwarf));
    let image = ObjectImage::open(&path).unwrap();
    assert!(image.has_section(".debug_abbrev"));
    assert!(!image.has_section(".debug_macro"));
    let mut reader = image.units().unwrap();
    let mut records: Vec<Record> = Vec::new();
    let summary = Session::new(SessionOptions::default()).run(&mut reader, &mut records).unwrap();
    let _ = std::fs::remove_file(&path);

    let walked: Vec<_> = records
        .iter()
        .filter_map(|record| match record {
            Record::Entry(entry) => {
                let name = entry.fields.iter().find_map(|field| match &field.value {
                    diewalk_core::records::FieldValue::Text(text) if field.name == constants::DW_AT_name => {
                        Some(text.clone())
                    }
                    _ => None,
                });
                Some((entry.tag, entry.depth, entry.has_children, name))
            }
            _ => None,
        })
        .collect();
    let named = |tag, depth, children, name: &str| (tag, depth, children, Some(name.to_string()));
    assert_eq!(
        walked,
        vec![
            named(constants::DW_TAG_base_type, 0, false, "int"),
            named(constants::DW_TAG_structure_type, 0, true, "point"),
            named(constants::DW_TAG_member, 1, false, "x"),
            named(constants::DW_TAG_member, 1, false, "y"),
            named(constants::DW_TAG_subprogram, 0, true, "main"),
            named(constants::DW_TAG_formal_parameter, 1, false, "argc"),
            (constants::DW_TAG_lexical_block, 1, true, None),
            named(constants::DW_TAG_variable, 2, false, "count"),
            named(constants::DW_TAG_variable, 0, false, "origin"),
        ]
    );
    assert!(matches!(&records[0], Record::Unit(unit) if unit.name.as_deref() == Some("shapes.c")));
    assert_eq!(summary.units, 1);
    assert_eq!(summary.entries, 9);
}

#[test]
fn test_walk_own_test_binary()
{
    let exe = std::env::current_exe().unwrap();
    let image = match ObjectImage::open(&exe) {
        Ok(image) => image,
        // Debug info lives outside the executable on this target.
        Err(DieWalkError::ReaderInit(_)) => return,
        Err(err) => panic!("{}", err),
    };

    let options = SessionOptions {
        unhandled: UnhandledTagPolicy::Walk,
        ..SessionOptions::default()
    };
    let mut reader = image.units().unwrap();
    let mut records: Vec<Record> = Vec::new();
    let summary = Session::new(options).run(&mut reader, &mut records).unwrap();

    assert!(summary.units > 0);
    assert!(summary.entries > 0);
    assert!(records.iter().any(|record| matches!(record, Record::Unit(_))));
}
