//! Standard tag handlers.

use gimli::constants::{self, DwAt};
use smallvec::smallvec;

use super::{DecodeFn, KnownTag, TagHandler};
use crate::attributes::{AttributeAccessor, Presence};
use crate::demangle::make_symbol;
use crate::files::SourceFileTable;
use crate::records::{Field, FieldValue, Fields};

/// The built-in handler for a known tag.
pub fn standard_handler(tag: KnownTag) -> TagHandler
{
    match tag {
        KnownTag::EnumerationType => handler(enumeration_type, true),
        KnownTag::Enumerator => handler(enumerator, false),
        KnownTag::BaseType => handler(base_type, false),
        KnownTag::Typedef => handler(typedef, false),
        KnownTag::ArrayType => handler(array_type, true),
        KnownTag::SubrangeType => handler(subrange_type, false),
        KnownTag::PointerType => handler(pointer_type, false),
        KnownTag::SubroutineType => handler(subroutine_type, true),
        KnownTag::StructureType => handler(structure_type, true),
        KnownTag::Member => handler(member, false),
        KnownTag::FormalParameter => handler(formal_parameter, false),
        KnownTag::LexicalBlock => handler(lexical_block, true),
        KnownTag::Subprogram => handler(subprogram, true),
        KnownTag::Variable => handler(variable, false),
    }
}

fn handler(decode: DecodeFn, descends: bool) -> TagHandler
{
    TagHandler { decode, descends }
}

fn text(attrs: &AttributeAccessor<'_>, name: DwAt) -> Field
{
    let value = attrs.string(name).ok().map_or(FieldValue::Missing, FieldValue::Text);
    Field::new(name, value)
}

fn unsigned(attrs: &AttributeAccessor<'_>, name: DwAt) -> Field
{
    Field::new(name, FieldValue::Unsigned(attrs.unsigned(name).value))
}

fn reference(attrs: &AttributeAccessor<'_>, name: DwAt) -> Field
{
    Field::new(name, FieldValue::Reference(attrs.reference(name).value))
}

fn address(attrs: &AttributeAccessor<'_>, name: DwAt) -> Field
{
    Field::new(name, FieldValue::Address(attrs.address(name).value))
}

fn flag(attrs: &AttributeAccessor<'_>, name: DwAt) -> Field
{
    Field::new(name, FieldValue::Flag(attrs.flag(name).value))
}

fn expression(attrs: &AttributeAccessor<'_>, name: DwAt) -> Field
{
    Field::new(name, FieldValue::Expression(attrs.expression(name).value))
}

fn decl_file(attrs: &AttributeAccessor<'_>, files: &SourceFileTable) -> Field
{
    let index = attrs.unsigned(constants::DW_AT_decl_file).value;
    Field::new(constants::DW_AT_decl_file, FieldValue::File(files.get(index).map(str::to_owned)))
}

// DWARF 4+ stores high_pc as an offset from low_pc; older producers use an address.
fn high_pc(attrs: &AttributeAccessor<'_>) -> Field
{
    let offset = attrs.unsigned(constants::DW_AT_high_pc);
    if offset.presence == Presence::Malformed {
        return address(attrs, constants::DW_AT_high_pc);
    }
    Field::new(constants::DW_AT_high_pc, FieldValue::Unsigned(offset.value))
}

fn linkage_name(attrs: &AttributeAccessor<'_>) -> Field
{
    let value = attrs
        .string(constants::DW_AT_linkage_name)
        .ok()
        .map_or(FieldValue::Missing, make_symbol);
    Field::new(constants::DW_AT_linkage_name, value)
}

fn enumeration_type(attrs: &AttributeAccessor<'_>, files: &SourceFileTable) -> Fields
{
    smallvec![
        text(attrs, constants::DW_AT_name),
        unsigned(attrs, constants::DW_AT_encoding),
        unsigned(attrs, constants::DW_AT_byte_size),
        decl_file(attrs, files),
        unsigned(attrs, constants::DW_AT_decl_line),
        unsigned(attrs, constants::DW_AT_decl_column),
        reference(attrs, constants::DW_AT_type),
        reference(attrs, constants::DW_AT_sibling),
    ]
}

fn enumerator(attrs: &AttributeAccessor<'_>, _files: &SourceFileTable) -> Fields
{
    smallvec![
        text(attrs, constants::DW_AT_name),
        unsigned(attrs, constants::DW_AT_const_value),
    ]
}

fn base_type(attrs: &AttributeAccessor<'_>, _files: &SourceFileTable) -> Fields
{
    smallvec![
        text(attrs, constants::DW_AT_name),
        reference(attrs, constants::DW_AT_type),
        unsigned(attrs, constants::DW_AT_byte_size),
    ]
}

fn typedef(attrs: &AttributeAccessor<'_>, files: &SourceFileTable) -> Fields
{
    smallvec![
        text(attrs, constants::DW_AT_name),
        decl_file(attrs, files),
        unsigned(attrs, constants::DW_AT_decl_line),
        unsigned(attrs, constants::DW_AT_decl_column),
        reference(attrs, constants::DW_AT_type),
    ]
}

fn array_type(attrs: &AttributeAccessor<'_>, _files: &SourceFileTable) -> Fields
{
    smallvec![
        reference(attrs, constants::DW_AT_type),
        reference(attrs, constants::DW_AT_sibling),
    ]
}

fn subrange_type(attrs: &AttributeAccessor<'_>, _files: &SourceFileTable) -> Fields
{
    smallvec![
        reference(attrs, constants::DW_AT_type),
        unsigned(attrs, constants::DW_AT_upper_bound),
    ]
}

fn pointer_type(attrs: &AttributeAccessor<'_>, _files: &SourceFileTable) -> Fields
{
    smallvec![
        unsigned(attrs, constants::DW_AT_byte_size),
        reference(attrs, constants::DW_AT_type),
    ]
}

fn subroutine_type(attrs: &AttributeAccessor<'_>, _files: &SourceFileTable) -> Fields
{
    smallvec![reference(attrs, constants::DW_AT_sibling)]
}

fn structure_type(attrs: &AttributeAccessor<'_>, files: &SourceFileTable) -> Fields
{
    smallvec![
        text(attrs, constants::DW_AT_name),
        unsigned(attrs, constants::DW_AT_byte_size),
        decl_file(attrs, files),
        unsigned(attrs, constants::DW_AT_decl_line),
        unsigned(attrs, constants::DW_AT_decl_column),
        reference(attrs, constants::DW_AT_sibling),
    ]
}

fn member(attrs: &AttributeAccessor<'_>, files: &SourceFileTable) -> Fields
{
    smallvec![
        text(attrs, constants::DW_AT_name),
        decl_file(attrs, files),
        unsigned(attrs, constants::DW_AT_decl_line),
        unsigned(attrs, constants::DW_AT_decl_column),
        reference(attrs, constants::DW_AT_type),
        unsigned(attrs, constants::DW_AT_data_member_location),
    ]
}

fn formal_parameter(attrs: &AttributeAccessor<'_>, files: &SourceFileTable) -> Fields
{
    smallvec![
        text(attrs, constants::DW_AT_name),
        decl_file(attrs, files),
        unsigned(attrs, constants::DW_AT_decl_line),
        unsigned(attrs, constants::DW_AT_decl_column),
        reference(attrs, constants::DW_AT_type),
        expression(attrs, constants::DW_AT_location),
    ]
}

fn lexical_block(attrs: &AttributeAccessor<'_>, _files: &SourceFileTable) -> Fields
{
    smallvec![
        address(attrs, constants::DW_AT_low_pc),
        high_pc(attrs),
        reference(attrs, constants::DW_AT_sibling),
    ]
}

fn subprogram(attrs: &AttributeAccessor<'_>, files: &SourceFileTable) -> Fields
{
    smallvec![
        flag(attrs, constants::DW_AT_external),
        text(attrs, constants::DW_AT_name),
        decl_file(attrs, files),
        unsigned(attrs, constants::DW_AT_decl_line),
        unsigned(attrs, constants::DW_AT_decl_column),
        linkage_name(attrs),
        reference(attrs, constants::DW_AT_type),
        address(attrs, constants::DW_AT_low_pc),
        high_pc(attrs),
        expression(attrs, constants::DW_AT_frame_base),
        reference(attrs, constants::DW_AT_sibling),
    ]
}

fn variable(attrs: &AttributeAccessor<'_>, files: &SourceFileTable) -> Fields
{
    smallvec![
        text(attrs, constants::DW_AT_name),
        decl_file(attrs, files),
        unsigned(attrs, constants::DW_AT_decl_line),
        unsigned(attrs, constants::DW_AT_decl_column),
        flag(attrs, constants::DW_AT_external),
        reference(attrs, constants::DW_AT_type),
        expression(attrs, constants::DW_AT_location),
    ]
}
