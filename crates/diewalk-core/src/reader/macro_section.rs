//! `.debug_macro` unit scanner.
//!
//! A macro unit is a small header followed by a stream of operations, each an
//! opcode byte and a list of operands whose forms are fixed per opcode (or
//! described by the header's opcode-operands table for vendor opcodes).
//!
//! [`MacroUnit::parse`] walks the stream once, recording for each operation
//! its offset, opcode and the byte slice holding its operands. Operand values
//! are decoded again on demand, so fetching the generic operator of an
//! operation and decoding its payload are independent steps. A stream that
//! cannot be split any further ends with a failed entry; every operation
//! before it stays usable.
//!
//! Both the DWARF 5 layout (version 5) and the GNU extension it was derived
//! from (version 4) are accepted. Their opcodes share numbering and operand
//! shapes.

use std::collections::HashMap;

use gimli::constants::{self, DwForm, DwMacro};
use gimli::{
    DebugStrOffset, DebugStrOffsetsBase, DebugStrOffsetsIndex, Dwarf, Endianity, Format, Reader, ReaderOffset, Unit,
};
use smallvec::{smallvec, SmallVec};
use tracing::{debug, trace};

use super::{DefUndef, FileBoundary, MacroContext, MacroHeader, MacroOperator};
use crate::error::MacroDecodeError;

type Forms = SmallVec<[DwForm; 4]>;
type DecodeResult<T> = std::result::Result<T, MacroDecodeError>;

const OFFSET_SIZE_FLAG: u8 = 0x01;
const LINE_OFFSET_FLAG: u8 = 0x02;
const OPERANDS_TABLE_FLAG: u8 = 0x04;

/// One operand value read from a macro operation.
#[derive(Debug, Clone)]
pub enum MacroOperand<R>
{
    /// `udata`, `dataN`, `flag`
    Constant(u64),
    /// `sdata`
    Signed(i64),
    /// Inline `string`
    Inline(R),
    /// Offset into `.debug_str` (`strp`) or `.debug_line_str`
    StrOffset(u64),
    /// Index into `.debug_str_offsets` (`strx`..`strx4`)
    StrIndex(u64),
    /// Offset into the supplementary object's `.debug_str`
    SupOffset(u64),
    /// Offset into another section (`sec_offset`)
    SecOffset(u64),
    /// Uninterpreted block
    Block(R),
}

/// One operation located by the scanner.
#[derive(Debug, Clone)]
pub struct ScannedOp<R>
{
    /// Offset of the opcode byte in `.debug_macro`
    pub section_offset: u64,
    /// Operator code
    pub code: DwMacro,
    /// Operand forms, in order
    pub forms: Forms,
    /// Bytes holding exactly the operands
    pub operands: R,
}

/// A scanned macro unit.
#[derive(Debug, Clone)]
pub struct MacroUnit<R>
{
    header: MacroHeader,
    format: Format,
    ops: Vec<DecodeResult<ScannedOp<R>>>,
}

impl<R: Reader> MacroUnit<R>
{
    /// Scan the macro unit starting at `offset` of `section`.
    ///
    /// Fails only when the header itself is unreadable. A damaged operation
    /// stream is kept as a trailing failed entry.
    pub fn parse(section: &R, offset: u64) -> DecodeResult<Self>
    {
        let mut input = section.clone();
        input.skip(R::Offset::from_u64(offset)?)?;
        let start = input.clone();

        let version = input.read_u16()?;
        if !(4..=5).contains(&version) {
            return Err(MacroDecodeError::UnsupportedVersion(version));
        }

        let flags = input.read_u8()?;
        let format = if flags & OFFSET_SIZE_FLAG != 0 {
            Format::Dwarf64
        } else {
            Format::Dwarf32
        };
        let line_offset = if flags & LINE_OFFSET_FLAG != 0 {
            Some(input.read_offset(format)?.into_u64())
        } else {
            None
        };

        let mut operand_table: HashMap<u8, Forms> = HashMap::new();
        if flags & OPERANDS_TABLE_FLAG != 0 {
            let count = input.read_u8()?;
            for _ in 0..count {
                let opcode = input.read_u8()?;
                let form_count = input.read_uleb128()?;
                let mut forms = Forms::new();
                for _ in 0..form_count {
                    forms.push(DwForm(input.read_uleb128_u16()?));
                }
                operand_table.insert(opcode, forms);
            }
        }

        let mut ops = Vec::new();
        while !input.is_empty() {
            let section_offset = offset + input.offset_from(&start).into_u64();
            match scan_op(&mut input, &operand_table, format, section_offset) {
                Ok(op) => {
                    let terminator = op.code.0 == 0;
                    ops.push(Ok(op));
                    if terminator {
                        break;
                    }
                }
                Err(err) => {
                    debug!(section_offset, error = %err, "macro stream cannot be split further");
                    ops.push(Err(err));
                    break;
                }
            }
        }

        let data_len = input.offset_from(&start).into_u64();
        trace!(offset, version, ops = ops.len(), data_len, "scanned macro unit");

        Ok(Self {
            header: MacroHeader {
                offset,
                version,
                op_count: ops.len(),
                data_len,
                line_offset,
            },
            format,
            ops,
        })
    }

    /// Header facts.
    pub fn header(&self) -> MacroHeader
    {
        self.header
    }

    /// Scanned operation at `index`.
    pub fn op(&self, index: usize) -> DecodeResult<&ScannedOp<R>>
    {
        match self.ops.get(index) {
            Some(Ok(op)) => Ok(op),
            Some(Err(err)) => Err(err.clone()),
            None => Err(MacroDecodeError::IndexOutOfRange(index)),
        }
    }

    /// Decode every operand of `op`.
    pub fn operands(&self, op: &ScannedOp<R>) -> DecodeResult<SmallVec<[MacroOperand<R>; 2]>>
    {
        let mut input = op.operands.clone();
        op.forms
            .iter()
            .map(|form| read_operand(&mut input, *form, self.format))
            .collect()
    }
}

fn scan_op<R: Reader>(
    input: &mut R,
    operand_table: &HashMap<u8, Forms>,
    format: Format,
    section_offset: u64,
) -> DecodeResult<ScannedOp<R>>
{
    let code = DwMacro(input.read_u8()?);
    if code.0 == 0 {
        let mut operands = input.clone();
        operands.empty();
        return Ok(ScannedOp {
            section_offset,
            code,
            forms: Forms::new(),
            operands,
        });
    }

    let forms = operand_table
        .get(&code.0)
        .cloned()
        .or_else(|| standard_forms(code))
        .ok_or(MacroDecodeError::UnknownOpcode(code.0))?;

    let operands_start = input.clone();
    for form in &forms {
        read_operand(input, *form, format)?;
    }
    let length = input.offset_from(&operands_start);
    let mut operands = operands_start;
    operands.truncate(length)?;

    Ok(ScannedOp {
        section_offset,
        code,
        forms,
        operands,
    })
}

fn standard_forms(code: DwMacro) -> Option<Forms>
{
    let forms: Forms = match code {
        constants::DW_MACRO_define | constants::DW_MACRO_undef => {
            smallvec![constants::DW_FORM_udata, constants::DW_FORM_string]
        }
        constants::DW_MACRO_start_file => smallvec![constants::DW_FORM_udata, constants::DW_FORM_udata],
        constants::DW_MACRO_end_file => Forms::new(),
        constants::DW_MACRO_define_strp | constants::DW_MACRO_undef_strp => {
            smallvec![constants::DW_FORM_udata, constants::DW_FORM_strp]
        }
        constants::DW_MACRO_import | constants::DW_MACRO_import_sup => smallvec![constants::DW_FORM_sec_offset],
        constants::DW_MACRO_define_sup | constants::DW_MACRO_undef_sup => {
            smallvec![constants::DW_FORM_udata, constants::DW_FORM_strp_sup]
        }
        constants::DW_MACRO_define_strx | constants::DW_MACRO_undef_strx => {
            smallvec![constants::DW_FORM_udata, constants::DW_FORM_strx]
        }
        _ => return None,
    };
    Some(forms)
}

fn read_operand<R: Reader>(input: &mut R, form: DwForm, format: Format) -> DecodeResult<MacroOperand<R>>
{
    let operand = match form {
        constants::DW_FORM_udata => MacroOperand::Constant(input.read_uleb128()?),
        constants::DW_FORM_sdata => MacroOperand::Signed(input.read_sleb128()?),
        constants::DW_FORM_data1 | constants::DW_FORM_flag => MacroOperand::Constant(input.read_u8()?.into()),
        constants::DW_FORM_data2 => MacroOperand::Constant(input.read_u16()?.into()),
        constants::DW_FORM_data4 => MacroOperand::Constant(input.read_u32()?.into()),
        constants::DW_FORM_data8 => MacroOperand::Constant(input.read_u64()?),
        constants::DW_FORM_flag_present => MacroOperand::Constant(1),
        constants::DW_FORM_string => MacroOperand::Inline(input.read_null_terminated_slice()?),
        constants::DW_FORM_strp | constants::DW_FORM_line_strp => {
            MacroOperand::StrOffset(input.read_offset(format)?.into_u64())
        }
        constants::DW_FORM_strp_sup | constants::DW_FORM_GNU_strp_alt => {
            MacroOperand::SupOffset(input.read_offset(format)?.into_u64())
        }
        constants::DW_FORM_sec_offset => MacroOperand::SecOffset(input.read_offset(format)?.into_u64()),
        constants::DW_FORM_strx => MacroOperand::StrIndex(input.read_uleb128()?),
        constants::DW_FORM_strx1 => MacroOperand::StrIndex(input.read_u8()?.into()),
        constants::DW_FORM_strx2 => MacroOperand::StrIndex(input.read_u16()?.into()),
        constants::DW_FORM_strx3 => MacroOperand::StrIndex(read_u24(input)?),
        constants::DW_FORM_strx4 => MacroOperand::StrIndex(input.read_u32()?.into()),
        constants::DW_FORM_block => {
            let length = input.read_uleb128()?;
            MacroOperand::Block(input.split(R::Offset::from_u64(length)?)?)
        }
        constants::DW_FORM_block1 => {
            let length = u64::from(input.read_u8()?);
            MacroOperand::Block(input.split(R::Offset::from_u64(length)?)?)
        }
        constants::DW_FORM_block2 => {
            let length = u64::from(input.read_u16()?);
            MacroOperand::Block(input.split(R::Offset::from_u64(length)?)?)
        }
        constants::DW_FORM_block4 => {
            let length = u64::from(input.read_u32()?);
            MacroOperand::Block(input.split(R::Offset::from_u64(length)?)?)
        }
        other => return Err(MacroDecodeError::UnsupportedForm(other)),
    };
    Ok(operand)
}

fn read_u24<R: Reader>(input: &mut R) -> DecodeResult<u64>
{
    let bytes = [input.read_u8()?, input.read_u8()?, input.read_u8()?];
    let [b0, b1, b2] = bytes.map(u64::from);
    Ok(if input.endian().is_big_endian() {
        (b0 << 16) | (b1 << 8) | b2
    } else {
        b0 | (b1 << 8) | (b2 << 16)
    })
}

/// Where `_strx` indices of a macro unit are resolved.
///
/// String-offsets indices are relative to the base of the compilation unit
/// that names (or imports) the macro unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrOffsetsScope<O>
{
    pub format: Format,
    pub base: DebugStrOffsetsBase<O>,
}

impl<O: ReaderOffset> StrOffsetsScope<O>
{
    pub fn new(format: Format, base: DebugStrOffsetsBase<O>) -> Self
    {
        Self { format, base }
    }

    /// Scope of a parsed compilation unit.
    pub fn of_unit<R: Reader<Offset = O>>(unit: &Unit<R>) -> Self
    {
        Self::new(unit.encoding().format, unit.str_offsets_base)
    }
}

/// Macro context backed by a scanned unit and the DWARF string tables.
///
/// A context acquired without a [`StrOffsetsScope`] rejects `_strx`
/// operators.
pub struct GimliMacroContext<'a, R: Reader>
{
    table: MacroUnit<R>,
    dwarf: &'a Dwarf<R>,
    scope: Option<StrOffsetsScope<R::Offset>>,
}

impl<'a, R: Reader> GimliMacroContext<'a, R>
{
    pub fn new(table: MacroUnit<R>, dwarf: &'a Dwarf<R>, scope: Option<StrOffsetsScope<R::Offset>>) -> Self
    {
        Self { table, dwarf, scope }
    }

    fn resolve_text(&self, code: DwMacro, operand: &MacroOperand<R>) -> DecodeResult<Option<String>>
    {
        let reader = match operand {
            MacroOperand::Inline(text) => text.clone(),
            MacroOperand::StrOffset(offset) => self.dwarf.debug_str.get_str(DebugStrOffset(R::Offset::from_u64(*offset)?))?,
            MacroOperand::StrIndex(index) => {
                let scope = self.scope.ok_or(MacroDecodeError::OperandLayout(code))?;
                let offset = self.dwarf.debug_str_offsets.get_str_offset(
                    scope.format,
                    scope.base,
                    DebugStrOffsetsIndex(R::Offset::from_u64(*index)?),
                )?;
                self.dwarf.string(offset)?
            }
            MacroOperand::SupOffset(offset) => {
                let Some(sup) = self.dwarf.sup() else {
                    return Ok(None);
                };
                sup.debug_str.get_str(DebugStrOffset(R::Offset::from_u64(*offset)?))?
            }
            _ => return Err(MacroDecodeError::OperandLayout(code)),
        };
        Ok(Some(reader.to_string_lossy()?.into_owned()))
    }
}

impl<R: Reader> MacroContext for GimliMacroContext<'_, R>
{
    fn header(&self) -> MacroHeader
    {
        self.table.header()
    }

    fn operator(&self, index: usize) -> DecodeResult<MacroOperator>
    {
        let op = self.table.op(index)?;
        Ok(MacroOperator {
            section_offset: op.section_offset,
            code: op.code,
            form_count: u16::try_from(op.forms.len()).unwrap_or(u16::MAX),
        })
    }

    fn define_undef(&self, index: usize) -> DecodeResult<DefUndef>
    {
        let op = self.table.op(index)?;
        if !is_define_undef(op.code) {
            return Err(MacroDecodeError::WrongOperator(op.code));
        }
        let operands = self.table.operands(op)?;
        let [MacroOperand::Constant(line), text_operand] = operands.as_slice() else {
            return Err(MacroDecodeError::OperandLayout(op.code));
        };

        let (index, str_offset) = match text_operand {
            MacroOperand::StrIndex(index) => (*index, 0),
            MacroOperand::StrOffset(offset) | MacroOperand::SupOffset(offset) => (0, *offset),
            _ => (0, 0),
        };

        Ok(DefUndef {
            line: *line,
            index,
            str_offset,
            form_count: u16::try_from(op.forms.len()).unwrap_or(u16::MAX),
            text: self.resolve_text(op.code, text_operand)?,
        })
    }

    fn file_boundary(&self, index: usize) -> DecodeResult<FileBoundary>
    {
        let op = self.table.op(index)?;
        match op.code {
            constants::DW_MACRO_start_file => {
                let operands = self.table.operands(op)?;
                let [MacroOperand::Constant(line), MacroOperand::Constant(file_index)] = operands.as_slice() else {
                    return Err(MacroDecodeError::OperandLayout(op.code));
                };
                Ok(FileBoundary {
                    line: *line,
                    file_index: *file_index,
                })
            }
            constants::DW_MACRO_end_file => Ok(FileBoundary::default()),
            other => Err(MacroDecodeError::WrongOperator(other)),
        }
    }

    fn import(&self, index: usize) -> DecodeResult<u64>
    {
        let op = self.table.op(index)?;
        if !matches!(op.code, constants::DW_MACRO_import | constants::DW_MACRO_import_sup) {
            return Err(MacroDecodeError::WrongOperator(op.code));
        }
        match self.table.operands(op)?.as_slice() {
            [MacroOperand::SecOffset(offset)] => Ok(*offset),
            _ => Err(MacroDecodeError::OperandLayout(op.code)),
        }
    }
}

/// Whether `code` is one of the define/undef encodings.
pub fn is_define_undef(code: DwMacro) -> bool
{
    matches!(
        code,
        constants::DW_MACRO_define
            | constants::DW_MACRO_undef
            | constants::DW_MACRO_define_strp
            | constants::DW_MACRO_undef_strp
            | constants::DW_MACRO_define_strx
            | constants::DW_MACRO_undef_strx
            | constants::DW_MACRO_define_sup
            | constants::DW_MACRO_undef_sup
    )
}
