//! # Decoded records
//!
//! Everything a run produces is delivered as a stream of [`Record`]s to a
//! [`RecordSink`]. Decoding never formats text; renderers downstream decide
//! how a record looks.
//!
//! ## Stream order
//!
//! For each compilation unit:
//!
//! 1. [`Record::Unit`]
//! 2. [`Record::MacroContext`] followed by its [`Record::Macro`] events
//! 3. [`Record::Entry`] for every handled entry, depth-first
//!
//! Then one `MacroContext` + `Macro` group per drained import, then
//! [`Record::DebugString`] entries when the string table dump is enabled.

use gimli::constants::{DwAt, DwMacro, DwTag};
use smallvec::SmallVec;

use crate::attributes::ExpressionBlock;
use crate::error::Result;
use crate::reader::{MacroHeader, StringEntry};

/// Decoded fields of one entry, in handler order.
pub type Fields = SmallVec<[Field; 8]>;

/// One item of the output stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record
{
    Unit(UnitRecord),
    Entry(EntryRecord),
    MacroContext(MacroContextRecord),
    Macro(MacroRecord),
    DebugString(StringEntry),
}

/// Summary of a compilation unit, read from its root entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitRecord
{
    /// Offset of the unit header in `.debug_info`
    pub offset: u64,
    pub producer: Option<String>,
    /// `DW_AT_language` code
    pub language: Option<u64>,
    pub name: Option<String>,
    pub comp_dir: Option<String>,
    /// `.debug_macro` offset named by the root entry
    pub macro_offset: Option<u64>,
    /// Declared source files, in order
    pub files: Vec<String>,
}

/// A handled entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRecord
{
    /// Unit-relative offset
    pub offset: u64,
    pub tag: DwTag,
    /// Nesting depth below the unit root (0 for the root's children)
    pub depth: usize,
    pub has_children: bool,
    pub fields: Fields,
}

/// One decoded attribute of an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field
{
    pub name: DwAt,
    pub value: FieldValue,
}

impl Field
{
    pub fn new(name: DwAt, value: FieldValue) -> Self
    {
        Self { name, value }
    }
}

/// Value of a decoded field.
///
/// Unsigned, reference, address and flag reads fall back to zero values when
/// the attribute is missing, so only strings and files distinguish absence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue
{
    Text(String),
    /// Missing or unreadable string
    Missing,
    Unsigned(u64),
    /// Entry reference or section offset
    Reference(u64),
    Address(u64),
    Flag(bool),
    /// Resolved declaration file; `None` for index 0 or an unknown index
    File(Option<String>),
    Expression(ExpressionBlock),
    /// Linkage name with its demangled form when one exists
    Symbol
    {
        raw: String,
        demangled: Option<String>,
    },
}

/// Where a macro context came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroOrigin
{
    /// Named by a unit's root entry
    Unit
    {
        unit_offset: u64,
    },
    /// Reached through an import operation
    Import,
}

/// Header of a decoded macro context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacroContextRecord
{
    pub origin: MacroOrigin,
    pub header: MacroHeader,
}

/// One decoded macro operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroRecord
{
    /// Operation index inside its context
    pub index: usize,
    /// Offset of the operation in `.debug_macro`
    pub section_offset: u64,
    pub operator: DwMacro,
    pub event: MacroEvent,
}

/// Operator-specific payload of a macro operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacroEvent
{
    Define
    {
        line: u64,
        text: Option<String>,
    },
    Undef
    {
        line: u64,
        text: Option<String>,
    },
    StartFile
    {
        line: u64,
        file_index: u64,
        /// Path resolved through the unit's file table
        path: Option<String>,
    },
    EndFile,
    /// Import of another context in this `.debug_macro`; queued for decoding
    Import
    {
        offset: u64,
    },
    /// Import from the supplementary object; reported only
    ImportSup
    {
        offset: u64,
    },
    /// Operator without a decoder
    Vendor
    {
        form_count: u16,
    },
}

/// Consumer of the record stream.
pub trait RecordSink
{
    fn record(&mut self, record: Record) -> Result<()>;
}

impl RecordSink for Vec<Record>
{
    fn record(&mut self, record: Record) -> Result<()>
    {
        self.push(record);
        Ok(())
    }
}
