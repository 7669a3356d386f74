//! # Debug-info reader interface
//!
//! The traversal engine never touches section bytes. It talks to a reader
//! through the traits in this module:
//!
//! - [`DebugInfoReader`]: forward cursor over compilation units, plus
//!   access to imported macro contexts and the string table
//! - [`CompilationUnit`]: one unit's root entry, declared file list and macro
//!   contexts
//! - [`EntrySource`]: tag, navigation and attribute queries on entries
//! - [`MacroContext`]: indexed access to the operations of one macro unit
//!
//! [`ObjectImage`] is the concrete backend built on `object` and `gimli`.
//! Tests drive the engine with synthetic implementations of the same traits.

mod image;
pub mod macro_section;
mod unit;

use gimli::constants::{DwAt, DwMacro, DwTag};

pub use image::{split_strings, GimliReader, ObjectImage};
pub use macro_section::{is_define_undef, StrOffsetsScope};
pub use unit::GimliUnit;

use crate::error::{MacroDecodeError, Result};

/// Identifies an entry inside its compilation unit (unit-relative offset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(pub u64);

impl EntryId
{
    /// Raw offset value.
    #[must_use]
    pub const fn value(self) -> u64
    {
        self.0
    }
}

/// Attribute value as delivered by the reader, before kind checking.
///
/// Readers resolve indirections they own (string sections, address
/// tables) and normalise the many fixed-size data forms to
/// [`FormValue::Unsigned`]. Everything else is passed through so the
/// accessor can decide whether it matches the requested kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormValue
{
    /// Resolved string (inline or from a string section).
    String(String),
    /// Unsigned constant (`data1`..`data8`, `udata`, enumerated constants).
    Unsigned(u64),
    /// Signed constant (`sdata`).
    Signed(i64),
    /// Reference to an entry in the same unit.
    UnitRef(u64),
    /// Reference to an entry anywhere in `.debug_info`.
    SectionRef(u64),
    /// Offset into another debug section (`sec_offset` and friends).
    SectionOffset(u64),
    /// Target address.
    Address(u64),
    /// Boolean flag.
    Flag(bool),
    /// DWARF expression bytes (`exprloc`).
    Expression(Vec<u8>),
    /// Uninterpreted block (`block`, `block1`..`block4`).
    Block(Vec<u8>),
    /// Form the reader does not map; carries the raw form code when known.
    Unsupported(u16),
}

/// Entry queries the traversal engine needs.
pub trait EntrySource
{
    /// Read the tag of an entry. Failure is fatal for the run.
    fn tag(&self, entry: EntryId) -> Result<DwTag>;

    /// First child of an entry, if it has any.
    fn first_child(&self, entry: EntryId) -> Result<Option<EntryId>>;

    /// Next sibling of an entry, if any remain.
    fn next_sibling(&self, entry: EntryId) -> Result<Option<EntryId>>;

    /// Look up one attribute. Read errors are reported as absence.
    fn attribute(&self, entry: EntryId, name: DwAt) -> Option<FormValue>;
}

/// One compilation unit yielded by [`DebugInfoReader::next_unit`].
pub trait CompilationUnit: EntrySource
{
    /// Offset of the unit header in `.debug_info`.
    fn offset(&self) -> u64;

    /// This unit as a plain entry source.
    fn as_entries(&self) -> &dyn EntrySource;

    /// The unit's root entry (normally `DW_TAG_compile_unit`).
    fn root(&self) -> Result<EntryId>;

    /// Declared source files, arranged so that element `N - 1` is the file
    /// referenced by index `N`.
    fn source_files(&self) -> Result<Vec<String>>;

    /// Macro context named by the root entry, or `None` when the unit has
    /// no macro information.
    fn macro_context(&self) -> Result<Option<Box<dyn MacroContext + '_>>>;

    /// Macro context at an explicit `.debug_macro` offset, resolved with
    /// this unit's string tables.
    fn macro_context_at(&self, offset: u64) -> Result<Box<dyn MacroContext + '_>>;
}

/// Forward-only cursor over the compilation units of one binary.
pub trait DebugInfoReader
{
    /// Advance to the next unit. `None` once every unit has been visited.
    fn next_unit(&mut self) -> Result<Option<Box<dyn CompilationUnit + '_>>>;

    /// Macro context at an explicit offset, outside of unit processing.
    ///
    /// `importer` is the `.debug_info` offset of the unit whose macros
    /// (directly or transitively) imported this context. Readers resolve
    /// string-offsets indices against that unit when they can.
    fn macro_context_at(&self, offset: u64, importer: Option<u64>) -> Result<Box<dyn MacroContext + '_>>;

    /// Every NUL-terminated string of `.debug_str`.
    fn string_table(&self) -> Result<Vec<StringEntry>>
    {
        Ok(Vec::new())
    }
}

/// Header facts of one macro context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacroHeader
{
    /// Offset of the macro unit in `.debug_macro`
    pub offset: u64,
    /// Macro unit version (4 for the GNU extension, 5 for DWARF 5)
    pub version: u16,
    /// Number of operations, including the terminator when present
    pub op_count: usize,
    /// Byte length of the unit, header included
    pub data_len: u64,
    /// `.debug_line` offset from the header, when the flag is set
    pub line_offset: Option<u64>,
}

/// Generic part of a macro operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacroOperator
{
    /// Offset of the operation in `.debug_macro`
    pub section_offset: u64,
    /// Operator code
    pub code: DwMacro,
    /// Number of operand forms the operation carries
    pub form_count: u16,
}

/// Payload of a define/undef operation in any of its encodings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefUndef
{
    /// Source line of the directive
    pub line: u64,
    /// String-offsets index for `_strx` operators, 0 otherwise
    pub index: u64,
    /// String-section offset for `_strp`/`_sup` operators, 0 otherwise
    pub str_offset: u64,
    /// Number of operand forms
    pub form_count: u16,
    /// Macro text (`NAME value` or `NAME`); `None` when it lives in an
    /// object that is not loaded
    pub text: Option<String>,
}

/// Payload of a start-file/end-file operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileBoundary
{
    /// Line of the `#include` directive (0 for end-file)
    pub line: u64,
    /// Line-table file index (0 for end-file)
    pub file_index: u64,
}

/// One string of `.debug_str`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringEntry
{
    /// Offset of the first byte
    pub offset: u64,
    /// Length in bytes, excluding the terminator
    pub length: u64,
    /// Lossily decoded text
    pub text: String,
}

/// Indexed access to the operations of one macro context.
///
/// The generic operator and the operator-specific payload are fetched
/// separately, so a decoder can tell an unreadable operation apart from a
/// recognised operation with a corrupt payload.
pub trait MacroContext
{
    /// Header facts.
    fn header(&self) -> MacroHeader;

    /// Generic operator of operation `index`.
    fn operator(&self, index: usize) -> std::result::Result<MacroOperator, MacroDecodeError>;

    /// Define/undef payload of operation `index`.
    fn define_undef(&self, index: usize) -> std::result::Result<DefUndef, MacroDecodeError>;

    /// Start-file/end-file payload of operation `index`.
    fn file_boundary(&self, index: usize) -> std::result::Result<FileBoundary, MacroDecodeError>;

    /// Target offset of an import operation.
    fn import(&self, index: usize) -> std::result::Result<u64, MacroDecodeError>;
}
