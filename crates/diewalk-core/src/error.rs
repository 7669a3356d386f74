//! # Error Types
//!
//! Error handling for the traversal engine and its reader backends.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.
//!
//! Only fatal conditions are represented here. Recoverable conditions (absent
//! or malformed attributes, unhandled tags, unreadable macro operator codes)
//! are absorbed by the component that detects them and never surface as a
//! [`DieWalkError`].

use gimli::constants::{DwForm, DwMacro};
use thiserror::Error;

/// Main error type for a diewalk run
///
/// ## Error Categories
///
/// 1. **Input errors**: Io, ObjectParse, ReaderInit
/// 2. **Protocol errors**: UnitCursor, TagUnreadable, MacroContext, MacroPayload, Dwarf
/// 3. **Configuration errors**: Registration
#[derive(Error, Debug)]
pub enum DieWalkError
{
    /// I/O error while reading the input binary or writing rendered output.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The input file is not an object container we can read.
    #[error("Failed to parse object file {path}: {details}")]
    ObjectParse
    {
        /// Path of the rejected input
        path: String,
        /// Parser diagnostic
        details: String,
    },

    /// The debug-info reader could not be initialised over the loaded sections.
    #[error("Failed to initialise DWARF reader: {0}")]
    ReaderInit(String),

    /// The compilation-unit cursor could not advance or materialise a unit.
    #[error("Failed to read compilation unit: {0}")]
    UnitCursor(String),

    /// The tag of an entry could not be read.
    ///
    /// Sibling iteration cannot continue without a valid tag, so this aborts
    /// the whole run.
    #[error("Unreadable tag for entry at <0x{offset:08x}>: {details}")]
    TagUnreadable
    {
        /// Unit-relative offset of the entry
        offset: u64,
        /// Reader diagnostic
        details: String,
    },

    /// A macro context could not be acquired at the given `.debug_macro` offset.
    #[error("Failed to acquire macro context at 0x{offset:08x}: {details}")]
    MacroContext
    {
        /// Offset of the macro unit header
        offset: u64,
        /// Reader diagnostic
        details: String,
    },

    /// The payload of a recognised macro operation could not be decoded.
    #[error("Failed to decode {operator} payload at operation [{index}]: {details}")]
    MacroPayload
    {
        /// Operation index inside its macro context
        index: usize,
        /// Operator whose payload failed
        operator: DwMacro,
        /// Reader diagnostic
        details: String,
    },

    /// A DWARF read failed outside of the more specific categories above.
    #[error("{context}: {details}")]
    Dwarf
    {
        /// What was being read
        context: String,
        /// Reader diagnostic
        details: String,
    },

    /// A handler registration was rejected by the dispatch table.
    #[error("Invalid handler registration: {0}")]
    Registration(String),
}

impl DieWalkError
{
    /// Name of the primitive that failed, for user-facing diagnostics.
    #[must_use]
    pub fn primitive(&self) -> &'static str
    {
        match self {
            Self::Io(_) => "io",
            Self::ObjectParse { .. } => "object_parse",
            Self::ReaderInit(_) => "dwarf_init",
            Self::UnitCursor(_) => "next_unit",
            Self::TagUnreadable { .. } => "entry_tag",
            Self::MacroContext { .. } => "macro_context",
            Self::MacroPayload { .. } => "macro_payload",
            Self::Dwarf { .. } => "dwarf_read",
            Self::Registration(_) => "register_handler",
        }
    }
}

/// Low-level failure while scanning or decoding a `.debug_macro` unit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MacroDecodeError
{
    /// The underlying reader ran out of data or hit an invalid encoding.
    #[error("read failed: {0}")]
    Read(#[from] gimli::Error),

    /// The macro unit header carries a version we do not understand.
    #[error("unsupported macro unit version {0}")]
    UnsupportedVersion(u16),

    /// Opcode with neither a standard layout nor an operands-table entry.
    #[error("opcode 0x{0:02x} has no operand description")]
    UnknownOpcode(u8),

    /// Operand form the scanner does not know how to read.
    #[error("unsupported operand form {0}")]
    UnsupportedForm(DwForm),

    /// Operands did not match the shape the operator requires.
    #[error("operands of {0} do not match its layout")]
    OperandLayout(DwMacro),

    /// The operation at this index is not the kind that was requested.
    #[error("operation is {0}, not the requested kind")]
    WrongOperator(DwMacro),

    /// Operation index past the end of the context.
    #[error("operation index {0} out of range")]
    IndexOutOfRange(usize),
}

/// Convenience type alias for `Result<T, DieWalkError>`
///
/// ```rust
/// use diewalk_core::error::Result;
/// fn foo() -> Result<()>
/// {
///     Ok(())
/// }
/// ```
pub type Result<T> = std::result::Result<T, DieWalkError>;

/// Map a gimli DWARF error to a [`DieWalkError`] with context.
pub(crate) fn map_dwarf_error(context: &str, err: gimli::Error) -> DieWalkError
{
    DieWalkError::Dwarf {
        context: context.to_string(),
        details: err.to_string(),
    }
}
