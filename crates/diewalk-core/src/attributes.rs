//! Typed attribute access.
//!
//! [`AttributeAccessor`] reads one attribute of one entry as a requested
//! value kind. A read never fails: an absent attribute, or one whose form
//! does not carry the requested kind, yields the kind's zero value together
//! with a [`Presence`] describing what happened.
//!
//! ## Form compatibility
//!
//! | kind         | accepted [`FormValue`]s                          |
//! |--------------|--------------------------------------------------|
//! | `string`     | `String`                                         |
//! | `unsigned`   | `Unsigned`, non-negative `Signed`                |
//! | `reference`  | `UnitRef`, `SectionRef`, `SectionOffset`         |
//! | `address`    | `Address`                                        |
//! | `flag`       | `Flag`                                           |
//! | `expression` | `Expression`                                     |

use gimli::constants::DwAt;
use tracing::trace;

use crate::reader::{EntryId, EntrySource, FormValue};

/// Outcome of an attribute read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence
{
    /// Attribute present with a compatible form
    Present,
    /// Attribute not on the entry
    Absent,
    /// Attribute present, form incompatible with the requested kind
    Malformed,
}

/// Value of an attribute read plus its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup<T>
{
    pub value: T,
    pub presence: Presence,
}

impl<T> Lookup<T>
{
    fn present(value: T) -> Self
    {
        Self {
            value,
            presence: Presence::Present,
        }
    }

    /// Whether the attribute was read successfully.
    pub fn is_present(&self) -> bool
    {
        self.presence == Presence::Present
    }

    /// The value when present, `None` otherwise.
    pub fn ok(self) -> Option<T>
    {
        match self.presence {
            Presence::Present => Some(self.value),
            Presence::Absent | Presence::Malformed => None,
        }
    }
}

impl<T: Default> Lookup<T>
{
    fn missing(presence: Presence) -> Self
    {
        Self {
            value: T::default(),
            presence,
        }
    }
}

/// DWARF expression bytes as stored on an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpressionBlock
{
    pub bytes: Vec<u8>,
}

impl ExpressionBlock
{
    pub fn len(&self) -> usize
    {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.bytes.is_empty()
    }
}

/// Typed reads against one entry.
#[derive(Clone, Copy)]
pub struct AttributeAccessor<'a>
{
    source: &'a dyn EntrySource,
    entry: EntryId,
}

impl<'a> AttributeAccessor<'a>
{
    pub fn new(source: &'a dyn EntrySource, entry: EntryId) -> Self
    {
        Self { source, entry }
    }

    /// Entry being read.
    pub fn entry(&self) -> EntryId
    {
        self.entry
    }

    fn read<T: Default>(&self, name: DwAt, kind: &str, accept: impl FnOnce(FormValue) -> Option<T>) -> Lookup<T>
    {
        let Some(value) = self.source.attribute(self.entry, name) else {
            return Lookup::missing(Presence::Absent);
        };
        match accept(value) {
            Some(value) => Lookup::present(value),
            None => {
                trace!(entry = self.entry.value(), attribute = %name, kind, "attribute form does not match");
                Lookup::missing(Presence::Malformed)
            }
        }
    }

    pub fn string(&self, name: DwAt) -> Lookup<String>
    {
        self.read(name, "string", |value| match value {
            FormValue::String(text) => Some(text),
            _ => None,
        })
    }

    pub fn unsigned(&self, name: DwAt) -> Lookup<u64>
    {
        self.read(name, "unsigned", |value| match value {
            FormValue::Unsigned(value) => Some(value),
            FormValue::Signed(value) => u64::try_from(value).ok(),
            _ => None,
        })
    }

    /// Reference to another entry or section offset.
    pub fn reference(&self, name: DwAt) -> Lookup<u64>
    {
        self.read(name, "reference", |value| match value {
            FormValue::UnitRef(offset) | FormValue::SectionRef(offset) | FormValue::SectionOffset(offset) => Some(offset),
            _ => None,
        })
    }

    pub fn address(&self, name: DwAt) -> Lookup<u64>
    {
        self.read(name, "address", |value| match value {
            FormValue::Address(address) => Some(address),
            _ => None,
        })
    }

    pub fn flag(&self, name: DwAt) -> Lookup<bool>
    {
        self.read(name, "flag", |value| match value {
            FormValue::Flag(flag) => Some(flag),
            _ => None,
        })
    }

    /// Expression block; the bytes are not interpreted.
    pub fn expression(&self, name: DwAt) -> Lookup<ExpressionBlock>
    {
        self.read(name, "expression", |value| match value {
            FormValue::Expression(bytes) => Some(ExpressionBlock { bytes }),
            _ => None,
        })
    }

    /// Raw value of the attribute, without kind checking.
    pub fn raw(&self, name: DwAt) -> Option<FormValue>
    {
        self.source.attribute(self.entry, name)
    }
}
