//! # Tag dispatch
//!
//! Maps entry tags to decode handlers. Only the tags of [`KnownTag`] can carry
//! a handler, and each at most one; both rules are checked when a handler is
//! registered, so lookups never fail.
//!
//! A handler does not walk the tree. It decodes its entry's fields and says,
//! through [`TagHandler::descends`], whether the traversal should visit the
//! entry's children afterwards.

mod handlers;

use std::collections::HashMap;
use std::fmt;

use gimli::constants::{self, DwTag};
use tracing::debug;

use crate::attributes::AttributeAccessor;
use crate::error::{DieWalkError, Result};
use crate::files::SourceFileTable;
use crate::records::Fields;

pub use handlers::standard_handler;

/// Tags that can carry a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownTag
{
    EnumerationType,
    Enumerator,
    BaseType,
    Typedef,
    ArrayType,
    SubrangeType,
    PointerType,
    SubroutineType,
    StructureType,
    Member,
    FormalParameter,
    LexicalBlock,
    Subprogram,
    Variable,
}

impl KnownTag
{
    pub const ALL: [Self; 14] = [
        Self::EnumerationType,
        Self::Enumerator,
        Self::BaseType,
        Self::Typedef,
        Self::ArrayType,
        Self::SubrangeType,
        Self::PointerType,
        Self::SubroutineType,
        Self::StructureType,
        Self::Member,
        Self::FormalParameter,
        Self::LexicalBlock,
        Self::Subprogram,
        Self::Variable,
    ];

    /// DWARF tag code.
    pub const fn tag(self) -> DwTag
    {
        match self {
            Self::EnumerationType => constants::DW_TAG_enumeration_type,
            Self::Enumerator => constants::DW_TAG_enumerator,
            Self::BaseType => constants::DW_TAG_base_type,
            Self::Typedef => constants::DW_TAG_typedef,
            Self::ArrayType => constants::DW_TAG_array_type,
            Self::SubrangeType => constants::DW_TAG_subrange_type,
            Self::PointerType => constants::DW_TAG_pointer_type,
            Self::SubroutineType => constants::DW_TAG_subroutine_type,
            Self::StructureType => constants::DW_TAG_structure_type,
            Self::Member => constants::DW_TAG_member,
            Self::FormalParameter => constants::DW_TAG_formal_parameter,
            Self::LexicalBlock => constants::DW_TAG_lexical_block,
            Self::Subprogram => constants::DW_TAG_subprogram,
            Self::Variable => constants::DW_TAG_variable,
        }
    }
}

impl TryFrom<DwTag> for KnownTag
{
    type Error = DwTag;

    fn try_from(tag: DwTag) -> std::result::Result<Self, Self::Error>
    {
        Self::ALL.into_iter().find(|known| known.tag() == tag).ok_or(tag)
    }
}

impl fmt::Display for KnownTag
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.tag())
    }
}

/// Decode function of a handler.
pub type DecodeFn = fn(&AttributeAccessor<'_>, &SourceFileTable) -> Fields;

/// Handler for one tag.
#[derive(Clone, Copy)]
pub struct TagHandler
{
    pub decode: DecodeFn,
    /// Visit the entry's children after decoding it
    pub descends: bool,
}

impl fmt::Debug for TagHandler
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("TagHandler").field("descends", &self.descends).finish_non_exhaustive()
    }
}

/// Tag to handler table.
#[derive(Debug, Clone, Default)]
pub struct TagDispatch
{
    handlers: HashMap<KnownTag, TagHandler>,
}

impl TagDispatch
{
    /// Empty table.
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Table with a handler for every [`KnownTag`].
    pub fn standard() -> Self
    {
        let mut handlers = HashMap::with_capacity(KnownTag::ALL.len());
        for known in KnownTag::ALL {
            handlers.insert(known, standard_handler(known));
        }
        Self { handlers }
    }

    /// Register a handler for a raw tag code.
    ///
    /// ## Errors
    ///
    /// [`DieWalkError::Registration`] when the tag is not a [`KnownTag`] or
    /// already has a handler.
    pub fn register(&mut self, tag: DwTag, handler: TagHandler) -> Result<()>
    {
        let known = KnownTag::try_from(tag)
            .map_err(|tag| DieWalkError::Registration(format!("{tag} cannot carry a handler")))?;
        if self.handlers.contains_key(&known) {
            return Err(DieWalkError::Registration(format!("{known} already has a handler")));
        }
        debug!(tag = %known, descends = handler.descends, "registered tag handler");
        self.handlers.insert(known, handler);
        Ok(())
    }

    /// Handler for a raw tag code, if one is registered.
    pub fn handler(&self, tag: DwTag) -> Option<&TagHandler>
    {
        let known = KnownTag::try_from(tag).ok()?;
        self.handlers.get(&known)
    }

    pub fn len(&self) -> usize
    {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.handlers.is_empty()
    }
}
