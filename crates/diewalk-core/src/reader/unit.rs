//! gimli-backed compilation unit.
//!
//! Entry navigation is answered from a link table built with one pass over
//! the unit's entries the first time it is needed. Attribute reads decode the
//! whole entry once; further reads of the same entry come from a cache.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;

use gimli::constants::{self, DwAt, DwTag};
use gimli::{AttributeValue, Reader, Unit, UnitOffset};
use once_cell::unsync::OnceCell;
use tracing::{debug, trace};

use super::image::{OwnedDwarf, OwnedReader};
use super::macro_section::{GimliMacroContext, MacroUnit, StrOffsetsScope};
use super::{CompilationUnit, EntryId, EntrySource, FormValue, MacroContext};
use crate::error::{map_dwarf_error, DieWalkError, Result};

/// One parsed compilation unit of an [`ObjectImage`](super::ObjectImage).
pub struct GimliUnit<'a>
{
    dwarf: &'a OwnedDwarf,
    unit: Unit<OwnedReader>,
    offset: u64,
    macro_section: OwnedReader,
    links: OnceCell<HashMap<u64, Links>>,
    last_entry: RefCell<Option<(EntryId, Vec<(DwAt, FormValue)>)>>,
}

/// Navigation links of one entry.
#[derive(Debug, Clone, Copy, Default)]
struct Links
{
    first_child: Option<u64>,
    next_sibling: Option<u64>,
}

impl<'a> GimliUnit<'a>
{
    pub(crate) fn new(dwarf: &'a OwnedDwarf, unit: Unit<OwnedReader>, offset: u64, macro_section: OwnedReader) -> Self
    {
        Self {
            dwarf,
            unit,
            offset,
            macro_section,
            links: OnceCell::new(),
            last_entry: RefCell::new(None),
        }
    }

    fn links(&self, entry: EntryId) -> Result<Links>
    {
        let table = self.links.get_or_try_init(|| self.index_links())?;
        Ok(table.get(&entry.value()).copied().unwrap_or_default())
    }

    fn index_links(&self) -> Result<HashMap<u64, Links>>
    {
        let mut links: HashMap<u64, Links> = HashMap::new();
        // Most recent entry at each depth of the current path.
        let mut path: Vec<u64> = Vec::new();
        let mut depth: isize = 0;
        let mut cursor = self.unit.entries();
        while let Some((delta, die)) = cursor
            .next_dfs()
            .map_err(|err| map_dwarf_error("indexing unit entries", err))?
        {
            let offset = die.offset().0 as u64;
            depth += delta;
            let level = usize::try_from(depth).map_err(|_| DieWalkError::Dwarf {
                context: "indexing unit entries".to_string(),
                details: format!("entry <0x{offset:08x}> sits above the unit root"),
            })?;

            if let Some(previous) = path.get(level).copied() {
                links.entry(previous).or_default().next_sibling = Some(offset);
            } else if let Some(parent) = level.checked_sub(1).and_then(|up| path.get(up)).copied() {
                links.entry(parent).or_default().first_child = Some(offset);
            }
            path.truncate(level);
            path.push(offset);
            links.entry(offset).or_default();
        }

        trace!(unit = self.offset, entries = links.len(), "indexed entry links");
        Ok(links)
    }

    fn read_attributes(&self, entry: EntryId) -> Vec<(DwAt, FormValue)>
    {
        let Some(die) = Self::unit_offset(entry).and_then(|offset| self.unit.entry(offset).ok()) else {
            return Vec::new();
        };
        let mut collected = Vec::new();
        let mut attrs = die.attrs();
        while let Ok(Some(attr)) = attrs.next() {
            collected.push((attr.name(), self.convert(attr.value())));
        }
        collected
    }

    fn unit_offset(entry: EntryId) -> Option<UnitOffset>
    {
        usize::try_from(entry.value()).ok().map(UnitOffset)
    }

    fn attr_text(&self, value: AttributeValue<OwnedReader>) -> Result<String>
    {
        let reader = self
            .dwarf
            .attr_string(&self.unit, value)
            .map_err(|err| map_dwarf_error("resolving DWARF string", err))?;
        let text = reader
            .to_string_lossy()
            .map_err(|err| map_dwarf_error("decoding DWARF string", err))?;
        Ok(text.into_owned())
    }

    fn convert(&self, value: AttributeValue<OwnedReader>) -> FormValue
    {
        match value {
            AttributeValue::Addr(address) => FormValue::Address(address),
            AttributeValue::DebugAddrIndex(_) => match self.dwarf.attr_address(&self.unit, value) {
                Ok(Some(address)) => FormValue::Address(address),
                _ => FormValue::Unsupported(constants::DW_FORM_addrx.0),
            },
            AttributeValue::Data1(value) => FormValue::Unsigned(value.into()),
            AttributeValue::Data2(value) => FormValue::Unsigned(value.into()),
            AttributeValue::Data4(value) => FormValue::Unsigned(value.into()),
            AttributeValue::Data8(value) | AttributeValue::Udata(value) => FormValue::Unsigned(value),
            AttributeValue::Sdata(value) => FormValue::Signed(value),
            AttributeValue::Flag(value) => FormValue::Flag(value),
            AttributeValue::UnitRef(offset) => FormValue::UnitRef(offset.0 as u64),
            AttributeValue::DebugInfoRef(offset) => FormValue::SectionRef(offset.0 as u64),
            AttributeValue::SecOffset(offset) => FormValue::SectionOffset(offset as u64),
            AttributeValue::DebugLineRef(offset) => FormValue::SectionOffset(offset.0 as u64),
            AttributeValue::LocationListsRef(offset) => FormValue::SectionOffset(offset.0 as u64),
            AttributeValue::DebugMacroRef(offset) => FormValue::SectionOffset(offset.0 as u64),
            AttributeValue::Exprloc(expression) => FormValue::Expression(owned_bytes(&expression.0)),
            AttributeValue::Block(block) => FormValue::Block(owned_bytes(&block)),
            AttributeValue::Encoding(value) => FormValue::Unsigned(value.0.into()),
            AttributeValue::Language(value) => FormValue::Unsigned(value.0.into()),
            AttributeValue::Accessibility(value) => FormValue::Unsigned(value.0.into()),
            AttributeValue::Visibility(value) => FormValue::Unsigned(value.0.into()),
            AttributeValue::Inline(value) => FormValue::Unsigned(value.0.into()),
            AttributeValue::CallingConvention(value) => FormValue::Unsigned(value.0.into()),
            AttributeValue::FileIndex(value) => FormValue::Unsigned(value),
            AttributeValue::String(_)
            | AttributeValue::DebugStrRef(_)
            | AttributeValue::DebugStrRefSup(_)
            | AttributeValue::DebugStrOffsetsIndex(_)
            | AttributeValue::DebugLineStrRef(_) => match self.attr_text(value) {
                Ok(text) => FormValue::String(text),
                Err(err) => {
                    debug!(unit = self.offset, error = %err, "string attribute could not be resolved");
                    FormValue::Unsupported(0)
                }
            },
            other => {
                trace!(value = ?other, "attribute value without a mapping");
                FormValue::Unsupported(0)
            }
        }
    }

    fn macro_offset(&self) -> Result<Option<u64>>
    {
        let root = self.root()?;
        for name in [constants::DW_AT_macros, constants::DW_AT_GNU_macros] {
            match self.attribute(root, name) {
                Some(FormValue::SectionOffset(offset) | FormValue::Unsigned(offset)) => return Ok(Some(offset)),
                Some(other) => debug!(attribute = %name, value = ?other, "macro attribute of unexpected form"),
                None => {}
            }
        }
        Ok(None)
    }
}

fn owned_bytes(reader: &OwnedReader) -> Vec<u8>
{
    reader.to_slice().map(|bytes| bytes.into_owned()).unwrap_or_default()
}

impl EntrySource for GimliUnit<'_>
{
    fn tag(&self, entry: EntryId) -> Result<DwTag>
    {
        let unreadable = |details: String| DieWalkError::TagUnreadable {
            offset: entry.value(),
            details,
        };
        let offset = Self::unit_offset(entry).ok_or_else(|| unreadable("offset out of range".to_string()))?;
        let die = self.unit.entry(offset).map_err(|err| unreadable(err.to_string()))?;
        Ok(die.tag())
    }

    fn first_child(&self, entry: EntryId) -> Result<Option<EntryId>>
    {
        Ok(self.links(entry)?.first_child.map(EntryId))
    }

    fn next_sibling(&self, entry: EntryId) -> Result<Option<EntryId>>
    {
        Ok(self.links(entry)?.next_sibling.map(EntryId))
    }

    fn attribute(&self, entry: EntryId, name: DwAt) -> Option<FormValue>
    {
        let mut cache = self.last_entry.borrow_mut();
        if cache.as_ref().map(|(cached, _)| *cached) != Some(entry) {
            *cache = Some((entry, self.read_attributes(entry)));
        }
        let (_, attrs) = cache.as_ref()?;
        attrs.iter().find(|(attr, _)| *attr == name).map(|(_, value)| value.clone())
    }
}

impl CompilationUnit for GimliUnit<'_>
{
    fn offset(&self) -> u64
    {
        self.offset
    }

    fn as_entries(&self) -> &dyn EntrySource
    {
        self
    }

    fn root(&self) -> Result<EntryId>
    {
        let mut tree = self
            .unit
            .entries_tree(None)
            .map_err(|err| map_dwarf_error("opening unit entry tree", err))?;
        let root = tree.root().map_err(|err| map_dwarf_error("reading unit root", err))?;
        Ok(EntryId(root.entry().offset().0 as u64))
    }

    fn source_files(&self) -> Result<Vec<String>>
    {
        let Some(program) = self.unit.line_program.as_ref() else {
            return Ok(Vec::new());
        };
        let header = program.header();
        let comp_dir = match self.unit.comp_dir.as_ref() {
            Some(dir) => Some(
                dir.to_string_lossy()
                    .map_err(|err| map_dwarf_error("decoding comp_dir", err))?
                    .into_owned(),
            ),
            None => None,
        };

        let mut files = Vec::new();
        for (index, file) in header.file_names().iter().enumerate() {
            // DWARF 5 lists the primary source file at index 0; declarations count from 1.
            if header.version() >= 5 && index == 0 {
                continue;
            }
            let mut path = PathBuf::new();
            if let Some(dir) = comp_dir.as_deref() {
                path.push(dir);
            }
            if let Some(directory) = file.directory(header) {
                path.push(self.attr_text(directory)?);
            }
            path.push(self.attr_text(file.path_name())?);
            files.push(path.to_string_lossy().into_owned());
        }

        trace!(unit = self.offset, files = files.len(), "collected declared source files");
        Ok(files)
    }

    fn macro_context(&self) -> Result<Option<Box<dyn MacroContext + '_>>>
    {
        match self.macro_offset()? {
            Some(offset) => Ok(Some(self.macro_context_at(offset)?)),
            None => Ok(None),
        }
    }

    fn macro_context_at(&self, offset: u64) -> Result<Box<dyn MacroContext + '_>>
    {
        let table = MacroUnit::parse(&self.macro_section, offset).map_err(|err| DieWalkError::MacroContext {
            offset,
            details: err.to_string(),
        })?;
        Ok(Box::new(GimliMacroContext::new(
            table,
            self.dwarf,
            Some(StrOffsetsScope::of_unit(&self.unit)),
        )))
    }
}
