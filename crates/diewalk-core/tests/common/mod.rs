//! Synthetic in-memory reader shared by the integration tests.
//!
//! Entry trees are described with [`Node`] builders and flattened into
//! offset-addressed tables; macro contexts are plain operation lists.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use diewalk_core::error::{DieWalkError, MacroDecodeError, Result};
use diewalk_core::reader::{
    CompilationUnit, DebugInfoReader, DefUndef, EntryId, EntrySource, FileBoundary, FormValue, MacroContext, MacroHeader,
    MacroOperator, StringEntry,
};
use diewalk_core::records::{EntryRecord, MacroEvent, Record};
use gimli::constants::{self, DwAt, DwMacro, DwTag};

/// Offset of the first entry (the unit root), as in a 32-bit DWARF 4 unit.
const ROOT_OFFSET: u64 = 0x0b;

/// Entry tree builder.
#[derive(Debug, Clone)]
pub struct Node
{
    tag: DwTag,
    attrs: Vec<(DwAt, FormValue)>,
    children: Vec<Node>,
}

pub fn node(tag: DwTag) -> Node
{
    Node {
        tag,
        attrs: Vec::new(),
        children: Vec::new(),
    }
}

impl Node
{
    pub fn attr(mut self, name: DwAt, value: FormValue) -> Self
    {
        self.attrs.push((name, value));
        self
    }

    pub fn named(self, name: &str) -> Self
    {
        self.attr(constants::DW_AT_name, FormValue::String(name.to_string()))
    }

    pub fn child(mut self, child: Node) -> Self
    {
        self.children.push(child);
        self
    }
}

#[derive(Debug, Clone)]
struct StoredEntry
{
    tag: DwTag,
    attrs: Vec<(DwAt, FormValue)>,
    first_child: Option<u64>,
    next_sibling: Option<u64>,
}

/// Operation of a synthetic macro context.
#[derive(Debug, Clone)]
pub enum MockOp
{
    Define(u64, &'static str),
    Undef(u64, &'static str),
    StartFile(u64, u64),
    EndFile,
    Import(u64),
    ImportSup(u64),
    Vendor(u8),
    /// Recognised operator whose payload cannot be decoded
    Broken(DwMacro),
    /// Operator code cannot be read
    Unreadable,
    Terminator,
}

/// Synthetic macro context.
#[derive(Debug, Clone)]
pub struct MockMacroContext
{
    offset: u64,
    ops: Vec<MockOp>,
}

impl MockMacroContext
{
    pub fn new(offset: u64, ops: Vec<MockOp>) -> Self
    {
        Self { offset, ops }
    }

    fn op(&self, index: usize) -> std::result::Result<&MockOp, MacroDecodeError>
    {
        self.ops.get(index).ok_or(MacroDecodeError::IndexOutOfRange(index))
    }
}

impl MacroContext for MockMacroContext
{
    fn header(&self) -> MacroHeader
    {
        MacroHeader {
            offset: self.offset,
            version: 5,
            op_count: self.ops.len(),
            data_len: 3 + self.ops.len() as u64,
            line_offset: None,
        }
    }

    fn operator(&self, index: usize) -> std::result::Result<MacroOperator, MacroDecodeError>
    {
        let code = match self.op(index)? {
            MockOp::Define(..) => constants::DW_MACRO_define,
            MockOp::Undef(..) => constants::DW_MACRO_undef,
            MockOp::StartFile(..) => constants::DW_MACRO_start_file,
            MockOp::EndFile => constants::DW_MACRO_end_file,
            MockOp::Import(_) => constants::DW_MACRO_import,
            MockOp::ImportSup(_) => constants::DW_MACRO_import_sup,
            MockOp::Vendor(code) => DwMacro(*code),
            MockOp::Broken(code) => *code,
            MockOp::Unreadable => return Err(MacroDecodeError::UnknownOpcode(0xff)),
            MockOp::Terminator => DwMacro(0),
        };
        Ok(MacroOperator {
            section_offset: self.offset + 3 + index as u64,
            code,
            form_count: 2,
        })
    }

    fn define_undef(&self, index: usize) -> std::result::Result<DefUndef, MacroDecodeError>
    {
        match self.op(index)? {
            MockOp::Define(line, text) | MockOp::Undef(line, text) => Ok(DefUndef {
                line: *line,
                index: 0,
                str_offset: 0,
                form_count: 2,
                text: Some((*text).to_string()),
            }),
            MockOp::Broken(code) => Err(MacroDecodeError::OperandLayout(*code)),
            _ => Err(MacroDecodeError::WrongOperator(constants::DW_MACRO_define)),
        }
    }

    fn file_boundary(&self, index: usize) -> std::result::Result<FileBoundary, MacroDecodeError>
    {
        match self.op(index)? {
            MockOp::StartFile(line, file_index) => Ok(FileBoundary {
                line: *line,
                file_index: *file_index,
            }),
            MockOp::EndFile => Ok(FileBoundary::default()),
            MockOp::Broken(code) => Err(MacroDecodeError::OperandLayout(*code)),
            _ => Err(MacroDecodeError::WrongOperator(constants::DW_MACRO_start_file)),
        }
    }

    fn import(&self, index: usize) -> std::result::Result<u64, MacroDecodeError>
    {
        match self.op(index)? {
            MockOp::Import(offset) | MockOp::ImportSup(offset) => Ok(*offset),
            MockOp::Broken(code) => Err(MacroDecodeError::OperandLayout(*code)),
            _ => Err(MacroDecodeError::WrongOperator(constants::DW_MACRO_import)),
        }
    }
}

type ContextTable = Rc<HashMap<u64, Vec<MockOp>>>;

fn context_at(contexts: &ContextTable, offset: u64) -> Result<Box<dyn MacroContext + '_>>
{
    let ops = contexts.get(&offset).ok_or_else(|| DieWalkError::MacroContext {
        offset,
        details: "no macro unit at this offset".to_string(),
    })?;
    Ok(Box::new(MockMacroContext::new(offset, ops.clone())))
}

/// Synthetic compilation unit.
#[derive(Debug, Clone)]
pub struct MockUnit
{
    offset: u64,
    entries: HashMap<u64, StoredEntry>,
    files: Vec<String>,
    macro_offset: Option<u64>,
    contexts: ContextTable,
    unreadable_tags: HashSet<u64>,
    broken_navigation: HashSet<u64>,
}

impl MockUnit
{
    /// Build a unit whose root is `root`; entry offsets are assigned in
    /// depth-first order starting at the root.
    pub fn new(offset: u64, root: Node) -> Self
    {
        let mut entries = HashMap::new();
        let mut next = ROOT_OFFSET;
        flatten(&root, &mut next, &mut entries);
        Self {
            offset,
            entries,
            files: Vec::new(),
            macro_offset: None,
            contexts: Rc::new(HashMap::new()),
            unreadable_tags: HashSet::new(),
            broken_navigation: HashSet::new(),
        }
    }

    pub fn with_files(mut self, files: &[&str]) -> Self
    {
        self.files = files.iter().map(|file| (*file).to_string()).collect();
        self
    }

    pub fn with_macros(mut self, offset: u64) -> Self
    {
        self.macro_offset = Some(offset);
        self
    }

    /// Make the tag of the entry at `offset` unreadable.
    pub fn with_unreadable_tag(mut self, offset: u64) -> Self
    {
        self.unreadable_tags.insert(offset);
        self
    }

    /// Make child and sibling queries on the entry at `offset` fail.
    pub fn with_broken_navigation(mut self, offset: u64) -> Self
    {
        self.broken_navigation.insert(offset);
        self
    }

    /// Offset of the first entry below the root.
    pub fn first_entry(&self) -> EntryId
    {
        EntryId(ROOT_OFFSET + 1)
    }

    fn stored(&self, entry: EntryId) -> Option<&StoredEntry>
    {
        self.entries.get(&entry.value())
    }

    fn navigation_error(&self, entry: EntryId) -> Result<()>
    {
        if self.broken_navigation.contains(&entry.value()) {
            return Err(DieWalkError::Dwarf {
                context: "navigating entries".to_string(),
                details: format!("corrupt entry at 0x{:x}", entry.value()),
            });
        }
        Ok(())
    }
}

fn flatten(node: &Node, next: &mut u64, entries: &mut HashMap<u64, StoredEntry>) -> u64
{
    let offset = *next;
    *next += 1;

    let mut child_offsets = Vec::new();
    for child in &node.children {
        child_offsets.push(flatten(child, next, entries));
    }
    for pair in child_offsets.windows(2) {
        if let Some(stored) = entries.get_mut(&pair[0]) {
            stored.next_sibling = Some(pair[1]);
        }
    }

    entries.insert(
        offset,
        StoredEntry {
            tag: node.tag,
            attrs: node.attrs.clone(),
            first_child: child_offsets.first().copied(),
            next_sibling: None,
        },
    );
    offset
}

impl EntrySource for MockUnit
{
    fn tag(&self, entry: EntryId) -> Result<DwTag>
    {
        if self.unreadable_tags.contains(&entry.value()) {
            return Err(DieWalkError::TagUnreadable {
                offset: entry.value(),
                details: "abbreviation code out of range".to_string(),
            });
        }
        self.stored(entry).map(|stored| stored.tag).ok_or(DieWalkError::TagUnreadable {
            offset: entry.value(),
            details: "no entry at offset".to_string(),
        })
    }

    fn first_child(&self, entry: EntryId) -> Result<Option<EntryId>>
    {
        self.navigation_error(entry)?;
        Ok(self.stored(entry).and_then(|stored| stored.first_child).map(EntryId))
    }

    fn next_sibling(&self, entry: EntryId) -> Result<Option<EntryId>>
    {
        self.navigation_error(entry)?;
        Ok(self.stored(entry).and_then(|stored| stored.next_sibling).map(EntryId))
    }

    fn attribute(&self, entry: EntryId, name: DwAt) -> Option<FormValue>
    {
        self.stored(entry)?
            .attrs
            .iter()
            .find(|(attr, _)| *attr == name)
            .map(|(_, value)| value.clone())
    }
}

impl CompilationUnit for MockUnit
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
        Ok(EntryId(ROOT_OFFSET))
    }

    fn source_files(&self) -> Result<Vec<String>>
    {
        Ok(self.files.clone())
    }

    fn macro_context(&self) -> Result<Option<Box<dyn MacroContext + '_>>>
    {
        match self.macro_offset {
            Some(offset) => Ok(Some(context_at(&self.contexts, offset)?)),
            None => Ok(None),
        }
    }

    fn macro_context_at(&self, offset: u64) -> Result<Box<dyn MacroContext + '_>>
    {
        context_at(&self.contexts, offset)
    }
}

/// Synthetic reader over a list of units.
#[derive(Debug, Default)]
pub struct MockReader
{
    units: Vec<MockUnit>,
    next: usize,
    contexts: HashMap<u64, Vec<MockOp>>,
    strings: Vec<StringEntry>,
    shared: Option<ContextTable>,
    /// `(offset, importer)` of every context requested outside a unit
    pub requests: RefCell<Vec<(u64, Option<u64>)>>,
}

impl MockReader
{
    pub fn new() -> Self
    {
        Self::default()
    }

    pub fn unit(mut self, unit: MockUnit) -> Self
    {
        self.units.push(unit);
        self
    }

    pub fn macro_unit(mut self, offset: u64, ops: Vec<MockOp>) -> Self
    {
        self.contexts.insert(offset, ops);
        self
    }

    pub fn string(mut self, offset: u64, text: &str) -> Self
    {
        self.strings.push(StringEntry {
            offset,
            length: text.len() as u64,
            text: text.to_string(),
        });
        self
    }

    fn table(&mut self) -> ContextTable
    {
        let contexts = &self.contexts;
        self.shared.get_or_insert_with(|| Rc::new(contexts.clone())).clone()
    }
}

impl DebugInfoReader for MockReader
{
    fn next_unit(&mut self) -> Result<Option<Box<dyn CompilationUnit + '_>>>
    {
        let table = self.table();
        let Some(unit) = self.units.get(self.next) else {
            return Ok(None);
        };
        self.next += 1;
        let mut unit = unit.clone();
        unit.contexts = table;
        Ok(Some(Box::new(unit)))
    }

    fn macro_context_at(&self, offset: u64, importer: Option<u64>) -> Result<Box<dyn MacroContext + '_>>
    {
        self.requests.borrow_mut().push((offset, importer));
        let ops = self.contexts.get(&offset).ok_or_else(|| DieWalkError::MacroContext {
            offset,
            details: "no macro unit at this offset".to_string(),
        })?;
        Ok(Box::new(MockMacroContext::new(offset, ops.clone())))
    }

    fn string_table(&self) -> Result<Vec<StringEntry>>
    {
        Ok(self.strings.clone())
    }
}

/// Entry records of a stream, in order.
pub fn entries(records: &[Record]) -> Vec<&EntryRecord>
{
    records
        .iter()
        .filter_map(|record| match record {
            Record::Entry(entry) => Some(entry),
            _ => None,
        })
        .collect()
}

/// Macro events of a stream, in order.
pub fn macro_events(records: &[Record]) -> Vec<&MacroEvent>
{
    records
        .iter()
        .filter_map(|record| match record {
            Record::Macro(op) => Some(&op.event),
            _ => None,
        })
        .collect()
}

/// Name attribute of an entry record, when it decoded as text.
pub fn entry_name(entry: &EntryRecord) -> Option<&str>
{
    entry.fields.iter().find_map(|field| match (&field.name, &field.value) {
        (&constants::DW_AT_name, diewalk_core::records::FieldValue::Text(text)) => Some(text.as_str()),
        _ => None,
    })
}
