//! # Session
//!
//! A [`Session`] owns everything one run needs: the tag dispatch table, the
//! current unit's source file table and the import worklist. Independent
//! sessions share nothing.
//!
//! ## Run order
//!
//! For every compilation unit the reader yields:
//!
//! 1. rebuild the file table from the unit's declared files
//! 2. emit the unit summary
//! 3. decode the unit's own macro context (when macros are enabled)
//! 4. traverse the root's children
//!
//! After the last unit the worklist of imported macro contexts is drained
//! according to [`ImportPolicy`], and the string table is emitted when
//! requested. Each queued offset remembers the unit whose macros led to it,
//! so the reader can resolve string-offsets indices of imported contexts.

use std::collections::HashSet;

use gimli::constants;
use tracing::{debug, info, warn};

use crate::attributes::AttributeAccessor;
use crate::dispatch::TagDispatch;
use crate::error::Result;
use crate::files::SourceFileTable;
use crate::macros::{MacroOpDecoder, MacroStats};
use crate::reader::{CompilationUnit, DebugInfoReader, EntryId};
use crate::records::{MacroOrigin, Record, RecordSink, UnitRecord};
use crate::traversal::{DieTraversal, UnhandledTagPolicy};
use crate::worklist::OffsetWorklist;

/// How imported macro contexts are drained after the last unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportPolicy
{
    /// Follow imports found while draining; decode each offset once
    #[default]
    Transitive,
    /// Decode exactly the offsets queued when draining starts, duplicates included
    SinglePass,
}

/// Run options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions
{
    /// Decode macro contexts and drain imports
    pub macros: bool,
    /// Emit the `.debug_str` table after the units
    pub strings: bool,
    pub unhandled: UnhandledTagPolicy,
    pub imports: ImportPolicy,
}

impl Default for SessionOptions
{
    fn default() -> Self
    {
        Self {
            macros: true,
            strings: false,
            unhandled: UnhandledTagPolicy::default(),
            imports: ImportPolicy::default(),
        }
    }
}

/// Counters for a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary
{
    pub units: usize,
    /// Entry records emitted
    pub entries: usize,
    /// Entries skipped for lack of a handler
    pub unhandled_entries: usize,
    pub macro_contexts: usize,
    pub macro_events: usize,
    /// Macro operations whose operator could not be read
    pub skipped_operators: usize,
    pub imports_queued: usize,
    pub strings: usize,
}

impl RunSummary
{
    fn absorb_macros(&mut self, stats: MacroStats)
    {
        self.macro_contexts += 1;
        self.macro_events += stats.events;
        self.skipped_operators += stats.skipped;
        self.imports_queued += stats.queued;
    }
}

/// State of one traversal run.
#[derive(Debug)]
pub struct Session
{
    options: SessionOptions,
    dispatch: TagDispatch,
    files: SourceFileTable,
    worklist: OffsetWorklist,
    /// Importing unit of each worklist entry, by position.
    importers: Vec<Option<u64>>,
}

impl Session
{
    /// Session with the standard tag handlers.
    pub fn new(options: SessionOptions) -> Self
    {
        Self::with_dispatch(options, TagDispatch::standard())
    }

    /// Session with a caller-built dispatch table.
    pub fn with_dispatch(options: SessionOptions, dispatch: TagDispatch) -> Self
    {
        Self {
            options,
            dispatch,
            files: SourceFileTable::new(),
            worklist: OffsetWorklist::with_capacity(1),
            importers: Vec::new(),
        }
    }

    pub fn options(&self) -> &SessionOptions
    {
        &self.options
    }

    /// File table of the unit processed last.
    pub fn files(&self) -> &SourceFileTable
    {
        &self.files
    }

    /// Import offsets queued so far.
    pub fn worklist(&self) -> &OffsetWorklist
    {
        &self.worklist
    }

    /// Process every unit of `reader`, delivering records to `sink`.
    ///
    /// ## Errors
    ///
    /// Any fatal reader failure, payload decode failure or sink failure stops
    /// the run. Records delivered before the failure stay with the sink.
    pub fn run(&mut self, reader: &mut dyn DebugInfoReader, sink: &mut dyn RecordSink) -> Result<RunSummary>
    {
        let mut summary = RunSummary::default();
        self.worklist = OffsetWorklist::with_capacity(1);
        self.importers.clear();

        while let Some(unit) = reader.next_unit()? {
            summary.units += 1;
            self.process_unit(unit.as_ref(), sink, &mut summary)?;
        }

        if self.options.macros {
            self.drain_imports(reader, sink, &mut summary)?;
        }

        if self.options.strings {
            for entry in reader.string_table()? {
                sink.record(Record::DebugString(entry))?;
                summary.strings += 1;
            }
        }

        info!(
            units = summary.units,
            entries = summary.entries,
            macro_contexts = summary.macro_contexts,
            skipped_operators = summary.skipped_operators,
            "run complete"
        );
        Ok(summary)
    }

    fn process_unit(&mut self, unit: &dyn CompilationUnit, sink: &mut dyn RecordSink, summary: &mut RunSummary) -> Result<()>
    {
        self.files.rebuild(unit.source_files()?);
        let root = unit.root()?;
        debug!(unit = unit.offset(), files = self.files.len(), "processing compilation unit");

        sink.record(Record::Unit(unit_record(unit, root, &self.files)))?;

        if self.options.macros {
            match unit.macro_context()? {
                Some(context) => {
                    let origin = MacroOrigin::Unit {
                        unit_offset: unit.offset(),
                    };
                    let stats = MacroOpDecoder::new(&self.files, &mut self.worklist).decode(context.as_ref(), origin, sink)?;
                    self.note_importer(Some(unit.offset()));
                    summary.absorb_macros(stats);
                }
                None => debug!(unit = unit.offset(), "unit has no macro information"),
            }
        }

        let first = unit.first_child(root).unwrap_or_else(|err| {
            warn!(unit = unit.offset(), error = %err, "could not read the first entry below the unit root");
            None
        });
        if let Some(first) = first {
            let stats = DieTraversal::new(&self.dispatch, &self.files, self.options.unhandled).walk(unit.as_entries(), first, sink)?;
            summary.entries += stats.entries;
            summary.unhandled_entries += stats.unhandled;
        }
        Ok(())
    }

    fn drain_imports(&mut self, reader: &dyn DebugInfoReader, sink: &mut dyn RecordSink, summary: &mut RunSummary) -> Result<()>
    {
        // Imported contexts are decoded outside any unit.
        let detached = SourceFileTable::new();
        let limit = match self.options.imports {
            ImportPolicy::Transitive => usize::MAX,
            ImportPolicy::SinglePass => self.worklist.len(),
        };
        let mut visited = HashSet::new();

        let mut cursor = 0;
        while cursor < self.worklist.len().min(limit) {
            let Some(offset) = self.worklist.get(cursor) else {
                break;
            };
            cursor += 1;

            if self.options.imports == ImportPolicy::Transitive && !visited.insert(offset) {
                debug!(offset, "macro context already decoded");
                continue;
            }

            let importer = self.importers.get(cursor - 1).copied().flatten();
            let context = reader.macro_context_at(offset, importer)?;
            let stats = MacroOpDecoder::new(&detached, &mut self.worklist).decode(context.as_ref(), MacroOrigin::Import, sink)?;
            self.note_importer(importer);
            summary.absorb_macros(stats);
        }
        Ok(())
    }

    /// Attribute worklist entries queued since the last call to `importer`.
    fn note_importer(&mut self, importer: Option<u64>)
    {
        let queued = self.worklist.len().saturating_sub(self.importers.len());
        self.importers.extend(std::iter::repeat(importer).take(queued));
    }
}

fn unit_record(unit: &dyn CompilationUnit, root: EntryId, files: &SourceFileTable) -> UnitRecord
{
    let attrs = AttributeAccessor::new(unit.as_entries(), root);
    UnitRecord {
        offset: unit.offset(),
        producer: attrs.string(constants::DW_AT_producer).ok(),
        language: attrs.unsigned(constants::DW_AT_language).ok(),
        name: attrs.string(constants::DW_AT_name).ok(),
        comp_dir: attrs.string(constants::DW_AT_comp_dir).ok(),
        macro_offset: attrs
            .reference(constants::DW_AT_macros)
            .ok()
            .or_else(|| attrs.reference(constants::DW_AT_GNU_macros).ok()),
        files: files.files().to_vec(),
    }
}
