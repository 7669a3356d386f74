//! Entry tree traversal.
//!
//! [`DieTraversal`] walks a sibling chain and, for handlers that ask for it,
//! the children of each entry. Siblings are followed iteratively; children are
//! visited by recursion, so the stack grows with the nesting depth of the tree
//! and not with its width.

use tracing::{trace, warn};

use crate::attributes::AttributeAccessor;
use crate::dispatch::TagDispatch;
use crate::error::Result;
use crate::files::SourceFileTable;
use crate::reader::{EntryId, EntrySource};
use crate::records::{EntryRecord, Record, RecordSink};

/// What to do with entries whose tag has no handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnhandledTagPolicy
{
    /// Ignore the entry and its whole subtree
    #[default]
    Skip,
    /// Emit nothing for the entry but still visit its children
    Walk,
}

/// Counters for one traversal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraversalStats
{
    /// Entries a handler decoded
    pub entries: usize,
    /// Entries without a handler
    pub unhandled: usize,
}

/// Depth-first walk dispatching each entry to its tag handler.
pub struct DieTraversal<'a>
{
    dispatch: &'a TagDispatch,
    files: &'a SourceFileTable,
    policy: UnhandledTagPolicy,
}

impl<'a> DieTraversal<'a>
{
    pub fn new(dispatch: &'a TagDispatch, files: &'a SourceFileTable, policy: UnhandledTagPolicy) -> Self
    {
        Self { dispatch, files, policy }
    }

    /// Visit `start` and every sibling after it.
    ///
    /// ## Errors
    ///
    /// Fails when an entry's tag cannot be read or the sink rejects a record.
    /// Navigation failures end the affected chain instead.
    pub fn walk(&self, source: &dyn EntrySource, start: EntryId, sink: &mut dyn RecordSink) -> Result<TraversalStats>
    {
        let mut stats = TraversalStats::default();
        self.walk_siblings(source, start, 0, sink, &mut stats)?;
        Ok(stats)
    }

    fn walk_siblings(
        &self,
        source: &dyn EntrySource,
        start: EntryId,
        depth: usize,
        sink: &mut dyn RecordSink,
        stats: &mut TraversalStats,
    ) -> Result<()>
    {
        let mut current = Some(start);
        while let Some(entry) = current {
            let tag = source.tag(entry)?;

            match self.dispatch.handler(tag) {
                Some(handler) => {
                    let child = first_child(source, entry);
                    let attrs = AttributeAccessor::new(source, entry);
                    let fields = (handler.decode)(&attrs, self.files);
                    trace!(entry = entry.value(), %tag, depth, "decoded entry");
                    sink.record(Record::Entry(EntryRecord {
                        offset: entry.value(),
                        tag,
                        depth,
                        has_children: child.is_some(),
                        fields,
                    }))?;
                    stats.entries += 1;

                    if let (true, Some(child)) = (handler.descends, child) {
                        self.walk_siblings(source, child, depth + 1, sink, stats)?;
                    }
                }
                None => {
                    stats.unhandled += 1;
                    trace!(entry = entry.value(), %tag, "no handler for tag");
                    if self.policy == UnhandledTagPolicy::Walk {
                        if let Some(child) = first_child(source, entry) {
                            self.walk_siblings(source, child, depth + 1, sink, stats)?;
                        }
                    }
                }
            }

            current = next_sibling(source, entry);
        }
        Ok(())
    }
}

fn first_child(source: &dyn EntrySource, entry: EntryId) -> Option<EntryId>
{
    source.first_child(entry).unwrap_or_else(|err| {
        warn!(entry = entry.value(), error = %err, "child query failed, treating entry as childless");
        None
    })
}

fn next_sibling(source: &dyn EntrySource, entry: EntryId) -> Option<EntryId>
{
    source.next_sibling(entry).unwrap_or_else(|err| {
        warn!(entry = entry.value(), error = %err, "sibling query failed, ending sibling chain");
        None
    })
}
