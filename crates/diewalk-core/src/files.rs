//! Per-unit source file table.
//!
//! Declaration attributes (`DW_AT_decl_file`) and start-file macro operations
//! name files by a 1-based index into the unit's declared file list. Index 0
//! means "no file" and is never used to index the list.

use tracing::debug;

/// Text used for index 0 and for indices past the end of the table.
pub const NULL_FILE: &str = "(null)";

/// Declared source files of the current compilation unit.
#[derive(Debug, Clone, Default)]
pub struct SourceFileTable
{
    files: Vec<String>,
}

impl SourceFileTable
{
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Replace the table with the file list of a new unit.
    pub fn rebuild(&mut self, files: Vec<String>)
    {
        self.files = files;
    }

    /// Path for a 1-based file index, or `None` for 0 and out-of-range indices.
    pub fn get(&self, index: u64) -> Option<&str>
    {
        if index == 0 {
            return None;
        }
        let slot = usize::try_from(index - 1).ok()?;
        let file = self.files.get(slot).map(String::as_str);
        if file.is_none() {
            debug!(index, len = self.files.len(), "file index past the end of the table");
        }
        file
    }

    /// Path for a 1-based file index, falling back to [`NULL_FILE`].
    pub fn lookup(&self, index: u64) -> &str
    {
        self.get(index).unwrap_or(NULL_FILE)
    }

    pub fn len(&self) -> usize
    {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.files.is_empty()
    }

    /// Files in declaration order.
    pub fn files(&self) -> &[String]
    {
        &self.files
    }
}
