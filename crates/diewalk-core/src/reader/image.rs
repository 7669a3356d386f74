//! Object file parsing and DWARF section loading.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use gimli::{DebugInfoUnitHeadersIter, Dwarf, EndianArcSlice, RunTimeEndian, SectionId};
use object::{Object, ObjectSection};
use once_cell::sync::OnceCell;
use tracing::debug;

use super::macro_section::{GimliMacroContext, MacroUnit, StrOffsetsScope};
use super::unit::GimliUnit;
use super::{CompilationUnit, DebugInfoReader, MacroContext, StringEntry};
use crate::error::{DieWalkError, Result};

pub(crate) type OwnedReader = EndianArcSlice<RunTimeEndian>;
pub(crate) type OwnedDwarf = Dwarf<OwnedReader>;

const DWARF_SECTIONS: &[(&str, &[&str])] = &[
    (".debug_abbrev", &[".debug_abbrev", "__debug_abbrev"]),
    (".debug_addr", &[".debug_addr", "__debug_addr"]),
    (".debug_info", &[".debug_info", "__debug_info"]),
    (".debug_line", &[".debug_line", "__debug_line"]),
    (".debug_line_str", &[".debug_line_str", "__debug_line_str"]),
    (".debug_ranges", &[".debug_ranges", "__debug_ranges"]),
    (".debug_rnglists", &[".debug_rnglists", "__debug_rnglists"]),
    (".debug_str", &[".debug_str", "__debug_str"]),
    (".debug_str_offsets", &[".debug_str_offsets", "__debug_str_offs", "__debug_str_offsets"]),
    (".debug_loc", &[".debug_loc", "__debug_loc"]),
    (".debug_loclists", &[".debug_loclists", "__debug_loclists"]),
    (".debug_macro", &[".debug_macro", "__debug_macro"]),
];

fn load_section_bytes(file: &object::File<'_>, names: &[&str]) -> Result<Option<Arc<[u8]>>>
{
    for name in names {
        if let Some(section) = file.section_by_name(name) {
            let data = section.uncompressed_data().map_err(|err| DieWalkError::ReaderInit(format!("failed to read {name}: {err}")))?;
            return Ok(Some(match data {
                Cow::Borrowed(bytes) => Arc::<[u8]>::from(bytes.to_vec()),
                Cow::Owned(vec) => vec.into(),
            }));
        }
    }

    Ok(None)
}

/// A binary opened for debug-info traversal.
///
/// The DWARF sections are copied out of the container once, at open time.
/// The `gimli::Dwarf` view over them is built lazily and cached.
pub struct ObjectImage
{
    path: PathBuf,
    endian: RunTimeEndian,
    debug_sections: HashMap<&'static str, Arc<[u8]>>,
    dwarf_cache: OnceCell<OwnedDwarf>,
}

impl ObjectImage
{
    /// Read and parse the object file at `path`.
    ///
    /// ## Errors
    ///
    /// - [`DieWalkError::Io`] when the file cannot be read
    /// - [`DieWalkError::ObjectParse`] when it is not a supported container
    /// - [`DieWalkError::ReaderInit`] when a debug section cannot be
    ///   decompressed or the binary has no `.debug_info`
    pub fn open(path: impl AsRef<Path>) -> Result<Self>
    {
        let path = path.as_ref().to_path_buf();
        let bytes = fs::read(&path)?;
        let file = object::File::parse(&*bytes).map_err(|err| DieWalkError::ObjectParse {
            path: path.display().to_string(),
            details: err.to_string(),
        })?;

        let endian = if file.is_little_endian() {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };

        let mut sections = HashMap::new();
        for (canonical, aliases) in DWARF_SECTIONS {
            if let Some(data) = load_section_bytes(&file, aliases)? {
                debug!(section = canonical, bytes = data.len(), "loaded debug section");
                sections.insert(*canonical, data);
            }
        }

        if !sections.contains_key(".debug_info") {
            return Err(DieWalkError::ReaderInit(format!(
                "{} carries no .debug_info section",
                path.display()
            )));
        }

        Ok(Self {
            path,
            endian,
            debug_sections: sections,
            dwarf_cache: OnceCell::new(),
        })
    }

    /// Path the image was read from.
    pub fn path(&self) -> &Path
    {
        &self.path
    }

    /// Whether a section with this canonical name was found.
    pub fn has_section(&self, name: &str) -> bool
    {
        self.debug_sections.contains_key(name)
    }

    /// Start a forward cursor over the compilation units.
    pub fn units(&self) -> Result<GimliReader<'_>>
    {
        let dwarf = self.dwarf()?;
        Ok(GimliReader {
            dwarf,
            headers: dwarf.units(),
            macro_section: self.section_reader(SectionId::DebugMacro),
            debug_str: self.debug_sections.get(".debug_str").cloned(),
            scopes: HashMap::new(),
        })
    }

    fn dwarf(&self) -> Result<&OwnedDwarf>
    {
        self.dwarf_cache.get_or_try_init(|| {
            Dwarf::load(|section| Ok::<_, gimli::Error>(self.section_reader(section)))
                .map_err(|err| DieWalkError::ReaderInit(format!("failed to load DWARF: {err}")))
        })
    }

    fn section_reader(&self, id: SectionId) -> OwnedReader
    {
        let key = match id {
            SectionId::DebugAbbrev => ".debug_abbrev",
            SectionId::DebugAddr => ".debug_addr",
            SectionId::DebugInfo => ".debug_info",
            SectionId::DebugLine => ".debug_line",
            SectionId::DebugLineStr => ".debug_line_str",
            SectionId::DebugRanges => ".debug_ranges",
            SectionId::DebugRngLists => ".debug_rnglists",
            SectionId::DebugStr => ".debug_str",
            SectionId::DebugStrOffsets => ".debug_str_offsets",
            SectionId::DebugLoc => ".debug_loc",
            SectionId::DebugLocLists => ".debug_loclists",
            SectionId::DebugMacro => ".debug_macro",
            _ => "",
        };

        let data = self
            .debug_sections
            .get(key)
            .cloned()
            .unwrap_or_else(|| Arc::<[u8]>::from(Vec::new()));
        EndianArcSlice::new(data, self.endian)
    }
}

/// Unit cursor over an [`ObjectImage`].
pub struct GimliReader<'a>
{
    dwarf: &'a OwnedDwarf,
    headers: DebugInfoUnitHeadersIter<OwnedReader>,
    macro_section: OwnedReader,
    debug_str: Option<Arc<[u8]>>,
    /// String-offsets scope of every unit yielded so far, by unit offset
    scopes: HashMap<u64, StrOffsetsScope<usize>>,
}

impl DebugInfoReader for GimliReader<'_>
{
    fn next_unit(&mut self) -> Result<Option<Box<dyn CompilationUnit + '_>>>
    {
        let Some(header) = self
            .headers
            .next()
            .map_err(|err| DieWalkError::UnitCursor(format!("reading .debug_info unit header: {err}")))?
        else {
            return Ok(None);
        };

        let offset = header
            .offset()
            .as_debug_info_offset()
            .map_or(0, |offset| offset.0 as u64);
        let unit = self
            .dwarf
            .unit(header)
            .map_err(|err| DieWalkError::UnitCursor(format!("parsing unit at 0x{offset:08x}: {err}")))?;
        self.scopes.insert(offset, StrOffsetsScope::of_unit(&unit));

        Ok(Some(Box::new(GimliUnit::new(self.dwarf, unit, offset, self.macro_section.clone()))))
    }

    fn macro_context_at(&self, offset: u64, importer: Option<u64>) -> Result<Box<dyn MacroContext + '_>>
    {
        let scope = importer.and_then(|unit| self.scopes.get(&unit).copied());
        let table = MacroUnit::parse(&self.macro_section, offset).map_err(|err| DieWalkError::MacroContext {
            offset,
            details: err.to_string(),
        })?;
        Ok(Box::new(GimliMacroContext::new(table, self.dwarf, scope)))
    }

    fn string_table(&self) -> Result<Vec<StringEntry>>
    {
        Ok(self.debug_str.as_deref().map(split_strings).unwrap_or_default())
    }
}

/// Split a string section into its NUL-terminated strings.
///
/// A trailing fragment without a terminator is kept.
pub fn split_strings(bytes: &[u8]) -> Vec<StringEntry>
{
    let mut entries = Vec::new();
    let mut offset = 0u64;
    let mut rest = bytes;
    while !rest.is_empty() {
        let end = rest.iter().position(|byte| *byte == 0).unwrap_or(rest.len());
        entries.push(StringEntry {
            offset,
            length: end as u64,
            text: String::from_utf8_lossy(&rest[..end]).into_owned(),
        });
        let consumed = (end + 1).min(rest.len());
        offset += consumed as u64;
        rest = &rest[consumed..];
    }
    entries
}
