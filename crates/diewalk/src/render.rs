//! Record renderers.
//!
//! [`TextRenderer`] prints the classic dump layout; [`JsonRenderer`] prints
//! one JSON object per record per line. Both are [`RecordSink`]s, so a
//! session writes through them directly.

use std::io::{self, Write};

use diewalk_core::records::{EntryRecord, Field, FieldValue, MacroContextRecord, MacroEvent, MacroOrigin, MacroRecord, UnitRecord};
use diewalk_core::reader::StringEntry;
use diewalk_core::{Record, RecordSink, Result, NULL_FILE};
use serde_json::{json, Value};

/// Human-readable dump.
pub struct TextRenderer<W: Write>
{
    out: W,
    strings_started: bool,
}

impl<W: Write> TextRenderer<W>
{
    pub fn new(out: W) -> Self
    {
        Self {
            out,
            strings_started: false,
        }
    }

    /// Flush and hand back the writer.
    pub fn finish(mut self) -> Result<W>
    {
        self.out.flush()?;
        Ok(self.out)
    }

    fn unit(&mut self, unit: &UnitRecord) -> io::Result<()>
    {
        writeln!(self.out, "Detected files:")?;
        for file in &unit.files {
            writeln!(self.out, "\t{file}")?;
        }
        writeln!(self.out, "\n")?;
        writeln!(self.out, "Compilation unit at .debug_info offset 0x{:08x}", unit.offset)?;
        writeln!(self.out, "Producer: {}", text_or_null(unit.producer.as_deref()))?;
        writeln!(self.out, "Language: {}", unit.language.unwrap_or(0))?;
        writeln!(
            self.out,
            "File: {}/{}",
            text_or_null(unit.comp_dir.as_deref()),
            text_or_null(unit.name.as_deref())
        )?;
        writeln!(
            self.out,
            "Macro Offset and Information: 0x{:08x}",
            unit.macro_offset.unwrap_or(0)
        )?;
        writeln!(self.out)
    }

    fn macro_context(&mut self, context: &MacroContextRecord) -> io::Result<()>
    {
        let header = &context.header;
        writeln!(self.out)?;
        match context.origin {
            MacroOrigin::Unit { unit_offset } => writeln!(
                self.out,
                "Macro data from CU-DIE at .debug_info offset 0x{unit_offset:08x} (.debug_macro offset 0x{:08x}):",
                header.offset
            )?,
            MacroOrigin::Import => writeln!(self.out, "Imported macro data at .debug_macro offset 0x{:08x}:", header.offset)?,
        }
        writeln!(self.out, "Macro Version: {}", header.version)?;
        if let Some(line_offset) = header.line_offset {
            writeln!(self.out, "Line Table Offset: 0x{line_offset:08x}")?;
        }
        writeln!(
            self.out,
            "MacroInformationEntries count: {}, bytes length: {}",
            header.op_count, header.data_len
        )
    }

    fn macro_op(&mut self, record: &MacroRecord) -> io::Result<()>
    {
        write!(self.out, "\t[{}] 0x{:02x} {}", record.index, record.operator.0, record.operator)?;
        match &record.event {
            MacroEvent::Define { line, text } | MacroEvent::Undef { line, text } => {
                writeln!(self.out, " line:{line} {}", text_or_null(text.as_deref()))
            }
            MacroEvent::StartFile { line, file_index, path } => writeln!(
                self.out,
                " line:{line} file number: {file_index} {}",
                text_or_null(path.as_deref())
            ),
            MacroEvent::EndFile => writeln!(self.out),
            MacroEvent::Import { offset } | MacroEvent::ImportSup { offset } => {
                writeln!(self.out, " offset 0x{offset:08x}")
            }
            MacroEvent::Vendor { form_count } => writeln!(self.out, " ({form_count} operands, not decoded)"),
        }
    }

    fn entry(&mut self, entry: &EntryRecord) -> io::Result<()>
    {
        let indent = "    ".repeat(entry.depth);
        writeln!(
            self.out,
            "{indent}<0x{:08x}> {} - Children: {}",
            entry.offset,
            entry.tag,
            u8::from(entry.has_children)
        )?;
        for field in &entry.fields {
            writeln!(self.out, "{indent}\t{}: {}", field.name, field_text(field))?;
        }
        Ok(())
    }

    fn string(&mut self, entry: &StringEntry) -> io::Result<()>
    {
        if !self.strings_started {
            self.strings_started = true;
            writeln!(self.out, "\nString Section Name: .debug_str")?;
        }
        writeln!(
            self.out,
            "name at offset 0x{:08x}, length {} is '{}'",
            entry.offset, entry.length, entry.text
        )
    }
}

impl<W: Write> RecordSink for TextRenderer<W>
{
    fn record(&mut self, record: Record) -> Result<()>
    {
        match &record {
            Record::Unit(unit) => self.unit(unit)?,
            Record::MacroContext(context) => self.macro_context(context)?,
            Record::Macro(op) => self.macro_op(op)?,
            Record::Entry(entry) => self.entry(entry)?,
            Record::DebugString(entry) => self.string(entry)?,
        }
        Ok(())
    }
}

fn text_or_null(text: Option<&str>) -> &str
{
    text.unwrap_or(NULL_FILE)
}

fn field_text(field: &Field) -> String
{
    match &field.value {
        FieldValue::Text(text) => text.clone(),
        FieldValue::Missing | FieldValue::File(None) => NULL_FILE.to_string(),
        FieldValue::File(Some(path)) => path.clone(),
        FieldValue::Unsigned(value) => value.to_string(),
        FieldValue::Reference(offset) => format!("<0x{offset:08x}>"),
        FieldValue::Address(address) => format!("0x{address:08x}"),
        FieldValue::Flag(flag) => u8::from(*flag).to_string(),
        FieldValue::Expression(block) if block.is_empty() => "0".to_string(),
        FieldValue::Expression(block) => format!("{} ({})", block.len(), hex(&block.bytes)),
        FieldValue::Symbol { raw, demangled: Some(demangled) } => format!("{raw} ({demangled})"),
        FieldValue::Symbol { raw, demangled: None } => raw.clone(),
    }
}

fn hex(bytes: &[u8]) -> String
{
    bytes.iter().map(|byte| format!("{byte:02x}")).collect::<Vec<_>>().join(" ")
}

/// Newline-delimited JSON, one object per record.
pub struct JsonRenderer<W: Write>
{
    out: W,
}

impl<W: Write> JsonRenderer<W>
{
    pub fn new(out: W) -> Self
    {
        Self { out }
    }

    /// Flush and hand back the writer.
    pub fn finish(mut self) -> Result<W>
    {
        self.out.flush()?;
        Ok(self.out)
    }
}

impl<W: Write> RecordSink for JsonRenderer<W>
{
    fn record(&mut self, record: Record) -> Result<()>
    {
        let value = record_json(&record);
        serde_json::to_writer(&mut self.out, &value).map_err(io::Error::from)?;
        writeln!(self.out)?;
        Ok(())
    }
}

fn record_json(record: &Record) -> Value
{
    match record {
        Record::Unit(unit) => json!({
            "record": "unit",
            "offset": unit.offset,
            "producer": unit.producer,
            "language": unit.language,
            "name": unit.name,
            "comp_dir": unit.comp_dir,
            "macro_offset": unit.macro_offset,
            "files": unit.files,
        }),
        Record::Entry(entry) => json!({
            "record": "entry",
            "offset": entry.offset,
            "tag": entry.tag.to_string(),
            "depth": entry.depth,
            "has_children": entry.has_children,
            "fields": entry.fields.iter().map(field_json).collect::<Vec<_>>(),
        }),
        Record::MacroContext(context) => {
            let (origin, unit_offset) = match context.origin {
                MacroOrigin::Unit { unit_offset } => ("unit", Some(unit_offset)),
                MacroOrigin::Import => ("import", None),
            };
            json!({
                "record": "macro_context",
                "origin": origin,
                "unit_offset": unit_offset,
                "offset": context.header.offset,
                "version": context.header.version,
                "op_count": context.header.op_count,
                "data_len": context.header.data_len,
                "line_offset": context.header.line_offset,
            })
        }
        Record::Macro(op) => json!({
            "record": "macro",
            "index": op.index,
            "section_offset": op.section_offset,
            "operator": op.operator.to_string(),
            "code": op.operator.0,
            "event": event_json(&op.event),
        }),
        Record::DebugString(entry) => json!({
            "record": "debug_str",
            "offset": entry.offset,
            "length": entry.length,
            "text": entry.text,
        }),
    }
}

fn field_json(field: &Field) -> Value
{
    let (kind, value) = match &field.value {
        FieldValue::Text(text) => ("text", json!(text)),
        FieldValue::Missing => ("text", Value::Null),
        FieldValue::Unsigned(value) => ("unsigned", json!(value)),
        FieldValue::Reference(offset) => ("reference", json!(offset)),
        FieldValue::Address(address) => ("address", json!(address)),
        FieldValue::Flag(flag) => ("flag", json!(flag)),
        FieldValue::File(path) => ("file", json!(path)),
        FieldValue::Expression(block) => ("expression", json!({ "length": block.len(), "bytes": hex(&block.bytes) })),
        FieldValue::Symbol { raw, demangled } => ("symbol", json!({ "raw": raw, "demangled": demangled })),
    };
    json!({ "attribute": field.name.to_string(), "kind": kind, "value": value })
}

fn event_json(event: &MacroEvent) -> Value
{
    match event {
        MacroEvent::Define { line, text } => json!({ "kind": "define", "line": line, "text": text }),
        MacroEvent::Undef { line, text } => json!({ "kind": "undef", "line": line, "text": text }),
        MacroEvent::StartFile { line, file_index, path } => {
            json!({ "kind": "start_file", "line": line, "file_index": file_index, "path": path })
        }
        MacroEvent::EndFile => json!({ "kind": "end_file" }),
        MacroEvent::Import { offset } => json!({ "kind": "import", "offset": offset }),
        MacroEvent::ImportSup { offset } => json!({ "kind": "import_sup", "offset": offset }),
        MacroEvent::Vendor { form_count } => json!({ "kind": "vendor", "form_count": form_count }),
    }
}
