//! # Macro operation decoding
//!
//! [`MacroOpDecoder`] turns the operations of one macro context into
//! [`MacroEvent`]s. It runs through the context by index, up to the
//! operation count from the header or the first terminator (operator 0).
//!
//! ## Failure handling
//!
//! - An operation whose generic operator cannot be read is skipped with a
//!   warning and counted in [`MacroStats::skipped`]
//! - A recognised operator whose payload cannot be decoded aborts the run
//!   with [`DieWalkError::MacroPayload`]
//! - Operators without a decoder become [`MacroEvent::Vendor`]
//!
//! Plain imports are pushed onto the session's [`OffsetWorklist`] so the
//! imported context can be decoded later. Supplementary imports point into
//! another object and are only reported.

use gimli::constants::{self, DwMacro};
use tracing::{debug, warn};

use crate::error::{DieWalkError, MacroDecodeError, Result};
use crate::files::SourceFileTable;
use crate::reader::{is_define_undef, MacroContext};
use crate::records::{MacroContextRecord, MacroEvent, MacroOrigin, MacroRecord, Record, RecordSink};
use crate::worklist::OffsetWorklist;

/// Counters for one decoded context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MacroStats
{
    /// Events emitted
    pub events: usize,
    /// Operations whose operator could not be read
    pub skipped: usize,
    /// Offsets pushed onto the worklist
    pub queued: usize,
}

/// Decoder for macro contexts of one unit (or of imports).
pub struct MacroOpDecoder<'a>
{
    files: &'a SourceFileTable,
    worklist: &'a mut OffsetWorklist,
}

impl<'a> MacroOpDecoder<'a>
{
    pub fn new(files: &'a SourceFileTable, worklist: &'a mut OffsetWorklist) -> Self
    {
        Self { files, worklist }
    }

    /// Decode every operation of `context`, header record first.
    pub fn decode(&mut self, context: &dyn MacroContext, origin: MacroOrigin, sink: &mut dyn RecordSink) -> Result<MacroStats>
    {
        let header = context.header();
        debug!(
            offset = header.offset,
            version = header.version,
            ops = header.op_count,
            "decoding macro context"
        );
        sink.record(Record::MacroContext(MacroContextRecord { origin, header }))?;

        let mut stats = MacroStats::default();
        for index in 0..header.op_count {
            let operator = match context.operator(index) {
                Ok(operator) => operator,
                Err(err) => {
                    warn!(context = header.offset, index, error = %err, "skipping unreadable macro operation");
                    stats.skipped += 1;
                    continue;
                }
            };

            if operator.code == DwMacro(0) {
                break;
            }

            let event = self.decode_event(context, index, operator.code, operator.form_count, &mut stats)?;
            sink.record(Record::Macro(MacroRecord {
                index,
                section_offset: operator.section_offset,
                operator: operator.code,
                event,
            }))?;
            stats.events += 1;
        }

        Ok(stats)
    }

    fn decode_event(
        &mut self,
        context: &dyn MacroContext,
        index: usize,
        code: DwMacro,
        form_count: u16,
        stats: &mut MacroStats,
    ) -> Result<MacroEvent>
    {
        let payload = |err: MacroDecodeError| DieWalkError::MacroPayload {
            index,
            operator: code,
            details: err.to_string(),
        };

        let event = match code {
            code if is_define_undef(code) => {
                let def = context.define_undef(index).map_err(payload)?;
                if is_define(code) {
                    MacroEvent::Define {
                        line: def.line,
                        text: def.text,
                    }
                } else {
                    MacroEvent::Undef {
                        line: def.line,
                        text: def.text,
                    }
                }
            }
            constants::DW_MACRO_start_file => {
                let boundary = context.file_boundary(index).map_err(payload)?;
                MacroEvent::StartFile {
                    line: boundary.line,
                    file_index: boundary.file_index,
                    path: self.files.get(boundary.file_index).map(str::to_owned),
                }
            }
            constants::DW_MACRO_end_file => {
                context.file_boundary(index).map_err(payload)?;
                MacroEvent::EndFile
            }
            constants::DW_MACRO_import => {
                let offset = context.import(index).map_err(payload)?;
                self.worklist.push(offset);
                stats.queued += 1;
                MacroEvent::Import { offset }
            }
            constants::DW_MACRO_import_sup => {
                let offset = context.import(index).map_err(payload)?;
                debug!(offset, "supplementary import is not followed");
                MacroEvent::ImportSup { offset }
            }
            _ => MacroEvent::Vendor { form_count },
        };
        Ok(event)
    }
}

fn is_define(code: DwMacro) -> bool
{
    matches!(
        code,
        constants::DW_MACRO_define
            | constants::DW_MACRO_define_strp
            | constants::DW_MACRO_define_strx
            | constants::DW_MACRO_define_sup
    )
}
