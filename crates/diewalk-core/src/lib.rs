//! # diewalk-core
//!
//! Traversal and decoding engine for DWARF debug information.
//!
//! This crate walks the entry tree of every compilation unit in a binary and
//! decodes the `.debug_macro` operation streams those units reference. It
//! produces a stream of structured [`Record`]s; turning them into text or JSON
//! is left to the caller.
//!
//! ## Layers
//!
//! - [`reader`]: traits the engine consumes, plus the `object` + `gimli`
//!   backend ([`ObjectImage`])
//! - [`attributes`], [`files`], [`worklist`]: small state holders
//! - [`dispatch`], [`traversal`], [`macros`]: the decoding engine
//! - [`session`]: drives a whole run
//!
//! ## Example
//!
//! ```rust,no_run
//! use diewalk_core::{ObjectImage, Record, Session, SessionOptions};
//!
//! # fn example() -> diewalk_core::Result<()> {
//! let image = ObjectImage::open("target/debug/app")?;
//! let mut reader = image.units()?;
//! let mut records: Vec<Record> = Vec::new();
//! let summary = Session::new(SessionOptions::default()).run(&mut reader, &mut records)?;
//! println!("{} units, {} entries", summary.units, summary.entries);
//! # Ok(())
//! # }
//! ```

pub mod attributes;
pub mod demangle;
pub mod dispatch;
pub mod error;
pub mod files;
pub mod macros;
pub mod reader;
pub mod records;
pub mod session;
pub mod traversal;
pub mod worklist;

pub use attributes::{AttributeAccessor, Lookup, Presence};
pub use dispatch::{KnownTag, TagDispatch, TagHandler};
pub use error::{DieWalkError, MacroDecodeError, Result};
pub use files::{SourceFileTable, NULL_FILE};
pub use reader::{DebugInfoReader, ObjectImage};
pub use records::{Record, RecordSink};
pub use session::{ImportPolicy, RunSummary, Session, SessionOptions};
pub use traversal::UnhandledTagPolicy;
pub use worklist::OffsetWorklist;
