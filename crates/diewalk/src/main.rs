mod render;

use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use diewalk_core::{DebugInfoReader, DieWalkError, ImportPolicy, ObjectImage, Record, RecordSink, Session, SessionOptions, UnhandledTagPolicy};
use diewalk_utils::{error, info, init_logging, LogConfig, LogLevel};
use render::{JsonRenderer, TextRenderer};

/// Dump DWARF entries and preprocessor macro streams from compiled binaries.
#[derive(Parser, Debug)]
#[command(name = "diewalk")]
#[command(version)]
#[command(about = "Dump DWARF entries and preprocessor macro streams from compiled binaries", long_about = None)]
struct Cli
{
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace); overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Walk every compilation unit and print its entries and macros
    Dump
    {
        /// Path to the binary to inspect
        binary: PathBuf,
        /// Emit newline-delimited JSON instead of text
        #[arg(long, default_value_t = false)]
        json: bool,
        /// Skip .debug_macro decoding
        #[arg(long, default_value_t = false)]
        no_macros: bool,
        /// Append the .debug_str string table
        #[arg(long, default_value_t = false)]
        strings: bool,
        /// Still visit the children of entries whose tag has no handler
        #[arg(long, default_value_t = false)]
        walk_unhandled: bool,
        /// How imported macro contexts are followed
        #[arg(long, value_enum, default_value_t = ImportMode::Transitive)]
        imports: ImportMode,
    },
    /// Print the .debug_str string table
    Strings
    {
        /// Path to the binary to inspect
        binary: PathBuf,
        /// Emit newline-delimited JSON instead of text
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ImportMode
{
    /// Follow imports of imports, decoding each context once
    Transitive,
    /// Decode only the imports queued by the units themselves
    SinglePass,
}

impl From<ImportMode> for ImportPolicy
{
    fn from(mode: ImportMode) -> Self
    {
        match mode {
            ImportMode::Transitive => ImportPolicy::Transitive,
            ImportMode::SinglePass => ImportPolicy::SinglePass,
        }
    }
}

fn main() -> ExitCode
{
    let cli = Cli::parse();

    // Keep the guard alive for the whole run so file logs are flushed on exit
    let _guard = match init_logging(&LogConfig::from_env().with_level(cli.log_level)) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run_command(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(primitive = e.primitive(), "{e}");
            eprintln!("diewalk: {} failed: {e}", e.primitive());
            ExitCode::FAILURE
        }
    }
}

fn run_command(command: Commands) -> Result<(), DieWalkError>
{
    match command {
        Commands::Dump {
            binary,
            json,
            no_macros,
            strings,
            walk_unhandled,
            imports,
        } => {
            let options = SessionOptions {
                macros: !no_macros,
                strings,
                unhandled: if walk_unhandled {
                    UnhandledTagPolicy::Walk
                } else {
                    UnhandledTagPolicy::Skip
                },
                imports: imports.into(),
            };
            info!(binary = %binary.display(), ?options, "dumping debug information");

            let image = ObjectImage::open(&binary)?;
            let mut reader = image.units()?;
            let mut session = Session::new(options);
            let out = BufWriter::new(io::stdout().lock());

            let summary = if json {
                let mut renderer = JsonRenderer::new(out);
                let summary = session.run(&mut reader, &mut renderer)?;
                renderer.finish()?;
                summary
            } else {
                let mut renderer = TextRenderer::new(out);
                let summary = session.run(&mut reader, &mut renderer)?;
                renderer.finish()?;
                summary
            };
            info!(?summary, "dump finished");
            Ok(())
        }
        Commands::Strings { binary, json } => {
            let image = ObjectImage::open(&binary)?;
            let reader = image.units()?;
            let out = BufWriter::new(io::stdout().lock());

            if json {
                let mut renderer = JsonRenderer::new(out);
                emit_strings(&reader, &mut renderer)?;
                renderer.finish()?;
            } else {
                let mut renderer = TextRenderer::new(out);
                emit_strings(&reader, &mut renderer)?;
                renderer.finish()?;
            }
            Ok(())
        }
    }
}

fn emit_strings(reader: &dyn DebugInfoReader, sink: &mut dyn RecordSink) -> Result<(), DieWalkError>
{
    let entries = reader.string_table()?;
    info!(count = entries.len(), "emitting .debug_str");
    for entry in entries {
        sink.record(Record::DebugString(entry))?;
    }
    Ok(())
}
