//! Log output: coloured messages on stderr, optionally teed into a file.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use log::LevelFilter;

use crate::CliError;

/// Writes every log line to stderr and, with ANSI codes removed, to a file.
struct TeeWriter {
    file: strip_ansi_escapes::Writer<File>,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

/// Install the global logger.
///
/// `--quiet` shows warnings and errors only, `--verbose` adds debug output
/// with timestamps. `RUST_LOG` overrides both.
pub(crate) fn init(quiet: bool, verbose: bool, logfile: Option<&Path>) -> Result<(), CliError> {
    let level = if quiet {
        LevelFilter::Warn
    } else if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    if verbose {
        builder.format(|buf, record| {
            writeln!(
                buf,
                "{} {:<5} {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                record.level(),
                record.args()
            )
        });
    } else {
        builder.format(|buf, record| writeln!(buf, "{}", record.args()));
    }
    builder.parse_env("RUST_LOG");

    if let Some(path) = logfile {
        let file = File::create(path).map_err(|e| {
            CliError::config(format!("Cannot create log file {}: {}", path.display(), e))
        })?;
        let tee = TeeWriter {
            file: strip_ansi_escapes::Writer::new(file),
        };
        builder.target(env_logger::Target::Pipe(Box::new(tee)));
    }

    builder
        .try_init()
        .map_err(|e| CliError::other(format!("Logger already installed: {e}")))
}

/// Log an empty line at info level.
pub(crate) fn log_blank() {
    log::info!("");
}
