// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Logging to a platform-provided sink, and the panic handler for bare-metal builds.

use crate::debug::DEBUG;
use core::fmt::{Arguments, Write};
#[cfg(all(not(test), target_os = "none"))]
use core::panic::PanicInfo;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use spin::{Once, mutex::SpinMutex};

static LOGGER: Once<Logger> = Once::new();

struct Logger {
    sink: &'static (dyn LogSink + Sync),
}

impl Log for Logger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        writeln!(self.sink, "{}: {}", record.level(), record.args());
    }

    fn flush(&self) {
        self.sink.flush();
    }
}

/// Initialises logger.
///
/// Only the first sink passed is used; later calls return an error.
pub fn init(sink: &'static (dyn LogSink + Sync)) -> Result<(), SetLoggerError> {
    let logger = LOGGER.call_once(|| Logger { sink });
    log::set_logger(logger)?;
    log::set_max_level(build_time_log_level());
    Ok(())
}

/// Gets a reference to the log sink, if it has been set.
#[cfg_attr(any(test, not(target_os = "none")), allow(unused))]
fn get_log_sink() -> Option<&'static (dyn LogSink + Sync)> {
    LOGGER.get().map(|logger| logger.sink)
}

#[cfg(all(not(test), target_os = "none"))]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    if let Some(sink) = get_log_sink() {
        writeln!(sink, "{}", info);
    }
    loop {}
}

/// Returns the logging [`LevelFilter`] set by the build-time environment variable `LOG_LEVEL`.
/// `LOG_LEVEL` can have the lower-case string values "off", "error", "warn", "info", "debug", or
/// "trace", corresponding to the named values of [`LevelFilter`]. If `LOG_LEVEL` is absent or has
/// some other value, this function returns `LevelFilter::Debug` if [`DEBUG`] is true, otherwise
/// `LevelFilter::Info`.
pub const fn build_time_log_level() -> LevelFilter {
    let level = match option_env!("LOG_LEVEL") {
        Some(level) => level,
        None => "",
    };
    parse_log_level(level.as_bytes())
}

const fn parse_log_level(level: &[u8]) -> LevelFilter {
    match level {
        b"off" => LevelFilter::Off,
        b"error" => LevelFilter::Error,
        b"warn" => LevelFilter::Warn,
        b"info" => LevelFilter::Info,
        b"debug" => LevelFilter::Debug,
        b"trace" => LevelFilter::Trace,
        _ => {
            if DEBUG {
                LevelFilter::Debug
            } else {
                LevelFilter::Info
            }
        }
    }
}

/// Something to which logs can be sent.
///
/// Note that unlike `core::fmt::Write`, the `write_fmt` method on this trait takes `&self` rather
/// than `&mut self`. This means that the implementation is responsible for handling locking if
/// necessary, or can be made lock-free.
pub trait LogSink {
    /// Writes the given format arguments to the log sink.
    fn write_fmt(&self, args: Arguments);

    /// Flushes any buffered output.
    fn flush(&self) {}
}

/// An implementation of `LogSink` that wraps around any implementation of `core::fmt::Write`.
///
/// This wraps the given writer in a spin mutex, so that a complete log line is written at once
/// rather than being interleaved with characters from another core.
pub struct LockedWriter<W: Write> {
    writer: SpinMutex<W>,
}

impl<W: Write> LockedWriter<W> {
    /// Creates a new `LockedWriter` wrapping the given [`Write`] implementation.
    pub const fn new(writer: W) -> Self {
        Self {
            writer: SpinMutex::new(writer),
        }
    }

    /// Consumes the `LockedWriter`, returning the wrapped writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write> LogSink for LockedWriter<W> {
    fn write_fmt(&self, args: Arguments) {
        // Ignore errors.
        let _ = self.writer.lock().write_fmt(args);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_levels() {
        assert_eq!(parse_log_level(b"off"), LevelFilter::Off);
        assert_eq!(parse_log_level(b"warn"), LevelFilter::Warn);
        assert_eq!(parse_log_level(b"trace"), LevelFilter::Trace);
        // Tests are built with debug assertions.
        assert_eq!(parse_log_level(b"verbose"), LevelFilter::Debug);
        assert_eq!(parse_log_level(b""), LevelFilter::Debug);
    }

    #[test]
    fn locked_writer_collects_lines() {
        let writer = LockedWriter::new(String::new());
        writeln!(writer, "{}: {}", log::Level::Warn, "first");
        writeln!(writer, "second {:#x}", 42);
        assert_eq!(writer.into_inner(), "WARN: first\nsecond 0x2a\n");
    }
}
