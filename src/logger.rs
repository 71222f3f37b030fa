// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A `log` sink writing to a byte console.
//!
//! The crate logs through the `log` macros and never installs a logger on
//! its own. A board without `std` can wrap its UART in a [`SharedConsole`]
//! and pass it to [`init`].

use embedded_io::{ErrorType, Write};
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use spin::mutex::SpinMutex;

/// A console guarded by a spin mutex so that it may be shared between threads.
pub struct SharedConsole<T: Send> {
    console: SpinMutex<T>,
}

impl<T: Send> SharedConsole<T> {
    /// Wraps `console`.
    pub const fn new(console: T) -> Self {
        Self {
            console: SpinMutex::new(console),
        }
    }

    /// Unwraps the console.
    pub fn into_inner(self) -> T {
        self.console.into_inner()
    }
}

impl<T: ErrorType + Send> ErrorType for &SharedConsole<T> {
    type Error = T::Error;
}

impl<T: ErrorType + Send + Write> Write for &SharedConsole<T> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.console.lock().write(buf)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.console.lock().flush()
    }
}

impl<T: Send + Write> Log for SharedConsole<T> {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        let console = &mut *self.console.lock();
        // A logger has nowhere to report its own failures.
        let _ = writeln!(console, "[{}] {}", record.level(), record.args());
    }

    fn flush(&self) {
        let _ = self.console.lock().flush();
    }
}

/// Initialises the logger with the given shared console.
///
/// # Errors
///
/// Returns an error if a logger was already installed.
pub fn init(console: &'static impl Log, max_level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_logger(console)?;
    log::set_max_level(max_level);
    Ok(())
}
