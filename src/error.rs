// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use hwdtb_device_tree::FdtError;

/// An error building or initializing a machine.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The device tree blob couldn't be traversed or decoded.
    Fdt(FdtError),
    /// A full initialization pass changed no node while some handlers were
    /// still waiting on their dependencies.
    Stalled {
        /// The number of passes run, the stalled one included.
        passes: usize,
        /// Paths of the nodes still waiting.
        pending: Vec<String>,
    },
}

impl From<FdtError> for Error {
    fn from(e: FdtError) -> Self {
        Self::Fdt(e)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Fdt(e) => write!(f, "malformed device tree: {e}"),
            Error::Stalled { passes, pending } => {
                write!(
                    f,
                    "device initialization stalled after {passes} passes, still waiting: "
                )?;
                for (i, path) in pending.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{path}")?;
                }
                Ok(())
            }
        }
    }
}

impl core::error::Error for Error {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Error::Fdt(e) => Some(e),
            Error::Stalled { .. } => None,
        }
    }
}

/// Why a device handler did not produce a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    /// The handler failed; the node is ignored from now on.
    Error,
    /// The handler doesn't know how to build this particular node; the node
    /// is ignored from now on.
    Unknown,
    /// The device is described but absent (for instance `status =
    /// "disabled"`); the node is ignored from now on.
    NotPresent,
    /// Another node the device needs is not initialized yet; the handler is
    /// called again on the next pass.
    DependencyNotReady,
}

impl From<FdtError> for InitError {
    fn from(_: FdtError) -> Self {
        Self::Error
    }
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::Error => write!(f, "initialization failed"),
            InitError::Unknown => write!(f, "unknown device"),
            InitError::NotPresent => write!(f, "device not present"),
            InitError::DependencyNotReady => write!(f, "dependency not ready"),
        }
    }
}

impl core::error::Error for InitError {}
