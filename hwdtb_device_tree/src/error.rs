// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Error types for the `hwdtb_device_tree` crate.
//!
//! A property, node or path that simply isn't there is not an error: lookups
//! return `Ok(None)` for it. [`FdtError`] is reserved for blobs that cannot be
//! traversed or decoded.

use core::fmt;

/// An error that can occur when reading or patching a device tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct FdtError {
    offset: usize,
    /// The type of the error that has occurred.
    pub kind: FdtErrorKind,
}

impl FdtError {
    pub(crate) fn new(kind: FdtErrorKind, offset: usize) -> Self {
        Self { offset, kind }
    }

    /// Returns the byte offset in the blob at which the error was detected.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// The kind of an error that can occur when reading or patching a device
/// tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum FdtErrorKind {
    /// The magic number of the device tree is invalid.
    InvalidMagic,
    /// The Device Tree version is not supported by this library.
    UnsupportedVersion(u32),
    /// The length of the device tree, or of a block inside it, is invalid.
    InvalidLength,
    /// An invalid token was encountered.
    BadToken(u32),
    /// An invalid string was encountered.
    InvalidString,
    /// A property value is too short or misaligned for the requested cell
    /// layout.
    BadStructure,
    /// A `#address-cells` or `#size-cells` value that can't describe a 64-bit
    /// quantity.
    UnsupportedCellCount(u32),
    /// A value doesn't fit in the number of cells available to encode it.
    CellOverflow(u64),
}

impl fmt::Display for FdtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at offset {}", self.kind, self.offset)
    }
}

impl fmt::Display for FdtErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FdtErrorKind::InvalidMagic => write!(f, "invalid FDT magic number"),
            FdtErrorKind::UnsupportedVersion(version) => {
                write!(f, "the FDT version {version} is not supported")
            }
            FdtErrorKind::InvalidLength => write!(f, "invalid FDT length"),
            FdtErrorKind::BadToken(token) => write!(f, "bad FDT token: 0x{token:x}"),
            FdtErrorKind::InvalidString => write!(f, "invalid string in FDT"),
            FdtErrorKind::BadStructure => write!(f, "property too short for its cell layout"),
            FdtErrorKind::UnsupportedCellCount(cells) => {
                write!(f, "unsupported cell count {cells}")
            }
            FdtErrorKind::CellOverflow(value) => {
                write!(f, "value 0x{value:x} doesn't fit in its cells")
            }
        }
    }
}

impl core::error::Error for FdtError {}
