// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A read-only API for inspecting and decoding a device tree property.

use core::ffi::CStr;

use zerocopy::{FromBytes, big_endian};

use super::{FDT_TAGSIZE, Fdt, FdtToken};
use crate::error::{FdtError, FdtErrorKind};

/// A property of a device tree node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FdtProperty<'a> {
    name: &'a str,
    value: &'a [u8],
    value_offset: usize,
}

impl<'a> FdtProperty<'a> {
    /// Returns the name of this property.
    #[must_use]
    pub fn name(&self) -> &'a str {
        self.name
    }

    /// Returns the value of this property.
    #[must_use]
    pub fn value(&self) -> &'a [u8] {
        self.value
    }

    /// Returns the offset of this property's value in the blob.
    #[must_use]
    pub fn value_offset(&self) -> usize {
        self.value_offset
    }

    /// Returns the value of this property as a `u32`.
    ///
    /// # Errors
    ///
    /// Returns an [`FdtErrorKind::InvalidLength`] if the property's value is
    /// not 4 bytes long.
    pub fn as_u32(&self) -> Result<u32, FdtError> {
        big_endian::U32::ref_from_bytes(self.value)
            .map(|val| val.get())
            .map_err(|_e| FdtError::new(FdtErrorKind::InvalidLength, self.value_offset))
    }

    /// Returns the value of this property as a `u64`.
    ///
    /// # Errors
    ///
    /// Returns an [`FdtErrorKind::InvalidLength`] if the property's value is
    /// not 8 bytes long.
    pub fn as_u64(&self) -> Result<u64, FdtError> {
        big_endian::U64::ref_from_bytes(self.value)
            .map(|val| val.get())
            .map_err(|_e| FdtError::new(FdtErrorKind::InvalidLength, self.value_offset))
    }

    /// Returns the value of this property as a single string.
    ///
    /// # Errors
    ///
    /// Returns an [`FdtErrorKind::InvalidString`] if the property's value is
    /// not exactly one NUL-terminated string or contains invalid UTF-8.
    pub fn as_str(&self) -> Result<&'a str, FdtError> {
        CStr::from_bytes_with_nul(self.value)
            .ok()
            .and_then(|cstr| cstr.to_str().ok())
            .ok_or(FdtError::new(FdtErrorKind::InvalidString, self.value_offset))
    }

    /// Returns an iterator over the NUL-separated strings in this property.
    ///
    /// Iteration stops at the first run that isn't valid UTF-8.
    pub fn as_str_list(&self) -> impl Iterator<Item = &'a str> + use<'a> {
        let mut reader = self.reader();
        core::iter::from_fn(move || reader.read_str().ok().flatten())
    }

    /// Returns a cursor reading this property's value from the start.
    #[must_use]
    pub fn reader(&self) -> FdtPropertyReader<'a> {
        FdtPropertyReader {
            rest: self.value,
            offset: self.value_offset,
        }
    }
}

/// A cursor over a property value.
///
/// Integers are big-endian and consume exactly their width. Strings consume
/// a NUL-terminated run, or the remainder of the value if the last run is
/// unterminated.
#[derive(Debug, Clone)]
pub struct FdtPropertyReader<'a> {
    rest: &'a [u8],
    offset: usize,
}

impl<'a> FdtPropertyReader<'a> {
    /// Creates a reader over a value that starts at `offset` in its blob.
    #[cfg(feature = "write")]
    pub(crate) fn new(value: &'a [u8], offset: usize) -> Self {
        Self {
            rest: value,
            offset,
        }
    }

    /// Returns the number of bytes not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.rest.len()
    }

    /// Returns whether the whole value has been consumed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rest.is_empty()
    }

    fn short(&self) -> FdtError {
        FdtError::new(FdtErrorKind::BadStructure, self.offset)
    }

    fn advance(&mut self, rest: &'a [u8]) {
        self.offset += self.rest.len() - rest.len();
        self.rest = rest;
    }

    pub(crate) fn exhaust(&mut self) {
        self.advance(&[]);
    }

    /// Reads a single byte.
    pub fn read_u8(&mut self) -> Result<u8, FdtError> {
        let value = self.rest;
        let (&val, rest) = value.split_first().ok_or(self.short())?;
        self.advance(rest);
        Ok(val)
    }

    /// Reads a big-endian `u16`.
    pub fn read_u16(&mut self) -> Result<u16, FdtError> {
        let (val, rest) = big_endian::U16::ref_from_prefix(self.rest).map_err(|_| self.short())?;
        self.advance(rest);
        Ok(val.get())
    }

    /// Reads a big-endian `u32`, i.e. a single cell.
    pub fn read_u32(&mut self) -> Result<u32, FdtError> {
        let (val, rest) = big_endian::U32::ref_from_prefix(self.rest).map_err(|_| self.short())?;
        self.advance(rest);
        Ok(val.get())
    }

    /// Reads a big-endian `u64`.
    pub fn read_u64(&mut self) -> Result<u64, FdtError> {
        let (val, rest) = big_endian::U64::ref_from_prefix(self.rest).map_err(|_| self.short())?;
        self.advance(rest);
        Ok(val.get())
    }

    /// Reads an unsigned integer `size` bytes wide.
    ///
    /// # Errors
    ///
    /// Returns [`FdtErrorKind::BadStructure`] if `size` is not 1, 2, 4 or 8,
    /// or if fewer than `size` bytes remain.
    pub fn read_uint(&mut self, size: usize) -> Result<u64, FdtError> {
        match size {
            1 => self.read_u8().map(u64::from),
            2 => self.read_u16().map(u64::from),
            4 => self.read_u32().map(u64::from),
            8 => self.read_u64(),
            _ => Err(self.short()),
        }
    }

    /// Reads a value spanning `cells` 32-bit cells.
    ///
    /// # Errors
    ///
    /// Returns [`FdtErrorKind::UnsupportedCellCount`] for more than two cells
    /// and [`FdtErrorKind::BadStructure`] if too few bytes remain.
    pub fn read_cells(&mut self, cells: u32) -> Result<u64, FdtError> {
        match cells {
            0 => Ok(0),
            1 => self.read_u32().map(u64::from),
            2 => self.read_u64(),
            _ => Err(FdtError::new(
                FdtErrorKind::UnsupportedCellCount(cells),
                self.offset,
            )),
        }
    }

    /// Reads the next string, or returns `None` once the value is consumed.
    pub fn read_str(&mut self) -> Result<Option<&'a str>, FdtError> {
        let value = self.rest;
        if value.is_empty() {
            return Ok(None);
        }
        let (run, rest) = match value.iter().position(|&b| b == 0) {
            Some(nul) => (&value[..nul], &value[nul + 1..]),
            None => (value, &[][..]),
        };
        let s = core::str::from_utf8(run)
            .map_err(|_| FdtError::new(FdtErrorKind::InvalidString, self.offset))?;
        self.advance(rest);
        Ok(Some(s))
    }
}

/// An iterator over the properties of a device tree node.
pub(crate) enum FdtPropIter<'a> {
    Start { fdt: Fdt<'a>, offset: usize },
    Running { fdt: Fdt<'a>, offset: usize },
    Error,
}

impl<'a> Iterator for FdtPropIter<'a> {
    type Item = Result<FdtProperty<'a>, FdtError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Start { fdt, offset } => {
                let fdt = *fdt;
                match fdt.node_body_offset(*offset) {
                    Ok(offset) => *self = Self::Running { fdt, offset },
                    Err(e) => {
                        *self = Self::Error;
                        return Some(Err(e));
                    }
                }
                self.next()
            }
            Self::Running { fdt, offset } => match Self::try_next(*fdt, offset) {
                Ok(Some(val)) => Some(Ok(val)),
                Ok(None) => None,
                Err(e) => {
                    *self = Self::Error;
                    Some(Err(e))
                }
            },
            Self::Error => None,
        }
    }
}

impl<'a> FdtPropIter<'a> {
    fn try_next(fdt: Fdt<'a>, offset: &mut usize) -> Result<Option<FdtProperty<'a>>, FdtError> {
        loop {
            match fdt.read_token(*offset)? {
                FdtToken::Prop => {
                    let len = fdt.read_u32(*offset + FDT_TAGSIZE)? as usize;
                    let nameoff = fdt.read_u32(*offset + 2 * FDT_TAGSIZE)? as usize;
                    let value_offset = *offset + 3 * FDT_TAGSIZE;
                    let value = fdt
                        .data
                        .get(value_offset..value_offset + len)
                        .ok_or(FdtError::new(FdtErrorKind::InvalidLength, value_offset))?;
                    let name = fdt.string(nameoff)?;
                    *offset = Fdt::align_tag_offset(value_offset + len);
                    return Ok(Some(FdtProperty {
                        name,
                        value,
                        value_offset,
                    }));
                }
                FdtToken::Nop => *offset += FDT_TAGSIZE,
                _ => return Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(value: &[u8]) -> FdtPropertyReader<'_> {
        FdtPropertyReader {
            rest: value,
            offset: 100,
        }
    }

    #[test]
    fn read_uint_widths() {
        let value = [
            0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc, 0xde, 0xf0, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07,
        ];
        let mut reader = reader(&value);
        assert_eq!(reader.read_uint(1).unwrap(), 0x12);
        assert_eq!(reader.read_uint(2).unwrap(), 0x3456);
        assert_eq!(reader.read_uint(4).unwrap(), 0x789a_bcde);
        assert_eq!(reader.read_uint(8).unwrap(), 0xf001_0203_0405_0607);
        assert!(reader.is_empty());
    }

    #[test]
    fn read_uint_rejects_odd_width() {
        let mut reader = reader(&[0; 8]);
        let err = reader.read_uint(3).unwrap_err();
        assert_eq!(err.kind, FdtErrorKind::BadStructure);
        assert_eq!(reader.remaining(), 8);
    }

    #[test]
    fn short_read_reports_offset() {
        let mut reader = reader(&[0, 0, 0, 1, 0, 0]);
        assert_eq!(reader.read_u32().unwrap(), 1);
        let err = reader.read_u32().unwrap_err();
        assert_eq!(err.kind, FdtErrorKind::BadStructure);
        assert_eq!(err.offset(), 104);
    }

    #[test]
    fn read_cells() {
        let mut reader = reader(&[0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0, 3]);
        assert_eq!(reader.read_cells(0).unwrap(), 0);
        assert_eq!(reader.read_cells(2).unwrap(), 0x1_0000_0002);
        assert_eq!(reader.read_cells(1).unwrap(), 3);
        assert_eq!(
            reader.read_cells(3).unwrap_err().kind,
            FdtErrorKind::UnsupportedCellCount(3)
        );
    }

    #[test]
    fn read_str_runs() {
        let mut reader = reader(b"arm,pl011\0\0tail");
        assert_eq!(reader.read_str().unwrap(), Some("arm,pl011"));
        assert_eq!(reader.read_str().unwrap(), Some(""));
        assert_eq!(reader.read_str().unwrap(), Some("tail"));
        assert_eq!(reader.read_str().unwrap(), None);
    }

    #[test]
    fn read_str_invalid_utf8() {
        let mut reader = reader(&[0xff, 0xfe, 0]);
        assert_eq!(
            reader.read_str().unwrap_err().kind,
            FdtErrorKind::InvalidString
        );
    }
}
