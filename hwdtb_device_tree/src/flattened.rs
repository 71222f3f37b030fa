// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use alloc::vec::Vec;

use crate::error::FdtError;
use crate::fdt::Fdt;
#[cfg(feature = "write")]
use crate::model::DeviceTree;

/// An owned, validated flattened device tree blob.
///
/// The blob is checked once on construction; [`FlattenedDeviceTree::fdt`]
/// then hands out zero-copy views of it for as long as it lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlattenedDeviceTree {
    data: Vec<u8>,
}

impl FlattenedDeviceTree {
    /// Takes ownership of a blob after validating its header and root node.
    ///
    /// # Errors
    ///
    /// Returns an error if the header is invalid or the structure block
    /// doesn't start with a node.
    pub fn new(data: Vec<u8>) -> Result<Self, FdtError> {
        Fdt::new(&data)?.root()?;
        Ok(Self { data })
    }

    /// Returns a read-only view of the blob.
    #[must_use]
    pub fn fdt(&self) -> Fdt<'_> {
        Fdt { data: &self.data }
    }

    /// Returns the raw blob.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Returns the raw blob, consuming `self`.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Merges a memory region into `/memory`. See
    /// [`DeviceTree::add_memory_region`].
    ///
    /// # Errors
    ///
    /// Returns an error if the blob can't be parsed or the region can't be
    /// encoded. The blob is left untouched on error.
    #[cfg(feature = "write")]
    #[cfg_attr(docsrs, doc(cfg(feature = "write")))]
    pub fn add_memory_region(&mut self, address: u64, size: u64) -> Result<(), FdtError> {
        if size == 0 {
            return Ok(());
        }
        self.edit(|tree| tree.add_memory_region(address, size))
    }

    /// Appends a CPU node under `/cpus` and returns its name. See
    /// [`DeviceTree::add_cpu`].
    ///
    /// # Errors
    ///
    /// Returns an error if the blob can't be parsed.
    #[cfg(feature = "write")]
    #[cfg_attr(docsrs, doc(cfg(feature = "write")))]
    pub fn add_cpu(&mut self, compatible: &str) -> Result<alloc::string::String, FdtError> {
        self.edit(|tree| Ok(tree.add_cpu(compatible)))
    }

    #[cfg(feature = "write")]
    fn edit<T>(
        &mut self,
        f: impl FnOnce(&mut DeviceTree) -> Result<T, FdtError>,
    ) -> Result<T, FdtError> {
        let mut tree = DeviceTree::from_fdt(&self.fdt())?;
        let result = f(&mut tree)?;
        self.data = tree.to_dtb();
        Ok(result)
    }
}

#[cfg(feature = "write")]
impl From<&DeviceTree> for FlattenedDeviceTree {
    fn from(tree: &DeviceTree) -> Self {
        Self {
            data: tree.to_dtb(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FdtErrorKind;

    #[test]
    fn rejects_garbage() {
        let err = FlattenedDeviceTree::new(alloc::vec![0; 64]).unwrap_err();
        assert_eq!(err.kind, FdtErrorKind::InvalidMagic);
    }
}
