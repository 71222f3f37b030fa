// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A read-write, in-memory representation of a device tree.
//!
//! [`DeviceTree`] is what the board fix-up helpers edit before a blob is
//! handed to the machine builder, and what tests use to author blobs. It
//! round-trips through [`DeviceTree::from_fdt`] and [`DeviceTree::to_dtb`]
//! keeping node order, property order, memory reservations and the boot CPU
//! ID.

use alloc::vec::Vec;

use crate::error::FdtError;
use crate::fdt::Fdt;
use crate::{MemoryReservation, writer};

mod fixup;
mod node;
mod property;

pub use node::{DeviceTreeNode, DeviceTreeNodeBuilder};
pub use property::DeviceTreeProperty;

/// A mutable, in-memory representation of a device tree.
///
/// # Examples
///
/// ```
/// # use hwdtb_device_tree::model::{DeviceTree, DeviceTreeNode};
/// let mut tree = DeviceTree::new(DeviceTreeNode::new(""));
/// tree.root_mut().add_child(DeviceTreeNode::new("chosen"));
/// assert!(tree.find_node("/chosen").is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTree {
    root: DeviceTreeNode,
    /// The memory reservations for this device tree.
    pub memory_reservations: Vec<MemoryReservation>,
    /// The physical ID of the boot CPU, stored in the blob header.
    pub boot_cpuid_phys: u32,
}

impl DeviceTree {
    /// Creates a new `DeviceTree` with the given root node.
    ///
    /// The root node of a flattened tree is conventionally named `""`.
    #[must_use]
    pub fn new(root: DeviceTreeNode) -> Self {
        Self {
            root,
            memory_reservations: Vec::new(),
            boot_cpuid_phys: 0,
        }
    }

    /// Creates a new `DeviceTree` from a `Fdt`.
    ///
    /// # Errors
    ///
    /// Returns an error if any node or property of the `Fdt` cannot be
    /// parsed.
    pub fn from_fdt(fdt: &Fdt<'_>) -> Result<Self, FdtError> {
        let root = DeviceTreeNode::try_from(fdt.root()?)?;
        Ok(DeviceTree {
            root,
            memory_reservations: fdt.memory_reservations().collect(),
            boot_cpuid_phys: fdt.boot_cpuid_phys(),
        })
    }

    /// Serializes the `DeviceTree` to a flattened device tree blob.
    ///
    /// # Panics
    ///
    /// This may panic if any of the lengths written to the DTB (block sizes,
    /// property value length, etc.) exceed [`u32::MAX`].
    #[must_use]
    pub fn to_dtb(&self) -> Vec<u8> {
        writer::to_bytes(self)
    }

    /// Returns a reference to the root node of the device tree.
    #[must_use]
    pub fn root(&self) -> &DeviceTreeNode {
        &self.root
    }

    /// Returns a mutable reference to the root node of the device tree.
    pub fn root_mut(&mut self) -> &mut DeviceTreeNode {
        &mut self.root
    }

    /// Finds a node by its absolute path.
    #[must_use]
    pub fn find_node(&self, path: &str) -> Option<&DeviceTreeNode> {
        let components = path.strip_prefix('/')?;
        components
            .split('/')
            .filter(|s| !s.is_empty())
            .try_fold(&self.root, |node, component| node.child(component))
    }

    /// Finds a node by its absolute path and returns a mutable reference to
    /// it.
    pub fn find_node_mut(&mut self, path: &str) -> Option<&mut DeviceTreeNode> {
        let components = path.strip_prefix('/')?;
        components
            .split('/')
            .filter(|s| !s.is_empty())
            .try_fold(&mut self.root, |node, component| node.child_mut(component))
    }
}
