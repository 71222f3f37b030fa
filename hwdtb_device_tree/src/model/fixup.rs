// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Board fix-ups applied to a tree before a machine is built from it.

use alloc::borrow::ToOwned;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use super::{DeviceTree, DeviceTreeNode, DeviceTreeProperty};
use crate::error::{FdtError, FdtErrorKind};
use crate::fdt::{FdtPropertyReader, RegBlock};

const DEFAULT_ADDRESS_CELLS: u32 = 2;
const DEFAULT_SIZE_CELLS: u32 = 1;

impl DeviceTree {
    /// Merges `[address, address + size)` into the `reg` property of the
    /// root's `memory` node.
    ///
    /// The resulting regions are sorted by address, and overlapping or
    /// abutting regions are coalesced into one. If the tree has no node named
    /// `memory` or `memory@...` under the root, a `memory@<address>` node is
    /// created. A zero `size` leaves the tree untouched.
    ///
    /// Regions are encoded with the root's `#address-cells` and
    /// `#size-cells`.
    ///
    /// # Errors
    ///
    /// Returns [`FdtErrorKind::BadStructure`] if the existing `reg` is
    /// malformed and [`FdtErrorKind::CellOverflow`] if a merged region can't
    /// be encoded in the available cells. The tree is left untouched on
    /// error.
    ///
    /// # Examples
    ///
    /// ```
    /// # use hwdtb_device_tree::model::{DeviceTree, DeviceTreeNode};
    /// let mut tree = DeviceTree::new(DeviceTreeNode::new(""));
    /// tree.add_memory_region(0x4000_0000, 0x1000_0000).unwrap();
    /// tree.add_memory_region(0x5000_0000, 0x1000_0000).unwrap();
    ///
    /// let memory = tree.find_node("/memory@40000000").unwrap();
    /// let reg = memory.property("reg").unwrap().value();
    /// // One region of 512 MiB, with two address cells and one size cell.
    /// assert_eq!(reg, [0, 0, 0, 0, 0x40, 0, 0, 0, 0x20, 0, 0, 0]);
    /// ```
    pub fn add_memory_region(&mut self, address: u64, size: u64) -> Result<(), FdtError> {
        if size == 0 {
            return Ok(());
        }
        let address_cells = self.root_cells("#address-cells", DEFAULT_ADDRESS_CELLS)?;
        let size_cells = self.root_cells("#size-cells", DEFAULT_SIZE_CELLS)?;

        let memory_name = self
            .root
            .children()
            .map(DeviceTreeNode::name)
            .find(|name| *name == "memory" || name.starts_with("memory@"))
            .map(ToOwned::to_owned);
        let current = memory_name
            .as_deref()
            .and_then(|name| self.root.child(name))
            .and_then(|memory| memory.property("reg"));

        let mut regions = match current {
            Some(reg) => decode_regions(reg.value(), address_cells, size_cells)?,
            None => Vec::new(),
        };
        regions.push(RegBlock { address, size });
        let regions = coalesce(regions);
        let reg = DeviceTreeProperty::new(
            "reg",
            encode_regions(&regions, address_cells, size_cells)?,
        );

        match memory_name.and_then(|name| self.root.child_mut(&name)) {
            Some(memory) => memory.add_property(reg),
            None => self.root.add_child(
                DeviceTreeNode::builder(format!("memory@{address:x}"))
                    .property(DeviceTreeProperty::strings("device_type", &["memory"]))
                    .property(reg)
                    .build(),
            ),
        }
        Ok(())
    }

    /// Appends a CPU node under `/cpus`, creating `/cpus` if needed, and
    /// returns the new node's name.
    ///
    /// The node is named `cpu@N`, where `N` is the number of nodes already
    /// under `/cpus` (bumped past any name already taken), and gets the given
    /// `compatible` and a `device_type` of `cpu`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use hwdtb_device_tree::model::{DeviceTree, DeviceTreeNode};
    /// let mut tree = DeviceTree::new(DeviceTreeNode::new(""));
    /// assert_eq!(tree.add_cpu("arm,cortex-a53"), "cpu@0");
    /// assert_eq!(tree.add_cpu("arm,cortex-a53"), "cpu@1");
    /// assert!(tree.find_node("/cpus/cpu@1").is_some());
    /// ```
    pub fn add_cpu(&mut self, compatible: &str) -> String {
        let cpus = self.root.child_or_insert("cpus");
        let mut index = cpus.child_count();
        let mut name = format!("cpu@{index}");
        while cpus.child(&name).is_some() {
            index += 1;
            name = format!("cpu@{index}");
        }
        cpus.add_child(
            DeviceTreeNode::builder(name.clone())
                .property(DeviceTreeProperty::strings("compatible", &[compatible]))
                .property(DeviceTreeProperty::strings("device_type", &["cpu"]))
                .build(),
        );
        name
    }

    fn root_cells(&self, name: &str, default: u32) -> Result<u32, FdtError> {
        let Some(property) = self.root.property(name) else {
            return Ok(default);
        };
        let cells = property
            .as_u32()
            .ok_or(FdtError::new(FdtErrorKind::InvalidLength, 0))?;
        if cells > 2 {
            return Err(FdtError::new(FdtErrorKind::UnsupportedCellCount(cells), 0));
        }
        Ok(cells)
    }
}

fn decode_regions(
    value: &[u8],
    address_cells: u32,
    size_cells: u32,
) -> Result<Vec<RegBlock>, FdtError> {
    if address_cells + size_cells == 0 && !value.is_empty() {
        return Err(FdtError::new(FdtErrorKind::BadStructure, 0));
    }
    let mut reader = FdtPropertyReader::new(value, 0);
    let mut regions = Vec::new();
    while !reader.is_empty() {
        let address = reader.read_cells(address_cells)?;
        let size = reader.read_cells(size_cells)?;
        regions.push(RegBlock { address, size });
    }
    Ok(regions)
}

fn end(region: &RegBlock) -> u64 {
    region.address.saturating_add(region.size)
}

/// Sorts regions by address and merges the ones that overlap or touch.
fn coalesce(mut regions: Vec<RegBlock>) -> Vec<RegBlock> {
    regions.sort_by_key(|region| region.address);
    let mut merged: Vec<RegBlock> = Vec::with_capacity(regions.len());
    for region in regions {
        match merged.last_mut() {
            Some(last) if region.address <= end(last) => {
                last.size = end(last).max(end(&region)) - last.address;
            }
            _ => merged.push(region),
        }
    }
    merged
}

fn encode_regions(
    regions: &[RegBlock],
    address_cells: u32,
    size_cells: u32,
) -> Result<Vec<u8>, FdtError> {
    let mut value = Vec::new();
    for region in regions {
        push_cells(&mut value, region.address, address_cells)?;
        push_cells(&mut value, region.size, size_cells)?;
    }
    Ok(value)
}

fn push_cells(value: &mut Vec<u8>, number: u64, cells: u32) -> Result<(), FdtError> {
    let at = value.len();
    let overflow = || FdtError::new(FdtErrorKind::CellOverflow(number), at);
    match cells {
        0 if number == 0 => {}
        1 => {
            let cell = u32::try_from(number).map_err(|_| overflow())?;
            value.extend_from_slice(&cell.to_be_bytes());
        }
        2 => value.extend_from_slice(&number.to_be_bytes()),
        _ => return Err(overflow()),
    }
    Ok(())
}
