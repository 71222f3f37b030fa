// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Serialization of a [`DeviceTree`] into a version 17 DTB.

use alloc::borrow::ToOwned;
use alloc::collections::btree_map::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use zerocopy::IntoBytes;

use crate::fdt::{FDT_BEGIN_NODE, FDT_END, FDT_END_NODE, FDT_MAGIC, FDT_PROP, Fdt, FdtHeader};
use crate::memreserve::FdtReserveEntry;
use crate::model::{DeviceTree, DeviceTreeNode, DeviceTreeProperty};

const LAST_VERSION: u32 = 17;
const LAST_COMP_VERSION: u32 = 16;

fn to_u32(value: usize, what: &str) -> u32 {
    u32::try_from(value).unwrap_or_else(|_| panic!("{what} exceeds u32"))
}

/// Builds the structure and strings blocks of a blob.
#[derive(Default)]
struct BlockWriter {
    structure: Vec<u8>,
    strings: Vec<u8>,
    string_offsets: BTreeMap<String, u32>,
}

impl BlockWriter {
    fn token(&mut self, token: u32) {
        self.structure.extend_from_slice(&token.to_be_bytes());
    }

    fn pad(&mut self) {
        let len = Fdt::align_tag_offset(self.structure.len());
        self.structure.resize(len, 0);
    }

    /// Returns the offset of `name` in the strings block, appending it the
    /// first time it is seen.
    fn string_offset(&mut self, name: &str) -> u32 {
        if let Some(&offset) = self.string_offsets.get(name) {
            return offset;
        }
        let offset = to_u32(self.strings.len(), "strings block");
        self.strings.extend_from_slice(name.as_bytes());
        self.strings.push(0);
        self.string_offsets.insert(name.to_owned(), offset);
        offset
    }

    fn node(&mut self, node: &DeviceTreeNode) {
        self.token(FDT_BEGIN_NODE);
        self.structure.extend_from_slice(node.name().as_bytes());
        self.structure.push(0);
        self.pad();

        for property in node.properties() {
            self.property(property);
        }
        for child in node.children() {
            self.node(child);
        }

        self.token(FDT_END_NODE);
    }

    fn property(&mut self, property: &DeviceTreeProperty) {
        let name_offset = self.string_offset(property.name());
        self.token(FDT_PROP);
        self.structure
            .extend_from_slice(&to_u32(property.value().len(), "property length").to_be_bytes());
        self.structure.extend_from_slice(&name_offset.to_be_bytes());
        self.structure.extend_from_slice(property.value());
        self.pad();
    }
}

pub(crate) fn to_bytes(tree: &DeviceTree) -> Vec<u8> {
    let mut reservations = Vec::new();
    for reservation in &tree.memory_reservations {
        reservations.extend_from_slice(reservation.to_entry().as_bytes());
    }
    reservations.extend_from_slice(FdtReserveEntry::TERMINATOR.as_bytes());

    let mut blocks = BlockWriter::default();
    blocks.node(tree.root());
    blocks.token(FDT_END);

    let off_mem_rsvmap = size_of::<FdtHeader>();
    let off_dt_struct = off_mem_rsvmap + reservations.len();
    let off_dt_strings = off_dt_struct + blocks.structure.len();
    let totalsize = off_dt_strings + blocks.strings.len();

    let header = FdtHeader {
        magic: FDT_MAGIC.into(),
        totalsize: to_u32(totalsize, "totalsize").into(),
        off_dt_struct: to_u32(off_dt_struct, "off_dt_struct").into(),
        off_dt_strings: to_u32(off_dt_strings, "off_dt_strings").into(),
        off_mem_rsvmap: to_u32(off_mem_rsvmap, "off_mem_rsvmap").into(),
        version: LAST_VERSION.into(),
        last_comp_version: LAST_COMP_VERSION.into(),
        boot_cpuid_phys: tree.boot_cpuid_phys.into(),
        size_dt_strings: to_u32(blocks.strings.len(), "size_dt_strings").into(),
        size_dt_struct: to_u32(blocks.structure.len(), "size_dt_struct").into(),
    };

    let mut dtb = Vec::with_capacity(totalsize);
    dtb.extend_from_slice(header.as_bytes());
    dtb.extend_from_slice(&reservations);
    dtb.extend_from_slice(&blocks.structure);
    dtb.extend_from_slice(&blocks.strings);
    dtb
}
