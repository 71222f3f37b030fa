// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A read-only API for inspecting a device tree node.

use super::property::{FdtPropIter, FdtProperty, FdtPropertyReader};
use super::{FDT_TAGSIZE, Fdt, FdtToken};
use crate::error::{FdtError, FdtErrorKind};

/// `#address-cells` assumed when no node on the path to the root sets it.
const DEFAULT_ADDRESS_CELLS: u32 = 2;
/// `#size-cells` assumed when no node on the path to the root sets it.
const DEFAULT_SIZE_CELLS: u32 = 1;

/// A node in a flattened device tree.
///
/// A node is a coordinate into the blob: the offset of its `FDT_BEGIN_NODE`
/// token and its depth below the root (which has depth 0).
#[derive(Debug, Clone, Copy)]
pub struct FdtNode<'a> {
    pub(crate) fdt: Fdt<'a>,
    pub(crate) offset: usize,
    pub(crate) depth: usize,
}

impl PartialEq for FdtNode<'_> {
    fn eq(&self, other: &Self) -> bool {
        core::ptr::eq(self.fdt.data, other.fdt.data) && self.offset == other.offset
    }
}

impl Eq for FdtNode<'_> {}

/// One `(address, size)` entry of a `reg` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegBlock {
    /// The bus address of the region.
    pub address: u64,
    /// The size of the region; zero when `#size-cells` is 0.
    pub size: u64,
}

impl<'a> FdtNode<'a> {
    /// Returns the name of this node, including its unit address.
    ///
    /// The root node's name is the empty string.
    pub fn name(&self) -> Result<&'a str, FdtError> {
        let name_offset = self.offset + FDT_TAGSIZE;
        self.fdt.string_at_offset(name_offset, None)
    }

    /// Returns the offset of this node's `FDT_BEGIN_NODE` token in the blob.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Returns the depth of this node; the root node has depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Returns a property by its name.
    ///
    /// # Performance
    ///
    /// This method iterates through all properties of the node.
    pub fn property(&self, name: &str) -> crate::Result<Option<FdtProperty<'a>>> {
        for property in self.properties() {
            let property = property?;
            if property.name() == name {
                return Ok(Some(property));
            }
        }
        Ok(None)
    }

    /// Returns an iterator over the properties of this node.
    pub fn properties(&self) -> impl Iterator<Item = crate::Result<FdtProperty<'a>>> + use<'a> {
        FdtPropIter::Start {
            fdt: self.fdt,
            offset: self.offset,
        }
    }

    /// Looks up a property on this node, then on each ancestor in turn up to
    /// the root, and returns the first one found.
    pub fn property_recursive(&self, name: &str) -> crate::Result<Option<FdtProperty<'a>>> {
        let mut node = *self;
        loop {
            if let Some(property) = node.property(name)? {
                return Ok(Some(property));
            }
            match node.parent()? {
                Some(parent) => node = parent,
                None => return Ok(None),
            }
        }
    }

    /// Returns the parent of this node, or `None` for the root.
    ///
    /// # Performance
    ///
    /// The blob has no back links, so this walks the tree from the root and
    /// keeps the last node seen one level above this one.
    pub fn parent(&self) -> crate::Result<Option<FdtNode<'a>>> {
        if self.depth == 0 {
            return Ok(None);
        }
        let mut candidate = None;
        for node in self.fdt.nodes() {
            let node = node?;
            if node.offset == self.offset {
                return Ok(candidate);
            }
            if node.depth == self.depth - 1 {
                candidate = Some(node);
            }
        }
        Ok(None)
    }

    /// Returns the first child of this node.
    pub fn first_child(&self) -> crate::Result<Option<FdtNode<'a>>> {
        let offset = self.fdt.node_body_offset(self.offset)?;
        self.fdt.scan_for_node(offset, self.depth + 1)
    }

    /// Returns the sibling following this node, skipping over this node's
    /// whole subtree.
    pub fn next_sibling(&self) -> crate::Result<Option<FdtNode<'a>>> {
        if self.depth == 0 {
            return Ok(None);
        }
        let offset = self.fdt.next_sibling_offset(self.offset)?;
        self.fdt.scan_for_node(offset, self.depth)
    }

    /// Returns the child of this node following `prev`, which must itself be
    /// a child of this node.
    pub fn next_child(&self, prev: &FdtNode<'a>) -> crate::Result<Option<FdtNode<'a>>> {
        debug_assert_eq!(prev.depth, self.depth + 1);
        prev.next_sibling()
    }

    /// Returns a child node by its full name.
    ///
    /// # Performance
    ///
    /// This method's performance is linear in the number of children of this
    /// node because it iterates through the children.
    pub fn child(&self, name: &str) -> crate::Result<Option<FdtNode<'a>>> {
        for child in self.children() {
            let child = child?;
            if child.name()? == name {
                return Ok(Some(child));
            }
        }
        Ok(None)
    }

    /// Returns an iterator over the direct children of this node, in blob
    /// order.
    pub fn children(&self) -> impl Iterator<Item = crate::Result<FdtNode<'a>>> + use<'a> {
        FdtChildIter::Start { parent: *self }
    }

    /// Returns the number of cells encoding an address in this node's `reg`.
    ///
    /// The value comes from the closest `#address-cells` on the parent or
    /// its ancestors (the root reads its own), defaulting to 2.
    pub fn address_cells(&self) -> crate::Result<u32> {
        self.reg_cells("#address-cells", DEFAULT_ADDRESS_CELLS)
    }

    /// Returns the number of cells encoding a size in this node's `reg`.
    ///
    /// The value comes from the closest `#size-cells` on the parent or its
    /// ancestors (the root reads its own), defaulting to 1.
    pub fn size_cells(&self) -> crate::Result<u32> {
        self.reg_cells("#size-cells", DEFAULT_SIZE_CELLS)
    }

    fn reg_cells(&self, name: &str, default: u32) -> crate::Result<u32> {
        let start = self.parent()?.unwrap_or(*self);
        match start.property_recursive(name)? {
            Some(property) => property.as_u32(),
            None => Ok(default),
        }
    }

    /// Returns the first `(address, size)` entry of this node's `reg`
    /// property, or `None` if the node has no (or an empty) `reg`.
    ///
    /// # Errors
    ///
    /// Returns [`FdtErrorKind::BadStructure`] if `reg` is shorter than one
    /// entry and [`FdtErrorKind::UnsupportedCellCount`] if the inherited cell
    /// counts don't fit in 64 bits.
    pub fn reg(&self) -> crate::Result<Option<RegBlock>> {
        match self.reg_blocks()? {
            Some(mut blocks) => blocks.next().transpose(),
            None => Ok(None),
        }
    }

    /// Returns an iterator over every `(address, size)` entry of this node's
    /// `reg` property.
    pub fn reg_blocks(&self) -> crate::Result<Option<RegIter<'a>>> {
        let Some(reg) = self.property("reg")? else {
            return Ok(None);
        };
        let address_cells = self.address_cells()?;
        let size_cells = self.size_cells()?;
        for cells in [address_cells, size_cells] {
            if cells > 2 {
                return Err(FdtError::new(
                    FdtErrorKind::UnsupportedCellCount(cells),
                    reg.value_offset(),
                ));
            }
        }
        if address_cells + size_cells == 0 && !reg.value().is_empty() {
            return Err(FdtError::new(
                FdtErrorKind::BadStructure,
                reg.value_offset(),
            ));
        }
        Ok(Some(RegIter {
            reader: reg.reader(),
            address_cells,
            size_cells,
        }))
    }

    /// Returns whether `name` is one of the strings in this node's
    /// `compatible` property. Matching is exact.
    pub fn is_compatible(&self, name: &str) -> crate::Result<bool> {
        Ok(self
            .property("compatible")?
            .is_some_and(|compatible| compatible.as_str_list().any(|entry| entry == name)))
    }
}

impl<'a> Fdt<'a> {
    /// Skips properties and `FDT_NOP`s from `offset` until the next node at
    /// `depth` begins or the enclosing node ends.
    fn scan_for_node(&self, mut offset: usize, depth: usize) -> crate::Result<Option<FdtNode<'a>>> {
        loop {
            match self.read_token(offset)? {
                FdtToken::BeginNode => {
                    return Ok(Some(FdtNode {
                        fdt: *self,
                        offset,
                        depth,
                    }));
                }
                FdtToken::Prop => offset = self.next_property_offset(offset + FDT_TAGSIZE)?,
                FdtToken::Nop => offset += FDT_TAGSIZE,
                FdtToken::EndNode | FdtToken::End => return Ok(None),
            }
        }
    }
}

/// An iterator over the children of a device tree node.
enum FdtChildIter<'a> {
    Start { parent: FdtNode<'a> },
    Running { prev: FdtNode<'a> },
    Done,
}

impl<'a> Iterator for FdtChildIter<'a> {
    type Item = crate::Result<FdtNode<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = match self {
            Self::Start { parent } => parent.first_child(),
            Self::Running { prev } => prev.next_sibling(),
            Self::Done => return None,
        };
        match next {
            Ok(Some(node)) => {
                *self = Self::Running { prev: node };
                Some(Ok(node))
            }
            Ok(None) => {
                *self = Self::Done;
                None
            }
            Err(e) => {
                *self = Self::Done;
                Some(Err(e))
            }
        }
    }
}

/// An iterator over the entries of a `reg` property.
#[derive(Debug, Clone)]
pub struct RegIter<'a> {
    reader: FdtPropertyReader<'a>,
    address_cells: u32,
    size_cells: u32,
}

impl Iterator for RegIter<'_> {
    type Item = crate::Result<RegBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.reader.is_empty() {
            return None;
        }
        let block = self
            .reader
            .read_cells(self.address_cells)
            .and_then(|address| {
                let size = self.reader.read_cells(self.size_cells)?;
                Ok(RegBlock { address, size })
            });
        if block.is_err() {
            self.reader.exhaust();
        }
        Some(block)
    }
}
