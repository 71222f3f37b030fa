// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A read-only API for parsing and traversing a [Flattened Device Tree (FDT)].
//!
//! This module provides the [`Fdt`] struct, which is the entry point for
//! parsing and traversing an FDT blob. The API performs no memory allocation
//! and provides a zero-copy view of the FDT data.
//!
//! Nodes are identified by the offset of their `FDT_BEGIN_NODE` token and
//! their depth below the root. All navigation is computed on demand by
//! scanning the structure block, so lookups run in linear time.
//!
//! [Flattened Device Tree (FDT)]: https://devicetree-specification.readthedocs.io/en/latest/chapter5-flattened-format.html

mod node;
mod property;

use core::ffi::CStr;

use zerocopy::byteorder::big_endian;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::error::{FdtError, FdtErrorKind};
use crate::memreserve::{FdtReserveEntry, MemoryReservation};
pub use node::{FdtNode, RegBlock, RegIter};
pub use property::{FdtProperty, FdtPropertyReader};

/// Version of the FDT specification supported by this library.
const FDT_VERSION: u32 = 17;
pub(crate) const FDT_TAGSIZE: usize = core::mem::size_of::<u32>();
pub(crate) const FDT_MAGIC: u32 = 0xd00d_feed;
pub(crate) const FDT_BEGIN_NODE: u32 = 0x1;
pub(crate) const FDT_END_NODE: u32 = 0x2;
pub(crate) const FDT_PROP: u32 = 0x3;
pub(crate) const FDT_NOP: u32 = 0x4;
pub(crate) const FDT_END: u32 = 0x9;

#[repr(C, packed)]
#[derive(Debug, Copy, Clone, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub(crate) struct FdtHeader {
    /// Magic number of the device tree.
    pub(crate) magic: big_endian::U32,
    /// Total size of the device tree.
    pub(crate) totalsize: big_endian::U32,
    /// Offset of the device tree structure.
    pub(crate) off_dt_struct: big_endian::U32,
    /// Offset of the device tree strings.
    pub(crate) off_dt_strings: big_endian::U32,
    /// Offset of the memory reservation map.
    pub(crate) off_mem_rsvmap: big_endian::U32,
    /// Version of the device tree.
    pub(crate) version: big_endian::U32,
    /// Last compatible version of the device tree.
    pub(crate) last_comp_version: big_endian::U32,
    /// Physical ID of the boot CPU.
    pub(crate) boot_cpuid_phys: big_endian::U32,
    /// Size of the device tree strings.
    pub(crate) size_dt_strings: big_endian::U32,
    /// Size of the device tree structure.
    pub(crate) size_dt_struct: big_endian::U32,
}

/// A token in the device tree structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FdtToken {
    BeginNode,
    EndNode,
    Prop,
    Nop,
    End,
}

impl TryFrom<u32> for FdtToken {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            FDT_BEGIN_NODE => Ok(FdtToken::BeginNode),
            FDT_END_NODE => Ok(FdtToken::EndNode),
            FDT_PROP => Ok(FdtToken::Prop),
            FDT_NOP => Ok(FdtToken::Nop),
            FDT_END => Ok(FdtToken::End),
            _ => Err(value),
        }
    }
}

/// A flattened device tree.
///
/// `Fdt` is a cheap, copyable view of a validated blob. Nodes and properties
/// borrow the blob, not the `Fdt` value, so a view may be created on demand
/// and dropped while the nodes read from it are still in use.
#[derive(Debug, Clone, Copy)]
pub struct Fdt<'a> {
    pub(crate) data: &'a [u8],
}

impl<'a> Fdt<'a> {
    /// Creates a new `Fdt` from the given byte slice.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice is shorter than the header, the magic
    /// number is wrong, the version is not supported or the `totalsize`
    /// header field doesn't match the slice length.
    pub fn new(data: &'a [u8]) -> Result<Self, FdtError> {
        if data.len() < core::mem::size_of::<FdtHeader>() {
            return Err(FdtError::new(FdtErrorKind::InvalidLength, 0));
        }

        let fdt = Fdt { data };
        let header = fdt.header();

        if header.magic.get() != FDT_MAGIC {
            return Err(FdtError::new(FdtErrorKind::InvalidMagic, 0));
        }
        if !(header.last_comp_version.get()..=header.version.get()).contains(&FDT_VERSION) {
            return Err(FdtError::new(
                FdtErrorKind::UnsupportedVersion(header.version.get()),
                20,
            ));
        }
        if header.totalsize.get() as usize != data.len() {
            return Err(FdtError::new(FdtErrorKind::InvalidLength, 4));
        }

        Ok(fdt)
    }

    /// Returns the header of the device tree.
    pub(crate) fn header(&self) -> &'a FdtHeader {
        let (header, _remaining_bytes) = FdtHeader::ref_from_prefix(self.data)
            .expect("new() checks if the slice is at least as big as the header");
        header
    }

    /// Returns the raw blob this view reads from.
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Returns the total size of the blob in bytes.
    #[must_use]
    pub fn total_size(&self) -> usize {
        self.data.len()
    }

    /// Returns the physical ID of the boot CPU recorded in the header.
    #[must_use]
    pub fn boot_cpuid_phys(&self) -> u32 {
        self.header().boot_cpuid_phys.get()
    }

    /// Returns the root node of the device tree.
    ///
    /// # Errors
    ///
    /// Returns an error if the structure block doesn't start with
    /// `FDT_BEGIN_NODE`.
    pub fn root(&self) -> Result<FdtNode<'a>, FdtError> {
        let offset = self.header().off_dt_struct.get() as usize;
        let token = self.read_token(offset)?;
        if token != FdtToken::BeginNode {
            return Err(FdtError::new(FdtErrorKind::BadToken(FDT_BEGIN_NODE), offset));
        }
        Ok(FdtNode {
            fdt: *self,
            offset,
            depth: 0,
        })
    }

    /// Returns the node whose `FDT_BEGIN_NODE` token is at `offset`.
    ///
    /// `offset` and `depth` are expected to come from
    /// [`FdtNode::offset`] and [`FdtNode::depth`] of a node of this same
    /// blob; only the token at `offset` is checked.
    ///
    /// # Errors
    ///
    /// Returns [`FdtErrorKind::BadToken`] if there is no node at `offset`.
    pub fn node_at(&self, offset: usize, depth: usize) -> Result<FdtNode<'a>, FdtError> {
        match self.read_token(offset)? {
            FdtToken::BeginNode => Ok(FdtNode {
                fdt: *self,
                offset,
                depth,
            }),
            _ => Err(FdtError::new(FdtErrorKind::BadToken(FDT_BEGIN_NODE), offset)),
        }
    }

    /// Finds a node by its absolute path.
    ///
    /// Each path component must match a child's full name exactly, unit
    /// address included. Returns `None` if the path is not absolute or a
    /// component is missing.
    ///
    /// # Performance
    ///
    /// This method traverses the device tree and its performance is linear in
    /// the number of nodes in the path.
    pub fn find_node(&self, path: &str) -> Option<Result<FdtNode<'a>, FdtError>> {
        if !path.starts_with('/') {
            return None;
        }
        let mut current_node = match self.root() {
            Ok(node) => node,
            Err(e) => return Some(Err(e)),
        };
        for component in path.split('/').filter(|s| !s.is_empty()) {
            match current_node.child(component) {
                Ok(Some(node)) => current_node = node,
                Ok(None) => return None,
                Err(e) => return Some(Err(e)),
            }
        }
        Some(Ok(current_node))
    }

    /// Returns an iterator over every node of the tree in document order,
    /// starting with the root.
    pub fn nodes(&self) -> impl Iterator<Item = Result<FdtNode<'a>, FdtError>> + use<'a> {
        let fdt = *self;
        let next = fdt.root().map(Some);
        FdtNodeWalk { fdt, next }
    }

    /// Counts the nodes of the tree, the root included.
    ///
    /// # Errors
    ///
    /// Returns an error if the structure block can't be traversed.
    pub fn node_count(&self) -> Result<usize, FdtError> {
        let mut count = 0;
        for node in self.nodes() {
            node?;
            count += 1;
        }
        Ok(count)
    }

    /// Returns an iterator over the entries of the memory reservation block.
    ///
    /// The iterator stops at the terminating all-zero entry or at the end of
    /// the blob, whichever comes first.
    pub fn memory_reservations(&self) -> impl Iterator<Item = MemoryReservation> + use<'a> {
        let data = self.data;
        let mut offset = self.header().off_mem_rsvmap.get() as usize;
        core::iter::from_fn(move || {
            let reservation = MemoryReservation::read_from(data.get(offset..)?)?;
            offset += core::mem::size_of::<FdtReserveEntry>();
            Some(reservation)
        })
    }

    pub(crate) fn read_u32(&self, offset: usize) -> Result<u32, FdtError> {
        self.data
            .get(offset..)
            .and_then(|bytes| big_endian::U32::ref_from_prefix(bytes).ok())
            .map(|(val, _)| val.get())
            .ok_or(FdtError::new(FdtErrorKind::InvalidLength, offset))
    }

    pub(crate) fn read_token(&self, offset: usize) -> Result<FdtToken, FdtError> {
        let val = self.read_u32(offset)?;
        FdtToken::try_from(val).map_err(|t| FdtError::new(FdtErrorKind::BadToken(t), offset))
    }

    /// Return a string from the string block.
    pub(crate) fn string(&self, string_block_offset: usize) -> Result<&'a str, FdtError> {
        let header = self.header();
        let strings_start = header.off_dt_strings.get() as usize;
        let strings_end = strings_start + header.size_dt_strings.get() as usize;
        let string_start = strings_start + string_block_offset;

        if string_start >= strings_end {
            return Err(FdtError::new(FdtErrorKind::InvalidLength, string_start));
        }

        self.string_at_offset(string_start, Some(strings_end))
    }

    /// Return a NUL-terminated string from a given offset.
    pub(crate) fn string_at_offset(
        &self,
        offset: usize,
        end: Option<usize>,
    ) -> Result<&'a str, FdtError> {
        let slice = match end {
            Some(end) => self.data.get(offset..end),
            None => self.data.get(offset..),
        };

        match slice.map(|slice| CStr::from_bytes_until_nul(slice).map(CStr::to_str)) {
            Some(Ok(Ok(val))) => Ok(val),
            _ => Err(FdtError::new(FdtErrorKind::InvalidString, offset)),
        }
    }

    pub(crate) fn find_string_end(&self, start: usize) -> Result<usize, FdtError> {
        let mut offset = start;
        loop {
            match self.data.get(offset) {
                Some(0) => return Ok(offset + 1),
                Some(_) => {}
                None => return Err(FdtError::new(FdtErrorKind::InvalidString, start)),
            }
            offset += 1;
        }
    }

    /// Returns the offset of the first token after a node's name.
    pub(crate) fn node_body_offset(&self, offset: usize) -> Result<usize, FdtError> {
        let offset = self.find_string_end(offset + FDT_TAGSIZE)?;
        Ok(Self::align_tag_offset(offset))
    }

    /// Returns the offset just past the `FDT_END_NODE` closing the node that
    /// starts at `offset`.
    pub(crate) fn next_sibling_offset(&self, offset: usize) -> Result<usize, FdtError> {
        let mut offset = self.node_body_offset(offset)?;
        // Number of nodes opened but not yet closed, the one at `offset`
        // included.
        let mut open = 1usize;

        loop {
            match self.read_token(offset)? {
                FdtToken::BeginNode => {
                    offset = self.node_body_offset(offset)?;
                    open += 1;
                }
                FdtToken::EndNode => {
                    offset += FDT_TAGSIZE;
                    open -= 1;
                    if open == 0 {
                        return Ok(offset);
                    }
                }
                FdtToken::Prop => offset = self.next_property_offset(offset + FDT_TAGSIZE)?,
                FdtToken::Nop => offset += FDT_TAGSIZE,
                FdtToken::End => {
                    return Err(FdtError::new(FdtErrorKind::BadToken(FDT_END), offset));
                }
            }
        }
    }

    /// Returns the node following the one at `offset` (of depth `depth`) in
    /// document order, with its depth.
    ///
    /// Returns `None` once the root node has been closed.
    pub(crate) fn next_node(
        &self,
        offset: usize,
        depth: usize,
    ) -> Result<Option<(usize, usize)>, FdtError> {
        let mut offset = self.node_body_offset(offset)?;
        // Number of nodes opened but not yet closed; the next node opened is
        // at exactly this depth.
        let mut open = depth + 1;

        loop {
            match self.read_token(offset)? {
                FdtToken::BeginNode => return Ok(Some((offset, open))),
                FdtToken::EndNode => {
                    offset += FDT_TAGSIZE;
                    open -= 1;
                    if open == 0 {
                        return Ok(None);
                    }
                }
                FdtToken::Prop => offset = self.next_property_offset(offset + FDT_TAGSIZE)?,
                FdtToken::Nop => offset += FDT_TAGSIZE,
                FdtToken::End => return Ok(None),
            }
        }
    }

    pub(crate) fn next_property_offset(&self, mut offset: usize) -> Result<usize, FdtError> {
        let len = self.read_u32(offset)? as usize;
        offset += FDT_TAGSIZE; // skip value length
        offset += FDT_TAGSIZE; // skip name offset
        offset += len; // skip property value

        Ok(Self::align_tag_offset(offset))
    }

    pub(crate) fn align_tag_offset(offset: usize) -> usize {
        offset.next_multiple_of(FDT_TAGSIZE)
    }
}

/// A pre-order walk over all nodes of a tree.
struct FdtNodeWalk<'a> {
    fdt: Fdt<'a>,
    next: Result<Option<FdtNode<'a>>, FdtError>,
}

impl<'a> Iterator for FdtNodeWalk<'a> {
    type Item = Result<FdtNode<'a>, FdtError>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = match core::mem::replace(&mut self.next, Ok(None)) {
            Ok(Some(node)) => node,
            Ok(None) => return None,
            Err(e) => return Some(Err(e)),
        };
        let fdt = self.fdt;
        self.next = fdt.next_node(node.offset, node.depth).map(|next| {
            next.map(|(offset, depth)| FdtNode { fdt, offset, depth })
        });
        Some(Ok(node))
    }
}
