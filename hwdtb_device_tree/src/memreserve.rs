// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Device tree memory reservations.
//!
//! The reservation block is not part of the node hierarchy, but the fix-up
//! helpers re-serialize the whole blob and must carry it over unchanged.

use zerocopy::byteorder::big_endian;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// An entry of the reservation block as laid out in the blob.
#[repr(C, packed)]
#[derive(Debug, Copy, Clone, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub(crate) struct FdtReserveEntry {
    address: big_endian::U64,
    size: big_endian::U64,
}

#[cfg(feature = "write")]
impl FdtReserveEntry {
    /// The all-zero entry closing the block.
    pub(crate) const TERMINATOR: Self = Self {
        address: big_endian::U64::ZERO,
        size: big_endian::U64::ZERO,
    };
}

/// A reserved physical memory range, passed through to the guest untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryReservation {
    address: u64,
    size: u64,
}

impl MemoryReservation {
    /// Creates a new [`MemoryReservation`].
    #[must_use]
    pub fn new(address: u64, size: u64) -> Self {
        Self { address, size }
    }

    /// Returns the physical address of the reserved range.
    #[must_use]
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Returns the size of the reserved range in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Decodes the entry at the start of `bytes`. Returns `None` for the
    /// terminator or if `bytes` is too short.
    pub(crate) fn read_from(bytes: &[u8]) -> Option<Self> {
        let (entry, _) = FdtReserveEntry::ref_from_prefix(bytes).ok()?;
        let reservation = Self::new(entry.address.get(), entry.size.get());
        (reservation != Self::new(0, 0)).then_some(reservation)
    }

    #[cfg(feature = "write")]
    pub(crate) fn to_entry(self) -> FdtReserveEntry {
        FdtReserveEntry {
            address: self.address.into(),
            size: self.size.into(),
        }
    }
}
