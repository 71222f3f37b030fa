// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A library for reading and patching the Flattened Device Tree (FDT) blobs
//! that describe an emulated machine.
//!
//! The crate has three layers:
//!
//! - A read-only, zero-copy reader centered around [`Fdt`](fdt::Fdt) and
//!   [`FdtNode`](fdt::FdtNode). Nodes are plain `(offset, depth)`
//!   coordinates into the blob and every navigation step (parent, first
//!   child, next sibling) is computed by scanning the structure block.
//! - An owning [`FlattenedDeviceTree`] that keeps the blob alive for the
//!   lifetime of a machine and offers the two fix-up helpers board code needs
//!   before the tree is materialized: merging a memory region into `/memory`
//!   and appending a CPU under `/cpus`.
//! - A mutable in-memory [`DeviceTree`](model::DeviceTree) with a DTB writer,
//!   which the fix-up helpers are built on and which is handy for authoring
//!   blobs in tests.
//!
//! The library is `#![no_std]`. The reader needs neither `alloc` nor `std`;
//! the owning blob needs the `alloc` feature and the model, writer and fix-up
//! helpers need the `write` feature.
//!
//! # Examples
//!
//! ```
//! use hwdtb_device_tree::fdt::Fdt;
//! use hwdtb_device_tree::model::{DeviceTree, DeviceTreeNode, DeviceTreeProperty};
//!
//! let tree = DeviceTree::new(
//!     DeviceTreeNode::builder("")
//!         .property(DeviceTreeProperty::new("#address-cells", 1u32.to_be_bytes()))
//!         .property(DeviceTreeProperty::new("#size-cells", 1u32.to_be_bytes()))
//!         .child(
//!             DeviceTreeNode::builder("uart@9000000")
//!                 .property(DeviceTreeProperty::new("compatible", "arm,pl011\0arm,primecell\0"))
//!                 .property(DeviceTreeProperty::cells("reg", &[0x900_0000, 0x1000]))
//!                 .build(),
//!         )
//!         .build(),
//! );
//! let dtb = tree.to_dtb();
//!
//! let fdt = Fdt::new(&dtb).unwrap();
//! let uart = fdt.find_node("/uart@9000000").unwrap().unwrap();
//! assert!(uart.is_compatible("arm,primecell").unwrap());
//! let reg = uart.reg().unwrap().unwrap();
//! assert_eq!((reg.address, reg.size), (0x900_0000, 0x1000));
//! ```

#![no_std]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

#[cfg(feature = "alloc")]
extern crate alloc;

pub mod error;
pub mod fdt;
#[cfg(feature = "alloc")]
mod flattened;
pub mod memreserve;
#[cfg(feature = "write")]
#[cfg_attr(docsrs, doc(cfg(feature = "write")))]
pub mod model;
#[cfg(feature = "write")]
mod writer;

pub use error::{FdtError, FdtErrorKind};
#[cfg(feature = "alloc")]
#[cfg_attr(docsrs, doc(cfg(feature = "alloc")))]
pub use flattened::FlattenedDeviceTree;
pub use memreserve::MemoryReservation;

/// The result of a device tree read.
pub type Result<T> = core::result::Result<T, FdtError>;
