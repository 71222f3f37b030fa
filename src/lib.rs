// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Builds an emulated machine from a flattened device tree.
//!
//! A board hands a device tree blob to [`MachineTree::new`], which mirrors
//! every node of the blob into an arena. [`MachineTree::resolve`] then
//! attaches to each node a [`DeviceHandler`] from a [`HandlerRegistry`],
//! looked up by the node's `compatible` strings, its `device_type` or its
//! name. Finally [`MachineTree::initialize`] runs the handlers top-down,
//! retrying those whose dependencies (an interrupt controller, a clock) were
//! not ready yet, until every device is up or no further progress is
//! possible.
//!
//! # Examples
//!
//! ```
//! use hwdtb::device_tree::FlattenedDeviceTree;
//! use hwdtb::device_tree::model::{DeviceTree, DeviceTreeNode, DeviceTreeProperty};
//! use hwdtb::registry::from_fn;
//! use hwdtb::{HandlerRegistry, InitError, MachineTree, NodeState};
//!
//! let dtb = DeviceTree::new(
//!     DeviceTreeNode::builder("")
//!         .child(
//!             DeviceTreeNode::builder("uart@9000000")
//!                 .property(DeviceTreeProperty::strings("compatible", &["arm,pl011"]))
//!                 .property(DeviceTreeProperty::cells("interrupt-parent", &[1]))
//!                 .build(),
//!         )
//!         .child(
//!             DeviceTreeNode::builder("intc@8000000")
//!                 .property(DeviceTreeProperty::strings("compatible", &["arm,gic-400"]))
//!                 .property(DeviceTreeProperty::cells("phandle", &[1]))
//!                 .build(),
//!         )
//!         .build(),
//! )
//! .to_dtb();
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register_compatible("arm,gic-400", from_fn(|_| Ok(Box::new(()))), "gic");
//! registry.register_compatible(
//!     "arm,pl011",
//!     from_fn(|node| {
//!         let phandle = node
//!             .property("interrupt-parent")?
//!             .ok_or(InitError::Error)?
//!             .as_u32()?;
//!         let intc = node.tree().find_by_phandle(phandle).ok_or(InitError::Error)?;
//!         if !intc.is_initialized() {
//!             return Err(InitError::DependencyNotReady);
//!         }
//!         Ok(Box::new(()))
//!     }),
//!     "pl011",
//! );
//!
//! let mut machine = MachineTree::new(FlattenedDeviceTree::new(dtb).unwrap()).unwrap();
//! machine.resolve(&registry);
//! let report = machine.initialize().unwrap();
//! assert_eq!(report.passes, 2);
//! assert_eq!(machine.count(NodeState::Initialized), 3);
//! ```

#![no_std]
#![warn(missing_docs)]

extern crate alloc;

pub mod clock;
mod error;
pub mod logger;
pub mod registry;
pub mod tree;

pub use error::{Error, InitError};
pub use hwdtb_device_tree as device_tree;
pub use registry::{Device, DeviceHandler, HandlerRegistry, Keyspace};
pub use tree::{InitReport, MachineNode, MachineTree, NodeId, NodeState};
