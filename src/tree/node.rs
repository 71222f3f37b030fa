// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use alloc::string::String;
use core::any::Any;
use core::fmt;

use hwdtb_device_tree::FdtError;
use hwdtb_device_tree::fdt::{FdtNode, FdtProperty, RegBlock};

use super::{MachineTree, NodeId, NodeState};
use crate::registry::Keyspace;

/// A node of a [`MachineTree`].
///
/// This is a cheap, copyable view borrowing the tree. Properties are read
/// from the underlying blob on demand.
#[derive(Clone, Copy)]
pub struct MachineNode<'t> {
    tree: &'t MachineTree,
    id: NodeId,
}

impl fmt::Debug for MachineNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineNode")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}

impl PartialEq for MachineNode<'_> {
    fn eq(&self, other: &Self) -> bool {
        core::ptr::eq(self.tree, other.tree) && self.id == other.id
    }
}

impl Eq for MachineNode<'_> {}

impl<'t> MachineNode<'t> {
    pub(super) fn new(tree: &'t MachineTree, id: NodeId) -> Self {
        Self { tree, id }
    }

    /// Returns the ID of this node.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Returns the tree this node belongs to, to look other nodes up.
    #[must_use]
    pub fn tree(&self) -> &'t MachineTree {
        self.tree
    }

    /// Returns the full name of this node, unit address included. The root
    /// is named `""`.
    #[must_use]
    pub fn name(&self) -> &'t str {
        &self.tree.slot(self.id).name
    }

    /// Returns the absolute path of this node.
    #[must_use]
    pub fn path(&self) -> String {
        self.tree.path(self.id)
    }

    /// Returns the current state of this node.
    #[must_use]
    pub fn state(&self) -> NodeState {
        self.tree.slot(self.id).state
    }

    /// Returns whether this node's device has been built.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state() == NodeState::Initialized
    }

    /// Returns the parent of this node, or `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<MachineNode<'t>> {
        self.tree
            .slot(self.id)
            .parent
            .map(|id| MachineNode::new(self.tree, id))
    }

    /// Returns the direct children of this node, in blob order.
    #[must_use]
    pub fn children(&self) -> MachineNodeChildren<'t> {
        MachineNodeChildren {
            tree: self.tree,
            next: self.tree.slot(self.id).first_child,
        }
    }

    /// Returns the display name of the attached handler, if any.
    #[must_use]
    pub fn handler_name(&self) -> Option<&'t str> {
        self.tree
            .slot(self.id)
            .handler
            .as_ref()
            .map(|(_, entry)| entry.name())
    }

    /// Returns the keyspace the attached handler was found in, if any.
    #[must_use]
    pub fn keyspace(&self) -> Option<Keyspace> {
        self.tree
            .slot(self.id)
            .handler
            .as_ref()
            .map(|(keyspace, _)| *keyspace)
    }

    /// Returns the device built for this node, if it is initialized and the
    /// device is a `T`.
    #[must_use]
    pub fn device<T: Any>(&self) -> Option<&'t T> {
        self.tree
            .slot(self.id)
            .device
            .as_ref()
            .and_then(|device| device.downcast_ref())
    }

    /// Returns this node's coordinates in the blob.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob no longer has a node at the recorded
    /// offset.
    pub fn fdt_node(&self) -> Result<FdtNode<'t>, FdtError> {
        self.tree.fdt_node(self.id)
    }

    /// Returns a property of this node by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the node's properties can't be parsed.
    pub fn property(&self, name: &str) -> Result<Option<FdtProperty<'t>>, FdtError> {
        self.fdt_node()?.property(name)
    }

    /// Returns a property of this node or, failing that, of its closest
    /// ancestor that has it.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the properties on the way can't be parsed.
    pub fn property_recursive(&self, name: &str) -> Result<Option<FdtProperty<'t>>, FdtError> {
        let mut node = Some(*self);
        while let Some(current) = node {
            if let Some(property) = current.property(name)? {
                return Ok(Some(property));
            }
            node = current.parent();
        }
        Ok(None)
    }

    /// Returns the phandle of this node: `linux,phandle` if present,
    /// otherwise `phandle`.
    ///
    /// # Errors
    ///
    /// Returns an error if the node's properties can't be parsed or the
    /// phandle isn't a single cell.
    pub fn phandle(&self) -> Result<Option<u32>, FdtError> {
        let property = match self.property("linux,phandle")? {
            Some(property) => property,
            None => match self.property("phandle")? {
                Some(property) => property,
                None => return Ok(None),
            },
        };
        property.as_u32().map(Some)
    }

    /// Returns the first `(address, size)` entry of this node's `reg`.
    ///
    /// # Errors
    ///
    /// Returns an error if `reg` doesn't match the inherited cell layout.
    pub fn reg(&self) -> Result<Option<RegBlock>, FdtError> {
        self.fdt_node()?.reg()
    }

    /// Returns whether `compatible` lists `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the node's properties can't be parsed.
    pub fn is_compatible(&self, name: &str) -> Result<bool, FdtError> {
        self.fdt_node()?.is_compatible(name)
    }
}

/// An iterator over the children of a [`MachineNode`].
#[derive(Debug, Clone)]
pub struct MachineNodeChildren<'t> {
    tree: &'t MachineTree,
    next: Option<NodeId>,
}

impl<'t> Iterator for MachineNodeChildren<'t> {
    type Item = MachineNode<'t>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        self.next = self.tree.slot(id).next_sibling;
        Some(MachineNode::new(self.tree, id))
    }
}
