// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The materialized machine tree.
//!
//! [`MachineTree`] owns the device tree blob and an arena holding one slot
//! per node of the blob. Slots are addressed by [`NodeId`] and linked to
//! their parent, first child and next sibling. The arena is laid out in
//! document order, so the root is always at index 0.

mod init;
mod lookup;
mod node;
mod resolve;

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use hwdtb_device_tree::FlattenedDeviceTree;
use hwdtb_device_tree::fdt::{Fdt, FdtNode};
use log::debug;

pub use init::InitReport;
pub use node::{MachineNode, MachineNodeChildren};

use crate::error::Error;
use crate::registry::{Device, HandlerEntry, Keyspace};

/// The index of a node in a [`MachineTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    /// The root node.
    pub const ROOT: NodeId = NodeId(0);

    /// Returns the position of the node in document order.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// The lifecycle state of a node.
///
/// A node only ever moves forward: `Unresolved` to `Resolved` to either
/// `Initialized` or `Ignored`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    /// No handler matched the node (or resolution has not run yet).
    Unresolved,
    /// A handler is attached but has not produced a device yet.
    Resolved,
    /// The handler produced a device. The root is always initialized.
    Initialized,
    /// The handler declined the node or failed.
    Ignored,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NodeState::Unresolved => "unresolved",
            NodeState::Resolved => "resolved",
            NodeState::Initialized => "initialized",
            NodeState::Ignored => "ignored",
        })
    }
}

struct Slot {
    offset: usize,
    depth: usize,
    name: String,
    parent: Option<NodeId>,
    first_child: Option<NodeId>,
    next_sibling: Option<NodeId>,
    state: NodeState,
    handler: Option<(Keyspace, HandlerEntry)>,
    device: Option<Device>,
}

/// A device tree mirrored into an arena of nodes carrying resolution and
/// initialization state.
pub struct MachineTree {
    fdt: FlattenedDeviceTree,
    nodes: Vec<Slot>,
}

impl fmt::Debug for MachineTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineTree")
            .field("nodes", &self.nodes.len())
            .finish_non_exhaustive()
    }
}

impl MachineTree {
    /// Mirrors every node of `fdt` into a new tree.
    ///
    /// The nodes are counted first so the arena is allocated once. Every
    /// node starts out `Unresolved`, except the root which is `Initialized`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fdt`] if the blob can't be traversed.
    pub fn new(fdt: FlattenedDeviceTree) -> Result<Self, Error> {
        let view = fdt.fdt();
        let count = view.node_count()?;
        let mut nodes = Vec::with_capacity(count);
        materialize(&mut nodes, view)?;
        debug_assert_eq!(nodes.len(), count);
        debug!("materialized {count} device tree nodes");

        nodes[NodeId::ROOT.0].state = NodeState::Initialized;
        Ok(Self { fdt, nodes })
    }

    /// Returns a read-only view of the underlying blob.
    #[must_use]
    pub fn fdt(&self) -> Fdt<'_> {
        self.fdt.fdt()
    }

    /// Returns the root node.
    #[must_use]
    pub fn root(&self) -> MachineNode<'_> {
        MachineNode::new(self, NodeId::ROOT)
    }

    /// Returns the node with the given ID, if it belongs to this tree.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<MachineNode<'_>> {
        (id.0 < self.nodes.len()).then(|| MachineNode::new(self, id))
    }

    /// Returns all nodes in document order.
    pub fn nodes(&self) -> impl Iterator<Item = MachineNode<'_>> {
        (0..self.nodes.len()).map(|index| MachineNode::new(self, NodeId(index)))
    }

    /// Returns the number of nodes, the root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns whether the tree has no nodes. A valid tree always has a root.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the number of nodes in `state`.
    #[must_use]
    pub fn count(&self, state: NodeState) -> usize {
        self.nodes.iter().filter(|slot| slot.state == state).count()
    }

    fn slot(&self, id: NodeId) -> &Slot {
        &self.nodes[id.0]
    }

    /// Returns the blob coordinates of a node.
    fn fdt_node(&self, id: NodeId) -> hwdtb_device_tree::Result<FdtNode<'_>> {
        let slot = self.slot(id);
        self.fdt.fdt().node_at(slot.offset, slot.depth)
    }

    /// Returns the absolute path of a node, for diagnostics.
    fn path(&self, id: NodeId) -> String {
        let mut components = Vec::new();
        let mut current = Some(id);
        while let Some(id) = current {
            let slot = self.slot(id);
            if slot.parent.is_some() {
                components.push(slot.name.as_str());
            }
            current = slot.parent;
        }
        if components.is_empty() {
            return String::from("/");
        }
        let mut path = String::new();
        for component in components.iter().rev() {
            path.push('/');
            path.push_str(component);
        }
        path
    }
}

/// Appends every node of `fdt` to `nodes` in document order and links each
/// one to its parent and siblings.
fn materialize(nodes: &mut Vec<Slot>, fdt: Fdt<'_>) -> Result<(), Error> {
    // The open ancestors of the current node, each with its last child so far.
    let mut ancestors: Vec<(NodeId, Option<NodeId>)> = Vec::new();
    for node in fdt.nodes() {
        let node = node?;
        let id = NodeId(nodes.len());
        ancestors.truncate(node.depth());

        nodes.push(Slot {
            offset: node.offset(),
            depth: node.depth(),
            name: String::from(node.name()?),
            parent: ancestors.last().map(|&(parent, _)| parent),
            first_child: None,
            next_sibling: None,
            state: NodeState::Unresolved,
            handler: None,
            device: None,
        });
        if let Some((parent, last_child)) = ancestors.last_mut() {
            match last_child.replace(id) {
                Some(previous) => nodes[previous.0].next_sibling = Some(id),
                None => nodes[parent.0].first_child = Some(id),
            }
        }
        ancestors.push((id, None));
    }
    Ok(())
}

impl fmt::Display for MachineTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in self.nodes() {
            let slot = self.slot(node.id());
            let name = if slot.parent.is_none() { "/" } else { slot.name.as_str() };
            write!(f, "{:indent$}{name} [{}]", "", slot.state, indent = slot.depth * 2)?;
            if let Some((keyspace, entry)) = &slot.handler {
                write!(f, " {} ({keyspace})", entry.name())?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
