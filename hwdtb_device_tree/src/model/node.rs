// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use alloc::borrow::ToOwned;
use alloc::string::{String, ToString};

use indexmap::IndexMap;
use twox_hash::xxhash64;

use super::property::DeviceTreeProperty;
use crate::error::FdtError;
use crate::fdt::FdtNode;

const HASH_SEED: u64 = 0xdead_cafe;

type NameMap<V> = IndexMap<String, V, xxhash64::State>;

fn name_map<V>(capacity: usize) -> NameMap<V> {
    IndexMap::with_capacity_and_hasher(capacity, xxhash64::State::with_seed(HASH_SEED))
}

/// A mutable, in-memory representation of a device tree node.
///
/// Children and properties are stored in [`IndexMap`]s, which provide O(1)
/// lookups by name while preserving the order they appear in the blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTreeNode {
    name: String,
    properties: NameMap<DeviceTreeProperty>,
    children: NameMap<DeviceTreeNode>,
}

impl Default for DeviceTreeNode {
    fn default() -> Self {
        Self {
            name: String::new(),
            properties: name_map(0),
            children: name_map(0),
        }
    }
}

impl DeviceTreeNode {
    /// Creates a new, empty [`DeviceTreeNode`] with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Creates a new [`DeviceTreeNodeBuilder`] with the given name.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> DeviceTreeNodeBuilder {
        DeviceTreeNodeBuilder {
            node: DeviceTreeNode::new(name),
        }
    }

    /// Returns the name of this node.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns an iterator over the properties of this node.
    pub fn properties(&self) -> impl Iterator<Item = &DeviceTreeProperty> {
        self.properties.values()
    }

    /// Finds a property by its name.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&DeviceTreeProperty> {
        self.properties.get(name)
    }

    /// Finds a property by its name and returns a mutable reference to it.
    #[must_use]
    pub fn property_mut(&mut self, name: &str) -> Option<&mut DeviceTreeProperty> {
        self.properties.get_mut(name)
    }

    /// Adds a property to this node.
    ///
    /// A property with the same name is replaced in place.
    ///
    /// # Examples
    ///
    /// ```
    /// # use hwdtb_device_tree::model::{DeviceTreeNode, DeviceTreeProperty};
    /// let mut node = DeviceTreeNode::new("serial@0");
    /// node.add_property(DeviceTreeProperty::new("status", "disabled\0"));
    /// node.add_property(DeviceTreeProperty::new("status", "okay\0"));
    /// assert_eq!(node.properties().count(), 1);
    /// assert_eq!(node.property("status").unwrap().value(), b"okay\0");
    /// ```
    pub fn add_property(&mut self, property: DeviceTreeProperty) {
        self.properties.insert(property.name().to_owned(), property);
    }

    /// Removes a property from this node by its name.
    pub fn remove_property(&mut self, name: &str) -> Option<DeviceTreeProperty> {
        self.properties.shift_remove(name)
    }

    /// Returns an iterator over the children of this node.
    pub fn children(&self) -> impl Iterator<Item = &DeviceTreeNode> {
        self.children.values()
    }

    /// Returns the number of direct children of this node.
    #[must_use]
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Finds a child by its full name.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&DeviceTreeNode> {
        self.children.get(name)
    }

    /// Finds a child by its full name and returns a mutable reference to it.
    #[must_use]
    pub fn child_mut(&mut self, name: &str) -> Option<&mut DeviceTreeNode> {
        self.children.get_mut(name)
    }

    /// Returns the child with the given name, appending an empty one first if
    /// there is none.
    pub fn child_or_insert(&mut self, name: &str) -> &mut DeviceTreeNode {
        self.children
            .entry(name.to_owned())
            .or_insert_with(|| DeviceTreeNode::new(name))
    }

    /// Appends a child to this node, replacing any child with the same name.
    pub fn add_child(&mut self, child: DeviceTreeNode) {
        self.children.insert(child.name().to_owned(), child);
    }

    /// Removes a child from this node by its name.
    pub fn remove_child(&mut self, name: &str) -> Option<DeviceTreeNode> {
        self.children.shift_remove(name)
    }
}

impl<'a> TryFrom<FdtNode<'a>> for DeviceTreeNode {
    type Error = FdtError;

    fn try_from(node: FdtNode<'a>) -> Result<Self, Self::Error> {
        let mut properties = name_map(0);
        for property in node.properties() {
            let property = DeviceTreeProperty::from(property?);
            properties.insert(property.name().to_owned(), property);
        }

        let mut children = name_map(0);
        for child in node.children() {
            let child = DeviceTreeNode::try_from(child?)?;
            children.insert(child.name().to_owned(), child);
        }

        Ok(DeviceTreeNode {
            name: node.name()?.to_string(),
            properties,
            children,
        })
    }
}

/// A builder for creating [`DeviceTreeNode`]s.
#[derive(Debug, Default)]
pub struct DeviceTreeNodeBuilder {
    node: DeviceTreeNode,
}

impl DeviceTreeNodeBuilder {
    /// Adds a property to the node.
    #[must_use]
    pub fn property(mut self, property: DeviceTreeProperty) -> Self {
        self.node.add_property(property);
        self
    }

    /// Adds a child to the node.
    #[must_use]
    pub fn child(mut self, child: DeviceTreeNode) -> Self {
        self.node.add_child(child);
        self
    }

    /// Builds the `DeviceTreeNode`.
    #[must_use]
    pub fn build(self) -> DeviceTreeNode {
        self.node
    }
}
