// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Device handlers and the tables they are registered in.
//!
//! Handlers are registered under an identity string in one of three
//! [`Keyspace`]s. Registration is expected to be complete before
//! [`MachineTree::resolve`](crate::MachineTree::resolve) borrows the
//! registry.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::string::String;
use core::any::Any;
use core::fmt;

use indexmap::IndexMap;
use log::{debug, warn};
use twox_hash::xxhash64;

use crate::error::InitError;
use crate::tree::MachineNode;

const HASH_SEED: u64 = 0xdead_cafe;

/// The object a handler builds for a node.
pub type Device = Box<dyn Any>;

/// Builds the device described by a node.
pub trait DeviceHandler {
    /// Initializes the device described by `node`.
    ///
    /// The handler may read any property of the node or of its ancestors and
    /// look other nodes up through [`MachineNode::tree`]. Before using
    /// another node's device it must check that the node
    /// [is initialized](MachineNode::is_initialized), and return
    /// [`InitError::DependencyNotReady`] if it isn't.
    ///
    /// # Errors
    ///
    /// Returns an [`InitError`] saying why no device was built.
    fn init(&self, node: &MachineNode<'_>) -> Result<Device, InitError>;
}

/// A [`DeviceHandler`] backed by a closure. See [`from_fn`].
#[derive(Clone, Copy)]
pub struct FnHandler<F> {
    f: F,
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

impl<F> DeviceHandler for FnHandler<F>
where
    F: Fn(&MachineNode<'_>) -> Result<Device, InitError>,
{
    fn init(&self, node: &MachineNode<'_>) -> Result<Device, InitError> {
        (self.f)(node)
    }
}

/// Wraps a closure into a [`DeviceHandler`].
pub fn from_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&MachineNode<'_>) -> Result<Device, InitError>,
{
    FnHandler { f }
}

/// The table a handler is registered in, in the order the resolver
/// consults them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyspace {
    /// Matched against each string of a node's `compatible` property.
    Compatible,
    /// Matched against each string of a node's `device_type` property.
    DeviceType,
    /// Matched against the node name, with and without its unit address.
    NodeName,
}

impl fmt::Display for Keyspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Keyspace::Compatible => "compatible",
            Keyspace::DeviceType => "device_type",
            Keyspace::NodeName => "node name",
        })
    }
}

/// A registered handler together with its display name.
#[derive(Clone)]
pub struct HandlerEntry {
    name: String,
    handler: Rc<dyn DeviceHandler>,
}

impl HandlerEntry {
    /// Returns the name the handler was registered with, used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the handler.
    #[must_use]
    pub fn handler(&self) -> &dyn DeviceHandler {
        &*self.handler
    }
}

impl fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

type Table = IndexMap<String, HandlerEntry, xxhash64::State>;

fn table() -> Table {
    IndexMap::with_hasher(xxhash64::State::with_seed(HASH_SEED))
}

/// Maps identity strings to device handlers, one table per [`Keyspace`].
#[derive(Debug)]
pub struct HandlerRegistry {
    compatible: Table,
    device_type: Table,
    node_name: Table,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            compatible: table(),
            device_type: table(),
            node_name: table(),
        }
    }

    fn table(&self, keyspace: Keyspace) -> &Table {
        match keyspace {
            Keyspace::Compatible => &self.compatible,
            Keyspace::DeviceType => &self.device_type,
            Keyspace::NodeName => &self.node_name,
        }
    }

    fn table_mut(&mut self, keyspace: Keyspace) -> &mut Table {
        match keyspace {
            Keyspace::Compatible => &mut self.compatible,
            Keyspace::DeviceType => &mut self.device_type,
            Keyspace::NodeName => &mut self.node_name,
        }
    }

    /// Registers `handler` under `key` in `keyspace`.
    ///
    /// A handler already registered under the same key in the same keyspace
    /// is replaced.
    pub fn register(
        &mut self,
        key: impl Into<String>,
        keyspace: Keyspace,
        handler: impl DeviceHandler + 'static,
        name: impl Into<String>,
    ) {
        let key = key.into();
        let entry = HandlerEntry {
            name: name.into(),
            handler: Rc::new(handler),
        };
        debug!("registering {} for {keyspace} `{key}`", entry.name);
        let new_name = entry.name.clone();
        if let Some(old) = self.table_mut(keyspace).insert(key.clone(), entry) {
            warn!(
                "{keyspace} `{key}`: handler {} replaced by {new_name}",
                old.name
            );
        }
    }

    /// Registers `handler` for nodes whose `compatible` contains `key`.
    pub fn register_compatible(
        &mut self,
        key: impl Into<String>,
        handler: impl DeviceHandler + 'static,
        name: impl Into<String>,
    ) {
        self.register(key, Keyspace::Compatible, handler, name);
    }

    /// Registers `handler` for nodes whose `device_type` contains `key`.
    pub fn register_device_type(
        &mut self,
        key: impl Into<String>,
        handler: impl DeviceHandler + 'static,
        name: impl Into<String>,
    ) {
        self.register(key, Keyspace::DeviceType, handler, name);
    }

    /// Registers `handler` for nodes named `key`, or named `key@...`.
    pub fn register_node_name(
        &mut self,
        key: impl Into<String>,
        handler: impl DeviceHandler + 'static,
        name: impl Into<String>,
    ) {
        self.register(key, Keyspace::NodeName, handler, name);
    }

    /// Looks `key` up in `keyspace`.
    #[must_use]
    pub fn lookup(&self, keyspace: Keyspace, key: &str) -> Option<&HandlerEntry> {
        self.table(keyspace).get(key)
    }

    /// Returns the number of handlers registered in `keyspace`.
    #[must_use]
    pub fn len(&self, keyspace: Keyspace) -> usize {
        self.table(keyspace).len()
    }

    /// Returns whether no handler is registered in any keyspace.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.compatible.is_empty() && self.device_type.is_empty() && self.node_name.is_empty()
    }
}
