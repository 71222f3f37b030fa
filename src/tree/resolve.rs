// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use hwdtb_device_tree::FdtError;
use hwdtb_device_tree::fdt::FdtNode;
use log::{debug, trace, warn};

use super::{MachineTree, NodeState};
use crate::registry::{HandlerEntry, HandlerRegistry, Keyspace};

impl MachineTree {
    /// Attaches a handler from `registry` to every unresolved node but the
    /// root, and returns how many nodes were resolved.
    ///
    /// For each node the candidates are tried in this order, and the first
    /// one registered wins:
    ///
    /// 1. each string of `compatible`, left to right,
    /// 2. each string of `device_type`, left to right,
    /// 3. the node name, unit address included,
    /// 4. the node name without its unit address.
    ///
    /// Nodes without a match stay [`NodeState::Unresolved`]. So do nodes
    /// whose properties can't be decoded; they are logged and skipped
    /// without affecting the others. Every node is considered, whatever the
    /// outcome for its ancestors.
    pub fn resolve(&mut self, registry: &HandlerRegistry) -> usize {
        let fdt = self.fdt.fdt();
        let mut resolved = 0;

        for (index, slot) in self.nodes.iter_mut().enumerate().skip(1) {
            if slot.state != NodeState::Unresolved {
                continue;
            }
            let found = fdt
                .node_at(slot.offset, slot.depth)
                .and_then(|node| find_handler(registry, node, &slot.name));
            match found {
                Ok(Some((keyspace, key, entry))) => {
                    debug!(
                        "node {} ({index}): {keyspace} `{key}` matched {}",
                        slot.name,
                        entry.name()
                    );
                    slot.handler = Some((keyspace, entry.clone()));
                    slot.state = NodeState::Resolved;
                    resolved += 1;
                }
                Ok(None) => trace!("node {} ({index}): no handler", slot.name),
                Err(e) => warn!("node {} ({index}): left unresolved: {e}", slot.name),
            }
        }

        debug!(
            "resolved {resolved} nodes, {} left unresolved",
            self.count(NodeState::Unresolved)
        );
        resolved
    }
}

/// Looks up the handler for `node`, returning the keyspace and key it was
/// found under.
fn find_handler<'r, 'a>(
    registry: &'r HandlerRegistry,
    node: FdtNode<'a>,
    name: &'a str,
) -> Result<Option<(Keyspace, &'a str, &'r HandlerEntry)>, FdtError> {
    for (keyspace, property) in [
        (Keyspace::Compatible, "compatible"),
        (Keyspace::DeviceType, "device_type"),
    ] {
        if let Some(property) = node.property(property)? {
            for key in property.as_str_list() {
                if let Some(entry) = registry.lookup(keyspace, key) {
                    return Ok(Some((keyspace, key, entry)));
                }
            }
        }
    }

    let base_name = name.split_once('@').map_or(name, |(base, _)| base);
    for key in [name, base_name] {
        if let Some(entry) = registry.lookup(Keyspace::NodeName, key) {
            return Ok(Some((Keyspace::NodeName, key, entry)));
        }
    }
    Ok(None)
}
