// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use alloc::vec::Vec;

use log::{debug, error, info, warn};

use super::{MachineNode, MachineTree, NodeId, NodeState};
use crate::error::{Error, InitError};

/// The outcome of a successful [`MachineTree::initialize`].
///
/// Every node is counted exactly once, the root (always initialized)
/// included, so the four counts add up to [`MachineTree::len`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitReport {
    /// The number of passes run.
    pub passes: usize,
    /// Nodes whose handler produced a device.
    pub initialized: usize,
    /// Nodes whose handler declined or failed.
    pub ignored: usize,
    /// Nodes no handler matched.
    pub unresolved: usize,
    /// Nodes with a handler that was never called because an ancestor is
    /// not initialized.
    pub unreached: usize,
}

#[derive(Default)]
struct Pass {
    changed: usize,
    pending: Vec<NodeId>,
}

impl MachineTree {
    /// Calls the handler of every resolved node until no handler is waiting
    /// on a dependency any more.
    ///
    /// Each pass walks the tree depth first from the root and only descends
    /// into initialized nodes, so a device is never built before its parent.
    /// A handler returning [`InitError::DependencyNotReady`] is called again
    /// on the next pass. Every other outcome is final. Running this again on
    /// a tree where every node has settled calls no handler.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Stalled`] if a pass changes no node while some are
    /// still waiting.
    pub fn initialize(&mut self) -> Result<InitReport, Error> {
        let mut passes = 0;
        loop {
            passes += 1;
            let mut pass = Pass::default();
            self.run_pass(&mut pass);
            debug!(
                "pass {passes}: {} nodes changed, {} waiting",
                pass.changed,
                pass.pending.len()
            );

            if pass.pending.is_empty() {
                let report = InitReport {
                    passes,
                    initialized: self.count(NodeState::Initialized),
                    ignored: self.count(NodeState::Ignored),
                    unresolved: self.count(NodeState::Unresolved),
                    unreached: self.count(NodeState::Resolved),
                };
                info!(
                    "{} devices initialized in {passes} passes, {} ignored, {} without handler, {} unreached",
                    report.initialized, report.ignored, report.unresolved, report.unreached
                );
                return Ok(report);
            }
            if pass.changed == 0 {
                let pending = pass.pending.iter().map(|&id| self.path(id)).collect();
                error!("initialization stalled after {passes} passes");
                return Err(Error::Stalled { passes, pending });
            }
        }
    }

    /// Walks the tree depth first, following the arena links instead of
    /// recursing so that deep trees don't exhaust the stack.
    fn run_pass(&mut self, pass: &mut Pass) {
        let mut current = Some(NodeId::ROOT);
        while let Some(id) = current {
            if self.slot(id).state == NodeState::Resolved {
                self.init_node(id, pass);
            }
            let slot = self.slot(id);
            current = match slot.first_child {
                Some(child) if slot.state == NodeState::Initialized => Some(child),
                _ => self.next_in_walk(id),
            };
        }
    }

    /// Returns the node visited after `id` and its whole subtree.
    fn next_in_walk(&self, mut id: NodeId) -> Option<NodeId> {
        loop {
            let slot = self.slot(id);
            if let Some(sibling) = slot.next_sibling {
                return Some(sibling);
            }
            id = slot.parent?;
        }
    }

    fn init_node(&mut self, id: NodeId, pass: &mut Pass) {
        let Some((_, entry)) = self.slot(id).handler.clone() else {
            return;
        };
        let outcome = entry.handler().init(&MachineNode::new(self, id));

        let path = self.path(id);
        let handler = entry.name();
        let slot = &mut self.nodes[id.0];
        match outcome {
            Ok(device) => {
                info!("{path}: initialized by {handler}");
                slot.device = Some(device);
                slot.state = NodeState::Initialized;
            }
            Err(InitError::DependencyNotReady) => {
                debug!("{path}: {handler} is waiting on a dependency");
                pass.pending.push(id);
                return;
            }
            Err(e @ InitError::Error) => {
                error!("{path}: {handler}: {e}");
                slot.state = NodeState::Ignored;
            }
            Err(e @ InitError::Unknown) => {
                warn!("{path}: {handler}: {e}");
                slot.state = NodeState::Ignored;
            }
            Err(e @ InitError::NotPresent) => {
                info!("{path}: {handler}: {e}");
                slot.state = NodeState::Ignored;
            }
        }
        pass.changed += 1;
    }
}
