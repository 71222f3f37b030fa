// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use hwdtb_device_tree::FdtError;
use log::warn;

use super::{MachineNode, MachineTree};

impl MachineTree {
    /// Returns the first node, in document order, whose
    /// [phandle](MachineNode::phandle) is `phandle`.
    ///
    /// Nodes whose phandle can't be decoded are logged and skipped.
    #[must_use]
    pub fn find_by_phandle(&self, phandle: u32) -> Option<MachineNode<'_>> {
        self.nodes().find(|node| match node.phandle() {
            Ok(found) => found == Some(phandle),
            Err(e) => {
                warn!("{}: skipping unreadable phandle: {e}", node.path());
                false
            }
        })
    }

    /// Returns the node at the absolute `path`, matching each component
    /// exactly against child names, unit address included.
    ///
    /// Empty components are skipped, so `"/"` is the root and `"/soc/"` is
    /// the same as `"/soc"`.
    #[must_use]
    pub fn find_by_path(&self, path: &str) -> Option<MachineNode<'_>> {
        path.strip_prefix('/')?
            .split('/')
            .filter(|component| !component.is_empty())
            .try_fold(self.root(), |node, component| {
                node.children().find(|child| child.name() == component)
            })
    }

    /// Returns the kernel command line from `/chosen/bootargs`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the property isn't a string.
    pub fn bootargs(&self) -> Result<Option<&str>, FdtError> {
        let Some(chosen) = self.find_by_path("/chosen") else {
            return Ok(None);
        };
        chosen
            .property("bootargs")?
            .map(|property| property.as_str())
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use hwdtb_device_tree::FlattenedDeviceTree;
    use hwdtb_device_tree::model::{DeviceTree, DeviceTreeNode, DeviceTreeProperty};

    use super::*;

    fn tree() -> MachineTree {
        let dtb = DeviceTree::new(
            DeviceTreeNode::builder("")
                .child(
                    DeviceTreeNode::builder("chosen")
                        .property(DeviceTreeProperty::strings("bootargs", &["console=ttyAMA0"]))
                        .build(),
                )
                .child(
                    DeviceTreeNode::builder("soc")
                        .child(
                            DeviceTreeNode::builder("intc@8000000")
                                .property(DeviceTreeProperty::cells("phandle", &[1]))
                                .build(),
                        )
                        .child(
                            DeviceTreeNode::builder("clk")
                                .property(DeviceTreeProperty::cells("linux,phandle", &[2]))
                                .property(DeviceTreeProperty::cells("phandle", &[9]))
                                .build(),
                        )
                        .build(),
                )
                .build(),
        )
        .to_dtb();
        MachineTree::new(FlattenedDeviceTree::new(dtb).unwrap()).unwrap()
    }

    #[test]
    fn phandles() {
        let tree = tree();
        assert_eq!(tree.find_by_phandle(1).unwrap().path(), "/soc/intc@8000000");
        assert_eq!(tree.find_by_phandle(2).unwrap().name(), "clk");
        assert!(tree.find_by_phandle(3).is_none());
    }

    #[test]
    fn linux_phandle_takes_precedence() {
        let tree = tree();
        let clk = tree.find_by_path("/soc/clk").unwrap();
        assert_eq!(clk.phandle(), Ok(Some(2)));
        assert!(tree.find_by_phandle(9).is_none());
    }

    #[test]
    fn paths() {
        let tree = tree();
        assert_eq!(tree.find_by_path("/"), Some(tree.root()));
        assert_eq!(
            tree.find_by_path("/soc/intc@8000000").unwrap().name(),
            "intc@8000000"
        );
        assert_eq!(tree.find_by_path("/soc/").unwrap().name(), "soc");
        assert!(tree.find_by_path("/soc/intc").is_none());
        assert!(tree.find_by_path("soc").is_none());
        assert!(tree.find_by_path("/chosen/bootargs").is_none());
    }

    #[test]
    fn chosen_bootargs() {
        assert_eq!(tree().bootargs().unwrap(), Some("console=ttyAMA0"));

        let dtb = DeviceTree::new(DeviceTreeNode::new("")).to_dtb();
        let empty = MachineTree::new(FlattenedDeviceTree::new(dtb).unwrap()).unwrap();
        assert_eq!(empty.bootargs().unwrap(), None);
    }
}
