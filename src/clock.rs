// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Clock rates referenced from `clocks` properties.

use core::fmt;

use hwdtb_device_tree::FdtError;

use crate::MachineTree;

/// An error looking a clock rate up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ClockError {
    /// No node has the phandle.
    NotFound(u32),
    /// The node is not a clock this crate knows how to read.
    Unsupported,
    /// `#clock-cells` is not 0.
    BadCells(u32),
    /// The clock has no `clock-frequency`.
    MissingFrequency,
    /// A property couldn't be decoded.
    Fdt(FdtError),
}

impl From<FdtError> for ClockError {
    fn from(e: FdtError) -> Self {
        Self::Fdt(e)
    }
}

impl fmt::Display for ClockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClockError::NotFound(phandle) => write!(f, "no clock with phandle {phandle}"),
            ClockError::Unsupported => write!(f, "unsupported clock type"),
            ClockError::BadCells(cells) => write!(f, "unexpected #clock-cells {cells}"),
            ClockError::MissingFrequency => write!(f, "clock has no frequency"),
            ClockError::Fdt(e) => write!(f, "{e}"),
        }
    }
}

impl core::error::Error for ClockError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            ClockError::Fdt(e) => Some(e),
            _ => None,
        }
    }
}

impl MachineTree {
    /// Returns the rate in Hz of the clock with the given phandle.
    ///
    /// Only `fixed-clock` nodes are supported. Their `clock-frequency` may be
    /// one or two cells wide.
    ///
    /// # Errors
    ///
    /// See [`ClockError`].
    pub fn clock_frequency(&self, phandle: u32) -> Result<u64, ClockError> {
        let node = self
            .find_by_phandle(phandle)
            .ok_or(ClockError::NotFound(phandle))?;
        if !node.is_compatible("fixed-clock")? {
            return Err(ClockError::Unsupported);
        }
        if let Some(cells) = node.property("#clock-cells")? {
            let cells = cells.as_u32()?;
            if cells != 0 {
                return Err(ClockError::BadCells(cells));
            }
        }

        let frequency = node
            .property("clock-frequency")?
            .ok_or(ClockError::MissingFrequency)?;
        if frequency.value().len() == 4 {
            Ok(frequency.as_u32()?.into())
        } else {
            Ok(frequency.as_u64()?)
        }
    }
}

#[cfg(test)]
mod tests {
    use hwdtb_device_tree::FlattenedDeviceTree;
    use hwdtb_device_tree::model::{DeviceTree, DeviceTreeNode, DeviceTreeProperty};

    use super::*;

    fn clock(name: &str, phandle: u32) -> DeviceTreeNode {
        DeviceTreeNode::builder(name)
            .property(DeviceTreeProperty::strings("compatible", &["fixed-clock"]))
            .property(DeviceTreeProperty::cells("phandle", &[phandle]))
            .build()
    }

    fn tree() -> MachineTree {
        let mut apb = clock("apb-pclk", 1);
        apb.add_property(DeviceTreeProperty::cells("#clock-cells", &[0]));
        apb.add_property(DeviceTreeProperty::cells("clock-frequency", &[24_000_000]));

        let mut fast = clock("fast", 2);
        fast.add_property(DeviceTreeProperty::cells("clock-frequency", &[0x1, 0x0]));

        let mut multi = clock("multi", 3);
        multi.add_property(DeviceTreeProperty::cells("#clock-cells", &[1]));

        let dtb = DeviceTree::new(
            DeviceTreeNode::builder("")
                .child(apb)
                .child(fast)
                .child(multi)
                .child(clock("silent", 4))
                .child(
                    DeviceTreeNode::builder("pll")
                        .property(DeviceTreeProperty::strings("compatible", &["vendor,pll"]))
                        .property(DeviceTreeProperty::cells("phandle", &[5]))
                        .build(),
                )
                .build(),
        )
        .to_dtb();
        MachineTree::new(FlattenedDeviceTree::new(dtb).unwrap()).unwrap()
    }

    #[test]
    fn fixed_clocks() {
        let tree = tree();
        assert_eq!(tree.clock_frequency(1), Ok(24_000_000));
        assert_eq!(tree.clock_frequency(2), Ok(0x1_0000_0000));
    }

    #[test]
    fn clock_errors() {
        let tree = tree();
        assert_eq!(tree.clock_frequency(3), Err(ClockError::BadCells(1)));
        assert_eq!(tree.clock_frequency(4), Err(ClockError::MissingFrequency));
        assert_eq!(tree.clock_frequency(5), Err(ClockError::Unsupported));
        assert_eq!(tree.clock_frequency(6), Err(ClockError::NotFound(6)));
    }
}
