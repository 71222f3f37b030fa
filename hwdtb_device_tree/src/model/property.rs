// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::fdt::FdtProperty;

/// A mutable, in-memory representation of a device tree property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTreeProperty {
    name: String,
    value: Vec<u8>,
}

impl DeviceTreeProperty {
    /// Creates a new `DeviceTreeProperty` with the given name and raw value.
    ///
    /// # Examples
    ///
    /// ```
    /// # use hwdtb_device_tree::model::DeviceTreeProperty;
    /// let prop = DeviceTreeProperty::new("status", "okay\0");
    /// assert_eq!(prop.name(), "status");
    /// assert_eq!(prop.value(), b"okay\0");
    /// ```
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Creates a property holding a list of big-endian 32-bit cells.
    ///
    /// # Examples
    ///
    /// ```
    /// # use hwdtb_device_tree::model::DeviceTreeProperty;
    /// let prop = DeviceTreeProperty::cells("interrupts", &[0, 33, 4]);
    /// assert_eq!(prop.value().len(), 12);
    /// assert_eq!(prop.value()[4..8], [0, 0, 0, 33]);
    /// ```
    #[must_use]
    pub fn cells(name: impl Into<String>, cells: &[u32]) -> Self {
        Self::new(
            name,
            cells
                .iter()
                .flat_map(|cell| cell.to_be_bytes())
                .collect::<Vec<u8>>(),
        )
    }

    /// Creates a property holding NUL-terminated strings, one after another.
    ///
    /// # Examples
    ///
    /// ```
    /// # use hwdtb_device_tree::model::DeviceTreeProperty;
    /// let prop = DeviceTreeProperty::strings("compatible", &["arm,pl011", "arm,primecell"]);
    /// assert_eq!(prop.value(), b"arm,pl011\0arm,primecell\0");
    /// ```
    #[must_use]
    pub fn strings(name: impl Into<String>, strings: &[&str]) -> Self {
        let mut value = Vec::new();
        for s in strings {
            value.extend_from_slice(s.as_bytes());
            value.push(0);
        }
        Self::new(name, value)
    }

    /// Returns the name of this property.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the value of this property.
    #[must_use]
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Sets the value of this property.
    pub fn set_value(&mut self, value: impl Into<Vec<u8>>) {
        self.value = value.into();
    }

    /// Returns the value of this property as a `u32`, or `None` if it isn't
    /// exactly one cell long.
    #[must_use]
    pub fn as_u32(&self) -> Option<u32> {
        self.value.as_slice().try_into().ok().map(u32::from_be_bytes)
    }
}

impl<'a> From<FdtProperty<'a>> for DeviceTreeProperty {
    fn from(prop: FdtProperty<'a>) -> Self {
        DeviceTreeProperty {
            name: prop.name().to_string(),
            value: prop.value().to_vec(),
        }
    }
}
