// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

#![cfg(feature = "write")]

use hwdtb_device_tree::MemoryReservation;
use hwdtb_device_tree::fdt::Fdt;
use hwdtb_device_tree::model::{DeviceTree, DeviceTreeNode, DeviceTreeProperty};

fn sample() -> DeviceTree {
    let mut tree = DeviceTree::new(
        DeviceTreeNode::builder("")
            .property(DeviceTreeProperty::strings("compatible", &["linux,dummy-virt"]))
            .property(DeviceTreeProperty::cells("#address-cells", &[2]))
            .child(
                DeviceTreeNode::builder("pl061@9030000")
                    .property(DeviceTreeProperty::strings("compatible", &["arm,pl061"]))
                    .property(DeviceTreeProperty::cells("#gpio-cells", &[2]))
                    .build(),
            )
            .child(DeviceTreeNode::new("chosen"))
            .build(),
    );
    tree.memory_reservations = vec![
        MemoryReservation::new(0x1000, 0x100),
        MemoryReservation::new(0x2000, 0x200),
    ];
    tree.boot_cpuid_phys = 1;
    tree
}

#[test]
fn tree_creation() {
    let tree = sample();
    let root = tree.root();
    assert_eq!(root.name(), "");
    assert_eq!(root.properties().count(), 2);
    assert_eq!(root.child_count(), 2);

    let gpio = root.child("pl061@9030000").unwrap();
    assert_eq!(gpio.property("#gpio-cells").unwrap().as_u32(), Some(2));
    assert_eq!(
        gpio.property("compatible").unwrap().value(),
        b"arm,pl061\0"
    );
}

#[test]
fn tree_modification() {
    let mut tree = sample();

    let chosen = tree.find_node_mut("/chosen").unwrap();
    chosen.add_property(DeviceTreeProperty::strings("bootargs", &["quiet"]));
    chosen
        .property_mut("bootargs")
        .unwrap()
        .set_value("console=ttyAMA0\0");
    assert_eq!(
        tree.find_node("/chosen")
            .unwrap()
            .property("bootargs")
            .unwrap()
            .value(),
        b"console=ttyAMA0\0"
    );

    let chosen = tree.root_mut().child_mut("chosen").unwrap();
    assert!(chosen.remove_property("bootargs").is_some());
    assert_eq!(chosen.properties().count(), 0);

    assert!(tree.root_mut().remove_child("chosen").is_some());
    assert!(tree.find_node("/chosen").is_none());
    assert_eq!(tree.root().child_count(), 1);
}

#[test]
fn blob_round_trip_keeps_order_and_header() {
    let tree = sample();
    let dtb = tree.to_dtb();
    let fdt = Fdt::new(&dtb).unwrap();

    assert_eq!(fdt.boot_cpuid_phys(), 1);
    assert_eq!(
        fdt.memory_reservations().collect::<Vec<_>>(),
        tree.memory_reservations
    );
    let root = fdt.root().unwrap();
    let children: Vec<_> = root
        .children()
        .map(|child| child.unwrap().name().unwrap())
        .collect();
    assert_eq!(children, ["pl061@9030000", "chosen"]);

    let parsed = DeviceTree::from_fdt(&fdt).unwrap();
    assert_eq!(parsed, tree);
    assert_eq!(parsed.to_dtb(), dtb);
}
