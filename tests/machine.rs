// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use hwdtb::device_tree::FlattenedDeviceTree;
use hwdtb::device_tree::model::{DeviceTree, DeviceTreeNode, DeviceTreeProperty};
use hwdtb::registry::from_fn;
use hwdtb::{
    Device, Error, HandlerRegistry, InitError, Keyspace, MachineNode, MachineTree, NodeState,
};

struct Uart {
    base: u64,
    irq_controller: String,
}

fn compatible(name: &str, strings: &[&str]) -> DeviceTreeNode {
    DeviceTreeNode::builder(name)
        .property(DeviceTreeProperty::strings("compatible", strings))
        .build()
}

/// A small arm board. The UART comes before the interrupt controller it
/// depends on.
fn board() -> DeviceTree {
    let mut memory = DeviceTreeNode::new("memory@0");
    memory.add_property(DeviceTreeProperty::strings("device_type", &["memory"]));
    memory.add_property(DeviceTreeProperty::cells("reg", &[0x0, 0x0, 0x0, 0x800_0000]));

    let mut uart = compatible("uart0", &["arm,pl011", "arm,primecell"]);
    uart.add_property(DeviceTreeProperty::cells("reg", &[0x0, 0x900_0000, 0x0, 0x1000]));
    uart.add_property(DeviceTreeProperty::cells("interrupt-parent", &[1]));

    let mut intc = compatible("intc@8000000", &["arm,cortex-a15-gic"]);
    intc.add_property(DeviceTreeProperty::cells("phandle", &[1]));

    DeviceTree::new(
        DeviceTreeNode::builder("")
            .property(DeviceTreeProperty::cells("#address-cells", &[2]))
            .property(DeviceTreeProperty::cells("#size-cells", &[2]))
            .child(memory)
            .child(
                DeviceTreeNode::builder("cpus")
                    .child(compatible("cpu@0", &["arm,cortex-a15"]))
                    .build(),
            )
            .child(uart)
            .child(intc)
            .build(),
    )
}

fn machine(tree: &DeviceTree) -> MachineTree {
    MachineTree::new(FlattenedDeviceTree::new(tree.to_dtb()).unwrap()).unwrap()
}

fn unit(_: &MachineNode<'_>) -> Result<Device, InitError> {
    Ok(Box::new(()))
}

fn pl011(node: &MachineNode<'_>) -> Result<Device, InitError> {
    let phandle = node
        .property("interrupt-parent")?
        .ok_or(InitError::Error)?
        .as_u32()?;
    let intc = node
        .tree()
        .find_by_phandle(phandle)
        .ok_or(InitError::Error)?;
    if !intc.is_initialized() {
        return Err(InitError::DependencyNotReady);
    }
    let reg = node.reg()?.ok_or(InitError::Error)?;
    Ok(Box::new(Uart {
        base: reg.address,
        irq_controller: intc.path(),
    }))
}

fn board_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register_device_type("memory", from_fn(unit), "ram");
    registry.register_node_name("cpus", from_fn(unit), "cpu-cluster");
    registry.register_compatible("arm,cortex-a15", from_fn(unit), "cortex-a15");
    registry.register_compatible("arm,cortex-a15-gic", from_fn(unit), "gic");
    registry.register_compatible("arm,pl011", from_fn(pl011), "pl011");
    registry
}

#[test]
fn board_comes_up() {
    let mut machine = machine(&board());
    assert_eq!(machine.resolve(&board_registry()), 5);

    let report = machine.initialize().unwrap();
    assert_eq!(report.passes, 2);
    assert_eq!(report.initialized, 6);
    assert_eq!(report.ignored, 0);
    assert_eq!(report.unresolved, 0);
    assert_eq!(report.unreached, 0);

    let uart = machine.find_by_path("/uart0").unwrap();
    assert_eq!(uart.handler_name(), Some("pl011"));
    assert_eq!(uart.keyspace(), Some(Keyspace::Compatible));
    let device = uart.device::<Uart>().unwrap();
    assert_eq!(device.base, 0x900_0000);
    assert_eq!(device.irq_controller, "/intc@8000000");
    assert!(uart.device::<u32>().is_none());

    let memory = machine.find_by_path("/memory@0").unwrap();
    assert_eq!(memory.keyspace(), Some(Keyspace::DeviceType));
}

#[test]
fn rerun_calls_no_handler() {
    let calls = Rc::new(Cell::new(0));
    let mut registry = board_registry();
    let counter = calls.clone();
    registry.register_compatible(
        "arm,cortex-a15",
        from_fn(move |_| {
            counter.set(counter.get() + 1);
            Ok(Box::new(()))
        }),
        "counting-cpu",
    );

    let mut machine = machine(&board());
    machine.resolve(&registry);
    machine.initialize().unwrap();
    assert_eq!(calls.get(), 1);

    assert_eq!(machine.resolve(&registry), 0);
    let report = machine.initialize().unwrap();
    assert_eq!(report.passes, 1);
    assert_eq!(calls.get(), 1);
}

#[test]
fn unknown_device_is_not_entered() {
    let mut tree = board();
    let mut bus = compatible("bus@a000000", &["totally,unknown"]);
    bus.add_child(compatible("uart@0", &["arm,pl011"]));
    tree.root_mut().add_child(bus);

    let mut machine = machine(&tree);
    machine.resolve(&board_registry());
    assert_eq!(
        machine.find_by_path("/bus@a000000/uart@0").unwrap().state(),
        NodeState::Resolved
    );

    let report = machine.initialize().unwrap();
    assert_eq!(report.unresolved, 1);
    assert_eq!(report.unreached, 1);
    assert_eq!(
        report.initialized + report.ignored + report.unresolved + report.unreached,
        machine.len()
    );
    assert_eq!(
        machine.find_by_path("/bus@a000000").unwrap().state(),
        NodeState::Unresolved
    );
    assert_eq!(
        machine.find_by_path("/bus@a000000/uart@0").unwrap().state(),
        NodeState::Resolved
    );
}

#[test]
fn unreadable_node_is_skipped() {
    let mut bad = DeviceTreeNode::new("bad");
    bad.add_property(DeviceTreeProperty::cells("bogus", &[0xdead_beef]));

    let mut uart = compatible("uart0", &["arm,pl011"]);
    uart.add_property(DeviceTreeProperty::cells("reg", &[0x0, 0x900_0000, 0x0, 0x1000]));
    uart.add_property(DeviceTreeProperty::cells("interrupt-parent", &[1]));

    let mut intc = compatible("intc@8000000", &["arm,cortex-a15-gic"]);
    intc.add_property(DeviceTreeProperty::cells("phandle", &[1]));

    let tree = DeviceTree::new(
        DeviceTreeNode::builder("")
            .property(DeviceTreeProperty::cells("#address-cells", &[2]))
            .property(DeviceTreeProperty::cells("#size-cells", &[2]))
            .child(bad)
            .child(uart)
            .child(intc)
            .build(),
    );

    // Point the name of `bogus` past the end of the strings block.
    let mut dtb = tree.to_dtb();
    let value = dtb
        .windows(4)
        .position(|bytes| bytes == 0xdead_beef_u32.to_be_bytes())
        .unwrap();
    dtb[value - 4..value].copy_from_slice(&0xffff_0000_u32.to_be_bytes());

    let mut machine = MachineTree::new(FlattenedDeviceTree::new(dtb).unwrap()).unwrap();
    assert_eq!(machine.resolve(&board_registry()), 2);
    assert_eq!(
        machine.find_by_path("/bad").unwrap().state(),
        NodeState::Unresolved
    );
    assert_eq!(
        machine.find_by_phandle(1).unwrap().path(),
        "/intc@8000000"
    );

    let report = machine.initialize().unwrap();
    assert_eq!(report.initialized, 3);
    assert_eq!(report.unresolved, 1);
    let uart = machine.find_by_path("/uart0").unwrap();
    assert_eq!(uart.device::<Uart>().unwrap().irq_controller, "/intc@8000000");
}

/// Builds a blob of `depth` nested nodes named `n` below the root, without
/// any property.
fn nested_dtb(depth: usize) -> Vec<u8> {
    const BEGIN_NODE: u32 = 1;
    const END_NODE: u32 = 2;
    const END: u32 = 9;

    let mut structure = Vec::new();
    structure.extend_from_slice(&BEGIN_NODE.to_be_bytes());
    structure.extend_from_slice(&[0; 4]);
    for _ in 0..depth {
        structure.extend_from_slice(&BEGIN_NODE.to_be_bytes());
        structure.extend_from_slice(b"n\0\0\0");
    }
    for _ in 0..=depth {
        structure.extend_from_slice(&END_NODE.to_be_bytes());
    }
    structure.extend_from_slice(&END.to_be_bytes());

    let off_dt_struct = 40 + 16;
    let off_dt_strings = off_dt_struct + structure.len();
    let header = [
        0xd00d_feed,
        off_dt_strings as u32,
        off_dt_struct as u32,
        off_dt_strings as u32,
        40,
        17,
        16,
        0,
        0,
        structure.len() as u32,
    ];
    let mut dtb: Vec<u8> = header.iter().flat_map(|word| word.to_be_bytes()).collect();
    dtb.extend_from_slice(&[0; 16]);
    dtb.extend_from_slice(&structure);
    dtb
}

#[test]
fn deep_nesting() {
    const DEPTH: usize = 10_000;

    let fdt = FlattenedDeviceTree::new(nested_dtb(DEPTH)).unwrap();
    let mut children = fdt.fdt().root().unwrap().children();
    assert_eq!(children.next().unwrap().unwrap().name().unwrap(), "n");
    assert!(children.next().is_none());
    drop(children);

    let mut machine = MachineTree::new(fdt).unwrap();
    assert_eq!(machine.len(), DEPTH + 1);

    let mut registry = HandlerRegistry::new();
    registry.register_node_name("n", from_fn(unit), "unit");
    assert_eq!(machine.resolve(&registry), DEPTH);

    let report = machine.initialize().unwrap();
    assert_eq!(report.passes, 1);
    assert_eq!(report.initialized, DEPTH + 1);
    assert_eq!(report.unreached, 0);
}

#[test]
fn declined_devices_are_ignored() {
    let mut tree = board();
    tree.root_mut().add_child(compatible("rtc@0", &["vendor,rtc"]));
    tree.root_mut().add_child(compatible("rtc@1", &["vendor,rtc"]));
    tree.root_mut().add_child(compatible("rtc@2", &["vendor,rtc"]));

    let mut registry = board_registry();
    registry.register_compatible(
        "vendor,rtc",
        from_fn(|node| match node.name() {
            "rtc@0" => Err(InitError::Error),
            "rtc@1" => Err(InitError::Unknown),
            _ => Err(InitError::NotPresent),
        }),
        "rtc",
    );

    let mut machine = machine(&tree);
    machine.resolve(&registry);
    let report = machine.initialize().unwrap();
    assert_eq!(report.ignored, 3);
    assert_eq!(report.initialized, 6);
    for name in ["/rtc@0", "/rtc@1", "/rtc@2"] {
        let node = machine.find_by_path(name).unwrap();
        assert_eq!(node.state(), NodeState::Ignored);
        assert_eq!(node.handler_name(), Some("rtc"));
    }
}

#[test]
fn waiting_forever_stalls() {
    let mut tree = board();
    tree.root_mut().add_child(compatible("timer", &["vendor,timer"]));

    let calls = Rc::new(Cell::new(0));
    let counter = calls.clone();
    let mut registry = board_registry();
    registry.register_compatible(
        "vendor,timer",
        from_fn(move |_| {
            counter.set(counter.get() + 1);
            Err(InitError::DependencyNotReady)
        }),
        "timer",
    );

    let mut machine = machine(&tree);
    machine.resolve(&registry);
    let error = machine.initialize().unwrap_err();
    assert_eq!(
        error,
        Error::Stalled {
            passes: 3,
            pending: vec!["/timer".to_string()],
        }
    );
    assert_eq!(calls.get(), 3);
    assert_eq!(
        machine.find_by_path("/timer").unwrap().state(),
        NodeState::Resolved
    );
    assert!(machine.find_by_path("/uart0").unwrap().is_initialized());
}

#[test]
fn parents_come_first() {
    let mut tree = board();
    let mut soc = compatible("soc", &["simple-bus"]);
    soc.add_child(compatible("gpio@0", &["vendor,gpio"]));
    tree.root_mut().add_child(soc);

    let order = Rc::new(RefCell::new(Vec::new()));
    let mut registry = board_registry();
    for key in ["simple-bus", "vendor,gpio"] {
        let order = order.clone();
        registry.register_compatible(
            key,
            from_fn(move |node| {
                order.borrow_mut().push(node.path());
                if let Some(parent) = node.parent() {
                    assert!(parent.is_initialized());
                }
                Ok(Box::new(()))
            }),
            key,
        );
    }

    let mut machine = machine(&tree);
    machine.resolve(&registry);
    machine.initialize().unwrap();
    assert_eq!(*order.borrow(), ["/soc", "/soc/gpio@0"]);
}

#[test]
fn resolution_precedence() {
    let tree = DeviceTree::new(
        DeviceTreeNode::builder("")
            .child(compatible("a", &["vendor,first", "vendor,second"]))
            .child(compatible("b", &["vendor,unknown", "vendor,second"]))
            .child(
                DeviceTreeNode::builder("c@100")
                    .property(DeviceTreeProperty::strings("compatible", &["vendor,unknown"]))
                    .property(DeviceTreeProperty::strings("device_type", &["serial"]))
                    .build(),
            )
            .child(DeviceTreeNode::new("serial@200"))
            .child(DeviceTreeNode::new("serial@300"))
            .child(DeviceTreeNode::new("nothing"))
            .build(),
    );

    let mut registry = HandlerRegistry::new();
    registry.register_compatible("vendor,first", from_fn(unit), "first");
    registry.register_compatible("vendor,second", from_fn(unit), "second");
    registry.register_device_type("serial", from_fn(unit), "by-type");
    registry.register_node_name("c@100", from_fn(unit), "by-name");
    registry.register_node_name("serial", from_fn(unit), "by-base-name");
    registry.register_node_name("serial@300", from_fn(unit), "by-full-name");

    let mut machine = machine(&tree);
    assert_eq!(machine.resolve(&registry), 5);

    let handler = |path: &str| machine.find_by_path(path).unwrap().handler_name();
    assert_eq!(handler("/a"), Some("first"));
    assert_eq!(handler("/b"), Some("second"));
    assert_eq!(handler("/c@100"), Some("by-type"));
    assert_eq!(handler("/serial@200"), Some("by-base-name"));
    assert_eq!(handler("/serial@300"), Some("by-full-name"));
    assert_eq!(handler("/nothing"), None);
    assert_eq!(
        machine.find_by_path("/serial@200").unwrap().keyspace(),
        Some(Keyspace::NodeName)
    );
}

#[test]
fn mirrors_the_blob() {
    let mut tree = board();
    tree.add_cpu("arm,cortex-a15");
    tree.add_memory_region(0x8000_0000, 0x1000).unwrap();
    let machine = machine(&tree);

    let fdt = machine.fdt();
    assert_eq!(machine.len(), fdt.node_count().unwrap());
    for (node, fdt_node) in machine.nodes().zip(fdt.nodes()) {
        let fdt_node = fdt_node.unwrap();
        assert_eq!(node.fdt_node().unwrap(), fdt_node);
        assert_eq!(node.name(), fdt_node.name().unwrap());
        assert_eq!(node.children().count(), fdt_node.children().count());
        for (child, fdt_child) in node.children().zip(fdt_node.children()) {
            assert_eq!(child.parent(), Some(node));
            assert_eq!(child.name(), fdt_child.unwrap().name().unwrap());
        }
    }

    let cpus: Vec<_> = machine
        .find_by_path("/cpus")
        .unwrap()
        .children()
        .map(|cpu| cpu.name())
        .collect();
    assert_eq!(cpus, ["cpu@0", "cpu@1"]);
}

#[test]
fn inherited_properties() {
    let mut tree = board();
    tree.root_mut()
        .add_property(DeviceTreeProperty::strings("model", &["linux,dummy-virt"]));
    let machine = machine(&tree);

    let uart = machine.find_by_path("/uart0").unwrap();
    assert!(uart.is_compatible("arm,primecell").unwrap());
    assert!(!uart.is_compatible("arm").unwrap());
    assert_eq!(
        uart.property_recursive("model").unwrap().unwrap().as_str(),
        Ok("linux,dummy-virt")
    );
    assert!(uart.property("model").unwrap().is_none());
    assert!(uart.property_recursive("missing").unwrap().is_none());
}

#[test]
fn dump_shows_state_and_handler() {
    let mut machine = machine(&board());
    machine.resolve(&board_registry());
    machine.initialize().unwrap();
    assert_eq!(
        machine.to_string(),
        "/ [initialized]\n\
         \x20 memory@0 [initialized] ram (device_type)\n\
         \x20 cpus [initialized] cpu-cluster (node name)\n\
         \x20   cpu@0 [initialized] cortex-a15 (compatible)\n\
         \x20 uart0 [initialized] pl011 (compatible)\n\
         \x20 intc@8000000 [initialized] gic (compatible)\n"
    );
}
