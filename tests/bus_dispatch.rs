//! Exercises `Machine`'s own `MemoryBus` impl: the slot-6/slot-5 address
//! ranges it special-cases before falling through to the MMU.

use a2core::cpu::MemoryBus;
use a2core::runloop::{Machine, MachineOptions};

#[test]
fn disk_io_window_reaches_the_disk_controller() {
    let mut machine = Machine::new(MachineOptions::default());
    machine.set_binary(1, "dos33", "dsk", &[0u8; 143360]);

    // $C0E9 is the motor-on strobe (offset 9 from $C0E0).
    machine.read(0xC0E9);
    assert!(machine.disk.motor_on);

    // $C0E8 is the motor-off strobe.
    machine.read(0xC0E8);
    assert!(!machine.disk.motor_on);
}

#[test]
fn smartport_io_window_is_inert_until_a_card_is_mounted() {
    let mut machine = Machine::new(MachineOptions::default());
    assert_eq!(machine.read(0xC0D0), 0x00);
    assert!(machine.smartport.is_none());

    machine.set_binary(2, "hd20", "po", &vec![0u8; 900 * 1024]);
    assert!(machine.smartport.is_some());
    // A STATUS call (command 0) on an empty parameter list shouldn't panic;
    // the card is now live and answering this window.
    let _ = machine.read(0xC0D0);
}

#[test]
fn everything_outside_the_special_ranges_falls_through_to_the_mmu() {
    let mut machine = Machine::new(MachineOptions::default());
    machine.write(0x0300, 0x42);
    assert_eq!(machine.read(0x0300), 0x42);
}

#[test]
fn rom_slot_windows_are_read_only_from_the_bus_perspective() {
    let mut machine = Machine::new(MachineOptions::default());
    // Writes into $C500-$C6FF are firmware ROM windows; the bus silently
    // swallows them rather than letting them fall through to RAM.
    machine.write(0xC600, 0xFF);
    machine.write(0xC500, 0xFF);
}
