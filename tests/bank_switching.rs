//! IIe auxiliary-memory and language-card bank switching, driven entirely
//! through the public soft-switch addresses a real program would hit.

use a2core::cpu::MemoryBus;
use a2core::io::AppleModel;
use a2core::mmu::Mmu;

#[test]
fn ramrd_ramwrt_route_independent_main_aux_banks() {
    let mut mmu = Mmu::new(AppleModel::AppleIIe);

    // Write with RAMWRT off (main), then turn RAMWRT on and write again;
    // the two banks must not alias each other.
    mmu.write(0x4000, 0x11);
    mmu.write(0xC005, 0x00); // RAMWRT on
    mmu.write(0x4000, 0x22);

    mmu.write(0xC004, 0x00); // RAMWRT off
    assert_eq!(mmu.read(0x4000), 0x11);

    mmu.write(0xC005, 0x00); // RAMWRT on again
    mmu.write(0xC003, 0x00); // RAMRD on, so the read side sees aux too
    assert_eq!(mmu.read(0x4000), 0x22);
}

#[test]
fn eighty_store_overrides_ramrd_ramwrt_for_text_page1() {
    let mut mmu = Mmu::new(AppleModel::AppleIIe);
    mmu.write(0xC001, 0x00); // 80STORE on ($C001)

    mmu.write(0xC054, 0x00); // PAGE2 off -> main text page
    mmu.write(0x0400, 0xAA);
    mmu.write(0xC055, 0x00); // PAGE2 on -> aux text page
    mmu.write(0x0400, 0xBB);

    mmu.write(0xC054, 0x00); // back to PAGE2 off
    assert_eq!(mmu.read(0x0400), 0xAA);
    mmu.write(0xC055, 0x00);
    assert_eq!(mmu.read(0x0400), 0xBB);
}

#[test]
fn language_card_bank2_read_write_enable_sequence() {
    let mut mmu = Mmu::new(AppleModel::AppleIIe);

    // $C08B read-then-read enables LC read+write with bank 2 selected
    // (the classic "read twice" prewrite latch).
    mmu.read(0xC08B);
    mmu.read(0xC08B);
    assert!(mmu.switches.lc_bank2);
    assert!(mmu.switches.lc_read_enable);
    assert!(mmu.switches.lc_write_enable);

    mmu.write(0xD000, 0x77);
    assert_eq!(mmu.lc_ram_bank2[0], 0x77);
    assert_eq!(mmu.read(0xD000), 0x77);
}

#[test]
fn language_card_switches_are_inert_on_plain_apple_ii() {
    let mut mmu = Mmu::new(AppleModel::AppleII);
    mmu.write(0xC005, 0x00);
    assert!(!mmu.switches.ramwrt);
}
