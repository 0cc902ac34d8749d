//! Page-handler bus: maps the 16-bit address space to 256 page handlers and
//! dispatches every CPU read/write to the owner of that 256-byte page.
//!
//! The MMU is special-cased by the machine layer: when present it registers
//! itself as the handler for every page and routes internally (spec §4.2,
//! §9 "MMU as single handler").

use crate::cpu::MemoryBus;

/// A component that owns a contiguous range of 256-byte pages.
pub trait PageHandler {
    fn read(&mut self, page: u8, offset: u8) -> u8;
    fn write(&mut self, page: u8, offset: u8, value: u8);
}

/// 256-entry dispatch table, one trait object per page.
pub struct Bus {
    handlers: Vec<Box<dyn PageHandler>>,
    /// handlers[owner[page]] is the handler owning `page`.
    owner: [usize; 256],
}

impl Bus {
    pub fn new() -> Self {
        Bus {
            handlers: Vec::new(),
            owner: [usize::MAX; 256],
        }
    }

    /// Claims pages `start..=end` for `handler`. Panics on overlap — a
    /// conflicting page-handler claim is a construction-time invariant
    /// violation (spec §7 BusConflict), not a recoverable runtime error.
    pub fn add_page_handler(&mut self, start: u8, end: u8, handler: Box<dyn PageHandler>) {
        let idx = self.handlers.len();
        let mut page = start as u16;
        loop {
            if self.owner[page as usize] != usize::MAX {
                panic!(
                    "page-handler bus conflict: page {:#04x} already claimed",
                    page
                );
            }
            self.owner[page as usize] = idx;
            if page as u8 == end {
                break;
            }
            page += 1;
        }
        self.handlers.push(handler);
    }

    #[inline]
    fn locate(&self, addr: u16) -> (usize, u8, u8) {
        let page = (addr >> 8) as u8;
        let offset = addr as u8;
        (self.owner[page as usize], page, offset)
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus for Bus {
    fn read(&mut self, addr: u16) -> u8 {
        let (idx, page, offset) = self.locate(addr);
        if idx == usize::MAX {
            // Unmapped page: floating-bus approximation (spec §7).
            return 0xFF;
        }
        self.handlers[idx].read(page, offset)
    }

    fn write(&mut self, addr: u16, value: u8) {
        let (idx, page, offset) = self.locate(addr);
        if idx == usize::MAX {
            return;
        }
        self.handlers[idx].write(page, offset, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub(Vec<u8>);
    impl PageHandler for Stub {
        fn read(&mut self, _page: u8, offset: u8) -> u8 {
            self.0[offset as usize]
        }
        fn write(&mut self, _page: u8, offset: u8, value: u8) {
            self.0[offset as usize] = value;
        }
    }

    #[test]
    fn dispatches_to_owning_handler() {
        let mut bus = Bus::new();
        bus.add_page_handler(0x00, 0x00, Box::new(Stub(vec![0; 256])));
        bus.add_page_handler(0x01, 0x01, Box::new(Stub(vec![0; 256])));
        bus.write(0x0010, 0xAB);
        bus.write(0x0110, 0xCD);
        assert_eq!(bus.read(0x0010), 0xAB);
        assert_eq!(bus.read(0x0110), 0xCD);
    }

    #[test]
    fn unmapped_page_reads_floating_bus() {
        let bus = Bus::new();
        let mut bus = bus;
        assert_eq!(bus.read(0x5000), 0xFF);
    }

    #[test]
    #[should_panic(expected = "bus conflict")]
    fn overlapping_claims_panic() {
        let mut bus = Bus::new();
        bus.add_page_handler(0x00, 0x01, Box::new(Stub(vec![0; 256])));
        bus.add_page_handler(0x01, 0x02, Box::new(Stub(vec![0; 256])));
    }
}
