//! Disk II tracing categories, layered over the `log` facade.
//!
//! Disk I/O happens every few CPU cycles while a drive spins, so logging
//! every access at `debug` would drown anything else. Instead each category
//! is gated behind a runtime bitmask the host can enable selectively
//! (`FLOW` for motor/track/sync events, `STATE` for stepper/drive-select
//! transitions, `NIBBLE` for raw nibble dumps) independent of the crate-wide
//! log level.

use std::sync::atomic::{AtomicU32, Ordering};

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct DiskLogLevel: u32 {
        /// What's happening, human-readable.
        const FLOW   = 0b0001;
        /// State transitions (stepper, drive select).
        const STATE  = 0b0010;
        /// Raw nibble dumps, enabled briefly when chasing a format bug.
        const NIBBLE = 0b0100;
    }
}

static LOG_LEVEL: AtomicU32 = AtomicU32::new(0);

pub fn set_log_level(level: DiskLogLevel) {
    LOG_LEVEL.store(level.bits(), Ordering::Relaxed);
}

pub fn get_log_level() -> DiskLogLevel {
    DiskLogLevel::from_bits_truncate(LOG_LEVEL.load(Ordering::Relaxed))
}

#[inline]
pub fn is_enabled(flag: DiskLogLevel) -> bool {
    (LOG_LEVEL.load(Ordering::Relaxed) & flag.bits()) != 0
}

/// Last N nibbles read, for dumping around a suspected desync.
#[derive(Clone)]
pub struct NibbleRing {
    buf: Vec<u8>,
    pos: usize,
    capacity: usize,
}

impl NibbleRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity],
            pos: 0,
            capacity,
        }
    }

    pub fn push(&mut self, nibble: u8) {
        self.buf[self.pos % self.capacity] = nibble;
        self.pos += 1;
    }

    pub fn last_n(&self, n: usize) -> Vec<u8> {
        let n = n.min(self.capacity).min(self.pos);
        let mut result = Vec::with_capacity(n);
        for i in 0..n {
            let idx = (self.pos - n + i) % self.capacity;
            result.push(self.buf[idx]);
        }
        result
    }

    pub fn dump(&self, n: usize) {
        if !is_enabled(DiskLogLevel::NIBBLE) {
            return;
        }
        log::debug!("last {} nibbles: {:02X?}", n, self.last_n(n));
    }
}

impl Default for NibbleRing {
    fn default() -> Self {
        Self::new(256)
    }
}

pub fn log_motor_on() {
    if is_enabled(DiskLogLevel::FLOW) {
        log::debug!("motor ON");
    }
}

pub fn log_motor_off() {
    if is_enabled(DiskLogLevel::FLOW) {
        log::debug!("motor OFF");
    }
}

pub fn log_track_change(from: u8, to: u8) {
    if is_enabled(DiskLogLevel::STATE) {
        log::debug!("track {} -> {}", from, to);
    }
}

pub fn log_sync_found(marker: &str, track: u8, pos: usize) {
    if is_enabled(DiskLogLevel::FLOW) {
        log::debug!("sync {} at T={} pos={}", marker, track, pos);
    }
}

pub fn log_sector_header(track: u8, sector: u8, volume: u8) {
    if is_enabled(DiskLogLevel::FLOW) {
        log::debug!("sector header: T={} S={} V={}", track, sector, volume);
    }
}

pub fn log_sector_read(track: u8, sector: u8) {
    if is_enabled(DiskLogLevel::FLOW) {
        log::debug!("sector read: T={} S={}", track, sector);
    }
}

pub fn log_boot_jump(addr: u16) {
    if is_enabled(DiskLogLevel::FLOW) {
        log::debug!("boot jump to ${:04X}", addr);
    }
}

pub fn log_drive_select(drive: usize) {
    if is_enabled(DiskLogLevel::STATE) {
        log::debug!("drive {} selected", drive + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nibble_ring_keeps_last_n() {
        let mut ring = NibbleRing::new(8);
        for i in 0..10 {
            ring.push(i as u8);
        }
        assert_eq!(ring.last_n(4), vec![6, 7, 8, 9]);
    }

    #[test]
    fn log_level_mask_is_independent_per_category() {
        set_log_level(DiskLogLevel::FLOW | DiskLogLevel::STATE);
        assert!(is_enabled(DiskLogLevel::FLOW));
        assert!(is_enabled(DiskLogLevel::STATE));
        assert!(!is_enabled(DiskLogLevel::NIBBLE));
    }
}
