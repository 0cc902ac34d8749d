//! Soft-switch latch state and the handful of host-facing input setters
//! (keyboard, paddles, joystick buttons) that feed them.

use serde::{Deserialize, Serialize};

/// Which Apple II variant is running; gates which $C0xx soft switches exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppleModel {
    AppleII,
    AppleIIPlus,
    AppleIIe,
    AppleIIeEnhanced,
}

/// All soft-switch latch state. Plain fields rather than a bitflags vector
/// so each latch round-trips through `savestate::MmuState` without a
/// bit-packing/unpacking step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftSwitches {
    pub keyboard_strobe: u8,
    pub text_mode: bool,
    pub mixed_mode: bool,
    pub page2: bool,
    pub hires: bool,
    pub store_80: bool,
    pub col_80: bool,
    pub alt_char: bool,
    pub dhires: bool,
    pub ioudis: bool,
    pub lc_bank2: bool,
    pub lc_read_enable: bool,
    pub lc_write_enable: bool,
    pub lc_prewrite: bool,
    pub ramrd: bool,
    pub ramwrt: bool,
    pub altzp: bool,
    pub intcxrom: bool,
    pub slotc3rom: bool,
    pub speaker_click: bool,
    pub annunciator: [bool; 4],

    pub button0: bool,
    pub button1: bool,
    pub button2: bool,
    pub paddle0: u8,
    pub paddle1: u8,
    pub paddle2: u8,
    pub paddle3: u8,
    /// CPU cycle count at which the paddle RC timer was last triggered via $C070.
    pub paddle_trigger_cycle: u64,
}

impl Default for SoftSwitches {
    fn default() -> Self {
        SoftSwitches {
            keyboard_strobe: 0,
            text_mode: true,
            mixed_mode: false,
            page2: false,
            hires: false,
            store_80: false,
            col_80: false,
            alt_char: false,
            dhires: false,
            ioudis: true,
            lc_bank2: false,
            lc_read_enable: false,
            lc_write_enable: false,
            lc_prewrite: false,
            ramrd: false,
            ramwrt: false,
            altzp: false,
            intcxrom: false,
            slotc3rom: false,
            speaker_click: false,
            annunciator: [false; 4],

            button0: false,
            button1: false,
            button2: false,
            paddle0: 128,
            paddle1: 128,
            paddle2: 128,
            paddle3: 128,
            paddle_trigger_cycle: 0,
        }
    }
}

impl SoftSwitches {
    pub fn set_key(&mut self, key: u8) {
        self.keyboard_strobe = key | 0x80;
    }

    pub fn has_key_strobe(&self) -> bool {
        (self.keyboard_strobe & 0x80) != 0
    }

    pub fn set_button(&mut self, button: usize, pressed: bool) {
        match button {
            0 => self.button0 = pressed,
            1 => self.button1 = pressed,
            2 => self.button2 = pressed,
            _ => {}
        }
    }

    /// Paddle value 0-255, 128 is centered.
    pub fn set_paddle(&mut self, paddle: usize, value: u8) {
        match paddle {
            0 => self.paddle0 = value,
            1 => self.paddle1 = value,
            2 => self.paddle2 = value,
            3 => self.paddle3 = value,
            _ => {}
        }
    }

    /// Maps a normalized joystick axis (-1.0..=1.0) onto the 0-255 paddle range.
    pub fn set_joystick_axis(&mut self, axis: usize, value: f32) {
        let paddle_value = ((value + 1.0) * 127.5).clamp(0.0, 255.0) as u8;
        self.set_paddle(axis, paddle_value);
    }
}
