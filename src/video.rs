//! Text/LoRes/HiRes/DoubleHiRes rasterizer with NTSC artifact colors and
//! dirty-bitmap-gated redraws.

use crate::mmu::Mmu;

pub const SCREEN_WIDTH: usize = 560; // 280 * 2 for double width
pub const SCREEN_HEIGHT: usize = 384; // 192 * 2 for double height

/// NTSC artifact color palette.
pub const COLORS: [u32; 16] = [
    0x000000, // 0: Black
    0xDD0033, // 1: Magenta
    0x604EBD, // 2: Dark Blue
    0xFF44FD, // 3: Purple (NTSC artifact)
    0x00A360, // 4: Dark Green
    0x9C9C9C, // 5: Gray 1
    0x14CFFD, // 6: Medium Blue (NTSC artifact - cyan-ish)
    0xD0C3FF, // 7: Light Blue
    0x607203, // 8: Brown
    0xFF6A3C, // 9: Orange (NTSC artifact)
    0x9C9C9C, // 10: Gray 2
    0xFFA0D0, // 11: Pink
    0x14F53C, // 12: Light Green (NTSC artifact)
    0xD0DD8D, // 13: Yellow
    0x72FFD0, // 14: Aqua
    0xFFFFFF, // 15: White
];

pub const HIRES_GREEN: u32 = 0x33FF33;
#[allow(dead_code)]
pub const HIRES_BLACK: u32 = 0x000000;

#[derive(Debug, Clone, Copy, PartialEq)]
#[allow(dead_code)]
pub enum VideoMode {
    Text40,
    Text80,
    LoRes,
    HiRes,
    DoubleLoRes,
    DoubleHiRes,
}

/// Mode-relevant latch snapshot, compared frame-to-frame so a soft-switch
/// toggle (e.g. flipping to HIRES with no RAM write) still forces a redraw
/// even though no page went dirty.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct ModeSnapshot {
    text_mode: bool,
    mixed_mode: bool,
    page2: bool,
    hires: bool,
    col_80: bool,
    dhires: bool,
    store_80: bool,
    flash_state: bool,
}

pub struct Video {
    pub framebuffer: Vec<u32>,
    pub char_rom: [u8; 2048],
    pub monochrome: bool,
    pub mono_color: u32,
    pub flash_state: bool,
    pub flash_counter: u32,
    /// When set, `blit` also rasterizes text/lores page 1+2 and hires
    /// page 1+2 into `page_surfaces`, independent of which page the
    /// current soft switches select — a debugging aid (spec's `multiScreen`).
    multi_screen: bool,
    page_surfaces: [Vec<u32>; 4],
    last_mode: Option<ModeSnapshot>,
}

impl Default for Video {
    fn default() -> Self {
        Self::new()
    }
}

impl Video {
    pub fn new() -> Self {
        let mut video = Video {
            framebuffer: vec![0; SCREEN_WIDTH * SCREEN_HEIGHT],
            char_rom: [0; 2048],
            monochrome: false,
            mono_color: HIRES_GREEN,
            flash_state: false,
            flash_counter: 0,
            multi_screen: false,
            page_surfaces: std::array::from_fn(|_| vec![0; SCREEN_WIDTH * SCREEN_HEIGHT]),
            last_mode: None,
        };
        video.init_char_rom();
        video
    }

    /// Toggles the color/mono post-filter; forces a redraw on the next
    /// `blit` since the mode snapshot doesn't otherwise change.
    pub fn mono(&mut self, enabled: bool) {
        if self.monochrome != enabled {
            self.monochrome = enabled;
            self.last_mode = None;
        }
    }

    /// Toggles four-surface debug rendering (see `page_surfaces`). Callable
    /// every tick with the current annunciator-0 state; a no-op redraw-wise
    /// unless the value actually flips.
    pub fn multi_screen(&mut self, enabled: bool) {
        if self.multi_screen != enabled {
            self.multi_screen = enabled;
            self.last_mode = None;
        }
    }

    /// Text page 1, text page 2, hires page 1, hires page 2 — populated
    /// only while `multi_screen` is enabled.
    pub fn page_surfaces(&self) -> &[Vec<u32>; 4] {
        &self.page_surfaces
    }

    /// The current text screen as a plain string, one row per line, for
    /// clipboard copy. Apple II text bytes carry inverse/flash state in
    /// their top two bits; masking them off recovers plain ASCII for the
    /// normally-displayed case.
    pub fn get_text(&self, mmu: &Mmu) -> String {
        let cols = if mmu.switches.col_80 && mmu.is_iie() { 80 } else { 40 };
        let base = if mmu.switches.page2 { 0x0800 } else { 0x0400 };
        let mut out = String::with_capacity((cols + 1) * 24);
        for row in 0..24 {
            let row_addr = base + Self::text_row_offset(row);
            for col in 0..cols {
                let ch = if cols == 80 {
                    if (col & 1) == 0 {
                        mmu.aux_ram[(row_addr + col / 2) as usize]
                    } else {
                        mmu.main_ram[(row_addr + col / 2) as usize]
                    }
                } else {
                    mmu.main_ram[(row_addr + col) as usize]
                };
                out.push((ch & 0x7F) as char);
            }
            out.push('\n');
        }
        out
    }

    /// Loads an external character ROM dump (e.g. extracted from a IIe ROM set).
    #[allow(dead_code)]
    pub fn load_char_rom(&mut self, data: &[u8]) {
        if data.len() >= 2048 {
            self.char_rom.copy_from_slice(&data[..2048]);
            log::info!("loaded external character ROM");
        }
    }

    /// Attempts to extract a character ROM from a 32K IIe ROM image. Most
    /// 32K dumps don't actually carry one at $0000-$07FF (that range is
    /// usually the Disk II boot ROM instead), so this is best-effort and
    /// falls back to the built-in font.
    pub fn load_char_rom_from_iie_rom(&mut self, rom_data: &[u8]) {
        if rom_data.len() == 32768 {
            if rom_data[0] == 0xA2 && rom_data[1] == 0x20 {
                log::info!("$0000-$07FF holds the Disk II boot ROM, not a character ROM");
                return;
            }
            log::info!("using built-in character ROM for Apple IIe");
        }
    }

    /// Builds the built-in 96-character font (uppercase/symbols + IIe lowercase).
    fn init_char_rom(&mut self) {
        let font_upper: [[u8; 8]; 64] = [
            [0x1C, 0x22, 0x2A, 0x2E, 0x2C, 0x20, 0x1E, 0x00], // @
            [0x08, 0x14, 0x22, 0x22, 0x3E, 0x22, 0x22, 0x00], // A
            [0x3C, 0x22, 0x22, 0x3C, 0x22, 0x22, 0x3C, 0x00], // B
            [0x1C, 0x22, 0x20, 0x20, 0x20, 0x22, 0x1C, 0x00], // C
            [0x3C, 0x22, 0x22, 0x22, 0x22, 0x22, 0x3C, 0x00], // D
            [0x3E, 0x20, 0x20, 0x3C, 0x20, 0x20, 0x3E, 0x00], // E
            [0x3E, 0x20, 0x20, 0x3C, 0x20, 0x20, 0x20, 0x00], // F
            [0x1E, 0x20, 0x20, 0x2E, 0x22, 0x22, 0x1E, 0x00], // G
            [0x22, 0x22, 0x22, 0x3E, 0x22, 0x22, 0x22, 0x00], // H
            [0x1C, 0x08, 0x08, 0x08, 0x08, 0x08, 0x1C, 0x00], // I
            [0x02, 0x02, 0x02, 0x02, 0x02, 0x22, 0x1C, 0x00], // J
            [0x22, 0x24, 0x28, 0x30, 0x28, 0x24, 0x22, 0x00], // K
            [0x20, 0x20, 0x20, 0x20, 0x20, 0x20, 0x3E, 0x00], // L
            [0x22, 0x36, 0x2A, 0x2A, 0x22, 0x22, 0x22, 0x00], // M
            [0x22, 0x32, 0x2A, 0x26, 0x22, 0x22, 0x22, 0x00], // N
            [0x1C, 0x22, 0x22, 0x22, 0x22, 0x22, 0x1C, 0x00], // O
            [0x3C, 0x22, 0x22, 0x3C, 0x20, 0x20, 0x20, 0x00], // P
            [0x1C, 0x22, 0x22, 0x22, 0x2A, 0x24, 0x1A, 0x00], // Q
            [0x3C, 0x22, 0x22, 0x3C, 0x28, 0x24, 0x22, 0x00], // R
            [0x1C, 0x22, 0x20, 0x1C, 0x02, 0x22, 0x1C, 0x00], // S
            [0x3E, 0x08, 0x08, 0x08, 0x08, 0x08, 0x08, 0x00], // T
            [0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x1C, 0x00], // U
            [0x22, 0x22, 0x22, 0x22, 0x14, 0x14, 0x08, 0x00], // V
            [0x22, 0x22, 0x22, 0x2A, 0x2A, 0x36, 0x22, 0x00], // W
            [0x22, 0x22, 0x14, 0x08, 0x14, 0x22, 0x22, 0x00], // X
            [0x22, 0x22, 0x14, 0x08, 0x08, 0x08, 0x08, 0x00], // Y
            [0x3E, 0x02, 0x04, 0x08, 0x10, 0x20, 0x3E, 0x00], // Z
            [0x1E, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1E, 0x00], // [
            [0x00, 0x20, 0x10, 0x08, 0x04, 0x02, 0x00, 0x00], // backslash
            [0x1E, 0x02, 0x02, 0x02, 0x02, 0x02, 0x1E, 0x00], // ]
            [0x08, 0x14, 0x22, 0x00, 0x00, 0x00, 0x00, 0x00], // ^
            [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x3F, 0x00], // _
            [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00], // space
            [0x08, 0x08, 0x08, 0x08, 0x08, 0x00, 0x08, 0x00], // !
            [0x14, 0x14, 0x14, 0x00, 0x00, 0x00, 0x00, 0x00], // "
            [0x14, 0x14, 0x3E, 0x14, 0x3E, 0x14, 0x14, 0x00], // #
            [0x08, 0x1E, 0x28, 0x1C, 0x0A, 0x3C, 0x08, 0x00], // $
            [0x30, 0x32, 0x04, 0x08, 0x10, 0x26, 0x06, 0x00], // %
            [0x10, 0x28, 0x28, 0x10, 0x2A, 0x24, 0x1A, 0x00], // &
            [0x08, 0x08, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00], // '
            [0x04, 0x08, 0x10, 0x10, 0x10, 0x08, 0x04, 0x00], // (
            [0x10, 0x08, 0x04, 0x04, 0x04, 0x08, 0x10, 0x00], // )
            [0x00, 0x08, 0x2A, 0x1C, 0x2A, 0x08, 0x00, 0x00], // *
            [0x00, 0x08, 0x08, 0x3E, 0x08, 0x08, 0x00, 0x00], // +
            [0x00, 0x00, 0x00, 0x00, 0x00, 0x08, 0x08, 0x10], // ,
            [0x00, 0x00, 0x00, 0x3E, 0x00, 0x00, 0x00, 0x00], // -
            [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x08, 0x00], // .
            [0x00, 0x02, 0x04, 0x08, 0x10, 0x20, 0x00, 0x00], // /
            [0x1C, 0x22, 0x26, 0x2A, 0x32, 0x22, 0x1C, 0x00], // 0
            [0x08, 0x18, 0x08, 0x08, 0x08, 0x08, 0x1C, 0x00], // 1
            [0x1C, 0x22, 0x02, 0x0C, 0x10, 0x20, 0x3E, 0x00], // 2
            [0x1C, 0x22, 0x02, 0x0C, 0x02, 0x22, 0x1C, 0x00], // 3
            [0x04, 0x0C, 0x14, 0x24, 0x3E, 0x04, 0x04, 0x00], // 4
            [0x3E, 0x20, 0x3C, 0x02, 0x02, 0x22, 0x1C, 0x00], // 5
            [0x0E, 0x10, 0x20, 0x3C, 0x22, 0x22, 0x1C, 0x00], // 6
            [0x3E, 0x02, 0x04, 0x08, 0x10, 0x10, 0x10, 0x00], // 7
            [0x1C, 0x22, 0x22, 0x1C, 0x22, 0x22, 0x1C, 0x00], // 8
            [0x1C, 0x22, 0x22, 0x1E, 0x02, 0x04, 0x38, 0x00], // 9
            [0x00, 0x00, 0x08, 0x00, 0x00, 0x08, 0x00, 0x00], // :
            [0x00, 0x00, 0x08, 0x00, 0x00, 0x08, 0x08, 0x10], // ;
            [0x04, 0x08, 0x10, 0x20, 0x10, 0x08, 0x04, 0x00], // <
            [0x00, 0x00, 0x3E, 0x00, 0x3E, 0x00, 0x00, 0x00], // =
            [0x10, 0x08, 0x04, 0x02, 0x04, 0x08, 0x10, 0x00], // >
            [0x1C, 0x22, 0x02, 0x04, 0x08, 0x00, 0x08, 0x00], // ?
        ];

        let font_lower: [[u8; 8]; 32] = [
            [0x10, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00], // `
            [0x00, 0x00, 0x1C, 0x02, 0x1E, 0x22, 0x1E, 0x00], // a
            [0x20, 0x20, 0x3C, 0x22, 0x22, 0x22, 0x3C, 0x00], // b
            [0x00, 0x00, 0x1C, 0x20, 0x20, 0x20, 0x1C, 0x00], // c
            [0x02, 0x02, 0x1E, 0x22, 0x22, 0x22, 0x1E, 0x00], // d
            [0x00, 0x00, 0x1C, 0x22, 0x3E, 0x20, 0x1C, 0x00], // e
            [0x0C, 0x10, 0x10, 0x3C, 0x10, 0x10, 0x10, 0x00], // f
            [0x00, 0x00, 0x1E, 0x22, 0x22, 0x1E, 0x02, 0x1C], // g
            [0x20, 0x20, 0x3C, 0x22, 0x22, 0x22, 0x22, 0x00], // h
            [0x08, 0x00, 0x18, 0x08, 0x08, 0x08, 0x1C, 0x00], // i
            [0x04, 0x00, 0x04, 0x04, 0x04, 0x04, 0x24, 0x18], // j
            [0x20, 0x20, 0x24, 0x28, 0x30, 0x28, 0x24, 0x00], // k
            [0x18, 0x08, 0x08, 0x08, 0x08, 0x08, 0x1C, 0x00], // l
            [0x00, 0x00, 0x36, 0x2A, 0x2A, 0x2A, 0x22, 0x00], // m
            [0x00, 0x00, 0x3C, 0x22, 0x22, 0x22, 0x22, 0x00], // n
            [0x00, 0x00, 0x1C, 0x22, 0x22, 0x22, 0x1C, 0x00], // o
            [0x00, 0x00, 0x3C, 0x22, 0x22, 0x3C, 0x20, 0x20], // p
            [0x00, 0x00, 0x1E, 0x22, 0x22, 0x1E, 0x02, 0x02], // q
            [0x00, 0x00, 0x2C, 0x32, 0x20, 0x20, 0x20, 0x00], // r
            [0x00, 0x00, 0x1E, 0x20, 0x1C, 0x02, 0x3C, 0x00], // s
            [0x10, 0x10, 0x3C, 0x10, 0x10, 0x10, 0x0C, 0x00], // t
            [0x00, 0x00, 0x22, 0x22, 0x22, 0x22, 0x1E, 0x00], // u
            [0x00, 0x00, 0x22, 0x22, 0x22, 0x14, 0x08, 0x00], // v
            [0x00, 0x00, 0x22, 0x2A, 0x2A, 0x2A, 0x14, 0x00], // w
            [0x00, 0x00, 0x22, 0x14, 0x08, 0x14, 0x22, 0x00], // x
            [0x00, 0x00, 0x22, 0x22, 0x22, 0x1E, 0x02, 0x1C], // y
            [0x00, 0x00, 0x3E, 0x04, 0x08, 0x10, 0x3E, 0x00], // z
            [0x04, 0x08, 0x08, 0x10, 0x08, 0x08, 0x04, 0x00], // {
            [0x08, 0x08, 0x08, 0x08, 0x08, 0x08, 0x08, 0x00], // |
            [0x10, 0x08, 0x08, 0x04, 0x08, 0x08, 0x10, 0x00], // }
            [0x00, 0x00, 0x10, 0x2A, 0x04, 0x00, 0x00, 0x00], // ~
            [0x3E, 0x3E, 0x3E, 0x3E, 0x3E, 0x3E, 0x3E, 0x00], // block
        ];

        for (idx, char_data) in font_upper.iter().enumerate() {
            for (row, &byte) in char_data.iter().enumerate() {
                self.char_rom[idx * 8 + row] = byte;
            }
        }
        for (idx, char_data) in font_lower.iter().enumerate() {
            for (row, &byte) in char_data.iter().enumerate() {
                self.char_rom[(idx + 64) * 8 + row] = byte;
            }
        }
    }

    /// Re-rasterizes the framebuffer if either a video-relevant page was
    /// written since the last call or a mode latch changed; returns whether
    /// a redraw happened.
    pub fn blit(&mut self, mmu: &mut Mmu) -> bool {
        let dirty_pages = mmu.take_dirty_pages();
        let s = &mmu.switches;
        let snapshot = ModeSnapshot {
            text_mode: s.text_mode,
            mixed_mode: s.mixed_mode,
            page2: s.page2,
            hires: s.hires,
            col_80: s.col_80,
            dhires: s.dhires,
            store_80: s.store_80,
            flash_state: self.flash_state,
        };
        let mode_changed = self.last_mode != Some(snapshot);
        let source_pages = Self::relevant_pages(&snapshot);
        let ram_dirty = source_pages.iter().any(|&p| dirty_pages[p as usize]);

        if !mode_changed && !ram_dirty {
            return false;
        }

        self.last_mode = Some(snapshot);
        self.render(mmu);
        if self.multi_screen {
            self.render_page_surfaces(mmu);
        }
        true
    }

    /// Renders text/lores page 1+2 and hires page 1+2 into `page_surfaces`,
    /// borrowing the main rasterizers by temporarily flipping PAGE2 and
    /// swapping in a scratch framebuffer.
    fn render_page_surfaces(&mut self, mmu: &mut Mmu) {
        let saved_page2 = mmu.switches.page2;
        let mut scratch = vec![0u32; SCREEN_WIDTH * SCREEN_HEIGHT];

        let slots = [(false, false), (true, false), (false, true), (true, true)];
        for (i, &(page2, hires)) in slots.iter().enumerate() {
            mmu.switches.page2 = page2;
            std::mem::swap(&mut self.framebuffer, &mut scratch);
            for pixel in self.framebuffer.iter_mut() {
                *pixel = 0x000000;
            }
            if hires {
                self.render_hires(mmu);
            } else if mmu.switches.text_mode {
                self.render_text(mmu);
            } else {
                self.render_lores(mmu);
            }
            std::mem::swap(&mut self.framebuffer, &mut scratch);
            self.page_surfaces[i].copy_from_slice(&scratch);
        }

        mmu.switches.page2 = saved_page2;
    }

    /// Pages a given mode reads from, used to gate redraws on dirty writes.
    fn relevant_pages(mode: &ModeSnapshot) -> Vec<u8> {
        let text_base = if mode.page2 { 0x08 } else { 0x04 };
        let mut pages: Vec<u8> = (text_base..text_base + 4).collect();
        if !mode.text_mode {
            if mode.hires {
                let base = if mode.page2 && !(mode.col_80 && mode.store_80) {
                    0x40
                } else {
                    0x20
                };
                pages.extend(base..base + 0x20);
                if mode.dhires {
                    pages.extend(0x20..0x60);
                }
            }
        }
        pages
    }

    /// Advances flash timing and redraws the whole framebuffer for the
    /// currently latched video mode.
    fn render(&mut self, mmu: &Mmu) {
        self.flash_counter += 1;
        if self.flash_counter >= 15 {
            // ~4 Hz flash at 60 fps.
            self.flash_state = !self.flash_state;
            self.flash_counter = 0;
        }

        for pixel in self.framebuffer.iter_mut() {
            *pixel = 0x000000;
        }

        if mmu.switches.text_mode {
            if mmu.switches.col_80 && mmu.is_iie() {
                self.render_text_80(mmu);
            } else {
                self.render_text(mmu);
            }
        } else if mmu.switches.hires {
            if mmu.switches.dhires && mmu.switches.col_80 && mmu.is_iie() {
                self.render_dhires(mmu);
            } else {
                self.render_hires(mmu);
            }
            if mmu.switches.mixed_mode {
                if mmu.switches.col_80 && mmu.is_iie() {
                    self.render_text_80_bottom(mmu);
                } else {
                    self.render_text_bottom(mmu);
                }
            }
        } else {
            self.render_lores(mmu);
            if mmu.switches.mixed_mode {
                if mmu.switches.col_80 && mmu.is_iie() {
                    self.render_text_80_bottom(mmu);
                } else {
                    self.render_text_bottom(mmu);
                }
            }
        }
    }

    fn render_text(&mut self, mmu: &Mmu) {
        let base = if mmu.switches.page2 { 0x0800 } else { 0x0400 };
        for row in 0..24 {
            let row_addr = base + Self::text_row_offset(row);
            for col in 0..40 {
                let ch = mmu.main_ram[(row_addr + col) as usize];
                self.draw_char(col as usize, row as usize, ch);
            }
        }
    }

    fn render_text_bottom(&mut self, mmu: &Mmu) {
        let base = if mmu.switches.page2 { 0x0800 } else { 0x0400 };
        for row in 20..24 {
            let row_addr = base + Self::text_row_offset(row);
            for col in 0..40 {
                let ch = mmu.main_ram[(row_addr + col) as usize];
                self.draw_char(col as usize, row as usize, ch);
            }
        }
    }

    /// Apple II text rows are interleaved in groups of 8:
    /// rows 0-7 at $400/$480/.../$780, rows 8-15 at $428/$4A8/..., rows
    /// 16-23 at $450/$4D0/...
    fn text_row_offset(row: usize) -> usize {
        let group = row / 8;
        let line = row % 8;
        group * 0x28 + line * 0x80
    }

    /// Character codes: $00-$3F inverse, $40-$7F flash, $80-$FF normal;
    /// $E0-$FF additionally remaps to the IIe lowercase font bank.
    fn draw_char(&mut self, col: usize, row: usize, ch: u8) {
        let mode = ch >> 6;
        let inverse = mode == 0;
        let flash = mode == 1;

        let char_index = if ch >= 0xE0 {
            0x40 + (ch & 0x1F) as usize
        } else {
            (ch & 0x3F) as usize
        };
        let font_offset = char_index * 8;

        let fg = if self.monochrome { self.mono_color } else { 0xFFFFFF };
        let bg = 0x000000;
        let do_inverse = inverse || (flash && self.flash_state);

        for y in 0..8 {
            let font_byte = if font_offset + y < self.char_rom.len() {
                self.char_rom[font_offset + y]
            } else {
                0
            };

            for x in 0..7 {
                let pixel_on = (font_byte & (0x40 >> x)) != 0;
                let color = if do_inverse {
                    if pixel_on { bg } else { fg }
                } else if pixel_on {
                    fg
                } else {
                    bg
                };

                let screen_x = col * 14 + x * 2;
                let screen_y = row * 16 + y * 2;
                if screen_x + 1 < SCREEN_WIDTH && screen_y + 1 < SCREEN_HEIGHT {
                    let idx = screen_y * SCREEN_WIDTH + screen_x;
                    self.framebuffer[idx] = color;
                    self.framebuffer[idx + 1] = color;
                    self.framebuffer[idx + SCREEN_WIDTH] = color;
                    self.framebuffer[idx + SCREEN_WIDTH + 1] = color;
                }
            }
        }
    }

    fn render_lores(&mut self, mmu: &Mmu) {
        let base = if mmu.switches.page2 { 0x0800 } else { 0x0400 };
        let max_row = if mmu.switches.mixed_mode { 20 } else { 24 };

        for row in 0..max_row {
            let row_addr = base + Self::text_row_offset(row);
            for col in 0..40 {
                let byte = mmu.main_ram[(row_addr + col) as usize];
                let top_color = COLORS[(byte & 0x0F) as usize];
                let bottom_color = COLORS[(byte >> 4) as usize];
                self.draw_lores_block(col as usize, row as usize, top_color, bottom_color);
            }
        }
    }

    fn draw_lores_block(&mut self, col: usize, row: usize, top_color: u32, bottom_color: u32) {
        let x_start = col * 14;
        let y_start = row * 16;

        for y in 0..8 {
            for x in 0..14 {
                if x_start + x < SCREEN_WIDTH && y_start + y < SCREEN_HEIGHT {
                    self.framebuffer[(y_start + y) * SCREEN_WIDTH + x_start + x] = top_color;
                }
            }
        }
        for y in 8..16 {
            for x in 0..14 {
                if x_start + x < SCREEN_WIDTH && y_start + y < SCREEN_HEIGHT {
                    self.framebuffer[(y_start + y) * SCREEN_WIDTH + x_start + x] = bottom_color;
                }
            }
        }
    }

    fn render_hires(&mut self, mmu: &Mmu) {
        let base = if mmu.switches.page2 { 0x4000 } else { 0x2000 };
        let max_row = if mmu.switches.mixed_mode { 160 } else { 192 };

        // NTSC artifact lookup keyed by the 2-bits-either-side neighborhood.
        let hires_colors: [u32; 10] = [
            COLORS[0],
            COLORS[3],
            COLORS[12],
            COLORS[12],
            COLORS[3],
            COLORS[6],
            COLORS[9],
            COLORS[9],
            COLORS[6],
            COLORS[15],
        ];

        for y in 0..max_row {
            let row_addr = base + Self::hires_row_offset(y);

            let mut b0: u8 = 0;
            let mut b1: u8 = mmu.main_ram[row_addr as usize];

            for x in 0..40 {
                let b2: u8 = if x == 39 {
                    0
                } else {
                    mmu.main_ram[(row_addr + x + 1) as usize]
                };

                // last 2 pixels, current 7 pixels, next 2 pixels
                let run: u16 =
                    ((b0 as u16 & 0x60) >> 5) | ((b1 as u16 & 0x7f) << 2) | ((b2 as u16 & 0x03) << 9);

                let odd = ((x & 1) << 1) as usize;
                let offset = ((b1 & 0x80) >> 5) as usize;

                for i in 0..7 {
                    let left = (run >> (1 + i)) & 1;
                    let pixel = (run >> (2 + i)) & 1;
                    let right = (run >> (3 + i)) & 1;

                    let idx = if self.monochrome {
                        if pixel != 0 { 9 } else { 0 }
                    } else if pixel != 0 {
                        if left != 0 || right != 0 {
                            9
                        } else {
                            offset + odd + (i & 1) + 1
                        }
                    } else if left != 0 && right != 0 {
                        offset + odd + 1 - (i & 1) + 1
                    } else {
                        0
                    };

                    let color = if self.monochrome && idx == 9 {
                        self.mono_color
                    } else {
                        hires_colors[idx]
                    };

                    let screen_x = x as usize * 14 + i * 2;
                    let screen_y = y * 2;
                    if screen_x + 1 < SCREEN_WIDTH && screen_y + 1 < SCREEN_HEIGHT {
                        let fb_idx = screen_y * SCREEN_WIDTH + screen_x;
                        self.framebuffer[fb_idx] = color;
                        self.framebuffer[fb_idx + 1] = color;
                        self.framebuffer[fb_idx + SCREEN_WIDTH] = color;
                        self.framebuffer[fb_idx + SCREEN_WIDTH + 1] = color;
                    }
                }

                b0 = b1;
                b1 = b2;
            }
        }
    }

    fn hires_row_offset(row: usize) -> usize {
        let section = row / 64;
        let group = (row % 64) / 8;
        let line = row % 8;
        section * 0x28 + group * 0x80 + line * 0x400
    }

    fn render_text_80(&mut self, mmu: &Mmu) {
        let base = if mmu.switches.page2 && !mmu.switches.store_80 {
            0x0800
        } else {
            0x0400
        };

        for row in 0..24 {
            let row_addr = base + Self::text_row_offset(row);
            for col in 0..80 {
                let ch = if (col & 1) == 0 {
                    mmu.aux_ram[(row_addr + col / 2) as usize]
                } else {
                    mmu.main_ram[(row_addr + col / 2) as usize]
                };
                self.draw_char_80(col as usize, row as usize, ch);
            }
        }
    }

    fn render_text_80_bottom(&mut self, mmu: &Mmu) {
        let base = if mmu.switches.page2 && !mmu.switches.store_80 {
            0x0800
        } else {
            0x0400
        };

        for row in 20..24 {
            let row_addr = base + Self::text_row_offset(row);
            for col in 0..80 {
                let ch = if (col & 1) == 0 {
                    mmu.aux_ram[(row_addr + col / 2) as usize]
                } else {
                    mmu.main_ram[(row_addr + col / 2) as usize]
                };
                self.draw_char_80(col as usize, row as usize, ch);
            }
        }
    }

    /// 80-column chars render at half width (7x8) since the column pitch is halved.
    fn draw_char_80(&mut self, col: usize, row: usize, ch: u8) {
        let (char_code, inverse, flash) = if ch < 0x40 {
            (ch + 0x40, true, false)
        } else if ch < 0x80 {
            (ch, false, true)
        } else if ch < 0xC0 {
            (ch - 0x40, true, false)
        } else {
            (ch - 0x40, false, false)
        };

        let should_invert = inverse || (flash && self.flash_state);
        let rom_idx = ((char_code as usize) & 0x3F) * 8;

        for char_row in 0..8 {
            let font_byte = if rom_idx + char_row < self.char_rom.len() {
                self.char_rom[rom_idx + char_row]
            } else {
                0
            };

            for char_col in 0..7 {
                let pixel_on = ((font_byte >> (6 - char_col)) & 1) != 0;
                let display_on = if should_invert { !pixel_on } else { pixel_on };

                let screen_x = col * 7 + char_col;
                let screen_y = row * 16 + char_row * 2;
                let color = if display_on { 0xFFFFFF } else { 0x000000 };

                if screen_x < SCREEN_WIDTH && screen_y + 1 < SCREEN_HEIGHT {
                    let fb_idx = screen_y * SCREEN_WIDTH + screen_x;
                    self.framebuffer[fb_idx] = color;
                    self.framebuffer[fb_idx + SCREEN_WIDTH] = color;
                }
            }
        }
    }

    /// Double-HiRes: 560x192 at 4 bits/pixel, interleaving aux and main RAM bytes.
    fn render_dhires(&mut self, mmu: &Mmu) {
        let base = if mmu.switches.page2 && !mmu.switches.store_80 {
            0x4000
        } else {
            0x2000
        };

        let max_row = if mmu.switches.mixed_mode { 160 } else { 192 };

        for y in 0..max_row {
            let row_addr = base + Self::hires_row_offset(y);

            for byte_x in 0..40 {
                let aux_byte = mmu.aux_ram[(row_addr + byte_x) as usize];
                let main_byte = mmu.main_ram[(row_addr + byte_x) as usize];

                let combined = ((main_byte as u16 & 0x7F) << 7) | (aux_byte as u16 & 0x7F);

                for bit in 0..14 {
                    let screen_x = byte_x as usize * 14 + bit;
                    let screen_y = y * 2;

                    let nibble_pos = bit / 4;
                    let nibble = if nibble_pos == 0 {
                        aux_byte & 0x0F
                    } else if nibble_pos == 1 {
                        ((aux_byte >> 4) & 0x07) | ((main_byte & 0x01) << 3)
                    } else if nibble_pos == 2 {
                        (main_byte >> 1) & 0x0F
                    } else {
                        (main_byte >> 5) & 0x07
                    };

                    let pixel_on = ((combined >> bit) & 1) != 0;
                    let color = if self.monochrome {
                        if pixel_on { self.mono_color } else { 0x000000 }
                    } else {
                        COLORS[nibble as usize & 0x0F]
                    };

                    if screen_x < SCREEN_WIDTH && screen_y + 1 < SCREEN_HEIGHT {
                        let fb_idx = screen_y * SCREEN_WIDTH + screen_x;
                        self.framebuffer[fb_idx] = color;
                        self.framebuffer[fb_idx + SCREEN_WIDTH] = color;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::AppleModel;

    #[test]
    fn blit_is_false_when_nothing_changed() {
        let mut mmu = Mmu::new(AppleModel::AppleIIe);
        let mut video = Video::new();
        assert!(video.blit(&mut mmu)); // first call always renders
        assert!(!video.blit(&mut mmu)); // nothing written since
    }

    #[test]
    fn blit_is_true_after_text_page_write() {
        let mut mmu = Mmu::new(AppleModel::AppleIIe);
        let mut video = Video::new();
        video.blit(&mut mmu);
        mmu.write(0x04, 0x00, b'A');
        assert!(video.blit(&mut mmu));
    }

    #[test]
    fn blit_is_true_on_mode_switch_with_no_write() {
        let mut mmu = Mmu::new(AppleModel::AppleIIe);
        let mut video = Video::new();
        video.blit(&mut mmu);
        mmu.switches.text_mode = false;
        assert!(video.blit(&mut mmu));
    }

    #[test]
    fn text_row_offset_matches_known_interleave() {
        assert_eq!(Video::text_row_offset(0), 0x000);
        assert_eq!(Video::text_row_offset(8), 0x028);
        assert_eq!(Video::text_row_offset(16), 0x050);
    }
}
