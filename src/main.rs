//! Minimal demo frontend: loads a ROM and optional disk images, opens a
//! window, and drives `Machine::tick` once per host frame. The emulation
//! core does all the work; this binary is scheduling, pixel blitting and
//! keyboard mapping only — no toolbar, debugger or CRT effects.

use std::time::Instant;

use clap::Parser;
use minifb::{Key, Window, WindowOptions};

use a2core::config::Config;
use a2core::io::AppleModel;
use a2core::runloop::{Machine, MachineOptions};
use a2core::video::{SCREEN_HEIGHT, SCREEN_WIDTH};

/// A2Core demo: Apple II / IIe emulator core exercised through a bare window.
#[derive(Parser, Debug)]
#[command(name = "a2core")]
#[command(about = "Apple II/IIe emulator core demo frontend", long_about = None)]
struct Args {
    /// Disk image for drive 1.
    #[arg(short = '1', long)]
    disk1: Option<String>,

    /// Disk image for drive 2.
    #[arg(short = '2', long)]
    disk2: Option<String>,

    /// Apple II model: auto, ii, ii+, iie, iie-enhanced.
    #[arg(short, long, default_value = "auto")]
    model: String,

    /// System ROM image.
    #[arg(short, long)]
    rom: Option<String>,

    /// Disk II boot ROM (256 bytes), used when the system ROM doesn't embed one.
    #[arg(long)]
    disk_rom: Option<String>,

    /// Run without a window for a fixed number of cycles, then exit.
    #[arg(long)]
    headless: bool,

    /// Cycles to run in headless mode.
    #[arg(long, default_value = "1000000")]
    cycles: u64,

    /// Target clock speed in kHz (1023 = authentic).
    #[arg(long, default_value = "1023")]
    speed_khz: u32,
}

fn parse_model(s: &str) -> Option<AppleModel> {
    match s.to_lowercase().as_str() {
        "auto" => None,
        "ii" => Some(AppleModel::AppleII),
        "ii+" | "iiplus" => Some(AppleModel::AppleIIPlus),
        "iie" => Some(AppleModel::AppleIIe),
        "iie-enhanced" | "iie+" => Some(AppleModel::AppleIIeEnhanced),
        _ => None,
    }
}

fn disk_ext(path: &str) -> &str {
    path.rsplit('.').next().unwrap_or("dsk")
}

fn build_machine(args: &Args) -> Machine {
    let model = parse_model(&args.model).unwrap_or(AppleModel::AppleIIe);
    let mut machine = Machine::new(MachineOptions {
        model,
        khz: args.speed_khz,
    });

    if let Some(rom_path) = &args.rom {
        match std::fs::read(rom_path) {
            Ok(data) => machine.load_rom(&data),
            Err(e) => log::warn!("failed to read ROM {rom_path}: {e}"),
        }
    } else {
        log::warn!("no ROM supplied; running with the built-in monitor stub only");
    }

    if let Some(disk_rom_path) = &args.disk_rom {
        match std::fs::read(disk_rom_path) {
            Ok(data) => {
                if let Err(e) = machine.load_disk_rom(&data) {
                    log::warn!("rejected disk boot ROM {disk_rom_path}: {e}");
                }
            }
            Err(e) => log::warn!("failed to read disk ROM {disk_rom_path}: {e}"),
        }
    }

    for (drive, path) in [(1, &args.disk1), (2, &args.disk2)] {
        let Some(path) = path else { continue };
        match std::fs::read(path) {
            Ok(data) => {
                let ext = disk_ext(path);
                if !machine.set_binary(drive, path, ext, &data) {
                    log::warn!("rejected disk image {path} for drive {drive}");
                }
            }
            Err(e) => log::warn!("failed to read disk image {path}: {e}"),
        }
    }

    machine.reset();
    machine
}

fn run_headless(args: &Args) {
    let mut machine = build_machine(args);
    machine.run();

    let mut cycles_run = 0u64;
    while cycles_run < args.cycles {
        let result = machine.tick(16.0, 16.0);
        if result.cycles_executed == 0 {
            break;
        }
        cycles_run += result.cycles_executed as u64;
    }

    println!("Ran {cycles_run} cycles.");
    println!("{}", machine.video().get_text(&machine.mmu));
}

const MAPPED_KEYS: &[Key] = &[
    Key::A, Key::B, Key::C, Key::D, Key::E, Key::F, Key::G, Key::H, Key::I, Key::J,
    Key::K, Key::L, Key::M, Key::N, Key::O, Key::P, Key::Q, Key::R, Key::S, Key::T,
    Key::U, Key::V, Key::W, Key::X, Key::Y, Key::Z,
    Key::Key0, Key::Key1, Key::Key2, Key::Key3, Key::Key4,
    Key::Key5, Key::Key6, Key::Key7, Key::Key8, Key::Key9,
    Key::Space, Key::Enter, Key::Backspace, Key::Left, Key::Right, Key::Up, Key::Down,
    Key::Escape, Key::Tab, Key::Comma, Key::Period, Key::Slash, Key::Semicolon,
    Key::Apostrophe, Key::LeftBracket, Key::RightBracket, Key::Minus, Key::Equal,
];

fn key_to_apple2(key: Key, shift: bool, ctrl: bool) -> Option<u8> {
    if ctrl {
        return match key {
            Key::A => Some(0x01),
            Key::B => Some(0x02),
            Key::C => Some(0x03),
            Key::D => Some(0x04),
            Key::E => Some(0x05),
            Key::F => Some(0x06),
            Key::G => Some(0x07),
            Key::H => Some(0x08),
            Key::I => Some(0x09),
            Key::J => Some(0x0A),
            Key::K => Some(0x0B),
            Key::L => Some(0x0C),
            Key::M => Some(0x0D),
            Key::N => Some(0x0E),
            Key::O => Some(0x0F),
            Key::P => Some(0x10),
            Key::Q => Some(0x11),
            Key::R => Some(0x12),
            Key::S => Some(0x13),
            Key::T => Some(0x14),
            Key::U => Some(0x15),
            Key::V => Some(0x16),
            Key::W => Some(0x17),
            Key::X => Some(0x18),
            Key::Y => Some(0x19),
            Key::Z => Some(0x1A),
            _ => None,
        };
    }

    // The Apple II keyboard is uppercase-only; shift only affects the
    // punctuation row, not letters.
    match key {
        Key::A => Some(b'A'),
        Key::B => Some(b'B'),
        Key::C => Some(b'C'),
        Key::D => Some(b'D'),
        Key::E => Some(b'E'),
        Key::F => Some(b'F'),
        Key::G => Some(b'G'),
        Key::H => Some(b'H'),
        Key::I => Some(b'I'),
        Key::J => Some(b'J'),
        Key::K => Some(b'K'),
        Key::L => Some(b'L'),
        Key::M => Some(b'M'),
        Key::N => Some(b'N'),
        Key::O => Some(b'O'),
        Key::P => Some(b'P'),
        Key::Q => Some(b'Q'),
        Key::R => Some(b'R'),
        Key::S => Some(b'S'),
        Key::T => Some(b'T'),
        Key::U => Some(b'U'),
        Key::V => Some(b'V'),
        Key::W => Some(b'W'),
        Key::X => Some(b'X'),
        Key::Y => Some(b'Y'),
        Key::Z => Some(b'Z'),
        Key::Key0 => Some(if shift { b')' } else { b'0' }),
        Key::Key1 => Some(if shift { b'!' } else { b'1' }),
        Key::Key2 => Some(if shift { b'@' } else { b'2' }),
        Key::Key3 => Some(if shift { b'#' } else { b'3' }),
        Key::Key4 => Some(if shift { b'$' } else { b'4' }),
        Key::Key5 => Some(if shift { b'%' } else { b'5' }),
        Key::Key6 => Some(if shift { b'^' } else { b'6' }),
        Key::Key7 => Some(if shift { b'&' } else { b'7' }),
        Key::Key8 => Some(if shift { b'*' } else { b'8' }),
        Key::Key9 => Some(if shift { b'(' } else { b'9' }),
        Key::Space => Some(b' '),
        Key::Enter => Some(0x0D),
        Key::Backspace => Some(0x08),
        Key::Left => Some(0x08),
        Key::Right => Some(0x15),
        Key::Up => Some(0x0B),
        Key::Down => Some(0x0A),
        Key::Escape => Some(0x1B),
        Key::Tab => Some(0x09),
        Key::Comma => Some(if shift { b'<' } else { b',' }),
        Key::Period => Some(if shift { b'>' } else { b'.' }),
        Key::Slash => Some(if shift { b'?' } else { b'/' }),
        Key::Semicolon => Some(if shift { b':' } else { b';' }),
        Key::Apostrophe => Some(if shift { b'"' } else { b'\'' }),
        Key::LeftBracket => Some(if shift { b'{' } else { b'[' }),
        Key::RightBracket => Some(if shift { b'}' } else { b']' }),
        Key::Minus => Some(if shift { b'_' } else { b'-' }),
        Key::Equal => Some(if shift { b'+' } else { b'=' }),
        _ => None,
    }
}

fn run_with_window(args: &Args) {
    let mut machine = build_machine(args);
    machine.run();

    let mut window = match Window::new(
        "A2Core",
        SCREEN_WIDTH,
        SCREEN_HEIGHT,
        WindowOptions {
            scale: minifb::Scale::X2,
            ..WindowOptions::default()
        },
    ) {
        Ok(win) => win,
        Err(e) => {
            log::error!("failed to create window: {e}");
            return;
        }
    };
    window.set_target_fps(60);

    let config = Config::load();
    let mut last_tick = Instant::now();

    while window.is_open() && !window.is_key_down(Key::Escape) {
        let elapsed_ms = last_tick.elapsed().as_secs_f64() * 1000.0;
        last_tick = Instant::now();

        let shift = window.is_key_down(Key::LeftShift) || window.is_key_down(Key::RightShift);
        let ctrl = window.is_key_down(Key::LeftCtrl) || window.is_key_down(Key::RightCtrl);
        for &key in MAPPED_KEYS {
            if window.is_key_pressed(key, minifb::KeyRepeat::No) {
                if let Some(code) = key_to_apple2(key, shift, ctrl) {
                    machine.key_down(code);
                }
                break;
            }
        }

        machine.tick(elapsed_ms, 16.0);
        let _ = machine.drain_audio();

        let _ = window.update_with_buffer(&machine.video().framebuffer, SCREEN_WIDTH, SCREEN_HEIGHT);
    }

    config.ensure_directories();
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if args.headless {
        run_headless(&args);
    } else {
        run_with_window(&args);
    }
}
