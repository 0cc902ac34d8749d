//! Host preference persistence: the handful of settings a frontend wants
//! to remember between runs, round-tripped through JSON.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const CONFIG_FILE: &str = "a2core_config.json";

/// Host-facing configuration. None of this affects emulated behavior; it's
/// the frontend's own memory of what the user last did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub last_disk1: Option<String>,
    pub last_disk2: Option<String>,
    pub last_rom: Option<String>,
    /// Target clock in kHz (1023 = authentic, higher = accelerated).
    pub speed_khz: u32,
    pub sound_enabled: bool,
    /// Slot last used by a quick save/load.
    pub current_slot: u8,
    #[serde(default = "default_rom_dir")]
    pub rom_dir: String,
    #[serde(default = "default_disk_dir")]
    pub disk_dir: String,
    #[serde(default = "default_save_dir")]
    pub save_dir: String,
}

fn default_rom_dir() -> String {
    "roms".to_string()
}
fn default_disk_dir() -> String {
    "disks".to_string()
}
fn default_save_dir() -> String {
    "saves".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            last_disk1: None,
            last_disk2: None,
            last_rom: None,
            speed_khz: 1023,
            sound_enabled: true,
            current_slot: 0,
            rom_dir: default_rom_dir(),
            disk_dir: default_disk_dir(),
            save_dir: default_save_dir(),
        }
    }
}

impl Config {
    pub fn load() -> Self {
        Self::load_from(CONFIG_FILE)
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    log::warn!("failed to parse config, using defaults: {e}");
                    Config::default()
                }
            },
            Err(_) => Config::default(),
        }
    }

    pub fn save(&self) -> Result<(), String> {
        self.save_to(CONFIG_FILE)
    }

    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), String> {
        let json = serde_json::to_string_pretty(self).map_err(|e| format!("failed to serialize config: {e}"))?;
        fs::write(path, json).map_err(|e| format!("failed to write config: {e}"))?;
        Ok(())
    }

    pub fn ensure_directories(&self) {
        for dir in [&self.rom_dir, &self.disk_dir, &self.save_dir] {
            if !dir.is_empty() && !Path::new(dir).exists() {
                let _ = fs::create_dir_all(dir);
            }
        }
    }

    pub fn get_save_path(&self, slot: u8) -> String {
        let filename = SaveSlots::get_filename(slot);
        if self.save_dir.is_empty() {
            filename
        } else {
            format!("{}/{}", self.save_dir, filename)
        }
    }
}

/// Save-slot filename conventions, independent of any particular `Config`'s
/// directory (used both by the configured directory and ad-hoc paths).
pub struct SaveSlots;

impl SaveSlots {
    pub fn get_filename(slot: u8) -> String {
        if slot == 0 {
            "quicksave.json".to_string()
        } else {
            format!("save_slot_{slot}.json")
        }
    }

    pub fn get_path(save_dir: &str, slot: u8) -> String {
        let filename = Self::get_filename(slot);
        if save_dir.is_empty() {
            filename
        } else {
            format!("{save_dir}/{filename}")
        }
    }

    pub fn exists(slot: u8) -> bool {
        Path::new(&Self::get_filename(slot)).exists()
    }

    pub fn exists_in(save_dir: &str, slot: u8) -> bool {
        Path::new(&Self::get_path(save_dir, slot)).exists()
    }

    pub fn get_all_status() -> [bool; 10] {
        let mut status = [false; 10];
        for (i, slot) in status.iter_mut().enumerate() {
            *slot = Self::exists(i as u8);
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_authentic_speed() {
        let config = Config::default();
        assert_eq!(config.speed_khz, 1023);
    }

    #[test]
    fn save_slot_zero_is_quicksave() {
        assert_eq!(SaveSlots::get_filename(0), "quicksave.json");
        assert_eq!(SaveSlots::get_filename(3), "save_slot_3.json");
    }

    #[test]
    fn round_trips_through_json_file() {
        let dir = std::env::temp_dir().join(format!("a2core_config_test_{}", std::process::id()));
        let mut config = Config::default();
        config.last_rom = Some("apple2e.rom".to_string());
        config.save_to(&dir).unwrap();

        let loaded = Config::load_from(&dir);
        assert_eq!(loaded.last_rom, config.last_rom);

        let _ = fs::remove_file(&dir);
    }
}
