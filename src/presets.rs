use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, anyhow};
use log::{info, warn};

use crate::utils::{DEFAULT_FREQ_FROM, DEFAULT_FREQ_TO};

// A named set of display controls
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preset {
    pub brightness: i32,
    pub contrast: i32,
    pub freq_from: u32,
    pub freq_to: u32,
}

impl Default for Preset {
    fn default() -> Self {
        Self {
            brightness: 0,
            contrast: 0,
            freq_from: DEFAULT_FREQ_FROM,
            freq_to: DEFAULT_FREQ_TO,
        }
    }
}

// Manages loading, saving, and holding presets
pub struct PresetManager {
    pub presets: BTreeMap<String, Preset>,
    file_path: PathBuf,
}

impl PresetManager {
    pub fn new<P: AsRef<Path>>(file_path: P) -> Result<Self> {
        let file_path = file_path.as_ref().to_path_buf();
        let mut presets = BTreeMap::new();
        if file_path.exists() {
            info!("Loading presets from {}", file_path.display());
            let yaml_str = fs::read_to_string(&file_path)?;
            presets = serde_yaml::from_str(&yaml_str)
                .map_err(|e| anyhow!("Failed to parse {}: {}", file_path.display(), e))?;
        } else {
            info!("No presets file found at {}. Creating with default preset.", file_path.display());
            presets.insert("default".to_string(), Preset::default());
        }

        let mut manager = Self {
            presets,
            file_path,
        };

        // Ensure the default preset exists and save if it was just created
        if !manager.presets.contains_key("default") {
            warn!("'default' preset not found. Creating and saving it.");
            manager.presets.insert("default".to_string(), Preset::default());
        }

        manager.save()?;

        Ok(manager)
    }

    pub fn save(&self) -> Result<()> {
        let yaml_str = serde_yaml::to_string(&self.presets)?;
        fs::write(&self.file_path, yaml_str)?;
        info!("Presets saved to {}", self.file_path.display());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Preset> {
        self.presets
            .get(name)
            .copied()
            .ok_or_else(|| anyhow!("Unknown preset '{}'", name))
    }

    pub fn insert(&mut self, name: &str, preset: Preset) -> Result<()> {
        self.presets.insert(name.to_string(), preset);
        self.save()
    }
}
