use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::layout::{
    DEFAULT_COLUMN_PITCH, DEFAULT_FALLBACK_COLOR, LayoutEmitter, Palette, Rgb,
    default_palette_colors,
};
use crate::options::{DEFAULT_BATCH_SIZE, GraphOptions};

const CONFIG_DIR_NAME: &str = ".revgraph";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub batch_size: usize,
    pub color_by_branch: bool,
    pub column_pitch: f32,
    pub palette: Vec<Rgb>,
    pub default_color: Rgb,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            color_by_branch: false,
            column_pitch: DEFAULT_COLUMN_PITCH,
            palette: default_palette_colors(),
            default_color: DEFAULT_FALLBACK_COLOR,
        }
    }
}

impl GraphConfig {
    /// Resets settings the engine cannot use to their defaults and returns
    /// the names of the fields that changed.
    pub fn sanitize(&mut self) -> Vec<&'static str> {
        let mut reset = Vec::new();
        if self.batch_size == 0 {
            self.batch_size = DEFAULT_BATCH_SIZE;
            reset.push("batch_size");
        }
        if !self.column_pitch.is_finite() || self.column_pitch <= 0.0 {
            self.column_pitch = DEFAULT_COLUMN_PITCH;
            reset.push("column_pitch");
        }
        reset
    }

    /// Full-history options carrying the configured batch size and coloring.
    pub fn graph_options(&self) -> GraphOptions {
        GraphOptions::full()
            .with_batch_size(self.batch_size)
            .with_color_by_branch(self.color_by_branch)
    }

    pub fn layout_emitter(&self) -> LayoutEmitter {
        LayoutEmitter::new(
            self.column_pitch,
            Palette::new(self.palette.clone(), self.default_color),
        )
    }
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new() -> Result<Self> {
        let home_dir =
            dirs::home_dir().ok_or_else(|| anyhow!("failed to resolve home directory"))?;
        let path = home_dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME);
        Ok(Self { path })
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_or_create_default(&self) -> Result<GraphConfig> {
        if !self.path.exists() {
            let config = GraphConfig::default();
            self.save(&config)?;
            return Ok(config);
        }

        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read config file at {}", self.path.display()))?;
        let mut config = toml::from_str::<GraphConfig>(&raw).with_context(|| {
            format!(
                "failed to parse TOML config file at {}",
                self.path.display()
            )
        })?;
        let reset = config.sanitize();
        if !reset.is_empty() {
            warn!(
                path = %self.path.display(),
                fields = ?reset,
                "reset unusable graph settings to their defaults"
            );
        }
        Ok(config)
    }

    pub fn save(&self, config: &GraphConfig) -> Result<()> {
        let parent = self
            .path
            .parent()
            .ok_or_else(|| anyhow!("config path has no parent: {}", self.path.display()))?;

        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;

        let contents =
            toml::to_string_pretty(config).context("failed to serialize graph config to TOML")?;
        fs::write(&self.path, contents)
            .with_context(|| format!("failed to write config file at {}", self.path.display()))?;
        Ok(())
    }
}
