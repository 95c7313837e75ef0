// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Every field has a default, so a missing or partial config.toml still
// produces a usable configuration.

use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub device: DeviceConfig,
    pub debug: DebugConfig,
}

/// Window settings. The window is always fixed-size.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan".to_string(),
            width: 800,
            height: 600,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub clear_color: [f32; 4],
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            vertex_shader: PathBuf::from("shaders/triangle.vert.spv"),
            fragment_shader: PathBuf::from("shaders/triangle.frag.spv"),
        }
    }
}

/// Physical device filters applied on top of the queue/extension/swapchain checks
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub preferred_type: String,
    pub require_geometry_shader: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            preferred_type: "discrete".to_string(),
            require_geometry_shader: true,
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_level: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_level: "info".to_string(),
        }
    }
}

/// Where the active configuration came from. Loading happens before the
/// logger exists, so the outcome is reported afterwards through [`ConfigSource::report`].
#[derive(Debug)]
pub enum ConfigSource {
    File(PathBuf),
    Missing(PathBuf),
    /// The file exists but could not be read or parsed; defaults are in use
    Fallback(anyhow::Error),
}

impl ConfigSource {
    pub fn report(&self) {
        match self {
            ConfigSource::File(path) => log::info!("Loaded configuration from {:?}", path),
            ConfigSource::Missing(path) => {
                log::info!("Config file not found at {:?}, using defaults", path)
            }
            ConfigSource::Fallback(e) => {
                log::error!("Failed to load config: {:#}. Using defaults.", e)
            }
        }
    }
}

impl Config {
    /// Load `config.toml` from the working directory, falling back to defaults
    pub fn load() -> (Self, ConfigSource) {
        Self::load_or_default("config.toml")
    }

    pub fn load_or_default<P: AsRef<Path>>(path: P) -> (Self, ConfigSource) {
        let path = path.as_ref();
        match Self::load_from_path(path) {
            Ok(Some(config)) => (config, ConfigSource::File(path.to_path_buf())),
            Ok(None) => (Config::default(), ConfigSource::Missing(path.to_path_buf())),
            Err(e) => (Config::default(), ConfigSource::Fallback(e)),
        }
    }

    /// Load configuration from a specific path; `None` if there is no file
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(Some(config))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Validation layers and the debug messenger are only ever enabled in
    /// builds with debug assertions.
    pub fn diagnostics_enabled(&self) -> bool {
        cfg!(debug_assertions) && self.debug.validation_layers
    }

    /// Get the required device category as Vulkan enum
    pub fn get_device_type(&self) -> vk::PhysicalDeviceType {
        match self.device.preferred_type.to_lowercase().as_str() {
            "discrete" => vk::PhysicalDeviceType::DISCRETE_GPU,
            "integrated" => vk::PhysicalDeviceType::INTEGRATED_GPU,
            "virtual" => vk::PhysicalDeviceType::VIRTUAL_GPU,
            "cpu" => vk::PhysicalDeviceType::CPU,
            "other" => vk::PhysicalDeviceType::OTHER,
            _ => {
                log::warn!(
                    "Unknown device type '{}', defaulting to DISCRETE_GPU",
                    self.device.preferred_type
                );
                vk::PhysicalDeviceType::DISCRETE_GPU
            }
        }
    }

    /// Log level for env_logger; RUST_LOG still overrides it. `None` if the
    /// configured name is not a level.
    pub fn get_log_level(&self) -> Option<log::LevelFilter> {
        self.debug.log_level.parse().ok()
    }
}
