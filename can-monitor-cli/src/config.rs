//! Configuration loading and parsing

use anyhow::{Context, Result};
use can_monitor_core::{ChannelConfig, MonitorConfig, StrategyKind};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub dbc_files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AcquisitionConfig {
    #[serde(default)]
    pub mode: ReadMode,
    /// Stop after this many seconds (default: run until `quit`)
    pub duration_secs: Option<u64>,
}

/// Reading mode as written in config files and on the command line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReadMode {
    #[default]
    Polling,
    Event,
    Manual,
}

impl From<ReadMode> for StrategyKind {
    fn from(mode: ReadMode) -> Self {
        match mode {
            ReadMode::Polling => StrategyKind::Polling,
            ReadMode::Event => StrategyKind::EventDriven,
            ReadMode::Manual => StrategyKind::Manual,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SimulationConfig {
    /// JSON frame script replayed instead of the periodic messages
    pub replay: Option<PathBuf>,
    /// Loop written frames back into the receive queue
    #[serde(default)]
    pub echo_writes: bool,
    #[serde(default)]
    pub messages: Vec<SimulatedMessage>,
}

/// A message the simulated bus sends periodically
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SimulatedMessage {
    pub id: u32,
    #[serde(default)]
    pub extended: bool,
    #[serde(default)]
    pub remote: bool,
    #[serde(default)]
    pub data: Vec<u8>,
    pub period_ms: u64,
    /// Increment the first payload byte on every transmission
    #[serde(default)]
    pub counter: bool,
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate(&config).with_context(|| format!("Invalid config file: {:?}", path))?;

    Ok(config)
}

fn validate(config: &AppConfig) -> Result<()> {
    for message in &config.simulation.messages {
        if message.period_ms == 0 {
            anyhow::bail!("simulated message 0x{:X} has a zero period", message.id);
        }
        if message.data.len() > 8 {
            anyhow::bail!(
                "simulated message 0x{:X} has {} data bytes (max 8)",
                message.id,
                message.data.len()
            );
        }
    }
    Ok(())
}
