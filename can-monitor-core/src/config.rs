//! Monitor configuration types
//!
//! Timing of the acquisition strategies and the display refresh, plus the
//! channel description carried by a connected session. Hardware programming
//! (bit timing, filters, trace files) is left to the transport.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Configuration for the monitor core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Polling strategy tick interval in milliseconds (default: 50ms)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Bounded wait of the event-driven reader in milliseconds (default: 50ms)
    #[serde(default = "default_event_timeout")]
    pub event_timeout_ms: u64,

    /// Display refresh interval in milliseconds (default: 100ms)
    #[serde(default = "default_display_interval")]
    pub display_interval_ms: u64,

    /// Show inter-arrival periods instead of absolute timestamps
    #[serde(default = "default_true")]
    pub show_period: bool,

    /// Maximum number of operator messages kept in the info log
    #[serde(default = "default_info_log_capacity")]
    pub info_log_capacity: usize,
}

fn default_poll_interval() -> u64 {
    50
}

fn default_event_timeout() -> u64 {
    50
}

fn default_display_interval() -> u64 {
    100
}

fn default_true() -> bool {
    true
}

fn default_info_log_capacity() -> usize {
    256
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            event_timeout_ms: default_event_timeout(),
            display_interval_ms: default_display_interval(),
            show_period: true,
            info_log_capacity: default_info_log_capacity(),
        }
    }
}

impl MonitorConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the polling tick interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Builder method: set the event wait timeout
    pub fn with_event_timeout(mut self, timeout: Duration) -> Self {
        self.event_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Builder method: set the display refresh interval
    pub fn with_display_interval(mut self, interval: Duration) -> Self {
        self.display_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Builder method: start in period or absolute time mode
    pub fn with_show_period(mut self, enabled: bool) -> Self {
        self.show_period = enabled;
        self
    }

    /// Builder method: set the info log capacity
    pub fn with_info_log_capacity(mut self, capacity: usize) -> Self {
        self.info_log_capacity = capacity;
        self
    }

    // Zero intervals are bumped to 1ms so no worker spins

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn event_timeout(&self) -> Duration {
        Duration::from_millis(self.event_timeout_ms.max(1))
    }

    pub fn display_interval(&self) -> Duration {
        Duration::from_millis(self.display_interval_ms.max(1))
    }
}

/// Nominal bus bitrates offered by common CAN adapters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Bitrate {
    #[serde(rename = "1M")]
    Rate1M,
    #[serde(rename = "800K")]
    Rate800K,
    #[default]
    #[serde(rename = "500K")]
    Rate500K,
    #[serde(rename = "250K")]
    Rate250K,
    #[serde(rename = "125K")]
    Rate125K,
    #[serde(rename = "100K")]
    Rate100K,
    #[serde(rename = "95K")]
    Rate95K,
    #[serde(rename = "83K")]
    Rate83K,
    #[serde(rename = "50K")]
    Rate50K,
    #[serde(rename = "47K")]
    Rate47K,
    #[serde(rename = "33K")]
    Rate33K,
    #[serde(rename = "20K")]
    Rate20K,
    #[serde(rename = "10K")]
    Rate10K,
    #[serde(rename = "5K")]
    Rate5K,
}

impl Bitrate {
    /// Bits per second
    pub fn bits_per_second(&self) -> u32 {
        match self {
            Bitrate::Rate1M => 1_000_000,
            Bitrate::Rate800K => 800_000,
            Bitrate::Rate500K => 500_000,
            Bitrate::Rate250K => 250_000,
            Bitrate::Rate125K => 125_000,
            Bitrate::Rate100K => 100_000,
            Bitrate::Rate95K => 95_000,
            Bitrate::Rate83K => 83_000,
            Bitrate::Rate50K => 50_000,
            Bitrate::Rate47K => 47_000,
            Bitrate::Rate33K => 33_000,
            Bitrate::Rate20K => 20_000,
            Bitrate::Rate10K => 10_000,
            Bitrate::Rate5K => 5_000,
        }
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bps = self.bits_per_second();
        if bps >= 1_000_000 {
            write!(f, "{} MBit/s", bps / 1_000_000)
        } else {
            write!(f, "{} kBit/s", bps / 1_000)
        }
    }
}

/// Description of the hardware channel a session is connected to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Human-readable channel label (e.g. "USB 1")
    #[serde(default = "default_channel_name")]
    pub name: String,

    /// Nominal bus bitrate
    #[serde(default)]
    pub bitrate: Bitrate,
}

fn default_channel_name() -> String {
    "loopback".to_string()
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            name: default_channel_name(),
            bitrate: Bitrate::default(),
        }
    }
}

impl ChannelConfig {
    pub fn new(name: impl Into<String>, bitrate: Bitrate) -> Self {
        Self {
            name: name.into(),
            bitrate,
        }
    }
}

impl fmt::Display for ChannelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.name, self.bitrate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_config_defaults() {
        let config = MonitorConfig::new();
        assert_eq!(config.poll_interval(), Duration::from_millis(50));
        assert_eq!(config.event_timeout(), Duration::from_millis(50));
        assert_eq!(config.display_interval(), Duration::from_millis(100));
        assert!(config.show_period);
    }

    #[test]
    fn test_monitor_config_builder() {
        let config = MonitorConfig::new()
            .with_poll_interval(Duration::from_millis(10))
            .with_event_timeout(Duration::from_millis(0))
            .with_show_period(false)
            .with_info_log_capacity(4);

        assert_eq!(config.poll_interval_ms, 10);
        assert_eq!(config.event_timeout(), Duration::from_millis(1));
        assert!(!config.show_period);
        assert_eq!(config.info_log_capacity, 4);
    }

    #[test]
    fn test_channel_display() {
        let channel = ChannelConfig::new("USB 1", Bitrate::Rate1M);
        assert_eq!(channel.to_string(), "USB 1 @ 1 MBit/s");
        assert_eq!(ChannelConfig::default().to_string(), "loopback @ 500 kBit/s");
    }
}
