//! CAN Monitor Core Library
//!
//! Turns a live stream of CAN frames into a deduplicated table holding the last
//! known state of every message identity, instead of a raw frame log.
//!
//! # Architecture
//!
//! - [`Transport`] is the only door to the hardware: non-blocking `read`,
//!   `write`, and a receive event signaled on frame arrival
//! - [`AcquisitionController`] runs exactly one strategy (Polling, EventDriven
//!   or Manual) that feeds frames into the [`AggregationTable`]
//! - [`DisplaySync`] independently publishes dirty table entries as
//!   presentation rows
//!
//! The library does NOT:
//! - Discover hardware or program bit timing, filters or trace files
//! - Render widgets (the CLI prints rows, a GUI could do the same)
//!
//! # Example Usage
//!
//! ```no_run
//! use can_monitor_core::{
//!     AcquisitionController, AggregationTable, ChannelConfig, DisplaySync, Frame,
//!     InfoLog, LoopbackTransport, MonitorConfig, StrategyKind,
//! };
//! use std::sync::Arc;
//!
//! let config = MonitorConfig::new();
//! let table = Arc::new(AggregationTable::new(config.show_period));
//! let info = Arc::new(InfoLog::new(config.info_log_capacity));
//!
//! let transport = Arc::new(LoopbackTransport::new());
//! let mut controller = AcquisitionController::new(table.clone(), info, config);
//! controller.connect(transport.clone(), ChannelConfig::default()).unwrap();
//! controller.select_strategy(StrategyKind::Polling).unwrap();
//!
//! transport.receive(Frame::standard(0x100, &[0x01, 0x02]));
//!
//! let display = DisplaySync::new(table);
//! display.tick();
//! for row in display.rows() {
//!     println!("{} {} {} {}", row.id_string, row.data_string, row.count, row.time_string);
//! }
//! ```

// Public modules
pub mod acquisition;
pub mod config;
pub mod display;
pub mod info;
pub mod symbols;
pub mod table;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use acquisition::{
    drain, AcquisitionController, AcquisitionState, DrainReport, Session, StrategyKind,
    StrategyStats,
};
pub use config::{Bitrate, ChannelConfig, MonitorConfig};
pub use display::{DisplayHandle, DisplaySync, PresentationTable, RefreshCallback, SyncReport};
pub use info::{InfoLevel, InfoLog, InfoMessage};
pub use symbols::SymbolTable;
pub use table::{AggregateEntry, AggregationTable, DirtySnapshot, DisplayRow, UpdateResult};
pub use transport::{LoopbackTransport, ReceiveEvent, Transport, WaitOutcome};
pub use types::{
    Frame, MonitorError, Result, Signature, Timestamp, TransportError, MAX_DATA_LEN,
    MAX_EXTENDED_ID, MAX_STANDARD_ID,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_basics() {
        // Smoke test: a fresh table is empty and starts in period mode
        let table = AggregationTable::default();
        assert!(table.is_empty());
        assert!(table.period_mode());
    }
}
