//! Identity-keyed aggregation table
//!
//! Keeps exactly one live entry per message [`Signature`], in creation order.
//! Every arrival of a known signature updates its entry in place; the table only
//! shrinks through an explicit [`AggregationTable::clear`]. A single mutex guards
//! every operation, producers and the display consumer alike.

use crate::symbols::SymbolTable;
use crate::types::{Frame, Signature, Timestamp};
use std::sync::{Mutex, MutexGuard};

/// Outcome of feeding one frame into the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateResult {
    /// A new entry was appended at this display position
    Created(usize),
    /// The existing entry at this display position was updated
    Updated(usize),
}

impl UpdateResult {
    /// Display position of the touched entry
    pub fn position(&self) -> usize {
        match self {
            UpdateResult::Created(position) | UpdateResult::Updated(position) => *position,
        }
    }
}

/// Last known state of one message signature
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateEntry {
    pub signature: Signature,
    /// Most recent frame with this signature
    pub latest_frame: Frame,
    /// `latest_frame.timestamp` as it was right before the last update
    pub previous_timestamp: Timestamp,
    /// Number of frames received with this signature, starting at 1
    pub arrival_count: u64,
    /// Stable row index assigned at creation
    pub display_position: usize,
    /// Show inter-arrival period instead of the absolute timestamp
    pub period_mode: bool,
    /// Changed since the last display scan
    pub dirty: bool,
}

impl AggregateEntry {
    fn new(frame: Frame, display_position: usize, period_mode: bool) -> Self {
        Self {
            signature: frame.signature(),
            latest_frame: frame,
            previous_timestamp: frame.timestamp,
            arrival_count: 1,
            display_position,
            period_mode,
            dirty: true,
        }
    }

    fn update(&mut self, frame: Frame) {
        self.previous_timestamp = self.latest_frame.timestamp;
        self.latest_frame = frame;
        self.arrival_count += 1;
        self.dirty = true;
    }

    /// `"EXTENDED"` or `"STANDARD"`, with `"/RTR"` for remote requests
    pub fn type_string(&self) -> String {
        let mut kind = String::from(if self.signature.extended {
            "EXTENDED"
        } else {
            "STANDARD"
        });
        if self.signature.remote {
            kind.push_str("/RTR");
        }
        kind
    }

    /// Identifier as 8 (extended) or 3 (standard) hex digits followed by `h`
    pub fn id_string(&self) -> String {
        if self.signature.extended {
            format!("{:08X}h", self.signature.id)
        } else {
            format!("{:03X}h", self.signature.id)
        }
    }

    /// Payload bytes as uppercase hex pairs, or `"Remote Request"`
    pub fn data_string(&self) -> String {
        if self.signature.remote {
            return "Remote Request".to_string();
        }
        self.latest_frame
            .payload()
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Absolute timestamp or, in period mode, the time since the previous arrival
    ///
    /// Milliseconds with one decimal, ties rounded away from zero.
    pub fn time_string(&self) -> String {
        let mut micros = self.latest_frame.timestamp.total_micros() as i64;
        if self.period_mode {
            micros -= self.previous_timestamp.total_micros() as i64;
        }
        format_tenths_of_millis(micros)
    }
}

fn format_tenths_of_millis(micros: i64) -> String {
    let tenths = (micros.unsigned_abs() + 50) / 100;
    let sign = if micros < 0 && tenths > 0 { "-" } else { "" };
    format!("{}{}.{}", sign, tenths / 10, tenths % 10)
}

/// One rendered row handed to the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayRow {
    pub position: usize,
    pub type_string: String,
    pub id_string: String,
    pub length: u8,
    pub data_string: String,
    pub count: u64,
    pub time_string: String,
    /// Message name from a DBC file, if one is attached
    pub name: Option<String>,
}

impl DisplayRow {
    /// Render an entry, looking up its name in an optional symbol table
    pub fn render(entry: &AggregateEntry, symbols: Option<&SymbolTable>) -> Self {
        Self {
            position: entry.display_position,
            type_string: entry.type_string(),
            id_string: entry.id_string(),
            length: entry.latest_frame.len,
            data_string: entry.data_string(),
            count: entry.arrival_count,
            time_string: entry.time_string(),
            name: symbols
                .and_then(|table| table.name_of(entry.signature.id, entry.signature.extended))
                .map(str::to_string),
        }
    }
}

/// Rows that changed since the previous scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirtySnapshot {
    /// Table generation; bumped by every `clear()`
    pub generation: u64,
    /// Changed rows in display order
    pub rows: Vec<DisplayRow>,
}

#[derive(Debug)]
struct TableState {
    entries: Vec<AggregateEntry>,
    next_position: usize,
    period_mode: bool,
    generation: u64,
}

/// Thread-safe aggregation table shared by producers and the display consumer
#[derive(Debug)]
pub struct AggregationTable {
    state: Mutex<TableState>,
    symbols: Option<SymbolTable>,
}

impl AggregationTable {
    /// Create an empty table; new entries start in the given period mode
    pub fn new(period_mode: bool) -> Self {
        Self {
            state: Mutex::new(TableState {
                entries: Vec::new(),
                next_position: 0,
                period_mode,
                generation: 0,
            }),
            symbols: None,
        }
    }

    /// Builder method: attach a symbol table used to name rendered rows
    pub fn with_symbols(mut self, symbols: SymbolTable) -> Self {
        self.symbols = Some(symbols);
        self
    }

    fn lock(&self) -> MutexGuard<'_, TableState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            log::warn!("Aggregation table lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Feed one successfully received frame into the table
    pub fn update(&self, frame: Frame) -> UpdateResult {
        let signature = frame.signature();
        let mut state = self.lock();

        if let Some(entry) = state
            .entries
            .iter_mut()
            .find(|entry| entry.signature == signature)
        {
            entry.update(frame);
            log::trace!("Updated {} (count {})", signature, entry.arrival_count);
            return UpdateResult::Updated(entry.display_position);
        }

        let position = state.next_position;
        state.next_position += 1;
        let period_mode = state.period_mode;
        state
            .entries
            .push(AggregateEntry::new(frame, position, period_mode));
        log::trace!("Created {} at row {}", signature, position);
        UpdateResult::Created(position)
    }

    /// Switch every entry between period and absolute time display
    ///
    /// Marks all entries dirty; stored timestamps and counts are untouched.
    pub fn set_period_mode(&self, enabled: bool) {
        let mut state = self.lock();
        state.period_mode = enabled;
        for entry in state.entries.iter_mut() {
            entry.period_mode = enabled;
            entry.dirty = true;
        }
        log::debug!(
            "Period mode {} for {} entries",
            if enabled { "enabled" } else { "disabled" },
            state.entries.len()
        );
    }

    /// Current period mode for new and existing entries
    pub fn period_mode(&self) -> bool {
        self.lock().period_mode
    }

    /// Remove all entries and restart display positions at zero
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.next_position = 0;
        state.generation += 1;
        log::info!("Aggregation table cleared (generation {})", state.generation);
    }

    /// Render and return all dirty entries, clearing their dirty flags
    pub fn snapshot_dirty(&self) -> DirtySnapshot {
        let mut state = self.lock();
        let generation = state.generation;
        let symbols = self.symbols.as_ref();
        let rows = state
            .entries
            .iter_mut()
            .filter(|entry| entry.dirty)
            .map(|entry| {
                entry.dirty = false;
                DisplayRow::render(entry, symbols)
            })
            .collect();
        DirtySnapshot { generation, rows }
    }

    /// Copy of every entry in display order; dirty flags are left alone
    pub fn entries(&self) -> Vec<AggregateEntry> {
        self.lock().entries.clone()
    }

    /// Copy of the entry for a signature, if present
    pub fn get(&self, signature: &Signature) -> Option<AggregateEntry> {
        self.lock()
            .entries
            .iter()
            .find(|entry| entry.signature == *signature)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of times the table has been cleared
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }
}

impl Default for AggregationTable {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(frame: Frame, millis: u32, micros: u16) -> Frame {
        frame.with_timestamp(Timestamp::new(millis, micros))
    }

    #[test]
    fn test_same_signature_is_aggregated() {
        let table = AggregationTable::new(true);
        for i in 0..5u32 {
            table.update(at(Frame::standard(0x100, &[i as u8]), 10 * i, 0));
        }

        let entries = table.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].arrival_count, 5);
        assert_eq!(entries[0].latest_frame.data[0], 4);
    }

    #[test]
    fn test_distinct_signatures_get_increasing_positions() {
        let table = AggregationTable::new(true);
        let frames = [
            Frame::standard(0x100, &[]),
            Frame::extended(0x100, &[]),
            Frame::remote(0x100, false, 0),
            Frame::remote(0x100, true, 0),
            Frame::standard(0x101, &[]),
        ];
        for (expected, frame) in frames.iter().enumerate() {
            assert_eq!(table.update(*frame), UpdateResult::Created(expected));
        }
        assert_eq!(table.len(), frames.len());
        assert_eq!(table.update(frames[2]), UpdateResult::Updated(2));
    }

    #[test]
    fn test_period_and_absolute_time() {
        let table = AggregationTable::new(true);
        table.update(at(Frame::standard(0x100, &[0x01]), 100, 0));
        table.update(at(Frame::standard(0x100, &[0x02]), 150, 0));

        let entry = table.get(&Frame::standard(0x100, &[]).signature()).unwrap();
        assert_eq!(entry.arrival_count, 2);
        assert_eq!(entry.data_string(), "02");
        assert_eq!(entry.time_string(), "50.0");

        table.set_period_mode(false);
        let entry = table.get(&entry.signature).unwrap();
        assert_eq!(entry.time_string(), "150.0");
    }

    #[test]
    fn test_first_arrival_period_is_zero() {
        let table = AggregationTable::new(true);
        table.update(at(Frame::standard(0x10, &[]), 1234, 567));
        let entry = &table.entries()[0];
        assert_eq!(entry.previous_timestamp, entry.latest_frame.timestamp);
        assert_eq!(entry.time_string(), "0.0");
    }

    #[test]
    fn test_microseconds_contribute_to_time() {
        let table = AggregationTable::new(false);
        table.update(at(Frame::standard(0x10, &[]), 12, 340));
        assert_eq!(table.entries()[0].time_string(), "12.3");
    }

    #[test]
    fn test_time_ties_round_away_from_zero() {
        let table = AggregationTable::new(false);
        table.update(at(Frame::standard(0x1, &[]), 100, 250));
        table.update(at(Frame::standard(0x2, &[]), 100, 350));
        table.update(at(Frame::standard(0x3, &[]), 0, 650));
        table.update(at(Frame::standard(0x4, &[]), 7, 949));
        let times: Vec<String> = table.entries().iter().map(|e| e.time_string()).collect();
        assert_eq!(times, ["100.3", "100.4", "0.7", "7.9"]);

        let table = AggregationTable::new(true);
        table.update(at(Frame::standard(0x1, &[]), 100, 0));
        table.update(at(Frame::standard(0x1, &[]), 100, 250));
        assert_eq!(table.entries()[0].time_string(), "0.3");
    }

    #[test]
    fn test_period_of_out_of_order_timestamps_is_negative() {
        let table = AggregationTable::new(true);
        table.update(at(Frame::standard(0x1, &[]), 200, 0));
        table.update(at(Frame::standard(0x1, &[]), 150, 0));
        assert_eq!(table.entries()[0].time_string(), "-50.0");

        assert_eq!(format_tenths_of_millis(-40), "0.0");
        assert_eq!(format_tenths_of_millis(-50), "-0.1");
    }

    #[test]
    fn test_period_toggle_marks_dirty_without_touching_data() {
        let table = AggregationTable::new(true);
        table.update(at(Frame::standard(0x1, &[1]), 5, 0));
        table.update(at(Frame::standard(0x2, &[2]), 6, 0));
        table.update(at(Frame::standard(0x1, &[3]), 9, 0));
        table.snapshot_dirty();
        assert!(table.entries().iter().all(|entry| !entry.dirty));

        let before = table.entries();
        table.set_period_mode(false);
        let after = table.entries();

        for (old, new) in before.iter().zip(after.iter()) {
            assert!(new.dirty);
            assert!(!new.period_mode);
            assert_eq!(old.arrival_count, new.arrival_count);
            assert_eq!(old.latest_frame, new.latest_frame);
            assert_eq!(old.previous_timestamp, new.previous_timestamp);
        }
    }

    #[test]
    fn test_new_entries_follow_current_period_mode() {
        let table = AggregationTable::new(true);
        table.set_period_mode(false);
        table.update(at(Frame::standard(0x1, &[]), 42, 0));
        assert!(!table.entries()[0].period_mode);
        assert_eq!(table.entries()[0].time_string(), "42.0");
    }

    #[test]
    fn test_snapshot_dirty_clears_flags() {
        let table = AggregationTable::new(true);
        table.update(Frame::standard(0x1, &[]));
        table.update(Frame::standard(0x2, &[]));

        let snapshot = table.snapshot_dirty();
        assert_eq!(snapshot.rows.len(), 2);
        assert_eq!(snapshot.rows[0].position, 0);
        assert_eq!(snapshot.rows[1].position, 1);
        assert!(table.snapshot_dirty().rows.is_empty());

        table.update(Frame::standard(0x2, &[]));
        let snapshot = table.snapshot_dirty();
        assert_eq!(snapshot.rows.len(), 1);
        assert_eq!(snapshot.rows[0].position, 1);
        assert_eq!(snapshot.rows[0].count, 2);
    }

    #[test]
    fn test_clear_resets_positions() {
        let table = AggregationTable::new(true);
        table.update(Frame::standard(0x1, &[]));
        table.update(Frame::standard(0x2, &[]));
        table.clear();

        assert!(table.is_empty());
        assert_eq!(table.generation(), 1);
        assert_eq!(table.update(Frame::standard(0x2, &[])), UpdateResult::Created(0));
        assert_eq!(table.entries()[0].arrival_count, 1);
    }

    #[test]
    fn test_rendering() {
        let table = AggregationTable::new(true);
        table.update(Frame::extended(0x1AB_CDEF, &[0xDE, 0xAD, 0x0F]));
        table.update(Frame::standard(0x123, &[]));
        table.update(Frame {
            data: [0xFF; 8],
            ..Frame::remote(0x7FF, false, 0)
        });
        table.update(Frame::remote(0x55, true, 2));

        let rows = table.snapshot_dirty().rows;
        assert_eq!(rows[0].type_string, "EXTENDED");
        assert_eq!(rows[0].id_string, "01ABCDEFh");
        assert_eq!(rows[0].data_string, "DE AD 0F");
        assert_eq!(rows[1].type_string, "STANDARD");
        assert_eq!(rows[1].id_string, "123h");
        assert_eq!(rows[1].data_string, "");
        assert_eq!(rows[2].type_string, "STANDARD/RTR");
        assert_eq!(rows[2].data_string, "Remote Request");
        assert_eq!(rows[3].type_string, "EXTENDED/RTR");
        assert_eq!(rows[3].length, 2);
        assert_eq!(rows[3].data_string, "Remote Request");
    }
}
