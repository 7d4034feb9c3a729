//! Display synchronisation
//!
//! [`DisplaySync`] periodically pulls the dirty rows out of the aggregation
//! table and applies them to a [`PresentationTable`]: existing rows are updated
//! in place, new rows are appended at their display position, nothing is ever
//! reordered. It never touches arrival data, only dirty flags (through
//! `snapshot_dirty`).

use crate::table::{AggregationTable, DisplayRow};
use crate::types::{MonitorError, Result};
use crossbeam_channel::{bounded, select, tick, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Ordered rows as shown to the operator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresentationTable {
    rows: Vec<DisplayRow>,
    generation: u64,
}

impl PresentationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[DisplayRow] {
        &self.rows
    }

    pub fn row(&self, position: usize) -> Option<&DisplayRow> {
        self.rows.get(position)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Aggregation table generation these rows belong to
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn reset(&mut self, generation: u64) {
        self.rows.clear();
        self.generation = generation;
    }

    /// Update the row at `row.position` in place, or append it if it is new
    fn apply(&mut self, row: DisplayRow) -> Applied {
        let len = self.rows.len();
        match self.rows.get_mut(row.position) {
            Some(existing) => {
                existing.length = row.length;
                existing.data_string = row.data_string;
                existing.count = row.count;
                existing.time_string = row.time_string;
                existing.name = row.name;
                Applied::Updated
            }
            None if row.position == len => {
                self.rows.push(row);
                Applied::Appended
            }
            None => {
                log::warn!(
                    "Row {} skipped: presentation only has {} rows",
                    row.position,
                    len
                );
                Applied::Skipped
            }
        }
    }
}

enum Applied {
    Updated,
    Appended,
    Skipped,
}

/// What one display tick changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub updated: usize,
    pub appended: usize,
    /// Rows were dropped because the table was cleared
    pub reset: bool,
}

impl SyncReport {
    pub fn changed(&self) -> bool {
        self.updated > 0 || self.appended > 0 || self.reset
    }
}

/// Called after every tick that changed the presentation
pub type RefreshCallback = Box<dyn FnMut(&SyncReport, &PresentationTable) + Send>;

/// Periodic observer of the aggregation table
#[derive(Debug)]
pub struct DisplaySync {
    table: Arc<AggregationTable>,
    view: Mutex<PresentationTable>,
}

impl DisplaySync {
    pub fn new(table: Arc<AggregationTable>) -> Self {
        let generation = table.generation();
        Self {
            table,
            view: Mutex::new(PresentationTable {
                rows: Vec::new(),
                generation,
            }),
        }
    }

    fn view(&self) -> MutexGuard<'_, PresentationTable> {
        self.view.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish everything that changed since the previous tick
    pub fn tick(&self) -> SyncReport {
        // The table lock is released before the presentation is touched
        let snapshot = self.table.snapshot_dirty();

        let mut view = self.view();
        let mut report = SyncReport::default();
        if snapshot.generation != view.generation {
            view.reset(snapshot.generation);
            report.reset = true;
        }
        for row in snapshot.rows {
            match view.apply(row) {
                Applied::Updated => report.updated += 1,
                Applied::Appended => report.appended += 1,
                Applied::Skipped => {}
            }
        }

        if report.changed() {
            log::debug!(
                "Display refresh: {} updated, {} appended{}",
                report.updated,
                report.appended,
                if report.reset { ", reset" } else { "" }
            );
        }
        report
    }

    /// Copy of the current presentation rows
    pub fn rows(&self) -> Vec<DisplayRow> {
        self.view().rows.clone()
    }

    /// Copy of the current presentation table
    pub fn presentation(&self) -> PresentationTable {
        self.view().clone()
    }

    /// Run `tick` every `interval` on a background thread
    pub fn spawn(
        self: &Arc<Self>,
        interval: Duration,
        mut on_refresh: Option<RefreshCallback>,
    ) -> Result<DisplayHandle> {
        let sync = Arc::clone(self);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("can-display".to_string())
            .spawn(move || {
                let ticker = tick(interval);
                loop {
                    select! {
                        recv(stop_rx) -> _ => break,
                        recv(ticker) -> _ => {
                            let report = sync.tick();
                            if report.changed() {
                                if let Some(callback) = on_refresh.as_mut() {
                                    callback(&report, &*sync.view());
                                }
                            }
                        }
                    }
                }
                log::debug!("Display refresh stopped");
            })?;

        log::debug!("Display refresh started ({:?} interval)", interval);
        Ok(DisplayHandle {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }
}

/// Handle of the background display refresh; stops it when dropped
#[derive(Debug)]
pub struct DisplayHandle {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl DisplayHandle {
    /// Stop the refresh thread and wait for it
    pub fn stop(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        self.stop_tx.take();
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| MonitorError::WorkerPanicked("display refresh".to_string())),
            None => Ok(()),
        }
    }
}

impl Drop for DisplayHandle {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
