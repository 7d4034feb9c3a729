//! Simulated bus traffic
//!
//! Feeds a [`LoopbackTransport`] from a background thread, either with
//! periodic messages or by replaying a JSON frame script, so the monitor can run
//! without hardware.

use crate::config::SimulatedMessage;
use anyhow::{Context, Result};
use can_monitor_core::{Frame, LoopbackTransport};
use crossbeam_channel::{bounded, select, Sender};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// One frame of a replay script
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReplayRecord {
    /// Delay from the start of the replay
    pub offset_ms: u64,
    pub id: u32,
    #[serde(default)]
    pub extended: bool,
    #[serde(default)]
    pub remote: bool,
    #[serde(default)]
    pub data: Vec<u8>,
}

impl ReplayRecord {
    fn frame(&self) -> Frame {
        if self.remote {
            Frame::remote(self.id, self.extended, self.data.len() as u8)
        } else if self.extended {
            Frame::extended(self.id, &self.data)
        } else {
            Frame::standard(self.id, &self.data)
        }
    }
}

/// Load a JSON replay script, sorted by offset
pub fn load_replay(path: &Path) -> Result<Vec<ReplayRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read replay file: {:?}", path))?;
    let mut records: Vec<ReplayRecord> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse replay file: {:?}", path))?;
    records.sort_by_key(|record| record.offset_ms);
    log::info!("Loaded {} replay frames from {:?}", records.len(), path);
    Ok(records)
}

/// Messages used when nothing is configured
pub fn demo_messages() -> Vec<SimulatedMessage> {
    vec![
        SimulatedMessage {
            id: 0x100,
            extended: false,
            remote: false,
            data: vec![0x00, 0x11, 0x22, 0x33],
            period_ms: 100,
            counter: true,
        },
        SimulatedMessage {
            id: 0x18FE_F100,
            extended: true,
            remote: false,
            data: vec![0xFF, 0xFF, 0x00, 0x7D, 0x00, 0x00, 0xFF, 0xFF],
            period_ms: 250,
            counter: false,
        },
        SimulatedMessage {
            id: 0x7DF,
            extended: false,
            remote: true,
            data: Vec::new(),
            period_ms: 1000,
            counter: false,
        },
    ]
}

struct Schedule {
    message: SimulatedMessage,
    next_due: Instant,
    sent: u64,
}

impl Schedule {
    fn frame(&self) -> Frame {
        if self.message.remote {
            return Frame::remote(self.message.id, self.message.extended, 0);
        }
        let mut frame = if self.message.extended {
            Frame::extended(self.message.id, &self.message.data)
        } else {
            Frame::standard(self.message.id, &self.message.data)
        };
        if self.message.counter && frame.len > 0 {
            frame.data[0] = frame.data[0].wrapping_add(self.sent as u8);
        }
        frame
    }
}

/// Background producer; stops when dropped
pub struct Simulator {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<u64>>,
}

impl Simulator {
    /// Send each message every `period_ms`
    pub fn periodic(transport: Arc<LoopbackTransport>, messages: Vec<SimulatedMessage>) -> Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("can-simulator".to_string())
            .spawn(move || {
                let start = Instant::now();
                let mut schedules: Vec<Schedule> = messages
                    .into_iter()
                    .map(|message| Schedule {
                        message,
                        next_due: start,
                        sent: 0,
                    })
                    .collect();
                let mut total = 0u64;

                loop {
                    let now = Instant::now();
                    for schedule in schedules.iter_mut().filter(|s| s.next_due <= now) {
                        transport.receive(schedule.frame());
                        schedule.sent += 1;
                        schedule.next_due += Duration::from_millis(schedule.message.period_ms);
                        total += 1;
                    }

                    let wait = schedules
                        .iter()
                        .map(|s| s.next_due.saturating_duration_since(Instant::now()))
                        .min()
                        .unwrap_or(Duration::from_millis(100));
                    select! {
                        recv(stop_rx) -> _ => break,
                        default(wait) => {}
                    }
                }
                total
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Inject the records of a replay script at their offsets, once
    pub fn replay(transport: Arc<LoopbackTransport>, records: Vec<ReplayRecord>) -> Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("can-replay".to_string())
            .spawn(move || {
                let start = Instant::now();
                let mut total = 0u64;
                for record in &records {
                    let due = start + Duration::from_millis(record.offset_ms);
                    let wait = due.saturating_duration_since(Instant::now());
                    select! {
                        recv(stop_rx) -> _ => return total,
                        default(wait) => {}
                    }
                    transport.receive(record.frame());
                    total += 1;
                }
                log::info!("Replay finished after {} frames", total);
                total
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Stop the producer and return how many frames it injected
    pub fn stop(mut self) -> u64 {
        self.shutdown()
    }

    fn shutdown(&mut self) -> u64 {
        self.stop_tx.take();
        self.handle
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or(0)
    }
}

impl Drop for Simulator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use can_monitor_core::Transport;
    use std::io::Write;

    #[test]
    fn test_periodic_counter_increments_first_byte() {
        let transport = Arc::new(LoopbackTransport::new());
        let simulator = Simulator::periodic(
            transport.clone(),
            vec![SimulatedMessage {
                id: 0x10,
                extended: false,
                remote: false,
                data: vec![0x05, 0xAA],
                period_ms: 5,
                counter: true,
            }],
        )
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while transport.pending() < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        let sent = simulator.stop();
        assert!(sent >= 3);

        let first = transport.read().unwrap().unwrap();
        let second = transport.read().unwrap().unwrap();
        assert_eq!(first.payload(), &[0x05, 0xAA]);
        assert_eq!(second.payload(), &[0x06, 0xAA]);
    }

    #[test]
    fn test_replay_script() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"offset_ms": 10, "id": 291, "data": [1, 2]}},
                {{"offset_ms": 0, "id": 16, "extended": true}},
                {{"offset_ms": 5, "id": 2015, "remote": true}}
            ]"#
        )
        .unwrap();

        let records = load_replay(file.path()).unwrap();
        assert_eq!(records[0].id, 16);
        assert_eq!(records[2].id, 291);

        let transport = Arc::new(LoopbackTransport::new());
        let simulator = Simulator::replay(transport.clone(), records).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while transport.pending() < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(simulator.stop(), 3);

        let frames: Vec<Frame> = (0..3).map(|_| transport.read().unwrap().unwrap()).collect();
        assert!(frames[0].extended);
        assert!(frames[1].remote);
        assert_eq!(frames[2].payload(), &[1, 2]);
    }

    #[test]
    fn test_demo_messages_are_valid() {
        for message in demo_messages() {
            let schedule = Schedule {
                message,
                next_due: Instant::now(),
                sent: 0,
            };
            assert!(schedule.frame().validate().is_ok());
        }
    }
}
