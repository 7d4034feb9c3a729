// End-to-end scenarios: transport -> acquisition -> table -> display
use can_monitor_core::{
    AcquisitionController, AcquisitionState, AggregationTable, ChannelConfig, DisplaySync, Frame,
    InfoLog, LoopbackTransport, MonitorConfig, StrategyKind, Timestamp,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

struct Rig {
    controller: AcquisitionController,
    transport: Arc<LoopbackTransport>,
    table: Arc<AggregationTable>,
    display: DisplaySync,
}

fn rig() -> Rig {
    let _ = env_logger::builder().is_test(true).try_init();

    let config = MonitorConfig::new()
        .with_poll_interval(Duration::from_millis(5))
        .with_event_timeout(Duration::from_millis(10));
    let table = Arc::new(AggregationTable::new(config.show_period));
    let info = Arc::new(InfoLog::new(config.info_log_capacity));
    let transport = Arc::new(LoopbackTransport::new());

    let mut controller = AcquisitionController::new(table.clone(), info, config);
    controller
        .connect(transport.clone(), ChannelConfig::default())
        .unwrap();

    Rig {
        controller,
        transport,
        display: DisplaySync::new(table.clone()),
        table,
    }
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

fn total_arrivals(table: &AggregationTable) -> u64 {
    table.entries().iter().map(|entry| entry.arrival_count).sum()
}

#[test]
fn manual_reads_aggregate_two_arrivals() {
    let mut rig = rig();
    rig.controller.select_strategy(StrategyKind::Manual).unwrap();

    rig.transport
        .receive_at(Frame::standard(0x100, &[0x01]).with_timestamp(Timestamp::new(100, 0)));
    rig.transport
        .receive_at(Frame::standard(0x100, &[0x02]).with_timestamp(Timestamp::new(150, 0)));
    rig.controller.read_once().unwrap();
    rig.controller.read_once().unwrap();

    rig.display.tick();
    let rows = rig.display.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].count, 2);
    assert_eq!(rows[0].data_string, "02");
    assert_eq!(rows[0].time_string, "50.0");

    rig.table.set_period_mode(false);
    rig.display.tick();
    assert_eq!(rig.display.rows()[0].time_string, "150.0");
}

#[test]
fn polling_with_concurrent_display_loses_nothing() {
    let mut rig = rig();
    rig.controller.select_strategy(StrategyKind::Polling).unwrap();

    let producer = {
        let transport = rig.transport.clone();
        thread::spawn(move || {
            for i in 0..2000u32 {
                transport.receive(Frame::standard(i % 16, &[(i % 256) as u8]));
                if i % 100 == 0 {
                    thread::sleep(Duration::from_millis(1));
                }
            }
        })
    };

    let display = Arc::new(DisplaySync::new(rig.table.clone()));
    let handle = display.spawn(Duration::from_millis(3), None).unwrap();

    producer.join().unwrap();
    assert!(wait_until(|| total_arrivals(&rig.table) == 2000));
    thread::sleep(Duration::from_millis(20));
    handle.stop().unwrap();
    display.tick();

    let rows = display.rows();
    assert_eq!(rows.len(), 16);
    for (index, row) in rows.iter().enumerate() {
        assert_eq!(row.position, index);
        assert_eq!(row.count, 125);
    }
}

#[test]
fn event_driven_to_polling_to_manual() {
    let mut rig = rig();

    rig.controller
        .select_strategy(StrategyKind::EventDriven)
        .unwrap();
    rig.transport.receive(Frame::extended(0x1AB_CDEF, &[0xAA]));
    assert!(wait_until(|| rig.table.len() == 1));

    rig.controller.select_strategy(StrategyKind::Polling).unwrap();
    assert!(!rig.transport.has_event());
    rig.transport.receive(Frame::remote(0x123, false, 0));
    assert!(wait_until(|| rig.table.len() == 2));

    rig.controller.select_strategy(StrategyKind::Manual).unwrap();
    assert!(!rig.controller.worker_active());
    let event_frames = rig.controller.stats(StrategyKind::EventDriven).frames;
    let polling_frames = rig.controller.stats(StrategyKind::Polling).frames;

    rig.transport.receive(Frame::standard(0x7FF, &[]));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(rig.transport.pending(), 1);
    rig.controller.read_once().unwrap();

    assert_eq!(rig.controller.stats(StrategyKind::EventDriven).frames, event_frames);
    assert_eq!(rig.controller.stats(StrategyKind::Polling).frames, polling_frames);
    assert_eq!(rig.controller.stats(StrategyKind::Manual).frames, 1);

    rig.display.tick();
    let rows = rig.display.rows();
    assert_eq!(rows[0].id_string, "01ABCDEFh");
    assert_eq!(rows[0].type_string, "EXTENDED");
    assert_eq!(rows[1].type_string, "STANDARD/RTR");
    assert_eq!(rows[1].data_string, "Remote Request");
    assert_eq!(rows[2].id_string, "7FFh");
}

#[test]
fn event_driven_stop_is_prompt() {
    let mut rig = rig();
    rig.controller
        .select_strategy(StrategyKind::EventDriven)
        .unwrap();
    thread::sleep(Duration::from_millis(20));

    let started = Instant::now();
    rig.controller.stop().unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(rig.controller.state(), AcquisitionState::Idle);
    assert!(!rig.transport.has_event());
}

#[test]
fn echoed_writes_show_up_in_table() {
    let rig = rig();
    let transport = Arc::new(LoopbackTransport::new().with_echo(true));
    let mut controller = AcquisitionController::new(
        rig.table.clone(),
        Arc::new(InfoLog::default()),
        MonitorConfig::default(),
    );
    controller
        .connect(transport.clone(), ChannelConfig::default())
        .unwrap();
    controller.select_strategy(StrategyKind::Manual).unwrap();

    controller
        .write_frame(&Frame::standard(0x603, &[0x2F, 0x60, 0x60, 0x00, 0x03]))
        .unwrap();
    controller.read_once().unwrap();

    let entries = rig.table.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].data_string(), "2F 60 60 00 03");
    assert!(controller
        .info_log()
        .messages()
        .iter()
        .any(|message| message.text == "Message was successfully SENT"));
}
