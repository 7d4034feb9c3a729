//! CAN Monitor CLI Application
//!
//! Command-line front end for the can-monitor-core library. It wires a
//! simulated bus (periodic messages or a JSON replay) to the acquisition
//! controller, keeps the display refresh running and prints the message table,
//! while reading operator commands from stdin.

use anyhow::{Context, Result};
use can_monitor_core::{
    AcquisitionController, AggregationTable, DisplaySync, InfoLog, LoopbackTransport,
    MonitorError, PresentationTable, StrategyKind, SymbolTable, SyncReport,
};
use clap::Parser;
use crossbeam_channel::{after, never, select, unbounded, Receiver};
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

mod config;
mod cyclic;
mod input;
mod render;
mod simulator;

use config::{AppConfig, ReadMode};
use cyclic::CyclicSend;
use input::Command;
use simulator::Simulator;

/// CAN Monitor - live table of the last state of every CAN message
#[derive(Parser, Debug)]
#[command(name = "can-monitor")]
#[command(about = "Monitor a CAN channel as a deduplicated message table", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Reading mode (overrides the config file)
    #[arg(short, long, value_enum)]
    mode: Option<ReadMode>,

    /// Stop after this many seconds
    #[arg(short, long, value_name = "SECS")]
    duration: Option<u64>,

    /// Show absolute timestamps instead of periods
    #[arg(long)]
    absolute: bool,

    /// Path to DBC file(s) used to name messages (can be repeated)
    #[arg(long, value_name = "FILE")]
    dbc: Vec<PathBuf>,

    /// Replay frames from a JSON script instead of the periodic simulation
    #[arg(long, value_name = "FILE")]
    replay: Option<PathBuf>,

    /// Loop transmitted frames back into the receive queue
    #[arg(long)]
    echo: bool,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("CAN Monitor CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using monitor core v{}", can_monitor_core::VERSION);

    let mut config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };
    apply_overrides(&mut config, &args);

    run(config)
}

/// Command-line flags win over the config file
fn apply_overrides(config: &mut AppConfig, args: &Args) {
    if let Some(mode) = args.mode {
        config.acquisition.mode = mode;
    }
    if args.duration.is_some() {
        config.acquisition.duration_secs = args.duration;
    }
    if args.absolute {
        config.monitor.show_period = false;
    }
    if args.replay.is_some() {
        config.simulation.replay = args.replay.clone();
    }
    if args.echo {
        config.simulation.echo_writes = true;
    }
    config.dbc_files.extend(args.dbc.iter().cloned());
}

fn run(config: AppConfig) -> Result<()> {
    // Message names
    let mut symbols = SymbolTable::new();
    for path in &config.dbc_files {
        symbols
            .add_dbc(path)
            .with_context(|| format!("Failed to load DBC file: {:?}", path))?;
    }
    let with_names = !symbols.is_empty();

    let mut table = AggregationTable::new(config.monitor.show_period);
    if with_names {
        table = table.with_symbols(symbols);
    }
    let table = Arc::new(table);
    let info = Arc::new(InfoLog::new(config.monitor.info_log_capacity));

    // Simulated bus
    let transport =
        Arc::new(LoopbackTransport::new().with_echo(config.simulation.echo_writes));
    let simulator = match &config.simulation.replay {
        Some(path) => Simulator::replay(transport.clone(), simulator::load_replay(path)?)?,
        None if config.simulation.messages.is_empty() => {
            log::info!("No simulated messages configured, using demo traffic");
            Simulator::periodic(transport.clone(), simulator::demo_messages())?
        }
        None => Simulator::periodic(transport.clone(), config.simulation.messages.clone())?,
    };

    // Acquisition
    let mut controller =
        AcquisitionController::new(table.clone(), info.clone(), config.monitor.clone());
    controller.connect(transport, config.channel.clone())?;
    controller.select_strategy(config.acquisition.mode.into())?;

    // Display refresh
    let display = Arc::new(DisplaySync::new(table.clone()));
    let clear_screen = io::stdout().is_terminal();
    let render_table = table.clone();
    let display_handle = display.spawn(
        config.monitor.display_interval(),
        Some(Box::new(move |_report: &SyncReport, presentation: &PresentationTable| {
            let text = render::render_table(presentation, render_table.period_mode(), with_names);
            let mut stdout = io::stdout().lock();
            if clear_screen {
                let _ = write!(stdout, "\x1b[2J\x1b[H");
            }
            let _ = writeln!(stdout, "{}", text);
            let _ = stdout.flush();
        })),
    )?;

    if config.acquisition.mode == ReadMode::Manual {
        println!("Manual mode: type `read` to consume one frame, `help` for commands");
    }
    command_loop(&mut controller, &table, &info, config.acquisition.duration_secs)?;

    // Shutdown
    display_handle.stop()?;
    controller.disconnect()?;
    let injected = simulator.stop();
    display.tick();

    println!("═══════════════════════════════════════════════");
    println!("  CAN Monitor - Summary");
    println!("═══════════════════════════════════════════════\n");
    print!(
        "{}",
        render::render_table(&display.presentation(), table.period_mode(), with_names)
    );
    println!("\n📊 Frames:");
    println!("  Simulated: {}", injected);
    for kind in [
        StrategyKind::Polling,
        StrategyKind::EventDriven,
        StrategyKind::Manual,
    ] {
        let stats = controller.stats(kind);
        println!(
            "  {:<12} {} frames, {} read errors",
            format!("{}:", kind),
            stats.frames,
            stats.read_errors
        );
    }
    let messages = info.drain();
    if !messages.is_empty() {
        println!("\n{}", render::render_info(&messages));
    }

    Ok(())
}

/// Forward stdin lines to a channel until EOF
fn spawn_stdin_reader() -> Result<Receiver<String>> {
    let (tx, rx) = unbounded();
    thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        log::warn!("Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
        })?;
    Ok(rx)
}

fn command_loop(
    controller: &mut AcquisitionController,
    table: &AggregationTable,
    info: &InfoLog,
    duration_secs: Option<u64>,
) -> Result<()> {
    let deadline = match duration_secs {
        Some(secs) => after(Duration::from_secs(secs)),
        None => never(),
    };
    let mut lines = spawn_stdin_reader()?;
    let mut cyclic: Option<CyclicSend> = None;

    loop {
        let send_ticker = cyclic
            .as_ref()
            .map(|send| send.ticker().clone())
            .unwrap_or_else(never);

        select! {
            recv(deadline) -> _ => {
                log::info!("Run duration elapsed");
                return Ok(());
            }
            recv(send_ticker) -> _ => {
                if let Some(send) = cyclic.as_mut() {
                    if let Err(e) = send.fire(controller) {
                        eprintln!("Cyclic send stopped after {} frames: {}", send.sent(), e);
                        cyclic = None;
                    }
                }
            }
            recv(lines) -> line => match line {
                Ok(line) => {
                    match input::parse_command(&line) {
                        Ok(Some(Command::Quit)) => return Ok(()),
                        Ok(Some(command)) => execute(controller, table, info, &mut cyclic, command),
                        Ok(None) => {}
                        Err(e) => eprintln!("{:#}", e),
                    }
                }
                Err(_) => {
                    // stdin closed: keep running until the deadline, if there is one
                    if duration_secs.is_none() {
                        return Ok(());
                    }
                    lines = never();
                }
            },
        }
    }
}

fn execute(
    controller: &mut AcquisitionController,
    table: &AggregationTable,
    info: &InfoLog,
    cyclic: &mut Option<CyclicSend>,
    command: Command,
) {
    let result: can_monitor_core::Result<()> = match command {
        Command::Read => controller.read_once().map(|_| ()),
        Command::Mode(kind) => controller.select_strategy(kind),
        Command::Period(enabled) => {
            let enabled = enabled.unwrap_or(!table.period_mode());
            table.set_period_mode(enabled);
            Ok(())
        }
        Command::Send(frame) => controller.write_frame(&frame),
        Command::SendEvery(frame, interval) => frame.validate().map(|()| {
            *cyclic = Some(CyclicSend::new(frame, interval));
        }),
        Command::StopSend => {
            match cyclic.take() {
                Some(send) => println!(
                    "Stopped cyclic send of {} after {} frames",
                    send.frame().signature(),
                    send.sent()
                ),
                None => println!("No cyclic send is running"),
            }
            Ok(())
        }
        Command::Clear => {
            table.clear();
            Ok(())
        }
        Command::Info => {
            println!("{}", render::render_info(&info.drain()));
            Ok(())
        }
        Command::Help => {
            println!("{}", input::HELP);
            Ok(())
        }
        Command::Quit => Ok(()),
    };

    match result {
        Ok(()) => {}
        Err(MonitorError::WrongStrategy { expected, active }) => {
            eprintln!("`read` needs {} mode (currently {})", expected, active)
        }
        Err(e) => eprintln!("Error: {}", e),
    }
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
