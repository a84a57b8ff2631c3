use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use ddsfw_config::ConsoleConfig;
use ddsfw_core::{Console, ConsoleError, ConsoleStream, IrqSources, LineFlags, SharedConsole};
use ddsfw_sim::metrics::ConsoleMetrics;
use ddsfw_sim::{bring_up, FrameFormat, SimUsart, Simulator};

mod shell;

use shell::Shell;

const RX_CAPACITY: usize = 32;
const TX_CAPACITY: usize = 32;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the console configuration (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// File whose bytes are typed on the terminal as-is
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Line typed on the terminal, terminated with CR (repeatable)
    #[arg(short, long = "line")]
    lines: Vec<String>,

    /// Enable interrupt-level tracing
    #[arg(short, long)]
    trace: bool,

    /// Maximum number of bit times to simulate
    #[arg(long, default_value = "2000000")]
    max_steps: u64,

    /// Write a JSON run summary to this path
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Start with input echo off
    #[arg(long)]
    no_echo: bool,

    /// Start with canonical line editing off
    #[arg(long)]
    raw: bool,

    /// Do not copy the terminal output to stdout
    #[arg(long)]
    quiet: bool,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "snake_case")]
enum StopReason {
    Settled,
    MaxSteps,
}

#[derive(Debug, Serialize)]
struct InterruptCounts {
    rx_complete: u64,
    data_empty: u64,
    tx_complete: u64,
}

#[derive(Debug, Serialize)]
struct RunSummary {
    stop_reason: StopReason,
    steps: u64,
    ubrr: u16,
    baud: u32,
    actual_baud: f64,
    settings: String,
    bytes_received: u64,
    bytes_transmitted: u64,
    interrupts: InterruptCounts,
    overruns: u64,
    line_overflows: u64,
    commands: u64,
    output: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // terminal output owns stdout
    let level = if args.trace {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    info!("Starting ddsfw console simulator");

    let mut config = match &args.config {
        Some(path) => {
            info!("Loading console config: {:?}", path);
            ConsoleConfig::from_file(path)?
        }
        None => ConsoleConfig::default(),
    };
    if args.no_echo {
        config.line.echo = false;
    }
    if args.raw {
        config.line.canonical = false;
    }
    config.validate()?;

    // the simulated foreground polls instead of sleeping
    let mut settings = config.to_settings();
    settings.flags.insert(LineFlags::NONBLOCKING_READ);

    let ubrr = config.usart.divisor()?;
    let actual_baud = config.usart.actual_baud()?;
    info!(
        "USART: {} baud requested, UBRR={}, {:.0} baud actual, {} bits per frame",
        config.usart.baud,
        ubrr,
        actual_baud,
        config.usart.frame_bits()
    );

    let mut usart = SimUsart::new();
    let frame = FrameFormat {
        data_bits: config.usart.data_bits,
        stop_bits: config.usart.stop_bits,
    };
    bring_up(&mut usart, ubrr, frame)?;

    let console: SharedConsole<SimUsart, RX_CAPACITY, TX_CAPACITY> =
        critical_section::Mutex::new(RefCell::new(Console::new(usart, settings)));
    let metrics = Arc::new(ConsoleMetrics::new());
    let sim = Simulator::new(&console).with_observer(metrics.clone());
    let mut stream = ConsoleStream::new(&console, &sim);
    stream.init();

    // the file is raw typeahead; each line waits for the console to settle
    let mut chunks: VecDeque<Vec<u8>> = VecDeque::new();
    if let Some(path) = &args.input {
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read input {:?}", path))?;
        chunks.push_back(bytes);
    }
    for line in &args.lines {
        let mut typed = line.as_bytes().to_vec();
        typed.push(b'\r');
        chunks.push_back(typed);
    }
    info!("Typing {} chunks on the terminal", chunks.len());

    sim.start();

    let mut shell = Shell::new();
    shell.prompt(&mut stream)?;

    let mut line = Vec::new();
    let mut line_overflows = 0;
    let stop_reason = loop {
        if sim.steps() >= args.max_steps {
            break StopReason::MaxSteps;
        }

        match stream.read_byte() {
            Ok(b'\n') | Ok(b'\r') => {
                shell.execute(&line, &mut stream)?;
                line.clear();
            }
            Ok(byte) => line.push(byte),
            Err(ConsoleError::WouldBlock) => {
                if sim.is_settled() {
                    match chunks.pop_front() {
                        Some(chunk) => sim.feed(&chunk),
                        None => break StopReason::Settled,
                    }
                }
                sim.step();
            }
            Err(err) => return Err(err.into()),
        }

        if let Err(err) = stream.take_line_overflow() {
            warn!("{}", err);
            line_overflows += 1;
        }
    };
    stream.flush();
    sim.stop();

    info!(
        "Simulation stopped ({:?}) after {} steps",
        stop_reason,
        sim.steps()
    );

    let output = sim.output();
    if !args.quiet {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(&output)?;
        stdout.flush()?;
    }

    if let Some(path) = &args.summary {
        let summary = RunSummary {
            stop_reason,
            steps: sim.steps(),
            ubrr,
            baud: config.usart.baud,
            actual_baud,
            settings: shell::describe(&stream.settings()),
            bytes_received: metrics.get_bytes_received(),
            bytes_transmitted: metrics.get_bytes_transmitted(),
            interrupts: InterruptCounts {
                rx_complete: metrics.get_interrupts(IrqSources::RX_COMPLETE),
                data_empty: metrics.get_interrupts(IrqSources::DATA_EMPTY),
                tx_complete: metrics.get_interrupts(IrqSources::TX_COMPLETE),
            },
            overruns: metrics.get_overruns(),
            line_overflows,
            commands: shell.commands(),
            output: String::from_utf8_lossy(&output).into_owned(),
        };
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write summary to {:?}", path))?;
        info!("Summary written to {:?}", path);
    }

    Ok(())
}
