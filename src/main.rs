// Copyright (C) 2026 The nclink developers
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

// DNC drip-feed transfer CLI
use std::fs::File;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};

use nclink::config::{FlowControlMode, ParityMode, SessionConfig};
use nclink::controller::OperationController;
use nclink::error::TransferError;
use nclink::event::{CompositeSink, EventSink, LogFileSink, StdoutSink, TransferEvent};
use nclink::program::{Program, StartPoint};

const SEND_LOG_FILE: &str = "datalog_send.log";
const RECEIVE_LOG_FILE: &str = "datalog_receive.log";

#[derive(Parser)]
#[command(name = "nclink")]
#[command(about = "DNC drip-feed transfer of CNC part programs over RS-232", long_about = None)]
#[command(disable_help_subcommand = true)]
struct Cli {
    /// Serial port to use (e.g., /dev/ttyUSB0 or COM1)
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Data bits (5, 6, 7, or 8)
    #[arg(long, value_name = "BITS")]
    data_bits: Option<u8>,

    /// Parity (none, even, odd, mark, or space)
    #[arg(long)]
    parity: Option<String>,

    /// Stop bits (1 or 2)
    #[arg(long, value_name = "BITS")]
    stop_bits: Option<u8>,

    /// Flow control label (software or hardware); only software is implemented
    #[arg(long)]
    flow_control: Option<String>,

    /// Delay in milliseconds after each transmitted line
    #[arg(long, value_name = "MS")]
    line_delay: Option<u64>,

    /// Hold the first line until the controller sends XON
    #[arg(long)]
    wait_xon: bool,

    /// Start transmitting immediately, without waiting for XON
    #[arg(long, conflicts_with = "wait_xon")]
    no_wait_xon: bool,

    /// After a completed send, await a fresh XON and send the file again
    #[arg(long)]
    cycle: bool,

    /// Append transfer events to the datalog files
    #[arg(long)]
    log: bool,

    /// Settings file, created with defaults when missing
    #[arg(long, value_name = "FILE", default_value = "nclink.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a complete part program
    Send {
        /// Program file to send
        file: PathBuf,
    },
    /// Send part of a program, from a line number or block-number token
    PartialSend {
        /// Program file to send
        file: PathBuf,

        /// 1-based line number to start from (raised to line 2 when lower)
        #[arg(long, value_name = "LINE")]
        start_line: Option<usize>,

        /// Block-number token to start from (e.g. N120)
        #[arg(long, value_name = "TOKEN", conflicts_with = "start_line")]
        start_token: Option<String>,
    },
    /// Receive a program from the controller into a file
    Receive {
        /// Destination file for the captured program
        output: PathBuf,
    },
}

fn main() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    println!("Using serial port: {}", config.port);
    println!(
        "Settings: {} baud, {} data bits, {:?} parity, {} stop bits",
        config.baud, config.data_bits, config.parity, config.stop_bits
    );

    let controller = OperationController::new(config.clone());

    let handle = match cli.command {
        Commands::Send { file } => start_send(&controller, &config, &file),
        Commands::PartialSend {
            file,
            start_line,
            start_token,
        } => start_partial_send(&controller, &config, &file, start_line, start_token),
        Commands::Receive { output } => start_receive(&controller, &config, &output),
    };

    match handle.join() {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(_) => {
            eprintln!("Error: transfer worker terminated abnormally");
            std::process::exit(1);
        }
    }
}

/// Settings file first, command line on top.
fn resolve_config(cli: &Cli) -> Result<SessionConfig, String> {
    let mut config = SessionConfig::load_or_create(&cli.config)?;

    if let Some(port) = &cli.port {
        config.port = port.clone();
    }
    if let Some(baud) = cli.baud {
        config.baud = baud;
    }
    if let Some(data_bits) = cli.data_bits {
        config.data_bits = data_bits;
    }
    if let Some(stop_bits) = cli.stop_bits {
        config.stop_bits = stop_bits;
    }
    if let Some(parity) = &cli.parity {
        config.parity = ParityMode::parse(parity)?;
    }
    if let Some(flow_control) = &cli.flow_control {
        config.flow_control = FlowControlMode::parse(flow_control)?;
    }
    if let Some(line_delay) = cli.line_delay {
        config.line_delay_ms = line_delay;
    }
    if cli.wait_xon {
        config.wait_for_start = true;
    }
    if cli.no_wait_xon {
        config.wait_for_start = false;
    }
    if cli.cycle {
        config.cycle_send = true;
    }
    if cli.log {
        config.logging_enabled = true;
    }

    // Reject unusable serial parameters before touching the port.
    config.to_serial_data_bits()?;
    config.to_serial_stop_bits()?;

    Ok(config)
}

fn start_send(
    controller: &OperationController,
    config: &SessionConfig,
    file: &Path,
) -> JoinHandle<bool> {
    let program = load_program(file);
    let mut sink = build_sink(config, SEND_LOG_FILE);
    sink.emit(TransferEvent::info(format!(
        "Sending file: {} with {} lines.",
        file.display(),
        program.len()
    )));

    match controller.send(program, sink) {
        Some(handle) => handle,
        None => std::process::exit(1),
    }
}

fn start_partial_send(
    controller: &OperationController,
    config: &SessionConfig,
    file: &Path,
    start_line: Option<usize>,
    start_token: Option<String>,
) -> JoinHandle<bool> {
    let start = match (start_line, start_token) {
        (Some(line), None) => StartPoint::Line(line),
        (None, Some(token)) => StartPoint::Block(token),
        _ => {
            eprintln!("Error: partial-send requires --start-line or --start-token");
            std::process::exit(1);
        }
    };

    let program = load_program(file);
    let mut sink = build_sink(config, SEND_LOG_FILE);
    sink.emit(TransferEvent::info(format!(
        "Loaded file: {} with {} lines.",
        file.display(),
        program.len()
    )));

    match controller.partial_send(program, start, sink) {
        Some(handle) => handle,
        None => std::process::exit(1),
    }
}

fn start_receive(
    controller: &OperationController,
    config: &SessionConfig,
    output: &Path,
) -> JoinHandle<bool> {
    if output.is_dir() {
        // A directory is not a capture destination; treat it as the caller
        // declining to choose one.
        eprintln!("Error: {}: {}", output.display(), TransferError::UserCancelled);
        std::process::exit(1);
    }
    let dest = match File::create(output) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Error: Cannot create {}: {}", output.display(), e);
            std::process::exit(1);
        }
    };

    let mut sink = build_sink(config, RECEIVE_LOG_FILE);
    sink.emit(TransferEvent::info(format!(
        "Receiving data and saving to {}...",
        output.display()
    )));

    match controller.receive(Box::new(dest), sink) {
        Some(handle) => handle,
        None => std::process::exit(1),
    }
}

fn load_program(file: &Path) -> Program {
    match Program::load(file) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("Error: Cannot read {}: {}", file.display(), e);
            std::process::exit(1);
        }
    }
}

/// Stdout always; the datalog file only when logging is enabled.
fn build_sink(config: &SessionConfig, log_file: &str) -> Box<dyn EventSink> {
    if !config.logging_enabled {
        return Box::new(StdoutSink);
    }
    match LogFileSink::open(Path::new(log_file)) {
        Ok(log) => Box::new(CompositeSink::new(vec![Box::new(StdoutSink), Box::new(log)])),
        Err(e) => {
            eprintln!("Warning: cannot open {}: {}", log_file, e);
            Box::new(StdoutSink)
        }
    }
}
