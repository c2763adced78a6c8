//! Sidecar Helper Binary
//!
//! Standalone sidecar process. It opens a shared region created by a host,
//! decodes `[kind][len][payload]` command frames from the ring and exits when
//! it receives `Shutdown`.
//!
//! # Usage
//!
//! ```bash
//! sidecar-helper --name=SidecarRB
//! sidecar-helper --name=SidecarRB --capacity=4096
//! ```
//!
//! Exit codes: 0 after `Shutdown`, 1 bad arguments, 2 the region could not be
//! opened, 3 the region's capacity differs from `--capacity`.

use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use sidecar::{CommandKind, DEFAULT_READ_CHUNK, FrameDecoder, SharedRegion, SharedRing};

const EXIT_USAGE: u8 = 1;
const EXIT_OPEN: u8 = 2;
const EXIT_CAPACITY: u8 = 3;

#[derive(Debug)]
struct Args {
    name: String,
    capacity: Option<u32>,
}

fn parse_args() -> Result<Args, String> {
    let mut name = None;
    let mut capacity = None;

    for arg in std::env::args().skip(1) {
        if let Some(v) = arg.strip_prefix("--name=") {
            name = Some(v.to_string());
        } else if let Some(v) = arg.strip_prefix("--capacity=") {
            capacity = Some(
                v.parse::<u32>()
                    .map_err(|e| format!("invalid --capacity {:?}: {}", v, e))?,
            );
        } else {
            return Err(format!("unknown argument: {}", arg));
        }
    }

    Ok(Args {
        name: name.ok_or("--name required")?,
        capacity,
    })
}

fn run(ring: &SharedRing) {
    let mut chunk = vec![0u8; DEFAULT_READ_CHUNK];
    let mut decoder = FrameDecoder::new();

    loop {
        let n = ring.read(&mut chunk) as usize;
        if n == 0 {
            thread::sleep(Duration::from_millis(1));
            continue;
        }
        decoder.push(&chunk[..n]);

        loop {
            let command = match decoder.next_command() {
                Ok(Some(command)) => command,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "malformed command frame, resetting decoder");
                    decoder.reset();
                    break;
                }
            };
            match command.kind {
                CommandKind::ProcessData => {
                    eprintln!("[sidecar-helper] process-data len={}", command.payload.len());
                    tracing::debug!(payload = ?command.payload, "process data");
                }
                CommandKind::Ping => eprintln!("[sidecar-helper] ping"),
                CommandKind::Shutdown => {
                    eprintln!("[sidecar-helper] shutdown");
                    return;
                }
            }
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("[sidecar-helper] {}", msg);
            eprintln!("usage: sidecar-helper --name=<region> [--capacity=<bytes>]");
            return ExitCode::from(EXIT_USAGE);
        }
    };

    let mut region = match SharedRegion::open(&args.name) {
        Ok(region) => region,
        Err(e) => {
            tracing::error!(name = %args.name, error = %e, "failed to open shared region");
            return ExitCode::from(EXIT_OPEN);
        }
    };

    if let Some(expected) = args.capacity
        && expected != region.capacity()
    {
        tracing::error!(
            expected,
            found = region.capacity(),
            "shared region capacity mismatch"
        );
        return ExitCode::from(EXIT_CAPACITY);
    }

    let ring = match region.ring() {
        Ok(ring) => ring,
        Err(e) => {
            tracing::error!(error = %e, "failed to attach ring");
            return ExitCode::from(EXIT_OPEN);
        }
    };

    eprintln!(
        "[sidecar-helper] attached to {} ({} bytes)",
        region.name(),
        region.capacity()
    );
    run(&ring);

    drop(ring);
    region.close();
    ExitCode::SUCCESS
}
