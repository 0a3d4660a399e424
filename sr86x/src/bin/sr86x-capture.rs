//! SR86x streaming capture
//!
//! Connects to an SR86x over VXI-11, configures streaming to this host and
//! records the telemetry to a `.dat` or `.csv` file.
//!
//! Usage:
//!   sr86x-capture 192.168.1.50 -o run.csv
//!   sr86x-capture 192.168.1.50 --channels 3 --rate 4 --duration 60 -o run.dat
//!   sr86x-capture 192.168.1.50 --vxi-port 1024 -v

use anyhow::{Context, Result};
use clap::Parser;
use sr86x::stream::{InstrumentStream, format_rate};
use sr86x::telemetry::header::BASE_SAMPLE_RATE;
use sr86x::telemetry::{CaptureSink, SinkFormat, TelemetryConfig, TelemetryServer, TelemetryStatus};
use sr86x::transport::{TcpTransportFactory, TransportFactory};
use sr86x::vxi11::Vxi11ClientBuilder;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{Level, error, info, warn};

/// SR86x streaming data capture
#[derive(Parser, Debug)]
#[command(name = "sr86x-capture")]
#[command(about = "Stream SR86x lock-in data over UDP and save it to disk")]
struct Args {
    /// Instrument IP address
    address: IpAddr,

    /// VXI-11 core port, resolved through the portmapper if not given
    #[arg(long)]
    vxi_port: Option<u16>,

    /// Local UDP port the instrument streams to
    #[arg(short = 'p', long, default_value_t = 1865, value_parser = clap::value_parser!(u16).range(1024..))]
    udp_port: u16,

    /// Output file, `.dat` (binary) or `.csv`
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Append to the output file instead of truncating it
    #[arg(long)]
    append: bool,

    /// Streamed channels: 0 X, 1 XY, 2 RΘ, 3 XYRΘ; add 4 for 16-bit integers
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(0..=7))]
    channels: Option<u8>,

    /// Rate divider: stream at the native rate / 2^n
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(0..=31))]
    rate: Option<u8>,

    /// Stop after this many seconds (0 = until Ctrl-C)
    #[arg(short, long, default_value_t = 0)]
    duration: u64,

    /// Lock the instrument while capturing
    #[arg(long)]
    lock: bool,

    /// Verbose output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn channels_label(what: u8) -> &'static str {
    match what {
        0 => "X only (float)",
        1 => "X & Y (float)",
        2 => "R & θ (float)",
        3 => "X, Y, R & θ (float)",
        4 => "X only (int)",
        5 => "X & Y (int)",
        6 => "R & θ (int)",
        7 => "X, Y, R & θ (int)",
        _ => "N/A",
    }
}

fn status_line(status: &TelemetryStatus) -> String {
    let rate = if status.rate <= 31 {
        format_rate(BASE_SAMPLE_RATE / 2f64.powi(i32::from(status.rate)))
    } else {
        "N/A".to_string()
    };
    let s = &status.samples;
    let mut line = format!(
        "{} @ {}  X={:.5e} Y={:.5e} R={:.5e} θ={:.5e}  {} B/s",
        channels_label(status.what),
        rate,
        s.x,
        s.y,
        s.r,
        s.theta,
        status.bytes
    );
    if status.missed {
        line.push_str("  MISSED");
    }
    if status.over {
        line.push_str("  OVERLOAD");
    }
    line
}

async fn capture<F: TransportFactory>(
    instrument: &mut InstrumentStream<F>,
    server: &TelemetryServer,
    duration: Duration,
) -> Result<()> {
    instrument.set_streaming(true).await.context("starting stream")?;
    info!(
        "Streaming {} at {}",
        channels_label(instrument.settings().what),
        format_rate(instrument.settings().stream_rate_hz())
    );

    let deadline = (!duration.is_zero()).then(|| tokio::time::Instant::now() + duration);
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            _ = ticker.tick() => {
                let status = server.take_status();
                println!("{}", status_line(&status));
                if status.bytes == 0 {
                    warn!("No data received on UDP port {:?}", server.local_port());
                }
                if deadline.is_some_and(|d| tokio::time::Instant::now() >= d) {
                    break;
                }
            }
        }
    }
    Ok(())
}

/// Open the output, apply the requested settings and capture
async fn run<F: TransportFactory>(
    args: &Args,
    instrument: &mut InstrumentStream<F>,
    server: &TelemetryServer,
) -> Result<()> {
    if let Some(path) = &args.output {
        let format = SinkFormat::from_path(path)?;
        let sink = CaptureSink::create(path, format, !args.append)
            .with_context(|| format!("opening {}", path.display()))?;
        server.session().open_sink(sink);
    }

    if let Some(what) = args.channels {
        instrument.set_channels(what).await.context("selecting channels")?;
    }
    if let Some(rate) = args.rate {
        instrument.set_rate(rate).await.context("setting rate")?;
    }
    instrument
        .set_port(args.udp_port)
        .await
        .context("setting stream port")?;

    capture(instrument, server, Duration::from_secs(args.duration)).await
}

/// Run the capture, then stop streaming and release the link and the output
/// whether or not it succeeded
async fn capture_session<F: TransportFactory>(
    args: &Args,
    instrument: &mut InstrumentStream<F>,
    server: &mut TelemetryServer,
) -> Result<()> {
    let result = run(args, instrument, server).await;

    if let Err(e) = instrument.shutdown().await {
        error!("Failed to stop streaming: {}", e);
    }
    server.stop().await;
    server.session().close_sink();
    result
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .try_init()
        .map_err(|e| anyhow::anyhow!("setting default subscriber failed: {}", e))?;

    let factory = TcpTransportFactory::new(args.address);
    let client = Vxi11ClientBuilder::new()
        .lock_device(args.lock)
        .on_status(|ok, finished| {
            if finished {
                info!("VXI-11 connect {}", if ok { "succeeded" } else { "failed" });
            } else if !ok {
                warn!("VXI-11 connection lost");
            }
        })
        .build(factory);
    let mut instrument = InstrumentStream::new(client);

    info!("Connecting to {}", args.address);
    let id = instrument
        .connect(args.vxi_port)
        .await
        .with_context(|| format!("connecting to {}", args.address))?;
    info!("Connected: {}", id);
    info!("Native rate {}", format_rate(instrument.settings().max_rate_hz));

    let mut server = TelemetryServer::new(TelemetryConfig::default().with_port(args.udp_port));
    if let Err(e) = server.start().await {
        let _ = instrument.shutdown().await;
        return Err(e).with_context(|| format!("unable to listen on UDP port {}", args.udp_port));
    }

    capture_session(&args, &mut instrument, &mut server).await
}
