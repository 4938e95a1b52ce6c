//! Offline WebSocket frame decoder.
//!
//! Reads raw (or hex-encoded) frame bytes captured from a connection and
//! prints one JSON frame summary per line on stdout.
//!
//! Usage:
//! ```
//! cargo run --bin cheddarws_decode -- --input capture.bin --chunk-size 3
//! echo "81 05 48 65 6c 6c 6f" | cargo run --bin cheddarws_decode -- --hex
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use cheddarws_core::logging::resolve_log_level;
use cheddarws_core::websocket::{ChunkSource, FrameDecoder, IoSource};
use cheddarws_core::{FrameSummary, NoPool, WebSocketConfig};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing_subscriber::FmtSubscriber;

struct Args {
    input: Option<PathBuf>,
    hex: bool,
    chunk_size: Option<usize>,
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = parse_args()?;

    let mut config = match &args.config {
        Some(path) => WebSocketConfig::from_json_file(path)?,
        None => WebSocketConfig::default(),
    };
    if let Some(chunk_size) = args.chunk_size {
        config.read_chunk_size = chunk_size;
    }
    config.validate()?;

    let label = args
        .input
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "stdin".to_string());

    let reader: Box<dyn AsyncRead + Unpin + Send> = match &args.input {
        Some(path) => Box::new(
            tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdin()),
    };
    let reader: Box<dyn AsyncRead + Unpin + Send> = if args.hex {
        let mut text = String::new();
        let mut reader = reader;
        reader
            .read_to_string(&mut text)
            .await
            .context("Failed to read hex input")?;
        Box::new(std::io::Cursor::new(parse_hex(&text)?))
    } else {
        reader
    };

    let mut source = IoSource::new(reader, config.read_chunk_size);
    let mut decoder = FrameDecoder::new(Arc::new(NoPool), config.max_frame_size);
    let mut count = 0usize;

    while let Some(chunk) = source.next_chunk().await? {
        tracing::debug!("Read chunk of {} bytes", chunk.len());
        let mut input = &chunk[..];
        while let Some(frame) = decoder
            .decode(&mut input)
            .with_context(|| format!("Frame {} is malformed", count + 1))?
        {
            count += 1;
            println!("{}", serde_json::to_string(&FrameSummary::new(&label, &frame))?);
        }
    }

    if decoder.is_mid_frame() {
        bail!("Input ended in the middle of frame {}", count + 1);
    }
    tracing::info!("Decoded {} frame(s) from {}", count, label);
    Ok(())
}

fn init_tracing() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(resolve_log_level())
        .with_writer(std::io::stderr) // stdout carries the JSON output
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = std::env::args().skip(1);
    let mut parsed = Args {
        input: None,
        hex: false,
        chunk_size: None,
        config: None,
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--input" | "-i" => {
                let path = args.next().context("--input needs a path")?;
                parsed.input = Some(PathBuf::from(path));
            }
            "--hex" => {
                parsed.hex = true;
            }
            "--chunk-size" => {
                let value = args.next().context("--chunk-size needs a value")?;
                let size = value
                    .parse::<usize>()
                    .with_context(|| format!("Invalid chunk size: {value}"))?;
                parsed.chunk_size = Some(size);
            }
            "--config" => {
                let path = args.next().context("--config needs a path")?;
                parsed.config = Some(PathBuf::from(path));
            }
            "--help" | "-h" => {
                eprintln!("Cheddar WebSocket frame decoder");
                eprintln!();
                eprintln!("Usage: cheddarws_decode [OPTIONS]");
                eprintln!();
                eprintln!("Options:");
                eprintln!("  --input, -i <PATH>    Read frames from PATH (default: stdin)");
                eprintln!("  --hex                 Input is hex text (whitespace and 0x prefixes allowed)");
                eprintln!("  --chunk-size <N>      Bytes per read (default: 65536)");
                eprintln!("  --config <PATH>       WebSocket config JSON");
                eprintln!("  --help, -h            Show this help");
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {arg}");
            }
        }
    }

    Ok(parsed)
}

fn parse_hex(text: &str) -> anyhow::Result<Vec<u8>> {
    let digits: String = text
        .split_whitespace()
        .map(|token| token.trim_start_matches("0x").trim_start_matches("0X"))
        .collect();
    if digits.len() % 2 != 0 {
        bail!("Hex input has an odd number of digits");
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            let pair = digits.get(i..i + 2).context("Hex input is not ASCII")?;
            u8::from_str_radix(pair, 16).with_context(|| format!("Invalid hex byte: {pair}"))
        })
        .collect()
}
