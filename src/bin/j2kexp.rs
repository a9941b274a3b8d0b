//! j2kexp CLI - exercises the JPEG 2000 compression core on raw frames.
//!
//! The core produces code-block payloads, not a framed codestream, so this
//! tool works on raw grayscale input and reports what the pipeline did:
//! useful for eyeballing compression behavior and verifying losslessness
//! without a container in the way.

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use j2kexp_rs::mct;
use j2kexp_rs::pipeline::{self, BlockPipelineOptions, CodingMode, EncoderConfig};

/// JPEG 2000 / HTJ2K compression core driver
#[derive(Parser)]
#[command(name = "j2kexp")]
#[command(version)]
#[command(about = "Run raw frames through the JPEG 2000 compression core", long_about = None)]
#[command(after_help = "EXAMPLES:
    j2kexp roundtrip -i frame.raw -w 512 -H 512
    j2kexp roundtrip -i frame.raw -w 512 -H 512 -c ht --levels 5
    j2kexp info -i frame.raw -w 512 -H 512 --tile 128")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode a raw 8-bit grayscale frame and decode it back, verifying the
    /// reversible path is lossless.
    #[command(visible_alias = "r")]
    Roundtrip {
        /// Raw 8-bit grayscale input file
        #[arg(short, long)]
        input: PathBuf,

        /// Optional output path for the decoded frame
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Frame width in pixels
        #[arg(short, long)]
        width: u32,

        /// Frame height in pixels
        #[arg(short = 'H', long)]
        height: u32,

        /// Block coder selection
        #[arg(short, long, default_value = "legacy", value_enum)]
        coder: Coder,

        /// Decomposition levels
        #[arg(long, default_value = "3")]
        levels: u8,

        /// Tile side (omit for a single tile)
        #[arg(long)]
        tile: Option<usize>,

        /// Encode code-blocks on the thread pool
        #[arg(long)]
        parallel: bool,
    },

    /// Encode a frame and print per-subband payload statistics.
    Info {
        /// Raw 8-bit grayscale input file
        #[arg(short, long)]
        input: PathBuf,

        /// Frame width in pixels
        #[arg(short, long)]
        width: u32,

        /// Frame height in pixels
        #[arg(short = 'H', long)]
        height: u32,

        /// Decomposition levels
        #[arg(long, default_value = "3")]
        levels: u8,

        /// Tile side (omit for a single tile)
        #[arg(long)]
        tile: Option<usize>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Coder {
    /// EBCOT Tier-1 (MQ coder)
    Legacy,
    /// High-throughput FBCOT
    Ht,
}

fn load_frame(path: &PathBuf, width: u32, height: u32) -> Result<Vec<i32>, String> {
    let bytes = fs::read(path).map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    let expected = width as usize * height as usize;
    if bytes.len() < expected {
        return Err(format!(
            "{}: expected {} bytes for {}x{}, found {}",
            path.display(),
            expected,
            width,
            height,
            bytes.len()
        ));
    }
    let mut samples: Vec<i32> = bytes[..expected].iter().map(|&b| b as i32).collect();
    mct::level_shift_forward(&mut samples, 8);
    Ok(samples)
}

fn config(coder: CodingMode, levels: u8, tile: Option<usize>, parallel: bool) -> EncoderConfig {
    EncoderConfig {
        levels,
        tile_size: tile.map(|t| (t, t)),
        block: BlockPipelineOptions {
            mode: coder,
            parallel,
            ..BlockPipelineOptions::default()
        },
        ..EncoderConfig::default()
    }
}

fn payload_bytes(image: &j2kexp_rs::EncodedImage) -> usize {
    image
        .tiles
        .iter()
        .flat_map(|t| &t.subbands)
        .flat_map(|s| &s.blocks)
        .map(|b| b.payload.len())
        .sum()
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Roundtrip {
            input,
            output,
            width,
            height,
            coder,
            levels,
            tile,
            parallel,
        } => {
            let mode = match coder {
                Coder::Legacy => CodingMode::Legacy,
                Coder::Ht => CodingMode::Ht,
            };
            run_roundtrip(&input, output.as_ref(), width, height, mode, levels, tile, parallel)
        }
        Commands::Info { input, width, height, levels, tile } => {
            run_info(&input, width, height, levels, tile)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_roundtrip(
    input: &PathBuf,
    output: Option<&PathBuf>,
    width: u32,
    height: u32,
    mode: CodingMode,
    levels: u8,
    tile: Option<usize>,
    parallel: bool,
) -> Result<(), String> {
    let samples = load_frame(input, width, height)?;
    let cfg = config(mode, levels, tile, parallel);

    let encoded = pipeline::encode_image(&samples, width as usize, height as usize, &cfg)
        .map_err(|e| e.to_string())?;
    let compressed = payload_bytes(&encoded);
    println!(
        "encoded {}x{}: {} payload bytes ({:.2}x)",
        width,
        height,
        compressed,
        samples.len() as f64 / compressed.max(1) as f64
    );

    let mut decoded = pipeline::decode_image(&encoded, parallel).map_err(|e| e.to_string())?;
    if decoded == samples {
        println!("round trip: lossless");
    } else {
        let diffs = decoded.iter().zip(samples.iter()).filter(|(a, b)| a != b).count();
        return Err(format!("round trip mismatch on {diffs} samples"));
    }

    if let Some(path) = output {
        mct::level_shift_inverse(&mut decoded, 8);
        let bytes: Vec<u8> = decoded.iter().map(|&s| s.clamp(0, 255) as u8).collect();
        fs::write(path, bytes).map_err(|e| format!("cannot write {}: {e}", path.display()))?;
        println!("wrote {}", path.display());
    }
    Ok(())
}

fn run_info(
    input: &PathBuf,
    width: u32,
    height: u32,
    levels: u8,
    tile: Option<usize>,
) -> Result<(), String> {
    let samples = load_frame(input, width, height)?;
    let cfg = config(CodingMode::Legacy, levels, tile, false);
    let encoded = pipeline::encode_image(&samples, width as usize, height as usize, &cfg)
        .map_err(|e| e.to_string())?;

    for (ti, t) in encoded.tiles.iter().enumerate() {
        println!("tile {ti}: {}x{} at ({}, {})", t.width, t.height, t.x0, t.y0);
        for sb in &t.subbands {
            let bytes: usize = sb.blocks.iter().map(|b| b.payload.len()).sum();
            let passes: u32 = sb.blocks.iter().map(|b| b.pass_count as u32).sum();
            println!(
                "  {:?} level {}: {}x{}, {} blocks, {} passes, {} bytes",
                sb.band,
                sb.level,
                sb.width,
                sb.height,
                sb.blocks.len(),
                passes,
                bytes
            );
        }
    }
    println!("total payload: {} bytes", payload_bytes(&encoded));
    Ok(())
}
