//! Bundle command-line tool
//!
//! Inspect, extract, pack and verify bundle files

use anyhow::{bail, Context, Result};
use bundle_rs::{Bundle, BundleConfig, Compressor};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "bundle")]
#[command(about = "Inspect and build chunked compressed bundles")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the header and chunk table
    Info {
        /// Bundle file
        path: PathBuf,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Write bundle content (or a byte range of it) to a file or stdout
    Extract {
        /// Bundle file
        path: PathBuf,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Start of the range to extract
        #[arg(long, requires = "length")]
        offset: Option<u64>,

        /// Length of the range to extract
        #[arg(long)]
        length: Option<usize>,
    },

    /// Build a bundle from a file, replacing any existing content
    Pack {
        /// Input file
        input: PathBuf,

        /// Bundle file to create or overwrite
        path: PathBuf,

        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Chunk size for a new bundle
        #[arg(long)]
        chunk_size: Option<u32>,

        /// Compressor for a new bundle (none, lz4, zstd)
        #[arg(long)]
        compressor: Option<Compressor>,

        /// Compression level
        #[arg(short, long, allow_negative_numbers = true)]
        level: Option<i32>,
    },

    /// Decode every chunk and report the first corrupt one
    Verify {
        /// Bundle file
        path: PathBuf,
    },
}

#[derive(Serialize)]
struct BundleInfo {
    path: PathBuf,
    header: bundle_rs::Header,
    compressor: &'static str,
    last_chunk_size: usize,
    chunk_sizes: Vec<u32>,
}

fn info_command(path: PathBuf, json: bool) -> Result<()> {
    let bundle = Bundle::open_path(&path, &BundleConfig::default())
        .with_context(|| format!("opening {:?}", path))?;
    let header = bundle.header()?;

    let info = BundleInfo {
        compressor: header.compressor()?.name(),
        last_chunk_size: header.last_chunk_size(),
        chunk_sizes: bundle.chunk_sizes()?,
        header,
        path,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("path:              {:?}", info.path);
    println!("uncompressed size: {}", header.uncompressed_size);
    println!("compressed size:   {}", header.compressed_size);
    println!("compressor:        {} ({})", info.compressor, header.compressor_id);
    println!("chunk size:        {}", header.chunk_size);
    println!("chunk count:       {}", header.chunk_count);
    println!("last chunk size:   {}", info.last_chunk_size);
    if header.uncompressed_size > 0 {
        println!(
            "ratio:             {:.3}",
            header.compressed_size as f64 / header.uncompressed_size as f64
        );
    }
    for (index, size) in info.chunk_sizes.iter().enumerate() {
        println!("  chunk {:>6}: {} bytes", index, size);
    }

    Ok(())
}

fn extract_command(
    path: PathBuf,
    output: Option<PathBuf>,
    offset: Option<u64>,
    length: Option<usize>,
) -> Result<()> {
    let bundle = Bundle::open_path(&path, &BundleConfig::default())
        .with_context(|| format!("opening {:?}", path))?;

    let content = match (offset, length) {
        (Some(offset), Some(length)) => bundle.read_range(offset, length)?.into_vec(),
        (None, Some(length)) => bundle.read_range(0, length)?.into_vec(),
        _ => bundle.read_all()?,
    };

    match output {
        Some(out) => {
            std::fs::write(&out, &content).with_context(|| format!("writing {:?}", out))?;
            info!("Extracted {} bytes to {:?}", content.len(), out);
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&content)?;
            stdout.flush()?;
        }
    }

    Ok(())
}

fn pack_command(
    input: PathBuf,
    path: PathBuf,
    config: Option<PathBuf>,
    chunk_size: Option<u32>,
    compressor: Option<Compressor>,
    level: Option<i32>,
) -> Result<()> {
    let mut config = match config {
        Some(config_path) => BundleConfig::load(&config_path)
            .with_context(|| format!("loading config {:?}", config_path))?,
        None => BundleConfig::default(),
    };
    if let Some(chunk_size) = chunk_size {
        config.chunk_size = chunk_size;
    }
    if let Some(compressor) = compressor {
        config.compressor = compressor;
    }
    if let Some(level) = level {
        config.compression_level = level;
    }
    config.check()?;

    let content = std::fs::read(&input).with_context(|| format!("reading {:?}", input))?;

    let bundle = if path.exists() {
        info!("Replacing content of existing bundle {:?}", path);
        Bundle::open_path(&path, &config)?
    } else {
        Bundle::create_path(&path, &config)?
    };

    bundle.save(&content, config.compression_level)?;
    let header = bundle.header()?;
    bundle.dispose()?;

    info!(
        "Packed {} bytes into {} chunks ({} compressed)",
        header.uncompressed_size, header.chunk_count, header.compressed_size
    );
    Ok(())
}

fn verify_command(path: PathBuf) -> Result<()> {
    let bundle = Bundle::open_path(&path, &BundleConfig::default())
        .with_context(|| format!("opening {:?}", path))?;

    match bundle.verify() {
        Ok(()) => {
            println!("{:?}: ok ({} chunks)", path, bundle.chunk_count()?);
            Ok(())
        }
        Err(e) if e.is_corruption() => bail!("{:?}: {}", path, e),
        Err(e) => Err(e.into()),
    }
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Command::Info { path, json } => info_command(path, json),
        Command::Extract {
            path,
            output,
            offset,
            length,
        } => extract_command(path, output, offset, length),
        Command::Pack {
            input,
            path,
            config,
            chunk_size,
            compressor,
            level,
        } => pack_command(input, path, config, chunk_size, compressor, level),
        Command::Verify { path } => verify_command(path),
    }
}
