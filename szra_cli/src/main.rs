use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use szra_codecs::{codec_by_id, codec_by_name};
use szra_core::{BackendKind, ContainerInfo, Preamble, Reader, SzConfig, Writer};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "szra",
    about = "Error-bounded lossy compression of 3D f32 volumes with random-access region decompression",
    version
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a raw little-endian f32 volume
    Compress {
        /// Source file of r1*r2*r3 little-endian f32 values ("-" reads stdin)
        input: PathBuf,
        /// Destination SZRA container
        output: PathBuf,
        /// Extents, slowest axis first
        #[arg(long, num_args = 3, value_names = ["R1", "R2", "R3"], required = true)]
        dims: Vec<usize>,
        /// Absolute error bound
        #[arg(short, long)]
        precision: f64,
        /// Post-pass codec: gzip | zstd | lz4 | passthrough
        #[arg(short, long, default_value = "gzip")]
        codec: String,
        /// Zstd compression level (1–22, only used with --codec zstd)
        #[arg(long, default_value_t = 3)]
        zstd_level: i32,
        /// Run the fit/sampling pass on a thread pool (0 = one thread per core)
        #[arg(long)]
        threads: Option<usize>,
        /// JSON file holding a full configuration; flags override it
        #[arg(long)]
        config: Option<PathBuf>,
        /// Block edge length
        #[arg(short, long)]
        block_size: Option<usize>,
        /// Use the maximum interval count instead of sampling for one
        #[arg(long)]
        no_optimize: bool,
        /// Do not store a payload checksum
        #[arg(long)]
        no_checksum: bool,
    },
    /// Reconstruct the whole volume as raw little-endian f32
    Decompress {
        /// Source SZRA container
        input: PathBuf,
        /// Destination file ("-" writes to stdout)
        output: PathBuf,
        #[arg(long, num_args = 3, value_names = ["R1", "R2", "R3"], required = true)]
        dims: Vec<usize>,
    },
    /// Reconstruct only the box [start, end) of the volume
    Extract {
        input: PathBuf,
        output: PathBuf,
        #[arg(long, num_args = 3, value_names = ["R1", "R2", "R3"], required = true)]
        dims: Vec<usize>,
        /// Inclusive lower corner
        #[arg(long, num_args = 3, value_names = ["S1", "S2", "S3"], required = true)]
        start: Vec<usize>,
        /// Exclusive upper corner
        #[arg(long, num_args = 3, value_names = ["E1", "E2", "E3"], required = true)]
        end: Vec<usize>,
    },
    /// Print container metadata; block statistics need --dims
    Inspect {
        file: PathBuf,
        #[arg(long, num_args = 3, value_names = ["R1", "R2", "R3"])]
        dims: Option<Vec<usize>>,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Benchmark random sub-box decompressions
    Bench {
        file: PathBuf,
        #[arg(long, num_args = 3, value_names = ["R1", "R2", "R3"], required = true)]
        dims: Vec<usize>,
        /// Number of random regions to decode
        #[arg(short = 'n', long, default_value_t = 1000)]
        count: u64,
        /// Edge length of each region
        #[arg(short, long, default_value_t = 8)]
        edge: usize,
        /// Fixed random seed for reproducibility
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => anyhow::bail!("unknown log level '{}'", other),
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("installing tracing subscriber")
}

fn read_input(path: &Path) -> anyhow::Result<Vec<u8>> {
    if path.to_str() == Some("-") {
        let mut buf = Vec::new();
        io::stdin().lock().read_to_end(&mut buf)?;
        Ok(buf)
    } else {
        std::fs::read(path).with_context(|| format!("reading {:?}", path))
    }
}

fn read_f32_le(path: &Path) -> anyhow::Result<Vec<f32>> {
    let raw = read_input(path)?;
    if raw.len() % 4 != 0 {
        anyhow::bail!("{:?} holds {} bytes, not a whole number of f32 values", path, raw.len());
    }
    Ok(raw
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

fn write_f32_le(path: &Path, values: &[f32]) -> anyhow::Result<()> {
    let dst: Box<dyn Write> = if path.to_str() == Some("-") {
        Box::new(io::stdout())
    } else {
        Box::new(File::create(path).with_context(|| format!("creating output file {:?}", path))?)
    };
    let mut dst = BufWriter::new(dst);
    for v in values {
        dst.write_all(&v.to_le_bytes())?;
    }
    dst.flush()?;
    Ok(())
}

/// Read a container and open it with the codec named in its preamble.
fn open_container(path: &Path) -> anyhow::Result<Reader> {
    let bytes = read_input(path)?;
    let codec_id = Preamble::from_bytes(&bytes)
        .with_context(|| format!("{:?} is not an SZRA container", path))?
        .codec_id;
    let codec = codec_by_id(codec_id)?;
    Reader::open(&bytes, Some(codec)).with_context(|| format!("opening {:?}", path))
}

fn load_config(path: Option<&Path>) -> anyhow::Result<SzConfig> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading config {:?}", path))?;
            serde_json::from_str(&text).with_context(|| format!("parsing config {:?}", path))
        }
        None => Ok(SzConfig::default()),
    }
}

// ── Subcommand implementations ─────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
fn run_compress(
    input: PathBuf,
    output: PathBuf,
    dims: &[usize],
    precision: f64,
    codec_name: &str,
    zstd_level: i32,
    threads: Option<usize>,
    config: Option<PathBuf>,
    block_size: Option<usize>,
    no_optimize: bool,
    no_checksum: bool,
) -> anyhow::Result<()> {
    let mut cfg = load_config(config.as_deref())?;
    if let Some(b) = block_size {
        cfg.block_size = b;
    }
    if let Some(threads) = threads {
        cfg.backend = BackendKind::Parallel { threads };
    }
    if no_optimize {
        cfg.optimize_intervals = false;
    }
    if no_checksum {
        cfg.checksum = false;
    }

    let codec = codec_by_name(codec_name, zstd_level)?;
    let codec_display = codec.name();
    let writer = Writer::new(cfg)?.with_codec(codec);

    let data = read_f32_le(&input)?;
    let raw_bytes = data.len() as u64 * 4;
    let t0 = Instant::now();
    let bytes = writer.compress(&data, [dims[0], dims[1], dims[2]], precision)?;
    let elapsed = t0.elapsed();
    std::fs::write(&output, &bytes).with_context(|| format!("writing {:?}", output))?;
    info!(output = ?output, bytes = bytes.len(), "container written");

    eprintln!("  codec       : {}", codec_display);
    eprintln!("  backend     : {}", writer.backend_name());
    eprintln!("  dims        : {} x {} x {}", dims[0], dims[1], dims[2]);
    eprintln!("  precision   : {:e}", precision);
    eprintln!("  raw size    : {}", human_bytes(raw_bytes));
    eprintln!("  compressed  : {}", human_bytes(bytes.len() as u64));
    eprintln!("  ratio       : {:.2}x", raw_bytes as f64 / bytes.len() as f64);
    eprintln!(
        "  throughput  : {}/s",
        human_bytes((raw_bytes as f64 / elapsed.as_secs_f64()) as u64)
    );
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn run_decompress(input: PathBuf, output: PathBuf, dims: &[usize]) -> anyhow::Result<()> {
    let mut reader = open_container(&input)?;
    let t0 = Instant::now();
    let values = reader.decompress(dims)?;
    let elapsed = t0.elapsed();
    write_f32_le(&output, &values)?;

    let raw = values.len() as u64 * 4;
    eprintln!("  elements    : {}", values.len());
    eprintln!("  raw size    : {}", human_bytes(raw));
    eprintln!(
        "  throughput  : {}/s",
        human_bytes((raw as f64 / elapsed.as_secs_f64()) as u64)
    );
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn run_extract(
    input: PathBuf,
    output: PathBuf,
    dims: &[usize],
    start: &[usize],
    end: &[usize],
) -> anyhow::Result<()> {
    let mut reader = open_container(&input)?;
    let t0 = Instant::now();
    let values = reader.decompress_region(dims, start, end)?;
    let elapsed = t0.elapsed();
    write_f32_le(&output, &values)?;

    eprintln!("  region      : {:?} .. {:?}", start, end);
    eprintln!("  elements    : {}", values.len());
    eprintln!("  decoded in  : {:.3}ms", elapsed.as_secs_f64() * 1000.0);
    Ok(())
}

fn print_info(file: &Path, info: &ContainerInfo) {
    println!("=== SZRA container: {:?} ===", file);
    println!();
    println!("  format version : {}", info.version);
    println!("  codec          : {} (id={})", info.codec, info.codec_id);
    println!("  random access  : {}", info.random_access);
    println!("  checksum       : {}", info.checksum);
    println!("  stored         : {}", human_bytes(info.stored_bytes as u64));
    println!("  payload        : {}", human_bytes(info.payload_bytes as u64));
    println!("  elements       : {}", info.num_elements);
    println!(
        "  ratio          : {:.2}x",
        (info.num_elements * 4) as f64 / info.stored_bytes as f64
    );
    println!("  block size     : {}", info.block_size);
    println!("  precision      : {:e}", info.precision);
    println!("  intervals      : {}", info.intervals);
    match info.mean {
        Some(mean) => println!("  mean shortcut  : {}", mean),
        None => println!("  mean shortcut  : off"),
    }
    println!("  prefix tree    : {} nodes, {}", info.tree_nodes, human_bytes(info.tree_bytes as u64));

    if let Some(b) = &info.blocks {
        println!();
        println!("  dims           : {} x {} x {}", b.dims[0], b.dims[1], b.dims[2]);
        println!("  blocks         : {}", b.num_blocks);
        println!(
            "  regression     : {} ({:.1}%)",
            b.regression_blocks,
            100.0 * b.regression_blocks as f64 / b.num_blocks as f64
        );
        println!("  lorenzo        : {}", b.lorenzo_blocks);
        println!("  outliers       : {}", b.total_outliers);
        println!("  coefficients   : {}", human_bytes(b.coefficient_bytes as u64));
        println!("  outlier values : {}", human_bytes(b.outlier_bytes as u64));
        println!("  block streams  : {}", human_bytes(b.stream_bytes as u64));
    }
}

fn run_inspect(file: PathBuf, dims: Option<Vec<usize>>, json: bool) -> anyhow::Result<()> {
    let mut reader = open_container(&file)?;
    let info = reader.info(dims.as_deref())?;
    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        print_info(&file, &info);
    }
    Ok(())
}

fn run_bench(file: PathBuf, dims: &[usize], count: u64, edge: usize, seed: u64) -> anyhow::Result<()> {
    if count == 0 || edge == 0 {
        anyhow::bail!("--count and --edge must be non-zero");
    }
    let mut reader = open_container(&file)?;
    // Parse the block layout once, outside the timed loop.
    reader.decompress_region(dims, &[0, 0, 0], &[1, 1, 1])?;

    let edges: Vec<usize> = dims.iter().map(|&d| edge.min(d)).collect();
    let mut rng = seed;
    let mut next = |limit: usize| {
        rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((rng >> 33) % limit as u64) as usize
    };
    let regions: Vec<([usize; 3], [usize; 3])> = (0..count)
        .map(|_| {
            let mut start = [0usize; 3];
            let mut end = [0usize; 3];
            for axis in 0..3 {
                start[axis] = next(dims[axis] - edges[axis] + 1);
                end[axis] = start[axis] + edges[axis];
            }
            (start, end)
        })
        .collect();

    eprintln!(
        "benchmarking {} random {}x{}x{} regions...",
        count, edges[0], edges[1], edges[2]
    );

    let t0 = Instant::now();
    let mut total_raw = 0u64;
    let mut latencies_us: Vec<u64> = Vec::with_capacity(count as usize);
    for (start, end) in &regions {
        let t = Instant::now();
        let values = reader.decompress_region(dims, start, end)?;
        latencies_us.push(t.elapsed().as_micros() as u64);
        total_raw += values.len() as u64 * 4;
    }
    let elapsed = t0.elapsed();
    latencies_us.sort_unstable();

    let n = latencies_us.len();
    let pct = |q: f64| latencies_us[((n as f64 * q) as usize).min(n - 1)];

    println!();
    println!("=== Random Region Access Benchmark ===");
    println!("  regions     : {}", count);
    println!("  total raw   : {}", human_bytes(total_raw));
    println!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    println!(
        "  throughput  : {}/s",
        human_bytes((total_raw as f64 / elapsed.as_secs_f64()) as u64)
    );
    println!("  latency:");
    println!("    min  : {} µs", latencies_us[0]);
    println!("    p50  : {} µs", pct(0.50));
    println!("    p95  : {} µs", pct(0.95));
    println!("    p99  : {} µs", pct(0.99));
    println!("    max  : {} µs", latencies_us[n - 1]);
    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;
    match cli.command {
        Commands::Compress {
            input,
            output,
            dims,
            precision,
            codec,
            zstd_level,
            threads,
            config,
            block_size,
            no_optimize,
            no_checksum,
        } => run_compress(
            input,
            output,
            &dims,
            precision,
            &codec,
            zstd_level,
            threads,
            config,
            block_size,
            no_optimize,
            no_checksum,
        ),
        Commands::Decompress { input, output, dims } => run_decompress(input, output, &dims),
        Commands::Extract {
            input,
            output,
            dims,
            start,
            end,
        } => run_extract(input, output, &dims, &start, &end),
        Commands::Inspect { file, dims, json } => run_inspect(file, dims, json),
        Commands::Bench {
            file,
            dims,
            count,
            edge,
            seed,
        } => run_bench(file, &dims, count, edge, seed),
    }
}
