use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, ValueEnum};

use pixmend::{
    default_output_path, DetectionMode, Key, Method, Pipeline, ProcessOptions, ProcessResult,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Detect watermark regions, then repair and smooth them
    Watermark,
    /// Detect text regions, then repair and smooth them
    Text,
    /// Single-pass filter for translucent and extreme pixels
    QuickWatermark,
    /// Single-pass filter for high-contrast dark/light strokes
    QuickText,
    /// Make a near-white background transparent (writes PNG)
    ChromaWhite,
    /// Make a green-screen background transparent (writes PNG)
    ChromaGreen,
}

#[derive(Parser)]
#[command(
    name = "pixmend",
    about = "Detect and repair watermark and text regions in images",
    version,
    after_help = "Simple usage: pixmend <image>  (detect and repair, writes {name}_cleaned.{ext})\n\n\
                  NOTE: Repairs are heuristic. Use --preview to inspect the detected\n\
                  region before committing to a repair."
)]
struct Cli {
    /// Input image file or directory
    input: String,

    /// Output file or directory (default: {name}_cleaned.{ext})
    #[arg(short, long)]
    output: Option<String>,

    /// What to remove
    #[arg(short, long, value_enum, default_value_t = Mode::Watermark)]
    mode: Mode,

    /// Chroma key tolerance (0-255), used by the chroma modes
    #[arg(short, long, default_value_t = 30)]
    threshold: u8,

    /// Write a highlighted preview of the detected region instead of repairing
    #[arg(short, long)]
    preview: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all non-error output
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn method(&self) -> Method {
        match self.mode {
            Mode::Watermark => Method::Repair(DetectionMode::Watermark),
            Mode::Text => Method::Repair(DetectionMode::Text),
            Mode::QuickWatermark => Method::QuickWatermark,
            Mode::QuickText => Method::QuickText,
            Mode::ChromaWhite => Method::Chroma {
                key: Key::White,
                threshold: self.threshold,
            },
            Mode::ChromaGreen => Method::Chroma {
                key: Key::Green,
                threshold: self.threshold,
            },
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let opts = ProcessOptions {
        method: cli.method(),
        preview: cli.preview,
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    if opts.preview && !matches!(opts.method, Method::Repair(_)) {
        eprintln!("Error: --preview is only available for the watermark and text modes");
        process::exit(1);
    }

    let input_path = Path::new(&cli.input);
    if !input_path.exists() {
        eprintln!("Error: Input path does not exist: {}", cli.input);
        process::exit(1);
    }

    if !opts.quiet {
        if opts.preview {
            eprintln!("Preview mode: marking detected regions, no repair");
        } else {
            eprintln!("Mode: {}", opts.method.label());
        }
        eprintln!();
    }

    let pipeline = Pipeline::new(opts);

    let results = if input_path.is_dir() {
        let output_dir = if let Some(o) = &cli.output {
            PathBuf::from(o)
        } else {
            eprintln!("Error: Output directory is required for batch processing");
            eprintln!("Usage: pixmend <input_dir> -o <output_dir>");
            process::exit(1);
        };
        pipeline.process_directory(input_path, &output_dir)
    } else {
        let output_path = match &cli.output {
            Some(o) => PathBuf::from(o),
            None => default_output_path(input_path, pipeline.options()),
        };
        vec![pipeline.process_file(input_path, &output_path)]
    };

    let opts = pipeline.options();
    let mut success_count = 0u32;
    let mut skip_count = 0u32;
    let mut fail_count = 0u32;

    for r in &results {
        print_result(r, opts);
        if r.skipped {
            skip_count += 1;
        } else if r.success {
            success_count += 1;
        } else {
            fail_count += 1;
        }
    }

    if results.len() > 1 && !opts.quiet {
        eprintln!();
        eprint!("[Summary] Processed: {success_count}");
        if skip_count > 0 {
            eprint!(", Skipped: {skip_count}");
        }
        if fail_count > 0 {
            eprint!(", Failed: {fail_count}");
        }
        eprintln!(" (Total: {})", results.len());
    }

    if fail_count > 0 {
        process::exit(1);
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "warn"
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn print_result(result: &ProcessResult, opts: &ProcessOptions) {
    if opts.quiet && result.success {
        return;
    }

    let filename = result.path.file_name().map_or_else(
        || result.path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    );

    if result.skipped {
        if !opts.quiet {
            eprintln!("[SKIP] {filename}: {}", result.message);
        }
    } else if result.success {
        if !opts.quiet {
            if result.affected > 0 {
                eprintln!("[OK] {filename} ({} pixels)", result.affected);
            } else {
                eprintln!("[OK] {filename}");
            }
        }
    } else {
        eprintln!("[FAIL] {filename}: {}", result.message);
    }

    if opts.verbose && !result.message.is_empty() {
        eprintln!("  -> {}", result.message);
    }
}
