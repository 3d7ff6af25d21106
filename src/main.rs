//! ocr-orient - Orientation-correcting OCR preprocessing for identity documents
//!
//! CLI entry point

use clap::Parser;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use ocr_orient::{
    collect_image_files, create_progress_bar, create_spinner, ensure_dir_writable,
    format_duration, percentage, Cli, Commands, Config, DocumentPipeline, ExitCode, LoadError, OcrError,
    PipelineConfig, PipelineError, ProcessArgs, ProgressCallback, ToolBridge, ToolBridgeConfig,
};

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Process(args) => run_process(&args),
        Commands::Info => run_info(),
    };
    code.into()
}

/// Install the tracing subscriber; `RUST_LOG` wins over `-v`
fn init_tracing(verbose: u8, quiet: bool) {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ocr_orient={}", level)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

// ============ Progress Callback Implementation ============

/// Verbose progress callback for CLI output
struct VerboseProgress {
    verbose_level: u8,
}

impl VerboseProgress {
    fn new(verbose_level: u8) -> Self {
        Self { verbose_level }
    }
}

impl ProgressCallback for VerboseProgress {
    fn on_step_start(&self, step: &str) {
        if self.verbose_level > 0 {
            eprintln!("  {}", step);
        }
    }

    fn on_step_progress(&self, current: usize, total: usize) {
        if self.verbose_level > 0 {
            eprint!("\r    Progress: {}/{}", current, total);
            std::io::stderr().flush().ok();
        }
    }

    fn on_step_complete(&self, step: &str, message: &str) {
        if self.verbose_level > 0 {
            eprintln!("    {}: {}", step, message);
        }
    }

    fn on_debug(&self, message: &str) {
        if self.verbose_level > 1 {
            eprintln!("    [DEBUG] {}", message);
        }
    }
}

// ============ Process Command ============

fn run_process(args: &ProcessArgs) -> ExitCode {
    init_tracing(args.verbose, args.quiet);
    let start_time = Instant::now();

    if !args.input.exists() {
        eprintln!("Error: Input path does not exist: {}", args.input.display());
        return ExitCode::InputNotFound;
    }

    let files = match collect_image_files(&args.input) {
        Ok(files) if !files.is_empty() => files,
        Ok(_) => {
            eprintln!("Error: No supported images found in input path");
            return ExitCode::InputNotFound;
        }
        Err(e) => {
            eprintln!("Error: Cannot read input: {}", e);
            return ExitCode::InputNotFound;
        }
    };

    let file_config = match &args.config {
        Some(path) => match Config::load_from_path(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Error: Failed to load config file: {}", e);
                return ExitCode::InvalidArgs;
            }
        },
        None => Config::load().unwrap_or_else(|e| {
            warn!(error = %e, "ignoring unreadable config file");
            Config::default()
        }),
    };
    let config = file_config.merge_with_cli(&args.to_overrides());

    if args.dry_run {
        print_execution_plan(args, &files, &config);
        return ExitCode::Success;
    }

    if let Err(e) = rayon::ThreadPoolBuilder::new()
        .num_threads(args.thread_count())
        .build_global()
    {
        warn!(error = %e, "using existing thread pool");
    }

    if let Err(e) = ensure_dir_writable(&args.output) {
        eprintln!("Error: {}", e);
        return ExitCode::OutputError;
    }

    let pipeline = DocumentPipeline::from_config(config);

    let code = if files.len() == 1 {
        process_single(&pipeline, &files[0], args)
    } else {
        process_batch(&pipeline, &files, args)
    };

    if !args.quiet {
        eprintln!("Total time: {}", format_duration(start_time.elapsed()));
    }
    code
}

fn process_single(pipeline: &DocumentPipeline, input: &Path, args: &ProcessArgs) -> ExitCode {
    let progress = VerboseProgress::new(args.verbose);
    let spinner = (!args.quiet && args.verbose == 0)
        .then(|| create_spinner(&format!("Processing {}", input.display())));

    let result = pipeline.process_with_progress(input, &args.output, &progress);
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    match result {
        Ok(result) => {
            let d = &result.diagnostics;
            if !args.quiet {
                eprintln!("Detection: {}", d.detection.describe());
                eprintln!(
                    "Rotation: {}",
                    if d.rotated {
                        format!("{} degrees", d.decision.applied_angle)
                    } else {
                        format!("none ({})", d.decision.reason.describe())
                    }
                );
                if let Some(warning) = &d.verification {
                    eprintln!("Warning: {}", warning);
                }
                if let Some(report) = &d.artifacts.report {
                    eprintln!("Report: {}", report.display());
                }
            }
            if let Some(text) = result.final_text() {
                println!("{}", text.trim_end());
            }
            ExitCode::Success
        }
        Err(e) => {
            eprintln!("Error processing {}: {}", input.display(), e);
            exit_code_for(&e)
        }
    }
}

fn process_batch(pipeline: &DocumentPipeline, files: &[PathBuf], args: &ProcessArgs) -> ExitCode {
    let pb = (!args.quiet).then(|| create_progress_bar(files.len() as u64));
    let on_progress = |done: usize, _total: usize| {
        if let Some(pb) = &pb {
            pb.set_position(done as u64);
        }
    };

    let results = pipeline.process_batch(files, &args.output, Some(&on_progress));
    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }

    let mut rotated = 0usize;
    let mut failed = 0usize;
    for (path, result) in files.iter().zip(&results) {
        match result {
            Ok(diagnostics) => {
                if diagnostics.rotated {
                    rotated += 1;
                }
                if let Some(warning) = &diagnostics.verification {
                    eprintln!("Warning ({}): {}", path.display(), warning);
                }
            }
            Err(e) => {
                eprintln!("Error processing {}: {}", path.display(), e);
                failed += 1;
            }
        }
    }

    if !args.quiet {
        eprintln!();
        eprintln!("=== Summary ===");
        eprintln!("Files: {}", files.len());
        eprintln!("Succeeded: {}", files.len() - failed);
        eprintln!("Rotated: {} ({:.1}%)", rotated, percentage(rotated, files.len()));
        eprintln!("Failed: {}", failed);
    }

    if failed > 0 {
        ExitCode::ProcessingError
    } else {
        ExitCode::Success
    }
}

/// Map a single-document failure to a process exit code
fn exit_code_for(error: &PipelineError) -> ExitCode {
    match error {
        PipelineError::Load(LoadError::NotFound(_)) => ExitCode::InputNotFound,
        PipelineError::Load(LoadError::UnsupportedFormat(_))
        | PipelineError::Load(LoadError::UnreadableImage(_)) => ExitCode::UnsupportedInput,
        PipelineError::Load(LoadError::IoError(_)) => ExitCode::GeneralError,
        PipelineError::Ocr(OcrError::EncodeError(_)) => ExitCode::ProcessingError,
        PipelineError::Ocr(_) => ExitCode::ExternalToolError,
        PipelineError::Io(_) => ExitCode::OutputError,
    }
}

/// Print execution plan for dry-run mode
fn print_execution_plan(args: &ProcessArgs, files: &[PathBuf], config: &PipelineConfig) {
    let on_off = |flag: bool| if flag { "ENABLED" } else { "DISABLED" };

    println!("=== Dry Run - Execution Plan ===");
    println!();
    println!("Input: {}", args.input.display());
    println!("Output: {}", args.output.display());
    println!("Files to process: {}", files.len());
    println!();
    println!("Pipeline Configuration:");
    println!("  1. Load + Quality Analysis");
    println!("  2. Orientation Metadata (EXIF)");
    println!(
        "  3. Orientation Detection ({}, timeout {}s)",
        config.tesseract_path.display(),
        config.osd_timeout_secs
    );
    println!(
        "  4. Rotation (confidence > {})",
        config.confidence_threshold
    );
    println!(
        "  5. Grayscale Normalization{}",
        if config.invert { " (inverted)" } else { "" }
    );
    if config.ocr_enabled {
        println!("  6. OCR (language: {}): ENABLED", config.ocr_language);
    } else {
        println!("  6. OCR: DISABLED");
    }
    if config.enhancement_enabled {
        println!(
            "  7. Text Enhancement ({}, temperature {}): ENABLED",
            config.enhancement_model, config.enhancement_temperature
        );
    } else {
        println!("  7. Text Enhancement: DISABLED");
    }
    println!();
    println!("Output Options:");
    println!("  Snapshots: {}", on_off(config.save_snapshots));
    println!("  Report: {}", on_off(config.write_report));
    println!("  Compare original: {}", on_off(config.compare_original));
    println!("  Threads: {}", args.thread_count());
    println!();
    println!("Files:");
    for (i, file) in files.iter().enumerate() {
        println!("  {}. {}", i + 1, file.display());
    }
}

// ============ Info Command ============

fn run_info() -> ExitCode {
    println!("ocr-orient v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("System Information:");
    println!("  Platform: {}", std::env::consts::OS);
    println!("  Arch: {}", std::env::consts::ARCH);
    println!("  CPUs: {}", num_cpus::get());

    println!();
    println!("OCR Tools:");
    let config = Config::load().unwrap_or_default().to_pipeline_config();
    let bridge = ToolBridge::new(
        ToolBridgeConfig::builder()
            .program(config.tesseract_path.clone())
            .build(),
    );
    match which::which(&config.tesseract_path) {
        Ok(path) => match bridge.version() {
            Some(version) => println!("  Tesseract: {} ({})", version, path.display()),
            None => println!("  Tesseract: {} (found)", path.display()),
        },
        Err(_) => println!("  Tesseract: Not found"),
    }

    println!();
    println!("Text Enhancement:");
    let key_set = std::env::var("GROQ_API_KEY")
        .map(|k| !k.trim().is_empty())
        .unwrap_or(false);
    println!("  GROQ_API_KEY: {}", if key_set { "set" } else { "not set" });
    println!("  Model: {}", config.enhancement_model);

    println!();
    println!("Config File Locations:");
    for path in Config::search_paths() {
        let marker = if path.exists() { " (found)" } else { "" };
        println!("  {}{}", path.display(), marker);
    }

    ExitCode::Success
}
