//! CLI interface module
//!
//! Provides command-line interface using clap derive macros.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

use crate::config::CliOverrides;

/// Exit codes for the CLI
///
/// These codes follow standard Unix conventions and provide
/// specific error categories for scripting and automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    InvalidArgs = 2,
    /// Input file or directory missing
    InputNotFound = 3,
    /// Output directory not writable
    OutputError = 4,
    /// At least one document failed
    ProcessingError = 5,
    /// Input is not an accepted image
    UnsupportedInput = 6,
    /// Tesseract missing or failing
    ExternalToolError = 7,
}

impl ExitCode {
    /// Convert to process exit code
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Get human-readable description
    pub fn description(self) -> &'static str {
        match self {
            ExitCode::Success => "Success",
            ExitCode::GeneralError => "General error",
            ExitCode::InvalidArgs => "Invalid arguments",
            ExitCode::InputNotFound => "Input file or directory not found",
            ExitCode::OutputError => "Output error (permission denied, disk full, etc.)",
            ExitCode::ProcessingError => "Processing error",
            ExitCode::UnsupportedInput => "Unsupported or unreadable image",
            ExitCode::ExternalToolError => "External tool error (Tesseract)",
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.code()
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code.code() as u8)
    }
}

/// Orientation-correcting OCR preprocessing for identity documents
#[derive(Parser, Debug)]
#[command(name = "ocr-orient")]
#[command(version)]
#[command(about = "Orientation-correcting OCR preprocessing for identity documents", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Correct orientation, normalize and OCR document images
    Process(ProcessArgs),
    /// Show system information
    Info,
}

/// Arguments for the process command
#[derive(clap::Args, Debug)]
pub struct ProcessArgs {
    /// Input image file or directory
    pub input: PathBuf,

    /// Output directory for snapshots and reports
    #[arg(short, long, default_value = "./output")]
    pub output: PathBuf,

    /// Configuration file (default: ./ocr-orient.toml, then user config dir)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Skip OCR (orientation and normalization only)
    #[arg(long = "no-ocr")]
    pub no_ocr: bool,

    /// Enable LLM text enhancement (requires GROQ_API_KEY)
    #[arg(long)]
    pub enhance: bool,

    /// OCR language, e.g. eng or eng+deu
    #[arg(short, long)]
    pub lang: Option<String>,

    /// Minimum orientation confidence (exclusive) required to rotate
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Invert grayscale output (light text on dark background)
    #[arg(long)]
    pub invert: bool,

    /// Also OCR the unrotated image and report the difference
    #[arg(long)]
    pub compare_original: bool,

    /// Do not write image snapshots
    #[arg(long = "no-snapshots")]
    pub no_snapshots: bool,

    /// Do not write markdown reports
    #[arg(long = "no-report")]
    pub no_report: bool,

    /// Number of parallel threads
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Memory budget for batch chunking in MB (0 = auto)
    #[arg(long)]
    pub max_memory: Option<usize>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress progress output
    #[arg(short, long)]
    pub quiet: bool,

    /// Show execution plan without processing
    #[arg(long)]
    pub dry_run: bool,
}

impl ProcessArgs {
    /// Get thread count (default to available CPUs)
    pub fn thread_count(&self) -> usize {
        self.threads.unwrap_or_else(num_cpus::get)
    }

    /// Flags that override file and environment settings
    ///
    /// Switch flags only override when given.
    pub fn to_overrides(&self) -> CliOverrides {
        CliOverrides {
            ocr: self.no_ocr.then_some(false),
            language: self.lang.clone(),
            enhance: self.enhance.then_some(true),
            threshold: self.threshold,
            invert: self.invert.then_some(true),
            save_snapshots: self.no_snapshots.then_some(false),
            write_report: self.no_report.then_some(false),
            compare_original: self.compare_original.then_some(true),
            threads: self.threads,
            max_memory_mb: self.max_memory,
        }
    }
}

/// Create a styled progress bar for file processing
pub fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb
}

/// Create a spinner for indeterminate progress
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_help_display() {
        let mut cmd = Cli::command();
        let help = cmd.render_help().to_string();
        assert!(help.contains("ocr-orient"));
        assert!(help.contains("process"));
        assert!(help.contains("info"));
    }

    #[test]
    fn test_version_display() {
        let cmd = Cli::command();
        let version = cmd.get_version().unwrap_or("unknown");
        assert!(!version.is_empty());
    }

    #[test]
    fn test_missing_input_error() {
        let result = Cli::try_parse_from(["ocr-orient", "process"]);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("required"));
    }

    #[test]
    fn test_option_parsing() {
        let cli = Cli::try_parse_from([
            "ocr-orient",
            "process",
            "licence.jpg",
            "-o",
            "out",
            "--no-ocr",
            "--enhance",
            "--lang",
            "deu",
            "--threshold",
            "1.5",
            "--invert",
            "--no-snapshots",
            "-t",
            "2",
            "-vvv",
        ])
        .unwrap();

        let Commands::Process(args) = cli.command else {
            panic!("Expected Process command");
        };
        assert_eq!(args.output, PathBuf::from("out"));
        assert!(args.no_ocr);
        assert!(args.enhance);
        assert_eq!(args.lang.as_deref(), Some("deu"));
        assert_eq!(args.threshold, Some(1.5));
        assert!(args.invert);
        assert!(args.no_snapshots);
        assert!(!args.no_report);
        assert_eq!(args.thread_count(), 2);
        assert_eq!(args.verbose, 3);
    }

    #[test]
    fn test_default_values() {
        let cli = Cli::try_parse_from(["ocr-orient", "process", "card.png"]).unwrap();

        let Commands::Process(args) = cli.command else {
            panic!("Expected Process command");
        };
        assert_eq!(args.output, PathBuf::from("./output"));
        assert!(args.config.is_none());
        assert!(!args.no_ocr);
        assert!(!args.enhance);
        assert!(args.threshold.is_none());
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert!(!args.dry_run);
    }

    #[test]
    fn test_overrides_only_set_flags() {
        let cli = Cli::try_parse_from(["ocr-orient", "process", "card.png"]).unwrap();
        let Commands::Process(args) = cli.command else {
            panic!("Expected Process command");
        };
        let overrides = args.to_overrides();
        assert_eq!(overrides.ocr, None);
        assert_eq!(overrides.enhance, None);
        assert_eq!(overrides.invert, None);
        assert_eq!(overrides.save_snapshots, None);

        let cli = Cli::try_parse_from([
            "ocr-orient",
            "process",
            "card.png",
            "--no-ocr",
            "--no-report",
            "--compare-original",
        ])
        .unwrap();
        let Commands::Process(args) = cli.command else {
            panic!("Expected Process command");
        };
        let overrides = args.to_overrides();
        assert_eq!(overrides.ocr, Some(false));
        assert_eq!(overrides.write_report, Some(false));
        assert_eq!(overrides.compare_original, Some(true));
    }

    #[test]
    fn test_info_command() {
        let cli = Cli::try_parse_from(["ocr-orient", "info"]).unwrap();
        assert!(matches!(cli.command, Commands::Info));
    }

    #[test]
    fn test_progress_bar_display() {
        let pb = create_progress_bar(100);
        assert_eq!(pb.length(), Some(100));
        pb.set_position(50);
        assert_eq!(pb.position(), 50);
        pb.finish_with_message("done");
    }

    #[test]
    fn test_spinner_creation() {
        let spinner = create_spinner("Processing...");
        assert_eq!(spinner.message(), "Processing...");
        spinner.finish_with_message("Complete");
    }

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success.code(), 0);
        assert_eq!(ExitCode::GeneralError.code(), 1);
        assert_eq!(ExitCode::InvalidArgs.code(), 2);
        assert_eq!(ExitCode::InputNotFound.code(), 3);
        assert_eq!(ExitCode::OutputError.code(), 4);
        assert_eq!(ExitCode::ProcessingError.code(), 5);
        assert_eq!(ExitCode::UnsupportedInput.code(), 6);
        assert_eq!(ExitCode::ExternalToolError.code(), 7);
    }

    #[test]
    fn test_exit_code_descriptions() {
        assert_eq!(ExitCode::Success.description(), "Success");
        assert!(ExitCode::ExternalToolError.description().contains("Tesseract"));
        assert!(!ExitCode::UnsupportedInput.description().is_empty());
    }

    #[test]
    fn test_exit_code_into_i32() {
        let code: i32 = ExitCode::ExternalToolError.into();
        assert_eq!(code, 7);
    }
}
