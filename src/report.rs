//! Markdown run report
//!
//! One report per document, written next to the image snapshots as
//! `<stem>_report.md`.

use crate::pipeline::{
    DetectionOutcome, EnhancementOutcome, FallbackOutcome, PipelineConfig, PipelineResult,
};
use crate::util::format_file_size;
use chrono::Local;
use std::fmt::Write;

/// Render the report for one processed document
pub fn render(result: &PipelineResult, config: &PipelineConfig) -> String {
    let mut md = String::new();
    let d = &result.diagnostics;
    let desc = &d.descriptor;

    let _ = writeln!(md, "# OCR Report: {}\n", d.source_name);
    let _ = writeln!(
        md,
        "**Generated:** {}\n",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    );

    // Source
    let _ = writeln!(md, "## Image Information\n");
    let _ = writeln!(md, "- **Image File:** {}", d.source_name);
    let _ = writeln!(
        md,
        "- **File Size:** {} bytes ({})",
        desc.file_size,
        format_file_size(desc.file_size)
    );
    let _ = writeln!(md, "- **Format:** {} ({})", desc.extension, desc.mime_type);
    let _ = writeln!(md, "- **Dimensions:** {}x{}", desc.width, desc.height);
    let _ = writeln!(md, "- **Mode:** {}", desc.color_mode);
    if desc.height > 0 {
        let _ = writeln!(
            md,
            "- **Aspect Ratio:** {:.2}",
            desc.width as f64 / desc.height as f64
        );
    }
    let _ = writeln!(md);

    // Configuration
    let _ = writeln!(md, "## Configuration\n");
    let _ = writeln!(md, "- **OCR Language:** {}", config.ocr_language);
    let _ = writeln!(
        md,
        "- **Confidence Threshold:** {}",
        config.confidence_threshold
    );
    let _ = writeln!(md, "- **Invert:** {}", yes_no(config.invert));
    let _ = writeln!(
        md,
        "- **LLM Enhancement:** {}",
        if config.enhancement_enabled {
            format!(
                "Enabled ({}, temperature {})",
                config.enhancement_model, config.enhancement_temperature
            )
        } else {
            "Disabled".to_string()
        }
    );
    let _ = writeln!(md);

    // Preprocessing
    let q = &d.quality;
    let _ = writeln!(md, "## Preprocessing\n");
    let _ = writeln!(
        md,
        "- **Quality:** mean {:.1}, std dev {:.1}, range {}-{} (dynamic range {}), {}",
        q.mean_brightness,
        q.std_dev,
        q.min,
        q.max,
        q.dynamic_range(),
        q.exposure.label()
    );
    let _ = writeln!(
        md,
        "- **Exposure Fractions:** bright {:.1}%, dark {:.1}%",
        q.bright_fraction * 100.0,
        q.dark_fraction * 100.0
    );
    let _ = writeln!(md, "- **Orientation Metadata:** {}", d.metadata.describe());
    let _ = writeln!(
        md,
        "- **Orientation Detection ({}):** {}",
        d.detector,
        d.detection.describe()
    );
    if let DetectionOutcome::Detected(e) = &d.detection {
        let _ = writeln!(md, "- **Detector Output:**");
        let _ = writeln!(md, "  - Page number: {}", e.page_number);
        let _ = writeln!(md, "  - Orientation in degrees: {}", e.orientation_degrees);
        let _ = writeln!(md, "  - Rotate: {}", e.rotate_degrees);
        let _ = writeln!(
            md,
            "  - Orientation confidence: {}",
            optional_value(e.orientation_confidence)
        );
        let _ = writeln!(
            md,
            "  - Script: {}",
            e.script.as_deref().unwrap_or("n/a")
        );
        let _ = writeln!(
            md,
            "  - Script confidence: {}",
            optional_value(e.script_confidence)
        );
    }
    let _ = writeln!(md, "- **Decision:** {}", d.decision.reason.describe());
    let _ = writeln!(
        md,
        "- **Rotation:** {}",
        if d.rotated {
            format!("{} degrees", d.decision.applied_angle)
        } else {
            "none".to_string()
        }
    );
    if let Some(warning) = &d.verification {
        let _ = writeln!(md, "- **Verification Warning:** {}", warning);
    }
    let _ = writeln!(
        md,
        "- **Final Dimensions:** {}x{}",
        d.final_dimensions.0, d.final_dimensions.1
    );
    let _ = writeln!(md, "- **Grayscale:** {}", d.normalize.describe());
    if let Some(fallback) = &d.fallback {
        let _ = writeln!(md, "- **Low-text Fallback:** {}", describe_fallback(fallback));
    }
    let _ = writeln!(md);

    // Artifacts
    let _ = writeln!(md, "## Generated Image Files\n");
    let images = [
        ("Preprocessed", &d.artifacts.preprocessed),
        ("Final", &d.artifacts.final_image),
    ];
    let mut any = false;
    for (label, path) in images {
        if let Some(path) = path {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let _ = writeln!(md, "- **{}:** `{}`", label, name);
            any = true;
        }
    }
    if !any {
        let _ = writeln!(md, "- (none)");
    }
    let _ = writeln!(md);

    let Some(raw) = result.raw_text.as_deref() else {
        let _ = writeln!(md, "## OCR\n\nOCR disabled.");
        return md;
    };

    // Text comparison
    if let Some(cmp) = &result.comparison.original_vs_final {
        let _ = writeln!(md, "## Original vs Final\n");
        let _ = writeln!(md, "- **Original Characters:** {}", cmp.before_chars);
        let _ = writeln!(md, "- **Final Characters:** {}", cmp.after_chars);
        let _ = writeln!(md, "- **Difference:** {}", cmp.summary());
        let _ = writeln!(md);
    }

    let _ = writeln!(md, "## Text Enhancement\n");
    match &d.enhancement {
        EnhancementOutcome::Disabled => {
            let _ = writeln!(md, "LLM Enhancement Disabled");
        }
        EnhancementOutcome::Skipped(reason) => {
            let _ = writeln!(md, "Skipped: {}", reason);
        }
        EnhancementOutcome::Failed(reason) => {
            let _ = writeln!(md, "Failed, raw text kept: {}", reason);
        }
        EnhancementOutcome::Enhanced => {
            if let Some(cmp) = &result.comparison.raw_vs_enhanced {
                let _ = writeln!(md, "- **Raw OCR Characters:** {}", cmp.before_chars);
                let _ = writeln!(md, "- **Enhanced Characters:** {}", cmp.after_chars);
                let _ = writeln!(md, "- **Difference:** {}", cmp.summary());
            }
        }
    }
    let _ = writeln!(md);

    if let Some(stats) = &result.statistics {
        let _ = writeln!(md, "## Text Statistics\n");
        let _ = writeln!(md, "- **Total Characters:** {}", stats.chars);
        let _ = writeln!(md, "- **Lines:** {}", stats.lines);
        let _ = writeln!(md, "- **Words:** {}", stats.words);
        let _ = writeln!(
            md,
            "- **Average Words per Line:** {:.1}",
            stats.avg_words_per_line
        );
        let _ = writeln!(md);
    }

    let _ = writeln!(md, "## Raw OCR Text\n");
    write_block(&mut md, raw);

    if let Some(enhanced) = &result.enhanced_text {
        let _ = writeln!(md, "## Enhanced Text\n");
        write_block(&mut md, enhanced);
    }

    md
}

fn write_block(md: &mut String, text: &str) {
    let _ = writeln!(md, "```text");
    let _ = writeln!(md, "{}", text.trim_end());
    let _ = writeln!(md, "```\n");
}

fn optional_value(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.2}", v))
        .unwrap_or_else(|| "n/a".to_string())
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

fn describe_fallback(fallback: &FallbackOutcome) -> String {
    match fallback {
        FallbackOutcome::KeptRotated {
            rotated_chars,
            unrotated_chars,
        } => format!(
            "kept rotated text ({} chars; unrotated {})",
            rotated_chars, unrotated_chars
        ),
        FallbackOutcome::UsedUnrotated {
            rotated_chars,
            unrotated_chars,
        } => format!(
            "used unrotated text ({} chars; rotated {})",
            unrotated_chars, rotated_chars
        ),
        FallbackOutcome::Failed(reason) => format!("unrotated OCR failed: {}", reason),
    }
}
