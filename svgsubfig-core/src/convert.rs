//! Export Conversion - External Rasterizer
//!
//! Hands a written figure to Inkscape, which writes PDF/PNG/plain-SVG
//! siblings next to it. The composed SVG itself is never modified here.

use serde::Serialize;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, warn};

use crate::pipeline::{FigureError, FigureResult};

pub const DEFAULT_CONVERTER: &str = "inkscape";
pub const DEFAULT_DPI: u32 = 600;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Pdf,
    Png,
    Svg,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Pdf => "pdf",
            ExportFormat::Png => "png",
            ExportFormat::Svg => "svg",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub program: String,
    pub dpi: u32,
    pub formats: Vec<ExportFormat>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            program: DEFAULT_CONVERTER.to_string(),
            dpi: DEFAULT_DPI,
            formats: vec![ExportFormat::Pdf, ExportFormat::Png, ExportFormat::Svg],
        }
    }
}

impl ConvertOptions {
    /// Exports to the drawing bounds (`-D`) with text converted to paths (`-T`).
    pub fn command(&self, svg_path: &Path) -> Command {
        let types: Vec<_> = self.formats.iter().map(ExportFormat::extension).collect();
        let mut cmd = Command::new(&self.program);
        cmd.arg(format!("--export-type={}", types.join(",")))
            .arg("--export-overwrite")
            .arg("-d")
            .arg(self.dpi.to_string())
            .args(["-D", "-T"])
            .arg(svg_path);
        cmd
    }
}

/// Whether `program --version` runs and succeeds.
pub fn is_converter_on_path(program: &str) -> bool {
    Command::new(program)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

pub fn convert_svg(svg_path: &Path, options: &ConvertOptions) -> FigureResult<()> {
    if options.formats.is_empty() {
        return Err(FigureError::Conversion("no export formats requested".into()));
    }
    if options.dpi == 0 {
        return Err(FigureError::Conversion("dpi must be non-zero".into()));
    }

    debug!(program = %options.program, input = %svg_path.display(), "running converter");
    let out = options.command(svg_path).output().map_err(|e| {
        FigureError::Conversion(format!("failed to run {}: {e}", options.program))
    })?;

    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr);
        warn!(status = %out.status, "converter failed");
        return Err(FigureError::Conversion(format!(
            "{} failed for '{}': {}",
            options.program,
            svg_path.display(),
            stderr.trim()
        )));
    }
    Ok(())
}
