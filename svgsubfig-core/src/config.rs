//! Figure Configuration - Layout Parameters and Description Files
//!
//! All lengths inside [`FigureConfig`] are in px. Description files use
//! physical units (mm for lengths, pt for the font size) and are converted
//! once, at load time.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::pipeline::{FigureError, FigureResult};

/// px per mm at 96 dpi.
pub const MM_TO_PX: f64 = 3.77952755906;
/// px per pt at 96 dpi.
pub const PT_TO_PX: f64 = 4.0 / 3.0;

pub fn mm_to_px(mm: f64) -> f64 {
    mm * MM_TO_PX
}

pub fn pt_to_px(pt: f64) -> f64 {
    pt * PT_TO_PX
}

pub const DEFAULT_FONT_FAMILY: &str = "Arial, Helvetica, sans-serif";

fn default_font_size() -> f64 { 12.0 }
fn default_font_family() -> String { DEFAULT_FONT_FAMILY.to_string() }
fn default_gap_between() -> f64 { 20.0 }
fn default_gap_label() -> f64 { 10.0 }

/// Resolved layout parameters. Composition only ever reads these; the save
/// report echoes them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FigureConfig {
    pub width: f64,
    pub gap_between: f64,
    pub gap_label: f64,
    pub font_size: f64,
    pub font_family: String,
}

impl FigureConfig {
    /// Config of the given total width with default spacing and typography.
    pub fn new(width: f64) -> Self {
        Self {
            width,
            gap_between: default_gap_between(),
            gap_label: default_gap_label(),
            font_size: default_font_size(),
            font_family: default_font_family(),
        }
    }

    pub fn with_gap_between(mut self, gap: f64) -> Self {
        self.gap_between = gap;
        self
    }

    pub fn with_gap_label(mut self, gap: f64) -> Self {
        self.gap_label = gap;
        self
    }

    pub fn with_font_size(mut self, size: f64) -> Self {
        self.font_size = size;
        self
    }

    pub fn with_font_family(mut self, family: impl Into<String>) -> Self {
        self.font_family = family.into();
        self
    }

    pub fn validate(&self) -> FigureResult<()> {
        let fields = [
            ("width", self.width),
            ("gap_between", self.gap_between),
            ("gap_label", self.gap_label),
            ("font_size", self.font_size),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(FigureError::degenerate(format!("{name} must be finite, got {value}")));
            }
        }
        if self.width <= 0.0 {
            return Err(FigureError::degenerate(format!("width must be positive, got {}", self.width)));
        }
        if self.font_size <= 0.0 {
            return Err(FigureError::degenerate(format!(
                "font_size must be positive, got {}",
                self.font_size
            )));
        }
        if self.gap_between < 0.0 || self.gap_label < 0.0 {
            return Err(FigureError::degenerate("gaps must not be negative"));
        }
        Ok(())
    }
}

/// On-disk figure description, in physical units.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FigureDescription {
    /// Total width in mm.
    pub width: f64,
    /// Gap between adjacent sub-images in mm.
    pub gap_between: f64,
    /// Gap between image row and labels in mm.
    pub gap_label: f64,
    /// Label size in pt.
    pub font_size: f64,
    pub font_family: String,
    #[serde(default)]
    pub images: Vec<PathBuf>,
}

impl FigureDescription {
    pub fn load(path: &Path) -> FigureResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| FigureError::io(path, e))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> FigureResult<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Converts into px and resolves image paths against `base_dir`.
    pub fn resolve(&self, base_dir: &Path) -> (FigureConfig, Vec<PathBuf>) {
        let config = FigureConfig {
            width: mm_to_px(self.width),
            gap_between: mm_to_px(self.gap_between),
            gap_label: mm_to_px(self.gap_label),
            font_size: pt_to_px(self.font_size),
            font_family: self.font_family.clone(),
        };
        let images = self.images.iter().map(|p| base_dir.join(p)).collect();
        (config, images)
    }
}
