//! Figure Pipeline - Single Entry Point
//!
//! Measurement -> Allocation -> Composition -> Serialization, strictly in order.
//! The document is fully built before the destination is touched, so a failed
//! run never leaves a partial figure behind.

use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::compose::{compose, Composite};
use crate::config::{FigureConfig, FigureDescription};
use crate::hashing::sha256_hex;
use crate::layout::{check_count, Layout, MAX_SUBFIGURES};
use crate::measure::{measure, MeasuredImage, SourceImage};
use crate::svg::XmlError;

pub type FigureResult<T> = Result<T, FigureError>;

#[derive(Debug, Error)]
pub enum FigureError {
    #[error("Unknown picture format for {0}: known formats are SVG, PNG and JPEG")]
    UnknownFormat(PathBuf),

    #[error("SVG {0} has neither a viewBox nor width/height on its root element")]
    MissingDimensions(PathBuf),

    #[error("Invalid dimension {value:?} in {path}")]
    InvalidDimension { path: PathBuf, value: String },

    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),

    #[error("Too many subfigures: {0} given, labels run out after {}", MAX_SUBFIGURES)]
    TooManySubfigures(usize),

    #[error("Malformed SVG {path}: {source}")]
    MalformedSvg { path: PathBuf, source: XmlError },

    #[error("Cannot read image {path}: {source}")]
    ImageProbe { path: PathBuf, source: image::ImageError },

    #[error("I/O error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("Serialization error: {0}")]
    Serialization(#[from] XmlError),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Conversion failed: {0}")]
    Conversion(String),
}

impl FigureError {
    pub fn degenerate(msg: impl Into<String>) -> Self {
        Self::DegenerateGeometry(msg.into())
    }

    pub fn io(path: &Path, source: io::Error) -> Self {
        Self::Io { path: path.to_path_buf(), source }
    }
}

/// Outcome of a successful save: where it went, what it was built from.
#[derive(Debug, Clone, Serialize)]
pub struct SaveReport {
    pub output: PathBuf,
    pub width: f64,
    pub height: f64,
    pub subfigures: usize,
    pub bytes: usize,
    pub sha256: String,
    pub config: FigureConfig,
    pub layout: Layout,
    pub sources: Vec<SourceImage>,
}

/// A row of labeled sub-images sharing one height.
#[derive(Debug, Clone)]
pub struct SubFigure {
    config: FigureConfig,
    children: Vec<PathBuf>,
}

impl SubFigure {
    pub fn new(config: FigureConfig) -> Self {
        Self {
            config,
            children: vec![],
        }
    }

    /// Loads a JSON description; image paths are relative to its directory.
    pub fn from_description_file(path: &Path) -> FigureResult<Self> {
        let description = FigureDescription::load(path)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
        let (config, images) = description.resolve(base_dir);
        let mut figure = Self::new(config);
        figure.add_children(images);
        Ok(figure)
    }

    pub fn config(&self) -> &FigureConfig {
        &self.config
    }

    pub fn children(&self) -> &[PathBuf] {
        &self.children
    }

    pub fn add_child(&mut self, child: impl Into<PathBuf>) -> &mut Self {
        self.children.push(child.into());
        self
    }

    pub fn add_children<I, P>(&mut self, children: I) -> &mut Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }

    /// Measures every child from disk, in order.
    pub fn measure(&self) -> FigureResult<Vec<MeasuredImage>> {
        self.children.iter().map(|p| measure(p)).collect()
    }

    /// Builds the composite document without writing anything.
    pub fn compose(&self) -> FigureResult<Composite> {
        self.config.validate()?;
        if self.children.is_empty() {
            return Err(FigureError::degenerate("figure has no subfigures"));
        }
        // Fail before any file is read.
        check_count(self.children.len())?;

        let images = self.measure()?;
        for image in &images {
            debug!(
                path = %image.source.path.display(),
                width = image.source.intrinsic_width,
                height = image.source.intrinsic_height,
                kind = ?image.source.kind,
                "measured subfigure"
            );
        }

        compose(&self.config, images)
    }

    /// Composes and writes the figure to `path`.
    pub fn save(&self, path: &Path) -> FigureResult<SaveReport> {
        let composite = self.compose()?;
        let bytes = composite.document.to_xml_bytes()?;
        fs::write(path, &bytes).map_err(|e| FigureError::io(path, e))?;

        let report = SaveReport {
            output: path.to_path_buf(),
            width: composite.width,
            height: composite.height,
            subfigures: composite.layout.slots.len(),
            bytes: bytes.len(),
            sha256: sha256_hex(&bytes),
            config: self.config.clone(),
            layout: composite.layout,
            sources: composite.sources,
        };
        info!(
            output = %path.display(),
            subfigures = report.subfigures,
            width = report.width,
            height = report.height,
            "figure saved"
        );
        Ok(report)
    }
}
