//! SVG Subfig Core - One-Row Labeled Figure Composer
//!
//! # Pipeline
//! 1. Measure: intrinsic size of every sub-image (SVG, PNG, JPEG)
//! 2. Allocate: split the width by aspect ratio, one shared height
//! 3. Compose: embed vectors (ids rewritten) and rasters (base64), add labels
//! 4. Serialize: one indented UTF-8 SVG document

pub mod config;
pub mod svg;
pub mod measure;
pub mod layout;
pub mod compose;
pub mod hashing;
pub mod convert;
pub mod pipeline;

pub use config::{FigureConfig, FigureDescription, MM_TO_PX, PT_TO_PX};
pub use measure::{ImageKind, RasterFormat, SourceImage, MeasuredImage, measure};
pub use layout::{Layout, Slot, allocate, check_count, MAX_SUBFIGURES};
pub use compose::{Composite, compose, label_for, rewrite_ids};
pub use convert::{ConvertOptions, ExportFormat, convert_svg};
pub use pipeline::{SubFigure, SaveReport, FigureError, FigureResult};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
