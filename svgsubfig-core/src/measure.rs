//! Measurement Stage
//!
//! Determines intrinsic size and kind of each sub-image. Raster sizes come
//! from the image header, vector sizes from the root `viewBox` (preferred)
//! or the root `width`/`height`.

use image::{ImageFormat, ImageReader};
use serde::Serialize;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use crate::pipeline::{FigureError, FigureResult};
use crate::svg::{self, Element};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RasterFormat {
    Png,
    Jpeg,
}

impl RasterFormat {
    /// Subtype used in `data:image/<subtype>;base64,` URIs.
    pub fn mime_subtype(&self) -> &'static str {
        match self {
            RasterFormat::Png => "png",
            RasterFormat::Jpeg => "jpeg",
        }
    }

    fn image_format(&self) -> ImageFormat {
        match self {
            RasterFormat::Png => ImageFormat::Png,
            RasterFormat::Jpeg => ImageFormat::Jpeg,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Vector,
    Raster(RasterFormat),
}

impl ImageKind {
    /// Classifies by extension, case-insensitively.
    pub fn from_path(path: &Path) -> FigureResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| FigureError::UnknownFormat(path.to_path_buf()))?;

        match ext.as_str() {
            "svg" => Ok(ImageKind::Vector),
            "png" => Ok(ImageKind::Raster(RasterFormat::Png)),
            "jpg" | "jpeg" => Ok(ImageKind::Raster(RasterFormat::Jpeg)),
            _ => Err(FigureError::UnknownFormat(path.to_path_buf())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceImage {
    pub path: PathBuf,
    pub kind: ImageKind,
    pub intrinsic_width: f64,
    pub intrinsic_height: f64,
}

impl SourceImage {
    pub fn aspect_ratio(&self) -> f64 {
        self.intrinsic_width / self.intrinsic_height
    }
}

/// What gets embedded: the parsed vector tree or the raw raster bytes.
#[derive(Debug, Clone)]
pub enum Payload {
    Vector(Element),
    Raster(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct MeasuredImage {
    pub source: SourceImage,
    pub payload: Payload,
}

/// Reads and measures one sub-image. The file is read exactly once.
pub fn measure(path: &Path) -> FigureResult<MeasuredImage> {
    let kind = ImageKind::from_path(path)?;

    let (width, height, payload) = match kind {
        ImageKind::Vector => {
            let bytes = fs::read(path).map_err(|e| FigureError::io(path, e))?;
            let root = svg::decode(&bytes)
                .and_then(|src| svg::parse(&src))
                .map_err(|source| FigureError::MalformedSvg {
                    path: path.to_path_buf(),
                    source,
                })?;
            let (w, h) = vector_size(path, &root)?;
            (w, h, Payload::Vector(root))
        }
        ImageKind::Raster(format) => {
            let bytes = fs::read(path).map_err(|e| FigureError::io(path, e))?;
            let (w, h) = ImageReader::with_format(Cursor::new(&bytes[..]), format.image_format())
                .into_dimensions()
                .map_err(|source| FigureError::ImageProbe {
                    path: path.to_path_buf(),
                    source,
                })?;
            (f64::from(w), f64::from(h), Payload::Raster(bytes))
        }
    };

    if !(width.is_finite() && height.is_finite()) || width <= 0.0 || height <= 0.0 {
        return Err(FigureError::degenerate(format!(
            "{} has intrinsic size {width}x{height}",
            path.display()
        )));
    }

    Ok(MeasuredImage {
        source: SourceImage {
            path: path.to_path_buf(),
            kind,
            intrinsic_width: width,
            intrinsic_height: height,
        },
        payload,
    })
}

/// Logical viewport size of a vector root element.
pub fn vector_size(path: &Path, root: &Element) -> FigureResult<(f64, f64)> {
    if let Some(view_box) = root.attr("viewBox") {
        let fields: Vec<&str> = view_box
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|f| !f.is_empty())
            .collect();
        if fields.len() != 4 {
            return Err(invalid(path, view_box));
        }
        let w = fields[2].parse::<f64>().map_err(|_| invalid(path, view_box))?;
        let h = fields[3].parse::<f64>().map_err(|_| invalid(path, view_box))?;
        return Ok((w, h));
    }

    match (root.attr("width"), root.attr("height")) {
        (Some(w), Some(h)) => Ok((parse_length(path, w)?, parse_length(path, h)?)),
        _ => Err(FigureError::MissingDimensions(path.to_path_buf())),
    }
}

/// Plain user units, optionally suffixed with `px`.
fn parse_length(path: &Path, value: &str) -> FigureResult<f64> {
    let trimmed = value.trim();
    let number = trimmed.strip_suffix("px").unwrap_or(trimmed);
    number.trim().parse::<f64>().map_err(|_| invalid(path, value))
}

fn invalid(path: &Path, value: &str) -> FigureError {
    FigureError::InvalidDimension {
        path: path.to_path_buf(),
        value: value.to_string(),
    }
}
