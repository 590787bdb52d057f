//! Composition Stage
//!
//! Places every measured sub-image left to right and puts a centered
//! `(a)`, `(b)`, ... label beneath each one.

use base64::Engine;

use crate::config::FigureConfig;
use crate::layout::{allocate, Layout, Slot};
use crate::measure::{ImageKind, MeasuredImage, Payload, SourceImage};
use crate::pipeline::FigureResult;
use crate::svg::{Document, Element, NS_SVG, NS_XLINK};

/// The composed document plus the geometry it was built from.
#[derive(Debug, Clone)]
pub struct Composite {
    pub document: Document,
    pub layout: Layout,
    pub sources: Vec<SourceImage>,
    pub width: f64,
    pub height: f64,
}

pub fn compose(config: &FigureConfig, images: Vec<MeasuredImage>) -> FigureResult<Composite> {
    let aspects: Vec<f64> = images.iter().map(|i| i.source.aspect_ratio()).collect();
    let layout = allocate(config, &aspects)?;
    let height = layout.canvas_height(config);

    let mut root = Element::new("svg")
        .with_attr("xmlns", NS_SVG)
        .with_attr("xmlns:xlink", NS_XLINK)
        .with_attr("viewBox", format!("0 0 {} {}", config.width, height));

    let sources: Vec<SourceImage> = images.iter().map(|i| i.source.clone()).collect();

    // `allocate` has bounded the count, so the labels outlast the slots.
    let labels = (0..).map_while(label_for);
    let y = 0.0;
    for (no, ((image, slot), text)) in images.into_iter().zip(&layout.slots).zip(labels).enumerate() {
        let node = match image.payload {
            Payload::Vector(tree) => vector_node(no, &image.source, tree, slot, y),
            Payload::Raster(bytes) => raster_node(no, &image.source, &bytes, slot, y),
        };
        root.push(node);
        root.push(label_node(config, text, slot, y + layout.display_height));
    }

    Ok(Composite {
        document: Document::new(root),
        layout,
        sources,
        width: config.width,
        height,
    })
}

fn vector_node(no: usize, source: &SourceImage, mut tree: Element, slot: &Slot, y: f64) -> Element {
    rewrite_ids(&mut tree, &format!("img-{no}-"));

    // Pin the nested viewport to the measured units so the group scale is exact.
    tree.set_attr("width", source.intrinsic_width.to_string());
    tree.set_attr("height", source.intrinsic_height.to_string());

    let scale = slot.display_width / source.intrinsic_width;
    let mut group = Element::new("g")
        .with_attr("id", format!("subfig-{no}"))
        .with_attr("transform", format!("translate({}, {y}) scale({scale})", slot.x));
    group.push(tree);
    group
}

fn raster_node(no: usize, source: &SourceImage, bytes: &[u8], slot: &Slot, y: f64) -> Element {
    let subtype = match source.kind {
        ImageKind::Raster(format) => format.mime_subtype(),
        ImageKind::Vector => "svg+xml",
    };
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);

    Element::new("image")
        .with_attr("id", format!("subfig-{no}"))
        .with_attr("xlink:href", format!("data:image/{subtype};base64,{encoded}"))
        .with_attr("width", slot.display_width.to_string())
        .with_attr("height", (slot.display_width / source.aspect_ratio()).to_string())
        .with_attr("x", slot.x.to_string())
        .with_attr("y", y.to_string())
}

fn label_node(config: &FigureConfig, text: String, slot: &Slot, row_bottom: f64) -> Element {
    let mut label = Element::new("text")
        .with_attr("x", (slot.x + 0.5 * slot.display_width).to_string())
        .with_attr("y", (row_bottom + config.font_size + config.gap_label).to_string())
        .with_attr("text-anchor", "middle")
        .with_attr("vertical-align", "hanging")
        .with_attr("font-size", config.font_size.to_string())
        .with_attr("font-family", config.font_family.as_str());
    label.push_text(text);
    label
}

/// `(a)` for index 0 through `(z)` for index 25.
pub fn label_for(index: usize) -> Option<String> {
    let offset = u8::try_from(index).ok().filter(|i| *i < 26)?;
    Some(format!("({})", char::from(b'a' + offset)))
}

/// Prefixes every `id` in the tree and retargets references to it.
///
/// An element counts as referencing `old` when any of its attributes
/// contains `#old`; every non-`id` attribute of that element containing
/// `old` then has it replaced. This is plain substring matching, so an id
/// that is a substring of another token on the same element is replaced too.
/// Returns the `(old, new)` pairs in document order.
pub fn rewrite_ids(root: &mut Element, prefix: &str) -> Vec<(String, String)> {
    let mut mapping: Vec<(String, String)> = vec![];
    root.visit_mut(&mut |element| {
        if let Some(old) = element.attr("id").map(str::to_string) {
            let new = format!("{prefix}{old}");
            element.set_attr("id", new.as_str());
            if !mapping.iter().any(|(o, _)| *o == old) {
                mapping.push((old, new));
            }
        }
    });

    for (old, new) in &mapping {
        let fragment = format!("#{old}");
        root.visit_mut(&mut |element| {
            let references = element.attributes.iter().any(|(_, v)| v.contains(&fragment));
            if !references {
                return;
            }
            for (key, value) in element.attributes.iter_mut() {
                if key != "id" && value.contains(old.as_str()) {
                    *value = value.replace(old.as_str(), new);
                }
            }
        });
    }

    mapping
}
