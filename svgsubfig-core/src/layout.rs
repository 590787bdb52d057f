//! Allocation Stage
//!
//! Splits the net width across sub-images in proportion to their aspect
//! ratios, which gives every sub-image the same display height.

use serde::Serialize;

use crate::config::FigureConfig;
use crate::pipeline::{FigureError, FigureResult};

/// Labels run from `(a)` to `(z)`.
pub const MAX_SUBFIGURES: usize = 26;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Slot {
    pub x: f64,
    pub display_width: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layout {
    pub display_height: f64,
    pub slots: Vec<Slot>,
}

impl Layout {
    /// Image row plus label band.
    pub fn canvas_height(&self, config: &FigureConfig) -> f64 {
        self.display_height + 2.0 * config.font_size + config.gap_label
    }
}

/// The only place the label limit is enforced. Everything downstream of a
/// passing check may assume every slot has a label.
pub fn check_count(n: usize) -> FigureResult<()> {
    if n > MAX_SUBFIGURES {
        return Err(FigureError::TooManySubfigures(n));
    }
    Ok(())
}

pub fn allocate(config: &FigureConfig, aspects: &[f64]) -> FigureResult<Layout> {
    let n = aspects.len();
    if n == 0 {
        return Err(FigureError::degenerate("nothing to allocate"));
    }
    check_count(n)?;
    if let Some(bad) = aspects.iter().find(|a| !a.is_finite() || **a <= 0.0) {
        return Err(FigureError::degenerate(format!("aspect ratio {bad} is not positive")));
    }

    let net_width = config.width - config.gap_between * (n - 1) as f64;
    if net_width <= 0.0 {
        return Err(FigureError::degenerate(format!(
            "gaps of {} leave no room in a width of {}",
            config.gap_between, config.width
        )));
    }

    let total_aspect: f64 = aspects.iter().sum();

    let mut x = 0.0;
    let slots = aspects
        .iter()
        .map(|aspect| {
            let display_width = net_width * aspect / total_aspect;
            let slot = Slot { x, display_width };
            x += display_width + config.gap_between;
            slot
        })
        .collect::<Vec<_>>();

    // All heights agree by construction; the first one is authoritative.
    let display_height = slots[0].display_width / aspects[0];

    Ok(Layout { display_height, slots })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_limit_is_label_count() {
        assert!(check_count(0).is_ok());
        assert!(check_count(MAX_SUBFIGURES).is_ok());
        assert!(matches!(check_count(MAX_SUBFIGURES + 1), Err(FigureError::TooManySubfigures(27))));
    }

    const EPS: f64 = 1e-9;

    fn scenario_config() -> FigureConfig {
        FigureConfig::new(400.0)
            .with_gap_between(20.0)
            .with_gap_label(10.0)
            .with_font_size(12.0)
    }

    #[test]
    fn test_two_image_scenario() {
        let config = scenario_config();
        let layout = allocate(&config, &[2.0, 1.0]).unwrap();

        assert!((layout.slots[0].display_width - 760.0 / 3.0).abs() < EPS);
        assert!((layout.slots[1].display_width - 380.0 / 3.0).abs() < EPS);
        assert!((layout.display_height - 380.0 / 3.0).abs() < EPS);
        assert!((layout.canvas_height(&config) - (380.0 / 3.0 + 34.0)).abs() < EPS);

        assert_eq!(layout.slots[0].x, 0.0);
        assert!((layout.slots[1].x - (760.0 / 3.0 + 20.0)).abs() < EPS);
    }

    #[test]
    fn test_fills_width_and_keeps_aspect() {
        let config = FigureConfig::new(512.3).with_gap_between(7.5);
        let aspects = [0.37, 1.0, 2.5, 1.333, 0.9];
        let layout = allocate(&config, &aspects).unwrap();

        let used: f64 = layout.slots.iter().map(|s| s.display_width).sum::<f64>()
            + config.gap_between * (aspects.len() - 1) as f64;
        assert!((used - config.width).abs() < 1e-9);

        for (slot, aspect) in layout.slots.iter().zip(aspects) {
            assert!((slot.display_width / layout.display_height - aspect).abs() < 1e-9);
        }
    }

    #[test]
    fn test_single_image_has_no_gap() {
        let config = FigureConfig::new(300.0).with_gap_between(50.0);
        let layout = allocate(&config, &[1.5]).unwrap();
        assert_eq!(layout.slots.len(), 1);
        assert_eq!(layout.slots[0].display_width, 300.0);
        assert_eq!(layout.display_height, 200.0);
    }

    #[test]
    fn test_rejects_degenerate_input() {
        let config = FigureConfig::new(100.0).with_gap_between(60.0);
        assert!(matches!(allocate(&config, &[]), Err(FigureError::DegenerateGeometry(_))));
        assert!(matches!(
            allocate(&config, &[1.0, 1.0]),
            Err(FigureError::DegenerateGeometry(_))
        ));
        assert!(matches!(
            allocate(&FigureConfig::new(100.0), &[1.0, 0.0]),
            Err(FigureError::DegenerateGeometry(_))
        ));
        assert!(matches!(
            allocate(&FigureConfig::new(100.0), &[f64::INFINITY]),
            Err(FigureError::DegenerateGeometry(_))
        ));
    }

    #[test]
    fn test_rejects_more_than_labels() {
        let config = FigureConfig::new(10_000.0).with_gap_between(1.0);
        assert!(allocate(&config, &[1.0; 26]).is_ok());
        assert!(matches!(
            allocate(&config, &[1.0; 27]),
            Err(FigureError::TooManySubfigures(27))
        ));
    }
}
