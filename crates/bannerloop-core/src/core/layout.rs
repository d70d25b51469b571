//! Overlay Layout Helpers
//!
//! Pure sizing and positioning math for video overlays on the preview
//! canvas. Landscape clips are fit to a fixed width, portrait clips to a
//! fixed height, with a minimum edge so tiny clips stay grabbable. The
//! dragging and rendering themselves live in the embedding UI.

use crate::core::Ratio;

/// Fit width for landscape clips, in canvas pixels
pub const LANDSCAPE_FIT_WIDTH: u32 = 320;
/// Fit height for portrait (and square) clips, in canvas pixels
pub const PORTRAIT_FIT_HEIGHT: u32 = 300;
/// Minimum edge length of an overlay
pub const MIN_EDGE: u32 = 120;

/// Computes the default display size for a clip of the given aspect ratio.
pub fn default_display_size(aspect: Ratio) -> (u32, u32) {
    let ratio = aspect.as_f64();
    if ratio <= 0.0 {
        return (LANDSCAPE_FIT_WIDTH, LANDSCAPE_FIT_WIDTH);
    }

    let (width, height) = if ratio > 1.0 {
        let width = LANDSCAPE_FIT_WIDTH;
        let height = (width as f64 / ratio).round() as u32;
        (width, height)
    } else {
        let height = PORTRAIT_FIT_HEIGHT;
        let width = (height as f64 * ratio).round() as u32;
        (width, height)
    };

    (width.max(MIN_EDGE), height.max(MIN_EDGE))
}

/// Applies a scale factor to the default display size.
pub fn scaled_display_size(aspect: Ratio, scale: f64) -> (u32, u32) {
    let (base_width, base_height) = default_display_size(aspect);
    let scale = if scale.is_finite() && scale > 0.0 {
        scale
    } else {
        1.0
    };
    (
        ((base_width as f64) * scale).round() as u32,
        ((base_height as f64) * scale).round() as u32,
    )
}

/// Clamps an overlay position so the overlay stays inside the canvas.
///
/// Overlays larger than the canvas pin to the top-left corner.
pub fn clamp_position(
    x: i32,
    y: i32,
    overlay: (u32, u32),
    canvas: (u32, u32),
) -> (i32, i32) {
    let max_x = canvas.0.saturating_sub(overlay.0) as i32;
    let max_y = canvas.1.saturating_sub(overlay.1) as i32;
    (x.clamp(0, max_x.max(0)), y.clamp(0, max_y.max(0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn landscape_fits_width() {
        let (w, h) = default_display_size(Ratio::new(1920, 1080));
        assert_eq!(w, 320);
        assert_eq!(h, 180);
    }

    #[test]
    fn portrait_fits_height() {
        let (w, h) = default_display_size(Ratio::new(1080, 1920));
        assert_eq!(h, 300);
        assert_eq!(w, 169);
    }

    #[test]
    fn narrow_clip_respects_minimum_edge() {
        // A 1:4 sliver would be 75 px wide; clamp to the minimum.
        let (w, h) = default_display_size(Ratio::new(1, 4));
        assert_eq!(w, MIN_EDGE);
        assert_eq!(h, 300);
    }

    #[test]
    fn scale_multiplies_base_size() {
        let (w, h) = scaled_display_size(Ratio::new(16, 9), 2.0);
        assert_eq!((w, h), (640, 360));
    }

    #[test]
    fn invalid_scale_falls_back_to_one() {
        let base = default_display_size(Ratio::new(16, 9));
        assert_eq!(scaled_display_size(Ratio::new(16, 9), 0.0), base);
        assert_eq!(scaled_display_size(Ratio::new(16, 9), f64::NAN), base);
    }

    #[test]
    fn position_clamps_to_canvas() {
        let overlay = (320, 180);
        let canvas = (1280, 720);

        assert_eq!(clamp_position(-10, -10, overlay, canvas), (0, 0));
        assert_eq!(clamp_position(2000, 700, overlay, canvas), (960, 540));
        assert_eq!(clamp_position(100, 100, overlay, canvas), (100, 100));
    }

    #[test]
    fn oversized_overlay_pins_to_origin() {
        assert_eq!(clamp_position(50, 50, (2000, 2000), (1280, 720)), (0, 0));
    }
}
