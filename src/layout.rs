//! Dialog geometry shared by the confirmation dialog and the result editor.
//!
//! All sizes are logical pixels.

pub const PREVIEW_MAX_WIDTH: u32 = 800;
pub const PREVIEW_MAX_HEIGHT: u32 = 600;
pub const PREVIEW_MIN_SIDE: u32 = 200;

const MIN_WINDOW_WIDTH: f64 = 400.0;
const MIN_WINDOW_HEIGHT: f64 = 500.0;
const HORIZONTAL_PADDING: f64 = 40.0;
/// Room for the label, toggle, text area and buttons under the preview.
const CONTROLS_HEIGHT: f64 = 300.0;
const SCREEN_FRACTION: f64 = 0.8;

/// Scales `(width, height)` down to fit `max_width x max_height`, keeping the
/// aspect ratio. Images smaller than the bounds keep their size, except that a
/// larger side below `min_side` is raised to `min_side`.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32, min_side: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (width.max(1), height.max(1));
    }

    let (w, h) = (width as f64, height as f64);
    let ratio = (max_width as f64 / w).min(max_height as f64 / h).min(1.0);
    let (mut out_w, mut out_h) = (w * ratio, h * ratio);

    let larger = out_w.max(out_h);
    if larger < min_side as f64 {
        let grow = min_side as f64 / larger;
        out_w *= grow;
        out_h *= grow;
    }

    (
        (out_w.round() as u32).max(1),
        (out_h.round() as u32).max(1),
    )
}

pub fn preview_size(width: u32, height: u32) -> (u32, u32) {
    fit_within(
        width,
        height,
        PREVIEW_MAX_WIDTH,
        PREVIEW_MAX_HEIGHT,
        PREVIEW_MIN_SIDE,
    )
}

/// Window size for a dialog showing a preview of `preview` size, clamped to
/// 80% of `screen` when the screen size is known.
pub fn window_size(preview: (u32, u32), screen: Option<(f64, f64)>) -> (f64, f64) {
    let width = MIN_WINDOW_WIDTH.max(preview.0 as f64 + HORIZONTAL_PADDING);
    let height = MIN_WINDOW_HEIGHT.max(preview.1 as f64 + CONTROLS_HEIGHT);

    match screen {
        Some((screen_w, screen_h)) => (
            width.min((screen_w * SCREEN_FRACTION).floor()),
            height.min((screen_h * SCREEN_FRACTION).floor()),
        ),
        None => (width, height),
    }
}
