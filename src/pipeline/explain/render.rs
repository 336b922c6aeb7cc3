//! Overlay rendering: tint the selected segments and outline them.

use image::{Rgb, RgbImage};

use super::segmentation::Segmentation;

/// Highlight tint for selected segments.
const HIGHLIGHT: [u8; 3] = [0, 255, 0];
/// Share of the tint in a highlighted pixel.
const HIGHLIGHT_ALPHA: f32 = 0.35;
/// Outline color (yellow).
const BOUNDARY: [u8; 3] = [255, 255, 0];

/// Pixel mask of the selected segments, row-major.
pub fn selection_mask(segmentation: &Segmentation, selected: &[usize]) -> Vec<bool> {
    segmentation
        .labels()
        .iter()
        .map(|label| selected.contains(label))
        .collect()
}

/// Pixels on the edge of the mask (4-neighborhood).
pub fn mask_boundaries(mask: &[bool], width: u32, height: u32) -> Vec<bool> {
    let (w, h) = (width as usize, height as usize);
    let mut edges = vec![false; mask.len()];
    for y in 0..h {
        for x in 0..w {
            let i = y * w + x;
            if !mask[i] {
                continue;
            }
            let on_edge = x == 0
                || y == 0
                || x + 1 == w
                || y + 1 == h
                || !mask[i - 1]
                || !mask[i + 1]
                || !mask[i - w]
                || !mask[i + w];
            edges[i] = on_edge;
        }
    }
    edges
}

/// Render the explanation overlay.
///
/// Selected pixels are tinted and outlined; with `hide_rest`, every other
/// pixel is painted `hide_color`.
pub fn render_overlay(image: &RgbImage, mask: &[bool], hide_rest: bool, hide_color: [u8; 3]) -> RgbImage {
    let (w, h) = image.dimensions();
    let edges = mask_boundaries(mask, w, h);

    RgbImage::from_fn(w, h, |x, y| {
        let i = (y * w + x) as usize;
        if edges[i] {
            return Rgb(BOUNDARY);
        }
        let Rgb(px) = *image.get_pixel(x, y);
        if mask[i] {
            Rgb(blend(px, HIGHLIGHT, HIGHLIGHT_ALPHA))
        } else if hide_rest {
            Rgb(hide_color)
        } else {
            Rgb(px)
        }
    })
}

fn blend(base: [u8; 3], tint: [u8; 3], alpha: f32) -> [u8; 3] {
    let mix = |b: u8, t: u8| (f32::from(b) * (1.0 - alpha) + f32::from(t) * alpha).round() as u8;
    [mix(base[0], tint[0]), mix(base[1], tint[1]), mix(base[2], tint[2])]
}
