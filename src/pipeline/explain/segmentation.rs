//! SLIC superpixels: k-means over (L*, a*, b*, x, y) with a grid-seeded start.

use image::RgbImage;

use super::ExplanationError;

/// Iterations of the assign/update loop.
const SLIC_ITERATIONS: usize = 10;

/// Superpixel label map of an image.
#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    width: u32,
    height: u32,
    /// Row-major, one label per pixel, labels in `0..count`.
    labels: Vec<usize>,
    count: usize,
}

impl Segmentation {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of distinct segments.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn label(&self, x: u32, y: u32) -> usize {
        self.labels[(y * self.width + x) as usize]
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Pixel count of every segment.
    pub fn sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.count];
        for &label in &self.labels {
            sizes[label] += 1;
        }
        sizes
    }

    /// Build from a raw label map; labels are renumbered to `0..count`.
    pub fn from_labels(width: u32, height: u32, labels: Vec<usize>) -> Result<Self, ExplanationError> {
        if labels.len() != (width * height) as usize || labels.is_empty() {
            return Err(ExplanationError::Segmentation(format!(
                "label map of {} entries for a {width}x{height} image",
                labels.len()
            )));
        }
        let (labels, count) = renumber(&labels);
        Ok(Self {
            width,
            height,
            labels,
            count,
        })
    }
}

/// Segment `image` into roughly `n_segments` compact superpixels.
///
/// `compactness` trades color similarity for spatial regularity; 10 suits
/// 8-bit images in Lab space.
pub fn slic(image: &RgbImage, n_segments: usize, compactness: f32) -> Result<Segmentation, ExplanationError> {
    let (width, height) = image.dimensions();
    let (w, h) = (width as usize, height as usize);
    if w == 0 || h == 0 {
        return Err(ExplanationError::Segmentation("empty image".into()));
    }
    if n_segments == 0 {
        return Err(ExplanationError::Segmentation("zero segments requested".into()));
    }

    let lab: Vec<[f32; 3]> = image.pixels().map(|p| rgb_to_lab(p.0)).collect();
    let step = (((w * h) as f32 / n_segments as f32).sqrt()).max(1.0);
    let mut centers = seed_centers(&lab, w, h, step);

    let mut labels = vec![0usize; w * h];
    let mut distances = vec![f32::INFINITY; w * h];
    let spatial_weight = (compactness / step).powi(2);
    let window = (2.0 * step).ceil() as isize;

    for _ in 0..SLIC_ITERATIONS {
        distances.fill(f32::INFINITY);

        for (k, center) in centers.iter().enumerate() {
            let cx = center[3].round() as isize;
            let cy = center[4].round() as isize;
            let x0 = (cx - window).max(0) as usize;
            let x1 = ((cx + window) as usize).min(w - 1);
            let y0 = (cy - window).max(0) as usize;
            let y1 = ((cy + window) as usize).min(h - 1);

            for y in y0..=y1 {
                for x in x0..=x1 {
                    let i = y * w + x;
                    let [l, a, b] = lab[i];
                    let dc = (l - center[0]).powi(2) + (a - center[1]).powi(2) + (b - center[2]).powi(2);
                    let ds = (x as f32 - center[3]).powi(2) + (y as f32 - center[4]).powi(2);
                    let d = dc + ds * spatial_weight;
                    if d < distances[i] {
                        distances[i] = d;
                        labels[i] = k;
                    }
                }
            }
        }

        let mut sums = vec![[0f32; 6]; centers.len()];
        for (i, &k) in labels.iter().enumerate() {
            let [l, a, b] = lab[i];
            let s = &mut sums[k];
            s[0] += l;
            s[1] += a;
            s[2] += b;
            s[3] += (i % w) as f32;
            s[4] += (i / w) as f32;
            s[5] += 1.0;
        }
        for (center, s) in centers.iter_mut().zip(&sums) {
            if s[5] > 0.0 {
                *center = [s[0] / s[5], s[1] / s[5], s[2] / s[5], s[3] / s[5], s[4] / s[5]];
            }
        }
    }

    let min_size = ((step * step) / 4.0).max(1.0) as usize;
    let labels = enforce_connectivity(&labels, w, h, min_size);
    Segmentation::from_labels(width, height, labels)
}

/// Grid seeds, each nudged to the lowest-gradient pixel of its 3×3 neighborhood.
fn seed_centers(lab: &[[f32; 3]], w: usize, h: usize, step: f32) -> Vec<[f32; 5]> {
    let mut centers = Vec::new();
    let mut y = step / 2.0;
    while (y as usize) < h {
        let mut x = step / 2.0;
        while (x as usize) < w {
            let (sx, sy) = lowest_gradient(lab, w, h, x as usize, y as usize);
            let [l, a, b] = lab[sy * w + sx];
            centers.push([l, a, b, sx as f32, sy as f32]);
            x += step;
        }
        y += step;
    }
    if centers.is_empty() {
        let [l, a, b] = lab[0];
        centers.push([l, a, b, 0.0, 0.0]);
    }
    centers
}

fn lowest_gradient(lab: &[[f32; 3]], w: usize, h: usize, x: usize, y: usize) -> (usize, usize) {
    let gradient = |x: usize, y: usize| -> f32 {
        let at = |x: usize, y: usize| lab[y * w + x][0];
        let gx = at((x + 1).min(w - 1), y) - at(x.saturating_sub(1), y);
        let gy = at(x, (y + 1).min(h - 1)) - at(x, y.saturating_sub(1));
        gx * gx + gy * gy
    };

    let mut best = (x, y);
    let mut best_gradient = gradient(x, y);
    for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
        for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
            let g = gradient(nx, ny);
            if g < best_gradient {
                best_gradient = g;
                best = (nx, ny);
            }
        }
    }
    best
}

/// Split disconnected labels into components and merge small components into
/// the previously visited neighbor.
fn enforce_connectivity(labels: &[usize], w: usize, h: usize, min_size: usize) -> Vec<usize> {
    const UNSET: usize = usize::MAX;
    let mut out = vec![UNSET; w * h];
    let mut next_label = 0;
    let mut stack = Vec::new();
    let mut component = Vec::new();

    for start in 0..w * h {
        if out[start] != UNSET {
            continue;
        }

        // Adjacent label already assigned, used when this component is too small.
        let (sx, sy) = (start % w, start / w);
        let adjacent = [
            (sx > 0).then(|| start - 1),
            (sy > 0).then(|| start - w),
        ]
        .into_iter()
        .flatten()
        .map(|n| out[n])
        .find(|&l| l != UNSET);

        let original = labels[start];
        component.clear();
        stack.push(start);
        out[start] = next_label;
        while let Some(i) = stack.pop() {
            component.push(i);
            let (x, y) = (i % w, i / w);
            let neighbors = [
                (x > 0).then(|| i - 1),
                (x + 1 < w).then(|| i + 1),
                (y > 0).then(|| i - w),
                (y + 1 < h).then(|| i + w),
            ];
            for n in neighbors.into_iter().flatten() {
                if out[n] == UNSET && labels[n] == original {
                    out[n] = next_label;
                    stack.push(n);
                }
            }
        }

        match adjacent {
            Some(target) if component.len() < min_size => {
                for &i in &component {
                    out[i] = target;
                }
            }
            _ => next_label += 1,
        }
    }
    out
}

/// Renumber labels to `0..count` in first-appearance order.
fn renumber(labels: &[usize]) -> (Vec<usize>, usize) {
    let mut mapping = std::collections::HashMap::new();
    let renumbered = labels
        .iter()
        .map(|l| {
            let next = mapping.len();
            *mapping.entry(*l).or_insert(next)
        })
        .collect();
    (renumbered, mapping.len())
}

/// sRGB (D65) to CIE L*a*b*.
fn rgb_to_lab(rgb: [u8; 3]) -> [f32; 3] {
    fn linear(c: u8) -> f32 {
        let c = f32::from(c) / 255.0;
        if c <= 0.04045 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        }
    }
    fn f(t: f32) -> f32 {
        if t > 0.008856 {
            t.cbrt()
        } else {
            7.787 * t + 16.0 / 116.0
        }
    }

    let (r, g, b) = (linear(rgb[0]), linear(rgb[1]), linear(rgb[2]));
    let x = (0.412_456_4 * r + 0.357_576_1 * g + 0.180_437_5 * b) / 0.950_47;
    let y = 0.212_672_9 * r + 0.715_152_2 * g + 0.072_175 * b;
    let z = (0.019_333_9 * r + 0.119_192 * g + 0.950_304_1 * b) / 1.088_83;

    let (fx, fy, fz) = (f(x), f(y), f(z));
    [116.0 * fy - 16.0, 500.0 * (fx - fy), 200.0 * (fy - fz)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn uniform_image_segments_into_roughly_requested_count() {
        let img = RgbImage::from_pixel(150, 150, Rgb([90, 90, 90]));
        let seg = slic(&img, 50, 10.0).unwrap();
        assert!(seg.count() >= 25 && seg.count() <= 80, "count = {}", seg.count());
        assert_eq!(seg.labels().len(), 150 * 150);
        assert!(seg.labels().iter().all(|&l| l < seg.count()));
    }

    #[test]
    fn sharp_color_edge_is_respected() {
        let img = RgbImage::from_fn(60, 60, |x, _| {
            if x < 30 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        });
        let seg = slic(&img, 16, 10.0).unwrap();
        for y in 0..60 {
            assert_ne!(seg.label(29, y), seg.label(30, y));
        }
    }

    #[test]
    fn every_segment_is_nonempty() {
        let img = RgbImage::from_fn(40, 30, |x, y| Rgb([(x * 6) as u8, (y * 8) as u8, 50]));
        let seg = slic(&img, 12, 10.0).unwrap();
        assert!(seg.sizes().iter().all(|&s| s > 0));
    }

    #[test]
    fn single_segment_request_covers_everything() {
        let img = RgbImage::from_pixel(10, 10, Rgb([1, 2, 3]));
        let seg = slic(&img, 1, 10.0).unwrap();
        assert_eq!(seg.count(), 1);
    }

    #[test]
    fn empty_image_is_an_error() {
        assert!(slic(&RgbImage::new(0, 0), 10, 10.0).is_err());
        assert!(slic(&RgbImage::new(4, 4), 0, 10.0).is_err());
    }

    #[test]
    fn from_labels_renumbers() {
        let seg = Segmentation::from_labels(2, 2, vec![7, 7, 3, 9]).unwrap();
        assert_eq!(seg.labels(), &[0, 0, 1, 2]);
        assert_eq!(seg.count(), 3);
        assert!(Segmentation::from_labels(2, 2, vec![0]).is_err());
    }

    #[test]
    fn lab_conversion_of_extremes() {
        let black = rgb_to_lab([0, 0, 0]);
        let white = rgb_to_lab([255, 255, 255]);
        assert!(black[0].abs() < 1e-3);
        assert!((white[0] - 100.0).abs() < 0.1);
        assert!(white[1].abs() < 0.5 && white[2].abs() < 0.5);
    }
}
