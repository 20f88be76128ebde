//! False-color renderings of depth and label images, and class palettes.

use image::{Rgb, RgbImage};
use rand::Rng;

use crate::camera::DepthImage;
use crate::segment::LabelMap;

/// JET colormap entry for `v` (0 → dark blue, 255 → dark red), with the
/// same end points as OpenCV's `COLORMAP_JET`.
pub fn jet(v: u8) -> Rgb<u8> {
    let x = v as f32 / 255.0;
    let channel = |offset: f32| {
        let c = (1.5 - (4.0 * x - offset).abs()).clamp(0.0, 1.0);
        (c * 255.0).round() as u8
    };
    Rgb([channel(3.0), channel(2.0), channel(1.0)])
}

fn jet_lut() -> [Rgb<u8>; 256] {
    let mut lut = [Rgb([0, 0, 0]); 256];
    for (i, entry) in lut.iter_mut().enumerate() {
        *entry = jet(i as u8);
    }
    lut
}

/// Saturating `|v * alpha|` conversion to 8 bits.
fn scale_abs(v: f32, alpha: f32) -> u8 {
    (v * alpha).abs().round().min(255.0) as u8
}

/// Raw depth units scaled by `alpha` (0.03 shows ~8.5 m of millimeter depth).
pub fn depth_colormap(depth: &DepthImage, alpha: f32) -> RgbImage {
    let lut = jet_lut();
    let (w, h) = depth.dimensions();
    RgbImage::from_fn(w, h, |x, y| {
        lut[scale_abs(depth.get_pixel(x, y)[0] as f32, alpha) as usize]
    })
}

/// Class ids multiplied by `gain` so neighbouring classes get distinct hues.
pub fn label_colormap(labels: &LabelMap, gain: f32) -> RgbImage {
    let lut = jet_lut();
    let (w, h) = labels.dimensions();
    RgbImage::from_fn(w, h, |x, y| {
        lut[scale_abs(labels.get_pixel(x, y)[0] as f32, gain) as usize]
    })
}

/// `n` colors stepping evenly (by `255 / n`) from a random start, wrapping
/// modulo 255 on every channel.
pub fn class_palette<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<Rgb<u8>> {
    if n == 0 {
        return Vec::new();
    }
    let step = 255.0 / n as f64;
    let mut channels: [u32; 3] = [
        rng.gen_range(0..255),
        rng.gen_range(0..255),
        rng.gen_range(0..255),
    ];
    (0..n)
        .map(|_| {
            for c in &mut channels {
                *c = (*c as f64 + step) as u32 % 255;
            }
            Rgb([channels[0] as u8, channels[1] as u8, channels[2] as u8])
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn jet_end_points() {
        assert_eq!(jet(0), Rgb([0, 0, 128]));
        assert_eq!(jet(255), Rgb([128, 0, 0]));
        // Mid-scale is green-dominant.
        let mid = jet(128);
        assert!(mid[1] == 255 && mid[0] < 255 && mid[2] < 255);
    }

    #[test]
    fn depth_colormap_saturates() {
        let mut depth = DepthImage::new(3, 1);
        depth.put_pixel(1, 0, Luma([1000]));
        depth.put_pixel(2, 0, Luma([60000]));
        let img = depth_colormap(&depth, 0.03);
        assert_eq!(*img.get_pixel(0, 0), jet(0));
        assert_eq!(*img.get_pixel(1, 0), jet(30));
        assert_eq!(*img.get_pixel(2, 0), jet(255));
    }

    #[test]
    fn label_colormap_applies_gain() {
        let mut labels = LabelMap::new(2, 1);
        labels.put_pixel(1, 0, Luma([7]));
        let img = label_colormap(&labels, 10.0);
        assert_eq!(*img.get_pixel(1, 0), jet(70));
    }

    #[test]
    fn palette_steps_and_wraps() {
        let mut rng = StdRng::seed_from_u64(11);
        let colors = class_palette(5, &mut rng);
        assert_eq!(colors.len(), 5);
        for pair in colors.windows(2) {
            for c in 0..3 {
                let a = pair[0][c] as u32;
                let b = pair[1][c] as u32;
                assert_eq!((a + 51) % 255, b);
            }
        }
        assert!(class_palette(0, &mut rng).is_empty());
    }
}
