//! Overlay rendering: detection boxes, projected model points, projected 3-D
//! boxes and the side-by-side display panel.

mod colormap;

pub use colormap::{class_palette, depth_colormap, jet, label_colormap};

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};

use crate::camera::DepthImage;
use crate::mask::CropWindow;
use crate::{PipelineError, Result};

/// Rendering options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Line thickness of detection boxes in pixels.
    pub box_thickness: u32,
    /// Radius of projected model points; `0` draws single pixels.
    pub point_radius: i32,
    /// Also draw the projected 3-D bounding box of the model.
    pub draw_model_box: bool,
    /// Grey out pixels beyond `clipping_distance_m` or without depth.
    pub remove_background: bool,
    pub clipping_distance_m: f64,
    pub background_grey: u8,
    /// Depth colormap scale per raw depth unit.
    pub depth_alpha: f32,
    /// Label colormap scale per class id.
    pub mask_gain: f32,
    /// Seed for the class palette; `None` seeds from the OS.
    pub palette_seed: Option<u64>,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            box_thickness: 3,
            point_radius: 1,
            draw_model_box: true,
            remove_background: false,
            clipping_distance_m: 2.0,
            background_grey: 153,
            depth_alpha: 0.03,
            mask_gain: 10.0,
            palette_seed: None,
        }
    }
}

/// Draw a crop outline `thickness` pixels wide, growing inwards.
pub fn draw_crop(image: &mut RgbImage, crop: CropWindow, color: Rgb<u8>, thickness: u32) {
    for i in 0..thickness.max(1) {
        let w = crop.width().saturating_sub(2 * i);
        let h = crop.height().saturating_sub(2 * i);
        if w == 0 || h == 0 {
            break;
        }
        let rect = Rect::at((crop.col_min + i) as i32, (crop.row_min + i) as i32).of_size(w, h);
        draw_hollow_rect_mut(image, rect, color);
    }
}

/// Draw each pixel position as a filled dot; off-image dots are clipped.
pub fn draw_points(image: &mut RgbImage, pixels: &[[f64; 2]], color: Rgb<u8>, radius: i32) {
    let (w, h) = image.dimensions();
    for p in pixels {
        let (x, y) = (p[0].round(), p[1].round());
        if radius <= 0 {
            if x >= 0.0 && y >= 0.0 && (x as u32) < w && (y as u32) < h {
                image.put_pixel(x as u32, y as u32, color);
            }
        } else {
            draw_filled_circle_mut(image, (x as i32, y as i32), radius, color);
        }
    }
}

/// Draw 2-D line segments.
pub fn draw_segments(image: &mut RgbImage, segments: &[([f64; 2], [f64; 2])], color: Rgb<u8>) {
    for (a, b) in segments {
        draw_line_segment_mut(
            image,
            (a[0] as f32, a[1] as f32),
            (b[0] as f32, b[1] as f32),
            color,
        );
    }
}

/// Paint pixels farther than `clipping_distance_m`, or without depth, grey.
pub fn remove_background(
    color: &RgbImage,
    depth: &DepthImage,
    clipping_distance_m: f64,
    depth_scale: f64,
    grey: u8,
) -> RgbImage {
    let clip_raw = clipping_distance_m / depth_scale;
    let mut out = color.clone();
    for (x, y, px) in out.enumerate_pixels_mut() {
        let d = depth.get_pixel_checked(x, y).map_or(0, |p| p[0]);
        if d == 0 || d as f64 > clip_raw {
            *px = Rgb([grey; 3]);
        }
    }
    out
}

/// Place panels side by side. All panels must share one height.
pub fn hstack(panels: &[&RgbImage]) -> Result<RgbImage> {
    let Some(first) = panels.first() else {
        return Err(PipelineError::Config("nothing to stack".to_string()));
    };
    let height = first.height();
    if let Some(bad) = panels.iter().find(|p| p.height() != height) {
        return Err(PipelineError::Config(format!(
            "panel heights differ: {} vs {}",
            bad.height(),
            height
        )));
    }

    let width = panels.iter().map(|p| p.width()).sum();
    let mut out = RgbImage::new(width, height);
    let mut x = 0i64;
    for panel in panels {
        image::imageops::replace(&mut out, *panel, x, 0);
        x += panel.width() as i64;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    const RED: Rgb<u8> = Rgb([255, 0, 0]);

    #[test]
    fn crop_outline_has_requested_thickness() {
        let mut img = RgbImage::new(50, 50);
        let crop = CropWindow {
            row_min: 10,
            row_max: 30,
            col_min: 10,
            col_max: 40,
        };
        draw_crop(&mut img, crop, RED, 3);
        for x in 10..13 {
            assert_eq!(*img.get_pixel(x, 20), RED);
        }
        assert_eq!(*img.get_pixel(13, 20), Rgb([0, 0, 0]));
        assert_eq!(*img.get_pixel(39, 29), RED);
        assert_eq!(*img.get_pixel(40, 29), Rgb([0, 0, 0]));
    }

    #[test]
    fn points_outside_image_are_ignored() {
        let mut img = RgbImage::new(10, 10);
        draw_points(&mut img, &[[2.4, 3.6], [-5.0, 3.0], [100.0, 1.0]], RED, 0);
        assert_eq!(*img.get_pixel(2, 4), RED);
        assert_eq!(img.pixels().filter(|p| **p == RED).count(), 1);

        draw_points(&mut img, &[[-1.0, 0.0], [5.0, 5.0]], RED, 1);
        assert_eq!(*img.get_pixel(5, 5), RED);
        assert_eq!(*img.get_pixel(0, 0), RED);
    }

    #[test]
    fn background_beyond_clipping_distance_is_grey() {
        let color = RgbImage::from_pixel(3, 1, Rgb([10, 20, 30]));
        let mut depth = DepthImage::new(3, 1);
        depth.put_pixel(0, 0, Luma([1500]));
        depth.put_pixel(1, 0, Luma([2500]));
        let out = remove_background(&color, &depth, 2.0, 0.001, 153);
        assert_eq!(*out.get_pixel(0, 0), Rgb([10, 20, 30]));
        assert_eq!(*out.get_pixel(1, 0), Rgb([153; 3]));
        assert_eq!(*out.get_pixel(2, 0), Rgb([153; 3]));
    }

    #[test]
    fn hstack_places_panels_left_to_right() {
        let a = RgbImage::from_pixel(2, 3, RED);
        let b = RgbImage::from_pixel(4, 3, Rgb([0, 255, 0]));
        let out = hstack(&[&a, &b]).unwrap();
        assert_eq!(out.dimensions(), (6, 3));
        assert_eq!(*out.get_pixel(1, 2), RED);
        assert_eq!(*out.get_pixel(2, 0), Rgb([0, 255, 0]));

        let tall = RgbImage::new(1, 4);
        assert!(hstack(&[&a, &tall]).is_err());
        assert!(hstack(&[]).is_err());
    }
}
