//! Label map → per-object binary masks, bounding boxes and network crops.
//!
//! Each object class is masked out of the label map, speckle components are
//! dropped, and the bounding box of the dominant region is grown to one of a
//! fixed set of crop sizes (multiples of `border_step`) so the pose network
//! only ever sees a handful of input shapes.

use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use crate::catalog::ObjectCatalog;
use crate::segment::LabelMap;

/// Axis-aligned pixel rectangle; `x`/`y` is the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBox {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// Half-open image window `[row_min, row_max) x [col_min, col_max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropWindow {
    pub row_min: u32,
    pub row_max: u32,
    pub col_min: u32,
    pub col_max: u32,
}

impl CropWindow {
    pub fn width(&self) -> u32 {
        self.col_max.saturating_sub(self.col_min)
    }

    pub fn height(&self) -> u32 {
        self.row_max.saturating_sub(self.row_min)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// `true` when image pixel `(x, y)` lies inside the window.
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.col_min && x < self.col_max && y >= self.row_min && y < self.row_max
    }
}

/// Mask extraction parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskConfig {
    /// Connected components smaller than this many pixels are discarded.
    pub min_component_area: u32,
    /// Crop sides are snapped up to multiples of this many pixels.
    pub border_step: u32,
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            min_component_area: 200,
            border_step: 40,
        }
    }
}

/// One segmented object instance in a frame.
#[derive(Debug, Clone)]
pub struct ObjectDetection {
    pub class_id: usize,
    pub name: String,
    /// Bounding box of the dominant mask region.
    pub bbox: PixelBox,
    /// Snapped crop fed to the pose network.
    pub crop: CropWindow,
    /// Full-frame binary mask (0 / 255) after speckle removal.
    pub mask: GrayImage,
    /// Number of mask pixels.
    pub pixel_count: u32,
}

/// Keep only 8-connected components with at least `min_area` pixels.
///
/// Any non-zero input pixel is foreground; output pixels are 0 or 255.
pub fn remove_small_components(mask: &GrayImage, min_area: u32) -> GrayImage {
    let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));
    let n_labels = labels.pixels().map(|p| p[0]).max().unwrap_or(0) as usize;
    let mut areas = vec![0u32; n_labels + 1];
    for p in labels.pixels() {
        areas[p[0] as usize] += 1;
    }

    let (w, h) = mask.dimensions();
    let mut out = GrayImage::new(w, h);
    for (x, y, p) in labels.enumerate_pixels() {
        let label = p[0] as usize;
        if label != 0 && areas[label] >= min_area {
            out.put_pixel(x, y, Luma([255]));
        }
    }
    out
}

/// Bounding box of the 8-connected region with the largest box area.
///
/// Returns `None` for an empty mask.
pub fn mask_to_bbox(mask: &GrayImage) -> Option<PixelBox> {
    let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));
    let n_labels = labels.pixels().map(|p| p[0]).max().unwrap_or(0) as usize;
    if n_labels == 0 {
        return None;
    }

    // [min_x, min_y, max_x, max_y] per label
    let mut bounds = vec![[u32::MAX, u32::MAX, 0u32, 0u32]; n_labels + 1];
    for (x, y, p) in labels.enumerate_pixels() {
        let label = p[0] as usize;
        if label == 0 {
            continue;
        }
        let b = &mut bounds[label];
        b[0] = b[0].min(x);
        b[1] = b[1].min(y);
        b[2] = b[2].max(x);
        b[3] = b[3].max(y);
    }

    let mut best: Option<PixelBox> = None;
    for b in bounds.iter().skip(1) {
        if b[0] > b[2] {
            continue;
        }
        let candidate = PixelBox {
            x: b[0],
            y: b[1],
            w: b[2] - b[0] + 1,
            h: b[3] - b[1] + 1,
        };
        let area = candidate.w as u64 * candidate.h as u64;
        if best.map_or(true, |cur| area > cur.w as u64 * cur.h as u64) {
            best = Some(candidate);
        }
    }
    best
}

/// Round a side length up to the next border-list entry
/// `[-1, step, 2*step, ...]`; exact multiples are kept.
fn snap_length(len: i64, step: i64) -> i64 {
    if len > 0 && len % step == 0 {
        len
    } else {
        (len.max(0) / step + 1) * step
    }
}

/// Grow `bbox` into a network crop whose sides are multiples of
/// `border_step`, centered on the box and shifted back inside the image.
pub fn snap_crop(bbox: PixelBox, image_size: (u32, u32), border_step: u32) -> CropWindow {
    let (w, h) = (image_size.0 as i64, image_size.1 as i64);
    let step = border_step.max(1) as i64;

    let row_min = (bbox.y as i64).max(0);
    let row_max = (bbox.y as i64 + bbox.h as i64).min(h - 1);
    let col_min = (bbox.x as i64).max(0);
    let col_max = (bbox.x as i64 + bbox.w as i64).min(w - 1);

    let r_b = snap_length(row_max - row_min, step);
    let c_b = snap_length(col_max - col_min, step);
    let center_r = (row_min + row_max) / 2;
    let center_c = (col_min + col_max) / 2;

    let mut r0 = center_r - r_b / 2;
    let mut r1 = center_r + r_b / 2;
    let mut c0 = center_c - c_b / 2;
    let mut c1 = center_c + c_b / 2;

    if r0 < 0 {
        r1 -= r0;
        r0 = 0;
    }
    if c0 < 0 {
        c1 -= c0;
        c0 = 0;
    }
    if r1 > h {
        r0 -= r1 - h;
        r1 = h;
    }
    if c1 > w {
        c0 -= c1 - w;
        c1 = w;
    }

    CropWindow {
        row_min: r0.max(0) as u32,
        row_max: r1.clamp(0, h) as u32,
        col_min: c0.max(0) as u32,
        col_max: c1.clamp(0, w) as u32,
    }
}

/// Extract every non-background object present in `labels`.
///
/// Classes whose mask is empty after speckle removal produce no detection.
pub fn extract_objects(
    labels: &LabelMap,
    catalog: &ObjectCatalog,
    cfg: &MaskConfig,
) -> Vec<ObjectDetection> {
    let (w, h) = labels.dimensions();
    let mut detections = Vec::new();

    for (class_id, name) in catalog.objects() {
        let mut raw = GrayImage::new(w, h);
        let mut any = false;
        for (x, y, p) in labels.enumerate_pixels() {
            if p[0] as usize == class_id {
                raw.put_pixel(x, y, Luma([255]));
                any = true;
            }
        }
        if !any {
            continue;
        }

        let mask = remove_small_components(&raw, cfg.min_component_area);
        let Some(bbox) = mask_to_bbox(&mask) else {
            tracing::trace!(class_id, "only small components; dropped");
            continue;
        };
        let pixel_count = mask.pixels().filter(|p| p[0] > 0).count() as u32;
        let crop = snap_crop(bbox, (w, h), cfg.border_step);

        detections.push(ObjectDetection {
            class_id,
            name: name.to_string(),
            bbox,
            crop,
            mask,
            pixel_count,
        });
    }

    tracing::debug!("{} objects segmented", detections.len());
    detections
}

/// Paint each detection's mask with its class id.
pub fn composite_label_mask(detections: &[ObjectDetection], size: (u32, u32)) -> LabelMap {
    let mut out = LabelMap::new(size.0, size.1);
    for det in detections {
        for (x, y, p) in det.mask.enumerate_pixels() {
            if p[0] > 0 && x < size.0 && y < size.1 {
                out.put_pixel(x, y, Luma([det.class_id as u16]));
            }
        }
    }
    out
}

/// Bounding box of the pixels scoring at least
/// `max(0, relative_threshold * (max - min) + min)` in a class score map.
pub fn bbox_from_scores(scores: ArrayView2<'_, f32>, relative_threshold: f32) -> Option<PixelBox> {
    let max_v = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let min_v = scores.iter().copied().fold(f32::INFINITY, f32::min);
    if !max_v.is_finite() || !min_v.is_finite() {
        return None;
    }
    let threshold = (relative_threshold * (max_v - min_v) + min_v).max(0.0);

    let mut bounds: Option<[usize; 4]> = None;
    for ((r, c), &v) in scores.indexed_iter() {
        if v < threshold {
            continue;
        }
        let b = bounds.get_or_insert([r, r, c, c]);
        b[0] = b[0].min(r);
        b[1] = b[1].max(r);
        b[2] = b[2].min(c);
        b[3] = b[3].max(c);
    }

    bounds.map(|[r0, r1, c0, c1]| PixelBox {
        x: c0 as u32,
        y: r0 as u32,
        w: (c1 - c0 + 1) as u32,
        h: (r1 - r0 + 1) as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fill_rect;
    use ndarray::Array2;

    #[test]
    fn small_components_are_removed() {
        let mut mask = GrayImage::new(40, 40);
        fill_rect(&mut mask, 2, 2, 10, 10, 1); // 100 px
        fill_rect(&mut mask, 30, 30, 3, 3, 1); // 9 px
        let out = remove_small_components(&mask, 50);
        assert_eq!(out.get_pixel(5, 5)[0], 255);
        assert_eq!(out.get_pixel(31, 31)[0], 0);
        assert_eq!(out.pixels().filter(|p| p[0] == 255).count(), 100);
    }

    #[test]
    fn diagonal_pixels_are_connected() {
        let mut mask = GrayImage::new(10, 10);
        for i in 0..6 {
            mask.put_pixel(i, i, Luma([255]));
        }
        let out = remove_small_components(&mask, 6);
        assert_eq!(out.pixels().filter(|p| p[0] == 255).count(), 6);
    }

    #[test]
    fn bbox_picks_largest_region() {
        let mut mask = GrayImage::new(100, 100);
        fill_rect(&mut mask, 10, 20, 30, 15, 255);
        fill_rect(&mut mask, 70, 70, 5, 5, 255);
        let bbox = mask_to_bbox(&mask).unwrap();
        assert_eq!(
            bbox,
            PixelBox {
                x: 10,
                y: 20,
                w: 30,
                h: 15
            }
        );
        assert!(mask_to_bbox(&GrayImage::new(5, 5)).is_none());
    }

    #[test]
    fn snap_rounds_sides_to_border_steps() {
        let bbox = PixelBox {
            x: 300,
            y: 200,
            w: 50,
            h: 30,
        };
        let crop = snap_crop(bbox, (640, 480), 40);
        assert_eq!(crop.height(), 40);
        assert_eq!(crop.width(), 80);
        // Centered on the box.
        assert_eq!(crop.row_min, 215 - 20);
        assert_eq!(crop.col_min, 325 - 40);
    }

    #[test]
    fn snap_keeps_exact_multiples() {
        let bbox = PixelBox {
            x: 100,
            y: 100,
            w: 80,
            h: 120,
        };
        let crop = snap_crop(bbox, (640, 480), 40);
        assert_eq!((crop.width(), crop.height()), (80, 120));
    }

    #[test]
    fn snap_shifts_window_inside_image() {
        let top_left = snap_crop(
            PixelBox {
                x: 0,
                y: 0,
                w: 30,
                h: 50,
            },
            (640, 480),
            40,
        );
        assert_eq!(top_left.row_min, 0);
        assert_eq!(top_left.col_min, 0);
        assert_eq!((top_left.width(), top_left.height()), (40, 80));

        let bottom_right = snap_crop(
            PixelBox {
                x: 620,
                y: 460,
                w: 20,
                h: 20,
            },
            (640, 480),
            40,
        );
        assert_eq!(bottom_right.row_max, 480);
        assert_eq!(bottom_right.col_max, 640);
        assert_eq!((bottom_right.width(), bottom_right.height()), (40, 40));
    }

    #[test]
    fn extract_objects_reports_each_present_class() {
        let catalog = ObjectCatalog::new(["a", "b", "c"]).unwrap();
        let mut labels = LabelMap::new(120, 100);
        for y in 10..40 {
            for x in 10..50 {
                labels.put_pixel(x, y, Luma([1]));
            }
        }
        for y in 60..90 {
            for x in 70..110 {
                labels.put_pixel(x, y, Luma([3]));
            }
        }
        // Class 2 only as speckle.
        labels.put_pixel(100, 5, Luma([2]));

        let cfg = MaskConfig {
            min_component_area: 20,
            border_step: 40,
        };
        let dets = extract_objects(&labels, &catalog, &cfg);
        let ids: Vec<usize> = dets.iter().map(|d| d.class_id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(dets[0].pixel_count, 30 * 40);
        assert_eq!(dets[1].name, "c");
        assert!(dets.iter().all(|d| !d.crop.is_empty()));

        let composite = composite_label_mask(&dets, (120, 100));
        assert_eq!(composite.get_pixel(20, 20)[0], 1);
        assert_eq!(composite.get_pixel(80, 70)[0], 3);
        assert_eq!(composite.get_pixel(100, 5)[0], 0);
    }

    #[test]
    fn score_bbox_uses_relative_threshold() {
        let mut scores = Array2::<f32>::zeros((20, 30));
        for r in 5..8 {
            for c in 10..15 {
                scores[[r, c]] = 1.0;
            }
        }
        scores[[1, 1]] = 0.5;
        let bbox = bbox_from_scores(scores.view(), 0.8).unwrap();
        assert_eq!(
            bbox,
            PixelBox {
                x: 10,
                y: 5,
                w: 5,
                h: 3
            }
        );
    }
}
