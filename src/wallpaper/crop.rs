//! Cover-fit cropping
//!
//! The virtual desktop is mapped onto the source image at one shared scale
//! (source pixels per desktop pixel), centered, and each monitor takes the
//! slice that sits under it. Only the slice is resampled, to the monitor's
//! device pixels.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, GenericImageView, ImageEncoder};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::geometry::{Monitor, VirtualDesktopBounds};

pub const DEFAULT_JPEG_QUALITY: u8 = 95;

#[derive(Error, Debug)]
pub enum CropError {
    #[error("crop region {0} does not fit the source image")]
    InvalidRegion(String),

    #[error("could not decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("could not encode image: {0}")]
    EncodeFailure(#[source] image::ImageError),

    #[error("could not write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SourceImage {
    pub pixel_width: u32,
    pub pixel_height: u32,
}

impl SourceImage {
    pub fn of(image: &DynamicImage) -> Self {
        let (pixel_width, pixel_height) = image.dimensions();
        Self {
            pixel_width,
            pixel_height,
        }
    }
}

/// Source-pixel rectangle for one monitor plus the device-pixel size it is
/// resampled to.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CropRegion {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
    pub output_width: u32,
    pub output_height: u32,
}

impl std::fmt::Display for CropRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{}+{}+{} -> {}x{}",
            self.width, self.height, self.left, self.top, self.output_width, self.output_height
        )
    }
}

/// Source pixels per desktop pixel: the larger of the two axis ratios, so one
/// axis of the scaled desktop matches the image exactly.
pub fn cover_scale(source: SourceImage, bounds: &VirtualDesktopBounds) -> f64 {
    let scale_x = f64::from(source.pixel_width) / f64::from(bounds.total_width);
    let scale_y = f64::from(source.pixel_height) / f64::from(bounds.total_height);
    scale_x.max(scale_y)
}

pub fn compute_crop_region(
    source: SourceImage,
    bounds: &VirtualDesktopBounds,
    monitor: &Monitor,
) -> CropRegion {
    let scale = cover_scale(source, bounds);
    let img_w = f64::from(source.pixel_width);
    let img_h = f64::from(source.pixel_height);

    let offset_x = (img_w - f64::from(bounds.total_width) * scale) / 2.0;
    let offset_y = (img_h - f64::from(bounds.total_height) * scale) / 2.0;

    let rel_x = f64::from(monitor.x) - f64::from(bounds.min_x);
    let rel_y = f64::from(monitor.y) - f64::from(bounds.min_y);
    let left = clamp_origin((rel_x * scale + offset_x).round(), source.pixel_width);
    let top = clamp_origin((rel_y * scale + offset_y).round(), source.pixel_height);

    let width = clamp_extent(
        (f64::from(monitor.width) * scale).round(),
        source.pixel_width - left,
    );
    let height = clamp_extent(
        (f64::from(monitor.height) * scale).round(),
        source.pixel_height - top,
    );

    let (output_width, output_height) = monitor.device_size();
    CropRegion {
        left,
        top,
        width,
        height,
        output_width,
        output_height,
    }
}

// Keeps the origin inside [0, limit).
fn clamp_origin(raw: f64, limit: u32) -> u32 {
    if raw <= 0.0 {
        0
    } else {
        (raw as u64).min(u64::from(limit.saturating_sub(1))) as u32
    }
}

fn clamp_extent(raw: f64, remaining: u32) -> u32 {
    let raw = if raw <= 0.0 { 0 } else { raw as u64 };
    (raw.min(u64::from(remaining)) as u32).max(1)
}

pub fn decode(bytes: &[u8]) -> Result<DynamicImage, CropError> {
    image::load_from_memory(bytes).map_err(CropError::Decode)
}

/// Extracts `region`, resamples it to the output size and encodes it as JPEG.
pub fn crop(image: &DynamicImage, region: &CropRegion, quality: u8) -> Result<Vec<u8>, CropError> {
    let (img_w, img_h) = image.dimensions();
    let fits = region.width > 0
        && region.height > 0
        && region.output_width > 0
        && region.output_height > 0
        && u64::from(region.left) + u64::from(region.width) <= u64::from(img_w)
        && u64::from(region.top) + u64::from(region.height) <= u64::from(img_h);
    if !fits {
        return Err(CropError::InvalidRegion(region.to_string()));
    }

    let resized = image
        .crop_imm(region.left, region.top, region.width, region.height)
        .resize_exact(region.output_width, region.output_height, FilterType::Lanczos3)
        .to_rgb8();

    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, quality.clamp(1, 100))
        .write_image(
            resized.as_raw(),
            resized.width(),
            resized.height(),
            ExtendedColorType::Rgb8,
        )
        .map_err(CropError::EncodeFailure)?;
    Ok(encoded)
}

/// `wallpaper_<id>.jpg`. ASCII letters, digits and `-` pass through; every
/// other byte, `_` included, becomes `_XX` hex, so distinct ids never share
/// a file.
pub fn output_file_name(monitor_id: &str) -> String {
    let mut safe = String::with_capacity(monitor_id.len());
    for b in monitor_id.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' {
            safe.push(char::from(b));
        } else {
            safe.push_str(&format!("_{b:02X}"));
        }
    }
    format!("wallpaper_{safe}.jpg")
}

/// Writes through a temp file in the same directory so the host never picks
/// up a half-written image.
pub fn write_output(dir: &Path, monitor_id: &str, bytes: &[u8]) -> Result<PathBuf, CropError> {
    let path = dir.join(output_file_name(monitor_id));
    let io_err = |source| CropError::Io {
        path: path.clone(),
        source,
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(bytes).map_err(io_err)?;
    tmp.persist(&path).map_err(|e| io_err(e.error))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallpaper::geometry::resolve_bounds;
    use image::{Rgb, RgbImage};

    fn source(w: u32, h: u32) -> SourceImage {
        SourceImage {
            pixel_width: w,
            pixel_height: h,
        }
    }

    #[test]
    fn single_monitor_matching_aspect_uses_whole_image() {
        let m = Monitor::new("a", 0, 0, 1920, 1080);
        let bounds = resolve_bounds(std::slice::from_ref(&m)).unwrap();
        assert_eq!(cover_scale(source(3840, 2160), &bounds), 2.0);

        let region = compute_crop_region(source(3840, 2160), &bounds, &m);
        assert_eq!(
            (region.left, region.top, region.width, region.height),
            (0, 0, 3840, 2160)
        );
        assert_eq!((region.output_width, region.output_height), (1920, 1080));
    }

    #[test]
    fn side_by_side_monitors_tile_exactly() {
        let a = Monitor::new("A", 0, 0, 1920, 1080);
        let b = Monitor::new("B", 1920, 0, 1920, 1080);
        let bounds = resolve_bounds(&[a.clone(), b.clone()]).unwrap();
        assert_eq!((bounds.total_width, bounds.total_height), (3840, 1080));

        let src = source(3840, 1080);
        let ra = compute_crop_region(src, &bounds, &a);
        let rb = compute_crop_region(src, &bounds, &b);
        assert_eq!((ra.left, ra.top, ra.width, ra.height), (0, 0, 1920, 1080));
        assert_eq!((rb.left, rb.top, rb.width, rb.height), (1920, 0, 1920, 1080));
        assert_eq!(ra.left + ra.width, rb.left);
    }

    #[test]
    fn wider_source_spans_full_width_of_single_monitor() {
        // scale = max(4000/2000, 1000/1000) = 2; the scaled desk overflows vertically
        let m = Monitor::new("a", 0, 0, 2000, 1000);
        let bounds = resolve_bounds(std::slice::from_ref(&m)).unwrap();
        let region = compute_crop_region(source(4000, 1000), &bounds, &m);
        assert_eq!((region.left, region.top, region.width, region.height), (0, 0, 4000, 1000));
    }

    #[test]
    fn centering_offset_shifts_monitors_on_the_overflowing_axis() {
        // desk 2000x500, source 2000x2000: scale 4, scaled desk 8000 wide, offX -3000
        let a = Monitor::new("A", 0, 0, 1000, 500);
        let b = Monitor::new("B", 1000, 0, 1000, 500);
        let bounds = resolve_bounds(&[a.clone(), b.clone()]).unwrap();
        let src = source(2000, 2000);
        assert_eq!(cover_scale(src, &bounds), 4.0);

        let ra = compute_crop_region(src, &bounds, &a);
        let rb = compute_crop_region(src, &bounds, &b);
        assert_eq!((ra.left, ra.top, ra.width, ra.height), (0, 0, 2000, 2000));
        assert_eq!((rb.left, rb.top, rb.width, rb.height), (1000, 0, 1000, 2000));
    }

    #[test]
    fn scale_fits_one_axis_exactly_and_overflows_the_other() {
        let monitors = [
            Monitor::new("l", -1280, 300, 1280, 1024),
            Monitor::new("c", 0, 0, 2560, 1440),
            Monitor::new("r", 2560, 0, 1080, 1920),
        ];
        let bounds = resolve_bounds(&monitors).unwrap();
        for (w, h) in [(6000, 4000), (1920, 1080), (5000, 1200), (800, 3000)] {
            let src = source(w, h);
            let scale = cover_scale(src, &bounds);
            let covered_w = scale * f64::from(bounds.total_width);
            let covered_h = scale * f64::from(bounds.total_height);
            assert!(covered_w >= f64::from(w) - 1e-6);
            assert!(covered_h >= f64::from(h) - 1e-6);
            let exact_w = (covered_w - f64::from(w)).abs() < 1e-6;
            let exact_h = (covered_h - f64::from(h)).abs() < 1e-6;
            assert!(exact_w || exact_h, "{w}x{h}: neither axis fits exactly");
        }
    }

    #[test]
    fn regions_stay_inside_the_source() {
        let monitors = [
            Monitor::new("l", -1920, 0, 1920, 1080),
            Monitor::new("c", 0, -200, 2560, 1440).with_scale(2.0),
            Monitor::new("tiny", 2560, 1239, 1, 1),
        ];
        let bounds = resolve_bounds(&monitors).unwrap();
        for (w, h) in [(7, 5), (1, 1), (6016, 3384), (1000, 9000)] {
            for m in &monitors {
                let r = compute_crop_region(source(w, h), &bounds, m);
                assert!(r.width >= 1 && r.height >= 1);
                assert!(r.left < w && r.top < h, "{r} outside {w}x{h}");
                assert!(r.left + r.width <= w && r.top + r.height <= h, "{r} outside {w}x{h}");
            }
        }
    }

    #[test]
    fn computation_is_deterministic() {
        let m = Monitor::new("a", 100, 50, 1440, 900).with_scale(1.5);
        let bounds = resolve_bounds(&[m.clone(), Monitor::new("b", 0, 0, 100, 100)]).unwrap();
        let first = compute_crop_region(source(5472, 3648), &bounds, &m);
        let second = compute_crop_region(source(5472, 3648), &bounds, &m);
        assert_eq!(first, second);
    }

    #[test]
    fn crop_produces_jpeg_of_device_size() {
        let mut img = RgbImage::new(64, 32);
        for (x, _, px) in img.enumerate_pixels_mut() {
            *px = if x < 32 { Rgb([255, 0, 0]) } else { Rgb([0, 0, 255]) };
        }
        let img = DynamicImage::ImageRgb8(img);
        let region = CropRegion {
            left: 32,
            top: 0,
            width: 32,
            height: 32,
            output_width: 16,
            output_height: 16,
        };

        let bytes = crop(&img, &region, DEFAULT_JPEG_QUALITY).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (16, 16));
        let center = decoded.to_rgb8().get_pixel(8, 8).0;
        assert!(center[2] > 200 && center[0] < 60, "expected blue, got {center:?}");
    }

    #[test]
    fn crop_rejects_region_outside_image() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(10, 10));
        let region = CropRegion {
            left: 8,
            top: 0,
            width: 5,
            height: 10,
            output_width: 5,
            output_height: 10,
        };
        assert!(matches!(crop(&img, &region, 95), Err(CropError::InvalidRegion(_))));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(decode(b"not an image"), Err(CropError::Decode(_))));
    }

    #[test]
    fn output_names_are_deterministic_and_safe() {
        assert_eq!(output_file_name("69733382"), "wallpaper_69733382.jpg");
        assert_eq!(
            output_file_name("../DP-1 left"),
            "wallpaper__2E_2E_2FDP-1_20left.jpg"
        );
    }

    #[test]
    fn ids_differing_only_in_unsafe_characters_get_distinct_files() {
        assert_eq!(output_file_name("L/1"), "wallpaper_L_2F1.jpg");
        assert_eq!(output_file_name("L_1"), "wallpaper_L_5F1.jpg");

        let ids = ["L/1", "L_1", "L 1", "L_201", "L_5F1", "Ä"];
        let names: std::collections::HashSet<String> =
            ids.iter().map(|id| output_file_name(id)).collect();
        assert_eq!(names.len(), ids.len());
    }

    #[test]
    fn write_output_replaces_previous_cycle_file() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_output(dir.path(), "a", b"one").unwrap();
        let second = write_output(dir.path(), "a", b"two").unwrap();
        assert_eq!(first, second);
        assert_eq!(std::fs::read(&second).unwrap(), b"two");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
