//! Dot layout and supersampled circle rasterization (image)

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgba, RgbaImage};

use crate::config::RenderConfig;
use crate::error::{Error, Result};
use crate::grid::sample_grid;

/// Interpolation used for every resize in the pipeline.
pub const RESAMPLE_FILTER: FilterType = FilterType::CatmullRom;

/// One non-empty dot in output pixel space (before supersampling).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Dot {
    pub row: u32,
    pub col: u32,
    pub cx: f32,
    pub cy: f32,
    pub radius: f32,
}

/// Darker cells give bigger dots: 0 → `grid_size / 2`, 255 → 0.
pub fn dot_radius(avg: f32, grid_size: f32) -> f32 {
    (255.0 - avg) * grid_size / 510.0
}

/// Binarize against `threshold` when it is non-zero.
pub fn apply_threshold(radius: f32, grid_size: f32, threshold: f32) -> f32 {
    if threshold == 0.0 {
        return radius;
    }
    if radius > threshold {
        dot_radius(0.0, grid_size)
    } else {
        0.0
    }
}

/// Resize by `size_scale` when it differs from 1. Returns `None` when no resize is needed.
pub fn prescale(img: &RgbaImage, cfg: &RenderConfig) -> Result<Option<RgbaImage>> {
    let scale = cfg.size_scale();
    if (scale - 1.0).abs() <= f32::EPSILON {
        return Ok(None);
    }
    let w = (img.width() as f32 * scale) as u32;
    let h = (img.height() as f32 * scale) as u32;
    if w == 0 || h == 0 {
        return Err(Error::invalid_image(format!(
            "size scale {scale} shrinks {}x{} to nothing",
            img.width(),
            img.height()
        )));
    }
    Ok(Some(imageops::resize(img, w, h, RESAMPLE_FILTER)))
}

/// Sample `img` (already at output size) and keep every cell whose radius is positive.
pub fn layout_dots(img: &RgbaImage, cfg: &RenderConfig) -> Vec<Dot> {
    let grid = cfg.grid_size();
    let threshold = cfg.no_gradient_halftone_threshold();
    sample_grid(img, grid)
        .into_iter()
        .filter_map(|cell| {
            let radius = apply_threshold(dot_radius(cell.avg, grid), grid, threshold);
            if radius <= 0.0 {
                return None;
            }
            let (x1, y1) = cell.origin(grid);
            Some(Dot {
                row: cell.row,
                col: cell.col,
                cx: x1 + grid / 2.0,
                cy: y1 + grid / 2.0,
                radius,
            })
        })
        .collect()
}

/// Draw `dots` on a canvas `aa_scale` times larger, then resample to `width`×`height`.
pub fn rasterize(width: u32, height: u32, dots: &[Dot], cfg: &RenderConfig) -> RgbaImage {
    let aa = cfg.aa_scale();
    let mut canvas = ImageBuffer::from_fn(width * aa, height * aa, |_, _| Rgba(cfg.bg_color()));

    let k = aa as f32;
    for dot in dots {
        fill_circle(
            &mut canvas,
            dot.cx * k,
            dot.cy * k,
            dot.radius * k,
            cfg.dot_color(),
        );
    }

    if aa == 1 {
        return canvas;
    }
    imageops::resize(&canvas, width, height, RESAMPLE_FILTER)
}

/// Tone-mapped grayscale in, halftone out. Output size is the input scaled by `size_scale`.
pub fn render_dots(img: &RgbaImage, cfg: &RenderConfig) -> Result<RgbaImage> {
    let scaled = prescale(img, cfg)?;
    let source = scaled.as_ref().unwrap_or(img);
    let dots = layout_dots(source, cfg);
    Ok(rasterize(source.width(), source.height(), &dots, cfg))
}

/// Anti-aliased filled circle; edge pixels get partial coverage.
fn fill_circle(img: &mut RgbaImage, cx: f32, cy: f32, r: f32, color: [u8; 4]) {
    if r <= 0.0 {
        return;
    }
    let (width, height) = img.dimensions();
    let x0 = (cx - r - 1.0).floor().max(0.0) as u32;
    let y0 = (cy - r - 1.0).floor().max(0.0) as u32;
    let x1 = ((cx + r + 1.0).ceil().max(0.0) as u32).min(width);
    let y1 = ((cy + r + 1.0).ceil().max(0.0) as u32).min(height);

    for y in y0..y1 {
        for x in x0..x1 {
            let dx = x as f32 + 0.5 - cx;
            let dy = y as f32 + 0.5 - cy;
            let coverage = (r - (dx * dx + dy * dy).sqrt() + 0.5).clamp(0.0, 1.0);
            if coverage <= 0.0 {
                continue;
            }
            let px = img.get_pixel_mut(x, y);
            *px = blend(*px, color, coverage);
        }
    }
}

fn blend(dst: Rgba<u8>, src: [u8; 4], a: f32) -> Rgba<u8> {
    let mix = |d: u8, s: u8| (d as f32 * (1.0 - a) + s as f32 * a).round() as u8;
    Rgba([
        mix(dst[0], src[0]),
        mix(dst[1], src[1]),
        mix(dst[2], src[2]),
        mix(dst[3], src[3]),
    ])
}
