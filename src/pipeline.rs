//! Still-image entry points: tone map → grid → dots (raster or SVG).

use std::path::Path;

use image::RgbaImage;
use image::imageops;

use crate::config::RenderConfig;
use crate::draw::{RESAMPLE_FILTER, prescale, render_dots};
use crate::error::{Error, Result};
use crate::svg::render_svg;
use crate::tone::{adjust, grayscale};

pub fn load_image(path: &Path) -> Result<RgbaImage> {
    let img = image::open(path)
        .map_err(|e| Error::invalid_image(format!("cannot read '{}': {e}", path.display())))?;
    Ok(img.to_rgba8())
}

/// Grayscale, optional resize to `output_size`, then tone adjustments.
pub fn prepare(
    img: &RgbaImage,
    output_size: Option<(u32, u32)>,
    cfg: &RenderConfig,
) -> Result<RgbaImage> {
    let mut gray = grayscale(img)?;
    if let Some((w, h)) = output_size {
        if w == 0 || h == 0 {
            return Err(Error::invalid_image(format!("output size {w}x{h} is empty")));
        }
        gray = imageops::resize(&gray, w, h, RESAMPLE_FILTER);
    }
    adjust(&gray, cfg)
}

#[tracing::instrument(level = "debug", skip_all, fields(w = img.width(), h = img.height()))]
pub fn process(
    img: &RgbaImage,
    output_size: Option<(u32, u32)>,
    cfg: &RenderConfig,
) -> Result<RgbaImage> {
    render_dots(&prepare(img, output_size, cfg)?, cfg)
}

/// One video frame at its native size.
pub fn process_frame(frame: &RgbaImage, cfg: &RenderConfig) -> Result<RgbaImage> {
    process(frame, None, cfg)
}

/// SVG text for `img`, sized like the raster output would be.
pub fn process_svg(
    img: &RgbaImage,
    output_size: Option<(u32, u32)>,
    cfg: &RenderConfig,
) -> Result<String> {
    let prepared = prepare(img, output_size, cfg)?;
    let scaled = prescale(&prepared, cfg)?;
    Ok(render_svg(scaled.as_ref().unwrap_or(&prepared), cfg))
}

pub fn save_as_svg(
    input: &Path,
    output: &Path,
    output_size: Option<(u32, u32)>,
    cfg: &RenderConfig,
) -> Result<()> {
    let img = load_image(input)?;
    let svg = process_svg(&img, output_size, cfg)?;
    std::fs::write(output, svg)?;
    Ok(())
}
