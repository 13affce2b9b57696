//! Grayscale conversion and tone adjustments (contrast/brightness, gamma, channel-mix "blur").
//!
//! Every pass takes a buffer by reference and returns a fresh one.

use image::{Rgba, RgbaImage};

use crate::config::RenderConfig;
use crate::error::{Error, Result};

pub const LUMA_R: f32 = 0.299;
pub const LUMA_G: f32 = 0.587;
pub const LUMA_B: f32 = 0.114;

#[inline]
pub fn luma(px: &Rgba<u8>) -> f32 {
    px[0] as f32 * LUMA_R + px[1] as f32 * LUMA_G + px[2] as f32 * LUMA_B
}

#[inline]
fn to_channel(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

pub fn ensure_non_empty(img: &RgbaImage) -> Result<()> {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Err(Error::invalid_image(format!("image has zero size ({w}x{h})")));
    }
    Ok(())
}

fn map_pixels(img: &RgbaImage, f: impl Fn(&Rgba<u8>) -> Rgba<u8>) -> RgbaImage {
    let mut out = img.clone();
    for px in out.pixels_mut() {
        *px = f(px);
    }
    out
}

/// Gray RGB triple from luma weights; alpha kept.
pub fn grayscale(img: &RgbaImage) -> Result<RgbaImage> {
    ensure_non_empty(img)?;
    Ok(map_pixels(img, |px| {
        let y = to_channel(luma(px));
        Rgba([y, y, y, px[3]])
    }))
}

/// `c * contrast + brightness` per color channel, saturated to 0..=255.
pub fn contrast_brightness(img: &RgbaImage, contrast: f32, brightness: f32) -> RgbaImage {
    map_pixels(img, |px| {
        let f = |c: u8| to_channel(c as f32 * contrast + brightness);
        Rgba([f(px[0]), f(px[1]), f(px[2]), px[3]])
    })
}

pub fn gamma_lut(gamma: f32) -> [u8; 256] {
    let mut lut = [0u8; 256];
    let inv = 1.0 / gamma as f64;
    for (i, v) in lut.iter_mut().enumerate() {
        *v = ((i as f64 / 255.0).powf(inv) * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

pub fn apply_gamma(img: &RgbaImage, gamma: f32) -> RgbaImage {
    let lut = gamma_lut(gamma);
    map_pixels(img, |px| {
        Rgba([
            lut[px[0] as usize],
            lut[px[1] as usize],
            lut[px[2] as usize],
            px[3],
        ])
    })
}

/// Channel-mixing pass: every color channel becomes `(R + G + B) / (2 * radius + 1)`.
///
/// This never looks at neighboring pixels. Radii above 3 run the pass twice.
pub fn channel_mix_blur(img: &RgbaImage, radius: i32) -> RgbaImage {
    let weight = 1.0 / (radius * 2 + 1) as f32;
    let pass = |src: &RgbaImage| {
        map_pixels(src, |px| {
            let v = to_channel((px[0] as f32 + px[1] as f32 + px[2] as f32) * weight);
            Rgba([v, v, v, px[3]])
        })
    };
    let once = pass(img);
    if radius > 3 { pass(&once) } else { once }
}

/// Contrast/brightness, then gamma (when not 1), then the channel-mix pass.
pub fn adjust(img: &RgbaImage, cfg: &RenderConfig) -> Result<RgbaImage> {
    ensure_non_empty(img)?;
    let mut out = contrast_brightness(img, cfg.contrast(), cfg.brightness());
    if (cfg.gamma() - 1.0).abs() > f32::EPSILON {
        out = apply_gamma(&out, cfg.gamma());
    }
    if cfg.blur_radius() > 0 {
        out = channel_mix_blur(&out, cfg.blur_radius());
    }
    Ok(out)
}

/// Full tone mapping: grayscale followed by [`adjust`].
pub fn tone_map(img: &RgbaImage, cfg: &RenderConfig) -> Result<RgbaImage> {
    adjust(&grayscale(img)?, cfg)
}
