//! SVG emission of the same dot layout the raster path draws.

use image::RgbaImage;

use crate::config::RenderConfig;
use crate::draw::{Dot, layout_dots};

fn color_name(rgba: [u8; 4]) -> &'static str {
    if rgba[0] == 0 { "black" } else { "white" }
}

/// Render pre-computed dots on a `width`×`height` canvas.
pub fn svg_document(width: u32, height: u32, dots: &[Dot], cfg: &RenderConfig) -> String {
    let mut svg = String::with_capacity(128 + dots.len() * 64);
    let fill = color_name(cfg.dot_color());

    svg.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    svg.push_str(&format!(
        "<svg width=\"{width}\" height=\"{height}\" xmlns=\"http://www.w3.org/2000/svg\">\n"
    ));
    svg.push_str("<g>\n");
    svg.push_str(&format!(
        "<rect width=\"{width}\" height=\"{height}\" fill=\"{}\"/>\n",
        color_name(cfg.bg_color())
    ));
    for dot in dots {
        svg.push_str(&format!(
            "<circle cx=\"{:.2}\" cy=\"{:.2}\" r=\"{:.2}\" fill=\"{fill}\"/>\n",
            dot.cx, dot.cy, dot.radius
        ));
    }
    svg.push_str("</g>\n</svg>\n");
    svg
}

/// `img` must already be tone-mapped and at output size.
pub fn render_svg(img: &RgbaImage, cfg: &RenderConfig) -> String {
    let dots = layout_dots(img, cfg);
    svg_document(img.width(), img.height(), &dots, cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenderParams;
    use image::Rgba;

    #[test]
    fn header_and_background() {
        let img = RgbaImage::from_pixel(30, 20, Rgba([255, 255, 255, 255]));
        let svg = render_svg(&img, &RenderConfig::default());
        assert!(svg.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n"));
        assert!(svg.contains(r#"<svg width="30" height="20" xmlns="http://www.w3.org/2000/svg">"#));
        assert!(svg.contains(r#"<rect width="30" height="20" fill="white"/>"#));
        assert!(!svg.contains("<circle"));
        assert!(svg.ends_with("</g>\n</svg>\n"));
    }

    #[test]
    fn circles_use_two_decimals_and_inverse_fill() {
        let img = RgbaImage::from_pixel(12, 12, Rgba([128, 128, 128, 255]));
        let svg = render_svg(&img, &RenderConfig::default());
        assert!(
            svg.contains(r#"<circle cx="6.00" cy="6.00" r="2.99" fill="black"/>"#),
            "{svg}"
        );

        let inverted = RenderParams {
            is_opposition: true,
            ..RenderParams::default()
        }
        .build()
        .unwrap();
        let svg = render_svg(&img, &inverted);
        assert!(svg.contains(r#"fill="black"/>"#));
        assert!(svg.contains(r#"r="2.99" fill="white"/>"#));
    }

    /// Cells whose center pixel was painted in the rasterized output.
    fn inked_cells(out: &RgbaImage, grid: u32, bg: u8) -> usize {
        let (rows, cols) = (out.height() / grid, out.width() / grid);
        (0..rows)
            .flat_map(|r| (0..cols).map(move |c| (c * grid + grid / 2, r * grid + grid / 2)))
            .filter(|&(x, y)| out.get_pixel(x, y)[0] != bg)
            .count()
    }

    #[test]
    fn circle_count_matches_rasterized_dots() {
        // dark left half, white right half; column 2 straddles the edge
        let mut img = RgbaImage::from_pixel(60, 36, Rgba([255, 255, 255, 255]));
        for y in 0..36 {
            for x in 0..30 {
                img.put_pixel(x, y, Rgba([40, 40, 40, 255]));
            }
        }
        let cfg = RenderParams {
            aa_scale: 1,
            ..RenderParams::default()
        }
        .build()
        .unwrap();
        let svg = render_svg(&img, &cfg);
        let raster = crate::draw::render_dots(&img, &cfg).unwrap();

        let inked = inked_cells(&raster, 12, 255);
        assert_eq!(inked, 9);
        assert_eq!(svg.matches("<circle").count(), inked);
    }

    #[test]
    fn threshold_applies_to_vector_output() {
        let img = RgbaImage::from_pixel(24, 12, Rgba([100, 100, 100, 255]));
        let cfg = RenderParams {
            no_gradient_halftone_threshold: 0.5,
            ..RenderParams::default()
        }
        .build()
        .unwrap();
        let svg = render_svg(&img, &cfg);
        assert_eq!(svg.matches(r#"r="6.00""#).count(), 2);
    }
}
