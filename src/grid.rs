//! Grid partitioning and per-cell average luminance.

use image::RgbaImage;

use crate::tone::luma;

/// One sampled grid cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridCell {
    pub row: u32,
    pub col: u32,
    /// Mean luma over the (possibly clipped) cell footprint, 0.0–255.0.
    pub avg: f32,
}

impl GridCell {
    /// Top-left corner in pixel space, before any truncation.
    pub fn origin(&self, grid_size: f32) -> (f32, f32) {
        (self.col as f32 * grid_size, self.row as f32 * grid_size)
    }
}

/// Number of whole cells that fit: (rows, cols).
pub fn grid_dimensions(width: u32, height: u32, grid_size: f32) -> (u32, u32) {
    if grid_size <= 0.0 {
        return (0, 0);
    }
    (
        (height as f32 / grid_size) as u32,
        (width as f32 / grid_size) as u32,
    )
}

/// Mean luma of the `size`×`size` block at (`x`, `y`), clipped to the image.
pub fn average_intensity(img: &RgbaImage, x: u32, y: u32, size: u32) -> f32 {
    let (width, height) = img.dimensions();
    let x_end = x.saturating_add(size).min(width);
    let y_end = y.saturating_add(size).min(height);

    let mut sum = 0.0f32;
    let mut count = 0u32;
    for py in y..y_end {
        for px in x..x_end {
            sum += luma(img.get_pixel(px, py));
            count += 1;
        }
    }
    if count == 0 { 0.0 } else { sum / count as f32 }
}

/// Sample every cell, row-major.
pub fn sample_grid(img: &RgbaImage, grid_size: f32) -> Vec<GridCell> {
    let (rows, cols) = grid_dimensions(img.width(), img.height(), grid_size);
    let footprint = (grid_size as u32).max(1);

    let mut cells = Vec::with_capacity(rows as usize * cols as usize);
    for row in 0..rows {
        for col in 0..cols {
            let cell = GridCell { row, col, avg: 0.0 };
            let (x1, y1) = cell.origin(grid_size);
            let avg = average_intensity(img, x1 as u32, y1 as u32, footprint);
            cells.push(GridCell { avg, ..cell });
        }
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn grid_dimensions_floor() {
        assert_eq!(grid_dimensions(100, 100, 12.0), (8, 8));
        assert_eq!(grid_dimensions(100, 50, 12.5), (4, 8));
        assert_eq!(grid_dimensions(5, 5, 12.0), (0, 0));
        assert_eq!(grid_dimensions(5, 5, 0.0), (0, 0));
    }

    #[test]
    fn solid_image_has_uniform_cells() {
        let img = RgbaImage::from_pixel(100, 100, Rgba([128, 128, 128, 255]));
        let cells = sample_grid(&img, 12.0);
        assert_eq!(cells.len(), 64);
        for c in &cells {
            assert!((c.avg - 128.0).abs() < 1e-3, "{c:?}");
        }
        assert_eq!((cells[9].row, cells[9].col), (1, 1));
    }

    #[test]
    fn cells_are_row_major() {
        let img = RgbaImage::from_pixel(30, 20, Rgba([0, 0, 0, 255]));
        let cells = sample_grid(&img, 10.0);
        let coords: Vec<_> = cells.iter().map(|c| (c.row, c.col)).collect();
        assert_eq!(coords, vec![(0, 0), (0, 1), (0, 2), (1, 0), (1, 1), (1, 2)]);
    }

    #[test]
    fn edge_block_is_clipped_not_out_of_bounds() {
        let mut img = RgbaImage::from_pixel(5, 5, Rgba([0, 0, 0, 255]));
        img.put_pixel(4, 4, Rgba([255, 255, 255, 255]));
        // 2x2 footprint clipped to the single corner pixel
        let avg = average_intensity(&img, 4, 4, 2);
        assert!((avg - 255.0).abs() < 1e-3);
    }

    #[test]
    fn average_mixes_footprint() {
        let mut img = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255]));
        img.put_pixel(0, 0, Rgba([200, 200, 200, 255]));
        img.put_pixel(1, 1, Rgba([200, 200, 200, 255]));
        assert!((average_intensity(&img, 0, 0, 2) - 100.0).abs() < 1e-3);
    }

    #[test]
    fn fractional_grid_origins_truncate() {
        let cell = GridCell { row: 1, col: 3, avg: 0.0 };
        assert_eq!(cell.origin(2.5), (7.5, 2.5));
    }
}
