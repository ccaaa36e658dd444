use image::RgbaImage;

use crate::orbit::Cell;

/// Square RGBA8 image tiled into `n_row x n_row` cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Atlas {
    pub image: RgbaImage,
    pub cell_width: u32,
    pub cell_height: u32,
    pub n_row: u32,
}

impl Atlas {
    /// Blank (all zero) atlas of `resolution x resolution`.
    pub fn new(resolution: u32, n_row: u32) -> Self {
        let cell = resolution / n_row.max(1);
        Self {
            image: RgbaImage::new(resolution, resolution),
            cell_width: cell,
            cell_height: cell,
            n_row,
        }
    }

    pub fn resolution(&self) -> u32 {
        self.image.width()
    }

    /// Copies `tile` over `cell`, replacing whatever was there.
    pub fn paste(&mut self, cell: Cell, tile: &RgbaImage) {
        let x = i64::from(cell.u) * i64::from(self.cell_width);
        let y = i64::from(cell.v) * i64::from(self.cell_height);
        image::imageops::replace(&mut self.image, tile, x, y);
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }
}

#[cfg(test)]
mod tests {
    use image::Rgba;

    use super::*;

    #[test]
    fn paste_replaces_instead_of_blending() {
        let mut atlas = Atlas::new(4, 2);
        let opaque = RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 255]));
        let clear = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 0]));

        atlas.paste(Cell { u: 1, v: 0 }, &opaque);
        atlas.paste(Cell { u: 1, v: 0 }, &clear);
        assert_eq!(atlas.image.get_pixel(2, 0).0, [0, 0, 0, 0]);
    }

    #[test]
    fn leftover_edge_stays_blank() {
        let mut atlas = Atlas::new(5, 2);
        assert_eq!(atlas.cell_width, 2);
        let tile = RgbaImage::from_pixel(2, 2, Rgba([9, 9, 9, 9]));
        for v in 0..2 {
            for u in 0..2 {
                atlas.paste(Cell { u, v }, &tile);
            }
        }
        assert_eq!(atlas.image.get_pixel(3, 3).0, [9, 9, 9, 9]);
        assert_eq!(atlas.image.get_pixel(4, 0).0, [0, 0, 0, 0]);
        assert_eq!(atlas.image.get_pixel(0, 4).0, [0, 0, 0, 0]);
    }
}
