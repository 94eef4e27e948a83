// Renders a squares table as an RGBA map: squares hidden by the selection are
// dimmed, visible squares are heat-coloured by density ratio. This is the static
// counterpart of the viewer's overlay and is what the batch writes next to each
// squares file.

pub mod image_helper {
    use crate::core_modules::square::{DENSITY_RATIO_UNDEFINED, Square, SquareTable};
    use crate::error::Result;
    use image::{ImageEncoder, Rgba, RgbaImage};
    use std::path::Path;

    const DIMMED: Rgba<u8> = Rgba([40, 40, 40, 255]);
    const GRID_LINE: Rgba<u8> = Rgba([90, 90, 90, 255]);
    /// Density ratio that maps to the hottest colour.
    const MAX_HEAT: f64 = 10.0;

    /// Blue through yellow to red as the density ratio climbs to `MAX_HEAT`.
    pub fn heat_colour(density_ratio: f64) -> Rgba<u8> {
        let score = if density_ratio == DENSITY_RATIO_UNDEFINED {
            0.0
        } else {
            density_ratio.clamp(0.0, MAX_HEAT)
        };
        let half = MAX_HEAT / 2.0;
        let (r, g, b) = if score <= half {
            let ratio = score / half;
            (0.0, 255.0 * ratio, 255.0 * (1.0 - ratio))
        } else {
            let ratio = (score - half) / half;
            (255.0 * ratio, 255.0 * (1.0 - ratio), 0.0)
        };
        Rgba([r.round() as u8, g.round() as u8, b.round() as u8, 255])
    }

    fn square_colour(square: &Square) -> Rgba<u8> {
        if square.visible {
            heat_colour(square.density_ratio)
        } else {
            DIMMED
        }
    }

    /// A `size_px` x `size_px` map of the table, one block per square with a
    /// one-pixel grid line on the top and left edge of each block.
    pub fn render_square_map(table: &SquareTable, size_px: u32) -> RgbaImage {
        let n = table.nr_of_squares_in_row.max(1);
        let mut map = RgbaImage::new(size_px, size_px);
        for (px, py, pixel) in map.enumerate_pixels_mut() {
            let col = (px as u64 * n as u64 / size_px as u64) as u32;
            let row = (py as u64 * n as u64 / size_px as u64) as u32;
            let on_line = (px as u64 * n as u64) % size_px as u64 == 0
                || (py as u64 * n as u64) % size_px as u64 == 0;
            *pixel = match table.squares.get((row * n + col) as usize) {
                Some(_) if on_line && size_px >= 4 * n => GRID_LINE,
                Some(square) => square_colour(square),
                None => DIMMED,
            };
        }
        map
    }

    pub fn save(path: &Path, map: &RgbaImage) -> Result<()> {
        let output = std::fs::File::create(path)?;
        let encoder = image::codecs::png::PngEncoder::new(output);
        encoder.write_image(
            map.as_raw(),
            map.width(),
            map.height(),
            image::ExtendedColorType::Rgba8,
        )?;
        Ok(())
    }

    pub fn save_square_map(path: &Path, table: &SquareTable, size_px: u32) -> Result<()> {
        save(path, &render_square_map(table, size_px))
    }
}

#[cfg(test)]
mod tests {

    use super::image_helper::*;
    use crate::core_modules::grid_partition::GridPartition;
    use crate::core_modules::square::SquareTable;
    use image::Rgba;

    #[test]
    fn heat_runs_from_blue_to_red() {
        assert_eq!(heat_colour(0.0), Rgba([0, 0, 255, 255]));
        assert_eq!(heat_colour(5.0), Rgba([0, 255, 0, 255]));
        assert_eq!(heat_colour(10.0), Rgba([255, 0, 0, 255]));
        assert_eq!(heat_colour(50.0), heat_colour(10.0));
        assert_eq!(heat_colour(999.0), heat_colour(0.0));
    }

    #[test]
    fn hidden_squares_are_dimmed_and_visible_ones_coloured() {
        let mut table = SquareTable::empty(&GridPartition::new(2).unwrap());
        table.squares[3].visible = true;
        table.squares[3].density_ratio = 10.0;
        let map = render_square_map(&table, 40);
        assert_eq!(map.dimensions(), (40, 40));
        // Interior pixels, away from the grid lines.
        assert_eq!(*map.get_pixel(10, 10), Rgba([40, 40, 40, 255]));
        assert_eq!(*map.get_pixel(30, 30), Rgba([255, 0, 0, 255]));
        assert_eq!(*map.get_pixel(20, 30), Rgba([90, 90, 90, 255]));
    }

    #[test]
    fn map_is_written_as_png() {
        let table = SquareTable::empty(&GridPartition::new(3).unwrap());
        let dir = tempfile::tempdir().expect("Error Creating Directory.");
        let path = dir.path().join("square_map.png");
        save_square_map(&path, &table, 60).expect("Error Saving File.");
        let decoded = image::open(&path).expect("Error Reading File.").to_rgba8();
        assert_eq!(decoded.dimensions(), (60, 60));
    }
}
