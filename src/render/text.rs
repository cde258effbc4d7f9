use anyhow::{Context, Result};
use fontdue::{Font, FontSettings};
use std::path::Path;

/// Feature readout drawn into the corner of each frame
pub struct HudOverlay {
    font: Font,
    font_size: f32,
}

/// The two readout lines for a frame
pub fn hud_lines(centroid_hz: f32, flatness: f32) -> [String; 2] {
    [
        format!("Centroid: {} Hz", centroid_hz.max(0.0).round() as u32),
        format!("Flatness: {:.2}", flatness.clamp(0.0, 1.0)),
    ]
}

impl HudOverlay {
    pub fn from_file(path: &Path, font_size: f32) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("Failed to read font {}", path.display()))?;
        let font = Font::from_bytes(bytes, FontSettings::default())
            .map_err(|e| anyhow::anyhow!("Failed to parse font {}: {}", path.display(), e))?;
        Ok(Self { font, font_size })
    }

    pub fn line_height(&self) -> u32 {
        (self.font_size * 1.25).ceil() as u32
    }

    /// Draw the centroid/flatness readout in the top-left corner.
    pub fn draw_stats(&self, pixels: &mut [u8], width: u32, height: u32, centroid_hz: f32, flatness: f32) {
        let margin = (width.min(height) as f32 * 0.03) as u32;
        let color = [200u8, 220, 255, 220];
        for (row, line) in hud_lines(centroid_hz, flatness).iter().enumerate() {
            let y = margin + row as u32 * self.line_height();
            self.composite(pixels, width, height, line, margin, y, color);
        }
    }

    /// Alpha-blend `text` onto an RGBA buffer with its top-left at (x, y).
    #[allow(clippy::too_many_arguments)]
    fn composite(&self, pixels: &mut [u8], width: u32, height: u32, text: &str, x: u32, y: u32, color: [u8; 4]) {
        let mut cursor_x = x as i32;
        for ch in text.chars() {
            let (metrics, bitmap) = self.font.rasterize(ch, self.font_size);
            let glyph_y = y as i32 + self.font_size as i32 - metrics.height as i32 - metrics.ymin;

            for gy in 0..metrics.height {
                for gx in 0..metrics.width {
                    let alpha = bitmap[gy * metrics.width + gx];
                    if alpha == 0 {
                        continue;
                    }

                    let px = cursor_x + gx as i32;
                    let py = glyph_y + gy as i32;
                    if px < 0 || py < 0 || px >= width as i32 || py >= height as i32 {
                        continue;
                    }

                    let idx = ((py as u32 * width + px as u32) * 4) as usize;
                    if idx + 3 >= pixels.len() {
                        continue;
                    }

                    let a = alpha as f32 / 255.0 * (color[3] as f32 / 255.0);
                    for c in 0..3 {
                        pixels[idx + c] = (color[c] as f32 * a + pixels[idx + c] as f32 * (1.0 - a)) as u8;
                    }
                    pixels[idx + 3] = 255;
                }
            }

            cursor_x += metrics.advance_width as i32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readout_format() {
        let [centroid, flatness] = hud_lines(1999.6, 0.4567);
        assert_eq!(centroid, "Centroid: 2000 Hz");
        assert_eq!(flatness, "Flatness: 0.46");
    }

    #[test]
    fn readout_clamps_garbage() {
        let [centroid, flatness] = hud_lines(-5.0, 3.0);
        assert_eq!(centroid, "Centroid: 0 Hz");
        assert_eq!(flatness, "Flatness: 1.00");
    }

    #[test]
    fn missing_font_is_an_error() {
        assert!(HudOverlay::from_file(Path::new("/no/such/font.ttf"), 18.0).is_err());
    }
}
