//! Flat "cloud" sheet: one point per bin, lifted by that bin's energy.

use super::buffers::PointBuffers;
use super::layout::IndexHash;
use crate::audio::features::FrameFeatures;
use glam::Vec3;

const SPREAD: f32 = 7.0;
const HEIGHT_SCALE: f32 = 5.0;
const EASE: f32 = 0.9;

/// Vertical offset the renderer applies to the whole sheet
pub const SHEET_OFFSET_Y: f32 = -1.0;

pub struct CloudField {
    base: Vec<Vec3>,
    buffers: PointBuffers,
}

impl CloudField {
    pub fn new(bins: usize, seed: u32) -> Self {
        let hash = IndexHash::new(seed);
        let base: Vec<Vec3> = (0..bins)
            .map(|i| {
                let x = i as f64;
                Vec3::new(
                    (hash.at(x * 2.13) as f32 - 0.5) * SPREAD,
                    0.0,
                    (hash.at(x * 9.07) as f32 - 0.5) * SPREAD,
                )
            })
            .collect();

        let mut buffers = PointBuffers::new(bins);
        for (i, p) in base.iter().enumerate() {
            buffers.set_position(i, *p);
            buffers.set_color(i, [0.0, 0.2, 1.0]);
        }

        Self { base, buffers }
    }

    pub fn len(&self) -> usize {
        self.base.len()
    }

    pub fn update(&mut self, features: &FrameFeatures) {
        let centroid = features.centroid_norm.clamp(0.0, 1.0);
        for (i, base) in self.base.iter().enumerate() {
            let amp = features.bins.get(i).copied().unwrap_or(0.0).clamp(0.0, 1.0);
            let current = self.buffers.position(i).unwrap_or(*base);
            let target_y = base.y + amp * HEIGHT_SCALE;
            let y = current.y + (target_y - current.y) * EASE;

            self.buffers.set_position(i, Vec3::new(base.x, y, base.z));
            self.buffers
                .set_color(i, [centroid * amp, 0.2 + amp * 0.5, 1.0 - centroid]);
        }
    }

    pub fn buffers(&self) -> &PointBuffers {
        &self.buffers
    }

    pub fn buffers_mut(&mut self) -> &mut PointBuffers {
        &mut self.buffers
    }
}
