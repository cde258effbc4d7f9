//! Deterministic particle placement and frequency-group assignment.

use glam::Vec3;
use std::f64::consts::TAU;

/// Seeded index → [0, 1) generator. The same seed and index always give the
/// same value, on every run.
#[derive(Clone, Copy, Debug)]
pub struct IndexHash {
    offset: f64,
}

impl IndexHash {
    pub fn new(seed: u32) -> Self {
        Self {
            offset: seed as f64 * 101.3,
        }
    }

    pub fn at(&self, x: f64) -> f64 {
        let v = ((x + self.offset) * 127.1).sin() * 43_758.545_3;
        let f = v - v.floor();
        if f >= 1.0 {
            0.0
        } else {
            f
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseGroup {
    Bass,
    Treble,
    Mixed,
}

impl ResponseGroup {
    /// ~60% bass, ~35% treble, ~5% mixed for a uniform draw
    pub fn from_draw(g: f64) -> Self {
        if g < 0.6 {
            ResponseGroup::Bass
        } else if g < 0.95 {
            ResponseGroup::Treble
        } else {
            ResponseGroup::Mixed
        }
    }

    /// (bass weight, treble weight)
    pub fn weights(self) -> (f32, f32) {
        match self {
            ResponseGroup::Bass => (1.0, 0.2),
            ResponseGroup::Treble => (0.2, 1.0),
            ResponseGroup::Mixed => (0.75, 0.75),
        }
    }

    /// Skewed bin choice: bass particles crowd the lowest bins of the bottom
    /// third, the rest lean toward the top of the upper third.
    pub fn bind_bin(self, draw: f64, bins: usize) -> usize {
        let bins_f = bins as f64;
        let idx = match self {
            ResponseGroup::Bass => draw.powf(1.7) * bins_f * 0.33,
            ResponseGroup::Treble | ResponseGroup::Mixed => bins_f * 0.66 + draw.powf(0.7) * bins_f * 0.34,
        };
        (idx.floor().max(0.0) as usize).min(bins.saturating_sub(1))
    }
}

/// Immutable per-particle attributes assigned once at construction
#[derive(Clone, Debug)]
pub struct ParticleLayout {
    pub base_positions: Vec<Vec3>,
    pub bound_bins: Vec<usize>,
    pub groups: Vec<ResponseGroup>,
    pub bass_weights: Vec<f32>,
    pub treble_weights: Vec<f32>,
    pub phases: Vec<f32>,
}

impl ParticleLayout {
    pub fn len(&self) -> usize {
        self.base_positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.base_positions.is_empty()
    }
}

/// Uniform point inside a solid sphere from three uniform draws
pub fn sphere_point(u: f64, v: f64, w: f64, radius: f32) -> Vec3 {
    let theta = TAU * u;
    let phi = (2.0 * v - 1.0).clamp(-1.0, 1.0).acos();
    let r = radius as f64 * w.cbrt();
    Vec3::new(
        (r * phi.sin() * theta.cos()) as f32,
        (r * phi.sin() * theta.sin()) as f32,
        (r * phi.cos()) as f32,
    )
}

pub fn generate(count: usize, bins: usize, base_radius: f32, hash: IndexHash) -> ParticleLayout {
    let mut layout = ParticleLayout {
        base_positions: Vec::with_capacity(count),
        bound_bins: Vec::with_capacity(count),
        groups: Vec::with_capacity(count),
        bass_weights: Vec::with_capacity(count),
        treble_weights: Vec::with_capacity(count),
        phases: Vec::with_capacity(count),
    };

    for i in 0..count {
        let x = i as f64;
        let position = sphere_point(hash.at(x * 1.37), hash.at(x * 7.91), hash.at(x * 3.31), base_radius);

        let group = ResponseGroup::from_draw(hash.at(x * 11.7));
        let (wb, wt) = group.weights();

        layout.base_positions.push(position);
        layout.bound_bins.push(group.bind_bin(hash.at(x * 0.47), bins));
        layout.groups.push(group);
        layout.bass_weights.push(wb);
        layout.treble_weights.push(wt);
        layout.phases.push((hash.at(x * 5.01) * TAU) as f32);
    }

    layout
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_in_unit_interval_and_repeatable() {
        let a = IndexHash::new(0);
        let b = IndexHash::new(0);
        for i in 0..5000 {
            let x = i as f64 * 0.73;
            let v = a.at(x);
            assert!((0.0..1.0).contains(&v));
            assert_eq!(v, b.at(x));
        }
    }

    #[test]
    fn seeds_change_the_sequence() {
        let a = IndexHash::new(0);
        let b = IndexHash::new(7);
        let differing = (0..100).filter(|&i| a.at(i as f64) != b.at(i as f64)).count();
        assert!(differing > 90);
    }

    #[test]
    fn sphere_points_stay_inside_radius() {
        let hash = IndexHash::new(3);
        for i in 0..2000 {
            let x = i as f64;
            let p = sphere_point(hash.at(x * 1.37), hash.at(x * 7.91), hash.at(x * 3.31), 0.22);
            assert!(p.length() <= 0.22 + 1e-5);
        }
    }

    #[test]
    fn group_thresholds() {
        assert_eq!(ResponseGroup::from_draw(0.0), ResponseGroup::Bass);
        assert_eq!(ResponseGroup::from_draw(0.59), ResponseGroup::Bass);
        assert_eq!(ResponseGroup::from_draw(0.6), ResponseGroup::Treble);
        assert_eq!(ResponseGroup::from_draw(0.949), ResponseGroup::Treble);
        assert_eq!(ResponseGroup::from_draw(0.95), ResponseGroup::Mixed);
    }

    #[test]
    fn bound_bins_follow_group_thirds() {
        let bins = 300;
        for step in 0..100 {
            let draw = step as f64 / 100.0;
            let low = ResponseGroup::Bass.bind_bin(draw, bins);
            let high = ResponseGroup::Treble.bind_bin(draw, bins);
            assert!(low <= 99);
            assert!(high >= 198 && high < bins);
        }
        assert_eq!(ResponseGroup::Treble.bind_bin(0.999_999, 1), 0);
    }

    #[test]
    fn layout_is_deterministic() {
        let a = generate(500, 50, 0.22, IndexHash::new(0));
        let b = generate(500, 50, 0.22, IndexHash::new(0));
        assert_eq!(a.base_positions, b.base_positions);
        assert_eq!(a.groups, b.groups);
        assert_eq!(a.bound_bins, b.bound_bins);
        assert_eq!(a.len(), 500);
    }
}
