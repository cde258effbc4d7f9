pub mod buffers;
pub mod cloud;
pub mod color;
pub mod layout;

use crate::audio::features::FrameFeatures;
use crate::config::{ColorConfig, FieldConfig};
use buffers::PointBuffers;
use cloud::CloudField;
use color::{smoothstep, ColorRamp};
use layout::{IndexHash, ParticleLayout};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FieldError {
    #[error("invalid field configuration: {0}")]
    InvalidConfiguration(String),
}

// Spatial mask edges, expressed as fractions of the sphere radius so the
// bottom/top/ring regions keep their shape at any size.
const MASK_START: f32 = 0.02 / 0.22;
const MASK_FULL: f32 = 0.25 / 0.22;
const RING_WIDTH: f32 = 0.35 / 0.22;
const WOBBLE_INDEX_STEP: f32 = 0.017;

/// Global state of one field instance
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FieldState {
    /// Smoothed global radial scale, 1.0 at rest
    pub scale_lerp: f32,
    pub bins: usize,
    pub count: usize,
    pub history: usize,
}

pub struct ParticleField {
    config: FieldConfig,
    ramp: ColorRamp,
    layout: ParticleLayout,
    buffers: PointBuffers,
    state: FieldState,
}

impl ParticleField {
    pub fn new(bins: usize, config: &FieldConfig, colors: &ColorConfig, history: usize) -> Result<Self, FieldError> {
        if bins == 0 {
            return Err(FieldError::InvalidConfiguration("bin count must be > 0".into()));
        }
        if config.multiplier == 0 {
            return Err(FieldError::InvalidConfiguration("particle multiplier must be > 0".into()));
        }
        if !(config.base_radius.is_finite() && config.base_radius > 0.0) {
            return Err(FieldError::InvalidConfiguration(format!(
                "base radius must be positive, got {}",
                config.base_radius
            )));
        }
        if !(config.max_pulse.is_finite() && config.max_pulse > 1.0) {
            return Err(FieldError::InvalidConfiguration(format!(
                "max pulse must exceed 1, got {}",
                config.max_pulse
            )));
        }
        let count = bins.checked_mul(config.multiplier).ok_or_else(|| {
            FieldError::InvalidConfiguration(format!("{} bins x {} overflows", bins, config.multiplier))
        })?;

        let layout = layout::generate(count, bins, config.base_radius, IndexHash::new(config.seed));
        let ramp = ColorRamp::new(colors);

        let mut buffers = PointBuffers::new(count);
        let rest = ramp.at(0.0);
        for (i, p) in layout.base_positions.iter().enumerate() {
            buffers.set_position(i, *p);
            buffers.set_color(i, rest);
        }

        Ok(Self {
            config: config.clone(),
            ramp,
            layout,
            buffers,
            state: FieldState {
                scale_lerp: 1.0,
                bins,
                count,
                history,
            },
        })
    }

    pub fn state(&self) -> FieldState {
        self.state
    }

    pub fn layout(&self) -> &ParticleLayout {
        &self.layout
    }

    pub fn buffers(&self) -> &PointBuffers {
        &self.buffers
    }

    pub fn buffers_mut(&mut self) -> &mut PointBuffers {
        &mut self.buffers
    }

    /// Advance one frame. Returns false when the frame was skipped: no
    /// features, or a frame that cannot be trusted. Particles then hold their
    /// last state.
    pub fn update(&mut self, features: Option<&FrameFeatures>, time_s: f32) -> bool {
        let Some(features) = features else {
            return false;
        };
        if !is_usable(features) {
            log::warn!("Skipping malformed feature frame ({} bins)", features.bins.len());
            return false;
        }

        let c = &self.config;
        let bass = features.bass * c.bass_gain;
        let highs = features.highs * c.treble_gain;
        let mids = features.mids * c.mids_gain;

        let [wb, wh, wm] = c.energy_weights;
        let energy = bass * wb + highs * wh + mids * wm;
        self.state.scale_lerp = self.next_scale(energy);

        let radius = c.base_radius;
        let scale = self.state.scale_lerp;
        let span = c.max_pulse - 1.0;

        for i in 0..self.layout.len() {
            let base = self.layout.base_positions[i];
            let len = base.length().max(1e-6);
            let dir = base / len;

            let s_bass = smoothstep(MASK_START * radius, MASK_FULL * radius, -base.y);
            let s_treble = smoothstep(MASK_START * radius, MASK_FULL * radius, base.y);
            let s_mid = 1.0 - smoothstep(0.0, RING_WIDTH * radius, base.y.abs());

            let bin = local_bin(self.layout.bound_bins[i], self.state.bins, features.bins.len());
            let local = features.bins[bin] * c.ripple_gain;

            let e = self.layout.bass_weights[i] * s_bass * bass
                + self.layout.treble_weights[i] * s_treble * highs
                + s_mid * mids * c.mids_ring_weight
                + local;

            let wobble = 1.0
                + c.wobble * (time_s * c.wobble_speed + self.layout.phases[i] + i as f32 * WOBBLE_INDEX_STEP).sin();
            let multiplier = ((scale + e) * wobble).min(c.max_pulse);

            self.buffers.set_position(i, dir * (len * multiplier));
            self.buffers.set_color(i, self.ramp.at((multiplier - 1.0) / span));
        }
        true
    }

    fn next_scale(&self, energy: f32) -> f32 {
        let c = &self.config;
        let current = self.state.scale_lerp;
        let target = 1.0 + energy.clamp(0.0, c.max_pulse - 1.0);

        let rate = if target > current { c.attack_rate } else { c.decay_rate };
        let mut next = current + (target - current) * rate;

        if energy < c.spring_threshold {
            next += (1.0 - next) * c.spring_k;
        }
        next.clamp(0.0, c.max_pulse)
    }
}

fn is_usable(features: &FrameFeatures) -> bool {
    !features.bins.is_empty()
        && [features.bass, features.mids, features.highs].iter().all(|v| v.is_finite())
        && features.bins.iter().all(|b| b.is_finite())
}

/// Map a particle's bound bin into a frame whose bin count may differ from
/// the one the field was built for.
fn local_bin(bound: usize, field_bins: usize, frame_bins: usize) -> usize {
    let idx = if frame_bins == field_bins {
        bound
    } else {
        bound * frame_bins / field_bins.max(1)
    };
    idx.min(frame_bins.saturating_sub(1))
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Preset {
    #[default]
    Nebula,
    Cloud,
}

enum Scene {
    Nebula(ParticleField),
    Cloud(CloudField),
}

/// The active preset plus everything needed to rebuild it
pub struct Visualizer {
    preset: Preset,
    field: FieldConfig,
    colors: ColorConfig,
    bins: usize,
    history: usize,
    scene: Scene,
}

impl Visualizer {
    pub fn build(
        preset: Preset,
        bins: usize,
        field: &FieldConfig,
        colors: &ColorConfig,
        history: usize,
    ) -> Result<Self, FieldError> {
        let scene = build_scene(preset, bins, field, colors, history)?;
        log::info!(
            "Built {:?} field: {} bins, {} particles",
            preset,
            bins,
            scene_len(&scene)
        );
        Ok(Self {
            preset,
            field: field.clone(),
            colors: colors.clone(),
            bins,
            history,
            scene,
        })
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    pub fn history(&self) -> usize {
        self.history
    }

    pub fn particle_count(&self) -> usize {
        scene_len(&self.scene)
    }

    /// Global scale of the nebula, 1.0 for presets without one
    pub fn scale(&self) -> f32 {
        match &self.scene {
            Scene::Nebula(f) => f.state().scale_lerp,
            Scene::Cloud(_) => 1.0,
        }
    }

    pub fn update(&mut self, features: Option<&FrameFeatures>, time_s: f32) -> bool {
        match &mut self.scene {
            Scene::Nebula(field) => field.update(features, time_s),
            Scene::Cloud(cloud) => match features {
                Some(f) if !f.bins.is_empty() => {
                    cloud.update(f);
                    true
                }
                _ => false,
            },
        }
    }

    pub fn buffers(&self) -> &PointBuffers {
        match &self.scene {
            Scene::Nebula(f) => f.buffers(),
            Scene::Cloud(c) => c.buffers(),
        }
    }

    pub fn buffers_mut(&mut self) -> &mut PointBuffers {
        match &mut self.scene {
            Scene::Nebula(f) => f.buffers_mut(),
            Scene::Cloud(c) => c.buffers_mut(),
        }
    }

    /// Vertical offset the renderer applies to the whole point cloud
    pub fn offset_y(&self) -> f32 {
        match self.preset {
            Preset::Nebula => 0.0,
            Preset::Cloud => cloud::SHEET_OFFSET_Y,
        }
    }

    /// Changing the trail depth discards the current field and builds a new one.
    pub fn set_history(&mut self, history: usize) -> Result<(), FieldError> {
        self.history = history;
        self.rebuild(self.bins)
    }

    /// Rebuild for a new bin count. Bindings are fixed at construction, so
    /// there is no in-place resize.
    pub fn rebuild(&mut self, bins: usize) -> Result<(), FieldError> {
        let scene = build_scene(self.preset, bins, &self.field, &self.colors, self.history)?;
        log::info!(
            "Rebuilt {:?} field: {} bins, history {}",
            self.preset,
            bins,
            self.history
        );
        self.bins = bins;
        self.scene = scene;
        Ok(())
    }
}

fn build_scene(
    preset: Preset,
    bins: usize,
    field: &FieldConfig,
    colors: &ColorConfig,
    history: usize,
) -> Result<Scene, FieldError> {
    match preset {
        Preset::Nebula => Ok(Scene::Nebula(ParticleField::new(bins, field, colors, history)?)),
        Preset::Cloud => {
            if bins == 0 {
                return Err(FieldError::InvalidConfiguration("bin count must be > 0".into()));
            }
            Ok(Scene::Cloud(CloudField::new(bins, field.seed)))
        }
    }
}

fn scene_len(scene: &Scene) -> usize {
    match scene {
        Scene::Nebula(f) => f.state().count,
        Scene::Cloud(c) => c.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::layout::ResponseGroup;
    use super::*;

    fn field(bins: usize) -> ParticleField {
        ParticleField::new(bins, &FieldConfig::default(), &ColorConfig::default(), 150).unwrap()
    }

    fn features(bins: usize, level: f32, band: f32) -> FrameFeatures {
        FrameFeatures {
            bins: vec![level; bins],
            bass: band,
            mids: band,
            highs: band,
            ..FrameFeatures::default()
        }
    }

    #[test]
    fn particle_count_and_group_proportions() {
        let f = field(256);
        assert_eq!(f.state().count, 2560);
        assert_eq!(f.buffers().len(), 2560);

        let total = f.layout().len() as f32;
        let share = |g: ResponseGroup| f.layout().groups.iter().filter(|&&x| x == g).count() as f32 / total;
        assert!((share(ResponseGroup::Bass) - 0.60).abs() <= 0.05);
        assert!((share(ResponseGroup::Treble) - 0.35).abs() <= 0.05);
        assert!((share(ResponseGroup::Mixed) - 0.05).abs() <= 0.05);
    }

    #[test]
    fn construction_is_deterministic() {
        let a = field(64);
        let b = field(64);
        assert_eq!(a.layout().base_positions, b.layout().base_positions);
        assert_eq!(a.layout().groups, b.layout().groups);
        assert_eq!(a.buffers().positions(), b.buffers().positions());
    }

    #[test]
    fn invalid_configuration_fails_fast() {
        let colors = ColorConfig::default();
        assert!(matches!(
            ParticleField::new(0, &FieldConfig::default(), &colors, 0),
            Err(FieldError::InvalidConfiguration(_))
        ));
        let zero_mult = FieldConfig {
            multiplier: 0,
            ..FieldConfig::default()
        };
        assert!(ParticleField::new(16, &zero_mult, &colors, 0).is_err());
        let bad_radius = FieldConfig {
            base_radius: f32::NAN,
            ..FieldConfig::default()
        };
        assert!(ParticleField::new(16, &bad_radius, &colors, 0).is_err());
    }

    #[test]
    fn scale_stays_within_bounds_under_extreme_input() {
        let mut f = field(32);
        let max_pulse = FieldConfig::default().max_pulse;
        for frame in 0..60 {
            let loud = features(32, 1.0, 1.2 * (frame % 7) as f32);
            assert!(f.update(Some(&loud), frame as f32 / 60.0));
            let s = f.state().scale_lerp;
            assert!((0.0..=max_pulse).contains(&s), "scale {}", s);
        }
        for i in 0..f.buffers().len() {
            let base = f.layout().base_positions[i].length();
            let now = f.buffers().position(i).unwrap().length();
            assert!(now <= base * max_pulse + 1e-4);
        }
    }

    #[test]
    fn silence_springs_back_to_rest() {
        let mut f = field(32);
        for frame in 0..30 {
            f.update(Some(&features(32, 1.0, 1.2)), frame as f32 / 60.0);
        }
        assert!(f.state().scale_lerp > 2.0);

        for frame in 0..10 {
            f.update(Some(&features(32, 0.0, 0.0)), frame as f32 / 60.0);
        }
        assert!((f.state().scale_lerp - 1.0).abs() < 1e-2, "scale {}", f.state().scale_lerp);
    }

    #[test]
    fn attack_is_faster_than_decay() {
        let mut f = field(8);
        // energy 1.0 sits above the spring threshold, so only attack/decay apply
        let rise = f.next_scale(1.0) - 1.0;
        f.state.scale_lerp = 3.0;
        let fall = 3.0 - f.next_scale(1.0);
        assert!((rise - 0.6).abs() < 1e-5);
        assert!((fall - 0.35).abs() < 1e-5);
        assert!(rise > fall);
    }

    #[test]
    fn missing_or_malformed_frames_hold_state() {
        let mut f = field(16);
        f.update(Some(&features(16, 0.5, 0.5)), 0.3);
        f.buffers_mut().take_dirty();
        let before = f.buffers().positions().to_vec();
        let scale = f.state().scale_lerp;

        assert!(!f.update(None, 1.0));
        let mut bad = features(16, 0.5, 0.5);
        bad.bass = f32::NAN;
        assert!(!f.update(Some(&bad), 1.0));
        assert!(!f.update(Some(&features(0, 0.0, 0.0)), 1.0));

        assert_eq!(f.buffers().positions(), &before[..]);
        assert_eq!(f.state().scale_lerp, scale);
        assert!(!f.buffers().dirty().any());
    }

    #[test]
    fn update_marks_buffers_dirty() {
        let mut f = field(8);
        f.buffers_mut().take_dirty();
        assert!(f.update(Some(&features(8, 0.2, 0.2)), 0.0));
        let dirty = f.buffers_mut().take_dirty();
        assert!(dirty.positions && dirty.colors);
    }

    #[test]
    fn mismatched_frame_bins_map_proportionally() {
        assert_eq!(local_bin(5, 10, 10), 5);
        assert_eq!(local_bin(9, 10, 5), 4);
        assert_eq!(local_bin(3, 4, 400), 300);
        assert_eq!(local_bin(7, 8, 1), 0);

        let mut f = field(64);
        assert!(f.update(Some(&features(3, 1.0, 0.0)), 0.0));
    }

    #[test]
    fn visualizer_rebuilds_on_history_change() {
        let mut v = Visualizer::build(Preset::Nebula, 16, &FieldConfig::default(), &ColorConfig::default(), 150).unwrap();
        for _ in 0..10 {
            v.update(Some(&features(16, 1.0, 1.0)), 0.0);
        }
        assert!(v.scale() > 1.0);

        v.set_history(40).unwrap();
        assert_eq!(v.history(), 40);
        assert_eq!(v.scale(), 1.0);
        assert_eq!(v.particle_count(), 160);

        v.rebuild(32).unwrap();
        assert_eq!(v.bins(), 32);
        assert_eq!(v.particle_count(), 320);
        assert!(v.rebuild(0).is_err());
        assert_eq!(v.bins(), 32);
    }

    #[test]
    fn cloud_preset_has_one_point_per_bin() {
        let mut v = Visualizer::build(Preset::Cloud, 50, &FieldConfig::default(), &ColorConfig::default(), 0).unwrap();
        assert_eq!(v.particle_count(), 50);
        assert_eq!(v.offset_y(), -1.0);
        assert!(!v.update(None, 0.0));
        assert!(v.update(Some(&features(50, 0.5, 0.0)), 0.0));
    }
}
