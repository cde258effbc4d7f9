//! Raw spectrum → compact, smoothed per-frame features.

use super::features::{FrameFeatures, RawSpectrum};
use crate::config::{sanitize_sensitivity, AudioConfig};

/// Exponentially smoothed bass/mids/highs, persisting across frames
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BandSmoother {
    pub bass: f32,
    pub mids: f32,
    pub highs: f32,
}

impl BandSmoother {
    /// `smoothed = smoothed * (1 - alpha) + raw * alpha` per band
    pub fn step(&mut self, alpha: f32, bass: f32, mids: f32, highs: f32) {
        self.bass = self.bass * (1.0 - alpha) + bass * alpha;
        self.mids = self.mids * (1.0 - alpha) + mids * alpha;
        self.highs = self.highs * (1.0 - alpha) + highs * alpha;
    }
}

/// Inclusive index ranges of the three bands within a magnitude array
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BandRanges {
    pub bass: (usize, usize),
    pub mids: (usize, usize),
    pub highs: (usize, usize),
}

pub struct FeatureAggregator {
    bins: usize,
    sensitivity: f32,
    alpha: f32,
    bass_hz: [f32; 2],
    mid_max_hz: f32,
    centroid_cap_hz: f32,
    band_ceiling: f32,
    smoother: BandSmoother,
}

impl FeatureAggregator {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            bins: config.bins.max(1),
            sensitivity: sanitize_sensitivity(config.sensitivity),
            alpha: config.band_alpha,
            bass_hz: config.bass_hz,
            mid_max_hz: config.mid_max_hz,
            centroid_cap_hz: config.centroid_cap_hz,
            band_ceiling: config.band_ceiling,
            smoother: BandSmoother::default(),
        }
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    pub fn sensitivity(&self) -> f32 {
        self.sensitivity
    }

    pub fn set_sensitivity(&mut self, value: f32) {
        self.sensitivity = sanitize_sensitivity(value);
    }

    pub fn smoothed(&self) -> BandSmoother {
        self.smoother
    }

    /// Forget band history; called when a new audio session starts.
    pub fn reset(&mut self) {
        self.smoother = BandSmoother::default();
    }

    pub fn aggregate(&mut self, raw: &RawSpectrum) -> FrameFeatures {
        let full_scale = if raw.full_scale > 0.0 { raw.full_scale } else { 1.0 };
        let bins = downsample(&raw.magnitudes, self.bins, full_scale, self.sensitivity);

        let ranges = band_ranges(
            raw.magnitudes.len(),
            raw.nyquist(),
            self.bass_hz,
            self.mid_max_hz,
        );
        let level = |range: (usize, usize)| -> f32 {
            let avg = band_average(&raw.magnitudes, range);
            (avg / full_scale * self.sensitivity).min(self.band_ceiling)
        };
        let (bass, mids, highs) = match ranges {
            Some(r) => (level(r.bass), level(r.mids), level(r.highs)),
            None => (0.0, 0.0, 0.0),
        };
        self.smoother.step(self.alpha, bass, mids, highs);

        let d = raw.descriptors;
        let centroid_hz = if d.centroid_hz.is_finite() { d.centroid_hz.max(0.0) } else { 0.0 };
        let centroid_norm = (centroid_hz / self.centroid_cap_hz).min(1.0);
        let flatness = if d.flatness.is_finite() { d.flatness.clamp(0.0, 1.0) } else { 0.0 };
        let rms = if d.rms.is_finite() { d.rms.max(0.0) } else { 0.0 };

        FrameFeatures {
            bins,
            centroid_hz,
            centroid_norm,
            flatness,
            rms,
            bass: self.smoother.bass,
            mids: self.smoother.mids,
            highs: self.smoother.highs,
        }
    }
}

/// Average `magnitudes` into `bins` contiguous groups of `floor(M / bins)`
/// entries, scale to 0..1 by `full_scale` and `sensitivity`, clamp to 1.
/// Groups that fall past the end of a short spectrum read as silence.
pub fn downsample(magnitudes: &[f32], bins: usize, full_scale: f32, sensitivity: f32) -> Vec<f32> {
    let step = (magnitudes.len() / bins.max(1)).max(1);
    (0..bins)
        .map(|i| {
            let start = (i * step).min(magnitudes.len());
            let end = (start + step).min(magnitudes.len());
            let sum: f32 = magnitudes[start..end].iter().sum();
            let v = sum / (step as f32 * full_scale) * sensitivity;
            v.clamp(0.0, 1.0)
        })
        .collect()
}

/// Map bass/mids/highs frequency edges onto index ranges of an `n`-entry
/// spectrum spanning 0..nyquist. `None` when the spectrum is empty.
pub fn band_ranges(n: usize, nyquist: f32, bass_hz: [f32; 2], mid_max_hz: f32) -> Option<BandRanges> {
    if n == 0 || nyquist <= 0.0 {
        return None;
    }
    let to_index = |hz: f32| -> usize {
        let idx = (hz / nyquist * (n - 1) as f32).round();
        idx.clamp(0.0, (n - 1) as f32) as usize
    };
    let bass_min = to_index(bass_hz[0]);
    let bass_max = to_index(bass_hz[1]);
    let mid_max = to_index(mid_max_hz);

    Some(BandRanges {
        bass: (bass_min, bass_max),
        mids: (bass_max + 1, mid_max),
        highs: (mid_max + 1, n - 1),
    })
}

/// Mean over an inclusive range; empty ranges average to zero.
fn band_average(magnitudes: &[f32], (start, end): (usize, usize)) -> f32 {
    if start > end || start >= magnitudes.len() {
        return 0.0;
    }
    let end = end.min(magnitudes.len() - 1);
    let slice = &magnitudes[start..=end];
    slice.iter().sum::<f32>() / slice.len() as f32
}
