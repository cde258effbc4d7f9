/// Scalar descriptors computed by the descriptor analyser on the latest block
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Descriptors {
    /// RMS level (linear, >= 0)
    pub rms: f32,
    /// Spectral centroid (Hz)
    pub centroid_hz: f32,
    /// Spectral flatness (0 = tonal, 1 = noise)
    pub flatness: f32,
}

/// One analyser read: magnitudes in the analyser's native scale plus descriptors
#[derive(Clone, Debug)]
pub struct RawSpectrum {
    /// Frequency magnitudes, `fft_size / 2` entries in 0..=full_scale
    pub magnitudes: Vec<f32>,
    /// Native full scale of `magnitudes` (255 for byte-scaled analysers)
    pub full_scale: f32,
    /// Sample rate in Hz, used to map band edges onto indices
    pub sample_rate: u32,
    pub descriptors: Descriptors,
}

impl RawSpectrum {
    pub fn nyquist(&self) -> f32 {
        self.sample_rate as f32 / 2.0
    }
}

/// Smoothed per-frame feature set handed to the particle field
#[derive(Clone, Debug, Default)]
pub struct FrameFeatures {
    /// Downsampled bin energies, each in 0.0-1.0
    pub bins: Vec<f32>,
    pub centroid_hz: f32,
    /// Centroid clamped against the cap frequency (0.0-1.0)
    pub centroid_norm: f32,
    /// 0.0-1.0
    pub flatness: f32,
    pub rms: f32,
    /// Exponentially smoothed band energies (0.0-band ceiling)
    pub bass: f32,
    pub mids: f32,
    pub highs: f32,
}
