use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub field: FieldConfig,
    #[serde(default)]
    pub color: ColorConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    /// Number of aggregated bins handed to the visual per frame
    #[serde(default = "default_bins")]
    pub bins: usize,
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,
    /// Temporal smoothing applied by the spectrum analyser (0 = none)
    #[serde(default = "default_analyser_smoothing")]
    pub analyser_smoothing: f32,
    #[serde(default = "default_min_db")]
    pub min_db: f32,
    #[serde(default = "default_max_db")]
    pub max_db: f32,
    /// Block size used for rms / centroid / flatness
    #[serde(default = "default_descriptor_buffer")]
    pub descriptor_buffer: usize,
    #[serde(default = "default_sensitivity")]
    pub sensitivity: f32,
    /// Exponential smoothing factor for bass/mids/highs
    #[serde(default = "default_band_alpha")]
    pub band_alpha: f32,
    #[serde(default = "default_bass_hz")]
    pub bass_hz: [f32; 2],
    #[serde(default = "default_mid_max_hz")]
    pub mid_max_hz: f32,
    #[serde(default = "default_centroid_cap_hz")]
    pub centroid_cap_hz: f32,
    /// Bands may exceed unity up to this value
    #[serde(default = "default_band_ceiling")]
    pub band_ceiling: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldConfig {
    #[serde(default = "default_multiplier")]
    pub multiplier: usize,
    #[serde(default = "default_base_radius")]
    pub base_radius: f32,
    #[serde(default = "default_max_pulse")]
    pub max_pulse: f32,
    /// Weight of the particle's own bin (local detail)
    #[serde(default = "default_ripple_gain")]
    pub ripple_gain: f32,
    #[serde(default = "default_bass_gain")]
    pub bass_gain: f32,
    #[serde(default = "default_treble_gain")]
    pub treble_gain: f32,
    #[serde(default = "default_mids_gain")]
    pub mids_gain: f32,
    /// Global energy weights for [bass, highs, mids]
    #[serde(default = "default_energy_weights")]
    pub energy_weights: [f32; 3],
    #[serde(default = "default_mids_ring_weight")]
    pub mids_ring_weight: f32,
    #[serde(default = "default_wobble")]
    pub wobble: f32,
    #[serde(default = "default_wobble_speed")]
    pub wobble_speed: f32,
    #[serde(default = "default_attack_rate")]
    pub attack_rate: f32,
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f32,
    /// Below this global energy the scale springs back toward rest
    #[serde(default = "default_spring_threshold")]
    pub spring_threshold: f32,
    #[serde(default = "default_spring_k")]
    pub spring_k: f32,
    #[serde(default)]
    pub seed: u32,
    #[serde(default = "default_history")]
    pub history: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColorConfig {
    #[serde(default = "default_hue_center")]
    pub hue_center: f32,
    #[serde(default = "default_hue_edge")]
    pub hue_edge: f32,
    #[serde(default = "default_sat_center")]
    pub sat_center: f32,
    #[serde(default = "default_sat_edge")]
    pub sat_edge: f32,
    #[serde(default = "default_lum_center")]
    pub lum_center: f32,
    #[serde(default = "default_lum_edge")]
    pub lum_edge: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_crf")]
    pub crf: u32,
    #[serde(default = "default_codec")]
    pub codec: String,
    #[serde(default = "default_pix_fmt")]
    pub pix_fmt: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            bins: default_bins(),
            fft_size: default_fft_size(),
            analyser_smoothing: default_analyser_smoothing(),
            min_db: default_min_db(),
            max_db: default_max_db(),
            descriptor_buffer: default_descriptor_buffer(),
            sensitivity: default_sensitivity(),
            band_alpha: default_band_alpha(),
            bass_hz: default_bass_hz(),
            mid_max_hz: default_mid_max_hz(),
            centroid_cap_hz: default_centroid_cap_hz(),
            band_ceiling: default_band_ceiling(),
        }
    }
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            multiplier: default_multiplier(),
            base_radius: default_base_radius(),
            max_pulse: default_max_pulse(),
            ripple_gain: default_ripple_gain(),
            bass_gain: default_bass_gain(),
            treble_gain: default_treble_gain(),
            mids_gain: default_mids_gain(),
            energy_weights: default_energy_weights(),
            mids_ring_weight: default_mids_ring_weight(),
            wobble: default_wobble(),
            wobble_speed: default_wobble_speed(),
            attack_rate: default_attack_rate(),
            decay_rate: default_decay_rate(),
            spring_threshold: default_spring_threshold(),
            spring_k: default_spring_k(),
            seed: 0,
            history: default_history(),
        }
    }
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            hue_center: default_hue_center(),
            hue_edge: default_hue_edge(),
            sat_center: default_sat_center(),
            sat_edge: default_sat_edge(),
            lum_center: default_lum_center(),
            lum_edge: default_lum_edge(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            crf: default_crf(),
            codec: default_codec(),
            pix_fmt: default_pix_fmt(),
        }
    }
}

fn default_bins() -> usize { 1256 }
fn default_fft_size() -> usize { 4096 }
fn default_analyser_smoothing() -> f32 { 0.7 }
fn default_min_db() -> f32 { -100.0 }
fn default_max_db() -> f32 { -30.0 }
fn default_descriptor_buffer() -> usize { 1024 }
fn default_sensitivity() -> f32 { 1.0 }
fn default_band_alpha() -> f32 { 0.28 }
fn default_bass_hz() -> [f32; 2] { [20.0, 150.0] }
fn default_mid_max_hz() -> f32 { 2000.0 }
fn default_centroid_cap_hz() -> f32 { 10_000.0 }
fn default_band_ceiling() -> f32 { 1.2 }

fn default_multiplier() -> usize { 10 }
fn default_base_radius() -> f32 { 0.22 }
fn default_max_pulse() -> f32 { 4.8 }
fn default_ripple_gain() -> f32 { 1.6 }
fn default_bass_gain() -> f32 { 1.8 }
fn default_treble_gain() -> f32 { 1.5 }
fn default_mids_gain() -> f32 { 0.6 }
fn default_energy_weights() -> [f32; 3] { [0.9, 0.6, 0.4] }
fn default_mids_ring_weight() -> f32 { 0.7 }
fn default_wobble() -> f32 { 0.58 }
fn default_wobble_speed() -> f32 { 2.2 }
fn default_attack_rate() -> f32 { 0.6 }
fn default_decay_rate() -> f32 { 0.35 }
fn default_spring_threshold() -> f32 { 0.15 }
fn default_spring_k() -> f32 { 0.35 }
fn default_history() -> usize { 150 }

fn default_hue_center() -> f32 { 210.0 / 360.0 }
fn default_hue_edge() -> f32 { 200.0 / 360.0 }
fn default_sat_center() -> f32 { 0.35 }
fn default_sat_edge() -> f32 { 0.95 }
fn default_lum_center() -> f32 { 0.62 }
fn default_lum_edge() -> f32 { 0.2 }

fn default_width() -> u32 { 1280 }
fn default_height() -> u32 { 720 }
fn default_fps() -> u32 { 60 }
fn default_crf() -> u32 { 18 }
fn default_codec() -> String { "libx264".into() }
fn default_pix_fmt() -> String { "yuv420p".into() }

/// Sensitivity is floored at 0.1; anything non-finite falls back to 1.
pub fn sanitize_sensitivity(value: f32) -> f32 {
    if value.is_finite() {
        value.max(0.1)
    } else {
        1.0
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let a = &self.audio;
        if a.bins == 0 {
            return Err(ConfigError::Invalid("audio.bins must be > 0".into()));
        }
        if !a.fft_size.is_power_of_two() || a.fft_size < 32 {
            return Err(ConfigError::Invalid(format!(
                "audio.fft_size must be a power of two >= 32, got {}",
                a.fft_size
            )));
        }
        if a.bins > a.fft_size / 2 {
            return Err(ConfigError::Invalid(format!(
                "audio.bins ({}) must not exceed audio.fft_size / 2 ({})",
                a.bins,
                a.fft_size / 2
            )));
        }
        if a.descriptor_buffer == 0 {
            return Err(ConfigError::Invalid("audio.descriptor_buffer must be > 0".into()));
        }
        if !(0.0..1.0).contains(&a.analyser_smoothing) {
            return Err(ConfigError::Invalid("audio.analyser_smoothing must be in [0, 1)".into()));
        }
        if a.max_db <= a.min_db {
            return Err(ConfigError::Invalid("audio.max_db must exceed audio.min_db".into()));
        }
        check_rate("audio.band_alpha", a.band_alpha)?;

        let f = &self.field;
        if f.multiplier == 0 {
            return Err(ConfigError::Invalid("field.multiplier must be > 0".into()));
        }
        if !(f.base_radius.is_finite() && f.base_radius > 0.0) {
            return Err(ConfigError::Invalid("field.base_radius must be > 0".into()));
        }
        if !(f.max_pulse > 1.0) {
            return Err(ConfigError::Invalid("field.max_pulse must be > 1".into()));
        }
        check_rate("field.attack_rate", f.attack_rate)?;
        check_rate("field.decay_rate", f.decay_rate)?;
        check_rate("field.spring_k", f.spring_k)?;

        let o = &self.output;
        if o.width == 0 || o.height == 0 || o.fps == 0 {
            return Err(ConfigError::Invalid("output width/height/fps must be > 0".into()));
        }
        Ok(())
    }
}

fn check_rate(name: &str, value: f32) -> Result<(), ConfigError> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("{} must be in (0, 1], got {}", name, value)))
    }
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn parse_config(content: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(content)
}

/// Explicit path first, then `./nebula.toml`, then the platform config dir.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("nebula.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("nebula").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.audio.bins, 1256);
        assert_eq!(cfg.field.multiplier, 10);
        assert!((cfg.audio.band_alpha - 0.28).abs() < 1e-6);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = parse_config(
            "[audio]\nbins = 256\n\n[field]\nmax_pulse = 3.0\n",
        )
        .unwrap();
        assert_eq!(cfg.audio.bins, 256);
        assert_eq!(cfg.audio.fft_size, 4096);
        assert!((cfg.field.max_pulse - 3.0).abs() < 1e-6);
        assert!((cfg.field.ripple_gain - 1.6).abs() < 1e-6);
    }

    #[test]
    fn rejects_zero_bins_and_bad_rates() {
        let mut cfg = Config::default();
        cfg.audio.bins = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

        let mut cfg = Config::default();
        cfg.field.decay_rate = 1.5;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

        let mut cfg = Config::default();
        cfg.field.max_pulse = 1.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn default_bins_fit_the_spectrum() {
        let cfg = Config::default();
        assert!(cfg.audio.bins <= cfg.audio.fft_size / 2);
    }

    #[test]
    fn rejects_more_bins_than_magnitudes() {
        let mut cfg = Config::default();
        cfg.audio.fft_size = 2048;
        cfg.audio.bins = 1025;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

        cfg.audio.bins = 1024;
        assert!(cfg.validate().is_ok());

        let cfg = parse_config("[audio]\nbins = 1256\nfft_size = 2048\n").unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn sensitivity_floor() {
        assert_eq!(sanitize_sensitivity(0.01), 0.1);
        assert_eq!(sanitize_sensitivity(2.5), 2.5);
        assert_eq!(sanitize_sensitivity(f32::NAN), 1.0);
    }

    #[test]
    fn example_config_is_valid() {
        let cfg = parse_config(include_str!("../nebula.example.toml")).unwrap();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.audio.bins, 1256);
        assert_eq!(cfg.audio.fft_size, 4096);
        assert_eq!(cfg.output.fps, 60);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
