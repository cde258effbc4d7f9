//! Audio session: at most one active source, read once per render frame.

use super::aggregate::FeatureAggregator;
use super::analysis::{DescriptorAnalyzer, LatestDescriptors, SpectrumAnalyzer, BYTE_FULL_SCALE};
use super::capture::{self, DeviceStream, SampleTap};
use super::decode::{self, AudioData};
use super::features::{FrameFeatures, RawSpectrum};
use super::AudioError;
use crate::config::AudioConfig;

/// Anything that can hand the analyser its most recent samples
pub trait SampleSource {
    fn sample_rate(&self) -> u32;
    fn label(&self) -> &'static str;
    /// Up to `n` most recent mono samples, or `None` when nothing has arrived
    fn recent(&mut self, n: usize) -> Option<Vec<f32>>;
}

/// Device-backed source (microphone or file playback)
struct DeviceSource {
    stream: DeviceStream,
    tap: SampleTap,
    label: &'static str,
}

impl SampleSource for DeviceSource {
    fn sample_rate(&self) -> u32 {
        self.stream.sample_rate
    }

    fn label(&self) -> &'static str {
        self.label
    }

    fn recent(&mut self, n: usize) -> Option<Vec<f32>> {
        if self.tap.is_empty() {
            return None;
        }
        Some(self.tap.recent(n))
    }
}

/// Device-free source over decoded audio. Each read advances one video frame
/// worth of samples and loops at the end of the clip.
pub struct ClipSource {
    audio: AudioData,
    cursor: usize,
    hop: usize,
    descriptors: DescriptorAnalyzer,
}

impl ClipSource {
    pub fn new(audio: AudioData, fps: u32, descriptor_block: usize, register: LatestDescriptors) -> Self {
        let hop = ((audio.sample_rate as f32 / fps.max(1) as f32).round() as usize).max(1);
        let descriptors = DescriptorAnalyzer::new(descriptor_block, audio.sample_rate, register);
        Self {
            audio,
            cursor: 0,
            hop,
            descriptors,
        }
    }

    pub fn hop(&self) -> usize {
        self.hop
    }

    fn advance(&mut self) {
        let len = self.audio.samples.len();
        let mut remaining = self.hop;
        while remaining > 0 {
            let end = (self.cursor + remaining).min(len);
            self.descriptors.push(&self.audio.samples[self.cursor..end]);
            remaining -= end - self.cursor;
            self.cursor = if end == len { 0 } else { end };
        }
    }

    fn window(&self, n: usize) -> Vec<f32> {
        let len = self.audio.samples.len();
        let n = n.min(len);
        (0..n)
            .map(|i| self.audio.samples[(self.cursor + len - n + i) % len])
            .collect()
    }
}

impl SampleSource for ClipSource {
    fn sample_rate(&self) -> u32 {
        self.audio.sample_rate
    }

    fn label(&self) -> &'static str {
        "clip"
    }

    fn recent(&mut self, n: usize) -> Option<Vec<f32>> {
        if self.audio.samples.is_empty() {
            return None;
        }
        self.advance();
        Some(self.window(n))
    }
}

struct ActiveSource {
    source: Box<dyn SampleSource>,
    analyzer: SpectrumAnalyzer,
    descriptors: LatestDescriptors,
}

pub struct AudioSession {
    config: AudioConfig,
    active: Option<ActiveSource>,
    aggregator: FeatureAggregator,
}

impl AudioSession {
    pub fn new(config: AudioConfig) -> Self {
        let aggregator = FeatureAggregator::new(&config);
        Self {
            config,
            active: None,
            aggregator,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn source_label(&self) -> Option<&'static str> {
        self.active.as_ref().map(|a| a.source.label())
    }

    pub fn set_sensitivity(&mut self, value: f32) {
        self.aggregator.set_sensitivity(value);
    }

    pub fn sensitivity(&self) -> f32 {
        self.aggregator.sensitivity()
    }

    pub fn bins(&self) -> usize {
        self.aggregator.bins()
    }

    pub fn start_microphone(&mut self) -> Result<(), AudioError> {
        self.stop();
        let register = LatestDescriptors::default();
        let tap = SampleTap::new(self.config.fft_size * 4);
        let stream = capture::open_microphone(tap.clone(), register.clone(), self.config.descriptor_buffer)?;
        self.activate(
            Box::new(DeviceSource {
                stream,
                tap,
                label: "microphone",
            }),
            register,
        );
        Ok(())
    }

    /// Decode `bytes` and play them back in a loop. Nothing starts when the
    /// bytes are not decodable audio.
    pub fn start_file(&mut self, bytes: Vec<u8>, extension: Option<&str>) -> Result<(), AudioError> {
        self.stop();
        let audio = decode::decode_bytes(bytes, extension)?;
        self.start_playback(audio)
    }

    /// Play already decoded audio in a loop through the output device.
    pub fn start_playback(&mut self, audio: AudioData) -> Result<(), AudioError> {
        self.stop();
        let register = LatestDescriptors::default();
        let tap = SampleTap::new(self.config.fft_size * 4);
        let stream = capture::open_playback(audio, tap.clone(), register.clone(), self.config.descriptor_buffer)?;
        self.activate(
            Box::new(DeviceSource {
                stream,
                tap,
                label: "file",
            }),
            register,
        );
        Ok(())
    }

    /// Start a device-free session stepping through `audio` at `fps` reads per second
    pub fn start_clip(&mut self, audio: AudioData, fps: u32) {
        self.stop();
        let register = LatestDescriptors::default();
        let clip = ClipSource::new(audio, fps, self.config.descriptor_buffer, register.clone());
        self.activate(Box::new(clip), register);
    }

    fn activate(&mut self, source: Box<dyn SampleSource>, descriptors: LatestDescriptors) {
        log::info!("Audio session started ({} @ {}Hz)", source.label(), source.sample_rate());
        self.aggregator.reset();
        self.active = Some(ActiveSource {
            source,
            analyzer: SpectrumAnalyzer::new(&self.config),
            descriptors,
        });
    }

    /// Release every audio resource. Safe to call with no active session.
    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.descriptors.clear();
            log::info!("Audio session stopped ({})", active.source.label());
        }
    }

    pub fn read_frame(&mut self) -> Option<RawSpectrum> {
        let active = self.active.as_mut()?;
        let samples = active.source.recent(active.analyzer.fft_size())?;
        let magnitudes = active.analyzer.process(&samples);
        Some(RawSpectrum {
            magnitudes,
            full_scale: BYTE_FULL_SCALE,
            sample_rate: active.source.sample_rate(),
            descriptors: active.descriptors.latest(),
        })
    }

    /// Current smoothed features, or `None` when there is nothing to render
    pub fn get_frame(&mut self) -> Option<FrameFeatures> {
        let raw = self.read_frame()?;
        Some(self.aggregator.aggregate(&raw))
    }
}

impl Drop for AudioSession {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f32, seconds: f32, sample_rate: u32) -> AudioData {
        let n = (seconds * sample_rate as f32) as usize;
        AudioData {
            samples: (0..n)
                .map(|i| 0.6 * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
                .collect(),
            sample_rate,
        }
    }

    fn noise(seconds: f32, sample_rate: u32) -> AudioData {
        let mut state: u32 = 0x9e37_79b9;
        let n = (seconds * sample_rate as f32) as usize;
        AudioData {
            samples: (0..n)
                .map(|_| {
                    state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                    (state >> 8) as f32 / (1u32 << 24) as f32 * 1.6 - 0.8
                })
                .collect(),
            sample_rate,
        }
    }

    fn small_config() -> AudioConfig {
        AudioConfig {
            bins: 256,
            ..AudioConfig::default()
        }
    }

    #[test]
    fn no_frame_without_session() {
        let mut session = AudioSession::new(small_config());
        assert!(!session.is_active());
        assert!(session.read_frame().is_none());
        assert!(session.get_frame().is_none());
    }

    #[test]
    fn clip_session_produces_bounded_frames() {
        let mut session = AudioSession::new(small_config());
        session.start_clip(tone(80.0, 1.0, 44_100), 60);
        assert!(session.is_active());
        assert_eq!(session.source_label(), Some("clip"));

        let mut last = None;
        for _ in 0..30 {
            let f = session.get_frame().expect("active clip yields frames");
            assert_eq!(f.bins.len(), 256);
            assert!(f.bins.iter().all(|&b| (0.0..=1.0).contains(&b)));
            assert!((0.0..=1.0).contains(&f.centroid_norm));
            last = Some(f);
        }
        let f = last.unwrap();
        assert!(f.bass > f.highs, "bass {} highs {}", f.bass, f.highs);
        assert!(f.rms > 0.0);
    }

    #[test]
    fn default_config_reaches_every_bin_and_particle() {
        use crate::config::FieldConfig;
        use crate::field::layout::{generate, IndexHash};

        let config = AudioConfig::default();
        let mut session = AudioSession::new(config.clone());
        session.start_clip(noise(1.0, 44_100), 60);

        let mut frame = None;
        for _ in 0..10 {
            frame = session.get_frame();
        }
        let frame = frame.expect("noise clip yields frames");
        assert_eq!(frame.bins.len(), config.bins);
        let silent: Vec<usize> = (0..frame.bins.len()).filter(|&i| frame.bins[i] == 0.0).collect();
        assert!(silent.is_empty(), "silent bins under broadband input: {:?}", silent);

        let field = FieldConfig::default();
        let layout = generate(config.bins * field.multiplier, config.bins, field.base_radius, IndexHash::new(field.seed));
        let unreachable = layout.bound_bins.iter().filter(|&&b| frame.bins.get(b).map_or(true, |&v| v == 0.0)).count();
        assert_eq!(unreachable, 0, "particles bound to silent bins");
    }

    #[test]
    fn clip_loops_past_its_end() {
        let mut session = AudioSession::new(small_config());
        session.start_clip(tone(440.0, 0.1, 44_100), 30);
        for _ in 0..20 {
            assert!(session.get_frame().is_some());
        }
    }

    #[test]
    fn stop_is_idempotent() {
        let mut session = AudioSession::new(small_config());
        session.stop();
        session.start_clip(tone(440.0, 0.5, 44_100), 60);
        session.stop();
        session.stop();
        assert!(!session.is_active());
        assert!(session.get_frame().is_none());
    }

    #[test]
    fn starting_replaces_previous_session() {
        let mut session = AudioSession::new(small_config());
        session.start_clip(tone(440.0, 0.5, 44_100), 60);
        for _ in 0..10 {
            session.get_frame();
        }
        session.start_clip(tone(440.0, 0.5, 22_050), 60);
        assert!(session.is_active());
        let raw = session.read_frame().unwrap();
        assert_eq!(raw.sample_rate, 22_050);
    }

    #[test]
    fn undecodable_file_leaves_session_inactive() {
        let mut session = AudioSession::new(small_config());
        session.start_clip(tone(440.0, 0.5, 44_100), 60);
        let err = session.start_file(b"not audio at all".to_vec(), None).unwrap_err();
        assert!(matches!(err, AudioError::DecodeFailure(_)));
        assert!(!session.is_active());
    }

    #[test]
    fn sensitivity_is_floored() {
        let mut session = AudioSession::new(small_config());
        session.set_sensitivity(0.0);
        assert!((session.sensitivity() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn clip_hop_matches_frame_rate() {
        let clip = ClipSource::new(tone(440.0, 0.5, 48_000), 60, 1024, LatestDescriptors::default());
        assert_eq!(clip.hop(), 800);
    }
}
