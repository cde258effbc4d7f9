use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::{Arc, Mutex};

use super::features::Descriptors;
use crate::config::AudioConfig;

/// Full scale of the byte-mapped magnitudes produced by `SpectrumAnalyzer`
pub const BYTE_FULL_SCALE: f32 = 255.0;

/// Windowed FFT over the most recent samples, smoothed over time and mapped
/// from a decibel range onto 0..=255.
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    window: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
    smoothing: f32,
    min_db: f32,
    max_db: f32,
}

impl SpectrumAnalyzer {
    pub fn new(config: &AudioConfig) -> Self {
        let fft_size = config.fft_size;
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);

        Self {
            fft,
            fft_size,
            window: blackman_window(fft_size),
            scratch: vec![Complex::new(0.0, 0.0); fft_size],
            smoothed: vec![0.0; fft_size / 2],
            smoothing: config.analyser_smoothing,
            min_db: config.min_db,
            max_db: config.max_db,
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Analyse the last `fft_size` samples of `samples` (zero-padded in front
    /// when fewer are available). Returns `bin_count()` magnitudes in 0..=255.
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let n = self.fft_size;
        let take = samples.len().min(n);
        let pad = n - take;
        let recent = &samples[samples.len() - take..];

        for (i, slot) in self.scratch.iter_mut().enumerate() {
            let s = if i < pad { 0.0 } else { recent[i - pad] };
            *slot = Complex::new(s * self.window[i], 0.0);
        }
        self.fft.process(&mut self.scratch);

        let tau = self.smoothing;
        let range = self.max_db - self.min_db;
        let scale = 1.0 / n as f32;

        self.smoothed
            .iter_mut()
            .zip(self.scratch.iter())
            .map(|(prev, c)| {
                *prev = tau * *prev + (1.0 - tau) * c.norm() * scale;
                let db = 20.0 * prev.max(1e-20).log10();
                (BYTE_FULL_SCALE * (db - self.min_db) / range)
                    .floor()
                    .clamp(0.0, BYTE_FULL_SCALE)
            })
            .collect()
    }
}

/// Single-slot register holding the most recent descriptors. The audio
/// callback overwrites it; the render loop reads it once per frame.
#[derive(Clone, Default)]
pub struct LatestDescriptors {
    slot: Arc<Mutex<Option<Descriptors>>>,
}

impl LatestDescriptors {
    pub fn publish(&self, descriptors: Descriptors) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(descriptors);
    }

    /// Last published value, or zeros before the first block completes
    pub fn latest(&self) -> Descriptors {
        let slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.unwrap_or_default()
    }

    pub fn clear(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }
}

/// Computes rms, spectral centroid and flatness on fixed-size blocks and
/// publishes each result into a `LatestDescriptors` register.
pub struct DescriptorAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    block_size: usize,
    sample_rate: u32,
    window: Vec<f32>,
    pending: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    output: LatestDescriptors,
}

impl DescriptorAnalyzer {
    pub fn new(block_size: usize, sample_rate: u32, output: LatestDescriptors) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(block_size);

        Self {
            fft,
            block_size,
            sample_rate,
            window: hann_window(block_size),
            pending: Vec::with_capacity(block_size),
            scratch: vec![Complex::new(0.0, 0.0); block_size],
            output,
        }
    }

    /// Feed samples; every completed block publishes fresh descriptors.
    pub fn push(&mut self, samples: &[f32]) {
        let mut rest = samples;
        while !rest.is_empty() {
            let needed = self.block_size - self.pending.len();
            let (head, tail) = rest.split_at(needed.min(rest.len()));
            self.pending.extend_from_slice(head);
            rest = tail;

            if self.pending.len() == self.block_size {
                let block = std::mem::take(&mut self.pending);
                let descriptors = self.analyze_block(&block);
                self.output.publish(descriptors);
                self.pending = block;
                self.pending.clear();
            }
        }
    }

    pub fn analyze_block(&mut self, block: &[f32]) -> Descriptors {
        if block.is_empty() {
            return Descriptors::default();
        }

        let rms = (block.iter().map(|s| s * s).sum::<f32>() / block.len() as f32).sqrt();

        for (i, slot) in self.scratch.iter_mut().enumerate() {
            let s = block.get(i).copied().unwrap_or(0.0);
            *slot = Complex::new(s * self.window[i], 0.0);
        }
        self.fft.process(&mut self.scratch);

        let half = self.block_size / 2;
        let freq_resolution = self.sample_rate as f32 / self.block_size as f32;
        let amplitudes: Vec<f32> = self.scratch[..half].iter().map(|c| c.norm()).collect();

        let total: f32 = amplitudes.iter().sum();
        let centroid_hz = if total > 1e-10 {
            amplitudes
                .iter()
                .enumerate()
                .map(|(i, &a)| i as f32 * freq_resolution * a)
                .sum::<f32>()
                / total
        } else {
            0.0
        };

        let flatness = spectral_flatness(&amplitudes);

        Descriptors {
            rms,
            centroid_hz,
            flatness,
        }
    }
}

/// Geometric over arithmetic mean of the amplitude spectrum
fn spectral_flatness(amplitudes: &[f32]) -> f32 {
    if amplitudes.is_empty() {
        return 0.0;
    }
    let n = amplitudes.len() as f64;
    let arithmetic = amplitudes.iter().map(|&a| a as f64).sum::<f64>() / n;
    if arithmetic <= 1e-12 {
        return 0.0;
    }
    let log_mean = amplitudes
        .iter()
        .map(|&a| (a as f64).max(1e-20).ln())
        .sum::<f64>()
        / n;
    (log_mean.exp() / arithmetic).clamp(0.0, 1.0) as f32
}

fn blackman_window(size: usize) -> Vec<f32> {
    let a0 = 0.42;
    let a1 = 0.5;
    let a2 = 0.08;
    (0..size)
        .map(|i| {
            let x = 2.0 * std::f32::consts::PI * i as f32 / size as f32;
            a0 - a1 * x.cos() + a2 * (2.0 * x).cos()
        })
        .collect()
}

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1).max(1) as f32).cos())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 44_100;

    fn sine(freq: f32, len: usize, amp: f32) -> Vec<f32> {
        (0..len)
            .map(|i| amp * (2.0 * std::f32::consts::PI * freq * i as f32 / SR as f32).sin())
            .collect()
    }

    fn noise(len: usize) -> Vec<f32> {
        let mut state: u32 = 0x1234_5678;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0
            })
            .collect()
    }

    #[test]
    fn spectrum_peaks_at_tone_bin() {
        let mut analyzer = SpectrumAnalyzer::new(&AudioConfig::default());
        let mags = analyzer.process(&sine(1000.0, 4096, 0.8));
        assert_eq!(mags.len(), 2048);

        let peak = mags
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        let expected = (1000.0 / (SR as f32 / 4096.0)).round() as usize;
        assert!((peak as i64 - expected as i64).abs() <= 1, "peak {} expected {}", peak, expected);
        assert!(mags.iter().all(|&m| (0.0..=255.0).contains(&m)));
    }

    #[test]
    fn silence_maps_to_zero() {
        let mut analyzer = SpectrumAnalyzer::new(&AudioConfig::default());
        let mags = analyzer.process(&vec![0.0; 4096]);
        assert!(mags.iter().all(|&m| m == 0.0));
    }

    #[test]
    fn short_input_is_zero_padded() {
        let mut analyzer = SpectrumAnalyzer::new(&AudioConfig::default());
        let mags = analyzer.process(&sine(440.0, 100, 0.5));
        assert_eq!(mags.len(), analyzer.bin_count());
    }

    #[test]
    fn descriptors_for_tone() {
        let mut analyzer = DescriptorAnalyzer::new(1024, SR, LatestDescriptors::default());
        let d = analyzer.analyze_block(&sine(2000.0, 1024, 0.5));
        assert!((d.rms - 0.5 / 2f32.sqrt()).abs() < 0.02);
        assert!((d.centroid_hz - 2000.0).abs() < 300.0, "centroid {}", d.centroid_hz);
        assert!(d.flatness < 0.3);
    }

    #[test]
    fn noise_is_flatter_than_tone() {
        let mut analyzer = DescriptorAnalyzer::new(1024, SR, LatestDescriptors::default());
        let tone = analyzer.analyze_block(&sine(500.0, 1024, 0.5));
        let hiss = analyzer.analyze_block(&noise(1024));
        assert!(hiss.flatness > tone.flatness);
        assert!((0.0..=1.0).contains(&hiss.flatness));
    }

    #[test]
    fn push_publishes_per_completed_block() {
        let register = LatestDescriptors::default();
        let mut analyzer = DescriptorAnalyzer::new(256, SR, register.clone());

        analyzer.push(&sine(1000.0, 200, 0.5));
        assert_eq!(register.latest(), Descriptors::default());

        analyzer.push(&sine(1000.0, 100, 0.5));
        assert!(register.latest().rms > 0.0);

        register.clear();
        assert_eq!(register.latest(), Descriptors::default());
    }
}
