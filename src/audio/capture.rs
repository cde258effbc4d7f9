use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::analysis::{DescriptorAnalyzer, LatestDescriptors};
use super::decode::AudioData;
use super::AudioError;

/// Bounded ring of the most recent mono samples seen by a device stream
#[derive(Clone)]
pub struct SampleTap {
    inner: Arc<Mutex<VecDeque<f32>>>,
    capacity: usize,
}

impl SampleTap {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&self, samples: &[f32]) {
        let mut ring = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        ring.extend(samples.iter().copied());
        let overflow = ring.len().saturating_sub(self.capacity);
        ring.drain(..overflow);
    }

    /// Up to `n` most recent samples, oldest first
    pub fn recent(&self, n: usize) -> Vec<f32> {
        let ring = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let skip = ring.len().saturating_sub(n);
        ring.iter().skip(skip).copied().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A running device stream; dropping it stops the device.
pub struct DeviceStream {
    _stream: cpal::Stream,
    pub sample_rate: u32,
}

fn build_failure(err: cpal::BuildStreamError) -> AudioError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => {
            AudioError::DeviceAccessDenied("device not available".into())
        }
        other => AudioError::Stream(other.to_string()),
    }
}

/// Open the default input device. Every callback block is downmixed to mono,
/// pushed into `tap`, and fed to a descriptor analyser publishing into
/// `descriptors`.
pub fn open_microphone(
    tap: SampleTap,
    descriptors: LatestDescriptors,
    descriptor_block: usize,
) -> Result<DeviceStream, AudioError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| AudioError::NoDevice("input".into()))?;
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    let supported = device
        .default_input_config()
        .map_err(|e| AudioError::DeviceAccessDenied(e.to_string()))?;
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let sample_rate = config.sample_rate.0;

    let analyzer = DescriptorAnalyzer::new(descriptor_block, sample_rate, descriptors);

    let stream = match sample_format {
        SampleFormat::F32 => build_input::<f32>(&device, &config, tap, analyzer)?,
        SampleFormat::I16 => build_input::<i16>(&device, &config, tap, analyzer)?,
        SampleFormat::U16 => build_input::<u16>(&device, &config, tap, analyzer)?,
        other => return Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
    };

    stream.play().map_err(|e| AudioError::Stream(e.to_string()))?;
    log::info!("Microphone: {} @ {}Hz", device_name, sample_rate);

    Ok(DeviceStream {
        _stream: stream,
        sample_rate,
    })
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    tap: SampleTap,
    mut analyzer: DescriptorAnalyzer,
) -> Result<cpal::Stream, AudioError>
where
    T: Sample + SizedSample,
    f32: FromSample<T>,
{
    let channels = (config.channels as usize).max(1);
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let mono = downmix(data, channels);
                tap.push(&mono);
                analyzer.push(&mono);
            },
            |err| log::warn!("Input stream error: {}", err),
            None,
        )
        .map_err(build_failure)
}

/// Play `audio` on the default output device in a loop. The played samples
/// are tapped exactly like microphone input.
pub fn open_playback(
    audio: AudioData,
    tap: SampleTap,
    descriptors: LatestDescriptors,
    descriptor_block: usize,
) -> Result<DeviceStream, AudioError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| AudioError::NoDevice("output".into()))?;
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    let supported = device
        .default_output_config()
        .map_err(|e| AudioError::DeviceAccessDenied(e.to_string()))?;
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let sample_rate = config.sample_rate.0;

    let analyzer = DescriptorAnalyzer::new(descriptor_block, sample_rate, descriptors);
    let cursor = LoopCursor::new(audio, sample_rate);

    let stream = match sample_format {
        SampleFormat::F32 => build_output::<f32>(&device, &config, cursor, tap, analyzer)?,
        SampleFormat::I16 => build_output::<i16>(&device, &config, cursor, tap, analyzer)?,
        SampleFormat::U16 => build_output::<u16>(&device, &config, cursor, tap, analyzer)?,
        other => return Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
    };

    stream.play().map_err(|e| AudioError::Stream(e.to_string()))?;
    log::info!("Playback: {} @ {}Hz (looping)", device_name, sample_rate);

    Ok(DeviceStream {
        _stream: stream,
        sample_rate,
    })
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut cursor: LoopCursor,
    tap: SampleTap,
    mut analyzer: DescriptorAnalyzer,
) -> Result<cpal::Stream, AudioError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = (config.channels as usize).max(1);
    let mut played: Vec<f32> = Vec::new();
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                played.clear();
                for frame in data.chunks_mut(channels) {
                    let s = cursor.next_sample();
                    for out in frame.iter_mut() {
                        *out = T::from_sample(s);
                    }
                    played.push(s);
                }
                tap.push(&played);
                analyzer.push(&played);
            },
            |err| log::warn!("Output stream error: {}", err),
            None,
        )
        .map_err(build_failure)
}

fn downmix<T>(data: &[T], channels: usize) -> Vec<f32>
where
    T: Sample,
    f32: FromSample<T>,
{
    data.chunks(channels)
        .map(|frame| {
            frame.iter().map(|&s| f32::from_sample(s)).sum::<f32>() / frame.len() as f32
        })
        .collect()
}

/// Looping read position over decoded audio, stepping at the ratio between
/// the file's and the device's sample rate (nearest sample).
struct LoopCursor {
    samples: Vec<f32>,
    position: f64,
    step: f64,
}

impl LoopCursor {
    fn new(audio: AudioData, device_rate: u32) -> Self {
        let step = if device_rate == 0 {
            1.0
        } else {
            audio.sample_rate as f64 / device_rate as f64
        };
        Self {
            samples: audio.samples,
            position: 0.0,
            step,
        }
    }

    fn next_sample(&mut self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let len = self.samples.len() as f64;
        let s = self.samples[(self.position as usize).min(self.samples.len() - 1)];
        self.position += self.step;
        if self.position >= len {
            self.position -= len;
        }
        s
    }
}
