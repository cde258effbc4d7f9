//! One frame of the pipeline: session → field → render backend.

use anyhow::Result;

use crate::audio::features::FrameFeatures;
use crate::audio::session::AudioSession;
use crate::field::Visualizer;
use crate::render::offscreen::FrameBackend;

pub struct FrameReport {
    /// Features read this frame; `None` means the field held its state
    pub features: Option<FrameFeatures>,
    pub updated: bool,
    pub pixels: Vec<u8>,
}

/// Read the session, advance the field and draw it. The backend is called
/// every frame, with or without audio, so a held field is still shown.
pub fn step<B: FrameBackend>(
    session: &mut AudioSession,
    visualizer: &mut Visualizer,
    backend: &mut B,
    time_s: f32,
) -> Result<FrameReport> {
    let features = session.get_frame();
    let updated = visualizer.update(features.as_ref(), time_s);
    let offset_y = visualizer.offset_y();
    let pixels = backend.draw(visualizer.buffers_mut(), offset_y, time_s)?;
    Ok(FrameReport {
        features,
        updated,
        pixels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::decode::AudioData;
    use crate::config::{AudioConfig, ColorConfig, FieldConfig};
    use crate::field::buffers::{Dirty, PointBuffers};
    use crate::field::Preset;

    /// Records what each draw call was asked to upload
    #[derive(Default)]
    struct Recorder {
        uploads: Vec<Dirty>,
        offsets: Vec<f32>,
        points: usize,
    }

    impl FrameBackend for Recorder {
        fn draw(&mut self, points: &mut PointBuffers, offset_y: f32, _time_s: f32) -> Result<Vec<u8>> {
            self.uploads.push(points.take_dirty());
            self.offsets.push(offset_y);
            self.points = points.len();
            Ok(vec![0; 4])
        }
    }

    fn setup(preset: Preset) -> (AudioSession, Visualizer) {
        let audio = AudioConfig {
            bins: 64,
            ..AudioConfig::default()
        };
        let session = AudioSession::new(audio);
        let visualizer =
            Visualizer::build(preset, 64, &FieldConfig::default(), &ColorConfig::default(), 150).unwrap();
        (session, visualizer)
    }

    fn chirp(sample_rate: u32) -> AudioData {
        AudioData {
            samples: (0..sample_rate)
                .map(|i| {
                    let t = i as f32 / sample_rate as f32;
                    0.7 * (2.0 * std::f32::consts::PI * (60.0 + 400.0 * t) * t).sin()
                })
                .collect(),
            sample_rate,
        }
    }

    #[test]
    fn updates_reach_the_backend_and_clear_dirty_flags() {
        let (mut session, mut visualizer) = setup(Preset::Nebula);
        session.start_clip(chirp(44_100), 60);

        let mut backend = Recorder::default();
        for frame in 0..5 {
            let report = step(&mut session, &mut visualizer, &mut backend, frame as f32 / 60.0).unwrap();
            assert!(report.updated);
            assert!(report.features.is_some());
            assert_eq!(report.pixels.len(), 4);
        }

        assert_eq!(backend.uploads.len(), 5);
        assert!(backend.uploads.iter().all(|d| d.positions && d.colors));
        assert_eq!(backend.points, visualizer.particle_count());
        assert!(!visualizer.buffers().dirty().any());
    }

    #[test]
    fn held_field_is_still_drawn_without_reuploading() {
        let (mut session, mut visualizer) = setup(Preset::Nebula);
        let mut backend = Recorder::default();

        let first = step(&mut session, &mut visualizer, &mut backend, 0.0).unwrap();
        let second = step(&mut session, &mut visualizer, &mut backend, 0.1).unwrap();

        assert!(first.features.is_none() && !first.updated);
        assert!(!second.updated);
        // The initial layout goes up once, then nothing changed
        assert!(backend.uploads[0].any());
        assert!(!backend.uploads[1].any());
    }

    #[test]
    fn cloud_preset_passes_its_sheet_offset() {
        let (mut session, mut visualizer) = setup(Preset::Cloud);
        session.start_clip(chirp(22_050), 30);
        let mut backend = Recorder::default();
        step(&mut session, &mut visualizer, &mut backend, 0.0).unwrap();
        assert_eq!(backend.offsets, vec![crate::field::cloud::SHEET_OFFSET_Y]);
        assert_eq!(backend.points, 64);
    }
}
