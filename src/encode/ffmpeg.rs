use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use crate::config::OutputConfig;

pub struct FfmpegEncoder {
    child: Child,
}

/// Raw RGBA frames on stdin, muxed with the source audio track when there is one
pub fn encoder_args(output_path: &Path, input_audio: Option<&Path>, output: &OutputConfig) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-y".to_string(),
        "-f".into(), "rawvideo".into(),
        "-pixel_format".into(), "rgba".into(),
        "-video_size".into(), format!("{}x{}", output.width, output.height),
        "-framerate".into(), output.fps.to_string(),
        "-i".into(), "pipe:0".into(),
    ];
    if let Some(audio) = input_audio {
        args.extend(["-i".into(), audio.to_string_lossy().into_owned()]);
    }
    args.extend([
        "-c:v".into(), output.codec.clone(),
        "-pix_fmt".into(), output.pix_fmt.clone(),
        "-crf".into(), output.crf.to_string(),
        "-preset".into(), "medium".into(),
    ]);
    if input_audio.is_some() {
        args.extend([
            "-c:a".into(), "aac".into(),
            "-b:a".into(), "192k".into(),
            "-shortest".into(),
        ]);
    }
    args.push(output_path.to_string_lossy().into_owned());
    args
}

impl FfmpegEncoder {
    pub fn new(output_path: &Path, input_audio: Option<&Path>, output: &OutputConfig) -> Result<Self> {
        let child = Command::new("ffmpeg")
            .args(encoder_args(output_path, input_audio, output))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to spawn ffmpeg. Is ffmpeg installed?")?;

        log::info!(
            "FFmpeg encoder started: {}x{} @ {}fps, codec={}",
            output.width,
            output.height,
            output.fps,
            output.codec
        );

        Ok(Self { child })
    }

    pub fn write_frame(&mut self, rgba_pixels: &[u8]) -> Result<()> {
        let stdin = self.child.stdin.as_mut().context("FFmpeg stdin not available")?;
        stdin.write_all(rgba_pixels).context("Failed to write frame to ffmpeg")?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        // EOF on stdin ends the stream
        drop(self.child.stdin.take());

        let output = self.child.wait_with_output().context("Failed to wait for ffmpeg")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("FFmpeg exited with error:\n{}", stderr);
        }

        log::info!("FFmpeg encoding complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_carry_output_settings() {
        let output = OutputConfig {
            width: 640,
            height: 360,
            fps: 24,
            ..OutputConfig::default()
        };
        let args = encoder_args(Path::new("out.mp4"), Some(Path::new("song.flac")), &output);
        let after = |flag: &str| args.iter().position(|a| a == flag).map(|i| args[i + 1].as_str());
        assert_eq!(after("-video_size"), Some("640x360"));
        assert_eq!(after("-framerate"), Some("24"));
        assert_eq!(after("-crf"), Some("18"));
        assert_eq!(after("-c:v"), Some("libx264"));
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
        assert!(args.iter().any(|a| a == "song.flac"));
        assert_eq!(after("-c:a"), Some("aac"));
    }

    #[test]
    fn video_only_without_audio_input() {
        let args = encoder_args(Path::new("live.mp4"), None, &OutputConfig::default());
        assert_eq!(args.iter().filter(|a| a.as_str() == "-i").count(), 1);
        assert!(!args.iter().any(|a| a == "-c:a" || a == "-shortest"));
        assert_eq!(args.last().map(String::as_str), Some("live.mp4"));
    }
}
