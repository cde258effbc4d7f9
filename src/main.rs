mod audio;
mod cli;
mod config;
mod controls;
mod driver;
mod encode;
mod field;
mod render;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::{Duration, Instant};

use audio::session::AudioSession;
use cli::{Cli, Command, LiveArgs, RenderArgs};
use config::Config;
use controls::Control;
use encode::ffmpeg::FfmpegEncoder;
use field::Visualizer;
use render::offscreen::OffscreenRenderer;
use render::text::HudOverlay;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let mut config = resolve_config(cli.config.as_deref());

    match &cli.command {
        Command::Render(args) => {
            args.apply(&mut config);
            config.validate()?;
            render(args, &config)
        }
        Command::Live(args) => {
            args.apply(&mut config);
            config.validate()?;
            live(args, &config)
        }
    }
}

/// A broken or missing config file is not fatal: warn and use defaults.
fn resolve_config(explicit: Option<&Path>) -> Config {
    let Some(path) = config::find_config(explicit) else {
        return Config::default();
    };
    match config::load_config(&path) {
        Ok(cfg) => {
            log::info!("Loaded config from {}", path.display());
            cfg
        }
        Err(err) => {
            log::warn!("{}; using defaults", err);
            Config::default()
        }
    }
}

fn render(args: &RenderArgs, config: &Config) -> Result<()> {
    let output = &config.output;
    log::info!("nebula - audio-reactive particle renderer");
    log::info!("Input: {}", args.input.display());
    log::info!("Output: {}", args.output.display());
    log::info!("Resolution: {}x{} @ {}fps", output.width, output.height, output.fps);

    // 1. Decode audio
    let audio = audio::decode::decode_file(&args.input)
        .with_context(|| format!("Failed to decode {}", args.input.display()))?;
    let duration = audio.duration();
    let total_frames = (duration * output.fps as f32).ceil() as u64;
    log::info!("Total frames: {}, Duration: {:.1}s", total_frames, duration);

    // 2. Audio session over the decoded clip, one read per video frame
    let mut session = AudioSession::new(config.audio.clone());
    session.start_clip(audio, output.fps);

    // 3. Particle field
    let mut visualizer = Visualizer::build(
        args.field.preset,
        config.audio.bins,
        &config.field,
        &config.color,
        config.field.history,
    )?;

    // 4. GPU
    let mut renderer = OffscreenRenderer::new(output.width, output.height)?;

    let hud = match &args.hud_font {
        Some(path) => {
            let font_size = (output.width.min(output.height) as f32 * 0.035).max(14.0);
            Some(HudOverlay::from_file(path, font_size)?)
        }
        None => None,
    };

    // 5. Encoder
    let mut encoder = FfmpegEncoder::new(&args.output, Some(&args.input), output)?;

    let pb = ProgressBar::new(total_frames);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames ({eta} remaining)")?
            .progress_chars("=>-"),
    );

    let mut skipped = 0u64;
    for frame_idx in 0..total_frames {
        let time = frame_idx as f32 / output.fps as f32;
        let mut frame = driver::step(&mut session, &mut visualizer, &mut renderer, time)?;
        if !frame.updated {
            skipped += 1;
        }

        if let (Some(hud), Some(f)) = (&hud, &frame.features) {
            hud.draw_stats(&mut frame.pixels, output.width, output.height, f.centroid_hz, f.flatness);
        }

        encoder.write_frame(&frame.pixels)?;
        pb.set_position(frame_idx + 1);
    }

    pb.finish_with_message("Rendering complete");
    if skipped > 0 {
        log::warn!("{} frames held their previous state", skipped);
    }
    session.stop();

    log::info!("Finishing encoding...");
    encoder.finish()?;

    log::info!("Done! Output: {}", args.output.display());
    Ok(())
}

enum Flow {
    Continue,
    Quit,
}

/// Start a session from the given source. Failures are logged and leave the
/// session inactive; the field keeps rendering its last state.
fn start_source(session: &mut AudioSession, file: Option<&Path>) {
    let started = match file {
        Some(path) => match std::fs::read(path) {
            Ok(bytes) => {
                let extension = path.extension().and_then(|e| e.to_str()).map(str::to_lowercase);
                session.start_file(bytes, extension.as_deref())
            }
            Err(err) => {
                log::warn!("Failed to read {}: {}", path.display(), err);
                return;
            }
        },
        None => session.start_microphone(),
    };
    if let Err(err) = started {
        log::warn!("Audio session not started: {}", err);
    }
}

fn apply_control(control: Control, session: &mut AudioSession, visualizer: &mut Visualizer) -> Flow {
    match control {
        Control::Sensitivity(value) => {
            session.set_sensitivity(value);
            log::info!("Sensitivity set to {:.2}", session.sensitivity());
        }
        Control::History(depth) => {
            if let Err(err) = visualizer.set_history(depth) {
                log::warn!("History change rejected: {}", err);
            }
        }
        Control::Microphone => start_source(session, None),
        Control::Play(audio) => {
            if let Err(err) = session.start_playback(audio) {
                log::warn!("Audio session not started: {}", err);
            }
        }
        Control::Stop => session.stop(),
        Control::Quit => return Flow::Quit,
    }
    Flow::Continue
}

fn live(args: &LiveArgs, config: &Config) -> Result<()> {
    let output = &config.output;
    let mut session = AudioSession::new(config.audio.clone());
    start_source(&mut session, args.file.as_deref());

    let mut visualizer = Visualizer::build(
        args.field.preset,
        config.audio.bins,
        &config.field,
        &config.color,
        config.field.history,
    )?;
    let mut renderer = OffscreenRenderer::new(output.width, output.height)?;
    let mut recorder = match &args.record {
        Some(path) => {
            log::info!("Recording to {}", path.display());
            Some(FfmpegEncoder::new(path, args.file.as_deref(), output)?)
        }
        None => None,
    };

    let inbox = controls::spawn_stdin_reader();
    log::info!("{}", controls::HELP);

    let frame_budget = Duration::from_secs_f64(1.0 / output.fps as f64);
    let start = Instant::now();
    let mut last_report = start;
    let mut frames = 0u64;
    let mut updated = 0u64;

    'frames: loop {
        let frame_start = Instant::now();
        let time = start.elapsed().as_secs_f32();
        if args.seconds.is_some_and(|limit| time >= limit) {
            break;
        }

        while let Ok(control) = inbox.try_recv() {
            if let Flow::Quit = apply_control(control, &mut session, &mut visualizer) {
                break 'frames;
            }
        }

        let frame = driver::step(&mut session, &mut visualizer, &mut renderer, time)?;
        if frame.updated {
            updated += 1;
        }
        if let Some(recorder) = recorder.as_mut() {
            recorder.write_frame(&frame.pixels)?;
        }
        frames += 1;

        if last_report.elapsed() >= Duration::from_secs(1) {
            match &frame.features {
                Some(f) => log::debug!(
                    "[{}] Centroid: {:.0} Hz | Flatness: {:.2} | rms {:.3} | scale {:.2}",
                    session.source_label().unwrap_or("-"),
                    f.centroid_hz,
                    f.flatness,
                    f.rms,
                    visualizer.scale()
                ),
                None => log::debug!(
                    "No audio ({}); field holding at scale {:.2}",
                    if session.is_active() { "waiting for samples" } else { "no session" },
                    visualizer.scale()
                ),
            }
            last_report = Instant::now();
        }

        if let Some(rest) = frame_budget.checked_sub(frame_start.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    session.stop();
    if let Some(recorder) = recorder {
        recorder.finish()?;
    }
    log::info!(
        "Live session ended: {} frames, {} with audio, {:.1}s",
        frames,
        updated,
        start.elapsed().as_secs_f32()
    );
    Ok(())
}
