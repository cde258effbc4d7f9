//! Line-based controls for the live loop, read from stdin.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};

use crate::audio::decode::{self, AudioData};

/// Something the live loop applies between frames. Nothing here blocks:
/// files arrive already decoded.
#[derive(Clone, Debug, PartialEq)]
pub enum Control {
    Sensitivity(f32),
    History(usize),
    Microphone,
    Play(AudioData),
    Stop,
    Quit,
}

/// A parsed input line
#[derive(Clone, Debug, PartialEq)]
pub enum Request {
    Apply(Control),
    /// Decode this file on the reader thread, then `Control::Play` it
    Load(PathBuf),
}

pub const HELP: &str = "controls: s <gain> | h <depth> | mic | file <path> | stop | q";

pub fn parse_control(line: &str) -> Option<Request> {
    let line = line.trim();
    let (cmd, arg) = match line.split_once(char::is_whitespace) {
        Some((cmd, arg)) => (cmd, arg.trim()),
        None => (line, ""),
    };
    let control = match cmd {
        "s" | "sensitivity" => Control::Sensitivity(arg.parse().ok()?),
        "h" | "history" => Control::History(arg.parse().ok()?),
        "mic" | "microphone" => Control::Microphone,
        "file" | "f" if !arg.is_empty() => return Some(Request::Load(PathBuf::from(arg))),
        "stop" => Control::Stop,
        "q" | "quit" | "exit" => Control::Quit,
        _ => return None,
    };
    Some(Request::Apply(control))
}

/// Turn a request into something the loop can apply without waiting.
/// A file that fails to load is reported here and never reaches the loop.
pub fn resolve(request: Request) -> Option<Control> {
    match request {
        Request::Apply(control) => Some(control),
        Request::Load(path) => match decode::decode_file(&path) {
            Ok(audio) => Some(Control::Play(audio)),
            Err(err) => {
                log::warn!("Cannot play {}: {}", path.display(), err);
                None
            }
        },
    }
}

/// Forward parsed stdin lines on a channel the render loop drains without
/// blocking. EOF on stdin ends the reader, not the loop.
pub fn spawn_stdin_reader() -> Receiver<Control> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            let Some(request) = parse_control(&line) else {
                log::warn!("Unknown control {:?}; {}", line.trim(), HELP);
                continue;
            };
            if let Some(control) = resolve(request) {
                if tx.send(control).is_err() {
                    break;
                }
            }
        }
    });
    rx
}
