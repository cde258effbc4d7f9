pub mod aggregate;
pub mod analysis;
pub mod capture;
pub mod decode;
pub mod features;
pub mod session;

use thiserror::Error;

/// Failures while establishing an audio session. All are recovered by the
/// caller: the session is left inactive and rendering continues.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("audio device access denied: {0}")]
    DeviceAccessDenied(String),
    #[error("no {0} device available")]
    NoDevice(String),
    #[error("could not decode audio: {0}")]
    DecodeFailure(String),
    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),
    #[error("audio stream error: {0}")]
    Stream(String),
}
