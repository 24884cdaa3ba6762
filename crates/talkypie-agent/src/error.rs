use talkypie_voice::VoiceError;
use thiserror::Error;

use crate::session::SessionState;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Voice(#[from] VoiceError),

    #[error("invalid session transition from {from} to {to}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },

    #[error("voice activity detector was not loaded by prewarm")]
    MissingVad,

    #[error("session task failed: {0}")]
    Join(String),
}
