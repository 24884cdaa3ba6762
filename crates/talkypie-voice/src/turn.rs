use crate::capability::TurnDetector;
use std::time::Duration;

/// Ends a turn after a short pause when the transcript reads as a complete
/// sentence, or after a longer pause otherwise.
#[derive(Debug, Clone)]
pub struct PunctuationTurnDetector {
    min_delay: Duration,
    max_delay: Duration,
}

impl PunctuationTurnDetector {
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay,
            max_delay: max_delay.max(min_delay),
        }
    }
}

fn looks_complete(transcript: &str) -> bool {
    // '।' is the Devanagari full stop.
    transcript
        .trim_end()
        .ends_with(['.', '?', '!', '।'])
}

impl TurnDetector for PunctuationTurnDetector {
    fn detect_turn_end(&self, transcript: &str, trailing_silence: Duration) -> bool {
        if looks_complete(transcript) {
            trailing_silence >= self.min_delay
        } else {
            trailing_silence >= self.max_delay
        }
    }
}
