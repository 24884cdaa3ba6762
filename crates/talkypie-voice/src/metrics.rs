//! Pipeline metrics events and the per-session usage accumulator.
//!
//! Stages report through a [`MetricsSink`]; the session owns the receiving
//! end, logs each event as it arrives, and folds it into a
//! [`UsageCollector`]. Once every sink is dropped the channel closes and
//! the final [`UsageSummary`] is computed from the complete event set.

use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub enum Metrics {
    /// One speech segment, reported when the VAD sees it end.
    Vad {
        speech_duration: Duration,
        inference_count: u64,
    },
    Stt {
        audio_duration: Duration,
        duration: Duration,
    },
    Llm {
        prompt_tokens: u64,
        completion_tokens: u64,
        prompt_cached_tokens: u64,
        duration: Duration,
    },
    Tts {
        characters_count: u64,
        audio_duration: Duration,
        duration: Duration,
    },
    EndOfUtterance {
        /// Silence between the end of speech and the committed turn.
        end_of_utterance_delay: Duration,
        /// Time from end of speech until the transcript was available.
        transcription_delay: Duration,
    },
}

impl Metrics {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Vad { .. } => "vad",
            Self::Stt { .. } => "stt",
            Self::Llm { .. } => "llm",
            Self::Tts { .. } => "tts",
            Self::EndOfUtterance { .. } => "eou",
        }
    }
}

/// A "metrics collected" event from the pipeline, stamped when emitted.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsCollected {
    pub timestamp: DateTime<Utc>,
    pub metrics: Metrics,
}

/// Sending half of a session's metrics channel.
#[derive(Debug, Clone)]
pub struct MetricsSink {
    tx: mpsc::UnboundedSender<MetricsCollected>,
}

impl MetricsSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<MetricsCollected>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, metrics: Metrics) {
        let event = MetricsCollected {
            timestamp: Utc::now(),
            metrics,
        };
        if self.tx.send(event).is_err() {
            tracing::debug!("metrics receiver closed, dropping event");
        }
    }
}

/// Logs one metrics event with a field per measurement, inside a span
/// carrying the time it was emitted.
pub fn log_metrics(event: &MetricsCollected) {
    let _span = tracing::info_span!(
        "metrics",
        collected_at = %event.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
    .entered();
    match &event.metrics {
        Metrics::Vad {
            speech_duration,
            inference_count,
        } => tracing::info!(
            speech_duration_ms = speech_duration.as_millis() as u64,
            inference_count,
            "VAD metrics"
        ),
        Metrics::Stt {
            audio_duration,
            duration,
        } => tracing::info!(
            audio_duration_ms = audio_duration.as_millis() as u64,
            duration_ms = duration.as_millis() as u64,
            "STT metrics"
        ),
        Metrics::Llm {
            prompt_tokens,
            completion_tokens,
            prompt_cached_tokens,
            duration,
        } => tracing::info!(
            prompt_tokens,
            completion_tokens,
            prompt_cached_tokens,
            duration_ms = duration.as_millis() as u64,
            "LLM metrics"
        ),
        Metrics::Tts {
            characters_count,
            audio_duration,
            duration,
        } => tracing::info!(
            characters_count,
            audio_duration_ms = audio_duration.as_millis() as u64,
            duration_ms = duration.as_millis() as u64,
            "TTS metrics"
        ),
        Metrics::EndOfUtterance {
            end_of_utterance_delay,
            transcription_delay,
        } => tracing::info!(
            end_of_utterance_delay_ms = end_of_utterance_delay.as_millis() as u64,
            transcription_delay_ms = transcription_delay.as_millis() as u64,
            "EOU metrics"
        ),
    }
}

/// Running usage totals for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageSummary {
    pub llm_prompt_tokens: u64,
    pub llm_prompt_cached_tokens: u64,
    pub llm_completion_tokens: u64,
    pub tts_characters_count: u64,
    pub tts_audio_duration: Duration,
    pub stt_audio_duration: Duration,
}

impl fmt::Display for UsageSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "UsageSummary(llm_prompt_tokens={}, llm_prompt_cached_tokens={}, \
             llm_completion_tokens={}, tts_characters_count={}, \
             tts_audio_duration={:.3}s, stt_audio_duration={:.3}s)",
            self.llm_prompt_tokens,
            self.llm_prompt_cached_tokens,
            self.llm_completion_tokens,
            self.tts_characters_count,
            self.tts_audio_duration.as_secs_f64(),
            self.stt_audio_duration.as_secs_f64(),
        )
    }
}

#[derive(Debug, Default)]
pub struct UsageCollector {
    summary: UsageSummary,
}

impl UsageCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collect(&mut self, metrics: &Metrics) {
        let summary = &mut self.summary;
        match metrics {
            Metrics::Llm {
                prompt_tokens,
                completion_tokens,
                prompt_cached_tokens,
                ..
            } => {
                summary.llm_prompt_tokens += prompt_tokens;
                summary.llm_completion_tokens += completion_tokens;
                summary.llm_prompt_cached_tokens += prompt_cached_tokens;
            }
            Metrics::Tts {
                characters_count,
                audio_duration,
                ..
            } => {
                summary.tts_characters_count += characters_count;
                summary.tts_audio_duration += *audio_duration;
            }
            Metrics::Stt { audio_duration, .. } => {
                summary.stt_audio_duration += *audio_duration;
            }
            Metrics::Vad { .. } | Metrics::EndOfUtterance { .. } => {}
        }
    }

    pub fn summary(&self) -> UsageSummary {
        self.summary.clone()
    }
}

/// Drains a metrics channel until every sink is dropped, logging and
/// accumulating each event, and returns the final summary.
pub async fn drain_metrics(mut rx: mpsc::UnboundedReceiver<MetricsCollected>) -> UsageSummary {
    let mut collector = UsageCollector::new();
    while let Some(event) = rx.recv().await {
        log_metrics(&event);
        collector.collect(&event.metrics);
    }
    collector.summary()
}
