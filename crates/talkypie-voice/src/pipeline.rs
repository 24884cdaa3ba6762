//! The conversation loop that runs once a session is connected.
//!
//! Room audio is conditioned, segmented by the VAD, transcribed once the
//! user pauses, and committed as a turn when the turn detector agrees. The
//! reply is generated with the full chat history, synthesized, and sent
//! back to the room. Every stage reports through the session's
//! [`MetricsSink`].

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::audio::{AudioFrame, INPUT_SAMPLE_RATE};
use crate::capability::{
    ChatContext, ChatRole, Generation, LanguageModel, NoiseSuppressor, SpeechToText, TextToSpeech,
    TurnDetector, VoiceActivityDetector,
};
use crate::error::VoiceError;
use crate::metrics::{Metrics, MetricsSink};
use crate::room::RoomIo;

/// Per-session behavior switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Generate the reply as soon as the transcript is ready, before the
    /// turn detector has confirmed the user is done.
    pub preemptive_generation: bool,
    /// Silence after speech before transcription starts.
    pub min_endpointing_delay: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            preemptive_generation: true,
            min_endpointing_delay: Duration::from_millis(500),
        }
    }
}

/// The five stage instances a session is assembled from.
#[derive(Clone)]
pub struct PipelineStages {
    pub stt: Arc<dyn SpeechToText>,
    pub llm: Arc<dyn LanguageModel>,
    pub tts: Arc<dyn TextToSpeech>,
    pub vad: Arc<dyn VoiceActivityDetector>,
    pub turn_detector: Arc<dyn TurnDetector>,
}

pub struct VoicePipeline {
    stages: PipelineStages,
    options: PipelineOptions,
    noise_suppressor: Option<Arc<dyn NoiseSuppressor>>,
}

/// Speech heard since the last committed turn.
struct PendingTurn {
    speech: AudioFrame,
    speech_frames: u64,
    trailing_silence: Duration,
    transcript: Option<String>,
    transcription_delay: Duration,
    preemptive: Option<Generation>,
}

impl PendingTurn {
    fn new() -> Self {
        Self {
            speech: AudioFrame::empty(INPUT_SAMPLE_RATE),
            speech_frames: 0,
            trailing_silence: Duration::ZERO,
            transcript: None,
            transcription_delay: Duration::ZERO,
            preemptive: None,
        }
    }

    fn hear(&mut self, frame: &AudioFrame) {
        if self.speech.is_empty() {
            self.speech.sample_rate = frame.sample_rate;
        }
        // Speech resumed after a pause: earlier transcript and reply are stale.
        if self.trailing_silence > Duration::ZERO && self.transcript.is_some() {
            debug!("speech resumed, discarding pending transcript");
            self.transcript = None;
            self.preemptive = None;
        }
        self.speech.extend(frame);
        self.speech_frames += 1;
        self.trailing_silence = Duration::ZERO;
    }
}

impl VoicePipeline {
    pub fn new(
        stages: PipelineStages,
        options: PipelineOptions,
        noise_suppressor: Option<Arc<dyn NoiseSuppressor>>,
    ) -> Self {
        Self {
            stages,
            options,
            noise_suppressor,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Runs until the room's inbound stream closes or the outbound sink is
    /// dropped. Stage failures drop the affected turn and the conversation
    /// continues.
    pub async fn run(
        self,
        instructions: String,
        io: RoomIo,
        metrics: MetricsSink,
    ) -> Result<(), VoiceError> {
        let RoomIo {
            mut audio_in,
            audio_out,
        } = io;
        let mut chat = ChatContext::new(instructions);
        let mut turn = PendingTurn::new();

        while let Some(frame) = audio_in.recv().await {
            let frame = match &self.noise_suppressor {
                Some(suppressor) => suppressor.suppress(frame),
                None => frame,
            };

            if self.stages.vad.detect_activity(&frame).is_speech {
                turn.hear(&frame);
                continue;
            }
            if turn.speech.is_empty() {
                continue;
            }

            turn.trailing_silence += frame.duration();
            if turn.trailing_silence < self.options.min_endpointing_delay {
                continue;
            }

            if turn.transcript.is_none() {
                metrics.emit(Metrics::Vad {
                    speech_duration: turn.speech.duration(),
                    inference_count: turn.speech_frames,
                });

                let started = Instant::now();
                let transcript = match self.transcribe(&turn.speech, &metrics).await {
                    Ok(text) if !text.is_empty() => text,
                    Ok(_) => {
                        debug!("empty transcript, dropping turn");
                        turn = PendingTurn::new();
                        continue;
                    }
                    Err(e) => {
                        warn!(error = %e, "transcription failed, dropping turn");
                        turn = PendingTurn::new();
                        continue;
                    }
                };
                turn.transcription_delay = turn.trailing_silence + started.elapsed();

                if self.options.preemptive_generation {
                    let draft = chat.with(ChatRole::User, transcript.as_str());
                    match self.generate(&draft, &metrics).await {
                        Ok(generation) => turn.preemptive = Some(generation),
                        Err(e) => warn!(error = %e, "preemptive generation failed"),
                    }
                }
                turn.transcript = Some(transcript);
            }

            let Some(transcript) = turn.transcript.clone() else {
                continue;
            };
            if !self
                .stages
                .turn_detector
                .detect_turn_end(&transcript, turn.trailing_silence)
            {
                continue;
            }

            metrics.emit(Metrics::EndOfUtterance {
                end_of_utterance_delay: turn.trailing_silence,
                transcription_delay: turn.transcription_delay,
            });
            debug!(transcript = %transcript, "user turn committed");

            let preemptive = turn.preemptive.take();
            turn = PendingTurn::new();
            chat.push(ChatRole::User, transcript);

            let reply = match preemptive {
                Some(generation) => generation,
                None => match self.generate(&chat, &metrics).await {
                    Ok(generation) => generation,
                    Err(e) => {
                        warn!(error = %e, "reply generation failed");
                        continue;
                    }
                },
            };
            if reply.text.is_empty() {
                continue;
            }
            chat.push(ChatRole::Assistant, reply.text.as_str());

            let audio = match self.synthesize(&reply.text, &metrics).await {
                Ok(audio) => audio,
                Err(e) => {
                    warn!(error = %e, "speech synthesis failed");
                    continue;
                }
            };
            if audio_out.send(audio).await.is_err() {
                debug!("room output closed, stopping pipeline");
                break;
            }
        }

        Ok(())
    }

    async fn transcribe(
        &self,
        speech: &AudioFrame,
        metrics: &MetricsSink,
    ) -> Result<String, VoiceError> {
        let started = Instant::now();
        let text = self.stages.stt.transcribe(speech).await?;
        metrics.emit(Metrics::Stt {
            audio_duration: speech.duration(),
            duration: started.elapsed(),
        });
        Ok(text.trim().to_string())
    }

    async fn generate(
        &self,
        chat: &ChatContext,
        metrics: &MetricsSink,
    ) -> Result<Generation, VoiceError> {
        let started = Instant::now();
        let generation = self.stages.llm.generate(chat).await?;
        metrics.emit(Metrics::Llm {
            prompt_tokens: generation.prompt_tokens,
            completion_tokens: generation.completion_tokens,
            prompt_cached_tokens: generation.prompt_cached_tokens,
            duration: started.elapsed(),
        });
        Ok(generation)
    }

    async fn synthesize(&self, text: &str, metrics: &MetricsSink) -> Result<AudioFrame, VoiceError> {
        let started = Instant::now();
        let audio = self.stages.tts.synthesize(text).await?;
        metrics.emit(Metrics::Tts {
            characters_count: text.chars().count() as u64,
            audio_duration: audio.duration(),
            duration: started.elapsed(),
        });
        Ok(audio)
    }
}
