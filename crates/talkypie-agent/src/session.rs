//! Per-job session lifecycle.
//!
//! A [`SessionOrchestrator`] walks one room through
//! `Created -> ProfileLoaded -> PipelineAssembled -> Started -> Connected
//! -> ShuttingDown -> Closed`. Each step is a method that checks the
//! current state, so calling them out of order fails with
//! [`SessionError::InvalidTransition`] instead of running half-wired.

use std::fmt;
use std::sync::Arc;

use talkypie_store::{load_profile_best_effort, Profile, ProfileStore};
use talkypie_voice::{
    drain_metrics, MetricsSink, PipelineStages, Room, StageProvider, UsageSummary,
    VoiceActivityDetector, VoiceError, VoicePipeline,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::composer::compose_instructions;
use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    ProfileLoaded,
    PipelineAssembled,
    Started,
    Connected,
    ShuttingDown,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::ProfileLoaded => "profile_loaded",
            Self::PipelineAssembled => "pipeline_assembled",
            Self::Started => "started",
            Self::Connected => "connected",
            Self::ShuttingDown => "shutting_down",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Owns one session from job start to job end.
pub struct SessionOrchestrator {
    room: Arc<dyn Room>,
    store: Arc<dyn ProfileStore>,
    provider: Arc<dyn StageProvider>,
    preamble: String,
    state: SessionState,
    profile: Option<Profile>,
    instructions: Option<String>,
    pipeline: Option<VoicePipeline>,
    metrics: Option<MetricsSink>,
    pipeline_task: Option<JoinHandle<Result<(), VoiceError>>>,
    drain_task: Option<JoinHandle<UsageSummary>>,
}

impl SessionOrchestrator {
    pub fn new(
        room: Arc<dyn Room>,
        store: Arc<dyn ProfileStore>,
        provider: Arc<dyn StageProvider>,
        preamble: impl Into<String>,
    ) -> Self {
        Self {
            room,
            store,
            provider,
            preamble: preamble.into(),
            state: SessionState::Created,
            profile: None,
            instructions: None,
            pipeline: None,
            metrics: None,
            pipeline_task: None,
            drain_task: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The composed instructions, available once the pipeline is assembled.
    pub fn instructions(&self) -> Option<&str> {
        self.instructions.as_deref()
    }

    /// The profile read at session start, if one was present.
    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    fn ensure(&self, expected: SessionState, to: SessionState) -> Result<(), SessionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SessionError::InvalidTransition {
                from: self.state,
                to,
            })
        }
    }

    fn advance(&mut self, to: SessionState) {
        debug!(room = %self.room.name(), from = %self.state, to = %to, "session transition");
        self.state = to;
    }

    /// Reads the profile. Never fails on store errors: a missing or
    /// unreadable profile leaves the session unpersonalized.
    pub async fn load_profile(&mut self) -> Result<(), SessionError> {
        self.ensure(SessionState::Created, SessionState::ProfileLoaded)?;

        let store = Arc::clone(&self.store);
        let read = tokio::task::spawn_blocking(move || load_profile_best_effort(store.as_ref()));
        let document = match read.await {
            Ok(document) => document,
            Err(e) => {
                warn!(error = %e, "profile read task failed, continuing without profile");
                None
            }
        };

        self.profile = document
            .map(|document| Profile::from_document(&document))
            .filter(|profile| !profile.is_empty());
        info!(
            room = %self.room.name(),
            personalized = self.profile.is_some(),
            "profile loaded"
        );
        self.advance(SessionState::ProfileLoaded);
        Ok(())
    }

    /// Composes instructions, acquires the pipeline stages, and starts
    /// draining the session's metrics channel.
    ///
    /// # Errors
    ///
    /// Fails if any stage cannot be constructed by the provider.
    pub fn assemble(&mut self, vad: Arc<dyn VoiceActivityDetector>) -> Result<(), SessionError> {
        self.ensure(SessionState::ProfileLoaded, SessionState::PipelineAssembled)?;

        let instructions = compose_instructions(&self.preamble, self.profile.as_ref());
        let stages = PipelineStages {
            stt: self.provider.stt()?,
            llm: self.provider.llm()?,
            tts: self.provider.tts()?,
            vad,
            turn_detector: self.provider.turn_detector()?,
        };
        let pipeline = VoicePipeline::new(
            stages,
            self.provider.options(),
            self.provider.noise_suppressor(),
        );

        let (sink, events) = MetricsSink::channel();
        self.drain_task = Some(tokio::spawn(drain_metrics(events)));
        self.metrics = Some(sink);
        self.pipeline = Some(pipeline);
        self.instructions = Some(instructions);

        self.advance(SessionState::PipelineAssembled);
        Ok(())
    }

    /// Attaches the pipeline to the room's audio and starts its turn loop.
    pub fn start(&mut self) -> Result<(), SessionError> {
        self.ensure(SessionState::PipelineAssembled, SessionState::Started)?;
        let io = self.room.attach()?;
        let (Some(pipeline), Some(sink), Some(instructions)) = (
            self.pipeline.take(),
            self.metrics.clone(),
            self.instructions.clone(),
        ) else {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to: SessionState::Started,
            });
        };

        debug!(
            room = %self.room.name(),
            preemptive_generation = pipeline.options().preemptive_generation,
            "starting pipeline"
        );
        self.pipeline_task = Some(tokio::spawn(pipeline.run(instructions, io, sink)));

        self.advance(SessionState::Started);
        Ok(())
    }

    /// Joins the room. Conversation turns run from here on.
    pub async fn connect(&mut self) -> Result<(), SessionError> {
        self.ensure(SessionState::Started, SessionState::Connected)?;
        self.room.connect().await?;
        info!(room = %self.room.name(), "session connected");
        self.advance(SessionState::Connected);
        Ok(())
    }

    /// Leaves the room, waits for the pipeline to wind down, and returns
    /// the usage accumulated over the closed set of metrics events.
    pub async fn shutdown(&mut self) -> Result<UsageSummary, SessionError> {
        self.ensure(SessionState::Connected, SessionState::ShuttingDown)?;
        self.advance(SessionState::ShuttingDown);

        self.room.disconnect().await;

        if let Some(task) = self.pipeline_task.take() {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(room = %self.room.name(), error = %e, "pipeline ended with error"),
                Err(e) => warn!(room = %self.room.name(), error = %e, "pipeline task failed"),
            }
        }

        // Last sender: once dropped the drain task sees the channel close.
        self.metrics = None;
        let summary = match self.drain_task.take() {
            Some(task) => task.await.map_err(|e| SessionError::Join(e.to_string()))?,
            None => UsageSummary::default(),
        };
        info!(room = %self.room.name(), "Usage: {}", summary);

        self.advance(SessionState::Closed);
        Ok(summary)
    }
}

impl Drop for SessionOrchestrator {
    fn drop(&mut self) {
        if let Some(task) = self.pipeline_task.take() {
            task.abort();
        }
        if let Some(task) = self.drain_task.take() {
            task.abort();
        }
    }
}
