//! Job runtime seam: one worker process, many room jobs.
//!
//! [`Worker::run`] calls [`JobHandler::prewarm`] once, then hands every
//! [`JobRequest`] to [`JobHandler::entrypoint`] on its own task. A job ends
//! when its [`ShutdownSignal`] fires, either through the dispatcher's
//! [`ShutdownTrigger`] for that job or because the worker itself stops.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use talkypie_store::ProfileStore;
use talkypie_voice::{Room, StageProvider, VoiceActivityDetector};
use tokio::sync::{mpsc, watch};
use tokio::task::{self, JoinError, JoinSet};
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::error::SessionError;
use crate::session::SessionOrchestrator;

/// Fires a shutdown. Cloning shares the same signal.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownTrigger {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for ShutdownTrigger {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves once the paired [`ShutdownTrigger`] fires or is dropped.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub async fn wait(&mut self) {
        // A dropped trigger can never fire, so it counts as shutdown too.
        let _ = self.rx.wait_for(|triggered| *triggered).await;
    }
}

/// Per-process state shared by every job on this worker.
#[derive(Default)]
pub struct JobProcess {
    vad: OnceLock<Arc<dyn VoiceActivityDetector>>,
}

impl JobProcess {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the prewarmed VAD. Returns `false` if one was already set.
    pub fn set_vad(&self, vad: Arc<dyn VoiceActivityDetector>) -> bool {
        self.vad.set(vad).is_ok()
    }

    pub fn vad(&self) -> Option<Arc<dyn VoiceActivityDetector>> {
        self.vad.get().cloned()
    }
}

/// Everything a job entrypoint receives.
pub struct JobContext {
    pub job_id: Uuid,
    pub room: Arc<dyn Room>,
    pub process: Arc<JobProcess>,
    pub shutdown: ShutdownSignal,
}

/// A request to run one session in `room`.
pub struct JobRequest {
    pub room: Arc<dyn Room>,
    trigger: ShutdownTrigger,
}

impl JobRequest {
    /// Returns the request and the trigger that ends this job alone.
    pub fn new(room: Arc<dyn Room>) -> (Self, ShutdownTrigger) {
        let trigger = ShutdownTrigger::new();
        let request = Self {
            room,
            trigger: trigger.clone(),
        };
        (request, trigger)
    }
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Runs once per worker process before any job starts.
    fn prewarm(&self, process: &JobProcess) -> Result<(), SessionError>;

    /// Runs one job to completion.
    async fn entrypoint(&self, ctx: JobContext) -> Result<(), SessionError>;
}

/// The voice assistant's job handler: one [`SessionOrchestrator`] per room.
pub struct AgentJobHandler {
    store: Arc<dyn ProfileStore>,
    provider: Arc<dyn StageProvider>,
    preamble: String,
}

impl AgentJobHandler {
    pub fn new(
        store: Arc<dyn ProfileStore>,
        provider: Arc<dyn StageProvider>,
        preamble: impl Into<String>,
    ) -> Self {
        Self {
            store,
            provider,
            preamble: preamble.into(),
        }
    }
}

#[async_trait]
impl JobHandler for AgentJobHandler {
    fn prewarm(&self, process: &JobProcess) -> Result<(), SessionError> {
        let vad = self.provider.load_vad()?;
        if !process.set_vad(vad) {
            info!("voice activity detector already loaded");
        }
        Ok(())
    }

    async fn entrypoint(&self, ctx: JobContext) -> Result<(), SessionError> {
        let span = info_span!("job", room = %ctx.room.name(), job_id = %ctx.job_id);
        let JobContext {
            room,
            process,
            mut shutdown,
            ..
        } = ctx;

        async move {
            let vad = process.vad().ok_or(SessionError::MissingVad)?;
            let mut session = SessionOrchestrator::new(
                room,
                Arc::clone(&self.store),
                Arc::clone(&self.provider),
                self.preamble.as_str(),
            );

            session.load_profile().await?;
            session.assemble(vad)?;
            session.start()?;
            session.connect().await?;

            shutdown.wait().await;
            session.shutdown().await?;
            Ok(())
        }
        .instrument(span)
        .await
    }
}

pub struct Worker {
    handler: Arc<dyn JobHandler>,
    process: Arc<JobProcess>,
}

impl Worker {
    pub fn new(handler: Arc<dyn JobHandler>) -> Self {
        Self {
            handler,
            process: Arc::new(JobProcess::new()),
        }
    }

    pub fn process(&self) -> &Arc<JobProcess> {
        &self.process
    }

    /// Prewarms, then runs jobs until `shutdown` fires or the job queue
    /// closes with no job left running. Jobs still running at shutdown are
    /// signalled and awaited.
    ///
    /// # Errors
    ///
    /// Returns the prewarm error; job errors are logged and do not stop
    /// the worker.
    pub async fn run(
        &self,
        mut jobs: mpsc::Receiver<JobRequest>,
        mut shutdown: ShutdownSignal,
    ) -> Result<(), SessionError> {
        self.handler.prewarm(&self.process)?;
        info!("worker prewarmed, accepting jobs");

        let mut running: JoinSet<Result<(), SessionError>> = JoinSet::new();
        let mut active: HashMap<task::Id, ActiveJob> = HashMap::new();
        let mut accepting = true;

        loop {
            tokio::select! {
                () = shutdown.wait() => break,
                request = jobs.recv(), if accepting => match request {
                    Some(request) => {
                        let job_id = Uuid::new_v4();
                        info!(%job_id, room = %request.room.name(), "job received");
                        let ctx = JobContext {
                            job_id,
                            room: request.room,
                            process: Arc::clone(&self.process),
                            shutdown: request.trigger.subscribe(),
                        };
                        let handler = Arc::clone(&self.handler);
                        let abort = running.spawn(async move { handler.entrypoint(ctx).await });
                        active.insert(abort.id(), ActiveJob { job_id, trigger: request.trigger });
                    }
                    None => {
                        accepting = false;
                        if running.is_empty() {
                            break;
                        }
                    }
                },
                Some(finished) = running.join_next_with_id() => {
                    record_job(finished, &mut active);
                    if !accepting && running.is_empty() {
                        break;
                    }
                }
            }
        }

        for job in active.values() {
            job.trigger.trigger();
        }
        while let Some(finished) = running.join_next_with_id().await {
            record_job(finished, &mut active);
        }
        info!("worker stopped");
        Ok(())
    }
}

struct ActiveJob {
    job_id: Uuid,
    trigger: ShutdownTrigger,
}

/// Logs a finished job and forgets it, whether it returned or panicked.
fn record_job(
    finished: Result<(task::Id, Result<(), SessionError>), JoinError>,
    active: &mut HashMap<task::Id, ActiveJob>,
) {
    let (task_id, outcome) = match finished {
        Ok((task_id, result)) => (task_id, Ok(result)),
        Err(e) => (e.id(), Err(e)),
    };
    let Some(ActiveJob { job_id, .. }) = active.remove(&task_id) else {
        error!(%task_id, "finished task was not a tracked job");
        return;
    };
    match outcome {
        Ok(Ok(())) => info!(%job_id, "job finished"),
        Ok(Err(e)) => error!(%job_id, error = %e, "job failed"),
        Err(e) => error!(%job_id, error = %e, "job task panicked"),
    }
}
