//! Worker prewarm and job dispatch.

mod common;

use async_trait::async_trait;
use common::{hear_reply, say_one_turn, FakeProvider, PREAMBLE};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use talkypie_agent::{
    AgentJobHandler, JobContext, JobHandler, JobProcess, JobRequest, SessionError,
    ShutdownTrigger, Worker,
};
use talkypie_store::MemoryProfileStore;
use talkypie_voice::{LocalRoom, VoiceError};
use tokio::sync::mpsc;

#[tokio::test]
async fn prewarm_loads_vad_once_for_all_jobs() {
    let provider = Arc::new(FakeProvider::default());
    let handler = AgentJobHandler::new(
        Arc::new(MemoryProfileStore::new()),
        provider.clone(),
        PREAMBLE,
    );
    let worker = Arc::new(Worker::new(Arc::new(handler)));
    let (jobs_tx, jobs_rx) = mpsc::channel(4);
    let stop = ShutdownTrigger::new();

    let run = tokio::spawn({
        let worker = Arc::clone(&worker);
        let signal = stop.subscribe();
        async move { worker.run(jobs_rx, signal).await }
    });

    let (room_a, mut handle_a) = LocalRoom::new("room-a");
    let (room_b, mut handle_b) = LocalRoom::new("room-b");
    let (job_a, _) = JobRequest::new(room_a);
    let (job_b, _) = JobRequest::new(room_b);
    jobs_tx.send(job_a).await.unwrap();
    jobs_tx.send(job_b).await.unwrap();

    say_one_turn(&handle_a.audio_in).await;
    say_one_turn(&handle_b.audio_in).await;
    hear_reply(&mut handle_a.audio_out).await;
    hear_reply(&mut handle_b.audio_out).await;

    stop.trigger();
    tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(provider.vad_loads(), 1);
    assert!(worker.process().vad().is_some());
    assert_eq!(provider.instructions_seen(), vec![PREAMBLE, PREAMBLE]);
}

#[tokio::test]
async fn prewarm_failure_stops_the_worker() {
    let provider = Arc::new(FakeProvider {
        fail_vad: true,
        ..FakeProvider::default()
    });
    let handler = AgentJobHandler::new(Arc::new(MemoryProfileStore::new()), provider, PREAMBLE);
    let worker = Worker::new(Arc::new(handler));
    let (_jobs_tx, jobs_rx) = mpsc::channel(1);
    let stop = ShutdownTrigger::new();

    let err = worker
        .run(jobs_rx, stop.subscribe())
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::Voice(VoiceError::Vad(_))));
}

#[tokio::test]
async fn entrypoint_requires_prewarmed_vad() {
    let handler = AgentJobHandler::new(
        Arc::new(MemoryProfileStore::new()),
        Arc::new(FakeProvider::default()),
        PREAMBLE,
    );
    let (room, _handle) = LocalRoom::new("cold");
    let trigger = ShutdownTrigger::new();

    let result = handler
        .entrypoint(JobContext {
            job_id: uuid::Uuid::new_v4(),
            room,
            process: Arc::new(JobProcess::new()),
            shutdown: trigger.subscribe(),
        })
        .await;

    assert!(matches!(result, Err(SessionError::MissingVad)));
}

/// Counts entrypoint entries and exits; each job waits for its signal.
#[derive(Default)]
struct CountingHandler {
    prewarms: AtomicUsize,
    started: AtomicUsize,
    finished: AtomicUsize,
}

#[async_trait]
impl JobHandler for CountingHandler {
    fn prewarm(&self, _process: &JobProcess) -> Result<(), SessionError> {
        self.prewarms.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn entrypoint(&self, mut ctx: JobContext) -> Result<(), SessionError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        ctx.shutdown.wait().await;
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached");
}

#[tokio::test]
async fn job_trigger_ends_only_its_own_job() {
    let handler = Arc::new(CountingHandler::default());
    let worker = Arc::new(Worker::new(handler.clone()));
    let (jobs_tx, jobs_rx) = mpsc::channel(4);
    let stop = ShutdownTrigger::new();

    let run = tokio::spawn({
        let worker = Arc::clone(&worker);
        let signal = stop.subscribe();
        async move { worker.run(jobs_rx, signal).await }
    });

    let (room_a, _handle_a) = LocalRoom::new("room-a");
    let (room_b, _handle_b) = LocalRoom::new("room-b");
    let (job_a, end_a) = JobRequest::new(room_a);
    let (job_b, _end_b) = JobRequest::new(room_b);
    jobs_tx.send(job_a).await.unwrap();
    jobs_tx.send(job_b).await.unwrap();
    wait_until(|| handler.started.load(Ordering::SeqCst) == 2).await;

    end_a.trigger();
    wait_until(|| handler.finished.load(Ordering::SeqCst) == 1).await;
    assert!(!run.is_finished());

    stop.trigger();
    tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(handler.prewarms.load(Ordering::SeqCst), 1);
    assert_eq!(handler.finished.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn closed_queue_drains_running_jobs() {
    let handler = Arc::new(CountingHandler::default());
    let worker = Worker::new(handler.clone());
    let (jobs_tx, jobs_rx) = mpsc::channel(1);
    let (room, _handle) = LocalRoom::new("last");
    let (job, end) = JobRequest::new(room);
    jobs_tx.send(job).await.unwrap();
    drop(jobs_tx);

    let stop = ShutdownTrigger::new();

    let run = worker.run(jobs_rx, stop.subscribe());
    let ender = async {
        wait_until(|| handler.started.load(Ordering::SeqCst) == 1).await;
        end.trigger();
    };
    let (result, ()) = tokio::join!(run, ender);

    result.unwrap();
    assert_eq!(handler.finished.load(Ordering::SeqCst), 1);
}

struct PanickingHandler;

#[async_trait]
impl JobHandler for PanickingHandler {
    fn prewarm(&self, _process: &JobProcess) -> Result<(), SessionError> {
        Ok(())
    }

    async fn entrypoint(&self, _ctx: JobContext) -> Result<(), SessionError> {
        panic!("entrypoint blew up");
    }
}

#[tokio::test]
async fn panicked_job_releases_its_trigger() {
    let worker = Arc::new(Worker::new(Arc::new(PanickingHandler)));
    let (jobs_tx, jobs_rx) = mpsc::channel(1);
    let stop = ShutdownTrigger::new();

    let run = tokio::spawn({
        let worker = Arc::clone(&worker);
        let signal = stop.subscribe();
        async move { worker.run(jobs_rx, signal).await }
    });

    let (room, _handle) = LocalRoom::new("doomed");
    let (job, end) = JobRequest::new(room);
    let mut released = end.subscribe();
    drop(end);
    jobs_tx.send(job).await.unwrap();

    // Resolves only once the worker drops its copy of the job's trigger.
    tokio::time::timeout(Duration::from_secs(5), released.wait())
        .await
        .expect("worker kept the panicked job's trigger");
    assert!(!run.is_finished());

    stop.trigger();
    tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
