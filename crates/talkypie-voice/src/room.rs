//! The room a session runs in.
//!
//! A [`Room`] hands the pipeline one inbound audio stream and one outbound
//! sink. Inbound frames flow only between `connect` and `disconnect`;
//! disconnecting closes the inbound stream, which ends the pipeline.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::audio::AudioFrame;
use crate::error::VoiceError;
use crate::service::VoiceService;

/// Buffered frames per direction. 20 ms frames, so a few seconds of audio.
const ROOM_CHANNEL_CAPACITY: usize = 256;

/// Audio endpoints handed to the pipeline by [`Room::attach`].
#[derive(Debug)]
pub struct RoomIo {
    pub audio_in: mpsc::Receiver<AudioFrame>,
    pub audio_out: mpsc::Sender<AudioFrame>,
}

#[async_trait]
pub trait Room: Send + Sync {
    fn name(&self) -> &str;

    /// Takes the room's audio endpoints. May be called once.
    fn attach(&self) -> Result<RoomIo, VoiceError>;

    /// Joins the room. Inbound audio starts flowing after this returns.
    async fn connect(&self) -> Result<(), VoiceError>;

    /// Leaves the room and closes the inbound stream.
    async fn disconnect(&self);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn take_io(io: &Mutex<Option<RoomIo>>, room: &str) -> Result<RoomIo, VoiceError> {
    lock(io)
        .take()
        .ok_or_else(|| VoiceError::Room(format!("room '{}' is already attached", room)))
}

/// An in-process room driven through a [`LocalRoomHandle`].
///
/// Frames sent through the handle before `connect` are buffered and
/// delivered once the room is joined.
pub struct LocalRoom {
    name: String,
    io: Mutex<Option<RoomIo>>,
    user_rx: Mutex<Option<mpsc::Receiver<AudioFrame>>>,
    pipeline_tx: Mutex<Option<mpsc::Sender<AudioFrame>>>,
    relay: Mutex<Option<JoinHandle<()>>>,
}

/// The far side of a [`LocalRoom`]: speak into it, listen to the agent.
#[derive(Debug)]
pub struct LocalRoomHandle {
    pub audio_in: mpsc::Sender<AudioFrame>,
    pub audio_out: mpsc::Receiver<AudioFrame>,
}

impl LocalRoom {
    pub fn new(name: impl Into<String>) -> (Arc<Self>, LocalRoomHandle) {
        let (user_tx, user_rx) = mpsc::channel(ROOM_CHANNEL_CAPACITY);
        let (pipeline_tx, pipeline_rx) = mpsc::channel(ROOM_CHANNEL_CAPACITY);
        let (out_tx, out_rx) = mpsc::channel(ROOM_CHANNEL_CAPACITY);

        let room = Arc::new(Self {
            name: name.into(),
            io: Mutex::new(Some(RoomIo {
                audio_in: pipeline_rx,
                audio_out: out_tx,
            })),
            user_rx: Mutex::new(Some(user_rx)),
            pipeline_tx: Mutex::new(Some(pipeline_tx)),
            relay: Mutex::new(None),
        });
        let handle = LocalRoomHandle {
            audio_in: user_tx,
            audio_out: out_rx,
        };
        (room, handle)
    }
}

#[async_trait]
impl Room for LocalRoom {
    fn name(&self) -> &str {
        &self.name
    }

    fn attach(&self) -> Result<RoomIo, VoiceError> {
        take_io(&self.io, &self.name)
    }

    async fn connect(&self) -> Result<(), VoiceError> {
        let user_rx = lock(&self.user_rx).take();
        let pipeline_tx = lock(&self.pipeline_tx).take();
        let (Some(mut user_rx), Some(pipeline_tx)) = (user_rx, pipeline_tx) else {
            return Err(VoiceError::Room(format!(
                "room '{}' cannot be joined twice",
                self.name
            )));
        };

        let relay = tokio::spawn(async move {
            while let Some(frame) = user_rx.recv().await {
                if pipeline_tx.send(frame).await.is_err() {
                    break;
                }
            }
        });
        *lock(&self.relay) = Some(relay);
        debug!(room = %self.name, "local room connected");
        Ok(())
    }

    async fn disconnect(&self) {
        if let Some(relay) = lock(&self.relay).take() {
            relay.abort();
        }
        // Never connected: drop the inbound sender so the stream still ends.
        lock(&self.pipeline_tx).take();
        debug!(room = %self.name, "local room disconnected");
    }
}

/// A LiveKit room joined through the server API.
///
/// Media transport is provided externally: a transport feeds received
/// participant audio through [`LiveKitRoom::inbound_sender`] and consumes
/// agent audio from [`LiveKitRoom::take_outbound`]. Without a transport,
/// agent audio is accounted for and discarded.
///
/// Transport audio reaches the pipeline through a relay the room owns, so
/// `disconnect` ends the inbound stream even while a transport still holds
/// a sender.
pub struct LiveKitRoom {
    name: String,
    service: Arc<VoiceService>,
    io: Mutex<Option<RoomIo>>,
    inbound: Mutex<Option<mpsc::Sender<AudioFrame>>>,
    transport_rx: Mutex<Option<mpsc::Receiver<AudioFrame>>>,
    pipeline_tx: Mutex<Option<mpsc::Sender<AudioFrame>>>,
    relay: Mutex<Option<JoinHandle<()>>>,
    outbound: Mutex<Option<mpsc::Receiver<AudioFrame>>>,
    publisher: Mutex<Option<JoinHandle<()>>>,
    token: Mutex<Option<String>>,
}

impl LiveKitRoom {
    pub fn new(name: impl Into<String>, service: Arc<VoiceService>) -> Arc<Self> {
        let (transport_tx, transport_rx) = mpsc::channel(ROOM_CHANNEL_CAPACITY);
        let (pipeline_tx, pipeline_rx) = mpsc::channel(ROOM_CHANNEL_CAPACITY);
        let (out_tx, out_rx) = mpsc::channel(ROOM_CHANNEL_CAPACITY);
        Arc::new(Self {
            name: name.into(),
            service,
            io: Mutex::new(Some(RoomIo {
                audio_in: pipeline_rx,
                audio_out: out_tx,
            })),
            inbound: Mutex::new(Some(transport_tx)),
            transport_rx: Mutex::new(Some(transport_rx)),
            pipeline_tx: Mutex::new(Some(pipeline_tx)),
            relay: Mutex::new(None),
            outbound: Mutex::new(Some(out_rx)),
            publisher: Mutex::new(None),
            token: Mutex::new(None),
        })
    }

    /// Sender for participant audio received by the media transport.
    /// `None` once the room is disconnected.
    pub fn inbound_sender(&self) -> Option<mpsc::Sender<AudioFrame>> {
        lock(&self.inbound).clone()
    }

    /// Takes the agent's outbound audio for a media transport to publish.
    pub fn take_outbound(&self) -> Option<mpsc::Receiver<AudioFrame>> {
        lock(&self.outbound).take()
    }

    /// The join token issued on connect.
    pub fn join_token(&self) -> Option<String> {
        lock(&self.token).clone()
    }
}

#[async_trait]
impl Room for LiveKitRoom {
    fn name(&self) -> &str {
        &self.name
    }

    fn attach(&self) -> Result<RoomIo, VoiceError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            VoiceError::Room(format!("room '{}' attached outside a runtime: {}", self.name, e))
        })?;
        let io = take_io(&self.io, &self.name)?;

        let transport_rx = lock(&self.transport_rx).take();
        let pipeline_tx = lock(&self.pipeline_tx).take();
        if let (Some(mut transport_rx), Some(pipeline_tx)) = (transport_rx, pipeline_tx) {
            let relay = runtime.spawn(async move {
                while let Some(frame) = transport_rx.recv().await {
                    if pipeline_tx.send(frame).await.is_err() {
                        break;
                    }
                }
            });
            *lock(&self.relay) = Some(relay);
        }
        Ok(io)
    }

    async fn connect(&self) -> Result<(), VoiceError> {
        if !self.service.is_enabled() {
            return Err(VoiceError::Config(
                "LiveKit URL is not configured".to_string(),
            ));
        }

        self.service.create_room(&self.name).await?;
        let identity = self.service.agent_identity();
        let token = self
            .service
            .generate_join_token(&self.name, identity, "Talkypie")?;

        info!(
            "Agent connecting to LiveKit room '{}' at '{}' with token length {}",
            self.name,
            self.service.get_url(),
            token.len()
        );
        *lock(&self.token) = Some(token);

        if let Some(mut outbound) = self.take_outbound() {
            let room = self.name.clone();
            let publisher = tokio::spawn(async move {
                while let Some(frame) = outbound.recv().await {
                    debug!(
                        room = %room,
                        samples = frame.samples.len(),
                        "agent audio published without media transport"
                    );
                }
            });
            *lock(&self.publisher) = Some(publisher);
        }
        Ok(())
    }

    async fn disconnect(&self) {
        lock(&self.inbound).take();
        if let Some(relay) = lock(&self.relay).take() {
            relay.abort();
        }
        // Never attached: drop the pipeline side so the stream still ends.
        lock(&self.pipeline_tx).take();
        lock(&self.transport_rx).take();
        if let Some(publisher) = lock(&self.publisher).take() {
            publisher.abort();
        }
        if lock(&self.token).take().is_some() {
            info!("Agent disconnecting from room '{}'", self.name);
        }
    }
}
