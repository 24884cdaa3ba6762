//! Session orchestration for the Talkypie voice assistant.
//!
//! The [`worker`] module is the seam to the job runtime: it prewarms
//! process-wide resources and runs one [`SessionOrchestrator`] per room.
//! Each session reads the stored profile, composes its instructions with
//! [`compose_instructions`], wires the pipeline stages from a
//! [`talkypie_voice::StageProvider`], and logs its usage summary on
//! shutdown.

pub mod composer;
pub mod error;
pub mod session;
pub mod worker;

pub use composer::{compose_instructions, DEFAULT_PREAMBLE, PROFILE_FRAMING};
pub use error::SessionError;
pub use session::{SessionOrchestrator, SessionState};
pub use worker::{
    AgentJobHandler, JobContext, JobHandler, JobProcess, JobRequest, ShutdownSignal,
    ShutdownTrigger, Worker,
};
