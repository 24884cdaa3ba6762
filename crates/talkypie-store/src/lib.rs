//! Profile persistence for the Talkypie voice assistant.
//!
//! Holds exactly one document: the personalization profile written by the
//! parent-facing UI and read at the start of every voice session. The
//! document is an arbitrary JSON object; writes replace it wholesale and
//! readers never observe a partially written file.
//!
//! # Usage
//!
//! ```rust,ignore
//! use talkypie_store::{FileProfileStore, ProfileStore};
//!
//! let store = FileProfileStore::new("profile.json");
//! store.put(&document)?;
//! let current = store.get()?;
//! ```

mod error;
mod profile;
mod store;

pub use error::StoreError;
pub use profile::{decode_document, encode_document, Profile, ProfileDocument};
pub use store::{
    load_profile_best_effort, FileProfileStore, MemoryProfileStore, ProfileStore,
    DEFAULT_PROFILE_FILE,
};
