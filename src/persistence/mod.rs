//! Submission of captured images, session metadata and the recording

pub mod client;
pub mod types;

pub use client::{
    ArtifactPersistence, ArtifactSink, Delivery, FileArtifactSink, HttpArtifactPersistence, HttpConversionSink,
    PersistenceError,
};
pub use types::{CustomerDetails, SessionMetadata};
