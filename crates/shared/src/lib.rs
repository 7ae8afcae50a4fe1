//! Shared wire types for the framecast relay.

mod models;

pub use models::{ConsumerMessage, FrameReply, ProducerMessage, StatusNotice, StreamStatus};
