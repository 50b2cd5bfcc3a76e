//! Scene data model: trackables, attachments, positional state

pub mod attachment;
pub mod config;
pub mod graph;
pub mod position;
pub mod trackable;

pub use attachment::{
    Attachment, AttachmentId, FullScreen, Link, LinkEndpoint, Location, PositionData,
    SubAttachment, SubAttachmentId, SubKind,
};
pub use config::EngineConfig;
pub use graph::{EntityPath, SceneGraph};
pub use trackable::{Trackable, TrackableId, Visualization};
