//! Video cover extraction and edit export engine.

pub mod api;
pub mod backend;
pub mod composition;
pub mod config;
pub mod error;
pub mod export;
pub mod frame;
pub mod lifecycle;
pub mod pool;
pub mod source;
pub mod strategy;
pub mod time;
pub mod timeline;

pub use api::{Engine, ExportTicket};
pub use backend::{FfmpegMediaBackend, MediaBackend, SeekPolicy, TranscodeJob};
pub use composition::{Composition, PixelRect, SourceInfo, SpatialTransform, compose};
pub use config::{EngineConfig, StrategyConfig};
pub use error::{EngineError, EngineErrorKind, Result};
pub use export::{
    ExportCompletion, ExportController, ExportOutcome, ExportRequest, JobHandle, JobId, JobState,
    OutputTarget,
};
pub use frame::RawImage;
pub use source::{ContentResolver, LocalOnlyResolver, MediaReference};
pub use strategy::{FrameRequest, StrategyKind};
pub use timeline::{Diagnostic, EditTimeline, Effect, ParsedTimeline};
