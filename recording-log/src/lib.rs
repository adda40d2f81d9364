//! The local recording log: an append-only NDJSON file that capture plugins
//! and the uploader write events to, folded on read into one
//! [`RecordingEntry`] per recording.

mod assets;
mod entry;
mod error;
mod event;
mod fold;
mod log;

pub use crate::assets::unreferenced_asset_paths;
pub use crate::entry::NO_INTERESTING_CONTENT;
pub use crate::entry::OriginalSourceEntry;
pub use crate::entry::RecordingEntry;
pub use crate::entry::RecordingStatus;
pub use crate::entry::SourceMapEntry;
pub use crate::error::RecordingLogError;
pub use crate::error::Result;
pub use crate::event::LogLine;
pub use crate::event::RecordingEvent;
pub use crate::fold::fold_lines;
pub use crate::fold::parse_log;
pub use crate::log::LOG_FILE_NAME;
pub use crate::log::RecordingLog;
