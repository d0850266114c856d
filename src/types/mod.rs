mod bitrate;
mod metadata;
mod playlist;
mod record;
mod resolution;

pub use bitrate::{avg_bitrate, max_audio_bitrate, max_bitrate, min_bitrate};
pub use metadata::VideoMetadata;
pub use playlist::PlaylistEntry;
pub use record::RawExtractionRecord;
pub use resolution::Resolution;
