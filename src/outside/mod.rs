mod command;
mod ffprobe;
mod provision;
mod ytdl;

pub use ffprobe::{probe_file, FileProbe};
pub use ytdl::{ListQuery, StreamExtractor, ToolFlavor, Ytdl};
