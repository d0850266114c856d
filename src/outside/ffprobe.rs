use std::path::Path;

use miette::{Context, IntoDiagnostic};
use serde_json::Value;

use super::command::{run_command, Capture, FFPROBE, FFXXX_DEFAULT_ARGS};
use crate::{
    result::{err_msg, Result},
    transcode::{AudioStream, VideoStream},
};

/// Probed stream facts for one downloaded file
#[derive(Debug, Clone, PartialEq)]
pub struct FileProbe {
    pub audio: Option<AudioStream>,
    pub video: Option<VideoStream>,
}

/// Probe the first audio and video streams of a local media file.
///
/// Stream-level bitrates missing from the container fall back to the
/// format-level bitrate.
pub fn probe_file(path: &Path) -> Result<FileProbe> {
    let output = run_command(
        FFPROBE,
        |cmd| {
            cmd.args(FFXXX_DEFAULT_ARGS)
                .arg(path.as_os_str())
                .args(["-of", "json"])
                .arg("-show_streams")
                .arg("-show_format")
        },
        Capture::STDOUT | Capture::STDERR,
        None,
    )?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(err_msg(format!(
            "ffprobe did run but was not successful. Here is its stderr: {stderr}"
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let json = serde_json::from_str::<Value>(&stdout)
        .into_diagnostic()
        .wrap_err("Could not parse ffprobe JSON output")?;

    let format_bitrate = json
        .get("format")
        .and_then(|f| f.get("bit_rate"))
        .and_then(parse_numeric_field);

    let streams = json
        .get("streams")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let audio = streams
        .iter()
        .find(|s| stream_type(s) == Some("audio"))
        .map(|s| AudioStream {
            codec_name: field_str(s, "codec_name"),
            bitrate: s
                .get("bit_rate")
                .and_then(parse_numeric_field)
                .or(format_bitrate),
            channel_layout: field_str(s, "channel_layout"),
        });

    let video = streams
        .iter()
        .find(|s| stream_type(s) == Some("video"))
        .map(|s| VideoStream {
            codec_name: field_str(s, "codec_name"),
            pix_fmt: field_str(s, "pix_fmt"),
            fps: s
                .get("avg_frame_rate")
                .and_then(Value::as_str)
                .and_then(parse_frame_rate)
                .unwrap_or(0.0),
            bitrate: s
                .get("bit_rate")
                .and_then(parse_numeric_field)
                .or(format_bitrate),
            width: s.get("width").and_then(Value::as_u64).unwrap_or(0) as u32,
            height: s.get("height").and_then(Value::as_u64).unwrap_or(0) as u32,
        });

    Ok(FileProbe { audio, video })
}

fn stream_type(stream: &Value) -> Option<&str> {
    stream.get("codec_type").and_then(Value::as_str)
}

fn field_str(stream: &Value, key: &str) -> Option<String> {
    stream.get(key).and_then(Value::as_str).map(str::to_owned)
}

/// ffprobe reports numeric fields as strings in JSON output
fn parse_numeric_field(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

/// Frame rates come as fractions, e.g. `30000/1001`
fn parse_frame_rate(raw: &str) -> Option<f64> {
    match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            (den != 0.0).then(|| num / den)
        }
        None => raw.parse().ok(),
    }
}
