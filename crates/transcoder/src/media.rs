//! Media metadata for source files.
//!
//! Probes files with ffprobe and exposes the few facts the scheduler needs:
//! runtime and size for progress estimation, codec and dimensions for rule
//! matching, and the stream list for automatic stream mapping.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use transcode_queue_config::Profile;

/// Error type for probe operations.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// ffprobe command failed to execute.
    #[error("ffprobe failed: {0}")]
    FfprobeFailed(String),

    /// Failed to parse ffprobe JSON output.
    #[error("Failed to parse ffprobe output: {0}")]
    ParseError(String),

    /// IO error during probe.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Kind of elementary stream inside a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Video,
    Audio,
    Subtitle,
}

/// One stream as reported by ffprobe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    /// Absolute stream index inside the container.
    pub index: u32,
    pub kind: StreamKind,
    pub codec_name: String,
    /// ISO 639 language tag, if the container carries one.
    pub language: Option<String>,
}

/// Metadata about a source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub path: PathBuf,
    /// Codec of the first video stream.
    pub vcodec: String,
    pub width: u32,
    pub height: u32,
    /// Whole seconds; 0 when the container does not report a duration.
    pub runtime_secs: u64,
    pub filesize_bytes: u64,
    pub fps: f32,
    pub streams: Vec<StreamInfo>,
}

impl MediaInfo {
    /// A file is usable only if it carries at least one video stream.
    pub fn is_valid(&self) -> bool {
        self.streams.iter().any(|s| s.kind == StreamKind::Video)
    }

    fn streams_of(&self, kind: StreamKind) -> impl Iterator<Item = &StreamInfo> {
        self.streams.iter().filter(move |s| s.kind == kind)
    }

    /// More than one audio track, or any subtitles.
    pub fn is_multistream(&self) -> bool {
        self.streams_of(StreamKind::Audio).count() > 1
            || self.streams_of(StreamKind::Subtitle).count() > 0
    }

    /// Builds `-map 0:<index>` arguments selecting the first video stream and
    /// the audio/subtitle streams whose language the profile asks for.
    ///
    /// An empty language list keeps every stream of that kind. Streams
    /// without a language tag are kept only when the list is empty.
    pub fn ffmpeg_stream_map(&self, profile: &Profile) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(video) = self.streams_of(StreamKind::Video).next() {
            args.push("-map".to_string());
            args.push(format!("0:{}", video.index));
        }

        let selected = |kind: StreamKind, langs: &[String]| -> Vec<u32> {
            self.streams_of(kind)
                .filter(|s| {
                    langs.is_empty()
                        || s.language
                            .as_deref()
                            .map(|l| langs.iter().any(|want| want.eq_ignore_ascii_case(l)))
                            .unwrap_or(false)
                })
                .map(|s| s.index)
                .collect()
        };

        for index in selected(StreamKind::Audio, profile.audio_languages.as_slice())
            .into_iter()
            .chain(selected(StreamKind::Subtitle, profile.subtitle_languages.as_slice()))
        {
            args.push("-map".to_string());
            args.push(format!("0:{}", index));
        }

        args
    }
}

/// Raw ffprobe JSON structures for parsing.
mod ffprobe_json {
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Debug, Deserialize)]
    pub struct FfprobeOutput {
        pub streams: Option<Vec<Stream>>,
        pub format: Option<Format>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Stream {
        pub index: Option<u32>,
        pub codec_type: Option<String>,
        pub codec_name: Option<String>,
        pub width: Option<u32>,
        pub height: Option<u32>,
        pub avg_frame_rate: Option<String>,
        pub tags: Option<HashMap<String, String>>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Format {
        pub duration: Option<String>,
        pub size: Option<String>,
    }
}

/// Probes a media file using ffprobe.
///
/// Runs `<ffprobe> -v quiet -print_format json -show_streams -show_format <path>`
/// and parses the JSON output.
pub fn probe_file(ffprobe: &Path, path: &Path) -> Result<MediaInfo, ProbeError> {
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(path)
        .output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProbeError::FfprobeFailed(format!(
            "ffprobe exited with status {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_ffprobe_output(path, &stdout)
}

/// Parses `"30000/1001"` style rates.
fn parse_frame_rate(rate: &str) -> f32 {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num = num.parse::<f32>().unwrap_or(0.0);
            let den = den.parse::<f32>().unwrap_or(0.0);
            if den > 0.0 {
                num / den
            } else {
                0.0
            }
        }
        None => rate.parse::<f32>().unwrap_or(0.0),
    }
}

/// Parses ffprobe JSON output into a MediaInfo.
pub fn parse_ffprobe_output(path: &Path, json_str: &str) -> Result<MediaInfo, ProbeError> {
    let ffprobe: ffprobe_json::FfprobeOutput =
        serde_json::from_str(json_str).map_err(|e| ProbeError::ParseError(e.to_string()))?;

    let raw_streams = ffprobe.streams.unwrap_or_default();
    let format = ffprobe.format.ok_or_else(|| {
        ProbeError::ParseError("Missing format information in ffprobe output".to_string())
    })?;

    let mut info = MediaInfo {
        path: path.to_path_buf(),
        vcodec: String::new(),
        width: 0,
        height: 0,
        runtime_secs: 0,
        filesize_bytes: 0,
        fps: 0.0,
        streams: Vec::new(),
    };

    for (position, stream) in raw_streams.into_iter().enumerate() {
        let kind = match stream.codec_type.as_deref().unwrap_or("") {
            "video" => StreamKind::Video,
            "audio" => StreamKind::Audio,
            "subtitle" => StreamKind::Subtitle,
            _ => continue,
        };
        let codec_name = stream.codec_name.clone().unwrap_or_default();

        // first video stream wins
        if kind == StreamKind::Video && info.vcodec.is_empty() {
            info.vcodec = codec_name.clone();
            info.width = stream.width.unwrap_or(0);
            info.height = stream.height.unwrap_or(0);
            info.fps = stream
                .avg_frame_rate
                .as_deref()
                .map(parse_frame_rate)
                .unwrap_or(0.0);
        }

        let language = stream
            .tags
            .as_ref()
            .and_then(|tags| tags.get("language").cloned());

        info.streams.push(StreamInfo {
            index: stream.index.unwrap_or(position as u32),
            kind,
            codec_name,
            language,
        });
    }

    info.runtime_secs = format
        .duration
        .as_ref()
        .and_then(|d| d.parse::<f64>().ok())
        .map(|d| d.max(0.0) as u64)
        .unwrap_or(0);

    info.filesize_bytes = format
        .size
        .as_ref()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use transcode_queue_config::ProcessorKind;

    const FFPROBE_JSON: &str = r#"{
        "streams": [
            {"index": 0, "codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080, "avg_frame_rate": "24000/1001"},
            {"index": 1, "codec_type": "audio", "codec_name": "ac3", "tags": {"language": "eng"}},
            {"index": 2, "codec_type": "audio", "codec_name": "aac", "tags": {"language": "ita"}},
            {"index": 3, "codec_type": "subtitle", "codec_name": "subrip", "tags": {"language": "eng"}},
            {"index": 4, "codec_type": "data", "codec_name": "bin_data"}
        ],
        "format": {"duration": "5423.120000", "size": "4200000000"}
    }"#;

    fn probe() -> MediaInfo {
        parse_ffprobe_output(Path::new("/media/film.mkv"), FFPROBE_JSON).expect("valid json")
    }

    #[test]
    fn test_parse_ffprobe_output() {
        let info = probe();

        assert_eq!(info.vcodec, "h264");
        assert_eq!(info.width, 1920);
        assert_eq!(info.height, 1080);
        assert_eq!(info.runtime_secs, 5423);
        assert_eq!(info.filesize_bytes, 4_200_000_000);
        assert!((info.fps - 23.976).abs() < 0.01);
        // data stream is dropped
        assert_eq!(info.streams.len(), 4);
        assert_eq!(info.streams[2].language.as_deref(), Some("ita"));
        assert!(info.is_valid());
        assert!(info.is_multistream());
    }

    #[test]
    fn test_parse_missing_format_is_error() {
        let result = parse_ffprobe_output(Path::new("/x.mkv"), r#"{"streams": []}"#);
        assert!(matches!(result, Err(ProbeError::ParseError(_))));
    }

    #[test]
    fn test_audio_only_is_invalid() {
        let json = r#"{
            "streams": [{"index": 0, "codec_type": "audio", "codec_name": "flac"}],
            "format": {"duration": "200.0", "size": "30000000"}
        }"#;
        let info = parse_ffprobe_output(Path::new("/music.flac"), json).unwrap();
        assert!(!info.is_valid());
        assert!(!info.is_multistream());
    }

    #[test]
    fn test_stream_map_all_languages_when_unfiltered() {
        let profile = Profile::new("hevc", ProcessorKind::Ffmpeg, ".mkv");
        let args = probe().ffmpeg_stream_map(&profile);
        assert_eq!(
            args,
            vec!["-map", "0:0", "-map", "0:1", "-map", "0:2", "-map", "0:3"]
        );
    }

    #[test]
    fn test_stream_map_filters_languages() {
        let mut profile = Profile::new("hevc", ProcessorKind::Ffmpeg, ".mkv");
        profile.audio_languages = vec!["ITA".to_string()];
        profile.subtitle_languages = vec!["fre".to_string()];

        let args = probe().ffmpeg_stream_map(&profile);
        assert_eq!(args, vec!["-map", "0:0", "-map", "0:2"]);
    }

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("25/1") - 25.0).abs() < f32::EPSILON);
        assert_eq!(parse_frame_rate("0/0"), 0.0);
        assert!((parse_frame_rate("29.97") - 29.97).abs() < 0.001);
    }
}
