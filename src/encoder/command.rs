//! Encoder command construction
//!
//! Maps a stream request to the exact ffmpeg argument list. All encoding
//! parameters are fixed constants; only the input paths and the destination
//! vary between invocations.

use std::path::PathBuf;

/// Fixed encoding parameters for the RTMP push.
///
/// 3 Mbps cap with a 2x buffer and a 50-frame keyframe interval, which is
/// what the destination expects for a 1080p30 live ingest.
const VIDEO_CODEC: &str = "libx264";
const PRESET: &str = "veryfast";
const MAX_RATE: &str = "3000k";
const BUF_SIZE: &str = "6000k";
const PIXEL_FORMAT: &str = "yuv420p";
const KEYFRAME_INTERVAL: &str = "50";
const AUDIO_CODEC: &str = "aac";
const AUDIO_BITRATE: &str = "128k";
const AUDIO_SAMPLE_RATE: &str = "44100";
const OUTPUT_FORMAT: &str = "flv";

/// Scales the ticker to the input width and anchors it at the bottom-left.
const TICKER_FILTER: &str = "[1:v]scale=iw:-1[ticker];[0:v][ticker]overlay=0:H-h";

/// Everything needed to start one stream, collected from the form fields
#[derive(Debug, Clone)]
pub struct StreamRequest {
    /// Local video file to stream
    pub video: PathBuf,
    /// Optional ticker image overlaid on the video
    pub ticker: Option<PathBuf>,
    /// Stream key appended verbatim to the base URL
    pub stream_key: String,
}

/// A fully built encoder invocation
#[derive(Debug, Clone)]
pub struct EncoderCommand {
    /// Ordered argument list (everything after the binary name)
    pub args: Vec<String>,
    /// Destination RTMP URL (base + key), also the last argument
    pub destination: String,
}

/// Build the destination URL from the base and the stream key.
///
/// The key is appended verbatim; no escaping or validation. A malformed key
/// surfaces only when the encoder fails to connect.
pub fn destination_url(rtmp_base: &str, stream_key: &str) -> String {
    format!("{}/{}", rtmp_base.trim_end_matches('/'), stream_key)
}

/// Build the ffmpeg argument list for a stream request.
///
/// `-re` paces the file read at its native frame rate so the push behaves
/// like a live source. When a ticker image is present a second input and a
/// single filter graph are added; the rest of the list is identical.
pub fn build_command(request: &StreamRequest, rtmp_base: &str) -> EncoderCommand {
    let destination = destination_url(rtmp_base, &request.stream_key);

    let mut args: Vec<String> = vec![
        "-re".into(),
        "-i".into(),
        request.video.to_string_lossy().into_owned(),
    ];

    if let Some(ticker) = &request.ticker {
        args.push("-i".into());
        args.push(ticker.to_string_lossy().into_owned());
        args.push("-filter_complex".into());
        args.push(TICKER_FILTER.into());
    }

    args.extend(
        [
            "-c:v",
            VIDEO_CODEC,
            "-preset",
            PRESET,
            "-maxrate",
            MAX_RATE,
            "-bufsize",
            BUF_SIZE,
            "-pix_fmt",
            PIXEL_FORMAT,
            "-g",
            KEYFRAME_INTERVAL,
            "-c:a",
            AUDIO_CODEC,
            "-b:a",
            AUDIO_BITRATE,
            "-ar",
            AUDIO_SAMPLE_RATE,
            "-f",
            OUTPUT_FORMAT,
        ]
        .iter()
        .map(|s| s.to_string()),
    );

    args.push(destination.clone());

    EncoderCommand { args, destination }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(ticker: Option<&str>) -> StreamRequest {
        StreamRequest {
            video: PathBuf::from("/tmp/a.mp4"),
            ticker: ticker.map(PathBuf::from),
            stream_key: "abc123".to_string(),
        }
    }

    #[test]
    fn test_destination_is_base_plus_key() {
        let cmd = build_command(&request(None), "rtmp://a.rtmp.youtube.com/live2");
        assert_eq!(cmd.destination, "rtmp://a.rtmp.youtube.com/live2/abc123");
        assert_eq!(cmd.args.last().unwrap(), &cmd.destination);
    }

    #[test]
    fn test_trailing_slash_in_base_is_normalized() {
        assert_eq!(
            destination_url("rtmp://a.rtmp.youtube.com/live2/", "abc123"),
            "rtmp://a.rtmp.youtube.com/live2/abc123"
        );
    }

    #[test]
    fn test_input_path_appears_exactly_once() {
        let cmd = build_command(&request(None), "rtmp://a.rtmp.youtube.com/live2");
        let count = cmd.args.iter().filter(|a| a.as_str() == "/tmp/a.mp4").count();
        assert_eq!(count, 1);

        let i = cmd.args.iter().position(|a| a == "/tmp/a.mp4").unwrap();
        assert_eq!(cmd.args[i - 1], "-i");
    }

    #[test]
    fn test_no_ticker_means_no_overlay_filter() {
        let cmd = build_command(&request(None), "rtmp://a.rtmp.youtube.com/live2");
        assert!(!cmd.args.iter().any(|a| a == "-filter_complex"));
        assert_eq!(cmd.args.iter().filter(|a| a.as_str() == "-i").count(), 1);
    }

    #[test]
    fn test_ticker_adds_second_input_and_one_filter() {
        let with = build_command(
            &request(Some("/tmp/logo.png")),
            "rtmp://a.rtmp.youtube.com/live2",
        );
        assert_eq!(with.args.iter().filter(|a| a.as_str() == "-i").count(), 2);

        let filters: Vec<_> = with
            .args
            .iter()
            .enumerate()
            .filter(|(_, a)| a.as_str() == "-filter_complex")
            .collect();
        assert_eq!(filters.len(), 1);

        let filter_expr = &with.args[filters[0].0 + 1];
        assert!(filter_expr.contains("scale=iw:-1"));
        assert!(filter_expr.contains("overlay=0:H-h"));
    }

    #[test]
    fn test_ticker_leaves_rest_of_args_identical() {
        let without = build_command(&request(None), "rtmp://a.rtmp.youtube.com/live2");
        let with = build_command(
            &request(Some("/tmp/logo.png")),
            "rtmp://a.rtmp.youtube.com/live2",
        );

        // Strip the ticker input and filter; what remains must match.
        let stripped: Vec<_> = with
            .args
            .iter()
            .enumerate()
            .filter(|(i, _)| !(3..=6).contains(i))
            .map(|(_, a)| a.clone())
            .collect();
        assert_eq!(stripped, without.args);
    }

    #[test]
    fn test_fixed_parameters_present() {
        let cmd = build_command(&request(None), "rtmp://a.rtmp.youtube.com/live2");
        for pair in [
            ["-c:v", "libx264"],
            ["-preset", "veryfast"],
            ["-maxrate", "3000k"],
            ["-bufsize", "6000k"],
            ["-pix_fmt", "yuv420p"],
            ["-g", "50"],
            ["-c:a", "aac"],
            ["-b:a", "128k"],
            ["-ar", "44100"],
            ["-f", "flv"],
        ] {
            let i = cmd.args.iter().position(|a| a == pair[0]).unwrap();
            assert_eq!(cmd.args[i + 1], pair[1]);
        }
    }
}
