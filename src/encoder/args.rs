use crate::domain::Resolution;
use std::ffi::OsString;
use std::path::Path;

/// Argument vector for one HLS rendition: scale-and-pad to the exact target
/// shape preserving aspect, CRF 23 with the resolution's bitrate ceiling,
/// stereo AAC, 4-second segments, unlimited playlist, progress on stdout.
pub fn build_hls_args(input: &Path, output_dir: &Path, resolution: Resolution) -> Vec<OsString> {
    let (width, height) = resolution.dimensions();
    let bitrate = resolution.bitrate_kbps();
    let filter = format!(
        "scale=w={w}:h={h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2",
        w = width,
        h = height
    );

    let mut args: Vec<OsString> = vec!["-y".into(), "-i".into(), input.into()];
    args.extend(
        [
            "-vf",
            &filter,
            "-c:v",
            "libx264",
            "-crf",
            "23",
            "-b:v",
            &format!("{}k", bitrate),
            "-maxrate",
            &format!("{}k", bitrate),
            "-bufsize",
            &format!("{}k", bitrate * 2),
            "-c:a",
            "aac",
            "-ac",
            "2",
            "-b:a",
            "128k",
            "-ar",
            "44100",
            "-f",
            "hls",
            "-hls_time",
            "4",
            "-hls_list_size",
            "0",
        ]
        .into_iter()
        .map(OsString::from),
    );
    args.push("-hls_segment_filename".into());
    args.push(output_dir.join("segment_%03d.ts").into());
    args.extend(["-progress", "pipe:1"].into_iter().map(OsString::from));
    args.push(output_dir.join("playlist.m3u8").into());
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn args_for(resolution: Resolution) -> Vec<String> {
        build_hls_args(
            &PathBuf::from("/in/video.mp4"),
            &PathBuf::from("/out/low"),
            resolution,
        )
        .into_iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect()
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> &'a str {
        let at = args.iter().position(|a| a == flag).unwrap();
        &args[at + 1]
    }

    #[test]
    fn low_rendition_scales_and_caps_bitrate() {
        let args = args_for(Resolution::Low);
        assert!(value_after(&args, "-vf").starts_with("scale=w=640:h=360:"));
        assert!(value_after(&args, "-vf").contains("pad=640:360:"));
        assert_eq!(value_after(&args, "-b:v"), "800k");
        assert_eq!(value_after(&args, "-maxrate"), "800k");
        assert_eq!(value_after(&args, "-bufsize"), "1600k");
    }

    #[test]
    fn high_rendition_uses_its_own_ladder_rung() {
        let args = args_for(Resolution::High);
        assert!(value_after(&args, "-vf").contains("1920"));
        assert_eq!(value_after(&args, "-b:v"), "5000k");
        assert_eq!(value_after(&args, "-bufsize"), "10000k");
    }

    #[test]
    fn hls_muxer_settings_are_fixed() {
        let args = args_for(Resolution::Medium);
        assert_eq!(args[0], "-y");
        assert_eq!(value_after(&args, "-crf"), "23");
        assert_eq!(value_after(&args, "-hls_time"), "4");
        assert_eq!(value_after(&args, "-hls_list_size"), "0");
        assert_eq!(value_after(&args, "-b:a"), "128k");
        assert_eq!(value_after(&args, "-ar"), "44100");
        assert_eq!(
            value_after(&args, "-hls_segment_filename"),
            "/out/low/segment_%03d.ts"
        );
        assert_eq!(value_after(&args, "-progress"), "pipe:1");
        assert_eq!(args.last().unwrap(), "/out/low/playlist.m3u8");
    }
}
