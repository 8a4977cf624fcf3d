use std::fmt;
use std::path::Path;

use crate::config::ProfileConfig;

/// Abstract engine invocation: an argument list plus a description used in logs.
///
/// Commands carry no binary path; the engine that runs them decides which
/// executable to use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaCommand {
    pub args: Vec<String>,
    pub description: String,
}

impl MediaCommand {
    /// Create a new media processing command
    pub fn new<S: Into<String>>(description: S) -> Self {
        Self {
            args: Vec::new(),
            description: description.into(),
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Add input file
    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Add a synthetic input produced by the lavfi device
    pub fn lavfi_input<S: Into<String>>(self, source: S) -> Self {
        self.arg("-f").arg("lavfi").arg("-i").arg(source)
    }

    /// Add a concat demuxer list as input
    pub fn concat_list_input<P: AsRef<Path>>(self, list: P) -> Self {
        self.arg("-f").arg("concat").arg("-safe").arg("0").input(list)
    }

    /// Add output file
    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Force overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    /// Set video codec
    pub fn video_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:v").arg(codec)
    }

    /// Set audio codec
    pub fn audio_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:a").arg(codec)
    }

    /// Copy every stream without re-encoding
    pub fn copy_streams(self) -> Self {
        self.arg("-c").arg("copy")
    }

    /// Set audio sample rate
    pub fn audio_sample_rate(self, rate: u32) -> Self {
        self.arg("-ar").arg(rate.to_string())
    }

    /// Set audio channels
    pub fn audio_channels(self, channels: u32) -> Self {
        self.arg("-ac").arg(channels.to_string())
    }

    /// Add video filter
    pub fn video_filter<S: Into<String>>(self, filter: S) -> Self {
        self.arg("-vf").arg(filter)
    }

    /// Add a complex filter graph
    pub fn filter_complex<S: Into<String>>(self, graph: S) -> Self {
        self.arg("-filter_complex").arg(graph)
    }

    /// Select a stream (or graph label) for the output
    pub fn map<S: Into<String>>(self, spec: S) -> Self {
        self.arg("-map").arg(spec)
    }

    /// Stop writing when the shortest stream ends
    pub fn shortest(self) -> Self {
        self.arg("-shortest")
    }

    /// Move the index to the front of mp4 outputs
    pub fn faststart(self) -> Self {
        self.arg("-movflags").arg("+faststart")
    }

    /// Apply the canonical encoder settings of a profile to both streams
    pub fn encode_with(self, profile: &ProfileConfig) -> Self {
        self.video_codec(&profile.video_codec)
            .arg("-preset").arg(&profile.preset)
            .arg("-crf").arg(profile.crf.to_string())
            .arg("-pix_fmt").arg(&profile.pixel_format)
            .audio_codec(&profile.audio_codec)
            .arg("-b:a").arg(&profile.audio_bitrate)
            .audio_sample_rate(profile.sample_rate)
            .audio_channels(profile.channels)
    }
}

impl fmt::Display for MediaCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.args.join(" "))
    }
}

/// Filter fragments shared by the normalizer and the graph concatenator.
pub struct Filters;

impl Filters {
    /// Aspect-preserving scale into `width`x`height`, padded and centred
    pub fn scale_and_pad(width: u32, height: u32) -> String {
        format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1",
            w = width,
            h = height
        )
    }

    /// Constant frame rate and pixel format
    pub fn frame_rate_and_format(fps: u32, pixel_format: &str) -> String {
        format!("fps={},format={}", fps, pixel_format)
    }

    /// Endless silent stereo source
    pub fn silence(sample_rate: u32) -> String {
        format!("anullsrc=channel_layout=stereo:sample_rate={}", sample_rate)
    }

    /// Video chain of the canonical profile, scale-and-pad included when a resolution is fixed
    pub fn canonical_video(profile: &ProfileConfig) -> String {
        let rate = Self::frame_rate_and_format(profile.fps, &profile.pixel_format);
        match profile.resolution() {
            Some((w, h)) => format!("{},{}", rate, Self::scale_and_pad(w, h)),
            None => rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_arguments_in_call_order() {
        let cmd = MediaCommand::new("Concatenate videos")
            .overwrite()
            .concat_list_input("/work/list.txt")
            .copy_streams()
            .output("/work/out.mp4");

        assert_eq!(
            cmd.args,
            vec!["-y", "-f", "concat", "-safe", "0", "-i", "/work/list.txt", "-c", "copy", "/work/out.mp4"]
        );
        assert_eq!(cmd.to_string(), cmd.args.join(" "));
    }

    #[test]
    fn encode_with_applies_profile() {
        let profile = ProfileConfig::default();
        let cmd = MediaCommand::new("encode").encode_with(&profile);
        let joined = cmd.to_string();
        assert!(joined.contains("-c:v libx264 -preset medium -crf 18 -pix_fmt yuv420p"));
        assert!(joined.contains("-c:a aac -b:a 192k -ar 44100 -ac 2"));
    }

    #[test]
    fn canonical_video_only_pads_with_fixed_resolution() {
        let mut profile = ProfileConfig::default();
        assert_eq!(Filters::canonical_video(&profile), "fps=30,format=yuv420p");

        profile.width = Some(1280);
        profile.height = Some(720);
        assert_eq!(
            Filters::canonical_video(&profile),
            "fps=30,format=yuv420p,scale=1280:720:force_original_aspect_ratio=decrease,pad=1280:720:(ow-iw)/2:(oh-ih)/2,setsar=1"
        );
    }
}
