use std::path::Path;
use log::debug;
use crate::encoder::EncoderChoice;

/// Command builder for generating FFmpeg encode command lines
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    target_width: u32,
    target_height: u32,
    quality: u8,
}

impl Default for CommandBuilder {
    fn default() -> Self {
        Self::new(1920, 1080, 23)
    }
}

impl CommandBuilder {
    pub fn new(target_width: u32, target_height: u32, quality: u8) -> Self {
        CommandBuilder {
            target_width,
            target_height,
            quality,
        }
    }

    /// Fit inside the target frame keeping aspect ratio, then pad with
    /// centered black bars to exactly the target size.
    pub fn scale_pad_filter(&self) -> String {
        let (w, h) = (self.target_width, self.target_height);
        format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:-1:-1:black"
        )
    }

    /// Build the full encode command (arguments only, without the ffmpeg binary)
    ///
    /// Generates:
    /// - input and the scale+pad filter chain
    /// - the selected encoder with its family-specific rate control
    /// - audio stream copy
    /// - overwrite, key=value progress on stdout and the stats line
    /// - output path last
    pub fn build_encode_command(
        &self,
        input: &Path,
        output: &Path,
        source_width: u32,
        source_height: u32,
        encoder: EncoderChoice,
    ) -> Vec<String> {
        // Wider and narrower sources get the same filter; the pad offsets
        // center the picture either way.
        if u64::from(source_width) * u64::from(self.target_height)
            > u64::from(self.target_width) * u64::from(source_height)
        {
            debug!("{}x{} is wider than target, letterboxing", source_width, source_height);
        } else {
            debug!("{}x{} is narrower than target, pillarboxing", source_width, source_height);
        }

        let mut args = vec![
            "-hide_banner".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-vf".to_string(),
            self.scale_pad_filter(),
            "-c:v".to_string(),
            encoder.ffmpeg_name().to_string(),
        ];

        args.extend(self.encoder_params(encoder));

        args.push("-c:a".to_string());
        args.push("copy".to_string());

        args.push("-y".to_string());

        args.push("-progress".to_string());
        args.push("pipe:1".to_string());
        args.push("-stats".to_string());

        args.push(output.to_string_lossy().to_string());

        args
    }

    /// Rate-control flags per encoder family
    pub fn encoder_params(&self, encoder: EncoderChoice) -> Vec<String> {
        let q = self.quality.to_string();
        let q = q.as_str();
        let params: Vec<&str> = match encoder {
            // NVENC: fastest preset, HQ tune, VBR with a CQ target
            EncoderChoice::Nvenc => vec!["-preset", "p1", "-tune", "hq", "-rc", "vbr", "-cq", q],
            // AMF: transcoding usage, constant QP for I and P frames
            EncoderChoice::Amf => vec![
                "-usage", "transcoding", "-rc", "cqp", "-qp_i", q, "-qp_p", q,
            ],
            EncoderChoice::QuickSync => vec!["-preset", "veryfast", "-global_quality", q],
            EncoderChoice::Software => vec!["-preset", "ultrafast", "-crf", q],
        };
        params.into_iter().map(String::from).collect()
    }
}
