//! HapFlow - plays a Hap test pattern through the compressed upload path

mod logging_setup;
mod playback;

use anyhow::{Context, Result};
use clap::Parser;
use hapflow_core::{CodecVariant, PlayerConfig};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(
    name = "hapflow",
    version,
    about = "Stream Hap compressed frames into GPU textures."
)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Upload into host memory instead of the GPU.
    #[arg(long)]
    headless: bool,

    /// Codec variant: hap, hap_alpha or hapq.
    #[arg(long, value_parser = parse_codec)]
    codec: Option<CodecVariant>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    #[arg(long)]
    fps: Option<f64>,

    /// Frames to play, 0 plays until interrupted.
    #[arg(long)]
    frames: Option<u64>,

    /// Log level, overriding the configuration file.
    #[arg(long)]
    log_level: Option<String>,
}

fn parse_codec(name: &str) -> Result<CodecVariant, String> {
    match CodecVariant::from_codec_name(name) {
        CodecVariant::Unsupported => Err(format!("'{}' is not a Hap codec", name)),
        codec => Ok(codec),
    }
}

impl Cli {
    fn load_config(&self) -> Result<PlayerConfig> {
        let mut config = match &self.config {
            Some(path) => PlayerConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => PlayerConfig::default(),
        };

        let playback = &mut config.playback;
        if let Some(codec) = self.codec {
            playback.codec = codec;
        }
        if let Some(width) = self.width {
            playback.width = width;
        }
        if let Some(height) = self.height {
            playback.height = height;
        }
        if let Some(fps) = self.fps {
            playback.fps = fps;
        }
        if let Some(frames) = self.frames {
            playback.frames = frames;
        }
        if let Some(level) = &self.log_level {
            config.log.level = level.clone();
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

fn main() {
    if let Err(err) = try_main() {
        error!(error = ?err, "hapflow exited with error");
        eprintln!("Error: {:?}", err);
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;
    let _log_guard = logging_setup::init(&config.log)?;

    info!(
        "Starting HapFlow {} ({} {}x{} @ {} fps)",
        env!("CARGO_PKG_VERSION"),
        config.playback.codec,
        config.playback.width,
        config.playback.height,
        config.playback.fps
    );

    let counts = playback::run(&config, cli.headless)?;
    info!(
        "Drew {} textured frames and {} placeholders",
        counts.textured, counts.placeholder
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_cli_overrides_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[playback]\nwidth = 640\nheight = 360\ncodec = \"alpha\"\n\n[stream]\ndegrade_after_failures = 5"
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "hapflow",
            "--config",
            file.path().to_str().unwrap(),
            "--codec",
            "hapq",
            "--width",
            "800",
        ])
        .unwrap();
        let config = cli.load_config().unwrap();

        assert_eq!(config.playback.codec, CodecVariant::Quality);
        assert_eq!(config.playback.width, 800);
        assert_eq!(config.playback.height, 360);
        assert_eq!(config.stream.degrade_after_failures, 5);
    }

    #[test]
    fn test_rejects_non_hap_codec() {
        assert!(Cli::try_parse_from(["hapflow", "--codec", "h264"]).is_err());
    }

    #[test]
    fn test_invalid_fps_fails_validation() {
        let cli = Cli::try_parse_from(["hapflow", "--fps", "0"]).unwrap();
        assert!(cli.load_config().is_err());
    }
}
