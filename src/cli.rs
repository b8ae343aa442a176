use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::core::Direction;
use crate::entities::MissingFramePolicy;

/// Playback direction for the simulated player
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayDirection {
    Forward,
    Backward,
}

impl From<PlayDirection> for Direction {
    fn from(dir: PlayDirection) -> Self {
        match dir {
            PlayDirection::Forward => Direction::Forward,
            PlayDirection::Backward => Direction::Backward,
        }
    }
}

/// Gap handling on the simulated track
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum GapPolicy {
    Black,
    Error,
    Nearest,
}

impl From<GapPolicy> for MissingFramePolicy {
    fn from(policy: GapPolicy) -> Self {
        match policy {
            GapPolicy::Black => MissingFramePolicy::Black,
            GapPolicy::Error => MissingFramePolicy::Error,
            GapPolicy::Nearest => MissingFramePolicy::Nearest,
        }
    }
}

/// Frame cache playback simulator
///
/// Plays a track of synthetic clips through the frame cache and reports how
/// many displayed frames were already resident.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// First media-native frame of every clip
    #[arg(long = "first", value_name = "N", default_value_t = 1001)]
    pub first_frame: i32,

    /// Last media-native frame of every clip (inclusive)
    #[arg(long = "last", value_name = "N", default_value_t = 1120)]
    pub last_frame: i32,

    /// Number of clips appended end to end on the track
    #[arg(long = "clips", value_name = "N", default_value_t = 2)]
    pub clips: usize,

    /// Empty frames between clips
    #[arg(long = "gap", value_name = "N", default_value_t = 0)]
    pub gap: i32,

    /// What to display in gaps
    #[arg(long = "gap-policy", value_enum, default_value_t = GapPolicy::Black)]
    pub gap_policy: GapPolicy,

    /// Frame size (width height), 4 bytes per pixel
    #[arg(long = "size", value_names = ["W", "H"], num_args = 2, default_values_t = [1920, 1080])]
    pub size: Vec<usize>,

    /// Artificial decode time per frame
    #[arg(long = "decode-ms", value_name = "MS", default_value_t = 8)]
    pub decode_ms: u64,

    /// Cache memory budget in MB (default: from settings)
    #[arg(short = 'm', long = "mem", value_name = "MB")]
    pub mem_mb: Option<usize>,

    /// Worker threads (default: from settings)
    #[arg(short = 'w', long = "workers", value_name = "N")]
    pub workers: Option<usize>,

    /// Playback rate
    #[arg(long = "fps", value_name = "FPS", default_value_t = 24.0)]
    pub fps: f64,

    /// Playback direction
    #[arg(short = 'd', long = "direction", value_enum, default_value_t = PlayDirection::Forward)]
    pub direction: PlayDirection,

    /// Number of frames to play
    #[arg(short = 'n', long = "frames", value_name = "N", default_value_t = 240)]
    pub frames: usize,

    /// Jump to this track frame halfway through playback
    #[arg(short = 's', long = "seek", value_name = "FRAME")]
    pub seek: Option<i32>,

    /// Write the effective cache settings to the config directory
    #[arg(long = "save-settings")]
    pub save_settings: bool,

    /// Enable debug logging to file (default: reelcache.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["reelcache"]);
        assert_eq!(args.first_frame, 1001);
        assert_eq!(args.size, vec![1920, 1080]);
        assert_eq!(args.direction, PlayDirection::Forward);
        assert!(args.log_file.is_none());
    }

    #[test]
    fn test_flags() {
        let args = Args::parse_from([
            "reelcache",
            "-vv",
            "-d",
            "backward",
            "--size",
            "64",
            "32",
            "--mem",
            "16",
            "--log",
            "--gap-policy",
            "nearest",
        ]);
        assert_eq!(args.verbosity, 2);
        assert_eq!(Direction::from(args.direction), Direction::Backward);
        assert_eq!(args.size, vec![64, 32]);
        assert_eq!(args.mem_mb, Some(16));
        assert_eq!(args.log_file, Some(None));
        assert_eq!(MissingFramePolicy::from(args.gap_policy), MissingFramePolicy::Nearest);
    }
}
