//! Named clip ranges from `animation.cfg` files.
//!
//! Each line describes one clip as whitespace separated fields.
//! Blank lines and lines starting with `//` are ignored.
/*!
```text
// name           start  count  loop  fps
BOTH_STAND1           0     40    -1   20
BOTH_WALK1           40     16     0  -20
```
*/
//! Lines that can not be parsed or have a non positive frame count or negative start frame are skipped.
use std::path::{Path, PathBuf};
use std::str::FromStr;

use itertools::Itertools;
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The file name for clip definitions stored next to a GLA file.
pub const CLIP_FILE_NAME: &str = "animation.cfg";

/// A named range of frames in a GLA file.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct ClipDefinition {
    pub name: String,
    pub start_frame: usize,
    /// The number of frames, which is always at least 1.
    pub frame_count: usize,
    /// The frame to loop back to or `None` for clips that do not loop.
    pub loop_frame: Option<usize>,
    /// The playback rate as written in the file.
    /// Negative values still play forward, so use [ClipDefinition::frame_rate] instead.
    pub fps: f32,
}

impl ClipDefinition {
    /// The playback rate in frames per second.
    pub fn frame_rate(&self) -> f32 {
        self.fps.abs()
    }

    /// The index of the last frame in the clip.
    pub fn end_frame(&self) -> usize {
        self.start_frame + self.frame_count - 1
    }

    /// The clip length in seconds at its own frame rate or `0.0` if the frame rate is zero.
    /// See [ClipDefinition::duration_at].
    pub fn duration(&self) -> f32 {
        let fps = self.frame_rate();
        if fps > 0.0 {
            self.duration_at(fps)
        } else {
            0.0
        }
    }

    /// The time in seconds of the last frame when played at `frame_rate`.
    /// Single frame clips last for one frame.
    pub fn duration_at(&self, frame_rate: f32) -> f32 {
        let frame_duration = 1.0 / frame_rate;
        if self.frame_count > 1 {
            (self.frame_count - 1) as f32 * frame_duration
        } else {
            frame_duration
        }
    }
}

/// Errors while loading clip definitions.
#[derive(Debug, Error)]
pub enum ClipError {
    #[error("failed to read clip definitions from {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no valid clip definitions found")]
    NoClips,
}

/// The clip definitions in file order.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClipList {
    pub clips: Vec<ClipDefinition>,
}

impl ClipList {
    /// Reads clip definitions from `path`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ClipError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ClipError::Read {
            path: path.to_owned(),
            source,
        })?;
        let clips: Self = text.parse()?;
        tracing::info!("loaded {} clips from {:?}", clips.clips.len(), path);
        Ok(clips)
    }

    /// Reads the `animation.cfg` file in the same directory as `gla_path`.
    pub fn from_gla_directory<P: AsRef<Path>>(gla_path: P) -> Result<Self, ClipError> {
        let directory = gla_path
            .as_ref()
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        Self::from_file(directory.join(CLIP_FILE_NAME))
    }

    /// The first clip named `name`.
    pub fn find(&self, name: &str) -> Option<&ClipDefinition> {
        self.clips.iter().find(|c| c.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.clips.iter().map(|c| c.name.clone()).collect()
    }
}

impl FromStr for ClipList {
    type Err = ClipError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let clips: Vec<_> = text
            .lines()
            .enumerate()
            .filter(|(_, line)| {
                let line = line.trim_start();
                !line.is_empty() && !line.starts_with("//")
            })
            .filter_map(|(i, line)| {
                let clip = parse_clip(line);
                if clip.is_none() {
                    tracing::debug!("skipping line {}: {}", i + 1, line);
                }
                clip
            })
            .collect();

        if clips.is_empty() {
            Err(ClipError::NoClips)
        } else {
            Ok(Self { clips })
        }
    }
}

fn parse_clip(line: &str) -> Option<ClipDefinition> {
    let mut fields = line.split_whitespace();
    let name = fields.next()?;
    if name.starts_with("//") {
        return None;
    }

    let (start_frame, frame_count, loop_frame, fps) = fields.next_tuple()?;
    let start_frame: i32 = start_frame.parse().ok()?;
    let frame_count: i32 = frame_count.parse().ok()?;
    let loop_frame: i32 = loop_frame.parse().ok()?;
    let fps: f32 = fps.parse().ok()?;

    Some(ClipDefinition {
        name: name.to_string(),
        start_frame: usize::try_from(start_frame).ok()?,
        frame_count: usize::try_from(frame_count).ok().filter(|c| *c > 0)?,
        loop_frame: usize::try_from(loop_frame).ok(),
        fps,
    })
}
