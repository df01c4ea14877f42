//! Keyframed joint animations.
//!
//! An [AnimationData] stores one [JointTrack] for each joint of the skeleton it animates,
//! in the same order as the skeleton's joints.
//! Translation, rotation, and scale keyframes are timed independently in seconds.
use glam::{Quat, Vec3};
use thiserror::Error;

use gla_lib::math::normalize_or_identity;
use gla_lib::Transform;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A value at a time in seconds.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keyframe<T> {
    pub time: f32,
    pub value: T,
}

impl<T> Keyframe<T> {
    pub fn new(time: f32, value: T) -> Self {
        Self { time, value }
    }

    /// The same value at a different time.
    pub fn with_time(self, time: f32) -> Self {
        Self { time, ..self }
    }
}

/// The animated local transform of a single joint.
/// Empty channels sample to the identity value for that channel.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JointTrack {
    pub translations: Vec<Keyframe<Vec3>>,
    pub rotations: Vec<Keyframe<Quat>>,
    pub scales: Vec<Keyframe<Vec3>>,
}

impl JointTrack {
    /// Adds a keyframe to each channel at `time`.
    pub fn push(&mut self, time: f32, transform: Transform) {
        self.translations
            .push(Keyframe::new(time, transform.translation));
        self.rotations.push(Keyframe::new(time, transform.rotation));
        self.scales.push(Keyframe::new(time, transform.scale));
    }

    /// A track holding `transform` at the start and end of the animation.
    pub fn constant(transform: Transform, duration: f32) -> Self {
        let mut track = Self::default();
        track.push(0.0, transform);
        track.push(duration, transform);
        track
    }

    /// Samples each channel at `time`.
    pub fn sample(&self, time: f32) -> Transform {
        Transform {
            translation: sample_keys(&self.translations, time, Vec3::ZERO, Vec3::lerp),
            rotation: sample_keys(&self.rotations, time, Quat::IDENTITY, nlerp),
            scale: sample_keys(&self.scales, time, Vec3::ONE, Vec3::lerp),
        }
    }
}

/// A named animation with one track per joint.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnimationData {
    pub name: String,
    /// The length of the animation in seconds.
    pub duration: f32,
    pub tracks: Vec<JointTrack>,
}

/// Errors for animations that can not be sampled consistently.
#[derive(Debug, Error)]
pub enum AnimationError {
    #[error("duration {duration} must be positive and finite")]
    InvalidDuration { duration: f32 },

    #[error("{channel} keyframe at {time} for track {track} is outside the duration {duration}")]
    KeyframeOutOfRange {
        track: usize,
        channel: &'static str,
        time: f32,
        duration: f32,
    },

    #[error("{channel} keyframe at {time} for track {track} is not after the previous keyframe")]
    UnsortedKeyframes {
        track: usize,
        channel: &'static str,
        time: f32,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Errors while sampling an [AnimationData].
#[derive(Debug, Error, PartialEq)]
pub enum SampleError {
    #[error("sample ratio {ratio} is not finite")]
    InvalidRatio { ratio: f32 },

    #[error("expected output for {expected} tracks but found {actual}")]
    OutputSize { expected: usize, actual: usize },
}

impl AnimationData {
    /// Creates an animation with `num_tracks` empty tracks.
    pub fn new(name: impl Into<String>, duration: f32, num_tracks: usize) -> Self {
        Self {
            name: name.into(),
            duration,
            tracks: vec![JointTrack::default(); num_tracks],
        }
    }

    pub fn num_tracks(&self) -> usize {
        self.tracks.len()
    }

    /// Checks that the duration is positive and every channel's keyframes are
    /// in strictly increasing order within `[0, duration]`.
    pub fn validate(&self) -> Result<(), AnimationError> {
        if !(self.duration.is_finite() && self.duration > 0.0) {
            return Err(AnimationError::InvalidDuration {
                duration: self.duration,
            });
        }

        for (i, track) in self.tracks.iter().enumerate() {
            validate_times(i, "translation", track.translations.iter().map(|k| k.time), self.duration)?;
            validate_times(i, "rotation", track.rotations.iter().map(|k| k.time), self.duration)?;
            validate_times(i, "scale", track.scales.iter().map(|k| k.time), self.duration)?;
        }
        Ok(())
    }

    /// Samples every track at `ratio` of the duration into `output`.
    /// The ratio is clamped to `[0, 1]`.
    pub fn sample(&self, ratio: f32, output: &mut [Transform]) -> Result<(), SampleError> {
        if !ratio.is_finite() {
            return Err(SampleError::InvalidRatio { ratio });
        }
        if output.len() != self.tracks.len() {
            return Err(SampleError::OutputSize {
                expected: self.tracks.len(),
                actual: output.len(),
            });
        }

        let time = ratio.clamp(0.0, 1.0) * self.duration;
        for (track, transform) in self.tracks.iter().zip(output.iter_mut()) {
            *transform = track.sample(time);
        }
        Ok(())
    }
}

#[cfg(feature = "serde")]
impl AnimationData {
    /// Reads and validates an animation stored as JSON.
    pub fn from_json_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, AnimationError> {
        let text = std::fs::read_to_string(path)?;
        let animation: Self = serde_json::from_str(&text)?;
        animation.validate()?;
        Ok(animation)
    }

    pub fn write_json_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), AnimationError> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

fn validate_times(
    track: usize,
    channel: &'static str,
    times: impl Iterator<Item = f32>,
    duration: f32,
) -> Result<(), AnimationError> {
    let mut previous = None;
    for time in times {
        if !(0.0..=duration).contains(&time) {
            return Err(AnimationError::KeyframeOutOfRange {
                track,
                channel,
                time,
                duration,
            });
        }
        if previous.is_some_and(|p| time <= p) {
            return Err(AnimationError::UnsortedKeyframes {
                track,
                channel,
                time,
            });
        }
        previous = Some(time);
    }
    Ok(())
}

fn sample_keys<T: Copy>(
    keys: &[Keyframe<T>],
    time: f32,
    default: T,
    interpolate: impl Fn(T, T, f32) -> T,
) -> T {
    // Find the first key after time.
    let next = keys.partition_point(|k| k.time <= time);
    match (next.checked_sub(1).and_then(|i| keys.get(i)), keys.get(next)) {
        (Some(a), Some(b)) => {
            let factor = (time - a.time) / (b.time - a.time);
            interpolate(a.value, b.value, factor)
        }
        (Some(a), None) => a.value,
        (None, Some(b)) => b.value,
        (None, None) => default,
    }
}

/// Normalized linear interpolation along the shortest path.
fn nlerp(a: Quat, b: Quat, factor: f32) -> Quat {
    let b = if a.dot(b) < 0.0 { -b } else { b };
    normalize_or_identity(Quat::from_vec4(
        glam::Vec4::from(a).lerp(glam::Vec4::from(b), factor),
    ))
}
