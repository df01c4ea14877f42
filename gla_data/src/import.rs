//! Conversion of GLA skeletons and clips to [SkeletonData] and [AnimationData].
//!
//! Imported transforms are converted to the Y-up output coordinate system in meters.
//! Animations are keyed against the joints of an existing [SkeletonData],
//! which does not need to list joints in the same order as the GLA bones.
//! Joints are matched to bones by name.
//!
//! Root motion is not exported. The root joint's position is subtracted from every joint
//! for each frame, so the skeleton stays centered at the origin.
use glam::Vec3;
use rayon::prelude::*;
use thiserror::Error;

use gla_lib::math::{multiply, normalize_or_identity, rotate_vector, world_to_local};
use gla_lib::{Gla, GlaError, Transform};

use crate::anim_data::{AnimationData, AnimationError, JointTrack};
use crate::clip_data::{ClipDefinition, ClipList};
use crate::coordinates::{convert_position, convert_quaternion, convert_transform};
use crate::hierarchy::FramePose;
use crate::skel_data::{JointData, SkeletonData, SkeletonError};
use crate::trace::Trace;

/// The frame rate used when neither the clip nor the caller specify a positive rate.
pub const DEFAULT_FRAME_RATE: f32 = 20.0;

/// Errors while importing a skeleton or clip.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Gla(#[from] GlaError),

    #[error("GLA file has no root bone")]
    NoRootBone,

    #[error("clip {name:?} not found")]
    ClipNotFound { name: String },

    #[error(
        "clip {clip:?} has {frame_count} frames from frame {start_frame} but the file only has {available} frames"
    )]
    FrameRange {
        clip: String,
        start_frame: usize,
        frame_count: usize,
        available: usize,
    },

    #[error(transparent)]
    Skeleton(#[from] SkeletonError),

    #[error("imported animation for clip {clip:?} (frames {start_frame} to {end_frame}) is invalid")]
    Validation {
        clip: String,
        start_frame: usize,
        end_frame: usize,
        #[source]
        source: AnimationError,
    },
}

/// Creates a skeleton from the bind pose of `gla`.
///
/// Joints are listed depth first starting from each root bone with children in bone index order.
/// Each joint's rest transform is its converted bind pose relative to its parent with unit scale.
pub fn skeleton_from_gla(gla: &Gla, trace: &dyn Trace) -> Result<SkeletonData, ImportError> {
    let parents: Vec<_> = (0..gla.bone_count()).map(|i| gla.parent_index(i)).collect();
    let roots: Vec<_> = (0..parents.len()).filter(|i| parents[*i].is_none()).collect();
    if roots.is_empty() {
        return Err(ImportError::NoRootBone);
    }

    let mut joint_for_bone = vec![None; parents.len()];
    let mut joints = Vec::with_capacity(parents.len());

    // Reverse pushes so that lower indices are visited first.
    let mut stack: Vec<_> = roots.into_iter().rev().collect();
    while let Some(bone) = stack.pop() {
        let local = gla.local_bind_pose_transform(bone)?;
        let rest_transform = convert_transform(local.translation, local.rotation);

        let name = gla.bone(bone)?.name();
        trace.bind_pose(&name, joints.len(), &rest_transform);

        joint_for_bone[bone] = Some(joints.len());
        joints.push(JointData {
            name,
            parent_index: parents[bone].and_then(|p| joint_for_bone[p]),
            rest_transform,
        });

        stack.extend((0..parents.len()).rev().filter(|i| parents[*i] == Some(bone)));
    }

    let skeleton = SkeletonData { joints };
    skeleton.validate()?;
    tracing::info!(
        "imported skeleton {:?} with {} joints",
        gla.name(),
        skeleton.num_joints()
    );
    Ok(skeleton)
}

/// The frame rate used to key `clip`.
/// The magnitude of the clip's own rate takes precedence over `sampling_rate`.
pub fn clip_frame_rate(clip: &ClipDefinition, sampling_rate: f32) -> f32 {
    let fps = clip.frame_rate();
    if fps > 0.0 {
        fps
    } else if sampling_rate > 0.0 {
        sampling_rate
    } else {
        DEFAULT_FRAME_RATE
    }
}

/// Imports the frames of `clip` as an animation for the joints of `skeleton`.
///
/// Joints without a bone of the same name hold their rest pose for the whole animation.
/// Single frame clips last for one frame duration.
pub fn import_clip(
    gla: &Gla,
    clip: &ClipDefinition,
    skeleton: &SkeletonData,
    sampling_rate: f32,
    trace: &dyn Trace,
) -> Result<AnimationData, ImportError> {
    if clip.start_frame + clip.frame_count > gla.frame_count() {
        return Err(ImportError::FrameRange {
            clip: clip.name.clone(),
            start_frame: clip.start_frame,
            frame_count: clip.frame_count,
            available: gla.frame_count(),
        });
    }

    skeleton.validate()?;
    let order = skeleton.evaluation_order()?;
    let root = skeleton.root_index().ok_or(SkeletonError::NoRoot)?;

    let frame_rate = clip_frame_rate(clip, sampling_rate);
    let frame_duration = 1.0 / frame_rate;
    let duration = clip.duration_at(frame_rate);

    let bones: Vec<_> = skeleton
        .joints
        .iter()
        .map(|j| gla.bone_index(&j.name))
        .collect();
    for (joint, _) in skeleton.joints.iter().zip(&bones).filter(|(_, b)| b.is_none()) {
        tracing::debug!("joint {:?} has no matching bone", joint.name);
    }

    let mut animation = AnimationData::new(&clip.name, duration, skeleton.num_joints());
    let mut worlds = vec![Transform::IDENTITY; skeleton.num_joints()];

    for f in 0..clip.frame_count {
        let frame = clip.start_frame + f;
        let time = f as f32 * frame_duration;
        let pose = FramePose::new(gla, frame)?;

        for &j in &order {
            let joint = &skeleton.joints[j];
            worlds[j] = match bones[j] {
                Some(bone) => {
                    let (translation, rotation) = pose.world_transform(bone)?;
                    Transform::new(
                        convert_position(translation),
                        normalize_or_identity(convert_quaternion(rotation)),
                    )
                }
                None => {
                    // Unanimated joints follow their parent in the rest pose.
                    let parent = joint
                        .parent_index
                        .map(|p| worlds[p])
                        .unwrap_or(Transform::IDENTITY);
                    compose(&parent, &joint.rest_transform)
                }
            };
        }

        let root_position = worlds[root].translation;
        tracing::trace!(clip = %clip.name, frame, root_motion = ?root_position);
        for world in &mut worlds {
            world.translation -= root_position;
        }

        for (j, joint) in skeleton.joints.iter().enumerate() {
            if bones[j].is_none() {
                continue;
            }

            let world = worlds[j];
            let local = match joint.parent_index {
                Some(p) => {
                    let parent = worlds[p];
                    let (translation, rotation) = world_to_local(
                        parent.translation,
                        parent.rotation,
                        world.translation,
                        world.rotation,
                    );
                    Transform::new(translation, rotation)
                }
                None => world,
            };

            trace.import_joint(&clip.name, frame, &joint.name, &world, &local);
            animation.tracks[j].push(time, local);
        }
    }

    for (track, (joint, bone)) in animation
        .tracks
        .iter_mut()
        .zip(skeleton.joints.iter().zip(&bones))
    {
        match bone {
            Some(_) => {
                if let [key] = track.translations[..] {
                    track.translations.push(key.with_time(duration));
                }
                if let [key] = track.rotations[..] {
                    track.rotations.push(key.with_time(duration));
                }
                if let [key] = track.scales[..] {
                    track.scales.push(key.with_time(duration));
                }
            }
            None => *track = JointTrack::constant(joint.rest_transform, duration),
        }
    }

    animation
        .validate()
        .map_err(|source| ImportError::Validation {
            clip: clip.name.clone(),
            start_frame: clip.start_frame,
            end_frame: clip.end_frame(),
            source,
        })?;

    Ok(animation)
}

/// Finds the clip named `name` in `clips` and imports it with [import_clip].
pub fn import_named_clip(
    gla: &Gla,
    clips: &ClipList,
    name: &str,
    skeleton: &SkeletonData,
    sampling_rate: f32,
    trace: &dyn Trace,
) -> Result<AnimationData, ImportError> {
    let clip = clips.find(name).ok_or_else(|| ImportError::ClipNotFound {
        name: name.to_string(),
    })?;
    import_clip(gla, clip, skeleton, sampling_rate, trace)
}

/// Imports each clip in parallel.
/// The results are in the same order as `clips`, so a failed clip does not affect the others.
pub fn import_clips(
    gla: &Gla,
    clips: &[ClipDefinition],
    skeleton: &SkeletonData,
    sampling_rate: f32,
    trace: &dyn Trace,
) -> Vec<Result<AnimationData, ImportError>> {
    clips
        .par_iter()
        .map(|clip| import_clip(gla, clip, skeleton, sampling_rate, trace))
        .collect()
}

fn compose(parent: &Transform, local: &Transform) -> Transform {
    Transform {
        translation: parent.translation + rotate_vector(parent.rotation, local.translation),
        rotation: normalize_or_identity(multiply(parent.rotation, local.rotation)),
        scale: Vec3::ONE,
    }
}
