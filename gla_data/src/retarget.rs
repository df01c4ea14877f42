//! Retargeting animations between skeletons with different hierarchies.
//!
//! Rotations are transferred in world space. For each sampled frame, the source joints' world rotations
//! are computed from the sampled local rotations. Each mapped target joint takes the world rotation
//! of its source joint and converts it to a local rotation using the world rotation
//! already computed for its own target parent.
//! The target and source hierarchies therefore do not need to match.
//!
//! Translations are copied from the source joint's local translation.
//! Unmapped target joints keep their rest pose.
use glam::{Quat, Vec3};
use thiserror::Error;

use gla_lib::math::{conjugate, multiply, normalize_or_identity};
use gla_lib::Transform;

use crate::anim_data::{AnimationData, AnimationError, SampleError};
use crate::mapping::BoneMapper;
use crate::skel_data::{SkeletonData, SkeletonError};
use crate::trace::{RetargetTrace, Trace};

/// The default number of output keyframes per second.
pub const DEFAULT_SAMPLE_RATE: f32 = 30.0;

/// Errors while retargeting an animation.
#[derive(Debug, Error)]
pub enum RetargetError {
    #[error(transparent)]
    Skeleton(#[from] SkeletonError),

    #[error("failed to sample source animation at frame {frame}")]
    Sampling {
        frame: usize,
        #[source]
        source: SampleError,
    },

    #[error("retargeted animation is invalid")]
    Validation(#[source] AnimationError),
}

/// How a target joint is driven.
#[derive(Debug, Clone, PartialEq)]
enum JointSource {
    Rest,
    Single(usize),
    /// Source joints whose local rotations are multiplied in order.
    Combined(Vec<usize>),
}

#[derive(Debug, Clone)]
struct ResolvedMapping {
    source: JointSource,
    correction: Option<Quat>,
    names: Vec<String>,
}

/// Retargets `source_animation` from `source_skeleton` onto `target_skeleton`.
///
/// The output has `floor(duration * sample_rate) + 1` uniformly spaced keyframes
/// with at least two keyframes, and the final keyframe is always at the animation's duration.
/// The bone maps of `mapper` are rebuilt from the joint names of both skeletons.
pub fn retarget(
    source_skeleton: &SkeletonData,
    source_animation: &AnimationData,
    target_skeleton: &SkeletonData,
    mapper: &mut BoneMapper,
    sample_rate: f32,
    trace: &dyn Trace,
) -> Result<AnimationData, RetargetError> {
    source_skeleton.validate()?;
    target_skeleton.validate()?;
    let source_order = source_skeleton.evaluation_order()?;
    let target_order = target_skeleton.evaluation_order()?;

    mapper.build_source_bone_map(&source_skeleton.joint_names());
    mapper.build_target_bone_map(&target_skeleton.joint_names());
    for mapping in mapper.mappings() {
        if mapper.target_bone_index(&mapping.target).is_none() {
            tracing::warn!("mapping target {:?} is not in the target skeleton", mapping.target);
        }
    }

    let resolved: Vec<_> = target_skeleton
        .joints
        .iter()
        .map(|joint| resolve_mapping(mapper, &joint.name))
        .collect();

    let duration = source_animation.duration;
    let num_keyframes = key_count(duration, sample_rate);
    let time_step = duration / (num_keyframes - 1) as f32;
    tracing::info!(
        "retargeting {:?} with {} keyframes over {} seconds",
        source_animation.name,
        num_keyframes,
        duration
    );

    let mut animation = AnimationData::new(
        source_animation.name.clone(),
        duration,
        target_skeleton.num_joints(),
    );

    let mut source_locals = vec![Transform::IDENTITY; source_skeleton.num_joints()];
    let mut source_worlds = vec![Quat::IDENTITY; source_skeleton.num_joints()];
    let mut target_worlds = vec![Quat::IDENTITY; target_skeleton.num_joints()];

    for frame in 0..num_keyframes {
        let time = if frame + 1 == num_keyframes {
            duration
        } else {
            frame as f32 * time_step
        };
        let ratio = if duration > 0.0 { time / duration } else { 0.0 };

        source_animation
            .sample(ratio, &mut source_locals)
            .map_err(|source| RetargetError::Sampling { frame, source })?;

        for &i in &source_order {
            let local = source_locals[i].rotation;
            source_worlds[i] = match source_skeleton.joints[i].parent_index {
                Some(p) => normalize_or_identity(multiply(source_worlds[p], local)),
                None => normalize_or_identity(local),
            };
        }

        for &j in &target_order {
            let joint = &target_skeleton.joints[j];
            let parent_world = joint
                .parent_index
                .map(|p| target_worlds[p])
                .unwrap_or(Quat::IDENTITY);

            let mapping = &resolved[j];
            let driven = match &mapping.source {
                JointSource::Rest => None,
                JointSource::Single(bone) => {
                    Some((source_worlds[*bone], source_locals[*bone].translation))
                }
                JointSource::Combined(bones) => Some(combined_world(
                    source_skeleton,
                    &source_locals,
                    &source_worlds,
                    bones,
                )),
            };

            let local = match driven {
                Some((world, translation)) => {
                    let world = match mapping.correction {
                        Some(correction) => normalize_or_identity(multiply(world, correction)),
                        None => world,
                    };

                    let rotation = normalize_or_identity(multiply(conjugate(parent_world), world));
                    trace.retarget_joint(
                        frame,
                        &joint.name,
                        &RetargetTrace {
                            sources: &mapping.names,
                            source_world: world,
                            target_parent_world: parent_world,
                            local: rotation,
                        },
                    );

                    Transform::new(translation, rotation)
                }
                None => joint.rest_transform,
            };

            target_worlds[j] = normalize_or_identity(multiply(parent_world, local.rotation));
            animation.tracks[j].push(time, local);
        }
    }

    animation.validate().map_err(RetargetError::Validation)?;
    Ok(animation)
}

/// The number of output keyframes for an animation lasting `duration` seconds.
pub fn key_count(duration: f32, sample_rate: f32) -> usize {
    let count = (duration * sample_rate).floor();
    if count.is_finite() && count > 0.0 {
        (count as usize + 1).max(2)
    } else {
        2
    }
}

fn resolve_mapping(mapper: &BoneMapper, target: &str) -> ResolvedMapping {
    let Some(mapping) = mapper.mapping(target) else {
        return ResolvedMapping {
            source: JointSource::Rest,
            correction: None,
            names: Vec::new(),
        };
    };

    let mut names = Vec::new();
    let mut bones = Vec::new();
    for name in mapping.source.names() {
        match mapper.source_bone_index(name) {
            Some(bone) => {
                names.push(name.clone());
                bones.push(bone);
            }
            None => tracing::warn!(
                "source joint {:?} for target {:?} is not in the source skeleton",
                name,
                target
            ),
        }
    }

    let source = match bones[..] {
        [] => JointSource::Rest,
        [bone] => JointSource::Single(bone),
        _ => JointSource::Combined(bones),
    };

    ResolvedMapping {
        source,
        correction: mapping.correction,
        names,
    }
}

// The product of the local rotations placed under the first joint's parent.
fn combined_world(
    skeleton: &SkeletonData,
    locals: &[Transform],
    worlds: &[Quat],
    bones: &[usize],
) -> (Quat, Vec3) {
    let rotations: Vec<_> = bones.iter().map(|b| locals[*b].rotation).collect();
    let combined = BoneMapper::combine_rotations(&rotations);

    let first = bones[0];
    let parent_world = skeleton.joints[first]
        .parent_index
        .map(|p| worlds[p])
        .unwrap_or(Quat::IDENTITY);
    (
        normalize_or_identity(multiply(parent_world, combined)),
        locals[first].translation,
    )
}
