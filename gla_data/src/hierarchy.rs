//! Animated bone transforms for GLA frames.
//!
//! Each frame's sample for a bone is a delta applied in the parent's animated space.
//! The bone matrix accumulates these deltas from the root down:
//! `bone_matrix(bone) = bone_matrix(parent) * delta(bone)`.
//! The animated model space transform is then `bone_matrix(bone) * bind_pose(bone)`.
//!
//! [FramePose] evaluates every bone matrix for one frame in a single pass with parents before children,
//! so querying many bones of the same frame does not recompute their ancestors.
use glam::{Affine3A, Quat, Vec3};

use gla_lib::math::{normalize_or_identity, world_to_local};
use gla_lib::matrix::decompose_affine;
use gla_lib::{Gla, GlaError, Transform};

/// The bone matrices for every bone of a single frame.
#[derive(Debug, Clone)]
pub struct FramePose<'a> {
    gla: &'a Gla,
    frame: usize,
    bone_matrices: Vec<Affine3A>,
}

impl<'a> FramePose<'a> {
    /// Evaluates the bone matrices for `frame`.
    pub fn new(gla: &'a Gla, frame: usize) -> Result<Self, GlaError> {
        let mut bone_matrices = vec![Affine3A::IDENTITY; gla.bone_count()];
        for &bone in gla.evaluation_order() {
            let (translation, rotation) = gla.bone_transform(frame, bone)?;
            let delta = Affine3A::from_rotation_translation(rotation, translation);
            // Roots have no implicit global transform.
            bone_matrices[bone] = match gla.parent_index(bone) {
                Some(parent) => bone_matrices[parent] * delta,
                None => delta,
            };
        }

        Ok(Self {
            gla,
            frame,
            bone_matrices,
        })
    }

    pub fn frame(&self) -> usize {
        self.frame
    }

    /// The accumulated animation matrix for `bone`.
    pub fn bone_matrix(&self, bone: usize) -> Result<Affine3A, GlaError> {
        self.bone_matrices
            .get(bone)
            .copied()
            .ok_or(GlaError::BoneOutOfRange {
                bone,
                bone_count: self.bone_matrices.len(),
            })
    }

    /// The animated model space transform matrix for `bone`.
    pub fn world_matrix(&self, bone: usize) -> Result<Affine3A, GlaError> {
        let base_pose = self.gla.bone(bone)?.base_pose.to_affine();
        Ok(self.bone_matrix(bone)? * base_pose)
    }

    /// The animated model space position and normalized rotation for `bone`.
    pub fn world_transform(&self, bone: usize) -> Result<(Vec3, Quat), GlaError> {
        let world = decompose_affine(&self.world_matrix(bone)?);
        Ok((world.translation, normalize_or_identity(world.rotation)))
    }

    /// The animated transform of `bone` relative to the animated transform of its GLA parent.
    /// Root bones return their model space transform.
    pub fn parent_space_transform(&self, bone: usize) -> Result<(Vec3, Quat), GlaError> {
        let (translation, rotation) = self.world_transform(bone)?;
        match self.gla.parent_index(bone) {
            Some(parent) => {
                let (parent_translation, parent_rotation) = self.world_transform(parent)?;
                Ok(world_to_local(
                    parent_translation,
                    parent_rotation,
                    translation,
                    rotation,
                ))
            }
            None => Ok((translation, rotation)),
        }
    }
}

/// The animated model space position and rotation of a single bone.
/// Use [FramePose] when querying more than one bone of the same frame.
pub fn animated_world_transform(
    gla: &Gla,
    frame: usize,
    bone: usize,
) -> Result<(Vec3, Quat), GlaError> {
    FramePose::new(gla, frame)?.world_transform(bone)
}

/// A breakdown of how a bone's animated transform is assembled for a single frame.
#[derive(Debug, Clone, PartialEq)]
pub struct BoneTransformReport {
    pub bone: usize,
    pub name: String,
    pub parent: Option<usize>,
    pub frame: usize,
    /// The decompressed sample for this frame.
    pub delta: Transform,
    /// The model space bind pose.
    pub bind_pose: Transform,
    /// The bind pose relative to the parent's bind pose.
    pub local_bind_pose: Transform,
    /// The animated model space transform.
    pub world: Transform,
    /// The animated transform relative to the animated parent.
    pub parent_space: Transform,
    /// The distance between the animated position and the position
    /// recomposed from the parent's world transform and [parent_space](#structfield.parent_space).
    pub recomposition_error: f32,
}

impl BoneTransformReport {
    pub fn new(gla: &Gla, frame: usize, bone: usize) -> Result<Self, GlaError> {
        let pose = FramePose::new(gla, frame)?;
        let (delta_translation, delta_rotation) = gla.bone_transform(frame, bone)?;
        let (world_translation, world_rotation) = pose.world_transform(bone)?;
        let (local_translation, local_rotation) = pose.parent_space_transform(bone)?;

        let parent = gla.parent_index(bone);
        let recomposed = match parent {
            Some(parent) => {
                let (t, r) = pose.world_transform(parent)?;
                t + gla_lib::math::rotate_vector(r, local_translation)
            }
            None => local_translation,
        };

        Ok(Self {
            bone,
            name: gla.bone(bone)?.name(),
            parent,
            frame,
            delta: Transform::new(delta_translation, delta_rotation),
            bind_pose: gla.bind_pose_transform(bone)?,
            local_bind_pose: gla.local_bind_pose_transform(bone)?,
            world: Transform::new(world_translation, world_rotation),
            parent_space: Transform::new(local_translation, local_rotation),
            recomposition_error: recomposed.distance(world_translation),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use gla_lib::compressed::CompressedBone;
    use gla_lib::{GlaBone, Matrix3x4};

    fn pose(translation: Vec3) -> Matrix3x4 {
        Matrix3x4::from_rotation_translation(Quat::IDENTITY, translation)
    }

    fn assert_vec3_eq(expected: Vec3, actual: Vec3) {
        assert_relative_eq!(expected.x, actual.x, epsilon = 1e-4);
        assert_relative_eq!(expected.y, actual.y, epsilon = 1e-4);
        assert_relative_eq!(expected.z, actual.z, epsilon = 1e-4);
    }

    // A chain root -> upper -> lower with the root turning half way around X in frame 1.
    fn chain() -> Gla {
        let bones = vec![
            GlaBone::new("lower", Some(2), pose(Vec3::new(0.0, 0.0, 20.0))),
            GlaBone::new("root", None, pose(Vec3::ZERO)),
            GlaBone::new("upper", Some(1), pose(Vec3::new(0.0, 0.0, 10.0))),
        ];
        let turn = CompressedBone::compress(Vec3::ZERO, Quat::from_xyzw(1.0, 0.0, 0.0, 0.0));
        let lift = CompressedBone::compress(Vec3::new(0.0, 0.0, 1.0), Quat::IDENTITY);
        Gla::new(
            "chain",
            bones,
            2,
            &[0, 0, 0, 0, 1, 2],
            vec![CompressedBone::IDENTITY, turn, lift],
        )
        .unwrap()
    }

    #[test]
    fn identity_frame_is_bind_pose() {
        let gla = chain();
        let pose = FramePose::new(&gla, 0).unwrap();
        for bone in 0..3 {
            let (translation, rotation) = pose.world_transform(bone).unwrap();
            assert_eq!(gla.bind_pose_position(bone).unwrap(), translation);
            assert_eq!(Quat::IDENTITY, rotation);
        }
    }

    #[test]
    fn root_rotation_moves_children() {
        let gla = chain();
        let pose = FramePose::new(&gla, 1).unwrap();
        let half_turn = Quat::from_xyzw(1.0, 0.0, 0.0, 0.0);

        // The upper delta translates along the rotated parent axis.
        let matrix = pose.bone_matrix(2).unwrap();
        assert_vec3_eq(Vec3::new(0.0, 0.0, -1.0), Vec3::from(matrix.translation));

        let (translation, rotation) = pose.world_transform(2).unwrap();
        assert_vec3_eq(Vec3::new(0.0, 0.0, -11.0), translation);
        assert!(rotation.abs_diff_eq(half_turn, 1e-5));

        let (translation, rotation) = pose.world_transform(0).unwrap();
        assert_vec3_eq(Vec3::new(0.0, 0.0, -21.0), translation);
        assert!(rotation.abs_diff_eq(half_turn, 1e-5));

        let (translation, _) = pose.world_transform(1).unwrap();
        assert_vec3_eq(Vec3::ZERO, translation);
    }

    #[test]
    fn single_query_matches_frame_pose() {
        let gla = chain();
        let pose = FramePose::new(&gla, 1).unwrap();
        for bone in [2, 0, 1] {
            assert_eq!(
                pose.world_transform(bone).unwrap(),
                animated_world_transform(&gla, 1, bone).unwrap()
            );
        }
    }

    #[test]
    fn parent_space_transform_of_child() {
        let gla = chain();
        let pose = FramePose::new(&gla, 1).unwrap();
        let (translation, rotation) = pose.parent_space_transform(0).unwrap();
        assert_vec3_eq(Vec3::new(0.0, 0.0, 10.0), translation);
        assert!(rotation.abs_diff_eq(Quat::IDENTITY, 1e-4));
    }

    #[test]
    fn bone_out_of_range() {
        let gla = chain();
        let pose = FramePose::new(&gla, 0).unwrap();
        assert!(matches!(
            pose.world_transform(3),
            Err(GlaError::BoneOutOfRange { bone: 3, .. })
        ));
        assert!(matches!(
            FramePose::new(&gla, 2),
            Err(GlaError::FrameOutOfRange { frame: 2, .. })
        ));
    }

    #[test]
    fn report_recomposes_world_position() {
        let gla = chain();
        let report = BoneTransformReport::new(&gla, 1, 0).unwrap();
        assert_eq!("lower", report.name);
        assert_eq!(Some(2), report.parent);
        assert_eq!(Quat::IDENTITY, report.delta.rotation);
        assert_vec3_eq(Vec3::new(0.0, 0.0, 20.0), report.bind_pose.translation);
        assert_vec3_eq(Vec3::new(0.0, 0.0, 10.0), report.local_bind_pose.translation);
        assert_relative_eq!(0.0, report.recomposition_error, epsilon = 1e-4);
    }
}
