//! Skeletons with named joints, parent links, and rest poses.
//!
//! [SkeletonData] is the skeleton representation shared by clip import and retargeting.
//! Joints may be stored in any order as long as the parent links form a single tree.
//! Use [SkeletonData::evaluation_order] to visit parents before their children.
use gla_lib::hierarchy::{evaluation_order, HierarchyError};
use gla_lib::Transform;
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A named joint with its rest pose relative to its parent.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct JointData {
    pub name: String,
    /// The index of the parent joint or `None` for the root.
    pub parent_index: Option<usize>,
    pub rest_transform: Transform,
}

/// An ordered collection of joints forming a single hierarchy.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SkeletonData {
    pub joints: Vec<JointData>,
}

/// Errors for skeletons that do not form a single tree.
#[derive(Debug, Error)]
pub enum SkeletonError {
    #[error("skeleton has no joints")]
    Empty,

    #[error("skeleton has no root joint")]
    NoRoot,

    #[error("skeleton has {} root joints {:?} but exactly one is required", .roots.len(), .roots)]
    MultipleRoots { roots: Vec<String> },

    #[error("joint {joint:?} has parent index {parent} but there are only {count} joints")]
    InvalidParent {
        joint: String,
        parent: usize,
        count: usize,
    },

    #[error("joint {joint:?} is its own ancestor")]
    Cycle { joint: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl SkeletonData {
    /// Checks that the joints form a single tree with no cycles.
    pub fn validate(&self) -> Result<(), SkeletonError> {
        if self.joints.is_empty() {
            return Err(SkeletonError::Empty);
        }

        self.evaluation_order()?;

        let roots: Vec<_> = self
            .joints
            .iter()
            .filter(|j| j.parent_index.is_none())
            .map(|j| j.name.clone())
            .collect();
        match roots.len() {
            0 => Err(SkeletonError::NoRoot),
            1 => Ok(()),
            _ => Err(SkeletonError::MultipleRoots { roots }),
        }
    }

    /// Joint indices ordered so that every parent precedes its children.
    pub fn evaluation_order(&self) -> Result<Vec<usize>, SkeletonError> {
        let parents: Vec<_> = self.joints.iter().map(|j| j.parent_index).collect();
        evaluation_order(&parents).map_err(|e| match e {
            HierarchyError::InvalidParent {
                index,
                parent,
                count,
            } => SkeletonError::InvalidParent {
                joint: self.joints[index].name.clone(),
                parent,
                count,
            },
            HierarchyError::Cycle { index } => SkeletonError::Cycle {
                joint: self.joints[index].name.clone(),
            },
        })
    }

    /// The index of the first joint without a parent.
    pub fn root_index(&self) -> Option<usize> {
        self.joints.iter().position(|j| j.parent_index.is_none())
    }

    /// The index of the first joint named `name`.
    pub fn joint_index(&self, name: &str) -> Option<usize> {
        self.joints.iter().position(|j| j.name == name)
    }

    pub fn joint_names(&self) -> Vec<String> {
        self.joints.iter().map(|j| j.name.clone()).collect()
    }

    /// The rest pose local transform for each joint.
    pub fn rest_pose(&self) -> Vec<Transform> {
        self.joints.iter().map(|j| j.rest_transform).collect()
    }

    pub fn num_joints(&self) -> usize {
        self.joints.len()
    }
}

#[cfg(feature = "serde")]
impl SkeletonData {
    /// Reads and validates a skeleton stored as JSON.
    pub fn from_json_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, SkeletonError> {
        let text = std::fs::read_to_string(path)?;
        let skeleton: Self = serde_json::from_str(&text)?;
        skeleton.validate()?;
        Ok(skeleton)
    }

    pub fn write_json_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), SkeletonError> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};

    fn joint(name: &str, parent_index: Option<usize>) -> JointData {
        JointData {
            name: name.to_string(),
            parent_index,
            rest_transform: Transform::new(Vec3::Y, Quat::IDENTITY),
        }
    }

    #[test]
    fn validate_single_root() {
        let skeleton = SkeletonData {
            joints: vec![joint("root", None), joint("a", Some(0)), joint("b", Some(1))],
        };
        skeleton.validate().unwrap();
        assert_eq!(Some(0), skeleton.root_index());
        assert_eq!(vec![0, 1, 2], skeleton.evaluation_order().unwrap());
    }

    #[test]
    fn validate_children_before_parents() {
        let skeleton = SkeletonData {
            joints: vec![joint("b", Some(1)), joint("a", Some(2)), joint("root", None)],
        };
        skeleton.validate().unwrap();
        assert_eq!(vec![2, 1, 0], skeleton.evaluation_order().unwrap());
    }

    #[test]
    fn validate_empty() {
        assert!(matches!(
            SkeletonData::default().validate(),
            Err(SkeletonError::Empty)
        ));
    }

    #[test]
    fn validate_multiple_roots() {
        let skeleton = SkeletonData {
            joints: vec![joint("a", None), joint("b", None)],
        };
        assert!(matches!(
            skeleton.validate(),
            Err(SkeletonError::MultipleRoots { roots }) if roots == ["a", "b"]
        ));
    }

    #[test]
    fn validate_no_root() {
        let skeleton = SkeletonData {
            joints: vec![joint("a", Some(1)), joint("b", Some(0))],
        };
        // Every joint without a root is part of a cycle.
        assert!(matches!(
            skeleton.validate(),
            Err(SkeletonError::Cycle { .. })
        ));
    }

    #[test]
    fn validate_cycle_with_root() {
        let skeleton = SkeletonData {
            joints: vec![joint("root", None), joint("a", Some(2)), joint("b", Some(1))],
        };
        assert!(matches!(
            skeleton.validate(),
            Err(SkeletonError::Cycle { .. })
        ));
    }

    #[test]
    fn validate_invalid_parent() {
        let skeleton = SkeletonData {
            joints: vec![joint("root", None), joint("a", Some(7))],
        };
        assert!(matches!(
            skeleton.validate(),
            Err(SkeletonError::InvalidParent { joint, parent: 7, count: 2 }) if joint == "a"
        ));
    }

    #[test]
    fn joint_lookup() {
        let skeleton = SkeletonData {
            joints: vec![joint("root", None), joint("a", Some(0))],
        };
        assert_eq!(Some(1), skeleton.joint_index("a"));
        assert_eq!(None, skeleton.joint_index("c"));
        assert_eq!(vec!["root", "a"], skeleton.joint_names());
        assert_eq!(2, skeleton.rest_pose().len());
    }
}
