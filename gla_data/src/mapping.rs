//! Declarative bone mappings from target skeleton joints to source skeleton joints.
//!
//! Mappings are stored as JSON with a top level `mappings` array.
/*!
```json
{
  "mappings": [
    { "target": "Hips", "source": "pelvis" },
    { "target": "Spine", "source": ["lower_lumbar", "upper_lumbar"] },
    { "target": "LeftArm", "source": "lhumerus", "correction_axis_angle": [90, 0, 0, 1] },
    { "target": "HeadTop_End", "source": null }
  ]
}
```
*/
//! A `source` may be missing or `null` for unmapped joints,
//! a string for a single source joint, or an array of strings to combine several source joints.
//! Combined rotations are multiplied in array order.
//!
//! Invalid entries are skipped with a warning instead of failing the whole file.
use std::path::Path;

use ahash::AHashMap;
use glam::{Quat, Vec3};
use serde_json::Value;
use thiserror::Error;

use gla_lib::math::from_axis_angle_degrees;

/// The source joints driving a target joint.
#[derive(Debug, Clone, PartialEq)]
pub enum MappingSource {
    /// The target joint keeps its rest pose.
    Unmapped,
    Single(String),
    /// Source joints whose local rotations are multiplied in order.
    Combined(Vec<String>),
}

impl MappingSource {
    fn from_names(mut names: Vec<String>) -> Self {
        match names.len() {
            0 => Self::Unmapped,
            1 => Self::Single(names.remove(0)),
            _ => Self::Combined(names),
        }
    }

    /// The source joint names in order.
    pub fn names(&self) -> &[String] {
        match self {
            MappingSource::Unmapped => &[],
            MappingSource::Single(name) => std::slice::from_ref(name),
            MappingSource::Combined(names) => names,
        }
    }
}

/// The mapping for a single target joint.
#[derive(Debug, Clone, PartialEq)]
pub struct BoneMapping {
    pub target: String,
    pub source: MappingSource,
    /// A rotation applied on the right of the resolved source world rotation.
    pub correction: Option<Quat>,
}

impl BoneMapping {
    pub fn is_unmapped(&self) -> bool {
        self.source == MappingSource::Unmapped
    }

    pub fn is_combined(&self) -> bool {
        matches!(self.source, MappingSource::Combined(_))
    }
}

/// Errors while loading a mapping config.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("mapping config must contain a \"mappings\" array")]
    MissingMappings,

    #[error("none of the {count} mapping entries are valid")]
    NoValidMappings { count: usize },
}

/// Bone mappings with name lookups for the source and target skeletons.
#[derive(Debug, Clone, Default)]
pub struct BoneMapper {
    mappings: Vec<BoneMapping>,
    source_bone_map: AHashMap<String, usize>,
    target_bone_map: AHashMap<String, usize>,
}

impl BoneMapper {
    pub fn new(mappings: Vec<BoneMapping>) -> Self {
        Self {
            mappings,
            ..Default::default()
        }
    }

    /// Reads the mapping config at `path`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, MappingError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let mapper = Self::from_json_str(&text)?;
        tracing::info!(
            "loaded {} bone mappings from {:?}",
            mapper.mappings.len(),
            path.as_ref()
        );
        Ok(mapper)
    }

    /// Parses a mapping config from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, MappingError> {
        let config: Value = serde_json::from_str(text)?;
        let entries = config
            .get("mappings")
            .and_then(Value::as_array)
            .ok_or(MappingError::MissingMappings)?;

        let mappings: Vec<_> = entries
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| parse_mapping(i, entry))
            .collect();

        if !entries.is_empty() && mappings.is_empty() {
            return Err(MappingError::NoValidMappings {
                count: entries.len(),
            });
        }

        Ok(Self::new(mappings))
    }

    /// The first mapping for `target`.
    pub fn mapping(&self, target: &str) -> Option<&BoneMapping> {
        self.mappings.iter().find(|m| m.target == target)
    }

    pub fn mappings(&self) -> &[BoneMapping] {
        &self.mappings
    }

    /// Indexes the source skeleton's joint names.
    /// Later duplicates replace earlier names.
    pub fn build_source_bone_map<S: AsRef<str>>(&mut self, names: &[S]) {
        self.source_bone_map = index_map(names);
    }

    /// Indexes the target skeleton's joint names.
    /// Later duplicates replace earlier names.
    pub fn build_target_bone_map<S: AsRef<str>>(&mut self, names: &[S]) {
        self.target_bone_map = index_map(names);
    }

    /// The source joint index for `name` or `None` if the name is not in the source skeleton.
    pub fn source_bone_index(&self, name: &str) -> Option<usize> {
        self.source_bone_map.get(name).copied()
    }

    /// The target joint index for `name` or `None` if the name is not in the target skeleton.
    pub fn target_bone_index(&self, name: &str) -> Option<usize> {
        self.target_bone_map.get(name).copied()
    }

    /// Multiplies `rotations` in order. See [gla_lib::math::combine_rotations].
    pub fn combine_rotations(rotations: &[Quat]) -> Quat {
        gla_lib::math::combine_rotations(rotations)
    }
}

fn index_map<S: AsRef<str>>(names: &[S]) -> AHashMap<String, usize> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_ref().to_string(), i))
        .collect()
}

fn parse_mapping(index: usize, entry: &Value) -> Option<BoneMapping> {
    let Some(target) = entry.get("target").and_then(Value::as_str) else {
        tracing::warn!("skipping mapping {}: missing \"target\" string", index);
        return None;
    };

    let source = match entry.get("source") {
        None | Some(Value::Null) => MappingSource::Unmapped,
        Some(Value::String(name)) => MappingSource::Single(name.clone()),
        Some(Value::Array(values)) => {
            let names = values
                .iter()
                .filter_map(|v| match v.as_str() {
                    Some(name) => Some(name.to_string()),
                    None => {
                        tracing::warn!("ignoring non string source {} for {:?}", v, target);
                        None
                    }
                })
                .collect();
            MappingSource::from_names(names)
        }
        Some(other) => {
            tracing::warn!("invalid source {} for {:?}, leaving it unmapped", other, target);
            MappingSource::Unmapped
        }
    };

    let correction = entry
        .get("correction_axis_angle")
        .and_then(|value| {
            let correction = parse_correction(value);
            if correction.is_none() {
                tracing::warn!("ignoring invalid correction {} for {:?}", value, target);
            }
            correction
        });

    Some(BoneMapping {
        target: target.to_string(),
        source,
        correction,
    })
}

// [angle_degrees, axis_x, axis_y, axis_z]
fn parse_correction(value: &Value) -> Option<Quat> {
    let values: Vec<_> = value
        .as_array()?
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect::<Option<_>>()?;
    match values[..] {
        [degrees, x, y, z] => Some(from_axis_angle_degrees(degrees, Vec3::new(x, y, z))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_source_variants() {
        let mapper = BoneMapper::from_json_str(
            r#"{
                "mappings": [
                    { "target": "Hips", "source": "pelvis" },
                    { "target": "Spine", "source": ["lower_lumbar", "upper_lumbar"] },
                    { "target": "Neck", "source": ["cervical"] },
                    { "target": "Head", "source": [] },
                    { "target": "HeadTop_End", "source": null },
                    { "target": "LeftEye" },
                    { "target": "RightEye", "source": 5 }
                ]
            }"#,
        )
        .unwrap();

        let sources: Vec<_> = mapper.mappings().iter().map(|m| m.source.clone()).collect();
        assert_eq!(
            vec![
                MappingSource::Single("pelvis".to_string()),
                MappingSource::Combined(vec![
                    "lower_lumbar".to_string(),
                    "upper_lumbar".to_string()
                ]),
                MappingSource::Single("cervical".to_string()),
                MappingSource::Unmapped,
                MappingSource::Unmapped,
                MappingSource::Unmapped,
                MappingSource::Unmapped,
            ],
            sources
        );
        assert!(mapper.mapping("Spine").unwrap().is_combined());
        assert!(mapper.mapping("Head").unwrap().is_unmapped());
        assert!(mapper.mapping("Hand").is_none());
    }

    #[test]
    fn skip_entries_without_target() {
        let mapper = BoneMapper::from_json_str(
            r#"{ "mappings": [ { "source": "pelvis" }, { "target": 3 }, { "target": "Hips" } ] }"#,
        )
        .unwrap();
        assert_eq!(1, mapper.mappings().len());
        assert_eq!("Hips", mapper.mappings()[0].target);
    }

    #[test]
    fn non_string_sources_are_ignored() {
        let mapper = BoneMapper::from_json_str(
            r#"{ "mappings": [ { "target": "Spine", "source": ["a", 1, null, "b"] } ] }"#,
        )
        .unwrap();
        assert_eq!(
            &["a".to_string(), "b".to_string()],
            mapper.mappings()[0].source.names()
        );
    }

    #[test]
    fn parse_correction_axis_angle() {
        let mapper = BoneMapper::from_json_str(
            r#"{ "mappings": [
                { "target": "LeftArm", "source": "lhumerus", "correction_axis_angle": [90, 0, 0, 2] },
                { "target": "RightArm", "source": "rhumerus", "correction_axis_angle": [90, 0, 1] },
                { "target": "Spine", "source": "lumbar", "correction_axis_angle": "90" }
            ] }"#,
        )
        .unwrap();

        let correction = mapper.mapping("LeftArm").unwrap().correction.unwrap();
        let half = std::f32::consts::FRAC_1_SQRT_2;
        assert_relative_eq!(0.0, correction.x, epsilon = 1e-6);
        assert_relative_eq!(0.0, correction.y, epsilon = 1e-6);
        assert_relative_eq!(half, correction.z, epsilon = 1e-6);
        assert_relative_eq!(half, correction.w, epsilon = 1e-6);

        assert_eq!(None, mapper.mapping("RightArm").unwrap().correction);
        assert_eq!(None, mapper.mapping("Spine").unwrap().correction);
    }

    #[test]
    fn missing_mappings() {
        assert!(matches!(
            BoneMapper::from_json_str(r#"{ "bones": [] }"#),
            Err(MappingError::MissingMappings)
        ));
        assert!(matches!(
            BoneMapper::from_json_str(r#"{ "mappings": {} }"#),
            Err(MappingError::MissingMappings)
        ));
    }

    #[test]
    fn no_valid_mappings() {
        assert!(matches!(
            BoneMapper::from_json_str(r#"{ "mappings": [ {}, { "target": null } ] }"#),
            Err(MappingError::NoValidMappings { count: 2 })
        ));
        // An empty array is still a valid config.
        assert!(BoneMapper::from_json_str(r#"{ "mappings": [] }"#)
            .unwrap()
            .mappings()
            .is_empty());
    }

    #[test]
    fn invalid_json() {
        assert!(matches!(
            BoneMapper::from_json_str("{ mappings"),
            Err(MappingError::Json(_))
        ));
    }

    #[test]
    fn bone_maps() {
        let mut mapper = BoneMapper::default();
        mapper.build_source_bone_map(&["pelvis", "lumbar"]);
        mapper.build_target_bone_map(&vec!["Hips".to_string()]);

        assert_eq!(Some(1), mapper.source_bone_index("lumbar"));
        assert_eq!(None, mapper.source_bone_index("Hips"));
        assert_eq!(Some(0), mapper.target_bone_index("Hips"));
        assert_eq!(None, mapper.target_bone_index("pelvis"));
    }

    #[test]
    fn combine_rotations_in_order() {
        let a = Quat::from_rotation_x(0.5);
        let b = Quat::from_rotation_y(0.25);
        assert!(BoneMapper::combine_rotations(&[a, b]).abs_diff_eq(a * b, 1e-6));
        assert_eq!(Quat::IDENTITY, BoneMapper::combine_rotations(&[]));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapping.json");
        std::fs::write(&path, r#"{ "mappings": [ { "target": "Hips", "source": "pelvis" } ] }"#)
            .unwrap();
        let mapper = BoneMapper::from_file(&path).unwrap();
        assert_eq!(1, mapper.mappings().len());

        assert!(matches!(
            BoneMapper::from_file(dir.path().join("missing.json")),
            Err(MappingError::Io(_))
        ));
    }
}
