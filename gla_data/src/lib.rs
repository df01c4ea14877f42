//! # gla_data
//!
//! gla_data converts GLA animation files into a generic skeleton and keyframed animation representation
//! and retargets those animations onto skeletons with different hierarchies.
//!
//! ## Features
//! - Skeletons with rest poses imported from the GLA bind pose
//! - Named clips from `animation.cfg` files imported as [AnimationData](anim_data::AnimationData)
//! - Conversion from the GLA Z-up coordinate system to Y-up in meters
//! - World space rotation retargeting driven by JSON bone mappings
//! - Optional per joint diagnostics with the [Trace](trace::Trace) trait
//!
//! ## Getting Started
//! The easiest way to access important items is to import the [prelude].
/*!
```no_run
use gla_data::prelude::*;

# fn main() -> Result<(), Box<dyn std::error::Error>> {
let gla = Gla::from_file("humanoid.gla")?;
let clips = ClipList::from_gla_directory("humanoid.gla")?;

let skeleton = skeleton_from_gla(&gla, &NoTrace)?;
for clip in &clips.clips {
    let animation = import_clip(&gla, clip, &skeleton, 0.0, &NoTrace)?;
    println!("{}: {} seconds", animation.name, animation.duration);
}
# Ok(())
# }
```
 */
pub mod anim_data;
pub mod clip_data;
pub mod coordinates;
pub mod hierarchy;
pub mod import;
pub mod mapping;
pub mod retarget;
pub mod skel_data;
pub mod trace;

pub mod prelude {
    pub use crate::anim_data::AnimationData;
    pub use crate::clip_data::{ClipDefinition, ClipList};
    pub use crate::import::{import_clip, import_clips, skeleton_from_gla};
    pub use crate::mapping::BoneMapper;
    pub use crate::retarget::retarget;
    pub use crate::skel_data::SkeletonData;
    pub use crate::trace::{JointTrace, NoTrace, Trace};
    pub use gla_lib::{Gla, Transform};
}
