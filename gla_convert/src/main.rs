use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use gla_data::anim_data::AnimationData;
use gla_data::clip_data::{ClipDefinition, ClipList};
use gla_data::hierarchy::BoneTransformReport;
use gla_data::import::{clip_frame_rate, import_clips, skeleton_from_gla};
use gla_data::mapping::BoneMapper;
use gla_data::retarget::{retarget, DEFAULT_SAMPLE_RATE};
use gla_data::skel_data::SkeletonData;
use gla_data::trace::{JointTrace, NoTrace, Trace};
use gla_lib::Gla;

/// Convert GLA animations to JSON skeletons and animations and retarget them.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Log intermediate values for this joint. Can be repeated.
    #[arg(long, global = true)]
    trace_joint: Vec<String>,

    /// Only log traced values for this frame
    #[arg(long, global = true)]
    trace_frame: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the GLA bind pose as a skeleton JSON file
    Skeleton {
        /// The input GLA file
        gla: PathBuf,

        /// The output skeleton JSON file
        output: PathBuf,
    },

    /// List the clip definitions for a GLA file
    Clips {
        /// The input GLA file
        gla: PathBuf,

        /// The clip definitions (default: animation.cfg next to the GLA)
        #[arg(long)]
        cfg: Option<PathBuf>,
    },

    /// Import clips as animation JSON files
    Import {
        /// The input GLA file
        gla: PathBuf,

        /// The folder for skeleton.json and one JSON file per clip
        output_dir: PathBuf,

        /// The clip definitions (default: animation.cfg next to the GLA)
        #[arg(long)]
        cfg: Option<PathBuf>,

        /// Only import this clip. Can be repeated.
        #[arg(long = "clip")]
        clips: Vec<String>,

        /// The frame rate for clips without a positive fps
        #[arg(long, default_value_t = 0.0)]
        sampling_rate: f32,
    },

    /// Retarget an animation onto a different skeleton
    Retarget {
        /// The source animation JSON file
        #[arg(long)]
        source_anim: PathBuf,

        /// The source skeleton JSON file
        #[arg(long)]
        source_skeleton: PathBuf,

        /// The target skeleton JSON file
        #[arg(long)]
        target_skeleton: PathBuf,

        /// The bone mapping JSON file
        #[arg(long)]
        config: PathBuf,

        /// The output animation JSON file
        #[arg(long)]
        output: PathBuf,

        /// Output keyframes per second
        #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE)]
        sample_rate: f32,

        /// Log rest poses and the first frame of every mapped joint
        #[arg(long)]
        debug: bool,
    },

    /// Show how a bone's animated transform is computed for a frame
    Trace {
        /// The input GLA file
        gla: PathBuf,

        #[arg(long)]
        frame: usize,

        /// The bone name
        #[arg(long)]
        bone: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let debug = !cli.trace_joint.is_empty()
        || matches!(cli.command, Commands::Retarget { debug: true, .. });
    init_logging(debug);

    let mut joint_trace = JointTrace::new(cli.trace_joint.iter().cloned());
    if let Some(frame) = cli.trace_frame {
        joint_trace = joint_trace.with_frame(frame);
    }
    let trace: &dyn Trace = if cli.trace_joint.is_empty() {
        &NoTrace
    } else {
        &joint_trace
    };

    let start = std::time::Instant::now();
    match cli.command {
        Commands::Skeleton { gla, output } => {
            let gla = read_gla(&gla)?;
            let skeleton = skeleton_from_gla(&gla, trace)?;
            skeleton
                .write_json_file(&output)
                .with_context(|| format!("failed to write {output:?}"))?;
        }
        Commands::Clips { gla, cfg } => {
            let clips = read_clips(&gla, cfg.as_deref())?;
            for clip in &clips.clips {
                println!(
                    "{:<32} start {:>6} frames {:>5} loop {:>5} fps {:>6} duration {:.3}s",
                    clip.name,
                    clip.start_frame,
                    clip.frame_count,
                    clip.loop_frame.map(|f| f as i64).unwrap_or(-1),
                    clip.fps,
                    clip.duration_at(clip_frame_rate(clip, 0.0))
                );
            }
        }
        Commands::Import {
            gla,
            output_dir,
            cfg,
            clips,
            sampling_rate,
        } => {
            let clip_list = read_clips(&gla, cfg.as_deref())?;
            let gla = read_gla(&gla)?;
            let selected = select_clips(&clip_list, &clips)?;
            import(&gla, &selected, &output_dir, sampling_rate, trace)?;
        }
        Commands::Retarget {
            source_anim,
            source_skeleton,
            target_skeleton,
            config,
            output,
            sample_rate,
            debug,
        } => {
            let source_animation = AnimationData::from_json_file(&source_anim)
                .with_context(|| format!("failed to read animation {source_anim:?}"))?;
            let source_skeleton = SkeletonData::from_json_file(&source_skeleton)
                .with_context(|| format!("failed to read skeleton {source_skeleton:?}"))?;
            let target_skeleton = SkeletonData::from_json_file(&target_skeleton)
                .with_context(|| format!("failed to read skeleton {target_skeleton:?}"))?;
            let mut mapper = BoneMapper::from_file(&config)
                .with_context(|| format!("failed to read bone mappings {config:?}"))?;

            // Trace every mapped joint for the first frame unless specific joints were requested.
            let debug_trace;
            let trace: &dyn Trace = if debug && cli.trace_joint.is_empty() {
                debug_trace =
                    JointTrace::new(mapper.mappings().iter().map(|m| m.target.clone())).with_frame(0);
                log_rest_poses("source", &source_skeleton);
                log_rest_poses("target", &target_skeleton);
                &debug_trace
            } else {
                trace
            };

            let animation = retarget(
                &source_skeleton,
                &source_animation,
                &target_skeleton,
                &mut mapper,
                sample_rate,
                trace,
            )?;
            animation
                .write_json_file(&output)
                .with_context(|| format!("failed to write {output:?}"))?;
            tracing::info!(
                "saved {:?} with {} tracks over {} seconds",
                output,
                animation.num_tracks(),
                animation.duration
            );
        }
        Commands::Trace { gla, frame, bone } => {
            let gla = read_gla(&gla)?;
            let index = gla
                .bone_index(&bone)
                .with_context(|| format!("bone {bone:?} not found"))?;
            let report = BoneTransformReport::new(&gla, frame, index)?;
            println!("{report:#?}");
        }
    }

    tracing::info!("finished in {:?}", start.elapsed());
    Ok(())
}

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .init();
}

fn read_gla(path: &Path) -> Result<Gla> {
    Gla::from_file(path).with_context(|| format!("failed to read GLA {path:?}"))
}

fn read_clips(gla: &Path, cfg: Option<&Path>) -> Result<ClipList> {
    let clips = match cfg {
        Some(cfg) => ClipList::from_file(cfg),
        None => ClipList::from_gla_directory(gla),
    };
    clips.with_context(|| format!("failed to load clip definitions for {gla:?}"))
}

fn select_clips(clips: &ClipList, names: &[String]) -> Result<Vec<ClipDefinition>> {
    if names.is_empty() {
        return Ok(clips.clips.clone());
    }

    names
        .iter()
        .map(|name| {
            clips
                .find(name)
                .cloned()
                .with_context(|| format!("clip {name:?} not found"))
        })
        .collect()
}

fn import(
    gla: &Gla,
    clips: &[ClipDefinition],
    output_dir: &Path,
    sampling_rate: f32,
    trace: &dyn Trace,
) -> Result<()> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create {output_dir:?}"))?;

    let skeleton = skeleton_from_gla(gla, trace)?;
    let skeleton_path = output_dir.join("skeleton.json");
    skeleton
        .write_json_file(&skeleton_path)
        .with_context(|| format!("failed to write {skeleton_path:?}"))?;

    let mut failed = 0;
    for (clip, result) in clips
        .iter()
        .zip(import_clips(gla, clips, &skeleton, sampling_rate, trace))
    {
        match result {
            Ok(animation) => {
                let path = output_dir.join(format!("{}.json", clip.name));
                animation
                    .write_json_file(&path)
                    .with_context(|| format!("failed to write {path:?}"))?;
            }
            Err(e) => {
                tracing::error!("failed to import clip {:?}: {}", clip.name, e);
                failed += 1;
            }
        }
    }

    tracing::info!("imported {} of {} clips", clips.len() - failed, clips.len());
    if failed > 0 {
        bail!("{failed} clips failed to import");
    }
    Ok(())
}

fn log_rest_poses(label: &str, skeleton: &SkeletonData) {
    for (i, joint) in skeleton.joints.iter().enumerate() {
        tracing::debug!(
            "{} [{}] {} (parent {:?}): {:?}",
            label,
            i,
            joint.name,
            joint.parent_index,
            joint.rest_transform.rotation
        );
    }
}
