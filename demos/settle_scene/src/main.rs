use argh::FromArgs;
use std::path::PathBuf;

use scenephys::forces::FeedbackForceMode;
use scenephys::k3d::io::pcd;
use scenephys::sim::{SimulationConfig, SimulationDriver, TrackedObject};

#[derive(FromArgs)]
/// Settle objects onto an observed scene with feedback forces
struct Args {
    /// path to the scene point cloud (.pcd)
    #[argh(option)]
    scene_path: PathBuf,

    /// directory holding one <model>.pcd per object type
    #[argh(option)]
    model_dir: PathBuf,

    /// json file with the objects and their initial poses
    #[argh(option)]
    objects_path: PathBuf,

    /// optional json simulation config
    #[argh(option)]
    config_path: Option<PathBuf>,

    /// override the feedback mode: closest_point, frame_by_frame_icp or cached_icp
    #[argh(option)]
    mode: Option<FeedbackForceMode>,

    /// write the final poses as json to this file
    #[argh(option)]
    output_path: Option<PathBuf>,

    /// log per step diagnostics
    #[argh(switch)]
    debug: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let mut config = match &args.config_path {
        Some(path) => SimulationConfig::from_json_file(path)?,
        None => SimulationConfig::default(),
    };
    if let Some(mode) = args.mode {
        config.feedback_mode = mode;
    }

    let scene = pcd::read_pcd(&args.scene_path)?;
    println!("Scene cloud: #{} points", scene.len());

    let objects: Vec<TrackedObject> =
        serde_json::from_reader(std::fs::File::open(&args.objects_path)?)?;
    println!("Objects: #{}", objects.len());

    let mut driver = SimulationDriver::from_config(&config)?;
    driver.set_debug_mode(args.debug);

    let generator = driver.generator_mut();
    generator.set_model_directory(&args.model_dir)?;
    for object in &objects {
        if !generator.models().contains(&object.model_name) {
            generator.load_model_cloud(&object.model_name)?;
        }
    }
    generator.set_scene_data(scene);

    driver.add_objects(objects)?;

    let report = driver.simulate()?;
    println!(
        "Simulation finished after {} steps, steady: {}",
        report.steps, report.reached_steady_state
    );
    for (label, pose) in &report.poses {
        let confidence = report.confidences.get(label).copied().unwrap_or(0.0);
        println!(
            "{label}: translation {:?} rotation {:?} confidence {:.3}",
            pose.translation.to_array(),
            pose.rotation.to_array(),
            confidence
        );
    }

    if let Some(path) = &args.output_path {
        std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
        println!("Report written to {}", path.display());
    }

    Ok(())
}
