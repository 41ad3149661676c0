use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, Instant};

use vo_fuser::fuser::FuserEvent;
use vo_fuser::live_status::{current_timestamp, LiveStatus};
use vo_fuser::session::{SessionFrame, SessionLog};
use vo_fuser::trackers::{self, Dropout, SimulatedCamera, SimulatedSecondary, Trajectory};
use vo_fuser::{ChannelSink, FuserConfig, Pipeline, PipelineConfig, Pose, PublishedPose, TimedPose};

#[derive(Parser, Debug)]
#[command(name = "vo_fuser")]
#[command(about = "Camera VO + SLAM pose fuser on simulated trackers", long_about = None)]
struct Args {
    /// Duration in seconds (0 = continuous)
    #[arg(value_name = "SECONDS", default_value = "0")]
    duration: u64,

    /// Fuser config (JSON); defaults when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output directory
    #[arg(long, default_value = "vo_fuser_sessions")]
    output_dir: PathBuf,

    /// Camera VO rate (Hz)
    #[arg(long, default_value = "30.0")]
    camera_hz: f64,

    /// SLAM tracker rate (Hz)
    #[arg(long, default_value = "20.0")]
    secondary_hz: f64,

    /// SLAM dropout period in samples (0 = never)
    #[arg(long, default_value = "400")]
    secondary_dropout_every: u64,

    /// SLAM dropout length in samples
    #[arg(long, default_value = "40")]
    secondary_dropout_len: u64,

    /// Camera VO translation scale drift per second
    #[arg(long, default_value = "0.002")]
    scale_drift: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let fuser_config = match args.config.as_ref() {
        Some(path) => FuserConfig::from_json_file(path)?,
        None => FuserConfig::default(),
    };
    if args.camera_hz <= 0.0 || args.secondary_hz <= 0.0 {
        anyhow::bail!("Tracker rates must be positive");
    }

    log::info!("VO fuser starting");
    log::info!("  Duration: {} seconds (0=continuous)", args.duration);
    log::info!("  Rates: camera {:.1} Hz, secondary {:.1} Hz", args.camera_hz, args.secondary_hz);
    log::info!(
        "  Secondary dropout: {} samples every {}",
        args.secondary_dropout_len,
        args.secondary_dropout_every
    );
    log::info!("  Output Dir: {}", args.output_dir.display());

    std::fs::create_dir_all(&args.output_dir)?;

    // Tracker channels
    let (camera_tx, mut camera_rx) = mpsc::channel::<TimedPose>(500);
    let (secondary_tx, mut secondary_rx) = mpsc::channel::<TimedPose>(500);

    let clock = Instant::now();
    let trajectory = Trajectory::default();
    let landmarks = trackers::landmark_ring(&trajectory, 0.5, 72);
    let dropout = Dropout {
        every: args.secondary_dropout_every,
        len: args.secondary_dropout_len,
    };

    // Spawn tracker tasks (hold handles to keep tasks alive)
    let _camera_handle = tokio::spawn(trackers::camera_loop(
        camera_tx,
        SimulatedCamera::new(trajectory, args.scale_drift),
        Duration::from_secs_f64(1.0 / args.camera_hz),
        clock,
    ));
    let _secondary_handle = tokio::spawn(trackers::secondary_loop(
        secondary_tx,
        SimulatedSecondary::new(trajectory, dropout),
        Duration::from_secs_f64(1.0 / args.secondary_hz),
        clock,
    ));

    // Published poses come back over a crossbeam channel
    let (pose_tx, pose_rx) = crossbeam::channel::bounded::<PublishedPose>(1000);
    let mut pipeline = Pipeline::new(fuser_config.clone(), PipelineConfig::default())?;
    pipeline.add_sink(Box::new(ChannelSink::new(pose_tx)));

    let start = Utc::now();
    let mut session = SessionLog::new(start.to_rfc3339(), fuser_config);
    let mut status = LiveStatus::new();
    let mut latest_secondary: Option<TimedPose> = None;
    let mut status_tick = interval(Duration::from_secs(1));
    let status_path = args.output_dir.join("live_status.json");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    log::info!("Starting fusion loop...");

    // Single dispatch loop: fusion steps never overlap
    loop {
        tokio::select! {
            Some(secondary) = secondary_rx.recv() => {
                status.secondary_samples += 1;
                latest_secondary = Some(secondary);
            }
            Some(camera) = camera_rx.recv() => {
                status.camera_samples += 1;
                let secondary = latest_secondary
                    .unwrap_or_else(|| TimedPose::new(camera.timestamp, Pose::identity()));
                pipeline.process(&camera, &secondary);

                for event in pipeline.last_events() {
                    match event {
                        FuserEvent::Recovered { .. } => status.recoveries += 1,
                        FuserEvent::NanDetected { .. } => status.nan_events += 1,
                        _ => {}
                    }
                }
                session.frames.push(SessionFrame { camera, secondary });
            }
            _ = status_tick.tick() => {
                session.published.extend(pose_rx.try_iter());

                let uptime = Utc::now().signed_duration_since(start).num_seconds().max(0) as u64;
                status.timestamp = current_timestamp();
                status.uptime_seconds = uptime;
                status.apply_snapshot(&pipeline.fuser().snapshot());
                status.cloud_points = pipeline.crop_around_secondary(&landmarks).len();
                if let Err(e) = status.save(&status_path) {
                    log::warn!("Failed to write {}: {}", status_path.display(), e);
                }

                if args.duration > 0 && uptime >= args.duration {
                    log::info!("Duration reached, stopping...");
                    break;
                }
            }
            _ = &mut ctrl_c => {
                log::info!("Interrupted, stopping...");
                break;
            }
        }
    }

    // Final save
    session.published.extend(pose_rx.try_iter());
    let filename = args
        .output_dir
        .join(format!("session_{}.json", Utc::now().format("%Y%m%d_%H%M%S")));
    session.save(&filename)?;
    log::info!(
        "Saved {} frames, {} published poses to {}",
        session.frames.len(),
        session.published.len(),
        filename.display()
    );

    status.timestamp = current_timestamp();
    status.apply_snapshot(&pipeline.fuser().snapshot());
    status.save(args.output_dir.join("live_status_final.json"))?;

    // Print stats
    let fused = pipeline.fuser().fused_pose();
    println!("\n=== Final Stats ===");
    println!("Fused steps: {}", pipeline.fuser().counter());
    println!("Recoveries: {}", status.recoveries);
    println!(
        "Fused pose: t=({:.3}, {:.3}, {:.3}) q=({:.4}, {:.4}, {:.4}, {:.4})",
        fused.translation.x,
        fused.translation.y,
        fused.translation.z,
        fused.rotation.w,
        fused.rotation.i,
        fused.rotation.j,
        fused.rotation.k
    );

    Ok(())
}
