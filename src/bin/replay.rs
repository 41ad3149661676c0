use std::path::{Path, PathBuf};

use clap::Parser;
use serde_json::json;
use vo_fuser::fuser::FuserEvent;
use vo_fuser::session::SessionLog;
use vo_fuser::types::Translation3;
use vo_fuser::{FuserConfig, Pipeline, PipelineConfig};

#[derive(Parser, Debug)]
struct Args {
    /// Path to session_*.json[.gz] log
    #[arg(long, conflicts_with = "session_dir")]
    log: Option<PathBuf>,

    /// Directory of session logs to batch replay (processes session_*.json[.gz])
    #[arg(long)]
    session_dir: Option<PathBuf>,

    /// Fuser config override (JSON); otherwise the recorded config is used
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the median window length
    #[arg(long)]
    filter_window: Option<usize>,

    /// Override the recovery history length
    #[arg(long)]
    recovery_buffer: Option<usize>,

    /// Override the camera blending weight
    #[arg(long)]
    alpha_blending: Option<f64>,
}

fn rmse(errors: &[f64]) -> f64 {
    if errors.is_empty() {
        return f64::INFINITY;
    }
    let sum_sq: f64 = errors.iter().map(|e| e * e).sum();
    (sum_sq / errors.len() as f64).sqrt()
}

fn resolve_config(recorded: &FuserConfig, args: &Args) -> anyhow::Result<FuserConfig> {
    let mut config = match args.config.as_ref() {
        Some(path) => FuserConfig::from_json_file(path)?,
        None => recorded.clone(),
    };
    if let Some(window) = args.filter_window {
        config.filter_window = window;
    }
    if let Some(buffer) = args.recovery_buffer {
        config.recovery_buffer = buffer;
    }
    if let Some(alpha) = args.alpha_blending {
        config.alpha_blending = alpha;
    }
    config.validate()?;
    Ok(config)
}

fn run_once(path: &Path, args: &Args) -> anyhow::Result<serde_json::Value> {
    let session = SessionLog::load(path)?;
    let config = resolve_config(&session.config, args)?;
    let mut pipeline = Pipeline::new(config.clone(), PipelineConfig::default())?;

    let mut errors = Vec::with_capacity(session.frames.len());
    let mut max_step = 0.0_f64;
    let mut recoveries = 0u64;
    let mut aborted = 0u64;
    let mut filter_resets = 0u64;
    let mut nan_events = 0u64;
    let mut last_translation: Option<Translation3> = None;

    for frame in &session.frames {
        let published = pipeline.process(&frame.camera, &frame.secondary);

        for event in pipeline.last_events() {
            match event {
                FuserEvent::Recovered { anchor } => {
                    recoveries += 1;
                    log::info!(
                        "[RECOVERED] t={:.2}s anchor=({:.3}, {:.3}, {:.3})",
                        frame.camera.timestamp,
                        anchor.translation.x,
                        anchor.translation.y,
                        anchor.translation.z
                    );
                }
                FuserEvent::RecoveryAborted => aborted += 1,
                FuserEvent::FusedFilterReset => filter_resets += 1,
                FuserEvent::NanDetected { .. } => nan_events += 1,
            }
        }

        errors.push((published.pose.translation - frame.camera.pose.translation).norm());
        if let Some(prev) = last_translation {
            max_step = max_step.max((published.pose.translation - prev).norm());
        }
        last_translation = Some(published.pose.translation);
    }

    let final_pose = pipeline.fuser().fused_pose();
    Ok(json!({
        "log": path.display().to_string(),
        "config": config,
        "steps": pipeline.fuser().counter(),
        "recoveries": recoveries,
        "recoveries_aborted": aborted,
        "fused_filter_resets": filter_resets,
        "nan_events": nan_events,
        "rmse_vs_camera": rmse(&errors),
        "max_error_vs_camera": errors.iter().copied().fold(0.0_f64, f64::max),
        "max_published_step": max_step,
        "final_pose": final_pose,
    }))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let mut results = Vec::new();

    if let Some(dir) = args.session_dir.as_ref() {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if !(name.starts_with("session_") && (name.ends_with(".json") || name.ends_with(".json.gz"))) {
                continue;
            }
            match run_once(&path, &args) {
                Ok(res) => results.push(res),
                Err(e) => log::error!("Failed {}: {}", path.display(), e),
            }
        }
    } else if let Some(log) = args.log.as_ref() {
        results.push(run_once(log, &args)?);
    } else {
        anyhow::bail!("Provide --log or --session-dir");
    }

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vo_fuser::session::SessionFrame;
    use vo_fuser::{Pose, Quality, TimedPose};

    #[test]
    fn test_run_once_summarizes_session() {
        let mut session = SessionLog::new("2026-01-01T00:00:00Z", FuserConfig::default());
        for step in 0..12 {
            let t = step as f64 * 0.1;
            let pose = Pose::from_parts((t, 0.0, 0.0), (1.0, 0.0, 0.0, 0.0), Quality::Ok);
            session.frames.push(SessionFrame {
                camera: TimedPose::new(t, pose),
                secondary: TimedPose::new(t, pose),
            });
        }
        let path = std::env::temp_dir().join(format!("replay_session_{}.json", std::process::id()));
        session.save(&path).unwrap();

        let args = Args::parse_from(["replay", "--alpha-blending", "0.5"]);
        let summary = run_once(&path, &args).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(summary["steps"], 12);
        assert_eq!(summary["recoveries"], 0);
        assert_eq!(summary["config"]["alpha_blending"], 0.5);
        let max_step = summary["max_published_step"].as_f64().unwrap();
        assert!(max_step > 0.0 && max_step < 0.5);
    }
}
