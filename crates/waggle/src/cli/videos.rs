//! Video listing with per-video artifact status.

use crate::cli::output::{check_mark, print_table};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use waggle_pipeline::{artifact_status, list_videos, PipelineParams, TableFormat};

pub fn run(
    config_path: &Path,
    input_dir: Option<PathBuf>,
    results_dir: Option<PathBuf>,
    save_filetype: &str,
) -> Result<()> {
    let config = waggle_config::load_config(config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    let (camera, _) = config.primary_stream()?;

    let input_dir = input_dir.unwrap_or_else(|| config.out_dir.join(camera));
    let results_dir = results_dir.unwrap_or_else(|| config.out_dir.clone());

    let mut params = PipelineParams::default();
    params.save_filetype = save_filetype
        .parse::<TableFormat>()
        .map_err(|e| anyhow::anyhow!(e))?;

    let videos = list_videos(&input_dir)
        .with_context(|| format!("Failed to list videos in {}", input_dir.display()))?;
    if videos.is_empty() {
        println!("No videos found in {}", input_dir.display());
        return Ok(());
    }

    let rows: Vec<Vec<String>> = videos
        .iter()
        .map(|video| {
            let status = artifact_status(video, &results_dir, &params);
            vec![
                video
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                check_mark(status.has_detections),
                check_mark(status.has_tracks),
                check_mark(status.has_rendered_video),
            ]
        })
        .collect();

    println!("VIDEOS ({})", videos.len());
    print_table(&["VIDEO", "DETECTIONS", "TRACKS", "RENDERED"], rows);
    Ok(())
}
