//! Run the analysis pipeline over one or more videos.

use crate::engines::NullAnalysis;
use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use tracing::error;
use waggle_pipeline::{
    list_videos, run_pipeline, Collaborators, PipelineParams, PipelineRequest, TableFormat,
    TimestampFormat,
};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Videos to process (default: every video in --input-dir)
    pub videos: Vec<PathBuf>,

    /// Directory scanned when no videos are given (default: <out_dir>/<camera>)
    #[arg(long)]
    pub input_dir: Option<PathBuf>,

    /// Directory for pipeline artifacts (default: <out_dir>)
    #[arg(long)]
    pub results_dir: Option<PathBuf>,

    /// Recompute every cached stage
    #[arg(long)]
    pub recalc: bool,

    /// Filename timestamp format: structured | device-local
    #[arg(long, default_value = "structured")]
    pub timestamp_format: String,

    /// Table format for detections/tracks artifacts: parquet | csv
    #[arg(long, default_value = "parquet")]
    pub save_filetype: String,

    /// Skip the tracking stage
    #[arg(long)]
    pub no_tracking: bool,

    /// Render the analysis video
    #[arg(long)]
    pub create_video: bool,

    /// Write the diagnostic detection-overlay PNG
    #[arg(long)]
    pub save_png: bool,

    /// Thread untagged detections into the rendered video
    #[arg(long)]
    pub show_untagged: bool,

    /// Disable contrast normalization during detection
    #[arg(long)]
    pub no_clahe: bool,

    /// Expected tag diameter in pixels
    #[arg(long, default_value_t = 45.0)]
    pub tag_pixel_diameter: f64,

    /// Physical scale in cm per pixel
    #[arg(long, default_value_t = 200.0 / 5312.0)]
    pub cm_per_pixel: f64,

    /// Output scale of the rendered video
    #[arg(long, default_value_t = 0.25)]
    pub scale_factor: f64,

    /// Trailing track positions drawn per rendered frame
    #[arg(long, default_value_t = 0)]
    pub track_history: u32,

    /// Marker radius for tagged detections
    #[arg(long, default_value_t = 20)]
    pub r_tagged: u32,

    /// Marker radius for untagged detections
    #[arg(long, default_value_t = 5)]
    pub r_untagged: u32,
}

impl RunArgs {
    fn to_params(&self) -> Result<PipelineParams> {
        let timestamp_format = self
            .timestamp_format
            .parse::<TimestampFormat>()
            .map_err(|e| anyhow::anyhow!(e))?;

        let mut params = PipelineParams::for_timestamp_format(timestamp_format);
        params.recalc = self.recalc;
        params.save_filetype = self
            .save_filetype
            .parse::<TableFormat>()
            .map_err(|e| anyhow::anyhow!(e))?;
        params.use_trajectories = !self.no_tracking;
        params.create_video = self.create_video;
        params.save_png = self.save_png;
        params.show_untagged = self.show_untagged;
        params.use_clahe = !self.no_clahe;
        params.tag_pixel_diameter = self.tag_pixel_diameter;
        params.cm_per_pixel = self.cm_per_pixel;
        params.scale_factor = self.scale_factor;
        params.track_history = self.track_history;
        params.r_tagged = self.r_tagged;
        params.r_untagged = self.r_untagged;
        Ok(params)
    }
}

pub fn run(config_path: &Path, args: RunArgs) -> Result<()> {
    let config = waggle_config::load_config(config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    let (camera, _) = config.primary_stream()?;

    let params = args.to_params()?;
    let results_dir = args
        .results_dir
        .clone()
        .unwrap_or_else(|| config.out_dir.clone());

    let videos = if args.videos.is_empty() {
        let input_dir = args
            .input_dir
            .clone()
            .unwrap_or_else(|| config.out_dir.join(camera));
        list_videos(&input_dir)
            .with_context(|| format!("Failed to list videos in {}", input_dir.display()))?
    } else {
        args.videos.clone()
    };

    if videos.is_empty() {
        println!("Nothing to do: no videos found");
        return Ok(());
    }

    let engines = NullAnalysis;
    let collaborators = Collaborators {
        detector: &engines,
        tracker: &engines,
        renderer: &engines,
        probe: &engines,
    };

    // A stage failure aborts only that video's request; remaining videos
    // still run.
    let mut failures = 0usize;
    for video in &videos {
        println!("Running pipeline on {}", video.display());
        let request = PipelineRequest {
            video_path: video.clone(),
            output_dir: results_dir.clone(),
            params: params.clone(),
        };
        match run_pipeline(&request, &collaborators) {
            Ok(outcome) => {
                println!(
                    "  detections: {} row(s){}",
                    outcome.detections.num_rows(),
                    if outcome.detections_cached { " (cached)" } else { "" }
                );
                if let Some(tracks) = &outcome.tracks {
                    println!(
                        "  tracks: {} row(s){}",
                        tracks.num_rows(),
                        if outcome.tracks_cached { " (cached)" } else { "" }
                    );
                }
                if outcome.rendered {
                    println!("  rendered: {}", outcome.artifacts.rendered_video.display());
                }
            }
            Err(err) => {
                error!("Pipeline failed for {}: {}", video.display(), err);
                eprintln!("  FAILED: {err}");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {} video(s) failed", videos.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: RunArgs,
    }

    #[test]
    fn defaults_map_to_pipeline_defaults() {
        let wrapper = Wrapper::parse_from(["run"]);
        let params = wrapper.args.to_params().unwrap();

        assert!(!params.recalc);
        assert!(params.use_trajectories);
        assert!(params.use_clahe);
        assert!(!params.create_video);
        assert_eq!(params.save_filetype, TableFormat::Parquet);
        assert_eq!(params.timestamp_format, TimestampFormat::Structured);
        assert_eq!(params.detections_suffix, "-detections");
    }

    #[test]
    fn device_local_format_drops_the_detections_suffix() {
        let wrapper = Wrapper::parse_from([
            "run",
            "--timestamp-format",
            "device-local",
            "--no-tracking",
            "--save-filetype",
            "csv",
        ]);
        let params = wrapper.args.to_params().unwrap();

        assert_eq!(params.timestamp_format, TimestampFormat::DeviceLocal);
        assert_eq!(params.detections_suffix, "");
        assert_eq!(params.save_filetype, TableFormat::Csv);
        assert!(!params.use_trajectories);
    }

    #[test]
    fn unknown_formats_are_rejected() {
        let wrapper = Wrapper::parse_from(["run", "--timestamp-format", "basler"]);
        assert!(wrapper.args.to_params().is_err());
    }
}
