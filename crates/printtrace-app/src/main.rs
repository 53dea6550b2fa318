// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PrintTrace — trace an object photographed on a sheet of paper.
//
// Entry point. Initialises logging, loads the config, and runs one request
// through the controller:
//
//   printtrace <image>                      measure the contour
//   printtrace <image> --dxf [<out.dxf>]    write the outline as DXF
//   printtrace <image> --stage <0-7>        run up to a pipeline stage
//
// `--json` prints the result as JSON, `--preset` picks the parameter preset
// (`--save-config` keeps it). Ctrl-C cancels the running operation.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use printtrace_bridge::default_engine;
use printtrace_controller::{ControllerEvent, ProcessingController, ProcessingOutput, ProcessingResult};
use printtrace_core::config::{AppConfig, data_dir};
use printtrace_core::human_errors::humanize_error;
use printtrace_core::types::{PipelineStage, Preset, RequestKind};

#[derive(Debug, Parser)]
#[command(name = "printtrace", author, version, about, long_about = None)]
struct Cli {
    /// Photo of the object lying on a sheet of paper
    input: PathBuf,

    /// Write the outline as DXF (default: <output_dir>/<input>.dxf)
    #[arg(long, value_name = "PATH", num_args = 0..=1, conflicts_with = "stage")]
    dxf: Option<Option<PathBuf>>,

    /// Run the pipeline only up to this stage (0 = loaded, 7 = final)
    #[arg(long, value_name = "0-7", value_parser = parse_stage)]
    stage: Option<PipelineStage>,

    /// Parameter preset: default, high-precision or fast
    #[arg(long, value_parser = parse_preset)]
    preset: Option<Preset>,

    /// Keep --preset as the default for later runs
    #[arg(long, requires = "preset")]
    save_config: bool,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn request_kind(&self, config: &AppConfig) -> RequestKind {
        if let Some(stage) = self.stage {
            return RequestKind::ToStage(stage);
        }
        match &self.dxf {
            Some(Some(output)) => RequestKind::ToDxf { output: output.clone() },
            Some(None) => RequestKind::ToDxf {
                output: default_dxf_path(config, &self.input),
            },
            None => RequestKind::ToContour,
        }
    }

    /// Apply `--preset` to `config`, persisting it into `dir` with
    /// `--save-config`.
    fn apply_preset(&self, config: &mut AppConfig, dir: &Path) {
        let Some(preset) = self.preset else {
            return;
        };
        config.preset = preset;
        if self.save_config {
            match config.save(dir) {
                Ok(()) => tracing::info!(?preset, "saved default preset"),
                Err(e) => tracing::warn!(error = %e, "could not save config"),
            }
        }
    }
}

fn parse_stage(s: &str) -> Result<PipelineStage, String> {
    let raw: i32 = s.parse().map_err(|e| format!("{s}: {e}"))?;
    PipelineStage::ALL
        .into_iter()
        .find(|stage| stage.as_raw() == raw)
        .ok_or_else(|| format!("no pipeline stage {raw}, expected 0 to 7"))
}

fn parse_preset(s: &str) -> Result<Preset, String> {
    match s {
        "default" => Ok(Preset::Default),
        "high-precision" => Ok(Preset::HighPrecision),
        "fast" => Ok(Preset::Fast),
        other => Err(format!("unknown preset {other}")),
    }
}

/// `<output_dir>/<input stem>.dxf`, or next to the input.
fn default_dxf_path(config: &AppConfig, input: &Path) -> PathBuf {
    let name = input.with_extension("dxf");
    match (&config.output_dir, name.file_name()) {
        (Some(dir), Some(file)) => dir.join(file),
        _ => name,
    }
}

fn report(result: &ProcessingResult, json: bool) {
    if json {
        let value = serde_json::json!({
            "operation_id": result.operation_id.to_string(),
            "duration_ms": result.duration.as_millis() as u64,
            "completed_at": result.completed_at.to_rfc3339(),
            "dxf": match &result.output {
                ProcessingOutput::Dxf { path } => Some(path.display().to_string()),
                _ => None,
            },
            "contour": result.output.contour().map(|c| c.measurements()),
        });
        println!("{value:#}");
        return;
    }

    match &result.output {
        ProcessingOutput::Dxf { path } => println!("DXF written to {}", path.display()),
        ProcessingOutput::Stage { stage, image, .. } => {
            if let Some(image) = image {
                println!("{stage}: {}x{} image", image.width(), image.height());
            }
        }
        ProcessingOutput::Contour(_) => {}
    }
    if let Some(contour) = result.output.contour() {
        let rect = contour.bounding_rect_mm();
        println!("points:    {}", contour.points().len());
        println!("size:      {:.2} x {:.2} mm", rect.width, rect.height);
        println!("area:      {:.2} mm²", contour.area_mm2());
        println!("perimeter: {:.2} mm", contour.perimeter_mm());
    }
    println!("took {:.2?}", result.duration);
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let dir = data_dir();
    let mut config = AppConfig::load_or_default(&dir);
    cli.apply_preset(&mut config, &dir);
    let kind = cli.request_kind(&config);

    let controller = Arc::new(ProcessingController::new(default_engine()));
    tracing::info!(engine = %controller.version(), "PrintTrace starting");

    let mut events = controller.subscribe();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let ControllerEvent::Progress { progress, .. } = event {
                tracing::info!(percent = progress.percent(), eta = ?progress.estimated_remaining, "{}", progress.stage);
            }
        }
    });

    let canceller = Arc::clone(&controller);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() && canceller.cancel() {
            tracing::warn!("cancelling");
        }
    });

    match controller.process(kind, &cli.input, config.parameters()).await {
        Ok(result) => {
            report(&result, cli.json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            let human = humanize_error(&e);
            tracing::error!(error = %e, "processing failed");
            eprintln!("{}", human.message);
            if let Some(suggestion) = human.suggestion {
                eprintln!("{suggestion}");
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("printtrace").chain(args.iter().copied()))
    }

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn bare_input_measures_the_contour() {
        let cli = parse(&["photo.jpg"]).unwrap();
        assert_eq!(cli.request_kind(&AppConfig::default()), RequestKind::ToContour);
        assert!(!cli.json);
    }

    #[test]
    fn dxf_without_path_goes_to_output_dir() {
        let config = AppConfig {
            output_dir: Some(PathBuf::from("/tmp/cuts")),
            ..Default::default()
        };
        let cli = parse(&["shots/wrench.jpg", "--dxf"]).unwrap();
        assert_eq!(
            cli.request_kind(&config),
            RequestKind::ToDxf {
                output: PathBuf::from("/tmp/cuts/wrench.dxf")
            }
        );
        assert_eq!(
            cli.request_kind(&AppConfig::default()),
            RequestKind::ToDxf {
                output: PathBuf::from("shots/wrench.dxf")
            }
        );
    }

    #[test]
    fn dxf_with_path_is_used_verbatim() {
        let cli = parse(&["photo.jpg", "--dxf", "out/outline.dxf", "--json"]).unwrap();
        assert_eq!(
            cli.request_kind(&AppConfig::default()),
            RequestKind::ToDxf {
                output: PathBuf::from("out/outline.dxf")
            }
        );
        assert!(cli.json);
    }

    #[test]
    fn stage_is_parsed_and_bounded() {
        let cli = parse(&["photo.jpg", "--stage", "3"]).unwrap();
        assert_eq!(
            cli.request_kind(&AppConfig::default()),
            RequestKind::ToStage(PipelineStage::BoundaryDetected)
        );
        assert!(parse(&["photo.jpg", "--stage", "8"]).is_err());
        assert!(parse(&["photo.jpg", "--stage", "final"]).is_err());
    }

    #[test]
    fn dxf_and_stage_conflict() {
        assert!(parse(&["photo.jpg", "--dxf", "a.dxf", "--stage", "2"]).is_err());
    }

    #[test]
    fn missing_input_is_rejected() {
        assert!(parse(&["--json"]).is_err());
    }

    #[test]
    fn save_config_needs_a_preset() {
        assert!(parse(&["photo.jpg", "--save-config"]).is_err());
        assert!(parse(&["photo.jpg", "--preset", "precise"]).is_err());
    }

    #[test]
    fn saved_preset_is_loaded_next_time() {
        let dir = tempfile::tempdir().unwrap();
        let cli = parse(&["photo.jpg", "--preset", "high-precision", "--save-config"]).unwrap();
        let mut config = AppConfig::load_or_default(dir.path());
        cli.apply_preset(&mut config, dir.path());

        assert_eq!(config.preset, Preset::HighPrecision);
        assert_eq!(AppConfig::load_or_default(dir.path()).preset, Preset::HighPrecision);
    }

    #[test]
    fn preset_without_save_is_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let cli = parse(&["photo.jpg", "--preset", "fast"]).unwrap();
        let mut config = AppConfig::default();
        cli.apply_preset(&mut config, dir.path());

        assert_eq!(config.preset, Preset::Fast);
        assert!(AppConfig::load(dir.path()).unwrap().is_none());
    }
}
