//! Marker Cluster command line
//!
//! Replays map viewport events against a marker set and prints the clustered
//! markers as JSON, one document per published viewport or recomputation.

use clap::Parser;
use marker_cluster_lib::{ClusterError, MarkerLayer};
use std::path::PathBuf;
use std::process::ExitCode;

mod logging;
mod replay;
mod settings;

use replay::{OutputOptions, Replay, TimedEvent};
use settings::Settings;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Layer(#[from] ClusterError),

    #[error("Failed to write output: {0}")]
    Output(std::io::Error),
}

fn run(settings: &Settings) -> Result<usize, CliError> {
    profiling::scope!("run");

    let points = replay::load_points(&settings.points)?;
    let events = match &settings.events {
        Some(path) => replay::load_events(path)?,
        None => vec![TimedEvent::bounds(
            0,
            settings.corner_a,
            settings.corner_b,
            settings.width,
            settings.height,
        )],
    };

    let mut layer = MarkerLayer::new(settings.layer_config());
    layer.set_points(points);

    let options = OutputOptions {
        final_only: settings.final_only,
        pretty: settings.pretty,
    };
    let stdout = std::io::stdout().lock();
    Replay::new(layer, std::io::BufWriter::new(stdout), options).run(&events)
}

fn main() -> ExitCode {
    let settings = Settings::parse();
    logging::setup_logging();
    tracing::debug!(?settings, "Starting");

    match run(&settings) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err}");
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}
