//! Bayer to RGB coupling module

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::Parser;
use color_eyre::Result;
use gstreamer as gst;
use tracing::info;

use bayerlink::bridge::FrameBridge;
use bayerlink::capture::BayerSource;
use bayerlink::display::RgbSink;
use bayerlink::stats::RunningStats;
use bayerlink::transform::Algorithm;
use bayerlink::utils::ShutdownToken;
use bayerlink::{Config, SinkConfig, SourceConfig};

#[derive(Parser, Debug)]
#[command(name = "bayerlink")]
#[command(about = "Bayer to RGB coupling module")]
#[command(version)]
struct Cli {
    /// Read input from image file I (default: synthetic test pattern)
    #[arg(short, long, value_name = "I")]
    input: Option<PathBuf>,

    /// Write output to PNG image O (default: live display window)
    #[arg(short, long, value_name = "O")]
    output: Option<PathBuf>,

    /// Use the nearest neighbor algorithm (default)
    #[arg(short, long, conflicts_with = "bilinear")]
    nearest: bool,

    /// Use the bilinear algorithm
    #[arg(short, long)]
    bilinear: bool,
}

impl Cli {
    fn into_config(self) -> Config {
        let algorithm = if self.bilinear {
            Algorithm::Bilinear
        } else {
            if !self.nearest {
                info!("No interpolation method specified, defaulting to nearest neighbor");
            }
            Algorithm::NearestNeighbor
        };

        Config {
            source: SourceConfig { input: self.input },
            sink: SinkConfig { output: self.output },
            algorithm,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicting_algorithms_are_a_configuration_error() {
        assert!(Cli::try_parse_from(["bayerlink", "--nearest", "--bilinear"]).is_err());
        assert!(Cli::try_parse_from(["bayerlink", "-n", "-b"]).is_err());
    }

    #[test]
    fn no_algorithm_defaults_to_nearest_neighbor() {
        let config = Cli::try_parse_from(["bayerlink"]).unwrap().into_config();
        assert_eq!(config.algorithm, Algorithm::NearestNeighbor);
    }

    #[test]
    fn bilinear_flag_selects_bilinear() {
        let config = Cli::try_parse_from(["bayerlink", "-b"]).unwrap().into_config();
        assert_eq!(config.algorithm, Algorithm::Bilinear);
    }

    #[test]
    fn endpoints_land_in_the_config() {
        let config = Cli::try_parse_from(["bayerlink", "-i", "in.png", "-o", "out_%05d.png"])
            .unwrap()
            .into_config();
        assert_eq!(config.source.input.as_deref(), Some(std::path::Path::new("in.png")));
        assert_eq!(
            config.sink.output.as_deref(),
            Some(std::path::Path::new("out_%05d.png"))
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("bayerlink=info")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    let config = Cli::parse().into_config();
    info!("Selected algorithm: {:?}", config.algorithm);

    gst::init()?;

    let stats = Arc::new(Mutex::new(RunningStats::new()));
    let shutdown = ShutdownToken::new();

    // Downstream first, so the bridge never pushes into a dead pipeline
    let sink = RgbSink::new(config.sink.output.as_deref())?;
    let source = BayerSource::new(config.source.input.as_deref())?;

    let bridge = FrameBridge::new(
        sink.clone(),
        config.algorithm.transform(),
        stats.clone(),
        shutdown.clone(),
    );
    source.install_bridge(bridge);

    sink.start()?;
    source.start()?;

    // Exit on CTRL+C: the token stops the bridge and the bus loop, letting
    // any in-flight frame finish first
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Signal received, shutting down...");
            signal_token.cancel();
        }
    });

    info!("Starting main loop, press CTRL+C to quit");
    let run_result = source.run(shutdown.clone()).await;

    shutdown.cancel();
    source.stop()?;
    sink.stop()?;

    let report = stats.lock().unwrap().report();
    println!("{report}");

    run_result?;
    info!("Bye!");
    Ok(())
}
