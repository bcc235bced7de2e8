//! Upstream GStreamer pipeline delivering raw Bayer frames to the bridge

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use tracing::{error, info, warn};

use crate::bridge::{FrameBridge, FrameSink};
use crate::frame::BayerFrame;
use crate::utils::ShutdownToken;

const BAYER_CAPS: &str = "video/x-bayer,format=rggb";
const PATTERN_WIDTH: u32 = 1920;
const PATTERN_HEIGHT: u32 = 1080;

/// How long the bus loop sleeps between polls while idle.
const BUS_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Bayer source pipeline wrapping the appsink the bridge hangs off
pub struct BayerSource {
    pipeline: gst::Pipeline,
    appsink: gst_app::AppSink,
}

/// Build the upstream pipeline description: decode a still image into a
/// synthetic Bayer stream, or generate a live test pattern when no input
/// file was given.
pub fn pipeline_description(input: Option<&Path>) -> String {
    match input {
        Some(path) => {
            info!("Reading input from {}", path.display());
            format!(
                "filesrc location={} ! decodebin ! videoconvert ! \
                 queue ! video/x-raw,format=ARGB ! rgb2bayer ! {BAYER_CAPS} ! \
                 appsink name=bayersink",
                path.display()
            )
        }
        None => {
            info!("Generating input from test pattern");
            format!(
                "videotestsrc is-live=true ! queue ! \
                 {BAYER_CAPS},width={PATTERN_WIDTH},height={PATTERN_HEIGHT} ! \
                 appsink name=bayersink"
            )
        }
    }
}

impl BayerSource {
    pub fn new(input: Option<&Path>) -> Result<Self> {
        let description = pipeline_description(input);
        info!("Bayer pipeline: {}", description);

        let pipeline = gst::parse::launch(&description)?
            .downcast::<gst::Pipeline>()
            .map_err(|_| eyre!("Failed to create Bayer pipeline"))?;

        let appsink = pipeline
            .by_name("bayersink")
            .ok_or_else(|| eyre!("Failed to find bayersink element"))?
            .downcast::<gst_app::AppSink>()
            .map_err(|_| eyre!("Failed to cast to AppSink"))?;

        // One buffer at a time, never dropped, no clock sync: the bridge is
        // the only pacing element between the two pipelines.
        appsink.set_property("emit-signals", false);
        appsink.set_property("max-buffers", 1u32);
        appsink.set_property("drop", false);
        appsink.set_property("sync", false);

        Ok(Self { pipeline, appsink })
    }

    /// Install the bridge as the appsink's new-sample callback.
    ///
    /// Delivery is serialized by the appsink, so the mutex around the
    /// bridge is uncontended; it only satisfies the `Send` bound.
    pub fn install_bridge<S>(&self, bridge: FrameBridge<S>)
    where
        S: FrameSink + 'static,
    {
        let bridge = Mutex::new(bridge);

        self.appsink.set_callbacks(
            gst_app::AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let sample = appsink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                    let buffer = sample.buffer().ok_or_else(|| {
                        error!("Sample contains no buffer");
                        gst::FlowError::Error
                    })?;
                    let map = buffer.map_readable().map_err(|_| {
                        error!("Failed to map Bayer buffer");
                        gst::FlowError::Error
                    })?;

                    // Geometry comes from the sample caps; missing fields
                    // surface as zero and the bridge decides how fatal that
                    // is for the current state.
                    let (width, height) = sample
                        .caps()
                        .and_then(|caps| caps.structure(0))
                        .map(|s| {
                            (
                                s.get::<i32>("width").unwrap_or(0).max(0) as u32,
                                s.get::<i32>("height").unwrap_or(0).max(0) as u32,
                            )
                        })
                        .unwrap_or((0, 0));

                    let frame = BayerFrame {
                        data: map.as_slice(),
                        width,
                        height,
                    };

                    let result = bridge.lock().unwrap().on_frame(&frame);
                    FrameBridge::<S>::flow_return(result)
                })
                .build(),
        );
    }

    /// Start the upstream pipeline.
    pub fn start(&self) -> Result<()> {
        info!("Starting Bayer pipeline");
        self.pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| eyre!("Failed to start Bayer pipeline: {:?}", e))?;
        Ok(())
    }

    /// Drive the bus until end-of-stream, a pipeline error or shutdown.
    ///
    /// The token is checked between bus polls; an in-flight frame callback
    /// always runs to completion.
    pub async fn run(&self, shutdown: ShutdownToken) -> Result<()> {
        let bus = self
            .pipeline
            .bus()
            .ok_or_else(|| eyre!("Bayer pipeline has no bus"))?;

        loop {
            if shutdown.is_cancelled() {
                info!("Shutdown requested, leaving main loop");
                return Ok(());
            }

            while let Some(msg) = bus.pop() {
                use gst::MessageView;

                match msg.view() {
                    MessageView::Eos(..) => {
                        info!("End of stream");
                        return Ok(());
                    }
                    MessageView::Error(err) => {
                        return Err(eyre!(
                            "Error from {:?}: {} ({:?})",
                            err.src().map(|s| s.path_string()),
                            err.error(),
                            err.debug()
                        ));
                    }
                    MessageView::Warning(warning) => {
                        warn!(
                            "Warning from {:?}: {} ({:?})",
                            warning.src().map(|s| s.path_string()),
                            warning.error(),
                            warning.debug()
                        );
                    }
                    _ => {}
                }
            }

            tokio::time::sleep(BUS_POLL_INTERVAL).await;
        }
    }

    /// Stop the upstream pipeline.
    pub fn stop(&self) -> Result<()> {
        info!("Stopping Bayer pipeline");
        self.pipeline
            .set_state(gst::State::Null)
            .map_err(|e| eyre!("Failed to stop Bayer pipeline: {:?}", e))?;
        Ok(())
    }
}

impl Drop for BayerSource {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}
