//! Downstream GStreamer pipeline consuming converted RGB frames

use std::path::Path;

use color_eyre::{eyre::eyre, Result};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use tracing::{debug, info};

use crate::bridge::{BridgeError, FrameSink};
use crate::frame::{NegotiatedFormat, RgbFrame};

/// RGB sink pipeline wrapping the appsrc the bridge pushes into.
///
/// Clonable handle: the GStreamer objects are refcounted, so one clone can
/// live inside the bridge while another drives pipeline state from main.
#[derive(Clone)]
pub struct RgbSink {
    pipeline: gst::Pipeline,
    appsrc: gst_app::AppSrc,
}

/// Build the downstream pipeline description: encode each frame to a PNG
/// file, or hand frames to a live display window when no output file was
/// given.
pub fn pipeline_description(output: Option<&Path>) -> String {
    match output {
        Some(path) => {
            info!("Writing output to {}", path.display());
            format!(
                "appsrc name=rgbsrc ! videoconvert ! pngenc ! \
                 multifilesink next-file=buffer location={}",
                path.display()
            )
        }
        None => {
            info!("Displaying output to window");
            "appsrc name=rgbsrc ! videoconvert ! autovideosink sync=false async=false".to_string()
        }
    }
}

impl RgbSink {
    pub fn new(output: Option<&Path>) -> Result<Self> {
        let description = pipeline_description(output);
        info!("RGB pipeline: {}", description);

        let pipeline = gst::parse::launch(&description)?
            .downcast::<gst::Pipeline>()
            .map_err(|_| eyre!("Failed to create RGB pipeline"))?;

        let appsrc = pipeline
            .by_name("rgbsrc")
            .ok_or_else(|| eyre!("Failed to find rgbsrc element"))?
            .downcast::<gst_app::AppSrc>()
            .map_err(|_| eyre!("Failed to cast to AppSrc"))?;

        appsrc.set_property("is-live", true);
        appsrc.set_property("block", false);
        appsrc.set_property("format", gst::Format::Time);

        Ok(Self { pipeline, appsrc })
    }

    /// Start the downstream pipeline.
    pub fn start(&self) -> Result<()> {
        info!("Starting RGB pipeline");
        self.pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| eyre!("Failed to start RGB pipeline: {:?}", e))?;
        Ok(())
    }

    /// Signal end-of-stream so file encoders can flush, then stop.
    pub fn stop(&self) -> Result<()> {
        info!("Stopping RGB pipeline");
        if let Err(e) = self.appsrc.end_of_stream() {
            debug!("EOS not accepted by rgbsrc: {:?}", e);
        }
        self.pipeline
            .set_state(gst::State::Null)
            .map_err(|e| eyre!("Failed to stop RGB pipeline: {:?}", e))?;
        Ok(())
    }
}

impl FrameSink for RgbSink {
    /// One-time caps negotiation derived from the first upstream frame.
    fn negotiate(&mut self, format: &NegotiatedFormat) -> Result<(), BridgeError> {
        let info = gst_video::VideoInfo::builder(
            gst_video::VideoFormat::Rgb,
            format.width,
            format.height,
        )
        .build()
        .map_err(|e| BridgeError::Negotiation(format!("invalid RGB video info: {e}")))?;

        let caps = info
            .to_caps()
            .map_err(|e| BridgeError::Negotiation(format!("cannot build RGB caps: {e}")))?;

        debug!("Setting rgbsrc caps: {}", caps);
        self.appsrc.set_caps(Some(&caps));
        Ok(())
    }

    /// Hand one converted frame to the downstream pipeline, returning the
    /// appsrc's own flow result unchanged.
    fn push(&mut self, frame: RgbFrame) -> Result<gst::FlowSuccess, gst::FlowError> {
        let mut buffer =
            gst::Buffer::with_size(frame.data.len()).map_err(|_| gst::FlowError::Error)?;
        {
            let buffer_ref = buffer.make_mut();
            buffer_ref
                .copy_from_slice(0, &frame.data)
                .map_err(|_| gst::FlowError::Error)?;
        }

        self.appsrc.push_buffer(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_output_description_encodes_png_per_buffer() {
        let desc = pipeline_description(Some(Path::new("/tmp/out_%05d.png")));
        assert!(desc.contains("appsrc name=rgbsrc"));
        assert!(desc.contains("pngenc"));
        assert!(desc.contains("multifilesink next-file=buffer location=/tmp/out_%05d.png"));
    }

    #[test]
    fn window_output_description_uses_live_sink() {
        let desc = pipeline_description(None);
        assert!(desc.contains("autovideosink sync=false"));
    }
}
