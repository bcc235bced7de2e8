//! The frame-conversion bridge between the Bayer and RGB pipelines
//!
//! This is the only component with real state: it reacts to one upstream
//! frame at a time, negotiates the downstream format off the first frame,
//! times the active pixel transform and forwards the converted buffer. It
//! owns no thread; the upstream appsink drives it with serialized callbacks.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use gstreamer as gst;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::frame::{BayerFrame, NegotiatedFormat, RgbFrame};
use crate::stats::RunningStats;
use crate::transform::{PixelTransform, TransformError};
use crate::utils::ShutdownToken;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// First frame carried no usable geometry; the downstream format can
    /// never be negotiated. Fatal to the data path.
    #[error("cannot negotiate downstream format: {0}")]
    Negotiation(String),

    /// A later frame disagrees with the format fixed at negotiation time.
    /// Fails this frame only; the cached format stays.
    #[error("frame geometry {got_width}x{got_height} does not match negotiated {want_width}x{want_height}")]
    GeometryMismatch {
        want_width: u32,
        want_height: u32,
        got_width: u32,
        got_height: u32,
    },

    /// The transform rejected its buffers. Fails this frame only.
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// The downstream sink rejected the buffer. Carried verbatim so the
    /// caller can hand the original flow result back to its scheduler.
    #[error("downstream sink rejected buffer: {0:?}")]
    Delivery(gst::FlowError),

    /// Shutdown was observed; no further frames are accepted.
    #[error("bridge is stopped")]
    Stopped,
}

/// Downstream side of the bridge.
///
/// `negotiate` is called exactly once per run, before the first `push`.
/// `push` returns the sink's own accept/reject outcome, which the bridge
/// propagates without interpretation.
pub trait FrameSink: Send {
    fn negotiate(&mut self, format: &NegotiatedFormat) -> Result<(), BridgeError>;
    fn push(&mut self, frame: RgbFrame) -> Result<gst::FlowSuccess, gst::FlowError>;
}

/// Orchestrates geometry detection, output allocation, the timed transform
/// and downstream delivery for every upstream frame.
pub struct FrameBridge<S> {
    sink: S,
    transform: Box<dyn PixelTransform>,
    stats: Arc<Mutex<RunningStats>>,
    negotiated: Option<NegotiatedFormat>,
    shutdown: ShutdownToken,
}

impl<S: FrameSink> FrameBridge<S> {
    pub fn new(
        sink: S,
        transform: Box<dyn PixelTransform>,
        stats: Arc<Mutex<RunningStats>>,
        shutdown: ShutdownToken,
    ) -> Self {
        Self {
            sink,
            transform,
            stats,
            negotiated: None,
            shutdown,
        }
    }

    /// Format fixed by the first frame, if negotiation happened yet.
    pub fn negotiated(&self) -> Option<&NegotiatedFormat> {
        self.negotiated.as_ref()
    }

    /// Process one upstream frame and forward the conversion downstream.
    ///
    /// On success returns the sink's flow result unchanged. Per-frame
    /// failures (`Transform`, `GeometryMismatch`) leave the bridge
    /// streaming; `Negotiation` and `Stopped` end the data path.
    pub fn on_frame(&mut self, frame: &BayerFrame<'_>) -> Result<gst::FlowSuccess, BridgeError> {
        if self.shutdown.is_cancelled() {
            return Err(BridgeError::Stopped);
        }

        let format = self.negotiate_once(frame)?;

        let mut dst = vec![0u8; format.frame_size()];
        {
            let mut stats = self.stats.lock().unwrap();
            stats.begin();
            self.transform
                .apply(frame.data, &mut dst, frame.width, frame.height)?;
            let average = stats.end();
            trace!(?average, count = stats.count(), "transform timed");
        }

        let out = RgbFrame {
            data: Bytes::from(dst),
            width: format.width,
            height: format.height,
        };

        self.sink.push(out).map_err(BridgeError::Delivery)
    }

    /// Fix the downstream format off the first frame; afterwards only
    /// check that later frames still agree with it.
    fn negotiate_once(&mut self, frame: &BayerFrame<'_>) -> Result<NegotiatedFormat, BridgeError> {
        if let Some(format) = self.negotiated {
            if format.width != frame.width || format.height != frame.height {
                return Err(BridgeError::GeometryMismatch {
                    want_width: format.width,
                    want_height: format.height,
                    got_width: frame.width,
                    got_height: frame.height,
                });
            }
            return Ok(format);
        }

        if frame.width == 0 || frame.height == 0 {
            return Err(BridgeError::Negotiation(format!(
                "first frame reports empty geometry {}x{}",
                frame.width, frame.height
            )));
        }

        let format = NegotiatedFormat::rgb(frame.width, frame.height);
        debug!(width = format.width, height = format.height, "negotiating downstream format");
        self.sink.negotiate(&format)?;
        self.negotiated = Some(format);
        Ok(format)
    }

    /// Map a bridge outcome to the flow return expected by the upstream
    /// scheduler. Delivery outcomes pass through verbatim; per-frame
    /// failures keep the stream alive.
    pub fn flow_return(result: Result<gst::FlowSuccess, BridgeError>) -> Result<gst::FlowSuccess, gst::FlowError> {
        match result {
            Ok(success) => Ok(success),
            Err(BridgeError::Delivery(err)) => Err(err),
            Err(BridgeError::Stopped) => Err(gst::FlowError::Eos),
            Err(err @ BridgeError::Negotiation(_)) => {
                warn!("{err}");
                Err(gst::FlowError::NotNegotiated)
            }
            Err(err) => {
                warn!("dropping frame: {err}");
                Ok(gst::FlowSuccess::Ok)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{Algorithm, NearestNeighbor};

    #[derive(Default)]
    struct MockSink {
        negotiated: Vec<NegotiatedFormat>,
        pushed: Vec<RgbFrame>,
        reject_push: Option<gst::FlowError>,
    }

    impl FrameSink for MockSink {
        fn negotiate(&mut self, format: &NegotiatedFormat) -> Result<(), BridgeError> {
            self.negotiated.push(*format);
            Ok(())
        }

        fn push(&mut self, frame: RgbFrame) -> Result<gst::FlowSuccess, gst::FlowError> {
            if let Some(err) = self.reject_push {
                return Err(err);
            }
            self.pushed.push(frame);
            Ok(gst::FlowSuccess::Ok)
        }
    }

    fn bridge(sink: MockSink) -> (FrameBridge<MockSink>, Arc<Mutex<RunningStats>>, ShutdownToken) {
        let stats = Arc::new(Mutex::new(RunningStats::new()));
        let shutdown = ShutdownToken::new();
        let bridge = FrameBridge::new(
            sink,
            Box::new(NearestNeighbor),
            stats.clone(),
            shutdown.clone(),
        );
        (bridge, stats, shutdown)
    }

    fn frame(data: &[u8], width: u32, height: u32) -> BayerFrame<'_> {
        BayerFrame {
            data,
            width,
            height,
        }
    }

    #[test]
    fn converts_and_forwards_one_frame() {
        let (mut bridge, stats, _) = bridge(MockSink::default());
        let src: Vec<u8> = (1..=8).collect();

        bridge.on_frame(&frame(&src, 4, 2)).unwrap();

        let pushed = &bridge.sink.pushed;
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].data.len(), 24);
        assert_eq!(&pushed[0].data[..8], &src[..]);
        assert_eq!(stats.lock().unwrap().count(), 1);
    }

    #[test]
    fn negotiates_exactly_once_across_frames() {
        let (mut bridge, _, _) = bridge(MockSink::default());
        let src = vec![0u8; 8];

        for _ in 0..5 {
            bridge.on_frame(&frame(&src, 4, 2)).unwrap();
        }

        assert_eq!(bridge.sink.negotiated.len(), 1);
        assert_eq!(bridge.negotiated(), Some(&NegotiatedFormat::rgb(4, 2)));
        assert_eq!(bridge.sink.pushed.len(), 5);
    }

    #[test]
    fn empty_geometry_on_first_frame_is_fatal_and_clean() {
        let (mut bridge, stats, _) = bridge(MockSink::default());

        let err = bridge.on_frame(&frame(&[], 0, 2)).unwrap_err();
        assert!(matches!(err, BridgeError::Negotiation(_)));

        // nothing negotiated, nothing pushed, stats untouched
        assert!(bridge.sink.negotiated.is_empty());
        assert!(bridge.sink.pushed.is_empty());
        assert_eq!(stats.lock().unwrap().count(), 0);
    }

    #[test]
    fn undersized_frame_is_dropped_but_stream_continues() {
        let (mut bridge, stats, _) = bridge(MockSink::default());
        let good: Vec<u8> = vec![7u8; 8];
        let short = vec![7u8; 3];

        bridge.on_frame(&frame(&good, 4, 2)).unwrap();
        let err = bridge.on_frame(&frame(&short, 4, 2)).unwrap_err();
        assert!(matches!(err, BridgeError::Transform(_)));

        // the bad frame was neither forwarded nor sampled
        assert_eq!(bridge.sink.pushed.len(), 1);
        assert_eq!(stats.lock().unwrap().count(), 1);

        // still streaming
        bridge.on_frame(&frame(&good, 4, 2)).unwrap();
        assert_eq!(bridge.sink.pushed.len(), 2);
    }

    #[test]
    fn geometry_change_fails_frame_but_keeps_cached_format() {
        let (mut bridge, _, _) = bridge(MockSink::default());
        let src = vec![0u8; 64];

        bridge.on_frame(&frame(&src, 4, 2)).unwrap();
        let err = bridge.on_frame(&frame(&src, 8, 8)).unwrap_err();
        assert!(matches!(err, BridgeError::GeometryMismatch { .. }));

        assert_eq!(bridge.negotiated(), Some(&NegotiatedFormat::rgb(4, 2)));
        assert_eq!(bridge.sink.negotiated.len(), 1);
    }

    #[test]
    fn delivery_rejection_is_propagated_verbatim() {
        let sink = MockSink {
            reject_push: Some(gst::FlowError::Flushing),
            ..MockSink::default()
        };
        let (mut bridge, _, _) = bridge(sink);

        let err = bridge.on_frame(&frame(&[0u8; 8], 4, 2)).unwrap_err();
        match err {
            BridgeError::Delivery(flow) => assert_eq!(flow, gst::FlowError::Flushing),
            other => panic!("expected delivery error, got {other:?}"),
        }

        // and it maps back to the original flow error at the boundary
        let mapped = FrameBridge::<MockSink>::flow_return(Err(BridgeError::Delivery(
            gst::FlowError::Flushing,
        )));
        assert_eq!(mapped, Err(gst::FlowError::Flushing));
    }

    #[test]
    fn no_frames_processed_after_shutdown() {
        let (mut bridge, stats, shutdown) = bridge(MockSink::default());
        shutdown.cancel();

        let err = bridge.on_frame(&frame(&[0u8; 8], 4, 2)).unwrap_err();
        assert!(matches!(err, BridgeError::Stopped));
        assert!(bridge.sink.pushed.is_empty());
        assert_eq!(stats.lock().unwrap().count(), 0);
    }

    #[test]
    fn per_frame_errors_keep_the_stream_alive_at_the_boundary() {
        let transform_err = BridgeError::Transform(TransformError::UndersizedSource {
            expected: 8,
            actual: 3,
        });
        assert_eq!(
            FrameBridge::<MockSink>::flow_return(Err(transform_err)),
            Ok(gst::FlowSuccess::Ok)
        );
        assert_eq!(
            FrameBridge::<MockSink>::flow_return(Err(BridgeError::Stopped)),
            Err(gst::FlowError::Eos)
        );
    }

    #[test]
    fn constant_fill_variant_saturates_output() {
        let stats = Arc::new(Mutex::new(RunningStats::new()));
        let mut bridge = FrameBridge::new(
            MockSink::default(),
            Algorithm::Bilinear.transform(),
            stats,
            ShutdownToken::new(),
        );

        bridge.on_frame(&frame(&[0u8; 8], 4, 2)).unwrap();
        assert!(bridge.sink.pushed[0].data.iter().all(|&b| b == 0xFF));
    }
}
