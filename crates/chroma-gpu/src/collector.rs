//! Realtime frame collection.
//!
//! A [`Collector`] sits between a capture source pushing frames and a
//! sink consuming filtered output. Each accepted frame is filtered on
//! a worker thread so the capture callback returns immediately, and
//! the chain runs best-effort: a frame that arrives while the previous
//! one is still in flight is dropped rather than queued, which keeps
//! latency flat when the chain cannot keep up with the capture rate.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::cache::CaptureFrame;
use crate::context::GpuContext;
use crate::engine::{FilterChain, ImageLike};
use crate::kernel::Filter;
use crate::texture::PixelBuffer;

/// Receives filtered frames. Only [`FrameSink::frame_output`] is
/// required; the richer callbacks default to no-ops so a sink can pick
/// the representation it wants.
pub trait FrameSink: Send {
    /// A filtered frame as a raw pixel buffer.
    fn frame_output(&mut self, frame: &PixelBuffer);

    /// The filtered frame in capture-frame form, before conversion.
    fn capture_output(&mut self, _frame: &CaptureFrame) {}
}

/// Applies a filter chain to a stream of capture frames and delivers
/// the results to a sink.
pub struct Collector {
    chain: FilterChain,
    sink: Arc<Mutex<Box<dyn FrameSink>>>,
    /// Single-flight guard: set by [`Collector::process_frame`] when it
    /// hands a frame to the worker, cleared by the worker after the
    /// sink callbacks return.
    busy: Arc<AtomicBool>,
    received: AtomicU64,
    dropped: AtomicU64,
}

impl Collector {
    pub fn new(sink: Box<dyn FrameSink>) -> Self {
        Collector {
            chain: FilterChain::default(),
            sink: Arc::new(Mutex::new(sink)),
            busy: Arc::new(AtomicBool::new(false)),
            received: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Replaces the chain applied to incoming frames. Takes effect on
    /// the next frame; the in-flight one finishes with the old chain.
    pub fn set_filters(&mut self, filters: Vec<Filter>) {
        self.chain = FilterChain::new(filters);
    }

    /// Replaces the whole chain, including output options like
    /// mirroring or a pixel-format override.
    pub fn set_chain(&mut self, chain: FilterChain) {
        self.chain = chain;
    }

    pub fn filters(&self) -> &[Filter] {
        self.chain.filters()
    }

    /// Frames dropped because the previous one was still in flight.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn received_frames(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Whether a frame is currently in flight.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Accepts one capture frame and filters it on a worker thread,
    /// delivering the result to the sink. Best-effort: a failing chain
    /// delivers the original frame, and a frame arriving while the
    /// previous one is still in flight is dropped with `false`
    /// returned.
    pub fn process_frame(&self, frame: CaptureFrame) -> bool {
        self.received.fetch_add(1, Ordering::Relaxed);
        if self
            .busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let chain = self.chain.clone();
        let sink = Arc::clone(&self.sink);
        let busy = Arc::clone(&self.busy);
        std::thread::spawn(move || {
            let out = chain.run_or_original(ImageLike::Capture(frame));
            if let ImageLike::Capture(filtered) = out {
                let mut sink = sink.lock().unwrap();
                sink.capture_output(&filtered);
                let buffer = PixelBuffer {
                    data: filtered.data,
                    width: filtered.width,
                    height: filtered.height,
                    format: filtered.format.pixel_format(),
                };
                sink.frame_output(&buffer);
            }
            busy.store(false, Ordering::Release);
        });
        true
    }

    /// Call when the capture session ends: releases the conversion
    /// cache's staging memory held by the shared context.
    pub fn session_stopped(&self) {
        debug!(
            received = self.received_frames(),
            dropped = self.dropped_frames(),
            "capture session stopped"
        );
        if let Some(ctx) = GpuContext::current() {
            ctx.flush_frame_cache();
        }
    }
}

impl std::fmt::Debug for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("filters", &self.chain.filters().len())
            .field("received", &self.received_frames())
            .field("dropped", &self.dropped_frames())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CaptureFormat;
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    const WAIT: Duration = Duration::from_secs(10);

    struct ChannelSink {
        delivered: mpsc::Sender<(u32, u32)>,
    }

    impl FrameSink for ChannelSink {
        fn frame_output(&mut self, frame: &PixelBuffer) {
            let _ = self.delivered.send((frame.width, frame.height));
        }
    }

    /// Parks inside the sink callback until released, so a test can
    /// hold a frame in flight for as long as it needs.
    struct BlockingSink {
        entered: mpsc::Sender<()>,
        release: mpsc::Receiver<()>,
    }

    impl FrameSink for BlockingSink {
        fn frame_output(&mut self, _frame: &PixelBuffer) {
            let _ = self.entered.send(());
            let _ = self.release.recv();
        }
    }

    fn test_frame() -> CaptureFrame {
        CaptureFrame::packed(vec![128; 2 * 2 * 4], 2, 2, CaptureFormat::Rgba8)
    }

    fn wait_until_idle(collector: &Collector) {
        let deadline = Instant::now() + WAIT;
        while collector.is_busy() {
            assert!(Instant::now() < deadline, "frame never finished");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_empty_chain_delivers_frames() {
        // An empty chain is the identity and needs no GPU, so delivery
        // works even on headless machines.
        let (tx, rx) = mpsc::channel();
        let collector = Collector::new(Box::new(ChannelSink { delivered: tx }));
        assert!(collector.process_frame(test_frame()));
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), (2, 2));
        wait_until_idle(&collector);
        assert!(collector.process_frame(test_frame()));
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), (2, 2));
        assert_eq!(collector.received_frames(), 2);
        assert_eq!(collector.dropped_frames(), 0);
    }

    #[test]
    fn test_overlapping_frame_is_dropped() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let collector = Collector::new(Box::new(BlockingSink {
            entered: entered_tx,
            release: release_rx,
        }));

        assert!(collector.process_frame(test_frame()));
        // The worker is parked inside the sink; the guard stays set
        // until it returns, so the next frame must be dropped.
        entered_rx.recv_timeout(WAIT).unwrap();
        assert!(!collector.process_frame(test_frame()));
        assert_eq!(collector.dropped_frames(), 1);

        release_tx.send(()).unwrap();
        wait_until_idle(&collector);
        assert!(collector.process_frame(test_frame()));
        entered_rx.recv_timeout(WAIT).unwrap();
        release_tx.send(()).unwrap();
        wait_until_idle(&collector);
        assert_eq!(collector.received_frames(), 3);
        assert_eq!(collector.dropped_frames(), 1);
    }

    #[test]
    fn test_set_filters_replaces_chain() {
        let (tx, _rx) = mpsc::channel();
        let mut collector = Collector::new(Box::new(ChannelSink { delivered: tx }));
        assert!(collector.filters().is_empty());
        collector.set_filters(vec![Filter::grayscale(), Filter::invert()]);
        assert_eq!(collector.filters().len(), 2);
    }
}
