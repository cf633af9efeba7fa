// [apps/controller/src/drivers/frame_source.rs]
/*!
 * APARATO: FRAME SOURCE CONTRACT
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTERS (ESTRATO L6)
 * RESPONSABILIDAD: PRODUCCIÓN CONTINUA DE FOTOGRAMAS CON RECONEXIÓN
 */

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use aegis_domain_models::Frame;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Continuously pulls frames from whatever backs this implementor (RTSP,
/// webcam, file, synthetic test feed), exposing only the latest decoded
/// frame. Exactly one producer runs per instance; `latest()` never blocks
/// on the producer and never panics — while disconnected it simply
/// returns `None`.
pub trait FrameSource: Send + Sync {
    fn start(self: Arc<Self>);
    fn latest(&self) -> Option<Frame>;
    fn release(&self);
}

/// A synthetic source used for `camera.url = "test://..."` and for tests:
/// produces solid-color frames at a fixed resolution, never fails, never
/// needs to reconnect. Stands in for a real RTSP/webcam backend.
pub struct SyntheticFrameSource {
    width: u32,
    height: u32,
    running: AtomicBool,
    latest: Mutex<Option<Frame>>,
    producer: Mutex<Option<JoinHandle<()>>>,
}

impl SyntheticFrameSource {
    pub fn new(width: u32, height: u32) -> Arc<Self> {
        Arc::new(Self {
            width,
            height,
            running: AtomicBool::new(false),
            latest: Mutex::new(None),
            producer: Mutex::new(None),
        })
    }
}

impl FrameSource for SyntheticFrameSource {
    fn start(self: Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let handle = tokio::spawn(async move {
            info!("synthetic frame source started");
            while self.running.load(Ordering::SeqCst) {
                let pixels = vec![0u8; (self.width * self.height * 3) as usize];
                let frame = Frame::new(self.width, self.height, pixels, chrono::Utc::now());
                *self.latest.lock().await = Some(frame);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        });
        // `start` cannot be awaited (the trait is sync, matching the
        // source's fire-and-forget contract), so the producer handle is
        // stashed via a best-effort try_lock; under contention the handle
        // is simply dropped and `release` falls back to the running flag.
        if let Ok(mut slot) = self.producer.try_lock() {
            *slot = Some(handle);
        }
    }

    fn latest(&self) -> Option<Frame> {
        self.latest.try_lock().ok().and_then(|guard| guard.clone())
    }

    fn release(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            warn!("synthetic frame source released");
        }
    }
}

/// Reconnect policy any real (non-synthetic) implementor should follow:
/// on a read failure, release the decoder, wait this long, then reopen
/// the source URL. Repeats forever until `release()` is called.
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// Sleep between successful reads to cap producer CPU usage.
pub const PRODUCER_THROTTLE: Duration = Duration::from_millis(10);
