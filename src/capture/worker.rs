//! Single background worker that owns the capture session.
//!
//! Requests arrive over a queue and each one is answered through its own
//! one-shot channel, so the requester (the control thread) receives every
//! outcome exactly once and never shares the session with the worker.
//! A request made while another capture is still running is rejected
//! rather than queued.

use super::frame::PixelImage;
use super::session::CaptureSession;
use super::CaptureError;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::{mpsc, oneshot};

type CaptureOutcome = Result<PixelImage, CaptureError>;

struct CaptureJob {
    reply: oneshot::Sender<CaptureOutcome>,
}

/// Pending result of one capture request.
pub struct CaptureTicket {
    rx: oneshot::Receiver<CaptureOutcome>,
}

impl CaptureTicket {
    /// Await the outcome from async (control thread) code.
    pub async fn outcome(self) -> CaptureOutcome {
        self.rx.await.unwrap_or(Err(CaptureError::WorkerStopped))
    }

    /// Block until the outcome arrives. Must not be called from inside an
    /// async runtime.
    pub fn wait(self) -> CaptureOutcome {
        self.rx.blocking_recv().unwrap_or(Err(CaptureError::WorkerStopped))
    }
}

pub struct CaptureWorker {
    jobs: Option<mpsc::UnboundedSender<CaptureJob>>,
    busy: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl CaptureWorker {
    /// Moves `session` onto a dedicated thread.
    pub fn spawn(session: CaptureSession) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let busy = Arc::new(AtomicBool::new(false));
        let worker_busy = busy.clone();

        let handle = thread::Builder::new()
            .name("capture-worker".into())
            .spawn(move || run(session, rx, worker_busy))?;

        Ok(Self {
            jobs: Some(tx),
            busy,
            handle: Some(handle),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Queue a capture. Fails immediately if one is already in flight.
    pub fn request(&self) -> Result<CaptureTicket, CaptureError> {
        let jobs = self.jobs.as_ref().ok_or(CaptureError::WorkerStopped)?;

        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::warn!("[CAPTURE] Rejecting request: capture already in progress");
            return Err(CaptureError::CaptureAlreadyInProgress);
        }

        let (reply, rx) = oneshot::channel();
        if jobs.send(CaptureJob { reply }).is_err() {
            self.busy.store(false, Ordering::Release);
            return Err(CaptureError::WorkerStopped);
        }
        Ok(CaptureTicket { rx })
    }

    /// Stop accepting work, let the worker finish and release the surface.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.jobs.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("[CAPTURE] Worker thread panicked during shutdown");
            }
        }
    }
}

impl Drop for CaptureWorker {
    fn drop(&mut self) {
        // Closing the queue is enough; the thread tears the surface down on
        // its own once the current job (if any) is done.
        self.jobs.take();
    }
}

fn run(
    mut session: CaptureSession,
    mut jobs: mpsc::UnboundedReceiver<CaptureJob>,
    busy: Arc<AtomicBool>,
) {
    if let Err(e) = session.prepare() {
        log::warn!("[CAPTURE] Could not pre-create surface: {}", e);
    }

    while let Some(job) = jobs.blocking_recv() {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| session.capture()))
            .unwrap_or_else(|_| Err(CaptureError::Internal("capture panicked".into())));

        busy.store(false, Ordering::Release);
        if job.reply.send(outcome).is_err() {
            log::warn!("[CAPTURE] Requester went away before the result arrived");
        }
    }

    session.shutdown();
    log::debug!("[CAPTURE] Worker stopped");
}
