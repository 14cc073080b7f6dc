//! Screen capture domain: public API.
//!
//! This module owns the whole on-demand capture pipeline: the mirroring
//! grant, the intermittently attached capture surface, the poll-and-decode
//! session and the single worker thread that runs captures serially.
//! External code should only use the items re-exported here.

mod frame;
mod grant;
mod session;
mod surface;
mod waiter;
mod worker;

#[cfg(feature = "desktop")]
pub mod desktop;
pub mod platform;
pub mod synthetic;

pub use frame::{copy_frame, decode_frame, FrameError, PaddedFrame, PixelImage};
pub use grant::{GrantToken, ProjectionGrant};
pub use session::CaptureSession;
pub use surface::{build as build_surface, CaptureSurface, FrameLease, SurfaceStrategy};
pub use waiter::{FrameWaiter, SettlePollWaiter};
pub use worker::{CaptureTicket, CaptureWorker};

use platform::BackendError;

/// Everything that can end a capture without an image.
///
/// Errors travel back to the requester as values on the result channel;
/// nothing here is fatal to the process.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Screen mirroring permission was not granted")]
    InvalidToken,

    #[error("Screen mirroring permission was revoked")]
    GrantRevoked,

    #[error("Capture surface setup failed: {0}")]
    SurfaceSetupFailed(String),

    #[error("No frame produced after {attempts} attempts")]
    NoFrameAvailable { attempts: u32 },

    #[error("A capture is already in progress")]
    CaptureAlreadyInProgress,

    #[error("Frame decode failed: {0}")]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("Capture worker has stopped")]
    WorkerStopped,

    #[error("Unexpected capture failure: {0}")]
    Internal(String),
}

impl CaptureError {
    /// Whether retrying the same user action can succeed. A revoked or
    /// refused grant needs the authorization flow to run again first.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, CaptureError::GrantRevoked | CaptureError::InvalidToken)
    }
}
