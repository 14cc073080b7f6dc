//! Waiting for the compositor's first frame after the sink is attached.
//!
//! The platform gives no "frame ready" notification, so the default
//! waiter sleeps for a fixed settle interval and then polls a bounded
//! number of times. This is an approximation: it can return before the
//! overlay-free frame lands on a slow device and it always pays the full
//! settle delay on a fast one. A backend that gains a real frame-ready
//! signal should get its own `FrameWaiter` instead of touching the
//! session.

use super::grant::ProjectionGrant;
use super::platform::SlotId;
use super::surface::CaptureSurface;
use super::CaptureError;
use std::thread;
use std::time::Duration;

pub trait FrameWaiter: Send {
    /// Blocks the calling (worker) thread until a frame slot is held or
    /// the wait is given up.
    fn wait_for_frame(
        &self,
        surface: &mut dyn CaptureSurface,
        grant: &ProjectionGrant,
    ) -> Result<SlotId, CaptureError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlePollWaiter {
    pub settle: Duration,
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for SettlePollWaiter {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(150),
            attempts: 3,
            backoff: Duration::from_millis(50),
        }
    }
}

impl SettlePollWaiter {
    pub fn new(settle: Duration, attempts: u32, backoff: Duration) -> Self {
        Self {
            settle,
            attempts: attempts.max(1),
            backoff,
        }
    }
}

impl FrameWaiter for SettlePollWaiter {
    fn wait_for_frame(
        &self,
        surface: &mut dyn CaptureSurface,
        grant: &ProjectionGrant,
    ) -> Result<SlotId, CaptureError> {
        thread::sleep(self.settle);
        grant.ensure_active()?;

        for attempt in 1..=self.attempts {
            if let Some(slot) = surface.acquire_latest()? {
                log::debug!("[CAPTURE] Frame acquired on attempt {}", attempt);
                return Ok(slot);
            }
            if attempt < self.attempts {
                thread::sleep(self.backoff);
                grant.ensure_active()?;
            }
        }

        log::warn!("[CAPTURE] No frame after {} attempts", self.attempts);
        Err(CaptureError::NoFrameAvailable {
            attempts: self.attempts,
        })
    }
}
