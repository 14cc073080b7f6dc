//! One capture, start to finish: attach, wait, copy, release, detach.
//!
//! Runs on the capture worker thread only. The two sleeps inside the
//! frame waiter block this thread and nothing else.

use super::frame::PixelImage;
use super::grant::ProjectionGrant;
use super::surface::{CaptureSurface, FrameLease, SurfaceStrategy};
use super::waiter::FrameWaiter;
use super::CaptureError;
use std::ops::{Deref, DerefMut};
use std::time::Instant;

pub struct CaptureSession {
    grant: ProjectionGrant,
    surface: Box<dyn CaptureSurface>,
    waiter: Box<dyn FrameWaiter>,
}

impl CaptureSession {
    pub fn new(
        grant: ProjectionGrant,
        surface: Box<dyn CaptureSurface>,
        waiter: Box<dyn FrameWaiter>,
    ) -> Self {
        Self {
            grant,
            surface,
            waiter,
        }
    }

    pub fn grant(&self) -> &ProjectionGrant {
        &self.grant
    }

    /// Creates persistent resources up front so the first capture does not
    /// pay for them. On-demand surfaces are left alone.
    pub fn prepare(&mut self) -> Result<(), CaptureError> {
        if self.surface.strategy() == SurfaceStrategy::PersistentPaused {
            self.surface.ensure()?;
        }
        Ok(())
    }

    /// Grabs a single frame as an owned image.
    ///
    /// The surface is always detached again before this returns, whatever
    /// the outcome. If the grant went away the surface is torn down too.
    pub fn capture(&mut self) -> Result<PixelImage, CaptureError> {
        let start = Instant::now();

        if let Err(e) = self.grant.ensure_active() {
            self.surface.teardown();
            log::warn!("[CAPTURE] Refused: {}", e);
            return Err(e);
        }

        let result = self.capture_attached();
        let elapsed_ms = start.elapsed().as_millis();

        match &result {
            Ok(image) => log::info!(
                "[CAPTURE] Captured {}x{} in {}ms",
                image.width(),
                image.height(),
                elapsed_ms
            ),
            Err(CaptureError::GrantRevoked) => {
                self.surface.teardown();
                log::warn!("[CAPTURE] Grant revoked mid-capture after {}ms", elapsed_ms);
            }
            Err(e) => log::error!("[CAPTURE] Failed after {}ms: {}", elapsed_ms, e),
        }
        result
    }

    fn capture_attached(&mut self) -> Result<PixelImage, CaptureError> {
        self.surface.ensure()?;

        let mut attached = AttachedSurface::resume(self.surface.as_mut())?;
        let slot = self.waiter.wait_for_frame(&mut *attached, &self.grant)?;

        // Slot goes back to the pool before the crop.
        let copy = FrameLease::new(&mut *attached, slot).copy_out()?;
        let image = copy.crop();

        // Revocation while copying is only noticed here; drop the image.
        self.grant.ensure_active()?;
        Ok(image)
    }

    /// Releases every platform resource. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        self.surface.teardown();
    }
}

/// Keeps the surface attached for as long as it lives; detaches on drop,
/// including while unwinding.
struct AttachedSurface<'a> {
    surface: &'a mut dyn CaptureSurface,
}

impl<'a> AttachedSurface<'a> {
    fn resume(surface: &'a mut dyn CaptureSurface) -> Result<Self, CaptureError> {
        let guard = Self { surface };
        guard.surface.resume()?;
        Ok(guard)
    }
}

impl<'a> Deref for AttachedSurface<'a> {
    type Target = dyn CaptureSurface + 'a;

    fn deref(&self) -> &Self::Target {
        &*self.surface
    }
}

impl<'a> DerefMut for AttachedSurface<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.surface
    }
}

impl Drop for AttachedSurface<'_> {
    fn drop(&mut self) {
        self.surface.pause();
    }
}
