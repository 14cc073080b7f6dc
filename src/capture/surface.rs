//! Capture surface: the virtual output plus the buffer pool it feeds.
//!
//! Two lifecycle strategies sit behind one trait:
//! - `PersistentPaused` creates both resources once and keeps the output
//!   detached between captures (lower latency, resources stay alive).
//! - `OnDemand` creates them for each capture and destroys them as soon as
//!   the capture pauses (higher latency, nothing held while idle).

use super::frame::{self, PaddedFrame};
use super::grant::ProjectionGrant;
use super::platform::{
    BufferPool, MirrorBackend, PixelFormat, PoolSpec, RawFrame, SlotId, VirtualOutput,
};
use super::CaptureError;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceStrategy {
    PersistentPaused,
    OnDemand,
}

impl std::str::FromStr for SurfaceStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "persistent" | "persistent-paused" => Ok(SurfaceStrategy::PersistentPaused),
            "on-demand" | "ondemand" => Ok(SurfaceStrategy::OnDemand),
            other => Err(format!("unknown surface strategy '{}'", other)),
        }
    }
}

/// Contract shared by both strategies.
///
/// `pause` and `teardown` are idempotent and safe to call in any state.
pub trait CaptureSurface: Send {
    fn strategy(&self) -> SurfaceStrategy;

    /// Make sure the output and buffer pool exist.
    fn ensure(&mut self) -> Result<(), CaptureError>;

    /// Attach the pool's sink so the compositor starts producing frames.
    fn resume(&mut self) -> Result<(), CaptureError>;

    /// Detach the sink.
    fn pause(&mut self);

    /// Release the buffer pool and the output.
    fn teardown(&mut self);

    fn is_attached(&self) -> bool;

    /// Take the newest frame's slot, if the compositor produced one.
    fn acquire_latest(&mut self) -> Result<Option<SlotId>, CaptureError>;

    fn frame(&self, slot: SlotId) -> Result<RawFrame<'_>, CaptureError>;

    fn release_frame(&mut self, slot: SlotId);
}

/// Selects a strategy at construction time.
pub fn build(
    strategy: SurfaceStrategy,
    backend: Arc<dyn MirrorBackend>,
    grant: ProjectionGrant,
    slots: usize,
) -> Box<dyn CaptureSurface> {
    let core = SurfaceCore {
        backend,
        grant,
        slots,
        resources: None,
        attached: false,
    };
    match strategy {
        SurfaceStrategy::PersistentPaused => Box::new(PersistentSurface { core }),
        SurfaceStrategy::OnDemand => Box::new(OnDemandSurface { core }),
    }
}

/// A buffer slot checked out of the pool. Goes back on `release` or drop.
pub struct FrameLease<'a> {
    surface: &'a mut dyn CaptureSurface,
    slot: SlotId,
    released: bool,
}

impl<'a> FrameLease<'a> {
    pub fn new(surface: &'a mut dyn CaptureSurface, slot: SlotId) -> Self {
        Self {
            surface,
            slot,
            released: false,
        }
    }

    pub fn raw(&self) -> Result<RawFrame<'_>, CaptureError> {
        self.surface.frame(self.slot)
    }

    pub fn release(mut self) {
        self.give_back();
    }

    /// Copy the slot's bytes out and hand the slot back. The copy keeps its
    /// row padding; cropping happens on the owned frame afterwards.
    pub fn copy_out(mut self) -> Result<PaddedFrame, CaptureError> {
        let copy = frame::copy_frame(&self.raw()?)?;
        self.give_back();
        Ok(copy)
    }

    fn give_back(&mut self) {
        if !self.released {
            self.released = true;
            self.surface.release_frame(self.slot);
        }
    }
}

impl Drop for FrameLease<'_> {
    fn drop(&mut self) {
        self.give_back();
    }
}

struct SurfaceResources {
    pool: Box<dyn BufferPool>,
    output: Box<dyn VirtualOutput>,
}

/// State and resource plumbing both strategies share.
struct SurfaceCore {
    backend: Arc<dyn MirrorBackend>,
    grant: ProjectionGrant,
    slots: usize,
    resources: Option<SurfaceResources>,
    attached: bool,
}

impl SurfaceCore {
    fn create(&mut self) -> Result<(), CaptureError> {
        if self.resources.is_some() {
            return Ok(());
        }
        self.grant.ensure_active()?;

        let display = self.backend.display();
        let spec = PoolSpec {
            width: display.width,
            height: display.height,
            format: PixelFormat::Rgba8888,
            slots: self.slots,
        };
        let mut pool = self
            .backend
            .open_buffer_pool(&spec)
            .map_err(|e| CaptureError::SurfaceSetupFailed(e.to_string()))?;
        let output = match self.backend.open_output(&display) {
            Ok(output) => output,
            Err(e) => {
                pool.close();
                return Err(CaptureError::SurfaceSetupFailed(e.to_string()));
            }
        };

        log::debug!(
            "[SURFACE] Created {}x{} output with {} buffer slots (detached)",
            display.width,
            display.height,
            self.slots
        );
        self.resources = Some(SurfaceResources { pool, output });
        Ok(())
    }

    fn resume(&mut self) -> Result<(), CaptureError> {
        self.grant.ensure_active()?;
        let resources = self.resources.as_mut().ok_or_else(|| {
            CaptureError::SurfaceSetupFailed("surface resources are missing".into())
        })?;
        let sink = resources.pool.sink();
        resources.output.set_sink(Some(sink));
        self.attached = true;
        Ok(())
    }

    fn pause(&mut self) {
        if !self.attached {
            return;
        }
        if let Some(resources) = self.resources.as_mut() {
            resources.output.set_sink(None);
        }
        self.attached = false;
    }

    fn teardown(&mut self) {
        self.pause();
        if let Some(mut resources) = self.resources.take() {
            resources.output.release();
            resources.pool.close();
            log::debug!("[SURFACE] Released output and buffer pool");
        }
    }

    fn acquire_latest(&mut self) -> Result<Option<SlotId>, CaptureError> {
        let resources = self.resources.as_mut().ok_or_else(|| {
            CaptureError::SurfaceSetupFailed("surface resources are missing".into())
        })?;
        Ok(resources.pool.acquire_latest()?)
    }

    fn frame(&self, slot: SlotId) -> Result<RawFrame<'_>, CaptureError> {
        let resources = self.resources.as_ref().ok_or_else(|| {
            CaptureError::SurfaceSetupFailed("surface resources are missing".into())
        })?;
        Ok(resources.pool.frame(slot)?)
    }

    fn release_frame(&mut self, slot: SlotId) {
        if let Some(resources) = self.resources.as_mut() {
            resources.pool.release(slot);
        }
    }
}

struct PersistentSurface {
    core: SurfaceCore,
}

impl CaptureSurface for PersistentSurface {
    fn strategy(&self) -> SurfaceStrategy {
        SurfaceStrategy::PersistentPaused
    }

    fn ensure(&mut self) -> Result<(), CaptureError> {
        self.core.create()
    }

    fn resume(&mut self) -> Result<(), CaptureError> {
        self.core.resume()
    }

    fn pause(&mut self) {
        self.core.pause();
    }

    fn teardown(&mut self) {
        self.core.teardown();
    }

    fn is_attached(&self) -> bool {
        self.core.attached
    }

    fn acquire_latest(&mut self) -> Result<Option<SlotId>, CaptureError> {
        self.core.acquire_latest()
    }

    fn frame(&self, slot: SlotId) -> Result<RawFrame<'_>, CaptureError> {
        self.core.frame(slot)
    }

    fn release_frame(&mut self, slot: SlotId) {
        self.core.release_frame(slot);
    }
}

struct OnDemandSurface {
    core: SurfaceCore,
}

impl CaptureSurface for OnDemandSurface {
    fn strategy(&self) -> SurfaceStrategy {
        SurfaceStrategy::OnDemand
    }

    fn ensure(&mut self) -> Result<(), CaptureError> {
        self.core.create()
    }

    fn resume(&mut self) -> Result<(), CaptureError> {
        self.core.resume()
    }

    /// Detaching ends the capture, so the resources go with it.
    fn pause(&mut self) {
        self.core.teardown();
    }

    fn teardown(&mut self) {
        self.core.teardown();
    }

    fn is_attached(&self) -> bool {
        self.core.attached
    }

    fn acquire_latest(&mut self) -> Result<Option<SlotId>, CaptureError> {
        self.core.acquire_latest()
    }

    fn frame(&self, slot: SlotId) -> Result<RawFrame<'_>, CaptureError> {
        self.core.frame(slot)
    }

    fn release_frame(&mut self, slot: SlotId) {
        self.core.release_frame(slot);
    }
}
