//! Desktop mirroring backend using the `xcap` crate.
//!
//! This is the infrastructure layer and talks to the OS. Desktop
//! compositors have no pausable virtual output, so "attaching the sink"
//! just arms the pool: each poll while armed grabs the primary monitor
//! into a free slot.

use super::platform::{
    BackendError, BufferPool, DisplayInfo, MirrorBackend, PoolSpec, RawFrame, SinkId, SlotId,
    VirtualOutput,
};
use image::RgbaImage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use xcap::Monitor;

/// Captures the primary monitor's screen.
fn capture_primary_monitor() -> Result<RgbaImage, BackendError> {
    let monitors = Monitor::all().map_err(|e| BackendError::Unavailable(e.to_string()))?;

    let primary = monitors
        .into_iter()
        .find(|m| m.is_primary().unwrap_or(false))
        .or_else(|| {
            // Fallback: if no monitor reports as primary, use the first one
            let all = Monitor::all().ok()?;
            all.into_iter().next()
        })
        .ok_or_else(|| BackendError::Unavailable("no monitor found".into()))?;

    primary
        .capture_image()
        .map_err(|e| BackendError::Platform(e.to_string()))
}

pub struct DesktopMirror {
    display: DisplayInfo,
    attached: Arc<Mutex<Option<SinkId>>>,
    next_sink: AtomicU64,
}

impl DesktopMirror {
    /// Probes the primary monitor once to learn its size.
    pub fn primary() -> Result<Self, BackendError> {
        let probe = capture_primary_monitor()?;
        log::info!(
            "[DESKTOP] Primary monitor is {}x{}",
            probe.width(),
            probe.height()
        );
        Ok(Self {
            display: DisplayInfo {
                width: probe.width(),
                height: probe.height(),
                density_dpi: 96,
            },
            attached: Arc::new(Mutex::new(None)),
            next_sink: AtomicU64::new(1),
        })
    }
}

impl MirrorBackend for DesktopMirror {
    fn display(&self) -> DisplayInfo {
        self.display
    }

    fn open_buffer_pool(&self, spec: &PoolSpec) -> Result<Box<dyn BufferPool>, BackendError> {
        let sink = SinkId(self.next_sink.fetch_add(1, Ordering::Relaxed));
        Ok(Box::new(DesktopPool {
            attached: self.attached.clone(),
            sink,
            slots: (0..spec.slots).map(|_| None).collect(),
            closed: false,
        }))
    }

    fn open_output(&self, _display: &DisplayInfo) -> Result<Box<dyn VirtualOutput>, BackendError> {
        Ok(Box::new(DesktopOutput {
            attached: self.attached.clone(),
            released: false,
        }))
    }
}

struct DesktopPool {
    attached: Arc<Mutex<Option<SinkId>>>,
    sink: SinkId,
    slots: Vec<Option<RgbaImage>>,
    closed: bool,
}

impl BufferPool for DesktopPool {
    fn sink(&self) -> SinkId {
        self.sink
    }

    fn acquire_latest(&mut self) -> Result<Option<SlotId>, BackendError> {
        if self.closed {
            return Err(BackendError::PoolClosed);
        }
        let armed = self
            .attached
            .lock()
            .map(|a| *a == Some(self.sink))
            .unwrap_or(false);
        if !armed {
            return Ok(None);
        }

        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(BackendError::PoolExhausted(self.slots.len()))?;
        self.slots[index] = Some(capture_primary_monitor()?);
        Ok(Some(SlotId(index)))
    }

    fn frame(&self, slot: SlotId) -> Result<RawFrame<'_>, BackendError> {
        let image = self
            .slots
            .get(slot.0)
            .and_then(Option::as_ref)
            .ok_or(BackendError::SlotNotHeld(slot.0))?;
        Ok(RawFrame {
            width: image.width(),
            height: image.height(),
            row_stride: image.width() as usize * 4,
            pixel_stride: 4,
            data: image.as_raw(),
        })
    }

    fn release(&mut self, slot: SlotId) {
        if let Some(entry) = self.slots.get_mut(slot.0) {
            entry.take();
        }
    }

    fn close(&mut self) {
        self.closed = true;
        self.slots.clear();
    }
}

struct DesktopOutput {
    attached: Arc<Mutex<Option<SinkId>>>,
    released: bool,
}

impl VirtualOutput for DesktopOutput {
    fn set_sink(&mut self, sink: Option<SinkId>) {
        if self.released {
            return;
        }
        if let Ok(mut attached) = self.attached.lock() {
            *attached = sink;
        }
    }

    fn release(&mut self) {
        if !self.released {
            self.set_sink(None);
            self.released = true;
        }
    }
}
