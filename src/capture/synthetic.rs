//! Deterministic in-process compositor.
//!
//! Used by the headless binary and by the test-suite. It behaves like a
//! real mirroring backend (frames only appear while a sink is attached,
//! slots must be released, pools and outputs must be closed) and keeps
//! counters so callers can check that nothing leaked.

use super::platform::{
    BackendError, BufferPool, DisplayInfo, MirrorBackend, PoolSpec, RawFrame, SinkId, SlotId,
    VirtualOutput,
};
use std::sync::{Arc, Mutex, MutexGuard};

/// Filler written into row padding so leaked padding is easy to spot.
pub const PADDING_BYTE: u8 = 0xEE;

/// Pixel the simulator writes at (x, y) of its `frame`-th frame.
pub fn expected_pixel(x: u32, y: u32, frame: u32) -> [u8; 4] {
    [x as u8, y as u8, frame as u8, 255]
}

#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub display: DisplayInfo,
    /// Extra bytes appended to every row.
    pub row_padding_bytes: usize,
    /// Polls answered with "no frame yet" after each attach.
    pub empty_polls: usize,
    pub fail_pool_creation: bool,
    pub fail_output_creation: bool,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            display: DisplayInfo {
                width: 64,
                height: 48,
                density_dpi: 160,
            },
            row_padding_bytes: 0,
            empty_polls: 0,
            fail_pool_creation: false,
            fail_output_creation: false,
        }
    }
}

/// Snapshot of the simulator's resource bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyntheticStats {
    pub live_pools: usize,
    pub live_outputs: usize,
    pub pools_opened: usize,
    pub pools_closed: usize,
    pub outputs_opened: usize,
    pub outputs_released: usize,
    pub held_slots: usize,
    pub acquire_calls: usize,
    pub attach_count: usize,
    pub attached: bool,
}

type AttachHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct SimState {
    stats: SyntheticStats,
    attached_sink: Option<SinkId>,
    next_sink: u64,
    polls_since_attach: usize,
    frames_produced: u32,
    attach_hooks: Vec<AttachHook>,
}

#[derive(Clone)]
pub struct SyntheticBackend {
    config: Arc<Mutex<SyntheticConfig>>,
    state: Arc<Mutex<SimState>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl SyntheticBackend {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config: Arc::new(Mutex::new(config)),
            state: Arc::new(Mutex::new(SimState::default())),
        }
    }

    pub fn stats(&self) -> SyntheticStats {
        lock(&self.state).stats
    }

    /// Change behaviour for subsequent operations.
    pub fn reconfigure(&self, update: impl FnOnce(&mut SyntheticConfig)) {
        update(&mut lock(&self.config));
    }

    /// Run `hook` every time a sink gets attached (after the attach took
    /// effect). Lets tests inject events in the middle of a capture.
    pub fn on_attach<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        lock(&self.state).attach_hooks.push(Arc::new(hook));
    }

    fn config(&self) -> SyntheticConfig {
        lock(&self.config).clone()
    }
}

impl MirrorBackend for SyntheticBackend {
    fn display(&self) -> DisplayInfo {
        self.config().display
    }

    fn open_buffer_pool(&self, spec: &PoolSpec) -> Result<Box<dyn BufferPool>, BackendError> {
        let config = self.config();
        if config.fail_pool_creation {
            return Err(BackendError::Unavailable("synthetic pool creation disabled".into()));
        }

        let row_stride = spec.width as usize * spec.format.bytes_per_pixel() + config.row_padding_bytes;
        let sink = {
            let mut state = lock(&self.state);
            state.next_sink += 1;
            state.stats.pools_opened += 1;
            state.stats.live_pools += 1;
            SinkId(state.next_sink)
        };

        Ok(Box::new(SyntheticPool {
            state: self.state.clone(),
            config: self.config.clone(),
            sink,
            width: spec.width,
            height: spec.height,
            row_stride,
            slots: (0..spec.slots).map(|_| Slot::default()).collect(),
            closed: false,
        }))
    }

    fn open_output(&self, _display: &DisplayInfo) -> Result<Box<dyn VirtualOutput>, BackendError> {
        if self.config().fail_output_creation {
            return Err(BackendError::Unavailable("synthetic output creation disabled".into()));
        }

        let mut state = lock(&self.state);
        state.stats.outputs_opened += 1;
        state.stats.live_outputs += 1;
        Ok(Box::new(SyntheticOutput {
            state: self.state.clone(),
            sink: None,
            released: false,
        }))
    }
}

#[derive(Default)]
struct Slot {
    data: Vec<u8>,
    held: bool,
}

struct SyntheticPool {
    state: Arc<Mutex<SimState>>,
    config: Arc<Mutex<SyntheticConfig>>,
    sink: SinkId,
    width: u32,
    height: u32,
    row_stride: usize,
    slots: Vec<Slot>,
    closed: bool,
}

impl SyntheticPool {
    fn render(&self, frame: u32) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.row_stride * self.height as usize);
        for y in 0..self.height {
            let row_start = data.len();
            for x in 0..self.width {
                data.extend_from_slice(&expected_pixel(x, y, frame));
            }
            data.resize(row_start + self.row_stride, PADDING_BYTE);
        }
        data
    }
}

impl BufferPool for SyntheticPool {
    fn sink(&self) -> SinkId {
        self.sink
    }

    fn acquire_latest(&mut self) -> Result<Option<SlotId>, BackendError> {
        if self.closed {
            return Err(BackendError::PoolClosed);
        }
        let empty_polls = lock(&self.config).empty_polls;

        let frame = {
            let mut state = lock(&self.state);
            state.stats.acquire_calls += 1;
            if state.attached_sink != Some(self.sink) {
                return Ok(None);
            }
            if state.polls_since_attach < empty_polls {
                state.polls_since_attach += 1;
                return Ok(None);
            }
            state.frames_produced += 1;
            state.frames_produced
        };

        let index = self
            .slots
            .iter()
            .position(|slot| !slot.held)
            .ok_or(BackendError::PoolExhausted(self.slots.len()))?;
        let data = self.render(frame);
        let slot = &mut self.slots[index];
        slot.data = data;
        slot.held = true;
        lock(&self.state).stats.held_slots += 1;
        Ok(Some(SlotId(index)))
    }

    fn frame(&self, slot: SlotId) -> Result<RawFrame<'_>, BackendError> {
        match self.slots.get(slot.0) {
            Some(s) if s.held => Ok(RawFrame {
                width: self.width,
                height: self.height,
                row_stride: self.row_stride,
                pixel_stride: 4,
                data: &s.data,
            }),
            _ => Err(BackendError::SlotNotHeld(slot.0)),
        }
    }

    fn release(&mut self, slot: SlotId) {
        if let Some(s) = self.slots.get_mut(slot.0) {
            if s.held {
                s.held = false;
                s.data.clear();
                lock(&self.state).stats.held_slots -= 1;
            }
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let held = self.slots.iter().filter(|s| s.held).count();
        self.slots.clear();

        let mut state = lock(&self.state);
        state.stats.held_slots -= held;
        state.stats.live_pools -= 1;
        state.stats.pools_closed += 1;
        if state.attached_sink == Some(self.sink) {
            state.attached_sink = None;
            state.stats.attached = false;
        }
    }
}

impl Drop for SyntheticPool {
    fn drop(&mut self) {
        self.close();
    }
}

struct SyntheticOutput {
    state: Arc<Mutex<SimState>>,
    sink: Option<SinkId>,
    released: bool,
}

impl VirtualOutput for SyntheticOutput {
    fn set_sink(&mut self, sink: Option<SinkId>) {
        if self.released {
            return;
        }
        self.sink = sink;

        let hooks = {
            let mut state = lock(&self.state);
            state.attached_sink = sink;
            state.stats.attached = sink.is_some();
            if sink.is_none() {
                return;
            }
            state.polls_since_attach = 0;
            state.stats.attach_count += 1;
            state.attach_hooks.clone()
        };
        for hook in hooks {
            hook();
        }
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let mut state = lock(&self.state);
        if self.sink.is_some() && state.attached_sink == self.sink {
            state.attached_sink = None;
            state.stats.attached = false;
        }
        state.stats.live_outputs -= 1;
        state.stats.outputs_released += 1;
    }
}

impl Drop for SyntheticOutput {
    fn drop(&mut self) {
        self.release();
    }
}
