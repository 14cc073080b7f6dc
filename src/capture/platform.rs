//! Platform seam: the compositor side of screen mirroring.
//!
//! A backend hands out two kinds of resources: a small pool of pixel
//! buffers the compositor writes into, and a virtual output that mirrors
//! the display into whichever pool sink is attached to it. Nothing above
//! this module knows which OS (or simulation) sits behind the traits.

/// Display metrics used to size the virtual output and its buffer pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayInfo {
    pub width: u32,
    pub height: u32,
    pub density_dpi: u32,
}

/// Pixel layout of a buffer pool. Only 8-bit-per-channel RGBA is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgba8888,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8888 => 4,
        }
    }
}

/// Shape of a buffer pool requested from the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSpec {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub slots: usize,
}

/// Index of one buffer slot inside a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(pub usize);

/// Identifies the producer end of a buffer pool so a virtual output can
/// be pointed at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkId(pub u64);

/// Borrowed view of one filled buffer slot.
///
/// `row_stride` may exceed `pixel_stride * width` when the producer pads
/// rows for alignment. The view never outlives the slot it points into.
#[derive(Debug, Clone, Copy)]
pub struct RawFrame<'a> {
    pub width: u32,
    pub height: u32,
    pub row_stride: usize,
    pub pixel_stride: usize,
    pub data: &'a [u8],
}

/// Entry point into the platform's mirroring facility.
pub trait MirrorBackend: Send + Sync {
    /// Metrics of the (single) display being mirrored.
    fn display(&self) -> DisplayInfo;

    /// Create a buffer pool. The pool starts empty; the compositor only
    /// writes into it while a virtual output has its sink attached.
    fn open_buffer_pool(&self, spec: &PoolSpec) -> Result<Box<dyn BufferPool>, BackendError>;

    /// Create a virtual output mirroring `display`, initially detached.
    fn open_output(&self, display: &DisplayInfo) -> Result<Box<dyn VirtualOutput>, BackendError>;
}

/// Consumer side of the compositor's buffer queue.
pub trait BufferPool: Send {
    fn sink(&self) -> SinkId;

    /// Take ownership of the newest filled slot, dropping older ones.
    /// `Ok(None)` means nothing has been produced yet.
    fn acquire_latest(&mut self) -> Result<Option<SlotId>, BackendError>;

    /// Borrow the bytes of a slot previously returned by `acquire_latest`.
    fn frame(&self, slot: SlotId) -> Result<RawFrame<'_>, BackendError>;

    /// Hand a slot back to the producer.
    fn release(&mut self, slot: SlotId);

    /// Free every slot. Must tolerate repeated calls.
    fn close(&mut self);
}

/// Off-screen render target the compositor mirrors the display into.
pub trait VirtualOutput: Send {
    /// Attach (`Some`) or detach (`None`) the sink frames are written to.
    fn set_sink(&mut self, sink: Option<SinkId>);

    /// Destroy the output. Must tolerate repeated calls.
    fn release(&mut self);
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Mirroring backend unavailable: {0}")]
    Unavailable(String),

    #[error("Buffer pool is closed")]
    PoolClosed,

    #[error("All {0} buffer slots are held by the consumer")]
    PoolExhausted(usize),

    #[error("Slot {0} is not held by the consumer")]
    SlotNotHeld(usize),

    #[error("Platform capture failed: {0}")]
    Platform(String),
}
