//! Overlay domain: edge handle, expanded panel, and keeping both out of
//! captured frames.
//!
//! Architecture:
//! - gesture.rs: classify handle gestures (swipe / tap / ignore)
//! - windows.rs: platform window seam plus a headless implementation
//! - visibility.rs: hide-around-capture coordinator
//! - controller.rs: Collapsed/Expanded state machine and panel content

mod controller;
mod gesture;
mod visibility;
mod windows;

pub use controller::{LoadingStage, OverlayController, PanelTab};
pub use gesture::{GestureKind, GesturePolicy};
pub use visibility::{OverlayMode, OverlayVisibilityCoordinator, OverlayVisibilityState, Visibility};
pub use windows::{HeadlessWindows, OverlayWindows, WindowError, WindowProbe, WindowSnapshot};
