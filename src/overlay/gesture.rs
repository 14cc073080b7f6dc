//! Gesture disambiguation for the collapsed handle.
//!
//! The handle is docked on the right screen edge, so displacement is
//! measured toward the interior: positive when the finger moved left.
//! A deliberate pull past the drag threshold expands the panel, and so
//! does a near-stationary tap. Partial drags in between do nothing.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GesturePolicy {
    pub drag_threshold: f32,
    pub tap_tolerance: f32,
}

impl Default for GesturePolicy {
    fn default() -> Self {
        Self {
            drag_threshold: 30.0,
            tap_tolerance: 25.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureKind {
    Swipe,
    Tap,
    Ambiguous,
}

impl GestureKind {
    pub fn expands(self) -> bool {
        matches!(self, GestureKind::Swipe | GestureKind::Tap)
    }
}

impl GesturePolicy {
    pub fn classify(&self, start_x: f32, end_x: f32) -> GestureKind {
        let displacement = start_x - end_x;
        if displacement > self.drag_threshold {
            GestureKind::Swipe
        } else if displacement.abs() < self.tap_tolerance {
            GestureKind::Tap
        } else {
            GestureKind::Ambiguous
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(displacement: f32) -> GestureKind {
        GesturePolicy::default().classify(500.0, 500.0 - displacement)
    }

    #[test]
    fn long_pull_is_a_swipe() {
        assert_eq!(classify(40.0), GestureKind::Swipe);
        assert!(classify(40.0).expands());
    }

    #[test]
    fn short_motion_is_a_tap() {
        assert_eq!(classify(10.0), GestureKind::Tap);
        assert_eq!(classify(0.0), GestureKind::Tap);
        assert_eq!(classify(-10.0), GestureKind::Tap);
    }

    #[test]
    fn partial_drag_is_ignored() {
        assert_eq!(classify(27.0), GestureKind::Ambiguous);
        assert_eq!(classify(25.0), GestureKind::Ambiguous);
        assert_eq!(classify(30.0), GestureKind::Ambiguous);
        assert!(!classify(27.0).expands());
    }

    #[test]
    fn pushing_toward_the_edge_is_ignored() {
        assert_eq!(classify(-40.0), GestureKind::Ambiguous);
    }
}
