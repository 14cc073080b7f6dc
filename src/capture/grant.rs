//! The one-time mirroring authorization and its revocation signal.
//!
//! A `ProjectionGrant` is a cheap cloneable handle. Every component that
//! needs to know whether mirroring is still allowed holds a clone and asks
//! it directly, so there is no process-wide "projection active" flag.

use super::CaptureError;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

const ACTIVE: u8 = 0;
const REVOKED: u8 = 1;
const RELEASED: u8 = 2;

/// Raw answer of the platform permission flow.
///
/// A `result_code` of 0 means the user cancelled the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantToken {
    pub result_code: i32,
    pub payload: Option<Vec<u8>>,
}

impl GrantToken {
    pub fn new(result_code: i32, payload: Option<Vec<u8>>) -> Self {
        Self {
            result_code,
            payload,
        }
    }

    /// The answer produced when the user dismisses the prompt.
    pub fn cancelled() -> Self {
        Self::new(0, None)
    }

    pub fn is_granted(&self) -> bool {
        self.result_code != 0 && self.payload.as_ref().is_some_and(|p| !p.is_empty())
    }
}

type RevocationCallback = Box<dyn Fn() + Send + Sync>;

struct GrantInner {
    result_code: i32,
    state: AtomicU8,
    callbacks: Mutex<Vec<RevocationCallback>>,
}

#[derive(Clone)]
pub struct ProjectionGrant {
    inner: Arc<GrantInner>,
}

impl std::fmt::Debug for ProjectionGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectionGrant")
            .field("result_code", &self.inner.result_code)
            .field("active", &self.is_active())
            .field("revocation_observed", &self.revocation_observed())
            .finish()
    }
}

impl ProjectionGrant {
    /// Turns the platform's permission answer into a live grant.
    pub fn acquire(token: GrantToken) -> Result<Self, CaptureError> {
        if !token.is_granted() {
            log::warn!(
                "[GRANT] Refusing token (result_code={}, payload={})",
                token.result_code,
                token.payload.is_some()
            );
            return Err(CaptureError::InvalidToken);
        }

        log::info!("[GRANT] Mirroring grant acquired");
        Ok(Self {
            inner: Arc::new(GrantInner {
                result_code: token.result_code,
                state: AtomicU8::new(ACTIVE),
                callbacks: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn is_active(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == ACTIVE
    }

    /// True once the platform has taken the grant away.
    pub fn revocation_observed(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == REVOKED
    }

    pub fn ensure_active(&self) -> Result<(), CaptureError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(CaptureError::GrantRevoked)
        }
    }

    /// Register a callback for platform-initiated revocation.
    ///
    /// Callbacks run on whichever thread delivers the revocation. They
    /// must only hand the news over to the control thread (e.g. push onto
    /// a channel), never touch overlay state themselves. A callback
    /// registered after revocation runs immediately.
    pub fn on_revoked<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        if self.revocation_observed() {
            callback();
            return;
        }

        let mut callbacks = match self.inner.callbacks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Re-check under the lock: `revoke` drains the list while holding it.
        if self.revocation_observed() {
            drop(callbacks);
            callback();
            return;
        }
        callbacks.push(Box::new(callback));
    }

    /// Platform signal: mirroring was stopped from outside the app.
    pub fn revoke(&self) {
        if self
            .inner
            .state
            .compare_exchange(ACTIVE, REVOKED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        log::warn!("[GRANT] Mirroring grant revoked by the platform");

        let callbacks = {
            let mut guard = match self.inner.callbacks.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            std::mem::take(&mut *guard)
        };
        for callback in callbacks {
            callback();
        }
    }

    /// Explicit stop by the app. Does not fire revocation callbacks.
    pub fn release(&self) {
        if self
            .inner
            .state
            .compare_exchange(ACTIVE, RELEASED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            log::info!("[GRANT] Mirroring grant released");
            if let Ok(mut guard) = self.inner.callbacks.lock() {
                guard.clear();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn live_token() -> GrantToken {
        GrantToken::new(-1, Some(vec![7, 7, 7]))
    }

    #[test]
    fn cancelled_or_empty_tokens_are_refused() {
        assert!(matches!(
            ProjectionGrant::acquire(GrantToken::cancelled()),
            Err(CaptureError::InvalidToken)
        ));
        assert!(matches!(
            ProjectionGrant::acquire(GrantToken::new(-1, None)),
            Err(CaptureError::InvalidToken)
        ));
        assert!(matches!(
            ProjectionGrant::acquire(GrantToken::new(-1, Some(Vec::new()))),
            Err(CaptureError::InvalidToken)
        ));
        assert!(matches!(
            ProjectionGrant::acquire(GrantToken::new(0, Some(vec![1]))),
            Err(CaptureError::InvalidToken)
        ));
    }

    #[test]
    fn revoke_fires_callbacks_exactly_once() {
        let grant = ProjectionGrant::acquire(live_token()).unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        grant.on_revoked(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        grant.revoke();
        grant.revoke();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!grant.is_active());
        assert!(grant.revocation_observed());
        assert!(matches!(grant.ensure_active(), Err(CaptureError::GrantRevoked)));
    }

    #[test]
    fn late_registration_fires_immediately() {
        let grant = ProjectionGrant::acquire(live_token()).unwrap();
        grant.revoke();

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        grant.on_revoked(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clones_share_state() {
        let grant = ProjectionGrant::acquire(live_token()).unwrap();
        let other = grant.clone();
        other.revoke();
        assert!(!grant.is_active());
    }

    #[test]
    fn release_is_silent_and_idempotent() {
        let grant = ProjectionGrant::acquire(live_token()).unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        grant.on_revoked(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        grant.release();
        grant.release();
        grant.revoke();

        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!grant.is_active());
        assert!(!grant.revocation_observed());
    }
}
