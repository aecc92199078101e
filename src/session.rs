//! Session controller: one browser, one page, explicit teardown.

use crate::driver::{closed_page_error, LaunchConfig, Launcher, PageDriver};
use crate::Result;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// How often the inspection hold checks whether the operator closed the browser
const HOLD_LIVENESS_INTERVAL: Duration = Duration::from_millis(250);

/// One browser automation session.
///
/// The page is only reachable through `&mut self`, so a session can never
/// drive two render attempts at once.
pub struct RenderSession {
    id: u64,
    page: Option<Box<dyn PageDriver>>,
}

impl RenderSession {
    /// Launch a browser with a single page
    pub fn open(launcher: &dyn Launcher, config: &LaunchConfig) -> Result<Self> {
        let page = launcher.launch(config)?;
        let session = Self::from_page(page);
        debug!("Opened session {} ({:?})", session.id, config);
        Ok(session)
    }

    /// Wrap an already-created page
    pub fn from_page(page: Box<dyn PageDriver>) -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            page: Some(page),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_open(&self) -> bool {
        self.page.is_some()
    }

    /// The active page, or an error once the session is closed
    pub fn page(&mut self) -> Result<&mut (dyn PageDriver + 'static)> {
        match self.page.as_mut() {
            Some(page) => Ok(&mut **page),
            None => Err(closed_page_error()),
        }
    }

    /// Release the page and browser. Safe to call more than once.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut page) = self.page.take() {
            debug!("Closing session {}", self.id);
            page.close()?;
        }
        Ok(())
    }

    /// Keep the session alive so an operator can inspect the page.
    ///
    /// This is a bounded wait, not a hang: it ends when `signal` is released,
    /// when the browser or page is closed by hand, or after `max`.
    pub fn hold_for_inspection(&mut self, max: Duration, signal: &HoldSignal) -> HoldOutcome {
        info!(
            "Session {} held open for inspection (up to {:?}); close the browser window or release the hold to continue",
            self.id, max
        );
        let deadline = Instant::now() + max;
        let outcome = loop {
            let Some(page) = self.page.as_mut() else {
                break HoldOutcome::PageClosed;
            };
            if page.is_closed() {
                break HoldOutcome::PageClosed;
            }
            let now = Instant::now();
            if now >= deadline {
                break HoldOutcome::Elapsed;
            }
            if signal.wait_timeout(HOLD_LIVENESS_INTERVAL.min(deadline - now)) {
                break HoldOutcome::Released;
            }
        };
        info!("Inspection hold on session {} ended: {:?}", self.id, outcome);
        outcome
    }
}

impl Drop for RenderSession {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close session {}: {}", self.id, e);
        }
    }
}

/// Why an inspection hold ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldOutcome {
    /// The operator released the hold
    Released,
    /// The browser window or page went away
    PageClosed,
    /// The maximum hold time passed
    Elapsed,
}

/// Cancellation handle for `RenderSession::hold_for_inspection`.
///
/// Clones share state; releasing any clone ends every hold waiting on it.
#[derive(Debug, Clone, Default)]
pub struct HoldSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl HoldSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn release(&self) {
        let (released, cv) = &*self.inner;
        *released.lock().unwrap() = true;
        cv.notify_all();
    }

    pub fn is_released(&self) -> bool {
        *self.inner.0.lock().unwrap()
    }

    /// Wait up to `timeout` for a release; true if released
    fn wait_timeout(&self, timeout: Duration) -> bool {
        let (released, cv) = &*self.inner;
        let guard = released.lock().unwrap();
        let (guard, _) = cv
            .wait_timeout_while(guard, timeout, |released| !*released)
            .unwrap();
        *guard
    }
}
