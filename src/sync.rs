//! Readiness synchronizer.
//!
//! A render attempt advances through named waypoints:
//!
//! ```text
//! Navigating -> HostReady -> Injected | UrlLoaded -> Rendering -> Rendered -> Captured
//! ```
//!
//! Every wait is a bounded poll. The only unconditional sleep is the settle
//! delay after the rendered output shows up, which absorbs late paint frames
//! the page gives no signal for. It is a heuristic: under heavy load a chart
//! can still be captured mid-paint.

use crate::driver::PageDriver;
use crate::host::{HostAdapter, BLANK_URL};
use crate::spec::ChartSpec;
use crate::{Delivery, Error, Result, Strategy};
use log::debug;
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

/// Named milestones of a render attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Waypoint {
    Navigating,
    HostReady,
    Injected,
    UrlLoaded,
    Rendering,
    Rendered,
    Captured,
}

impl Waypoint {
    /// Whether `next` is a legal successor of `self`
    pub fn can_advance_to(self, next: Waypoint) -> bool {
        use Waypoint::*;
        matches!(
            (self, next),
            (Navigating, HostReady)
                | (HostReady, Injected)
                | (HostReady, UrlLoaded)
                | (Injected, Rendering)
                | (UrlLoaded, Rendering)
                | (Rendering, Rendered)
                | (Rendered, Captured)
        )
    }
}

impl fmt::Display for Waypoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Waypoint::Navigating => "navigating",
            Waypoint::HostReady => "host-ready",
            Waypoint::Injected => "injected",
            Waypoint::UrlLoaded => "url-loaded",
            Waypoint::Rendering => "rendering",
            Waypoint::Rendered => "rendered",
            Waypoint::Captured => "captured",
        };
        f.write_str(name)
    }
}

/// Timing knobs shared by the synchronizer and the capturers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Upper bound for every individual wait
    pub timeout: Duration,
    /// Delay between readiness probes
    pub poll_interval: Duration,
    /// Fixed pause after the output appears, before capture
    pub settle_delay: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(crate::DEFAULT_TIMEOUT_MS),
            poll_interval: Duration::from_millis(100),
            settle_delay: Duration::from_millis(200),
        }
    }
}

impl Timing {
    pub fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }

    /// Poll `probe` until it returns true or the timeout elapses.
    ///
    /// The probe always runs at least once, and never again after the
    /// deadline. Returns whether the condition was met.
    pub fn poll_until(&self, mut probe: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + self.timeout;
        loop {
            if probe() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep(self.poll_interval.min(deadline - now));
        }
    }
}

/// Transient state of one render call
#[derive(Debug)]
pub struct RenderAttempt {
    id: String,
    strategy: Strategy,
    delivery: Delivery,
    timing: Timing,
    waypoint: Waypoint,
    history: Vec<(Waypoint, Duration)>,
    started: Instant,
}

impl RenderAttempt {
    pub fn new(id: impl Into<String>, strategy: Strategy, delivery: Delivery, timing: Timing) -> Self {
        Self {
            id: id.into(),
            strategy,
            delivery,
            timing,
            waypoint: Waypoint::Navigating,
            history: vec![(Waypoint::Navigating, Duration::ZERO)],
            started: Instant::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn delivery(&self) -> Delivery {
        self.delivery
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    /// Waypoint reached so far
    pub fn waypoint(&self) -> Waypoint {
        self.waypoint
    }

    /// Reached waypoints in order
    pub fn history(&self) -> Vec<Waypoint> {
        self.history.iter().map(|(w, _)| *w).collect()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Move to `next`, rejecting illegal or delivery-inconsistent transitions
    pub fn advance(&mut self, next: Waypoint) -> Result<()> {
        let delivery_ok = match next {
            Waypoint::Injected => self.delivery == Delivery::Inject,
            Waypoint::UrlLoaded => self.delivery == Delivery::Url,
            _ => true,
        };
        if !self.waypoint.can_advance_to(next) || !delivery_ok {
            return Err(Error::Other(format!(
                "Illegal waypoint transition {} -> {} ({:?} delivery)",
                self.waypoint, next, self.delivery
            )));
        }
        let at = self.started.elapsed();
        debug!("[{}] {} -> {} at {:?}", self.id, self.waypoint, next, at);
        self.waypoint = next;
        self.history.push((next, at));
        Ok(())
    }
}

/// Drive `page` from a fresh navigation to the `Rendered` waypoint.
pub fn drive_to_rendered(
    page: &mut dyn PageDriver,
    host: &dyn HostAdapter,
    spec: &ChartSpec,
    attempt: &mut RenderAttempt,
) -> Result<()> {
    let timing = *attempt.timing();

    // Navigating -> HostReady
    let url = host.entry_url(spec)?;
    for target in [BLANK_URL, url.as_str()] {
        page.navigate(target, timing.timeout).map_err(|e| Error::NavigationFailure {
            waypoint: attempt.waypoint(),
            reason: e.to_string(),
        })?;
    }

    let probe = host.ready_probe().to_string();
    // Evaluation errors while the page is still settling just mean "not yet"
    let ready = timing.poll_until(|| page.evaluate_bool(&probe).unwrap_or(false));
    if !ready {
        return Err(match host.delivery() {
            Delivery::Inject => Error::HostNotReady {
                waypoint: attempt.waypoint(),
                timeout_ms: timing.timeout_ms(),
            },
            Delivery::Url => Error::NavigationFailure {
                waypoint: attempt.waypoint(),
                reason: format!("DOM content not loaded within {}ms", timing.timeout_ms()),
            },
        });
    }
    attempt.advance(Waypoint::HostReady)?;

    // HostReady -> Injected | UrlLoaded
    host.deliver(page, spec)?;
    attempt.advance(match host.delivery() {
        Delivery::Inject => Waypoint::Injected,
        Delivery::Url => Waypoint::UrlLoaded,
    })?;

    // -> Rendering -> Rendered
    attempt.advance(Waypoint::Rendering)?;
    let output = host.selectors().rendered_output.clone();
    let rendered = timing.poll_until(|| page.element_exists(&output).unwrap_or(false));
    if !rendered {
        return Err(Error::RenderTimeout {
            waypoint: attempt.waypoint(),
            timeout_ms: timing.timeout_ms(),
        });
    }
    if !timing.settle_delay.is_zero() {
        thread::sleep(timing.settle_delay);
    }
    attempt.advance(Waypoint::Rendered)?;

    Ok(())
}
