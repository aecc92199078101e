//! chartshot
//!
//! Renders UDI grammar chart specifications to PNG images by driving the
//! hosted UDI editor in a (headless) Chrome session.
//!
//! # Features
//!
//! - **CDP Backend** (default `cdp` feature): drives Chrome through the
//!   DevTools Protocol via `headless_chrome`
//! - **Two capture strategies**: an element screenshot of the rendered chart,
//!   or the editor's own "Save as PNG" export intercepted as a download
//! - **Two delivery modes**: the spec is injected into the live editor, or
//!   carried in the URL as an lz-string token (default `lz` feature)
//! - **Bounded waits**: every readiness wait has a timeout; nothing retries
//!   behind the caller's back
//!
//! # Example
//!
//! ```no_run
//! use chartshot::{ChartSpec, RenderOptions, Strategy};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let spec = ChartSpec::from_json_str(r#"{
//!     "source": {"name": "donors", "source": "./data/donors.csv"},
//!     "representation": {
//!         "mark": "point",
//!         "mapping": [
//!             {"encoding": "x", "field": "weight_value", "type": "quantitative"},
//!             {"encoding": "y", "field": "height_value", "type": "quantitative"}
//!         ]
//!     }
//! }"#)?;
//!
//! let options = RenderOptions {
//!     strategy: Strategy::Direct,
//!     timeout_ms: 15_000,
//!     ..Default::default()
//! };
//!
//! let artifact = chartshot::render(&spec, "donors.png", &options)?;
//! println!("PNG written to {}", artifact.path.display());
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod error;
pub use error::{CaptureError, Error, Result};

pub mod capture;
pub mod codec;
pub mod driver;
pub mod hooks;
pub mod host;
pub mod metadata;
pub mod mock;
pub mod pipeline;
pub mod session;
pub mod spec;
pub mod sync;

#[cfg(feature = "cdp")]
pub mod cdp;

// Async-friendly rendering API (worker-thread backed)
pub mod async_api;

pub use capture::{Capturer, DirectCapture, ImageArtifact, InteractiveCapture};
pub use driver::{LaunchConfig, Launcher, PageDriver};
pub use host::{HostAdapter, HostProfile, HostSelectors};
pub use pipeline::{render_in_session, render_observed, render_with};
pub use session::{HoldOutcome, HoldSignal, RenderSession};
pub use spec::ChartSpec;
pub use sync::{RenderAttempt, Timing, Waypoint};

pub use async_api::{render_batch, BatchOutcome, RenderJob, Renderer};

/// Default bound for each wait, in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 15_000;

/// How the rendered chart is extracted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Screenshot of the chart container
    #[default]
    Direct,
    /// Trigger the editor's PNG export and intercept the download
    Interactive,
}

impl Strategy {
    /// Delivery used when none is configured explicitly
    pub fn default_delivery(self) -> Delivery {
        match self {
            Strategy::Direct => Delivery::Inject,
            Strategy::Interactive => Delivery::Url,
        }
    }
}

impl std::str::FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "direct" => Ok(Strategy::Direct),
            "interactive" => Ok(Strategy::Interactive),
            other => Err(Error::ConfigError(format!(
                "unknown strategy '{}' (expected direct or interactive)",
                other
            ))),
        }
    }
}

/// How the spec reaches the editor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delivery {
    /// Load the bare editor and write the spec into it
    Inject,
    /// Carry the spec in the navigation URL
    Url,
}

impl std::str::FromStr for Delivery {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "inject" | "injection" => Ok(Delivery::Inject),
            "url" => Ok(Delivery::Url),
            other => Err(Error::ConfigError(format!(
                "unknown delivery '{}' (expected inject or url)",
                other
            ))),
        }
    }
}

/// Viewport dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Options for a render call
///
/// The defaults are the non-debug, headless, direct-capture setup:
///
/// ```
/// let opts = chartshot::RenderOptions::default();
/// assert!(opts.headless());
/// assert_eq!(opts.timeout_ms, 15_000);
/// assert_eq!(opts.delivery(), chartshot::Delivery::Inject);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Visible browser plus page instrumentation
    pub debug: bool,
    /// Run without a window; `None` means `!debug`
    pub headless: Option<bool>,
    /// Bound for every individual wait, in milliseconds
    pub timeout_ms: u64,
    pub strategy: Strategy,
    /// `None` picks the strategy's natural delivery
    pub delivery: Option<Delivery>,
    /// Pause after the chart appears, before capture. A heuristic for late
    /// paint frames, not a guarantee.
    pub settle_delay_ms: u64,
    /// Delay between readiness probes
    pub poll_interval_ms: u64,
    pub viewport: Viewport,
    /// Editor location and selectors
    pub host: HostProfile,
    /// Debug only: keep the session open this long after the attempt for
    /// manual inspection (0 disables the hold)
    pub hold_ms: u64,
    /// Ends a debug hold early
    #[serde(skip)]
    pub hold_signal: HoldSignal,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            debug: false,
            headless: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            strategy: Strategy::Direct,
            delivery: None,
            settle_delay_ms: 200,
            poll_interval_ms: 100,
            viewport: Viewport::default(),
            host: HostProfile::default(),
            hold_ms: 0,
            hold_signal: HoldSignal::default(),
        }
    }
}

impl RenderOptions {
    /// Debug configuration: visible window, instrumentation on
    pub fn debug() -> Self {
        Self {
            debug: true,
            ..Default::default()
        }
    }

    pub fn headless(&self) -> bool {
        self.headless.unwrap_or(!self.debug)
    }

    pub fn delivery(&self) -> Delivery {
        self.delivery.unwrap_or(self.strategy.default_delivery())
    }

    pub fn timing(&self) -> Timing {
        Timing {
            timeout: Duration::from_millis(self.timeout_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
        }
    }

    /// Whether a render keeps its browser open for inspection afterwards
    pub fn holds_for_inspection(&self) -> bool {
        self.debug && self.hold_ms > 0
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(Error::ConfigError("timeout_ms must be at least 1".into()));
        }
        // A zero interval would spin a core for the whole timeout
        if self.poll_interval_ms == 0 {
            return Err(Error::ConfigError("poll_interval_ms must be at least 1".into()));
        }
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(Error::ConfigError("viewport must be non-empty".into()));
        }
        if self.host.editor_url.is_empty() {
            return Err(Error::ConfigError("editor_url must not be empty".into()));
        }
        Ok(())
    }
}

/// Render `spec` to `destination` using Chrome.
///
/// Returns the written artifact; its path is absolute, exists and is
/// non-empty. On error nothing is left at `destination` by this call.
#[cfg(feature = "cdp")]
pub fn render(
    spec: &ChartSpec,
    destination: impl AsRef<std::path::Path>,
    options: &RenderOptions,
) -> Result<ImageArtifact> {
    pipeline::render_with(&cdp::CdpLauncher, spec, destination, options)
}
