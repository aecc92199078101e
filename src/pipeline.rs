//! The render pipeline: session -> readiness -> capture -> teardown.

use crate::capture::{capturer_for, ImageArtifact};
use crate::codec;
use crate::driver::{LaunchConfig, Launcher};
use crate::hooks::{HookSink, LogSink};
use crate::host::adapter_for;
use crate::session::RenderSession;
use crate::spec::ChartSpec;
use crate::sync::{self, RenderAttempt, Waypoint};
use crate::{Delivery, Error, RenderOptions, Result};
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Render with a specific launcher. Debug options install the `LogSink`.
pub fn render_with(
    launcher: &dyn Launcher,
    spec: &ChartSpec,
    destination: impl AsRef<Path>,
    options: &RenderOptions,
) -> Result<ImageArtifact> {
    let hooks = options
        .debug
        .then(|| Arc::new(LogSink) as Arc<dyn HookSink>);
    render_observed(launcher, spec, destination, options, hooks)
}

/// Render with an explicit instrumentation sink (`None` disables hooks).
///
/// Opens a fresh session, runs one attempt, optionally holds the session for
/// inspection in debug mode, and always tears the session down.
pub fn render_observed(
    launcher: &dyn Launcher,
    spec: &ChartSpec,
    destination: impl AsRef<Path>,
    options: &RenderOptions,
    hooks: Option<Arc<dyn HookSink>>,
) -> Result<ImageArtifact> {
    options.validate()?;
    let destination = resolve_destination(destination.as_ref())?;

    // Fail before launching a browser when the token cannot be built
    if options.delivery() == Delivery::Url {
        codec::encode_for_transport(spec)?;
    }

    let config = LaunchConfig {
        headless: options.headless(),
        viewport: options.viewport,
        hooks,
    };
    let mut session = RenderSession::open(launcher, &config)?;

    let result = render_in_session(&mut session, spec, &destination, options);
    if let Err(e) = &result {
        warn!("Render of {} failed: {}", spec.fingerprint(), e);
    }

    if options.holds_for_inspection() {
        session.hold_for_inspection(Duration::from_millis(options.hold_ms), &options.hold_signal);
    }

    if let Err(e) = session.close() {
        warn!("Failed to close session {}: {}", session.id(), e);
    }

    result
}

/// Run one attempt on an open session.
///
/// Every attempt passes through `about:blank` before loading the editor, so a
/// session can be reused for several sequential renders without a chart from
/// an earlier attempt satisfying the rendered-output wait.
pub fn render_in_session(
    session: &mut RenderSession,
    spec: &ChartSpec,
    destination: &Path,
    options: &RenderOptions,
) -> Result<ImageArtifact> {
    let delivery = options.delivery();
    let timing = options.timing();
    let host = adapter_for(delivery, options.host.clone());
    let capturer = capturer_for(options.strategy, options.host.selectors.clone());

    let mut attempt = RenderAttempt::new(
        format!("{}@{}", spec.fingerprint(), session.id()),
        options.strategy,
        delivery,
        timing,
    );
    debug!(
        "[{}] rendering via {:?} delivery, {:?} capture",
        attempt.id(),
        delivery,
        options.strategy
    );

    let page = session.page()?;
    sync::drive_to_rendered(page, host.as_ref(), spec, &mut attempt)?;

    let artifact = capturer.capture(page, destination, &timing)?;
    attempt.advance(Waypoint::Captured)?;
    debug!("[{}] captured in {:?}", attempt.id(), attempt.elapsed());

    Ok(artifact)
}

/// Absolute form of `path`, with a leading `~` expanded
pub(crate) fn resolve_destination(path: &Path) -> Result<PathBuf> {
    let expanded = match path.strip_prefix("~") {
        Ok(rest) => match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    };
    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir()?.join(expanded)
    };
    if absolute.file_name().is_none() {
        return Err(Error::ConfigError(format!(
            "destination {} does not name a file",
            path.display()
        )));
    }
    Ok(absolute)
}
