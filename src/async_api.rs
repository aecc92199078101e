use crate::capture::ImageArtifact;
use crate::driver::{LaunchConfig, Launcher};
use crate::hooks::{HookSink, LogSink};
use crate::pipeline::{render_in_session, render_with, resolve_destination};
use crate::session::RenderSession;
use crate::spec::ChartSpec;
use crate::{Error, RenderOptions, Result};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;
use tokio::sync::oneshot;

enum Command {
    Render(ChartSpec, PathBuf, oneshot::Sender<Result<ImageArtifact>>),
    Close(oneshot::Sender<Result<()>>),
}

/// An async render handle backed by a dedicated worker thread.
///
/// The worker owns one `RenderSession` and executes render commands one at
/// a time, so callers on any task can share a handle without ever driving
/// the session's page from two attempts at once.
#[derive(Clone)]
pub struct Renderer {
    cmd_tx: Sender<Command>,
}

impl Renderer {
    /// Launch Chrome on a worker thread
    #[cfg(feature = "cdp")]
    pub async fn new(options: RenderOptions) -> Result<Self> {
        Self::with_launcher(Arc::new(crate::cdp::CdpLauncher), options).await
    }

    /// Launch through `launcher` on a worker thread
    pub async fn with_launcher(launcher: Arc<dyn Launcher>, options: RenderOptions) -> Result<Self> {
        options.validate()?;

        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();
        let (init_tx, init_rx): (oneshot::Sender<Result<()>>, oneshot::Receiver<Result<()>>) =
            oneshot::channel();

        thread::spawn(move || {
            let hooks = options
                .debug
                .then(|| Arc::new(LogSink) as Arc<dyn HookSink>);
            let config = LaunchConfig {
                headless: options.headless(),
                viewport: options.viewport,
                hooks,
            };

            // Open the session on the worker thread
            let mut session = match RenderSession::open(launcher.as_ref(), &config) {
                Ok(s) => s,
                Err(err) => {
                    let _ = init_tx.send(Err(err));
                    return;
                }
            };

            let _ = init_tx.send(Ok(()));

            // Command loop
            while let Ok(cmd) = cmd_rx.recv() {
                match cmd {
                    Command::Render(spec, destination, resp) => {
                        let res = resolve_destination(&destination)
                            .and_then(|dest| render_in_session(&mut session, &spec, &dest, &options));
                        let _ = resp.send(res);
                    }
                    Command::Close(resp) => {
                        let res = session.close();
                        let _ = resp.send(res);
                        break;
                    }
                }
            }
            // Every handle dropped without Close: the session closes on drop
        });

        // Wait for the worker to report initialization success or failure
        let init_res = init_rx
            .await
            .map_err(|e| Error::Other(format!("Worker init canceled: {}", e)))?;
        init_res?;

        Ok(Self { cmd_tx })
    }

    /// Render `spec` to `destination` on this handle's session
    pub async fn render(&self, spec: &ChartSpec, destination: impl AsRef<Path>) -> Result<ImageArtifact> {
        let (tx, rx) = oneshot::channel();
        let _ = self.cmd_tx.send(Command::Render(
            spec.clone(),
            destination.as_ref().to_path_buf(),
            tx,
        ));
        rx.await
            .map_err(|e| Error::Other(format!("Render canceled: {}", e)))?
    }

    /// Shut down the worker and close the browser
    pub async fn close(self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        let _ = self.cmd_tx.send(Command::Close(tx));
        rx.await
            .map_err(|e| Error::Other(format!("Close canceled: {}", e)))?
    }
}

/// One spec and where its image goes
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub spec: ChartSpec,
    pub destination: PathBuf,
}

/// Result of one batch job
#[derive(Debug)]
pub struct BatchOutcome {
    pub destination: PathBuf,
    pub result: Result<ImageArtifact>,
}

/// Render with Chrome without blocking the async runtime
#[cfg(feature = "cdp")]
pub async fn render_async(spec: ChartSpec, destination: PathBuf, options: RenderOptions) -> Result<ImageArtifact> {
    tokio::task::spawn_blocking(move || crate::render(&spec, &destination, &options))
        .await
        .map_err(|e| Error::Other(format!("Render task failed: {}", e)))?
}

/// Render independent jobs in parallel, at most `limit` sessions at a time.
///
/// Every job gets its own session; sessions share nothing. Outcomes come back
/// in job order. A failed job does not affect the others, and nothing is
/// retried.
pub async fn render_batch(
    launcher: Arc<dyn Launcher>,
    jobs: Vec<RenderJob>,
    options: &RenderOptions,
    limit: usize,
) -> Vec<BatchOutcome> {
    let limit = limit.max(1);

    stream::iter(jobs.into_iter().map(|job| {
        let launcher = launcher.clone();
        let options = options.clone();
        async move {
            let destination = job.destination.clone();
            let result = tokio::task::spawn_blocking(move || {
                render_with(launcher.as_ref(), &job.spec, &job.destination, &options)
            })
            .await
            .map_err(|e| Error::Other(format!("Render task failed: {}", e)))
            .and_then(|r| r);
            BatchOutcome { destination, result }
        }
    }))
    .buffered(limit)
    .collect()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockHostConfig, MockLauncher};
    use serde_json::json;

    fn fast() -> RenderOptions {
        RenderOptions {
            timeout_ms: 200,
            poll_interval_ms: 1,
            settle_delay_ms: 0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn renderer_serializes_renders_on_one_session() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = MockLauncher::new(MockHostConfig::default());
        let renderer = Renderer::with_launcher(Arc::new(launcher.clone()), fast()).await.unwrap();
        let spec = ChartSpec::new(json!({"representation": {"mark": "bar"}}));

        let a = renderer.render(&spec, dir.path().join("a.png")).await.unwrap();
        let b = renderer.clone().render(&spec, dir.path().join("b.png")).await.unwrap();
        renderer.close().await.unwrap();

        assert!(a.path.exists() && b.path.exists());
        let log = launcher.log();
        assert_eq!(log.launches, 1);
        assert_eq!(log.navigations.len(), 2);
        assert_eq!(log.closes, 1);
    }

    #[tokio::test]
    async fn renderer_reports_launch_failure() {
        let launcher = MockLauncher::new(MockHostConfig {
            fail_launch: true,
            ..Default::default()
        });
        let err = Renderer::with_launcher(Arc::new(launcher), fast()).await.err().unwrap();
        assert!(matches!(err, Error::LaunchFailure(_)));
    }
}
