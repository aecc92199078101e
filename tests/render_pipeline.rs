//! End-to-end pipeline behaviour against the scripted mock editor

use chartshot::mock::{MockDownload, MockHostConfig, MockLauncher};
use chartshot::{render_with, CaptureError, ChartSpec, Delivery, Error, RenderOptions, Strategy, Waypoint};
use std::time::{Duration, Instant};

fn spec() -> ChartSpec {
    ChartSpec::from_json_str(
        r#"{
            "source": {"name": "donors", "source": "./data/donors.csv"},
            "representation": {
                "mark": "bar",
                "mapping": [
                    {"encoding": "x", "field": "sex", "type": "nominal"},
                    {"encoding": "y", "field": "*", "type": "quantitative", "operation": "count"}
                ]
            }
        }"#,
    )
    .expect("valid spec")
}

fn options(strategy: Strategy) -> RenderOptions {
    RenderOptions {
        strategy,
        timeout_ms: 500,
        poll_interval_ms: 1,
        settle_delay_ms: 0,
        ..Default::default()
    }
}

#[test]
fn artifact_exists_is_nonempty_and_deletable() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("nested/charts/bar.png");
    let launcher = MockLauncher::new(MockHostConfig::default());

    let artifact = render_with(&launcher, &spec(), &dest, &options(Strategy::Direct)).unwrap();

    assert_eq!(artifact.path, dest);
    assert!(artifact.path.is_absolute());
    let len = std::fs::metadata(&artifact.path).unwrap().len();
    assert!(len > 0);
    assert_eq!(len, artifact.bytes);
    std::fs::remove_file(&artifact.path).unwrap();

    // Same destination again after deletion
    render_with(&launcher, &spec(), &dest, &options(Strategy::Direct)).unwrap();
    assert!(dest.exists());
}

#[test]
fn direct_capture_is_deterministic_in_size() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = MockLauncher::new(MockHostConfig {
        chart_size: (640, 480),
        ..Default::default()
    });

    let a = render_with(&launcher, &spec(), dir.path().join("a.png"), &options(Strategy::Direct)).unwrap();
    let b = render_with(&launcher, &spec(), dir.path().join("b.png"), &options(Strategy::Direct)).unwrap();

    assert_eq!(a.dimensions, (640, 480));
    assert_eq!(a.dimensions, b.dimensions);
}

#[cfg(feature = "lz")]
#[test]
fn strategies_agree_on_the_rendered_chart() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = MockLauncher::new(MockHostConfig::default());

    let direct = render_with(&launcher, &spec(), dir.path().join("d.png"), &options(Strategy::Direct)).unwrap();
    let interactive =
        render_with(&launcher, &spec(), dir.path().join("i.png"), &options(Strategy::Interactive)).unwrap();

    assert_eq!(direct.strategy, Strategy::Direct);
    assert_eq!(interactive.strategy, Strategy::Interactive);
    assert_eq!(direct.dimensions, interactive.dimensions);

    let log = launcher.log();
    assert_eq!(log.injected.len(), 1, "direct strategy injects");
    assert!(log.navigations[1].contains("?spec="), "interactive strategy uses the URL token");
    assert_eq!(log.download_dirs.len(), 1);
}

#[test]
fn interactive_strategy_works_with_injection() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = MockLauncher::new(MockHostConfig {
        menu_open: true,
        ..Default::default()
    });
    let opts = RenderOptions {
        delivery: Some(Delivery::Inject),
        ..options(Strategy::Interactive)
    };

    let artifact = render_with(&launcher, &spec(), dir.path().join("i.png"), &opts).unwrap();

    assert!(artifact.bytes > 0);
    // The menu was already open, so only the export link is clicked
    let clicks = launcher.log().clicks;
    assert_eq!(clicks, vec![opts.host.selectors.export_png.clone()]);
}

#[test]
fn timeouts_are_enforced() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = MockLauncher::new(MockHostConfig {
        editor_ready_after: None,
        ..Default::default()
    });
    let opts = RenderOptions {
        timeout_ms: 1,
        ..options(Strategy::Direct)
    };

    let started = Instant::now();
    let err = render_with(&launcher, &spec(), dir.path().join("t.png"), &opts).unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(matches!(err, Error::HostNotReady { timeout_ms: 1, .. }));
    assert_eq!(err.waypoint(), Some(Waypoint::Navigating));
    assert_eq!(launcher.log().closes, 1);

    // Editor is up but the chart never draws (unreachable data source)
    let launcher = MockLauncher::new(MockHostConfig {
        render_after: None,
        ..Default::default()
    });
    let started = Instant::now();
    let err = render_with(&launcher, &spec(), dir.path().join("t.png"), &opts).unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(matches!(err, Error::RenderTimeout { timeout_ms: 1, .. }));
    assert_eq!(err.waypoint(), Some(Waypoint::Rendering));
}

#[test]
fn slow_editor_is_waited_for() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = MockLauncher::new(MockHostConfig {
        editor_ready_after: Some(5),
        render_after: Some(5),
        ..Default::default()
    });

    let artifact = render_with(&launcher, &spec(), dir.path().join("slow.png"), &options(Strategy::Direct)).unwrap();
    assert!(artifact.path.exists());
}

#[test]
fn stalled_download_is_reported_and_leaves_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("stalled.png");
    let opts = RenderOptions {
        delivery: Some(Delivery::Inject),
        timeout_ms: 50,
        ..options(Strategy::Interactive)
    };

    let partial = MockLauncher::new(MockHostConfig {
        download: MockDownload::Partial,
        ..Default::default()
    });
    let err = render_with(&partial, &spec(), &dest, &opts).unwrap_err();
    assert!(matches!(err, Error::CaptureFailure(CaptureError::DownloadIncomplete)));

    let never = MockLauncher::new(MockHostConfig {
        download: MockDownload::Never,
        ..Default::default()
    });
    let err = render_with(&never, &spec(), &dest, &opts).unwrap_err();
    assert!(matches!(err, Error::CaptureFailure(CaptureError::DownloadNotStarted)));

    assert!(!dest.exists());
}

#[test]
fn navigation_failure_names_the_waypoint() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = MockLauncher::new(MockHostConfig {
        fail_navigation: true,
        ..Default::default()
    });

    let err = render_with(&launcher, &spec(), dir.path().join("n.png"), &options(Strategy::Direct)).unwrap_err();

    match err {
        Error::NavigationFailure { waypoint, reason } => {
            assert_eq!(waypoint, Waypoint::Navigating);
            assert!(reason.contains("ERR_NAME_NOT_RESOLVED"));
        }
        other => panic!("unexpected error: {other}"),
    }
}
