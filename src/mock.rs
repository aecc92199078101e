//! A deterministic stand-in for the hosted editor.
//!
//! `MockPage` answers the same probes, selectors and clicks the real editor
//! does, with readiness and download behaviour scripted by
//! `MockHostConfig`. It lets the synchronizer, both capture strategies and the
//! full pipeline run in unit tests without Chrome or network access.
//!
//! Like the real single-page editor, a navigation that only changes the URL
//! hash keeps the current document, so the previously drawn chart stays on
//! screen until the new one replaces it. Only `about:blank` or a different
//! document discards it.

use crate::capture::MENU_OPEN_PREFIX;
use crate::driver::{closed_page_error, visible_script, LaunchConfig, Launcher, PageDriver, VISIBLE_PREFIX};
use crate::hooks::{HookSink, PageEvent, RequestTracker};
use crate::host::{injected_text, HostSelectors, BLANK_URL, DOM_READY_PROBE, EDITOR_READY_PROBE};
use crate::{Error, Result};
use image::{ImageFormat, Rgba, RgbaImage};
use serde_json::Value;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What clicking the export action does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockDownload {
    /// A finished PNG appears in the download directory
    Complete,
    /// Only an in-flight `.crdownload` file appears
    Partial,
    /// Nothing is downloaded
    Never,
}

/// Scripted behaviour of the mock editor
#[derive(Debug, Clone)]
pub struct MockHostConfig {
    /// Failed readiness probes before the editor handle appears (`None` = never)
    pub editor_ready_after: Option<usize>,
    /// Failed output probes after delivery before the chart appears (`None` = never)
    pub render_after: Option<usize>,
    /// Every navigation fails
    pub fail_navigation: bool,
    /// Launching fails
    pub fail_launch: bool,
    /// The export menu exists
    pub actions_menu: bool,
    /// The export menu starts expanded
    pub menu_open: bool,
    /// Clicking the menu toggle expands or collapses it
    pub toggle_works: bool,
    pub download: MockDownload,
    /// Size of the rendered chart
    pub chart_size: (u32, u32),
    pub selectors: HostSelectors,
}

impl Default for MockHostConfig {
    fn default() -> Self {
        Self {
            editor_ready_after: Some(0),
            render_after: Some(0),
            fail_navigation: false,
            fail_launch: false,
            actions_menu: true,
            menu_open: false,
            toggle_works: true,
            download: MockDownload::Complete,
            chart_size: (400, 300),
            selectors: HostSelectors::default(),
        }
    }
}

/// Everything the mock observed, shared with the test that created it
#[derive(Debug, Default, Clone)]
pub struct MockLog {
    pub launches: usize,
    pub launched_headless: Vec<bool>,
    pub hooks_installed: usize,
    /// Navigations to anything but `about:blank`
    pub navigations: Vec<String>,
    pub blank_navigations: usize,
    pub injected: Vec<String>,
    /// Chart content (injected text or URL token) in each screenshot or download
    pub captured: Vec<String>,
    pub clicks: Vec<String>,
    pub download_dirs: Vec<PathBuf>,
    pub closes: usize,
}

/// Hands out `MockPage`s that all report into one `MockLog`
#[derive(Debug, Clone)]
pub struct MockLauncher {
    config: MockHostConfig,
    log: Arc<Mutex<MockLog>>,
}

impl MockLauncher {
    pub fn new(config: MockHostConfig) -> Self {
        Self {
            config,
            log: Arc::new(Mutex::new(MockLog::default())),
        }
    }

    /// Snapshot of what has happened so far
    pub fn log(&self) -> MockLog {
        self.log.lock().unwrap().clone()
    }
}

impl Launcher for MockLauncher {
    fn launch(&self, config: &LaunchConfig) -> Result<Box<dyn PageDriver>> {
        if self.config.fail_launch {
            return Err(Error::LaunchFailure("mock browser refused to start".into()));
        }
        {
            let mut log = self.log.lock().unwrap();
            log.launches += 1;
            log.launched_headless.push(config.headless);
            if config.hooks.is_some() {
                log.hooks_installed += 1;
            }
        }
        let mut page = MockPage::with_log(self.config.clone(), self.log.clone());
        page.hooks = config.hooks.clone();
        Ok(Box::new(page))
    }
}

/// Simulated editor page
pub struct MockPage {
    config: MockHostConfig,
    log: Arc<Mutex<MockLog>>,
    hooks: Option<Arc<dyn HookSink>>,
    requests: RequestTracker,
    /// Loaded document, without its hash
    document: Option<String>,
    /// Delivered chart not drawn yet
    pending: Option<String>,
    /// Chart currently on screen
    shown: Option<String>,
    menu_open: bool,
    ready_polls: usize,
    render_polls: usize,
    download_dir: Option<PathBuf>,
    closed: bool,
}

impl MockPage {
    pub fn new(config: MockHostConfig) -> (Self, Arc<Mutex<MockLog>>) {
        let log = Arc::new(Mutex::new(MockLog::default()));
        (Self::with_log(config, log.clone()), log)
    }

    fn with_log(config: MockHostConfig, log: Arc<Mutex<MockLog>>) -> Self {
        let menu_open = config.menu_open;
        Self {
            config,
            log,
            hooks: None,
            requests: RequestTracker::new(),
            document: None,
            pending: None,
            shown: None,
            menu_open,
            ready_polls: 0,
            render_polls: 0,
            download_dir: None,
            closed: false,
        }
    }

    /// Skip straight to a drawn chart
    pub fn force_rendered(&mut self) {
        self.document = Some("mock://editor".to_string());
        self.pending = None;
        self.shown = Some("forced".to_string());
    }

    fn editor_ready(&mut self) -> bool {
        if self.document.is_none() {
            return false;
        }
        match self.config.editor_ready_after {
            Some(n) => {
                let ready = self.ready_polls >= n;
                self.ready_polls += 1;
                ready
            }
            None => false,
        }
    }

    fn emit(&self, event: PageEvent) {
        if let Some(sink) = &self.hooks {
            sink.report(&event);
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(closed_page_error())
        } else {
            Ok(())
        }
    }

    /// Drop the document and everything drawn in it
    fn unload(&mut self) {
        self.document = None;
        self.pending = None;
        self.shown = None;
        self.menu_open = self.config.menu_open;
        self.ready_polls = 0;
        self.render_polls = 0;
    }

    /// Poll of the rendered-output selector; a pending chart draws after
    /// `render_after` polls
    fn poll_rendered(&mut self) -> bool {
        if self.pending.is_some() {
            if let Some(n) = self.config.render_after {
                if self.render_polls >= n {
                    self.shown = self.pending.take();
                }
                self.render_polls += 1;
            }
        }
        self.shown.is_some()
    }

    fn menu_present(&self) -> bool {
        self.shown.is_some() && self.config.actions_menu
    }

    fn record_capture(&self) {
        if let Some(chart) = &self.shown {
            self.log.lock().unwrap().captured.push(chart.clone());
        }
    }

    fn write_download(&self) {
        let Some(dir) = &self.download_dir else {
            return;
        };
        let (w, h) = self.config.chart_size;
        if self.config.download == MockDownload::Complete {
            self.record_capture();
        }
        let _ = match self.config.download {
            MockDownload::Complete => std::fs::write(dir.join("visualization.png"), fake_png(w, h)),
            MockDownload::Partial => std::fs::write(dir.join("Unconfirmed 1.crdownload"), b"\x89PN"),
            MockDownload::Never => Ok(()),
        };
    }
}

impl PageDriver for MockPage {
    fn navigate(&mut self, url: &str, _timeout: Duration) -> Result<()> {
        self.ensure_open()?;
        if url == BLANK_URL {
            self.log.lock().unwrap().blank_navigations += 1;
            self.unload();
            return Ok(());
        }
        let request_id = {
            let mut log = self.log.lock().unwrap();
            log.navigations.push(url.to_string());
            log.navigations.len().to_string()
        };
        self.requests.request_sent(&request_id, url);
        if self.config.fail_navigation {
            self.unload();
            self.emit(self.requests.loading_failed(&request_id, "net::ERR_NAME_NOT_RESOLVED", false));
            return Err(Error::Other("net::ERR_NAME_NOT_RESOLVED".into()));
        }
        self.requests.finished(&request_id);

        let document = url.split('#').next().unwrap_or(url);
        if self.document.as_deref() != Some(document) {
            self.unload();
            self.document = Some(document.to_string());
            self.emit(PageEvent::Console {
                level: "log".into(),
                text: format!("editor loaded from {}", url),
            });
        }
        if let Some((_, token)) = url.split_once("spec=") {
            self.pending = Some(token.to_string());
            self.render_polls = 0;
        }
        Ok(())
    }

    fn evaluate(&mut self, script: &str) -> Result<Value> {
        self.ensure_open()?;
        if script == EDITOR_READY_PROBE {
            return Ok(Value::Bool(self.editor_ready()));
        }
        if script == DOM_READY_PROBE {
            return Ok(Value::Bool(self.document.is_some()));
        }
        if script.starts_with(MENU_OPEN_PREFIX) {
            return Ok(Value::Bool(self.menu_present() && self.menu_open));
        }
        if script.starts_with(VISIBLE_PREFIX) {
            let sel = &self.config.selectors;
            let visible = if script == visible_script(&sel.export_png) {
                self.menu_present() && self.menu_open
            } else if script == visible_script(&sel.actions_toggle) || script == visible_script(&sel.actions_menu) {
                self.menu_present()
            } else if script == visible_script(&sel.output_container) || script == visible_script(&sel.rendered_output) {
                self.shown.is_some()
            } else {
                false
            };
            return Ok(Value::Bool(visible));
        }
        if let Some(text) = injected_text(script) {
            if !self.editor_ready() {
                return Err(Error::Other("TypeError: window.editor is undefined".into()));
            }
            self.log.lock().unwrap().injected.push(text.clone());
            self.pending = Some(text);
            self.render_polls = 0;
            return Ok(Value::Bool(true));
        }
        Ok(Value::Null)
    }

    fn element_exists(&mut self, selector: &str) -> Result<bool> {
        self.ensure_open()?;
        let sel = &self.config.selectors;
        if selector == sel.rendered_output {
            return Ok(self.poll_rendered());
        }
        // The export link stays in the DOM while the menu is collapsed
        Ok(if selector == sel.output_container {
            self.shown.is_some()
        } else if selector == sel.actions_menu || selector == sel.actions_toggle || selector == sel.export_png {
            self.menu_present()
        } else {
            false
        })
    }

    fn screenshot_element(&mut self, selector: &str) -> Result<Vec<u8>> {
        self.ensure_open()?;
        if selector == self.config.selectors.output_container && self.shown.is_some() {
            self.record_capture();
            let (w, h) = self.config.chart_size;
            Ok(fake_png(w, h))
        } else {
            Err(Error::Other(format!("No node found for selector {}", selector)))
        }
    }

    fn click(&mut self, selector: &str) -> Result<()> {
        self.ensure_open()?;
        self.log.lock().unwrap().clicks.push(selector.to_string());
        if !self.element_exists(selector)? {
            return Err(Error::Other(format!("No node found for selector {}", selector)));
        }
        let sel = &self.config.selectors;
        if selector == sel.actions_toggle {
            if self.config.toggle_works {
                self.menu_open = !self.menu_open;
            }
        } else if selector == sel.export_png && self.menu_open {
            self.write_download();
        }
        Ok(())
    }

    fn set_download_dir(&mut self, dir: &Path) -> Result<()> {
        self.ensure_open()?;
        self.log.lock().unwrap().download_dirs.push(dir.to_path_buf());
        self.download_dir = Some(dir.to_path_buf());
        Ok(())
    }

    fn is_closed(&mut self) -> bool {
        self.closed
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.log.lock().unwrap().closes += 1;
        }
        Ok(())
    }
}

/// A real `width`x`height` PNG filled with one colour; empty if encoding fails
pub fn fake_png(width: u32, height: u32) -> Vec<u8> {
    let chart = RgbaImage::from_pixel(width, height, Rgba([76, 120, 168, 255]));
    let mut out = Cursor::new(Vec::new());
    match chart.write_to(&mut out, ImageFormat::Png) {
        Ok(()) => out.into_inner(),
        Err(_) => Vec::new(),
    }
}
