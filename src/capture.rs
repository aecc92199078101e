//! Capture strategies: turning a rendered chart into an image file.
//!
//! `DirectCapture` screenshots the chart container. `InteractiveCapture`
//! clicks through the editor's own "Save as PNG" action and intercepts the
//! download. Both hand the image bytes to `write_artifact`, which decodes them
//! as a PNG first and then stages the file next to the destination and renames
//! it into place, so a failed or corrupt capture never leaves a file at the
//! destination path.

use crate::driver::{js_string, PageDriver};
use crate::error::CaptureError;
use crate::host::HostSelectors;
use crate::sync::Timing;
use crate::{Error, Result, Strategy};
use image::{GenericImageView, ImageFormat};
use log::{debug, info};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Suffix Chrome gives to downloads still in flight
const PARTIAL_DOWNLOAD_SUFFIX: &str = ".crdownload";

/// Prefix of the disclosure-state query; the selector literal follows
pub(crate) const MENU_OPEN_PREFIX: &str = "(function(){ var d = document.querySelector(";

/// An image written by a successful capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageArtifact {
    /// Absolute path of the image file
    pub path: PathBuf,
    /// File size in bytes, never zero
    pub bytes: u64,
    /// Pixel dimensions of the decoded image
    pub dimensions: (u32, u32),
    /// Strategy that produced the file
    pub strategy: Strategy,
}

/// Extracts the rendered chart from a page in the `Rendered` state
pub trait Capturer {
    fn strategy(&self) -> Strategy;

    fn capture(&self, page: &mut dyn PageDriver, destination: &Path, timing: &Timing) -> Result<ImageArtifact>;
}

/// Element screenshot of the chart container
#[derive(Debug, Clone)]
pub struct DirectCapture {
    selectors: HostSelectors,
}

impl DirectCapture {
    pub fn new(selectors: HostSelectors) -> Self {
        Self { selectors }
    }
}

impl Capturer for DirectCapture {
    fn strategy(&self) -> Strategy {
        Strategy::Direct
    }

    fn capture(&self, page: &mut dyn PageDriver, destination: &Path, _timing: &Timing) -> Result<ImageArtifact> {
        let container = &self.selectors.output_container;
        let png = page
            .screenshot_element(container)
            .map_err(|e| CaptureError::InvalidRegion(format!("{}: {}", container, e)))?;
        if png.is_empty() {
            return Err(CaptureError::InvalidRegion(format!("{}: screenshot is empty", container)).into());
        }

        write_artifact(&png, destination, Strategy::Direct)
    }
}

/// Drives the editor's export menu and intercepts the PNG download
#[derive(Debug, Clone)]
pub struct InteractiveCapture {
    selectors: HostSelectors,
}

impl InteractiveCapture {
    pub fn new(selectors: HostSelectors) -> Self {
        Self { selectors }
    }

    fn menu_is_open(&self, page: &mut dyn PageDriver) -> bool {
        page.evaluate_bool(&menu_open_script(&self.selectors.actions_menu))
            .unwrap_or(false)
    }
}

impl Capturer for InteractiveCapture {
    fn strategy(&self) -> Strategy {
        Strategy::Interactive
    }

    fn capture(&self, page: &mut dyn PageDriver, destination: &Path, timing: &Timing) -> Result<ImageArtifact> {
        let sel = &self.selectors;

        // (a) expose the export actions, unless the menu is already open
        if !page.element_exists(&sel.actions_toggle).unwrap_or(false) {
            return Err(CaptureError::ControlNotFound(sel.actions_toggle.clone()).into());
        }
        if !self.menu_is_open(page) {
            page.click(&sel.actions_toggle)
                .map_err(|_| CaptureError::ControlNotFound(sel.actions_toggle.clone()))?;
        }

        // The link sits in the DOM while the menu is collapsed; wait until it can take a click
        let export_visible = timing.poll_until(|| page.element_visible(&sel.export_png).unwrap_or(false));
        if !export_visible {
            return Err(CaptureError::ControlNotFound(sel.export_png.clone()).into());
        }

        // (b) arm the download interception, then trigger the export
        let staging = tempfile::tempdir()?;
        page.set_download_dir(staging.path())?;
        page.click(&sel.export_png)
            .map_err(|_| CaptureError::ControlNotFound(sel.export_png.clone()))?;

        // (c) wait for the finished file and move it into place
        let downloaded = await_download(staging.path(), timing)?;
        debug!("Download finished: {}", downloaded.display());
        let png = fs::read(&downloaded)?;
        write_artifact(&png, destination, Strategy::Interactive)
    }
}

/// Build the capturer for `strategy`
pub fn capturer_for(strategy: Strategy, selectors: HostSelectors) -> Box<dyn Capturer> {
    match strategy {
        Strategy::Direct => Box::new(DirectCapture::new(selectors)),
        Strategy::Interactive => Box::new(InteractiveCapture::new(selectors)),
    }
}

pub(crate) fn menu_open_script(selector: &str) -> String {
    format!("{}{}); return !!(d && d.open); }})()", MENU_OPEN_PREFIX, js_string(selector))
}

/// Wait for a completed download in `dir`.
///
/// Chrome writes `*.crdownload` while a download is in flight and renames it
/// when done. No entry at all by the deadline means the export never started
/// a download; only partial entries means it stalled.
pub(crate) fn await_download(dir: &Path, timing: &Timing) -> Result<PathBuf> {
    let mut started = false;
    let mut finished = None;

    timing.poll_until(|| {
        let Ok(entries) = fs::read_dir(dir) else {
            return false;
        };
        for entry in entries.filter_map(|e| e.ok()) {
            started = true;
            let path = entry.path();
            let partial = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(PARTIAL_DOWNLOAD_SUFFIX));
            let len = entry.metadata().map(|m| m.len()).unwrap_or(0);
            if !partial && len > 0 {
                finished = Some(path);
                return true;
            }
        }
        false
    });

    match finished {
        Some(path) => Ok(path),
        None if started => Err(CaptureError::DownloadIncomplete.into()),
        None => Err(CaptureError::DownloadNotStarted.into()),
    }
}

/// Width and height of `bytes` decoded as a PNG.
///
/// The whole image is decoded, so a valid header in front of truncated or
/// corrupt pixel data is rejected.
pub fn decode_png(bytes: &[u8]) -> Result<(u32, u32)> {
    if bytes.is_empty() {
        return Err(CaptureError::EmptyArtifact.into());
    }
    let image = image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .map_err(|e| CaptureError::UndecodableImage(e.to_string()))?;
    Ok(image.dimensions())
}

/// Validate `bytes` and write them to `destination`
pub(crate) fn write_artifact(bytes: &[u8], destination: &Path, strategy: Strategy) -> Result<ImageArtifact> {
    let dimensions = decode_png(bytes)?;
    persist_bytes(bytes, destination)?;
    info!(
        "Wrote {} ({} bytes, {}x{}, {:?})",
        destination.display(),
        bytes.len(),
        dimensions.0,
        dimensions.1,
        strategy
    );
    Ok(ImageArtifact {
        path: destination.to_path_buf(),
        bytes: bytes.len() as u64,
        dimensions,
        strategy,
    })
}

/// Atomically write `bytes` to `destination`
fn persist_bytes(bytes: &[u8], destination: &Path) -> Result<()> {
    let parent = parent_dir(destination);
    fs::create_dir_all(&parent)?;
    let mut staged = tempfile::NamedTempFile::new_in(&parent)?;
    staged.write_all(bytes)?;
    staged.flush()?;
    staged
        .persist(destination)
        .map_err(|e| Error::Io(e.error))?;
    Ok(())
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
