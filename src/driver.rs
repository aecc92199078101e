//! Browser page primitives the pipeline is written against.
//!
//! `PageDriver` is deliberately small and object-safe: the CDP backend
//! implements it over a real Chrome tab, and `mock::MockPage` implements it
//! deterministically so the readiness and capture logic can be exercised
//! without a browser.

use crate::hooks::HookSink;
use crate::{Error, Result, Viewport};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// One live page in one browser session
pub trait PageDriver {
    /// Navigate to `url` and wait (at most `timeout`) for the navigation to commit
    fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()>;

    /// Evaluate a JavaScript expression in the page and return its JSON value
    fn evaluate(&mut self, script: &str) -> Result<Value>;

    /// Whether `selector` currently matches an element. Does not wait.
    fn element_exists(&mut self, selector: &str) -> Result<bool>;

    /// PNG bytes of the first element matching `selector`, clipped to its box
    fn screenshot_element(&mut self, selector: &str) -> Result<Vec<u8>>;

    /// Click the first element matching `selector`
    fn click(&mut self, selector: &str) -> Result<()>;

    /// Route subsequent downloads into `dir`
    fn set_download_dir(&mut self, dir: &Path) -> Result<()>;

    /// True once the page or its browser has gone away (e.g. window closed)
    fn is_closed(&mut self) -> bool;

    /// Release the page and its browser. Must tolerate repeated calls.
    fn close(&mut self) -> Result<()>;

    /// Whether `selector` matches an element a user could click: it has a
    /// layout box and is not inside a collapsed `<details>`. Does not wait.
    fn element_visible(&mut self, selector: &str) -> Result<bool> {
        self.evaluate_bool(&visible_script(selector))
    }

    /// Evaluate `script` and interpret the result as a boolean
    fn evaluate_bool(&mut self, script: &str) -> Result<bool> {
        let value = self.evaluate(script)?;
        Ok(match value {
            Value::Bool(b) => b,
            Value::Null => false,
            Value::String(s) => s == "true",
            Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
            Value::Array(_) | Value::Object(_) => true,
        })
    }
}

/// Settings for launching one browser with one page
#[derive(Clone)]
pub struct LaunchConfig {
    /// Run without a visible window
    pub headless: bool,
    /// Window size
    pub viewport: Viewport,
    /// Instrumentation sink; `None` means no hooks are installed
    pub hooks: Option<Arc<dyn HookSink>>,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport: Viewport::default(),
            hooks: None,
        }
    }
}

impl std::fmt::Debug for LaunchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchConfig")
            .field("headless", &self.headless)
            .field("viewport", &self.viewport)
            .field("hooks", &self.hooks.is_some())
            .finish()
    }
}

/// Starts browsers. Shared across threads by the batch renderer.
pub trait Launcher: Send + Sync {
    fn launch(&self, config: &LaunchConfig) -> Result<Box<dyn PageDriver>>;
}

/// Quote `s` as a JavaScript string literal
pub(crate) fn js_string(s: &str) -> String {
    // JSON string syntax is a subset of JS string syntax
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// Expression that is true when `selector` matches an element
pub(crate) fn exists_script(selector: &str) -> String {
    format!("document.querySelector({}) !== null", js_string(selector))
}

/// Prefix of the visibility query; the selector literal follows
pub(crate) const VISIBLE_PREFIX: &str = "(function(){ var e = document.querySelector(";

/// Expression that is true when `selector` matches a rendered, expanded element
pub(crate) fn visible_script(selector: &str) -> String {
    format!(
        "{}{}); if (!e) return false; var d = e.closest('details'); \
         if (d && !d.open) return false; var r = e.getBoundingClientRect(); \
         return r.width > 0 && r.height > 0; }})()",
        VISIBLE_PREFIX,
        js_string(selector)
    )
}

pub(crate) fn closed_page_error() -> Error {
    Error::Other("Session is closed".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn js_string_escapes_quotes() {
        assert_eq!(js_string(r#"a[download$=".png"]"#), r#""a[download$=\".png\"]""#);
        assert_eq!(
            exists_script(".vega-chart-container canvas"),
            r#"document.querySelector(".vega-chart-container canvas") !== null"#
        );
    }

    #[test]
    fn visibility_checks_the_enclosing_disclosure() {
        let script = visible_script(".vega-actions a");
        assert!(script.starts_with(VISIBLE_PREFIX));
        assert!(script.contains(r#"querySelector(".vega-actions a")"#));
        assert!(script.contains("!d.open"));
        assert!(script.contains("getBoundingClientRect"));
    }

    #[test]
    fn launch_config_debug_hides_sink() {
        let cfg = LaunchConfig::default();
        let dbg = format!("{:?}", cfg);
        assert!(dbg.contains("headless: true"));
        assert!(dbg.contains("hooks: false"));
    }
}
