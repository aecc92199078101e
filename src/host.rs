//! Host adapters: how a spec reaches the hosted editor.
//!
//! The editor is an external, version-uncontrolled application. Everything
//! this crate knows about it (URL, readiness signals, selectors) lives in
//! `HostProfile`, and the two delivery modes are `HostAdapter`
//! implementations so the synchronizer never branches on page details.

use crate::codec::{self, editor_url};
use crate::driver::{js_string, PageDriver};
use crate::spec::ChartSpec;
use crate::{Delivery, Result};
use serde::{Deserialize, Serialize};

/// Public UDI grammar editor
pub const DEFAULT_EDITOR_URL: &str = "https://hms-dbmi.github.io/udi-grammar/#/Editor";

/// Loaded before every attempt so the editor document, and any chart it
/// still shows, is discarded even when the entry URL differs only in its hash
pub const BLANK_URL: &str = "about:blank";

/// True once the editor's scripting handle is usable
pub(crate) const EDITOR_READY_PROBE: &str =
    "!!(window.editor && typeof window.editor.setValue === 'function')";

/// True once the DOM has been parsed
pub(crate) const DOM_READY_PROBE: &str = "document.readyState !== 'loading'";

/// Prefix of the injection call; the JSON string argument follows
pub(crate) const INJECT_CALL_PREFIX: &str = "(function(json){ window.editor.setValue(json); \
     if (window.editor.setScrollPosition) { window.editor.setScrollPosition({ scrollTop: 0 }); } \
     return true; })(";

/// CSS selectors for the parts of the editor the pipeline touches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSelectors {
    /// Element that appears once the chart has been drawn
    pub rendered_output: String,
    /// Container whose box is screenshotted
    pub output_container: String,
    /// Disclosure element holding the export actions
    pub actions_menu: String,
    /// Control that toggles `actions_menu`
    pub actions_toggle: String,
    /// Export-to-PNG action
    pub export_png: String,
}

impl Default for HostSelectors {
    fn default() -> Self {
        Self {
            rendered_output: ".vega-chart-container canvas".to_string(),
            output_container: ".vega-chart-container".to_string(),
            actions_menu: r#"details[title="Click to view actions"]"#.to_string(),
            actions_toggle: r#"details[title="Click to view actions"] summary"#.to_string(),
            export_png: r#".vega-actions a[download$=".png"]"#.to_string(),
        }
    }
}

/// Where the editor lives and what its page looks like
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostProfile {
    pub editor_url: String,
    pub selectors: HostSelectors,
}

impl Default for HostProfile {
    fn default() -> Self {
        Self {
            editor_url: DEFAULT_EDITOR_URL.to_string(),
            selectors: HostSelectors::default(),
        }
    }
}

/// How a spec is handed to the editor
pub trait HostAdapter {
    fn delivery(&self) -> Delivery;

    /// URL to navigate to for `spec`
    fn entry_url(&self, spec: &ChartSpec) -> Result<String>;

    /// JavaScript expression that turns truthy when the host is ready
    fn ready_probe(&self) -> &str;

    /// Hand the spec to a ready host. No-op when the URL already carried it.
    fn deliver(&self, page: &mut dyn PageDriver, spec: &ChartSpec) -> Result<()>;

    fn selectors(&self) -> &HostSelectors;
}

/// Navigates to the bare editor and writes the spec into its text editor
#[derive(Debug, Clone)]
pub struct InjectionHost {
    profile: HostProfile,
}

impl InjectionHost {
    pub fn new(profile: HostProfile) -> Self {
        Self { profile }
    }
}

impl HostAdapter for InjectionHost {
    fn delivery(&self) -> Delivery {
        Delivery::Inject
    }

    fn entry_url(&self, _spec: &ChartSpec) -> Result<String> {
        Ok(self.profile.editor_url.clone())
    }

    fn ready_probe(&self) -> &str {
        EDITOR_READY_PROBE
    }

    fn deliver(&self, page: &mut dyn PageDriver, spec: &ChartSpec) -> Result<()> {
        let text = codec::serialize(spec)?;
        page.evaluate(&injection_script(&text))?;
        Ok(())
    }

    fn selectors(&self) -> &HostSelectors {
        &self.profile.selectors
    }
}

/// Carries the spec in the navigation URL as an lz-string token
#[derive(Debug, Clone)]
pub struct UrlHost {
    profile: HostProfile,
}

impl UrlHost {
    pub fn new(profile: HostProfile) -> Self {
        Self { profile }
    }
}

impl HostAdapter for UrlHost {
    fn delivery(&self) -> Delivery {
        Delivery::Url
    }

    fn entry_url(&self, spec: &ChartSpec) -> Result<String> {
        let token = codec::encode_for_transport(spec)?;
        Ok(editor_url(&self.profile.editor_url, &token))
    }

    fn ready_probe(&self) -> &str {
        DOM_READY_PROBE
    }

    fn deliver(&self, _page: &mut dyn PageDriver, _spec: &ChartSpec) -> Result<()> {
        Ok(())
    }

    fn selectors(&self) -> &HostSelectors {
        &self.profile.selectors
    }
}

/// Build the adapter for `delivery`
pub fn adapter_for(delivery: Delivery, profile: HostProfile) -> Box<dyn HostAdapter> {
    match delivery {
        Delivery::Inject => Box::new(InjectionHost::new(profile)),
        Delivery::Url => Box::new(UrlHost::new(profile)),
    }
}

pub(crate) fn injection_script(text: &str) -> String {
    format!("{}{})", INJECT_CALL_PREFIX, js_string(text))
}

/// Recover the injected text from a script built by `injection_script`
pub(crate) fn injected_text(script: &str) -> Option<String> {
    let arg = script.strip_prefix(INJECT_CALL_PREFIX)?.strip_suffix(')')?;
    serde_json::from_str(arg).ok()
}
