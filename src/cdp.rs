//! Chrome DevTools Protocol page driver (uses the `headless_chrome` crate)
//!
//! Launches one Chrome instance, drives its initial tab and nothing else, so
//! a session can never end up multiplexing attempts across pages.

use crate::driver::{closed_page_error, exists_script, LaunchConfig, Launcher, PageDriver};
use crate::hooks::{self, HookSink, RequestTracker};
use crate::{Error, Result};
use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::types::Event;
use headless_chrome::protocol::cdp::Browser as BrowserDomain;
use headless_chrome::protocol::cdp::{Network, Page};
use headless_chrome::{Browser, LaunchOptions};
use log::{debug, warn};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Launches Chrome through `headless_chrome`
#[derive(Debug, Default, Clone, Copy)]
pub struct CdpLauncher;

impl Launcher for CdpLauncher {
    fn launch(&self, config: &LaunchConfig) -> Result<Box<dyn PageDriver>> {
        Ok(Box::new(CdpPage::launch(config)?))
    }
}

/// A Chrome tab plus the browser process that owns it
pub struct CdpPage {
    browser: Option<Browser>,
    tab: Option<Arc<Tab>>,
}

impl CdpPage {
    pub fn launch(config: &LaunchConfig) -> Result<Self> {
        let launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .window_size(Some((config.viewport.width, config.viewport.height)))
            .build()
            .map_err(|e| Error::LaunchFailure(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| Error::LaunchFailure(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .wait_for_initial_tab()
            .map_err(|e| Error::LaunchFailure(format!("Failed to obtain initial tab: {}", e)))?;

        if let Some(sink) = &config.hooks {
            install_hooks(&tab, sink.clone());
        }

        debug!("Launched browser (headless={})", config.headless);

        Ok(Self {
            browser: Some(browser),
            tab: Some(tab),
        })
    }

    fn tab(&self) -> Result<&Arc<Tab>> {
        self.tab.as_ref().ok_or_else(closed_page_error)
    }
}

/// Expose the reporting binding, register the console script for every new
/// document and subscribe to network and runtime events. Failures are logged
/// and ignored: hooks are never required.
fn install_hooks(tab: &Arc<Tab>, sink: Arc<dyn HookSink>) {
    listen_for_failures(tab, sink.clone());

    let _ = tab
        .expose_function(
            hooks::HOOK_BINDING,
            Arc::new(move |payload: Value| {
                if let Some(event) = hooks::parse_payload(payload) {
                    sink.report(&event);
                }
            }),
        )
        .map_err(|e| warn!("Failed to expose hook binding: {}", e))
        .ok();

    let _ = tab
        .call_method(Page::AddScriptToEvaluateOnNewDocument {
            source: hooks::HOOK_SCRIPT.to_string(),
            world_name: None,
            include_command_line_api: None,
            run_immediately: None,
        })
        .map_err(|e| warn!("Failed to inject hook script: {}", e))
        .ok();
}

/// Report `Network.loadingFailed`, error statuses and `Runtime.exceptionThrown`
fn listen_for_failures(tab: &Arc<Tab>, sink: Arc<dyn HookSink>) {
    let _ = tab
        .call_method(Network::Enable {
            max_total_buffer_size: None,
            max_resource_buffer_size: None,
            max_post_data_size: None,
            report_direct_socket_traffic: None,
            enable_durable_messages: None,
        })
        .map_err(|e| warn!("Failed to enable network events: {}", e))
        .ok();
    let _ = tab
        .enable_runtime()
        .map_err(|e| warn!("Failed to enable runtime events: {}", e))
        .ok();

    let requests = RequestTracker::new();
    let listener = tab.add_event_listener(Arc::new(move |event: &Event| {
        let observed = match event {
            Event::NetworkRequestWillBeSent(e) => {
                requests.request_sent(&e.params.request_id, &e.params.request.url);
                None
            }
            Event::NetworkResponseReceived(e) => {
                requests.response_received(&e.params.request_id, e.params.response.status as u32)
            }
            Event::NetworkLoadingFinished(e) => {
                requests.finished(&e.params.request_id);
                None
            }
            Event::NetworkLoadingFailed(e) => Some(requests.loading_failed(
                &e.params.request_id,
                &e.params.error_text,
                e.params.canceled.unwrap_or(false),
            )),
            Event::RuntimeExceptionThrown(e) => {
                let details = &e.params.exception_details;
                let description = details.exception.as_ref().and_then(|o| o.description.as_deref());
                Some(hooks::exception_event(&details.text, description))
            }
            _ => None,
        };
        if let Some(observed) = observed {
            sink.report(&observed);
        }
    }));
    if let Err(e) = listener {
        warn!("Failed to subscribe to page events: {}", e);
    }
}

impl PageDriver for CdpPage {
    fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()> {
        let tab = self.tab()?;
        tab.set_default_timeout(timeout);

        tab.navigate_to(url)
            .map_err(|e| Error::CdpError(format!("Navigation failed: {}", e)))?;

        tab.wait_until_navigated()
            .map_err(|e| Error::CdpError(format!("Wait for navigation failed: {}", e)))?;

        Ok(())
    }

    fn evaluate(&mut self, script: &str) -> Result<Value> {
        let result = self
            .tab()?
            .evaluate(script, false)
            .map_err(|e| Error::CdpError(format!("Evaluation failed: {}", e)))?;

        Ok(result.value.unwrap_or(Value::Null))
    }

    fn element_exists(&mut self, selector: &str) -> Result<bool> {
        self.evaluate_bool(&exists_script(selector))
    }

    fn screenshot_element(&mut self, selector: &str) -> Result<Vec<u8>> {
        let tab = self.tab()?;
        let element = tab
            .find_element(selector)
            .map_err(|e| Error::CdpError(format!("Element {} not found: {}", selector, e)))?;

        element
            .capture_screenshot(Page::CaptureScreenshotFormatOption::Png)
            .map_err(|e| Error::CdpError(format!("Screenshot failed: {}", e)))
    }

    fn click(&mut self, selector: &str) -> Result<()> {
        let tab = self.tab()?;
        tab.find_element(selector)
            .map_err(|e| Error::CdpError(format!("Element {} not found: {}", selector, e)))?
            .click()
            .map_err(|e| Error::CdpError(format!("Click on {} failed: {}", selector, e)))?;
        Ok(())
    }

    fn set_download_dir(&mut self, dir: &Path) -> Result<()> {
        self.tab()?
            .call_method(BrowserDomain::SetDownloadBehavior {
                behavior: BrowserDomain::SetDownloadBehaviorBehaviorOption::Allow,
                browser_context_id: None,
                download_path: Some(dir.to_string_lossy().into_owned()),
                events_enabled: None,
            })
            .map_err(|e| Error::CdpError(format!("Failed to enable downloads: {}", e)))?;
        Ok(())
    }

    fn is_closed(&mut self) -> bool {
        let (Some(browser), Some(tab)) = (&self.browser, &self.tab) else {
            return true;
        };
        // Both calls fail fast once the transport to Chrome is gone
        browser.get_version().is_err() || tab.get_target_info().is_err()
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the browser terminates the child process
        drop(self.tab.take());
        drop(self.browser.take());
        Ok(())
    }
}
