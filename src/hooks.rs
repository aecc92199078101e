//! Debug instrumentation: console output, uncaught page errors and failed
//! requests, reported as passive side-channel events.
//!
//! Console calls are forwarded by a script injected into every document.
//! Page errors and request failures come from the browser's own runtime and
//! network events, so they also cover the top-level document, XHR and anything
//! that fails before a page script could run. Hooks are only installed when a
//! sink is configured. Reporting never feeds back into the render attempt.

use log::{error, info, warn};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// Name of the page binding the injected script reports through
pub(crate) const HOOK_BINDING: &str = "__chartshot_hook";

/// Installed on every new document when hooks are enabled. Wraps the console
/// methods so each call is reported through the binding.
pub(crate) const HOOK_SCRIPT: &str = r#"(function(){
    function send(payload){
        try { var b = window.__chartshot_hook; if (b) b(JSON.stringify(payload)); } catch(e) {}
    }
    ['log','info','warn','error','debug'].forEach(function(k){
        var orig = console[k];
        console[k] = function(){
            var args = Array.prototype.slice.call(arguments);
            send({ kind: 'console', level: k, text: args.map(function(a){ return String(a); }).join(' ') });
            try { return orig.apply(console, args); } catch(e) {}
        };
    });
})();"#;

/// An observation reported by an instrumented page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    /// `console.*` call
    Console { level: String, text: String },
    /// Uncaught exception or unhandled promise rejection
    PageError { message: String },
    /// Network request that failed or returned an error status
    RequestFailed { url: String, reason: String },
}

/// Receives page events. Implementations must not panic.
pub trait HookSink: Send + Sync {
    fn report(&self, event: &PageEvent);
}

/// Default sink: forwards events to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl HookSink for LogSink {
    fn report(&self, event: &PageEvent) {
        match event {
            PageEvent::Console { level, text } if level == "error" => error!("[console] {}: {}", level, text),
            PageEvent::Console { level, text } if level == "warn" => warn!("[console] {}: {}", level, text),
            PageEvent::Console { level, text } => info!("[console] {}: {}", level, text),
            PageEvent::PageError { message } => error!("[page error] {}", message),
            PageEvent::RequestFailed { url, reason } => warn!("[request failed] {} - {}", url, reason),
        }
    }
}

/// Sink that keeps every event, for inspection after a render
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<PageEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PageEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl HookSink for CollectingSink {
    fn report(&self, event: &PageEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Decode a binding payload sent by `HOOK_SCRIPT`.
///
/// The binding delivers the JSON text as a string value; anything that does
/// not parse into a console event is dropped.
pub(crate) fn parse_payload(payload: Value) -> Option<PageEvent> {
    let msg = match payload {
        Value::String(s) => serde_json::from_str::<Value>(&s).ok()?,
        other => other,
    };
    let field = |name: &str| msg.get(name).and_then(|v| v.as_str()).unwrap_or("").to_string();

    match msg.get("kind")?.as_str()? {
        "console" => Some(PageEvent::Console { level: field("level"), text: field("text") }),
        _ => None,
    }
}

/// Joins the browser's network events, which name requests by id, into
/// `RequestFailed` reports carrying the request URL.
#[derive(Debug, Default)]
pub struct RequestTracker {
    in_flight: Mutex<HashMap<String, String>>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A request was issued
    pub fn request_sent(&self, id: &str, url: &str) {
        self.in_flight.lock().unwrap().insert(id.to_string(), url.to_string());
    }

    /// Response headers arrived; error statuses are reported
    pub fn response_received(&self, id: &str, status: u32) -> Option<PageEvent> {
        if status < 400 {
            return None;
        }
        let url = self.in_flight.lock().unwrap().get(id).cloned()?;
        Some(PageEvent::RequestFailed {
            url,
            reason: format!("HTTP {}", status),
        })
    }

    /// The request completed
    pub fn finished(&self, id: &str) {
        self.in_flight.lock().unwrap().remove(id);
    }

    /// The request failed at the network level (DNS, refused, aborted, blocked)
    pub fn loading_failed(&self, id: &str, error_text: &str, canceled: bool) -> PageEvent {
        let url = self
            .in_flight
            .lock()
            .unwrap()
            .remove(id)
            .unwrap_or_else(|| format!("<request {}>", id));
        let reason = if canceled {
            format!("{} (canceled)", error_text)
        } else {
            error_text.to_string()
        };
        PageEvent::RequestFailed { url, reason }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().unwrap().len()
    }
}

/// Page error for an uncaught exception; `description` is the thrown value's
/// rendering (`TypeError: x is undefined` plus stack), `text` the runtime's summary
pub fn exception_event(text: &str, description: Option<&str>) -> PageEvent {
    let message = description
        .and_then(|d| d.lines().next())
        .filter(|line| !line.is_empty())
        .unwrap_or(text);
    PageEvent::PageError {
        message: message.to_string(),
    }
}
