use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, instrument, warn};

use super::{FormSurface, UrlPattern};
use crate::errors::SurfaceError;
use crate::selector::Selector;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound on a single protocol round trip.
const CALL_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// In-page element resolver. `perform(selector, action)` returns
/// `{ found, value }`; `found` is false while the selector has no match.
const RESOLVER_JS: &str = r#"
const ROLE_QUERIES = {
  cell: 'td,[role=cell],[role=gridcell]',
  columnheader: 'th,[role=columnheader]',
  row: 'tr,[role=row]',
  img: 'img,[role=img]',
  link: 'a[href],[role=link]',
  button: 'button,input[type=button],input[type=submit],[role=button]',
  checkbox: 'input[type=checkbox],[role=checkbox]',
  textbox: 'input:not([type]),input[type=text],input[type=tel],input[type=email],textarea,[role=textbox]',
};
const norm = (s) => (s || '').replace(/\s+/g, ' ').trim();
const textWithAlt = (el) => {
  let out = '';
  for (const n of el.childNodes) {
    if (n.nodeType === 3) out += n.textContent;
    else if (n.nodeType === 1 && n.tagName === 'IMG') out += ' ' + (n.getAttribute('alt') || '') + ' ';
    else if (n.nodeType === 1 && n.tagName !== 'SCRIPT' && n.tagName !== 'STYLE') out += textWithAlt(n);
  }
  return out;
};
const accName = (el) => {
  const label = el.getAttribute('aria-label');
  if (label) return norm(label);
  if (el.tagName === 'IMG') return norm(el.getAttribute('alt'));
  if (el.tagName === 'INPUT' && (el.type === 'button' || el.type === 'submit')) return norm(el.value);
  return norm(textWithAlt(el));
};
const uniq = (els) => Array.from(new Set(els));
const within = (roots, query) => uniq(roots.flatMap((r) => Array.from(r.querySelectorAll(query))));
const step = (els, s) => {
  if (s === 'parent') return uniq(els.map((e) => e.parentElement).filter((e) => e));
  if (s.chain !== undefined) return s.chain.reduce(step, els);
  if (s.css !== undefined) return within(els, s.css);
  if (s.nth !== undefined) return els[s.nth] ? [els[s.nth]] : [];
  if (s.inputName !== undefined)
    return within(els, 'input,textarea,select').filter((e) => e.getAttribute('name') === s.inputName);
  if (s.namePattern !== undefined) {
    const { prefix, suffix } = s.namePattern;
    return within(els, 'input').filter((e) => {
      const n = e.getAttribute('name') || '';
      return n.startsWith(prefix) && n.endsWith(suffix);
    });
  }
  if (s.textPrefix !== undefined)
    return els.filter((e) => norm(e.innerText).startsWith(s.textPrefix));
  if (s.role !== undefined) {
    const { role, name, exact } = s.role;
    const found = within(els, ROLE_QUERIES[role] || `[role=${role}]`);
    if (name === null || name === undefined) return found;
    return found.filter((e) => {
      const n = accName(e);
      return exact ? n === name : n.toLowerCase().includes(name.toLowerCase());
    });
  }
  throw new Error('unsupported selector step ' + JSON.stringify(s));
};
const perform = (selector, action) => {
  const els = step([document], selector);
  if (action.kind === 'count') return { found: true, value: els.length };
  if (els.length === 0) return { found: false, value: null };
  const el = els[0];
  switch (action.kind) {
    case 'present': return { found: true, value: true };
    case 'attr': {
      const live = action.name === 'value' && ['INPUT', 'TEXTAREA', 'SELECT'].includes(el.tagName);
      return { found: true, value: live ? el.value : el.getAttribute(action.name) };
    }
    case 'html': return { found: true, value: el.innerHTML };
    case 'text': return { found: true, value: el.innerText };
    case 'fill':
      el.focus();
      el.value = action.value;
      el.dispatchEvent(new Event('input', { bubbles: true }));
      el.dispatchEvent(new Event('change', { bubbles: true }));
      return { found: true, value: null };
    case 'blur':
      el.focus();
      el.blur();
      el.dispatchEvent(new Event('change', { bubbles: true }));
      return { found: true, value: null };
    case 'click':
      window.__kiaraPendingNav = true;
      el.click();
      return { found: true, value: null };
    case 'check':
      if (!el.checked) el.click();
      return { found: true, value: el.checked };
  }
  throw new Error('unsupported action ' + action.kind);
};
"#;

/// A page target as listed by the browser's debug endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct TabInfo {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub url: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(rename = "webSocketDebuggerUrl")]
    pub websocket_url: Option<String>,
}

/// Form surface over the Chrome DevTools Protocol.
///
/// Attaches to a browser started with `--remote-debugging-port` and drives one
/// page target. Commands are issued strictly one at a time.
pub struct CdpSurface {
    socket: Mutex<Socket>,
    next_id: AtomicU64,
}

impl CdpSurface {
    /// Attach to the first page whose URL contains `url_pattern`. Without a
    /// pattern, or when no page matches (a login page, a blank tab), the
    /// first page is used.
    #[instrument(skip(debug_url))]
    pub async fn connect(debug_url: &str, url_pattern: Option<&str>) -> Result<Self, SurfaceError> {
        let tabs = Self::get_tabs(debug_url).await?;
        let tab = select_tab(tabs, url_pattern).ok_or_else(|| {
            SurfaceError::Connection(format!("No attachable page found on {debug_url}"))
        })?;

        let ws_url = tab.websocket_url.clone().unwrap_or_default();
        let (socket, _) = connect_async(ws_url.as_str())
            .await
            .map_err(|e| SurfaceError::Connection(format!("Failed to attach to {ws_url}: {e}")))?;

        info!("Attached to page '{}' ({})", tab.title, tab.url);
        Ok(Self {
            socket: Mutex::new(socket),
            next_id: AtomicU64::new(1),
        })
    }

    /// Get list of all open targets
    pub async fn get_tabs(debug_url: &str) -> Result<Vec<TabInfo>, SurfaceError> {
        let base = debug_url.trim_end_matches('/');
        let response = reqwest::get(format!("{base}/json/list"))
            .await
            .map_err(|e| SurfaceError::Connection(format!("Failed to reach {base}: {e}")))?;

        let tabs: Vec<TabInfo> = response
            .json()
            .await
            .map_err(|e| SurfaceError::Connection(format!("Failed to parse tabs: {e}")))?;

        debug!("Found {} open targets", tabs.len());
        Ok(tabs)
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, SurfaceError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({ "id": id, "method": method, "params": params });

        let mut socket = self.socket.lock().await;
        socket
            .send(Message::Text(request.to_string()))
            .await
            .map_err(|e| SurfaceError::Connection(format!("Failed to send {method}: {e}")))?;

        let read_response = async {
            while let Some(frame) = socket.next().await {
                let frame = frame
                    .map_err(|e| SurfaceError::Connection(format!("Socket error: {e}")))?;
                let Message::Text(text) = frame else {
                    continue;
                };
                let message: Value = serde_json::from_str(&text)
                    .map_err(|e| SurfaceError::Protocol(format!("Unparsable message: {e}")))?;
                // Events carry no id; responses to other ids cannot occur with one in flight.
                if message.get("id").and_then(Value::as_u64) != Some(id) {
                    continue;
                }
                if let Some(error) = message.get("error") {
                    return Err(SurfaceError::Protocol(format!("{method}: {error}")));
                }
                return Ok(message.get("result").cloned().unwrap_or(Value::Null));
            }
            Err::<Value, SurfaceError>(SurfaceError::Connection("Socket closed".to_string()))
        };

        tokio::time::timeout(CALL_TIMEOUT, read_response)
            .await
            .map_err(|_| SurfaceError::Timeout(format!("{method} after {CALL_TIMEOUT:?}")))?
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, SurfaceError> {
        let result = self
            .call(
                "Runtime.evaluate",
                json!({ "expression": expression, "returnByValue": true, "awaitPromise": true }),
            )
            .await?;

        if let Some(details) = result.get("exceptionDetails") {
            let text = details
                .pointer("/exception/description")
                .or_else(|| details.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("unknown exception");
            return Err(SurfaceError::Script(text.to_string()));
        }
        Ok(result
            .pointer("/result/value")
            .cloned()
            .unwrap_or(Value::Null))
    }

    fn perform_expression(selector: &Selector, action: &Value) -> Result<String, SurfaceError> {
        let selector = serde_json::to_string(selector)
            .map_err(|e| SurfaceError::Script(format!("Unserializable selector: {e}")))?;
        Ok(format!(
            "(function() {{\n{RESOLVER_JS}\nreturn perform({selector}, {action});\n}})()"
        ))
    }

    /// Run `action` against the first match, polling until the selector
    /// matches or `timeout` elapses.
    async fn perform(
        &self,
        selector: &Selector,
        action: Value,
        timeout: Duration,
    ) -> Result<Value, SurfaceError> {
        let expression = Self::perform_expression(selector, &action)?;
        let deadline = Instant::now() + timeout;
        loop {
            match self.evaluate(&expression).await {
                Ok(outcome) if outcome.get("found") == Some(&Value::Bool(true)) => {
                    return Ok(outcome.get("value").cloned().unwrap_or(Value::Null));
                }
                Ok(_) => {}
                Err(e) if is_transient(&e) => debug!("Document not ready: {e}"),
                Err(e) => return Err(e),
            }
            if Instant::now() >= deadline {
                return Err(SurfaceError::Timeout(format!(
                    "Timed out after {timeout:?} waiting for element {selector}"
                )));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

/// Pick the page target to drive from a debugger listing.
fn select_tab(tabs: Vec<TabInfo>, url_pattern: Option<&str>) -> Option<TabInfo> {
    let pages: Vec<TabInfo> = tabs
        .into_iter()
        .filter(|t| t.kind == "page" && t.websocket_url.is_some())
        .collect();
    if let Some(pattern) = url_pattern {
        if let Some(tab) = pages.iter().find(|t| t.url.contains(pattern)) {
            return Some(tab.clone());
        }
        if let Some(first) = pages.first() {
            warn!(
                "No page matches '{pattern}', attaching to '{}' ({})",
                first.title, first.url
            );
        }
    }
    pages.into_iter().next()
}

/// Errors raised while the page is between two documents.
fn is_transient(error: &SurfaceError) -> bool {
    match error {
        SurfaceError::Protocol(msg) | SurfaceError::Script(msg) => {
            let msg = msg.to_lowercase();
            msg.contains("context") || msg.contains("navigat")
        }
        _ => false,
    }
}

fn as_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait::async_trait]
impl FormSurface for CdpSurface {
    async fn count(&self, selector: &Selector) -> Result<usize, SurfaceError> {
        let value = self
            .perform(selector, json!({ "kind": "count" }), Duration::ZERO)
            .await?;
        Ok(value.as_u64().unwrap_or(0) as usize)
    }

    async fn attribute(
        &self,
        selector: &Selector,
        name: &str,
        timeout: Duration,
    ) -> Result<Option<String>, SurfaceError> {
        let value = self
            .perform(selector, json!({ "kind": "attr", "name": name }), timeout)
            .await?;
        Ok(match value {
            Value::Null => None,
            other => Some(as_string(other)),
        })
    }

    async fn inner_html(
        &self,
        selector: &Selector,
        timeout: Duration,
    ) -> Result<String, SurfaceError> {
        let value = self
            .perform(selector, json!({ "kind": "html" }), timeout)
            .await?;
        Ok(as_string(value))
    }

    async fn inner_text(
        &self,
        selector: &Selector,
        timeout: Duration,
    ) -> Result<String, SurfaceError> {
        let value = self
            .perform(selector, json!({ "kind": "text" }), timeout)
            .await?;
        Ok(as_string(value))
    }

    async fn fill(
        &self,
        selector: &Selector,
        value: &str,
        timeout: Duration,
    ) -> Result<(), SurfaceError> {
        self.perform(selector, json!({ "kind": "fill", "value": value }), timeout)
            .await
            .map(|_| ())
    }

    async fn blur(&self, selector: &Selector, timeout: Duration) -> Result<(), SurfaceError> {
        self.perform(selector, json!({ "kind": "blur" }), timeout)
            .await
            .map(|_| ())
    }

    async fn click(&self, selector: &Selector, timeout: Duration) -> Result<(), SurfaceError> {
        self.perform(selector, json!({ "kind": "click" }), timeout)
            .await
            .map(|_| ())
    }

    async fn check(&self, selector: &Selector, timeout: Duration) -> Result<(), SurfaceError> {
        let checked = self
            .perform(selector, json!({ "kind": "check" }), timeout)
            .await?;
        if checked != Value::Bool(true) {
            warn!("Checkbox {selector} did not report checked state");
        }
        Ok(())
    }

    async fn is_present(
        &self,
        selector: &Selector,
        timeout: Duration,
    ) -> Result<bool, SurfaceError> {
        match self
            .perform(selector, json!({ "kind": "present" }), timeout)
            .await
        {
            Ok(_) => Ok(true),
            Err(SurfaceError::Timeout(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn wait_for_url(
        &self,
        pattern: &UrlPattern,
        timeout: Duration,
    ) -> Result<(), SurfaceError> {
        let page_state = "({ url: location.href, ready: document.readyState, pending: !!window.__kiaraPendingNav })";
        let deadline = Instant::now() + timeout;
        loop {
            match self.evaluate(page_state).await {
                Ok(state) => {
                    let url = state.get("url").and_then(Value::as_str).unwrap_or_default();
                    let ready = state.get("ready").and_then(Value::as_str) == Some("complete");
                    let pending = state.get("pending") == Some(&Value::Bool(true));
                    if ready && !pending && pattern.matches(url) {
                        debug!("Reached {url}");
                        return Ok(());
                    }
                }
                Err(e) if is_transient(&e) => debug!("Navigation in progress: {e}"),
                Err(e) => return Err(e),
            }
            if Instant::now() >= deadline {
                return Err(SurfaceError::Timeout(format!(
                    "Timed out after {timeout:?} waiting for URL {pattern}"
                )));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), SurfaceError> {
        let result = self.call("Page.navigate", json!({ "url": url })).await?;
        if let Some(error) = result.get("errorText").and_then(Value::as_str) {
            return Err(SurfaceError::Navigation(format!("{url}: {error}")));
        }
        let deadline = Instant::now() + timeout;
        loop {
            match self.evaluate("document.readyState").await {
                Ok(Value::String(state)) if state == "complete" => return Ok(()),
                Ok(_) => {}
                Err(e) if is_transient(&e) => {}
                Err(e) => return Err(e),
            }
            if Instant::now() >= deadline {
                return Err(SurfaceError::Timeout(format!("Loading {url} after {timeout:?}")));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn current_url(&self) -> Result<String, SurfaceError> {
        Ok(as_string(self.evaluate("location.href").await?))
    }
}
