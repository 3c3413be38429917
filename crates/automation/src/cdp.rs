//! Chrome DevTools implementation of the surface contract.
//!
//! Element interaction goes through `Runtime.evaluate` against the attached
//! page target; the shared context is the browser's default context, with
//! cookies exported/imported as the persisted authentication state.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use notebridge_core::config::BrowserConfig;
use notebridge_core::{Error, Result};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::chrome::Chrome;
use crate::surface::{AutomationSurface, SurfaceContext};
use crate::transport::CdpTransport;

const SETTLE_ATTEMPTS: u32 = 100;
const SETTLE_INTERVAL: Duration = Duration::from_millis(100);

/// The process-wide browsing context, backed by one launched browser.
pub struct CdpContext {
    _chrome: Chrome,
    transport: Arc<CdpTransport>,
    config: BrowserConfig,
}

impl CdpContext {
    pub async fn launch(config: BrowserConfig) -> Result<Arc<Self>> {
        let chrome = Chrome::launch(&config).await?;
        let transport = CdpTransport::connect(chrome.ws_url()).await?;

        // The query flow reads answers back off the clipboard, so the pages
        // need clipboard access up front.
        transport
            .call(
                None,
                "Browser.grantPermissions",
                json!({ "permissions": ["clipboardReadWrite", "clipboardSanitizedWrite"] }),
            )
            .await?;

        Ok(Arc::new(Self {
            _chrome: chrome,
            transport,
            config,
        }))
    }
}

#[async_trait]
impl SurfaceContext for CdpContext {
    async fn new_surface(&self) -> Result<Box<dyn AutomationSurface>> {
        let created = self
            .transport
            .call(None, "Target.createTarget", json!({ "url": "about:blank" }))
            .await?;
        let target_id = created["targetId"]
            .as_str()
            .ok_or_else(|| Error::Surface("createTarget returned no targetId".to_string()))?
            .to_string();

        let attached = self
            .transport
            .call(
                None,
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
            )
            .await?;
        let session_id = attached["sessionId"]
            .as_str()
            .ok_or_else(|| Error::Surface("attachToTarget returned no sessionId".to_string()))?
            .to_string();

        for method in ["Page.enable", "Runtime.enable"] {
            self.transport
                .call(Some(&session_id), method, json!({}))
                .await?;
        }
        self.transport
            .call(
                Some(&session_id),
                "Emulation.setDeviceMetricsOverride",
                json!({
                    "width": self.config.viewport_width,
                    "height": self.config.viewport_height,
                    "deviceScaleFactor": 1,
                    "mobile": false,
                }),
            )
            .await?;

        debug!(target_id = %target_id, "Opened surface");
        Ok(Box::new(CdpSurface {
            transport: self.transport.clone(),
            session_id,
            target_id,
        }))
    }

    async fn export_state(&self) -> Result<Vec<u8>> {
        let result = self.transport.call(None, "Storage.getCookies", json!({})).await?;
        let cookies = result
            .get("cookies")
            .cloned()
            .unwrap_or_else(|| Value::Array(vec![]));
        Ok(serde_json::to_vec(&cookies)?)
    }

    async fn restore_state(&self, state: &[u8]) -> Result<()> {
        let cookies: Value = serde_json::from_slice(state)?;
        if !cookies.is_array() {
            return Err(Error::Surface("persisted state is not a cookie list".to_string()));
        }
        self.transport
            .call(None, "Storage.setCookies", json!({ "cookies": cookies }))
            .await?;
        Ok(())
    }
}

pub struct CdpSurface {
    transport: Arc<CdpTransport>,
    session_id: String,
    target_id: String,
}

impl CdpSurface {
    async fn eval(&self, expression: String) -> Result<Value> {
        let result = self
            .transport
            .call(
                Some(&self.session_id),
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;

        if let Some(details) = result.get("exceptionDetails") {
            let text = details["exception"]["description"]
                .as_str()
                .or_else(|| details["text"].as_str())
                .unwrap_or("page exception");
            return Err(Error::Surface(text.to_string()));
        }
        Ok(result["result"]["value"].clone())
    }
}

/// JS string literal with proper escaping.
fn js_str(s: &str) -> String {
    Value::from(s).to_string()
}

#[async_trait]
impl AutomationSurface for CdpSurface {
    async fn goto(&self, url: &str) -> Result<()> {
        let result = self
            .transport
            .call(Some(&self.session_id), "Page.navigate", json!({ "url": url }))
            .await?;
        if let Some(error_text) = result["errorText"].as_str() {
            if !error_text.is_empty() {
                return Err(Error::Surface(format!("navigate {url}: {error_text}")));
            }
        }
        self.wait_settled().await
    }

    async fn wait_settled(&self) -> Result<()> {
        for _ in 0..SETTLE_ATTEMPTS {
            // Evaluate failures mid-navigation (context teardown) read as
            // not-settled rather than as errors.
            if let Ok(state) = self.eval("document.readyState".to_string()).await {
                match state.as_str() {
                    Some("interactive") | Some("complete") => return Ok(()),
                    _ => {}
                }
            }
            tokio::time::sleep(SETTLE_INTERVAL).await;
        }
        Err(Error::Timeout("page did not settle".to_string()))
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        let js = format!(
            r#"(() => {{
  const el = document.querySelector({sel});
  if (!el) return false;
  el.focus();
  const proto = el.tagName === 'TEXTAREA' ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;
  Object.getOwnPropertyDescriptor(proto, 'value').set.call(el, {val});
  el.dispatchEvent(new Event('input', {{ bubbles: true }}));
  return true;
}})()"#,
            sel = js_str(selector),
            val = js_str(value),
        );
        match self.eval(js).await?.as_bool() {
            Some(true) => Ok(()),
            _ => Err(Error::Surface(format!("element not found: {selector}"))),
        }
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let js = format!(
            r#"(() => {{
  const el = document.querySelector({sel});
  if (!el) return false;
  el.click();
  return true;
}})()"#,
            sel = js_str(selector),
        );
        match self.eval(js).await?.as_bool() {
            Some(true) => Ok(()),
            _ => Err(Error::Surface(format!("element not found: {selector}"))),
        }
    }

    async fn click_button_by_label(&self, label: &str) -> Result<()> {
        let js = format!(
            r#"(() => {{
  const label = {label};
  for (const el of document.querySelectorAll('button')) {{
    if ((el.textContent || '').trim() === label) {{ el.click(); return true; }}
  }}
  return false;
}})()"#,
            label = js_str(label),
        );
        match self.eval(js).await?.as_bool() {
            Some(true) => Ok(()),
            _ => Err(Error::Surface(format!("no button labeled: {label}"))),
        }
    }

    async fn exists(&self, selector: &str) -> Result<bool> {
        let js = format!("!!document.querySelector({})", js_str(selector));
        Ok(self.eval(js).await?.as_bool().unwrap_or(false))
    }

    async fn text_content(&self, selector: &str) -> Result<Option<String>> {
        let js = format!(
            r#"(() => {{
  const el = document.querySelector({sel});
  return el ? el.innerText : null;
}})()"#,
            sel = js_str(selector),
        );
        Ok(self.eval(js).await?.as_str().map(|s| s.to_string()))
    }

    async fn read_clipboard(&self) -> Result<String> {
        let value = self.eval("navigator.clipboard.readText()".to_string()).await?;
        value
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| Error::Surface("clipboard read returned no text".to_string()))
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        let result = self
            .transport
            .call(
                Some(&self.session_id),
                "Page.captureScreenshot",
                json!({ "format": "png" }),
            )
            .await?;
        let data = result["data"]
            .as_str()
            .ok_or_else(|| Error::Surface("captureScreenshot returned no data".to_string()))?;
        BASE64
            .decode(data)
            .map_err(|e| Error::Surface(format!("screenshot decode: {e}")))
    }

    async fn html(&self) -> Result<String> {
        let value = self
            .eval("document.body ? document.body.innerHTML : ''".to_string())
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn close(&self) -> Result<()> {
        self.transport
            .call(None, "Target.closeTarget", json!({ "targetId": self.target_id }))
            .await?;
        Ok(())
    }
}
