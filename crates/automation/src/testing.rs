//! Scripted surfaces for tests in this crate and downstream crates
//! (enable the `testing` feature).

use async_trait::async_trait;
use notebridge_core::{Error, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::surface::{AutomationSurface, SurfaceContext};

/// Shared call log; entries are `"<op> <arg>"` strings in call order.
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn new_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub struct MockSurface {
    log: CallLog,
    exists_results: Mutex<HashMap<String, VecDeque<bool>>>,
    text_results: Mutex<VecDeque<Option<String>>>,
    clipboard: String,
    fail_close: bool,
}

impl MockSurface {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            exists_results: Mutex::new(HashMap::new()),
            text_results: Mutex::new(VecDeque::new()),
            clipboard: String::new(),
            fail_close: false,
        }
    }

    /// Script `exists` answers for one selector. The last value is sticky.
    pub fn with_exists(self, selector: &str, results: &[bool]) -> Self {
        self.exists_results
            .lock()
            .unwrap()
            .insert(selector.to_string(), results.iter().copied().collect());
        self
    }

    /// Script successive `text_content` answers; exhausted queue reads `None`.
    pub fn with_texts(self, texts: &[Option<&str>]) -> Self {
        *self.text_results.lock().unwrap() =
            texts.iter().map(|t| t.map(|s| s.to_string())).collect();
        self
    }

    pub fn with_clipboard(mut self, text: &str) -> Self {
        self.clipboard = text.to_string();
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl AutomationSurface for MockSurface {
    async fn goto(&self, url: &str) -> Result<()> {
        self.record(format!("goto {url}"));
        Ok(())
    }

    async fn wait_settled(&self) -> Result<()> {
        self.record("wait_settled".to_string());
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        self.record(format!("fill {selector}={value}"));
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.record(format!("click {selector}"));
        Ok(())
    }

    async fn click_button_by_label(&self, label: &str) -> Result<()> {
        self.record(format!("click_button {label}"));
        Ok(())
    }

    async fn exists(&self, selector: &str) -> Result<bool> {
        self.record(format!("exists {selector}"));
        let mut map = self.exists_results.lock().unwrap();
        let Some(queue) = map.get_mut(selector) else {
            return Ok(false);
        };
        if queue.len() > 1 {
            Ok(queue.pop_front().unwrap())
        } else {
            Ok(queue.front().copied().unwrap_or(false))
        }
    }

    async fn text_content(&self, selector: &str) -> Result<Option<String>> {
        self.record(format!("text {selector}"));
        Ok(self.text_results.lock().unwrap().pop_front().flatten())
    }

    async fn read_clipboard(&self) -> Result<String> {
        self.record("clipboard".to_string());
        Ok(self.clipboard.clone())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.record("screenshot".to_string());
        Ok(vec![0x89, 0x50, 0x4e, 0x47])
    }

    async fn html(&self) -> Result<String> {
        self.record("html".to_string());
        Ok("<main></main>".to_string())
    }

    async fn close(&self) -> Result<()> {
        self.record("close".to_string());
        if self.fail_close {
            return Err(Error::Surface("close failed".to_string()));
        }
        Ok(())
    }
}

pub struct MockContext {
    log: CallLog,
    scripted: Mutex<VecDeque<MockSurface>>,
    pub restored: Mutex<Option<Vec<u8>>>,
    state: Vec<u8>,
}

impl MockContext {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            scripted: Mutex::new(VecDeque::new()),
            restored: Mutex::new(None),
            state: b"[]".to_vec(),
        }
    }

    /// Queue a scripted surface for the next `new_surface` call. Unscripted
    /// calls hand out a plain surface sharing the same log.
    pub fn push_surface(&self, surface: MockSurface) {
        self.scripted.lock().unwrap().push_back(surface);
    }
}

#[async_trait]
impl SurfaceContext for MockContext {
    async fn new_surface(&self) -> Result<Box<dyn AutomationSurface>> {
        self.log.lock().unwrap().push("new_surface".to_string());
        let surface = self
            .scripted
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| MockSurface::new(self.log.clone()));
        Ok(Box::new(surface))
    }

    async fn export_state(&self) -> Result<Vec<u8>> {
        self.log.lock().unwrap().push("export_state".to_string());
        Ok(self.state.clone())
    }

    async fn restore_state(&self, state: &[u8]) -> Result<()> {
        self.log.lock().unwrap().push("restore_state".to_string());
        *self.restored.lock().unwrap() = Some(state.to_vec());
        Ok(())
    }
}
