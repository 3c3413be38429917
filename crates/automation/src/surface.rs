use async_trait::async_trait;
use notebridge_core::Result;

/// A controllable page inside the shared browsing context.
///
/// The login and query flows are written against this trait only, so any
/// automatable target that can navigate, interact with elements by selector,
/// and surface its clipboard can sit behind it.
#[async_trait]
pub trait AutomationSurface: Send + Sync {
    async fn goto(&self, url: &str) -> Result<()>;

    /// Wait for the current document to reach a settled load state.
    async fn wait_settled(&self) -> Result<()>;

    /// Fill the first element matching `selector`. Errors when absent.
    async fn fill(&self, selector: &str, value: &str) -> Result<()>;

    /// Click the first element matching `selector`. Errors when absent.
    async fn click(&self, selector: &str) -> Result<()>;

    /// Click the first button whose trimmed visible text equals `label`.
    async fn click_button_by_label(&self, label: &str) -> Result<()>;

    /// Presence probe; absence is a normal answer, not an error.
    async fn exists(&self, selector: &str) -> Result<bool>;

    /// Rendered text of the first match, `None` when the element is absent.
    async fn text_content(&self, selector: &str) -> Result<Option<String>>;

    /// Read back what the page's own copy affordance placed on the clipboard.
    async fn read_clipboard(&self) -> Result<String>;

    /// PNG snapshot of the viewport.
    async fn screenshot(&self) -> Result<Vec<u8>>;

    /// Inner HTML of the document body, for debug dumps.
    async fn html(&self) -> Result<String>;

    async fn close(&self) -> Result<()>;
}

/// The single process-wide browsing context all sessions spawn from.
///
/// Carries the one authenticated identity. Only the auth flow writes state
/// into it; everything else opens surfaces and reads.
#[async_trait]
pub trait SurfaceContext: Send + Sync {
    async fn new_surface(&self) -> Result<Box<dyn AutomationSurface>>;

    /// Serialize cookies/storage sufficient to skip interactive login.
    async fn export_state(&self) -> Result<Vec<u8>>;

    /// Restore previously exported state. Must run before first navigation.
    async fn restore_state(&self, state: &[u8]) -> Result<()>;
}
