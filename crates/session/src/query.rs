use notebridge_core::config::QuerySelectors;
use notebridge_core::{PollConfig, Result};
use std::time::Duration;
use tracing::{debug, info};

use crate::session::Session;

/// Returned verbatim to the end user when polling exhausts every attempt.
/// A timeout is a normal outcome, not an error.
pub const TIMEOUT_SENTINEL: &str = "(Timeout)";

/// Submits a query through the conversation UI and polls for the answer.
pub struct QueryExecutor {
    selectors: QuerySelectors,
    policy: PollConfig,
}

impl QueryExecutor {
    pub fn new(selectors: QuerySelectors, policy: PollConfig) -> Self {
        Self { selectors, policy }
    }

    /// Fill, submit, then poll at a fixed cadence until the newest answer
    /// element carries text. The raw element text loses markdown, so the
    /// answer is recovered by triggering the UI's own copy affordance and
    /// reading the clipboard back.
    ///
    /// Missing input/submit elements error out; a transient read failure
    /// mid-poll just burns an attempt.
    pub async fn run(&self, session: &Session, message_text: &str) -> Result<String> {
        let surface = session.surface();

        surface.fill(&self.selectors.input, message_text).await?;
        surface.click(&self.selectors.submit).await?;
        debug!(thread_id = %session.thread_id(), "Query submitted");

        for attempt in 1..=self.policy.max_attempts {
            tokio::time::sleep(Duration::from_millis(self.policy.interval_ms)).await;

            let text = match surface.text_content(&self.selectors.answer).await {
                Ok(text) => text,
                Err(e) => {
                    debug!(error = %e, attempt, "Answer read failed, retrying");
                    continue;
                }
            };
            match text {
                Some(text) if !text.trim().is_empty() => {
                    info!(thread_id = %session.thread_id(), attempt, "Answer ready");
                    surface.click(&self.selectors.copy).await?;
                    return surface.read_clipboard().await;
                }
                _ => continue,
            }
        }

        info!(
            thread_id = %session.thread_id(),
            attempts = self.policy.max_attempts,
            "No answer within the polling window"
        );
        Ok(TIMEOUT_SENTINEL.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notebridge_automation::testing::{new_log, MockSurface};
    use notebridge_core::config::QuerySelectors;

    fn session_with(surface: MockSurface) -> Session {
        Session::new("1700000000.1", Box::new(surface), 0)
    }

    fn executor() -> QueryExecutor {
        QueryExecutor::new(QuerySelectors::default(), PollConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_clipboard_on_first_non_empty_attempt() {
        let log = new_log();
        let surface = MockSurface::new(log.clone())
            .with_texts(&[None, None, Some("raw answer text")])
            .with_clipboard("**formatted** answer");
        let session = session_with(surface);

        let answer = executor().run(&session, "hello").await.unwrap();
        assert_eq!(answer, "**formatted** answer");

        // Success on attempt 3 of 30: exactly three reads, no further polling.
        let calls = log.lock().unwrap().clone();
        let reads = calls.iter().filter(|c| c.starts_with("text ")).count();
        assert_eq!(reads, 3);
        assert_eq!(calls.iter().filter(|c| *c == "clipboard").count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_sentinel_when_every_attempt_is_empty() {
        let log = new_log();
        let surface = MockSurface::new(log.clone()).with_clipboard("never read");
        let session = session_with(surface);

        let answer = executor().run(&session, "hello").await.unwrap();
        assert_eq!(answer, TIMEOUT_SENTINEL);

        let calls = log.lock().unwrap().clone();
        let reads = calls.iter().filter(|c| c.starts_with("text ")).count();
        assert_eq!(reads, 30);
        // The copy affordance is never triggered on timeout.
        assert!(!calls.iter().any(|c| c == "clipboard"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_whitespace_answer_counts_as_empty() {
        let log = new_log();
        let surface = MockSurface::new(log.clone())
            .with_texts(&[Some("   \n"), Some("real")])
            .with_clipboard("real formatted");
        let session = session_with(surface);

        let answer = executor().run(&session, "hello").await.unwrap();
        assert_eq!(answer, "real formatted");
        let calls = log.lock().unwrap().clone();
        assert_eq!(calls.iter().filter(|c| c.starts_with("text ")).count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_happens_before_polling() {
        let log = new_log();
        let surface = MockSurface::new(log.clone())
            .with_texts(&[Some("x")])
            .with_clipboard("x");
        let session = session_with(surface);

        executor().run(&session, "hello").await.unwrap();
        let calls = log.lock().unwrap().clone();
        assert!(calls[0].starts_with("fill textarea"));
        assert!(calls[1].starts_with("click button"));
    }
}
