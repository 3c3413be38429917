use serde::{Deserialize, Serialize};

/// Originating Slack event carried through the queue.
///
/// `ts` is the message's own timestamp; `thread_ts` is present on replies and
/// names the root of the thread. Both are decimal epoch-seconds strings with
/// a fractional part ("1699999999.123456").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackEnvelope {
    pub ts: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    pub user: String,
}

/// Inbound queue payload: `{ "slack": {...}, "message": "<@BOT> hello" }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMessage {
    pub slack: SlackEnvelope,
    pub message: String,
}

impl QueueMessage {
    /// Stable key for the conversation. A reply must land on the same
    /// session as the thread's root, so `thread_ts` wins over `ts`.
    pub fn thread_root(&self) -> &str {
        self.slack.thread_ts.as_deref().unwrap_or(&self.slack.ts)
    }

    /// Query text with the leading bot mention removed.
    pub fn query_text(&self) -> &str {
        strip_leading_mention(&self.message)
    }
}

/// Remove one leading `<@...>` mention token and surrounding whitespace.
pub fn strip_leading_mention(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("<@") {
        if let Some(end) = rest.find('>') {
            return rest[end + 1..].trim();
        }
    }
    trimmed
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub title: String,
    pub text: String,
    pub mrkdwn_in: Vec<String>,
}

/// Outbound webhook payload, posted as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Attachment>>,
}

impl Notification {
    /// Final answer: mention the author, carry the answer as a markdown
    /// attachment so formatting survives.
    pub fn answer(thread_root: &str, user: &str, title: &str, text: &str) -> Self {
        Self {
            thread_ts: Some(thread_root.to_string()),
            text: format!("<@{user}>"),
            attachments: Some(vec![Attachment {
                title: title.to_string(),
                text: text.to_string(),
                mrkdwn_in: vec!["text".to_string()],
            }]),
        }
    }

    /// Immediate "received, working on it" reply to the origin thread.
    pub fn acknowledgment(thread_root: &str, text: &str) -> Self {
        Self {
            thread_ts: Some(thread_root.to_string()),
            text: text.to_string(),
            attachments: None,
        }
    }

    /// Operator alert, not tied to a conversation thread.
    pub fn alert(text: &str) -> Self {
        Self {
            thread_ts: None,
            text: text.to_string(),
            attachments: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_root_prefers_thread_ts() {
        let msg: QueueMessage = serde_json::from_str(
            r#"{"slack":{"ts":"200.0","thread_ts":"100.0","user":"U1"},"message":"hi"}"#,
        )
        .unwrap();
        assert_eq!(msg.thread_root(), "100.0");
    }

    #[test]
    fn test_thread_root_falls_back_to_ts() {
        let msg: QueueMessage = serde_json::from_str(
            r#"{"slack":{"ts":"1700000000.1","user":"U1"},"message":"hello"}"#,
        )
        .unwrap();
        assert_eq!(msg.thread_root(), "1700000000.1");
    }

    #[test]
    fn test_query_text_strips_mention() {
        let msg: QueueMessage = serde_json::from_str(
            r#"{"slack":{"ts":"1700000000.1","user":"U1"},"message":"<@BOT> hello"}"#,
        )
        .unwrap();
        assert_eq!(msg.query_text(), "hello");
    }

    #[test]
    fn test_strip_leading_mention_only_leading() {
        assert_eq!(strip_leading_mention("<@U1>  hi <@U2>"), "hi <@U2>");
        assert_eq!(strip_leading_mention("plain text"), "plain text");
        assert_eq!(strip_leading_mention("<@U1>"), "");
        // Unterminated mention is left alone.
        assert_eq!(strip_leading_mention("<@broken hello"), "<@broken hello");
    }

    #[test]
    fn test_answer_notification_shape() {
        let n = Notification::answer("100.0", "U1", "Answer", "**bold**");
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["thread_ts"], "100.0");
        assert_eq!(json["text"], "<@U1>");
        assert_eq!(json["attachments"][0]["mrkdwn_in"][0], "text");
    }

    #[test]
    fn test_alert_omits_thread() {
        let json = serde_json::to_value(Notification::alert("MFA required")).unwrap();
        assert!(json.get("thread_ts").is_none());
        assert!(json.get("attachments").is_none());
    }
}
