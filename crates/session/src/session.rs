use notebridge_automation::AutomationSurface;
use notebridge_core::IdleBasis;
use std::sync::atomic::{AtomicI64, Ordering};

/// One conversation thread's dedicated surface inside the shared context.
pub struct Session {
    thread_id: String,
    surface: Box<dyn AutomationSurface>,
    last_used_ms: AtomicI64,
}

impl Session {
    pub fn new(thread_id: &str, surface: Box<dyn AutomationSurface>, now_ms: i64) -> Self {
        Self {
            thread_id: thread_id.to_string(),
            surface,
            last_used_ms: AtomicI64::new(now_ms),
        }
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn surface(&self) -> &dyn AutomationSurface {
        self.surface.as_ref()
    }

    pub fn touch(&self, now_ms: i64) {
        self.last_used_ms.store(now_ms, Ordering::Relaxed);
    }

    /// Idle time under the configured basis. `None` when the basis is the
    /// thread timestamp and the id does not parse; the caller skips those.
    pub fn idle_elapsed_ms(&self, now_ms: i64, basis: IdleBasis) -> Option<i64> {
        match basis {
            IdleBasis::ThreadTimestamp => {
                let secs = parse_epoch_seconds(&self.thread_id)?;
                Some(now_ms - (secs * 1000.0) as i64)
            }
            IdleBasis::LastAccess => Some(now_ms - self.last_used_ms.load(Ordering::Relaxed)),
        }
    }
}

/// Thread ids are Slack-style epoch-seconds strings, possibly fractional
/// ("1699999999.123456").
pub fn parse_epoch_seconds(id: &str) -> Option<f64> {
    id.parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use notebridge_automation::testing::{new_log, MockSurface};

    #[test]
    fn test_parse_epoch_seconds() {
        assert_eq!(parse_epoch_seconds("1700000000"), Some(1_700_000_000.0));
        assert_eq!(parse_epoch_seconds("1699999999.123456"), Some(1_699_999_999.123456));
        assert_eq!(parse_epoch_seconds("not-a-ts"), None);
        assert_eq!(parse_epoch_seconds("-5"), None);
        assert_eq!(parse_epoch_seconds(""), None);
    }

    #[test]
    fn test_idle_from_thread_timestamp() {
        let log = new_log();
        let session = Session::new("100.0", Box::new(MockSurface::new(log)), 0);
        // 100 seconds of wall clock elapsed since the thread's timestamp.
        assert_eq!(
            session.idle_elapsed_ms(200_000, IdleBasis::ThreadTimestamp),
            Some(100_000)
        );
        // touch() does not move the thread-timestamp basis
        session.touch(150_000);
        assert_eq!(
            session.idle_elapsed_ms(200_000, IdleBasis::ThreadTimestamp),
            Some(100_000)
        );
    }

    #[test]
    fn test_idle_from_last_access() {
        let log = new_log();
        let session = Session::new("100.0", Box::new(MockSurface::new(log)), 100_000);
        session.touch(180_000);
        assert_eq!(
            session.idle_elapsed_ms(200_000, IdleBasis::LastAccess),
            Some(20_000)
        );
    }

    #[test]
    fn test_malformed_id_has_no_thread_timestamp_idle() {
        let log = new_log();
        let session = Session::new("garbage", Box::new(MockSurface::new(log)), 0);
        assert_eq!(session.idle_elapsed_ms(1_000, IdleBasis::ThreadTimestamp), None);
        assert!(session.idle_elapsed_ms(1_000, IdleBasis::LastAccess).is_some());
    }
}
