use tokio::sync::mpsc;

/// One status event for a watched job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobEvent {
    pub job_id: String,
    /// Raw backend status code.
    pub status_code: i32,
    /// Failure cause reported by the backend, if any.
    pub error_cause: Option<String>,
}

impl JobEvent {
    pub fn new(job_id: impl Into<String>, status_code: i32) -> Self {
        Self {
            job_id: job_id.into(),
            status_code,
            error_cause: None,
        }
    }
}

type CancelFn = Box<dyn FnOnce() + Send>;

/// A live subscription to a job's status stream.
///
/// Unsubscribing is idempotent and also happens on drop. Once unsubscribed
/// no further events are delivered, buffered ones included.
pub struct JobSubscription {
    events: mpsc::UnboundedReceiver<JobEvent>,
    cancel: Option<CancelFn>,
    active: bool,
}

impl JobSubscription {
    pub fn new(
        events: mpsc::UnboundedReceiver<JobEvent>,
        cancel: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            events,
            cancel: Some(Box::new(cancel)),
            active: true,
        }
    }

    /// Next event, or `None` once the stream is closed or unsubscribed.
    pub async fn recv(&mut self) -> Option<JobEvent> {
        if !self.active {
            return None;
        }
        self.events.recv().await
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn unsubscribe(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        self.events.close();
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for JobSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for JobSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobSubscription")
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::unbounded_channel();
        let counter = calls.clone();
        let mut sub = JobSubscription::new(rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tx.send(JobEvent::new("job", 1)).unwrap();
        assert_eq!(sub.recv().await.unwrap().status_code, 1);

        sub.unsubscribe();
        sub.unsubscribe();
        drop(sub);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(tx.send(JobEvent::new("job", 2)).is_err());
    }

    #[tokio::test]
    async fn test_no_events_after_unsubscribe() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut sub = JobSubscription::new(rx, || {});
        tx.send(JobEvent::new("job", 5)).unwrap();

        sub.unsubscribe();
        assert!(!sub.is_active());
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_drop_cancels() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (_tx, rx) = mpsc::unbounded_channel();
        let counter = calls.clone();
        drop(JobSubscription::new(rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
