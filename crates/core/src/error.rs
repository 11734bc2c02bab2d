use thiserror::Error;

/// Failure of a single task during a flush.
///
/// Never surfaces to the caller of `submit`; it only ever reaches a
/// diagnostic sink.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("task failed: {0:#}")]
    Failed(anyhow::Error),
}

impl TaskError {
    /// Render a `catch_unwind` payload as a task error.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        TaskError::Panicked(panic_message(payload.as_ref()))
    }
}

impl From<anyhow::Error> for TaskError {
    fn from(err: anyhow::Error) -> Self {
        TaskError::Failed(err)
    }
}

/// Extract the message of a panic payload (`&str` or `String`).
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[derive(Error, Debug)]
pub enum NextTickError {
    #[error("config error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_str() {
        let payload = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(TaskError::from_panic(payload).to_string(), "task panicked: boom");
    }

    #[test]
    fn test_panic_message_formatted() {
        let n = 3;
        let payload = std::panic::catch_unwind(|| panic!("bad index {n}")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "bad index 3");
    }

    #[test]
    fn test_panic_message_other_payload() {
        let payload = std::panic::catch_unwind(|| std::panic::panic_any(42u32)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }

    #[test]
    fn test_failed_display_includes_context() {
        let err = anyhow::anyhow!("disk full").context("writing snapshot");
        let task_err = TaskError::from(err);
        let display = task_err.to_string();
        assert!(display.contains("writing snapshot"));
        assert!(display.contains("disk full"));
    }
}
