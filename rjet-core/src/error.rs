use thiserror::Error;

pub type Result<T> = std::result::Result<T, JetError>;

/// Tells the caller whether the job failed or the coordinating process is broken
#[derive(Copy, Clone, Serialize, Deserialize, Debug, Eq, PartialEq)]
pub enum ErrorCategory {
    /// The job failed, submitting it again may succeed
    Recoverable,
    /// The coordination process itself is broken and should abort
    Fatal,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Recoverable => write!(f, "Recoverable"),
            ErrorCategory::Fatal => write!(f, "Fatal"),
        }
    }
}

#[derive(Error, Clone, Debug, PartialEq)]
pub enum JetError {
    #[error("timed out after {seconds}s waiting for {what}")]
    Timeout { what: String, seconds: u64 },
    #[error("task submission failed: {0}")]
    Submission(String),
    #[error("task `{task}` failed: {message}")]
    TaskFailed { task: String, message: String },
    #[error("interrupted, cause: {0}")]
    Interrupted(Box<JetError>),
    #[error("job cancelled")]
    Cancelled,
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("invalid DAG: {0}")]
    Dag(String),
    #[error("io error({kind:?}): {message}")]
    Io {
        kind: std::io::ErrorKind,
        message: String,
    },
    #[error("{0} is already executing")]
    AlreadyRunning(String),
    #[error("illegal state: {0}")]
    IllegalState(String),
    #[error("fatal error: {0}")]
    Fatal(String),
}

impl JetError {
    pub fn interrupted(cause: &JetError) -> Self {
        match cause {
            // never nest interruptions, keep the first cause
            JetError::Interrupted(_) => cause.clone(),
            _ => JetError::Interrupted(Box::new(cause.clone())),
        }
    }

    pub fn task_failed<E: std::fmt::Display>(task: &str, e: E) -> Self {
        JetError::TaskFailed {
            task: task.to_string(),
            message: e.to_string(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            JetError::Fatal(_) => ErrorCategory::Fatal,
            JetError::Interrupted(cause) => cause.category(),
            _ => ErrorCategory::Recoverable,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.category() == ErrorCategory::Fatal
    }

    pub fn is_timeout(&self) -> bool {
        match self.root_cause() {
            JetError::Timeout { .. } => true,
            _ => false,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        match self {
            JetError::Interrupted(_) => true,
            _ => false,
        }
    }

    /// Unwraps interruptions down to the error that started them
    pub fn root_cause(&self) -> &JetError {
        match self {
            JetError::Interrupted(cause) => cause.root_cause(),
            _ => self,
        }
    }
}

impl From<std::io::Error> for JetError {
    fn from(e: std::io::Error) -> Self {
        JetError::Io {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for JetError {
    fn from(e: serde_yaml::Error) -> Self {
        JetError::Config(e.to_string())
    }
}

impl From<serde_json::Error> for JetError {
    fn from(e: serde_json::Error) -> Self {
        JetError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use crate::error::{ErrorCategory, JetError};

    #[test]
    pub fn category_test() {
        assert_eq!(
            JetError::Submission("full".to_string()).category(),
            ErrorCategory::Recoverable
        );
        assert_eq!(
            JetError::Fatal("worker died".to_string()).category(),
            ErrorCategory::Fatal
        );

        let interrupted = JetError::interrupted(&JetError::Fatal("boom".to_string()));
        assert!(interrupted.is_fatal());
        assert_eq!(
            interrupted.root_cause(),
            &JetError::Fatal("boom".to_string())
        );
    }

    #[test]
    pub fn interrupted_not_nested_test() {
        let cause = JetError::Cancelled;
        let once = JetError::interrupted(&cause);
        let twice = JetError::interrupted(&once);
        assert_eq!(once, twice);
        assert_eq!(twice.root_cause(), &JetError::Cancelled);
    }

    #[test]
    pub fn timeout_test() {
        let e = JetError::Timeout {
            what: "container `a`".to_string(),
            seconds: 3,
        };
        assert!(e.is_timeout());
        assert!(JetError::interrupted(&e).is_timeout());
        assert_eq!(
            e.to_string(),
            "timed out after 3s waiting for container `a`"
        );
    }

    #[test]
    pub fn io_error_test() {
        let e: JetError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        match e {
            JetError::Io { kind, .. } => assert_eq!(kind, std::io::ErrorKind::NotFound),
            _ => unreachable!(),
        }
    }
}
