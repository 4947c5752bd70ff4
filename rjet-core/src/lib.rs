#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate log;

pub mod config;
pub mod dag;
pub mod element;
pub mod error;
pub mod functions;
pub mod future;
pub mod grid;
pub mod partition;
pub mod processor;
pub mod properties;
pub mod task;
pub mod utils;

pub use error::{ErrorCategory, JetError, Result};

#[derive(
    Copy, Clone, Serialize, Deserialize, Debug, Eq, PartialEq, Hash, Default, Ord, PartialOrd,
)]
pub struct JobId(pub u64);

impl std::ops::Deref for JobId {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Identity of one cluster member, usually its `host:port` address
#[derive(Clone, Serialize, Deserialize, Debug, Eq, PartialEq, Hash, Default, Ord, PartialOrd)]
pub struct MemberId(pub String);

impl MemberId {
    pub fn new(id: &str) -> Self {
        MemberId(id.to_string())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for MemberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
