#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate log;
#[macro_use]
extern crate atomic_enum;

pub mod container;
pub mod edge;
pub mod engine;
pub mod executor;
pub mod job;
pub mod logger;
pub mod tasks;
pub mod utils;

pub use engine::JetEngine;
pub use job::{Job, JobFuture, JobStatus};
