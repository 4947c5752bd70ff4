pub mod network;
pub mod processing;

pub use network::NetworkTask;
pub use processing::ProcessingTask;
