use std::time::Duration;

use rjet_core::{JetError, Result};

pub fn spawn<F, T>(name: &str, f: F) -> Result<std::thread::JoinHandle<T>>
where
    F: FnOnce() -> T,
    F: Send + 'static,
    T: Send + 'static,
{
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map_err(|e| JetError::Fatal(format!("failed to spawn thread `{}`: {}", name, e)))
}

/// Idle strategy of polling loops: a few short naps, then longer ones
#[derive(Debug, Default)]
pub struct Backoff {
    idle_rounds: u32,
}

impl Backoff {
    const SHORT_ROUNDS: u32 = 10;

    pub fn new() -> Self {
        Backoff::default()
    }

    pub fn reset(&mut self) {
        self.idle_rounds = 0;
    }

    pub fn idle(&mut self) {
        let pause = if self.idle_rounds < Self::SHORT_ROUNDS {
            Duration::from_millis(1)
        } else {
            Duration::from_millis(10)
        };
        self.idle_rounds = self.idle_rounds.saturating_add(1);
        std::thread::sleep(pause);
    }
}
