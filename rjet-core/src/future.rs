//! One-shot completion handles with a bounded wait.
//!
//! A [`Completer`] is handed to whoever finishes the work, the matching
//! [`Completion`] to whoever waits for it. Waiting never hangs forever when
//! a bound is given: [`Completion::await_timeout`] answers with a tri-state
//! [`AwaitResult`].

use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::error::{JetError, Result};

#[derive(Clone, Debug, PartialEq)]
pub enum AwaitResult<T> {
    Value(T),
    TimedOut,
    Failed(JetError),
}

impl<T> AwaitResult<T> {
    pub fn is_timed_out(&self) -> bool {
        match self {
            AwaitResult::TimedOut => true,
            _ => false,
        }
    }

    /// Turn a timeout into `JetError::Timeout` naming `what` was awaited
    pub fn into_result(self, what: &str, timeout: Duration) -> Result<T> {
        match self {
            AwaitResult::Value(v) => Ok(v),
            AwaitResult::TimedOut => Err(JetError::Timeout {
                what: what.to_string(),
                seconds: timeout.as_secs(),
            }),
            AwaitResult::Failed(e) => Err(e),
        }
    }
}

pub fn completion<T>() -> (Completer<T>, Completion<T>) {
    let (sender, receiver) = bounded(1);
    (Completer { sender }, Completion { receiver })
}

pub struct Completer<T> {
    sender: Sender<Result<T>>,
}

impl<T> Completer<T> {
    /// Returns `false` when nobody waits anymore
    pub fn complete(self, result: Result<T>) -> bool {
        self.sender.send(result).is_ok()
    }
}

pub struct Completion<T> {
    receiver: Receiver<Result<T>>,
}

impl<T> Completion<T> {
    pub fn await_timeout(&self, timeout: Duration) -> AwaitResult<T> {
        match self.receiver.recv_timeout(timeout) {
            Ok(Ok(v)) => AwaitResult::Value(v),
            Ok(Err(e)) => AwaitResult::Failed(e),
            Err(RecvTimeoutError::Timeout) => AwaitResult::TimedOut,
            Err(RecvTimeoutError::Disconnected) => AwaitResult::Failed(dropped()),
        }
    }

    pub fn wait(&self) -> Result<T> {
        match self.receiver.recv() {
            Ok(rt) => rt,
            Err(_) => Err(dropped()),
        }
    }

    pub fn try_get(&self) -> Option<Result<T>> {
        match self.receiver.try_recv() {
            Ok(rt) => Some(rt),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(dropped())),
        }
    }
}

fn dropped() -> JetError {
    JetError::Fatal("completion dropped without a result".to_string())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::error::JetError;
    use crate::future::{completion, AwaitResult};

    #[test]
    pub fn value_test() {
        let (completer, handle) = completion::<u32>();
        assert!(completer.complete(Ok(7)));
        assert_eq!(
            handle.await_timeout(Duration::from_millis(10)),
            AwaitResult::Value(7)
        );
    }

    #[test]
    pub fn timeout_test() {
        let (_completer, handle) = completion::<u32>();
        let rt = handle.await_timeout(Duration::from_millis(20));
        assert!(rt.is_timed_out());
        match rt.into_result("container `a`", Duration::from_secs(2)) {
            Err(JetError::Timeout { what, seconds }) => {
                assert_eq!(what, "container `a`");
                assert_eq!(seconds, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    pub fn failed_and_dropped_test() {
        let (completer, handle) = completion::<u32>();
        completer.complete(Err(JetError::Cancelled));
        assert_eq!(
            handle.await_timeout(Duration::from_millis(10)),
            AwaitResult::Failed(JetError::Cancelled)
        );

        let (completer, handle) = completion::<u32>();
        drop(completer);
        assert!(handle.wait().unwrap_err().is_fatal());
    }

    #[test]
    pub fn cross_thread_test() {
        let (completer, handle) = completion::<String>();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            completer.complete(Ok("done".to_string()));
        });
        assert_eq!(handle.wait().unwrap(), "done");
    }
}
