use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Sender};
use crossbeam::select;

use crate::error::SafeError;

/// Runs a callback on a dedicated thread at a fixed interval.
///
/// The task stops, and its thread is joined, when the `PeriodicTask` is
/// stopped or dropped. A tick that is already running completes first.
///
pub struct PeriodicTask {
    name: String,
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    pub fn spawn<F>(
        name: impl Into<String>,
        interval: Duration,
        mut callback: F,
    ) -> Result<Self, SafeError>
    where
        F: FnMut() + Send + 'static,
    {
        if interval.is_zero() {
            return Err(SafeError::ZeroInterval { name: "interval" });
        }

        let name = name.into();

        // Dropping the sender disconnects the channel and ends the loop.
        //
        let (stop_sender, stop_receiver) = channel::bounded::<()>(0);
        let ticker = channel::tick(interval);

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                loop {
                    select! {
                        recv(stop_receiver) -> _ => break,
                        recv(ticker) -> _ => callback(),
                    }
                }
            })
            .map_err(SafeError::SpawnSweeper)?;

        tracing::debug!(task = %name, ?interval, "periodic task started");

        Ok(PeriodicTask {
            name,
            stop: Some(stop_sender),
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stops the task and waits for its thread to exit.
    pub fn stop(&mut self) {
        drop(self.stop.take());

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!(task = %self.name, "periodic task panicked");
            } else {
                tracing::debug!(task = %self.name, "periodic task stopped");
            }
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    use super::*;

    #[test]
    fn test_periodic_task_ticks() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let ticks_clone = Arc::clone(&ticks);

        let task = PeriodicTask::spawn("tick-test", Duration::from_millis(5), move || {
            ticks_clone.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();

        assert_eq!(task.name(), "tick-test");
        assert!(task.is_running());

        let start = Instant::now();
        while ticks.load(Ordering::Relaxed) < 3 {
            assert!(start.elapsed() < Duration::from_secs(10));
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_stop_joins_thread() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let ticks_clone = Arc::clone(&ticks);

        let mut task = PeriodicTask::spawn("stop-test", Duration::from_millis(1), move || {
            ticks_clone.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();

        task.stop();
        assert!(!task.is_running());

        let after_stop = ticks.load(Ordering::Relaxed);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(ticks.load(Ordering::Relaxed), after_stop);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let result = PeriodicTask::spawn("zero", Duration::ZERO, || {});
        assert!(matches!(result, Err(SafeError::ZeroInterval { .. })));
    }
}
