// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Async runtime wrappers.
//!
//! [`DedicatedRuntime`] is a current-thread tokio runtime parked on its own OS
//! thread. [`PeriodicalRunner`] drives a callback off `tokio::time::interval`
//! on whichever runtime it is handed.

use std::future::Future;
use std::io;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// A wrapper around `tokio::runtime::Handle` providing Ray-specific utilities.
#[derive(Clone)]
pub struct RayRuntime {
    handle: tokio::runtime::Handle,
}

impl RayRuntime {
    /// Create from the current tokio runtime handle.
    pub fn current() -> Self {
        Self {
            handle: tokio::runtime::Handle::current(),
        }
    }

    /// Create from an explicit handle.
    pub fn from_handle(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Spawn a future on the runtime.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }

    /// Get the underlying tokio handle.
    pub fn handle(&self) -> &tokio::runtime::Handle {
        &self.handle
    }
}

/// A single-threaded runtime that owns its own OS thread.
///
/// Work spawned through [`DedicatedRuntime::runtime`] only ever runs on that
/// thread, one task at a time. [`DedicatedRuntime::stop`] blocks until the
/// thread has finished whatever task it is currently polling and has dropped
/// every other pending task.
pub struct DedicatedRuntime {
    name: String,
    runtime: RayRuntime,
    shutdown_tx: Option<oneshot::Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl DedicatedRuntime {
    /// Spawn the named thread and wait until its runtime is ready.
    pub fn start(name: &str) -> io::Result<Self> {
        let (handle_tx, handle_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let thread_name = name.to_string();

        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = handle_tx.send(Err(e));
                        return;
                    }
                };
                let _ = handle_tx.send(Ok(runtime.handle().clone()));
                runtime.block_on(async {
                    let _ = shutdown_rx.await;
                });
                // Pending tasks (timers, in-flight RPC futures) are dropped here.
                drop(runtime);
                tracing::debug!(thread = %thread_name, "Dedicated runtime drained");
            })?;

        let handle = match handle_rx.recv() {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("runtime thread '{name}' exited during startup"),
                ));
            }
        };

        Ok(Self {
            name: name.to_string(),
            runtime: RayRuntime::from_handle(handle),
            shutdown_tx: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    /// Handle for spawning work onto the dedicated thread.
    pub fn runtime(&self) -> &RayRuntime {
        &self.runtime
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Signal shutdown and join the thread. Idempotent.
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.thread().id() == thread::current().id() {
                // Stopped from one of our own tasks; the thread exits once
                // the current task returns.
                tracing::warn!(thread = %self.name, "Dedicated runtime stopped from its own thread");
                return;
            }
            if thread.join().is_err() {
                tracing::error!(thread = %self.name, "Dedicated runtime thread panicked");
            }
        }
    }
}

impl Drop for DedicatedRuntime {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A periodical runner that executes a callback at fixed intervals.
///
/// The first run happens immediately. If a run overshoots the interval the
/// next one is delayed rather than fired in a burst, so runs never overlap.
pub struct PeriodicalRunner {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicalRunner {
    /// Start running `callback` every `interval` on `runtime`.
    ///
    /// A zero interval disables the runner.
    pub fn start<F>(
        runtime: &RayRuntime,
        interval: Duration,
        name: &'static str,
        mut callback: F,
    ) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        if interval.is_zero() {
            tracing::warn!(name, "Periodical runner has a zero interval, not scheduling");
            return Self { name, handle: None };
        }

        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                callback();
            }
        });
        Self {
            name,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the periodical runner. A callback that is already executing
    /// still runs to completion on its own thread.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for PeriodicalRunner {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    fn wait_until(deadline: Duration, cond: impl Fn() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn test_dedicated_runtime_runs_on_named_thread() {
        let mut rt = DedicatedRuntime::start("test_dedicated").unwrap();
        assert!(rt.is_running());
        assert_eq!(rt.name(), "test_dedicated");

        let (tx, rx) = mpsc::channel();
        rt.runtime().spawn(async move {
            let name = thread::current().name().map(str::to_string);
            tx.send(name).unwrap();
        });
        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some("test_dedicated"));

        rt.stop();
        assert!(!rt.is_running());
        // Second stop is a no-op.
        rt.stop();
    }

    #[test]
    fn test_stop_waits_for_running_task() {
        let mut rt = DedicatedRuntime::start("test_drain").unwrap();
        let done = Arc::new(AtomicUsize::new(0));
        let (started_tx, started_rx) = mpsc::channel();

        let d = Arc::clone(&done);
        rt.runtime().spawn(async move {
            started_tx.send(()).unwrap();
            // Blocking on purpose: the task cannot be interrupted mid-way.
            thread::sleep(Duration::from_millis(100));
            d.store(1, Ordering::SeqCst);
        });

        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        rt.stop();
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_drops_pending_tasks() {
        let mut rt = DedicatedRuntime::start("test_pending").unwrap();
        let ran = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&ran);
        rt.runtime().spawn(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            r.fetch_add(1, Ordering::SeqCst);
        });
        rt.stop();
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_periodical_runner_fires_immediately_and_repeatedly() {
        let rt = DedicatedRuntime::start("test_periodic").unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let mut runner = PeriodicalRunner::start(
            rt.runtime(),
            Duration::from_millis(10),
            "test_periodic",
            move || {
                c.fetch_add(1, Ordering::SeqCst);
            },
        );
        assert_eq!(runner.name(), "test_periodic");
        assert!(wait_until(Duration::from_secs(5), || count.load(Ordering::SeqCst) >= 3));
        assert!(runner.is_running());

        runner.stop();
        assert!(!runner.is_running());
    }

    #[test]
    fn test_periodical_runner_stop_halts_ticks() {
        let mut rt = DedicatedRuntime::start("test_periodic_stop").unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let mut runner = PeriodicalRunner::start(
            rt.runtime(),
            Duration::from_millis(5),
            "test_periodic_stop",
            move || {
                c.fetch_add(1, Ordering::SeqCst);
            },
        );
        assert!(wait_until(Duration::from_secs(5), || count.load(Ordering::SeqCst) >= 1));
        runner.stop();
        rt.stop();
        let after_stop = count.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_periodical_runner_zero_interval_is_disabled() {
        let rt = DedicatedRuntime::start("test_periodic_zero").unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let runner = PeriodicalRunner::start(rt.runtime(), Duration::ZERO, "zero", move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert!(!runner.is_running());
        thread::sleep(Duration::from_millis(20));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ray_runtime_current_spawn() {
        let rt = RayRuntime::current();
        let v = rt.spawn(async { 7 }).await.unwrap();
        assert_eq!(v, 7);
        assert!(rt.handle().runtime_flavor() == tokio::runtime::RuntimeFlavor::CurrentThread);
    }
}
