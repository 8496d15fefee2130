/**
 * event_loop.rs
 *
 * GLib main context + main loop driven by one dedicated worker thread
 */

use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use std::marker::PhantomData;
use std::ptr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::native::types::{GMainContext, GMainLoop};
use crate::native::{self, Symbols};

/// Interval between repeated quit requests while waiting for the worker
const QUIT_RETRY: Duration = Duration::from_millis(50);

/// Raw pointer that may cross into the worker thread
struct SendPtr<T>(*mut T);

// SAFETY: GLib main loops may be run and quit from any thread
unsafe impl<T> Send for SendPtr<T> {}

impl<T> SendPtr<T> {
    fn get(&self) -> *mut T {
        self.0
    }
}

/// Lifecycle of an event loop handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStatus {
    Unstarted,
    Running,
    Stopped,
    Closed,
}

struct Worker {
    handle: JoinHandle<()>,
    done: Receiver<()>,
}

struct LoopState {
    status: LoopStatus,
    worker: Option<Worker>,
}

/// Owns a native main context and loop plus the worker that runs it.
///
/// Without the GLib symbols the handle is inert: it never runs and native
/// callbacks bound to it will never fire.
pub struct EventLoop {
    symbols: Arc<Symbols>,
    context: *mut GMainContext,
    main_loop: *mut GMainLoop,
    state: Mutex<LoopState>,
    join_timeout: Duration,
}

// SAFETY: the context and loop are only handed to GLib entry points that
// are documented thread-safe; mutable state is behind the mutex.
unsafe impl Send for EventLoop {}
unsafe impl Sync for EventLoop {}

impl EventLoop {
    /// Loop on the process-wide symbol table
    pub fn new() -> Self {
        Self::with_symbols(native::global(), BridgeConfig::from_env().loop_join_timeout)
    }

    pub fn with_symbols(symbols: Arc<Symbols>, join_timeout: Duration) -> Self {
        let context = match symbols.g_main_context_new {
            Some(context_new) => unsafe { context_new() },
            None => ptr::null_mut(),
        };

        let main_loop = match (context.is_null(), symbols.g_main_loop_new) {
            (false, Some(loop_new)) => unsafe { loop_new(context, 0) },
            _ => ptr::null_mut(),
        };

        if context.is_null() || main_loop.is_null() {
            warn!("GLib main loop unavailable; event loop is inert");
        }

        Self {
            symbols,
            context,
            main_loop,
            state: Mutex::new(LoopState {
                status: LoopStatus::Unstarted,
                worker: None,
            }),
            join_timeout,
        }
    }

    /// Whether the native context and loop both exist
    pub fn is_functional(&self) -> bool {
        !self.context.is_null() && !self.main_loop.is_null() && self.symbols.g_main_loop_run.is_some()
    }

    /// Native context pointer, null when inert
    pub fn context_ptr(&self) -> *mut GMainContext {
        self.context
    }

    pub fn status(&self) -> LoopStatus {
        self.state.lock().status
    }

    /// Spawn the worker. Only the first call from `Unstarted` does anything.
    /// An inert loop stays `Unstarted`.
    pub fn start(&self) -> bool {
        let mut state = self.state.lock();
        if state.status != LoopStatus::Unstarted {
            debug!(status = ?state.status, "event loop start ignored");
            return state.status == LoopStatus::Running;
        }

        let run = match self.symbols.g_main_loop_run {
            Some(run) if !self.main_loop.is_null() => run,
            _ => {
                debug!("event loop is inert; nothing to start");
                return false;
            }
        };

        let main_loop = SendPtr(self.main_loop);
        let (done_tx, done_rx) = channel::bounded(1);

        let spawned = thread::Builder::new()
            .name("glib-main-loop".to_string())
            .spawn(move || {
                debug!("main loop worker running");
                unsafe { run(main_loop.get()) };
                debug!("main loop worker exited");
                let _ = done_tx.send(());
            });

        match spawned {
            Ok(handle) => {
                state.worker = Some(Worker {
                    handle,
                    done: done_rx,
                });
                state.status = LoopStatus::Running;
                info!("event loop started");
                true
            }
            Err(e) => {
                warn!("failed to spawn main loop worker: {}", e);
                false
            }
        }
    }

    fn quit(&self) {
        if let (false, Some(quit)) = (self.main_loop.is_null(), self.symbols.g_main_loop_quit) {
            unsafe { quit(self.main_loop) };
        }
    }

    /// Ask the loop to quit. Safe to call any number of times, in any state.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if state.status == LoopStatus::Running {
            self.quit();
            state.status = LoopStatus::Stopped;
            debug!("event loop stopped");
        }
    }

    /// Make this loop's context the calling thread's default until the
    /// guard is dropped
    pub fn push_thread_default(&self) -> Option<ThreadDefaultGuard<'_>> {
        let (push, pop) = match (
            self.symbols.g_main_context_push_thread_default,
            self.symbols.g_main_context_pop_thread_default,
        ) {
            (Some(push), Some(pop)) if !self.context.is_null() => (push, pop),
            _ => return None,
        };
        unsafe { push(self.context) };
        Some(ThreadDefaultGuard {
            pop,
            context: self.context,
            _event_loop: PhantomData,
            _not_send: PhantomData,
        })
    }

    /// Stop, wait for the worker (bounded), then release loop and context.
    ///
    /// Quit is re-issued while waiting because a quit that lands before the
    /// worker enters the loop is lost. A worker that misses the bound is
    /// detached; the running loop holds its own native reference.
    pub fn close(&self) {
        let worker = {
            let mut state = self.state.lock();
            if state.status == LoopStatus::Closed {
                return;
            }
            if state.status == LoopStatus::Running {
                self.quit();
            }
            state.status = LoopStatus::Closed;
            state.worker.take()
        };

        if let Some(worker) = worker {
            self.join_worker(worker);
        }

        if let (false, Some(unref)) = (self.main_loop.is_null(), self.symbols.g_main_loop_unref) {
            unsafe { unref(self.main_loop) };
        }
        if let (false, Some(unref)) = (self.context.is_null(), self.symbols.g_main_context_unref) {
            unsafe { unref(self.context) };
        }
        info!("event loop closed");
    }

    fn join_worker(&self, worker: Worker) {
        let deadline = Instant::now() + self.join_timeout;
        loop {
            match worker.done.recv_timeout(QUIT_RETRY) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    let _ = worker.handle.join();
                    return;
                }
                Err(RecvTimeoutError::Timeout) if Instant::now() < deadline => self.quit(),
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        timeout = ?self.join_timeout,
                        "main loop worker did not exit in time; detaching it"
                    );
                    return;
                }
            }
        }
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        self.close();
    }
}

/// Pops the thread-default context on drop. Must stay on its thread.
pub struct ThreadDefaultGuard<'a> {
    pop: native::types::MainContextThreadDefaultFn,
    context: *mut GMainContext,
    _event_loop: PhantomData<&'a EventLoop>,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ThreadDefaultGuard<'_> {
    fn drop(&mut self) {
        unsafe { (self.pop)(self.context) };
    }
}
