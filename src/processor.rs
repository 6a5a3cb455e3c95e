use crate::config::{ControllerMode, Timing};
use crate::error::{RdpGamepadError, Result};
use crate::platform::Channel;
use crate::session::Session;
use crate::vigem::VirtualClient;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Snapshot of a processor, readable from any thread without locking.
#[derive(Debug, Default)]
pub struct ProcessorStatus {
    running: AtomicBool,
    connected: AtomicBool,
    error_code: AtomicU32,
    mode: AtomicU8,
}

impl ProcessorStatus {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Result code of the last failed state response, 0 after a fresh connect.
    pub fn error_code(&self) -> u32 {
        self.error_code.load(Ordering::SeqCst)
    }

    pub fn mode(&self) -> ControllerMode {
        ControllerMode::from_u8(self.mode.load(Ordering::SeqCst)).unwrap_or_default()
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub(crate) fn set_error_code(&self, code: u32) {
        self.error_code.store(code, Ordering::SeqCst);
    }

    pub(crate) fn set_mode(&self, mode: ControllerMode) {
        self.mode.store(mode as u8, Ordering::SeqCst);
    }
}

/// Fixed-period deadlines. Falling behind drops the missed periods instead
/// of bursting to catch up.
struct Ticker {
    period: Duration,
    next: Instant,
}

impl Ticker {
    fn new(period: Duration, now: Instant) -> Self {
        Self {
            period,
            next: now + period,
        }
    }

    /// How long to sleep before the next tick.
    fn wait(&mut self, now: Instant) -> Duration {
        let wait = self.next.saturating_duration_since(now);
        self.next = if wait.is_zero() {
            now + self.period
        } else {
            self.next + self.period
        };
        wait
    }
}

struct Worker {
    stop: mpsc::Sender<()>,
    handle: JoinHandle<Option<Box<dyn Channel>>>,
}

/// Bridges one remote controller to one local virtual controller.
///
/// All connection state lives on a dedicated thread (NOT an async runtime)
/// that ticks at `Timing::poll_interval`. The owner only talks to it through
/// the stop signal and the [`ProcessorStatus`] atomics.
pub struct GamepadProcessor {
    client: Arc<VirtualClient>,
    timing: Timing,
    status: Arc<ProcessorStatus>,
    channel: Option<Box<dyn Channel>>,
    worker: Option<Worker>,
}

impl GamepadProcessor {
    pub fn new(channel: Box<dyn Channel>, client: Arc<VirtualClient>, timing: Timing) -> Self {
        Self {
            client,
            timing,
            status: Arc::new(ProcessorStatus::default()),
            channel: Some(channel),
            worker: None,
        }
    }

    /// Start polling in `mode`. The mode holds until the next `stop`.
    pub fn start(&mut self, mode: ControllerMode) -> Result<()> {
        if self.worker.is_some() {
            // A worker that died from a panic has already cleared `running`.
            if self.status.is_running() {
                return Err(RdpGamepadError::AlreadyRunning);
            }
            self.stop();
        }
        let channel = self.channel.take().ok_or_else(|| {
            RdpGamepadError::Channel("channel was lost while a worker was shutting down".into())
        })?;

        self.status.set_mode(mode);
        self.status.set_error_code(0);
        self.status.set_running(true);

        let (stop_tx, stop_rx) = mpsc::channel();
        let (channel_tx, channel_rx) = mpsc::channel::<Box<dyn Channel>>();
        let client = self.client.clone();
        let status = self.status.clone();
        let timing = self.timing;

        let spawned = std::thread::Builder::new()
            .name(format!("rdpgamepad-{:?}", mode))
            .spawn(move || {
                let channel = channel_rx.recv().ok()?;
                log::info!("Gamepad processor started ({:?})", mode);
                let mut session = Session::new(channel, client, mode, timing, status.clone());
                let ran = panic::catch_unwind(AssertUnwindSafe(|| {
                    let mut ticker = Ticker::new(timing.poll_interval(), Instant::now());
                    loop {
                        session.tick();
                        match stop_rx.recv_timeout(ticker.wait(Instant::now())) {
                            Err(RecvTimeoutError::Timeout) => {}
                            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                        }
                    }
                }));
                if ran.is_err() {
                    log::warn!("Gamepad processor ({:?}) panicked, shutting down", mode);
                    status.set_running(false);
                }
                let channel = session.finish();
                log::info!("Gamepad processor stopped ({:?})", mode);
                Some(channel)
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                log::warn!("Failed to spawn gamepad processor thread: {}", e);
                self.channel = Some(channel);
                self.status.set_running(false);
                return Err(e.into());
            }
        };
        // The channel only moves once the thread exists, so a failed spawn
        // leaves it here for the next attempt.
        if let Err(mpsc::SendError(channel)) = channel_tx.send(channel) {
            self.channel = Some(channel);
            let _ = handle.join();
            self.status.set_running(false);
            return Err(RdpGamepadError::Channel(
                "processor thread exited before receiving its channel".into(),
            ));
        }
        self.worker = Some(Worker {
            stop: stop_tx,
            handle,
        });
        Ok(())
    }

    /// Stop polling. Returns once the thread has exited and the target and
    /// channel are released.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = worker.stop.send(());
        match worker.handle.join() {
            Ok(Some(channel)) => self.channel = Some(channel),
            Ok(None) => {}
            Err(_) => log::warn!("Gamepad processor thread panicked while releasing its channel"),
        }
        self.status.set_connected(false);
        self.status.set_running(false);
    }

    pub fn is_running(&self) -> bool {
        self.status.is_running()
    }

    pub fn is_connected(&self) -> bool {
        self.status.is_connected()
    }

    pub fn error_code(&self) -> u32 {
        self.status.error_code()
    }

    pub fn mode(&self) -> ControllerMode {
        self.status.mode()
    }

    /// Shared handle to the live status, for callers that outlive `&self`.
    pub fn status(&self) -> Arc<ProcessorStatus> {
        self.status.clone()
    }
}

impl Drop for GamepadProcessor {
    fn drop(&mut self) {
        self.stop();
    }
}
