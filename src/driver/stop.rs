use crate::transport::{Channel, ConsumerTag};
use parking_lot::Mutex;
use shutdown_handler::ShutdownHandler;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Stops an [`AmqpDriver`](super::AmqpDriver) from another task or thread.
///
/// Obtained via [`AmqpDriver::stop_handle`](super::AmqpDriver::stop_handle); clones share
/// the same state.
///
/// Stopping is permanent: the running consume loop (if any) exits at its next iteration and
/// the driver never consumes again. Build a new driver to resume consuming.
pub struct StopHandle<C> {
    state: Arc<StopState<C>>,
}

struct StopState<C> {
    stopped: AtomicBool,
    active: Mutex<Option<ActiveConsumer<C>>>,
}

/// The consumer registration of the running consume loop.
struct ActiveConsumer<C> {
    channel: C,
    tag: ConsumerTag,
}

impl<C> Clone for StopHandle<C> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<C: Channel> StopHandle<C> {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(StopState {
                stopped: AtomicBool::new(false),
                active: Mutex::new(None),
            }),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.state.stopped.load(Ordering::SeqCst)
    }

    /// Set the stopped flag and cancel the active consumer registration, without waiting
    /// for the broker to confirm.
    ///
    /// It never blocks: the cancellation is fired on a separate task of the current `tokio`
    /// runtime. Outside of a runtime only the flag is set, and the consume loop notices it
    /// once its current wait is over.
    ///
    /// Calling `stop` more than once has no further effect.
    pub fn stop(&self) {
        if self.state.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        let active = self
            .state
            .active
            .lock()
            .as_ref()
            .map(|active| (active.channel.clone(), active.tag.clone()));
        let Some((channel, tag)) = active else {
            debug!("Stopped while no consumer is registered");
            return;
        };

        match Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = channel.cancel_consumer(&tag, true).await {
                        warn!(error = ?e, consumer_tag = %tag, "Failed to cancel the consumer on stop");
                    }
                });
            }
            Err(_) => {
                warn!(consumer_tag = %tag, "Stopped outside of a tokio runtime, the consumer will be cancelled when the consume loop exits");
            }
        }
    }

    /// Stop as soon as `shutdown` signals, e.g. on SIGTERM.
    ///
    /// The returned task completes once the handle has been stopped.
    pub fn stop_on_shutdown(&self, shutdown: Arc<ShutdownHandler>) -> JoinHandle<()> {
        let handle = self.clone();
        tokio::spawn(async move {
            shutdown.wait_for_signal().await;
            info!("Received a shutdown signal, stopping the AMQP driver");
            handle.stop();
        })
    }

    /// Record the registration `stop` has to cancel.
    pub(crate) fn arm(&self, channel: C, tag: ConsumerTag) {
        *self.state.active.lock() = Some(ActiveConsumer { channel, tag });
    }

    pub(crate) fn disarm(&self) {
        self.state.active.lock().take();
    }
}
