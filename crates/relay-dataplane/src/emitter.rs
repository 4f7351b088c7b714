//! Emitter
//!
//! Reads every input concurrently and pushes each record through
//! decode → filter → router → output writes.
//!
//! ```text
//!  Input 0 ──┐                               ┌──► Output 0
//!  Input 1 ──┼─► decode ─► filter ─► router ─┼──► Output 1
//!  Input N ──┘   (one task per input)        └──► Output M
//! ```
//!
//! # Lifecycle
//!
//! `Idle` (an [`Emitter`] being assembled) → `Running` after
//! [`Emitter::start`] → `Draining` once the cancellation signal fires →
//! `Stopped` when every reading task has finished its in-flight record.
//!
//! Per-record failures (malformed envelope, output write error) are counted,
//! logged and pushed to the optional error channel; none of them stops the
//! emitter. A failed or exhausted input ends only its own reading task.

use bytes::Bytes;
use futures::future::join_all;
use parking_lot::RwLock;
use relay_common::{RelayError, RelayResult};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};

use crate::config::EmitterConfig;
use crate::envelope;
use crate::filter::FilterStage;
use crate::plugin::{Input, Output};
use crate::router::{Router, RoutingPolicy};
use crate::stats::{EmitterStats, EmitterStatsSnapshot};

/// Emitter lifecycle state
///
/// `Draining` is skipped when every input closed before cancellation: no
/// record can be in flight, so the emitter goes from `Running` straight to
/// `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitterState {
    /// Assembled, not started
    Idle,
    /// Reading inputs, or idle after every input closed
    Running,
    /// Cancellation observed while readers were alive, finishing in-flight
    /// records
    Draining,
    /// Cancelled and every reading task finished
    Stopped,
}

/// Emitter errors
#[derive(Debug, thiserror::Error)]
pub enum EmitterError {
    /// No tokio runtime to spawn reading tasks on
    #[error("emitter must be started inside a tokio runtime")]
    NoRuntime,
}

/// Shared per-record pipeline, read-only once started
struct Dispatch {
    filter: FilterStage,
    router: Router,
    outputs: Vec<Arc<dyn Output>>,
    stats: Arc<EmitterStats>,
    errors: Option<mpsc::UnboundedSender<RelayError>>,
}

impl Dispatch {
    async fn dispatch(&self, frame: Bytes) {
        self.stats.record_received();

        let key = match envelope::decode(&frame) {
            Ok(env) => {
                if !self.filter.evaluate(&env).is_allow() {
                    self.stats.record_filtered();
                    return;
                }
                env.header.correlation_key()
            }
            Err(e) => {
                self.stats.record_malformed();
                tracing::debug!(error = %e, len = frame.len(), "dropping malformed record");
                self.report(e.into());
                return;
            }
        };

        let targets = self.router.select(&key, &self.outputs);
        if targets.is_empty() {
            return;
        }
        self.stats.record_forwarded();

        let writes = targets.iter().map(|output| {
            let frame = frame.clone();
            async move { (output, output.write(frame).await) }
        });

        for (output, result) in join_all(writes).await {
            match result {
                Ok(()) => self.stats.record_write(true),
                Err(source) => {
                    self.stats.record_write(false);
                    tracing::warn!(output = %output.name(), error = %source, "output write failed");
                    self.report(RelayError::OutputWrite {
                        output: output.name().to_string(),
                        source,
                    });
                }
            }
        }
    }

    fn report(&self, err: RelayError) {
        if let Some(tx) = &self.errors {
            // Caller may have stopped listening; records keep flowing
            let _ = tx.send(err);
        }
    }
}

/// Record emitter (Idle state)
pub struct Emitter {
    inputs: Vec<Box<dyn Input>>,
    outputs: Vec<Arc<dyn Output>>,
    filter: FilterStage,
    router: Router,
    errors: Option<mpsc::UnboundedSender<RelayError>>,
}

impl Emitter {
    /// Create emitter from validated config
    pub fn new(config: &EmitterConfig) -> RelayResult<Self> {
        config.validate()?;
        Ok(Self::with_parts(
            FilterStage::from_config(config),
            Router::new(config.routing.policy()?),
        ))
    }

    /// Create emitter from prebuilt stages
    pub fn with_parts(filter: FilterStage, router: Router) -> Self {
        Self {
            inputs: Vec::new(),
            outputs: Vec::new(),
            filter,
            router,
            errors: None,
        }
    }

    /// Add an input
    pub fn with_input(mut self, input: impl Input + 'static) -> Self {
        self.inputs.push(Box::new(input));
        self
    }

    /// Add an output. Outputs are written in the order added.
    pub fn with_output(mut self, output: Arc<dyn Output>) -> Self {
        self.outputs.push(output);
        self
    }

    /// Report per-record errors on `tx`
    pub fn with_error_channel(mut self, tx: mpsc::UnboundedSender<RelayError>) -> Self {
        self.errors = Some(tx);
        self
    }

    /// Number of inputs
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Number of outputs
    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// Routing policy in effect
    pub fn policy(&self) -> RoutingPolicy {
        self.router.policy()
    }

    /// Launch one reading task per input.
    ///
    /// `cancel` flipping to `true` (or its sender being dropped) moves the
    /// emitter to `Draining`; readers stop before their next read.
    pub fn start(self, cancel: watch::Receiver<bool>) -> Result<EmitterHandle, EmitterError> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(EmitterError::NoRuntime);
        }

        let stats = Arc::new(EmitterStats::default());
        let state = Arc::new(RwLock::new(EmitterState::Running));

        tracing::info!(
            inputs = self.inputs.len(),
            outputs = self.outputs.len(),
            policy = ?self.router.policy(),
            "emitter started"
        );

        let dispatch = Arc::new(Dispatch {
            filter: self.filter,
            router: self.router,
            outputs: self.outputs,
            stats: stats.clone(),
            errors: self.errors,
        });

        let mut readers = JoinSet::new();
        for input in self.inputs {
            stats.inputs_started.inc();
            readers.spawn(read_loop(input, dispatch.clone(), cancel.clone()));
        }

        let supervisor = tokio::spawn(supervise(readers, cancel, state.clone()));

        Ok(EmitterHandle {
            state,
            stats,
            supervisor,
        })
    }
}

/// Handle to a started emitter
pub struct EmitterHandle {
    state: Arc<RwLock<EmitterState>>,
    stats: Arc<EmitterStats>,
    supervisor: JoinHandle<()>,
}

impl EmitterHandle {
    /// Current lifecycle state
    pub fn state(&self) -> EmitterState {
        *self.state.read()
    }

    /// Current counters
    pub fn stats(&self) -> EmitterStatsSnapshot {
        self.stats.snapshot()
    }

    /// Wait for `Stopped`; returns the final counters
    pub async fn wait(self) -> EmitterStatsSnapshot {
        if let Err(e) = self.supervisor.await {
            tracing::error!(error = %e, "emitter supervisor failed");
            *self.state.write() = EmitterState::Stopped;
        }
        self.stats.snapshot()
    }
}

async fn read_loop(mut input: Box<dyn Input>, dispatch: Arc<Dispatch>, mut cancel: watch::Receiver<bool>) {
    let name = input.name().to_string();
    tracing::debug!(input = %name, "reader started");

    loop {
        if *cancel.borrow() {
            break;
        }

        let next = tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => break,
            next = input.read() => next,
        };

        match next {
            Ok(Some(frame)) => dispatch.dispatch(frame).await,
            Ok(None) => {
                tracing::info!(input = %name, "input closed");
                break;
            }
            Err(source) => {
                dispatch.stats.read_failures.inc();
                tracing::warn!(input = %name, error = %source, "input read failed, stopping reader");
                dispatch.report(RelayError::InputRead {
                    input: name.clone(),
                    source,
                });
                break;
            }
        }
    }

    dispatch.stats.inputs_closed.inc();
    tracing::debug!(input = %name, "reader stopped");
}

async fn supervise(
    mut readers: JoinSet<()>,
    cancel: watch::Receiver<bool>,
    state: Arc<RwLock<EmitterState>>,
) {
    let mut watcher = cancel;
    let signal = cancelled_owned(watcher.clone());
    tokio::pin!(signal);
    let mut draining = false;

    loop {
        tokio::select! {
            joined = readers.join_next() => match joined {
                Some(Ok(())) => {}
                Some(Err(e)) => tracing::error!(error = %e, "reader task panicked"),
                None => break,
            },
            _ = &mut signal, if !draining => {
                draining = true;
                *state.write() = EmitterState::Draining;
                tracing::info!(readers = readers.len(), "cancellation received, draining");
            }
        }
    }

    if !draining {
        tracing::info!("all inputs closed, emitter idle until cancelled");
        cancelled(&mut watcher).await;
        tracing::info!("cancellation received, nothing to drain");
    }

    *state.write() = EmitterState::Stopped;
    tracing::info!("emitter stopped");
}

/// Resolves once the signal is `true` or its sender is gone
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

async fn cancelled_owned(mut rx: watch::Receiver<bool>) {
    cancelled(&mut rx).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModifierConfig, RoutingConfig};
    use crate::plugin::{MemoryInput, MemoryOutput};
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn test_start_outside_runtime() {
        let (_tx, rx) = watch::channel(false);
        let emitter = Emitter::new(&EmitterConfig::default()).unwrap();
        assert!(matches!(emitter.start(rx), Err(EmitterError::NoRuntime)));
    }

    #[test]
    fn test_new_rejects_invalid_routing() {
        let config = EmitterConfig {
            routing: RoutingConfig { split_output: false, recognize_tcp_sessions: true },
            ..Default::default()
        };
        assert!(Emitter::new(&config).is_err());
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let (tx, rx) = watch::channel(false);
        let (input, source) = MemoryInput::new("in");
        let output = Arc::new(MemoryOutput::new("out"));

        let handle = Emitter::new(&EmitterConfig::default())
            .unwrap()
            .with_input(input)
            .with_output(output.clone())
            .start(rx)
            .unwrap();
        assert_eq!(handle.state(), EmitterState::Running);

        source.emit_get();
        assert!(output.wait_for(1, WAIT).await);

        tx.send(true).unwrap();
        let stats = handle.wait().await;

        assert_eq!(stats.writes, 1);
        assert_eq!(stats.active_inputs(), 0);
    }

    #[tokio::test]
    async fn test_state_stopped_after_wait() {
        let (tx, rx) = watch::channel(false);
        let (input, _source) = MemoryInput::new("in");
        let handle = Emitter::new(&EmitterConfig::default())
            .unwrap()
            .with_input(input)
            .start(rx)
            .unwrap();

        let state = handle.state.clone();
        tx.send(true).unwrap();
        handle.wait().await;
        assert_eq!(*state.read(), EmitterState::Stopped);
    }

    #[tokio::test]
    async fn test_exhausted_inputs_stay_running() {
        let (tx, rx) = watch::channel(false);
        let (input, source) = MemoryInput::new("in");
        let output = Arc::new(MemoryOutput::new("out"));
        let handle = Emitter::new(&EmitterConfig::default())
            .unwrap()
            .with_input(input)
            .with_output(output.clone())
            .start(rx)
            .unwrap();

        source.emit_get();
        drop(source);
        assert!(output.wait_for(1, WAIT).await);

        for _ in 0..50 {
            if handle.stats().inputs_closed == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(handle.stats().active_inputs(), 0);
        assert_eq!(handle.state(), EmitterState::Running);

        // Nothing in flight: Running goes straight to Stopped
        let state = handle.state.clone();
        tx.send(true).unwrap();
        handle.wait().await;
        assert_eq!(*state.read(), EmitterState::Stopped);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_drain_finishes_in_flight_write() {
        let (tx, rx) = watch::channel(false);
        let (input, source) = MemoryInput::new("in");
        let output = Arc::new(MemoryOutput::new("slow").on_write(|_| {
            std::thread::sleep(Duration::from_millis(500));
        }));

        let handle = Emitter::new(&EmitterConfig::default())
            .unwrap()
            .with_input(input)
            .with_output(output.clone())
            .start(rx)
            .unwrap();

        source.emit_get();
        for _ in 0..100 {
            if handle.stats().received == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(handle.stats().received, 1);

        tx.send(true).unwrap();
        let mut observed = handle.state();
        for _ in 0..40 {
            if observed == EmitterState::Draining {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            observed = handle.state();
        }
        assert_eq!(observed, EmitterState::Draining);
        assert!(output.is_empty());

        let stats = handle.wait().await;
        assert_eq!(stats.writes, 1);
        assert_eq!(output.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_record_skipped_and_reported() {
        let (tx, rx) = watch::channel(false);
        let (err_tx, mut err_rx) = mpsc::unbounded_channel();
        let (input, source) = MemoryInput::new("in");
        let output = Arc::new(MemoryOutput::new("out"));

        let handle = Emitter::new(&EmitterConfig::default())
            .unwrap()
            .with_input(input)
            .with_output(output.clone())
            .with_error_channel(err_tx)
            .start(rx)
            .unwrap();

        source.emit_bytes(&b"not an envelope"[..]);
        source.emit_get();
        assert!(output.wait_for(1, WAIT).await);

        let err = err_rx.recv().await.unwrap();
        assert!(matches!(err, RelayError::MalformedEnvelope(_)));

        tx.send(true).unwrap();
        let stats = handle.wait().await;
        assert_eq!(stats.received, 2);
        assert_eq!(stats.malformed, 1);
        assert_eq!(output.len(), 1);
    }

    #[tokio::test]
    async fn test_failing_output_isolated() {
        let (tx, rx) = watch::channel(false);
        let (err_tx, mut err_rx) = mpsc::unbounded_channel();
        let (input, source) = MemoryInput::new("in");
        let broken = Arc::new(MemoryOutput::new("broken"));
        broken.set_failing(true);
        let healthy = Arc::new(MemoryOutput::new("healthy"));

        let handle = Emitter::new(&EmitterConfig::default())
            .unwrap()
            .with_input(input)
            .with_output(broken.clone())
            .with_output(healthy.clone())
            .with_error_channel(err_tx)
            .start(rx)
            .unwrap();

        for _ in 0..10 {
            source.emit_get();
        }
        assert!(healthy.wait_for(10, WAIT).await);

        match err_rx.recv().await.unwrap() {
            RelayError::OutputWrite { output, .. } => assert_eq!(output, "broken"),
            other => panic!("unexpected error: {other}"),
        }

        tx.send(true).unwrap();
        let stats = handle.wait().await;
        assert_eq!(stats.writes, 10);
        assert_eq!(stats.write_failures, 10);
        assert!(broken.is_empty());
    }

    #[tokio::test]
    async fn test_input_error_ends_only_that_input() {
        let (tx, rx) = watch::channel(false);
        let (bad, bad_source) = MemoryInput::new("bad");
        let (good, good_source) = MemoryInput::new("good");
        let output = Arc::new(MemoryOutput::new("out"));

        let handle = Emitter::new(&EmitterConfig::default())
            .unwrap()
            .with_input(bad)
            .with_input(good)
            .with_output(output.clone())
            .start(rx)
            .unwrap();

        bad_source.emit_error(std::io::Error::new(std::io::ErrorKind::Other, "sniffer died"));
        // Never read: the bad reader is gone
        bad_source.emit_get();

        for _ in 0..5 {
            good_source.emit_get();
        }
        assert!(output.wait_for(5, WAIT).await);

        tx.send(true).unwrap();
        let stats = handle.wait().await;
        assert_eq!(stats.read_failures, 1);
        assert_eq!(stats.writes, 5);
    }

    #[tokio::test]
    async fn test_no_outputs_skips_silently() {
        let (tx, rx) = watch::channel(false);
        let (input, source) = MemoryInput::new("in");
        let handle = Emitter::new(&EmitterConfig::default())
            .unwrap()
            .with_input(input)
            .start(rx)
            .unwrap();

        source.emit_get();
        for _ in 0..50 {
            if handle.stats().received == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        tx.send(true).unwrap();
        let stats = handle.wait().await;
        assert_eq!(stats.received, 1);
        assert_eq!(stats.forwarded, 0);
        assert_eq!(stats.write_failures, 0);
    }

    #[tokio::test]
    async fn test_filtered_records_counted() {
        let (tx, rx) = watch::channel(false);
        let (input, source) = MemoryInput::new("in");
        let output = Arc::new(MemoryOutput::new("out"));
        let config = EmitterConfig {
            modifier: ModifierConfig::with_methods(["POST"]),
            ..Default::default()
        };

        let handle = Emitter::new(&config)
            .unwrap()
            .with_input(input)
            .with_output(output.clone())
            .start(rx)
            .unwrap();

        for _ in 0..3 {
            source.emit_get();
        }
        for _ in 0..50 {
            if handle.stats().filtered == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        tx.send(true).unwrap();
        let stats = handle.wait().await;
        assert_eq!(stats.filtered, 3);
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_dropped_cancel_sender_stops() {
        let (tx, rx) = watch::channel(false);
        let (input, _source) = MemoryInput::new("in");
        let handle = Emitter::new(&EmitterConfig::default())
            .unwrap()
            .with_input(input)
            .start(rx)
            .unwrap();

        drop(tx);
        let stats = tokio::time::timeout(WAIT, handle.wait()).await.unwrap();
        assert_eq!(stats.inputs_closed, 1);
    }
}
