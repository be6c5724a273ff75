use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::aura::classifier::{AdaptiveThresholds, StateClassifier};
use crate::aura::config::{AuraConfig, ConfigError};
use crate::aura::context::{ContextProviders, ContextSensor, LearnedPatterns};
use crate::aura::modeling::SignalProcessor;
use crate::aura::persistence::AuraStore;
use crate::aura::predictor::StatePredictor;
use crate::aura::types::{
    CognitiveSample, CognitiveState, ContextSnapshot, MetricsUpdate, ProcessedMetrics, SessionStats,
    StateTransition,
};
use crate::clock::Clock;
use crate::core::{AuraEvent, EventBus, EventEnvelope, SubscriberId, Topic};

struct Worker {
    name: &'static str,
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

impl Worker {
    fn spawn<F, Fut>(name: &'static str, run: F) -> Self
    where
        F: FnOnce(broadcast::Receiver<()>) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        Self {
            name,
            shutdown_tx,
            handle: tokio::spawn(run(shutdown_rx)),
        }
    }
}

/// Workers in pipeline order, stopped front to back.
struct MonitoringTasks {
    workers: Vec<Worker>,
    subscriptions: Vec<SubscriberId>,
}

/// Wires sensor, signal processor, classifier and predictor onto one bus.
///
/// Samples published on `cognitive.sample.raw` flow through a signal worker
/// (`metrics.updated`, `signal.advisory`) and a state worker
/// (`state.changed`, `state.transition`). A context task refreshes
/// `context.updated` and runs retention on its own interval.
pub struct AuraEngine {
    bus: Arc<EventBus>,
    store: Arc<dyn AuraStore>,
    clock: Arc<dyn Clock>,
    sensor: Arc<ContextSensor>,
    signal: Arc<Mutex<SignalProcessor>>,
    classifier: Arc<Mutex<StateClassifier>>,
    predictor: Arc<StatePredictor>,
    running: AtomicBool,
    tasks: Mutex<Option<MonitoringTasks>>,
}

impl AuraEngine {
    pub fn new(
        config: AuraConfig,
        session_id: impl Into<String>,
        providers: ContextProviders,
        store: Arc<dyn AuraStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let signal = SignalProcessor::new(config.signal.clone())?;
        let classifier = StateClassifier::new(config.classifier.clone(), &config.smoothing, clock.now())?;
        let sensor = ContextSensor::new(config.context.clone(), providers, Arc::clone(&store), Arc::clone(&clock))?;

        Ok(Self {
            bus: Arc::new(EventBus::new(session_id)),
            store,
            clock,
            sensor: Arc::new(sensor),
            signal: Arc::new(Mutex::new(signal)),
            classifier: Arc::new(Mutex::new(classifier)),
            predictor: Arc::new(StatePredictor::new(config.predictor)),
            running: AtomicBool::new(false),
            tasks: Mutex::new(None),
        })
    }

    /// Seeds thresholds and learned patterns from the store. Storage
    /// failures leave the configured defaults in place.
    pub async fn bootstrap(&self) {
        match self.store.load_thresholds().await {
            Ok(Some(thresholds)) => {
                let version = thresholds.version;
                let seeded = self.classifier.lock().seed_thresholds(thresholds);
                match seeded {
                    Ok(()) => info!(version, "Seeded thresholds from store"),
                    Err(e) => warn!(error = %e, "Stored thresholds rejected"),
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to load thresholds"),
        }

        match self.store.load_patterns().await {
            Ok(Some(patterns)) => {
                info!(
                    windows = patterns.windows.len(),
                    locations = patterns.locations.len(),
                    "Seeded learned patterns from store"
                );
                self.sensor.seed_patterns(patterns);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to load learned patterns"),
        }
    }

    /// Spawns the workers. Calling it while already running is a no-op.
    pub async fn start_monitoring(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("Monitoring already running");
            return;
        }

        let samples = self.bus.subscribe(Some(vec![Topic::SampleRaw])).await;
        let metrics = self.bus.subscribe(Some(vec![Topic::MetricsUpdated])).await;
        let subscriptions = vec![samples.id.clone(), metrics.id.clone()];

        let signal_worker = {
            let (bus, signal, sensor) = (Arc::clone(&self.bus), Arc::clone(&self.signal), Arc::clone(&self.sensor));
            Worker::spawn("signal", move |shutdown_rx| {
                run_signal_worker(samples.receiver, shutdown_rx, bus, signal, sensor)
            })
        };
        let state_worker = {
            let (bus, classifier, predictor, store) = (
                Arc::clone(&self.bus),
                Arc::clone(&self.classifier),
                Arc::clone(&self.predictor),
                Arc::clone(&self.store),
            );
            Worker::spawn("state", move |shutdown_rx| {
                run_state_worker(metrics.receiver, shutdown_rx, bus, classifier, predictor, store)
            })
        };
        let context_worker = {
            let (bus, sensor) = (Arc::clone(&self.bus), Arc::clone(&self.sensor));
            Worker::spawn("context", move |shutdown_rx| run_context_worker(shutdown_rx, bus, sensor))
        };

        *self.tasks.lock() = Some(MonitoringTasks {
            workers: vec![signal_worker, state_worker, context_worker],
            subscriptions,
        });
        info!("Monitoring started");
    }

    /// Stops the workers, cancels their subscriptions and flushes learned
    /// state. Samples published before the call are fully processed first.
    /// A second call is a no-op.
    pub async fn stop_monitoring(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let tasks = self.tasks.lock().take();
        let Some(tasks) = tasks else {
            return;
        };

        for worker in tasks.workers {
            let _ = worker.shutdown_tx.send(());
            if let Err(e) = worker.handle.await {
                warn!(worker = worker.name, error = %e, "Worker task ended abnormally");
            }
        }
        for id in &tasks.subscriptions {
            self.bus.unsubscribe(id).await;
        }

        self.flush().await;
        info!("Monitoring stopped");
    }

    /// Starts a new session: per-session histories reset, thresholds and
    /// learned patterns are kept.
    pub async fn switch_session(&self, session_id: impl Into<String>) {
        let session_id = session_id.into();
        let now = self.clock.now();
        self.signal.lock().reset();
        self.classifier.lock().reset_session(now);
        self.bus.set_session_id(session_id.clone()).await;
        self.flush().await;
        info!(session_id = %session_id, "Session switched");
    }

    pub async fn publish_sample(&self, sample: CognitiveSample) -> u64 {
        self.bus.publish(AuraEvent::SampleRaw(sample)).await
    }

    /// Refreshes context now and broadcasts it unless debounced.
    pub async fn refresh_context(&self, force: bool) -> ContextSnapshot {
        publish_context(&self.bus, &self.sensor, force).await
    }

    async fn flush(&self) {
        let patterns = self.sensor.patterns();
        if let Err(e) = self.store.save_patterns(&patterns).await {
            warn!(error = %e, "Failed to persist learned patterns");
        }
        let thresholds = self.classifier.lock().thresholds();
        if let Err(e) = self.store.save_thresholds(&thresholds).await {
            warn!(error = %e, "Failed to persist thresholds");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }

    pub async fn session_id(&self) -> String {
        self.bus.session_id().await
    }

    pub fn current_state(&self) -> CognitiveState {
        self.classifier.lock().current()
    }

    pub fn thresholds(&self) -> Arc<AdaptiveThresholds> {
        self.classifier.lock().thresholds()
    }

    pub fn session_stats(&self) -> SessionStats {
        self.signal.lock().stats()
    }

    pub fn recent_metrics(&self, n: usize) -> Vec<ProcessedMetrics> {
        self.signal.lock().recent_metrics(n)
    }

    pub fn transitions(&self) -> Vec<StateTransition> {
        self.classifier.lock().transitions()
    }

    pub fn patterns(&self) -> LearnedPatterns {
        self.sensor.patterns()
    }

    pub fn latest_context(&self) -> Option<ContextSnapshot> {
        self.sensor.latest()
    }
}

async fn publish_context(bus: &EventBus, sensor: &ContextSensor, force: bool) -> ContextSnapshot {
    let snapshot = sensor.get_current_context(force).await;
    if sensor.should_emit(&snapshot) {
        bus.publish(AuraEvent::ContextUpdated(snapshot.clone())).await;
    }
    snapshot
}

async fn run_signal_worker(
    mut receiver: mpsc::UnboundedReceiver<EventEnvelope>,
    mut shutdown_rx: broadcast::Receiver<()>,
    bus: Arc<EventBus>,
    signal: Arc<Mutex<SignalProcessor>>,
    sensor: Arc<ContextSensor>,
) {
    loop {
        // Pending events drain before shutdown is honoured.
        let envelope = tokio::select! {
            biased;
            received = receiver.recv() => match received {
                Some(envelope) => envelope,
                None => break,
            },
            _ = shutdown_rx.recv() => break,
        };
        let AuraEvent::SampleRaw(mut sample) = envelope.event else {
            continue;
        };
        if sample.context.is_none() {
            sample.context = sensor.latest();
        }

        let output = signal.lock().process(sample);
        bus.publish(AuraEvent::MetricsUpdated(output.update)).await;
        if let Some(advisory) = output.advisory {
            bus.publish(AuraEvent::SignalAdvisory(advisory)).await;
        }
    }
    debug!("Signal worker stopped");
}

async fn run_state_worker(
    mut receiver: mpsc::UnboundedReceiver<EventEnvelope>,
    mut shutdown_rx: broadcast::Receiver<()>,
    bus: Arc<EventBus>,
    classifier: Arc<Mutex<StateClassifier>>,
    predictor: Arc<StatePredictor>,
    store: Arc<dyn AuraStore>,
) {
    loop {
        // Pending events drain before shutdown is honoured.
        let envelope = tokio::select! {
            biased;
            received = receiver.recv() => match received {
                Some(envelope) => envelope,
                None => break,
            },
            _ = shutdown_rx.recv() => break,
        };
        let AuraEvent::MetricsUpdated(update) = envelope.event else {
            continue;
        };

        let (state, transition) = classify_tick(&classifier, &predictor, &update);

        bus.publish(AuraEvent::StateChanged(state)).await;
        if let Some(transition) = transition {
            if let Err(e) = store.append_transition(&transition).await {
                warn!(error = %e, "Failed to persist state transition");
            }
            bus.publish(AuraEvent::StateTransition(transition)).await;
        }
    }
    debug!("State worker stopped");
}

fn classify_tick(
    classifier: &Mutex<StateClassifier>,
    predictor: &StatePredictor,
    update: &MetricsUpdate,
) -> (CognitiveState, Option<StateTransition>) {
    let mut classifier = classifier.lock();
    let classification = classifier.classify(update);
    let predictions = predictor.predict(&classification.state, classification.features.trend_slope);
    classifier.set_predictions(predictions.clone());

    let mut state = classification.state;
    state.predictions = predictions;
    (state, classification.transition)
}

async fn run_context_worker(mut shutdown_rx: broadcast::Receiver<()>, bus: Arc<EventBus>, sensor: Arc<ContextSensor>) {
    let mut refresh = tokio::time::interval(sensor.refresh_interval());
    refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut housekeeping = tokio::time::interval(sensor.housekeeping_interval());
    housekeeping.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first housekeeping tick fires immediately; nothing to prune yet.
    housekeeping.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = refresh.tick() => {
                publish_context(&bus, &sensor, false).await;
            }
            _ = housekeeping.tick() => {
                sensor.housekeeping().await;
            }
        }
    }
    debug!("Context worker stopped");
}
