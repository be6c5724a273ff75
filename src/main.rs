use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;

use cognitive_aura::aura::context::ContextProviders;
use cognitive_aura::aura::persistence::InMemoryStore;
use cognitive_aura::aura::types::CognitiveSample;
use cognitive_aura::config::Config;
use cognitive_aura::core::{AuraEvent, EventEnvelope, Topic};
use cognitive_aura::logging::init_tracing;
use cognitive_aura::{AuraConfig, AuraEngine, SystemClock};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    let _log_guard = init_tracing(&config.log_level);

    let engine = match AuraEngine::new(
        AuraConfig::from_env(),
        config.session_id.clone(),
        ContextProviders::unavailable(),
        Arc::new(InMemoryStore::new()),
        Arc::new(SystemClock),
    ) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!(error = %e, "invalid engine configuration");
            std::process::exit(2);
        }
    };

    engine.bootstrap().await;

    let bus = engine.bus();
    let transitions = bus.subscribe(Some(vec![Topic::StateTransition])).await;
    let transition_log = tokio::spawn(emit_transitions(transitions.receiver));

    engine.start_monitoring().await;
    tracing::info!(session_id = %config.session_id, "aura-engine reading samples from stdin");

    tokio::select! {
        count = read_samples(&engine) => {
            tracing::info!(samples = count, "stdin closed");
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    engine.stop_monitoring().await;
    bus.unsubscribe(&transitions.id).await;
    if let Err(e) = transition_log.await {
        tracing::warn!(error = %e, "transition log task failed");
    }

    let stats = engine.session_stats();
    let state = engine.current_state();
    tracing::info!(
        samples = stats.sample_count,
        average_attention = stats.average_attention,
        final_state = state.state.as_str(),
        transitions = engine.transitions().len(),
        "Graceful shutdown complete"
    );
}

/// Publishes each JSON line as a sample. Returns how many were accepted.
async fn read_samples(engine: &AuraEngine) -> usize {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut accepted = 0usize;
    let mut line_no = 0usize;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "failed to read stdin");
                break;
            }
        };
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<CognitiveSample>(&line) {
            Ok(sample) => {
                engine.publish_sample(sample).await;
                accepted += 1;
            }
            Err(e) => tracing::warn!(line = line_no, error = %e, "skipping malformed sample"),
        }
    }
    accepted
}

/// Writes each transition to stdout as a JSON line.
async fn emit_transitions(receiver: mpsc::UnboundedReceiver<EventEnvelope>) {
    let mut stream = UnboundedReceiverStream::new(receiver);
    while let Some(envelope) = stream.next().await {
        let AuraEvent::StateTransition(transition) = envelope.event else {
            continue;
        };
        tracing::info!(
            from = transition.from.as_str(),
            to = transition.to.as_str(),
            confidence = transition.confidence,
            "state transition"
        );
        match serde_json::to_string(&transition) {
            Ok(json) => println!("{json}"),
            Err(e) => tracing::warn!(error = %e, "failed to encode transition"),
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
