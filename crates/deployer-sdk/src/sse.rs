//! SSE (Server-Sent Events) listener for Casper blockchain
pub mod config;
pub mod event;

use std::time::Duration;

use async_stream::stream;
use casper_types::DeployHash;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace};

use crate::{
    deploy::hash_hex,
    event_service::ProcessedDeploy,
    sse::{config::ListenerConfig, event::SseEvent},
};

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("unexpected SSE event type: {0}")]
    UnexpectedEventType(String),
    #[error("failed to decode SSE event payload: {head}")]
    Decode {
        head: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("event source error: {0}")]
    EventSource(#[from] reqwest_eventsource::Error),
    #[error("blocking task error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
    #[error("event stream ended before deploy {} was processed", hash_hex(deploy_hash))]
    StreamEnded { deploy_hash: DeployHash },
    #[error("deploy {} not processed within {after:?}", hash_hex(deploy_hash))]
    TimedOut {
        deploy_hash: DeployHash,
        after: Duration,
    },
}

/// Streams decoded events from `config.endpoint()`.
///
/// Connection errors are delivered in order after any payloads received before them. Dropping
/// the returned stream closes the connection.
pub async fn listener(
    config: ListenerConfig,
) -> Result<impl futures::Stream<Item = Result<SseEvent, ListenerError>>, ListenerError> {
    info!("Starting listener for {}", config.endpoint());

    let endpoint_url = config.endpoint().to_string();
    let capacity = config.channel_capacity();
    let (tx, mut rx) = mpsc::channel::<Result<SseEvent, ListenerError>>(capacity);
    let (raw_tx, mut raw_rx) = mpsc::channel::<Result<String, ListenerError>>(capacity);

    // Task to parse raw event data into SseEvent
    tokio::spawn(async move {
        loop {
            let raw = tokio::select! {
                raw = raw_rx.recv() => raw,
                _ = tx.closed() => break,
            };
            let Some(raw) = raw else {
                break;
            };
            let parse_result = match raw {
                Ok(data) => tokio::task::spawn_blocking(move || {
                    let head = data.chars().take(100).collect::<String>();
                    serde_json::from_str::<SseEvent>(&data)
                        .map_err(|source| ListenerError::Decode { head, source })
                })
                .await
                .unwrap_or_else(|err| Err(ListenerError::TaskJoin(err))),
                Err(err) => Err(err),
            };
            if tx.send(parse_result).await.is_err() {
                break;
            }
        }
    });

    // Task to receive events from the SSE endpoint
    tokio::spawn(async move {
        let mut es = EventSource::get(endpoint_url);
        trace!("Starting to receive events");

        loop {
            let event = tokio::select! {
                event = es.next() => event,
                _ = raw_tx.closed() => break,
            };
            let Some(event) = event else {
                break;
            };
            match event {
                Ok(Event::Open) => {
                    info!("Connection opened");
                }
                Ok(Event::Message(message)) => {
                    if message.event != "message" {
                        let _ = raw_tx
                            .send(Err(ListenerError::UnexpectedEventType(message.event)))
                            .await;
                        break;
                    }
                    if raw_tx.send(Ok(message.data)).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    error!("Error receiving event: {:?}", err);
                    let _ = raw_tx.send(Err(ListenerError::EventSource(err))).await;
                    break;
                }
            }
        }

        es.close();
        trace!("Event stream ended");
    });

    Ok(stream! {
        while let Some(item) = rx.recv().await {
            yield item;
        }
    })
}

/// Follows the event stream until the node reports `deploy_hash` as processed.
///
/// Events that fail to decode are skipped, any connection error ends the wait.
pub async fn wait_for_deploy_processed(
    config: ListenerConfig,
    deploy_hash: &DeployHash,
    timeout: Duration,
) -> Result<ProcessedDeploy, ListenerError> {
    let wanted = hash_hex(deploy_hash);
    let deploy_hash = *deploy_hash;

    let wait = async {
        let mut stream = Box::pin(listener(config).await?);
        while let Some(event) = stream.next().await {
            match event {
                Ok(event) => {
                    let matches = event
                        .processed_deploy_hash()
                        .is_some_and(|hash| hash.eq_ignore_ascii_case(&wanted));
                    if !matches {
                        continue;
                    }
                    if let Some(payload) = event.into_processed_payload() {
                        info!(deploy_hash = %wanted, "Deploy processed");
                        return Ok(ProcessedDeploy::from_processed_event(&deploy_hash, payload));
                    }
                }
                Err(ListenerError::Decode { head, source }) => {
                    debug!(%head, %source, "Skipping undecodable event");
                }
                Err(err) => return Err(err),
            }
        }
        Err(ListenerError::StreamEnded { deploy_hash })
    };

    tokio::time::timeout(timeout, wait)
        .await
        .unwrap_or(Err(ListenerError::TimedOut {
            deploy_hash,
            after: timeout,
        }))
}
