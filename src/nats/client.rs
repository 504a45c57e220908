/// NATS client for the cleanup pipeline
///
/// Provides connection management, a durable JetStream consumer over the input
/// subjects with explicit acknowledgement, and publishing to the output subject

use std::time::Duration;

use async_nats::jetstream;
use async_nats::{Event, HeaderMap};
use futures::StreamExt;
use tokio::sync::mpsc;

use crate::bus::{BusEvent, BusMessage, MessageSink, MessageSource};
use crate::error::TransportError;

/// Header carrying the opaque message key
pub const KEY_HEADER: &str = "Message-Key";

pub struct NatsClient {
    client: async_nats::Client,
    errors: mpsc::UnboundedReceiver<TransportError>,
}

impl NatsClient {
    /// Connect to NATS.
    ///
    /// `servers` is a comma separated list of server URLs; `name` identifies the
    /// connection on the server side.
    pub async fn connect(servers: &str, name: &str) -> Result<Self, TransportError> {
        let (tx, errors) = mpsc::unbounded_channel();

        let client = async_nats::ConnectOptions::new()
            .name(name)
            .event_callback(move |event| {
                let tx = tx.clone();
                async move {
                    match event {
                        Event::ServerError(e) => {
                            let _ = tx.send(TransportError::Client(e.to_string()));
                        }
                        Event::ClientError(e) => {
                            let _ = tx.send(TransportError::Client(e.to_string()));
                        }
                        Event::Connected => tracing::info!("NATS connection established"),
                        other => tracing::warn!("NATS event: {}", other),
                    }
                }
            })
            .connect(servers)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        tracing::info!("Connected to NATS at {}", servers);

        Ok(Self { client, errors })
    }

    /// Handle to the underlying connection, e.g. for readiness checks
    pub fn connection(&self) -> async_nats::Client {
        self.client.clone()
    }

    /// Publisher for the outbound side
    pub fn sink(&self) -> NatsSink {
        NatsSink {
            client: self.client.clone(),
        }
    }

    /// Consume every input subject through a durable pull consumer.
    ///
    /// The stream is created on first use. Instances sharing `group` share the
    /// consumer and split the inbound messages between them; unacknowledged
    /// messages are redelivered after a restart.
    pub async fn subscribe(
        self,
        stream_name: &str,
        topics: &[String],
        group: &str,
    ) -> Result<NatsSource, TransportError> {
        let jetstream = jetstream::new(self.client);

        let stream = jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: stream_name.to_string(),
                subjects: topics.to_vec(),
                storage: jetstream::stream::StorageType::File,
                num_replicas: 1,
                ..Default::default()
            })
            .await
            .map_err(|e| TransportError::Subscribe(format!("stream '{}': {}", stream_name, e)))?;

        let mut config = jetstream::consumer::pull::Config {
            durable_name: Some(group.to_string()),
            ack_policy: jetstream::consumer::AckPolicy::Explicit,
            ..Default::default()
        };
        match topics {
            [topic] => config.filter_subject = topic.clone(),
            _ => config.filter_subjects = topics.to_vec(),
        }

        let consumer = stream
            .get_or_create_consumer(group, config)
            .await
            .map_err(|e| TransportError::Subscribe(format!("consumer '{}': {}", group, e)))?;

        let messages = consumer
            .messages()
            .await
            .map_err(|e| TransportError::Subscribe(e.to_string()))?;

        tracing::info!(
            "Consuming {:?} from stream '{}' with consumer '{}'",
            topics,
            stream_name,
            group
        );

        Ok(NatsSource {
            messages,
            pending: None,
            errors: self.errors,
        })
    }
}

/// Inbound side: messages of the durable consumer
pub struct NatsSource {
    messages: jetstream::consumer::pull::Stream,
    /// Last delivered message, waiting for its acknowledgement
    pending: Option<jetstream::Message>,
    errors: mpsc::UnboundedReceiver<TransportError>,
}

impl MessageSource for NatsSource {
    async fn poll(&mut self, timeout: Duration) -> BusEvent {
        if let Ok(error) = self.errors.try_recv() {
            return BusEvent::Error(error);
        }

        tokio::select! {
            Some(error) = self.errors.recv() => BusEvent::Error(error),
            next = tokio::time::timeout(timeout, self.messages.next()) => match next {
                Ok(Some(Ok(message))) => {
                    let bus_message = into_bus_message(&message.message);
                    self.pending = Some(message);
                    BusEvent::Message(bus_message)
                }
                Ok(Some(Err(e))) => BusEvent::Error(TransportError::Client(e.to_string())),
                Ok(None) => BusEvent::Error(TransportError::Closed),
                Err(_) => BusEvent::Empty,
            },
        }
    }

    async fn commit(&mut self) -> Result<(), TransportError> {
        match self.pending.take() {
            Some(message) => message
                .ack()
                .await
                .map_err(|e| TransportError::Ack(e.to_string())),
            None => Ok(()),
        }
    }
}

/// Key from the `Message-Key` header, every other header sorted by name
fn into_bus_message(message: &async_nats::Message) -> BusMessage {
    let mut key = None;
    let mut headers = Vec::new();

    if let Some(map) = &message.headers {
        for (name, values) in map.iter() {
            let name = name.to_string();
            if name == KEY_HEADER {
                key = values.first().map(|value| value.as_str().as_bytes().to_vec());
                continue;
            }
            for value in values {
                headers.push((name.clone(), value.as_str().to_string()));
            }
        }
        // Stable sort keeps repeated values of one header in their order
        headers.sort_by(|a, b| a.0.cmp(&b.0));
    }

    BusMessage {
        topic: message.subject.to_string(),
        key,
        value: message.payload.to_vec(),
        headers,
    }
}

fn into_header_map(key: Option<&[u8]>, headers: &[(String, String)]) -> Option<HeaderMap> {
    if key.is_none() && headers.is_empty() {
        return None;
    }

    let mut map = HeaderMap::new();
    for (name, value) in headers {
        map.append(name.as_str(), value.as_str());
    }
    if let Some(key) = key {
        map.insert(KEY_HEADER, &*String::from_utf8_lossy(key));
    }
    Some(map)
}

/// Outbound side
#[derive(Clone)]
pub struct NatsSink {
    client: async_nats::Client,
}

impl MessageSink for NatsSink {
    async fn produce(&mut self, message: BusMessage) -> Result<(), TransportError> {
        let BusMessage {
            topic,
            key,
            value,
            headers,
        } = message;

        let published = match into_header_map(key.as_deref(), &headers) {
            Some(headers) => {
                self.client
                    .publish_with_headers(topic, headers, value.into())
                    .await
            }
            None => self.client.publish(topic, value.into()).await,
        };

        published.map_err(|e| TransportError::Publish(e.to_string()))
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        self.client
            .flush()
            .await
            .map_err(|e| TransportError::Flush(e.to_string()))
    }
}
