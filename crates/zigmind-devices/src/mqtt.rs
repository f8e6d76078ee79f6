//! MQTT transport backed by rumqttc.
//!
//! [`MqttBus::connect`] spawns the client event loop. Incoming publishes are
//! forwarded into an mpsc channel; subscriptions are replayed after every
//! reconnect.

use async_trait::async_trait;
use parking_lot::Mutex;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use zigmind_core::MqttSettings;

use crate::transport::{InboundMessage, MessageBus, TransportError, TransportResult};

/// Capacity of the inbound message channel.
pub const INBOUND_CHANNEL_CAPACITY: usize = 1024;

/// Maximum MQTT packet size (bridge device lists can be large).
const MAX_PACKET_SIZE: usize = 10 * 1024 * 1024;

/// rumqttc-backed [`MessageBus`].
#[derive(Clone)]
pub struct MqttBus {
    client: AsyncClient,
    subscriptions: Arc<Mutex<BTreeSet<String>>>,
    broker_addr: String,
}

impl MqttBus {
    /// Connect to the broker and start the event loop.
    ///
    /// Returns the bus, the inbound message stream and the event loop task.
    pub fn connect(
        settings: &MqttSettings,
    ) -> (Self, mpsc::Receiver<InboundMessage>, JoinHandle<()>) {
        let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
        options.set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);
        options.set_keep_alive(Duration::from_secs(settings.keep_alive_secs));
        if let (Some(user), Some(pass)) = (&settings.username, &settings.password) {
            options.set_credentials(user, pass);
        }

        let (client, mut eventloop) = AsyncClient::new(options, 64);
        let (tx, rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        let subscriptions = Arc::new(Mutex::new(BTreeSet::new()));
        let broker_addr = settings.full_broker_addr();

        let bus = Self {
            client: client.clone(),
            subscriptions: subscriptions.clone(),
            broker_addr: broker_addr.clone(),
        };

        let handle = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let message = InboundMessage {
                            topic: publish.topic.to_string(),
                            payload: publish.payload.to_vec(),
                        };
                        if tx.send(message).await.is_err() {
                            debug!("Inbound receiver dropped, stopping MQTT event loop");
                            break;
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("Connected to MQTT broker {}", broker_addr);
                        let topics: Vec<String> = subscriptions.lock().iter().cloned().collect();
                        // the request queue is drained by this loop, so replay from another task
                        let client = client.clone();
                        tokio::spawn(async move {
                            for topic in topics {
                                if let Err(e) = client.subscribe(&topic, QoS::AtLeastOnce).await {
                                    warn!("Failed to resubscribe to {}: {}", topic, e);
                                }
                            }
                        });
                    }
                    Ok(_) => {}
                    Err(e) => {
                        // rumqttc reconnects on the next poll
                        error!("MQTT connection to {} failed: {}", broker_addr, e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        (bus, rx, handle)
    }

    pub fn broker_addr(&self) -> &str {
        &self.broker_addr
    }

    /// Disconnect from the broker.
    pub async fn disconnect(&self) -> TransportResult<()> {
        self.client
            .disconnect()
            .await
            .map_err(|e| TransportError::NotConnected(e.to_string()))
    }
}

#[async_trait]
impl MessageBus for MqttBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> TransportResult<()> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| TransportError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    async fn subscribe(&self, topic: &str) -> TransportResult<()> {
        let added = self.subscriptions.lock().insert(topic.to_string());
        if !added {
            debug!("Already subscribed to {}", topic);
            return Ok(());
        }
        self.client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| {
                self.subscriptions.lock().remove(topic);
                TransportError::Subscribe {
                    topic: topic.to_string(),
                    reason: e.to_string(),
                }
            })
    }
}
