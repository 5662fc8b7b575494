//! MQTT command ingress and status heartbeat.
//!
//! The bus owns the broker connection on its own thread and never touches
//! engine state: payloads are normalized into [`Command`]s and handed to the
//! owning tick loop over a crossbeam channel. A second thread publishes a
//! retained heartbeat so dashboards see liveness immediately after
//! subscribing.

use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;
use rumqttc::{Client, Connection, Event, Incoming, MqttOptions, QoS};

use crate::command::{self, Channel, Command};
use crate::config::{MqttConfig, Topics};

const STATUS_INTERVAL: Duration = Duration::from_secs(5);
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Start the bus threads and return the client handle (for shutdown).
pub fn spawn(cfg: MqttConfig, tx: Sender<Command>) -> Client {
    let mut options = MqttOptions::new(cfg.client_id.clone(), cfg.host.clone(), cfg.port);
    options.set_keep_alive(Duration::from_secs(30));
    let (client, connection) = Client::new(options, 64);

    let qos = qos_from(cfg.qos);
    let topics = cfg.topics.clone();
    let client_events = client.clone();
    thread::spawn(move || event_loop(connection, client_events, topics, qos, tx));

    let client_status = client.clone();
    let status_topic = cfg.topics.status.clone();
    thread::spawn(move || heartbeat_loop(client_status, status_topic));

    client
}

/// Drive the broker connection: (re)subscribe on connect, forward publishes.
fn event_loop(
    mut connection: Connection,
    client: Client,
    topics: Topics,
    qos: QoS,
    tx: Sender<Command>,
) {
    for event in connection.iter() {
        match event {
            Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                tracing::info!("mqtt connected");
                for topic in [&topics.background, &topics.hint, &topics.panic] {
                    if let Err(e) = client.subscribe(topic, qos) {
                        tracing::warn!(topic = %topic, "subscribe failed: {e}");
                    }
                }
            }
            Ok(Event::Incoming(Incoming::Publish(msg))) => {
                let Some(channel) = channel_for_topic(&topics, &msg.topic) else {
                    tracing::debug!(topic = %msg.topic, "ignoring unrouted topic");
                    continue;
                };
                match command::parse(channel, &msg.payload) {
                    Ok(cmd) => {
                        if tx.send(cmd).is_err() {
                            // Engine gone; nothing left to deliver to.
                            return;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(topic = %msg.topic, "dropped payload: {e:#}");
                    }
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("mqtt connection error: {e}");
                thread::sleep(RECONNECT_DELAY);
            }
        }
    }
}

/// Publish a retained `{"status": "ok"}` every few seconds.
fn heartbeat_loop(client: Client, topic: String) {
    let payload = serde_json::json!({ "status": "ok" }).to_string();
    loop {
        if let Err(e) = client.publish(&topic, QoS::AtMostOnce, true, payload.clone()) {
            tracing::debug!("heartbeat publish failed: {e}");
        }
        thread::sleep(STATUS_INTERVAL);
    }
}

/// Map a publish topic onto its logical command channel.
fn channel_for_topic(topics: &Topics, topic: &str) -> Option<Channel> {
    if topic == topics.background {
        Some(Channel::Background)
    } else if topic == topics.hint {
        Some(Channel::Hint)
    } else if topic == topics.panic {
        Some(Channel::Panic)
    } else {
        None
    }
}

fn qos_from(level: u8) -> QoS {
    match level {
        2 => QoS::ExactlyOnce,
        1 => QoS::AtLeastOnce,
        _ => QoS::AtMostOnce,
    }
}
