// Cruller - Sensor readings collector for InfluxDB
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::influx::{FieldValue, InfluxClient, InfluxError, Point};
use clap::ValueEnum;
use rumqttc::{
    AsyncClient, ClientError, ConnectionError, Event, EventLoop, MqttOptions, Packet, QoS, SubscribeReasonCode,
    TlsConfiguration, Transport,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{self, Formatter};
use std::str::FromStr;
use std::time::{Duration, SystemTime};

const DEFAULT_TCP_PORT: u16 = 1883;
const DEFAULT_TLS_PORT: u16 = 8883;
const KEEP_ALIVE: Duration = Duration::from_secs(30);
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const REQUEST_CAPACITY: usize = 10;

/// Temperature and humidity reading published by a remote sensor, e.g.
/// `{"temperature": 21.3, "humidity": 40.1, "client": "kitchen"}`.
///
/// Missing or `null` keys take their zero value and unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Measurement {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub client: Option<String>,
}

impl Measurement {
    /// Parse a measurement from a JSON object, any other JSON value is an error.
    pub fn from_json(payload: &[u8]) -> Result<Self, serde_json::Error> {
        let object: Map<String, Value> = serde_json::from_slice(payload)?;
        serde_json::from_value(Value::Object(object))
    }

    /// Build a point tagged with the publishing client
    pub fn into_point(self, measurement: &str, time: SystemTime) -> Result<Point, InfluxError> {
        let tags = BTreeMap::from([("client".to_owned(), self.client.unwrap_or_default())]);
        let fields = BTreeMap::from([
            ("temperature".to_owned(), FieldValue::Float(self.temperature.unwrap_or_default())),
            ("humidity".to_owned(), FieldValue::Float(self.humidity.unwrap_or_default())),
        ]);

        Point::new(measurement, tags, fields, time)
    }
}

/// What to do with a message whose payload can't be parsed or converted to a point
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PayloadPolicy {
    /// Stop the subscriber with an error
    Fail,
    /// Log the payload and keep going
    Skip,
}

/// Error parsing a broker address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddressError {
    msg: &'static str,
    address: String,
}

impl fmt::Display for BrokerAddressError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.msg, self.address)
    }
}

impl Error for BrokerAddressError {}

/// Host and port of an MQTT broker and whether to connect with TLS.
///
/// Parsed from URLs of the form `scheme://host[:port]`. The `tcp` and `mqtt`
/// schemes use plain TCP, `ssl`, `tls`, `tcps`, and `mqtts` use TLS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl FromStr for BrokerAddress {
    type Err = BrokerAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |msg| BrokerAddressError {
            msg,
            address: s.to_owned(),
        };

        let (scheme, rest) = s.split_once("://").ok_or_else(|| err("missing scheme"))?;
        let tls = match scheme.to_ascii_lowercase().as_str() {
            "tcp" | "mqtt" => false,
            "ssl" | "tls" | "tcps" | "mqtts" => true,
            _ => return Err(err("unsupported scheme")),
        };

        let authority = rest.trim_end_matches('/');
        if authority.contains('/') {
            return Err(err("unexpected path"));
        }

        let default_port = if tls { DEFAULT_TLS_PORT } else { DEFAULT_TCP_PORT };
        let parse_port = |p: &str| p.parse::<u16>().map_err(|_| err("invalid port"));

        let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
            let (host, after) = bracketed.split_once(']').ok_or_else(|| err("unterminated IPv6 address"))?;
            match after {
                "" => (host, default_port),
                _ => (host, parse_port(after.strip_prefix(':').ok_or_else(|| err("invalid port"))?)?),
            }
        } else {
            let (host, port) = match authority.rsplit_once(':') {
                Some((host, port)) => (host, parse_port(port)?),
                None => (authority, default_port),
            };

            if host.contains(':') {
                return Err(err("IPv6 address must be enclosed in brackets"));
            }

            (host, port)
        };

        if host.is_empty() {
            return Err(err("missing host"));
        }

        Ok(BrokerAddress {
            host: host.to_owned(),
            port,
            tls,
        })
    }
}

impl fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let scheme = if self.tls { "ssl" } else { "tcp" };
        if self.host.contains(':') {
            write!(f, "{}://[{}]:{}", scheme, self.host, self.port)
        } else {
            write!(f, "{}://{}:{}", scheme, self.host, self.port)
        }
    }
}

/// Error subscribing to a topic or handling messages from it
#[derive(Debug)]
pub enum MqttError {
    Tls(native_tls::Error),
    Connection(ConnectionError),
    Client(ClientError),
    SubscribeRejected(String),
    Payload(serde_json::Error),
    Point(InfluxError),
    Write(InfluxError),
}

impl fmt::Display for MqttError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            MqttError::Tls(e) => write!(f, "unable to initialize TLS: {}", e),
            MqttError::Connection(e) => write!(f, "unable to connect to broker: {}", e),
            MqttError::Client(e) => write!(f, "unable to send request to broker: {}", e),
            MqttError::SubscribeRejected(topic) => write!(f, "subscription to {} rejected by broker", topic),
            MqttError::Payload(e) => write!(f, "malformed payload: {}", e),
            MqttError::Point(e) => write!(f, "unable to create point: {}", e),
            MqttError::Write(e) => write!(f, "unable to write point: {}", e),
        }
    }
}

impl Error for MqttError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MqttError::Tls(e) => Some(e),
            MqttError::Connection(e) => Some(e),
            MqttError::Client(e) => Some(e),
            MqttError::SubscribeRejected(_) => None,
            MqttError::Payload(e) => Some(e),
            MqttError::Point(e) => Some(e),
            MqttError::Write(e) => Some(e),
        }
    }
}

/// Create client options for the broker. TLS connections accept any certificate
/// and hostname.
pub fn mqtt_options(address: &BrokerAddress, client_id: &str) -> Result<MqttOptions, MqttError> {
    let mut options = MqttOptions::new(client_id, &address.host, address.port);
    options.set_keep_alive(KEEP_ALIVE);

    if address.tls {
        let connector = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()
            .map_err(MqttError::Tls)?;

        options.set_transport(Transport::tls_with_config(TlsConfiguration::NativeConnector(connector)));
    }

    Ok(options)
}

/// Parse a message payload and convert it to a point.
///
/// Returns `None` when the payload is malformed or doesn't make a valid point
/// and the policy is to skip it.
pub fn point_from_payload(
    payload: &[u8],
    policy: PayloadPolicy,
    measurement: &str,
    time: SystemTime,
) -> Result<Option<Point>, MqttError> {
    let res = Measurement::from_json(payload).map_err(MqttError::Payload).and_then(|m| {
        tracing::info!(
            message = "received measurement",
            client = ?m.client,
            temperature = ?m.temperature,
            humidity = ?m.humidity,
        );

        m.into_point(measurement, time).map_err(MqttError::Point)
    });

    match res {
        Ok(point) => Ok(Some(point)),
        Err(e) if policy == PayloadPolicy::Skip => {
            tracing::warn!(
                message = "skipping malformed payload",
                payload = %String::from_utf8_lossy(payload),
                error = %e,
            );
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Topic, destination, and error handling of a subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberConfig {
    pub topic: String,
    pub database: String,
    pub measurement: String,
    pub policy: PayloadPolicy,
}

/// Request to make in response to an event from the broker
#[derive(Debug, PartialEq)]
enum Action {
    Nothing,
    Subscribe,
    Write(Point),
}

/// State of a subscription across connections to the broker
#[derive(Debug)]
struct Session {
    config: SubscriberConfig,
    connected: bool,
}

impl Session {
    fn new(config: SubscriberConfig) -> Self {
        Session {
            config,
            connected: false,
        }
    }

    /// Handle one event from the broker. Every CONNACK, including those after a
    /// reconnect, asks for the topic to be subscribed to.
    fn on_event(&mut self, event: Event, time: SystemTime) -> Result<Action, MqttError> {
        match event {
            Event::Incoming(Packet::ConnAck(_)) => {
                self.connected = true;
                tracing::info!(message = "connected to broker", topic = %self.config.topic);
                Ok(Action::Subscribe)
            }
            Event::Incoming(Packet::SubAck(ack)) => {
                if ack.return_codes.iter().any(|c| matches!(c, SubscribeReasonCode::Failure)) {
                    return Err(MqttError::SubscribeRejected(self.config.topic.clone()));
                }

                tracing::debug!(message = "subscribed to topic", topic = %self.config.topic);
                Ok(Action::Nothing)
            }
            Event::Incoming(Packet::Publish(publish)) => {
                tracing::debug!(
                    message = "received message",
                    topic = %publish.topic,
                    bytes = publish.payload.len(),
                );

                let point = point_from_payload(&publish.payload, self.config.policy, &self.config.measurement, time)?;
                Ok(point.map(Action::Write).unwrap_or(Action::Nothing))
            }
            event => {
                tracing::trace!(message = "mqtt event", event = ?event);
                Ok(Action::Nothing)
            }
        }
    }

    /// Failing to connect the first time is an error. Losing the connection
    /// afterwards isn't, the event loop reconnects on the next poll.
    fn on_error(&self, e: ConnectionError) -> Result<(), MqttError> {
        if !self.connected {
            return Err(MqttError::Connection(e));
        }

        tracing::warn!(message = "lost connection to broker, reconnecting", error = %e);
        Ok(())
    }
}

/// Subscribe to a topic and write each message received as a point.
pub struct Subscriber {
    client: AsyncClient,
    event_loop: EventLoop,
    session: Session,
}

impl Subscriber {
    pub fn new(options: MqttOptions, config: SubscriberConfig) -> Self {
        let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);
        Subscriber {
            client,
            event_loop,
            session: Session::new(config),
        }
    }

    /// Drive the connection to the broker until an unrecoverable error occurs:
    /// failing to connect the first time, the subscription being rejected, a
    /// malformed payload when the policy is to fail, or failing to write a point.
    pub async fn run(mut self, influx: InfluxClient) -> Result<(), MqttError> {
        loop {
            let event = match self.event_loop.poll().await {
                Ok(event) => event,
                Err(e) => {
                    self.session.on_error(e)?;
                    tokio::time::sleep(RECONNECT_DELAY).await;
                    continue;
                }
            };

            match self.session.on_event(event, SystemTime::now())? {
                Action::Nothing => {}
                Action::Subscribe => self
                    .client
                    .subscribe(self.session.config.topic.as_str(), QoS::AtMostOnce)
                    .await
                    .map_err(MqttError::Client)?,
                Action::Write(point) => influx
                    .write_point(&self.session.config.database, point)
                    .await
                    .map_err(MqttError::Write)?,
            }
        }
    }
}
