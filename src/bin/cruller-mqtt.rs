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

use clap::Parser;
use cruller::influx::{InfluxClient, InfluxConfig, InfluxOptions};
use cruller::mqtt::{mqtt_options, BrokerAddress, PayloadPolicy, Subscriber, SubscriberConfig};
use std::{io, process};
use tokio::signal::unix::{self, SignalKind};
use tracing::Level;

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_MQTT_SERVER: &str = "tcp://127.0.0.1:1883";
const DEFAULT_MQTT_TOPIC: &str = "outTopic";
const DEFAULT_MQTT_CLIENT_ID: &str = "cruller-mqtt";
const DEFAULT_DB_NAME: &str = "temperature";
const MEASUREMENT: &str = "sht30";

/// Write temperature and humidity published over MQTT to InfluxDB
///
/// Subscribe to a topic on an MQTT broker and write each message, a JSON object
/// with `temperature`, `humidity`, and `client` keys, as a point to the `sht30`
/// measurement of an InfluxDB database. Runs until SIGINT or SIGTERM.
///
/// Brokers using TLS (`ssl://` or `mqtts://`) are connected to without verifying
/// their certificate.
#[derive(Debug, Parser)]
#[clap(name = "cruller-mqtt", version = clap::crate_version!())]
struct MqttApplication {
    /// MQTT broker address, as `scheme://host[:port]`
    #[arg(long, default_value = DEFAULT_MQTT_SERVER)]
    mqtt_server: BrokerAddress,

    /// Topic to subscribe to
    #[arg(long, default_value = DEFAULT_MQTT_TOPIC)]
    mqtt_topic: String,

    /// Client ID to connect to the broker with
    #[arg(long, default_value = DEFAULT_MQTT_CLIENT_ID)]
    mqtt_client_id: String,

    /// Database to write readings to
    #[arg(long, default_value = DEFAULT_DB_NAME)]
    db_name: String,

    /// What to do with messages that aren't valid JSON: 'fail' to exit with an
    /// error, 'skip' to log them and keep going
    #[arg(long, value_enum, default_value_t = PayloadPolicy::Fail)]
    malformed_payload: PayloadPolicy,

    #[command(flatten)]
    influx: InfluxOptions,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[arg(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let opts = MqttApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    let client = InfluxClient::new(InfluxConfig::from(&opts.influx)).unwrap_or_else(|e| {
        tracing::error!(message = "failed to create InfluxDB client", address = %opts.influx.db_server, error = %e);
        process::exit(1)
    });

    let options = mqtt_options(&opts.mqtt_server, &opts.mqtt_client_id).unwrap_or_else(|e| {
        tracing::error!(message = "failed to create MQTT options", server = %opts.mqtt_server, error = %e);
        process::exit(1)
    });

    let subscriber = Subscriber::new(
        options,
        SubscriberConfig {
            topic: opts.mqtt_topic.clone(),
            database: opts.db_name.clone(),
            measurement: MEASUREMENT.to_owned(),
            policy: opts.malformed_payload,
        },
    );

    tracing::info!(
        message = "starting subscriber",
        server = %opts.mqtt_server,
        topic = %opts.mqtt_topic,
        database = %opts.db_name,
    );

    let mut handle = tokio::spawn(subscriber.run(client));

    // Wait for either SIGTERM or SIGINT to shutdown unless the subscriber fails first
    tokio::select! {
        res = &mut handle => {
            match res? {
                Ok(()) => {}
                Err(e) => {
                    tracing::error!(message = "subscriber failed", server = %opts.mqtt_server, error = %e);
                    process::exit(1)
                }
            }
        }
        _ = sigterm() => {}
        _ = sigint() => {}
    }

    handle.abort();
    tracing::info!("subscriber shutdown");
    Ok(())
}

/// Return after the first SIGTERM signal received by this process
async fn sigterm() -> io::Result<()> {
    unix::signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

/// Return after the first SIGINT signal received by this process
async fn sigint() -> io::Result<()> {
    tokio::signal::ctrl_c().await
}
