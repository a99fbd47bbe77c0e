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
use cruller::readings;
use cruller::sensor::{open_pin, DHT22Sensor, MIN_READ_INTERVAL};
use std::process;
use std::time::SystemTime;
use tokio::task;
use tracing::{Instrument, Level};

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_BCM_PIN: u8 = 10;
const DEFAULT_RETRIES: u32 = 10;
const DEFAULT_DB_NAME: &str = "temperature";
const DEFAULT_HOST: &str = "localhost";

/// Write temperature and humidity from a DHT22 sensor to InfluxDB
///
/// Read the DHT22 sensor connected to a data pin of the local machine, usually a
/// Raspberry PI, and write the reading as a single point to the `dht22`
/// measurement of an InfluxDB database. Reads of the sensor fail regularly so
/// they are retried, waiting two seconds between attempts.
///
/// The numbering of GPIO pins is based on the Broadcom SOC channel.
#[derive(Debug, Parser)]
#[clap(name = "cruller-dht22", version = clap::crate_version!())]
struct Dht22Application {
    /// BCM GPIO pin number the DHT22 sensor data line is connected to
    #[arg(long, default_value_t = DEFAULT_BCM_PIN)]
    bcm_pin: u8,

    /// Number of times to retry reading the sensor after a failure
    #[arg(long, default_value_t = DEFAULT_RETRIES)]
    retries: u32,

    /// Database to write the reading to
    #[arg(long, default_value = DEFAULT_DB_NAME)]
    db_name: String,

    /// Value of the `host` tag of the point written
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    #[command(flatten)]
    influx: InfluxOptions,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[arg(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let opts = Dht22Application::parse();
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

    let pin = open_pin(opts.bcm_pin).unwrap_or_else(|e| {
        tracing::error!(message = "failed to initialize data pin", bcm_pin = opts.bcm_pin, error = %e);
        process::exit(1)
    });

    let mut sensor = DHT22Sensor::from_pin(pin);
    let retries = opts.retries;
    let res = task::spawn_blocking(move || sensor.read_with_retry(retries, MIN_READ_INTERVAL))
        .instrument(tracing::span!(Level::DEBUG, "sensor_read"))
        .await?;

    let reading = res.unwrap_or_else(|e| {
        tracing::error!(
            message = "failed to read sensor",
            bcm_pin = opts.bcm_pin,
            retries = retries,
            kind = e.kind().as_label(),
            error = %e,
        );
        process::exit(1)
    });

    tracing::info!(
        message = "read sensor",
        temperature = %reading.temperature,
        humidity = %reading.humidity,
        retried = reading.retried,
    );

    let point = readings::dht22_point(&opts.host, reading.temperature, reading.humidity, SystemTime::now())
        .unwrap_or_else(|e| {
            tracing::error!(message = "failed to create point", error = %e);
            process::exit(1)
        });

    client.write_point(&opts.db_name, point).await.unwrap_or_else(|e| {
        tracing::error!(message = "failed to write point", database = %opts.db_name, error = %e);
        process::exit(1)
    });

    tracing::info!(message = "wrote point", database = %opts.db_name);
    Ok(())
}
