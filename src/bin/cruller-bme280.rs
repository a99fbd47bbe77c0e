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
use cruller::sensor::{open_i2c, BME280Sensor};
use rppal::hal::Delay;
use std::num::ParseIntError;
use std::process;
use std::time::SystemTime;
use tokio::task;
use tracing::{Instrument, Level};

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_I2C_BUS: u8 = 1;
const DEFAULT_I2C_ADDRESS: &str = "0x76";
const DEFAULT_DB_NAME: &str = "temperature";
const DEFAULT_HOST: &str = "localhost";

/// Write temperature, humidity, and pressure from a BME280 sensor to InfluxDB
///
/// Read the BME280 sensor connected to an I2C bus of the local machine, usually a
/// Raspberry PI, once and write the compensated readings as a single point to the
/// `bme280` measurement of an InfluxDB database.
#[derive(Debug, Parser)]
#[clap(name = "cruller-bme280", version = clap::crate_version!())]
struct Bme280Application {
    /// Number of the I2C bus the sensor is connected to (i.e. `/dev/i2c-N`)
    #[arg(long, default_value_t = DEFAULT_I2C_BUS)]
    i2c_bus: u8,

    /// Address of the sensor on the I2C bus, decimal or hex with a `0x` prefix
    #[arg(long, default_value = DEFAULT_I2C_ADDRESS, value_parser = parse_address)]
    address: u8,

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

fn parse_address(s: &str) -> Result<u8, ParseIntError> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let opts = Bme280Application::parse();
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

    let (bus, address) = (opts.i2c_bus, opts.address);
    let res = task::spawn_blocking(move || {
        let i2c = open_i2c(bus)?;
        let mut sensor = BME280Sensor::from_bus(i2c, address, Delay::new())?;
        sensor.read()
    })
    .instrument(tracing::span!(Level::DEBUG, "sensor_read"))
    .await?;

    let (temperature, pressure, humidity) = res.unwrap_or_else(|e| {
        tracing::error!(
            message = "failed to read sensor",
            i2c_bus = bus,
            address = address,
            kind = e.kind().as_label(),
            error = %e,
        );
        process::exit(1)
    });

    tracing::info!(
        message = "read sensor",
        temperature = %temperature,
        humidity = %humidity,
        pressure = %pressure,
    );

    let point = readings::bme280_point(&opts.host, temperature, humidity, pressure, SystemTime::now())
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
