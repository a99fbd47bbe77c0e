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

//! Collect sensor readings and write them to InfluxDB.
//!
//! ## Features
//!
//! Cruller is a set of small programs that each read a value from one source and
//! write it as a point to an [InfluxDB](https://docs.influxdata.com/influxdb/v1/) 1.x
//! server. They're meant to be run on a Raspberry PI (3 or 4) from cron or a Systemd
//! timer, except for `cruller-mqtt` which runs until stopped.
//!
//! * `cruller-bme280` reads a BME280 sensor on an I2C bus and writes the `temperature`,
//!   `humidity`, and `presure` fields of the `bme280` measurement, tagged with `host`.
//! * `cruller-dht22` reads a DHT22 sensor on a GPIO pin and writes the `temperature`
//!   and `humidity` fields of the `dht22` measurement, tagged with `host`.
//! * `cruller-modem` reads the signal quality of each modem known to ModemManager over
//!   D-Bus and writes the `signalquality` field of the `E3276` measurement, tagged with `host`.
//! * `cruller-mqtt` subscribes to JSON messages on an MQTT topic and writes the `temperature`
//!   and `humidity` fields of the `sht30` measurement, tagged with `client`.
//!
//! Every point is written by itself, with second precision. Any failure to read a
//! sensor or write a point is logged and the program exits with status `1`.
//!
//! ## Build
//!
//! `cruller` is a Rust program and must be built from source using a [Rust toolchain](https://rustup.rs/).
//! To build for a Raspberry PI, add a toolchain for ARMv7 and cross-compile.
//!
//! ```text
//! rustup target add armv7-unknown-linux-gnueabihf
//! cargo build --release --target armv7-unknown-linux-gnueabihf
//! ```
//!
//! ## Run
//!
//! Reading the DHT22 sensor requires access to `/dev/gpiomem` and reading the BME280
//! requires access to `/dev/i2c-1` (or whichever bus it's connected to). Both are
//! usually only available to `root` or members of the `gpio` and `i2c` groups.
//!
//! ```text
//! cruller-dht22 --bcm-pin 17 --db-server http://influx.example.com:8086
//! cruller-mqtt --mqtt-server ssl://broker.example.com --malformed-payload skip
//! ```
//!
//! The DHT22 sensor can only be read every two seconds, at most. Failed reads are
//! retried (up to `--retries` times) after waiting that long.
//!

pub mod influx;
pub mod modem;
pub mod mqtt;
pub mod readings;
pub mod sensor;
