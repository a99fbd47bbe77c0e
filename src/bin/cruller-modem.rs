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
use cruller::modem::ModemManager;
use std::process;
use std::time::SystemTime;
use tracing::Level;

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_DB_NAME: &str = "modem";
const DEFAULT_MEASUREMENT: &str = "E3276";
const DEFAULT_HOST: &str = "localhost";

/// Write the signal quality of cellular modems to InfluxDB
///
/// Ask ModemManager over the system D-Bus for every modem it manages and write
/// the signal quality (0 to 100) of each one as a point to an InfluxDB database.
#[derive(Debug, Parser)]
#[clap(name = "cruller-modem", version = clap::crate_version!())]
struct ModemApplication {
    /// Database to write signal quality to
    #[arg(long, default_value = DEFAULT_DB_NAME)]
    db_name: String,

    /// Measurement to write signal quality to
    #[arg(long, default_value = DEFAULT_MEASUREMENT)]
    measurement: String,

    /// Value of the `host` tag of the points written
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
    let opts = ModemApplication::parse();
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

    let manager = ModemManager::system().await.unwrap_or_else(|e| {
        tracing::error!(message = "failed to connect to ModemManager", error = %e);
        process::exit(1)
    });

    let modems = manager.modems().await.unwrap_or_else(|e| {
        tracing::error!(message = "failed to list modems", error = %e);
        process::exit(1)
    });

    if modems.is_empty() {
        tracing::warn!(message = "no modems found");
    }

    for path in modems {
        let quality = manager.signal_quality(&path).await.unwrap_or_else(|e| {
            tracing::error!(message = "failed to get signal quality", path = %path, error = %e);
            process::exit(1)
        });

        tracing::info!(
            message = "read signal quality",
            path = %path,
            quality = quality.percent,
            recent = quality.recent,
        );

        let point = quality
            .into_point(&opts.measurement, &opts.host, SystemTime::now())
            .unwrap_or_else(|e| {
                tracing::error!(message = "failed to create point", path = %path, error = %e);
                process::exit(1)
            });

        client.write_point(&opts.db_name, point).await.unwrap_or_else(|e| {
            tracing::error!(message = "failed to write point", database = %opts.db_name, path = %path, error = %e);
            process::exit(1)
        });
    }

    tracing::info!(message = "wrote points", database = %opts.db_name);
    Ok(())
}
