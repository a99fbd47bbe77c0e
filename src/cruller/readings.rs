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

use crate::influx::{FieldValue, InfluxError, Point};
use crate::sensor::{Humidity, PressureHectopascal, TemperatureCelsius};
use std::collections::BTreeMap;
use std::time::SystemTime;

pub const BME280_MEASUREMENT: &str = "bme280";
pub const DHT22_MEASUREMENT: &str = "dht22";

// Misspelled to match the series written by existing deployments.
const PRESSURE_FIELD: &str = "presure";

fn host_tags(host: &str) -> BTreeMap<String, String> {
    BTreeMap::from([("host".to_owned(), host.to_owned())])
}

/// Build a `bme280` point with temperature, humidity, and pressure fields.
pub fn bme280_point(
    host: &str,
    temperature: TemperatureCelsius,
    humidity: Humidity,
    pressure: PressureHectopascal,
    time: SystemTime,
) -> Result<Point, InfluxError> {
    let fields = BTreeMap::from([
        ("temperature".to_owned(), FieldValue::from(f64::from(temperature))),
        ("humidity".to_owned(), FieldValue::from(f64::from(humidity))),
        (PRESSURE_FIELD.to_owned(), FieldValue::from(f64::from(pressure))),
    ]);

    Point::new(BME280_MEASUREMENT, host_tags(host), fields, time)
}

/// Build a `dht22` point with temperature and humidity fields.
pub fn dht22_point(
    host: &str,
    temperature: TemperatureCelsius,
    humidity: Humidity,
    time: SystemTime,
) -> Result<Point, InfluxError> {
    let fields = BTreeMap::from([
        ("temperature".to_owned(), FieldValue::from(f64::from(temperature))),
        ("humidity".to_owned(), FieldValue::from(f64::from(humidity))),
    ]);

    Point::new(DHT22_MEASUREMENT, host_tags(host), fields, time)
}

#[cfg(test)]
mod test {
    use super::{bme280_point, dht22_point};
    use crate::influx::{InfluxErrorKind, Precision};
    use crate::sensor::{Humidity, PressureHectopascal, TemperatureCelsius};
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn test_bme280_point() {
        let point = bme280_point(
            "localhost",
            TemperatureCelsius::from(21.25),
            Humidity::from(45.5),
            PressureHectopascal::from(1013.5),
            UNIX_EPOCH + Duration::from_millis(1_650_000_000_900),
        )
        .unwrap();

        assert_eq!(
            "bme280,host=localhost humidity=45.5,presure=1013.5,temperature=21.25 1650000000",
            point.to_line(Precision::Seconds)
        );
    }

    #[test]
    fn test_dht22_point() {
        let point = dht22_point(
            "localhost",
            TemperatureCelsius::from(-4.5),
            Humidity::from(88.0),
            UNIX_EPOCH + Duration::from_secs(12),
        )
        .unwrap();

        assert_eq!("dht22", point.measurement());
        assert_eq!(2, point.fields().len());
        assert_eq!(
            "dht22,host=localhost humidity=88,temperature=-4.5 12",
            point.to_line(Precision::Seconds)
        );
    }

    #[test]
    fn test_dht22_point_not_finite() {
        let err = dht22_point(
            "localhost",
            TemperatureCelsius::from(f64::NAN),
            Humidity::from(50.0),
            UNIX_EPOCH,
        )
        .unwrap_err();

        assert_eq!(InfluxErrorKind::InvalidPoint, err.kind());
    }
}
