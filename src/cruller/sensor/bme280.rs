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

use crate::sensor::core::{Humidity, PressureHectopascal, SensorError, SensorErrorKind, TemperatureCelsius};
use bme280::i2c::BME280;
use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::blocking::i2c::{Write, WriteRead};
use std::error::Error;
use std::fmt::{Debug, Formatter};

const PASCALS_PER_HECTOPASCAL: f64 = 100.0;

/// Read temperature in degrees celsius, pressure in hectopascals, and relative
/// humidity from a BME280 sensor on an I2C bus
pub struct BME280Sensor<I2C, D> {
    device: BME280<I2C>,
    delay: D,
    address: u8,
}

impl<I2C, D, E> BME280Sensor<I2C, D>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
    D: DelayMs<u8>,
    E: Error + Send + Sync + 'static,
{
    /// Verify the device at `address` is a BME280, reset it, and load its
    /// calibration data.
    pub fn from_bus(i2c: I2C, address: u8, mut delay: D) -> Result<Self, SensorError> {
        let mut device = BME280::new(i2c, address);
        device.init(&mut delay).map_err(from_device_error)?;
        tracing::debug!(message = "initialized sensor", address = address);

        Ok(Self { device, delay, address })
    }

    /// Trigger a forced measurement and return the compensated readings or an
    /// error if the sensor couldn't be read.
    pub fn read(&mut self) -> Result<(TemperatureCelsius, PressureHectopascal, Humidity), SensorError> {
        let bme280::Measurements {
            temperature,
            pressure,
            humidity,
            ..
        } = self.device.measure(&mut self.delay).map_err(from_device_error)?;

        tracing::debug!(
            message = "compensated sensor reading",
            temperature = temperature,
            pressure_pa = pressure,
            humidity = humidity,
        );

        Ok((
            TemperatureCelsius::from(f64::from(temperature)),
            PressureHectopascal::from(f64::from(pressure) / PASCALS_PER_HECTOPASCAL),
            Humidity::from(f64::from(humidity)),
        ))
    }
}

fn from_device_error<E>(e: bme280::Error<E>) -> SensorError
where
    E: Error + Send + Sync + 'static,
{
    match e {
        bme280::Error::Bus(cause) => {
            SensorError::KindMsgCause(SensorErrorKind::Bus, "unable to communicate with sensor", Box::new(cause))
        }
        bme280::Error::UnsupportedChip => {
            SensorError::KindMsg(SensorErrorKind::Initialization, "device at address is not a BME280")
        }
        bme280::Error::NoCalibrationData => {
            SensorError::KindMsg(SensorErrorKind::Initialization, "sensor calibration data not loaded")
        }
        other => {
            tracing::debug!(message = "invalid sensor data", error = ?other);
            SensorError::KindMsg(SensorErrorKind::InvalidData, "sensor returned an invalid measurement")
        }
    }
}

impl<I2C, D> Debug for BME280Sensor<I2C, D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BME280Sensor").field("address", &self.address).finish()
    }
}

#[cfg(test)]
mod test {
    use super::BME280Sensor;
    use crate::sensor::core::SensorErrorKind;
    use crate::sensor::test::{MockI2c, NopDelay};

    const ADDRESS: u8 = 0x76;
    const REG_CALIB_00: u8 = 0x88;
    const REG_CHIP_ID: u8 = 0xD0;
    const REG_CALIB_26: u8 = 0xE1;
    const REG_DATA: u8 = 0xF7;

    // Temperature and pressure trimming values from the Bosch datasheet along
    // with raw readings that compensate to 25.08c and 100653.27Pa.
    fn reference_bus() -> MockI2c {
        let mut low = Vec::new();
        for v in [27504u16, 26435, (-1000i16) as u16, 36477] {
            low.extend_from_slice(&v.to_le_bytes());
        }
        for v in [-10685i16, 3024, 2855, 140, -7, 15500, -14600, 6000] {
            low.extend_from_slice(&v.to_le_bytes());
        }
        low.extend_from_slice(&[0, 75]);

        let mut bus = MockI2c::at(ADDRESS);
        bus.set(REG_CHIP_ID, &[0x60]);
        bus.set(REG_CALIB_00, &low);
        bus.set(REG_CALIB_26, &[0x6E, 0x01, 0x00, 0x13, 0x25, 0x03, 0x1E]);
        // adc_P = 415148, adc_T = 519888, adc_H = 0x668F
        bus.set(REG_DATA, &[0x65, 0x5A, 0xC0, 0x7E, 0xED, 0x00, 0x66, 0x8F]);
        bus
    }

    #[test]
    fn test_sensor_wrong_chip_id() {
        let mut bus = MockI2c::at(ADDRESS);
        bus.set(REG_CHIP_ID, &[0x42]);

        let res = BME280Sensor::from_bus(bus, ADDRESS, NopDelay);
        assert_eq!(SensorErrorKind::Initialization, res.unwrap_err().kind());
    }

    #[test]
    fn test_sensor_bus_failure() {
        let res = BME280Sensor::from_bus(MockI2c::failing(ADDRESS), ADDRESS, NopDelay);
        assert_eq!(SensorErrorKind::Bus, res.unwrap_err().kind());
    }

    #[test]
    fn test_sensor_read() {
        let mut sensor = BME280Sensor::from_bus(reference_bus(), ADDRESS, NopDelay).unwrap();

        let (t, p, h) = sensor.read().unwrap();
        let (t, p, h): (f64, f64, f64) = (t.into(), p.into(), h.into());

        assert!((t - 25.08).abs() < 0.01, "temperature: {}", t);
        assert!((p - 1006.53).abs() < 0.05, "pressure: {}", p);
        assert!((0.0..=100.0).contains(&h), "humidity: {}", h);
    }

    #[test]
    fn test_sensor_wrong_address() {
        let res = BME280Sensor::from_bus(reference_bus(), 0x77, NopDelay);
        assert_eq!(SensorErrorKind::Bus, res.unwrap_err().kind());
    }
}
