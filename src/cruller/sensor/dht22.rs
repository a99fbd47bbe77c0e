// Cruller - Sensor readings collector for InfluxDB
//
// Copyright 2021-2022 Nick Pillitteri
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

use crate::sensor::core::{DataPin, Humidity, SensorError, SensorErrorKind, TemperatureCelsius};
use rppal::gpio::Mode;
use std::fmt::{Debug, Formatter};
use std::thread;
use std::time::Duration;

pub(crate) const DHT_MAX_COUNT: u32 = 32_000;
pub(crate) const DHT_PULSES: usize = 41;
pub(crate) const DATA_SIZE: usize = 5;

/// Minimum time between two reads of the sensor, from the datasheet.
pub const MIN_READ_INTERVAL: Duration = Duration::from_secs(2);

/// Successful reading along with the number of failed attempts before it.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RetriedReading {
    pub temperature: TemperatureCelsius,
    pub humidity: Humidity,
    pub retried: u32,
}

/// Cycle counts spent by the data pin in the low and high state for each pulse.
///
/// Entries alternate low, high, low, high. The first pair is the sensor response
/// and carries no data, the remaining 40 pairs are one bit each.
#[derive(Debug)]
struct Pulses {
    counts: [u32; DHT_PULSES * 2],
}

impl Pulses {
    /// Busy-wait on the pin, counting loop iterations spent in each state.
    ///
    /// The pin must already have been sent the start signal. A state that lasts
    /// `DHT_MAX_COUNT` iterations is treated as a timeout since normal pulses
    /// take a few hundred iterations at most.
    fn from_data_pin(pin: &dyn DataPin) -> Result<Self, SensorError> {
        let mut counts: [u32; DHT_PULSES * 2] = [0; DHT_PULSES * 2];

        for pair in counts.chunks_exact_mut(2) {
            while pin.is_low() {
                pair[0] += 1;
                if pair[0] >= DHT_MAX_COUNT {
                    return Err(SensorError::KindMsg(
                        SensorErrorKind::ReadTimeout,
                        "timeout waiting for low pulse capture",
                    ));
                }
            }

            while pin.is_high() {
                pair[1] += 1;
                if pair[1] >= DHT_MAX_COUNT {
                    return Err(SensorError::KindMsg(
                        SensorErrorKind::ReadTimeout,
                        "timeout waiting for high pulse capture",
                    ));
                }
            }
        }

        tracing::trace!(message = "captured low/high pulse counts", counts = ?counts);
        Ok(Self { counts })
    }

    /// Low state counts of the 40 data pulses.
    fn low(&self) -> impl ExactSizeIterator<Item = &u32> {
        self.counts.iter().skip(2).step_by(2)
    }

    /// High state counts of the 40 data pulses.
    fn high(&self) -> impl ExactSizeIterator<Item = &u32> {
        self.counts.iter().skip(3).step_by(2)
    }
}

/// Five bytes decoded from pulse counts: two of humidity, two of temperature,
/// and a checksum. Only constructed when the checksum matches.
#[derive(Debug)]
struct Frame {
    bytes: [u8; DATA_SIZE],
}

impl Frame {
    fn from_pulses(pulses: &Pulses) -> Result<Self, SensorError> {
        let mut bytes: [u8; DATA_SIZE] = [0; DATA_SIZE];

        // A bit is one when its high pulse lasts longer than the average low pulse.
        let threshold = pulses.low().sum::<u32>() / pulses.low().len() as u32;

        for (i, &v) in pulses.high().enumerate() {
            let index = i / 8;
            bytes[index] <<= 1;

            if v >= threshold {
                bytes[index] |= 1;
            }
        }

        Self::checksum_bytes(&bytes)?;
        Ok(Frame { bytes })
    }

    fn checksum_bytes(bytes: &[u8; DATA_SIZE]) -> Result<(), SensorError> {
        // Last byte is the low 8 bits of the sum of the first four.
        let expected = bytes[4];
        let computed = bytes[..4].iter().fold(0u8, |acc, &b| acc.wrapping_add(b));

        tracing::debug!(
            message = "computing checksum for sensor data",
            computed = computed,
            expected = expected
        );

        if computed != expected {
            Err(SensorError::CheckSum(expected, computed))
        } else {
            Ok(())
        }
    }
}

impl From<Frame> for (TemperatureCelsius, Humidity) {
    fn from(frame: Frame) -> Self {
        // See https://cdn-shop.adafruit.com/datasheets/Digital+humidity+and+temperature+sensor+AM2302.pdf
        // Both values are tenths of a unit, big-endian. The top bit of the
        // temperature is a sign flag rather than two's complement.
        let humidity_raw = u16::from_be_bytes([frame.bytes[0], frame.bytes[1]]);
        let temp_raw = u16::from_be_bytes([frame.bytes[2] & 0b0111_1111, frame.bytes[3]]);

        let humidity_dec = humidity_raw as f64 / 10.0;
        let mut temp_dec = temp_raw as f64 / 10.0;
        if frame.bytes[2] & 0b1000_0000 > 0 {
            temp_dec = -temp_dec;
        }

        let humidity = Humidity::from(humidity_dec);
        let temperature = TemperatureCelsius::from(temp_dec);

        tracing::debug!(
            message = "parsed sensor data",
            raw_temperature = temp_raw,
            raw_humidity = humidity_raw,
            temperature = %temperature,
            humidity = %humidity
        );

        (temperature, humidity)
    }
}

/// Read temperature in degrees celsius and relative humidity from a DHT22 sensor
pub struct DHT22Sensor {
    pin: Box<dyn DataPin + Send + Sync + 'static>,
}

impl DHT22Sensor {
    pub fn from_pin<T>(pin: T) -> Self
    where
        T: DataPin + Send + Sync + 'static,
    {
        Self { pin: Box::new(pin) }
    }

    fn prepare_for_read(&mut self) {
        // Start signal: high to wake the sensor, low for at least 1ms, then high
        // for 20-40us before releasing the line to the sensor.
        self.pin.set_mode(Mode::Output);
        self.pin.set_high();
        thread::sleep(Duration::from_millis(10));
        self.pin.set_low();
        thread::sleep(Duration::from_millis(20));
        self.pin.set_high();
        thread::sleep(Duration::from_micros(30));
        self.pin.set_mode(Mode::Input);
    }

    /// Read temperature and humidity from the sensor once or return an error if the
    /// read failed with details about what caused the read to fail.
    pub fn read(&mut self) -> Result<(TemperatureCelsius, Humidity), SensorError> {
        self.prepare_for_read();
        let pulses = Pulses::from_data_pin(self.pin.as_ref())?;
        let frame = Frame::from_pulses(&pulses)?;
        Ok(frame.into())
    }

    /// Read the sensor, making up to `retries` more attempts after a failed read
    /// and sleeping `delay` before each of them. The error of the last attempt is
    /// returned if none succeed.
    pub fn read_with_retry(&mut self, retries: u32, delay: Duration) -> Result<RetriedReading, SensorError> {
        let mut retried = 0;

        loop {
            match self.read() {
                Ok((temperature, humidity)) => {
                    return Ok(RetriedReading {
                        temperature,
                        humidity,
                        retried,
                    })
                }
                Err(e) if retried < retries => {
                    retried += 1;
                    tracing::debug!(
                        message = "sensor read failed, retrying",
                        attempt = retried,
                        kind = e.kind().as_label(),
                        error = %e,
                    );
                    thread::sleep(delay);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Debug for DHT22Sensor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DHT22Sensor").field("pin", &self.pin.pin()).finish()
    }
}
