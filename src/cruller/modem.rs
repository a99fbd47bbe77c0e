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
use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::fmt::{self, Formatter};
use std::time::SystemTime;
use zbus::zvariant::{OwnedObjectPath, OwnedValue, Value};
use zbus::{Connection, Proxy};

pub const MODEM_MANAGER: &str = "org.freedesktop.ModemManager1";
pub const MODEM_MANAGER_PATH: &str = "/org/freedesktop/ModemManager1";
pub const MODEM_INTERFACE: &str = "org.freedesktop.ModemManager1.Modem";

const OBJECT_MANAGER_INTERFACE: &str = "org.freedesktop.DBus.ObjectManager";
const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";
const SIGNAL_QUALITY_PROPERTY: &str = "SignalQuality";

/// Object path to interface name to property name to value
pub type ManagedObjects = HashMap<OwnedObjectPath, HashMap<String, HashMap<String, OwnedValue>>>;

/// Error talking to ModemManager over D-Bus
#[derive(Debug)]
pub enum ModemError {
    Bus(&'static str, zbus::Error),
    UnexpectedValue(String, String),
}

impl fmt::Display for ModemError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ModemError::Bus(msg, ref e) => write!(f, "{}: {}", msg, e),
            ModemError::UnexpectedValue(path, value) => {
                write!(f, "unexpected {} value for {}: {}", SIGNAL_QUALITY_PROPERTY, path, value)
            }
        }
    }
}

impl Error for ModemError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ModemError::Bus(_, ref e) => Some(e),
            _ => None,
        }
    }
}

/// Signal quality of a modem as reported by ModemManager
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SignalQuality {
    /// Signal quality from 0 to 100
    pub percent: u32,
    /// Whether the value was taken recently
    pub recent: bool,
}

impl SignalQuality {
    fn from_value(path: &str, value: &Value<'_>) -> Result<Self, ModemError> {
        match value {
            Value::Value(inner) => Self::from_value(path, inner),
            Value::Structure(s) => match s.fields() {
                [Value::U32(percent), Value::Bool(recent)] => Ok(SignalQuality {
                    percent: *percent,
                    recent: *recent,
                }),
                _ => Err(ModemError::UnexpectedValue(path.to_owned(), format!("{:?}", value))),
            },
            _ => Err(ModemError::UnexpectedValue(path.to_owned(), format!("{:?}", value))),
        }
    }

    /// Build a point with a single `signalquality` integer field and a `host` tag
    pub fn into_point(self, measurement: &str, host: &str, time: SystemTime) -> Result<Point, InfluxError> {
        let tags = BTreeMap::from([("host".to_owned(), host.to_owned())]);
        let fields = BTreeMap::from([("signalquality".to_owned(), FieldValue::from(self.percent))]);
        Point::new(measurement, tags, fields, time)
    }
}

/// Paths of managed objects that implement the modem interface, sorted.
pub fn modem_paths(objects: &ManagedObjects) -> Vec<String> {
    let mut paths: Vec<String> = objects
        .iter()
        .filter(|(_, interfaces)| interfaces.contains_key(MODEM_INTERFACE))
        .map(|(path, _)| path.as_str().to_owned())
        .collect();

    paths.sort();
    paths
}

/// Client for the ModemManager service on the system bus
#[derive(Debug, Clone)]
pub struct ModemManager {
    conn: Connection,
}

impl ModemManager {
    /// Connect to the system bus
    pub async fn system() -> Result<Self, ModemError> {
        let conn = Connection::system()
            .await
            .map_err(|e| ModemError::Bus("unable to connect to system bus", e))?;

        Ok(ModemManager { conn })
    }

    /// Return the object paths of all modems known to ModemManager
    pub async fn modems(&self) -> Result<Vec<String>, ModemError> {
        let proxy = Proxy::new(&self.conn, MODEM_MANAGER, MODEM_MANAGER_PATH, OBJECT_MANAGER_INTERFACE)
            .await
            .map_err(|e| ModemError::Bus("unable to create object manager proxy", e))?;

        let objects: ManagedObjects = proxy
            .call("GetManagedObjects", &())
            .await
            .map_err(|e| ModemError::Bus("unable to enumerate managed objects", e))?;

        tracing::debug!(message = "enumerated managed objects", num_objects = objects.len());
        Ok(modem_paths(&objects))
    }

    /// Fetch the current signal quality of the modem at `path`
    pub async fn signal_quality(&self, path: &str) -> Result<SignalQuality, ModemError> {
        let proxy = Proxy::new(&self.conn, MODEM_MANAGER, path, PROPERTIES_INTERFACE)
            .await
            .map_err(|e| ModemError::Bus("unable to create properties proxy", e))?;

        let value: OwnedValue = proxy
            .call("Get", &(MODEM_INTERFACE, SIGNAL_QUALITY_PROPERTY))
            .await
            .map_err(|e| ModemError::Bus("unable to get signal quality property", e))?;

        SignalQuality::from_value(path, &value)
    }
}
