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

//! Points, batches, and an HTTP client for the InfluxDB 1.x `/write` API.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::Args;
use hyper::client::HttpConnector;
use hyper::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use hyper::{Body, Client, Method, Request, StatusCode, Uri};
use hyper_tls::HttpsConnector;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{self, Formatter, Write};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const DEFAULT_SERVER: &str = "http://localhost:8086";
pub const DEFAULT_USER: &str = "admin";
pub const DEFAULT_PASS: &str = "admin";

const LINE_PROTOCOL_FORMAT: &str = "text/plain; charset=utf-8";

/// Potential kinds of errors that can be encountered building or writing points
#[derive(PartialEq, Eq, Debug, Hash, Clone, Copy)]
pub enum InfluxErrorKind {
    Configuration,
    InvalidPoint,
    Transport,
    Response,
}

/// Error building points or writing them to InfluxDB
#[derive(Debug)]
pub enum InfluxError {
    Response(StatusCode, String),
    KindMsg(InfluxErrorKind, &'static str),
    KindMsgCause(InfluxErrorKind, &'static str, Box<dyn Error + Send + Sync>),
}

impl InfluxError {
    pub fn kind(&self) -> InfluxErrorKind {
        match self {
            InfluxError::Response(_, _) => InfluxErrorKind::Response,
            InfluxError::KindMsg(kind, _) => *kind,
            InfluxError::KindMsgCause(kind, _, _) => *kind,
        }
    }
}

impl fmt::Display for InfluxError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            InfluxError::Response(status, msg) if msg.is_empty() => write!(f, "write failed with status {}", status),
            InfluxError::Response(status, msg) => write!(f, "write failed with status {}: {}", status, msg),
            InfluxError::KindMsg(_, msg) => msg.fmt(f),
            InfluxError::KindMsgCause(_, msg, ref e) => write!(f, "{}: {}", msg, e),
        }
    }
}

impl Error for InfluxError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            InfluxError::KindMsgCause(_, _, ref e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

/// Value of a single field of a point
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    Boolean(bool),
    String(String),
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::Integer(v as i64)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Boolean(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            // Rust prints the shortest representation that round trips and never
            // uses exponents, both of which the line protocol accepts as a float.
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Integer(v) => write!(f, "{}i", v),
            FieldValue::Boolean(v) => write!(f, "{}", v),
            FieldValue::String(v) => {
                f.write_char('"')?;
                for c in v.chars() {
                    if c == '"' || c == '\\' {
                        f.write_char('\\')?;
                    }
                    f.write_char(c)?;
                }
                f.write_char('"')
            }
        }
    }
}

/// Precision of point timestamps in a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Precision {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    #[default]
    Seconds,
    Minutes,
    Hours,
}

impl Precision {
    /// Value of the `precision` query parameter
    pub fn as_param(&self) -> &'static str {
        match self {
            Precision::Nanoseconds => "n",
            Precision::Microseconds => "u",
            Precision::Milliseconds => "ms",
            Precision::Seconds => "s",
            Precision::Minutes => "m",
            Precision::Hours => "h",
        }
    }

    /// Truncate a time since the UNIX epoch to this precision
    pub fn timestamp(&self, since_epoch: Duration) -> u128 {
        match self {
            Precision::Nanoseconds => since_epoch.as_nanos(),
            Precision::Microseconds => since_epoch.as_micros(),
            Precision::Milliseconds => since_epoch.as_millis(),
            Precision::Seconds => since_epoch.as_secs() as u128,
            Precision::Minutes => (since_epoch.as_secs() / 60) as u128,
            Precision::Hours => (since_epoch.as_secs() / 3600) as u128,
        }
    }
}

/// A single measurement with its tags, fields, and timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    measurement: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
    since_epoch: Duration,
}

impl Point {
    /// Create a new point, returning an error if the measurement name is empty,
    /// there are no fields, a float field isn't finite, or the timestamp is before
    /// the UNIX epoch.
    pub fn new<M>(
        measurement: M,
        tags: BTreeMap<String, String>,
        fields: BTreeMap<String, FieldValue>,
        time: SystemTime,
    ) -> Result<Self, InfluxError>
    where
        M: Into<String>,
    {
        let measurement = measurement.into();
        if measurement.is_empty() {
            return Err(InfluxError::KindMsg(
                InfluxErrorKind::InvalidPoint,
                "measurement name must not be empty",
            ));
        }

        let mut names = tags
            .iter()
            .flat_map(|(k, v)| [k.as_str(), v.as_str()])
            .chain(fields.keys().map(String::as_str))
            .chain(std::iter::once(measurement.as_str()));

        if names.any(|n| !is_encodable(n)) {
            return Err(InfluxError::KindMsg(
                InfluxErrorKind::InvalidPoint,
                "names and tag values must not contain line breaks or end with a backslash",
            ));
        }
        drop(names);

        if fields.is_empty() {
            return Err(InfluxError::KindMsg(
                InfluxErrorKind::InvalidPoint,
                "point must have at least one field",
            ));
        }

        if fields.values().any(|v| matches!(v, FieldValue::Float(f) if !f.is_finite())) {
            return Err(InfluxError::KindMsg(
                InfluxErrorKind::InvalidPoint,
                "float fields must be finite",
            ));
        }

        let since_epoch = time.duration_since(UNIX_EPOCH).map_err(|e| {
            InfluxError::KindMsgCause(
                InfluxErrorKind::InvalidPoint,
                "point time is before the UNIX epoch",
                Box::new(e),
            )
        })?;

        Ok(Point {
            measurement,
            tags,
            fields,
            since_epoch,
        })
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    /// Encode this point as a single line of the line protocol, tags and fields
    /// sorted by key. Tags with empty values are left out since InfluxDB rejects
    /// them.
    pub fn to_line(&self, precision: Precision) -> String {
        let mut line = String::new();
        escape_into(&mut line, &self.measurement, &[',', ' ']);

        for (k, v) in self.tags.iter().filter(|(_, v)| !v.is_empty()) {
            line.push(',');
            escape_into(&mut line, k, &[',', '=', ' ']);
            line.push('=');
            escape_into(&mut line, v, &[',', '=', ' ']);
        }

        for (i, (k, v)) in self.fields.iter().enumerate() {
            line.push(if i == 0 { ' ' } else { ',' });
            escape_into(&mut line, k, &[',', '=', ' ']);
            // Writing to a String can't fail
            let _ = write!(line, "={}", v);
        }

        let _ = write!(line, " {}", precision.timestamp(self.since_epoch));
        line
    }
}

/// Line breaks and a trailing backslash have no escaped form outside of string
/// field values.
fn is_encodable(s: &str) -> bool {
    !s.contains(['\n', '\r']) && !s.ends_with('\\')
}

fn escape_into(out: &mut String, s: &str, special: &[char]) {
    for c in s.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}

/// Points to be written to a database in a single request
#[derive(Debug, Clone, PartialEq)]
pub struct BatchPoints {
    database: String,
    retention_policy: Option<String>,
    precision: Precision,
    points: Vec<Point>,
}

impl BatchPoints {
    pub fn new<D>(database: D, precision: Precision) -> Result<Self, InfluxError>
    where
        D: Into<String>,
    {
        let database = database.into();
        if database.is_empty() {
            return Err(InfluxError::KindMsg(
                InfluxErrorKind::Configuration,
                "database name must not be empty",
            ));
        }

        Ok(BatchPoints {
            database,
            retention_policy: None,
            precision,
            points: Vec::new(),
        })
    }

    pub fn with_retention_policy<R>(mut self, rp: R) -> Self
    where
        R: Into<String>,
    {
        self.retention_policy = Some(rp.into());
        self
    }

    pub fn add_point(&mut self, point: Point) {
        self.points.push(point);
    }

    /// Encode all points in the line protocol, one per line
    pub fn to_line_protocol(&self) -> String {
        self.points
            .iter()
            .map(|p| p.to_line(self.precision))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// InfluxDB connection flags shared by every collector
#[derive(Debug, Clone, Args)]
pub struct InfluxOptions {
    /// InfluxDB server address, including the scheme
    #[arg(long, default_value = DEFAULT_SERVER)]
    pub db_server: String,

    /// InfluxDB username. Authentication is disabled when this is empty
    #[arg(long, default_value = DEFAULT_USER)]
    pub db_user: String,

    /// InfluxDB password
    #[arg(long, default_value = DEFAULT_PASS)]
    pub db_pass: String,

    /// Retention policy to write to instead of the default policy of the database
    #[arg(long)]
    pub db_retention_policy: Option<String>,
}

/// Address and credentials of an InfluxDB server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfluxConfig {
    pub addr: String,
    pub username: String,
    pub password: String,
    pub retention_policy: Option<String>,
}

impl From<&InfluxOptions> for InfluxConfig {
    fn from(opts: &InfluxOptions) -> Self {
        InfluxConfig {
            addr: opts.db_server.clone(),
            username: opts.db_user.clone(),
            password: opts.db_pass.clone(),
            retention_policy: opts.db_retention_policy.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

/// HTTP client for writing batches of points to InfluxDB.
///
/// Cloning is cheap and clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct InfluxClient {
    client: Client<HttpsConnector<HttpConnector>>,
    addr: String,
    authorization: Option<HeaderValue>,
    retention_policy: Option<String>,
}

impl InfluxClient {
    /// Create a new client, returning an error if the server address isn't an
    /// `http` or `https` URL or TLS support can't be initialized. No connection is
    /// made until the first write.
    pub fn new(config: InfluxConfig) -> Result<Self, InfluxError> {
        let uri: Uri = config.addr.parse().map_err(|e| {
            InfluxError::KindMsgCause(InfluxErrorKind::Configuration, "invalid server address", Box::new(e))
        })?;

        if !matches!(uri.scheme_str(), Some("http") | Some("https")) || uri.host().is_none() {
            return Err(InfluxError::KindMsg(
                InfluxErrorKind::Configuration,
                "server address must be an http or https URL with a host",
            ));
        }

        let authorization = if config.username.is_empty() {
            None
        } else {
            Some(basic_auth(&config.username, &config.password)?)
        };

        let tls = native_tls::TlsConnector::new().map_err(|e| {
            InfluxError::KindMsgCause(InfluxErrorKind::Configuration, "unable to initialize TLS", Box::new(e))
        })?;

        let mut http = HttpConnector::new();
        http.enforce_http(false);
        let client = Client::builder().build::<_, Body>(HttpsConnector::from((http, tls.into())));

        Ok(InfluxClient {
            client,
            addr: config.addr.trim_end_matches('/').to_owned(),
            authorization,
            retention_policy: config.retention_policy,
        })
    }

    fn write_uri(&self, batch: &BatchPoints) -> Result<Uri, InfluxError> {
        let mut uri = format!(
            "{}/write?db={}&precision={}",
            self.addr,
            encode_query_value(&batch.database),
            batch.precision.as_param()
        );

        if let Some(rp) = &batch.retention_policy {
            uri.push_str("&rp=");
            uri.push_str(&encode_query_value(rp));
        }

        uri.parse().map_err(|e| {
            InfluxError::KindMsgCause(InfluxErrorKind::Configuration, "invalid write URL", Box::new(e))
        })
    }

    /// Write all points in the batch with a single request. Any response other
    /// than a success is returned as an error including the message from the
    /// server, if any.
    pub async fn write(&self, batch: &BatchPoints) -> Result<(), InfluxError> {
        if batch.points.is_empty() {
            tracing::debug!(message = "skipping write of empty batch", database = %batch.database);
            return Ok(());
        }

        let uri = self.write_uri(batch)?;
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(CONTENT_TYPE, LINE_PROTOCOL_FORMAT);

        if let Some(auth) = &self.authorization {
            builder = builder.header(AUTHORIZATION, auth.clone());
        }

        let req = builder.body(Body::from(batch.to_line_protocol())).map_err(|e| {
            InfluxError::KindMsgCause(InfluxErrorKind::Configuration, "unable to build write request", Box::new(e))
        })?;

        let res = self.client.request(req).await.map_err(|e| {
            InfluxError::KindMsgCause(InfluxErrorKind::Transport, "unable to send write request", Box::new(e))
        })?;

        let status = res.status();
        if status.is_success() {
            tracing::debug!(
                message = "wrote points",
                database = %batch.database,
                num_points = batch.points.len(),
                status = %status,
            );
            return Ok(());
        }

        let body = hyper::body::to_bytes(res.into_body()).await.map_err(|e| {
            InfluxError::KindMsgCause(InfluxErrorKind::Transport, "unable to read write response", Box::new(e))
        })?;

        Err(InfluxError::Response(status, error_message(&body)))
    }

    /// Write a single point as a batch of one, with second precision, to the
    /// configured retention policy if any.
    pub async fn write_point(&self, database: &str, point: Point) -> Result<(), InfluxError> {
        let mut batch = BatchPoints::new(database, Precision::Seconds)?;
        if let Some(rp) = &self.retention_policy {
            batch = batch.with_retention_policy(rp.as_str());
        }

        batch.add_point(point);
        self.write(&batch).await
    }
}

fn basic_auth(username: &str, password: &str) -> Result<HeaderValue, InfluxError> {
    let encoded = STANDARD.encode(format!("{}:{}", username, password));
    let mut value = HeaderValue::from_str(&format!("Basic {}", encoded)).map_err(|e| {
        InfluxError::KindMsgCause(InfluxErrorKind::Configuration, "invalid credentials", Box::new(e))
    })?;

    value.set_sensitive(true);
    Ok(value)
}

/// Extract the message from a JSON error response, falling back to the raw body.
fn error_message(body: &[u8]) -> String {
    serde_json::from_slice::<ErrorResponse>(body)
        .map(|r| r.error)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).trim().to_owned())
}

/// Percent-encode everything except unreserved characters (RFC 3986)
fn encode_query_value(v: &str) -> String {
    let mut out = String::with_capacity(v.len());
    for b in v.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => {
                let _ = write!(out, "%{:02X}", b);
            }
        }
    }

    out
}

#[cfg(test)]
mod test {
    use super::{
        basic_auth, encode_query_value, error_message, BatchPoints, FieldValue, InfluxClient, InfluxConfig,
        InfluxErrorKind, Point, Precision,
    };
    use std::collections::BTreeMap;
    use std::time::{Duration, UNIX_EPOCH};

    fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn fields(pairs: &[(&str, FieldValue)]) -> BTreeMap<String, FieldValue> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn config(addr: &str, username: &str) -> InfluxConfig {
        InfluxConfig {
            addr: addr.to_owned(),
            username: username.to_owned(),
            password: "admin".to_owned(),
            retention_policy: None,
        }
    }

    #[test]
    fn test_point_to_line_sorted() {
        let point = Point::new(
            "bme280",
            tags(&[("host", "localhost")]),
            fields(&[
                ("temperature", FieldValue::Float(21.5)),
                ("presure", FieldValue::Float(1006.25)),
                ("humidity", FieldValue::Float(40.0)),
            ]),
            UNIX_EPOCH + Duration::from_millis(1_650_000_000_750),
        )
        .unwrap();

        assert_eq!(
            "bme280,host=localhost humidity=40,presure=1006.25,temperature=21.5 1650000000",
            point.to_line(Precision::Seconds)
        );
    }

    #[test]
    fn test_point_to_line_value_types() {
        let point = Point::new(
            "E3276",
            BTreeMap::new(),
            fields(&[
                ("signalquality", FieldValue::from(73u32)),
                ("recent", FieldValue::from(true)),
                ("name", FieldValue::from("say \"hi\" \\o/")),
            ]),
            UNIX_EPOCH + Duration::from_secs(10),
        )
        .unwrap();

        assert_eq!(
            r#"E3276 name="say \"hi\" \\o/",recent=true,signalquality=73i 10"#,
            point.to_line(Precision::Seconds)
        );
    }

    #[test]
    fn test_point_to_line_escaping() {
        let point = Point::new(
            "living room,east",
            tags(&[("client", "a=b c,d"), ("empty", "")]),
            fields(&[("temp c", FieldValue::Float(-3.5))]),
            UNIX_EPOCH + Duration::from_secs(1),
        )
        .unwrap();

        assert_eq!(
            r"living\ room\,east,client=a\=b\ c\,d temp\ c=-3.5 1000",
            point.to_line(Precision::Milliseconds)
        );
    }

    #[test]
    fn test_point_new_empty_measurement() {
        let res = Point::new("", BTreeMap::new(), fields(&[("v", FieldValue::Integer(1))]), UNIX_EPOCH);
        assert_eq!(InfluxErrorKind::InvalidPoint, res.unwrap_err().kind());
    }

    #[test]
    fn test_point_new_line_break() {
        for value in ["kitchen\nevil,host=x value=666 0", "kitchen\r"] {
            let res = Point::new(
                "sht30",
                tags(&[("client", value)]),
                fields(&[("temperature", FieldValue::Float(1.0))]),
                UNIX_EPOCH,
            );
            assert_eq!(InfluxErrorKind::InvalidPoint, res.unwrap_err().kind(), "value: {:?}", value);
        }

        let res = Point::new(
            "sht30",
            BTreeMap::new(),
            fields(&[("temp\nerature", FieldValue::Float(1.0))]),
            UNIX_EPOCH,
        );
        assert_eq!(InfluxErrorKind::InvalidPoint, res.unwrap_err().kind());
    }

    #[test]
    fn test_point_new_trailing_backslash() {
        let res = Point::new(
            "sht30",
            tags(&[("client", "kitchen\\")]),
            fields(&[("temperature", FieldValue::Float(1.0))]),
            UNIX_EPOCH,
        );
        assert_eq!(InfluxErrorKind::InvalidPoint, res.unwrap_err().kind());
    }

    #[test]
    fn test_point_new_backslash_in_string_field() {
        let point = Point::new(
            "sht30",
            tags(&[("client", r"a\b")]),
            fields(&[("note", FieldValue::from("ends with \\"))]),
            UNIX_EPOCH,
        )
        .unwrap();

        assert_eq!(r#"sht30,client=a\b note="ends with \\" 0"#, point.to_line(Precision::Seconds));
    }

    #[test]
    fn test_point_new_no_fields() {
        let res = Point::new("dht22", BTreeMap::new(), BTreeMap::new(), UNIX_EPOCH);
        assert_eq!(InfluxErrorKind::InvalidPoint, res.unwrap_err().kind());
    }

    #[test]
    fn test_point_new_not_finite() {
        let res = Point::new(
            "dht22",
            BTreeMap::new(),
            fields(&[("temperature", FieldValue::Float(f64::NAN))]),
            UNIX_EPOCH,
        );
        assert_eq!(InfluxErrorKind::InvalidPoint, res.unwrap_err().kind());
    }

    #[test]
    fn test_point_new_before_epoch() {
        let res = Point::new(
            "dht22",
            BTreeMap::new(),
            fields(&[("temperature", FieldValue::Float(1.0))]),
            UNIX_EPOCH - Duration::from_secs(1),
        );
        assert_eq!(InfluxErrorKind::InvalidPoint, res.unwrap_err().kind());
    }

    #[test]
    fn test_precision_timestamp() {
        let t = Duration::new(7_200, 123_456_789);

        assert_eq!(7_200_123_456_789, Precision::Nanoseconds.timestamp(t));
        assert_eq!(7_200_123_456, Precision::Microseconds.timestamp(t));
        assert_eq!(7_200_123, Precision::Milliseconds.timestamp(t));
        assert_eq!(7_200, Precision::Seconds.timestamp(t));
        assert_eq!(120, Precision::Minutes.timestamp(t));
        assert_eq!(2, Precision::Hours.timestamp(t));
    }

    #[test]
    fn test_batch_to_line_protocol() {
        let mut batch = BatchPoints::new("temperature", Precision::Seconds).unwrap();
        for (client, temp) in [("kitchen", 20.5), ("attic", 31.0)] {
            batch.add_point(
                Point::new(
                    "sht30",
                    tags(&[("client", client)]),
                    fields(&[("temperature", FieldValue::Float(temp))]),
                    UNIX_EPOCH + Duration::from_secs(100),
                )
                .unwrap(),
            );
        }

        assert_eq!(
            "sht30,client=kitchen temperature=20.5 100\nsht30,client=attic temperature=31 100",
            batch.to_line_protocol()
        );
    }

    #[test]
    fn test_batch_empty_database() {
        let res = BatchPoints::new("", Precision::Seconds);
        assert_eq!(InfluxErrorKind::Configuration, res.unwrap_err().kind());
    }

    #[test]
    fn test_client_invalid_addresses() {
        for addr in ["localhost:8086", "ftp://localhost", "not a url", "http://"] {
            let res = InfluxClient::new(config(addr, "admin"));
            assert_eq!(InfluxErrorKind::Configuration, res.unwrap_err().kind(), "address: {}", addr);
        }
    }

    #[test]
    fn test_client_write_uri() {
        let client = InfluxClient::new(config("http://localhost:8086/", "admin")).unwrap();
        let batch = BatchPoints::new("modem stats", Precision::Seconds)
            .unwrap()
            .with_retention_policy("one&two");

        let uri = client.write_uri(&batch).unwrap();
        assert_eq!(
            "http://localhost:8086/write?db=modem%20stats&precision=s&rp=one%26two",
            uri.to_string()
        );
    }

    #[test]
    fn test_client_no_credentials() {
        let client = InfluxClient::new(config("https://influx.example.com", "")).unwrap();
        assert!(client.authorization.is_none());
    }

    #[test]
    fn test_basic_auth() {
        let value = basic_auth("admin", "admin").unwrap();

        assert_eq!("Basic YWRtaW46YWRtaW4=", value.to_str().unwrap());
        assert!(value.is_sensitive());
    }

    #[test]
    fn test_error_message() {
        assert_eq!(
            "database not found: \"temperature\"",
            error_message(br#"{"error":"database not found: \"temperature\""}"#)
        );
        assert_eq!("bad gateway", error_message(b"bad gateway\n"));
        assert_eq!("", error_message(b""));
    }

    #[test]
    fn test_encode_query_value() {
        assert_eq!("temperature", encode_query_value("temperature"));
        assert_eq!("a%2Fb%3Dc%C3%A9", encode_query_value("a/b=cé"));
    }
}
