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

use cruller::influx::{
    BatchPoints, FieldValue, InfluxClient, InfluxConfig, InfluxError, InfluxErrorKind, Point, Precision,
};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, UNIX_EPOCH};

#[derive(Debug, Clone)]
struct RecordedRequest {
    method: String,
    path_and_query: String,
    authorization: Option<String>,
    content_type: Option<String>,
    body: String,
}

/// Start an HTTP server on a random local port that records every request and
/// replies with the given status and body.
async fn start_server(status: StatusCode, response: &'static str) -> (SocketAddr, Arc<Mutex<Vec<RecordedRequest>>>) {
    let recorded = Arc::new(Mutex::new(Vec::new()));
    let captured = recorded.clone();

    let make_svc = make_service_fn(move |_| {
        let captured = captured.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let captured = captured.clone();
                async move {
                    let (parts, body) = req.into_parts();
                    let body = hyper::body::to_bytes(body).await.unwrap();
                    let header = |name| parts.headers.get(name).map(|v| v.to_str().unwrap().to_owned());

                    captured.lock().unwrap().push(RecordedRequest {
                        method: parts.method.to_string(),
                        path_and_query: parts.uri.path_and_query().unwrap().to_string(),
                        authorization: header(hyper::header::AUTHORIZATION),
                        content_type: header(hyper::header::CONTENT_TYPE),
                        body: String::from_utf8(body.to_vec()).unwrap(),
                    });

                    Ok::<_, Infallible>(Response::builder().status(status).body(Body::from(response)).unwrap())
                }
            }))
        }
    });

    let server = Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0))).serve(make_svc);
    let addr = server.local_addr();
    tokio::spawn(server);
    (addr, recorded)
}

fn client_with_policy(addr: SocketAddr, username: &str, retention_policy: Option<&str>) -> InfluxClient {
    InfluxClient::new(InfluxConfig {
        addr: format!("http://{}", addr),
        username: username.to_owned(),
        password: "admin".to_owned(),
        retention_policy: retention_policy.map(str::to_owned),
    })
    .unwrap()
}

fn client(addr: SocketAddr, username: &str) -> InfluxClient {
    client_with_policy(addr, username, None)
}

fn dht22_point() -> Point {
    let tags = BTreeMap::from([("host".to_owned(), "localhost".to_owned())]);
    let fields = BTreeMap::from([
        ("temperature".to_owned(), FieldValue::Float(35.1)),
        ("humidity".to_owned(), FieldValue::Float(65.2)),
    ]);

    Point::new("dht22", tags, fields, UNIX_EPOCH + Duration::from_secs(1_650_000_000)).unwrap()
}

#[tokio::test]
async fn test_write_point() {
    let (addr, recorded) = start_server(StatusCode::NO_CONTENT, "").await;

    client(addr, "admin").write_point("temperature", dht22_point()).await.unwrap();

    let requests = recorded.lock().unwrap().clone();
    assert_eq!(1, requests.len());

    let req = &requests[0];
    assert_eq!("POST", req.method);
    assert_eq!("/write?db=temperature&precision=s", req.path_and_query);
    assert_eq!(Some("Basic YWRtaW46YWRtaW4="), req.authorization.as_deref());
    assert_eq!(Some("text/plain; charset=utf-8"), req.content_type.as_deref());
    assert_eq!("dht22,host=localhost humidity=65.2,temperature=35.1 1650000000", req.body);
}

#[tokio::test]
async fn test_write_point_retention_policy() {
    let (addr, recorded) = start_server(StatusCode::NO_CONTENT, "").await;

    client_with_policy(addr, "admin", Some("four weeks"))
        .write_point("modem", dht22_point())
        .await
        .unwrap();

    let requests = recorded.lock().unwrap().clone();
    assert_eq!("/write?db=modem&precision=s&rp=four%20weeks", requests[0].path_and_query);
}

#[tokio::test]
async fn test_write_without_credentials() {
    let (addr, recorded) = start_server(StatusCode::NO_CONTENT, "").await;

    client(addr, "").write_point("temperature", dht22_point()).await.unwrap();

    let requests = recorded.lock().unwrap().clone();
    assert_eq!(None, requests[0].authorization);
}

#[tokio::test]
async fn test_write_empty_batch_skipped() {
    let (addr, recorded) = start_server(StatusCode::NO_CONTENT, "").await;
    let batch = BatchPoints::new("temperature", Precision::Seconds).unwrap();

    client(addr, "admin").write(&batch).await.unwrap();

    assert!(recorded.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_write_error_response() {
    let (addr, _) = start_server(StatusCode::NOT_FOUND, r#"{"error":"database not found: \"modem\""}"#).await;

    let err = client(addr, "admin").write_point("modem", dht22_point()).await.unwrap_err();

    assert_eq!(InfluxErrorKind::Response, err.kind());
    match err {
        InfluxError::Response(status, msg) => {
            assert_eq!(StatusCode::NOT_FOUND, status);
            assert_eq!("database not found: \"modem\"", msg);
        }
        e => panic!("unexpected error: {}", e),
    }
}

#[tokio::test]
async fn test_write_connection_refused() {
    let client = InfluxClient::new(InfluxConfig {
        addr: "http://127.0.0.1:1".to_owned(),
        username: "admin".to_owned(),
        password: "admin".to_owned(),
        retention_policy: None,
    })
    .unwrap();

    let err = client.write_point("temperature", dht22_point()).await.unwrap_err();
    assert_eq!(InfluxErrorKind::Transport, err.kind());
}
