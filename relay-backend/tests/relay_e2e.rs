//! End-to-end: real UDP socket in, real WebSocket clients out, real HTTP status.

use std::time::Duration;

use futures::StreamExt;
use relay_backend::{Relay, RelayAddrs, RelayConfig, RelayError, ServerRole};
use telemetry_types::{PacketBuilder, DASH_PACKET_SIZE, DASH_SCHEMA};
use tokio::net::{TcpStream, UdpSocket};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(2);

fn ephemeral() -> RelayConfig {
    RelayConfig {
        host: "127.0.0.1".into(),
        udp_port: 0,
        ws_port: 0,
        http_port: 0,
    }
}

async fn start() -> (RelayAddrs, CancellationToken, JoinHandle<Result<(), RelayError>>) {
    let relay = Relay::bind(&ephemeral()).await.expect("bind relay");
    let addrs = relay.addrs();
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(relay.run(shutdown.clone()));
    (addrs, shutdown, task)
}

async fn subscribe(addrs: &RelayAddrs) -> Client {
    let (ws, _) = connect_async(format!("ws://{}/", addrs.ws)).await.expect("ws connect");
    ws
}

async fn wait_for_clients(addrs: &RelayAddrs, n: u64) {
    for _ in 0..100 {
        if status(addrs).await["clientsConnected"] == n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("never saw {n} connected clients");
}

async fn status(addrs: &RelayAddrs) -> serde_json::Value {
    reqwest::get(format!("http://{}/status", addrs.http))
        .await
        .expect("GET /status")
        .json()
        .await
        .expect("status json")
}

fn packet(rpm: f64) -> Vec<u8> {
    PacketBuilder::new(&DASH_SCHEMA)
        .set("currentEngineRpm", rpm)
        .unwrap()
        .set("speed", 40.0)
        .unwrap()
        .build()
        .to_vec()
}

async fn next_json(ws: &mut Client) -> serde_json::Value {
    loop {
        let msg = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for a record")
            .expect("stream ended")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn assert_silent(ws: &mut Client) {
    let got = tokio::time::timeout(Duration::from_millis(150), ws.next()).await;
    assert!(got.is_err(), "expected no message, got {got:?}");
}

#[tokio::test]
async fn relays_a_decoded_packet_to_a_subscriber() {
    let (addrs, shutdown, task) = start().await;
    let mut ws = subscribe(&addrs).await;
    wait_for_clients(&addrs, 1).await;

    let udp = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    udp.send_to(&packet(6500.0), addrs.udp).await.unwrap();

    let rec = next_json(&mut ws).await;
    assert!((rec["currentEngineRpm"].as_f64().unwrap() - 6500.0).abs() < 1e-3);
    assert!((rec["speedKmh"].as_f64().unwrap() - 144.0).abs() < 1e-3);
    assert_eq!(rec["packetCount"], 1);
    assert!(rec["timestamp"].as_u64().unwrap() > 0);

    // A 10-byte datagram produces neither a message nor a count.
    udp.send_to(&[0u8; 10], addrs.udp).await.unwrap();
    assert_silent(&mut ws).await;
    assert_eq!(status(&addrs).await["packetsReceived"], 1);

    shutdown.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn status_counts_only_valid_packets() {
    let (addrs, shutdown, task) = start().await;

    let before = status(&addrs).await;
    assert_eq!(before["packetsReceived"], 0);
    assert!(before["lastPacketTime"].is_null());
    assert_eq!(before["hasTelemetry"], false);

    let udp = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let (k, j) = (5u64, 4);
    for i in 0..k {
        udp.send_to(&packet(1000.0 + i as f64), addrs.udp).await.unwrap();
        if i < j {
            udp.send_to(&[0u8; DASH_PACKET_SIZE / 2], addrs.udp).await.unwrap();
        }
    }

    let mut after = status(&addrs).await;
    for _ in 0..100 {
        if after["packetsReceived"] == k {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        after = status(&addrs).await;
    }
    assert_eq!(after["packetsReceived"], k);
    assert_eq!(after["hasTelemetry"], true);
    assert!(after["lastPacketTime"].as_u64().is_some());

    shutdown.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn late_joiner_gets_the_last_record_without_waiting() {
    let (addrs, shutdown, task) = start().await;
    let mut early = subscribe(&addrs).await;
    wait_for_clients(&addrs, 1).await;

    let udp = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    udp.send_to(&packet(4200.0), addrs.udp).await.unwrap();
    assert_eq!(next_json(&mut early).await["packetCount"], 1);

    let mut late = subscribe(&addrs).await;
    let rec = next_json(&mut late).await;
    assert_eq!(rec["packetCount"], 1);
    assert!((rec["currentEngineRpm"].as_f64().unwrap() - 4200.0).abs() < 1e-3);

    shutdown.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn subscribers_receive_identical_payloads_in_order() {
    let (addrs, shutdown, task) = start().await;
    let mut a = subscribe(&addrs).await;
    let mut b = subscribe(&addrs).await;
    wait_for_clients(&addrs, 2).await;

    let udp = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    for i in 0..10 {
        udp.send_to(&packet(i as f64 * 100.0), addrs.udp).await.unwrap();
    }

    for expected in 1..=10u64 {
        let ra = next_json(&mut a).await;
        let rb = next_json(&mut b).await;
        assert_eq!(ra["packetCount"], expected);
        assert_eq!(ra, rb);
    }

    shutdown.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn dropping_one_subscriber_does_not_affect_the_others() {
    let (addrs, shutdown, task) = start().await;
    let mut keeper = subscribe(&addrs).await;
    let mut quitter = subscribe(&addrs).await;
    wait_for_clients(&addrs, 2).await;

    let udp = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    udp.send_to(&packet(1.0), addrs.udp).await.unwrap();
    next_json(&mut keeper).await;
    next_json(&mut quitter).await;

    // Abrupt: no close handshake.
    drop(quitter);

    for i in 2..=4u64 {
        udp.send_to(&packet(i as f64), addrs.udp).await.unwrap();
        assert_eq!(next_json(&mut keeper).await["packetCount"], i);
    }
    wait_for_clients(&addrs, 1).await;

    shutdown.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn shutdown_closes_subscribers() {
    let (addrs, shutdown, task) = start().await;
    let mut ws = subscribe(&addrs).await;
    wait_for_clients(&addrs, 1).await;

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap().unwrap();

    // Either a close frame or the stream simply ending.
    let end = tokio::time::timeout(WAIT, async {
        while let Some(msg) = ws.next().await {
            if matches!(msg, Ok(Message::Close(_)) | Err(_)) {
                break;
            }
        }
    })
    .await;
    assert!(end.is_ok());
}

#[tokio::test]
async fn bind_conflict_is_reported_with_the_address() {
    let (addrs, shutdown, task) = start().await;

    let clash = RelayConfig {
        udp_port: addrs.udp.port(),
        ..ephemeral()
    };
    let err = match Relay::bind(&clash).await {
        Ok(_) => panic!("second bind on the same UDP port succeeded"),
        Err(e) => e,
    };
    assert!(matches!(err, RelayError::Bind { role: ServerRole::Udp, .. }));
    assert!(err.to_string().contains(&addrs.udp.port().to_string()));

    shutdown.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn live_page_is_served() {
    let (addrs, shutdown, task) = start().await;
    let body = reqwest::get(format!("http://{}/", addrs.http))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("WebSocket"));
    assert!(body.contains(&format!(":{}/", addrs.ws.port())));

    shutdown.cancel();
    task.await.unwrap().unwrap();
}
