use std::time::Duration;

use eol_hardware::error::HwError;
use eol_hardware::scpi::ScpiClient;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

const TIMEOUT: Duration = Duration::from_secs(2);

async fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

#[tokio::test]
async fn dropped_query_does_not_answer_the_next_one() {
    let (listener, port) = listener().await;
    let (release_tx, release_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut io = BufReader::new(socket);
        let mut line = String::new();
        io.read_line(&mut line).await.unwrap();
        assert_eq!(line.trim(), "MEAS:VOLT?");
        release_rx.await.unwrap();
        io.get_mut().write_all(b"18.000\n").await.unwrap();

        line.clear();
        io.read_line(&mut line).await.unwrap();
        assert_eq!(line.trim(), "MEAS:CURR?");
        io.get_mut().write_all(b"2.500\n").await.unwrap();
    });

    let client = ScpiClient::connect("power_supply", "127.0.0.1", port, TIMEOUT)
        .await
        .unwrap();
    let dropped =
        tokio::time::timeout(Duration::from_millis(50), client.query("MEAS:VOLT?")).await;
    assert!(dropped.is_err(), "query should still be waiting");

    release_tx.send(()).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(client.query("MEAS:CURR?").await.unwrap(), "2.500");
    server.await.unwrap();
}

#[tokio::test]
async fn answered_queries_are_read_in_order() {
    let (listener, port) = listener().await;
    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut io = BufReader::new(socket);
        for answer in ["ODA,OPE-3010,1.0\n", "12.0,1.5\n"] {
            let mut line = String::new();
            io.read_line(&mut line).await.unwrap();
            io.get_mut().write_all(answer.as_bytes()).await.unwrap();
        }
    });

    let client = ScpiClient::connect("power_supply", "127.0.0.1", port, TIMEOUT)
        .await
        .unwrap();
    assert_eq!(client.query("*IDN?").await.unwrap(), "ODA,OPE-3010,1.0");
    assert_eq!(client.query_numbers("MEAS:ALL?").await.unwrap(), vec![12.0, 1.5]);
    server.await.unwrap();
}

#[tokio::test]
async fn closed_peer_is_reported() {
    let (listener, port) = listener().await;
    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut io = BufReader::new(socket);
        let mut line = String::new();
        io.read_line(&mut line).await.unwrap();
    });

    let client = ScpiClient::connect("power_supply", "127.0.0.1", port, TIMEOUT)
        .await
        .unwrap();
    let err = client.query("*IDN?").await.unwrap_err();
    server.await.unwrap();
    match err {
        HwError::Closed => {}
        other => panic!("expected Closed, got {other:?}"),
    }
}
