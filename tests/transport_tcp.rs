// tests/transport_tcp.rs

use std::error::Error;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

use taskrunner::config::TransportSettings;
use taskrunner::engine::RuntimeEvent;
use taskrunner::protocol::{OutboundMessage, TaskRegister};
use taskrunner::transport::tcp::OUTBOUND_QUEUE;
use taskrunner::transport::{TcpTransport, Transport};
use taskrunner_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

fn settings(router: String, reconnect_delay: Duration) -> TransportSettings {
    TransportSettings {
        router,
        reconnect_delay,
    }
}

async fn router() -> Result<(TcpListener, String), Box<dyn Error>> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?.to_string();
    Ok((listener, addr))
}

async fn accept(listener: &TcpListener) -> Result<TcpStream, Box<dyn Error>> {
    let (stream, _) = timeout(Duration::from_secs(3), listener.accept()).await??;
    Ok(stream)
}

async fn next_inbound(
    rx: &mut mpsc::Receiver<RuntimeEvent>,
) -> Result<(Value, Vec<u8>), Box<dyn Error>> {
    match timeout(Duration::from_secs(3), rx.recv()).await? {
        Some(RuntimeEvent::Inbound(envelope)) => {
            Ok((serde_json::from_slice(&envelope.payload)?, envelope.signature))
        }
        other => Err(format!("expected inbound envelope, got {:?}", other).into()),
    }
}

#[tokio::test]
async fn inbound_lines_reach_the_runtime() -> TestResult {
    init_tracing();
    let (listener, addr) = router().await?;
    let (rt_tx, mut rt_rx) = mpsc::channel(16);
    let _transport = TcpTransport::spawn(settings(addr, Duration::from_millis(50)), rt_tx);

    let mut conn = accept(&listener).await?;
    conn.write_all(b"not json at all\n\n").await?;
    conn.write_all(
        b"{\"payload\": {\"task_id\": \"t1\", \"task_handler\": \"sample\"}, \"signature\": \"c2ln\"}\n",
    )
    .await?;

    // The malformed frame is skipped and the connection stays usable.
    let (payload, signature) = next_inbound(&mut rt_rx).await?;
    assert_eq!(payload, json!({ "task_id": "t1", "task_handler": "sample" }));
    assert_eq!(signature, b"c2ln".to_vec());
    Ok(())
}

#[tokio::test]
async fn outbound_messages_are_written_as_json_lines() -> TestResult {
    let (listener, addr) = router().await?;
    let (rt_tx, _rt_rx) = mpsc::channel(16);
    let mut transport = TcpTransport::spawn(settings(addr, Duration::from_millis(50)), rt_tx);

    let conn = accept(&listener).await?;
    transport
        .send(OutboundMessage::from(TaskRegister::new("db1")))
        .await?;

    let mut lines = BufReader::new(conn).lines();
    let line = timeout(Duration::from_secs(3), lines.next_line())
        .await??
        .ok_or("router saw no line")?;
    let value: Value = serde_json::from_str(&line)?;
    assert_eq!(value["req"], json!("task.register"));
    assert_eq!(value["host"], json!("db1"));
    Ok(())
}

#[tokio::test]
async fn reconnects_after_router_closes() -> TestResult {
    let (listener, addr) = router().await?;
    let (rt_tx, mut rt_rx) = mpsc::channel(16);
    let _transport = TcpTransport::spawn(settings(addr, Duration::from_millis(50)), rt_tx);

    let first = accept(&listener).await?;
    drop(first);

    let mut second = accept(&listener).await?;
    second
        .write_all(b"{\"payload\": {\"task_id\": \"t2\", \"task_handler\": \"sample\"}}\n")
        .await?;

    let (payload, signature) = next_inbound(&mut rt_rx).await?;
    assert_eq!(payload["task_id"], json!("t2"));
    assert!(signature.is_empty());
    Ok(())
}

#[tokio::test]
async fn send_never_blocks_while_router_is_unreachable() -> TestResult {
    init_tracing();
    let (rt_tx, _rt_rx) = mpsc::channel(16);
    // Nothing listens on port 1, and the retry is far in the future.
    let mut transport = TcpTransport::spawn(
        settings("127.0.0.1:1".to_string(), Duration::from_secs(60)),
        rt_tx,
    );

    for i in 0..(OUTBOUND_QUEUE + 150) {
        let message = OutboundMessage::from(TaskRegister::new(&format!("host-{i}")));
        timeout(Duration::from_millis(200), transport.send(message))
            .await
            .map_err(|_| format!("send #{i} blocked with the router down"))??;
    }
    Ok(())
}
