//! Transport tests against an in-process stub PLC
//!
//! The stub reads one full MBAP frame at a time and asserts that every
//! frame it sees is well-formed; interleaved writes from concurrent callers
//! would show up here as corrupt headers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use chaser_modbus::{ModbusError, ModbusTransport, Request, Response};

/// How the stub answers each request frame
#[derive(Clone, Copy)]
enum StubBehavior {
    /// Echo a valid response with the request's transaction id
    Normal,
    /// Respond with a corrupted transaction id
    MangleTransactionId,
    /// Close the connection after reading the request
    CloseMidTransaction,
}

async fn serve_connection(mut stream: TcpStream, behavior: StubBehavior, served: Arc<AtomicUsize>) {
    loop {
        let mut header = [0u8; 7];
        if stream.read_exact(&mut header).await.is_err() {
            return;
        }

        let tid = u16::from_be_bytes([header[0], header[1]]);
        let protocol_id = u16::from_be_bytes([header[2], header[3]]);
        let length = u16::from_be_bytes([header[4], header[5]]) as usize;
        let unit_id = header[6];

        // Corrupt framing from interleaved writers fails these checks
        assert_eq!(protocol_id, 0, "stub saw interleaved/corrupt frame");
        assert!((2..=254).contains(&length), "implausible length {length}");

        let mut pdu = vec![0u8; length - 1];
        if stream.read_exact(&mut pdu).await.is_err() {
            return;
        }

        let response_pdu = match pdu[0] {
            // Read coils / discrete inputs: all-false bits
            0x01 | 0x02 => vec![pdu[0], 0x02, 0x00, 0x00],
            // Read input registers: one mid-scale register
            0x04 => vec![0x04, 0x02, 0x36, 0x00],
            // Write echoes
            0x05 | 0x0F => pdu[..5].to_vec(),
            other => panic!("stub saw unexpected function code {other:#04x}"),
        };

        served.fetch_add(1, Ordering::SeqCst);

        match behavior {
            StubBehavior::CloseMidTransaction => return,
            StubBehavior::Normal | StubBehavior::MangleTransactionId => {
                let resp_tid = match behavior {
                    StubBehavior::MangleTransactionId => tid.wrapping_add(1),
                    _ => tid,
                };
                let mut frame = Vec::with_capacity(7 + response_pdu.len());
                frame.extend_from_slice(&resp_tid.to_be_bytes());
                frame.extend_from_slice(&0u16.to_be_bytes());
                frame.extend_from_slice(&((response_pdu.len() + 1) as u16).to_be_bytes());
                frame.push(unit_id);
                frame.extend_from_slice(&response_pdu);
                if stream.write_all(&frame).await.is_err() {
                    return;
                }
            },
        }
    }
}

/// Spawn a stub PLC, returning its port and a counter of served requests
async fn spawn_stub(behavior: StubBehavior) -> (u16, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
    let port = listener.local_addr().expect("local addr").port();
    let served = Arc::new(AtomicUsize::new(0));

    let served_clone = served.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve_connection(stream, behavior, served_clone.clone()));
        }
    });

    (port, served)
}

#[tokio::test]
async fn test_execute_round_trip() {
    let (port, _) = spawn_stub(StubBehavior::Normal).await;

    let transport = ModbusTransport::new(1);
    transport.connect("127.0.0.1", port).await.expect("connect");
    assert!(transport.is_connected());

    let response = transport
        .execute(&Request::ReadDiscreteInputs { address: 0, quantity: 14 })
        .await
        .expect("execute");
    assert_eq!(response, Response::Bits(vec![false; 14]));

    let response = transport
        .execute(&Request::ReadInputRegisters { address: 32, quantity: 1 })
        .await
        .expect("execute");
    assert_eq!(response, Response::Registers(vec![0x3600]));

    transport.disconnect().await;
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn test_connect_refused() {
    let transport = ModbusTransport::new(1);
    // Reserve a port and close it so nothing listens there
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        listener.local_addr().expect("local addr").port()
    };

    let err = transport.connect("127.0.0.1", port).await.unwrap_err();
    assert!(matches!(err, ModbusError::Connection(_)));
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn test_connect_is_idempotent() {
    let (port, _) = spawn_stub(StubBehavior::Normal).await;

    let transport = ModbusTransport::new(1);
    transport.connect("127.0.0.1", port).await.expect("first connect");
    transport.connect("127.0.0.1", port).await.expect("reconnect");
    assert!(transport.is_connected());

    let response = transport
        .execute(&Request::ReadCoils { address: 0, quantity: 14 })
        .await
        .expect("execute after reconnect");
    assert_eq!(response, Response::Bits(vec![false; 14]));
}

#[tokio::test]
async fn test_transaction_id_mismatch_drops_connection() {
    let (port, _) = spawn_stub(StubBehavior::MangleTransactionId).await;

    let transport = ModbusTransport::new(1);
    transport.connect("127.0.0.1", port).await.expect("connect");

    let err = transport
        .execute(&Request::ReadCoils { address: 0, quantity: 14 })
        .await
        .unwrap_err();
    assert!(matches!(err, ModbusError::Protocol(_)));
    assert!(err.to_string().contains("Transaction ID mismatch"));

    // The desynchronized stream must not be reused
    assert!(!transport.is_connected());
    let err = transport
        .execute(&Request::ReadCoils { address: 0, quantity: 14 })
        .await
        .unwrap_err();
    assert!(matches!(err, ModbusError::Connection(_)));
}

#[tokio::test]
async fn test_closed_stream_mid_frame_is_fatal() {
    let (port, _) = spawn_stub(StubBehavior::CloseMidTransaction).await;

    let transport = ModbusTransport::new(1);
    transport.connect("127.0.0.1", port).await.expect("connect");

    let err = transport
        .execute(&Request::ReadCoils { address: 0, quantity: 14 })
        .await
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn test_concurrent_callers_are_serialized() {
    let (port, served) = spawn_stub(StubBehavior::Normal).await;

    let transport = Arc::new(ModbusTransport::new(1));
    transport.connect("127.0.0.1", port).await.expect("connect");

    // Four independent producers, mirroring the pollers/sequencer/manual
    // traffic pattern. The stub panics on any malformed frame, so this
    // passing means no two requests ever interleaved on the wire.
    let mut handles = Vec::new();
    for producer in 0..4 {
        let transport = transport.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..25 {
                let request = match (producer + i) % 4 {
                    0 => Request::ReadDiscreteInputs { address: 0, quantity: 14 },
                    1 => Request::ReadCoils { address: 0, quantity: 14 },
                    2 => Request::ReadInputRegisters { address: 32, quantity: 1 },
                    _ => Request::WriteMultipleCoils {
                        address: 0,
                        values: vec![false; 14],
                    },
                };
                transport.execute(&request).await.expect("serialized execute");
            }
        }));
    }

    for handle in handles {
        handle.await.expect("producer task");
    }

    assert_eq!(served.load(Ordering::SeqCst), 100);
    assert!(transport.is_connected());
}

#[tokio::test]
async fn test_request_timeout_when_stub_stalls() {
    // A listener that accepts but never responds
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let transport = ModbusTransport::with_timeouts(
        1,
        Duration::from_secs(1),
        Duration::from_millis(100),
    );
    transport.connect("127.0.0.1", port).await.expect("connect");

    let err = transport
        .execute(&Request::ReadCoils { address: 0, quantity: 14 })
        .await
        .unwrap_err();
    assert!(matches!(err, ModbusError::Timeout(_)));
    assert!(!transport.is_connected());
}
