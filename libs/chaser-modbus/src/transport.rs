//! Serialized Modbus TCP transport
//!
//! The transaction-id check on this protocol only detects mismatch, not
//! interleaving: two requests written back-to-back without waiting for the
//! first response corrupt both. The transport therefore keeps the socket
//! behind a single async mutex held for the entire write/read round trip,
//! making "at most one request in flight" a structural guarantee rather
//! than a convention callers must follow.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::error::{ModbusError, Result};
use crate::frame::{MbapHeader, Request, Response};
use crate::MBAP_HEADER_LEN;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Connection state guarded by the transport's exclusive-access region
struct Connection {
    stream: Option<TcpStream>,
    /// Wraps past 0xFFFF, skipping the reserved value 0
    next_transaction_id: u16,
}

impl Connection {
    fn next_transaction_id(&mut self) -> u16 {
        let id = self.next_transaction_id;
        self.next_transaction_id = match self.next_transaction_id.wrapping_add(1) {
            0 => 1,
            n => n,
        };
        id
    }
}

/// Owner of the single PLC connection; all requests funnel through [`execute`]
///
/// Shared by `Arc` between every producer (pollers, sequencer, manual
/// writes). No internal retry and no auto-reconnect: any I/O or framing
/// failure drops the socket and callers decide whether to reconnect.
///
/// [`execute`]: ModbusTransport::execute
pub struct ModbusTransport {
    conn: Mutex<Connection>,
    /// Mirror of `conn.stream.is_some()` for lock-free liveness reads
    connected: AtomicBool,
    unit_id: u8,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl ModbusTransport {
    pub fn new(unit_id: u8) -> Self {
        Self::with_timeouts(unit_id, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeouts(
        unit_id: u8,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            conn: Mutex::new(Connection {
                stream: None,
                next_transaction_id: 1,
            }),
            connected: AtomicBool::new(false),
            unit_id,
            connect_timeout,
            request_timeout,
        }
    }

    /// Open the TCP connection, replacing any previous one
    pub async fn connect(&self, host: &str, port: u16) -> Result<()> {
        let mut conn = self.conn.lock().await;

        // Idempotent: a prior connection is torn down first
        if conn.stream.take().is_some() {
            self.connected.store(false, Ordering::Release);
            debug!("Closed previous connection before reconnect");
        }

        let addr = format!("{host}:{port}");
        let stream = match timeout(self.connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                error!("TCP connect failed: {} - {}", addr, e);
                return Err(ModbusError::connection(format!(
                    "Failed to connect to {addr}: {e}"
                )));
            },
            Err(_) => {
                warn!("TCP connect timeout: {}", addr);
                return Err(ModbusError::timeout(format!(
                    "Connection to {addr} timed out"
                )));
            },
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!("TCP_NODELAY: {}", e);
        }

        info!("TCP connected: {}", addr);
        conn.stream = Some(stream);
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    /// Close the connection; safe to call when already disconnected
    pub async fn disconnect(&self) {
        let mut conn = self.conn.lock().await;
        if conn.stream.take().is_some() {
            info!("TCP disconnected");
        }
        self.connected.store(false, Ordering::Release);
    }

    /// Current liveness, without blocking on in-flight requests
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Execute one request/response transaction
    ///
    /// Holds the exclusive region for the full round trip: encode and write
    /// the frame, then read exactly one response frame and verify its
    /// transaction id. Requests are served in lock-acquisition order with
    /// no priority between callers.
    pub async fn execute(&self, request: &Request) -> Result<Response> {
        let mut conn = self.conn.lock().await;
        if conn.stream.is_none() {
            return Err(ModbusError::connection("Not connected"));
        }

        let tid = conn.next_transaction_id();
        let result = self.round_trip(&mut conn, tid, request).await;

        if let Err(ref e) = result {
            if e.is_fatal() {
                // A failed write, short read or stray frame leaves the
                // stream unusable for further request/response pairing.
                conn.stream = None;
                self.connected.store(false, Ordering::Release);
                warn!("Connection dropped after {}", e);
            }
        }
        result
    }

    async fn round_trip(
        &self,
        conn: &mut Connection,
        tid: u16,
        request: &Request,
    ) -> Result<Response> {
        let stream = conn
            .stream
            .as_mut()
            .ok_or_else(|| ModbusError::connection("Not connected"))?;

        let pdu = request.encode_pdu();
        let header = MbapHeader::for_request(tid, self.unit_id, pdu.len());

        let mut frame = Vec::with_capacity(MBAP_HEADER_LEN + pdu.len());
        frame.extend_from_slice(&header.encode());
        frame.extend_from_slice(&pdu);

        debug!(
            "TX: tid={:04X}, FC={:02X}, {}B",
            tid,
            request.function_code().to_u8(),
            frame.len()
        );

        match timeout(self.request_timeout, stream.write_all(&frame)).await {
            Ok(Ok(())) => {},
            Ok(Err(e)) => return Err(ModbusError::Io(format!("Request write failed: {e}"))),
            Err(_) => return Err(ModbusError::timeout("Request write timed out")),
        }

        // Read the 7-byte MBAP header, then exactly length-1 PDU bytes.
        // read_exact loops over short reads; a closed stream mid-frame is
        // a hard fault, never silently tolerated.
        let mut header_buf = [0u8; MBAP_HEADER_LEN];
        match timeout(self.request_timeout, stream.read_exact(&mut header_buf)).await {
            Ok(Ok(_)) => {},
            Ok(Err(e)) => return Err(ModbusError::Io(format!("Response header read failed: {e}"))),
            Err(_) => return Err(ModbusError::timeout("Response header read timed out")),
        }

        let resp_header = MbapHeader::decode(&header_buf)?;
        let mut resp_pdu = vec![0u8; resp_header.length as usize - 1];
        match timeout(self.request_timeout, stream.read_exact(&mut resp_pdu)).await {
            Ok(Ok(_)) => {},
            Ok(Err(e)) => return Err(ModbusError::Io(format!("Response PDU read failed: {e}"))),
            Err(_) => return Err(ModbusError::timeout("Response PDU read timed out")),
        }

        if resp_header.transaction_id != tid {
            return Err(ModbusError::protocol(format!(
                "Transaction ID mismatch: expected {}, got {}",
                tid, resp_header.transaction_id
            )));
        }

        debug!(
            "RX: tid={:04X}, {}B",
            resp_header.transaction_id,
            MBAP_HEADER_LEN + resp_pdu.len()
        );
        request.decode_response(&resp_pdu)
    }
}
