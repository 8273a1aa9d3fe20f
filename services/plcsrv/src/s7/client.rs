//! Async S7 client
//!
//! Implements [`BlockTransport`] over one ISO-on-TCP connection. Every
//! request/response exchange is bounded by `io_timeout`; any I/O failure
//! drops the stream so the next `connect` starts from scratch.

use std::net::Ipv6Addr;
use std::time::Duration;

use async_trait::async_trait;
use blocklink::bytes::format_hex;
use blocklink::{BlockTransport, RunState, TransportError, TransportResult};
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use super::frame;

/// Connection parameters for one CPU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S7Options {
    pub port: u16,
    pub rack: u16,
    pub slot: u16,
    pub connect_timeout: Duration,
    pub io_timeout: Duration,
}

impl Default for S7Options {
    fn default() -> Self {
        Self {
            port: frame::ISO_TCP_PORT,
            rack: 0,
            slot: 1,
            connect_timeout: Duration::from_millis(3000),
            io_timeout: Duration::from_millis(1000),
        }
    }
}

/// S7 client speaking DB byte access and SZL reads
#[derive(Debug)]
pub struct S7Client {
    options: S7Options,
    stream: Option<TcpStream>,
    pdu_length: u16,
}

impl S7Client {
    pub fn new(options: S7Options) -> Self {
        Self {
            options,
            stream: None,
            pdu_length: 0,
        }
    }

    /// PDU length negotiated with the CPU (0 before the first connect)
    pub fn pdu_length(&self) -> u16 {
        self.pdu_length
    }

    fn endpoint(&self, host: &str) -> String {
        if host.parse::<Ipv6Addr>().is_ok() {
            format!("[{}]:{}", host, self.options.port)
        } else {
            format!("{}:{}", host, self.options.port)
        }
    }

    /// Send one telegram and read the complete reply
    async fn exchange(&mut self, request: &[u8]) -> TransportResult<Vec<u8>> {
        let io_timeout = self.options.io_timeout;
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;

        trace!("S7 send [{}]", format_hex(request));
        let result = timeout(io_timeout, async {
            stream.write_all(request).await?;

            let mut header = [0u8; frame::TPKT_HEADER_LEN];
            stream.read_exact(&mut header).await?;
            let total = frame::telegram_length(&header)?;

            let mut telegram = vec![0u8; total];
            telegram[..frame::TPKT_HEADER_LEN].copy_from_slice(&header);
            stream
                .read_exact(&mut telegram[frame::TPKT_HEADER_LEN..])
                .await?;
            Ok::<_, TransportError>(telegram)
        })
        .await;

        let outcome = match result {
            Ok(inner) => inner,
            Err(_) => Err(TransportError::Timeout(format!(
                "no reply within {:?}",
                io_timeout
            ))),
        };

        match outcome {
            Ok(telegram) => {
                trace!("S7 recv [{}]", format_hex(&telegram));
                Ok(telegram)
            },
            Err(e) => {
                // Stream state is unknown after a partial exchange
                self.stream = None;
                Err(e)
            },
        }
    }
}

#[async_trait]
impl BlockTransport for S7Client {
    fn name(&self) -> &str {
        "s7"
    }

    async fn connect(&mut self, host: &str) -> TransportResult<()> {
        self.stream = None;
        self.pdu_length = 0;

        let endpoint = self.endpoint(host);
        info!(
            "[CONNECT] S7 to {} - rack {} slot {}",
            endpoint, self.options.rack, self.options.slot
        );

        let stream = match timeout(self.options.connect_timeout, TcpStream::connect(&endpoint)).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(TransportError::ConnectionFailed(format!(
                    "Failed to connect to {}: {}",
                    endpoint, e
                )))
            },
            Err(_) => {
                return Err(TransportError::Timeout(format!(
                    "Connection to {} timed out",
                    endpoint
                )))
            },
        };
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }
        self.stream = Some(stream);

        let request = frame::connection_request(
            frame::LOCAL_TSAP,
            frame::remote_tsap(self.options.rack, self.options.slot),
        );
        let confirm = self.exchange(&request).await?;
        if let Err(e) = frame::check_connection_confirm(&confirm) {
            self.stream = None;
            return Err(e);
        }

        let setup = self.exchange(&frame::setup_communication_request(frame::PDU_LEN_REQUEST)).await?;
        match frame::parse_setup_communication_response(&setup) {
            Ok(pdu_length) => {
                self.pdu_length = pdu_length;
                debug!("S7 PDU length negotiated: {}", pdu_length);
                Ok(())
            },
            Err(e) => {
                self.stream = None;
                Err(e)
            },
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn read_block(&mut self, block_id: u16, start: u32, length: u32) -> TransportResult<Bytes> {
        if self.stream.is_none() {
            return Err(TransportError::NotConnected);
        }

        let chunk_max = frame::max_read_payload(self.pdu_length).max(1) as u32;
        let mut out = BytesMut::with_capacity(length as usize);
        let mut offset = 0u32;

        while offset < length {
            let chunk = (length - offset).min(chunk_max) as u16;
            let request = frame::read_request(block_id, start + offset, chunk)?;
            let reply = self.exchange(&request).await?;
            let payload = frame::parse_read_response(&reply, chunk as usize)?;
            out.extend_from_slice(&payload);
            offset += chunk as u32;
        }

        debug!("Read DB{} {}+{} in {} byte chunks", block_id, start, length, chunk_max);
        Ok(out.freeze())
    }

    async fn write_block(&mut self, block_id: u16, start: u32, data: &[u8]) -> TransportResult<()> {
        if self.stream.is_none() {
            return Err(TransportError::NotConnected);
        }

        let chunk_max = frame::max_write_payload(self.pdu_length).max(1);
        let mut offset = 0usize;
        for chunk in data.chunks(chunk_max) {
            let request = frame::write_request(block_id, start + offset as u32, chunk)?;
            let reply = self.exchange(&request).await?;
            frame::check_write_response(&reply)?;
            offset += chunk.len();
        }
        Ok(())
    }

    async fn run_state(&mut self) -> TransportResult<RunState> {
        let reply = self
            .exchange(&frame::szl_request(frame::SZL_CPU_STATUS, 0))
            .await?;
        frame::parse_run_state(&reply)
    }

    async fn disconnect(&mut self) -> TransportResult<()> {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!("Error during S7 shutdown: {}", e);
            }
            info!("Disconnected from S7 CPU");
        }
        Ok(())
    }
}
