//! S7 Client Integration Tests
//!
//! Runs the client against an in-process PLC that answers ISO-on-TCP
//! telegrams:
//! - Connection setup and PDU negotiation
//! - Chunked reads sized to the negotiated PDU
//! - Write round-trip
//! - CPU run state via SZL
//! - Error mapping for missing blocks, refused connections and timeouts

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use blocklink::{BlockTransport, BlockValue, RunState, TransportError};
use plcsrv::{PlcCoordinator, PlcsrvConfig, PointReading, S7Client, S7Options};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

// ============================================================================
// Fake PLC
// ============================================================================

#[derive(Debug)]
struct FakePlc {
    blocks: HashMap<u16, Vec<u8>>,
    pdu_length: u16,
    cpu_status: u8,
    reads: Vec<(u16, u32, u16)>,
}

impl FakePlc {
    fn new(pdu_length: u16) -> Self {
        Self {
            blocks: HashMap::new(),
            pdu_length,
            cpu_status: 0x08,
            reads: Vec::new(),
        }
    }

    fn handle(&mut self, req: &[u8]) -> Vec<u8> {
        if req[5] == 0xE0 {
            return vec![
                0x03, 0x00, 0x00, 0x16, 0x11, 0xD0, 0x00, 0x01, 0x00, 0x01, 0x00, 0xC0, 0x01,
                0x0A, 0xC1, 0x02, 0x01, 0x00, 0xC2, 0x02, 0x01, 0x01,
            ];
        }
        if req[8] == 0x07 {
            return self.szl_reply();
        }
        match req[17] {
            0xF0 => {
                let pdu = self.pdu_length.to_be_bytes();
                telegram(&[
                    0x32, 0x03, 0x00, 0x00, 0x04, 0x00, 0x00, 0x08, 0x00, 0x00, 0x00, 0x00, 0xF0,
                    0x00, 0x00, 0x01, 0x00, 0x01, pdu[0], pdu[1],
                ])
            },
            0x04 => self.read_reply(req),
            0x05 => self.write_reply(req),
            other => panic!("unexpected function 0x{:02X}", other),
        }
    }

    fn item(req: &[u8]) -> (u16, u32, u16) {
        let count = u16::from_be_bytes([req[23], req[24]]);
        let block_id = u16::from_be_bytes([req[25], req[26]]);
        let bits = u32::from_be_bytes([0, req[28], req[29], req[30]]);
        (block_id, bits / 8, count)
    }

    fn read_reply(&mut self, req: &[u8]) -> Vec<u8> {
        let (block_id, start, count) = Self::item(req);
        self.reads.push((block_id, start, count));

        let data = self.blocks.get(&block_id).and_then(|b| {
            b.get(start as usize..start as usize + count as usize)
                .map(<[u8]>::to_vec)
        });
        let mut body = vec![0x32, 0x03, 0x00, 0x00, 0x05, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00, 0x04, 0x01];
        match data {
            Some(data) => {
                body.push(0xFF);
                body.push(0x04);
                body.extend_from_slice(&((data.len() * 8) as u16).to_be_bytes());
                body.extend_from_slice(&data);
            },
            None => body.extend_from_slice(&[0x0A, 0x00, 0x00, 0x00]),
        }
        telegram(&body)
    }

    fn write_reply(&mut self, req: &[u8]) -> Vec<u8> {
        let (block_id, start, count) = Self::item(req);
        let data = &req[35..35 + count as usize];
        let code = match self.blocks.get_mut(&block_id) {
            Some(block) if block.len() >= start as usize + data.len() => {
                block[start as usize..start as usize + data.len()].copy_from_slice(data);
                0xFF
            },
            Some(_) => 0x05,
            None => 0x0A,
        };
        telegram(&[
            0x32, 0x03, 0x00, 0x00, 0x05, 0x00, 0x00, 0x02, 0x00, 0x01, 0x00, 0x00, 0x05, 0x01,
            code,
        ])
    }

    fn szl_reply(&self) -> Vec<u8> {
        let mut body = vec![
            0x32, 0x07, 0x00, 0x00, 0x05, 0x00, 0x00, 0x0C, 0x00, 0x20, // header
            0x00, 0x01, 0x12, 0x08, 0x12, 0x84, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00, // params
            0xFF, 0x09, 0x00, 0x1C, 0x04, 0x24, 0x00, 0x00, 0x00, 0x14, 0x00, 0x01, // data head
        ];
        let mut record = [0u8; 20];
        record[3] = self.cpu_status;
        body.extend_from_slice(&record);
        telegram(&body)
    }
}

fn telegram(body: &[u8]) -> Vec<u8> {
    let len = (body.len() + 7) as u16;
    let mut frame = vec![0x03, 0x00];
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&[0x02, 0xF0, 0x80]);
    frame.extend_from_slice(body);
    frame
}

async fn start_plc(plc: FakePlc) -> (u16, Arc<Mutex<FakePlc>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let plc = Arc::new(Mutex::new(plc));

    let shared = Arc::clone(&plc);
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let plc = Arc::clone(&shared);
            tokio::spawn(async move {
                loop {
                    let mut header = [0u8; 4];
                    if stream.read_exact(&mut header).await.is_err() {
                        break;
                    }
                    let len = u16::from_be_bytes([header[2], header[3]]) as usize;
                    let mut req = header.to_vec();
                    req.resize(len, 0);
                    if stream.read_exact(&mut req[4..]).await.is_err() {
                        break;
                    }
                    let reply = plc.lock().unwrap().handle(&req);
                    if stream.write_all(&reply).await.is_err() {
                        break;
                    }
                }
            });
        }
    });

    (port, plc)
}

fn options(port: u16) -> S7Options {
    S7Options {
        port,
        io_timeout: Duration::from_millis(500),
        ..Default::default()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_connect_read_write_and_run_state() {
    let mut plc = FakePlc::new(480);
    let mut rain = vec![0u8; 54];
    rain[30..34].copy_from_slice(&12.3f32.to_be_bytes());
    plc.blocks.insert(40, rain);
    plc.blocks.insert(10, vec![0u8; 18]);
    let (port, plc) = start_plc(plc).await;

    let mut client = S7Client::new(options(port));
    client.connect("127.0.0.1").await.unwrap();
    assert!(client.is_connected());
    assert_eq!(client.pdu_length(), 480);

    let data = client.read_block(40, 0, 54).await.unwrap();
    assert_eq!(data.len(), 54);
    assert_eq!(&data[30..34], &12.3f32.to_be_bytes());

    client.write_block(10, 16, &[0x00, 0x02]).await.unwrap();
    assert_eq!(&plc.lock().unwrap().blocks[&10][16..18], &[0x00, 0x02]);

    assert_eq!(client.run_state().await.unwrap(), RunState::Run);
    plc.lock().unwrap().cpu_status = 0x04;
    assert_eq!(client.run_state().await.unwrap(), RunState::Stop);

    client.disconnect().await.unwrap();
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_reads_are_chunked_to_pdu() {
    let mut plc = FakePlc::new(240);
    let block: Vec<u8> = (0..300u32).map(|i| i as u8).collect();
    plc.blocks.insert(60, block.clone());
    let (port, plc) = start_plc(plc).await;

    let mut client = S7Client::new(options(port));
    client.connect("127.0.0.1").await.unwrap();
    let data = client.read_block(60, 0, 300).await.unwrap();

    assert_eq!(&data[..], &block[..]);
    assert_eq!(plc.lock().unwrap().reads, vec![(60, 0, 222), (60, 222, 78)]);
}

#[tokio::test]
async fn test_missing_block_rejected() {
    let (port, _plc) = start_plc(FakePlc::new(480)).await;

    let mut client = S7Client::new(options(port));
    client.connect("127.0.0.1").await.unwrap();
    let err = client.read_block(99, 0, 4).await.unwrap_err();
    assert!(matches!(err, TransportError::Rejected(_)));
}

#[tokio::test]
async fn test_connection_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut client = S7Client::new(options(port));
    let err = client.connect("127.0.0.1").await.unwrap_err();
    assert!(matches!(
        err,
        TransportError::ConnectionFailed(_) | TransportError::Timeout(_)
    ));
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_silent_peer_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (_stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let mut client = S7Client::new(S7Options {
        io_timeout: Duration::from_millis(100),
        ..options(port)
    });
    let err = client.connect("127.0.0.1").await.unwrap_err();
    assert!(matches!(err, TransportError::Timeout(_)));
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_coordinator_over_s7() {
    let mut plc = FakePlc::new(480);
    let mut rain = vec![0u8; 54];
    rain[30..34].copy_from_slice(&12.3f32.to_be_bytes());
    plc.blocks.insert(40, rain);
    let (port, _plc) = start_plc(plc).await;

    let config: PlcsrvConfig = serde_yaml::from_str(&format!(
        r#"
plc:
  host: 127.0.0.1
  port: {}
blocks:
  - block_id: 40
    length: 54
points:
  - name: rain_today
    address: DB40.REAL30
    round_to: 1
"#,
        port
    ))
    .unwrap();
    config.validate().unwrap();

    let client = S7Client::new(config.plc.s7_options());
    let mut coordinator = PlcCoordinator::new(config, Box::new(client));
    let data = coordinator.refresh().await;

    assert!(data.comms_ok);
    assert_eq!(data.cpu_running, Some(true));
    assert_eq!(
        data.reading("rain_today"),
        Some(&PointReading::Value(BlockValue::Float(12.3)))
    );
}
