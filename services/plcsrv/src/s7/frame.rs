//! S7 telegrams over ISO-on-TCP
//!
//! Pure builders and validators, no I/O. Every telegram is wrapped in a
//! TPKT header (RFC 1006) and a COTP header (ISO 8073):
//!
//! ```text
//! TPKT   [0] 0x03  [1] 0x00  [2..4] total length (BE)
//! COTP   [4] 0x02  [5] 0xF0 (DT)  [6] 0x80 (EOT)
//! S7     [7] 0x32  [8] ROSCTR  ...
//! ```
//!
//! Only DB byte access, setup-communication and the SZL read used for the
//! CPU operating mode are implemented.

use blocklink::{RunState, TransportError, TransportResult};
use bytes::{BufMut, Bytes, BytesMut};

/// RFC 1006 version byte
pub const TPKT_ID: u8 = 0x03;
/// TPKT header length
pub const TPKT_HEADER_LEN: usize = 4;
/// TPKT + COTP data header length
pub const ISO_HEADER_LEN: usize = 7;
/// S7 protocol id
pub const S7_ID: u8 = 0x32;
/// Default ISO-on-TCP port
pub const ISO_TCP_PORT: u16 = 102;
/// PDU length requested during setup-communication
pub const PDU_LEN_REQUEST: u16 = 480;

const COTP_CR: u8 = 0xE0;
const COTP_CC: u8 = 0xD0;
const COTP_DT: u8 = 0xF0;
const COTP_EOT: u8 = 0x80;

const ROSCTR_JOB: u8 = 0x01;
const ROSCTR_USERDATA: u8 = 0x07;

const FUNC_READ_VAR: u8 = 0x04;
const FUNC_WRITE_VAR: u8 = 0x05;

const AREA_DB: u8 = 0x84;
const WORDLEN_BYTE: u8 = 0x02;
const TRANSPORT_BYTE: u8 = 0x04;

const RET_SUCCESS: u8 = 0xFF;
const RET_INVALID_ADDRESS: u8 = 0x05;
const RET_NOT_FOUND: u8 = 0x0A;

/// Offset of the item return code in read/write responses
const RW_RETURN_CODE: usize = ISO_HEADER_LEN + 14;
/// Offset of the payload in read responses
const READ_PAYLOAD: usize = ISO_HEADER_LEN + 18;
/// Minimum setup-communication response
const SETUP_RESPONSE_LEN: usize = 27;

/// SZL id reporting the CPU operating mode
pub const SZL_CPU_STATUS: u16 = 0x0424;

/// Local TSAP used by PG connections
pub const LOCAL_TSAP: u16 = 0x0100;
/// PG connection type
pub const CONNECTION_TYPE_PG: u16 = 0x01;

/// Remote TSAP selecting the CPU at `rack`/`slot`
pub fn remote_tsap(rack: u16, slot: u16) -> u16 {
    (CONNECTION_TYPE_PG << 8) + rack * 0x20 + slot
}

/// Largest read payload per request for a negotiated PDU length
pub fn max_read_payload(pdu_length: u16) -> usize {
    (pdu_length as usize).saturating_sub(18)
}

/// Largest write payload per request for a negotiated PDU length
pub fn max_write_payload(pdu_length: u16) -> usize {
    (pdu_length as usize).saturating_sub(28)
}

// ============================================================================
// Framing
// ============================================================================

/// Start a telegram with TPKT and, for data telegrams, the COTP DT header
fn begin(capacity: usize) -> BytesMut {
    let mut buf = BytesMut::with_capacity(capacity);
    buf.put_u8(TPKT_ID);
    buf.put_u8(0x00);
    buf.put_u16(0); // patched by finish()
    buf
}

fn begin_data(capacity: usize) -> BytesMut {
    let mut buf = begin(capacity);
    buf.put_u8(0x02);
    buf.put_u8(COTP_DT);
    buf.put_u8(COTP_EOT);
    buf
}

fn finish(mut buf: BytesMut) -> Bytes {
    let len = buf.len() as u16;
    buf[2..4].copy_from_slice(&len.to_be_bytes());
    buf.freeze()
}

/// Total telegram length announced by a TPKT header
pub fn telegram_length(header: &[u8; TPKT_HEADER_LEN]) -> TransportResult<usize> {
    if header[0] != TPKT_ID {
        return Err(TransportError::Protocol(format!(
            "invalid TPKT version 0x{:02X}",
            header[0]
        )));
    }
    let len = u16::from_be_bytes([header[2], header[3]]) as usize;
    if len <= TPKT_HEADER_LEN {
        return Err(TransportError::Protocol(format!(
            "invalid TPKT length {}",
            len
        )));
    }
    Ok(len)
}

/// Validate the COTP data header of a complete telegram
fn check_data_telegram(frame: &[u8]) -> TransportResult<()> {
    if frame.len() < ISO_HEADER_LEN + 2 {
        return Err(TransportError::Protocol(format!(
            "telegram too short ({} bytes)",
            frame.len()
        )));
    }
    if frame[4] != 0x02 || frame[5] != COTP_DT {
        return Err(TransportError::Protocol("invalid COTP data header".to_string()));
    }
    if frame[6] != COTP_EOT {
        return Err(TransportError::Protocol("fragmented COTP packet".to_string()));
    }
    if frame[7] != S7_ID {
        return Err(TransportError::Protocol(format!(
            "invalid S7 protocol id 0x{:02X}",
            frame[7]
        )));
    }
    Ok(())
}

fn return_code_error(code: u8, context: &str) -> TransportError {
    match code {
        RET_NOT_FOUND => TransportError::Rejected(format!("{}: object does not exist", context)),
        RET_INVALID_ADDRESS => TransportError::Rejected(format!("{}: invalid address", context)),
        other => TransportError::Rejected(format!("{}: return code 0x{:02X}", context, other)),
    }
}

// ============================================================================
// Connection setup
// ============================================================================

/// COTP connection request (22 bytes)
pub fn connection_request(local_tsap: u16, remote_tsap: u16) -> Bytes {
    let mut buf = begin(22);
    buf.put_u8(0x11); // COTP length
    buf.put_u8(COTP_CR);
    buf.put_u16(0x0000); // destination reference
    buf.put_u16(0x0001); // source reference
    buf.put_u8(0x00); // class 0
    buf.put_slice(&[0xC0, 0x01, 0x0A]); // TPDU size 1024
    buf.put_slice(&[0xC1, 0x02]);
    buf.put_u16(local_tsap);
    buf.put_slice(&[0xC2, 0x02]);
    buf.put_u16(remote_tsap);
    finish(buf)
}

/// Validate a COTP connection confirm
pub fn check_connection_confirm(frame: &[u8]) -> TransportResult<()> {
    if frame.len() < ISO_HEADER_LEN || frame[5] != COTP_CC {
        return Err(TransportError::ConnectionFailed(
            "ISO connection refused by peer".to_string(),
        ));
    }
    Ok(())
}

/// S7 setup-communication job (25 bytes)
pub fn setup_communication_request(pdu_length: u16) -> Bytes {
    let mut buf = begin_data(25);
    buf.put_slice(&[S7_ID, ROSCTR_JOB, 0x00, 0x00]);
    buf.put_u16(0x0400); // PDU reference
    buf.put_u16(0x0008); // parameter length
    buf.put_u16(0x0000); // data length
    buf.put_slice(&[0xF0, 0x00]); // setup communication
    buf.put_u16(0x0001); // max AmQ calling
    buf.put_u16(0x0001); // max AmQ called
    buf.put_u16(pdu_length);
    finish(buf)
}

/// Negotiated PDU length from a setup-communication ack
pub fn parse_setup_communication_response(frame: &[u8]) -> TransportResult<u16> {
    if frame.len() < SETUP_RESPONSE_LEN || frame[0] != TPKT_ID || frame[7] != S7_ID {
        return Err(TransportError::ConnectionFailed(
            "PDU negotiation failed: malformed response".to_string(),
        ));
    }
    if frame[17] != 0x00 {
        return Err(TransportError::ConnectionFailed(format!(
            "PDU negotiation failed: error class 0x{:02X}",
            frame[17]
        )));
    }
    let pdu_length = u16::from_be_bytes([frame[25], frame[26]]);
    if max_write_payload(pdu_length) == 0 {
        return Err(TransportError::ConnectionFailed(format!(
            "PDU negotiation failed: unusable PDU length {}",
            pdu_length
        )));
    }
    Ok(pdu_length)
}

// ============================================================================
// Read / write var
// ============================================================================

/// 24-bit bit address of a byte offset
fn bit_address(byte_offset: u32) -> TransportResult<[u8; 3]> {
    let bits = byte_offset
        .checked_mul(8)
        .filter(|b| *b <= 0x00FF_FFFF)
        .ok_or_else(|| {
            TransportError::Rejected(format!("byte offset {} exceeds S7 address range", byte_offset))
        })?;
    let be = bits.to_be_bytes();
    Ok([be[1], be[2], be[3]])
}

fn put_db_item(buf: &mut BytesMut, block_id: u16, start: u32, count: u16) -> TransportResult<()> {
    buf.put_slice(&[0x12, 0x0A, 0x10, WORDLEN_BYTE]);
    buf.put_u16(count);
    buf.put_u16(block_id);
    buf.put_u8(AREA_DB);
    buf.put_slice(&bit_address(start)?);
    Ok(())
}

/// Read-var job for `count` bytes of DB `block_id` at `start` (31 bytes)
pub fn read_request(block_id: u16, start: u32, count: u16) -> TransportResult<Bytes> {
    let mut buf = begin_data(31);
    buf.put_slice(&[S7_ID, ROSCTR_JOB, 0x00, 0x00]);
    buf.put_u16(0x0500); // PDU reference
    buf.put_u16(0x000E); // parameter length
    buf.put_u16(0x0000); // data length
    buf.put_u8(FUNC_READ_VAR);
    buf.put_u8(0x01); // item count
    put_db_item(&mut buf, block_id, start, count)?;
    Ok(finish(buf))
}

/// Payload of a read-var ack, checked against the requested length
pub fn parse_read_response(frame: &[u8], requested: usize) -> TransportResult<Bytes> {
    check_data_telegram(frame)?;
    if frame.len() <= RW_RETURN_CODE {
        return Err(TransportError::Protocol("read response too short".to_string()));
    }
    let code = frame[RW_RETURN_CODE];
    if code != RET_SUCCESS {
        return Err(return_code_error(code, "read"));
    }
    let payload = frame.get(READ_PAYLOAD..).unwrap_or_default();
    if payload.len() < requested {
        return Err(TransportError::Protocol(format!(
            "read response carries {} bytes, expected {}",
            payload.len(),
            requested
        )));
    }
    Ok(Bytes::copy_from_slice(&payload[..requested]))
}

/// Write-var job carrying `data` for DB `block_id` at `start`
pub fn write_request(block_id: u16, start: u32, data: &[u8]) -> TransportResult<Bytes> {
    let count = u16::try_from(data.len())
        .map_err(|_| TransportError::Rejected(format!("write of {} bytes too large", data.len())))?;
    let bit_count = count
        .checked_mul(8)
        .ok_or_else(|| TransportError::Rejected(format!("write of {} bytes too large", count)))?;

    let mut buf = begin_data(35 + data.len());
    buf.put_slice(&[S7_ID, ROSCTR_JOB, 0x00, 0x00]);
    buf.put_u16(0x0500); // PDU reference
    buf.put_u16(0x000E); // parameter length
    buf.put_u16(count + 4); // data length
    buf.put_u8(FUNC_WRITE_VAR);
    buf.put_u8(0x01); // item count
    put_db_item(&mut buf, block_id, start, count)?;
    buf.put_u8(0x00); // reserved
    buf.put_u8(TRANSPORT_BYTE);
    buf.put_u16(bit_count);
    buf.put_slice(data);
    Ok(finish(buf))
}

/// Validate a write-var ack
pub fn check_write_response(frame: &[u8]) -> TransportResult<()> {
    check_data_telegram(frame)?;
    let code = *frame
        .get(RW_RETURN_CODE)
        .ok_or_else(|| TransportError::Protocol("write response too short".to_string()))?;
    if code != RET_SUCCESS {
        return Err(return_code_error(code, "write"));
    }
    Ok(())
}

// ============================================================================
// SZL (system status list)
// ============================================================================

/// Userdata request reading SZL `id`/`index` (33 bytes)
pub fn szl_request(id: u16, index: u16) -> Bytes {
    let mut buf = begin_data(33);
    buf.put_slice(&[S7_ID, ROSCTR_USERDATA, 0x00, 0x00]);
    buf.put_u16(0x0500); // PDU reference
    buf.put_u16(0x0008); // parameter length
    buf.put_u16(0x0008); // data length
    // parameter head, method request, CPU functions, read SZL
    buf.put_slice(&[0x00, 0x01, 0x12, 0x04, 0x11, 0x44, 0x01, 0x00]);
    buf.put_slice(&[RET_SUCCESS, 0x09]);
    buf.put_u16(0x0004);
    buf.put_u16(id);
    buf.put_u16(index);
    finish(buf)
}

/// First SZL record of a userdata response
pub fn parse_szl_record(frame: &[u8]) -> TransportResult<&[u8]> {
    check_data_telegram(frame)?;
    let short = || TransportError::Protocol("SZL response too short".to_string());

    // Userdata header is 10 bytes; parameter length at [13..15]
    let param_len = u16::from_be_bytes([
        *frame.get(13).ok_or_else(short)?,
        *frame.get(14).ok_or_else(short)?,
    ]) as usize;
    let params = ISO_HEADER_LEN + 10;
    if param_len >= 12 {
        let error = u16::from_be_bytes([
            *frame.get(params + 10).ok_or_else(short)?,
            *frame.get(params + 11).ok_or_else(short)?,
        ]);
        if error != 0 {
            return Err(TransportError::Rejected(format!(
                "SZL read failed: error 0x{:04X}",
                error
            )));
        }
    }

    let data = params + param_len;
    let code = *frame.get(data).ok_or_else(short)?;
    if code != RET_SUCCESS {
        return Err(return_code_error(code, "SZL read"));
    }
    // return code, transport size, length, SZL id, index, record length, record count
    let record_len = u16::from_be_bytes([
        *frame.get(data + 8).ok_or_else(short)?,
        *frame.get(data + 9).ok_or_else(short)?,
    ]) as usize;
    let start = data + 12;
    frame
        .get(start..start + record_len)
        .filter(|r| !r.is_empty())
        .ok_or_else(short)
}

/// CPU operating mode from an SZL 0x0424 response
pub fn parse_run_state(frame: &[u8]) -> TransportResult<RunState> {
    let record = parse_szl_record(frame)?;
    let status = *record
        .get(3)
        .ok_or_else(|| TransportError::Protocol("SZL 0x0424 record too short".to_string()))?;
    Ok(match status {
        0x08 => RunState::Run,
        0x04 => RunState::Stop,
        0x00 => RunState::Unknown,
        _ => RunState::Run,
    })
}
