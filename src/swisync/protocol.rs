// Swisync wire format
//
// Fixed 64-byte little-endian frames: a 12-byte header `{msg_id, pid, len}`
// followed by a 52-byte payload. Audio payloads carry `{operation, param}`,
// management payloads a NUL-padded socket name. Answers are a single u32.

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};

pub const FRAME_LEN: usize = 64;
pub const HEADER_LEN: usize = 12;
pub const PAYLOAD_LEN: usize = FRAME_LEN - HEADER_LEN;
pub const SOCKNAME_LEN: usize = 50;
pub const AUDIO_PAYLOAD_LEN: usize = 8;

pub const SYNC_MNGT_SOCKET: i32 = 0x10000;
pub const SYNC_AUDIO_VOC: i32 = 0x20000;
pub const SYNC_AUDIO_LOCAL_PLAY: i32 = 0x20001;
const SYNC_FAMILY_MASK: i32 = 0xFFFF_0000u32 as i32;

/// Answer value meaning "allowed"
pub const ANSWER_ALLOWED: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncOperation {
    Activated,
    Deactivated,
}

impl SyncOperation {
    pub fn code(self) -> i32 {
        match self {
            SyncOperation::Activated => 0,
            SyncOperation::Deactivated => 1,
        }
    }

    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            0 => Ok(SyncOperation::Activated),
            1 => Ok(SyncOperation::Deactivated),
            other => Err(anyhow!("Unknown swisync operation {}", other)),
        }
    }
}

/// Audio request sent to the authority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    pub msg_id: i32,
    pub operation: SyncOperation,
    pub param: i32,
}

impl SyncRequest {
    pub fn local_play(operation: SyncOperation) -> Self {
        Self {
            msg_id: SYNC_AUDIO_LOCAL_PLAY,
            operation,
            param: 0,
        }
    }
}

/// Asynchronous audio notification pushed by the authority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncNotification {
    pub msg_id: i32,
    pub operation: SyncOperation,
    pub param: i32,
}

impl SyncNotification {
    pub fn deactivate_now() -> Self {
        Self {
            msg_id: SYNC_AUDIO_LOCAL_PLAY,
            operation: SyncOperation::Deactivated,
            param: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Audio { pid: i32, notification: SyncNotification },
    Register { pid: i32, socket_name: String },
}

fn write_header(frame: &mut [u8; FRAME_LEN], msg_id: i32, pid: i32, len: usize) {
    frame[0..4].copy_from_slice(&msg_id.to_le_bytes());
    frame[4..8].copy_from_slice(&pid.to_le_bytes());
    frame[8..12].copy_from_slice(&(len as i32).to_le_bytes());
}

fn read_i32(frame: &[u8; FRAME_LEN], offset: usize) -> i32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&frame[offset..offset + 4]);
    i32::from_le_bytes(bytes)
}

pub fn encode_audio(pid: i32, request: &SyncRequest) -> [u8; FRAME_LEN] {
    let mut frame = [0u8; FRAME_LEN];
    write_header(&mut frame, request.msg_id, pid, AUDIO_PAYLOAD_LEN);
    frame[12..16].copy_from_slice(&request.operation.code().to_le_bytes());
    frame[16..20].copy_from_slice(&request.param.to_le_bytes());
    frame
}

pub fn encode_register(pid: i32, socket_name: &str) -> Result<[u8; FRAME_LEN]> {
    let name = socket_name.as_bytes();
    // One byte is kept for the terminating NUL
    if name.len() >= SOCKNAME_LEN {
        bail!(
            "Socket name too long for swisync registration: {} bytes (max {})",
            name.len(),
            SOCKNAME_LEN - 1
        );
    }
    let mut frame = [0u8; FRAME_LEN];
    write_header(&mut frame, SYNC_MNGT_SOCKET, pid, SOCKNAME_LEN);
    frame[HEADER_LEN..HEADER_LEN + name.len()].copy_from_slice(name);
    Ok(frame)
}

pub fn decode(frame: &[u8; FRAME_LEN]) -> Result<Frame> {
    let msg_id = read_i32(frame, 0);
    let pid = read_i32(frame, 4);
    let len = read_i32(frame, 8);
    if len < 0 || len as usize > PAYLOAD_LEN {
        bail!("Invalid swisync payload length {}", len);
    }

    if msg_id == SYNC_MNGT_SOCKET {
        let payload = &frame[HEADER_LEN..HEADER_LEN + SOCKNAME_LEN];
        let end = payload.iter().position(|&b| b == 0).unwrap_or(SOCKNAME_LEN);
        let socket_name = std::str::from_utf8(&payload[..end])
            .map_err(|e| anyhow!("Registration socket name is not UTF-8: {}", e))?
            .to_string();
        return Ok(Frame::Register { pid, socket_name });
    }

    if msg_id & SYNC_FAMILY_MASK != SYNC_AUDIO_VOC {
        bail!("Unsupported swisync message id {:#x}", msg_id);
    }
    if (len as usize) < AUDIO_PAYLOAD_LEN {
        bail!("Audio payload too short: {} bytes", len);
    }
    let operation = SyncOperation::from_code(read_i32(frame, 12))?;
    let param = read_i32(frame, 16);
    Ok(Frame::Audio {
        pid,
        notification: SyncNotification {
            msg_id,
            operation,
            param,
        },
    })
}

pub fn decode_answer(bytes: [u8; 4]) -> bool {
    u32::from_le_bytes(bytes) == ANSWER_ALLOWED
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_frame_layout() {
        let frame = encode_audio(42, &SyncRequest::local_play(SyncOperation::Deactivated));
        assert_eq!(&frame[0..4], &[0x01, 0x00, 0x02, 0x00]);
        assert_eq!(&frame[4..8], &42i32.to_le_bytes());
        assert_eq!(&frame[8..12], &8i32.to_le_bytes());
        assert_eq!(&frame[12..16], &1i32.to_le_bytes());
        assert!(frame[20..].iter().all(|&b| b == 0));

        match decode(&frame).unwrap() {
            Frame::Audio { pid, notification } => {
                assert_eq!(pid, 42);
                assert_eq!(notification, SyncNotification::deactivate_now());
            }
            other => panic!("expected audio frame, got {:?}", other),
        }
    }

    #[test]
    fn test_register_frame() {
        let frame = encode_register(7, "/tmp/swisync/legato").unwrap();
        assert_eq!(read_i32(&frame, 0), SYNC_MNGT_SOCKET);
        assert_eq!(read_i32(&frame, 8), 50);
        assert_eq!(
            decode(&frame).unwrap(),
            Frame::Register {
                pid: 7,
                socket_name: "/tmp/swisync/legato".to_string()
            }
        );

        let long = "/".repeat(SOCKNAME_LEN);
        assert!(encode_register(7, &long).is_err());
    }

    #[test]
    fn test_rejects_garbage() {
        let mut frame = [0u8; FRAME_LEN];
        frame[0..4].copy_from_slice(&0x30000i32.to_le_bytes());
        frame[8..12].copy_from_slice(&8i32.to_le_bytes());
        assert!(decode(&frame).is_err(), "Unknown message family should be rejected");

        let mut frame = encode_audio(1, &SyncRequest::local_play(SyncOperation::Activated));
        frame[12..16].copy_from_slice(&9i32.to_le_bytes());
        assert!(decode(&frame).is_err(), "Unknown operation should be rejected");

        let mut frame = encode_audio(1, &SyncRequest::local_play(SyncOperation::Activated));
        frame[8..12].copy_from_slice(&100i32.to_le_bytes());
        assert!(decode(&frame).is_err(), "Oversized length should be rejected");
    }

    #[test]
    fn test_answer() {
        assert!(decode_answer(1u32.to_le_bytes()));
        assert!(!decode_answer(0u32.to_le_bytes()));
        assert!(!decode_answer(2u32.to_le_bytes()));
    }
}
