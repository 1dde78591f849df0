//! Message framing (length + crc32c).
//!
//! Transports move whole frames, so decoding works on one complete buffer.

use crc32c::crc32c;
use thiserror::Error;

pub const FRAME_HEADER_LEN: usize = 8;
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame truncated: need {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },
    #[error("frame length invalid: {reason}")]
    FrameLengthInvalid { reason: String },
    #[error("frame too large: max {max_frame_bytes} got {got_bytes}")]
    FrameTooLarge {
        max_frame_bytes: usize,
        got_bytes: usize,
    },
    #[error("frame crc mismatch: expected {expected} got {got}")]
    FrameCrcMismatch { expected: u32, got: u32 },
}

pub fn encode_frame(payload: &[u8], max_frame_bytes: usize) -> Result<Vec<u8>, FrameError> {
    if payload.is_empty() {
        return Err(FrameError::FrameLengthInvalid {
            reason: "frame length cannot be zero".to_string(),
        });
    }
    if payload.len() > max_frame_bytes {
        return Err(FrameError::FrameTooLarge {
            max_frame_bytes,
            got_bytes: payload.len(),
        });
    }
    let length = u32::try_from(payload.len()).map_err(|_| FrameError::FrameLengthInvalid {
        reason: "frame length exceeds u32".to_string(),
    })?;
    let crc = crc32c(payload);

    let mut buf = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    buf.extend_from_slice(&length.to_le_bytes());
    buf.extend_from_slice(&crc.to_le_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Validate one complete frame and borrow its payload.
pub fn decode_frame(frame: &[u8], max_frame_bytes: usize) -> Result<&[u8], FrameError> {
    if frame.len() < FRAME_HEADER_LEN {
        return Err(FrameError::Truncated {
            needed: FRAME_HEADER_LEN,
            got: frame.len(),
        });
    }
    let (header, body) = frame.split_at(FRAME_HEADER_LEN);

    let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
    if length == 0 {
        return Err(FrameError::FrameLengthInvalid {
            reason: "frame length cannot be zero".to_string(),
        });
    }
    if length > max_frame_bytes {
        return Err(FrameError::FrameTooLarge {
            max_frame_bytes,
            got_bytes: length,
        });
    }
    if body.len() < length {
        return Err(FrameError::Truncated {
            needed: FRAME_HEADER_LEN + length,
            got: frame.len(),
        });
    }
    if body.len() > length {
        return Err(FrameError::FrameLengthInvalid {
            reason: format!("{} trailing bytes after frame", body.len() - length),
        });
    }

    let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    let actual_crc = crc32c(body);
    if actual_crc != expected_crc {
        return Err(FrameError::FrameCrcMismatch {
            expected: expected_crc,
            got: actual_crc,
        });
    }
    Ok(body)
}
