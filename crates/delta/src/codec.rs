//! svndiff version 0 encoding and decoding
//!
//! A stream is the 4-byte header `SVN\0` followed by windows. Each window
//! is five integers (source view offset, source view length, target view
//! length, instruction-section length, new-data length) followed by the
//! instruction bytes and the new data.
//!
//! Integers use the 7-bit big-endian variable-length form: the high bit
//! of each byte marks continuation. Instructions carry a two-bit opcode
//! (source copy, target copy, new copy), a 6-bit short length (0 means a
//! varint length follows), and, for the two copy forms, an offset varint.

use crate::window::{DeltaOp, DeltaWindow};
use chronofs_core::{FsError, Result};

/// The svndiff version 0 stream header
pub const SVNDIFF_HEADER: [u8; 4] = *b"SVN\0";

const OP_SOURCE: u8 = 0b00;
const OP_TARGET: u8 = 0b01;
const OP_NEW: u8 = 0b10;

/// Append a 7-bit varint
pub fn write_varint(buf: &mut Vec<u8>, mut n: u64) {
    let mut bytes = [0u8; 10];
    let mut i = bytes.len();
    i -= 1;
    bytes[i] = (n & 0x7f) as u8;
    n >>= 7;
    while n > 0 {
        i -= 1;
        bytes[i] = 0x80 | (n & 0x7f) as u8;
        n >>= 7;
    }
    buf.extend_from_slice(&bytes[i..]);
}

/// Read a 7-bit varint, advancing `pos`
pub fn read_varint(data: &[u8], pos: &mut usize) -> Result<u64> {
    let mut n: u64 = 0;
    loop {
        let byte = *data
            .get(*pos)
            .ok_or_else(|| FsError::corrupt("svndiff data truncated inside an integer"))?;
        *pos += 1;
        if n > u64::MAX >> 7 {
            return Err(FsError::corrupt("svndiff integer overflows"));
        }
        n = (n << 7) | u64::from(byte & 0x7f);
        if byte & 0x80 == 0 {
            return Ok(n);
        }
    }
}

fn encode_op(buf: &mut Vec<u8>, op: &DeltaOp) {
    let (selector, len, offset) = match *op {
        DeltaOp::Source { offset, len } => (OP_SOURCE, len, Some(offset)),
        DeltaOp::Target { offset, len } => (OP_TARGET, len, Some(offset)),
        DeltaOp::New { len } => (OP_NEW, len, None),
    };
    if len > 0 && len < 64 {
        buf.push((selector << 6) | len as u8);
    } else {
        buf.push(selector << 6);
        write_varint(buf, len as u64);
    }
    if let Some(offset) = offset {
        write_varint(buf, offset as u64);
    }
}

fn decode_op(data: &[u8], pos: &mut usize) -> Result<DeltaOp> {
    let byte = *data
        .get(*pos)
        .ok_or_else(|| FsError::corrupt("svndiff data truncated inside instructions"))?;
    *pos += 1;
    let selector = byte >> 6;
    let short_len = usize::from(byte & 0x3f);
    let len = if short_len == 0 {
        read_varint(data, pos)? as usize
    } else {
        short_len
    };
    match selector {
        OP_SOURCE => {
            let offset = read_varint(data, pos)? as usize;
            Ok(DeltaOp::Source { offset, len })
        }
        OP_TARGET => {
            let offset = read_varint(data, pos)? as usize;
            Ok(DeltaOp::Target { offset, len })
        }
        OP_NEW => Ok(DeltaOp::New { len }),
        _ => Err(FsError::corrupt("unknown svndiff instruction selector")),
    }
}

/// Encode one window, without the stream header
pub fn encode_window(window: &DeltaWindow) -> Vec<u8> {
    let mut instructions = Vec::new();
    for op in &window.ops {
        encode_op(&mut instructions, op);
    }
    let mut buf = Vec::with_capacity(instructions.len() + window.new_data.len() + 16);
    write_varint(&mut buf, window.sview_offset);
    write_varint(&mut buf, window.sview_len as u64);
    write_varint(&mut buf, window.tview_len as u64);
    write_varint(&mut buf, instructions.len() as u64);
    write_varint(&mut buf, window.new_data.len() as u64);
    buf.extend_from_slice(&instructions);
    buf.extend_from_slice(&window.new_data);
    buf
}

/// Decode one window starting at `pos`, advancing `pos` past it
pub fn decode_window(data: &[u8], pos: &mut usize) -> Result<DeltaWindow> {
    let sview_offset = read_varint(data, pos)?;
    let sview_len = read_varint(data, pos)? as usize;
    let tview_len = read_varint(data, pos)? as usize;
    let inslen = read_varint(data, pos)? as usize;
    let newlen = read_varint(data, pos)? as usize;

    let ins_end = pos
        .checked_add(inslen)
        .filter(|&e| e <= data.len())
        .ok_or_else(|| FsError::corrupt("svndiff instruction section truncated"))?;
    let new_end = ins_end
        .checked_add(newlen)
        .filter(|&e| e <= data.len())
        .ok_or_else(|| FsError::corrupt("svndiff new-data section truncated"))?;

    let mut ops = Vec::new();
    let mut produced = 0usize;
    while *pos < ins_end {
        let op = decode_op(data, pos)?;
        produced += op.len();
        ops.push(op);
    }
    if *pos != ins_end {
        return Err(FsError::corrupt("svndiff instruction overruns its section"));
    }
    if produced != tview_len {
        return Err(FsError::corrupt(format!(
            "svndiff instructions produce {} bytes, target view is {}",
            produced, tview_len
        )));
    }

    let new_data = data[ins_end..new_end].to_vec();
    *pos = new_end;

    Ok(DeltaWindow {
        sview_offset,
        sview_len,
        tview_len,
        ops,
        new_data,
    })
}

/// Encode a complete stream: header plus every window
pub fn encode_stream(windows: &[DeltaWindow]) -> Vec<u8> {
    let mut buf = SVNDIFF_HEADER.to_vec();
    for window in windows {
        buf.extend_from_slice(&encode_window(window));
    }
    buf
}

/// Decode a complete stream, validating the header
pub fn decode_stream(data: &[u8]) -> Result<Vec<DeltaWindow>> {
    if data.len() < 4 || data[..4] != SVNDIFF_HEADER {
        return Err(FsError::corrupt("svndiff stream lacks SVN\\0 header"));
    }
    let mut pos = 4;
    let mut windows = Vec::new();
    while pos < data.len() {
        windows.push(decode_window(data, &mut pos)?);
    }
    Ok(windows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn varint_round_trip() {
        for n in [0u64, 1, 0x7f, 0x80, 0x3fff, 0x4000, u64::MAX] {
            let mut buf = Vec::new();
            write_varint(&mut buf, n);
            let mut pos = 0;
            assert_eq!(read_varint(&buf, &mut pos).unwrap(), n);
            assert_eq!(pos, buf.len());
        }
    }

    #[test]
    fn varint_encoding_is_big_endian_7bit() {
        let mut buf = Vec::new();
        write_varint(&mut buf, 130);
        assert_eq!(buf, [0x81, 0x02]);
    }

    fn sample_window() -> DeltaWindow {
        DeltaWindow {
            sview_offset: 10,
            sview_len: 20,
            tview_len: 70,
            ops: vec![
                DeltaOp::Source { offset: 3, len: 17 },
                DeltaOp::New { len: 50 },
                DeltaOp::Target { offset: 0, len: 3 },
            ],
            new_data: vec![7u8; 50],
        }
    }

    #[test]
    fn window_round_trip() {
        let w = sample_window();
        let bytes = encode_window(&w);
        let mut pos = 0;
        let back = decode_window(&bytes, &mut pos).unwrap();
        assert_eq!(pos, bytes.len());
        assert_eq!(back, w);
    }

    #[test]
    fn stream_round_trip() {
        let windows = vec![sample_window(), sample_window()];
        let stream = encode_stream(&windows);
        assert_eq!(&stream[..4], b"SVN\0");
        assert_eq!(decode_stream(&stream).unwrap(), windows);
    }

    #[test]
    fn missing_header_is_corrupt() {
        assert!(decode_stream(b"XXX\0").is_err());
        assert!(decode_stream(b"SV").is_err());
    }

    #[test]
    fn truncated_window_is_corrupt() {
        let bytes = encode_window(&sample_window());
        for cut in [1, bytes.len() / 2, bytes.len() - 1] {
            let mut pos = 0;
            assert!(decode_window(&bytes[..cut], &mut pos).is_err(), "cut {}", cut);
        }
    }

    #[test]
    fn instruction_total_must_match_tview_len() {
        let mut w = sample_window();
        w.tview_len += 1;
        let bytes = encode_window(&w);
        let mut pos = 0;
        assert!(decode_window(&bytes, &mut pos).is_err());
    }

    proptest! {
        #[test]
        fn random_windows_round_trip(
            sview_offset in 0u64..1_000_000,
            new_data in prop::collection::vec(any::<u8>(), 0..200),
            source_len in 0usize..200,
        ) {
            let mut ops = Vec::new();
            let mut tview_len = 0usize;
            if source_len > 0 {
                ops.push(DeltaOp::Source { offset: 0, len: source_len });
                tview_len += source_len;
            }
            if !new_data.is_empty() {
                ops.push(DeltaOp::New { len: new_data.len() });
                tview_len += new_data.len();
            }
            let w = DeltaWindow {
                sview_offset,
                sview_len: source_len,
                tview_len,
                ops,
                new_data,
            };
            let bytes = encode_window(&w);
            let mut pos = 0;
            let back = decode_window(&bytes, &mut pos).unwrap();
            prop_assert_eq!(back, w);
            prop_assert_eq!(pos, bytes.len());
        }
    }
}
