//! # RESP2 Framing
//!
//! Purpose: Serialize a `Command` into one request frame and read exactly one
//! reply frame back from a blocking session.
//!
//! ## Reply Limits
//! Every length a server announces is checked before memory is committed, so
//! a corrupt or hostile peer yields `HkvError::Protocol` and the session is
//! marked unhealthy, never a panic or an abort.
//! - Header lines: at most `MAX_LINE_LEN` bytes.
//! - Bulk payloads: at most `MAX_BULK_LEN` bytes (the server's default
//!   `proto-max-bulk-len`).
//! - Arrays: at most `MAX_DEPTH` levels deep; element storage grows as
//!   elements actually arrive.
//!
//! ## Nil
//! `$-1` and `*-1` both decode to `Reply::Bulk(None)`. Any other negative
//! length is a framing error.

use std::io::{BufRead, Read};

use bytes::{BufMut, Bytes, BytesMut};
use hkv_common::{HkvError, HkvResult};

use crate::command::Command;
use crate::reply::Reply;

/// Largest bulk payload accepted from a server.
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Deepest array nesting accepted from a server.
pub const MAX_DEPTH: usize = 32;

/// Longest status, error or header line accepted from a server.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Elements reserved up front for an array reply.
const ARRAY_PREALLOC: usize = 1024;

const CRLF: &[u8] = b"\r\n";

/// Appends `command` to `out` as a multibulk request.
///
/// The whole frame is reserved first, so encoding never reallocates midway.
pub fn encode_command(command: &Command, out: &mut BytesMut) {
    let args = command.as_args();
    out.reserve(frame_len(args));

    put_header(out, b'*', args.len());
    for arg in args {
        put_header(out, b'$', arg.len());
        out.put_slice(arg);
        out.put_slice(CRLF);
    }
}

fn frame_len(args: &[Bytes]) -> usize {
    let header = |len: usize| 1 + decimal_width(len) + CRLF.len();
    args.iter()
        .map(|arg| header(arg.len()) + arg.len() + CRLF.len())
        .sum::<usize>()
        + header(args.len())
}

fn put_header(out: &mut BytesMut, marker: u8, len: usize) {
    let mut digits = [0u8; 20];
    let mut start = digits.len();
    let mut rest = len;
    loop {
        start -= 1;
        digits[start] = b'0' + (rest % 10) as u8;
        rest /= 10;
        if rest == 0 {
            break;
        }
    }
    out.put_u8(marker);
    out.put_slice(&digits[start..]);
    out.put_slice(CRLF);
}

fn decimal_width(mut value: usize) -> usize {
    let mut width = 1;
    while value >= 10 {
        value /= 10;
        width += 1;
    }
    width
}

/// Reads one complete reply, nested arrays included.
///
/// `line_buf` is scratch space reused across calls.
pub fn read_reply<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>) -> HkvResult<Reply> {
    read_frame(reader, line_buf, 0)
}

fn read_frame<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>, depth: usize) -> HkvResult<Reply> {
    next_line(reader, line_buf)?;
    let (&marker, body) = line_buf
        .split_first()
        .ok_or(HkvError::Protocol("empty reply line"))?;

    match marker {
        b'+' => Ok(Reply::Status(body.to_vec())),
        b'-' => Ok(Reply::Error(body.to_vec())),
        b':' => parse_integer(body).map(Reply::Integer),
        b'$' => match parse_length(body)? {
            None => Ok(Reply::Bulk(None)),
            Some(len) => read_payload(reader, len).map(|data| Reply::Bulk(Some(data))),
        },
        b'*' => match parse_length(body)? {
            None => Ok(Reply::Bulk(None)),
            Some(count) => read_elements(reader, line_buf, count, depth + 1).map(Reply::Array),
        },
        _ => Err(HkvError::Protocol("unknown reply type")),
    }
}

fn read_payload<R: BufRead>(reader: &mut R, len: usize) -> HkvResult<Vec<u8>> {
    if len > MAX_BULK_LEN {
        return Err(HkvError::Protocol("bulk length exceeds limit"));
    }
    // Payload and its terminator in one read.
    let mut data = vec![0u8; len + CRLF.len()];
    reader.read_exact(&mut data)?;
    if !data.ends_with(CRLF) {
        return Err(HkvError::Protocol("bulk string missing CRLF"));
    }
    data.truncate(len);
    Ok(data)
}

fn read_elements<R: BufRead>(
    reader: &mut R,
    line_buf: &mut Vec<u8>,
    count: usize,
    depth: usize,
) -> HkvResult<Vec<Reply>> {
    if depth > MAX_DEPTH {
        return Err(HkvError::Protocol("reply nested too deeply"));
    }
    let mut items = Vec::with_capacity(count.min(ARRAY_PREALLOC));
    for _ in 0..count {
        items.push(read_frame(reader, line_buf, depth)?);
    }
    Ok(items)
}

/// Fills `buf` with the next CRLF-terminated line, terminator stripped.
fn next_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> HkvResult<()> {
    buf.clear();
    let read = reader
        .by_ref()
        .take(MAX_LINE_LEN as u64)
        .read_until(b'\n', buf)?;
    if read == 0 {
        return Err(HkvError::Protocol("connection closed by peer"));
    }
    if buf.ends_with(CRLF) {
        buf.truncate(buf.len() - CRLF.len());
        return Ok(());
    }
    if read == MAX_LINE_LEN && buf.last() != Some(&b'\n') {
        return Err(HkvError::Protocol("reply line too long"));
    }
    Err(HkvError::Protocol("line missing CRLF"))
}

fn parse_integer(body: &[u8]) -> HkvResult<i64> {
    std::str::from_utf8(body)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or(HkvError::Protocol("invalid integer"))
}

/// Decodes a `$`/`*` length: `None` for nil, `Some(len)` otherwise.
fn parse_length(body: &[u8]) -> HkvResult<Option<usize>> {
    match parse_integer(body)? {
        -1 => Ok(None),
        len => usize::try_from(len)
            .map(Some)
            .map_err(|_| HkvError::Protocol("negative length")),
    }
}
