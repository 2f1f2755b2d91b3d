//! Two-frame bus wire format: a topic frame followed by a payload frame.
//!
//! Each frame is a big-endian `u32` length prefix plus the frame bytes, so
//! subscribers can filter on topic without parsing the payload. Subscriber
//! control records are a single frame carrying an op byte and the topic.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single frame; larger prefixes indicate a corrupt stream.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

pub const OP_SUBSCRIBE: u8 = 0x01;
pub const OP_UNSUBSCRIBE: u8 = 0x00;

/// Encodes one bus message as two length-prefixed frames.
pub fn encode(topic: &str, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + topic.len() + payload.len());
    buf.extend_from_slice(&(topic.len() as u32).to_be_bytes());
    buf.extend_from_slice(topic.as_bytes());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Decodes a complete two-frame message.
///
/// A malformed buffer (missing either frame, bad length prefix, non-UTF-8
/// topic, trailing bytes) yields `(None, None)`; decoding never fails loudly
/// so receivers can log and discard.
pub fn decode(buf: &[u8]) -> (Option<String>, Option<Vec<u8>>) {
    match try_decode(buf) {
        Some((topic, payload)) => (Some(topic), Some(payload)),
        None => (None, None),
    }
}

fn try_decode(buf: &[u8]) -> Option<(String, Vec<u8>)> {
    let (topic_frame, rest) = take_frame(buf)?;
    let (payload_frame, rest) = take_frame(rest)?;
    if !rest.is_empty() {
        return None;
    }
    let topic = String::from_utf8(topic_frame.to_vec()).ok()?;
    Some((topic, payload_frame.to_vec()))
}

fn take_frame(buf: &[u8]) -> Option<(&[u8], &[u8])> {
    if buf.len() < 4 {
        return None;
    }
    let len = u32::from_be_bytes(buf[..4].try_into().ok()?) as usize;
    if len > MAX_FRAME_LEN || buf.len() < 4 + len {
        return None;
    }
    Some((&buf[4..4 + len], &buf[4 + len..]))
}

pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    topic: &str,
    payload: &[u8],
) -> std::io::Result<()> {
    writer.write_all(&encode(topic, payload)).await?;
    writer.flush().await
}

pub async fn read_message<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> std::io::Result<(String, Vec<u8>)> {
    let topic = read_frame(reader).await?;
    let payload = read_frame(reader).await?;
    let topic = String::from_utf8(topic).map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::InvalidData, "topic is not valid UTF-8")
    })?;
    Ok((topic, payload))
}

/// Writes one subscriber control record: op byte plus topic bytes.
pub async fn write_control<W: AsyncWrite + Unpin>(
    writer: &mut W,
    op: u8,
    topic: &str,
) -> std::io::Result<()> {
    let mut buf = Vec::with_capacity(5 + topic.len());
    buf.extend_from_slice(&((topic.len() + 1) as u32).to_be_bytes());
    buf.push(op);
    buf.extend_from_slice(topic.as_bytes());
    writer.write_all(&buf).await?;
    writer.flush().await
}

pub async fn read_control<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<(u8, String)> {
    let frame = read_frame(reader).await?;
    let Some((&op, topic)) = frame.split_first() else {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "empty control frame",
        ));
    };
    let topic = String::from_utf8(topic.to_vec()).map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::InvalidData, "topic is not valid UTF-8")
    })?;
    Ok((op, topic))
}

async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "frame exceeds maximum length",
        ));
    }
    let mut frame = vec![0u8; len];
    reader.read_exact(&mut frame).await?;
    Ok(frame)
}
