//! The two-phase frame receive state machine and the frame sender.
//!
//! Spec: §4.3 "Framing". The phases are expressed as a straight-line async
//! function rather than an explicit state enum: `tokio::io::AsyncRead`
//! already suspends (without busy-waiting) on would-block, which is what
//! the spec's "on would-block, keep the phase" is asking for, and `EINTR`
//! is retried transparently by tokio's reactor per §7.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use ocvsmd_wire::{FrameHeader, HEADER_LEN};

use crate::error::TransportError;
use crate::payload::Payload;

/// Read one frame. Returns `Ok(None)` for a clean EOF observed exactly at
/// the header boundary (§4.3 "on 0-byte read, signal clean EOF").
pub async fn recv_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<Payload>, TransportError> {
    let mut header_buf = [0u8; HEADER_LEN];
    if !read_full_or_clean_eof(reader, &mut header_buf).await? {
        return Ok(None);
    }

    let header = FrameHeader::from_bytes(&header_buf);
    header.validate()?;

    let mut payload = Payload::for_size(header.size as usize);
    reader.read_exact(payload.as_mut_slice()).await?;

    Ok(Some(payload))
}

/// Fill `buf` completely, or return `Ok(false)` if the stream ended before
/// a single byte was read. A short read after some bytes have already
/// arrived is a `TransportError::ShortRead`.
async fn read_full_or_clean_eof<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
) -> Result<bool, TransportError> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(TransportError::ShortRead);
        }
        filled += n;
    }
    Ok(true)
}

/// Write one frame made of `fragments` concatenated in order, preceded by
/// a single header whose size is the sum of fragment lengths. The header
/// and every fragment are written back-to-back before the next `send`
/// call on the same writer can interleave (caller must serialize calls,
/// e.g. behind a per-connection lock), satisfying the atomicity guarantee
/// of §5.
pub async fn send_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    fragments: &[&[u8]],
) -> Result<(), TransportError> {
    let total: usize = fragments.iter().map(|f| f.len()).sum();
    let header = FrameHeader::new(total as u32)?;
    writer.write_all(&header.to_bytes()).await?;
    for fragment in fragments {
        if !fragment.is_empty() {
            writer.write_all(fragment).await?;
        }
    }
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocvsmd_wire::MAX_PAYLOAD_LEN;
    use tokio::io::duplex;

    #[tokio::test]
    async fn send_then_recv_roundtrip() {
        let (mut a, mut b) = duplex(4096);
        send_frame(&mut a, &[b"hello", b" world"]).await.unwrap();
        let frame = recv_frame(&mut b).await.unwrap().unwrap();
        assert_eq!(frame.as_slice(), b"hello world");
    }

    #[tokio::test]
    async fn clean_eof_at_header_boundary() {
        let (a, mut b) = duplex(4096);
        drop(a);
        let frame = recv_frame(&mut b).await.unwrap();
        assert!(frame.is_none());
    }

    #[tokio::test]
    async fn short_read_mid_header_is_error() {
        let (mut a, mut b) = duplex(4096);
        a.write_all(&[1, 2, 3]).await.unwrap();
        drop(a);
        let result = recv_frame(&mut b).await;
        assert!(matches!(result, Err(TransportError::ShortRead)));
    }

    #[tokio::test]
    async fn short_read_mid_payload_is_error() {
        let (mut a, mut b) = duplex(4096);
        let header = FrameHeader::new(10).unwrap();
        a.write_all(&header.to_bytes()).await.unwrap();
        a.write_all(&[1, 2, 3]).await.unwrap();
        drop(a);
        let result = recv_frame(&mut b).await;
        assert!(matches!(result, Err(TransportError::ShortRead)));
    }

    #[tokio::test]
    async fn split_reads_reassemble_without_loss() {
        let (mut a, mut b) = duplex(4096);
        let payload = vec![0xAB; 100];
        let header = FrameHeader::new(payload.len() as u32).unwrap();
        let header_bytes = header.to_bytes();

        a.write_all(&header_bytes).await.unwrap();
        a.write_all(&payload[..1]).await.unwrap();
        // Simulate the remaining payload arriving in a second read by
        // writing it right after; duplex delivers both writes, but
        // recv_frame must still reassemble them into one frame.
        a.write_all(&payload[1..]).await.unwrap();

        let frame = recv_frame(&mut b).await.unwrap().unwrap();
        assert_eq!(frame.as_slice(), payload.as_slice());
    }

    #[tokio::test]
    async fn bad_magic_is_rejected() {
        let (mut a, mut b) = duplex(4096);
        let mut bad = [0u8; HEADER_LEN];
        bad[0..4].copy_from_slice(&0u32.to_le_bytes());
        bad[4..8].copy_from_slice(&4u32.to_le_bytes());
        a.write_all(&bad).await.unwrap();
        a.write_all(&[1, 2, 3, 4]).await.unwrap();
        let result = recv_frame(&mut b).await;
        assert!(matches!(result, Err(TransportError::Header(_))));
    }

    #[tokio::test]
    async fn zero_size_is_rejected() {
        let header = FrameHeader::new(1).unwrap().to_bytes(); // valid 1-byte frame
        // Build a zero-size header by hand since FrameHeader::new(0) errors.
        let mut zero = header;
        zero[4..8].copy_from_slice(&0u32.to_le_bytes());

        let (mut a, mut b) = duplex(4096);
        a.write_all(&zero).await.unwrap();
        let result = recv_frame(&mut b).await;
        assert!(matches!(result, Err(TransportError::Header(_))));
    }

    #[tokio::test]
    async fn oversize_is_rejected() {
        let mut header = FrameHeader::new(1).unwrap().to_bytes();
        header[4..8].copy_from_slice(&(MAX_PAYLOAD_LEN + 1).to_le_bytes());

        let (mut a, mut b) = duplex(4096);
        a.write_all(&header).await.unwrap();
        let result = recv_frame(&mut b).await;
        assert!(matches!(result, Err(TransportError::Header(_))));
    }
}
