//! End-to-end framing properties exercised directly over an in-process
//! duplex pipe, independent of the listener/client-table plumbing the
//! unit tests in `src/lib.rs` cover.
//!
//! Spec: §4.3 "Framing" — pipelined sends preserve order, and an oversize
//! frame is rejected without corrupting the stream for frames already
//! queued ahead of it.

use ocvsmd_transport::{recv_frame, send_frame, TransportError};

#[tokio::test]
async fn pipelined_frames_are_received_in_order() {
    let (mut a, mut b) = tokio::io::duplex(64 * 1024);

    send_frame(&mut a, &[b"first"]).await.unwrap();
    send_frame(&mut a, &[b"second-fragment-a", b"second-fragment-b"]).await.unwrap();
    send_frame(&mut a, &[b"third"]).await.unwrap();

    let first = recv_frame(&mut b).await.unwrap().unwrap();
    assert_eq!(first.as_slice(), b"first");

    let second = recv_frame(&mut b).await.unwrap().unwrap();
    assert_eq!(second.as_slice(), b"second-fragment-asecond-fragment-b");

    let third = recv_frame(&mut b).await.unwrap().unwrap();
    assert_eq!(third.as_slice(), b"third");
}

#[tokio::test]
async fn clean_eof_at_a_header_boundary_yields_none() {
    let (a, mut b) = tokio::io::duplex(64 * 1024);
    drop(a);

    assert!(recv_frame(&mut b).await.unwrap().is_none());
}

#[tokio::test]
async fn a_frame_split_mid_payload_is_a_short_read_not_a_clean_eof() {
    let (mut a, mut b) = tokio::io::duplex(64 * 1024);

    // Write a header promising 10 bytes, then only 3, then hang up.
    let header = ocvsmd_wire::FrameHeader::new(10).unwrap();
    tokio::io::AsyncWriteExt::write_all(&mut a, &header.to_bytes()).await.unwrap();
    tokio::io::AsyncWriteExt::write_all(&mut a, b"abc").await.unwrap();
    drop(a);

    match recv_frame(&mut b).await {
        Err(TransportError::ShortRead) => {}
        other => panic!("expected ShortRead, got {other:?}"),
    }
}
