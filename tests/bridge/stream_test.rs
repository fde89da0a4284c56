//! Tests for the stdout line scanner and the stderr block reader.

use tokio::io::AsyncWriteExt;

use stdio_bridge::bridge::{BlockReader, LineScanner, StreamKind, StreamReadError};
use stdio_bridge::config::DEFAULT_MAX_LINE_BYTES;

#[tokio::test]
async fn line_of_exactly_max_length_is_delivered() {
    let (reader, mut writer) = tokio::io::duplex(64);
    tokio::spawn(async move {
        writer.write_all(b"abcdefgh\n").await.unwrap();
    });

    let mut scanner = LineScanner::new(reader, 8);
    assert_eq!(scanner.max_line_bytes(), 8);
    assert_eq!(scanner.next_line().await.unwrap().as_deref(), Some("abcdefgh"));
    assert!(scanner.next_line().await.unwrap().is_none());
}

#[tokio::test]
async fn line_one_byte_over_max_fails() {
    let (reader, mut writer) = tokio::io::duplex(64);
    tokio::spawn(async move {
        writer.write_all(b"abcdefghi\n").await.unwrap();
    });

    let mut scanner = LineScanner::new(reader, 8);
    let err = scanner.next_line().await.unwrap_err();
    assert!(matches!(
        err,
        StreamReadError::LineTooLong {
            stream: StreamKind::Stdout,
            max: 8
        }
    ));
}

#[tokio::test]
async fn megabyte_line_survives_small_pipe_writes() {
    let (reader, mut writer) = tokio::io::duplex(4096);
    tokio::spawn(async move {
        let line = vec![b'x'; DEFAULT_MAX_LINE_BYTES];
        writer.write_all(&line).await.unwrap();
        writer.write_all(b"\nnext\n").await.unwrap();
    });

    let mut scanner = LineScanner::new(reader, DEFAULT_MAX_LINE_BYTES);
    let line = scanner.next_line().await.unwrap().unwrap();
    assert_eq!(line.len(), DEFAULT_MAX_LINE_BYTES);
    assert!(line.bytes().all(|b| b == b'x'));
    assert_eq!(scanner.next_line().await.unwrap().as_deref(), Some("next"));
}

#[tokio::test]
async fn final_line_without_newline_is_delivered() {
    let (reader, mut writer) = tokio::io::duplex(64);
    tokio::spawn(async move {
        writer.write_all(b"first\nlast").await.unwrap();
    });

    let mut scanner = LineScanner::new(reader, 64);
    assert_eq!(scanner.next_line().await.unwrap().as_deref(), Some("first"));
    assert_eq!(scanner.next_line().await.unwrap().as_deref(), Some("last"));
    assert!(scanner.next_line().await.unwrap().is_none());
}

#[tokio::test]
async fn empty_lines_are_returned_by_the_scanner() {
    // Dropping empty lines is the output worker's job, not the scanner's.
    let (reader, mut writer) = tokio::io::duplex(64);
    tokio::spawn(async move {
        writer.write_all(b"\nvalue\n").await.unwrap();
    });

    let mut scanner = LineScanner::new(reader, 64);
    assert_eq!(scanner.next_line().await.unwrap().as_deref(), Some(""));
    assert_eq!(scanner.next_line().await.unwrap().as_deref(), Some("value"));
}

#[tokio::test]
async fn invalid_utf8_line_is_a_read_error() {
    let (reader, mut writer) = tokio::io::duplex(64);
    tokio::spawn(async move {
        writer.write_all(b"\xff\xfe\n").await.unwrap();
    });

    let mut scanner = LineScanner::new(reader, 64);
    assert!(matches!(
        scanner.next_line().await.unwrap_err(),
        StreamReadError::Io { .. }
    ));
}

#[tokio::test]
async fn block_reader_returns_each_write_whole() {
    let (reader, mut writer) = tokio::io::duplex(4096);
    let (sent_tx, mut sent_rx) = tokio::sync::mpsc::channel::<()>(1);
    tokio::spawn(async move {
        writer
            .write_all(b"TypeError: x is undefined\n    at build (backend.js:12:5)\n    at main (backend.js:40:2)\n")
            .await
            .unwrap();
        sent_tx.send(()).await.unwrap();
    });

    sent_rx.recv().await.unwrap();
    let mut blocks = BlockReader::new(reader);
    let block = blocks.next_block().await.unwrap().unwrap();
    assert_eq!(block.lines().count(), 3);
    assert!(block.starts_with("TypeError: x is undefined"));
    assert!(block.ends_with("(backend.js:40:2)"));
    assert!(blocks.next_block().await.unwrap().is_none());
}
