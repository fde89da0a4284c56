//! Bridge module tests.

mod stream_test;

/// Verify all public bridge types are exported from the library.
#[test]
fn test_all_bridge_types_exported() {
    use stdio_bridge::bridge::{
        BlockReader, BridgeChannels, ChildProcessBridge, LineScanner, Liveness, SpawnError,
        StreamKind, StreamReadError, BLOCK_READ_CHUNK,
    };

    let _: fn(&str) -> Result<ChildProcessBridge, SpawnError> =
        |program| ChildProcessBridge::spawn(program, Vec::<String>::new());
    let _ = LineScanner::new(tokio::io::empty(), 16);
    let _ = BlockReader::new(tokio::io::empty());
    let _: fn(StreamKind) -> StreamReadError = |stream| StreamReadError::LineTooLong { stream, max: 1 };

    let (tx, _) = tokio::sync::mpsc::channel(1);
    let (_, out) = tokio::sync::mpsc::channel(1);
    let (_, err) = tokio::sync::mpsc::channel(1);
    let _ = BridgeChannels::new(tx, out, err);

    assert_eq!(Liveness::default(), Liveness::Starting);
    assert_eq!(BLOCK_READ_CHUNK, 64 * 1024);
}
