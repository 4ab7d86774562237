//! Unit tests for the output chunk codec.

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::codec::Decoder;

use aidash_sandbox::models::output::StreamKind;
use aidash_sandbox::output::codec::{flush_idle, OutputCodec, MAX_PENDING_BYTES};
use aidash_sandbox::output::reader::pump_output;
use aidash_sandbox::output::sanitize;

fn decode_all(codec: &mut OutputCodec, buf: &mut BytesMut) -> String {
    let mut out = String::new();
    while let Some(chunk) = codec.decode(buf).expect("decode") {
        out.push_str(&chunk);
    }
    out
}

#[test]
fn complete_text_is_emitted_immediately() {
    let mut codec = OutputCodec::new();
    let mut buf = BytesMut::from("hello\n");
    assert_eq!(codec.decode(&mut buf).expect("decode"), Some("hello\n".to_owned()));
    assert!(buf.is_empty());
}

#[test]
fn escape_split_across_reads_is_held_back() {
    let mut codec = OutputCodec::new();
    let mut buf = BytesMut::from("ab\x1b[3");

    assert_eq!(decode_all(&mut codec, &mut buf), "ab");
    assert_eq!(&buf[..], b"\x1b[3");

    buf.extend_from_slice(b"1mred");
    let chunk = decode_all(&mut codec, &mut buf);
    assert_eq!(chunk, "\x1b[31mred");
    assert_eq!(sanitize(&chunk), "red");
}

#[test]
fn unterminated_osc_is_held_back() {
    let mut codec = OutputCodec::new();
    let mut buf = BytesMut::from("x\x1b]0;tit");
    assert_eq!(decode_all(&mut codec, &mut buf), "x");

    buf.extend_from_slice(b"le\x07y");
    assert_eq!(sanitize(&decode_all(&mut codec, &mut buf)), "y");
}

#[test]
fn utf8_character_split_across_reads_is_reassembled() {
    let mut codec = OutputCodec::new();
    let mut buf = BytesMut::from(&b"caf\xc3"[..]);
    assert_eq!(decode_all(&mut codec, &mut buf), "caf");

    buf.extend_from_slice(b"\xa9!");
    assert_eq!(decode_all(&mut codec, &mut buf), "\u{e9}!");
}

#[test]
fn trailing_carriage_return_waits_for_line_feed() {
    let mut codec = OutputCodec::new();
    let mut buf = BytesMut::from("line\r");
    assert_eq!(decode_all(&mut codec, &mut buf), "line");

    buf.extend_from_slice(b"\nnext");
    let chunk = decode_all(&mut codec, &mut buf);
    assert_eq!(sanitize(&chunk), "\nnext");
}

#[test]
fn bare_bracket_code_split_across_reads_is_held_back() {
    let mut codec = OutputCodec::new();
    let mut buf = BytesMut::from("done[2");
    assert_eq!(decode_all(&mut codec, &mut buf), "done");

    buf.extend_from_slice(b"K\n");
    assert_eq!(sanitize(&decode_all(&mut codec, &mut buf)), "\n");
}

#[test]
fn eof_flushes_pending_bytes() {
    let mut codec = OutputCodec::new();
    let mut buf = BytesMut::from("\x1b[");
    assert_eq!(codec.decode(&mut buf).expect("decode"), None);
    assert_eq!(
        codec.decode_eof(&mut buf).expect("decode_eof"),
        Some("\x1b[".to_owned())
    );
    assert_eq!(codec.decode_eof(&mut buf).expect("decode_eof"), None);
}

#[test]
fn runaway_sequence_is_flushed_at_limit() {
    let mut codec = OutputCodec::new();
    let mut raw = b"\x1b]".to_vec();
    raw.extend(std::iter::repeat(b'a').take(MAX_PENDING_BYTES));
    let mut buf = BytesMut::from(&raw[..]);

    let chunk = codec.decode(&mut buf).expect("decode").expect("flushed chunk");
    assert_eq!(chunk.len(), MAX_PENDING_BYTES + 2);
    assert!(buf.is_empty());
}

#[test]
fn eight_bit_csi_split_across_reads_is_held_back() {
    let mut codec = OutputCodec::new();
    let mut buf = BytesMut::from("ok\u{9b}3");
    assert_eq!(decode_all(&mut codec, &mut buf), "ok");
    assert_eq!(&buf[..], "\u{9b}3".as_bytes());

    buf.extend_from_slice(b"1mred");
    assert_eq!(sanitize(&decode_all(&mut codec, &mut buf)), "red");
}

#[test]
fn idle_flush_releases_trailing_bracket_prompt() {
    let mut codec = OutputCodec::new();
    let mut buf = BytesMut::from("Pick one [");
    assert_eq!(codec.decode(&mut buf).expect("decode"), None);

    assert_eq!(flush_idle(&mut buf), Some("Pick one [".to_owned()));
    assert!(buf.is_empty());
}

#[test]
fn idle_flush_keeps_unfinished_escape_buffered() {
    let mut buf = BytesMut::from("a\x1b[3");
    assert_eq!(flush_idle(&mut buf), Some("a".to_owned()));
    assert_eq!(&buf[..], b"\x1b[3");
    assert_eq!(flush_idle(&mut buf), None);
}

#[tokio::test]
async fn quiet_pipe_delivers_held_prompt() {
    let (mut writer, reader) = tokio::io::duplex(64);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let pump = tokio::spawn(pump_output(reader, StreamKind::Stdout, None, tx));

    writer.write_all(b"Pick one [").await.expect("write");
    let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("prompt released while pipe stays open")
        .expect("event");
    assert_eq!(event.data, "Pick one [");

    drop(writer);
    assert_eq!(pump.await.expect("pump task"), 1);
}
