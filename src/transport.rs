//! Abstraction over the async byte-stream transport (§2; the byte-level
//! serial driver itself is out of scope per §1 — this module wraps an
//! existing async serial crate and the link-event plumbing that turns
//! "transport has bytes for us" / "transport closed" / "transport errored"
//! into messages the engine task can react to).
//!
//! The reader half is generic over any `AsyncRead + AsyncWrite` stream
//! rather than hardcoded to [`SerialPort`], so the engine can be driven by
//! an in-memory [`tokio::io::duplex`] pair in tests and by a real serial
//! port in production, with identical scheduling logic either way.

use std::io;

use bytes::{Bytes, BytesMut};
use serial2_tokio::SerialPort;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::EngineOptions;

const READ_CHUNK_SIZE: usize = 256;

/// A link-level event handed from the transport reader task to the engine
/// task. Mirrors the `data`/`error`/`open`/`close` notifications the
/// original JavaScript `serialport`-backed transport emits.
#[derive(Debug)]
pub(crate) enum LinkEvent {
    Opened,
    Data(Bytes),
    Error(io::Error),
    Closed,
}

/// Opens the named serial port at the configured baud rate.
///
/// `options.lock` requests an exclusive OS-level lock on the port; the
/// underlying `serial2` transport already takes an exclusive lock on the
/// descriptor by default on platforms that support it, so there is no
/// further action to take here today. The flag is threaded through (rather
/// than silently ignored) so a future transport swap that defaults to
/// shared access has an explicit knob to honor.
pub(crate) fn open_serial(port_name: &str, options: &EngineOptions) -> io::Result<SerialPort> {
    let _ = options.lock;
    SerialPort::open(port_name, options.baud_rate)
}

/// Spawns the background task that reads inbound bytes from `reader` and
/// forwards [`LinkEvent`]s to the engine task.
///
/// The task exits, after emitting `Closed`, when a read returns `Ok(0)`;
/// after emitting `Error`, on an unrecoverable I/O error; or silently when
/// `events` closes because the engine task shut down.
pub(crate) fn spawn_reader<T>(
    mut reader: ReadHalf<T>,
    events: mpsc::UnboundedSender<LinkEvent>,
) -> JoinHandle<()>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    tokio::spawn(async move {
        let _ = events.send(LinkEvent::Opened);
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) => {
                    let _ = events.send(LinkEvent::Closed);
                    break;
                }
                Ok(n) => {
                    let mut buf = BytesMut::with_capacity(n);
                    buf.extend_from_slice(&chunk[..n]);
                    if events.send(LinkEvent::Data(buf.freeze())).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => {
                    let _ = events.send(LinkEvent::Error(e));
                    break;
                }
            }
        }
    })
}
