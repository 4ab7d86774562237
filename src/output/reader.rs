//! Output pump task.
//!
//! Reads one child pipe through [`OutputCodec`], sanitizes each chunk and
//! forwards it as an [`OutputEvent`] through an unbounded [`mpsc`] channel.
//! The pipe is always drained to EOF: once the receiving side is dropped
//! the pump keeps reading and discards, so an unsubscribed child never
//! blocks on a full pipe. When the pipe goes quiet with text still held
//! back as a possible bracket code, it is released after [`IDLE_FLUSH`].

use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::codec::FramedRead;
use tracing::{debug, warn};

use crate::models::output::{OutputEvent, StreamKind};
use crate::models::session::SessionId;
use crate::output::codec::{flush_idle, OutputCodec};
use crate::output::sanitizer::sanitize;

/// Quiet period after which held-back text is released.
pub const IDLE_FLUSH: Duration = Duration::from_millis(100);

/// Drain `source` to EOF, emitting sanitized chunks on `event_tx`.
///
/// Returns the number of events delivered before the receiver went away.
pub async fn pump_output<R>(
    source: R,
    stream: StreamKind,
    session_id: Option<SessionId>,
    event_tx: mpsc::UnboundedSender<OutputEvent>,
) -> usize
where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(source, OutputCodec::new());
    let mut delivered = 0usize;
    let mut subscribed = true;

    loop {
        let item = if framed.read_buffer().is_empty() {
            framed.next().await
        } else {
            match timeout(IDLE_FLUSH, framed.next()).await {
                Ok(item) => item,
                Err(_) => {
                    if let Some(raw) = flush_idle(framed.read_buffer_mut()) {
                        if subscribed {
                            subscribed = forward(
                                &event_tx,
                                session_id.as_ref(),
                                stream,
                                &raw,
                                &mut delivered,
                            );
                        }
                    }
                    continue;
                }
            }
        };

        match item {
            Some(Ok(raw)) => {
                if subscribed {
                    subscribed =
                        forward(&event_tx, session_id.as_ref(), stream, &raw, &mut delivered);
                }
            }
            Some(Err(err)) => {
                warn!(?session_id, %stream, %err, "output pipe read failed, stopping");
                break;
            }
            None => break,
        }
    }

    debug!(?session_id, %stream, delivered, "output pipe closed");
    delivered
}

/// Sanitize `raw` and send it; false once the receiver is gone.
fn forward(
    event_tx: &mpsc::UnboundedSender<OutputEvent>,
    session_id: Option<&SessionId>,
    stream: StreamKind,
    raw: &str,
    delivered: &mut usize,
) -> bool {
    let data = sanitize(raw);
    if data.is_empty() {
        return true;
    }
    let event = OutputEvent::new(session_id.cloned(), stream, data);
    if event_tx.send(event).is_err() {
        debug!(?session_id, %stream, "output receiver dropped, draining pipe");
        return false;
    }
    *delivered += 1;
    true
}
