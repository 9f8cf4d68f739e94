use std::{
    sync::atomic::{
        AtomicBool,
        Ordering,
    },
    sync::Arc,
    time::Duration,
};

use bytes::{
    Bytes,
    BytesMut,
};
use futures::{
    AsyncRead,
    AsyncReadExt,
    AsyncWrite,
    AsyncWriteExt,
};
use smol::lock::Mutex;

use codec::{
    tokio_codec::Decoder,
    Frame,
    FrameType,
    Mup1Codec,
};
use message::{
    coap,
    Request,
    Response,
};

use crate::{
    error::Error,
    events::{
        Event,
        EventHub,
        EventKind,
        Subscription,
    },
    util,
};

mod requests;

use requests::Requests;

#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Deadline for a confirmable CoAP exchange, and for the system
    /// commands that answer with a frame of their own.
    pub request_timeout: Duration,

    /// How long a ping waits for its pong.
    pub ping_timeout: Duration,

    /// Content-Format option value attached to request payloads. The
    /// firmware currently takes plain `application/cbor` (60) for CORECONF
    /// exchanges.
    pub content_format: u8,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            ping_timeout:    Duration::from_secs(1),
            content_format:  coap::CONTENT_FORMAT_CBOR,
        }
    }
}

/// One serial connection to a device: the write half, the outstanding
/// request table and the event fan-out.
///
/// All inbound traffic flows through [`Link::run`], which must be driven
/// on some executor for the lifetime of the connection. Writes are framed
/// and flushed under one lock so concurrent senders cannot interleave
/// partial frames on the wire.
pub struct Link<W> {
    writer:   Mutex<W>,
    requests: Requests,
    events:   EventHub,
    config:   LinkConfig,
    closed:   AtomicBool,
}

impl<W> Link<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(writer: W, config: LinkConfig) -> Self {
        Self {
            writer: Mutex::new(writer),
            requests: Requests::default(),
            events: EventHub::new(),
            config,
            closed: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn subscribe(&self, kind: EventKind) -> Subscription {
        self.events.subscribe(kind)
    }

    /// Encodes and writes one frame as a single logical write.
    pub async fn send_frame(&self, ty: FrameType, body: &[u8]) -> Result<(), Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::ConnectionClosed);
        }

        let mut buf = BytesMut::with_capacity(body.len() + 16);
        codec::encode_frame(ty, body, &mut buf);

        let mut writer = self.writer.lock().await;
        writer.write_all(&buf).await?;
        writer.flush().await?;

        Ok(())
    }

    /// Sends a confirmable CoAP request and waits for the matching
    /// response.
    ///
    /// The pending entry is registered before the frame is written, so a
    /// response racing back on the pump thread always finds its waiter. On
    /// any exit, matched, timed out or failed to write, the entry is gone.
    pub async fn request(&self, mut request: Request) -> Result<Option<Bytes>, Error> {
        request.content_format = self.config.content_format;

        let (mid, rx, _pending) = self.requests.register()?;
        let encoded = request.encode(mid);

        self.send_frame(FrameType::Coap, &encoded).await?;

        let reply = match util::timeout(self.config.request_timeout, rx.recv()).await {
            Some(Ok(reply)) => reply?,
            Some(Err(_closed)) => return Err(Error::ConnectionClosed),
            None => {
                tracing::debug!(mid, uri = %request.uri, "request deadline elapsed");
                return Err(Error::Timeout);
            },
        };

        match reply.class() {
            2 => Ok(reply.payload),
            4 | 5 => Err(Error::Response {
                code:    reply.code,
                reason:  coap::reason(reply.code),
                payload: reply.payload,
            }),
            _ => Err(Error::Protocol(coap::Error::BadCode(reply.code))),
        }
    }

    /// Drives the inbound half: reads raw chunks, reassembles frames and
    /// dispatches them until the stream ends or fails. Decode problems are
    /// logged and skipped by the codec; they never end the loop.
    #[tracing::instrument(skip_all, level = "debug")]
    pub async fn run(self: Arc<Self>, mut reader: impl AsyncRead + Unpin) {
        let mut mup1 = Mup1Codec;
        let mut buf = BytesMut::with_capacity(8192);
        let mut chunk = [0u8; 2048];

        self.events.publish(Event::status(true));

        loop {
            loop {
                match mup1.decode(&mut buf) {
                    Ok(Some(frame)) => self.dispatch(frame),
                    Ok(None) => break,
                    Err(err) => {
                        tracing::error!(error = %err, "frame extraction failed, dropping buffer");
                        buf.clear();
                        break;
                    },
                }
            }

            match reader.read(&mut chunk).await {
                Ok(0) => {
                    tracing::debug!("serial stream closed");
                    break;
                },
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                Err(err) => {
                    tracing::error!(error = %err, "serial read failed");
                    break;
                },
            }
        }

        self.shutdown();
    }

    /// Tears the link down: every outstanding request rejects and further
    /// sends are refused. Idempotent.
    pub fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.requests.drain();
            self.events.publish(Event::status(false));
        }
    }

    fn dispatch(&self, frame: Frame) {
        tracing::trace!(ty = ?frame.ty, len = frame.payload.len(), "frame");

        match frame.ty {
            FrameType::Ping => self.events.publish(Event::pong()),
            FrameType::Announce => self.events.publish(Event::announcement(frame.payload)),
            FrameType::Coap => self.complete_coap(&frame.payload),
            FrameType::System => self.events.publish(Event::system_response(frame.payload)),
            FrameType::Trace => self.events.publish(Event::trace(frame.payload)),
        }
    }

    fn complete_coap(&self, payload: &Bytes) {
        match Response::decode(payload) {
            Ok(response) => self.requests.complete(response),
            Err(err) => {
                tracing::warn!(error = %err, "dropping undecodable CoAP response");

                // salvage the mid so the waiter fails now instead of
                // timing out
                if let Some(header) = payload.get(2..4) {
                    let mid = u16::from_be_bytes([header[0], header[1]]);
                    self.requests.fail(mid, Error::Protocol(err));
                }
            },
        }
    }
}
