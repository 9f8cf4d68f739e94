use std::time::Duration;

use bytes::BytesMut;
use futures::{
    AsyncReadExt,
    AsyncWriteExt,
};
use sluice::pipe::{
    pipe,
    PipeReader,
    PipeWriter,
};

use codec::{
    tokio_codec::Decoder,
    Frame,
    FrameType,
    Mup1Codec,
};
use velocityctl::{
    Controller,
    LinkConfig,
};

/// A controller wired to an in-memory device over sluice pipes. The test
/// plays the device through [`Device`]; the pump runs on the smol global
/// executor for the harness's lifetime.
pub struct Harness {
    pub controller: Controller<PipeWriter>,
    pub device:     Device,

    _pump: smol::Task<()>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(quick_config())
    }

    pub fn with_config(config: LinkConfig) -> Self {
        let (host_read, device_write) = pipe();
        let (device_read, host_write) = pipe();

        let (controller, pump) = Controller::with_config(host_read, host_write, config);

        Harness {
            controller,
            device: Device {
                reader: device_read,
                writer: device_write,
                buf: BytesMut::new(),
            },
            _pump: smol::spawn(pump),
        }
    }
}

/// Deadlines short enough that the timeout scenarios finish quickly.
pub fn quick_config() -> LinkConfig {
    LinkConfig {
        request_timeout: Duration::from_millis(250),
        ping_timeout: Duration::from_millis(250),
        ..LinkConfig::default()
    }
}

/// The device end of the pipes.
pub struct Device {
    pub reader: PipeReader,
    pub writer: PipeWriter,

    buf: BytesMut,
}

impl Device {
    /// Next frame the host sent.
    pub async fn next_frame(&mut self) -> Frame {
        let mut mup1 = Mup1Codec;
        let mut chunk = [0u8; 512];

        loop {
            if let Some(frame) = mup1.decode(&mut self.buf).unwrap() {
                return frame;
            }

            let n = self.reader.read(&mut chunk).await.unwrap();
            assert!(n > 0, "host closed the pipe");
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Exactly `n` raw bytes off the wire, for byte-level assertions.
    pub async fn read_raw(&mut self, n: usize) -> Vec<u8> {
        assert!(self.buf.is_empty(), "read_raw after buffered frame reads");

        let mut out = vec![0u8; n];
        self.reader.read_exact(&mut out).await.unwrap();
        out
    }

    pub async fn send_frame(&mut self, ty: FrameType, body: &[u8]) {
        let mut buf = BytesMut::new();
        codec::encode_frame(ty, body, &mut buf);
        self.send_raw(&buf).await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    /// Reads one CoAP request frame and hands back its (code, mid, raw
    /// payload) triple.
    pub async fn next_coap(&mut self) -> (u8, u16, bytes::Bytes) {
        let frame = self.next_frame().await;
        assert_eq!(frame.ty, FrameType::Coap);

        let parsed = message::Response::decode(&frame.payload).unwrap();
        (parsed.code, parsed.mid, frame.payload)
    }

    /// Sends a CoAP response frame with the given code and optional raw
    /// payload.
    pub async fn respond(&mut self, code: u8, mid: u16, payload: Option<&[u8]>) {
        let mut body = vec![0x60, code, (mid >> 8) as u8, mid as u8];

        if let Some(payload) = payload {
            body.push(0xff);
            body.extend_from_slice(payload);
        }

        self.send_frame(FrameType::Coap, &body).await;
    }
}
