use bytes::{
    Buf,
    BufMut,
    BytesMut,
};
use tokio_util::codec::{
    Decoder,
    Encoder,
};

use crate::{
    checksum,
    frame,
    frame::{
        Frame,
        FrameType,
        EOF,
        ESCAPE,
        SOF,
    },
};

/// SOF, type, EOF, padding EOF, four checksum characters.
pub const MIN_FRAME: usize = 8;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("frame too short ({len} bytes)")]
    ShortFrame { len: usize },

    #[error("expected SOF, got {byte:#04x}")]
    BadSOF { byte: u8 },

    #[error("unknown frame type {byte:#04x}")]
    UnknownType { byte: u8 },

    #[error("checksum field is not hex ASCII")]
    BadChecksumEncoding,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Encodes `payload` as one MUP1 frame appended to `dst`.
///
/// The padding EOF keeps the checksummed region 16-bit aligned; its
/// presence is decided by the parity of the frame up to and including the
/// first EOF, before the checksum characters are appended.
pub fn encode_frame(ty: FrameType, payload: &[u8], dst: &mut BytesMut) {
    let start = dst.len();

    dst.put_u8(SOF);
    dst.put_u8(ty.to_wire());

    for &b in payload {
        match frame::escaped(b) {
            Some(esc) => {
                dst.put_u8(ESCAPE);
                dst.put_u8(esc);
            },
            None => dst.put_u8(b),
        }
    }

    dst.put_u8(EOF);
    if (dst.len() - start) % 2 == 1 {
        dst.put_u8(EOF);
    }

    let ascii = checksum::checksum_ascii(&dst[start..]);
    dst.extend_from_slice(&ascii);
}

/// Decodes one complete frame.
///
/// A checksum mismatch does not fail the decode: the frame is returned
/// with `checksum_ok` unset and a warning is logged, so a flaky link stays
/// observable without stalling the stream.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, Error> {
    if bytes.len() < MIN_FRAME {
        return Err(Error::ShortFrame { len: bytes.len() });
    }

    if bytes[0] != SOF {
        return Err(Error::BadSOF { byte: bytes[0] });
    }

    let ty = FrameType::from_wire(bytes[1]).ok_or(Error::UnknownType { byte: bytes[1] })?;

    let mut payload = BytesMut::new();
    let mut i = 2;

    let eof = loop {
        let &b = bytes.get(i).ok_or(Error::ShortFrame { len: bytes.len() })?;

        match b {
            EOF => break i,
            ESCAPE => {
                let &esc = bytes.get(i + 1).ok_or(Error::ShortFrame { len: bytes.len() })?;
                payload.put_u8(frame::unescaped(esc));
                i += 2;
            },
            _ => {
                payload.put_u8(b);
                i += 1;
            },
        }
    };

    let last_eof = match bytes.get(eof + 1) {
        Some(&EOF) => eof + 1,
        _ => eof,
    };

    let declared = bytes
        .get(last_eof + 1..last_eof + 5)
        .ok_or(Error::ShortFrame { len: bytes.len() })?;
    let declared = checksum::parse_checksum(declared).ok_or(Error::BadChecksumEncoding)?;

    let computed = checksum::ones_complement(&bytes[..=last_eof]);
    let checksum_ok = declared == computed;

    if !checksum_ok {
        tracing::warn!(declared, computed, ty = ?ty, "frame checksum mismatch");
    }

    Ok(Frame {
        ty,
        payload: payload.freeze(),
        checksum_ok,
    })
}

/// Scans for the end of the frame starting at `buf[0]` (which must be the
/// SOF). An EOF that is the second byte of an escape pair is body, not a
/// terminator. `None` until the whole frame, padding and checksum
/// included, is buffered.
fn frame_end(buf: &[u8]) -> Option<usize> {
    let mut esc = false;
    let mut eof = None;

    for (i, &b) in buf.iter().enumerate().skip(2) {
        if esc {
            esc = false;
            continue;
        }

        match b {
            ESCAPE => esc = true,
            EOF => {
                eof = Some(i);
                break;
            },
            _ => {},
        }
    }

    let eof = eof?;
    let last_eof = match *buf.get(eof + 1)? {
        EOF => eof + 1,
        _ => eof,
    };

    (buf.len() >= last_eof + 5).then_some(last_eof + 5)
}

/// MUP1 framing over a raw byte stream.
///
/// The `Decoder` impl doubles as the reassembler: it tolerates partial
/// reads, discards garbage ahead of the first SOF and resynchronizes past
/// frames that fail to decode, so a framing error never stalls the stream.
#[derive(Debug, Clone, Default, Hash, PartialEq, Eq)]
pub struct Mup1Codec;

impl Encoder<Frame> for Mup1Codec {
    type Error = Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_frame(item.ty, &item.payload, dst);
        Ok(())
    }
}

impl Decoder for Mup1Codec {
    type Error = Error;
    type Item = Frame;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match src.iter().position(|&b| b == SOF) {
                Some(0) => {},
                Some(n) => src.advance(n),
                None => {
                    // Garbage with no frame start. A trailing escape byte
                    // could pair with the next chunk, everything else goes.
                    let keep = usize::from(src.last() == Some(&ESCAPE));
                    let junk = src.len() - keep;
                    src.advance(junk);

                    return Ok(None);
                },
            }

            let end = match frame_end(src) {
                Some(end) => end,
                None => return Ok(None),
            };

            match decode_frame(&src[..end]) {
                Ok(frame) => {
                    src.advance(end);
                    return Ok(Some(frame));
                },
                Err(err) => {
                    tracing::debug!(error = %err, "resynchronizing past bad frame");
                    src.advance(1);
                },
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let frame = self.decode(src)?;

        if frame.is_none() && !src.is_empty() {
            tracing::debug!(remaining = src.len(), "discarding partial frame at eof");
            src.clear();
        }

        Ok(frame)
    }
}

#[cfg(test)]
mod test {
    use bytes::Bytes;
    use futures::{
        SinkExt,
        StreamExt,
    };
    use proptest::prelude::*;
    use tokio_util::codec::{
        FramedRead,
        FramedWrite,
    };

    use super::*;

    fn encode_vec(ty: FrameType, payload: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_frame(ty, payload, &mut buf);
        buf.to_vec()
    }

    fn drain(codec: &mut Mup1Codec, buf: &mut BytesMut) -> Vec<Frame> {
        let mut out = vec![];
        while let Ok(Some(frame)) = codec.decode(buf) {
            out.push(frame);
        }
        out
    }

    #[tokio::test]
    async fn framed_roundtrip() {
        let mut writer = FramedWrite::new(vec![], Mup1Codec);

        writer.send(Frame::ping()).await.unwrap();
        writer.send(Frame::system(&b"save-config"[..])).await.unwrap();
        writer.send(Frame::coap(vec![0x40, 0x01, 0x00, 0x01])).await.unwrap();

        let wire = writer.into_inner();
        let mut reader = FramedRead::new(&wire[..], Mup1Codec);

        let ping = reader.next().await.unwrap().unwrap();
        assert_eq!(ping.ty, FrameType::Ping);
        assert!(ping.payload.is_empty());

        let system = reader.next().await.unwrap().unwrap();
        assert_eq!(system.ty, FrameType::System);
        assert_eq!(system.payload.as_ref(), b"save-config");

        let coap = reader.next().await.unwrap().unwrap();
        assert_eq!(coap.ty, FrameType::Coap);
        assert_eq!(coap.payload.as_ref(), &[0x40, 0x01, 0x00, 0x01]);

        assert!(reader.next().await.is_none());
    }

    #[test]
    fn ping_wire_bytes() {
        assert_eq!(
            encode_vec(FrameType::Ping, &[]),
            vec![0x3e, 0x50, 0x3c, 0x3c, 0x38, 0x35, 0x37, 0x33],
        );
    }

    #[test]
    fn padding_follows_pre_checksum_parity() {
        // SOF + type + 1 body byte + EOF = 4 bytes, even: single EOF
        let one = encode_vec(FrameType::System, b"i");
        assert_eq!(&one[..4], &[SOF, b'S', b'i', EOF]);
        assert_ne!(one[4], EOF);

        // SOF + type + 2 body bytes + EOF = 5 bytes, odd: padded
        let two = encode_vec(FrameType::System, b"in");
        assert_eq!(&two[..6], &[SOF, b'S', b'i', b'n', EOF, EOF]);
    }

    #[test]
    fn escapes_all_mapped_bytes() {
        let encoded = encode_vec(FrameType::Coap, &[0x00, 0xff, SOF, EOF, ESCAPE]);

        assert_eq!(
            &encoded[2..12],
            &[
                ESCAPE, b'0', ESCAPE, b'F', ESCAPE, b'>', ESCAPE, b'<', ESCAPE, ESCAPE
            ],
        );

        let frame = decode_frame(&encoded).unwrap();
        assert_eq!(frame.payload, Bytes::from_static(&[0x00, 0xff, SOF, EOF, ESCAPE]));
        assert!(frame.checksum_ok);
    }

    #[test]
    fn unknown_escape_passes_through() {
        // hand-build a frame body containing `\q`
        let mut raw = BytesMut::new();
        raw.extend_from_slice(&[SOF, b'T', ESCAPE, b'q', EOF, EOF]);
        let ascii = checksum::checksum_ascii(&raw);
        raw.extend_from_slice(&ascii);

        let frame = decode_frame(&raw).unwrap();
        assert_eq!(frame.payload.as_ref(), b"q");
        assert!(frame.checksum_ok);
    }

    #[test]
    fn checksum_mismatch_still_delivered() {
        let mut encoded = encode_vec(FrameType::Ping, &[]);
        let last = encoded.len() - 1;
        encoded[last] = b'4';

        let frame = decode_frame(&encoded).unwrap();
        assert_eq!(frame.ty, FrameType::Ping);
        assert!(!frame.checksum_ok);
    }

    #[test]
    fn rejects_short_and_bad_sof() {
        assert!(matches!(decode_frame(&[SOF, b'P', EOF]), Err(Error::ShortFrame { len: 3 })));
        assert!(matches!(
            decode_frame(&[0x00, b'P', EOF, EOF, b'0', b'0', b'0', b'0']),
            Err(Error::BadSOF { byte: 0x00 }),
        ));
    }

    #[test]
    fn rejects_bad_checksum_encoding() {
        let mut encoded = encode_vec(FrameType::Ping, &[]);
        let last = encoded.len() - 1;
        encoded[last] = b'x';

        assert!(matches!(decode_frame(&encoded), Err(Error::BadChecksumEncoding)));
    }

    #[test]
    fn reassembles_across_partial_reads() {
        let encoded = encode_vec(FrameType::Announce, b"VelocitySP-v1-LAN9662-x 1 2 3");

        let mut codec = Mup1Codec;
        let mut buf = BytesMut::new();

        for &b in &encoded[..encoded.len() - 1] {
            buf.put_u8(b);
            assert_eq!(codec.decode(&mut buf).unwrap(), None);
        }

        buf.put_u8(encoded[encoded.len() - 1]);
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.ty, FrameType::Announce);
        assert_eq!(frame.payload.as_ref(), b"VelocitySP-v1-LAN9662-x 1 2 3");
        assert!(buf.is_empty());
    }

    #[test]
    fn resynchronizes_past_unknown_type() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&encode_vec(FrameType::Ping, &[]));
        // corrupt the first frame's type
        buf[1] = b'Z';
        buf.extend_from_slice(&encode_vec(FrameType::System, b"success"));

        let frames = drain(&mut Mup1Codec, &mut buf);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].ty, FrameType::System);
        assert_eq!(frames[0].payload.as_ref(), b"success");
    }

    #[test]
    fn garbage_between_frames_is_skipped() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(b"\x01\x02boot noise\r\n");
        buf.extend_from_slice(&encode_vec(FrameType::Ping, &[]));
        buf.extend_from_slice(b"\xde\xad\xbe\xef");
        buf.extend_from_slice(&encode_vec(FrameType::Trace, b"hello"));

        let frames = drain(&mut Mup1Codec, &mut buf);
        assert_eq!(
            frames.iter().map(|f| f.ty).collect::<Vec<_>>(),
            vec![FrameType::Ping, FrameType::Trace],
        );
    }

    proptest! {
        #[test]
        fn roundtrip(payload in proptest::collection::vec(any::<u8>(), 0..512)) {
            let encoded = encode_vec(FrameType::Coap, &payload);
            let frame = decode_frame(&encoded).unwrap();

            prop_assert_eq!(frame.ty, FrameType::Coap);
            prop_assert_eq!(frame.payload.as_ref(), &payload[..]);
            prop_assert!(frame.checksum_ok);
        }

        #[test]
        fn escape_output_is_clean(payload in proptest::collection::vec(any::<u8>(), 0..256)) {
            let encoded = encode_vec(FrameType::Coap, &payload);

            // no raw SOF/EOF inside the escaped body except as pair tails
            let mut esc = false;
            for &b in &encoded[2..] {
                if esc {
                    esc = false;
                    continue;
                }
                match b {
                    ESCAPE => esc = true,
                    EOF => break,
                    _ => prop_assert_ne!(b, SOF),
                }
            }
            prop_assert!(!esc);
        }

        #[test]
        fn chunking_is_invisible(
            payloads in proptest::collection::vec(
                proptest::collection::vec(any::<u8>(), 0..64),
                1..8,
            ),
            chunk in 1usize..32,
        ) {
            let mut stream = BytesMut::new();
            for p in &payloads {
                encode_frame(FrameType::Coap, p, &mut stream);
            }
            let stream = stream.freeze();

            let mut whole = BytesMut::from(&stream[..]);
            let expect = drain(&mut Mup1Codec, &mut whole);

            let mut codec = Mup1Codec;
            let mut buf = BytesMut::new();
            let mut got = vec![];
            for piece in stream.chunks(chunk) {
                buf.extend_from_slice(piece);
                got.extend(drain(&mut codec, &mut buf));
            }

            prop_assert_eq!(got, expect);
            prop_assert!(buf.is_empty());
        }

        #[test]
        fn garbage_does_not_alter_frames(
            payloads in proptest::collection::vec(
                proptest::collection::vec(any::<u8>(), 0..64),
                1..5,
            ),
            junk in proptest::collection::vec(
                any::<u8>().prop_filter("non-SOF garbage", |&b| b != SOF && b != ESCAPE),
                0..32,
            ),
        ) {
            let mut buf = BytesMut::new();
            for p in &payloads {
                buf.extend_from_slice(&junk);
                encode_frame(FrameType::Coap, p, &mut buf);
            }

            let frames = drain(&mut Mup1Codec, &mut buf);
            prop_assert_eq!(frames.len(), payloads.len());
            for (frame, payload) in frames.iter().zip(&payloads) {
                prop_assert_eq!(frame.payload.as_ref(), &payload[..]);
            }
        }
    }
}
