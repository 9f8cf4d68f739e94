//! Minimal CoAP (RFC 7252) requests and responses as exchanged with the
//! device inside MUP1 `C` frames.
//!
//! Requests are always confirmable with a zero-length token; responses are
//! correlated by message id alone. Only the three options the device cares
//! about are ever emitted: Uri-Path, Content-Format and Uri-Query.

use bytes::{
    BufMut,
    Bytes,
    BytesMut,
};

pub const URI_PATH: u16 = 11;
pub const CONTENT_FORMAT: u16 = 12;
pub const URI_QUERY: u16 = 15;

/// `application/cbor`. The device firmware accepts this in place of a
/// CORECONF-specific media type; keep it overridable.
pub const CONTENT_FORMAT_CBOR: u8 = 60;

pub const PAYLOAD_MARKER: u8 = 0xff;

// Extended option delta/length encoding thresholds (RFC 7252 §3.1).
const EXT8: u16 = 13;
const EXT16: u16 = 269;
const RESERVED: u8 = 15;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("message shorter than a CoAP header")]
    Truncated,

    #[error("unsupported CoAP version {0}")]
    BadVersion(u8),

    #[error("malformed option encoding")]
    BadOptions,

    #[error("response code {0:#04x} is not a response class")]
    BadCode(u8),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Method {
    Get    = 0x01,
    Post   = 0x02,
    Put    = 0x03,
    Delete = 0x04,
    Fetch  = 0x05,
}

/// A request bound for the device, encoded with [`Request::encode`] once a
/// message id has been allocated for it.
#[derive(Debug, Clone)]
pub struct Request {
    pub method:         Method,
    pub uri:            String,
    pub payload:        Option<Bytes>,
    pub content_format: u8,
}

impl Request {
    pub fn new(method: Method, uri: impl Into<String>, payload: Option<Bytes>) -> Self {
        Self {
            method,
            uri: uri.into(),
            payload: payload.filter(|p| !p.is_empty()),
            content_format: CONTENT_FORMAT_CBOR,
        }
    }

    pub fn encode(&self, mid: u16) -> Bytes {
        let mut dst = BytesMut::with_capacity(
            4 + self.uri.len() + self.payload.as_ref().map_or(0, |p| p.len() + 1) + 8,
        );

        // ver=1, type=CON, tkl=0
        dst.put_u8(0x40);
        dst.put_u8(self.method as u8);
        dst.put_u16(mid);

        let (path, query) = match self.uri.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (self.uri.as_str(), None),
        };

        let mut last = 0u16;

        for segment in path.split('/').filter(|s| !s.is_empty()) {
            push_option(&mut dst, &mut last, URI_PATH, segment.as_bytes());
        }

        if self.payload.is_some() {
            push_option(&mut dst, &mut last, CONTENT_FORMAT, &[self.content_format]);
        }

        for segment in query.iter().flat_map(|q| q.split('&')).filter(|s| !s.is_empty()) {
            push_option(&mut dst, &mut last, URI_QUERY, segment.as_bytes());
        }

        if let Some(payload) = &self.payload {
            dst.put_u8(PAYLOAD_MARKER);
            dst.extend_from_slice(payload);
        }

        dst.freeze()
    }
}

fn push_option(dst: &mut BytesMut, last: &mut u16, number: u16, value: &[u8]) {
    debug_assert!(number >= *last);

    let delta = number - *last;
    *last = number;

    let len = value.len() as u16;
    dst.put_u8((nibble(delta) << 4) | nibble(len));
    put_ext(dst, delta);
    put_ext(dst, len);
    dst.extend_from_slice(value);
}

fn nibble(v: u16) -> u8 {
    if v < EXT8 {
        v as u8
    } else if v < EXT16 {
        13
    } else {
        14
    }
}

fn put_ext(dst: &mut BytesMut, v: u16) {
    if v >= EXT16 {
        dst.put_u16(v - EXT16);
    } else if v >= EXT8 {
        dst.put_u8((v - EXT8) as u8);
    }
}

/// A response as received from the device. Options are validated while
/// walking to the payload marker but not retained; the payload stays
/// opaque CBOR for the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code:    u8,
    pub mid:     u16,
    pub payload: Option<Bytes>,
}

impl Response {
    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < 4 {
            return Err(Error::Truncated);
        }

        let ver = bytes[0] >> 6;
        if ver != 1 {
            return Err(Error::BadVersion(ver));
        }

        let tkl = usize::from(bytes[0] & 0x0f);
        let code = bytes[1];
        let mid = u16::from_be_bytes([bytes[2], bytes[3]]);

        let mut i = 4usize.checked_add(tkl).filter(|&i| i <= bytes.len()).ok_or(Error::BadOptions)?;

        while i < bytes.len() {
            let head = bytes[i];
            i += 1;

            if head == PAYLOAD_MARKER {
                if i == bytes.len() {
                    // a marker with nothing behind it is malformed
                    return Err(Error::BadOptions);
                }

                return Ok(Response {
                    code,
                    mid,
                    payload: Some(Bytes::copy_from_slice(&bytes[i..])),
                });
            }

            take_ext(bytes, &mut i, head >> 4)?;
            let len = take_ext(bytes, &mut i, head & 0x0f)?;

            i = i.checked_add(usize::from(len)).filter(|&i| i <= bytes.len()).ok_or(Error::BadOptions)?;
        }

        Ok(Response {
            code,
            mid,
            payload: None,
        })
    }

    #[inline]
    pub fn class(&self) -> u8 {
        self.code >> 5
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.class() == 2
    }
}

fn take_ext(bytes: &[u8], i: &mut usize, nib: u8) -> Result<u16, Error> {
    match nib {
        RESERVED => Err(Error::BadOptions),
        14 => {
            let ext = bytes.get(*i..*i + 2).ok_or(Error::BadOptions)?;
            *i += 2;
            Ok(u16::from_be_bytes([ext[0], ext[1]]).wrapping_add(EXT16))
        },
        13 => {
            let ext = *bytes.get(*i).ok_or(Error::BadOptions)?;
            *i += 1;
            Ok(u16::from(ext) + EXT8)
        },
        nib => Ok(u16::from(nib)),
    }
}

/// Textual reason for a response code, e.g. `0x84` -> "Not Found".
///
/// Part of the public surface: request errors carry these strings so a
/// failed exchange reads as `4.04 Not Found` rather than a bare number.
pub fn reason(code: u8) -> &'static str {
    match (code >> 5, code & 0x1f) {
        (2, 1) => "Created",
        (2, 2) => "Deleted",
        (2, 3) => "Valid",
        (2, 4) => "Changed",
        (2, 5) => "Content",

        (4, 0) => "Bad Request",
        (4, 1) => "Unauthorized",
        (4, 2) => "Bad Option",
        (4, 3) => "Forbidden",
        (4, 4) => "Not Found",
        (4, 5) => "Method Not Allowed",
        (4, 6) => "Not Acceptable",
        (4, 12) => "Precondition Failed",
        (4, 13) => "Request Entity Too Large",
        (4, 15) => "Unsupported Content-Format",

        (5, 0) => "Internal Server Error",
        (5, 1) => "Not Implemented",
        (5, 2) => "Bad Gateway",
        (5, 3) => "Service Unavailable",
        (5, 4) => "Gateway Timeout",
        (5, 5) => "Proxying Not Supported",

        _ => "Unknown",
    }
}

/// `0x84` -> `"4.04"`.
pub fn dotted(code: u8) -> String {
    format!("{}.{:02}", code >> 5, code & 0x1f)
}
