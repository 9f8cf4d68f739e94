use bytes::Bytes;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("timed out waiting for the device")]
    Timeout,

    #[error("device answered {} {reason}", message::coap::dotted(*.code))]
    Response {
        code:    u8,
        reason:  &'static str,
        payload: Option<Bytes>,
    },

    #[error("protocol violation: {0}")]
    Protocol(#[from] message::coap::Error),

    #[error("message-id space exhausted")]
    TooManyInFlight,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("system command refused: {reply:?}")]
    CommandFailed { reply: String },

    #[error(transparent)]
    Cbor(#[from] minicbor::encode::Error<std::convert::Infallible>),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
