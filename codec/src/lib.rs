pub use ::tokio_util::codec as tokio_codec;

mod checksum;
mod frame;
mod mup1;

pub use self::{
    checksum::*,
    frame::*,
    mup1::*,
};
