pub mod announce;
pub mod coap;
pub mod system;

pub use announce::DeviceInfo;
pub use coap::{
    Method,
    Request,
    Response,
};
pub use system::SystemCommand;
