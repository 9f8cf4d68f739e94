pub mod controller;
pub mod error;
pub mod events;
pub mod io;
mod macros;
pub mod serial;
pub mod trace;
pub mod util;

pub use controller::Controller;
pub use error::Error;
pub use events::{
    Event,
    EventKind,
    Subscription,
};
pub use io::{
    Link,
    LinkConfig,
};
pub use serial::connect_serial;
