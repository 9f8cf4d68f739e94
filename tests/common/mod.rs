use std::sync::Once;

pub mod harness;

pub use harness::Harness;

static TRACE: Once = Once::new();

pub fn trace_init() {
    TRACE.call_once(velocityctl::trace::init);
}
