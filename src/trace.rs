use std::str::FromStr;

use tracing_subscriber::{
    prelude::*,
    EnvFilter,
};

pub fn init() {
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let _ = tracing_subscriber::registry()
        .with(mk_level_filter())
        .with(stderr_layer)
        .try_init();
}

fn mk_level_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let default_str = {
            cfg_if::cfg_if! {
                if #[cfg(not(debug_assertions))] {
                    "warn,velocityctl=info"
                } else {
                    "info,velocityctl=debug"
                }
            }
        };

        EnvFilter::from_str(default_str).expect("parsing envfilter default string")
    })
}
