use std::sync::Once;

use location_core::testing::{GeoScript, Shell};
use location_core::Event;

static TRACING: Once = Once::new();

/// Honours `RUST_LOG`; quiet by default.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A started shell over an empty memory store.
#[allow(dead_code)]
pub fn shell(geo: GeoScript) -> Shell {
    init_tracing();
    let mut shell = Shell::new(geo);
    shell.dispatch(Event::Started);
    shell
}
