//! Tracing subscriber setup for the binary. Events go to stderr so that command
//! output on stdout stays machine-readable.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. The level comes from `RUST_LOG` (default
/// `info`); `json` switches to one JSON object per event.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    // A subscriber may already be installed (tests); keep it.
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
