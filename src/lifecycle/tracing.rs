//! # Observability & Tracing
//!
//! [`setup_tracing`] installs a compact `fmt` subscriber. The filter comes from `RUST_LOG`
//! when it is set, otherwise from the configured `log_filter`.
//!
//! ```bash
//! # Lifecycle only: creations, releases, group dispatch, events
//! RUST_LOG=info cargo run
//!
//! # Every dispatch, hook and transition
//! RUST_LOG=debug cargo run
//!
//! # Only the framework
//! RUST_LOG=testbed_control::framework=debug cargo run
//! ```
//!
//! Log lines carry structured fields rather than prose, so they can be filtered:
//!
//! ```text
//! INFO Created resource="engine-1" type_name="engine" parent=Some("garage-1")
//! INFO Group dispatch group="Couple" batch=batch-1 members=2 operation=configure property="exec"
//! WARN Member failed group="Couple" resource="res1" property="exec" error=unreachable
//! INFO Event fired event="ENGINE_OVERHEAT" callbacks=1
//! ```

use tracing_subscriber::EnvFilter;

pub fn setup_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
