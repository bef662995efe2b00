use std::sync::OnceLock;

use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static PANIC_HOOK: OnceLock<()> = OnceLock::new();

/// Install the tracing subscriber and panic hook. Safe to call more than
/// once; subsequent calls are no-ops if a subscriber is already set.
pub fn init() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false));

    if subscriber.try_init().is_ok() {
        install_panic_hook();
    }

    Ok(())
}

fn install_panic_hook() {
    PANIC_HOOK.get_or_init(|| {
        let default_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if let Some(location) = info.location() {
                tracing::error!(
                    target: "panic",
                    file = location.file(),
                    line = location.line(),
                    message = %info
                );
            } else {
                tracing::error!(target: "panic", message = %info);
            }
            default_hook(info);
        }));
    });
}
