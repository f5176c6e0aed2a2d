pub mod api;
pub mod core;
pub mod pipeline;

use std::sync::Once;

static LOGGING: Once = Once::new();

/// Install the platform logger. Later calls are no-ops.
pub fn init_logging() {
    LOGGING.call_once(|| {
        #[cfg(target_os = "android")]
        {
            android_logger::init_once(
                android_logger::Config::default()
                    .with_max_level(log::LevelFilter::Debug)
                    .with_tag("mad_video"),
            );
        }

        #[cfg(not(target_os = "android"))]
        {
            // RUST_LOG wins; otherwise info and above
            let _ = env_logger::Builder::from_env(
                env_logger::Env::default().default_filter_or("info"),
            )
            .try_init();
        }
    });
}
