use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::Registry;

use crate::args::GlobalArgs;

/// Log to stderr. `RUST_LOG` wins over the verbosity flags, and the flags win
/// over the `debug` setting.
pub fn init(args: &GlobalArgs, debug: bool) {
    let level = match (args.quiet, args.verbose) {
        (true, _) => "off",
        (false, 0) if debug => "debug",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .without_time()
        .with_filter(env_filter);

    Registry::default().with(stderr_layer).init();
}
