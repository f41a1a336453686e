use anyhow::{anyhow, Context, Result};
use tracing_subscriber::{
    filter::Directive, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Installs the global subscriber. `RUST_LOG` overrides `default_level`.
pub fn init(default_level: &str) -> Result<()> {
    let directive: Directive = default_level
        .parse()
        .with_context(|| format!("invalid log level `{default_level}`"))?;
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().compact().with_target(true).with_writer(std::io::stderr))
        .try_init()
        .map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))
}

