mod app;
mod env_config;

use app::App;
use env_config::AppConfig;
use tracing_subscriber::{EnvFilter, fmt};

/// `RUST_LOG` wins; otherwise `info`. Logs go to stderr so they do not mix
/// with the prompts.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let config = AppConfig::from_env()?;
    let app = App::new(config)?;
    app.run()?;

    Ok(())
}
