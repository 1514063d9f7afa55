use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ctxwatch::commands;
use ctxwatch::config::{Command, Config, Settings};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Config::parse_args();

    // Setup logging
    setup_logging(cli.debug);

    // Load settings: file, then environment, then CLI
    let mut settings = Settings::load(cli.config.as_ref())?;
    settings.merge_env()?;
    cli.merge_into(&mut settings);
    settings.validate();

    match cli.command {
        Command::Watch {
            session,
            transcript,
            ..
        } => commands::watch(&settings, &session, &transcript).await,
        Command::Status { session, json } => commands::status(&settings, &session, json),
        Command::Reset { session } => commands::reset(&settings, &session),
        Command::Scan { transcript, json } => commands::scan(&settings, &transcript, json),
    }
}

fn setup_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("ctxwatch=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ctxwatch=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}
