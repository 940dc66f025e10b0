//! ML Workbench - Main Entry Point

use clap::Parser;
use mlworkbench::cli::{cmd_evaluate, cmd_predict, cmd_serve, cmd_train, Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mlworkbench=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Train { data, target, features, preset, time_limit, separator, output }) => {
            cmd_train(&data, &target, features.as_deref(), &preset, time_limit, &separator, &output)?;
        }
        Some(Commands::Evaluate { model, data, separator }) => {
            cmd_evaluate(&model, &data, &separator)?;
        }
        Some(Commands::Predict { model, data, output, separator }) => {
            cmd_predict(&model, &data, output.as_deref(), &separator)?;
        }
        Some(Commands::Serve { port, host, media_root }) => {
            cmd_serve(host, port, media_root).await?;
        }
        None => {
            cmd_serve(None, None, None).await?;
        }
    }

    Ok(())
}
