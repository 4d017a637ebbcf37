//! The `starshot status` and `starshot cancel` commands.

use clap::Args;
use starshot_core::{Config, Starshot};

/// Arguments naming a single prediction.
#[derive(Args, Debug)]
pub struct PredictionArgs {
    /// Prediction id
    pub id: String,

    /// Call the API directly even if proxies are configured
    #[arg(long)]
    pub no_proxy: bool,
}

fn connect(mut config: Config, args: &PredictionArgs) -> anyhow::Result<Starshot> {
    if args.no_proxy {
        config.proxy.enabled = false;
    }
    Ok(Starshot::new(config)?)
}

/// Print the current state of a prediction as JSON.
pub async fn status(config: Config, args: PredictionArgs) -> anyhow::Result<()> {
    let starshot = connect(config, &args)?;
    let prediction = starshot.status(&args.id).await?;

    tracing::debug!("Prediction {} is {}", prediction.id, prediction.status);
    println!("{}", serde_json::to_string_pretty(&prediction)?);
    Ok(())
}

/// Ask the API to stop a prediction.
pub async fn cancel(config: Config, args: PredictionArgs) -> anyhow::Result<()> {
    let starshot = connect(config, &args)?;
    starshot.cancel(&args.id).await?;

    tracing::info!("Cancel requested for prediction {}", args.id);
    println!("Cancel requested for {}", args.id);
    Ok(())
}
