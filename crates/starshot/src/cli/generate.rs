//! The `starshot generate` command.

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use starshot_core::{Config, ImageInput, Phase, PredictionInput, ProgressEvent, Starshot};
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;

use super::download::save_outputs;

/// Arguments for the `generate` command.
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Text prompt for the model
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Photo to send as the model's image input
    #[arg(short, long)]
    pub image: Option<PathBuf>,

    /// Extra model input as KEY=VALUE (repeatable; JSON values keep their type)
    #[arg(long = "input", value_name = "KEY=VALUE")]
    pub inputs: Vec<String>,

    /// Model as owner/name (defaults to api.model)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Directory to save outputs into
    #[arg(short, long)]
    pub save: Option<PathBuf>,

    /// Call the API directly even if proxies are configured
    #[arg(long)]
    pub no_proxy: bool,

    /// Hide the progress bar
    #[arg(short, long)]
    pub quiet: bool,
}

/// Execute the generate command.
pub async fn execute(mut config: Config, args: GenerateArgs) -> anyhow::Result<()> {
    if args.no_proxy {
        config.proxy.enabled = false;
    }
    let input = build_input(&config, &args)?;
    let starshot = Starshot::new(config)?;
    let model = starshot.model(args.model.as_deref())?;

    tracing::info!("Generating with {model}");

    let mut events = starshot.progress().subscribe();
    let progress = if args.quiet {
        ProgressBar::hidden()
    } else {
        create_progress_bar()
    };
    let render = {
        let progress = progress.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let done = matches!(event.phase, Phase::Completed | Phase::Failed { .. });
                        render_event(&progress, &event);
                        if done {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!("Progress display skipped {skipped} events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    };

    let result = starshot.generate(&model, &input).await;
    let _ = render.await;
    progress.finish_and_clear();
    let prediction = result?;

    println!("{}", serde_json::to_string_pretty(&prediction)?);

    if let Some(dir) = &args.save {
        let saved = save_outputs(&reqwest::Client::new(), &prediction, dir).await?;
        eprintln!("Saved {} file(s) to {}", saved.len(), dir.display());
    }

    Ok(())
}

/// Assemble model input from the prompt, image, and `--input` pairs.
fn build_input(config: &Config, args: &GenerateArgs) -> anyhow::Result<PredictionInput> {
    let mut input = PredictionInput::new();

    if let Some(prompt) = &args.prompt {
        input.insert("prompt", prompt.as_str());
    }
    if let Some(path) = &args.image {
        let image = ImageInput::from_path(path).map_err(|e| {
            anyhow::anyhow!("Failed to read image {}: {e}", path.display())
        })?;
        input.insert_image(config.api.image_input_key.as_str(), &image);
    }
    for pair in &args.inputs {
        input.insert_pair(pair)?;
    }

    if input.is_empty() {
        anyhow::bail!(
            "No model input given.\n\n  Hint: pass --prompt, --image, or --input KEY=VALUE."
        );
    }
    Ok(input)
}

/// Create a percent-based progress bar for one generation.
fn create_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .unwrap()
            .progress_chars("##-"),
    );
    pb.set_message("starting...");
    pb
}

fn render_event(progress: &ProgressBar, event: &ProgressEvent) {
    progress.set_position(u64::from(event.percent));
    progress.set_message(describe(&event.phase));
}

/// One-line status text for a progress phase.
fn describe(phase: &Phase) -> String {
    match phase {
        Phase::Submitting => "submitting...".to_string(),
        Phase::Waiting { status } => format!("submitted ({status})"),
        Phase::Polling { elapsed_secs } => format!("generating... {elapsed_secs}s"),
        Phase::SlowWarning { elapsed_secs, .. } => {
            format!("still working after {elapsed_secs}s, hang tight")
        }
        Phase::Retrying {
            attempt,
            delay_ms,
            reason,
        } => format!(
            "retry {attempt} in {:.1}s: {reason}",
            *delay_ms as f64 / 1000.0
        ),
        Phase::Cancelling => "taking too long, cancelling...".to_string(),
        Phase::Completed => "done".to_string(),
        Phase::Failed { reason } => format!("failed: {reason}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use starshot_core::PredictionStatus;

    fn args() -> GenerateArgs {
        GenerateArgs {
            prompt: None,
            image: None,
            inputs: Vec::new(),
            model: None,
            save: None,
            no_proxy: false,
            quiet: true,
        }
    }

    #[test]
    fn test_build_input_requires_something() {
        let err = build_input(&Config::default(), &args()).unwrap_err();
        assert!(err.to_string().contains("No model input"));
    }

    #[test]
    fn test_build_input_with_image_and_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let photo = dir.path().join("me.png");
        std::fs::write(&photo, b"fake png bytes").unwrap();

        let mut args = args();
        args.prompt = Some("with a star".into());
        args.image = Some(photo);
        args.inputs = vec!["aspect_ratio=1:1".into(), "seed=7".into()];

        let config = Config::default();
        let input = build_input(&config, &args).unwrap();

        assert_eq!(*input.get("prompt").unwrap(), "with a star");
        assert_eq!(*input.get("seed").unwrap(), 7);
        let image = input
            .get(&config.api.image_input_key)
            .and_then(|v| v.as_str())
            .unwrap();
        assert!(image.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_build_input_missing_image() {
        let mut args = args();
        args.image = Some(PathBuf::from("/definitely/not/here.jpg"));
        let err = build_input(&Config::default(), &args).unwrap_err();
        assert!(err.to_string().contains("Failed to read image"));
    }

    #[test]
    fn test_describe_phases() {
        assert_eq!(
            describe(&Phase::Waiting {
                status: PredictionStatus::Starting
            }),
            "submitted (starting)"
        );
        assert_eq!(
            describe(&Phase::Retrying {
                attempt: 1,
                delay_ms: 2000,
                reason: "HTTP 503: overloaded".into()
            }),
            "retry 1 in 2.0s: HTTP 503: overloaded"
        );
    }
}
