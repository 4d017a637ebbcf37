//! Saving prediction outputs to disk.

use futures_util::StreamExt;
use starshot_core::Prediction;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

const DEFAULT_EXTENSION: &str = "png";

/// Download every output URL of `prediction` into `dir`.
///
/// Files are named `<id>-<index>.<ext>`. Returns the written paths in output
/// order.
pub async fn save_outputs(
    client: &reqwest::Client,
    prediction: &Prediction,
    dir: &Path,
) -> anyhow::Result<Vec<PathBuf>> {
    let Some(output) = &prediction.output else {
        return Ok(Vec::new());
    };

    tokio::fs::create_dir_all(dir).await?;

    let mut saved = Vec::new();
    for (index, url) in output.urls().into_iter().enumerate() {
        let dest = dir.join(output_file_name(&prediction.id, index, url));
        download(client, url, &dest).await?;
        tracing::info!("Saved {}", dest.display());
        saved.push(dest);
    }
    Ok(saved)
}

/// Stream one URL to `dest`.
async fn download(client: &reqwest::Client, url: &str, dest: &Path) -> anyhow::Result<()> {
    let response = client.get(url).send().await?.error_for_status()?;
    let mut stream = response.bytes_stream();
    let mut file = tokio::fs::File::create(dest).await?;

    while let Some(chunk) = stream.next().await {
        file.write_all(&chunk?).await?;
    }
    file.flush().await?;
    Ok(())
}

fn output_file_name(id: &str, index: usize, url: &str) -> String {
    format!("{id}-{index}.{}", extension_of(url))
}

/// File extension from the URL path, or `png`.
fn extension_of(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| {
            let last = u.path_segments()?.next_back()?.to_string();
            let (_, ext) = last.rsplit_once('.')?;
            let valid = !ext.is_empty()
                && ext.len() <= 5
                && ext.chars().all(|c| c.is_ascii_alphanumeric());
            valid.then(|| ext.to_ascii_lowercase())
        })
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use starshot_core::PredictionStatus;

    #[test]
    fn test_output_file_name() {
        assert_eq!(
            output_file_name("abc", 0, "https://replicate.delivery/x/out-0.webp"),
            "abc-0.webp"
        );
        assert_eq!(
            output_file_name("abc", 2, "https://replicate.delivery/x/OUT.JPG?sig=1"),
            "abc-2.jpg"
        );
    }

    #[test]
    fn test_extension_defaults_to_png() {
        assert_eq!(extension_of("https://cdn.example/render"), "png");
        assert_eq!(extension_of("https://cdn.example/"), "png");
        assert_eq!(extension_of("https://cdn.example/a.tar-gz!"), "png");
        assert_eq!(extension_of("not a url"), "png");
    }

    #[tokio::test]
    async fn test_no_output_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out");
        let prediction = Prediction {
            id: "p1".into(),
            status: PredictionStatus::Failed,
            output: None,
            error: Some("boom".into()),
            created_at: None,
            logs: None,
        };

        let saved = save_outputs(&reqwest::Client::new(), &prediction, &target)
            .await
            .unwrap();

        assert!(saved.is_empty());
        assert!(!target.exists());
    }
}
