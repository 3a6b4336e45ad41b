use crate::config::{ConfigSource, FileConfig, Settings};
use crate::coordinator::Coordinator;
use crate::ollama::{ModelInfo, OllamaClient};
use crate::relay::RequestId;
use anyhow::Context;
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Read a file, or stdin when `path` is `None` or `-`.
pub async fn read_input(path: Option<&Path>) -> anyhow::Result<String> {
    match path {
        Some(p) if p != Path::new("-") => tokio::fs::read_to_string(p)
            .await
            .with_context(|| format!("failed to read input: {}", p.display())),
        _ => {
            let mut s = String::new();
            tokio::io::stdin()
                .read_to_string(&mut s)
                .await
                .context("failed to read stdin")?;
            Ok(s)
        }
    }
}

/// Act as one UI surface: subscribe, start the request, print increments as
/// they arrive, then settle on the final result.
pub async fn run_generation(
    coordinator: &Coordinator,
    kind: &str,
    prompt: &str,
    context: &str,
) -> anyhow::Result<()> {
    if prompt.trim().is_empty() {
        anyhow::bail!("Nothing to send: the input is empty");
    }

    let request_id = RequestId::generate(kind);
    let (handle, mut rx) = coordinator.relay().subscribe_channel(request_id.clone());
    tracing::debug!(
        %request_id,
        observers = coordinator.relay().observer_count(&request_id),
        "subscribed"
    );

    let printer = tokio::spawn(async move {
        use std::io::Write;
        let mut printed = 0usize;
        while let Some(inc) = rx.recv().await {
            print!("{}", inc.text);
            std::io::stdout().flush().ok();
            printed += inc.text.len();
        }
        printed
    });

    let result = coordinator.generate(prompt, context, &request_id).await;
    // Drops the sender, so the printer finishes once it has drained.
    coordinator.relay().unsubscribe(&handle);
    let printed = printer.await.context("output task failed")?;

    match result {
        Ok(text) => {
            if printed != text.len() {
                tracing::debug!(printed, total = text.len(), "printed text differs from final text");
            }
            println!();
            Ok(())
        }
        Err(e) => {
            if printed > 0 {
                println!();
            }
            Err(anyhow::Error::new(e))
        }
    }
}

pub async fn cmd_models(http: &reqwest::Client, config: &FileConfig) -> anyhow::Result<()> {
    let settings = config.load()?;
    let client = OllamaClient::new(http.clone(), settings.server_url_or_default())?;
    let models = client.list_models().await?;

    if models.is_empty() {
        println!("(no models installed; try: ollama pull llama3.2)");
        return Ok(());
    }

    let selected = settings.selected_model.as_deref();
    for m in &models {
        println!("{}", model_row(m, selected));
    }
    if selected.is_none() {
        println!("(no model pinned; the first one is used)");
    }
    Ok(())
}

fn model_row(m: &ModelInfo, selected: Option<&str>) -> String {
    let marker = if selected.is_some_and(|s| m.matches(s)) { "*" } else { " " };
    format!("{marker} {}\t{}", m.display_name(), format_size(m.size))
}

pub fn cmd_use(path: &Path, model: Option<String>, server: Option<String>) -> anyhow::Result<()> {
    if model.is_none() && server.is_none() {
        anyhow::bail!("Nothing to change. Try: ollama-summarizer use <model> or --server <url>");
    }

    let mut settings = Settings::load_optional(path)?.unwrap_or_default();
    if let Some(m) = model {
        settings.selected_model = Some(m);
    }
    if let Some(s) = server {
        settings.server_url = Some(s);
    }
    settings.save_atomic(path)?;

    tracing::info!(path = %path.display(), ?settings, "saved settings");
    println!(
        "server: {}\nmodel:  {}",
        settings.server_url_or_default(),
        settings.selected_model.as_deref().unwrap_or("(first available)")
    );
    Ok(())
}

pub fn cmd_config(config: &FileConfig) -> anyhow::Result<()> {
    let settings = config.load()?;
    println!("# {}", config.path().display());
    println!("server_url = {:?}", settings.server_url_or_default());
    match &settings.selected_model {
        Some(m) => println!("selected_model = {m:?}"),
        None => println!("# selected_model unset; the first available model is used"),
    }
    Ok(())
}

fn format_size(bytes: u64) -> String {
    const GB: f64 = 1024.0 * 1024.0 * 1024.0;
    const MB: f64 = 1024.0 * 1024.0;
    let b = bytes as f64;
    if b >= GB {
        format!("{:.1} GB", b / GB)
    } else {
        format!("{:.0} MB", b / MB)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        assert_eq!(format_size(2_019_393_189), "1.9 GB");
        assert_eq!(format_size(50 * 1024 * 1024), "50 MB");
    }

    #[test]
    fn pinned_model_is_marked_without_latest_tag() {
        let m = ModelInfo { name: "llama3.2:latest".into(), size: 50 * 1024 * 1024 };
        assert_eq!(model_row(&m, Some("llama3.2")), "* llama3.2\t50 MB");
        assert_eq!(model_row(&m, Some("llama3.2:latest")), "* llama3.2\t50 MB");
        assert_eq!(model_row(&m, Some("phi3")), "  llama3.2\t50 MB");
        assert_eq!(model_row(&m, None), "  llama3.2\t50 MB");
    }

    #[test]
    fn use_writes_selection() {
        let dir = std::env::temp_dir().join(format!("ollama-summarizer-use-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.toml");

        cmd_use(&path, Some("phi3:latest".into()), None).unwrap();
        cmd_use(&path, None, Some("http://10.0.0.5:11434".into())).unwrap();

        let s = Settings::load_optional(&path).unwrap().unwrap();
        assert_eq!(s.selected_model.as_deref(), Some("phi3:latest"));
        assert_eq!(s.server_url.as_deref(), Some("http://10.0.0.5:11434"));
    }

    #[test]
    fn use_without_changes_is_an_error() {
        let dir = std::env::temp_dir();
        assert!(cmd_use(&dir.join("never-written.toml"), None, None).is_err());
    }

    #[tokio::test]
    async fn read_input_from_file() {
        let path = std::env::temp_dir().join(format!("ollama-summarizer-in-{}", uuid::Uuid::new_v4()));
        std::fs::write(&path, "page body").unwrap();
        assert_eq!(read_input(Some(path.as_path())).await.unwrap(), "page body");
    }
}
