use anyhow::{Context, Result, bail};
use diary_movie::model::{Job, JobStatus, ProgressKind};
use diary_movie::{Config, ConnectionRegistry, Orchestrator, Services, init};
use std::io::Read;
use std::sync::Arc;

const USAGE: &str = "usage: diary-movie-cli <emotion> <style> <music> [diary text | - for stdin]";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 3 {
        bail!(USAGE);
    }
    let diary = match args.get(3..).map(|rest| rest.join(" ")) {
        Some(text) if !text.is_empty() && text != "-" => text,
        _ => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read diary from stdin")?;
            text
        }
    };

    let config = Config::from_env()?;
    init::ensure_directories(&config).await?;

    let registry = Arc::new(ConnectionRegistry::new());
    let orchestrator = Orchestrator::new(Services::from_config(&config, Arc::clone(&registry))?);

    let job_id = format!("cli-{}", chrono::Utc::now().format("%Y%m%d%H%M%S"));
    let mut progress = registry.subscribe(job_id.clone()).await;
    let job = Job::new(&job_id, diary, &args[0], &args[1], &args[2]);
    let handle = orchestrator.submit(job)?;

    let printer = tokio::spawn(async move {
        while let Some(event) = progress.recv().await {
            match event.kind {
                ProgressKind::Completed => {
                    if let Some(result) = event.result {
                        println!("[100%] {} ({})", result.title, result.genre);
                        println!("  video:     {}", result.video_url);
                        println!("  thumbnail: {}", result.thumbnail_url.unwrap_or_default());
                    }
                    break;
                }
                ProgressKind::Failed => {
                    println!("[FAILED] {}", event.status);
                    break;
                }
                ProgressKind::Progress => println!("[{:>3}%] {}", event.progress, event.status),
            }
        }
    });

    let outcome = handle.wait().await.context("Generation task panicked")?;
    let _ = printer.await;

    if outcome.status != JobStatus::Completed {
        bail!(
            "movie {} failed: {}",
            outcome.job_id,
            outcome.error.unwrap_or_default()
        );
    }
    Ok(())
}
