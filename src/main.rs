use anyhow::{Context, Result};
use clap::Parser;
use consult_live::assistant::{ConversationalSession, NatsAssistantLink};
use consult_live::audio::AudioCaptureEngine;
use consult_live::live::LiveAudioService;
use consult_live::summarize::SummaryClient;
use consult_live::transcribe::{NatsTranscriberLink, TranscriptionChannel};
use consult_live::{create_router, AppState, Config};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser)]
#[command(name = "consult-live")]
#[command(about = "Live consultation assistant core")]
struct Args {
    /// Config file path, without extension
    #[arg(short, long, default_value = "config/consult-live")]
    config: String,

    /// Override the NATS server URL from the config file
    #[arg(long)]
    nats_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let mut cfg = Config::load(&args.config)?;
    if let Some(url) = args.nats_url {
        cfg.nats.url = url;
    }

    info!("{} starting", cfg.service.name);

    let nats = async_nats::connect(&cfg.nats.url)
        .await
        .with_context(|| format!("Failed to connect to NATS at {}", cfg.nats.url))?;
    info!("Connected to NATS at {}", cfg.nats.url);

    let session_id = format!("live-{}", uuid::Uuid::new_v4());

    let transcriber = Arc::new(NatsTranscriberLink::new(
        nats.clone(),
        session_id.clone(),
        &cfg.transcription,
        cfg.audio.sample_rate,
    ));
    let assistant = Arc::new(NatsAssistantLink::new(
        nats.clone(),
        session_id.clone(),
        &cfg.assistant,
    ));

    let mut live = LiveAudioService::new(
        TranscriptionChannel::new(transcriber),
        ConversationalSession::new(assistant),
        &cfg.live,
    );
    if cfg.audio.capture {
        live = live.with_capture(AudioCaptureEngine::from_config(&cfg.audio));
    }

    let summarizer =
        SummaryClient::from_config(&cfg.summarizer).context("Summarizer initialization failed")?;

    let state = AppState::new(Arc::new(live), Arc::new(summarizer));
    let app = create_router(state.clone());

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    // Release devices and close streams before exiting
    state.live.stop().await;

    Ok(())
}
