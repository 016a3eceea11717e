use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};

use buildify_voice::{
    CaptureSourceFactory, CaptureSourceKind, Config, NatsTransport, NatsTransportConfig,
    SessionConfig, SessionController, SessionState,
};

/// Live voice session runner: microphone in, synthesized audio back
#[derive(Parser, Debug)]
#[command(name = "buildify-voice", version, about)]
struct Args {
    /// Path to a config file (built-in defaults when omitted)
    #[arg(long)]
    config: Option<String>,

    /// NATS server URL override
    #[arg(long)]
    nats_url: Option<String>,

    /// Use the synthetic tone source instead of the microphone
    #[arg(long)]
    tone: bool,

    /// Stop automatically after this many seconds
    #[arg(long)]
    duration: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let cfg = match &args.config {
        Some(path) => {
            Config::load(path).with_context(|| format!("failed to load config from {path}"))?
        }
        None => Config::default(),
    };
    info!("{} v0.1.0", cfg.service.name);

    let session_config = SessionConfig {
        sample_rate: cfg.audio.sample_rate,
        frame_samples: cfg.audio.frame_samples,
        outbound_queue_frames: cfg.transport.outbound_queue_frames,
        ..SessionConfig::default()
    };

    let kind = if args.tone {
        CaptureSourceKind::Tone { hz: 440.0 }
    } else {
        CaptureSourceKind::Microphone
    };
    let capture = CaptureSourceFactory::create(kind, session_config.capture_config());

    let transport_config = NatsTransportConfig {
        url: args.nats_url.unwrap_or_else(|| cfg.transport.url.clone()),
        subject_prefix: cfg.transport.subject_prefix.clone(),
        outbound_capacity: session_config.outbound_queue_frames,
        ..NatsTransportConfig::default()
    };
    let transport = Arc::new(NatsTransport::new(transport_config));

    let controller = SessionController::new(capture, transport, session_config);
    let Some(mut playback) = controller.take_playback() else {
        anyhow::bail!("playback receiver already taken");
    };
    let mut volume = controller.volume();
    let mut state = controller.state();

    let handle = controller.start().await?;
    info!("session {} active (Ctrl-C to stop)", handle.id());

    tokio::spawn(async move {
        while let Some(chunk) = playback.recv().await {
            info!(
                "synthesized audio: {} samples at {} Hz",
                chunk.samples.len(),
                chunk.sample_rate
            );
        }
    });

    tokio::spawn(async move {
        while volume.changed().await.is_ok() {
            debug!("volume {:.2}", *volume.borrow());
        }
    });

    // Run until Ctrl-C, --duration, or the session ends on its own
    let wait = async {
        match args.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => {
                tokio::signal::ctrl_c().await?;
            }
        }
        Ok::<(), anyhow::Error>(())
    };
    tokio::select! {
        result = wait => result?,
        _ = state.wait_for(|s| *s == SessionState::Idle) => {
            warn!("session ended on its own");
        }
    }

    controller.stop().await;

    let stats = controller.stats();
    info!(
        "session complete: {:.1}s, {} frames captured, {} forwarded, {} dropped, {} chunks back",
        stats.duration_secs,
        stats.frames_captured,
        stats.frames_forwarded,
        stats.frames_dropped,
        stats.chunks_received
    );

    Ok(())
}
