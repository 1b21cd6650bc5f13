use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use lumen_gateway::audio::{AudioCapture, PlaybackScheduler, pcm};
use lumen_gateway::{Config, Orchestrator};

/// Lumen - assistive vision gateway
#[derive(Parser)]
#[command(name = "lumen", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Read the text in an image file through the vision endpoint
    ReadImage {
        /// Path to a JPEG file
        path: std::path::PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,lumen_gateway=info",
        1 => "info,lumen_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestSpeaker => test_speaker().await,
            Command::ReadImage { path } => read_image(&path).await,
        };
    }

    let config = Config::load()?;
    tracing::info!(model = %config.live.model, "starting lumen gateway");

    let endpoint = Arc::new(config.live_endpoint()?);
    let mut orchestrator = Orchestrator::new(config, endpoint)?;

    // Ctrl-C shutdown signal
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(()).await;
        }
    });

    tracing::info!("lumen gateway ready - say \"lumen start\"");
    orchestrator.run(&mut shutdown_rx).await?;

    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let mut capture = AudioCapture::open(move |frame| {
        let _ = tx.send(frame);
    })?;

    println!("Sample rate: {} Hz", lumen_gateway::audio::INPUT_SAMPLE_RATE);
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let mut samples = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            samples.extend(pcm::decode(&frame));
        }

        let energy = calculate_rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    capture.close();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let mut playback = PlaybackScheduler::new()?;

    let sample_rate = lumen_gateway::audio::OUTPUT_SAMPLE_RATE;
    let frequency = 440.0_f32;
    let duration_secs = 2.0_f32;
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let num_samples = (sample_rate as f32 * duration_secs) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), sample_rate);
    playback.queue_samples(samples);
    playback.drain().await;
    playback.close();

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}

/// One-shot OCR against a file, exercising the read pipeline without a camera
async fn read_image(path: &std::path::Path) -> anyhow::Result<()> {
    let config = Config::load()?;
    let reader = config.text_reader()?;

    let jpeg = std::fs::read(path)?;
    println!("Reading text from {} ({} bytes)...", path.display(), jpeg.len());

    let text = reader.read_image(&jpeg).await;
    println!("---");
    println!("{text}");

    Ok(())
}
