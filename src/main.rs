use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::net::UdpSocket;
use tracing_subscriber::EnvFilter;

use hearth::config::ConfigOverrides;
use hearth::daemon::build_synthesizer;
use hearth::devices::DeviceType;
use hearth::protocol::{Ack, Frame};
use hearth::voice::{
    AudioCapture, AudioPlayback, CaptureBridge, Speaker, SpeechAudio, Synthesizer,
    utterance_capacity,
};
use hearth::{Config, Daemon};

/// How long `send` waits for an acknowledgment
const ACK_TIMEOUT: Duration = Duration::from_secs(2);

/// hearth - sensor concentrator and voice assistant
#[derive(Parser)]
#[command(name = "hearth", version, about)]
struct Cli {
    /// UDP port devices report to
    #[arg(long, env = "HEARTH_PORT")]
    port: Option<u16>,

    /// Address to bind the device listener to
    #[arg(long, env = "HEARTH_BIND")]
    bind: Option<IpAddr>,

    /// Assistant name used in responses
    #[arg(long, env = "HEARTH_NAME")]
    name: Option<String>,

    /// Language code for speech services (e.g. "en-US")
    #[arg(long, env = "HEARTH_LANGUAGE")]
    language: Option<String>,

    /// Config file (defaults to ~/.config/hearth/config.toml)
    #[arg(long, env = "HEARTH_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable voice features (for headless concentrators without audio hardware)
    #[arg(long, env = "HEARTH_DISABLE_VOICE")]
    disable_voice: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Test microphone input through the capture bridge
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
    /// Act as a sensor: send one frame and print the acknowledgment
    Send {
        /// Concentrator address (e.g. 127.0.0.1:20180)
        addr: SocketAddr,

        #[command(subcommand)]
        frame: SendFrame,
    },
}

#[derive(Subcommand)]
enum SendFrame {
    /// Register a device
    Register {
        /// Type code or label (e.g. 1 or "Temperature")
        #[arg(short = 't', long, value_parser = parse_device_type)]
        device_type: DeviceType,
        #[arg(short, long)]
        chip_id: u32,
    },
    /// Report a reading
    Update {
        /// Type code or label; must not be 0
        #[arg(short = 't', long, value_parser = parse_device_type)]
        device_type: DeviceType,
        #[arg(long, allow_negative_numbers = true)]
        value: f32,
    },
}

fn parse_device_type(s: &str) -> Result<DeviceType, String> {
    s.parse::<u8>()
        .map(DeviceType::from_code)
        .ok()
        .or_else(|| DeviceType::from_label(s))
        .ok_or_else(|| format!("unknown device type: {s}"))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,hearth=info",
        1 => "info,hearth=debug",
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
    let overrides = ConfigOverrides {
        config_path: cli.config,
        bind: cli.bind,
        port: cli.port,
        name: cli.name,
        language_code: cli.language,
        disable_voice: cli.disable_voice,
    };

    // Handle subcommands
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(&overrides, duration).await,
            Command::TestSpeaker => test_speaker().await,
            Command::TestTts { text } => test_tts(&overrides, text).await,
            Command::Send { addr, frame } => send_frame(addr, frame).await,
        };
    }

    // Load configuration
    let config = Config::load_with_options(&overrides)?;
    tracing::debug!(?config, "loaded configuration");

    tracing::info!(
        addr = %config.listener.addr(),
        voice = config.voice.enabled,
        "starting hearth"
    );

    // Run until interrupted
    Daemon::new(config)?.run().await?;

    Ok(())
}

/// Capture through the bridge and report what arrived
#[allow(clippy::future_not_send)]
async fn test_mic(overrides: &ConfigOverrides, duration: u64) -> anyhow::Result<()> {
    let config = Config::load_with_options(overrides)?;
    let sample_rate = config.voice.sample_rate;

    println!("Testing microphone for {duration} seconds at {sample_rate} Hz...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new(sample_rate)?;
    let bridge = CaptureBridge::new(config.voice.queue_frames);
    let capacity = utterance_capacity(sample_rate, duration.saturating_mul(1000));

    let utterance = bridge.capture_utterance(&mut capture, capacity).await?;

    let peak = utterance
        .samples()
        .map(|s| s.unsigned_abs())
        .max()
        .unwrap_or(0);
    #[allow(clippy::cast_precision_loss)]
    let rms = if utterance.is_empty() {
        0.0
    } else {
        let sum: f64 = utterance.samples().map(|s| f64::from(s).powi(2)).sum();
        (sum / (utterance.len() / 2) as f64).sqrt()
    };

    println!("Bytes received: {}", utterance.len());
    println!("Frames dropped: {}", bridge.dropped_frames());
    println!("RMS: {rms:.1} | Peak: {peak}");
    println!("\n---");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: arecord -l (to list devices)");

    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let playback = AudioPlayback::new()?;

    // Generate 2 seconds of 440Hz sine wave at 24kHz sample rate
    let sample_rate = 24_000_u32;
    let frequency = 440.0_f32;
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    let samples: Vec<i16> = (0..sample_rate * 2)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            // 30% volume
            ((2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 * f32::from(i16::MAX)) as i16
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), sample_rate);

    let audio = SpeechAudio {
        samples,
        sample_rate,
    };
    tokio::task::spawn_blocking(move || playback.play(&audio)).await??;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");

    Ok(())
}

/// Test TTS output
async fn test_tts(overrides: &ConfigOverrides, text: String) -> anyhow::Result<()> {
    let config = Config::load_with_options(overrides)?;
    let tts = build_synthesizer(&config)?;
    let playback = AudioPlayback::new()?;

    println!("Synthesizing: \"{text}\"");

    tokio::task::spawn_blocking(move || {
        let audio = tts.synthesize(&text)?;
        println!("Playing {} ms of audio...", audio.duration_ms());
        playback.play(&audio)
    })
    .await??;

    println!("Done!");
    Ok(())
}

/// Send one frame like a sensor would
async fn send_frame(addr: SocketAddr, frame: SendFrame) -> anyhow::Result<()> {
    let frame = match frame {
        SendFrame::Register {
            device_type,
            chip_id,
        } => Frame::Register {
            device_type,
            chip_id,
        },
        SendFrame::Update { device_type, value } => {
            anyhow::ensure!(
                device_type.code() != 0,
                "type 0 is the register discriminator and cannot carry a reading"
            );
            Frame::Update { device_type, value }
        }
    };

    let bind: SocketAddr = if addr.is_ipv4() {
        ([0, 0, 0, 0], 0).into()
    } else {
        ([0u16; 8], 0).into()
    };
    let socket = UdpSocket::bind(bind).await?;
    socket.send_to(&frame.encode(), addr).await?;
    println!("Sent {frame:?} to {addr}");

    let mut buf = [0u8; 16];
    match tokio::time::timeout(ACK_TIMEOUT, socket.recv_from(&mut buf)).await {
        Ok(received) => {
            let (len, _) = received?;
            match buf[..len] {
                [byte] => match Ack::from_byte(byte) {
                    Some(ack) => println!("Reply: {ack:?} (0x{byte:02X})"),
                    None => println!("Reply: unknown byte 0x{byte:02X}"),
                },
                _ => println!("Reply: {len} unexpected bytes"),
            }
        }
        Err(_) => println!("No reply within {} s", ACK_TIMEOUT.as_secs()),
    }

    Ok(())
}
