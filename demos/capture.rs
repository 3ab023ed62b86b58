use std::env;
use std::time::{Duration, Instant};

use tracing_subscriber::EnvFilter;

use v4l_capture::{CaptureConfig, Engine};

fn main() -> v4l_capture::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Stream for 10 seconds by default
    let seconds = 10;

    let config = match env::args().nth(1) {
        Some(path) => CaptureConfig::load(path)?,
        None => CaptureConfig::default(),
    };
    println!("Using device: {}\n", config.device.display());

    let mut engine = Engine::open_and_init(&config)?;
    println!("Active format:\n{}", engine.format());
    if let Some(crop) = engine.negotiated().crop {
        println!("Crop: {}", crop);
    }

    let frames = engine.frame_channel();
    engine.start()?;

    let start = Instant::now();
    let mut report = Instant::now();
    let mut picked = 0u64;
    while start.elapsed() < Duration::from_secs(seconds) {
        if frames.recv_timeout(Duration::from_millis(100)).is_err() {
            continue;
        }
        if let Some(frame) = engine.get_new_buffer() {
            picked += 1;
            if picked == 1 {
                println!("Buffer");
                println!("  sequence  : {}", frame.meta().sequence);
                println!("  timestamp : {}", frame.meta().timestamp);
                println!("  flags     : {}", frame.meta().flags);
                println!("  length    : {}", frame.len());
            }
        }

        if report.elapsed() >= Duration::from_secs(1) {
            println!("{} | picked up: {}", engine.status(), picked);
            report = Instant::now();
        }
    }

    engine.stop();
    Ok(())
}
