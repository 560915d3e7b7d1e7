//! Example: live capture session
//!
//! Opens a live session on the given device (default "lo"), prints every
//! delivered frame for ten seconds, then closes the session.
//! Note: Requires root/administrator privileges to run.
//!
//! Run with: sudo cargo run --example live_capture -- eth0

use std::time::Duration;

use packetpump_session::{FrameBuffers, LiveOptions, Session};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let device = std::env::args().nth(1).unwrap_or_else(|| "lo".to_string());

    let buffers = FrameBuffers::new(65535)?;
    let reader = buffers.clone();

    let session = Session::new();
    let link = session.open_live(
        &device,
        LiveOptions {
            filter: "tcp or udp".to_string(),
            ..Default::default()
        },
        buffers,
        move || {
            let capacity = reader.capacity();
            reader.with_frame(|header, data| {
                let marker = if header.is_truncated(capacity) { " (truncated)" } else { "" };
                println!(
                    "[{}.{:06}] {} bytes on the wire, {} captured{}",
                    header.ts_sec, header.ts_usec, header.original_len, data.len(), marker
                );
            });
        },
        Some(Box::new(|message: &str| {
            eprintln!("warning: {}", message);
        })),
    )?;

    println!("Listening on {}, link type: {}", device, link);

    tokio::time::sleep(Duration::from_secs(10)).await;

    if let Ok(stats) = session.stats() {
        println!(
            "received: {}, dropped by kernel: {}, dropped by interface: {}",
            stats.received, stats.dropped_by_kernel, stats.dropped_by_interface
        );
    }

    session.close();
    Ok(())
}
