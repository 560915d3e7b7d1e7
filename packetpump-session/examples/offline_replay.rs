//! Example: offline replay of a capture file
//!
//! Replays a .pcap file through the session engine with an optional filter
//! and prints a line per frame. The session closes itself when the file is
//! exhausted.
//!
//! Run with: cargo run --example offline_replay -- capture.pcap "tcp port 80"

use std::time::Duration;

use packetpump_session::{FrameBuffers, Session, SessionState};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let path = std::env::args()
        .nth(1)
        .ok_or("usage: offline_replay <file.pcap> [filter]")?;
    let filter = std::env::args().nth(2).unwrap_or_default();

    let buffers = FrameBuffers::new(65535)?;
    let reader = buffers.clone();

    let session = Session::new();
    let link = session.open_offline(&path, &filter, buffers, move || {
        reader.with_frame(|header, data| {
            println!("[{}.{:06}] {} bytes", header.ts_sec, header.ts_usec, data.len());
        });
    })?;

    println!("Replaying {} (link type: {})", path, link);

    while session.state() != SessionState::Closed {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    println!("Done.");
    Ok(())
}
