//! Example: list capture devices
//!
//! Run with: cargo run --example list_devices

use packetpump_session::device::list_devices;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    for device in list_devices()? {
        let kind = if device.is_loopback {
            "loopback"
        } else if device.is_up {
            "up"
        } else {
            "down"
        };

        println!("{:<16} [{}] {}", device.name, kind, device.description);
        for addr in &device.addresses {
            println!("    {}", addr);
        }
    }
    Ok(())
}
