//! Audio output device listing.

use bounce_io::list_output_devices;
use clap::Args;

#[derive(Args)]
pub struct DevicesArgs {}

pub fn run(_args: DevicesArgs) -> anyhow::Result<()> {
    let devices = list_output_devices()?;

    if devices.is_empty() {
        println!("No output devices found.");
        return Ok(());
    }

    println!("Output Devices");
    println!("==============\n");
    for (idx, device) in devices.iter().enumerate() {
        let default = if device.is_default { " (default)" } else { "" };
        println!(
            "  [{}] {} ({} Hz, {} ch){}",
            idx, device.name, device.default_sample_rate, device.default_channels, default
        );
    }
    println!();
    println!("Tip: Render to a device by partial name:");
    println!("  bounce render --device --device-name \"USB\" --duration 2");

    Ok(())
}
