//! Serial port listing.

use anyhow::Result;
use console::style;
use sfproot::{NativePortEnumerator, PortEnumerator, PortInfo};

fn port_json(port: &PortInfo) -> serde_json::Value {
    serde_json::json!({
        "name": port.name,
        "vid": port.vid,
        "pid": port.pid,
        "manufacturer": port.manufacturer,
        "product": port.product,
    })
}

fn print_ports(ports: &[PortInfo]) {
    eprintln!("{}", style("Available serial ports:").bold().underlined());

    if ports.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
        return;
    }

    for port in ports {
        let vid_pid = if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
            format!(" ({vid:04X}:{pid:04X})")
        } else {
            String::new()
        };
        let product = port
            .product
            .as_deref()
            .map(|p| format!(" - {}", style(p).dim()))
            .unwrap_or_default();

        eprintln!(
            "  {} {}{vid_pid}{product}",
            style("•").green(),
            style(&port.name).cyan()
        );
    }
}

/// List ports command implementation.
///
/// JSON goes to stdout so it can be piped; the human listing goes to stderr.
pub(crate) fn cmd_list_ports(json: bool) -> Result<()> {
    let ports = NativePortEnumerator::list_ports()?;

    if json {
        let values: Vec<serde_json::Value> = ports
            .iter()
            .map(port_json)
            .collect();
        println!("{}", serde_json::to_string_pretty(&values)?);
    } else {
        print_ports(&ports);
    }
    Ok(())
}
