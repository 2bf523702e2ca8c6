//! Interactive serial port selection.
//!
//! Supports:
//! - An explicit `--port` or the port from the config file
//! - Preferring common USB-UART bridges over other ports
//! - Interactive selection via dialoguer
//! - Non-interactive mode for scripts

use {
    crate::{CliError, config::Config},
    anyhow::Result,
    console::style,
    dialoguer::{Confirm, Error as DialoguerError, Select, theme::ColorfulTheme},
    log::{debug, info},
    sfproot::{NativePortEnumerator, PortEnumerator, PortInfo},
    std::{cmp::Ordering, io::IsTerminal},
};

/// USB-UART bridges usually found on SFP serial adapters.
const USB_SERIAL_BRIDGES: &[(u16, u16, &str)] = &[
    (0x1A86, 0x7523, "CH340"),
    (0x1A86, 0x55D4, "CH9102"),
    (0x10C4, 0xEA60, "CP210x"),
    (0x0403, 0x6001, "FT232R"),
    (0x0403, 0x6015, "FT231X"),
    (0x067B, 0x2303, "PL2303"),
];

/// Options for serial port selection.
#[derive(Debug, Clone, Default)]
pub struct SerialOptions {
    /// Explicit port specified via CLI.
    pub port: Option<String>,
    /// Non-interactive mode (fail if the choice is ambiguous).
    pub non_interactive: bool,
}

fn usage_err(message: &str) -> anyhow::Error {
    CliError::Usage(message.to_string()).into()
}

/// Name of the USB-UART bridge behind `port`, if it is a known one.
fn bridge_name(port: &PortInfo) -> Option<&'static str> {
    let (vid, pid) = (port.vid?, port.pid?);
    USB_SERIAL_BRIDGES
        .iter()
        .find(|(v, p, _)| *v == vid && *p == pid)
        .map(|(_, _, name)| *name)
}

/// Ports worth offering: known bridges if there are any, else everything.
fn candidate_ports(ports: Vec<PortInfo>) -> Vec<PortInfo> {
    let bridges: Vec<PortInfo> = ports
        .iter()
        .filter(|p| bridge_name(p).is_some())
        .cloned()
        .collect();
    if bridges.is_empty() { ports } else { bridges }
}

fn select_non_interactive_port(candidates: Vec<PortInfo>) -> Result<String> {
    match candidates
        .len()
        .cmp(&1)
    {
        Ordering::Equal => candidates
            .into_iter()
            .next()
            .map(|p| p.name)
            .ok_or_else(|| usage_err("no serial ports available")),
        Ordering::Greater => Err(usage_err(
            "multiple serial ports found; pass --port in non-interactive mode",
        )),
        Ordering::Less => Err(usage_err("no serial ports available")),
    }
}

/// Select a serial port interactively or automatically.
pub fn select_serial_port(options: &SerialOptions, config: &Config) -> Result<String> {
    select_serial_port_from(options, config, || {
        NativePortEnumerator::list_ports().map_err(anyhow::Error::from)
    })
}

fn select_serial_port_from<F>(options: &SerialOptions, config: &Config, discover: F) -> Result<String>
where
    F: FnOnce() -> Result<Vec<PortInfo>>,
{
    // If port explicitly specified, use it
    if let Some(port_name) = &options.port {
        return Ok(port_name.clone());
    }

    // If port in config, use it
    if let Some(port_name) = &config
        .connection
        .serial
    {
        debug!("Using port from config: {port_name}");
        return Ok(port_name.clone());
    }

    let ports = discover()?;
    if ports.is_empty() {
        return Err(usage_err("no serial ports found; connect the adapter or pass --port"));
    }
    let candidates = candidate_ports(ports);

    // Non-interactive mode must never prompt
    if options.non_interactive {
        return select_non_interactive_port(candidates);
    }

    match candidates
        .len()
        .cmp(&1)
    {
        Ordering::Greater => {
            ensure_interactive_terminal()?;
            select_port_interactive(candidates)
        },
        Ordering::Equal => {
            let Some(port) = candidates
                .into_iter()
                .next()
            else {
                return Err(usage_err("no serial ports available"));
            };
            if let Some(bridge) = bridge_name(&port) {
                info!("Auto-selected port: {} [{bridge}]", port.name);
                Ok(port.name)
            } else {
                ensure_interactive_terminal()?;
                confirm_single_port(port)
            }
        },
        Ordering::Less => Err(usage_err("no serial ports available")),
    }
}

pub(crate) fn ensure_interactive_terminal() -> Result<()> {
    if std::io::stdin().is_terminal() && std::io::stderr().is_terminal() {
        Ok(())
    } else {
        Err(usage_err(
            "interactive prompt requires a terminal; use --port or --non-interactive",
        ))
    }
}

pub(crate) fn map_prompt_error(err: DialoguerError) -> anyhow::Error {
    match err {
        DialoguerError::IO(io_err) => {
            if io_err.kind() == std::io::ErrorKind::Interrupted {
                CliError::Cancelled("cancelled by user".to_string()).into()
            } else {
                usage_err(&format!("prompt failed: {io_err}"))
            }
        },
    }
}

/// One line describing a port.
fn port_label(port: &PortInfo) -> String {
    let device_info = if let Some(bridge) = bridge_name(port) {
        format!(" [{}]", style(bridge).yellow())
    } else if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
        format!(" ({vid:04X}:{pid:04X})")
    } else {
        String::new()
    };

    let product = port
        .product
        .as_ref()
        .map(|p| format!(" - {}", style(p).dim()))
        .unwrap_or_default();

    format!("{}{device_info}{product}", port.name)
}

/// Interactive port selection.
fn select_port_interactive(ports: Vec<PortInfo>) -> Result<String> {
    eprintln!(
        "{} Found {} serial ports",
        style("ℹ").blue(),
        ports.len()
    );

    // Truncate labels to fit terminal width
    let term_width = console::Term::stderr()
        .size()
        .1 as usize;
    let max_item_width = term_width.saturating_sub(4);
    let labels: Vec<String> = ports
        .iter()
        .map(|p| console::truncate_str(&port_label(p), max_item_width, "\u{2026}").into_owned())
        .collect();

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select the serial port of the SFP adapter")
        .items(&labels)
        .default(0)
        .interact_opt()
        .map_err(map_prompt_error)?;

    match selection {
        Some(index) => ports
            .into_iter()
            .nth(index)
            .map(|p| p.name)
            .ok_or_else(|| anyhow::anyhow!("Invalid port index: {index}")),
        None => Err(CliError::Cancelled("port selection cancelled".to_string()).into()),
    }
}

/// Confirm use of a single unrecognized port.
fn confirm_single_port(port: PortInfo) -> Result<String> {
    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Use {}?", port_label(&port)))
        .default(true)
        .interact_opt()
        .map_err(map_prompt_error)?
        .unwrap_or(false);

    if confirmed {
        Ok(port.name)
    } else {
        Err(CliError::Cancelled("port selection cancelled".to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(name: &str, ids: Option<(u16, u16)>) -> PortInfo {
        PortInfo {
            name: name.to_string(),
            vid: ids.map(|(v, _)| v),
            pid: ids.map(|(_, p)| p),
            manufacturer: None,
            product: None,
        }
    }

    fn non_interactive() -> SerialOptions {
        SerialOptions {
            port: None,
            non_interactive: true,
        }
    }

    fn usage_message(err: &anyhow::Error) -> Option<String> {
        match err.downcast_ref::<CliError>() {
            Some(CliError::Usage(msg)) => Some(msg.clone()),
            _ => None,
        }
    }

    #[test]
    fn test_explicit_port_wins_without_discovery() {
        let options = SerialOptions {
            port: Some("/dev/ttyUSB3".into()),
            non_interactive: true,
        };
        let mut config = Config::default();
        config.connection.serial = Some("/dev/ttyUSB0".into());

        let name = select_serial_port_from(&options, &config, || {
            panic!("discovery must not run")
        })
        .unwrap();
        assert_eq!(name, "/dev/ttyUSB3");
    }

    #[test]
    fn test_config_port_used_before_discovery() {
        let mut config = Config::default();
        config.connection.serial = Some("COM4".into());

        let name = select_serial_port_from(&non_interactive(), &config, || {
            panic!("discovery must not run")
        })
        .unwrap();
        assert_eq!(name, "COM4");
    }

    #[test]
    fn test_single_port_non_interactive() {
        let name = select_serial_port_from(&non_interactive(), &Config::default(), || {
            Ok(vec![port("/dev/ttyS0", None)])
        })
        .unwrap();
        assert_eq!(name, "/dev/ttyS0");
    }

    #[test]
    fn test_bridge_preferred_over_builtin_uart() {
        let name = select_serial_port_from(&non_interactive(), &Config::default(), || {
            Ok(vec![
                port("/dev/ttyS0", None),
                port("/dev/ttyUSB0", Some((0x1A86, 0x7523))),
            ])
        })
        .unwrap();
        assert_eq!(name, "/dev/ttyUSB0");
    }

    #[test]
    fn test_multiple_ports_non_interactive_is_usage_error() {
        let err = select_serial_port_from(&non_interactive(), &Config::default(), || {
            Ok(vec![port("/dev/ttyS0", None), port("/dev/ttyS1", None)])
        })
        .unwrap_err();
        assert!(
            usage_message(&err)
                .unwrap()
                .contains("multiple")
        );
    }

    #[test]
    fn test_no_ports_is_usage_error() {
        let err = select_serial_port_from(&non_interactive(), &Config::default(), || Ok(vec![]))
            .unwrap_err();
        assert!(usage_message(&err).is_some());
    }

    #[test]
    fn test_bridge_name() {
        assert_eq!(bridge_name(&port("a", Some((0x10C4, 0xEA60)))), Some("CP210x"));
        assert_eq!(bridge_name(&port("b", Some((0x1234, 0x5678)))), None);
        assert_eq!(bridge_name(&port("c", None)), None);
    }

    #[test]
    fn test_port_label() {
        console::set_colors_enabled(false);
        assert_eq!(
            port_label(&port("/dev/ttyUSB0", Some((0x0403, 0x6001)))),
            "/dev/ttyUSB0 [FT232R]"
        );
        assert_eq!(
            port_label(&port("/dev/ttyACM0", Some((0x2E8A, 0x000A)))),
            "/dev/ttyACM0 (2E8A:000A)"
        );
        assert_eq!(port_label(&port("COM1", None)), "COM1");
    }
}
