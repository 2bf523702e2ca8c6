//! Serial monitor command implementation.
//!
//! Device output is echoed to the terminal by a reader thread while the
//! main thread forwards keystrokes (crossterm raw mode) to the device.

use anyhow::{Context, Result};
use console::style;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use sfproot::monitor::{TextDecoder, clean_console_text, to_raw_terminal};
use sfproot::{NativePort, Port};
use std::io::{self, Read as _, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::config::Config;
use crate::{Cli, get_port, was_interrupted};

/// Read timeout of the monitor port; bounds how fast the reader notices exit.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Bytes to send for a key press, or `None` for keys the device never sees.
///
/// Ctrl-C goes to the device as 0x03 so an autoboot can be halted by hand.
fn key_bytes(code: KeyCode, modifiers: KeyModifiers) -> Option<Vec<u8>> {
    match (code, modifiers) {
        (KeyCode::Char(c), m) if m.contains(KeyModifiers::CONTROL) => {
            let c = c.to_ascii_lowercase();
            c.is_ascii_lowercase()
                .then(|| vec![c as u8 - b'a' + 1])
        },
        (KeyCode::Char(c), _) => {
            let mut buf = [0u8; 4];
            Some(
                c.encode_utf8(&mut buf)
                    .as_bytes()
                    .to_vec(),
            )
        },
        (KeyCode::Enter, _) => Some(b"\r\n".to_vec()),
        (KeyCode::Backspace, _) => Some(vec![0x08]),
        (KeyCode::Tab, _) => Some(vec![0x09]),
        (KeyCode::Esc, _) => Some(vec![0x1B]),
        _ => None,
    }
}

/// Ctrl-] leaves the monitor.
///
/// Some terminals report the 0x1D byte as Ctrl-5.
fn is_exit_key(code: KeyCode, modifiers: KeyModifiers) -> bool {
    matches!(code, KeyCode::Char(']' | '5')) && modifiers.contains(KeyModifiers::CONTROL)
}

/// Monitor command implementation.
pub(crate) fn cmd_monitor(cli: &Cli, config: &Config, monitor_baud: u32) -> Result<()> {
    let port_name = get_port(cli, config)?;

    eprintln!(
        "{} Opening {} at {monitor_baud} baud",
        style("📡").cyan(),
        style(&port_name).green()
    );
    eprintln!("{}", style("Press Ctrl-] to exit").dim());

    let mut reader = NativePort::open_simple(&port_name, monitor_baud)
        .with_context(|| format!("Failed to open {port_name}"))?;
    reader.set_timeout(READ_TIMEOUT)?;
    let mut writer = reader
        .try_clone_writer()
        .context("Failed to clone serial port")?;

    let running = Arc::new(AtomicBool::new(true));
    let running_reader = running.clone();

    // Reader thread: serial -> terminal
    let reader_handle = std::thread::spawn(move || {
        let mut buf = [0u8; 1024];
        let mut decoder = TextDecoder::new();
        let mut stdout = io::stdout();

        while running_reader.load(Ordering::Relaxed) {
            match reader.read(&mut buf) {
                Ok(0) => {},
                Ok(n) => {
                    let text = to_raw_terminal(&clean_console_text(&decoder.push(&buf[..n])));
                    if !text.is_empty() {
                        let _ = stdout.write_all(text.as_bytes());
                        let _ = stdout.flush();
                    }
                },
                Err(ref e) if e.kind() == io::ErrorKind::TimedOut => {},
                Err(_) => {
                    running_reader.store(false, Ordering::Relaxed);
                    break;
                },
            }
        }
        let _ = reader.close();
    });

    terminal::enable_raw_mode().context("Failed to enable raw terminal mode")?;
    let raw_guard = RawModeGuard;

    // Main thread: keyboard -> serial
    let result = (|| -> Result<()> {
        while running.load(Ordering::Relaxed) && !was_interrupted() {
            if !event::poll(Duration::from_millis(50))? {
                continue;
            }
            let Event::Key(KeyEvent {
                code,
                modifiers,
                kind,
                ..
            }) = event::read()?
            else {
                continue;
            };
            if kind == KeyEventKind::Release {
                continue;
            }
            if is_exit_key(code, modifiers) {
                break;
            }
            if let Some(bytes) = key_bytes(code, modifiers) {
                writer
                    .write_all(&bytes)
                    .and_then(|()| writer.flush())
                    .context("Failed to write to serial port")?;
            }
        }
        Ok(())
    })();

    running.store(false, Ordering::Relaxed);
    drop(raw_guard);
    let _ = reader_handle.join();
    eprintln!("\n{} Monitor closed", style("👋").cyan());
    result
}

/// RAII guard to restore terminal mode on drop.
struct RawModeGuard;

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}
