use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::settings::SerialSettings;
use crate::utils::threads::{join_with_timeout, sleep_unless};

use super::board_state::SharedBoardState;
use super::parser::parse_line;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(1);
/// Longest line kept; anything longer is dropped up to its newline.
pub const MAX_LINE_BYTES: usize = 4096;

#[cfg(target_os = "linux")]
const PORT_PREFIXES: &[&str] = &["ttyACM", "ttyUSB"];
#[cfg(target_os = "macos")]
const PORT_PREFIXES: &[&str] = &["cu.usbmodem", "cu.usbserial"];
#[cfg(not(any(target_os = "linux", target_os = "macos")))]
const PORT_PREFIXES: &[&str] = &[];

/// Serial devices under `/dev` that look like attached boards.
pub fn discover_ports() -> Vec<PathBuf> {
    discover_ports_in(Path::new("/dev"), PORT_PREFIXES)
}

pub fn discover_ports_in(dir: &Path, prefixes: &[&str]) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            log_warn!("Cannot list {}: {err}", dir.display());
            return Vec::new();
        }
    };

    let mut ports: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            prefixes.iter().any(|prefix| name.starts_with(prefix))
        })
        .map(|entry| entry.path())
        .collect();
    ports.sort();
    ports
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Reads lines until EOF, a hard I/O error or `stop`. Each parsed line is
/// published into `state`; undecodable or unparsable lines are skipped.
pub fn pump_lines<R: BufRead>(
    mut reader: R,
    port: &str,
    state: &SharedBoardState,
    stop: &AtomicBool,
) -> Result<()> {
    let mut buf = Vec::with_capacity(256);
    let mut discarding = false;

    while !stop.load(Ordering::Relaxed) {
        let room = (MAX_LINE_BYTES - buf.len()) as u64;
        match reader.by_ref().take(room).read_until(b'\n', &mut buf) {
            Ok(0) => {
                log_info!("{port}: end of stream");
                return Ok(());
            }
            Ok(_) => {}
            // Partial bytes stay in `buf` until the rest of the line arrives.
            Err(err) if is_timeout(&err) => {
                if buf.len() < MAX_LINE_BYTES {
                    continue;
                }
            }
            Err(err) => return Err(err).with_context(|| format!("read from {port} failed")),
        }

        let complete = buf.ends_with(b"\n");
        if !complete && buf.len() >= MAX_LINE_BYTES {
            if !discarding {
                log_warn!("{port}: dropping line longer than {MAX_LINE_BYTES} bytes");
            }
            discarding = true;
            buf.clear();
            continue;
        }
        if discarding {
            // Tail of an overlong line.
            discarding = !complete;
            buf.clear();
            continue;
        }

        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line.trim(),
            Err(err) => {
                log_warn!("{port}: dropping undecodable line ({err})");
                buf.clear();
                continue;
            }
        };

        match parse_line(line) {
            Some(reading) => {
                let board = reading.board;
                let revision = state.publish(reading);
                log_debug!("{port}: {board} updated (revision {revision})");
            }
            None if line.is_empty() => {}
            None => log_debug!("{port}: unrecognised line {line:?}"),
        }
        buf.clear();
    }

    Ok(())
}

/// Waits out the board's boot after the port opens. Returns false when
/// `stop` cut the wait short.
fn wait_for_boot(delay: Duration, stop: &AtomicBool) -> bool {
    sleep_unless(delay, || stop.load(Ordering::Relaxed));
    !stop.load(Ordering::Relaxed)
}

fn open_port(
    port: &Path,
    settings: &SerialSettings,
    stop: &AtomicBool,
) -> Result<Option<Box<dyn serialport::SerialPort>>> {
    let serial = serialport::new(port.to_string_lossy().into_owned(), settings.baud_rate)
        .timeout(settings.timeout)
        .open()
        .with_context(|| format!("failed to open {}", port.display()))?;

    // Opening the port resets the board; drop whatever it printed while booting.
    if !wait_for_boot(settings.settle_delay, stop) {
        return Ok(None);
    }
    serial
        .clear(serialport::ClearBuffer::Input)
        .with_context(|| format!("failed to clear input buffer of {}", port.display()))?;
    Ok(Some(serial))
}

fn reader_loop(port: PathBuf, settings: SerialSettings, state: Arc<SharedBoardState>, stop: Arc<AtomicBool>) {
    let name = port.display().to_string();
    log_info!("Starting serial reader for {name}");

    while !stop.load(Ordering::Relaxed) {
        match open_port(&port, &settings, &stop) {
            Ok(None) => break,
            Ok(Some(serial)) => {
                log_info!("Serial connection established for {name}");
                if let Err(err) = pump_lines(BufReader::new(serial), &name, &state, &stop) {
                    log_error!("Serial reader for {name} failed: {err:?}");
                }
            }
            Err(err) => log_error!("{err:?}"),
        }
        sleep_unless(RECONNECT_DELAY, || stop.load(Ordering::Relaxed));
    }

    log_info!("Serial reader for {name} stopped");
}

/// Owns one reader thread per serial port, all publishing into the same
/// [`SharedBoardState`].
pub struct SerialIngestor {
    state: Arc<SharedBoardState>,
    settings: SerialSettings,
    stop: Arc<AtomicBool>,
    readers: Vec<JoinHandle<()>>,
}

impl SerialIngestor {
    pub fn new(state: Arc<SharedBoardState>, settings: SerialSettings) -> Self {
        Self {
            state,
            settings,
            stop: Arc::new(AtomicBool::new(false)),
            readers: Vec::new(),
        }
    }

    pub fn state(&self) -> Arc<SharedBoardState> {
        Arc::clone(&self.state)
    }

    /// Discovers ports and starts a reader for each. Fails when nothing is
    /// attached.
    pub fn start(&mut self) -> Result<usize> {
        let ports = discover_ports();
        log::info!("Found {} serial ports", ports.len());
        if ports.is_empty() {
            bail!("no serial devices found");
        }
        self.start_ports(ports)
    }

    pub fn start_ports(&mut self, ports: Vec<PathBuf>) -> Result<usize> {
        if !self.readers.is_empty() {
            bail!("serial readers already running");
        }
        self.stop.store(false, Ordering::Relaxed);

        for port in ports {
            let thread_name = format!(
                "serial-{}",
                port.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
            );
            let state = Arc::clone(&self.state);
            let stop = Arc::clone(&self.stop);
            let settings = self.settings.clone();
            let handle = thread::Builder::new()
                .name(thread_name)
                .spawn(move || reader_loop(port, settings, state, stop))
                .context("failed to spawn serial reader thread")?;
            self.readers.push(handle);
        }
        Ok(self.readers.len())
    }

    pub fn stop(&mut self, timeout: Duration) {
        self.stop.store(true, Ordering::Relaxed);
        for handle in self.readers.drain(..) {
            join_with_timeout(handle, timeout);
        }
    }
}

impl Drop for SerialIngestor {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::parser::BoardId;
    use std::io::Cursor;

    #[test]
    fn pump_publishes_parsed_lines_and_skips_noise() {
        let mut input = Vec::new();
        input.extend_from_slice(b"UNO1_C0: 200 UNO1_C1: 50\r\n");
        input.extend_from_slice(b"boot banner\n");
        input.extend_from_slice(&[0xff, 0xfe, b'\n']);
        input.extend_from_slice(b"\n");
        input.extend_from_slice(b"[UNO0] C0=10 C3=20");

        let state = SharedBoardState::new();
        let stop = AtomicBool::new(false);
        pump_lines(Cursor::new(input), "test", &state, &stop).unwrap();

        let snapshot = state.snapshot();
        assert_eq!(snapshot.revision, 2);
        assert_eq!(snapshot.latest[&BoardId::Uno1].channel(0), 200);
        assert_eq!(snapshot.latest[&BoardId::Uno0].channel(3), 20);
    }

    #[test]
    fn pump_returns_immediately_when_stopped() {
        let state = SharedBoardState::new();
        let stop = AtomicBool::new(true);
        pump_lines(Cursor::new(b"UNO1_C0=1\n".to_vec()), "test", &state, &stop).unwrap();
        assert_eq!(state.revision(), 0);
    }

    #[test]
    fn overlong_lines_are_dropped_up_to_their_newline() {
        let mut input = vec![b'x'; MAX_LINE_BYTES + 904];
        input.extend_from_slice(b" UNO2_C0: 7\n");
        input.extend_from_slice(b"UNO1_C0: 5\n");

        let state = SharedBoardState::new();
        let stop = AtomicBool::new(false);
        pump_lines(Cursor::new(input), "test", &state, &stop).unwrap();

        let snapshot = state.snapshot();
        assert_eq!(snapshot.revision, 1);
        assert_eq!(snapshot.latest[&BoardId::Uno1].channel(0), 5);
        assert!(!snapshot.latest.contains_key(&BoardId::Uno2));
    }

    #[test]
    fn line_of_exactly_the_limit_is_still_parsed() {
        let mut line = b"UNO3_C2: 11".to_vec();
        line.resize(MAX_LINE_BYTES - 1, b' ');
        line.push(b'\n');

        let state = SharedBoardState::new();
        let stop = AtomicBool::new(false);
        pump_lines(Cursor::new(line), "test", &state, &stop).unwrap();
        assert_eq!(state.snapshot().latest[&BoardId::Uno3].channel(2), 11);
    }

    #[test]
    fn boot_wait_ends_early_on_stop() {
        let stop = Arc::new(AtomicBool::new(false));
        let setter = {
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                stop.store(true, Ordering::Relaxed);
            })
        };

        let started = std::time::Instant::now();
        assert!(!wait_for_boot(Duration::from_secs(30), &stop));
        assert!(started.elapsed() < Duration::from_secs(5));
        setter.join().unwrap();
        assert!(wait_for_boot(Duration::ZERO, &AtomicBool::new(false)));
    }

    #[test]
    fn discovery_filters_by_prefix_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["ttyUSB1", "ttyACM0", "ttyS0", "ttyUSB0", "null"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let ports = discover_ports_in(dir.path(), &["ttyACM", "ttyUSB"]);
        let names: Vec<_> = ports
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["ttyACM0", "ttyUSB0", "ttyUSB1"]);
    }

    #[test]
    fn discovery_of_missing_directory_is_empty() {
        assert!(discover_ports_in(Path::new("/definitely/not/here"), &["tty"]).is_empty());
    }
}
