//! Console front end for an inspection
//!
//! Stands in for the phone UI and the NFC antenna: each line typed on stdin
//! is either a card tap (`tag <id>`) fed to [`ConsoleNfc`], or an inspector
//! command forwarded to the session driver.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, Notify};

use shuttle_core::driver::InspectorCommand;
use shuttle_core::errors::NfcError;
use shuttle_core::nfc::{NfcAdapter, ScanOutcome};

// ============================================================================
// NFC Adapter
// ============================================================================

/// NFC reader whose taps arrive as typed tag ids.
///
/// Like the phone antenna, a card presented while no scan is waiting is
/// not read.
pub struct ConsoleNfc {
    tx: mpsc::Sender<String>,
    taps: Mutex<mpsc::Receiver<String>>,
    enabled: AtomicBool,
    cancel: Notify,
    in_flight: AtomicUsize,
}

impl ConsoleNfc {
    pub fn new(enabled: bool) -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            tx,
            taps: Mutex::new(rx),
            enabled: AtomicBool::new(enabled),
            cancel: Notify::new(),
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Present a card. Returns false if the reader was not scanning.
    pub fn present(&self, tag_id: impl Into<String>) -> bool {
        if self.in_flight.load(Ordering::SeqCst) == 0 {
            return false;
        }
        self.tx.try_send(tag_id.into()).is_ok()
    }

    pub fn is_scanning(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl NfcAdapter for ConsoleNfc {
    async fn is_available(&self) -> bool {
        true
    }

    async fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    async fn request_enable(&self) -> Result<bool, NfcError> {
        self.enabled.store(true, Ordering::SeqCst);
        tracing::info!("console reader switched on");
        Ok(true)
    }

    async fn scan_once(&self) -> Result<ScanOutcome, NfcError> {
        if !self.enabled.load(Ordering::SeqCst) {
            return Err(NfcError::Disabled);
        }

        let cancelled = self.cancel.notified();
        tokio::pin!(cancelled);
        let mut taps = self.taps.lock().await;
        // A tap left over from an abandoned scan belongs to no one
        while taps.try_recv().is_ok() {}
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        tokio::select! {
            _ = &mut cancelled => Ok(ScanOutcome::Cancelled),
            tap = taps.recv() => match tap {
                Some(tag) => Ok(ScanOutcome::Tag(tag)),
                None => Err(NfcError::Read("reader closed".into())),
            },
        }
    }

    async fn cancel_scan(&self) {
        // No stored permit: an idle cancel must not end the next scan
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            self.cancel.notify_waiters();
        }
    }
}

// ============================================================================
// Console Reader
// ============================================================================

/// Read stdin on a dedicated thread until EOF or until the session stops
/// taking commands. Dropping `commands` on EOF ends the session loop.
pub fn spawn_reader(
    labels: Vec<String>,
    nfc: Arc<ConsoleNfc>,
    commands: mpsc::Sender<InspectorCommand>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match parse_line(&line, &labels) {
                Ok(ConsoleInput::Tap(tag)) => {
                    if !nfc.present(tag) {
                        eprintln!("Reader is not waiting for a card.");
                    }
                }
                Ok(ConsoleInput::Command(cmd)) => {
                    if commands.blocking_send(cmd).is_err() {
                        break;
                    }
                }
                Ok(ConsoleInput::Help) => eprintln!("{HELP}"),
                Ok(ConsoleInput::Nothing) => {}
                Err(msg) => eprintln!("{msg}"),
            }
        }
        tracing::debug!("console reader finished");
    })
}

// ============================================================================
// Line Parsing
// ============================================================================

/// One parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    /// A card presented to the reader
    Tap(String),
    Command(InspectorCommand),
    Help,
    /// Blank line
    Nothing,
}

pub const HELP: &str = "\
Commands:
  tag <id>            present a card
  type <name|n>       choose the passenger type for the scanned card
  skip                dismiss the passenger type prompt
  manual <name|n>     add a passenger without a card
  delete <entry-id>   remove a logged passenger
  scan                resume scanning
  enable              switch the reader on
  end                 finish and submit the inspection
  cancel              discard the inspection
  help                show this list";

/// Parse a console line. `labels` are the session's passenger types, so
/// `type 2` can pick the second one.
pub fn parse_line(line: &str, labels: &[String]) -> Result<ConsoleInput, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(ConsoleInput::Nothing);
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((w, r)) => (w, r.trim()),
        None => (line, ""),
    };

    let input = match word.to_lowercase().as_str() {
        "tag" | "tap" => ConsoleInput::Tap(required(rest, "tag")?.to_string()),
        "type" | "select" => ConsoleInput::Command(InspectorCommand::SelectPassengerType(
            resolve_label(required(rest, "type")?, labels),
        )),
        "manual" | "add" => ConsoleInput::Command(InspectorCommand::AddManual(resolve_label(
            required(rest, "manual")?,
            labels,
        ))),
        "delete" | "rm" => ConsoleInput::Command(InspectorCommand::DeleteEntry(
            required(rest, "delete")?.to_string(),
        )),
        "skip" | "dismiss" => ConsoleInput::Command(InspectorCommand::DismissPrompt),
        "scan" | "resume" => ConsoleInput::Command(InspectorCommand::ResumeScanning),
        "enable" => ConsoleInput::Command(InspectorCommand::EnableNfc),
        "end" | "submit" => ConsoleInput::Command(InspectorCommand::End),
        "cancel" => ConsoleInput::Command(InspectorCommand::Cancel),
        "help" | "?" => ConsoleInput::Help,
        other => return Err(format!("Unknown command '{other}'. Type `help`.")),
    };
    Ok(input)
}

fn required<'a>(arg: &'a str, command: &str) -> Result<&'a str, String> {
    if arg.is_empty() {
        Err(format!("`{command}` needs an argument"))
    } else {
        Ok(arg)
    }
}

/// A 1-based index picks from `labels`; anything else is matched
/// case-insensitively and otherwise passed through for the session to reject.
fn resolve_label(arg: &str, labels: &[String]) -> String {
    if let Ok(n) = arg.parse::<usize>() {
        if let Some(label) = n.checked_sub(1).and_then(|i| labels.get(i)) {
            return label.clone();
        }
    }
    labels
        .iter()
        .find(|l| l.eq_ignore_ascii_case(arg))
        .cloned()
        .unwrap_or_else(|| arg.to_string())
}
