//! Output formatting for CLI results
//!
//! Three output formats:
//! - Table: Human-readable tables (default)
//! - JSON: Structured JSON for scripting and automation
//! - Quiet: Minimal output, exit codes only

use std::str::FromStr;

use comfy_table::{presets::UTF8_FULL, Table};
use rust_decimal::Decimal;
use serde::Serialize;

use shuttle_core::session::SessionEffect;
use shuttle_core::store::Checkpoint;
use shuttle_core::types::{InspectionRecord, InspectionSummary, ShuttleAssignment};

use crate::ExitCode;

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format for scripting
    Json,
    /// Minimal output - exit codes only
    Quiet,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            "quiet" => Ok(Self::Quiet),
            _ => Err(format!("Unknown output format: {s}")),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Json => write!(f, "json"),
            Self::Quiet => write!(f, "quiet"),
        }
    }
}

/// Standard JSON response wrapper for consistent schema
#[derive(Serialize)]
pub struct JsonResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// ISO 8601 timestamp
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl<T: Serialize> JsonResponse<T> {
    pub fn success_with_command(data: T, command: &str) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
            command: Some(command.to_string()),
        }
    }
}

impl JsonResponse<()> {
    pub fn error(message: &str) -> JsonResponse<()> {
        JsonResponse {
            success: false,
            data: None,
            error: Some(message.to_string()),
            timestamp: chrono::Utc::now().to_rfc3339(),
            command: None,
        }
    }
}

/// A local checkpoint as listed by `pending`.
#[derive(Debug, Clone, Serialize)]
pub struct PendingInspection {
    pub plate: String,
    pub driver: String,
    pub route: String,
    pub start_time: String,
    pub passengers: usize,
}

impl From<&Checkpoint> for PendingInspection {
    fn from(cp: &Checkpoint) -> Self {
        Self {
            plate: cp.plate.to_string(),
            driver: cp.driver.clone(),
            route: format!("{} → {}", cp.route.origin, cp.route.destination),
            start_time: cp.start_time.to_string(),
            passengers: cp.log.len(),
        }
    }
}

/// Formats output for different modes
#[derive(Debug, Clone, Copy)]
pub struct OutputFormatter {
    format: OutputFormat,
    verbose: bool,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat, verbose: bool) -> Self {
        Self { format, verbose }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn is_quiet(&self) -> bool {
        self.format == OutputFormat::Quiet
    }

    pub fn format_shuttles(&self, shuttles: &[ShuttleAssignment]) -> String {
        match self.format {
            OutputFormat::Table => self.shuttles_table(shuttles),
            OutputFormat::Json => self.to_json_response(&shuttles, "shuttles"),
            OutputFormat::Quiet => String::new(),
        }
    }

    pub fn format_history(&self, history: &[InspectionSummary]) -> String {
        match self.format {
            OutputFormat::Table => self.history_table(history),
            OutputFormat::Json => self.to_json_response(&history, "history"),
            OutputFormat::Quiet => String::new(),
        }
    }

    pub fn format_pending(&self, pending: &[PendingInspection]) -> String {
        match self.format {
            OutputFormat::Table => self.pending_table(pending),
            OutputFormat::Json => self.to_json_response(&pending, "pending"),
            OutputFormat::Quiet => String::new(),
        }
    }

    pub fn format_receipt(&self, record: &InspectionRecord) -> String {
        match self.format {
            OutputFormat::Table => self.receipt_table(record),
            OutputFormat::Json => self.to_json_response(record, "receipt"),
            OutputFormat::Quiet => String::new(),
        }
    }

    /// One line per session effect, for the interactive loop.
    pub fn format_effect(&self, effect: &SessionEffect) -> Option<String> {
        if self.format != OutputFormat::Table {
            return None;
        }
        match effect {
            SessionEffect::Started { plate, start_time } => {
                Some(format!("Inspection started for {plate} at {start_time}"))
            }
            SessionEffect::Restored {
                plate,
                start_time,
                entries,
            } => Some(format!(
                "Resumed inspection for {plate} started {start_time} ({entries} passengers)"
            )),
            SessionEffect::ArmScan => self.verbose.then(|| "Waiting for card...".to_string()),
            SessionEffect::PromptPassengerType { tag_id, options } => {
                let choices: Vec<String> = options
                    .iter()
                    .enumerate()
                    .map(|(i, t)| format!("  {}) {} ({})", i + 1, t.label, money(t.base_rate)))
                    .collect();
                Some(format!(
                    "Card {tag_id}: choose a passenger type with `type <name|number>`, or `skip`\n{}",
                    choices.join("\n")
                ))
            }
            SessionEffect::EntryLogged {
                entry,
                fare,
                running_total,
            } => Some(format!(
                "+ {} {} {} [{}]  total {}",
                entry.timestamp,
                entry.passenger_type,
                money(*fare),
                entry.tag_id.as_deref().unwrap_or("manual"),
                money(*running_total)
            )),
            SessionEffect::EntryRemoved {
                entry,
                running_total,
            } => Some(format!(
                "- removed {} ({})  total {}",
                entry.id,
                entry.passenger_type,
                money(*running_total)
            )),
            SessionEffect::ScanningSuspended => {
                Some("Scanning paused. Type `scan` to resume.".to_string())
            }
            SessionEffect::PersistenceWarning(msg) => {
                Some(format!("⚠ Progress not saved locally: {msg}"))
            }
            SessionEffect::Submitted(record) => Some(format!(
                "Inspection {} submitted",
                record.inspection_id.as_deref().unwrap_or("-")
            )),
            SessionEffect::Cancelled { plate, discarded } => Some(format!(
                "Inspection for {plate} cancelled, {discarded} passengers discarded"
            )),
        }
    }

    /// Format error with exit code context
    pub fn format_error_with_code(&self, message: &str, code: ExitCode) -> String {
        match self.format {
            OutputFormat::Table => format!("Error: {message}"),
            OutputFormat::Json => {
                let response = JsonResponse::<()>::error(message);
                let mut output = serde_json::to_value(&response).unwrap_or_default();
                output["exit_code"] = serde_json::json!(code as i32);
                output["exit_code_name"] = serde_json::json!(code.name());
                self.to_json(&output)
            }
            OutputFormat::Quiet => String::new(),
        }
    }

    pub fn success(&self, message: &str) {
        if self.format == OutputFormat::Table {
            println!("✓ {message}");
        }
    }

    pub fn error(&self, message: &str) {
        if self.format == OutputFormat::Table {
            eprintln!("✗ {message}");
        } else if self.format == OutputFormat::Json {
            println!("{}", self.to_json(&JsonResponse::<()>::error(message)));
        }
    }

    pub fn warning(&self, message: &str) {
        if self.format == OutputFormat::Table {
            eprintln!("⚠ {message}");
        }
    }

    fn to_json<T: Serialize>(&self, value: &T) -> String {
        serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }

    fn to_json_response<T: Serialize>(&self, value: &T, command: &str) -> String {
        self.to_json(&JsonResponse::success_with_command(value, command))
    }

    fn shuttles_table(&self, shuttles: &[ShuttleAssignment]) -> String {
        if shuttles.is_empty() {
            return "No shuttles found.".to_string();
        }

        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["ID", "Plate", "Driver", "Route", "Added Rate"]);
        for s in shuttles {
            table.add_row(vec![
                s.id.clone(),
                s.plate.to_string(),
                s.driver.clone(),
                format!("{} → {}", s.origin, s.destination),
                money(s.added_rate),
            ]);
        }
        table.to_string()
    }

    fn history_table(&self, history: &[InspectionSummary]) -> String {
        if history.is_empty() {
            return "No inspections found.".to_string();
        }

        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["ID", "Started", "Plate", "Driver", "Route", "Total"]);
        for h in history {
            table.add_row(vec![
                h.id.clone(),
                h.start_datetime.clone(),
                h.plate.clone(),
                h.driver.clone(),
                format!("{} → {}", h.origin, h.destination),
                money(h.total_claimed_money),
            ]);
        }
        table.to_string()
    }

    fn pending_table(&self, pending: &[PendingInspection]) -> String {
        if pending.is_empty() {
            return "No unfinished inspections.".to_string();
        }

        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["Plate", "Driver", "Route", "Started", "Passengers"]);
        for p in pending {
            table.add_row(vec![
                p.plate.clone(),
                p.driver.clone(),
                p.route.clone(),
                p.start_time.clone(),
                p.passengers.to_string(),
            ]);
        }
        table.to_string()
    }

    fn receipt_table(&self, record: &InspectionRecord) -> String {
        let mut header = Table::new();
        header.load_preset(UTF8_FULL);
        header.set_header(vec!["Receipt", ""]);
        header.add_row(vec![
            "Inspection ID",
            record.inspection_id.as_deref().unwrap_or("-"),
        ]);
        header.add_row(vec!["Plate", record.plate.as_str()]);
        header.add_row(vec!["Driver", record.driver.as_str()]);
        header.add_row(vec![
            "Route".to_string(),
            format!("{} → {}", record.route.origin, record.route.destination),
        ]);
        header.add_row(vec!["Started".to_string(), record.start_time.to_string()]);
        header.add_row(vec!["Ended".to_string(), record.end_time.to_string()]);
        if !record.inspector.is_empty() {
            header.add_row(vec!["Inspector", record.inspector.as_str()]);
        }
        for (label, count) in &record.passenger_counts {
            header.add_row(vec![label.clone(), count.to_string()]);
        }
        header.add_row(vec![
            "Passengers".to_string(),
            record.total_passengers.to_string(),
        ]);
        header.add_row(vec!["Total".to_string(), money(record.total_claimed_money)]);

        if record.logs.is_empty() {
            return header.to_string();
        }

        let mut lines = Table::new();
        lines.load_preset(UTF8_FULL);
        lines.set_header(vec!["Time", "Type", "Card", "Fare"]);
        for l in &record.logs {
            lines.add_row(vec![
                l.entry.timestamp.to_string(),
                l.entry.passenger_type.clone(),
                l.entry.tag_id.clone().unwrap_or_else(|| "manual".to_string()),
                money(l.fare),
            ]);
        }

        format!("{header}\n{lines}")
    }
}

/// Peso amount with two decimals.
pub fn money(amount: Decimal) -> String {
    format!("PHP {:.2}", amount)
}
