//! CLI command definitions and argument parsing

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tokio::sync::mpsc;

use shuttle_core::driver::{run_session, DriverEvent, SessionOutcome};
use shuttle_core::errors::ApiError;
use shuttle_core::http_api::HttpApiClient;
use shuttle_core::nfc::NfcAdapter;
use shuttle_core::session::{InspectionMachine, SessionEffect, SessionError};
use shuttle_core::sqlite_store::SqliteCheckpointStore;
use shuttle_core::store::CheckpointStore;
use shuttle_core::types::{Plate, Route};

use crate::config::Config;
use crate::console::{self, ConsoleNfc};
use crate::output::{OutputFormat, OutputFormatter, PendingInspection};
use crate::ExitCode;

type Machine = InspectionMachine<SqliteCheckpointStore, ConsoleNfc, HttpApiClient>;

/// Shuttle Inspector CLI - fare inspections from the console
#[derive(Parser, Debug)]
#[command(name = "shuttle-inspector")]
#[command(version, about = "Shuttle Inspector CLI - fare inspections from the console")]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format: table, json, quiet
    #[arg(long, global = true)]
    pub output: Option<OutputFormat>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Backend API base URL
    #[arg(long = "api-url", global = true)]
    pub api_url: Option<String>,

    /// Bearer token for the backend
    #[arg(long, env = "SHUTTLE_API_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    /// Inspector name recorded on submitted inspections
    #[arg(long, global = true)]
    pub inspector: Option<String>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run an inspection, resuming an unfinished one for the plate if present
    Inspect(InspectArgs),
    /// List shuttle assignments
    Shuttles,
    /// List unfinished inspections saved on this device
    Pending,
    /// Delete the unfinished inspection for a plate
    Discard(DiscardArgs),
    /// List submitted inspections
    History,
    /// Show a submitted inspection
    Receipt(ReceiptArgs),
}

impl Cli {
    /// Execute the CLI command with a pre-loaded configuration
    pub async fn execute_with_config(self, config: Config) -> anyhow::Result<ExitCode> {
        let format = config.output.format.parse().unwrap_or_default();
        let formatter = OutputFormatter::new(format, self.verbose);

        match self.command {
            Commands::Inspect(args) => args.execute(&config, formatter).await,
            Commands::Shuttles => {
                let client = api_client(&config)?;
                match client.list_shuttles().await {
                    Ok(shuttles) => {
                        print_result(formatter.format_shuttles(&shuttles));
                        Ok(ExitCode::Success)
                    }
                    Err(e) => Ok(report_api(&formatter, "Could not list shuttles", &e)),
                }
            }
            Commands::Pending => {
                let store = open_store(&config)?;
                let mut pending = Vec::new();
                for plate in store.list_plates().await? {
                    match store.load(&plate).await {
                        Ok(Some(cp)) if !cp.is_closed() => {
                            pending.push(PendingInspection::from(&cp))
                        }
                        Ok(_) => {}
                        Err(e) => formatter.warning(&format!("Skipping {plate}: {e}")),
                    }
                }
                print_result(formatter.format_pending(&pending));
                Ok(ExitCode::Success)
            }
            Commands::Discard(args) => args.execute(&config, formatter).await,
            Commands::History => {
                let client = api_client(&config)?;
                match client.list_inspections().await {
                    Ok(history) => {
                        print_result(formatter.format_history(&history));
                        Ok(ExitCode::Success)
                    }
                    Err(e) => Ok(report_api(&formatter, "Could not load history", &e)),
                }
            }
            Commands::Receipt(args) => {
                let client = api_client(&config)?;
                match client.get_inspection(&args.id).await {
                    Ok(record) => {
                        print_result(formatter.format_receipt(&record));
                        Ok(ExitCode::Success)
                    }
                    Err(e) => Ok(report_api(
                        &formatter,
                        &format!("Could not load inspection {}", args.id),
                        &e,
                    )),
                }
            }
        }
    }
}

/// Arguments for the inspect command
#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// Shuttle plate number
    #[arg(long, required_unless_present = "shuttle")]
    pub plate: Option<String>,

    /// Take plate, driver and route from this shuttle assignment
    #[arg(long, conflicts_with = "plate")]
    pub shuttle: Option<String>,

    /// Driver name
    #[arg(long)]
    pub driver: Option<String>,

    /// Route origin
    #[arg(long)]
    pub origin: Option<String>,

    /// Route destination
    #[arg(long)]
    pub destination: Option<String>,

    /// Surcharge added to every fare on this route
    #[arg(long = "added-rate")]
    pub added_rate: Option<Decimal>,
}

/// What to start when no checkpoint exists for the plate.
#[derive(Debug)]
struct NewInspection {
    driver: String,
    route: Route,
}

impl InspectArgs {
    pub async fn execute(self, config: &Config, formatter: OutputFormatter) -> anyhow::Result<ExitCode> {
        let client = Arc::new(api_client(config)?);
        let store = Arc::new(open_store(config)?);
        let nfc = Arc::new(ConsoleNfc::new(config.nfc.enabled));

        let (plate, fresh) = match self.resolve(&client).await {
            Ok(target) => target,
            Err((code, message)) => return Ok(report(&formatter, &message, code)),
        };

        let mut machine: Machine = InspectionMachine::new(store, nfc.clone(), client)
            .with_inspector(config.inspector.name.clone());

        let effects = match machine.restore(&plate).await {
            Ok(Some(effects)) => effects,
            Ok(None) => {
                let Some(fresh) = fresh else {
                    return Ok(report(
                        &formatter,
                        &format!(
                            "No unfinished inspection for {plate}. \
                             Pass --driver, --origin, --destination and --added-rate to start one."
                        ),
                        ExitCode::InvalidInput,
                    ));
                };
                match machine.start(plate.clone(), fresh.driver, fresh.route).await {
                    Ok(effects) => effects,
                    Err(e) => return Ok(report_session(&formatter, &e)),
                }
            }
            Err(e) => return Ok(report_session(&formatter, &e)),
        };

        for effect in &effects {
            show_effect(&formatter, effect);
        }
        if !formatter.is_quiet() {
            eprintln!("Type `help` for commands.");
        }

        run_console(&mut machine, nfc, formatter, &plate).await
    }

    /// Work out the plate, and what to start if there is nothing to resume.
    async fn resolve(
        &self,
        client: &HttpApiClient,
    ) -> Result<(Plate, Option<NewInspection>), (ExitCode, String)> {
        if let Some(id) = &self.shuttle {
            let shuttles = client
                .list_shuttles()
                .await
                .map_err(|e| (ExitCode::from(&e), format!("Could not list shuttles: {e}")))?;
            let shuttle = shuttles
                .into_iter()
                .find(|s| &s.id == id)
                .ok_or_else(|| (ExitCode::InvalidInput, format!("No shuttle with id {id}")))?;
            let route = shuttle.route();
            return Ok((
                shuttle.plate,
                Some(NewInspection {
                    driver: shuttle.driver,
                    route,
                }),
            ));
        }

        let plate = Plate::new(self.plate.as_deref().unwrap_or_default());
        if plate.is_empty() {
            return Err((ExitCode::InvalidInput, "Plate is empty".to_string()));
        }

        let fresh = match (&self.driver, &self.origin, &self.destination, self.added_rate) {
            (Some(driver), Some(origin), Some(destination), Some(added_rate)) => {
                Some(NewInspection {
                    driver: driver.clone(),
                    route: Route {
                        id: None,
                        origin: origin.clone(),
                        destination: destination.clone(),
                        added_rate,
                    },
                })
            }
            (None, None, None, None) => None,
            _ => {
                return Err((
                    ExitCode::InvalidInput,
                    "--driver, --origin, --destination and --added-rate go together".to_string(),
                ))
            }
        };
        Ok((plate, fresh))
    }
}

/// Feed the console into the session driver until the inspection finishes.
async fn run_console(
    machine: &mut Machine,
    nfc: Arc<ConsoleNfc>,
    formatter: OutputFormatter,
    plate: &Plate,
) -> anyhow::Result<ExitCode> {
    let labels = machine
        .passenger_types()
        .iter()
        .map(|t| t.label.clone())
        .collect();
    let (cmd_tx, mut cmd_rx) = mpsc::channel(16);
    let (ev_tx, mut ev_rx) = mpsc::unbounded_channel();

    console::spawn_reader(labels, nfc.clone(), cmd_tx);
    let printer = tokio::spawn(async move {
        while let Some(event) = ev_rx.recv().await {
            match event {
                DriverEvent::Effect(effect) => show_effect(&formatter, &effect),
                DriverEvent::Error(e) => formatter.warning(&e.user_message()),
            }
        }
    });

    let outcome = tokio::select! {
        outcome = run_session(machine, &mut cmd_rx, &ev_tx) => outcome,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
            Ok(SessionOutcome::Abandoned)
        }
    };
    nfc.cancel_scan().await;
    drop(ev_tx);
    let _ = printer.await;

    match outcome {
        Ok(SessionOutcome::Submitted(record)) => {
            print_result(formatter.format_receipt(&record));
            Ok(ExitCode::Success)
        }
        Ok(SessionOutcome::Cancelled) => {
            formatter.success("Inspection cancelled");
            Ok(ExitCode::Success)
        }
        Ok(SessionOutcome::Abandoned) => Ok(report(
            &formatter,
            &format!(
                "Inspection for {plate} is unfinished. \
                 Run `shuttle-inspector inspect --plate \"{plate}\"` to resume it."
            ),
            ExitCode::GeneralError,
        )),
        Err(e) => Ok(report_session(&formatter, &e)),
    }
}

/// Arguments for the discard command
#[derive(Parser, Debug)]
pub struct DiscardArgs {
    /// Plate of the unfinished inspection
    pub plate: String,

    /// Skip confirmation
    #[arg(short, long)]
    pub yes: bool,
}

impl DiscardArgs {
    pub async fn execute(self, config: &Config, formatter: OutputFormatter) -> anyhow::Result<ExitCode> {
        let store = Arc::new(open_store(config)?);
        let plate = Plate::new(&self.plate);

        let checkpoint = store.load(&plate).await?.filter(|cp| !cp.is_closed());
        let Some(checkpoint) = checkpoint else {
            return Ok(report(
                &formatter,
                &format!("No unfinished inspection for {plate}"),
                ExitCode::InvalidInput,
            ));
        };

        if !self.yes {
            eprint!(
                "Discard the inspection for {plate} with {} passengers? [y/N] ",
                checkpoint.log.len()
            );
            io::stderr().flush()?;
            let mut input = String::new();
            io::stdin().read_line(&mut input)?;
            if !input.trim().eq_ignore_ascii_case("y") {
                formatter.warning("Nothing discarded");
                return Ok(ExitCode::Success);
            }
        }

        // Discard is resume + cancel
        let nfc = Arc::new(ConsoleNfc::new(false));
        let client = Arc::new(api_client(config)?);
        let mut machine: Machine = InspectionMachine::new(store.clone(), nfc, client);
        let effects = match machine.restore(&plate).await {
            Ok(Some(_)) => machine.cancel().await,
            Ok(None) => Ok(Vec::new()),
            Err(e) => Err(e),
        };
        match effects {
            Ok(effects) => {
                let failed = effects.iter().find_map(|e| match e {
                    SessionEffect::PersistenceWarning(msg) => Some(msg.clone()),
                    _ => None,
                });
                if let Some(msg) = failed {
                    return Ok(report(
                        &formatter,
                        &format!("Could not discard inspection for {plate}: {msg}"),
                        ExitCode::GeneralError,
                    ));
                }
            }
            Err(e) => {
                tracing::warn!(plate = %plate, error = %e, "checkpoint unreadable, deleting it directly");
                store.delete(&plate).await?;
            }
        }

        formatter.success(&format!("Discarded inspection for {plate}"));
        Ok(ExitCode::Success)
    }
}

/// Arguments for the receipt command
#[derive(Parser, Debug)]
pub struct ReceiptArgs {
    /// Inspection id
    pub id: String,
}

// ============================================================================
// Helpers
// ============================================================================

fn api_client(config: &Config) -> anyhow::Result<HttpApiClient> {
    HttpApiClient::with_timeout(
        config.api.base_url.clone(),
        config.api.token(),
        config.api.timeout(),
    )
    .context("Failed to create API client")
}

fn open_store(config: &Config) -> anyhow::Result<SqliteCheckpointStore> {
    let path = config
        .checkpoint_db_path()
        .context("No data directory available for checkpoints")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    SqliteCheckpointStore::new(&path)
        .with_context(|| format!("Failed to open checkpoint store {}", path.display()))
}

fn show_effect(formatter: &OutputFormatter, effect: &SessionEffect) {
    if let Some(line) = formatter.format_effect(effect) {
        println!("{line}");
    }
}

fn print_result(text: String) {
    if !text.is_empty() {
        println!("{text}");
    }
}

fn report(formatter: &OutputFormatter, message: &str, code: ExitCode) -> ExitCode {
    let text = formatter.format_error_with_code(message, code);
    match formatter.format() {
        OutputFormat::Json => println!("{text}"),
        OutputFormat::Table => eprintln!("{text}"),
        OutputFormat::Quiet => {}
    }
    code
}

fn report_api(formatter: &OutputFormatter, context: &str, e: &ApiError) -> ExitCode {
    tracing::debug!(error = ?e, "{context}");
    report(formatter, &format!("{context}: {e}"), ExitCode::from(e))
}

fn report_session(formatter: &OutputFormatter, e: &SessionError) -> ExitCode {
    tracing::debug!(error = ?e, "session error");
    report(formatter, &e.user_message(), ExitCode::from(e))
}
