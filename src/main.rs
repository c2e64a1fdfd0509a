use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use prontuario_auth::{AuthError, IdentityClient, Session, SignUp};
use prontuario_core::constants::SAVE_FAILED_MESSAGE;
use prontuario_core::{
    decide, CoreConfig, GateDecision, PatientError, ReportLogService, Route, RosterService,
};
use prontuario_model::{NonEmptyText, PatientDraft, PatientId, PatientRecord, ReportDraft};
use prontuario_store::{PostgrestStore, RecordStore};
use std::io::Write;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const ENV_PROJECT_URL: &str = "PRONTUARIO_PROJECT_URL";
const ENV_API_KEY: &str = "PRONTUARIO_API_KEY";
const ENV_PATIENTS_TABLE: &str = "PRONTUARIO_PATIENTS_TABLE";
const ENV_ACCESS_TOKEN: &str = "PRONTUARIO_ACCESS_TOKEN";
const ENV_EMAIL: &str = "PRONTUARIO_EMAIL";
const ENV_PASSWORD: &str = "PRONTUARIO_PASSWORD";

#[derive(Parser)]
#[command(
    name = "prontuario",
    about = "Patient roster and evolution reports for a therapy practice"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with the configured email and password
    SignIn,
    /// Register a new account
    SignUp {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        /// Repeat of the password; must match when given
        #[arg(long)]
        confirm: Option<String>,
    },
    /// Revoke the current session
    SignOut,
    /// Email a password recovery link
    ResetPassword {
        #[arg(long)]
        email: String,
        /// Where the emailed link lands, typically a password update page
        #[arg(long)]
        redirect_to: Option<String>,
    },
    /// Set a new password, usually from a recovery link session
    UpdatePassword {
        #[arg(long)]
        password: String,
        #[arg(long)]
        confirm: String,
    },
    /// Work with the patient roster
    #[command(subcommand)]
    Patients(PatientsCommand),
    /// Work with a patient's evolution reports
    #[command(subcommand)]
    Reports(ReportsCommand),
}

#[derive(Subcommand)]
enum PatientsCommand {
    /// List patients, optionally filtered by name
    List {
        /// Case-insensitive name fragment
        #[arg(long)]
        search: Option<String>,
    },
    /// Register a new patient
    Add {
        #[arg(long)]
        name: NonEmptyText,
        #[arg(long, default_value_t = 0)]
        age: u32,
        /// Document number; must not collide with an existing patient
        #[arg(long, default_value = "")]
        doc: String,
        #[arg(long)]
        cid: Option<String>,
        #[arg(long)]
        birthday: Option<NaiveDate>,
        #[arg(long)]
        guardian: Option<String>,
        #[arg(long)]
        gender: Option<String>,
        #[arg(long)]
        doctor: Option<String>,
        #[arg(long)]
        doc_doctor: Option<String>,
        #[arg(long)]
        expertise: Option<String>,
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        uf: Option<String>,
    },
    /// Change an existing patient; omitted flags keep their current value
    Edit {
        #[arg(long)]
        id: PatientId,
        #[arg(long)]
        name: Option<NonEmptyText>,
        #[arg(long)]
        age: Option<u32>,
        #[arg(long)]
        doc: Option<String>,
        /// Pass an empty string to clear
        #[arg(long)]
        cid: Option<String>,
        #[arg(long)]
        birthday: Option<NaiveDate>,
        #[arg(long)]
        guardian: Option<String>,
        #[arg(long)]
        gender: Option<String>,
        #[arg(long)]
        doctor: Option<String>,
        #[arg(long)]
        doc_doctor: Option<String>,
        #[arg(long)]
        expertise: Option<String>,
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        uf: Option<String>,
    },
    /// Delete a patient after confirmation
    Delete {
        #[arg(long)]
        id: PatientId,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum ReportsCommand {
    /// Show a patient's reports, newest first
    Show {
        #[arg(long)]
        patient_id: PatientId,
    },
    /// Append a report to a patient's log
    Add {
        #[arg(long)]
        patient_id: PatientId,
        #[arg(long)]
        content: String,
        /// Report date, defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

/// Entry point for the prontuario command line.
///
/// Resolves configuration and a session once, then routes the command
/// through the session gate before running it.
///
/// # Environment Variables
/// - `PRONTUARIO_PROJECT_URL`: Hosted project root URL
/// - `PRONTUARIO_API_KEY`: The project's anonymous API key
/// - `PRONTUARIO_PATIENTS_TABLE`: Patients table name (default: "pacientes")
/// - `PRONTUARIO_ACCESS_TOKEN`: Access token to reuse instead of signing in
/// - `PRONTUARIO_EMAIL` / `PRONTUARIO_PASSWORD`: Credentials to sign in with
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("prontuario=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("No command given. Try `prontuario --help`.");
        return Ok(());
    };

    let config = config_from_env()?;
    let identity = IdentityClient::new(config.project_url(), config.api_key())?;

    let mut changes = identity.subscribe();
    tokio::spawn(async move {
        while changes.changed().await.is_ok() {
            if let Some(change) = changes.borrow_and_update().clone() {
                tracing::info!("session changed: {:?}", change.event);
            }
        }
    });

    let session = resolve_session(&identity).await?;

    match decide(route_for(&command), session.as_ref()) {
        GateDecision::Proceed => run(command, &config, &identity, session).await,
        GateDecision::RedirectToSignIn => {
            eprintln!(
                "You are not signed in. Set {ENV_EMAIL} and {ENV_PASSWORD} \
                 (or {ENV_ACCESS_TOKEN}) and try again."
            );
            std::process::exit(2);
        }
        GateDecision::RedirectToRoster => {
            println!("Already signed in; showing the patient roster.");
            if let Some(session) = session {
                let store = patient_store(&config, &session)?;
                let service = RosterService::activate(store).await;
                let all: Vec<&PatientRecord> = service.patients().iter().collect();
                print_roster(&all);
            }
            Ok(())
        }
    }
}

async fn run(
    command: Commands,
    config: &CoreConfig,
    identity: &IdentityClient,
    session: Option<Session>,
) -> anyhow::Result<()> {
    match command {
        // Reached only while signed out; with a valid session the gate
        // redirects to the roster instead.
        Commands::SignIn => {
            println!(
                "No usable credentials. Set {ENV_EMAIL} and {ENV_PASSWORD}; \
                 commands sign in on demand."
            );
            Ok(())
        }
        Commands::SignUp { email, password, confirm } => {
            if !passwords_match(&password, confirm.as_deref()) {
                eprintln!("The passwords do not match.");
                std::process::exit(1);
            }
            match identity.sign_up(&email, &password).await? {
                SignUp::SignedIn(session) => {
                    println!("Account created; signed in as {}.", session.user().email);
                }
                SignUp::ConfirmationRequired { email } => {
                    println!("Account created. Confirm the link sent to {email}, then sign in.");
                }
            }
            Ok(())
        }
        Commands::SignOut => {
            if let Some(session) = session {
                identity.sign_out(&session).await?;
                println!("Signed out.");
            }
            Ok(())
        }
        Commands::ResetPassword { email, redirect_to } => {
            identity
                .request_password_reset(&email, redirect_to.as_deref())
                .await?;
            println!("Recovery link sent to {email}.");
            Ok(())
        }
        Commands::UpdatePassword { password, confirm } => {
            if !passwords_match(&password, Some(confirm.as_str())) {
                eprintln!("The passwords do not match.");
                std::process::exit(1);
            }
            let Some(session) = session else {
                eprintln!(
                    "Password updates need a session. Set {ENV_ACCESS_TOKEN} to the \
                     token from the recovery link."
                );
                std::process::exit(1);
            };
            identity.update_password(&session, &password).await?;
            println!("Password updated.");
            Ok(())
        }
        Commands::Patients(command) => {
            let session = require_session(session)?;
            let store = patient_store(config, &session)?;
            run_patients(command, store).await
        }
        Commands::Reports(command) => {
            let session = require_session(session)?;
            let store = patient_store(config, &session)?;
            run_reports(command, store).await
        }
    }
}

async fn run_patients(command: PatientsCommand, store: Arc<dyn RecordStore>) -> anyhow::Result<()> {
    let mut service = RosterService::activate(store).await;

    match command {
        PatientsCommand::List { search } => {
            let listed = match &search {
                Some(term) => service.search(term),
                None => service.patients().iter().collect(),
            };
            print_roster(&listed);
            Ok(())
        }
        PatientsCommand::Add {
            name,
            age,
            doc,
            cid,
            birthday,
            guardian,
            gender,
            doctor,
            doc_doctor,
            expertise,
            city,
            uf,
        } => {
            let draft = PatientDraft {
                id: None,
                name,
                age,
                doc,
                cid: blank_to_none(cid),
                birthday,
                guardian: blank_to_none(guardian),
                gender: blank_to_none(gender),
                doctor: blank_to_none(doctor),
                doc_doctor: blank_to_none(doc_doctor),
                expertise: blank_to_none(expertise),
                city: blank_to_none(city),
                uf: blank_to_none(uf),
            };
            match service.save(&draft).await {
                Ok(outcome) => {
                    let record = outcome.record();
                    println!("Created patient {} ({}).", record.name, record.id);
                    Ok(())
                }
                Err(e @ PatientError::DuplicateDocument) => {
                    eprintln!("{e}");
                    std::process::exit(1);
                }
                // The service already logged the cause.
                Err(_) => {
                    eprintln!("{SAVE_FAILED_MESSAGE}");
                    std::process::exit(1);
                }
            }
        }
        PatientsCommand::Edit {
            id,
            name,
            age,
            doc,
            cid,
            birthday,
            guardian,
            gender,
            doctor,
            doc_doctor,
            expertise,
            city,
            uf,
        } => {
            let Some(current) = service.find(id).cloned() else {
                eprintln!("Patient not found.");
                std::process::exit(1);
            };

            let mut draft = PatientDraft::from_record(&current)?;
            if let Some(name) = name {
                draft.name = name;
            }
            if let Some(age) = age {
                draft.age = age;
            }
            if let Some(doc) = doc {
                draft.doc = doc;
            }
            if let Some(cid) = cid {
                draft.cid = blank_to_none(Some(cid));
            }
            if let Some(birthday) = birthday {
                draft.birthday = Some(birthday);
            }
            if let Some(guardian) = guardian {
                draft.guardian = blank_to_none(Some(guardian));
            }
            if let Some(gender) = gender {
                draft.gender = blank_to_none(Some(gender));
            }
            if let Some(doctor) = doctor {
                draft.doctor = blank_to_none(Some(doctor));
            }
            if let Some(doc_doctor) = doc_doctor {
                draft.doc_doctor = blank_to_none(Some(doc_doctor));
            }
            if let Some(expertise) = expertise {
                draft.expertise = blank_to_none(Some(expertise));
            }
            if let Some(city) = city {
                draft.city = blank_to_none(Some(city));
            }
            if let Some(uf) = uf {
                draft.uf = blank_to_none(Some(uf));
            }

            match service.save(&draft).await {
                Ok(outcome) => {
                    let record = outcome.record();
                    println!("Saved patient {} ({}).", record.name, record.id);
                    Ok(())
                }
                Err(_) => {
                    eprintln!("{SAVE_FAILED_MESSAGE}");
                    std::process::exit(1);
                }
            }
        }
        PatientsCommand::Delete { id, yes } => {
            let Some(current) = service.find(id).cloned() else {
                eprintln!("Patient not found.");
                std::process::exit(1);
            };
            if !yes && !confirm_deletion(&current.name)? {
                println!("Nothing deleted.");
                return Ok(());
            }

            let before = service.patients().len();
            service.delete(id).await;
            if service.patients().len() < before {
                println!("Patient {} deleted.", current.name);
            } else {
                println!(
                    "Patient {} was not removed; see the log for details.",
                    current.name
                );
            }
            Ok(())
        }
    }
}

async fn run_reports(command: ReportsCommand, store: Arc<dyn RecordStore>) -> anyhow::Result<()> {
    match command {
        ReportsCommand::Show { patient_id } => {
            let log = match ReportLogService::load(store, patient_id).await {
                Ok(log) => log,
                Err(_) => {
                    eprintln!("Patient not found.");
                    std::process::exit(1);
                }
            };

            println!("Reports for {}:", log.patient_name());
            let reports = log.reports_newest_first();
            if reports.is_empty() {
                println!("No reports found.");
            } else {
                for report in reports {
                    println!("[{}] {}", report.date, report.content);
                }
            }
            Ok(())
        }
        ReportsCommand::Add {
            patient_id,
            content,
            date,
        } => {
            // Validated before anything is loaded or written.
            let Ok(draft) = ReportDraft::new(date, &content) else {
                eprintln!("Report content is empty; nothing was saved.");
                return Ok(());
            };

            let mut log = match ReportLogService::load(store, patient_id).await {
                Ok(log) => log,
                Err(_) => {
                    eprintln!("Patient not found.");
                    std::process::exit(1);
                }
            };

            match log.append(draft).await {
                Ok(report) => {
                    println!(
                        "Report saved for {} ({} on file).",
                        log.patient_name(),
                        log.reports().len()
                    );
                    tracing::debug!("report {} stored", report.id);
                    Ok(())
                }
                Err(_) => {
                    eprintln!("The report was not saved; your text was kept:\n{content}");
                    std::process::exit(1);
                }
            }
        }
    }
}

// ============================================================================
// STARTUP HELPERS
// ============================================================================

fn config_from_env() -> anyhow::Result<CoreConfig> {
    let project_url = std::env::var(ENV_PROJECT_URL).unwrap_or_default();
    let api_key = std::env::var(ENV_API_KEY).unwrap_or_default();
    let table = std::env::var(ENV_PATIENTS_TABLE).ok();
    Ok(CoreConfig::new(&project_url, &api_key, table.as_deref())?)
}

/// Resolves a session from the environment: a stored access token first,
/// then an email and password pair. Neither set means signed out.
async fn resolve_session(identity: &IdentityClient) -> anyhow::Result<Option<Session>> {
    if let Ok(token) = std::env::var(ENV_ACCESS_TOKEN) {
        let token = token.trim().to_owned();
        if !token.is_empty() {
            match identity.current_user(&token).await {
                Ok(session) => return Ok(Some(session)),
                Err(AuthError::SessionExpired | AuthError::MalformedToken) => {
                    tracing::warn!("ignoring the stored access token - expired or unreadable");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    let email = std::env::var(ENV_EMAIL).ok().filter(|v| !v.trim().is_empty());
    let password = std::env::var(ENV_PASSWORD)
        .ok()
        .filter(|v| !v.trim().is_empty());
    if let (Some(email), Some(password)) = (email, password) {
        let session = identity.sign_in(email.trim(), &password).await?;
        return Ok(Some(session));
    }
    Ok(None)
}

fn route_for(command: &Commands) -> Route {
    match command {
        Commands::SignIn => Route::SignIn,
        Commands::SignUp { .. } => Route::SignUp,
        Commands::ResetPassword { .. } => Route::PasswordReset,
        Commands::UpdatePassword { .. } => Route::PasswordUpdate,
        Commands::SignOut | Commands::Patients(_) => Route::Roster,
        Commands::Reports(_) => Route::PatientReports,
    }
}

fn require_session(session: Option<Session>) -> anyhow::Result<Session> {
    session.ok_or_else(|| anyhow::anyhow!("a signed-in session is required"))
}

fn patient_store(config: &CoreConfig, session: &Session) -> anyhow::Result<Arc<dyn RecordStore>> {
    let store = PostgrestStore::new(
        config.project_url(),
        config.api_key(),
        config.patients_table(),
        session.access_token(),
    )?;
    Ok(Arc::new(store))
}

// ============================================================================
// OUTPUT HELPERS
// ============================================================================

fn print_roster(patients: &[&PatientRecord]) {
    if patients.is_empty() {
        println!("No patients found.");
        return;
    }
    for patient in patients {
        println!(
            "ID: {}, Name: {}, Doc: {}, Age: {}",
            patient.id, patient.name, patient.doc, patient.age
        );
    }
}

/// Empty or whitespace-only optional flags count as not provided; on an
/// edit an explicit empty string clears the field.
fn blank_to_none(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Whether the typed password confirmation matches. A missing confirmation
/// counts as matching.
fn passwords_match(password: &str, confirm: Option<&str>) -> bool {
    confirm.map_or(true, |confirm| confirm == password)
}

fn confirm_deletion(name: &str) -> anyhow::Result<bool> {
    print!("Delete patient {name}? [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
