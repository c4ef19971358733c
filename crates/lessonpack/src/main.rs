//! lessonpack - admin CLI for tutoring packages
//!
//! Wires together:
//! - Configuration loading
//! - Store initialization
//! - Assignment registry (restored from the store on every run)
//! - Periodic expiry sweep

use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use lessonpack_api::{Hours, PaymentMethod};
use lessonpack_config::load_config;
use lessonpack_core::{AssignmentRegistry, AssignmentRequest, PaymentRequest};
use lessonpack_store::{AuditEvent, AuditEventType, SqliteStore, Store};
use lessonpack_util::{
    AdminId, DATABASE_FILENAME, InstanceId, PaymentId, StudentId, TemplateId, TutorId,
    default_config_path, end_of_day,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// lessonpack - Tutoring package lifecycle and hour accounting
#[derive(Parser, Debug)]
#[command(name = "lessonpack")]
#[command(about = "Tutoring package lifecycle and hour accounting", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/lessonpack/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Data directory override (or set LESSONPACK_DATA_DIR env var)
    #[arg(short, long, env = "LESSONPACK_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open a package for a student
    Assign {
        #[arg(long)]
        student: String,

        /// Defaults to the template's tutor
        #[arg(long)]
        tutor: Option<String>,

        #[arg(long)]
        template: String,

        /// Total hours, overriding the template
        #[arg(long, value_parser = parse_hours)]
        hours: Option<Hours>,

        /// Last valid day (YYYY-MM-DD)
        #[arg(long)]
        expires: Option<NaiveDate>,

        #[arg(long)]
        notes: Option<String>,

        /// Admin recorded on the assignment
        #[arg(long, default_value = "admin")]
        by: String,

        /// Allow another open package for the same subject
        #[arg(long)]
        allow_concurrent: bool,
    },

    /// Bind a tutor to a package
    BindTutor {
        instance: InstanceId,

        #[arg(long)]
        tutor: String,

        #[arg(long, default_value = "admin")]
        by: String,
    },

    /// Record a completed lesson
    CompleteLesson {
        instance: InstanceId,

        #[arg(long, value_parser = parse_hours)]
        hours: Hours,
    },

    /// Refund a cancelled lesson
    CancelLesson {
        instance: InstanceId,

        #[arg(long, value_parser = parse_hours)]
        hours: Hours,

        /// Scheduled start (RFC 3339). Applies the refund tiers; without it the
        /// full amount is refunded.
        #[arg(long)]
        lesson_start: Option<DateTime<Utc>>,
    },

    /// Suspend an active package
    Suspend {
        instance: InstanceId,

        #[arg(long)]
        reason: Option<String>,
    },

    /// Resume a suspended package
    Resume { instance: InstanceId },

    /// Close a package regardless of remaining hours
    ForceComplete { instance: InstanceId },

    /// Record an offline payment, pending confirmation
    RecordPayment {
        instance: InstanceId,

        #[arg(long)]
        amount_cents: u64,

        /// bank_transfer, cash, check, card_offline or other
        #[arg(long)]
        method: PaymentMethod,

        /// Bank or receipt reference
        #[arg(long)]
        reference: Option<String>,

        #[arg(long, default_value = "admin")]
        by: String,
    },

    /// Confirm a recorded payment
    ConfirmPayment {
        payment: PaymentId,

        #[arg(long, default_value = "admin")]
        by: String,
    },

    /// List packages of a student or a tutor
    List {
        #[arg(long, conflicts_with = "tutor", required_unless_present = "tutor")]
        student: Option<String>,

        #[arg(long)]
        tutor: Option<String>,
    },

    /// Show one package with its assignment and payment history
    Show { instance: InstanceId },

    /// Withdraw a template from sale
    DeactivateTemplate { template: String },

    /// Expire packages past their expiry date
    Sweep {
        /// Keep sweeping every N seconds until interrupted
        #[arg(long)]
        watch: Option<u64>,
    },

    /// Print recent audit events
    Audit {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn parse_hours(s: &str) -> Result<Hours, String> {
    let value: f64 = s.parse().map_err(|e| format!("{}", e))?;
    Hours::from_hours_f64(value).ok_or_else(|| format!("invalid hours: {}", s))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Loaded configuration, store and registry
struct App {
    registry: AssignmentRegistry,
    store: Arc<dyn Store>,
}

impl App {
    fn open(args: &Args) -> Result<Self> {
        let policy = load_config(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?;

        info!(
            config_path = %args.config.display(),
            template_count = policy.templates.len(),
            "Configuration loaded"
        );

        let data_dir = args
            .data_dir
            .clone()
            .unwrap_or_else(|| policy.engine.data_dir.clone());

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        let db_path = data_dir.join(DATABASE_FILENAME);
        let store: Arc<dyn Store> = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );

        info!(db_path = %db_path.display(), "Store initialized");

        let registry = AssignmentRegistry::new(policy, store.clone());
        registry
            .restore()
            .context("Failed to restore packages from store")?;

        Ok(Self { registry, store })
    }

    async fn run(self, command: Command) -> Result<()> {
        let now = lessonpack_util::now();
        let registry = &self.registry;

        match command {
            Command::Assign {
                student,
                tutor,
                template,
                hours,
                expires,
                notes,
                by,
                allow_concurrent,
            } => {
                let mut request = AssignmentRequest::new(
                    StudentId::new(student),
                    TemplateId::new(template),
                    AdminId::new(by),
                );
                request.tutor_id = tutor.map(TutorId::new);
                request.total_hours = hours;
                request.expiry_date = expires.map(end_of_day);
                request.notes = notes;
                request.allow_concurrent = allow_concurrent;

                let update = registry
                    .create_assignment(request, now)
                    .context("Assignment failed")?;
                print_json(&update)
            }

            Command::BindTutor { instance, tutor, by } => {
                let update = registry
                    .bind_tutor(&instance, TutorId::new(tutor), AdminId::new(by), now)
                    .context("Binding tutor failed")?;
                print_json(&update)
            }

            Command::CompleteLesson { instance, hours } => {
                let update = registry
                    .record_lesson_completion(&instance, hours, now)
                    .context("Recording lesson failed")?;
                print_json(&update)
            }

            Command::CancelLesson {
                instance,
                hours,
                lesson_start,
            } => match lesson_start {
                Some(start) => {
                    let outcome = registry
                        .cancel_booking(&instance, hours, start, now)
                        .context("Cancelling booking failed")?;
                    print_json(&outcome)
                }
                None => {
                    let update = registry
                        .cancel_lesson(&instance, hours, now)
                        .context("Cancelling lesson failed")?;
                    print_json(&update)
                }
            },

            Command::Suspend { instance, reason } => {
                let update = registry
                    .suspend(&instance, reason, now)
                    .context("Suspend failed")?;
                print_json(&update)
            }

            Command::Resume { instance } => {
                let update = registry.resume(&instance, now).context("Resume failed")?;
                print_json(&update)
            }

            Command::ForceComplete { instance } => {
                let update = registry
                    .force_complete(&instance, now)
                    .context("Force complete failed")?;
                print_json(&update)
            }

            Command::RecordPayment {
                instance,
                amount_cents,
                method,
                reference,
                by,
            } => {
                let mut request =
                    PaymentRequest::new(instance, amount_cents, method, AdminId::new(by));
                request.reference = reference;

                let payment = registry
                    .record_payment(request, now)
                    .context("Recording payment failed")?;
                print_json(&payment)
            }

            Command::ConfirmPayment { payment, by } => {
                let confirmation = registry
                    .confirm_payment(&payment, AdminId::new(by), now)
                    .context("Confirming payment failed")?;
                print_json(&confirmation)
            }

            Command::List { student, tutor } => {
                let views = match (student, tutor) {
                    (Some(student), _) => registry.list_by_student(&StudentId::new(student), now),
                    (None, Some(tutor)) => registry.list_by_tutor(&TutorId::new(tutor), now),
                    (None, None) => bail!("either --student or --tutor is required"),
                };
                print_json(&views)
            }

            Command::Show { instance } => {
                #[derive(Serialize)]
                struct Details {
                    package: lessonpack_api::PackageView,
                    assignments: Vec<lessonpack_api::AssignmentRecord>,
                    payments: Vec<lessonpack_api::PaymentRecord>,
                }

                let details = Details {
                    package: registry.view(&instance, now)?,
                    assignments: registry.assignments_for(&instance)?,
                    payments: registry.payments_for(&instance)?,
                };
                print_json(&details)
            }

            Command::DeactivateTemplate { template } => {
                let id = TemplateId::new(template);
                registry
                    .deactivate_template(&id)
                    .context("Deactivating template failed")?;
                println!("Template {} deactivated", id);
                Ok(())
            }

            Command::Sweep { watch: None } => print_json(&registry.sweep(now)),

            Command::Sweep {
                watch: Some(seconds),
            } => self.watch(Duration::from_secs(seconds.max(1))).await,

            Command::Audit { limit } => {
                let events = self
                    .store
                    .get_recent_audits(limit)
                    .context("Failed to read audit log")?;
                print_json(&events)
            }
        }
    }

    /// Sweep on an interval until SIGINT or SIGTERM
    async fn watch(&self, period: Duration) -> Result<()> {
        if let Err(e) = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::ServiceStarted))
        {
            warn!(error = %e, "Failed to log service start");
        }

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
        let mut timer = tokio::time::interval(period);

        info!(period_secs = period.as_secs(), "Watching for expiries");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, stopping sweep");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, stopping sweep");
                    break;
                }
                _ = timer.tick() => {
                    for event in self.registry.sweep(lessonpack_util::now()) {
                        println!("{}", serde_json::to_string(&event)?);
                    }
                }
            }
        }

        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout stays machine-readable
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "lessonpack starting");

    if lessonpack_util::is_mock_time_active() {
        warn!(now = %lessonpack_util::now(), "Mock time is active");
    }

    let app = App::open(&args)?;
    app.run(args.command).await
}
