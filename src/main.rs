use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lendflow::cases::{Actor, CaseKey, CaseStatus, NewCase};
use lendflow::config::{config, init_config, LendflowConfig};
use lendflow::notify::{HttpPushSender, PushSender};
use lendflow::store::{InboxRepository, SqliteStore};
use lendflow::telemetry::{init_telemetry, shutdown_telemetry};
use lendflow::LendflowServices;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "lendflow")]
#[command(about = "Loan case lifecycle and notification fan-out")]
#[command(long_about = "Lendflow issues per-organization case numbers, moves loan cases through \
                       their review workflow and notifies the people responsible for each case.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Issue the next case number for an organization
    NextNumber {
        #[arg(long, help = "Organization identifier")]
        org: String,
    },
    /// Open a new case in the pending state
    Open {
        #[arg(long, help = "Organization identifier")]
        org: String,
        #[arg(long, help = "Employee creating the case")]
        creator: String,
        #[arg(long, help = "Branch the case belongs to")]
        branch: String,
    },
    /// Move a case to another status and notify its audience
    Status {
        #[arg(long, help = "Organization identifier")]
        org: String,
        #[arg(long = "case", help = "Case number within the organization")]
        case_number: i64,
        #[arg(long, help = "Target status: review, task_pending, approved, rejected")]
        target: CaseStatus,
        #[arg(long, help = "Employee performing the change")]
        actor_id: String,
        #[arg(long, help = "Display name used in notification text")]
        actor_name: String,
        #[arg(long, help = "Report attached to the change, as JSON")]
        report: Option<String>,
    },
    /// Record a step verification without changing status
    Verify {
        #[arg(long, help = "Organization identifier")]
        org: String,
        #[arg(long = "case", help = "Case number within the organization")]
        case_number: i64,
        #[arg(long, help = "Step name")]
        step: String,
        #[arg(long, help = "Record the step as unverified instead")]
        unverified: bool,
        #[arg(long, help = "Employee performing the verification")]
        actor_id: String,
    },
    /// List an employee's notifications, newest first
    Inbox {
        #[arg(long, help = "Organization identifier")]
        org: String,
        #[arg(long, help = "Employee identifier")]
        employee: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _ = LendflowConfig::load_env_file();
    let settings = config()?;
    init_telemetry(&settings.observability)?;
    init_config()?;

    let result = tokio::runtime::Runtime::new()?.block_on(run(cli.command, settings));
    shutdown_telemetry();
    result
}

async fn run(command: Commands, settings: &LendflowConfig) -> Result<()> {
    let database = settings.database.clone().unwrap_or_default();
    let store = Arc::new(
        SqliteStore::connect(&database.url, database.max_connections, database.auto_migrate)
            .await
            .with_context(|| format!("Failed to open database {}", database.url))?,
    );

    if let Commands::Migrate = command {
        store.migrate().await?;
        println!("Migrations applied to {}", database.url);
        store.shutdown().await;
        return Ok(());
    }

    let push = HttpPushSender::from_config(
        &settings.notifications.push,
        settings.notifications.push_timeout(),
    )?
    .map(|sender| Arc::new(sender) as Arc<dyn PushSender>);

    let services = LendflowServices::build(
        store.clone(),
        &settings.notifications,
        &settings.sequence,
        push,
    );
    let outcome = execute(command, &services, &store).await;

    services
        .shutdown(settings.notifications.drain_timeout())
        .await;
    store.shutdown().await;
    outcome
}

async fn execute(command: Commands, services: &LendflowServices, store: &SqliteStore) -> Result<()> {
    let lifecycle = &services.lifecycle;
    match command {
        Commands::Migrate => Ok(()),
        Commands::NextNumber { org } => {
            let number = lifecycle.create_case_number(&org).await?;
            println!("{number}");
            Ok(())
        }
        Commands::Open {
            org,
            creator,
            branch,
        } => {
            let case = lifecycle
                .open_case(NewCase {
                    organization_id: org,
                    creator_id: creator,
                    branch,
                })
                .await?;
            println!("Opened case {} ({})", case.key(), case.id);
            Ok(())
        }
        Commands::Status {
            org,
            case_number,
            target,
            actor_id,
            actor_name,
            report,
        } => {
            let payload = report
                .map(|raw| serde_json::from_str(&raw))
                .transpose()
                .context("--report must be valid JSON")?;
            let key = CaseKey::new(org, case_number);
            let case = lifecycle
                .change_status(&key, target, &Actor::new(actor_id, actor_name), payload)
                .await?;
            println!("Case {} is now {}", case.key(), case.status);
            Ok(())
        }
        Commands::Verify {
            org,
            case_number,
            step,
            unverified,
            actor_id,
        } => {
            let key = CaseKey::new(org, case_number);
            let actor = Actor::new(actor_id.clone(), actor_id);
            let case = lifecycle
                .set_step_verified(&key, &step, !unverified, &actor)
                .await?;
            let state = if unverified { "unverified" } else { "verified" };
            println!("Step '{step}' {state} on case {}", case.key());
            Ok(())
        }
        Commands::Inbox { org, employee } => {
            let records = store.notifications_for(&org, &employee).await?;
            if records.is_empty() {
                println!("No notifications for {employee}");
            }
            for record in records {
                let marker = if record.read { " " } else { "*" };
                println!(
                    "{marker} {} #{} {}: {}",
                    record.created_at.format("%Y-%m-%d %H:%M"),
                    record.case_ref.case_number,
                    record.title,
                    record.body
                );
            }
            Ok(())
        }
    }
}
