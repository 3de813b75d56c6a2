use chrono::Utc;
use clap::{Parser, Subcommand};

use crate::app_state::AppState;
use crate::modules::ledger::LedgerStore;

#[derive(Parser)]
#[command(name = "feeledger")]
#[command(about = "Fee ledger and payment reconciliation service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Run database migrations
    Migrate,

    /// Repair installments and payments whose status or balance drifted
    Repair {
        /// Only repair this student
        #[arg(long, value_name = "STUDENT_ID")]
        student: Option<String>,

        /// Report what would change without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Recompute a student's balance fields from their ledger
    Recompute {
        #[arg(value_name = "STUDENT_ID")]
        student_id: String,
    },

    /// Mark past-due pending installments overdue
    SweepOverdue {
        /// Only sweep this student
        #[arg(long, value_name = "STUDENT_ID")]
        student: Option<String>,
    },
}

pub async fn handle_repair(
    state: &AppState,
    student: Option<&str>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let report = state.repair.run(student, dry_run).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.failures.is_empty() {
        anyhow::bail!("{} ledger(s) could not be repaired", report.failures.len());
    }
    Ok(())
}

pub async fn handle_recompute(state: &AppState, student_id: &str) -> anyhow::Result<()> {
    let balance = state
        .reconciliation
        .recompute_student_balance(student_id)
        .await?;

    println!("{}", serde_json::to_string_pretty(&balance)?);
    Ok(())
}

pub async fn handle_sweep_overdue(state: &AppState, student: Option<&str>) -> anyhow::Result<()> {
    let student_ids = match student {
        Some(id) => vec![id.to_string()],
        None => state.store.list_student_ids().await?,
    };

    let today = Utc::now().date_naive();
    let mut marked = 0;
    for student_id in &student_ids {
        marked += state
            .reconciliation
            .mark_overdue(student_id, today)
            .await?;
    }

    println!(
        "Marked {} installment(s) overdue across {} student(s)",
        marked,
        student_ids.len()
    );
    Ok(())
}
