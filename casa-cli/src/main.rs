use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use uuid::Uuid;

use casa_core::CasaService;
use casa_schema::NewLead;
use casa_store::InMemoryStore;
use casa_types::{LeadSource, LeadStatus};

#[derive(Parser)]
#[command(name = "casa")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Seed sample leads and print the dashboard.
    Demo,
    /// Import a CSV file and print the per-row tally.
    Import {
        path: PathBuf,
        /// Re-export the imported set to this file afterwards.
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Import a CSV file and print dashboard + analytics breakdowns.
    Stats { path: PathBuf },
}

/// Dev harness: a fresh in-memory store with a bootstrap admin acting as
/// the caller.
fn dev_service() -> (CasaService, Uuid) {
    let admin = Uuid::new_v4();
    let store = Arc::new(InMemoryStore::with_admin(admin, "Dev Admin"));
    (CasaService::new(store), admin)
}

async fn seed_demo(service: &CasaService, caller: Uuid) -> anyhow::Result<()> {
    let samples = [
        ("John", "Doe", "john@example.com", LeadStatus::New, LeadSource::Website, 3),
        ("Jane", "Smith", "jane@example.com", LeadStatus::Contacted, LeadSource::Referral, 4),
        ("Ann", "Lee", "ann@example.com", LeadStatus::Qualified, LeadSource::SocialMedia, 5),
        ("Bob", "Ray", "bob@example.com", LeadStatus::New, LeadSource::ColdCall, 2),
    ];
    for (first, last, email, status, source, priority) in samples {
        let mut draft = NewLead::new(first, last, email);
        draft.status = status;
        draft.source = source;
        draft.priority = priority;
        service.create_lead(caller, draft).await?;
    }
    Ok(())
}

async fn print_stats(service: &CasaService, caller: Uuid) -> anyhow::Result<()> {
    let stats = service.dashboard_stats(caller).await?;
    println!("total leads: {}", stats.total_leads);
    for (status, count) in &stats.by_status {
        println!("  {status}: {count}");
    }
    println!("assigned to me: {}", stats.my_leads);
    println!("follow-ups due: {}", stats.follow_ups_due);

    let analytics = service.analytics(caller).await?;
    println!("by source:");
    for (source, count) in &analytics.by_source {
        println!("  {source}: {count}");
    }
    println!("by priority:");
    for (priority, count) in &analytics.by_priority {
        println!("  {priority}: {count}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Demo => {
            let (service, caller) = dev_service();
            seed_demo(&service, caller).await?;
            print_stats(&service, caller).await?;
        }
        Command::Import { path, export } => {
            let (service, caller) = dev_service();
            let text = std::fs::read_to_string(&path)?;
            let report = service.import_csv(caller, &text).await?;
            println!(
                "imported {}/{} rows",
                report.success_count, report.total_rows
            );
            for err in &report.errors {
                println!("  row {}: {}", err.row, err.message);
            }
            if let Some(out) = export {
                let csv = service.export_csv(caller).await?;
                std::fs::write(&out, csv)?;
                println!("exported to {}", out.display());
            }
        }
        Command::Stats { path } => {
            let (service, caller) = dev_service();
            let text = std::fs::read_to_string(&path)?;
            let report = service.import_csv(caller, &text).await?;
            if !report.errors.is_empty() {
                println!("{} rows skipped", report.errors.len());
            }
            print_stats(&service, caller).await?;
        }
    }

    Ok(())
}
