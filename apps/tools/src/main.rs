use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use shared::{
    domain::{
        ClubId, ClubKind, NewMember, NewServiceProject, NewSpeaker, ProjectStatus, SpeakerStatus,
    },
    protocol::Table,
};
use storage::Storage;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://data/clubdesk.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database if needed and apply pending migrations.
    Migrate,
    CreateClub {
        name: String,
        #[arg(default_value = "rotary")]
        kind: ClubKind,
    },
    ListClubs,
    /// Fill a club with a handful of speakers, members and projects.
    SeedDemo {
        club_id: i64,
    },
    /// Rewrite positions in a status column to 0..n.
    Renumber {
        club_id: i64,
        table: Table,
        /// Every status of the table when omitted.
        #[arg(long)]
        status: Option<String>,
    },
    Schema,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct SeedSummary {
    speakers: usize,
    members: usize,
    projects: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::Migrate => {
            println!("migrations applied to {}", cli.database_url);
        }
        Command::CreateClub { name, kind } => {
            let club_id = storage.create_club(&name, kind).await?;
            println!("created club_id={} kind={kind}", club_id.0);
        }
        Command::ListClubs => {
            for club in storage.list_clubs().await? {
                println!("{}\t{}\t{}", club.id.0, club.kind, club.name);
            }
        }
        Command::SeedDemo { club_id } => {
            let summary = seed_demo(&storage, ClubId(club_id)).await?;
            println!(
                "seeded club_id={club_id}: {} speakers, {} members, {} projects",
                summary.speakers, summary.members, summary.projects
            );
        }
        Command::Renumber {
            club_id,
            table,
            status,
        } => {
            let changed = renumber(&storage, ClubId(club_id), table, status.as_deref()).await?;
            println!("renumbered {changed} rows in {table}");
        }
        Command::Schema => {
            for (name, sql) in storage.schema().await? {
                println!("-- {name}\n{sql};\n");
            }
        }
    }

    Ok(())
}

async fn seed_demo(storage: &Storage, club_id: ClubId) -> Result<SeedSummary> {
    if storage.club(club_id).await?.is_none() {
        return Err(anyhow!("club {} does not exist", club_id.0));
    }
    let mut summary = SeedSummary::default();
    for speaker in demo_speakers() {
        storage.insert_speaker(club_id, &speaker).await?;
        summary.speakers += 1;
    }
    for member in demo_members() {
        storage.insert_member(club_id, &member).await?;
        summary.members += 1;
    }
    for project in demo_projects() {
        storage.insert_project(club_id, &project).await?;
        summary.projects += 1;
    }
    Ok(summary)
}

async fn renumber(
    storage: &Storage,
    club_id: ClubId,
    table: Table,
    status: Option<&str>,
) -> Result<u64> {
    let statuses: Vec<&str> = match (table, status) {
        (Table::Members, _) => return Err(anyhow!("members have no manual ordering")),
        (_, Some(status)) => vec![status],
        (Table::Speakers, None) => SpeakerStatus::ALL.iter().map(|s| s.as_str()).collect(),
        (Table::Projects, None) => ProjectStatus::ALL.iter().map(|s| s.as_str()).collect(),
    };
    let mut changed = 0;
    for status in statuses {
        changed += storage.renumber_positions(table, club_id, status).await?;
    }
    Ok(changed)
}

fn demo_speakers() -> Vec<NewSpeaker> {
    let speaker = |name: &str, topic: &str, status: SpeakerStatus, scheduled_date: Option<NaiveDate>| NewSpeaker {
        name: name.to_string(),
        topic: Some(topic.to_string()),
        status,
        scheduled_date,
        ..NewSpeaker::default()
    };
    vec![
        speaker("Dr. Amara Lim", "Dengue prevention in Penang", SpeakerStatus::Scheduled, NaiveDate::from_ymd_opt(2025, 3, 12)),
        speaker("Rajesh Kumar", "Heritage shophouse restoration", SpeakerStatus::Agreed, None),
        speaker("Siti Rahman", "Microfinance for hawkers", SpeakerStatus::Approached, None),
        speaker("Tan Wei Ming", "Youth coding clubs", SpeakerStatus::Ideas, None),
        speaker("Nora Haddad", "Clean water in Kedah", SpeakerStatus::Spoken, NaiveDate::from_ymd_opt(2025, 1, 8)),
    ]
}

fn demo_members() -> Vec<NewMember> {
    let member = |name: &str, classification: &str, role: Option<&str>| NewMember {
        name: name.to_string(),
        email: None,
        phone: None,
        classification: Some(classification.to_string()),
        role: role.map(str::to_string),
        member_since: NaiveDate::from_ymd_opt(2019, 7, 1),
        active: true,
    };
    vec![
        member("Lee Chong Wei", "Banking", Some("President")),
        member("Priya Nair", "Medicine", Some("Secretary")),
        member("Ahmad Faiz", "Architecture", None),
    ]
}

fn demo_projects() -> Vec<NewServiceProject> {
    let project = |name: &str, area: &str, status: ProjectStatus| NewServiceProject {
        name: name.to_string(),
        area_of_focus: Some(area.to_string()),
        status,
        ..NewServiceProject::default()
    };
    vec![
        project("School library refit", "Basic education and literacy", ProjectStatus::Execution),
        project("Mangrove replanting", "Environment", ProjectStatus::Planning),
        project("Blood drive", "Disease prevention", ProjectStatus::Idea),
    ]
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
