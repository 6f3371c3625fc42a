use std::{error::Error as StdError, path::PathBuf, str::FromStr, sync::Arc, time::Duration};

use anyhow::{anyhow, bail, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use client_core::{
    export::{select_columns, to_csv},
    record::{Fields, Pipelined, Record, Searchable},
    view::{sort_by_field, visible, SortSpec, StatusFilter, ViewFilter, ViewMode},
    Collection, HttpRemoteStore, RequestGate, RetryConfig,
};
use shared::{
    domain::{ClubId, Member, ServiceProject, Speaker},
    protocol::{ChangeMask, SelectQuery, Table},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod render;

#[derive(Parser, Debug)]
#[command(name = "clubdesk", about = "Speaker pipeline, member directory and service projects")]
struct Cli {
    #[arg(long, env = "CLUBDESK_SERVER_URL", default_value = "http://127.0.0.1:8787")]
    server_url: String,
    #[arg(long, env = "CLUBDESK_CLUB_ID")]
    club_id: i64,
    /// Retries for transient store failures.
    #[arg(long, default_value_t = 3)]
    max_retries: u32,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(subcommand)]
    Speakers(PipelineCommand),
    #[command(subcommand)]
    Members(DirectoryCommand),
    #[command(subcommand)]
    Projects(PipelineCommand),
    /// Follow live changes to a table until interrupted.
    Watch {
        table: Table,
        #[arg(long, default_value = "insert,update,delete")]
        events: String,
    },
}

#[derive(Subcommand, Debug)]
enum PipelineCommand {
    List(ListArgs),
    Export(ExportArgs),
    /// Move a row to the end of another status column.
    Move { id: i64, status: String },
    /// Move the row at index `from` of a status column to index `to`.
    Reorder {
        status: String,
        from: usize,
        to: usize,
    },
}

#[derive(Subcommand, Debug)]
enum DirectoryCommand {
    List(ListArgs),
    Export(ExportArgs),
}

#[derive(Args, Debug)]
struct ListArgs {
    #[arg(long)]
    search: Option<String>,
    /// `all`, `active`, or a single status.
    #[arg(long, default_value = "all")]
    status: String,
    #[arg(long, value_enum, default_value_t = ViewKind::Table)]
    view: ViewKind,
    #[arg(long, default_value = "name")]
    sort: String,
    #[arg(long)]
    desc: bool,
}

#[derive(Args, Debug)]
struct ExportArgs {
    #[arg(long, value_delimiter = ',', required = true)]
    columns: Vec<String>,
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long)]
    search: Option<String>,
    #[arg(long, default_value = "all")]
    status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ViewKind {
    Table,
    Board,
}

struct Context {
    server_url: String,
    club_id: ClubId,
    retry: RetryConfig,
    export_gate: RequestGate,
}

const SPEAKER_COLUMNS: &[&str] = &["name", "organization", "topic", "status", "scheduled_date"];
const MEMBER_COLUMNS: &[&str] = &["name", "classification", "role", "member_since", "active"];
const PROJECT_COLUMNS: &[&str] = &["name", "area_of_focus", "status", "lead", "start_date"];

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();
    let cli = Cli::parse();
    let ctx = Context {
        server_url: cli.server_url,
        club_id: ClubId(cli.club_id),
        retry: RetryConfig {
            max_retries: cli.max_retries,
            ..RetryConfig::default()
        },
        export_gate: RequestGate::new(),
    };

    match cli.command {
        Command::Speakers(command) => run_pipeline::<Speaker>(&ctx, command, SPEAKER_COLUMNS).await,
        Command::Projects(command) => {
            run_pipeline::<ServiceProject>(&ctx, command, PROJECT_COLUMNS).await
        }
        Command::Members(command) => run_directory(&ctx, command).await,
        Command::Watch { table, events } => {
            let mask = ChangeMask::from_query(&events);
            match table {
                Table::Speakers => watch::<Speaker>(&ctx, mask, SPEAKER_COLUMNS).await,
                Table::Members => watch::<Member>(&ctx, mask, MEMBER_COLUMNS).await,
                Table::Projects => watch::<ServiceProject>(&ctx, mask, PROJECT_COLUMNS).await,
            }
        }
    }
}

async fn load<T: Record>(ctx: &Context) -> Result<Collection<T, HttpRemoteStore<T>>> {
    let store = Arc::new(HttpRemoteStore::<T>::new(&ctx.server_url, ctx.club_id)?);
    let collection = Collection::with_retry(store, SelectQuery::new(), ctx.retry.clone());
    collection.refetch().await?;
    Ok(collection)
}

async fn run_pipeline<T>(ctx: &Context, command: PipelineCommand, columns: &[&str]) -> Result<()>
where
    T: Pipelined + Searchable + Fields,
    T::Status: FromStr,
    <T::Status as FromStr>::Err: StdError + Send + Sync + 'static,
{
    let collection = load::<T>(ctx).await?;
    match command {
        PipelineCommand::List(args) => {
            let filter = pipeline_filter::<T>(args.search.as_deref(), &args.status)?;
            let mode = match args.view {
                ViewKind::Board => ViewMode::Board,
                ViewKind::Table => ViewMode::Table(sort_spec::<T>(&args.sort, args.desc)?),
            };
            let rows = visible(&collection.items().await, &filter, &mode);
            if rows.is_empty() {
                println!("no {} match", T::TABLE);
            } else if mode == ViewMode::Board {
                print!("{}", render::board(&rows, "name"));
            } else {
                print!("{}", render::table(&rows, &select_columns::<T>(columns)?));
            }
        }
        PipelineCommand::Export(args) => {
            let filter = pipeline_filter::<T>(args.search.as_deref(), &args.status)?;
            let mode = ViewMode::Table(SortSpec::asc("name"));
            let rows = visible(&collection.items().await, &filter, &mode);
            export(ctx, &rows, &args).await?;
        }
        PipelineCommand::Move { id, status } => {
            let status: T::Status = status.parse()?;
            let id: T::Id = id.into();
            match collection.move_to_status(id, status).await? {
                Some(change) => println!(
                    "moved {} #{id} to {status} at position {}",
                    T::TABLE,
                    change.position
                ),
                None => println!("{} #{id} is already {status}", T::TABLE),
            }
        }
        PipelineCommand::Reorder { status, from, to } => {
            let status: T::Status = status.parse()?;
            let changes = collection.reorder(status, from, to).await?;
            println!("reordered {status}: {} positions written", changes.len());
        }
    }
    Ok(())
}

async fn run_directory(ctx: &Context, command: DirectoryCommand) -> Result<()> {
    let collection = load::<Member>(ctx).await?;
    let items = collection.items().await;
    match command {
        DirectoryCommand::List(args) => {
            if args.view == ViewKind::Board {
                bail!("members have no board view");
            }
            let filter = member_filter(args.search.as_deref(), &args.status)?;
            let spec = sort_spec::<Member>(&args.sort, args.desc)?;
            let rows = sort_by_field(&filter.apply(&items), &spec);
            if rows.is_empty() {
                println!("no members match");
            } else {
                print!("{}", render::table(&rows, &select_columns::<Member>(MEMBER_COLUMNS)?));
            }
        }
        DirectoryCommand::Export(args) => {
            let filter = member_filter(args.search.as_deref(), &args.status)?;
            let rows = sort_by_field(&filter.apply(&items), &SortSpec::asc("name"));
            export(ctx, &rows, &args).await?;
        }
    }
    Ok(())
}

fn pipeline_filter<T>(search: Option<&str>, status: &str) -> Result<ViewFilter<T>>
where
    T: Pipelined + Searchable,
    T::Status: FromStr,
    <T::Status as FromStr>::Err: StdError + Send + Sync + 'static,
{
    let status: StatusFilter<T::Status> = status.parse()?;
    Ok(ViewFilter::<T>::new()
        .search(search.unwrap_or_default())
        .status(status))
}

fn member_filter(search: Option<&str>, status: &str) -> Result<ViewFilter<Member>> {
    let filter = ViewFilter::<Member>::new().search(search.unwrap_or_default());
    Ok(match status.trim().to_ascii_lowercase().as_str() {
        "all" | "" => filter,
        "active" => filter.matching(|m: &Member| m.active),
        "inactive" => filter.matching(|m: &Member| !m.active),
        other => bail!("unknown member status '{other}' (expected all, active or inactive)"),
    })
}

fn sort_spec<T: Fields>(field: &str, desc: bool) -> Result<SortSpec> {
    let column = T::column(field).ok_or_else(|| anyhow!("unknown sort field '{field}'"))?;
    Ok(if desc {
        SortSpec::desc(column.key)
    } else {
        SortSpec::asc(column.key)
    })
}

async fn export<T: Fields>(ctx: &Context, rows: &[T], args: &ExportArgs) -> Result<()> {
    let Some(_busy) = ctx.export_gate.try_begin() else {
        bail!("an export is already in progress");
    };
    let keys: Vec<&str> = args.columns.iter().map(String::as_str).collect();
    let columns = select_columns::<T>(&keys)?;
    let csv = to_csv(rows, &columns);
    match &args.out {
        Some(path) => {
            tokio::fs::write(path, format!("{csv}\n")).await?;
            info!(rows = rows.len(), path = %path.display(), "exported csv");
            eprintln!("wrote {} rows to {}", rows.len(), path.display());
        }
        None => println!("{csv}"),
    }
    Ok(())
}

async fn watch<T>(ctx: &Context, mask: ChangeMask, columns: &[&str]) -> Result<()>
where
    T: Record + Fields + PartialEq,
{
    let collection = load::<T>(ctx).await?;
    let columns = select_columns::<T>(columns)?;
    let mut subscription = collection.subscription(mask);
    subscription.start().await?;
    eprintln!("watching {} (ctrl-c to stop)", T::TABLE);

    let mut shown = collection.items().await;
    print!("{}", render::table(&shown, &columns));
    let mut tick = tokio::time::interval(Duration::from_millis(500));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = tick.tick() => {
                let items = collection.items().await;
                if items != shown {
                    println!();
                    print!("{}", render::table(&items, &columns));
                    shown = items;
                }
            }
        }
    }
    subscription.stop();
    Ok(())
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
