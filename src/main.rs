use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use reqwest::Url;
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;

use rollcall::api::{ApiClient, AttendanceApi, EntityKind, EntityPager, HistoryQuery};
use rollcall::config;
use rollcall::history::{self, HistoryFilter};
use rollcall::model::{
    parse_day, AttendanceStatus, ClassSummary, Entity, MajorSummary, StudentSummary,
    SubjectSummary, TeacherSummary,
};
use rollcall::resolve::{Directory, DirectoryEntry};
use rollcall::roster::SessionRoster;
use rollcall::search::SearchList;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the sessions of a class
    Schedule {
        #[arg(long)]
        class: String,
        /// Only sessions without any attendance yet
        #[arg(long)]
        unrecorded: bool,
    },
    /// Show the roll-call sheet for a session
    Roster {
        #[arg(long)]
        session: String,
        #[arg(long)]
        class: String,
    },
    /// Record or amend attendance for a session
    Record {
        #[arg(long)]
        session: String,
        #[arg(long)]
        class: String,
        /// Student ids to mark PRESENT (repeatable)
        #[arg(long = "present")]
        present: Vec<String>,
        /// Student ids to mark LATE (repeatable)
        #[arg(long = "late")]
        late: Vec<String>,
        /// Required to overwrite an already-recorded session
        #[arg(long)]
        amend: bool,
    },
    /// Aggregate attendance history with optional filters
    History {
        #[arg(long)]
        class: Option<String>,
        /// PRESENT, ABSENT or LATE
        #[arg(long)]
        status: Option<String>,
        /// Inclusive start date, YYYY-MM-DD
        #[arg(long)]
        from: Option<String>,
        /// Inclusive end date, YYYY-MM-DD
        #[arg(long)]
        to: Option<String>,
        /// Free-text search over resolved names
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Search an entity collection by name
    Find {
        /// students, subjects, teachers, majors or classes
        #[arg(long)]
        kind: String,
        #[arg(long, default_value = "")]
        query: String,
    },
    /// Delete every attendance record of a session
    Reset {
        #[arg(long)]
        session: String,
    },
    /// Print an example configuration file
    ExampleConfig,
}

fn parse_status(raw: &str) -> Result<AttendanceStatus> {
    match raw.to_uppercase().as_str() {
        "PRESENT" => Ok(AttendanceStatus::Present),
        "ABSENT" => Ok(AttendanceStatus::Absent),
        "LATE" => Ok(AttendanceStatus::Late),
        other => bail!("unknown status {other:?}, expected PRESENT, ABSENT or LATE"),
    }
}

/// Runs one debounced search round against an entity collection and prints
/// the first page.
async fn run_find<T>(
    client: Arc<ApiClient>,
    kind: EntityKind,
    query: &str,
    search_cfg: &config::Search,
    render: impl Fn(&T) -> String,
) -> Result<()>
where
    T: Entity + DirectoryEntry + Clone + DeserializeOwned + Send + Sync + 'static,
{
    let pager = EntityPager::<T>::new(client, kind);
    let list = SearchList::new(
        search_cfg.page_size,
        Duration::from_millis(search_cfg.debounce_ms),
    );
    let dir = Mutex::new(Directory::new());
    let tag = list.input(query);
    list.search(tag, &pager, &dir).await?;
    for item in list.items() {
        println!("  {}", render(&item));
    }
    if list.has_next_page() {
        println!("  ... more results, refine the query");
    }
    Ok(())
}

/// Tokens come from the environment; a username/password pair signs in
/// through the API instead.
async fn authenticate(client: &ApiClient) -> Result<()> {
    if let Ok(access) = std::env::var("ROLLCALL_ACCESS_TOKEN") {
        let refresh = std::env::var("ROLLCALL_REFRESH_TOKEN").ok();
        client.set_tokens(access, refresh).await;
        return Ok(());
    }
    match (
        std::env::var("ROLLCALL_USERNAME"),
        std::env::var("ROLLCALL_PASSWORD"),
    ) {
        (Ok(username), Ok(password)) => {
            client.login(&username, &password).await?;
            Ok(())
        }
        _ => bail!(
            "no credentials: set ROLLCALL_ACCESS_TOKEN or ROLLCALL_USERNAME/ROLLCALL_PASSWORD"
        ),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();

    if matches!(args.command, Command::ExampleConfig) {
        print!("{}", config::example());
        return Ok(());
    }

    let cfg = config::load(Some(&args.config))?;
    // Url::join drops the last segment of a base without a trailing slash.
    let mut base = cfg.api.base_url.clone();
    if !base.ends_with('/') {
        base.push('/');
    }
    let base: Url = base.parse().context("api.base_url is not a valid URL")?;
    let client = ApiClient::new(base, Duration::from_secs(cfg.api.timeout_seconds));
    authenticate(&client).await?;

    match args.command {
        Command::ExampleConfig => unreachable!("handled before config load"),
        Command::Schedule { class, unrecorded } => {
            let sessions = client.sessions_by_class(&class, unrecorded).await?;
            for session in &sessions {
                println!("{}  {}", session.session_date, session.id);
            }
            info!(class, count = sessions.len(), "sessions listed");
        }
        Command::Roster { session, class } => {
            let mut dir = Directory::new();
            let roster = SessionRoster::load(&client, &mut dir, &session, &class).await?;
            println!("session {} ({:?})", roster.session_id(), roster.state());
            for entry in roster.entries() {
                println!(
                    "  {:<10} {:<24} {:<8} {}",
                    entry.student_id,
                    entry.student_name,
                    entry.status.as_str(),
                    entry.note
                );
            }
        }
        Command::Record {
            session,
            class,
            present,
            late,
            amend,
        } => {
            let mut dir = Directory::new();
            let mut roster = SessionRoster::load(&client, &mut dir, &session, &class).await?;
            if roster.is_recorded() {
                if !amend {
                    bail!("attendance already recorded for this session; pass --amend to overwrite");
                }
                roster.begin_amend();
            }
            for id in &present {
                if !roster.set_status(id, AttendanceStatus::Present) {
                    bail!("student {id} is not enrolled in this class");
                }
            }
            for id in &late {
                if !roster.set_status(id, AttendanceStatus::Late) {
                    bail!("student {id} is not enrolled in this class");
                }
            }
            let state = roster.save(&client).await?;
            println!(
                "saved {} entries ({:?})",
                roster.entries().len(),
                state
            );
        }
        Command::History {
            class,
            status,
            from,
            to,
            search,
            page,
        } => {
            let status = status.as_deref().map(parse_status).transpose()?;
            let start_date = from
                .as_deref()
                .map(|d| parse_day(d).context("invalid --from date, expected YYYY-MM-DD"))
                .transpose()?;
            let end_date = to
                .as_deref()
                .map(|d| parse_day(d).context("invalid --to date, expected YYYY-MM-DD"))
                .transpose()?;

            let query = HistoryQuery {
                class_id: class.clone(),
                status,
                start_date,
                end_date,
                ..HistoryQuery::default()
            };
            let records = history::fetch_window(&client, &query).await?;
            let filter = HistoryFilter {
                class_id: class,
                status,
                start_date,
                end_date,
                search,
            };
            let dir = Directory::new();
            let view = history::aggregate(&records, &dir, &filter, page, cfg.history.page_size);

            let s = view.stats;
            println!(
                "{} records: {} present, {} late, {} absent ({:.1}% attendance)",
                s.total, s.present, s.late, s.absent, s.attendance_rate
            );
            for item in &view.items {
                println!(
                    "  {}  {:<20} {:<24} {}",
                    item.session
                        .date
                        .map(|d| d.to_string())
                        .unwrap_or_else(|| "????-??-??".into()),
                    item.session.class.name,
                    item.student.name,
                    item.status.as_str()
                );
            }
            println!("page {}/{}", view.page.page, view.page.total_pages);

            if !view.calendar.is_empty() {
                println!("calendar:");
                let preview = cfg.history.calendar_preview as usize;
                for bucket in &view.calendar {
                    let shown: Vec<&str> = bucket
                        .records
                        .iter()
                        .take(preview)
                        .map(|r| r.student.name.as_str())
                        .collect();
                    let overflow = bucket.records.len().saturating_sub(preview);
                    let suffix = if overflow > 0 {
                        format!(" +{overflow} more")
                    } else {
                        String::new()
                    };
                    println!(
                        "  {}  {:<20} {}{}",
                        bucket.date,
                        bucket.class_name,
                        shown.join(", "),
                        suffix
                    );
                }
            }
        }
        Command::Find { kind, query } => {
            let client = Arc::new(client);
            match kind.as_str() {
                "students" => {
                    run_find::<StudentSummary>(client, EntityKind::Students, &query, &cfg.search, |s| {
                        format!("{}  {} ({})", s.id, s.fullname, s.student_code)
                    })
                    .await?
                }
                "subjects" => {
                    run_find::<SubjectSummary>(client, EntityKind::Subjects, &query, &cfg.search, |s| {
                        format!("{}  {}", s.id, s.name)
                    })
                    .await?
                }
                "teachers" => {
                    run_find::<TeacherSummary>(client, EntityKind::Teachers, &query, &cfg.search, |t| {
                        format!("{}  {}", t.id, t.fullname)
                    })
                    .await?
                }
                "majors" => {
                    run_find::<MajorSummary>(client, EntityKind::Majors, &query, &cfg.search, |m| {
                        format!("{}  {}", m.id, m.name)
                    })
                    .await?
                }
                "classes" => {
                    run_find::<ClassSummary>(client, EntityKind::Classes, &query, &cfg.search, |c| {
                        format!("{}  {}", c.id, c.name)
                    })
                    .await?
                }
                other => bail!("unknown collection {other:?}"),
            }
        }
        Command::Reset { session } => {
            let outcome = client.reset_attendance(&session).await?;
            println!(
                "reset session {}: {} records deleted",
                outcome.session_id, outcome.deleted_count
            );
        }
    }

    Ok(())
}
