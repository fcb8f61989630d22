//! Kairo command-line client.
//!
//! A terminal host for the Kairo library: every command goes through the
//! same auth service, stores and workspace a graphical client would use.

use std::process::ExitCode;
use std::sync::Arc;

use chrono::{DateTime, Duration, Local, Utc};
use clap::{Parser, Subcommand};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use kairo::config::ClientConfig;
use kairo::error::{ClientError, Result};
use kairo::graph::GraphFrame;
use kairo::models::{timestamp, EntityId, NoteDraft, NotePatch, SignIn, SignUp};
use kairo::notes::{render_preview, truncate_chars};
use kairo::notify::{Notification, NotificationSink, Toast, ToastLevel};
use kairo::search::{content_preview, highlight};
use kairo::Client;

#[derive(Parser, Debug)]
#[command(name = "kairo", version, about = "Kairo notes from the terminal", long_about = None)]
struct Cli {
    /// Backend base URL
    #[arg(long, global = true, env = "KAIRO_API_URL")]
    api_url: Option<String>,

    /// Local storage directory
    #[arg(long = "db", global = true, env = "KAIRO_DB_PATH")]
    db_path: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and store the session token.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "KAIRO_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and sign in.
    Signup {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "KAIRO_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign out and forget the stored session.
    Logout,
    /// Show the signed-in user.
    Whoami,
    /// List notes.
    Notes {
        /// Only starred notes
        #[arg(long)]
        starred: bool,
    },
    /// Print one note.
    Show {
        id: String,
        /// Render markdown to HTML with wiki links resolved
        #[arg(long)]
        preview: bool,
    },
    /// Create a note.
    New {
        title: String,
        #[arg(short, long, default_value = "")]
        content: String,
    },
    /// Change a note's title or content.
    Edit {
        id: String,
        #[arg(short, long)]
        title: Option<String>,
        #[arg(short, long)]
        content: Option<String>,
    },
    /// Delete a note.
    Delete { id: String },
    /// Toggle a note's star.
    Star { id: String },
    /// Search notes by title and content.
    Search { query: String },
    /// Lay out the link graph and print it.
    Graph {
        /// Simulation ticks to run before printing
        #[arg(long, default_value_t = 300)]
        ticks: usize,
    },
    /// List reminders grouped by status.
    Reminders,
    /// Add a reminder to a note. WHEN is RFC 3339 or relative like +30m, +2h, +1d.
    Remind {
        note_id: String,
        when: String,
        #[arg(short, long, default_value = "")]
        message: String,
    },
    /// Mark a reminder as done.
    Done { id: String },
    /// Delete a reminder.
    Unremind { id: String },
    /// Poll for due reminders until interrupted.
    Watch {
        /// Send a test notification first
        #[arg(long)]
        test: bool,
    },
    /// Show or set the dark-mode preference.
    Theme {
        #[arg(value_parser = ["dark", "light"])]
        mode: Option<String>,
    },
}

// ============================================================================
// Output
// ============================================================================

/// Toasts go to stderr, notifications to stdout.
struct ConsoleSink;

impl NotificationSink for ConsoleSink {
    fn toast(&self, toast: &Toast) {
        let mark = match toast.level {
            ToastLevel::Success => "ok",
            ToastLevel::Error => "error",
            ToastLevel::Info => "info",
        };
        eprintln!("[{}] {}", mark, toast.message);
    }

    fn notify(&self, notification: &Notification) {
        println!("🔔 {}: {}", notification.heading(), notification.message);
        if let Some(ref title) = notification.note_title {
            println!("   note: {}", title);
        }
        if let Some(ref at) = notification.reminder_time {
            println!("   scheduled: {}", at);
        }
    }
}

fn local_time(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// RFC 3339, a naive ISO date-time, or `+<n><s|m|h|d>` from now.
fn parse_when(raw: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    if let Some(rel) = raw.strip_prefix('+') {
        let split = rel.char_indices().last().map(|(i, _)| i).unwrap_or(0);
        let (amount, unit) = rel.split_at(split);
        let amount: i64 = amount
            .parse()
            .map_err(|_| ClientError::Config(format!("bad relative time '{}'", raw)))?;
        let offset = match unit {
            "s" => Duration::try_seconds(amount),
            "m" => Duration::try_minutes(amount),
            "h" => Duration::try_hours(amount),
            "d" => Duration::try_days(amount),
            _ => return Err(ClientError::Config(format!("bad time unit in '{}'", raw))),
        };
        return offset
            .and_then(|offset| now.checked_add_signed(offset))
            .ok_or_else(|| ClientError::Config(format!("relative time '{}' is out of range", raw)));
    }
    timestamp::parse(raw).ok_or_else(|| ClientError::Config(format!("unrecognised time '{}'", raw)))
}

// ============================================================================
// Commands
// ============================================================================

async fn run(cli: Cli) -> Result<()> {
    let mut config = ClientConfig::from_env()?;
    if let Some(ref url) = cli.api_url {
        config = config.with_api_url(url)?;
    }
    if let Some(ref path) = cli.db_path {
        config = config.with_db_path(path);
    }
    let client = Client::open(config)?;
    let sink: Arc<dyn NotificationSink> = Arc::new(ConsoleSink);

    match cli.command {
        Command::Login { email, password } => {
            let session = client.auth.login(&SignIn { email, password }).await?;
            println!("Signed in as {}", session.user.display_name());
        }
        Command::Signup {
            username,
            email,
            password,
        } => {
            let session = client
                .auth
                .register(&SignUp {
                    username,
                    email,
                    password,
                })
                .await?;
            println!("Welcome, {}", session.user.display_name());
        }
        Command::Logout => {
            client.auth.logout().await?;
            println!("Signed out");
        }
        Command::Whoami => match client.auth.restore_session().await? {
            Some(user) => println!("{}", user.display_name()),
            None => println!("Not signed in"),
        },
        Command::Notes { starred } => {
            let mut ws = client.workspace(sink);
            ws.load().await?;
            let store = ws.notes();
            let counts = store.counts();
            for note in store.notes().iter().filter(|n| !starred || n.is_starred) {
                println!(
                    "{} {:>6}  {:<40} {}",
                    if note.is_starred { "★" } else { " " },
                    note.id,
                    truncate_chars(note.display_title(), 40),
                    local_time(note.updated_at)
                );
            }
            println!("{} notes, {} starred", counts.total, counts.starred);
        }
        Command::Show { id, preview } => {
            let mut ws = client.workspace(sink);
            ws.load().await?;
            let id = EntityId::parse(&id);
            if !ws.select_note(Some(&id)) {
                return Err(ClientError::NotFound {
                    resource: format!("note {}", id),
                });
            }
            let editor = ws.editor();
            println!("# {}", editor.title());
            if preview {
                println!("{}", render_preview(editor.content(), ws.notes().notes()));
            } else {
                println!("{}", editor.content());
            }
            println!(
                "\n{} characters, {} words, saved {}",
                editor.char_count(),
                editor.word_count(),
                local_time(editor.last_saved())
            );
        }
        Command::New { title, content } => {
            let mut ws = client.workspace(sink);
            ws.load().await?;
            let note = ws.create_note(&NoteDraft::new(title, content)).await?;
            println!("{}", note.id);
        }
        Command::Edit { id, title, content } => {
            let mut ws = client.workspace(sink);
            ws.load().await?;
            let patch = NotePatch {
                title,
                content,
                is_starred: None,
            };
            if patch != NotePatch::default() {
                ws.update_note(&EntityId::parse(&id), &patch).await?;
            }
        }
        Command::Delete { id } => {
            let mut ws = client.workspace(sink);
            ws.delete_note(&EntityId::parse(&id)).await?;
        }
        Command::Star { id } => {
            let mut ws = client.workspace(sink);
            ws.load().await?;
            let note = ws.toggle_star(&EntityId::parse(&id)).await?;
            println!(
                "{} {}",
                if note.is_starred { "Starred" } else { "Unstarred" },
                note.display_title()
            );
        }
        Command::Search { query } => {
            let mut ws = client.workspace(sink);
            ws.load().await?;
            let found = ws.search(&query).await;
            if found.is_empty() {
                println!("No notes match '{}'", query);
            }
            for note in &found {
                println!("{}  {}", note.id, highlight(note.display_title(), &query, "\x1b[1m", "\x1b[0m"));
                println!(
                    "    {}",
                    highlight(&content_preview(&note.content, &query), &query, "\x1b[1m", "\x1b[0m")
                );
            }
        }
        Command::Graph { ticks } => {
            let mut ws = client.workspace(sink);
            ws.load().await?;
            let graph = ws.graph_mut();
            graph.settle(ticks);
            graph.center_view();
            let header = graph.header();
            let stats = &graph.graph().stats;
            println!(
                "{} notes, {} with links, {} edges, {} orphans, max degree {}, avg {:.2}",
                header.note_count,
                header.linked_count,
                stats.total_edges,
                stats.orphan_count,
                stats.max_degree,
                stats.avg_degree
            );
            match graph.frame() {
                GraphFrame::Empty => println!("No notes to graph"),
                GraphFrame::Ready { nodes, edges, zoom_percent } => {
                    for node in &nodes {
                        println!(
                            "{} {:<18} ({:>7.1}, {:>7.1}) r={:.0}",
                            if node.is_starred { "★" } else { "•" },
                            node.label,
                            node.at.x,
                            node.at.y,
                            node.radius
                        );
                    }
                    println!("{} edges drawn at {}%", edges.len(), zoom_percent);
                }
            }
        }
        Command::Reminders => {
            let mut ws = client.workspace(sink);
            ws.load().await?;
            let groups = ws.reminders().partition(Utc::now());
            if groups.iter().next().is_none() {
                println!("No reminders");
            }
            for (status, reminders) in groups.iter() {
                println!("{:?} ({})", status, reminders.len());
                for r in reminders {
                    println!(
                        "  {:>6}  {}  {}{}",
                        r.id,
                        local_time(Some(r.reminder_time)),
                        r.message,
                        r.note_title
                            .as_deref()
                            .map(|t| format!("  [{}]", t))
                            .unwrap_or_default()
                    );
                }
            }
        }
        Command::Remind {
            note_id,
            when,
            message,
        } => {
            let at = parse_when(&when, Utc::now())?;
            let mut ws = client.workspace(sink);
            ws.load().await?;
            let reminder = ws.create_reminder(&EntityId::parse(&note_id), &message, at).await?;
            println!("{} at {}", reminder.id, local_time(Some(reminder.reminder_time)));
        }
        Command::Done { id } => {
            let mut ws = client.workspace(sink);
            ws.mark_read(&EntityId::parse(&id)).await?;
        }
        Command::Unremind { id } => {
            let mut ws = client.workspace(sink);
            ws.delete_reminder(&EntityId::parse(&id)).await?;
        }
        Command::Watch { test } => {
            client.api.ensure_authenticated()?;
            let ws = client.workspace(sink);
            if test {
                ws.test_notification().await;
            }
            let poller = ws.start_polling();
            eprintln!(
                "Watching for reminders every {}s, Ctrl-C to stop",
                client.config.reminder_poll_interval.as_secs()
            );
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "could not listen for Ctrl-C");
            }
            poller.abort();
        }
        Command::Theme { mode } => {
            let store = client.store();
            if let Some(mode) = mode {
                store.set_dark_mode(mode == "dark")?;
            }
            println!("{}", if store.dark_mode() { "dark" } else { "light" });
        }
    }
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default = if cli.verbose {
        "kairo=debug"
    } else if cli.quiet {
        "kairo=error"
    } else {
        "kairo=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, kind = ?err.kind(), "command failed");
            eprintln!("{}", err.user_message());
            if err.is_auth_failure() {
                eprintln!("Run `kairo login` to sign in again.");
            }
            ExitCode::FAILURE
        }
    }
}
