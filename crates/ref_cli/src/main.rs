//! RefWatch CLI
//!
//! Outside actor for the match core: manages stored match history, drops
//! commands into the shared slot and reads the live projection.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use ref_core::publisher::{CommandStore, LiveStateStore, WidgetTimeline};
use ref_core::{
    Capabilities, CardDetails, CardRecipient, CardType, CommandHandler, CompletedMatchSummary,
    CoreSettings, FileCommandStore, FileLiveStateStore, FileMatchHistoryStore, GoalDetails,
    GoalType, LifecyclePhase, LiveActivityCommand, LiveStatePublisher, ManualTimeSource, MatchHistoryStore,
    MatchSession, TeamSide,
};

#[derive(Parser)]
#[command(name = "refwatch")]
#[command(about = "Referee match timer companion", long_about = None)]
struct Cli {
    /// Settings file (YAML). Defaults apply when it does not exist.
    #[arg(long, global = true, default_value = "refwatch.yaml")]
    settings: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Completed match history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// External command slot
    Command {
        #[command(subcommand)]
        action: CommandAction,
    },

    /// Live state shared with the widget
    State {
        #[command(subcommand)]
        action: StateAction,
    },

    /// Play a scripted regulation match on a manual clock and store it
    Demo,
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List stored matches, most recent first
    List {
        /// Maximum number of matches (defaults to the configured recent limit)
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print one match with its event log
    Show { id: Uuid },
    /// Delete one match
    Delete { id: Uuid },
    /// Delete every stored match
    Wipe {
        /// Required to actually wipe
        #[arg(long, default_value = "false")]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum CommandAction {
    /// Write a command (pause, resume, start-half-time, start-second-half)
    Send { command: LiveActivityCommand },
    /// Show the pending command without consuming it
    Peek,
    /// Drop the pending command
    Clear,
}

#[derive(Subcommand)]
enum StateAction {
    /// Print the widget entry and its reload policy
    Show {
        /// Print the raw live state as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let settings = CoreSettings::load(&cli.settings)
        .with_context(|| format!("loading settings from {}", cli.settings.display()))?;
    tracing::debug!(?settings, "settings loaded");

    match cli.command {
        Commands::History { action } => run_history(&settings, action),
        Commands::Command { action } => run_command(&settings, action),
        Commands::State { action } => run_state(&settings, action),
        Commands::Demo => run_demo(&settings),
    }
}

fn run_history(settings: &CoreSettings, action: HistoryAction) -> Result<()> {
    let store = FileMatchHistoryStore::new(&settings.data_dir);

    match action {
        HistoryAction::List { limit } => {
            let matches = store.load_recent(limit.unwrap_or(settings.recent_limit))?;
            if matches.is_empty() {
                println!("No completed matches in {}", store.path().display());
                return Ok(());
            }
            for m in &matches {
                let summary = CompletedMatchSummary::from(m);
                println!(
                    "{}  {}  {}  ({} events)",
                    summary.id,
                    summary.completed_at.format("%Y-%m-%d %H:%M"),
                    summary,
                    summary.event_count
                );
            }
        }

        HistoryAction::Show { id } => {
            let m = store.find(id)?.with_context(|| format!("no stored match with id {}", id))?;
            println!("{}", m.summary());
            if let Some(competition) = &m.configuration.competition_name {
                println!("   Competition: {}", competition);
            }
            if let Some(owner) = &m.owner_id {
                println!("   Owner:       {}", owner);
            }
            if m.abandoned {
                println!("   Abandoned");
            }
            println!();
            for event in &m.events {
                let team = event.team.map(|t| t.as_str()).unwrap_or("");
                println!("   {:>8}  P{}  {:<5} {}", event.match_time, event.period, team, event.display_description());
            }
        }

        HistoryAction::Delete { id } => {
            store.delete(id)?;
            println!("🗑  Deleted {}", id);
        }

        HistoryAction::Wipe { yes } => {
            if !yes {
                anyhow::bail!("refusing to wipe history without --yes");
            }
            store.wipe_all()?;
            println!("🗑  History wiped");
        }
    }

    Ok(())
}

fn run_command(settings: &CoreSettings, action: CommandAction) -> Result<()> {
    let store = FileCommandStore::new(&settings.shared_dir);

    match action {
        CommandAction::Send { command } => {
            let envelope = store.write(command)?;
            println!("📨 Queued {} ({})", envelope.command, envelope.id);
        }
        CommandAction::Peek => match store.peek() {
            Some(envelope) => println!("{}", serde_json::to_string_pretty(&envelope)?),
            None => println!("No pending command"),
        },
        CommandAction::Clear => {
            store.clear()?;
            println!("Command slot cleared");
        }
    }

    Ok(())
}

fn run_state(settings: &CoreSettings, action: StateAction) -> Result<()> {
    let store = FileLiveStateStore::new(&settings.shared_dir);
    let StateAction::Show { json } = action;
    let state = store.read();

    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }

    let timeline = WidgetTimeline::for_state(state.as_ref(), Utc::now());
    for entry in &timeline.entries {
        println!(
            "{} {} - {} {}  [{}{}]",
            entry.home_abbr,
            entry.home_score,
            entry.away_score,
            entry.away_abbr,
            entry.period_label,
            if entry.is_paused { ", paused" } else { "" }
        );
    }
    println!("Reload: {:?}", timeline.policy);
    Ok(())
}

fn run_demo(settings: &CoreSettings) -> Result<()> {
    let clock = ManualTimeSource::starting_now();
    let history = Arc::new(FileMatchHistoryStore::new(&settings.data_dir));
    let caps = Capabilities::for_platform(settings.platform, &settings.shared_dir);
    let commands = CommandHandler::new(FileCommandStore::new(&settings.shared_dir));

    let mut session = MatchSession::new(Arc::new(clock.clone()), history, caps);
    session.add_observer(Box::new(LiveStatePublisher::new(Arc::new(FileLiveStateStore::new(
        &settings.shared_dir,
    )))));

    let config = settings.default_match.clone();
    println!("⚽ {} vs {}", config.home_team, config.away_team);
    session.configure(config)?;
    session.start_match();

    let half = session.timer().period_length().as_secs();
    clock.advance_secs(half * 4 / 9);
    let goal = GoalDetails { goal_type: GoalType::Regular, player_number: Some(9), player_name: None };
    let record = session.record_goal(TeamSide::Home, goal)?;
    println!("   {}  {}", record.match_time, record.display_description());

    // A command written between runs is picked up here.
    if let Some(applied) = session.process_command(&commands) {
        println!("   applied external command: {}", applied);
        if session.timer().is_paused() {
            session.resume();
        }
    }

    clock.advance_secs(half - half * 4 / 9);
    session.tick();
    session.end_current_period();
    session.start_half_time();
    clock.advance_secs(session.config().half_time_length().as_secs());
    session.tick();
    session.start_next_period();

    clock.advance_secs(half * 2 / 9);
    let card = CardDetails {
        card_type: CardType::Yellow,
        recipient: CardRecipient::Player,
        player_number: Some(4),
        player_name: None,
        official_role: None,
        reason: "Dissent".to_string(),
    };
    let record = session.record_card(TeamSide::Away, card)?;
    println!("   {}  {}", record.match_time, record.display_description());

    // Extra periods of a multi-period configuration are played straight through.
    while session.phase().is_kickoff() {
        if session.timer().is_period_active() {
            clock.advance_secs(session.timer().period_remaining().as_secs());
            session.tick();
            session.end_current_period();
        } else if session.timer().is_waiting_for_half_time() {
            session.start_half_time();
            session.start_next_period();
        } else if !session.start_next_period() {
            break;
        }
    }
    if session.phase() != LifecyclePhase::Finished {
        // Level ties stop at the shootout boundary.
        session.abandon();
    }

    let completed = session.finalize().context("demo match did not reach full time")?;
    if let Some(err) = session.last_persistence_error() {
        anyhow::bail!("❌ Match was not saved: {}", err);
    }
    println!("\n✅ {}", completed.summary());
    println!("   Stored as {}", completed.id);

    Ok(())
}
