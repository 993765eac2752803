// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Frost Warlord member portal CLI
//!
//! Signs members up and in against Firebase, edits their profile, and shows
//! the team schedule and chat. The refresh token is kept in a session file so
//! the next run starts signed in.

use anyhow::Context;
use clap::{Parser, Subcommand};
use frost_warlord::{
    config::Config,
    models::{
        group_by_month, ChatMessage, MemberSummary, ProfileFields, ProfileUpdate, ScheduleFilter,
        SignUpRequest, TeamRole,
    },
    services::{ProfileImage, UploadProgress},
    AppState,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "frost-portal", version, about = "Frost Warlord member portal")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an account and member profile
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long, env = "FROST_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        full_name: String,
        #[arg(long)]
        phone: String,
        /// Tank, Marksman, Mage, Assassin or Support
        #[arg(long)]
        role: TeamRole,
        #[arg(long)]
        favorite_hero: Option<String>,
    },
    /// Log in with email and password
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "FROST_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Logout,
    /// Show the signed-in member
    Whoami,
    /// Email a password reset link
    ResetPassword {
        #[arg(long)]
        email: String,
    },
    /// Edit your profile
    UpdateProfile {
        #[arg(long)]
        full_name: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        role: Option<TeamRole>,
        #[arg(long)]
        favorite_hero: Option<String>,
        #[arg(long)]
        bio: Option<String>,
    },
    /// Upload a profile picture
    UploadAvatar {
        path: PathBuf,
        /// Defaults to a type guessed from the file extension
        #[arg(long)]
        content_type: Option<String>,
    },
    /// List team events
    Schedule {
        /// upcoming, past or all
        #[arg(long, default_value = "upcoming")]
        filter: ScheduleFilter,
    },
    /// Read or post team chat
    Chat {
        /// Post this message before listing
        #[arg(long)]
        send: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: u32,
        /// Keep printing new messages until interrupted
        #[arg(long)]
        follow: bool,
    },
}

/// What the CLI keeps between runs.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SavedSession {
    refresh_token: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    let config = Config::from_env().context("Failed to load configuration")?;
    let saved = load_session(&config.session_file)?;

    let state = AppState::connect(config, saved.as_ref().map(|s| s.refresh_token.as_str()))
        .await
        .context("Failed to connect to Firebase")?;
    let session = state.coordinator.wait_until_ready().await;
    match &session.identity {
        None if saved.is_some() => clear_session(&state.config.session_file)?,
        Some(identity) if identity.is_expired(chrono::Utc::now()) => {
            state.auth.refresh_session().await?;
        }
        _ => {}
    }

    if let Err(e) = run(&state, cli.command).await {
        eprintln!("{}", user_facing(&e));
        state.coordinator.shutdown();
        return Err(e);
    }

    state.coordinator.shutdown();
    Ok(())
}

async fn run(state: &AppState, command: Command) -> anyhow::Result<()> {
    let coordinator = &state.coordinator;
    let session_file = &state.config.session_file;

    match command {
        Command::Signup {
            email,
            password,
            full_name,
            phone,
            role,
            favorite_hero,
        } => {
            let request = SignUpRequest {
                email,
                password,
                profile: ProfileFields {
                    full_name,
                    phone,
                    role,
                    favorite_hero,
                },
            };
            let identity = coordinator.sign_up(&request).await?;
            save_session(session_file, identity.refresh_token())?;
            println!("Account created. Welcome to Frost Warlord!");
        }
        Command::Login { email, password } => {
            let identity = coordinator.log_in(&email, &password).await?;
            save_session(session_file, identity.refresh_token())?;
            let session = coordinator.wait_for_profile().await;
            let name = session
                .profile
                .map(|p| p.full_name)
                .unwrap_or_else(|| email.clone());
            println!("Welcome back, {}!", name);
        }
        Command::Logout => {
            let result = coordinator.log_out().await;
            clear_session(session_file)?;
            result?;
            println!("Logged out.");
        }
        Command::Whoami => {
            let session = coordinator.wait_for_profile().await;
            match MemberSummary::from_session(&session) {
                Some(summary) => {
                    println!("{} ({})", summary.display_name, summary.role_label);
                    println!("  Member since: {}", summary.member_since);
                    println!("  Rank: {}  Level: {}", summary.rank, summary.level);
                    if let Some(hero) = summary.favorite_hero {
                        println!("  Favorite hero: {}", hero);
                    }
                    match summary.win_rate {
                        Some(rate) => println!("  Win rate: {:.1}%", rate),
                        None => println!("  Win rate: no matches yet"),
                    }
                }
                None => println!("Not logged in."),
            }
        }
        Command::ResetPassword { email } => {
            coordinator.reset_password(&email).await?;
            println!("If an account exists for {}, a reset link is on its way.", email);
        }
        Command::UpdateProfile {
            full_name,
            phone,
            role,
            favorite_hero,
            bio,
        } => {
            let update = ProfileUpdate {
                full_name,
                phone,
                role,
                favorite_hero,
                bio,
                ..Default::default()
            };
            let profile = coordinator.update_profile(update).await?;
            println!("Profile saved for {}.", profile.full_name);
        }
        Command::UploadAvatar { path, content_type } => {
            let content_type = match content_type.or_else(|| guess_image_type(&path)) {
                Some(ct) => ct,
                None => anyhow::bail!(
                    "Cannot tell the image type of {}; pass --content-type",
                    path.display()
                ),
            };
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;

            let (tx, mut rx) = watch::channel(UploadProgress::default());
            let reporter = tokio::spawn(async move {
                while rx.changed().await.is_ok() {
                    let progress = *rx.borrow_and_update();
                    eprint!("\rUploading... {:.0}%", progress.percent());
                }
                eprintln!();
            });

            let result = coordinator
                .upload_profile_image(ProfileImage::new(bytes, content_type), Some(tx))
                .await;
            reporter.await.ok();
            let profile = result?;
            println!(
                "Profile picture updated: {}",
                profile.image_url.unwrap_or_default()
            );
        }
        Command::Schedule { filter } => {
            let entries = coordinator.team().schedules(filter).await?;
            if entries.is_empty() {
                println!("No events scheduled.");
            }
            for (month, events) in group_by_month(&entries) {
                println!("{}", month);
                for event in events {
                    let time = event.time.as_deref().unwrap_or("TBA");
                    let location = event.location.as_deref().unwrap_or("TBA");
                    println!("  {}  {}  {} @ {}", event.date, time, event.title, location);
                }
            }
        }
        Command::Chat {
            send,
            limit,
            follow,
        } => {
            let team = coordinator.team();
            if let Some(text) = send {
                team.post_message(&text).await?;
            }
            // Subscribe before reading history so nothing falls in between.
            let mut live = if follow {
                Some(team.follow_chat().await?)
            } else {
                None
            };
            let history = team.recent_messages(Some(limit)).await?;
            for message in &history {
                print_message(message);
            }

            if let Some(live) = live.as_mut() {
                let seen: HashSet<_> = history.iter().filter_map(|m| m.id.clone()).collect();
                loop {
                    tokio::select! {
                        message = live.next() => match message {
                            Some(message) => {
                                if message.id.as_ref().is_some_and(|id| seen.contains(id)) {
                                    continue;
                                }
                                print_message(&message);
                            }
                            None => break,
                        },
                        _ = tokio::signal::ctrl_c() => break,
                    }
                }
            }
        }
    }
    Ok(())
}

fn print_message(message: &ChatMessage) {
    println!(
        "[{}] {}: {}",
        message.timestamp.get(..16).unwrap_or(&message.timestamp),
        message.user_name,
        message.text
    );
}

/// The message to print for a failed command.
fn user_facing(err: &anyhow::Error) -> String {
    match err.downcast_ref::<frost_warlord::error::AppError>() {
        Some(app_err) => app_err.user_message(),
        None => format!("{:#}", err),
    }
}

fn guess_image_type(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let content_type = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => return None,
    };
    Some(content_type.to_string())
}

fn load_session(path: &Path) -> anyhow::Result<Option<SavedSession>> {
    match std::fs::read_to_string(path) {
        Ok(raw) => match serde_json::from_str(&raw) {
            Ok(saved) => Ok(Some(saved)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable session file");
                Ok(None)
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

fn save_session(path: &Path, refresh_token: &str) -> anyhow::Result<()> {
    let saved = SavedSession {
        refresh_token: refresh_token.to_string(),
    };
    std::fs::write(path, serde_json::to_string(&saved)?)
        .with_context(|| format!("Failed to write {}", path.display()))
}

fn clear_session(path: &Path) -> anyhow::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}

/// Initialize structured JSON logging on stderr.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn,frost_warlord=info")),
        )
        .with(format)
        .init();
}
