//! Attendance Client - command-line entry point
//!
//! Headless shell over the client library: log in, clock in/out with a
//! photo and a location fix, and browse history and profile data.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use attendance_lib::{
    capture::{Devices, PunchOutcome},
    commands,
    config::Config,
    logging,
    models::{LocationFix, PasswordChange, Period, ProfileUpdate},
    platform::{FileCamera, FixedLocation, StaticPermissions},
    AppState,
};

#[derive(Parser)]
#[command(name = "attendance")]
#[command(version)]
#[command(about = "Geotagged, photo-verified attendance client")]
struct Cli {
    /// Server root URL (overrides ATTENDANCE_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Exchange username/password for a stored token
    Login {
        #[arg(short, long)]
        username: String,
        #[arg(short, long, env = "ATTENDANCE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored token
    Logout,
    /// Clock in or out with a face photo at the given position
    Punch {
        /// JPEG to submit; omit to abort at the capture step
        #[arg(long)]
        photo: Option<PathBuf>,
        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        lon: Option<f64>,
        /// Target work location (default: first permitted one)
        #[arg(long)]
        location_id: Option<i64>,
        /// Simulate a denied location permission
        #[arg(long)]
        deny_location: bool,
        /// Simulate a denied camera permission
        #[arg(long)]
        deny_camera: bool,
    },
    /// Show attendance history
    History {
        #[arg(long, default_value = "day")]
        period: Period,
        /// Anchor date, YYYY-MM-DD (default: today on the server)
        #[arg(long)]
        date: Option<chrono::NaiveDate>,
    },
    /// Show the profile
    Profile,
    /// Update profile fields
    UpdateProfile {
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
    },
    /// Change the account password
    ChangePassword {
        #[arg(long, env = "ATTENDANCE_NEW_PASSWORD", hide_env_values = true)]
        new_password: String,
        #[arg(long, env = "ATTENDANCE_CONFIRM_PASSWORD", hide_env_values = true)]
        confirm: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::from_env().context("Invalid configuration")?;
    if let Some(url) = cli.api_url.as_deref() {
        config = config.with_api_url(url).context("Invalid --api-url")?;
    }

    logging::init(&config.log_dir()).context("Failed to initialize logging")?;
    info!("Attendance client starting against {}", config.api_base_url);

    let state = AppState::init(config)?;

    match cli.command {
        Command::Login { username, password } => {
            commands::login(&state, &username, &password).await?;
            println!("Logged in as {}", username);
        }
        Command::Logout => {
            commands::logout(&state)?;
            println!("Logged out");
        }
        Command::Punch {
            photo,
            lat,
            lon,
            location_id,
            deny_location,
            deny_camera,
        } => {
            let fix = match (lat, lon) {
                (Some(lat), Some(lon)) => LocationFix::new(lat, lon),
                _ => None,
            };
            let devices = Devices {
                permissions: Arc::new(StaticPermissions::new(!deny_location, !deny_camera)),
                camera: Arc::new(FileCamera::new(photo)),
                location: Arc::new(FixedLocation::new(fix)),
            };
            let orchestrator = state.orchestrator(devices);

            let outcome = commands::punch(&state, &orchestrator, location_id).await?;
            if let Some(notice) = outcome.notice() {
                println!("{}", notice);
            }
            if let PunchOutcome::Failed(_) = outcome {
                std::process::exit(1);
            }
        }
        Command::History { period, date } => {
            let history = commands::history(&state, period, date).await?;
            println!(
                "Total: {} h ({} to {})",
                history.sum_hours, history.start, history.end
            );
            for day in &history.days {
                let mut line = format!("{} - {} h", day.date, day.total_hours);
                if day.late {
                    line.push_str(" - late");
                }
                if day.early_leave {
                    line.push_str(" - left early");
                }
                println!("{}", line);
                for item in &day.items {
                    println!(
                        "  {} @ {} - {} - {} m",
                        item.punch_type,
                        item.timestamp,
                        if item.within_geofence { "OK" } else { "OUT" },
                        item.distance_m
                    );
                }
            }
        }
        Command::Profile => {
            let profile = commands::profile(&state).await?;
            println!("Hello, {}", profile.display_name());
            if let Some(shift) = &profile.shift {
                println!("Shift: {} ({} - {})", shift.name, shift.start_time, shift.end_time);
            }
            for location in &profile.allowed_locations {
                println!(
                    "Location #{}: {} ({} m radius)",
                    location.id, location.name, location.radius_m
                );
            }
        }
        Command::UpdateProfile {
            first_name,
            last_name,
            email,
            phone,
        } => {
            let update = ProfileUpdate {
                first_name,
                last_name,
                email,
                phone,
            };
            commands::update_profile(&state, &update).await?;
            println!("Profile saved");
        }
        Command::ChangePassword {
            new_password,
            confirm,
        } => match commands::change_password(&state, &new_password, &confirm).await? {
            PasswordChange::Changed => println!("Password changed"),
            PasswordChange::Rejected(errors) => {
                for error in errors {
                    match error.field {
                        Some(field) => eprintln!("{}: {}", field, error.message),
                        None => eprintln!("{}", error.message),
                    }
                }
                std::process::exit(1);
            }
        },
    }

    Ok(())
}
