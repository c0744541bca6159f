use anyhow::{anyhow, bail, ensure, Result};
use clap::Subcommand;

use crate::{
    daemon::storage::{
        database::Database,
        settings::{
            parse_time_of_day, Settings, KEY_CLOSE_TO_TRAY, KEY_DISTRACTION_CATEGORIES,
            KEY_FOCUS_END, KEY_FOCUS_START, KEY_IDLE_THRESHOLD, KEY_PROMPTS_ENABLED,
            KEY_RETENTION_DAYS, KEY_SAMPLING_INTERVAL,
        },
        DB_FILE_NAME,
    },
    utils::dir::application_data_path,
};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Show all settings")]
    Show,
    #[command(about = "Change one setting. The daemon picks it up on its next tick")]
    Set { key: String, value: String },
}

pub fn process_config_command(command: ConfigCommand) -> Result<()> {
    let db = Database::open(&application_data_path()?.join(DB_FILE_NAME))?;
    match command {
        ConfigCommand::Show => {
            let settings = Settings::load(&db)?;
            println!("{KEY_SAMPLING_INTERVAL}: {}", settings.sampling_interval_sec);
            println!("{KEY_IDLE_THRESHOLD}: {}", settings.idle_threshold_min);
            println!("{KEY_RETENTION_DAYS}: {}", settings.retention_days);
            println!("{KEY_CLOSE_TO_TRAY}: {}", settings.close_to_tray);
            println!("{KEY_FOCUS_START}: {}", settings.focus_start.format("%H:%M"));
            println!("{KEY_FOCUS_END}: {}", settings.focus_end.format("%H:%M"));
            println!("{KEY_PROMPTS_ENABLED}: {}", settings.prompts_enabled);
            println!(
                "{KEY_DISTRACTION_CATEGORIES}: {}",
                settings.distraction_categories.join(", ")
            );
            Ok(())
        }
        ConfigCommand::Set { key, value } => {
            set_setting_checked(&db, &key, &value)?;
            println!("Set {key}");
            Ok(())
        }
    }
}

/// Settings are validated here, before they reach the store; the tracker
/// assumes stored values parse.
fn set_setting_checked(db: &Database, key: &str, value: &str) -> Result<()> {
    match key {
        KEY_SAMPLING_INTERVAL => {
            let parsed: i64 = parse_number(key, value)?;
            ensure!(parsed >= 1, "Sampling interval must be at least 1 second");
            db.set_setting(key, &parsed.to_string())
        }
        KEY_IDLE_THRESHOLD => {
            let parsed: i64 = parse_number(key, value)?;
            ensure!(parsed >= 1, "Idle threshold must be at least 1 minute");
            db.set_setting(key, &parsed.to_string())
        }
        KEY_RETENTION_DAYS => {
            let parsed: i64 = parse_number(key, value)?;
            ensure!(parsed >= 0, "Retention days can't be negative, use 0 to disable");
            db.set_setting(key, &parsed.to_string())
        }
        KEY_CLOSE_TO_TRAY | KEY_PROMPTS_ENABLED => {
            let stored = match value.to_ascii_lowercase().as_str() {
                "true" | "1" | "on" => "1",
                "false" | "0" | "off" => "0",
                other => bail!("{key} takes true or false, not {other}"),
            };
            db.set_setting(key, stored)
        }
        KEY_FOCUS_START | KEY_FOCUS_END => {
            let Some(parsed) = parse_time_of_day(value) else {
                bail!("{key} takes a HH:MM time of day, not {value}");
            };
            db.set_setting(key, &parsed.format("%H:%M").to_string())
        }
        KEY_DISTRACTION_CATEGORIES => {
            let categories = value
                .split(',')
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect::<Vec<_>>();
            db.set_setting(
                key,
                &serde_json::to_string(&categories).expect("Plain strings always serialize"),
            )
        }
        other => bail!("Unknown setting {other}"),
    }
}

fn parse_number(key: &str, value: &str) -> Result<i64> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow!("{key} takes a whole number, not {value}"))
}
