use std::fmt::Display;

use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use chrono_english::parse_date_string;
use clap::{CommandFactory, Parser, ValueEnum};
use now::DateTimeNow;
use serde::Serialize;

use crate::{
    daemon::storage::{
        database::Database,
        entities::{AppTotal, CategoryTotal},
        DB_FILE_NAME,
    },
    utils::{dir::application_data_path, percentage::seconds_percentage, time::next_day_start},
};

use super::Args;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[derive(Debug, Parser)]
pub struct SummaryCommand {
    #[arg(
        long = "start",
        short,
        help = "Start of the range. Examples are \"yesterday\", \"1 hour ago\", \"15/03/2025\". Defaults to the start of today"
    )]
    start_date: Option<String>,
    #[arg(long = "end", short, help = "End of the range. Defaults to now")]
    end_date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
    #[arg(
        long = "days",
        default_value_t = false,
        help = "Snap the range to whole days"
    )]
    treat_as_days: bool,
    #[arg(short, long, default_value_t = 10, help = "How many applications to list")]
    limit: usize,
    #[arg(long, help = "Print the summary as JSON")]
    json: bool,
}

#[derive(Debug, Serialize)]
struct SummaryReport {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    active_sec: i64,
    idle_sec: i64,
    categories: Vec<CategoryTotal>,
    apps: Vec<AppTotal>,
}

/// Command to process `summary`. Renders how tracked time between two dates
/// splits across categories and applications.
pub fn process_summary_command(command: SummaryCommand) -> Result<()> {
    let (start, end) = parse_range(&command)?;
    let db = Database::open(&application_data_path()?.join(DB_FILE_NAME))?;

    let start = start.with_timezone(&Utc);
    let end = end.with_timezone(&Utc);
    let report = SummaryReport {
        start,
        end,
        active_sec: db.total_active(start, end)?,
        idle_sec: db.total_idle(start, end)?,
        categories: db.summarize_categories(start, end)?,
        apps: db.top_apps(start, end, command.limit)?,
    };

    if command.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn parse_range(command: &SummaryCommand) -> Result<(DateTime<Local>, DateTime<Local>)> {
    let now = Local::now();
    let dialect: chrono_english::Dialect = command.date_style.into();

    let mut start = match command
        .start_date
        .as_ref()
        .map(|s| parse_date_string(s, now, dialect))
    {
        Some(Ok(v)) => v.with_timezone(&Local),
        Some(Err(e)) => {
            return Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Failed to validate start date {e}"),
                )
                .into());
        }
        None => now.beginning_of_day(),
    };
    let mut end = match command
        .end_date
        .as_ref()
        .map(|s| parse_date_string(s, now, dialect))
    {
        Some(Ok(v)) => v.with_timezone(&Local),
        Some(Err(e)) => {
            return Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Failed to validate end date {e}"),
                )
                .into());
        }
        None => now,
    };
    if command.treat_as_days {
        start = start.beginning_of_day();
        end = next_day_start(end);
    }
    Ok((start, end))
}

fn print_report(report: &SummaryReport) {
    let start = report.start.with_timezone(&Local);
    let end = report.end.with_timezone(&Local);
    println!(
        "Activity from {} to {}",
        start.format("%x %H:%M"),
        end.format("%x %H:%M")
    );
    println!(
        "Active {}\tIdle {}",
        format_duration_sec(report.active_sec),
        format_duration_sec(report.idle_sec)
    );

    let tracked = report.active_sec + report.idle_sec;
    if !report.categories.is_empty() {
        println!();
        for entry in &report.categories {
            println!(
                "{}%\t{}\t{}",
                *seconds_percentage(entry.total_sec, tracked) as i32,
                format_duration_sec(entry.total_sec),
                entry.category
            );
        }
    }

    if !report.apps.is_empty() {
        println!();
        for entry in &report.apps {
            println!(
                "{}%\t{}\t{}",
                *seconds_percentage(entry.total_sec, report.active_sec) as i32,
                format_duration_sec(entry.total_sec),
                entry.process_name
            );
        }
    }
}

fn format_duration_sec(total_sec: i64) -> String {
    let hours = total_sec / 3600;
    let minutes = total_sec % 3600 / 60;
    let seconds = total_sec % 60;
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}
