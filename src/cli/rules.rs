use anyhow::Result;
use clap::Subcommand;
use regex::RegexBuilder;

use crate::{
    daemon::{
        storage::{database::Database, entities::MatchKind, DB_FILE_NAME},
        tracker::rules::DEFAULT_CATEGORIES,
    },
    utils::dir::application_data_path,
};

#[derive(Debug, Subcommand)]
pub enum RuleCommand {
    #[command(about = "List all rules in classification order")]
    List,
    #[command(about = "Add a rule mapping matching apps to a category")]
    Add {
        #[arg(long, help = "Pattern applied to the process name")]
        process: Option<String>,
        #[arg(long, help = "Pattern applied to the window title")]
        title: Option<String>,
        #[arg(
            long = "match",
            default_value = "substring",
            help = "How patterns match: substring or regex"
        )]
        match_kind: MatchKind,
        #[arg(long, help = "Category to assign on match")]
        category: String,
        #[arg(
            long,
            default_value_t = 100,
            help = "Evaluation priority, lower runs first"
        )]
        priority: i64,
        #[arg(long, help = "Create the rule disabled")]
        disabled: bool,
    },
    #[command(about = "Delete a rule")]
    Remove { id: i64 },
    #[command(about = "Enable a rule")]
    Enable { id: i64 },
    #[command(about = "Disable a rule")]
    Disable { id: i64 },
}

pub fn process_rule_command(command: RuleCommand) -> Result<()> {
    let db = Database::open(&application_data_path()?.join(DB_FILE_NAME))?;
    run_rule_command(&db, command)
}

fn run_rule_command(db: &Database, command: RuleCommand) -> Result<()> {
    match command {
        RuleCommand::List => {
            for rule in db.list_rules()? {
                println!(
                    "{}\t{}\t{}\tpriority {}\tprocess {}\ttitle {}\t-> {}",
                    rule.rule_id,
                    if rule.enabled { "on" } else { "off" },
                    rule.match_kind,
                    rule.priority,
                    rule.process_pattern.as_deref().unwrap_or("-"),
                    rule.title_pattern.as_deref().unwrap_or("-"),
                    rule.category,
                );
            }
        }
        RuleCommand::Add {
            process,
            title,
            match_kind,
            category,
            priority,
            disabled,
        } => {
            if !DEFAULT_CATEGORIES.contains(&category.as_str()) {
                println!(
                    "Note: {category} is not one of the stock categories ({})",
                    DEFAULT_CATEGORIES.join(", ")
                );
            }
            if match_kind == MatchKind::Regex {
                for pattern in [&process, &title].into_iter().flatten() {
                    let compiles = RegexBuilder::new(pattern)
                        .case_insensitive(true)
                        .build()
                        .is_ok();
                    if !compiles {
                        println!("Warning: pattern {pattern} doesn't compile and will never match");
                    }
                }
            }
            let id = db.add_rule(
                !disabled,
                match_kind,
                process.as_deref(),
                title.as_deref(),
                &category,
                priority,
            )?;
            println!("Added rule {id}");
        }
        RuleCommand::Remove { id } => {
            if db.delete_rule(id)? {
                println!("Removed rule {id}");
            } else {
                println!("No rule with id {id}");
            }
        }
        RuleCommand::Enable { id } => {
            if db.set_rule_enabled(id, true)? {
                println!("Enabled rule {id}");
            } else {
                println!("No rule with id {id}");
            }
        }
        RuleCommand::Disable { id } => {
            if db.set_rule_enabled(id, false)? {
                println!("Disabled rule {id}");
            } else {
                println!("No rule with id {id}");
            }
        }
    }
    Ok(())
}
