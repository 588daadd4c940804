use anyhow::Result;
use colored::Colorize;

use crate::cli::ConfigCmd;
use crate::types::{
    CFG_BODY_WEIGHT, CFG_OFFLINE, CFG_REMOTE_DB, CFG_USER_ID, closest_match, Config,
};

const KNOWN_KEYS: [&str; 4] = [CFG_USER_ID, CFG_BODY_WEIGHT, CFG_REMOTE_DB, CFG_OFFLINE];

pub async fn handle(cmd: ConfigCmd) -> Result<()> {
    let config_path = Config::path()?;
    let mut cfg = Config::load(&config_path)?;

    match cmd {
        ConfigCmd::List => {
            if cfg.map.is_empty() {
                println!("{}", "(no config set)".dimmed());
            } else {
                println!("{}", "Config:".cyan().bold());
                for (k, v) in &cfg.map {
                    println!("  {} = {}", k.green(), v);
                }
            }
        }

        ConfigCmd::Get { key } => {
            match cfg.map.get(&key) {
                Some(val) => println!("{}", val),
                None      => println!("{} key `{}` not found", "warning:".yellow().bold(), key),
            }
        }

        ConfigCmd::Set { key, val } => {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                match closest_match(&key, KNOWN_KEYS) {
                    Some(s) => println!(
                        "{} `{}` is not a key ferro reads -- did you mean: `{}`?",
                        "warning:".yellow().bold(),
                        key,
                        s.green()
                    ),
                    None => println!(
                        "{} `{}` is not a key ferro reads (known: {})",
                        "warning:".yellow().bold(),
                        key,
                        KNOWN_KEYS.join(", ")
                    ),
                }
            }
            cfg.map.insert(key.clone(), val.clone());
            cfg.save(&config_path)?;
            println!("{} set `{}` = `{}`", "info:".blue().bold(), key.green(), val);
        }

        ConfigCmd::Unset { key } => {
            if cfg.map.remove(&key).is_some() {
                cfg.save(&config_path)?;
                println!("{} removed `{}`", "info:".blue().bold(), key.green());
            } else {
                println!("{} key `{}` not found", "warning:".yellow().bold(), key);
            }
        }
    }

    Ok(())
}
