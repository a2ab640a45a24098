//! File logging. The terminal UI owns stdout, so nothing is written there.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use log::{LevelFilter, info};
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

pub const LEVEL_ENV: &str = "QUICKCHAT_LOG";

const ROLL_SIZE: u64 = 1024 * 1024;
const ROLL_ARCHIVES: u32 = 3;
const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} {l:<5} {t} - {m}{n}";

/// Loads `config/log4rs.yaml` when present, otherwise logs to a rolling
/// `logs/quickchat.log` under `root`.
pub fn init(root: &Path) -> Result<()> {
    let yaml = root.join("config").join("log4rs.yaml");
    if yaml.is_file() {
        log4rs::init_file(&yaml, Default::default())
            .map_err(|err| anyhow!("{err}"))
            .with_context(|| format!("failed to load {}", yaml.display()))?;
        info!("Logging configured from {}", yaml.display());
        return Ok(());
    }

    let level = level_from(std::env::var(LEVEL_ENV).ok().as_deref());
    let log_file = log_path(root);
    let config = rolling_config(&log_file, level)?;
    log4rs::init_config(config).context("a logger is already installed")?;
    info!("Logging initialized at {level}, writing to {}", log_file.display());
    Ok(())
}

pub fn log_path(root: &Path) -> PathBuf {
    root.join("logs").join("quickchat.log")
}

/// Unset or unparsable values fall back to `info`.
pub fn level_from(value: Option<&str>) -> LevelFilter {
    value
        .and_then(|value| LevelFilter::from_str(value.trim()).ok())
        .unwrap_or(LevelFilter::Info)
}

fn rolling_config(log_file: &Path, level: LevelFilter) -> Result<Config> {
    let archive = log_file.with_file_name("quickchat.{}.log.gz");
    let roller = FixedWindowRoller::builder()
        .base(1)
        .build(&archive.to_string_lossy(), ROLL_ARCHIVES)
        .map_err(|err| anyhow!("{err}"))?;
    let policy = CompoundPolicy::new(
        Box::new(SizeTrigger::new(ROLL_SIZE)),
        Box::new(roller),
    );
    let appender = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build(log_file, Box::new(policy))
        .with_context(|| format!("failed to open {}", log_file.display()))?;

    Config::builder()
        .appender(Appender::builder().build("file", Box::new(appender)))
        .build(Root::builder().appender("file").build(level))
        .map_err(|err| anyhow!("{err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_parsing() {
        assert_eq!(level_from(None), LevelFilter::Info);
        assert_eq!(level_from(Some("debug")), LevelFilter::Debug);
        assert_eq!(level_from(Some(" TRACE ")), LevelFilter::Trace);
        assert_eq!(level_from(Some("chatty")), LevelFilter::Info);
    }

    #[test]
    fn rolling_config_creates_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let log_file = log_path(dir.path());
        rolling_config(&log_file, LevelFilter::Warn).unwrap();
        assert!(log_file.exists());
    }
}
