use std::env;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

const CONFIG_FILE: &str = "log4rs.yaml";
const LEVEL_VAR: &str = "PCANNY_LOG";
const PATTERN: &str = "{d(%H:%M:%S%.3f)} {h({l:<5})} [{T}] {m}{n}";

fn level_from_env() -> LevelFilter {
    env::var(LEVEL_VAR)
        .ok()
        .and_then(|v| LevelFilter::from_str(v.trim()).ok())
        .unwrap_or(LevelFilter::Info)
}

/// Uses `log4rs.yaml` from the working directory when there is one, a stderr
/// console logger otherwise.
pub fn init() -> Result<()> {
    if Path::new(CONFIG_FILE).exists() {
        return log4rs::init_file(CONFIG_FILE, Default::default())
            .with_context(|| format!("failed to load {CONFIG_FILE}"));
    }

    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build();
    let config = Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(level_from_env()))
        .context("invalid logger configuration")?;
    log4rs::init_config(config).context("a logger is already installed")?;
    Ok(())
}
