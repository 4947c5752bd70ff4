use std::str::FromStr;

use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::append::Append;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

use rjet_core::{JetError, Result};

/// init log4rs with a console appender
/// level value: ["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"], ignore ascii case
pub fn init_log(level: &str) -> Result<()> {
    let default_level = LevelFilter::from_str(level)
        .map_err(|_e| JetError::Config(format!("can not parse log level `{}`", level)))?;

    let encoder =
        PatternEncoder::new("{d(%Y-%m-%d %H:%M:%S%.3f)} {level} [{thread}] {target} - {m}{n}");

    let name = "console";
    let config = Config::builder()
        .appender(Appender::builder().build(name, create_console_appender(encoder)))
        .build(Root::builder().appender(name).build(default_level))
        .map_err(|e| JetError::Config(format!("invalid log config: {}", e)))?;

    log4rs::init_config(config)
        .map(|_handle| ())
        .map_err(|e| JetError::Config(format!("logger already initialized: {}", e)))
}

fn create_console_appender(encoder: PatternEncoder) -> Box<dyn Append> {
    let stdout = ConsoleAppender::builder()
        .target(Target::Stdout)
        .encoder(Box::new(encoder))
        .build();
    let appender: Box<dyn Append> = Box::new(stdout);
    appender
}
