use std::{env, path::PathBuf};

use anyhow::{Result, anyhow};

const DEFAULT_CONFIG_FILE: &str = "vigil.jsonc";
const USAGE: &str = "usage: vigil [--config <path>] [--events <path>]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub config_path: PathBuf,
    /// NDJSON event file; stdin when absent.
    pub events_path: Option<PathBuf>,
}

pub fn args_from_env() -> Result<CliArgs> {
    let default_config = env::current_dir()?.join(DEFAULT_CONFIG_FILE);
    parse_args(env::args().skip(1), default_config)
}

fn parse_args(args: impl IntoIterator<Item = String>, default_config: PathBuf) -> Result<CliArgs> {
    let mut config_path = None;
    let mut events_path = None;
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let slot = match arg.as_str() {
            "--config" | "-c" => &mut config_path,
            "--events" | "-e" => &mut events_path,
            other => return Err(anyhow!("unexpected argument '{other}'. {USAGE}")),
        };
        let value = args
            .next()
            .ok_or_else(|| anyhow!("{arg} expects a path. {USAGE}"))?;
        if slot.replace(PathBuf::from(value)).is_some() {
            return Err(anyhow!("{arg} given more than once. {USAGE}"));
        }
    }

    Ok(CliArgs {
        config_path: config_path.unwrap_or(default_config),
        events_path,
    })
}
