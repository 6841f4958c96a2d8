use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, ensure, Context, Result};
use pcanny::CannyParams;
use serde::Deserialize;

pub const USAGE: &str = "\
usage: pcanny-app <image> <sigma> <tlow> <thigh> [writedirim] [--workers N]
       pcanny-app --config <file.json> [--workers N]

  image       8-bit PGM image to process
  sigma       standard deviation of the gaussian smoothing filter
  tlow        fraction (0..1) of the high edge strength threshold
  thigh       fraction (0..1) of the distribution of non-zero edge
              strengths for hysteresis
  writedirim  any value writes the gradient direction image as raw f32
  --workers   number of workers (default: available parallelism)
  --config    JSON file with `input`, `workers` and `params`";

#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub input: PathBuf,
    pub workers: usize,
    pub params: CannyParams,
}

#[derive(Debug, PartialEq)]
pub enum Command {
    Run(RunConfig),
    Help,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    input: PathBuf,
    #[serde(default)]
    workers: Option<usize>,
    #[serde(default)]
    params: CannyParams,
}

fn parse_fraction(name: &str, value: &str) -> Result<f32> {
    value
        .parse::<f32>()
        .with_context(|| format!("invalid {name} '{value}'"))
}

fn parse_workers(value: &str) -> Result<usize> {
    let n = value
        .parse::<usize>()
        .with_context(|| format!("invalid worker count '{value}'"))?;
    ensure!(n >= 1, "at least one worker is required");
    Ok(n)
}

fn from_json(data: &str, default_workers: usize) -> Result<RunConfig> {
    let file: ConfigFile = serde_json::from_str(data)?;
    Ok(RunConfig {
        input: file.input,
        workers: file.workers.unwrap_or(default_workers),
        params: file.params,
    })
}

pub fn load_config(path: &Path, default_workers: usize) -> Result<RunConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    from_json(&data, default_workers)
        .with_context(|| format!("failed to parse config {}", path.display()))
}

fn from_positional(args: &[String], default_workers: usize) -> Result<RunConfig> {
    let (input, sigma, tlow, thigh, rest) = match args {
        [input, sigma, tlow, thigh, rest @ ..] => (input, sigma, tlow, thigh, rest),
        _ => bail!("expected at least 4 arguments, got {}\n\n{USAGE}", args.len()),
    };
    ensure!(rest.len() <= 1, "too many arguments\n\n{USAGE}");
    let params = CannyParams::new(
        parse_fraction("sigma", sigma)?,
        parse_fraction("tlow", tlow)?,
        parse_fraction("thigh", thigh)?,
    )
    .with_direction(!rest.is_empty());
    Ok(RunConfig {
        input: PathBuf::from(input),
        workers: default_workers,
        params,
    })
}

/// Parses the arguments following the program name.
pub fn parse_args<I, S>(args: I, default_workers: usize) -> Result<Command>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut positional = Vec::new();
    let mut workers = None;
    let mut config_path = None;

    let mut args = args.into_iter().map(Into::into);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "--workers" => {
                let value = args.next().ok_or_else(|| anyhow!("--workers needs a value"))?;
                workers = Some(parse_workers(&value)?);
            }
            "--config" => {
                let value = args.next().ok_or_else(|| anyhow!("--config needs a path"))?;
                config_path = Some(PathBuf::from(value));
            }
            option if option.starts_with("--") => bail!("unknown option {option}\n\n{USAGE}"),
            _ => positional.push(arg),
        }
    }

    let mut config = match config_path {
        Some(path) => {
            ensure!(
                positional.is_empty(),
                "positional arguments cannot be combined with --config"
            );
            load_config(&path, default_workers)?
        }
        None => from_positional(&positional, default_workers)?,
    };
    if let Some(n) = workers {
        config.workers = n;
    }
    ensure!(config.workers >= 1, "at least one worker is required");
    config.params.validate()?;
    Ok(Command::Run(config))
}
