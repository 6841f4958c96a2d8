mod config;
mod io;
mod logging;

use std::env;
use std::num::NonZeroUsize;
use std::thread;
use std::time::Instant;

use anyhow::{anyhow, Result};
use log::info;
use pcanny::{canny, distribute_raster, run_group, Collective};

use crate::config::{parse_args, Command, USAGE};

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    logging::init()?;
    let default_workers = thread::available_parallelism().map_or(1, NonZeroUsize::get);
    let config = match parse_args(env::args().skip(1), default_workers)? {
        Command::Run(config) => config,
        Command::Help => {
            println!("{USAGE}");
            return Ok(());
        }
    };

    info!(
        "processing {} with {} workers (sigma {}, tlow {}, thigh {})",
        config.input.display(),
        config.workers,
        config.params.sigma,
        config.params.tlow,
        config.params.thigh
    );
    let start = Instant::now();
    let outputs = run_group(config.workers, |ctx| {
        let image = if ctx.is_leader() {
            info!("reading the image {}", config.input.display());
            Some(io::read_pgm(&config.input)?)
        } else {
            None
        };
        let image = distribute_raster(ctx, image)?;
        canny(ctx, &image, &config.params)
    })?;
    info!("edge detection took {:?}", start.elapsed());

    let leader = outputs
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("the worker group returned no results"))?;
    let edges = leader
        .edges
        .ok_or_else(|| anyhow!("the leader returned no edge map"))?;
    info!(
        "thresholds: low {} high {}",
        leader.thresholds.low, leader.thresholds.high
    );

    let edge_path = io::output_path(&config.input, &config.params, "pgm");
    info!("writing the edge image to {}", edge_path.display());
    io::write_pgm(&edge_path, &edges)?;

    if let Some(direction) = &leader.direction {
        let dir_path = io::output_path(&config.input, &config.params, "fim");
        info!("writing the direction image to {}", dir_path.display());
        io::write_fim(&dir_path, direction)?;
    }
    Ok(())
}
