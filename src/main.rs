#![allow(clippy::doc_markdown)]
#![doc = include_str!("../README.md")]

mod api;
mod cli;
mod config;
mod core;
mod prelude;
mod quantity;
mod report;
mod tables;

use std::process::ExitCode;

use clap::{Parser, crate_version};

use crate::{cli::Args, prelude::*};

fn main() -> Result<ExitCode> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().without_time().compact().init();
    info!(version = crate_version!(), "starting…");

    let exit_code = Args::parse().run()?;
    info!("done!");
    Ok(exit_code)
}
