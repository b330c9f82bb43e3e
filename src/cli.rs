mod burrow;
mod charge;
mod heartbeat;

use std::{path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};

use crate::{
    cli::{burrow::BurrowArgs, charge::ChargeArgs},
    config::{Config, GrowattConfig},
    core::{error::Error as CycleError, provider::Credentials},
    prelude::*,
};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
#[must_use]
pub struct Args {
    /// Configuration file, the default one gets written there if it is missing.
    #[clap(
        long,
        env = "GROWATT_CHARGER_CONFIG",
        default_value = "growatt-charger.toml",
        global = true
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    pub fn run(self) -> Result<ExitCode> {
        let Some(config) = Config::read_or_bootstrap(&self.config)? else {
            println!(
                "Wrote the default configuration to `{}`, fill it in and run again",
                self.config.display(),
            );
            return Ok(ExitCode::SUCCESS);
        };
        match self.command {
            Command::Charge(args) => args.run(&config),
            Command::Burrow(args) => args.run(&config).map(|()| ExitCode::SUCCESS),
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Main command: plan the upcoming off-peak charge and configure the inverter.
    #[clap(name = "charge")]
    Charge(Box<ChargeArgs>),

    /// Development tools.
    #[clap(name = "burrow")]
    Burrow(Box<BurrowArgs>),
}

#[derive(Parser)]
pub struct GrowattArgs {
    /// Used when `growatt.username` is not set in the configuration file.
    #[clap(long = "growatt-username", env = "GROWATT_USERNAME")]
    username: Option<String>,

    /// Used when `growatt.password` is not set in the configuration file.
    #[clap(long = "growatt-password", env = "GROWATT_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

impl GrowattArgs {
    pub fn credentials(&self, config: &GrowattConfig) -> Result<Credentials, CycleError> {
        config.credentials(self.username.as_deref(), self.password.as_deref())
    }
}
