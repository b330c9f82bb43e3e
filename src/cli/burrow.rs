use chrono::Local;
use clap::{Parser, Subcommand};

use crate::{
    api::{forecast_solar, growatt, nominatim},
    cli::GrowattArgs,
    config::Config,
    core::provider::{ForecastProvider, InverterGateway, InverterSession},
    prelude::*,
    tables::build_forecast_table,
};

#[derive(Parser)]
pub struct BurrowArgs {
    #[command(subcommand)]
    command: BurrowCommand,
}

impl BurrowArgs {
    pub fn run(&self, config: &Config) -> Result {
        match &self.command {
            BurrowCommand::Forecast => burrow_forecast(config),
            BurrowCommand::StateOfCharge(args) => args.run(config),
        }
    }
}

#[derive(Subcommand)]
pub enum BurrowCommand {
    /// Fetch the solar forecast for the upcoming off-peak window.
    Forecast,

    /// Test Growatt connectivity by reading the current state of charge.
    StateOfCharge(BurrowStateOfChargeArgs),
}

#[instrument(skip_all)]
fn burrow_forecast(config: &Config) -> Result {
    let site = config.forecast.site()?;
    let coordinates = site.location.resolve(&nominatim::Api::default())?;
    let raw = forecast_solar::Api::default().estimate(coordinates, &site)?;
    let forecast = config.selector().select(
        raw,
        config.tariff.start,
        Local::now().naive_local(),
    )?;
    let battery = &config.battery;
    println!(
        "{}",
        build_forecast_table(&forecast, battery.average_load, battery.profile.max_charge_rate),
    );
    match forecast.grid_neutral_time(battery.average_load) {
        Some(grid_neutral_time) => info!(%grid_neutral_time, total = ?forecast.total(), "gotcha"),
        None => warn!(total = ?forecast.total(), "never grid neutral"),
    }
    Ok(())
}

#[derive(Parser)]
pub struct BurrowStateOfChargeArgs {
    #[clap(flatten)]
    growatt: GrowattArgs,
}

impl BurrowStateOfChargeArgs {
    fn run(&self, config: &Config) -> Result {
        let credentials = self.growatt.credentials(&config.growatt)?;
        let session = growatt::Api::new(&config.growatt.base_url).login(&credentials)?;
        let device = match config.growatt.device() {
            Some(device) => device,
            None => session.discover_device()?,
        };
        let state_of_charge = session
            .read_state_of_charge(&device)?
            .context("the device did not report its state of charge")?;
        println!("{}: {state_of_charge:.0}", device.serial_number);
        Ok(())
    }
}
