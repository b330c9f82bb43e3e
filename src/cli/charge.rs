use std::{path::PathBuf, process::ExitCode};

use chrono::{Local, NaiveDateTime, Timelike};
use clap::Parser;

use crate::{
    api::{forecast_solar, growatt, nominatim},
    cli::{GrowattArgs, heartbeat::HeartbeatArgs},
    config::Config,
    core::{
        controller::{CycleResult, RunController},
        error::Error as CycleError,
        provider::{Credentials, Site},
    },
    prelude::*,
    report::Report,
};

#[derive(Parser)]
pub struct ChargeArgs {
    /// Do everything except configuring the inverter (dry run).
    #[clap(long)]
    scout: bool,

    /// Directory for the run reports.
    #[clap(long, env = "OUTPUT_DIR", default_value = "output")]
    output_dir: PathBuf,

    #[clap(flatten)]
    growatt: GrowattArgs,

    #[clap(flatten)]
    heartbeat: HeartbeatArgs,
}

impl ChargeArgs {
    #[instrument(skip_all, fields(scout = self.scout))]
    pub fn run(&self, config: &Config) -> Result<ExitCode> {
        let result = match Self::prepare(config, &self.growatt) {
            Ok((credentials, site)) => self.run_cycle(config, &credentials, &site),
            Err(error) => CycleResult::rejected(now(), &error),
        };

        let report = Report::new(&result, now());
        print!("{}", report.render());
        report.write_to(&self.output_dir);

        if result.is_success() {
            self.heartbeat.send();
            Ok(ExitCode::SUCCESS)
        } else {
            Ok(ExitCode::FAILURE)
        }
    }

    fn prepare(config: &Config, growatt: &GrowattArgs) -> Result<(Credentials, Site), CycleError> {
        Ok((growatt.credentials(&config.growatt)?, config.forecast.site()?))
    }

    fn run_cycle(&self, config: &Config, credentials: &Credentials, site: &Site) -> CycleResult {
        let forecast_provider = forecast_solar::Api::default();
        let geocoder = nominatim::Api::default();
        let gateway = growatt::Api::new(&config.growatt.base_url);

        RunController::builder()
            .forecast_provider(&forecast_provider)
            .geocoder(&geocoder)
            .gateway(&gateway)
            .planner(config.planner())
            .selector(config.selector())
            .site(site)
            .credentials(credentials)
            .maybe_device(config.growatt.device())
            .retry(config.retry)
            .scout(self.scout)
            .clock(&now)
            .build()
            .run()
    }
}

/// Local wall-clock time, to the second.
fn now() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}
