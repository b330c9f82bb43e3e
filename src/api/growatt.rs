mod models;
mod response;
mod schedule;

use chrono::NaiveDateTime;
use ureq::Agent;

use self::{
    models::{DeviceList, LoginResponse, PlantListResponse, SystemStatusResponse},
    response::{Empty, Response},
    schedule::ChargeSchedule,
};
use crate::{
    api::client,
    core::{
        error::Error as CycleError,
        planner::ChargePlan,
        provider::{Credentials, Device, InverterGateway, InverterSession},
        tariff::TariffWindow,
    },
    prelude::*,
    quantity::percent::Percentage,
};

pub const DEFAULT_BASE_URL: &str = "https://server.growatt.com/";

/// The server turns away unknown user agents, so pretend to be the mobile app.
const USER_AGENT: &str = "Dalvik/2.1.0 (Linux; U; Android 12; growatt-charger)";

/// Growatt ShineServer mobile API.
pub struct Api {
    base_url: String,
}

impl Api {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into() }
    }
}

impl InverterGateway for Api {
    type Session = Session;

    #[instrument(skip_all, fields(username = %credentials.username))]
    fn login(&self, credentials: &Credentials) -> Result<Session> {
        info!("logging in…");
        let client = client::new(USER_AGENT);
        let password = hash_password(&credentials.password);
        let response: LoginResponse = client
            .post(format!("{}newTwoLoginAPI.do", self.base_url))
            .send_form([
                ("userName", credentials.username.as_str()),
                ("password", password.as_str()),
            ])
            .context("failed to call the login endpoint")?
            .body_mut()
            .read_json()
            .context("failed to deserialize the login response")?;
        let authentication_failure = |reason: String| CycleError::AuthenticationFailure {
            username: credentials.username.clone(),
            reason,
        };
        let user = Result::<_, String>::from(response.back)
            .map_err(authentication_failure)?
            .user
            .ok_or_else(|| authentication_failure("no user in the response".to_string()))?;
        info!(user.id, "logged in");
        Ok(Session { client, base_url: self.base_url.clone(), user_id: user.id })
    }
}

/// Logged-in client, the session cookies are kept by the agent.
pub struct Session {
    client: Agent,
    base_url: String,
    user_id: u64,
}

impl Session {
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    #[instrument(skip_all, fields(serial_number = serial_number, setting = setting))]
    fn write_setting(
        &self,
        serial_number: &str,
        setting: &'static str,
        parameters: &[String],
    ) -> Result {
        debug!(?parameters, "writing…");
        let mut form = vec![
            ("op".to_string(), "mixSetApiNew".to_string()),
            ("serialNum".to_string(), serial_number.to_string()),
            ("type".to_string(), setting.to_string()),
        ];
        form.extend(
            parameters
                .iter()
                .enumerate()
                .map(|(i, parameter)| (format!("param{}", i + 1), parameter.clone())),
        );
        let response: Response<Empty> = self
            .client
            .post(self.url("newTcpsetAPI.do"))
            .send_form(form)
            .with_context(|| format!("failed to write `{setting}`"))?
            .body_mut()
            .read_json()
            .with_context(|| format!("failed to deserialize the `{setting}` response"))?;
        Result::<_, String>::from(response).map_err(|reason| CycleError::DeviceWrite {
            serial_number: serial_number.to_string(),
            setting,
            reason,
        })?;
        info!("written");
        Ok(())
    }
}

impl InverterSession for Session {
    #[instrument(skip_all)]
    fn discover_device(&self) -> Result<Device> {
        let response: PlantListResponse = self
            .client
            .get(self.url("PlantListAPI.do"))
            .query("userId", self.user_id.to_string())
            .call()
            .context("failed to list the plants")?
            .body_mut()
            .read_json()
            .context("failed to deserialize the plant list")?;
        let plant = Result::<_, String>::from(response.back)
            .map_err(|reason| anyhow!("failed to list the plants: {reason}"))?
            .data
            .into_iter()
            .next()
            .context("the account has no plants")?;
        info!(plant.id, %plant.name, "found the plant");

        let device = self
            .client
            .get(self.url("newTwoPlantAPI.do"))
            .query("op", "getAllDeviceList")
            .query("plantId", plant.id.to_string())
            .query("pageNum", "1")
            .query("pageSize", "1")
            .call()
            .context("failed to list the devices")?
            .body_mut()
            .read_json::<DeviceList>()
            .context("failed to deserialize the device list")?
            .devices
            .into_iter()
            .next()
            .with_context(|| format!("the plant #{} has no devices", plant.id))?;
        info!(%device.serial_number, %device.kind, "found the device");

        Ok(Device { plant_id: plant.id.to_string(), serial_number: device.serial_number })
    }

    #[instrument(
        skip_all,
        fields(plant_id = %device.plant_id, serial_number = %device.serial_number),
    )]
    fn read_state_of_charge(&self, device: &Device) -> Result<Option<Percentage>> {
        let state_of_charge = self
            .client
            .post(self.url("newMixApi.do"))
            .query("op", "getSystemStatus_KW")
            .query("plantId", &device.plant_id)
            .query("mixId", &device.serial_number)
            .send_empty()
            .context("failed to request the system status")?
            .body_mut()
            .read_json::<SystemStatusResponse>()
            .context("failed to deserialize the system status")?
            .status
            .and_then(|status| status.state_of_charge)
            .map(Percentage);
        info!(?state_of_charge, "fetched");
        Ok(state_of_charge)
    }

    fn set_clock(&self, serial_number: &str, timestamp: NaiveDateTime) -> Result {
        self.write_setting(
            serial_number,
            "pf_sys_year",
            &[timestamp.format("%Y-%m-%d %H:%M:%S").to_string()],
        )
    }

    fn apply_schedule(
        &self,
        serial_number: &str,
        plan: &ChargePlan,
        window: TariffWindow,
    ) -> Result {
        let schedule = ChargeSchedule::single(plan, window);
        debug!(?schedule);
        self.write_setting(serial_number, ChargeSchedule::SETTING, &schedule.to_parameters())
    }
}

/// MD5 hex digest with every `0` at an even position replaced by `c`.
fn hash_password(password: &str) -> String {
    format!("{:x}", md5::compute(password))
        .char_indices()
        .map(|(i, digit)| if i % 2 == 0 && digit == '0' { 'c' } else { digit })
        .collect()
}
