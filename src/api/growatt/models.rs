use serde::Deserialize;
use serde_with::serde_as;

use crate::api::growatt::response::Response;

#[derive(Deserialize)]
pub struct LoginResponse {
    pub back: Response<LoginResult>,
}

#[derive(Deserialize)]
pub struct LoginResult {
    pub user: Option<User>,
}

#[serde_as]
#[derive(Deserialize)]
pub struct User {
    #[serde_as(as = "serde_with::PickFirst<(_, serde_with::DisplayFromStr)>")]
    pub id: u64,
}

#[derive(Deserialize)]
pub struct PlantListResponse {
    pub back: Response<PlantList>,
}

#[derive(Deserialize)]
pub struct PlantList {
    #[serde(default)]
    pub data: Vec<Plant>,
}

#[serde_as]
#[derive(Deserialize)]
pub struct Plant {
    #[serde_as(as = "serde_with::PickFirst<(_, serde_with::DisplayFromStr)>")]
    #[serde(rename = "plantId")]
    pub id: u64,

    #[serde(rename = "plantName", default)]
    pub name: String,
}

#[derive(Deserialize)]
pub struct DeviceList {
    #[serde(rename = "deviceList", default)]
    pub devices: Vec<DeviceItem>,
}

#[derive(Deserialize)]
pub struct DeviceItem {
    #[serde(rename = "deviceSn")]
    pub serial_number: String,

    #[serde(rename = "deviceType", default)]
    pub kind: String,
}

#[derive(Deserialize)]
pub struct SystemStatusResponse {
    #[serde(rename = "obj")]
    pub status: Option<SystemStatus>,
}

#[serde_as]
#[derive(Deserialize)]
pub struct SystemStatus {
    /// Percent as a string, sometimes empty.
    #[serde_as(as = "serde_with::NoneAsEmptyString")]
    #[serde(rename = "SOC", default)]
    pub state_of_charge: Option<f64>,
}
