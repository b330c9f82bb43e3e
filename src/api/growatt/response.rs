use serde::Deserialize;

/// Generic Growatt response envelope.
///
/// The payload sits next to the status fields, hence the flattening.
#[derive(Deserialize)]
pub struct Response<R> {
    success: bool,

    #[serde(rename = "msg")]
    message: Option<String>,

    error: Option<String>,

    #[serde(flatten)]
    result: R,
}

impl<R> From<Response<R>> for Result<R, String> {
    /// Keep the payload on success, or the server's reason otherwise.
    fn from(response: Response<R>) -> Self {
        if response.success {
            return Ok(response.result);
        }
        Err(match (response.error, response.message) {
            (Some(error), Some(message)) => format!(r#"{error} ("{message}")"#),
            (Some(reason), None) | (None, Some(reason)) => reason,
            (None, None) => "no reason given".to_string(),
        })
    }
}

/// Payload of the responses which carry nothing but the status.
#[derive(Deserialize)]
pub struct Empty {}
