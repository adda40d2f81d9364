use reqwest::header::HeaderMap;
use std::collections::BTreeMap;

/// Storage headers worth logging when a request needs to be traced on the
/// provider side.
const REQUEST_ID_HEADERS: [&str; 3] = ["x-amz-request-id", "x-amz-id-2", "x-request-id"];

/// `User-Agent` sent with every storage request.
pub fn default_user_agent() -> String {
    format!(
        "replay-uploader/{} ({}; {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// Builds the reqwest client used for object-storage transfers.
pub fn build_reqwest_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(default_user_agent())
        .build()
}

/// Presigned upload links carry credentials in the query string.
pub fn redact_query(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}

pub(crate) fn request_ids(headers: &HeaderMap) -> BTreeMap<&'static str, String> {
    REQUEST_ID_HEADERS
        .into_iter()
        .filter_map(|name| {
            let value = headers.get(name)?.to_str().ok()?;
            Some((name, value.to_owned()))
        })
        .collect()
}
