//! The speedtest results endpoint.
//!
//! The browser test client POSTs its measurements as a urlencoded form once a
//! run completes. We check that the request came in through an expected host
//! and path, coerce the form into a [`MeasurementRecord`], and hand it to the
//! configured [`Store`].
//!
//! Form keys are the client's terse ones: `d`/`u` download/upload speed, `p`
//! ping latency, `j` jitter, `dd`/`ud` bytes transferred in each direction,
//! and `ua` the client's own idea of its user agent.

use chrono::{DateTime, FixedOffset, Utc};
use percent_encoding::percent_decode_str;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{info, warn};

use crate::{
    config::Config,
    event::{Request, RequestContext},
    response::Response,
    store::{Store, StoreError},
};

pub const ALLOWED_METHOD: &str = "POST";

/// Request time as delivered by API Gateway, e.g. `06/Jan/2024:15:04:05 +0000`.
const REQUEST_TIME_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";
const REQUEST_TIME_FORMAT_COMPACT: &str = "%d/%b/%Y:%H:%M:%S%z";

const RECORD_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MeasurementRecord {
    pub origin: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub data: MeasurementData,
    pub datetime: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MeasurementData {
    pub download: f64,
    pub upload: f64,
    pub latency: f64,
    pub jitter: f64,
    pub download_size: f64,
    pub upload_size: f64,
    pub user_agent: String,
}

/// Reasons to refuse a submission that got past the routing checks. All of
/// them are a 400; the message tells them apart.
#[derive(Clone, Copy, Debug, PartialEq, thiserror::Error)]
pub enum Rejection {
    #[error("bad encoding")]
    BadEncoding,

    #[error("missing parameters")]
    MissingParameters,

    #[error("unexpected values")]
    UnexpectedValues,
}

impl Rejection {
    pub fn response(self) -> Response {
        Response::bad_request(Some(&self.to_string()))
    }
}

/// Decode an `application/x-www-form-urlencoded` body.
///
/// Pairs without a `=` or with an empty value are dropped. When a key repeats,
/// the last value wins. A `%` that doesn't introduce two hex digits, or
/// escapes that decode to invalid UTF-8, fail the whole body.
pub fn parse_form(body: &str) -> Result<HashMap<String, String>, Rejection> {
    let mut form = HashMap::new();

    for pair in body.split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };

        if value.is_empty() {
            continue;
        }

        form.insert(decode_component(key)?, decode_component(value)?);
    }

    Ok(form)
}

fn decode_component(text: &str) -> Result<String, Rejection> {
    let bytes = text.as_bytes();

    for (i, _) in text.match_indices('%') {
        let well_formed = bytes
            .get(i + 1..i + 3)
            .is_some_and(|h| h.iter().all(u8::is_ascii_hexdigit));

        if !well_formed {
            return Err(Rejection::BadEncoding);
        }
    }

    let spaced = text.replace('+', " ");

    percent_decode_str(&spaced)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| Rejection::BadEncoding)
}

/// Parse the platform's request timestamp. The space before the UTC offset is
/// optional.
pub fn parse_request_time(time: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(time, REQUEST_TIME_FORMAT)
        .or_else(|_| DateTime::parse_from_str(time, REQUEST_TIME_FORMAT_COMPACT))
        .ok()
}

/// The name under which a result stored at `now` is saved.
pub fn result_name(now: DateTime<Utc>) -> String {
    format!("result-{}-speedtest.json", now.format("%Y%m%dT%H%M%S"))
}

fn text<'a>(form: &'a HashMap<String, String>, key: &str) -> Result<&'a str, Rejection> {
    form.get(key).map(String::as_str).ok_or_else(|| {
        warn!(key, "submission is missing a parameter");
        Rejection::MissingParameters
    })
}

fn number(form: &HashMap<String, String>, key: &str) -> Result<f64, Rejection> {
    let text = text(form, key)?;

    match text.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(Rejection::UnexpectedValues),
    }
}

/// Build the record for a submission.
pub fn measurement(
    request: &Request,
    context: &RequestContext,
) -> Result<MeasurementRecord, Rejection> {
    let origin = request.header("origin");

    let form = parse_form(&request.body).inspect_err(|_| {
        warn!(
            source_ip = request.source_ip.as_deref().unwrap_or("<none>"),
            origin = origin.unwrap_or("<none>"),
            body_len = request.body.len(),
            "could not parse body"
        );
    })?;

    // Fields are taken in order and the first problem decides the rejection.
    let data = MeasurementData {
        download: number(&form, "d")?,
        upload: number(&form, "u")?,
        latency: number(&form, "p")?,
        jitter: number(&form, "j")?,
        download_size: number(&form, "dd")?,
        upload_size: number(&form, "ud")?,
        user_agent: text(&form, "ua")?.to_owned(),
    };

    let datetime = context
        .time
        .as_deref()
        .and_then(parse_request_time)
        .map(|dt| dt.format(RECORD_TIME_FORMAT).to_string());

    Ok(MeasurementRecord {
        origin: origin.map(str::to_owned),
        ip_address: request.source_ip.clone(),
        user_agent: request.user_agent.clone(),
        data,
        datetime,
    })
}

/// Check the host, path, and method of the request, in that order.
pub fn check_route(request: &Request, config: &Config) -> Option<Response> {
    let host = request.header("host").map(str::to_lowercase);

    if !host.as_ref().is_some_and(|h| config.allowed_hosts.contains(h)) {
        info!(host = host.as_deref().unwrap_or("<none>"), "host not allowed");
        return Some(Response::bad_request(None));
    }

    if !request
        .path
        .as_ref()
        .is_some_and(|p| config.allowed_paths.contains(p))
    {
        return Some(Response::not_found(None));
    }

    if request.method.as_deref() != Some(ALLOWED_METHOD) {
        return Some(Response::method_not_allowed(None));
    }

    None
}

/// Persist a speedtest results record.
///
/// Every outcome is a response except a failure to write to a local
/// directory, which is returned as an error.
pub async fn handle(
    request: &Request,
    context: &RequestContext,
    config: &Config,
    store: &Store,
) -> Result<Response, StoreError> {
    if let Some(resp) = check_route(request, config) {
        return Ok(resp);
    }

    let record = match measurement(request, context) {
        Ok(r) => r,
        Err(rejection) => return Ok(rejection.response()),
    };

    store.persist(&result_name(Utc::now()), &record).await
}
