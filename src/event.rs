//! Adaptation of the raw Lambda HTTP event.
//!
//! The function URL / API Gateway v2 payload is a loosely-structured JSON
//! object; nearly every field may be missing depending on who invoked us (a
//! real HTTP trigger, the SAM local emulator, a hand-written test event). We
//! map it onto fixed-field [`Request`] and [`RequestContext`] structs in which
//! every core field is always present, as `None` if the event lacked it.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{
    de::{self, MapAccess, Visitor},
    Deserialize, Deserializer,
};
use serde_json::Value;
use std::{collections::HashMap, fmt};

#[derive(Debug, thiserror::Error)]
pub enum AdaptError {
    #[error("malformed event: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("body is flagged base64 but does not decode: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("decoded body is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// The subset of the platform event that we care about.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawEvent {
    body: Option<String>,
    is_base64_encoded: Option<bool>,
    #[serde(deserialize_with = "header_pairs")]
    headers: Vec<(String, String)>,
    cookies: Option<Vec<String>>,
    request_context: Option<RawRequestContext>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawRequestContext {
    http: Option<RawHttp>,
    account_id: Option<String>,
    api_id: Option<String>,
    domain_name: Option<String>,
    domain_prefix: Option<String>,
    request_id: Option<String>,
    route_key: Option<String>,
    stage: Option<String>,
    time: Option<String>,
    #[serde(deserialize_with = "lenient_epoch")]
    time_epoch: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawHttp {
    method: Option<String>,
    path: Option<String>,
    protocol: Option<String>,
    #[serde(rename = "sourceIp")]
    source_ip: Option<String>,
    #[serde(rename = "sourceIP")]
    source_ip_upper: Option<String>,
    user_agent: Option<String>,
}

/// Accept the epoch as an integer, a float, or a numeric string. Anything else
/// is treated as absent.
fn lenient_epoch<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;

    Ok(match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
        }
        _ => None,
    })
}

/// Deserialize a header object into pairs, keeping the event's key order so
/// that case-folding collisions resolve predictably. Null values are skipped;
/// other non-string values are kept as their JSON text.
fn header_pairs<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct PairsVisitor;

    impl<'de> Visitor<'de> for PairsVisitor {
        type Value = Vec<(String, String)>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of header names to string values")
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut pairs = Vec::with_capacity(map.size_hint().unwrap_or(0));

            while let Some((key, value)) = map.next_entry::<String, Value>()? {
                match value {
                    Value::Null => {}
                    Value::String(s) => pairs.push((key, s)),
                    other => pairs.push((key, other.to_string())),
                }
            }

            Ok(pairs)
        }
    }

    deserializer.deserialize_any(PairsVisitor)
}

/// The normalized view of one HTTP request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Request {
    /// The body as text, base64-decoded if the platform had encoded it.
    pub body: String,

    /// The body exactly as delivered in the event.
    pub body_raw: String,

    pub cookies: Vec<String>,

    /// Header names are lower-cased; values are untouched.
    pub headers: HashMap<String, String>,

    pub method: Option<String>,
    pub path: Option<String>,
    pub protocol: Option<String>,
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Request metadata supplied by the platform alongside the request proper.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RequestContext {
    pub account_id: Option<String>,
    pub api_id: Option<String>,
    pub domain_name: Option<String>,
    pub domain_prefix: Option<String>,
    pub request_id: Option<String>,
    pub route_key: Option<String>,
    pub stage: Option<String>,

    /// Request time in the CLF-style `06/Jan/2024:15:04:05 +0000` format.
    pub time: Option<String>,

    /// Request time in milliseconds since the Unix epoch.
    pub time_epoch: Option<i64>,

    pub is_base64_encoded: Option<bool>,
}

/// Map a platform event to a [`Request`].
pub fn adapt(event: Value) -> Result<Request, AdaptError> {
    let raw: RawEvent = serde_json::from_value(event)?;
    let (request, _) = raw.into_parts()?;
    Ok(request)
}

/// Map a platform event to a [`Request`] and its [`RequestContext`].
pub fn adapt_with_context(event: Value) -> Result<(Request, RequestContext), AdaptError> {
    let raw: RawEvent = serde_json::from_value(event)?;
    raw.into_parts()
}

impl RawEvent {
    fn into_parts(self) -> Result<(Request, RequestContext), AdaptError> {
        let body_raw = self.body.unwrap_or_default();

        let body = if self.is_base64_encoded == Some(true) {
            String::from_utf8(STANDARD.decode(&body_raw)?)?
        } else {
            body_raw.clone()
        };

        // Later pairs overwrite earlier ones, so the last spelling of a
        // header (in event order) wins.
        let headers = self
            .headers
            .into_iter()
            .map(|(key, value)| (key.to_lowercase(), value))
            .collect();

        let raw_ctx = self.request_context.unwrap_or_default();
        let http = raw_ctx.http.unwrap_or_default();

        let request = Request {
            body,
            body_raw,
            cookies: self.cookies.unwrap_or_default(),
            headers,
            method: http.method,
            path: http.path,
            protocol: http.protocol,
            source_ip: http.source_ip.or(http.source_ip_upper),
            user_agent: http.user_agent,
        };

        let context = RequestContext {
            account_id: raw_ctx.account_id,
            api_id: raw_ctx.api_id,
            domain_name: raw_ctx.domain_name,
            domain_prefix: raw_ctx.domain_prefix,
            request_id: raw_ctx.request_id,
            route_key: raw_ctx.route_key,
            stage: raw_ctx.stage,
            time: raw_ctx.time,
            time_epoch: raw_ctx.time_epoch,
            is_base64_encoded: self.is_base64_encoded,
        };

        Ok((request, context))
    }
}
