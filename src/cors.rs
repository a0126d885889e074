//! CORS enforcement around the request handler.
//!
//! We are configured with a single allowed origin. `*` lets everything
//! through; anything else is broken into scheme, host, and port, and an
//! inbound `Origin` header must agree on each component that the configured
//! value actually specifies. So `speed.example.org` accepts that host over
//! any scheme and port, while `https://speed.example.org:8443` pins all
//! three.
//!
//! Either way the configured value is echoed back in
//! `Access-Control-Allow-Origin` on every response, rejections included.

use tracing::info;
use url::Url;

use crate::{event::Request, response::Response};

pub const ALLOW_ORIGIN_HEADER: &str = "access-control-allow-origin";

#[derive(Debug, thiserror::Error)]
#[error("invalid allowed origin {origin:?}: {source}")]
pub struct CorsError {
    origin: String,
    source: url::ParseError,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Cors {
    Disabled,
    Wildcard,
    Origin(AllowedOrigin),
}

#[derive(Clone, Debug, PartialEq)]
pub struct AllowedOrigin {
    origin: String,
    parts: OriginParts,
}

/// The components of an origin that take part in matching. `None` in a
/// configured origin means "anything"; in an inbound one it means "absent".
#[derive(Clone, Debug, Default, PartialEq)]
struct OriginParts {
    scheme: Option<String>,
    host: Option<String>,
    port: Option<u16>,
}

/// Split `scheme://rest` or `//rest`. Returns `None` if `text` has neither
/// form.
fn split_scheme(text: &str) -> Option<(Option<&str>, &str)> {
    if let Some(rest) = text.strip_prefix("//") {
        return Some((None, rest));
    }

    let (scheme, rest) = text.split_once("://")?;

    if !scheme.is_empty() && scheme.chars().all(|c| c.is_ascii_alphabetic()) {
        Some((Some(scheme), rest))
    } else {
        None
    }
}

impl OriginParts {
    /// Parse the authority portion of an origin.
    ///
    /// This goes through a non-special placeholder scheme so that the URL
    /// parser validates host and port without normalizing away a port that
    /// happens to be the scheme's default: ports are compared as written.
    fn parse(scheme: Option<&str>, rest: &str) -> Result<Self, url::ParseError> {
        let url = Url::parse(&format!("origin://{rest}"))?;

        Ok(OriginParts {
            scheme: scheme.map(str::to_ascii_lowercase),
            host: url
                .host_str()
                .filter(|h| !h.is_empty())
                .map(str::to_ascii_lowercase),
            port: url.port(),
        })
    }
}

impl AllowedOrigin {
    fn matches(&self, inbound: &str) -> bool {
        let other = match split_scheme(inbound) {
            Some((scheme, rest)) => match OriginParts::parse(scheme, rest) {
                Ok(p) => p,
                Err(_) => return false,
            },

            // No authority at all: nothing but a path.
            None => OriginParts::default(),
        };

        let want = &self.parts;

        if want.scheme.is_some() && want.scheme != other.scheme {
            return false;
        }

        if want.host.is_some() && want.host != other.host {
            return false;
        }

        if want.port.is_some() && want.port != other.port {
            return false;
        }

        true
    }
}

impl Cors {
    /// Configure CORS from the `ALLOWED_ORIGIN` value. `None` or a blank
    /// string disables it.
    pub fn new(origin: Option<&str>) -> Result<Self, CorsError> {
        let origin = match origin.map(str::trim) {
            None | Some("") => return Ok(Cors::Disabled),
            Some("*") => return Ok(Cors::Wildcard),
            Some(o) => o,
        };

        let (scheme, rest) = split_scheme(origin).unwrap_or((None, origin));

        let parts = OriginParts::parse(scheme, rest).map_err(|source| CorsError {
            origin: origin.to_owned(),
            source,
        })?;

        Ok(Cors::Origin(AllowedOrigin {
            origin: origin.to_owned(),
            parts,
        }))
    }

    /// The value to send in `Access-Control-Allow-Origin`, if enabled.
    pub fn allow_origin(&self) -> Option<&str> {
        match self {
            Cors::Disabled => None,
            Cors::Wildcard => Some("*"),
            Cors::Origin(o) => Some(&o.origin),
        }
    }

    /// Refuse unauthorized cross-origin requests with a 400 response.
    /// Returns `None` if the request may proceed.
    pub fn check_request(&self, request: &Request) -> Option<Response> {
        let Cors::Origin(allowed) = self else {
            return None;
        };

        let origin = request.header("origin");

        if origin.is_some_and(|o| allowed.matches(o)) {
            return None;
        }

        info!(
            origin = origin.unwrap_or("<none>"),
            allowed = %allowed.origin,
            "refusing cross-origin request"
        );
        Some(Response::bad_request(None))
    }

    /// Stamp the configured origin onto an outgoing response.
    pub fn decorate_response(&self, mut response: Response) -> Response {
        if let Some(origin) = self.allow_origin() {
            response
                .headers
                .insert(ALLOW_ORIGIN_HEADER.to_owned(), origin.to_owned());
        }

        response
    }
}
