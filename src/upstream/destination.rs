//! The fixed upstream destination.
//!
//! # Responsibilities
//! - Parse and check the configured destination URL once per server start
//! - Build the outbound URI for each inbound path and query
//!
//! The destination's own path acts as a prefix: `https://h/api` plus an
//! inbound `/foo?x=1` becomes `https://h/api/foo?x=1`.

use std::fmt;

use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::Uri;
use thiserror::Error;
use url::Url;

/// Reasons a destination URL is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DestinationError {
    #[error("not an absolute URL: {0}")]
    Parse(String),

    #[error("unsupported scheme '{0}' (expected http or https)")]
    Scheme(String),

    #[error("missing host")]
    MissingHost,

    #[error("query strings and fragments are not allowed")]
    QueryOrFragment,

    #[error("cannot build upstream URI: {0}")]
    Uri(String),
}

/// A parsed, validated upstream destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    scheme: Scheme,
    authority: Authority,
    base_path: String,
}

impl Destination {
    /// Parse a destination URL.
    pub fn parse(raw: &str) -> Result<Self, DestinationError> {
        let url = Url::parse(raw.trim()).map_err(|e| DestinationError::Parse(e.to_string()))?;

        let scheme = match url.scheme() {
            "http" => Scheme::HTTP,
            "https" => Scheme::HTTPS,
            other => return Err(DestinationError::Scheme(other.to_string())),
        };

        if url.query().is_some() || url.fragment().is_some() {
            return Err(DestinationError::QueryOrFragment);
        }

        let host = url.host_str().ok_or(DestinationError::MissingHost)?;
        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let authority = Authority::try_from(authority.as_str())
            .map_err(|e| DestinationError::Uri(e.to_string()))?;

        Ok(Self {
            scheme,
            authority,
            base_path: url.path().trim_end_matches('/').to_string(),
        })
    }

    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Build the outbound URI for an inbound request target.
    ///
    /// Only the inbound path and query are used, so absolute-form targets
    /// (`GET http://other/x`) still go to the destination.
    pub fn uri_for(&self, inbound: Option<&PathAndQuery>) -> Result<Uri, DestinationError> {
        let path = inbound.map(PathAndQuery::path).filter(|p| !p.is_empty()).unwrap_or("/");

        let mut target = String::with_capacity(self.base_path.len() + path.len() + 16);
        target.push_str(&self.base_path);
        target.push_str(path);
        if let Some(query) = inbound.and_then(PathAndQuery::query) {
            target.push('?');
            target.push_str(query);
        }

        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(target)
            .build()
            .map_err(|e| DestinationError::Uri(e.to_string()))
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.authority, self.base_path)
    }
}
