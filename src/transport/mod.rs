//! Transport primitives with no knowledge of stack operations.
//!
//! - [`rest::RestTransport`]: one request, one parsed response.
//! - [`ws::WsTransport`]: a persistent connection carrying text messages.
//!
//! Both normalize their failures into [`crate::error::TransportError`].

pub mod rest;
pub mod ws;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::error::TransportError;

/// Build a header map from name/value pairs, rejecting invalid HTTP tokens.
///
/// # Errors
///
/// Returns [`TransportError::InvalidHeader`] for the first bad name or value.
pub fn header_map<'a, I>(pairs: I) -> Result<HeaderMap, TransportError>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        let (name, value) = header_pair(name, value)?;
        headers.insert(name, value);
    }
    Ok(headers)
}

pub(crate) fn header_pair(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), TransportError> {
    let header_name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| TransportError::InvalidHeader { name: name.to_string(), message: e.to_string() })?;
    let header_value = HeaderValue::from_str(value)
        .map_err(|e| TransportError::InvalidHeader { name: name.to_string(), message: e.to_string() })?;
    Ok((header_name, header_value))
}
