use std::collections::HashMap;

use aho_corasick::AhoCorasick;
use once_cell::sync::Lazy;
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;

use crate::{
    models::{PriceInfo, Station},
    Error, Result,
};

// Matching is a heuristic on the wording of the message, the API has no error codes.
static INVALID_KEY: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(["api-key", "apikey"])
        .expect("static patterns are valid")
});

static RATE_LIMIT: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(["rate limit", "rate-limit"])
        .expect("static patterns are valid")
});

#[derive(Debug, Deserialize)]
pub(crate) struct StationList {
    pub stations: Vec<Station>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StationDetail {
    pub station: Station,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Prices {
    pub prices: HashMap<String, PriceInfo>,
}

/// A response as received from the transport, before any validation
pub(crate) struct RawResponse {
    pub status: StatusCode,
    pub content_type: String,
    pub body: String,
}

impl RawResponse {
    fn is_json(&self) -> bool {
        self.content_type.contains("application/json")
    }

    /// Check the transport level properties of the response and then the envelope, before
    /// decoding the payload into `T`.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T> {
        if self.status.is_server_error() && !self.is_json() {
            return Err(Error::ServerError {
                status: self.status,
                body: self.body,
            });
        }

        if self.status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimit {
                message: self.body.clone(),
                context: serde_json::json!({
                    "status": self.status.as_u16(),
                    "response": self.body,
                }),
            });
        }

        if !self.is_json() {
            return Err(Error::UnexpectedContentType {
                content_type: self.content_type,
                body: self.body,
            });
        }

        decode_envelope(serde_json::from_str(&self.body)?)
    }
}

fn decode_envelope<T: DeserializeOwned>(envelope: Value) -> Result<T> {
    if envelope.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(serde_json::from_value(envelope)?);
    }

    let message = envelope
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();

    log::warn!("tankerkoenig.de API returned an error: {message}");

    if INVALID_KEY.is_match(&message) {
        Err(Error::InvalidKey { message, envelope })
    } else if RATE_LIMIT.is_match(&message) {
        Err(Error::RateLimit {
            message,
            context: envelope,
        })
    } else {
        Err(Error::Api { message, envelope })
    }
}
