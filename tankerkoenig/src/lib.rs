//!
//! This crate is a client for the [tankerkoenig.de](https://creativecommons.tankerkoenig.de) API,
//! that provides the prices of german gas stations as published by the Markttransparenzstelle
//! für Kraftstoffe (MTS-K). An API key is required, it can be requested on the tankerkoenig
//! website.
//!
//! The entry point of the crate is [Tankerkoenig::new], or [Tankerkoenig::with_options] to
//! provide an existing [reqwest::Client] or to change the request timeout.
//!
//! Each call performs exactly one request, errors are never retried. The API rate limits callers
//! that poll it too often, so it is up to the caller to throttle requests.
//!

use std::{collections::HashMap, time::Duration};

use once_cell::sync::OnceCell;
use reqwest::{
    header::{ACCEPT, CONTENT_TYPE},
    StatusCode,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

mod models;
mod response;

pub use models::{FuelType, OpeningTime, PriceInfo, SortOrder, Station, StationStatus};
use response::{Prices, RawResponse, StationDetail, StationList};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const BASE_URL: &str = "https://creativecommons.tankerkoenig.de";
const USER_AGENT: &str = concat!("tankerkoenig-rs/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("error while connecting to the tankerkoenig.de API")]
    Connection(#[source] reqwest::Error),
    #[error("timeout occurred while connecting to the tankerkoenig.de API")]
    ConnectionTimeout(#[source] reqwest::Error),
    #[error("tankerkoenig.de API is unavailable (status {status})")]
    ServerError { status: StatusCode, body: String },
    #[error("unexpected content type '{content_type}' from the tankerkoenig.de API")]
    UnexpectedContentType { content_type: String, body: String },
    #[error("API key was rejected: {message}")]
    InvalidKey { message: String, envelope: Value },
    #[error("rate limit of the tankerkoenig.de API was reached: {message}")]
    RateLimit { message: String, context: Value },
    #[error("tankerkoenig.de API returned an error: {message}")]
    Api { message: String, envelope: Value },
    #[error("could not parse the response")]
    Parsing(#[from] serde_json::Error),
    #[error("search radius must be a positive number of kilometers, got {0}")]
    InvalidRadius(f64),
    #[error("the client session was closed")]
    Closed,
}

/// Category of an [Error], to be able to handle errors without matching on every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The API could not be reached, or failed to answer
    Connection,
    /// No response was received before the configured timeout. This is also a connection error.
    ConnectionTimeout,
    InvalidKey,
    RateLimit,
    /// The API answered with an error, or with something that is not JSON
    Api,
    /// The response claimed to be JSON but could not be decoded
    Malformed,
    InvalidArgument,
    Closed,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    fn from_transport(err: reqwest::Error) -> Self {
        match err.is_timeout() {
            true => Error::ConnectionTimeout(err),
            false => Error::Connection(err),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connection(_) | Error::ServerError { .. } => ErrorKind::Connection,
            Error::ConnectionTimeout(_) => ErrorKind::ConnectionTimeout,
            Error::UnexpectedContentType { .. } | Error::Api { .. } => ErrorKind::Api,
            Error::InvalidKey { .. } => ErrorKind::InvalidKey,
            Error::RateLimit { .. } => ErrorKind::RateLimit,
            Error::Parsing(_) => ErrorKind::Malformed,
            Error::InvalidRadius(_) => ErrorKind::InvalidArgument,
            Error::Closed => ErrorKind::Closed,
        }
    }

    /// True for every transport failure, timeouts included
    pub fn is_connection(&self) -> bool {
        matches!(self.kind(), ErrorKind::Connection | ErrorKind::ConnectionTimeout)
    }

    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::ConnectionTimeout
    }

    /// Structured information on what the API answered, when it answered something.
    ///
    /// For errors reported by the API this is the whole JSON envelope, the original message is
    /// always preserved there even if the error was classified from it.
    pub fn context(&self) -> Option<Value> {
        match self {
            Error::UnexpectedContentType { content_type, body } => Some(serde_json::json!({
                "Content-Type": content_type,
                "response": body,
            })),
            Error::ServerError { status, body } => Some(serde_json::json!({
                "status": status.as_u16(),
                "response": body,
            })),
            Error::InvalidKey { envelope, .. } | Error::Api { envelope, .. } => {
                Some(envelope.clone())
            }
            Error::RateLimit { context, .. } => Some(context.clone()),
            _ => None,
        }
    }
}

/// Client of the tankerkoenig.de API.
///
/// When no [reqwest::Client] is provided one is created on the first request, and is owned by
/// this client: it is released by [Tankerkoenig::close], or when the client is dropped. A
/// provided session is never closed.
pub struct Tankerkoenig {
    api_key: String,
    base_url: String,
    timeout: Duration,
    session: OnceCell<reqwest::Client>,
    owns_session: bool,
    closed: bool,
}

/// This struct allows to customize the client, with [Tankerkoenig::with_options].
pub struct TankerkoenigBuilder {
    api_key: String,
    base_url: String,
    timeout: Duration,
    session: Option<reqwest::Client>,
}

impl Tankerkoenig {
    /// Create a [TankerkoenigBuilder] to be able to customize the options. See it's documentation
    /// for more information on options.
    pub fn with_options(api_key: impl Into<String>) -> TankerkoenigBuilder {
        TankerkoenigBuilder {
            api_key: api_key.into(),
            base_url: BASE_URL.into(),
            timeout: DEFAULT_TIMEOUT,
            session: None,
        }
    }

    /// Create a [Tankerkoenig] client with default options
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_options(api_key).build()
    }

    fn session(&self) -> Result<&reqwest::Client> {
        if self.closed {
            return Err(Error::Closed);
        }

        self.session.get_or_try_init(|| {
            log::debug!("creating HTTP session");

            reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .build()
                .map_err(Error::Connection)
        })
    }

    async fn request<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let session = self.session()?;

        log::debug!("fetching {path} with {params:?}");

        let response = session
            .get(format!("{}{path}", self.base_url))
            .query(&[("apikey", &self.api_key)])
            .query(params)
            .header(ACCEPT, "application/json")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(Error::from_transport)?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned();
        let body = response.text().await.map_err(Error::from_transport)?;

        RawResponse {
            status,
            content_type,
            body,
        }
        .decode()
    }

    /// Search the stations around `coordinates` (latitude, longitude), up to `radius` kilometers.
    pub async fn nearby_stations(
        &self,
        coordinates: (f64, f64),
        radius: f64,
        fuel_type: FuelType,
        sort: SortOrder,
    ) -> Result<Vec<Station>> {
        if !(radius.is_finite() && radius > 0.) {
            return Err(Error::InvalidRadius(radius));
        }

        let (lat, lng) = coordinates;
        let list: StationList = self
            .request(
                "/json/list.php",
                &[
                    ("lat", lat.to_string()),
                    ("lng", lng.to_string()),
                    ("rad", radius.to_string()),
                    ("type", fuel_type.as_query().into()),
                    ("sort", sort.as_query().into()),
                ],
            )
            .await?;

        Ok(list.stations)
    }

    /// Fetch all the information on a single station, including its opening times.
    pub async fn station_details(&self, station_id: &str) -> Result<Station> {
        let detail: StationDetail = self
            .request("/json/detail.php", &[("id", station_id.into())])
            .await?;

        Ok(detail.station)
    }

    /// Fetch the current prices of several stations. Unknown stations are silently omitted by
    /// the API, so the result may contain less entries than requested.
    pub async fn prices<S: AsRef<str>>(
        &self,
        station_ids: &[S],
    ) -> Result<HashMap<String, PriceInfo>> {
        let ids = station_ids
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(",");

        let prices: Prices = self.request("/json/prices.php", &[("ids", ids)]).await?;

        Ok(prices.prices)
    }

    /// Release the session if it was created by this client. Requests made afterwards fail with
    /// [Error::Closed]. Does nothing for a provided session.
    pub fn close(&mut self) {
        if self.owns_session && !self.closed {
            log::debug!("closing owned HTTP session");

            self.session.take();
            self.closed = true;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for Tankerkoenig {
    fn drop(&mut self) {
        self.close()
    }
}

impl TankerkoenigBuilder {
    /// Use an existing session instead of creating one. Its default headers are kept as is, and
    /// it is never closed by the [Tankerkoenig] client.
    pub fn session(self, session: reqwest::Client) -> Self {
        Self {
            session: Some(session),
            ..self
        }
    }

    /// Time allowed for a whole request, until the body is received. Defaults to
    /// [DEFAULT_TIMEOUT].
    pub fn timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    /// Send the requests to another server than tankerkoenig.de, like a proxy.
    pub fn base_url(self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').into(),
            ..self
        }
    }

    /// Create a [Tankerkoenig] client using the specified options.
    pub fn build(self) -> Tankerkoenig {
        let owns_session = self.session.is_none();
        let session = match self.session {
            Some(session) => OnceCell::with_value(session),
            None => OnceCell::new(),
        };

        Tankerkoenig {
            api_key: self.api_key,
            base_url: self.base_url,
            timeout: self.timeout,
            session,
            owns_session,
            closed: false,
        }
    }
}

#[cfg(test)]
mod test {
    use mockito::{Matcher, Server};
    use test_log::test;
    use tokio::net::TcpListener;

    use super::*;

    const DETAIL: &str = include_str!("../../data/detail.json");
    const LIST: &str = include_str!("../../data/list.json");
    const PRICES: &str = include_str!("../../data/prices.json");

    const API_KEY: &str = "abc123";

    fn query(params: &[(&str, &str)]) -> Matcher {
        Matcher::AllOf(
            std::iter::once(("apikey", API_KEY))
                .chain(params.iter().copied())
                .map(|(k, v)| Matcher::UrlEncoded(k.into(), v.into()))
                .collect(),
        )
    }

    fn client(server: &Server) -> Tankerkoenig {
        Tankerkoenig::with_options(API_KEY)
            .base_url(server.url())
            .build()
    }

    #[test(tokio::test)]
    async fn nearby_stations() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/json/list.php")
            .match_query(query(&[
                ("lat", "53.1"),
                ("lng", "7.8"),
                ("rad", "5"),
                ("type", "all"),
                ("sort", "dist"),
            ]))
            .match_header("accept", "application/json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(LIST)
            .create_async()
            .await;

        let stations = client(&server)
            .nearby_stations((53.1, 7.8), 5., FuelType::All, SortOrder::Distance)
            .await
            .unwrap();

        mock.assert_async().await;

        assert_eq!(stations.len(), 3);

        assert_eq!(stations[0].id, "3c4f3f0b-1e59-4a5b-b5e1-21b7de5a7d87");
        assert_eq!(stations[0].name, "Aral Tankstelle");
        assert_eq!(stations[0].brand.as_deref(), Some("ARAL"));
        assert_eq!(stations[0].house_number, "62");
        assert_eq!(stations[0].post_code, 26655);
        assert_eq!(stations[0].lat, 53.2571);
        assert_eq!(stations[0].lng, 7.93015);
        assert_eq!(stations[0].distance, Some(1.1));
        assert_eq!(stations[0].diesel, Some(1.659));
        assert_eq!(stations[0].e5, Some(1.829));
        assert_eq!(stations[0].e10, Some(1.769));
        assert_eq!(stations[0].is_open, Some(true));

        assert_eq!(stations[1].id, "b0b4e4bd-b4c2-4b63-9a5e-a46e7c4cbb19");
        assert_eq!(stations[1].house_number, "");
        assert_eq!(stations[1].post_code, 26689);
        assert_eq!(stations[1].distance, Some(3.4));
        assert_eq!(stations[1].e5, None);
        assert_eq!(stations[1].is_open, Some(false));

        assert_eq!(stations[2].id, "6bb5bfd0-1d3c-4d3a-8d5b-0c7c4b0b2a1e");
        assert_eq!(stations[2].house_number, "14a");
        assert_eq!(stations[2].distance, Some(4.8));
        assert_eq!(stations[2].diesel, None);

        assert!(stations.iter().all(|s| s.opening_times.is_empty()));
        assert!(stations.iter().all(|s| s.state.is_none()));
    }

    #[test(tokio::test)]
    async fn station_details() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/json/detail.php")
            .match_query(query(&[("id", "474e5046-deaf-4f9b-9a32-9797b778f047")]))
            .match_header("user-agent", USER_AGENT)
            .with_status(200)
            .with_header("content-type", "application/json; charset=utf-8")
            .with_body(DETAIL)
            .create_async()
            .await;

        let station = client(&server)
            .station_details("474e5046-deaf-4f9b-9a32-9797b778f047")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(station.name, "TOTAL BERLIN");
        assert_eq!(station.distance, None);
        assert_eq!(station.opening_times.len(), 3);
    }

    #[test(tokio::test)]
    async fn prices() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/json/prices.php")
            .match_query(query(&[(
                "ids",
                "4fd02fd5-0a4c-46b3-a9b9-a488a62454be,446bdcf5-9f75-47fc-9cfa-2c3d6fda1c3b",
            )]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(PRICES)
            .create_async()
            .await;

        let prices = client(&server)
            .prices(&[
                "4fd02fd5-0a4c-46b3-a9b9-a488a62454be",
                "446bdcf5-9f75-47fc-9cfa-2c3d6fda1c3b",
            ])
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(
            prices["4fd02fd5-0a4c-46b3-a9b9-a488a62454be"].status,
            StationStatus::Open
        );
        assert_eq!(
            prices["60c0eefa-d2a8-4f5c-82cc-b5244ecae955"].status,
            StationStatus::Unknown
        );
    }

    #[test(tokio::test)]
    async fn timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Accept connections, but never answer
        tokio::spawn(async move {
            let mut sockets = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                sockets.push(socket);
            }
        });

        let client = Tankerkoenig::with_options(API_KEY)
            .base_url(format!("http://{addr}"))
            .timeout(Duration::from_millis(200))
            .build();

        let err = client.station_details("1").await.unwrap_err();
        assert!(matches!(err, Error::ConnectionTimeout(_)), "{err:?}");
        assert!(err.is_timeout());
        assert!(err.is_connection());
    }

    #[test(tokio::test)]
    async fn connection_refused() {
        let addr = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap();

        let client = Tankerkoenig::with_options(API_KEY)
            .base_url(format!("http://{addr}"))
            .build();

        let err = client.station_details("1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert!(!err.is_timeout());
    }

    #[test(tokio::test)]
    async fn unexpected_server_response() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/json/detail.php")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "plain/text")
            .with_body("Yes")
            .create_async()
            .await;

        let err = client(&server).station_details("1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Api);
        assert_eq!(err.context().unwrap()["response"], "Yes");
    }

    #[test(tokio::test)]
    async fn non_200_response() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/json/detail.php")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_header("content-type", "plain/text")
            .with_body("Yes")
            .create_async()
            .await;

        let err = client(&server).station_details("1").await.unwrap_err();
        assert!(err.is_connection(), "{err:?}");
    }

    #[test(tokio::test)]
    async fn invalid_api_key() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/json/detail.php")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status": "error", "ok": false, "message": "API-Key existiert nicht"}"#)
            .create_async()
            .await;

        let err = client(&server).station_details("1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidKey);
        assert_eq!(err.context().unwrap()["message"], "API-Key existiert nicht");
    }

    #[test(tokio::test)]
    async fn owned_session() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/json/detail.php")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(DETAIL)
            .expect(1)
            .create_async()
            .await;

        let mut client = client(&server);
        client.station_details("1").await.unwrap();
        assert!(!client.is_closed());

        client.close();
        assert!(client.is_closed());
        client.close();

        let err = client.station_details("1").await.unwrap_err();
        assert!(matches!(err, Error::Closed));

        mock.assert_async().await;
    }

    #[test(tokio::test)]
    async fn provided_session() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/json/detail.php")
            .match_query(Matcher::Any)
            .match_header("user-agent", "caller/1.0")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(DETAIL)
            .expect(3)
            .create_async()
            .await;

        let session = reqwest::Client::builder()
            .user_agent("caller/1.0")
            .build()
            .unwrap();

        let mut client = Tankerkoenig::with_options(API_KEY)
            .base_url(server.url())
            .session(session.clone())
            .build();

        client.station_details("1").await.unwrap();
        client.close();
        assert!(!client.is_closed());
        client.station_details("1").await.unwrap();
        drop(client);

        let response = session
            .get(format!("{}/json/detail.php?id=1", server.url()))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        mock.assert_async().await;
    }

    #[test(tokio::test)]
    async fn invalid_radius() {
        let client = Tankerkoenig::new(API_KEY);

        for radius in [0., -1., f64::NAN] {
            let err = client
                .nearby_stations((53.1, 7.8), radius, FuelType::Diesel, SortOrder::Price)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
    }
}
