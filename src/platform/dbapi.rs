// NexusLIMS Logger - platform/dbapi.rs
//
// Client for the remote session database API.
//
// Endpoints are resolved relative to the configured base URL, so an API
// mounted below a path prefix works the same as one at the server root.
// Successful responses wrap their payload in `{"data": ...}`. Every request
// carries HTTP basic auth when a username is configured and is bounded by
// a timeout.
//
// `DbApi` is the seam the session logger depends on; tests substitute an
// in-memory implementation.

use crate::core::model::{EventType, InstrumentInfo, NewSessionLog, RecordStatus, SessionLogRow};
use crate::util::constants;
use crate::util::error::DbApiError;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Operations the session logger needs from the session database.
pub trait DbApi: Send {
    /// Confirm the base URL serves the session database API.
    fn health_check(&self) -> Result<(), DbApiError>;

    /// Instrument registered for `computer_name`.
    fn instrument_for_computer(&self, computer_name: &str) -> Result<InstrumentInfo, DbApiError>;

    /// Most recent log row for an instrument; `None` when it has no rows.
    fn last_session_for_instrument(
        &self,
        instrument_pid: &str,
    ) -> Result<Option<SessionLogRow>, DbApiError>;

    /// Most recent row of `event` for a session identifier.
    fn last_session_event(
        &self,
        session_identifier: &str,
        event: EventType,
    ) -> Result<SessionLogRow, DbApiError>;

    /// Insert a START or END row.
    fn insert_session_log(&self, log: &NewSessionLog) -> Result<(), DbApiError>;

    /// Set the record status of an existing row.
    fn update_record_status(
        &self,
        id_session_log: i64,
        status: RecordStatus,
    ) -> Result<(), DbApiError>;

    /// Fetch a row by id, filtered on its record status.
    fn session_log(
        &self,
        id_session_log: i64,
        status: RecordStatus,
    ) -> Result<SessionLogRow, DbApiError>;
}

/// Blocking HTTP implementation of [`DbApi`].
#[derive(Clone)]
pub struct HttpDbApi {
    client: Client,
    base: Url,
    username: Option<String>,
    password: Option<String>,
}

impl std::fmt::Debug for HttpDbApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpDbApi")
            .field("base", &self.base.as_str())
            .field("username", &self.username)
            .finish()
    }
}

impl HttpDbApi {
    pub fn new(
        base_url: &str,
        username: Option<String>,
        password: Option<String>,
    ) -> Result<Self, DbApiError> {
        Self::with_timeout(
            base_url,
            username,
            password,
            Duration::from_secs(constants::DBAPI_TIMEOUT_SECS),
        )
    }

    pub fn with_timeout(
        base_url: &str,
        username: Option<String>,
        password: Option<String>,
        timeout: Duration,
    ) -> Result<Self, DbApiError> {
        // A trailing slash makes relative joins append to the path.
        let normalised = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base = Url::parse(&normalised).map_err(|source| DbApiError::InvalidUrl {
            url: base_url.to_string(),
            source,
        })?;
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("nexuslims-logger/{}", constants::APP_VERSION))
            .build()
            .map_err(|source| DbApiError::Http {
                url: base.to_string(),
                source,
            })?;
        Ok(Self {
            client,
            base,
            username,
            password,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, DbApiError> {
        self.base.join(path).map_err(|source| DbApiError::InvalidUrl {
            url: format!("{}{path}", self.base),
            source,
        })
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        match self.username.as_deref() {
            Some(user) => req.basic_auth(user, self.password.as_deref()),
            None => req,
        }
    }

    fn send(&self, url: &Url, req: RequestBuilder) -> Result<Response, DbApiError> {
        tracing::trace!(url = %url, "DB API request");
        self.authed(req).send().map_err(|source| DbApiError::Http {
            url: url.to_string(),
            source,
        })
    }

    fn get(&self, path: &str, query: &[(&str, String)]) -> Result<(Url, Response), DbApiError> {
        let url = self.endpoint(path)?;
        let res = self.send(&url, self.client.get(url.clone()).query(query))?;
        Ok((url, res))
    }
}

/// Turn a non-success response into `DbApiError::Status`.
fn ensure_success(url: &Url, res: Response) -> Result<Response, DbApiError> {
    if res.status().is_success() {
        return Ok(res);
    }
    let status = res.status().as_u16();
    let body = res.text().unwrap_or_default();
    tracing::debug!(url = %url, status, body = %body.trim(), "DB API returned an error status");
    Err(DbApiError::Status {
        url: url.to_string(),
        status,
        body,
    })
}

/// Decode `{"data": T}`. A one-element list is accepted where a single row is
/// expected.
fn decode_data<T: DeserializeOwned>(url: &Url, res: Response) -> Result<T, DbApiError> {
    let text = res.text().map_err(|source| DbApiError::Http {
        url: url.to_string(),
        source,
    })?;
    let malformed = |reason: String| DbApiError::Malformed {
        url: url.to_string(),
        reason,
    };
    let mut envelope: Value =
        serde_json::from_str(&text).map_err(|e| malformed(format!("not JSON: {e}")))?;
    let data = match envelope.get_mut("data").map(Value::take) {
        Some(Value::Array(mut rows)) if rows.len() == 1 => rows.remove(0),
        Some(Value::Array(rows)) => {
            return Err(malformed(format!("expected one row, got {}", rows.len())))
        }
        Some(v) => v,
        None => return Err(malformed("missing `data` field".to_string())),
    };
    serde_json::from_value(data).map_err(|e| malformed(e.to_string()))
}

impl DbApi for HttpDbApi {
    fn health_check(&self) -> Result<(), DbApiError> {
        let url = self.base.clone();
        let res = self.send(&url, self.client.get(url.clone()))?;
        let res = ensure_success(&url, res)?;
        let body = res.text().map_err(|source| DbApiError::Http {
            url: url.to_string(),
            source,
        })?;
        if body.trim().trim_matches('"') == constants::DBAPI_HEALTH_BODY {
            tracing::debug!(url = %url, "DB API health check passed");
            Ok(())
        } else {
            Err(DbApiError::Unhealthy {
                url: url.to_string(),
                body,
            })
        }
    }

    fn instrument_for_computer(&self, computer_name: &str) -> Result<InstrumentInfo, DbApiError> {
        let (url, res) = self.get(
            "api/instrument",
            &[("computer_name", computer_name.to_string())],
        )?;
        let res = ensure_success(&url, res)?;
        decode_data(&url, res)
    }

    fn last_session_for_instrument(
        &self,
        instrument_pid: &str,
    ) -> Result<Option<SessionLogRow>, DbApiError> {
        let (url, res) = self.get(
            "api/lastsession",
            &[("instrument", instrument_pid.to_string())],
        )?;
        if res.status() == StatusCode::NOT_FOUND {
            tracing::debug!(instrument = instrument_pid, "No session rows for instrument");
            return Ok(None);
        }
        let res = ensure_success(&url, res)?;
        decode_data(&url, res).map(Some)
    }

    fn last_session_event(
        &self,
        session_identifier: &str,
        event: EventType,
    ) -> Result<SessionLogRow, DbApiError> {
        let (url, res) = self.get(
            "api/lastsession",
            &[
                ("session_identifier", session_identifier.to_string()),
                ("event_type", event.as_str().to_string()),
            ],
        )?;
        let res = ensure_success(&url, res)?;
        decode_data(&url, res)
    }

    fn insert_session_log(&self, log: &NewSessionLog) -> Result<(), DbApiError> {
        let url = self.endpoint("api/session")?;
        let res = self.send(&url, self.client.post(url.clone()).form(&log.form_fields()))?;
        ensure_success(&url, res)?;
        Ok(())
    }

    fn update_record_status(
        &self,
        id_session_log: i64,
        status: RecordStatus,
    ) -> Result<(), DbApiError> {
        let url = self.endpoint("api/session")?;
        let form = [
            ("id_session_log", id_session_log.to_string()),
            ("record_status", status.as_str().to_string()),
        ];
        let res = self.send(&url, self.client.put(url.clone()).form(&form))?;
        ensure_success(&url, res)?;
        Ok(())
    }

    fn session_log(
        &self,
        id_session_log: i64,
        status: RecordStatus,
    ) -> Result<SessionLogRow, DbApiError> {
        let (url, res) = self.get(
            "api/session",
            &[
                ("id_session_log", id_session_log.to_string()),
                ("record_status", status.as_str().to_string()),
            ],
        )?;
        let res = ensure_success(&url, res)?;
        decode_data(&url, res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_resolve_below_base_path() {
        let api = HttpDbApi::new("http://db.local:5000/nexus", None, None).unwrap();
        assert_eq!(
            api.endpoint("api/session").unwrap().as_str(),
            "http://db.local:5000/nexus/api/session"
        );
        let root = HttpDbApi::new("http://db.local:5000/", None, None).unwrap();
        assert_eq!(
            root.endpoint("api/lastsession").unwrap().as_str(),
            "http://db.local:5000/api/lastsession"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(matches!(
            HttpDbApi::new("not a url", None, None),
            Err(DbApiError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn debug_output_omits_password() {
        let api = HttpDbApi::new(
            "http://db",
            Some("svc".to_string()),
            Some("s3cret".to_string()),
        )
        .unwrap();
        assert!(!format!("{api:?}").contains("s3cret"));
    }
}
