//! Blocking client for a remote chordies server.

use serde::de::DeserializeOwned;
use thiserror::Error;
use ureq::Agent;
use ureq::http::Response;

use crate::library::SearchResult;
use crate::server::{
    API_ARTISTS, API_CHORDS, API_RANDOM, API_SEARCH, API_SEE_ALSO, API_SONGS,
};
use crate::song::{SongFilter, SongMeta};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: ureq::Error,
    },
    #[error("{method} {url} returned {status}: {message}")]
    Status {
        method: &'static str,
        url: String,
        status: u16,
        message: String,
    },
    #[error("encoding request body: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ClientError {
    /// The HTTP status, if the server answered with an error.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

pub struct Client {
    agent: Agent,
    base_url: String,
    auth_key: Option<String>,
}

impl Client {
    pub fn new(base_url: &str, auth_key: Option<String>) -> Self {
        let config = Agent::config_builder().http_status_as_error(false).build();
        Self {
            agent: Agent::new_with_config(config),
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_key,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn auth(&self) -> &str {
        self.auth_key.as_deref().unwrap_or_default()
    }

    pub fn artists(&self) -> Result<Vec<String>> {
        let url = self.url(API_ARTISTS);
        let resp = self.agent.get(&url).call();
        read_json("GET", &url, resp)
    }

    pub fn songs(&self, filter: &SongFilter) -> Result<Vec<SongMeta>> {
        let url = self.url(API_SONGS);
        let params = [
            ("artist", filter.artist()),
            ("id", filter.id()),
            ("query", filter.query()),
        ];
        let mut req = self.agent.get(&url);
        for (key, value) in params {
            if let Some(value) = value {
                req = req.query(key, value);
            }
        }
        read_json("GET", &url, req.call())
    }

    pub fn new_song(&self, meta: &SongMeta) -> Result<SongMeta> {
        let url = self.url(API_SONGS);
        let body = serde_json::to_vec(meta)?;
        let resp = self
            .agent
            .post(&url)
            .header("Authorization", self.auth())
            .header("Content-Type", "application/json")
            .send(&body[..]);
        read_json("POST", &url, resp)
    }

    pub fn update_song(&self, id: &str, meta: &SongMeta) -> Result<SongMeta> {
        let url = self.url(API_SONGS);
        let body = serde_json::to_vec(meta)?;
        let resp = self
            .agent
            .put(&url)
            .query("id", id)
            .header("Authorization", self.auth())
            .header("Content-Type", "application/json")
            .send(&body[..]);
        read_json("PUT", &url, resp)
    }

    pub fn delete_song(&self, id: &str) -> Result<()> {
        let url = self.url(API_SONGS);
        let resp = self
            .agent
            .delete(&url)
            .query("id", id)
            .header("Authorization", self.auth())
            .call();
        read_bytes("DELETE", &url, resp).map(drop)
    }

    pub fn chords(&self, id: &str) -> Result<Vec<u8>> {
        let url = self.url(API_CHORDS);
        let resp = self.agent.get(&url).query("id", id).call();
        read_bytes("GET", &url, resp)
    }

    pub fn update_chords(&self, id: &str, chords: &[u8]) -> Result<Vec<u8>> {
        let url = self.url(API_CHORDS);
        let resp = self
            .agent
            .put(&url)
            .query("id", id)
            .header("Authorization", self.auth())
            .header("Content-Type", "text/plain")
            .send(chords);
        read_bytes("PUT", &url, resp)
    }

    pub fn see_also(&self, artist: &str) -> Result<Vec<String>> {
        let url = self.url(API_SEE_ALSO);
        let resp = self.agent.get(&url).query("artist", artist).call();
        read_json("GET", &url, resp)
    }

    /// A random song, or `None` if the remote catalog is empty.
    pub fn random_song(&self) -> Result<Option<SongMeta>> {
        let url = self.url(API_RANDOM);
        let resp = self.agent.get(&url).call();
        match read_json("GET", &url, resp) {
            Ok(song) => Ok(Some(song)),
            Err(e) if e.status() == Some(404) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let url = self.url(API_SEARCH);
        let resp = self.agent.get(&url).query("q", query).call();
        read_json("GET", &url, resp)
    }
}

type UreqResult = std::result::Result<Response<ureq::Body>, ureq::Error>;

fn read_bytes(method: &'static str, url: &str, resp: UreqResult) -> Result<Vec<u8>> {
    let http = |source| ClientError::Http {
        url: url.to_string(),
        source,
    };
    let mut resp = resp.map_err(http)?;
    let status = resp.status().as_u16();
    let body = resp.body_mut().read_to_vec().map_err(http)?;
    // For 4xx/5xx responses the body is the server's message
    if status >= 400 {
        return Err(ClientError::Status {
            method,
            url: url.to_string(),
            status,
            message: String::from_utf8_lossy(&body).trim().to_string(),
        });
    }
    log::debug!("{method} {url} -> {status} ({} bytes)", body.len());
    Ok(body)
}

fn read_json<T: DeserializeOwned>(method: &'static str, url: &str, resp: UreqResult) -> Result<T> {
    let body = read_bytes(method, url, resp)?;
    serde_json::from_slice(&body).map_err(|e| ClientError::Http {
        url: url.to_string(),
        source: ureq::Error::Json(e),
    })
}
