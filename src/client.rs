//! Blocking HTTP client for a running backend, used by the CLI.

use std::time::Duration;

use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

use crate::catalog::Asset;
use crate::search::SearchOutput;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid server url: {0}")]
    Url(#[from] url::ParseError),
    #[error("server answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("could not decode response: {0}")]
    Decode(#[from] std::io::Error),
}

pub struct CatalogClient {
    agent: ureq::Agent,
    base: Url,
}

impl CatalogClient {
    pub fn new(server: &str) -> Result<Self, ClientError> {
        Ok(Self {
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
            base: Url::parse(server)?,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Non-success statuses carry the server's plain-text message.
    fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, ClientError> {
        match self.agent.get(url.as_str()).call() {
            Ok(response) => Ok(response.into_json()?),
            Err(ureq::Error::Status(status, response)) => Err(ClientError::Status {
                status,
                body: response.into_string().unwrap_or_default(),
            }),
            Err(other) => Err(ClientError::Transport(other.to_string())),
        }
    }

    pub fn movies(&self) -> Result<Vec<Asset>, ClientError> {
        let url = self.endpoint(&["api", "movies"])?;
        self.get_json(&url)
    }

    pub fn movie(&self, id: &str) -> Result<Asset, ClientError> {
        let url = self.endpoint(&["api", "movies", id])?;
        self.get_json(&url)
    }

    pub fn search(&self, query: &str) -> Result<SearchOutput, ClientError> {
        let mut url = self.endpoint(&["api", "search"])?;
        url.query_pairs_mut().append_pair("q", query);
        self.get_json(&url)
    }
}
