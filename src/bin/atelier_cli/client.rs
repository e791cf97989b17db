#![deny(clippy::all, clippy::pedantic)]

use std::sync::Arc;
use std::time::Duration;

use atelier::api::{AtelierClient, FollowController, FollowError};
use atelier::cache::CacheConfig;
use atelier::config::{LoadError, Settings};
use atelier::telemetry::TelemetryError;
use atelier::transport::ReqwestTransport;
use atelier::{RequestError, Session};
use reqwest::Url;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] LoadError),
    #[error("failed to initialise logging: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("failed to read input file {path}: {source}")]
    InputFile {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("request failed: {0}")]
    Request(#[from] RequestError),
    #[error(transparent)]
    Follow(#[from] FollowError),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

#[derive(Clone)]
pub struct Ctx {
    pub session: Session,
}

impl Ctx {
    pub fn new(settings: &Settings) -> Result<Self, CliError> {
        Ok(Self {
            session: Session::from_settings(settings)?,
        })
    }

    /// Context against `site` with default cache settings.
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn for_site(site: &str) -> Result<Self, CliError> {
        let base = Url::parse(site)?;
        let transport = ReqwestTransport::new(&base, Duration::from_secs(5), None)?;
        Ok(Self {
            session: Session::new(&CacheConfig::default(), Arc::new(transport)),
        })
    }

    pub fn client(&self) -> &AtelierClient {
        self.session.client()
    }

    pub fn follow(&self) -> &FollowController {
        self.session.follow()
    }
}
