use anyhow::{Context, Result};
use blogcrew_core::CrewConfig;
use std::env;
use std::net::SocketAddr;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub crew: CrewConfig,
}

impl AppConfig {
    const DEFAULT_LISTEN_ADDR: &'static str = "0.0.0.0:8000";

    pub fn from_env() -> Result<Self> {
        let listen_addr = env::var("BLOGCREW_LISTEN_ADDR")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| Self::DEFAULT_LISTEN_ADDR.to_string());
        let listen_addr = listen_addr
            .parse::<SocketAddr>()
            .with_context(|| format!("BLOGCREW_LISTEN_ADDR={listen_addr:?} is not a socket address"))?;

        let crew = CrewConfig::from_env().context("failed to load crew configuration")?;

        Ok(Self { listen_addr, crew })
    }
}
