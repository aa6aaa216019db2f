use crate::error::ConfigError;
use meshcall_core::IceServerConfig;
use meshcall_core::utils::{DEFAULT_STUN_ADDR, DEFAULT_STUN_ADDR_2};
use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_DEV_ORIGIN: &str = "http://localhost:5173";

/// Runtime settings for the coordination server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: IpAddr,
    pub port: u16,
    /// Origins allowed by CORS. Empty means any origin.
    pub allowed_origins: Vec<String>,
    /// Advertised to every client in the `ice-config` frame.
    pub ice_servers: Vec<IceServerConfig>,
    /// Queue depth of each room actor.
    pub room_command_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            allowed_origins: vec![DEFAULT_DEV_ORIGIN.to_owned()],
            ice_servers: vec![
                IceServerConfig::stun(DEFAULT_STUN_ADDR),
                IceServerConfig::stun(DEFAULT_STUN_ADDR_2),
            ],
            room_command_capacity: 100,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(port) = lookup("PORT") {
            config.port = port.trim().parse().map_err(|_| ConfigError::InvalidVar {
                name: "PORT",
                value: port,
            })?;
        }

        if let Some(addr) = lookup("BIND_ADDR") {
            config.bind_addr = addr.trim().parse().map_err(|_| ConfigError::InvalidVar {
                name: "BIND_ADDR",
                value: addr,
            })?;
        }

        if let Some(frontend) = lookup("FRONTEND_URL").filter(|v| !v.trim().is_empty()) {
            config.add_origin(&frontend);
        }

        if let Some(turn_url) = lookup("TURN_URL").filter(|v| !v.trim().is_empty()) {
            config.ice_servers.push(IceServerConfig {
                urls: vec![turn_url],
                username: lookup("TURN_USERNAME"),
                credential: lookup("TURN_CREDENTIAL"),
            });
        }

        Ok(config)
    }

    /// Adds an origin, assuming `https://` when no scheme is given.
    pub fn add_origin(&mut self, origin: &str) {
        let origin = normalize_origin(origin);
        if !self.allowed_origins.contains(&origin) {
            self.allowed_origins.push(origin);
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }
}

fn normalize_origin(origin: &str) -> String {
    let origin = origin.trim().trim_end_matches('/');
    if origin.starts_with("http") {
        origin.to_owned()
    } else {
        format!("https://{origin}")
    }
}
