use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid FAB_BIND address `{0}`")]
    Bind(String),
    #[error("invalid FAB_PORT value `{0}`")]
    Port(String),
}

/// Process configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub state_dir: PathBuf,
}

impl ServerConfig {
    /// `FAB_BIND` (default 127.0.0.1), `FAB_PORT` (default 8787) and
    /// `FAB_STATE_DIR` (default ./state).
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind = env_nonempty("FAB_BIND").unwrap_or_else(|| "127.0.0.1".to_string());
        let ip: IpAddr = bind.parse().map_err(|_| ConfigError::Bind(bind.clone()))?;
        let port_s = env_nonempty("FAB_PORT").unwrap_or_else(|| "8787".to_string());
        let port: u16 = port_s.parse().map_err(|_| ConfigError::Port(port_s.clone()))?;
        let state_dir = env_nonempty("FAB_STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("state"));
        Ok(ServerConfig {
            addr: SocketAddr::new(ip, port),
            state_dir,
        })
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::env;

    #[test]
    fn defaults_apply_when_env_is_empty() {
        let mut guard = env::guard();
        guard.clear_keys(&["FAB_BIND", "FAB_PORT", "FAB_STATE_DIR"]);
        let cfg = ServerConfig::from_env().expect("config");
        assert_eq!(cfg.addr.to_string(), "127.0.0.1:8787");
        assert_eq!(cfg.state_dir, PathBuf::from("state"));
    }

    #[test]
    fn env_overrides_are_honored() {
        let mut guard = env::guard();
        guard.set("FAB_BIND", "0.0.0.0");
        guard.set("FAB_PORT", "9900");
        guard.set("FAB_STATE_DIR", "/tmp/fab-test-state");
        let cfg = ServerConfig::from_env().expect("config");
        assert_eq!(cfg.addr.to_string(), "0.0.0.0:9900");
        assert_eq!(cfg.state_dir, PathBuf::from("/tmp/fab-test-state"));
    }

    #[test]
    fn bad_values_are_rejected() {
        let mut guard = env::guard();
        guard.clear_keys(&["FAB_PORT", "FAB_STATE_DIR"]);
        guard.set("FAB_BIND", "not-an-ip");
        assert!(matches!(
            ServerConfig::from_env(),
            Err(ConfigError::Bind(_))
        ));

        guard.set("FAB_BIND", "127.0.0.1");
        guard.set("FAB_PORT", "99999");
        assert!(matches!(
            ServerConfig::from_env(),
            Err(ConfigError::Port(_))
        ));
    }
}
