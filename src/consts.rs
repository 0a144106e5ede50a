//! Project-wide constants.

use std::path::PathBuf;

/// Address the service listens on when none is configured.
pub const DEFAULT_BIND: &str = "0.0.0.0:3002";

/// Engine binary launched when none is configured.
pub const DEFAULT_ENGINE_PROGRAM: &str = "lc0";

/// Neural-net cache entries per engine instance.
/// The engine default (200,000) costs roughly 80 MB per loaded model.
pub const DEFAULT_NN_CACHE_SIZE: u32 = 20_000;

/// UCI option selecting the network weights file.
pub const OPTION_WEIGHTS_FILE: &str = "WeightsFile";

/// UCI option controlling move-selection randomness.
pub const OPTION_TEMPERATURE: &str = "Temperature";

/// UCI option bounding the neural-net evaluation cache.
pub const OPTION_NN_CACHE_SIZE: &str = "NNCacheSize";

/// Default config path: `~/.levelbot/config.toml`.
/// Returns `None` when the home directory cannot be determined.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".levelbot").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bind_is_socket_addr() {
        let addr: std::net::SocketAddr = DEFAULT_BIND.parse().unwrap();
        assert_eq!(addr.port(), 3002);
        assert!(addr.ip().is_unspecified());
    }

    #[test]
    fn option_names_are_non_empty() {
        assert!(!OPTION_WEIGHTS_FILE.is_empty());
        assert!(!OPTION_TEMPERATURE.is_empty());
        assert!(!OPTION_NN_CACHE_SIZE.is_empty());
    }

    #[test]
    fn default_config_path_ends_with_file_name() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with(".levelbot/config.toml"));
        }
    }
}
