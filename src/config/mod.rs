pub mod types;


pub use types::*;

use anyhow::Result;
use std::collections::HashSet;
use std::path::Path;

impl GatewayConfig {
    /// Load configuration from a file (if it exists) and apply environment
    /// variable overrides. When the file does not exist, built-in defaults
    /// are used and the engine starts with no routes.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config: GatewayConfig = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            match path.extension().and_then(|e| e.to_str()) {
                Some("toml") => toml::from_str(&content)?,
                Some("json") => serde_json::from_str(&content)?,
                Some(ext) => anyhow::bail!("unsupported config format: .{ext}, use .toml or .json"),
                None => anyhow::bail!("config file has no extension, use .toml or .json"),
            }
        } else {
            tracing::info!("config file not found at {}, using defaults", path.display());
            GatewayConfig::default()
        };

        config.apply_env_overrides();

        config.validate()?;
        tracing::info!(
            routes = config.routes.len(),
            sweep_interval_secs = config.sweeper.interval_secs,
            "loaded gateway configuration"
        );
        Ok(config)
    }

    /// Environment overrides cover process settings only. Routes come from
    /// the config file or the runtime admin operations.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("ADMISSION_SWEEP_INTERVAL_SECS") {
            match v.parse::<u64>() {
                Ok(n) => self.sweeper.interval_secs = n,
                Err(_) => tracing::warn!("config: ignoring ADMISSION_SWEEP_INTERVAL_SECS={}", v),
            }
        }
        if let Some(v) = lookup("ADMISSION_ADMIN_LISTEN") {
            self.admin.listen = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.sweeper.interval_secs == 0 {
            anyhow::bail!("sweeper.interval_secs must be greater than zero");
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for route in &self.routes {
            route.validate()?;
            if !seen.insert(route.id.as_str()) {
                anyhow::bail!("duplicate route id '{}'", route.id);
            }
        }
        Ok(())
    }
}
