#![allow(dead_code)]
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tracing::info;

use super::runtime::{CapitalSettings, EngineConfig, PositionSettings, RiskSettings};
use crate::types::{EngineError, EngineResult};

#[derive(Debug, Clone, Serialize)]
pub enum ConfigChangeEvent {
    CapitalUpdated(CapitalSettings),
    RiskUpdated(RiskSettings),
    PositionManagementUpdated(PositionSettings),
    FullConfigUpdated,
}

/// Shared owner of the live configuration. Updates validate the whole tree
/// before committing and broadcast a change event to subscribers.
pub struct RuntimeConfigManager {
    config: Arc<RwLock<EngineConfig>>,
    change_tx: broadcast::Sender<ConfigChangeEvent>,
}

impl RuntimeConfigManager {
    pub fn new(initial: EngineConfig) -> Self {
        let (change_tx, _) = broadcast::channel(32);
        Self {
            config: Arc::new(RwLock::new(initial)),
            change_tx,
        }
    }

    pub fn load_from_file(path: &Path) -> EngineResult<EngineConfig> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("read {}: {}", path.display(), e)))?;
        let config: EngineConfig = toml::from_str(&text)
            .map_err(|e| EngineError::Config(format!("parse {}: {}", path.display(), e)))?;
        config
            .validate()
            .map_err(|errors| EngineError::Config(errors.join(", ")))?;
        Ok(config)
    }

    pub async fn get_config(&self) -> EngineConfig {
        self.config.read().await.clone()
    }

    pub async fn update_capital(&self, settings: CapitalSettings) -> Result<(), String> {
        let mut config = self.config.write().await;
        let previous = config.capital_management.clone();
        config.capital_management = settings.clone();

        if let Err(errors) = config.validate() {
            config.capital_management = previous;
            return Err(errors.join(", "));
        }

        info!(
            "Capital settings updated: initial=${}, zones {}/{}/{}",
            settings.initial_capital,
            settings.safe_zone_percent,
            settings.growth_zone_percent,
            settings.aggressive_zone_percent
        );
        let _ = self.change_tx.send(ConfigChangeEvent::CapitalUpdated(settings));
        Ok(())
    }

    pub async fn update_risk(&self, settings: RiskSettings) -> Result<(), String> {
        let mut config = self.config.write().await;
        let previous = config.risk_management.clone();
        config.risk_management = settings.clone();

        if let Err(errors) = config.validate() {
            config.risk_management = previous;
            return Err(errors.join(", "));
        }

        info!(
            "Risk settings updated: max_daily_trades={}, max_daily_loss={}",
            settings.max_daily_trades, settings.max_daily_loss
        );
        let _ = self.change_tx.send(ConfigChangeEvent::RiskUpdated(settings));
        Ok(())
    }

    pub async fn update_position_management(
        &self,
        settings: PositionSettings,
    ) -> Result<(), String> {
        let mut config = self.config.write().await;
        let previous = config.position_management.clone();
        config.position_management = settings.clone();

        if let Err(errors) = config.validate() {
            config.position_management = previous;
            return Err(errors.join(", "));
        }

        info!("Position management settings updated");
        let _ = self
            .change_tx
            .send(ConfigChangeEvent::PositionManagementUpdated(settings));
        Ok(())
    }

    pub async fn update_full(&self, new_config: EngineConfig) -> Result<(), String> {
        if let Err(errors) = new_config.validate() {
            return Err(errors.join(", "));
        }

        let mut config = self.config.write().await;
        *config = new_config;

        info!("Full configuration updated");
        let _ = self.change_tx.send(ConfigChangeEvent::FullConfigUpdated);
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConfigChangeEvent> {
        self.change_tx.subscribe()
    }

    pub fn config_arc(&self) -> Arc<RwLock<EngineConfig>> {
        Arc::clone(&self.config)
    }
}

impl Clone for RuntimeConfigManager {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            change_tx: self.change_tx.clone(),
        }
    }
}
