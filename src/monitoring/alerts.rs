use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
    Critical,
}

/// A named alert event delivered to the alerting collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub component: String,
    pub message: String,
    pub timestamp: u64,
}

/// Alert manager: bounded in-memory queue plus registered fan-out callbacks
pub struct AlertManager {
    alerts: Arc<RwLock<VecDeque<Alert>>>,
    max_alerts: usize,
    callbacks: Arc<RwLock<Vec<Box<dyn Fn(&Alert) + Send + Sync>>>>,
}

impl AlertManager {
    pub fn new(max_alerts: usize) -> Self {
        Self {
            alerts: Arc::new(RwLock::new(VecDeque::new())),
            max_alerts,
            callbacks: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Emit an alert
    pub async fn emit(&self, level: AlertLevel, component: &str, message: impl Into<String>) {
        let alert = Alert {
            level,
            component: component.to_string(),
            message: message.into(),
            timestamp: chrono::Utc::now().timestamp_millis() as u64,
        };

        {
            let mut alerts = self.alerts.write().await;
            alerts.push_back(alert.clone());
            while alerts.len() > self.max_alerts {
                alerts.pop_front();
            }
        }

        let callbacks = self.callbacks.read().await;
        for callback in callbacks.iter() {
            callback(&alert);
        }

        match level {
            AlertLevel::Info => log::info!("[{}] {}", alert.component, alert.message),
            AlertLevel::Warning => log::warn!("[{}] {}", alert.component, alert.message),
            AlertLevel::Error => log::error!("[{}] {}", alert.component, alert.message),
            AlertLevel::Critical => {
                log::error!("[CRITICAL] [{}] {}", alert.component, alert.message)
            }
        }
    }

    /// Register an alert callback
    pub async fn register_callback<F>(&self, callback: F)
    where
        F: Fn(&Alert) + Send + Sync + 'static,
    {
        self.callbacks.write().await.push(Box::new(callback));
    }

    /// Get the most recent alerts, newest first
    pub async fn recent(&self, count: usize) -> Vec<Alert> {
        let alerts = self.alerts.read().await;
        alerts.iter().rev().take(count).cloned().collect()
    }

    /// Get alerts at a given level
    pub async fn by_level(&self, level: AlertLevel) -> Vec<Alert> {
        let alerts = self.alerts.read().await;
        alerts.iter().filter(|a| a.level == level).cloned().collect()
    }
}

impl Default for AlertManager {
    fn default() -> Self {
        Self::new(1000)
    }
}
