//! Message handlers for the two binary roles.

use crate::config::MessagingConfig;
use gogoc_session::{InfoHandler, RequestHandler};
use gogoc_wire::{
    BrokerList, ErrorCode, FeatureStatus, GogocStatus, HaccessConfigInfo, HaccessStatusInfo,
    StatusInfo, TunnelInfo,
};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone)]
struct Snapshot {
    status: StatusInfo,
    tunnel: TunnelInfo,
    brokers: BrokerList,
    haccess: HaccessStatusInfo,
    haccess_config: Option<HaccessConfigInfo>,
}

/// Daemon-side state answered back to the GUI
#[derive(Debug)]
pub struct DaemonState {
    snapshot: RwLock<Snapshot>,
}

impl DaemonState {
    /// Seed the state from configuration
    pub fn from_config(config: &MessagingConfig) -> Self {
        let brokers = BrokerList::from(config.brokers.clone());
        let tunnel = TunnelInfo {
            broker_name: brokers
                .iter()
                .next()
                .map(|b| b.address.clone())
                .unwrap_or_default(),
            ..TunnelInfo::default()
        };

        Self {
            snapshot: RwLock::new(Snapshot {
                status: StatusInfo::new(GogocStatus::DisconnectedIdle, 0),
                tunnel,
                brokers,
                haccess: HaccessStatusInfo::default(),
                haccess_config: None,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Snapshot> {
        self.snapshot.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Snapshot> {
        self.snapshot.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Record a status change; the tunnel uptime restarts on `Connected`
    pub fn set_status(&self, status: GogocStatus, code: i32) {
        let mut snapshot = self.write();
        if status == GogocStatus::Connected && snapshot.status.status != GogocStatus::Connected {
            snapshot.tunnel.uptime = chrono::Utc::now().timestamp();
        }
        snapshot.status = StatusInfo::new(status, code);
    }

    /// Last HomeAccess configuration pushed by the GUI
    pub fn haccess_config(&self) -> Option<HaccessConfigInfo> {
        self.read().haccess_config.clone()
    }
}

impl RequestHandler for DaemonState {
    fn status_info(&self) -> Result<StatusInfo, ErrorCode> {
        Ok(self.read().status)
    }

    fn tunnel_info(&self) -> Result<TunnelInfo, ErrorCode> {
        Ok(self.read().tunnel.clone())
    }

    fn broker_list(&self) -> Result<BrokerList, ErrorCode> {
        Ok(self.read().brokers.clone())
    }

    fn haccess_status_info(&self) -> Result<HaccessStatusInfo, ErrorCode> {
        Ok(self.read().haccess.clone())
    }

    fn haccess_config_changed(&self, config: &HaccessConfigInfo) -> Result<(), ErrorCode> {
        crate::component_info!(
            "daemon",
            "HomeAccess config: root={}, proxy={}, web={}, mappings changed={}",
            config.document_root,
            config.proxy_enabled,
            config.web_enabled,
            config.device_mapping_changed
        );

        let mut snapshot = self.write();
        snapshot.haccess.proxy_status = FeatureStatus::Success;
        snapshot.haccess.web_status = FeatureStatus::Success;
        snapshot.haccess.device_mapping_status = FeatureStatus::Success;
        snapshot.haccess_config = Some(config.clone());
        Ok(())
    }
}

/// GUI-side handler that logs every info as JSON
#[derive(Debug, Default)]
pub struct LoggingInfoHandler {
    received: AtomicU64,
}

impl LoggingInfoHandler {
    /// Infos received so far
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    fn log<T: Serialize>(&self, kind: &str, info: &T) -> Result<(), ErrorCode> {
        self.received.fetch_add(1, Ordering::Relaxed);
        match serde_json::to_string(info) {
            Ok(json) => crate::component_info!("gui", "{} {}", kind, json),
            Err(e) => crate::component_warn!("gui", "Cannot render {}: {}", kind, e),
        }
        Ok(())
    }
}

impl InfoHandler for LoggingInfoHandler {
    fn on_status_info(&self, info: &StatusInfo) -> Result<(), ErrorCode> {
        self.log("status", info)
    }

    fn on_tunnel_info(&self, info: &TunnelInfo) -> Result<(), ErrorCode> {
        self.log("tunnel", info)
    }

    fn on_broker_list(&self, list: &BrokerList) -> Result<(), ErrorCode> {
        self.log("brokers", list)
    }

    fn on_haccess_status_info(&self, info: &HaccessStatusInfo) -> Result<(), ErrorCode> {
        self.log("haccess", info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gogoc_wire::Broker;

    fn config() -> MessagingConfig {
        MessagingConfig {
            brokers: vec![Broker::new("amsterdam.freenet6.net", 40), Broker::new("montreal.freenet6.net", 95)],
            ..MessagingConfig::default()
        }
    }

    #[test]
    fn test_daemon_state_seeded_from_config() {
        let state = DaemonState::from_config(&config());

        assert_eq!(state.broker_list().unwrap().len(), 2);
        assert_eq!(state.tunnel_info().unwrap().broker_name, "amsterdam.freenet6.net");
        assert_eq!(
            state.status_info().unwrap().status,
            GogocStatus::DisconnectedIdle
        );
    }

    #[test]
    fn test_uptime_starts_on_connect() {
        let state = DaemonState::from_config(&config());
        assert_eq!(state.tunnel_info().unwrap().uptime, 0);

        state.set_status(GogocStatus::Connected, 0);
        let uptime = state.tunnel_info().unwrap().uptime;
        assert!(uptime > 0);

        state.set_status(GogocStatus::Connected, 0);
        assert_eq!(state.tunnel_info().unwrap().uptime, uptime);
    }

    #[test]
    fn test_haccess_config_recorded() {
        let state = DaemonState::from_config(&MessagingConfig::default());
        let pushed = HaccessConfigInfo {
            document_root: "/srv/www".to_string(),
            proxy_enabled: true,
            web_enabled: false,
            device_mapping_changed: true,
        };

        state.haccess_config_changed(&pushed).unwrap();
        assert_eq!(state.haccess_config(), Some(pushed));
        assert_eq!(state.haccess_status_info().unwrap().web_status, FeatureStatus::Success);
    }

    #[test]
    fn test_logging_handler_counts() {
        let handler = LoggingInfoHandler::default();
        handler
            .on_status_info(&StatusInfo::new(GogocStatus::Connecting, 0))
            .unwrap();
        handler.on_broker_list(&BrokerList::default()).unwrap();
        assert_eq!(handler.received(), 2);
    }
}
