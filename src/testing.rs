//! In-memory [`TelemetryApi`] used by unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::client::TelemetryApi;
use crate::config::AccountCredentials;
use crate::credential::Credential;
use crate::error::{GatewayError, Result};
use crate::types::{ReportKind, TrackerId};

#[derive(Default)]
pub struct FakeTelemetry {
    pub token_calls: AtomicUsize,
    pub report_calls: AtomicUsize,
    reject_login: AtomicBool,
    down: AtomicBool,
    failing: Mutex<HashSet<String>>,
    delays: Mutex<HashMap<String, Duration>>,
    no_battery: Mutex<HashSet<String>>,
    bearers_seen: Mutex<Vec<String>>,
}

impl FakeTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_login(&self, reject: bool) {
        self.reject_login.store(reject, Ordering::SeqCst);
    }

    /// Every report call fails while down.
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn fail_tracker(&self, id: &str) {
        self.failing.lock().unwrap().insert(id.to_string());
    }

    pub fn delay_tracker(&self, id: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(id.to_string(), delay);
    }

    /// Hardware reports for `id` carry `"battery_level": null`.
    pub fn omit_battery(&self, id: &str) {
        self.no_battery.lock().unwrap().insert(id.to_string());
    }

    pub fn bearers_seen(&self) -> Vec<String> {
        self.bearers_seen.lock().unwrap().clone()
    }

    pub fn report_calls(&self) -> usize {
        self.report_calls.load(Ordering::SeqCst)
    }

    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }
}

/// Battery level the fake reports for a tracker: derived from its last character.
pub fn battery_for(id: &str) -> u8 {
    id.bytes().last().map(|b| b % 100).unwrap_or(0)
}

#[async_trait]
impl TelemetryApi for FakeTelemetry {
    async fn issue_token(&self, account: &AccountCredentials) -> Result<Credential> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_login.load(Ordering::SeqCst) {
            return Err(GatewayError::Upstream {
                status: Some(401),
                message: "401 Unauthorized".to_string(),
            });
        }
        let mut credential = Credential::new(format!("token-for-{}", account.email));
        credential.expires_at = Some(1_700_000_000);
        Ok(credential)
    }

    async fn fetch_report(
        &self,
        kind: ReportKind,
        tracker_id: &TrackerId,
        bearer: &str,
    ) -> Result<serde_json::Value> {
        self.report_calls.fetch_add(1, Ordering::SeqCst);
        self.bearers_seen.lock().unwrap().push(bearer.to_string());

        let delay = self.delays.lock().unwrap().get(tracker_id.as_str()).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self.failing.lock().unwrap().contains(tracker_id.as_str());
        if failing || self.down.load(Ordering::SeqCst) {
            return Err(GatewayError::Upstream {
                status: Some(503),
                message: "503 Service Unavailable".to_string(),
            });
        }

        let id = tracker_id.as_str();
        let battery_level = if self.no_battery.lock().unwrap().contains(id) {
            None
        } else {
            Some(battery_for(id))
        };
        Ok(match kind {
            ReportKind::Location => json!({
                "time": 1_700_000_000,
                "latlong": [48.2, 16.37],
                "speed": 0.0,
                "_id": id,
                "_type": "device_pos_report",
            }),
            ReportKind::Hardware => json!({
                "time": 1_700_000_000,
                "battery_level": battery_level,
                "_id": id,
                "_type": "device_hw_report",
            }),
        })
    }
}

pub fn account() -> AccountCredentials {
    AccountCredentials {
        email: "owner@example.com".to_string(),
        password: "hunter2".to_string(),
    }
}
