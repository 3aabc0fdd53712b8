use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::now_secs;

/// Discriminated fault spec union (§3, §6.2). Unknown `kind` values reject at the serde
/// boundary with a deserialize error, surfaced by the handler as a 400.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FaultSpec {
    Delay { delay_ms: i64, probability: f64, duration_sec: Option<f64> },
    Drop { mode: String, status_code: u16, sleep_ms: i64, probability: f64, duration_sec: Option<f64> },
    Corrupt { mode: String, probability: f64, duration_sec: Option<f64> },
    Error { status_code: u16, message: String, probability: f64, duration_sec: Option<f64> },
    CpuBurn { burn_ms: i64, probability: f64, duration_sec: Option<f64> },
}

impl FaultSpec {
    fn probability(&self) -> f64 {
        match self {
            FaultSpec::Delay { probability, .. }
            | FaultSpec::Drop { probability, .. }
            | FaultSpec::Corrupt { probability, .. }
            | FaultSpec::Error { probability, .. }
            | FaultSpec::CpuBurn { probability, .. } => *probability,
        }
    }

    fn duration_sec(&self) -> Option<f64> {
        match self {
            FaultSpec::Delay { duration_sec, .. }
            | FaultSpec::Drop { duration_sec, .. }
            | FaultSpec::Corrupt { duration_sec, .. }
            | FaultSpec::Error { duration_sec, .. }
            | FaultSpec::CpuBurn { duration_sec, .. } => *duration_sec,
        }
    }

    fn validate(&self) -> Result<(), String> {
        let in_range = |v: f64, lo: f64, hi: f64, name: &str| -> Result<(), String> {
            if v < lo || v > hi {
                Err(format!("{name} must be in {lo}..={hi}"))
            } else {
                Ok(())
            }
        };
        in_range(self.probability(), 0.0, 1.0, "probability")?;
        if let Some(d) = self.duration_sec() {
            in_range(d, 0.1, 86400.0, "duration_sec")?;
        }
        match self {
            FaultSpec::Delay { delay_ms, .. } => in_range(*delay_ms as f64, 0.0, 60000.0, "delay_ms"),
            FaultSpec::Drop { mode, status_code, sleep_ms, .. } => {
                if mode != "503" && mode != "timeout" {
                    return Err("drop mode must be \"503\" or \"timeout\"".into());
                }
                in_range(*status_code as f64, 400.0, 599.0, "status_code")?;
                in_range(*sleep_ms as f64, 1.0, 600000.0, "sleep_ms")
            },
            FaultSpec::Corrupt { mode, .. } => {
                if mode != "invalid_json" && mode != "bad_fields" {
                    return Err("corrupt mode must be \"invalid_json\" or \"bad_fields\"".into());
                }
                Ok(())
            },
            FaultSpec::Error { status_code, .. } => in_range(*status_code as f64, 400.0, 599.0, "status_code"),
            FaultSpec::CpuBurn { burn_ms, .. } => in_range(*burn_ms as f64, 0.0, 60000.0, "burn_ms"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FaultRecord {
    pub id: String,
    pub created_at: f64,
    pub expires_at: Option<f64>,
    #[serde(flatten)]
    pub spec: FaultSpec,
}

impl FaultRecord {
    fn expired(&self, now: f64) -> bool {
        self.expires_at.is_some_and(|exp| now > exp)
    }
}

/// `true` with probability exactly `p` for interior `p`; always true for `p >= 1`, always
/// false for `p <= 0` (§4.8, §9 property 6).
pub fn should_trigger(p: f64) -> bool {
    if p >= 1.0 {
        return true;
    }
    if p <= 0.0 {
        return false;
    }
    rand::rng().random::<f64>() < p
}

fn fresh_id() -> String {
    let mut rng = rand::rng();
    (0..12).map(|_| format!("{:x}", rng.random_range(0..16u8))).collect()
}

#[derive(Debug, Default)]
pub struct FaultRegistry {
    faults: Vec<FaultRecord>,
}

impl FaultRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn purge_expired(&mut self) {
        let now = now_secs();
        self.faults.retain(|f| !f.expired(now));
    }

    pub fn add(&mut self, spec: FaultSpec) -> Result<Value, String> {
        spec.validate()?;
        self.purge_expired();
        let now = now_secs();
        let record = FaultRecord {
            id: fresh_id(),
            created_at: now,
            expires_at: spec.duration_sec().map(|d| now + d),
            spec,
        };
        let view = serde_json::to_value(&record).unwrap();
        self.faults.push(record);
        Ok(view)
    }

    pub fn list(&mut self) -> Vec<Value> {
        self.purge_expired();
        self.faults.iter().map(|f| serde_json::to_value(f).unwrap()).collect()
    }

    pub fn delete(&mut self, id: &str) -> bool {
        self.purge_expired();
        let before = self.faults.len();
        self.faults.retain(|f| f.id != id);
        self.faults.len() != before
    }

    pub fn clear(&mut self) -> usize {
        let n = self.faults.len();
        self.faults.clear();
        n
    }

    /// Returns a copy-by-value snapshot of active faults for the handler to evaluate; later
    /// additions are invisible to a handler that already took its snapshot (§4.8).
    pub fn snapshot_active(&mut self) -> Vec<FaultRecord> {
        self.purge_expired();
        self.faults.clone()
    }
}

/// Result of evaluating the active fault set against a single `/handle` call, per §4.7/§4.8.
pub struct FiredFaults {
    pub delay_ms: i64,
    pub cpu_burn_ms: i64,
    pub drop: Option<DropFault>,
    pub corrupt: Option<String>,
    pub error: Option<ErrorFault>,
}

pub struct DropFault {
    pub mode: String,
    pub status_code: u16,
    pub sleep_ms: i64,
}

pub struct ErrorFault {
    pub status_code: u16,
    pub message: String,
}

/// Composes the active fault set into the quantities the handler needs: summed delay/cpu-burn,
/// and first-inserted-wins for drop/corrupt/error (§4.8 composition rule).
pub fn compose(active: &[FaultRecord]) -> FiredFaults {
    let mut delay_ms = 0;
    let mut cpu_burn_ms = 0;
    let mut drop = None;
    let mut corrupt = None;
    let mut error = None;

    for f in active {
        match &f.spec {
            FaultSpec::Delay { delay_ms: d, probability, .. } => {
                if should_trigger(*probability) {
                    delay_ms += d;
                }
            },
            FaultSpec::CpuBurn { burn_ms, probability, .. } => {
                if should_trigger(*probability) {
                    cpu_burn_ms += burn_ms;
                }
            },
            FaultSpec::Drop { mode, status_code, sleep_ms, probability, .. } => {
                if drop.is_none() && should_trigger(*probability) {
                    drop = Some(DropFault {
                        mode: mode.clone(),
                        status_code: *status_code,
                        sleep_ms: *sleep_ms,
                    });
                }
            },
            FaultSpec::Corrupt { mode, probability, .. } => {
                if corrupt.is_none() && should_trigger(*probability) {
                    corrupt = Some(mode.clone());
                }
            },
            FaultSpec::Error { status_code, message, probability, .. } => {
                if error.is_none() && should_trigger(*probability) {
                    error = Some(ErrorFault { status_code: *status_code, message: message.clone() });
                }
            },
        }
    }

    FiredFaults { delay_ms, cpu_burn_ms, drop, corrupt, error }
}

pub fn parse_spec(kind_tagged: Value) -> Result<FaultSpec, String> {
    serde_json::from_value(kind_tagged).map_err(|err| format!("invalid fault spec: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_trigger_boundary_values() {
        assert!(should_trigger(1.5));
        assert!(!should_trigger(-0.5));
        assert!(!should_trigger(0.0));
        assert!(should_trigger(1.0));
    }

    #[test]
    fn add_then_list_round_trip() {
        let mut reg = FaultRegistry::new();
        reg.add(FaultSpec::Delay { delay_ms: 10, probability: 1.0, duration_sec: None }).unwrap();
        assert_eq!(reg.list().len(), 1);
    }

    #[test]
    fn delete_then_second_delete_returns_false() {
        let mut reg = FaultRegistry::new();
        let view =
            reg.add(FaultSpec::CpuBurn { burn_ms: 5, probability: 1.0, duration_sec: None }).unwrap();
        let id = view["id"].as_str().unwrap().to_string();
        assert!(reg.delete(&id));
        assert!(!reg.delete(&id));
        assert!(reg.list().is_empty());
    }

    #[test]
    fn fault_with_duration_expires_after_ttl() {
        let mut reg = FaultRegistry::new();
        reg.add(FaultSpec::Delay { delay_ms: 1, probability: 1.0, duration_sec: Some(0.1) }).unwrap();
        assert_eq!(reg.list().len(), 1);
        std::thread::sleep(std::time::Duration::from_millis(150));
        assert!(reg.list().is_empty());
    }

    #[test]
    fn compose_sums_delay_and_cpu_burn_across_multiple_faults() {
        let active = vec![
            FaultRecord {
                id: "a".into(),
                created_at: 0.0,
                expires_at: None,
                spec: FaultSpec::Delay { delay_ms: 10, probability: 1.0, duration_sec: None },
            },
            FaultRecord {
                id: "b".into(),
                created_at: 0.0,
                expires_at: None,
                spec: FaultSpec::Delay { delay_ms: 20, probability: 1.0, duration_sec: None },
            },
        ];
        let fired = compose(&active);
        assert_eq!(fired.delay_ms, 30);
    }

    #[test]
    fn compose_first_inserted_drop_wins() {
        let active = vec![
            FaultRecord {
                id: "a".into(),
                created_at: 0.0,
                expires_at: None,
                spec: FaultSpec::Drop {
                    mode: "503".into(),
                    status_code: 503,
                    sleep_ms: 1,
                    probability: 1.0,
                    duration_sec: None,
                },
            },
            FaultRecord {
                id: "b".into(),
                created_at: 0.0,
                expires_at: None,
                spec: FaultSpec::Drop {
                    mode: "timeout".into(),
                    status_code: 504,
                    sleep_ms: 1,
                    probability: 1.0,
                    duration_sec: None,
                },
            },
        ];
        let fired = compose(&active);
        assert_eq!(fired.drop.unwrap().status_code, 503);
    }
}
