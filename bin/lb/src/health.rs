use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Deserialize;

use crate::state::LbState;

#[derive(Debug, Deserialize)]
struct HealthResponse {
    #[serde(default)]
    worker_id: Option<String>,
    #[serde(default)]
    weight: Option<i64>,
    #[serde(default)]
    base_lat_ms: Option<i64>,
}

/// Runs the periodic health-probe loop described in §4.4. Each tick probes all workers
/// concurrently; one worker's failure never aborts another's probe.
pub async fn run(state: Arc<LbState>) {
    let mut ticker = tokio::time::interval(Duration::from_secs_f64(state.config.health_interval_sec));
    loop {
        ticker.tick().await;
        probe_once(&state).await;
    }
}

enum ProbeOutcome {
    Up(Option<HealthResponse>),
    Down(String),
}

pub async fn probe_once(state: &LbState) {
    let urls: Vec<(usize, String)> = {
        let workers = state.workers.read().await;
        workers.iter().enumerate().map(|(i, w)| (i, w.url.clone())).collect()
    };

    let probes = urls.into_iter().map(|(idx, url)| {
        let client = state.http.clone();
        async move {
            let outcome = match client.get(format!("{url}/health")).send().await {
                Ok(resp) if resp.status().is_success() => {
                    ProbeOutcome::Up(resp.json().await.ok())
                },
                Ok(resp) => ProbeOutcome::Down(format!("health: upstream {}", resp.status())),
                Err(err) => ProbeOutcome::Down(format!("health: {err}")),
            };
            (idx, outcome)
        }
    });
    let results = join_all(probes).await;

    let mut workers = state.workers.write().await;
    let mut needs_recompute = false;
    for (idx, outcome) in results {
        let w = &mut workers[idx];
        match outcome {
            ProbeOutcome::Up(parsed) => {
                w.online = true;
                w.last_seen = crate::registry::now_secs();
                w.last_error = None;
                if let Some(body) = parsed {
                    if let Some(id) = body.worker_id {
                        w.id = id;
                    }
                    if let Some(weight) = body.weight {
                        w.reported_weight = weight.max(1);
                        needs_recompute = true;
                    }
                    if let Some(base_lat) = body.base_lat_ms {
                        w.reported_base_lat_ms = Some(base_lat);
                    }
                }
            },
            ProbeOutcome::Down(err) => {
                w.online = false;
                w.last_error = Some(err);
            },
        }
    }

    if needs_recompute {
        let mode = *state.weight_mode.read().await;
        for w in workers.iter_mut() {
            w.recompute_effective(mode);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LbConfig;

    #[tokio::test]
    async fn probe_once_marks_unreachable_worker_offline() {
        let config = LbConfig {
            worker_urls: vec!["http://127.0.0.1:1".into()],
            request_timeout_sec: 0.2,
            ..Default::default()
        };
        let state = LbState::new(config);
        probe_once(&state).await;

        let workers = state.workers.read().await;
        assert!(!workers[0].online);
        assert!(workers[0].last_error.as_deref().unwrap().starts_with("health:"));
    }
}
