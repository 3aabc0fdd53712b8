use std::sync::Arc;
use std::time::Duration;

use crate::registry::WeightMode;
use crate::state::LbState;

/// Runs the periodic auto-weight controller loop described in §4.5. Only recomputes weights
/// while the active mode is `auto`.
pub async fn run(state: Arc<LbState>) {
    let mut ticker =
        tokio::time::interval(Duration::from_secs_f64(state.config.auto_weight_interval_sec));
    loop {
        ticker.tick().await;
        if *state.weight_mode.read().await == WeightMode::Auto {
            tick_once(&state).await;
        }
    }
}

pub async fn tick_once(state: &LbState) {
    let max = state.config.auto_weight_max;
    let mut workers = state.workers.write().await;

    let scores: Vec<Option<f64>> = workers
        .iter()
        .map(|w| {
            if !w.online {
                return None;
            }
            let latency = if w.avg_latency_ms > 0.0 {
                w.avg_latency_ms
            } else if let Some(base) = w.reported_base_lat_ms {
                base as f64
            } else {
                50.0
            };
            let total = w.ok + w.fail;
            let fail_rate = if total == 0 { 0.0 } else { w.fail as f64 / total as f64 };
            Some(1.0 / (latency + 1.0) * (1.0 - fail_rate))
        })
        .collect();

    let max_score = scores.iter().flatten().cloned().fold(0.0_f64, f64::max);

    for (w, score) in workers.iter_mut().zip(scores) {
        if let Some(s) = score {
            if max_score > 0.0 {
                w.auto_weight = Some(((max as f64 * s / max_score).round() as i64).max(1));
            } else {
                w.auto_weight = Some(1);
            }
        }
        w.recompute_effective(WeightMode::Auto);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LbConfig;

    #[tokio::test]
    async fn fast_worker_gets_higher_auto_weight_than_slow() {
        let state = LbState::new(LbConfig {
            worker_urls: vec!["http://fast:8000".into(), "http://slow:8000".into()],
            ..Default::default()
        });
        {
            let mut workers = state.workers.write().await;
            workers[0].avg_latency_ms = 10.0;
            workers[1].avg_latency_ms = 100.0;
        }

        tick_once(&state).await;

        let workers = state.workers.read().await;
        assert!(workers[0].auto_weight.unwrap() > workers[1].auto_weight.unwrap());
    }

    #[tokio::test]
    async fn offline_worker_keeps_stale_auto_weight() {
        let state = LbState::new(LbConfig {
            worker_urls: vec!["http://w1:8000".into()],
            ..Default::default()
        });
        {
            let mut workers = state.workers.write().await;
            workers[0].auto_weight = Some(7);
            workers[0].online = false;
        }

        tick_once(&state).await;

        let workers = state.workers.read().await;
        assert_eq!(workers[0].auto_weight, Some(7));
    }
}
