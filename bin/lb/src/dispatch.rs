use std::time::Instant;

use serde_json::Value;

use crate::error::LbError;
use crate::state::{HistoryEntry, LbState, record_failure, record_success};
use crate::wrr;

/// Outcome of a successful dispatch, returned to the `/request` handler.
pub struct DispatchOutcome {
    pub chosen_worker: String,
    pub attempt: usize,
    pub worker_status: u16,
    pub lb_forward_ms: f64,
    pub worker_body: Value,
}

/// Runs the bounded-retry dispatch loop described in §4.3: select a worker via smooth WRR,
/// forward the payload to its `/handle`, classify the response, and retry on transient failure.
pub async fn dispatch(state: &LbState, payload: Value) -> Result<DispatchOutcome, LbError> {
    let attempts = state.config.retry_attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        let (idx, worker_id, worker_url) = {
            let mut workers = state.workers.write().await;
            let idx = wrr::choose(&mut workers).ok_or(LbError::NoEligibleWorker)?;
            (idx, workers[idx].id.clone(), workers[idx].url.clone())
        };

        let t0 = Instant::now();
        let result =
            state.http.post(format!("{worker_url}/handle")).json(&payload).send().await;
        let forward_ms = t0.elapsed().as_secs_f64() * 1000.0;

        match result {
            Err(err) => {
                let mut workers = state.workers.write().await;
                record_failure(&mut workers[idx], err.to_string(), state.config.disable_on_fail_sec);
                state
                    .push_history(HistoryEntry {
                        worker_id: worker_id.clone(),
                        status: 0,
                        latency_ms: forward_ms,
                    })
                    .await;
                last_error = Some(err.to_string());
                continue;
            },
            Ok(resp) => {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                let body = parse_body(&text);

                if status.is_success() {
                    let mut workers = state.workers.write().await;
                    record_success(&mut workers[idx], forward_ms, state.config.lat_ewma_alpha);
                    drop(workers);
                    state
                        .push_history(HistoryEntry {
                            worker_id: worker_id.clone(),
                            status: status.as_u16(),
                            latency_ms: forward_ms,
                        })
                        .await;
                    return Ok(DispatchOutcome {
                        chosen_worker: worker_id,
                        attempt,
                        worker_status: status.as_u16(),
                        lb_forward_ms: forward_ms,
                        worker_body: body,
                    });
                }

                if status.is_server_error() {
                    let mut workers = state.workers.write().await;
                    record_failure(
                        &mut workers[idx],
                        format!("upstream {status}"),
                        state.config.disable_on_fail_sec,
                    );
                    drop(workers);
                    state
                        .push_history(HistoryEntry {
                            worker_id: worker_id.clone(),
                            status: status.as_u16(),
                            latency_ms: forward_ms,
                        })
                        .await;
                    last_error = Some(format!("upstream {status}"));
                    continue;
                }

                // Client-fault (4xx): surface as-is, no retry.
                let mut workers = state.workers.write().await;
                workers[idx].fail += 1;
                drop(workers);
                state
                    .push_history(HistoryEntry {
                        worker_id: worker_id.clone(),
                        status: status.as_u16(),
                        latency_ms: forward_ms,
                    })
                    .await;
                return Ok(DispatchOutcome {
                    chosen_worker: worker_id,
                    attempt,
                    worker_status: status.as_u16(),
                    lb_forward_ms: forward_ms,
                    worker_body: body,
                });
            },
        }
    }

    Err(LbError::AllAttemptsFailed(last_error.unwrap_or_else(|| "unknown error".into())))
}

/// Wraps a non-JSON upstream body as `{ "raw": text }` to preserve a uniform envelope (§4.3.3).
fn parse_body(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| serde_json::json!({ "raw": text }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_body_passes_through_valid_json() {
        assert_eq!(parse_body(r#"{"a":1}"#), serde_json::json!({ "a": 1 }));
    }

    #[test]
    fn parse_body_wraps_non_json_as_raw() {
        assert_eq!(parse_body("not json"), serde_json::json!({ "raw": "not json" }));
    }
}
