use crate::registry::WorkerRecord;

/// Runs one round of Nginx-style smooth weighted round-robin over `workers`, returning the index
/// of the chosen worker.
///
/// Must be called with exclusive access to `workers` (the caller holds the selector lock for the
/// duration of this call). Ineligible workers keep their `current_weight` untouched so they
/// re-enter the rotation smoothly once eligible again; it is only reset on `/experiment/reset`.
pub fn choose(workers: &mut [WorkerRecord]) -> Option<usize> {
    let total: i64 = workers.iter().filter(|w| w.eligible()).map(|w| w.effective_weight).sum();
    if total == 0 {
        return None;
    }

    for w in workers.iter_mut() {
        if w.eligible() {
            w.current_weight += w.effective_weight;
        }
    }

    // Ties broken by registry order: only replace `best` on a strictly greater weight.
    let mut best: Option<(usize, i64)> = None;
    for (i, w) in workers.iter().enumerate() {
        if !w.eligible() {
            continue;
        }
        if best.map(|(_, bw)| w.current_weight > bw).unwrap_or(true) {
            best = Some((i, w.current_weight));
        }
    }
    let best = best.map(|(i, _)| i)?;

    workers[best].current_weight -= total;
    workers[best].assigned += 1;
    Some(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::WeightMode;

    fn worker(weight: i64) -> WorkerRecord {
        let mut w = WorkerRecord::new(format!("http://w-{weight}:8000"));
        w.reported_weight = weight;
        w.recompute_effective(WeightMode::Manual);
        w
    }

    #[test]
    fn distribution_matches_weights_within_tolerance() {
        let mut workers = vec![worker(5), worker(3), worker(2)];
        let n = 5000;
        for _ in 0..n {
            choose(&mut workers).expect("eligible worker");
        }

        let total: u64 = workers.iter().map(|w| w.assigned).sum();
        assert_eq!(total, n);

        let expected = [5.0 / 10.0, 3.0 / 10.0, 2.0 / 10.0];
        for (w, exp) in workers.iter().zip(expected) {
            let frac = w.assigned as f64 / n as f64;
            assert!((frac - exp).abs() < 0.03, "frac={frac} exp={exp}");
        }
    }

    #[test]
    fn skips_offline_workers() {
        let mut workers = vec![worker(1), worker(1)];
        workers[1].online = false;

        for _ in 0..200 {
            let idx = choose(&mut workers).expect("eligible worker");
            assert_eq!(idx, 0);
        }
        assert_eq!(workers[1].assigned, 0);
    }

    #[test]
    fn no_eligible_worker_returns_none() {
        let mut workers = vec![worker(1)];
        workers[0].online = false;
        assert!(choose(&mut workers).is_none());
    }

    #[test]
    fn disabled_worker_preserves_current_weight_until_reeligible() {
        let mut workers = vec![worker(1), worker(1)];
        // Run a few rounds so current_weight accrues state.
        for _ in 0..3 {
            choose(&mut workers);
        }
        let cw_before = workers[1].current_weight;
        workers[1].disabled_until = crate::registry::now_secs() + 60.0;

        for _ in 0..5 {
            choose(&mut workers);
        }
        assert_eq!(workers[1].current_weight, cw_before);

        workers[1].disabled_until = 0.0;
        // Worker re-enters smoothly: eligible again with its preserved current_weight.
        assert!(choose(&mut workers).is_some());
    }

    #[test]
    fn ties_break_by_registry_order() {
        let mut workers = vec![worker(1), worker(1)];
        let idx = choose(&mut workers).expect("eligible worker");
        assert_eq!(idx, 0);
    }
}
