use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Minimal counters for operational visibility.
#[derive(Clone, Default)]
pub struct Counters {
    // write path
    pub trades_inserted: Arc<AtomicU64>,
    pub trades_corrected: Arc<AtomicU64>,

    // rejection reasons
    pub rejected_past_maturity: Arc<AtomicU64>,
    pub rejected_stale: Arc<AtomicU64>,

    // expiry sweep
    pub sweeps: Arc<AtomicU64>,
    pub sweep_expired: Arc<AtomicU64>,
    pub sweep_expire_failures: Arc<AtomicU64>,
}

impl Counters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn read(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let a = Counters::default();
        let b = a.clone();
        Counters::bump(&a.sweeps);
        Counters::bump(&b.sweeps);
        assert_eq!(Counters::read(&a.sweeps), 2);
        assert_eq!(Counters::read(&b.trades_inserted), 0);
    }
}
