#[cfg(test)]
mod test {
    use crate::stats::{LatencyRing, PipelineStats};
    use std::time::Duration;

    #[test]
    fn counters_accumulate() {
        let stats = PipelineStats::new();
        stats.incr_received();
        stats.incr_received();
        stats.incr_dispatched();
        stats.incr_write_errors();
        stats.incr_skipped();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.received, 2);
        assert_eq!(snapshot.dispatched, 1);
        assert_eq!(snapshot.write_errors, 1);
        assert_eq!(snapshot.skipped, 1);
    }

    #[test]
    fn snapshot_serializes_to_json() {
        let stats = PipelineStats::new();
        stats.incr_received();
        let json = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(json["received"], 1);
        assert_eq!(json["dispatched"], 0);
    }

    #[test]
    fn latency_percentiles() {
        let ring = LatencyRing::new(100);
        assert!(ring.is_empty());
        assert_eq!(ring.percentile(50.0), None);

        for ms in 1..=100u64 {
            ring.record(Duration::from_millis(ms));
        }
        assert_eq!(ring.len(), 100);
        assert_eq!(ring.percentile(0.0), Some(Duration::from_millis(1)));
        assert_eq!(ring.percentile(100.0), Some(Duration::from_millis(100)));
        let median = ring.percentile(50.0).unwrap();
        assert!(median >= Duration::from_millis(50) && median <= Duration::from_millis(51));
    }

    #[test]
    fn ring_overwrites_the_oldest_samples() {
        let ring = LatencyRing::new(4);
        for ms in [1u64, 2, 3, 4, 100, 200] {
            ring.record(Duration::from_millis(ms));
        }
        assert_eq!(ring.len(), 4);
        // 1 and 2 were evicted
        assert_eq!(ring.percentile(0.0), Some(Duration::from_millis(3)));
        assert_eq!(ring.percentile(100.0), Some(Duration::from_millis(200)));
    }
}
