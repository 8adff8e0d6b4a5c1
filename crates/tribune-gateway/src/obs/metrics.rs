//! Metric families for the relay.
//!
//! Labels are flattened into sorted `(key, value)` vectors so rendering is
//! deterministic. Latency buckets are fixed in microseconds to stay in
//! integer math.

use std::fmt::Write;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;

type LabelKey = Vec<(String, String)>;

fn label_key(labels: &[(&str, &str)]) -> LabelKey {
    let mut key: LabelKey = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    key.sort();
    key
}

fn render_labels(key: &LabelKey) -> String {
    key.iter()
        .map(|(k, v)| {
            let v = v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n");
            format!("{k}=\"{v}\"")
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Default)]
pub struct Counter {
    map: DashMap<LabelKey, AtomicU64>,
}

impl Counter {
    pub fn inc(&self, labels: &[(&str, &str)]) {
        self.add(labels, 1);
    }

    pub fn add(&self, labels: &[(&str, &str)], v: u64) {
        if v == 0 {
            return;
        }
        self.map
            .entry(label_key(labels))
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(v, Ordering::Relaxed);
    }

    pub fn get(&self, labels: &[(&str, &str)]) -> u64 {
        self.map
            .get(&label_key(labels))
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {name} counter");
        for r in self.map.iter() {
            let _ = writeln!(out, "{name}{{{}}} {}", render_labels(r.key()), r.value().load(Ordering::Relaxed));
        }
    }
}

/// Unlabelled signed gauge.
#[derive(Default)]
pub struct Gauge {
    value: AtomicI64,
}

impl Gauge {
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }
    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {name} gauge\n{name} {}", self.get());
    }
}

// 100us .. 1s
const BUCKETS_MICROS: [u64; 8] = [100, 500, 1_000, 5_000, 10_000, 50_000, 250_000, 1_000_000];

/// Unlabelled latency histogram (microseconds).
#[derive(Default)]
pub struct Histogram {
    count: AtomicU64,
    sum: AtomicU64,
    buckets: [AtomicU64; 8],
}

impl Histogram {
    pub fn observe(&self, d: Duration) {
        let micros = u64::try_from(d.as_micros()).unwrap_or(u64::MAX);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum.fetch_add(micros, Ordering::Relaxed);
        for (slot, le) in self.buckets.iter().zip(BUCKETS_MICROS) {
            if micros <= le {
                slot.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {name} histogram");
        for (slot, le) in self.buckets.iter().zip(BUCKETS_MICROS) {
            let _ = writeln!(out, "{name}_bucket{{le=\"{le}\"}} {}", slot.load(Ordering::Relaxed));
        }
        let count = self.count();
        let _ = writeln!(out, "{name}_bucket{{le=\"+Inf\"}} {count}");
        let _ = writeln!(out, "{name}_sum {}", self.sum.load(Ordering::Relaxed));
        let _ = writeln!(out, "{name}_count {count}");
    }
}

#[derive(Default)]
pub struct RelayMetrics {
    /// `result` = accepted | rejected
    pub ws_upgrades: Counter,
    pub ws_sessions_active: Gauge,
    /// `type`, `outcome` = relayed | dropped
    pub inbound_frames: Counter,
    /// `type`
    pub fanout_deliveries: Counter,
    pub fanout_evictions: Counter,
    /// implicit `stop_typing` emitted by the sweeper
    pub typing_expired: Counter,
    pub fanout_duration: Histogram,
    draining: AtomicBool,
}

impl RelayMetrics {
    pub fn set_draining(&self) {
        self.draining.store(true, Ordering::Relaxed);
    }
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Relaxed)
    }

    /// Render all families plus caller-supplied point-in-time gauges.
    pub fn render(&self, extra: &[(&str, u64)]) -> String {
        let mut out = String::new();
        self.ws_upgrades.render("tribune_ws_upgrades_total", &mut out);
        self.ws_sessions_active.render("tribune_ws_sessions_active", &mut out);
        self.inbound_frames.render("tribune_inbound_frames_total", &mut out);
        self.fanout_deliveries.render("tribune_fanout_deliveries_total", &mut out);
        self.fanout_evictions.render("tribune_fanout_evictions_total", &mut out);
        self.typing_expired.render("tribune_typing_expired_total", &mut out);
        self.fanout_duration.render("tribune_fanout_duration_micros", &mut out);
        let _ = writeln!(
            out,
            "# TYPE tribune_draining gauge\ntribune_draining {}",
            u8::from(self.is_draining())
        );
        for (name, v) in extra {
            let _ = writeln!(out, "# TYPE {name} gauge\n{name} {v}");
        }
        out
    }
}
