//! Edge capacity poller.
//!
//! Periodically scrapes one gauge (healthy edge replica count) from a
//! line-oriented text metrics feed and turns it into a capacity factor:
//!
//! ```text
//! factor = clamp(1 - coef * (edges_up - 1), floor, 1.0)
//! ```
//!
//! The engine multiplies predicted edge latency and edge placement cost by
//! this factor. Fetch or parse failures leave the last known value in place.
//! Readers take a read lock on the cached value; the network call never
//! happens under the lock.

use parking_lot::RwLock;
use tracing::{debug, warn};

use super::knobs::CapacityKnobs;
use crate::error::{DeciderError, Result};

#[derive(Clone, Copy, Debug, PartialEq)]
struct CapacityState {
    edges_up: u32,
    factor: f64,
    last_raw: Option<f64>,
}

/// Cached capacity factor with an optional HTTP scraper.
#[derive(Debug)]
pub struct CapacityPoller {
    state: RwLock<CapacityState>,
    metric: String,
    coef: f64,
    floor: f64,
    source: Option<(reqwest::Client, String)>,
}

/// Capacity factor for a given edge count.
///
/// Non-increasing in `edges_up` and always within `[floor, 1.0]`.
pub fn capacity_factor(edges_up: u32, coef: f64, floor: f64) -> f64 {
    let f = 1.0 - coef * (edges_up as f64 - 1.0);
    f.min(1.0).max(floor)
}

/// Find `<metric> <value>` in a text metrics body.
///
/// Only exact two-token lines match; labelled series, comments and
/// non-numeric or negative values are skipped.
pub fn parse_gauge(body: &str, metric: &str) -> Option<f64> {
    body.lines().find_map(|line| {
        let mut tokens = line.split_whitespace();
        let name = tokens.next()?;
        let value = tokens.next()?;
        if name != metric || tokens.next().is_some() {
            return None;
        }
        value
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0)
    })
}

impl CapacityPoller {
    /// Create a poller. No HTTP client is built when `knobs.url` is `None`.
    pub fn new(knobs: &CapacityKnobs) -> Result<Self> {
        let source = match &knobs.url {
            Some(url) => {
                let client = reqwest::Client::builder()
                    .timeout(knobs.timeout())
                    .build()
                    .map_err(DeciderError::HttpClient)?;
                Some((client, url.clone()))
            }
            None => None,
        };
        Ok(Self {
            state: RwLock::new(CapacityState {
                edges_up: 1,
                factor: 1.0,
                last_raw: None,
            }),
            metric: knobs.metric.clone(),
            coef: knobs.coef,
            floor: knobs.floor,
            source,
        })
    }

    /// Current capacity factor.
    #[inline]
    pub fn factor(&self) -> f64 {
        self.state.read().factor
    }

    /// Last accepted edge replica count.
    pub fn edges_up(&self) -> u32 {
        self.state.read().edges_up
    }

    /// Raw gauge value of the last accepted scrape.
    pub fn last_raw(&self) -> Option<f64> {
        self.state.read().last_raw
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// Apply a scraped body. Returns the new factor, or `None` when the
    /// gauge was absent or malformed (state untouched).
    pub fn ingest_text(&self, body: &str) -> Option<f64> {
        let raw = parse_gauge(body, &self.metric)?;
        // Tolerate float encoding of integer gauges (e.g. "2.9999999")
        let edges = (raw + 1e-4).floor() as u32;
        let factor = capacity_factor(edges, self.coef, self.floor);
        *self.state.write() = CapacityState {
            edges_up: edges,
            factor,
            last_raw: Some(raw),
        };
        Some(factor)
    }

    /// Scrape the configured source once.
    ///
    /// Returns `None` without a source, on fetch failure, or on a parse miss.
    pub async fn poll_once(&self) -> Option<f64> {
        let (client, url) = self.source.as_ref()?;
        let body = match client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => match resp.text().await {
                Ok(body) => body,
                Err(e) => {
                    warn!(%e, %url, "capacity body read failed");
                    return None;
                }
            },
            Ok(resp) => {
                warn!(status = resp.status().as_u16(), %url, "capacity scrape rejected");
                return None;
            }
            Err(e) => {
                warn!(%e, %url, "capacity scrape failed");
                return None;
            }
        };
        let factor = self.ingest_text(&body);
        if factor.is_none() {
            debug!(%url, metric = %self.metric, "capacity gauge missing");
        }
        factor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poller() -> CapacityPoller {
        CapacityPoller::new(&CapacityKnobs {
            url: None,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_factor_formula() {
        assert_eq!(capacity_factor(1, 0.15, 0.3), 1.0);
        assert!((capacity_factor(2, 0.15, 0.3) - 0.85).abs() < 1e-12);
        assert!((capacity_factor(3, 0.15, 0.3) - 0.70).abs() < 1e-12);
        // Floor
        assert_eq!(capacity_factor(50, 0.15, 0.3), 0.3);
        // Zero edges would exceed 1.0; capped
        assert_eq!(capacity_factor(0, 0.15, 0.3), 1.0);
    }

    #[test]
    fn test_factor_monotone_and_bounded() {
        let mut prev = f64::INFINITY;
        for edges in 0..100u32 {
            let f = capacity_factor(edges, 0.07, 0.25);
            assert!(f <= prev);
            assert!((0.25..=1.0).contains(&f));
            prev = f;
        }
    }

    #[test]
    fn test_parse_gauge() {
        let body = "# HELP csn_edges_up healthy edges\n\
                    # TYPE csn_edges_up gauge\n\
                    csn_edges_up_total 9\n\
                    csn_edges_up{zone=\"a\"} 7\n\
                    csn_edges_up 3\n";
        assert_eq!(parse_gauge(body, "csn_edges_up"), Some(3.0));
        assert_eq!(parse_gauge("csn_edges_up 2.5\n", "csn_edges_up"), Some(2.5));
        assert_eq!(parse_gauge("csn_edges_up abc\n", "csn_edges_up"), None);
        assert_eq!(parse_gauge("csn_edges_up -1\n", "csn_edges_up"), None);
        assert_eq!(parse_gauge("csn_edges_up 1 2\n", "csn_edges_up"), None);
        assert_eq!(parse_gauge("", "csn_edges_up"), None);
    }

    #[test]
    fn test_ingest_updates_state() {
        let p = poller();
        assert_eq!(p.factor(), 1.0);
        assert_eq!(p.edges_up(), 1);

        let f = p.ingest_text("csn_edges_up 3\n").unwrap();
        assert!((f - 0.7).abs() < 1e-12);
        assert_eq!(p.edges_up(), 3);
        assert_eq!(p.last_raw(), Some(3.0));
    }

    #[test]
    fn test_parse_miss_keeps_last_known_good() {
        let p = poller();
        p.ingest_text("csn_edges_up 2\n");
        let before = p.factor();
        assert!(p.ingest_text("something_else 5\n").is_none());
        assert!(p.ingest_text("csn_edges_up NaNx\n").is_none());
        assert_eq!(p.factor(), before);
        assert_eq!(p.edges_up(), 2);
    }

    #[tokio::test]
    async fn test_poll_without_source_is_noop() {
        let p = poller();
        assert!(!p.has_source());
        assert!(p.poll_once().await.is_none());
        assert_eq!(p.factor(), 1.0);
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_previous_value() {
        // Nothing listens on port 1
        let p = CapacityPoller::new(&CapacityKnobs {
            url: Some("http://127.0.0.1:1/metrics".to_string()),
            timeout_ms: 200,
            ..Default::default()
        })
        .unwrap();
        assert!(p.has_source());

        p.ingest_text("csn_edges_up 3\n");
        let before = p.factor();
        assert!(p.poll_once().await.is_none());
        assert_eq!(p.factor(), before);
        assert_eq!(p.edges_up(), 3);
        assert_eq!(p.last_raw(), Some(3.0));
    }
}
