//! Harvest engine tests against an in-process vocabulary oracle.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use lexharvest::harvest::HarvestError;
use lexharvest::{
    Alphabet, DiscoveryStore, ExpansionPolicy, Fetcher, FileSink, HarvestConfig, HarvestEvent,
    Harvester, MemorySink, Oracle, OracleError, Pacer, PacerConfig, SiblingPolicy, StopReason,
    WordSink,
};

/// How the oracle ranks matches before applying its cap.
#[derive(Clone, Copy)]
enum Ranking {
    ShortestFirst,
    Lexicographic,
}

/// Answers a prefix with the first `cap` vocabulary words starting with it.
struct VocabularyOracle {
    vocab: Vec<String>,
    cap: usize,
    failing: HashSet<String>,
    throttling: bool,
    hanging: HashSet<String>,
    latency: Duration,
    calls: Mutex<Vec<(String, Instant)>>,
}

impl VocabularyOracle {
    fn new(words: &[&str], cap: usize, ranking: Ranking) -> Self {
        let mut vocab: Vec<String> = words.iter().map(|s| s.to_string()).collect();
        match ranking {
            Ranking::ShortestFirst => vocab.sort_by(|a, b| a.len().cmp(&b.len()).then(a.cmp(b))),
            Ranking::Lexicographic => vocab.sort(),
        }
        Self {
            vocab,
            cap,
            failing: HashSet::new(),
            throttling: false,
            hanging: HashSet::new(),
            latency: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn failing(mut self, prefixes: &[&str]) -> Self {
        self.failing = prefixes.iter().map(|s| s.to_string()).collect();
        self
    }

    fn hanging(mut self, prefixes: &[&str]) -> Self {
        self.hanging = prefixes.iter().map(|s| s.to_string()).collect();
        self
    }

    fn throttling(mut self) -> Self {
        self.throttling = true;
        self
    }

    fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn calls(&self) -> Vec<(String, Instant)> {
        self.calls.lock().unwrap().clone()
    }

    fn call_counts(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for (prefix, _) in self.calls() {
            *counts.entry(prefix).or_insert(0) += 1;
        }
        counts
    }
}

#[async_trait]
impl Oracle for VocabularyOracle {
    async fn query(&self, prefix: &str) -> Result<Vec<String>, OracleError> {
        self.calls
            .lock()
            .unwrap()
            .push((prefix.to_string(), Instant::now()));

        if self.hanging.contains(prefix) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.throttling {
            return Err(OracleError::Throttled(429));
        }
        if self.failing.contains(prefix) {
            return Err(OracleError::Status(500));
        }
        Ok(self
            .vocab
            .iter()
            .filter(|w| w.starts_with(prefix))
            .take(self.cap)
            .cloned()
            .collect())
    }
}

struct Setup {
    alphabet: &'static str,
    cap: usize,
    sibling: SiblingPolicy,
    retry_budget: u32,
    workers: usize,
    delay: Duration,
    config: HarvestConfig,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            alphabet: "abcdefghijklmnopqrstuvwxyz",
            cap: 2,
            sibling: SiblingPolicy::Always,
            retry_budget: 0,
            workers: 4,
            delay: Duration::ZERO,
            config: HarvestConfig {
                workers: 4,
                seed_depth: 1,
                run_timeout: None,
                grace_period: Duration::from_secs(1),
            },
        }
    }
}

impl Setup {
    fn pacer(&self) -> Pacer {
        Pacer::new(PacerConfig::default().with_base_delay(self.delay))
    }

    fn build(&self, oracle: Arc<VocabularyOracle>, pacer: Pacer, store: Arc<DiscoveryStore>) -> Harvester {
        let policy = ExpansionPolicy::new(
            Alphabet::new(self.alphabet).unwrap(),
            self.cap,
            self.sibling,
            self.retry_budget,
        );
        let fetcher = Fetcher::new(oracle, pacer, self.workers, Duration::from_secs(7200));
        let config = HarvestConfig {
            workers: self.workers,
            ..self.config.clone()
        };
        Harvester::new(policy, fetcher, store, config)
    }
}

fn memory_store() -> (MemorySink, Arc<DiscoveryStore>) {
    let sink = MemorySink::new();
    let store = Arc::new(DiscoveryStore::new(Box::new(sink.clone())));
    (sink, store)
}

fn never_shutdown() -> watch::Receiver<bool> {
    let (_tx, rx) = watch::channel(false);
    rx
}

fn sorted(items: &[&str]) -> Vec<String> {
    let mut v: Vec<String> = items.iter().map(|s| s.to_string()).collect();
    v.sort();
    v
}

#[tokio::test]
async fn test_discovers_all_words_under_cap() {
    let oracle = Arc::new(VocabularyOracle::new(
        &["cat", "car", "cart", "dog"],
        2,
        Ranking::ShortestFirst,
    ));
    let (sink, store) = memory_store();
    let setup = Setup::default();

    let report = setup
        .build(oracle.clone(), setup.pacer(), store.clone())
        .run(never_shutdown())
        .await
        .unwrap();

    assert_eq!(report.stop_reason, StopReason::Exhausted);
    assert_eq!(store.sorted_words(), sorted(&["car", "cart", "cat", "dog"]));
    assert_eq!(report.total_words, 4);
    assert_eq!(report.new_words, 4);
    assert_eq!(report.pending, 0);

    let mut lines = sink.lines();
    lines.sort();
    assert_eq!(lines, sorted(&["car", "cart", "cat", "dog"]));
}

#[tokio::test]
async fn test_discovered_set_is_a_lower_bound() {
    // Ranked alphabetically, "c" and "ca" both return [car, cart]; "cat" is
    // never returned and no sibling walk reaches it.
    let oracle = Arc::new(VocabularyOracle::new(
        &["cat", "car", "cart", "dog"],
        2,
        Ranking::Lexicographic,
    ));
    let (_sink, store) = memory_store();
    let setup = Setup::default();

    setup
        .build(oracle.clone(), setup.pacer(), store.clone())
        .run(never_shutdown())
        .await
        .unwrap();

    assert_eq!(store.sorted_words(), sorted(&["car", "cart", "dog"]));
    assert!(!store.contains("cat"));
}

#[tokio::test]
async fn test_traversal_follows_child_and_sibling_rules() {
    let oracle = Arc::new(VocabularyOracle::new(
        &["cat", "car", "cart", "dog"],
        2,
        Ranking::ShortestFirst,
    ));
    let (_sink, store) = memory_store();
    let setup = Setup {
        workers: 1,
        ..Setup::default()
    };

    let report = setup
        .build(oracle.clone(), setup.pacer(), store)
        .run(never_shutdown())
        .await
        .unwrap();

    let queried: BTreeSet<String> = oracle.calls().into_iter().map(|(p, _)| p).collect();
    let mut expected: BTreeSet<String> = ('a'..='z').map(|c| c.to_string()).collect();
    for p in ["ca", "car", "cat", "cart", "cb", "cas", "cau", "caru", "do", "dog", "dp", "doh"] {
        expected.insert(p.to_string());
    }
    assert_eq!(queried, expected);
    assert_eq!(report.queried, expected.len());
}

#[tokio::test]
async fn test_when_capped_skips_sibling_for_short_responses() {
    let oracle = Arc::new(VocabularyOracle::new(&["dog"], 2, Ranking::ShortestFirst));
    let (_sink, store) = memory_store();
    let setup = Setup {
        sibling: SiblingPolicy::WhenCapped,
        ..Setup::default()
    };

    setup
        .build(oracle.clone(), setup.pacer(), store.clone())
        .run(never_shutdown())
        .await
        .unwrap();

    let counts = oracle.call_counts();
    assert!(counts.contains_key("do"));
    assert!(counts.contains_key("dog"));
    assert!(!counts.contains_key("dp"));
    assert!(!counts.contains_key("doh"));
    assert_eq!(store.sorted_words(), sorted(&["dog"]));
}

#[tokio::test]
async fn test_no_prefix_dispatched_twice() {
    let mut words = Vec::new();
    for x in ['a', 'b', 'c'] {
        for y in ['a', 'b', 'c'] {
            words.push(format!("{}{}", x, y));
            for z in ['a', 'b', 'c'] {
                words.push(format!("{}{}{}", x, y, z));
            }
        }
    }
    let refs: Vec<&str> = words.iter().map(String::as_str).collect();
    let oracle = Arc::new(VocabularyOracle::new(&refs, 3, Ranking::Lexicographic));
    let (sink, store) = memory_store();
    let setup = Setup {
        alphabet: "abc",
        cap: 3,
        workers: 8,
        ..Setup::default()
    };

    let report = setup
        .build(oracle.clone(), setup.pacer(), store.clone())
        .run(never_shutdown())
        .await
        .unwrap();

    let counts = oracle.call_counts();
    assert!(counts.values().all(|&n| n == 1), "re-dispatched: {:?}", counts);
    assert_eq!(counts.len(), report.queried);

    let lines = sink.lines();
    let unique: HashSet<&String> = lines.iter().collect();
    assert_eq!(unique.len(), lines.len());
    assert_eq!(lines.len(), store.len());
}

#[tokio::test(start_paused = true)]
async fn test_dispatch_starts_respect_rate_budget() {
    let oracle = Arc::new(
        VocabularyOracle::new(&["cat", "car", "cart", "dog"], 2, Ranking::ShortestFirst)
            .latency(Duration::from_millis(700)),
    );
    let (_sink, store) = memory_store();
    let setup = Setup {
        delay: Duration::from_millis(250),
        workers: 6,
        ..Setup::default()
    };

    setup
        .build(oracle.clone(), setup.pacer(), store.clone())
        .run(never_shutdown())
        .await
        .unwrap();

    let mut starts: Vec<Instant> = oracle.calls().into_iter().map(|(_, t)| t).collect();
    starts.sort();
    assert!(starts.len() > 26);
    for pair in starts.windows(2) {
        assert!(
            pair[1] - pair[0] >= Duration::from_millis(250),
            "dispatches {:?} apart",
            pair[1] - pair[0]
        );
    }
    assert_eq!(store.len(), 4);
}

#[tokio::test]
async fn test_failure_is_isolated_and_retried_once() {
    let oracle = Arc::new(
        VocabularyOracle::new(&["cat", "car", "cart", "dog"], 2, Ranking::ShortestFirst)
            .failing(&["c"]),
    );
    let (_sink, store) = memory_store();
    let setup = Setup {
        retry_budget: 1,
        ..Setup::default()
    };

    let report = setup
        .build(oracle.clone(), setup.pacer(), store.clone())
        .run(never_shutdown())
        .await
        .unwrap();

    assert_eq!(oracle.call_counts().get("c"), Some(&2));
    assert_eq!(report.retried, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(store.sorted_words(), sorted(&["dog"]));
}

#[tokio::test(start_paused = true)]
async fn test_repeated_throttling_widens_pacing() {
    let oracle = Arc::new(VocabularyOracle::new(&["dog"], 2, Ranking::ShortestFirst).throttling());
    let (_sink, store) = memory_store();
    let setup = Setup {
        alphabet: "abcdef",
        delay: Duration::from_millis(1),
        workers: 1,
        ..Setup::default()
    };
    let pacer = setup.pacer();

    let report = setup
        .build(oracle.clone(), pacer.clone(), store.clone())
        .run(never_shutdown())
        .await
        .unwrap();

    assert_eq!(report.failed, 6);
    let stats = pacer.stats().await;
    assert_eq!(stats.throttle_hits, 6);
    assert!(stats.in_backoff);
    assert!(stats.current_delay > Duration::from_millis(1));
    assert!(store.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_leaves_clean_output() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("words.txt");

    let words: Vec<String> = ('a'..='z')
        .flat_map(|a| ('a'..='e').map(move |b| format!("{}{}x", a, b)))
        .collect();
    let refs: Vec<&str> = words.iter().map(String::as_str).collect();
    let oracle = Arc::new(
        VocabularyOracle::new(&refs, 2, Ranking::Lexicographic).latency(Duration::from_millis(50)),
    );
    let store = Arc::new(DiscoveryStore::new(Box::new(FileSink::create(&path).unwrap())));
    let setup = Setup {
        delay: Duration::from_millis(100),
        ..Setup::default()
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1000)).await;
        let _ = shutdown_tx.send(true);
    });

    let report = setup
        .build(oracle.clone(), setup.pacer(), store.clone())
        .run(shutdown_rx)
        .await
        .unwrap();

    assert_eq!(report.stop_reason, StopReason::Cancelled);
    assert!(report.pending > 0);
    assert_eq!(report.abandoned, 0);

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.is_empty() || contents.ends_with('\n'));
    let mut lines: Vec<String> = contents.lines().map(str::to_string).collect();
    assert!(lines.iter().all(|l| words.contains(l)));
    lines.sort();
    let before = lines.len();
    lines.dedup();
    assert_eq!(lines.len(), before);
    assert_eq!(lines, store.sorted_words());
    assert!(!lines.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_run_timeout_stops_run() {
    let oracle = Arc::new(
        VocabularyOracle::new(&["cat", "dog"], 2, Ranking::ShortestFirst)
            .latency(Duration::from_millis(10)),
    );
    let (_sink, store) = memory_store();
    let mut setup = Setup {
        delay: Duration::from_millis(100),
        ..Setup::default()
    };
    setup.config.run_timeout = Some(Duration::from_millis(550));
    let start = Instant::now();

    let report = setup
        .build(oracle.clone(), setup.pacer(), store)
        .run(never_shutdown())
        .await
        .unwrap();

    assert_eq!(report.stop_reason, StopReason::TimedOut);
    let calls = oracle.calls();
    assert_eq!(calls.len(), 6, "calls {:?}", calls);
    assert!(calls
        .iter()
        .all(|(_, t)| *t <= start + Duration::from_millis(550)));
    // Workers waiting on the pacer at the deadline give up their prefixes.
    assert_eq!(report.queried, calls.len() + report.cancelled);
    assert!(report.pending > 0);
}

#[tokio::test(start_paused = true)]
async fn test_no_request_sent_after_shutdown() {
    let oracle = Arc::new(VocabularyOracle::new(&[], 2, Ranking::ShortestFirst));
    let (_sink, store) = memory_store();
    let setup = Setup {
        workers: 10,
        delay: Duration::from_millis(1200),
        ..Setup::default()
    };

    let start = Instant::now();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(3000)).await;
        let _ = shutdown_tx.send(true);
    });

    let report = setup
        .build(oracle.clone(), setup.pacer(), store)
        .run(shutdown_rx)
        .await
        .unwrap();

    let stop_at = start + Duration::from_millis(3000);
    let late: Vec<_> = oracle
        .calls()
        .into_iter()
        .filter(|(_, t)| *t > stop_at)
        .collect();
    assert!(late.is_empty(), "sent after shutdown: {:?}", late);
    assert_eq!(oracle.calls().len(), 3);

    assert_eq!(report.stop_reason, StopReason::Cancelled);
    // Every worker had already claimed its next prefix when the stop came.
    assert_eq!(report.cancelled, 10);
    assert_eq!(report.queried, 3 + 10);
    assert_eq!(report.abandoned, 0);
    assert!(report.elapsed < Duration::from_millis(3100));
}

#[tokio::test(start_paused = true)]
async fn test_grace_period_abandons_hung_query() {
    let oracle = Arc::new(
        VocabularyOracle::new(&["aa"], 2, Ranking::ShortestFirst).hanging(&["b"]),
    );
    let (_sink, store) = memory_store();
    let setup = Setup {
        alphabet: "ab",
        ..Setup::default()
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        let _ = shutdown_tx.send(true);
    });

    let report = setup
        .build(oracle.clone(), setup.pacer(), store.clone())
        .run(shutdown_rx)
        .await
        .unwrap();

    assert_eq!(report.stop_reason, StopReason::Cancelled);
    assert_eq!(report.abandoned, 1);
    assert_eq!(oracle.call_counts().get("b"), Some(&1));
    assert!(store.contains("aa"));
}

#[tokio::test]
async fn test_seed_depth_two_queries_all_pairs() {
    let oracle = Arc::new(VocabularyOracle::new(&[], 2, Ranking::ShortestFirst));
    let (_sink, store) = memory_store();
    let mut setup = Setup {
        alphabet: "xyz",
        ..Setup::default()
    };
    setup.config.seed_depth = 2;

    let report = setup
        .build(oracle.clone(), setup.pacer(), store)
        .run(never_shutdown())
        .await
        .unwrap();

    assert_eq!(report.queried, 3 + 9);
    assert!(oracle.call_counts().contains_key("zy"));
}

#[tokio::test]
async fn test_events_track_resolutions() {
    let oracle = Arc::new(VocabularyOracle::new(&["dog"], 2, Ranking::ShortestFirst));
    let (_sink, store) = memory_store();
    let setup = Setup {
        alphabet: "dog",
        ..Setup::default()
    };
    let (tx, mut rx) = mpsc::channel(256);

    let report = setup
        .build(oracle.clone(), setup.pacer(), store)
        .with_events(tx)
        .run(never_shutdown())
        .await
        .unwrap();

    let mut dispatched = 0;
    let mut resolved = 0;
    while let Ok(event) = rx.try_recv() {
        match event {
            HarvestEvent::Dispatched { .. } => dispatched += 1,
            HarvestEvent::Resolved { .. } => resolved += 1,
            HarvestEvent::Failed { .. } => {}
        }
    }
    assert_eq!(dispatched, report.queried);
    assert_eq!(resolved, report.resolved);
}

struct BrokenSink;

impl WordSink for BrokenSink {
    fn append(&mut self, _words: &[String]) -> io::Result<()> {
        Err(io::Error::other("disk full"))
    }
}

#[tokio::test]
async fn test_sink_failure_stops_run() {
    let oracle = Arc::new(VocabularyOracle::new(&["cat", "dog"], 2, Ranking::ShortestFirst));
    let store = Arc::new(DiscoveryStore::new(Box::new(BrokenSink)));
    let setup = Setup::default();

    let result = setup
        .build(oracle.clone(), setup.pacer(), store.clone())
        .run(never_shutdown())
        .await;

    assert!(matches!(result, Err(HarvestError::Store(_))));
    assert!(store.is_empty());
}
