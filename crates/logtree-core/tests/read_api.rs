//! Integration tests for the read API
//!
//! Exercises backlogs, subtree queries, severity filtering and live streams
//! through the public `LogTree` surface.

use std::collections::HashSet;
use std::time::Duration;

use logtree_core::{
    Backlog, Dn, JournalConfig, LogEntry, LogTree, LogTreeError, ReadOptions, Severity,
    StreamFiltering,
};

// ============================================================================
// Helpers
// ============================================================================

fn text(entry: &LogEntry) -> String {
    match (entry.as_leveled(), entry.as_raw()) {
        (Some(l), _) => l.messages_joined(),
        (_, Some(r)) => r.data.clone(),
        _ => unreachable!(),
    }
}

fn texts(entries: &[LogEntry]) -> Vec<String> {
    entries.iter().map(text).collect()
}

/// Recursive backlog at `dn` as a set of message texts.
fn everything_at(tree: &LogTree, dn: &str) -> HashSet<String> {
    let reader = tree
        .read(dn, ReadOptions::new().with_children().with_backlog(Backlog::All))
        .unwrap();
    reader.backlog.iter().map(text).collect()
}

fn set(items: &[&str]) -> HashSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn tree_with(config: JournalConfig) -> LogTree {
    LogTree::with_config(config)
}

async fn drain(reader: &mut logtree_core::LogReader) -> Vec<LogEntry> {
    let mut got = Vec::new();
    while let Ok(Some(e)) = tokio::time::timeout(Duration::from_millis(50), reader.recv()).await {
        got.push(e);
    }
    got
}

// ============================================================================
// Backlog Tests
// ============================================================================

#[test]
fn test_multiline() {
    let tree = LogTree::new();
    tree.must_leveled_for("main").info("foo\nbar");
    tree.must_leveled_for("main").info("one\ntwo\n");

    assert_eq!(everything_at(&tree, "main"), set(&["foo\nbar", "one\ntwo"]));
}

#[test]
fn test_backlog_all() {
    let tree = LogTree::new();
    tree.must_leveled_for("main").info("hello, main!");
    tree.must_leveled_for("main.foo").info("hello, main.foo!");
    tree.must_leveled_for("main.bar").info("hello, main.bar!");
    tree.must_leveled_for("aux").info("hello, aux!");
    let raw = tree.must_raw_for("aux.process");
    raw.emit_str("processing foo");
    raw.emit_str("processing bar");

    assert_eq!(
        everything_at(&tree, "main"),
        set(&["hello, main!", "hello, main.foo!", "hello, main.bar!"])
    );
    assert_eq!(
        everything_at(&tree, ""),
        set(&[
            "hello, main!",
            "hello, main.foo!",
            "hello, main.bar!",
            "hello, aux!",
            "processing foo",
            "processing bar",
        ])
    );
    assert_eq!(
        everything_at(&tree, "aux"),
        set(&["hello, aux!", "processing foo", "processing bar"])
    );
}

#[test]
fn test_backlog_limited() {
    let tree = LogTree::new();
    let log = |dn: &str, msg: &str| tree.must_leveled_for(dn).info(msg);
    log("main", "hello, main!");
    log("main.foo", "hello, main.foo!");
    log("main.bar", "hello, main.bar!");
    log("main.bar.chatty", "hey there how are you");
    log("main.bar.quiet", "fine how are you");
    log("main.bar.chatty", "i've been alright myself");
    log("main.bar.quiet", "mhm");
    log("main.bar.chatty", "like a unit test?");
    log("main.bar.quiet", "yeah totally");
    log("main.bar.chatty", "it's hard to put my finger on it");
    log("main.bar.chatty", "anyway, how's the family doing?");

    let read = |dn: &str, n: usize, recursive: bool| {
        let mut opts = ReadOptions::new().with_backlog(Backlog::Count(n));
        if recursive {
            opts = opts.with_children();
        }
        texts(&tree.read(dn, opts).unwrap().backlog)
    };

    assert_eq!(
        read("main", 3, true),
        vec![
            "yeah totally",
            "it's hard to put my finger on it",
            "anyway, how's the family doing?"
        ]
    );
    assert_eq!(read("main.foo", 3, false), vec!["hello, main.foo!"]);
    assert_eq!(read("main.bar.quiet", 2, true), vec!["mhm", "yeah totally"]);
    assert!(read("main", 0, true).is_empty());
}

#[test]
fn test_unknown_dn_is_empty() {
    let tree = LogTree::new();
    tree.must_leveled_for("main").info("x");
    let reader = tree
        .read("nobody.here", ReadOptions::new().with_backlog(Backlog::All))
        .unwrap();
    assert!(reader.backlog.is_empty());
}

#[test]
fn test_exact_equals_recursive_at_leaf() {
    let tree = LogTree::new();
    for i in 0..20 {
        tree.must_leveled_for("a.b").info(format!("b {}", i));
        tree.must_raw_for("a.b.leaf").emit_str(&format!("leaf {}", i));
        tree.must_leveled_for("a.c").warning(format!("c {}", i));
    }

    let exact = tree
        .read("a.b.leaf", ReadOptions::new().with_backlog(Backlog::All))
        .unwrap()
        .backlog.clone();
    let recursive = tree
        .read(
            "a.b.leaf",
            ReadOptions::new().with_children().with_backlog(Backlog::All),
        )
        .unwrap()
        .backlog.clone();
    assert_eq!(exact.len(), 20);
    assert_eq!(exact, recursive);
}

// ============================================================================
// Filtering Tests
// ============================================================================

#[test]
fn test_severity() {
    let tree = LogTree::new();
    let log = tree.must_leveled_for("main");
    log.error("i am an error");
    log.warning("i am a warning");
    log.info("i am informative");
    log.v(0).info("i am a zero-level debug");

    let reader = tree
        .read(
            "main",
            ReadOptions::new()
                .with_backlog(Backlog::All)
                .min_severity(Severity::Warning),
        )
        .unwrap();
    assert_eq!(texts(&reader.backlog), vec!["i am an error", "i am a warning"]);
}

#[test]
fn test_metadata() {
    let tree = LogTree::new();
    let log = tree.must_leveled_for("main");
    log.error("i am an error");
    log.warning("i am a warning");
    log.info("i am informative");
    log.v(0).info("i am a zero-level debug");

    let reader = tree
        .read("", ReadOptions::new().with_children().with_backlog(Backlog::All))
        .unwrap();
    let want = [
        (Severity::Error, "i am an error"),
        (Severity::Warning, "i am a warning"),
        (Severity::Info, "i am informative"),
        (Severity::Info, "i am a zero-level debug"),
    ];
    assert_eq!(reader.backlog.len(), want.len());
    for (entry, (severity, message)) in reader.backlog.iter().zip(want) {
        let p = entry.as_leveled().unwrap();
        assert_eq!(p.severity(), severity);
        assert_eq!(p.messages_joined(), message);
        assert_eq!(p.file(), "read_api.rs");
    }
}

#[test]
fn test_severity_monotonic() {
    let tree = LogTree::new();
    let log = tree.must_leveled_for("svc");
    for severity in Severity::ALL {
        log.log(severity, severity.to_string());
    }
    tree.must_raw_for("svc").emit_str("raw");

    let mut previous = usize::MAX;
    for min in Severity::ALL {
        let got = tree
            .read(
                "svc",
                ReadOptions::new().with_backlog(Backlog::All).min_severity(min),
            )
            .unwrap()
            .backlog.clone();
        assert!(got.len() <= previous);
        assert!(got.iter().all(|e| e.severity().is_some_and(|s| s >= min)));
        previous = got.len();
    }
}

#[test]
fn test_only_raw_and_only_leveled() {
    let tree = LogTree::new();
    tree.must_leveled_for("p").info("leveled");
    tree.must_raw_for("p").emit_str("raw");

    let raw = tree
        .read(
            "p",
            ReadOptions::new()
                .with_backlog(Backlog::All)
                .only_raw()
                .min_severity(Severity::Fatal),
        )
        .unwrap();
    assert_eq!(texts(&raw.backlog), vec!["raw"]);

    let leveled = tree
        .read("p", ReadOptions::new().with_backlog(Backlog::All).only_leveled())
        .unwrap();
    assert_eq!(texts(&leveled.backlog), vec!["leveled"]);
}

#[test]
fn test_conflicting_options() {
    let tree = LogTree::new();
    let err = tree
        .read("p", ReadOptions::new().only_raw().only_leveled())
        .unwrap_err();
    assert!(matches!(err, LogTreeError::ConflictingQueryOptions));
    assert_eq!(tree.journal().subscriber_count(), 0);
}

#[test]
fn test_verbose() {
    let tree = LogTree::new();
    tree.must_leveled_for("main").v(10).info("this shouldn't get logged");
    assert!(everything_at(&tree, "").is_empty());

    tree.set_verbosity(&Dn::new("main").unwrap(), 10);
    tree.must_leveled_for("main").v(10).info("this should get logged");
    assert_eq!(everything_at(&tree, ""), set(&["this should get logged"]));
}

// ============================================================================
// Streaming Tests
// ============================================================================

#[tokio::test]
async fn test_stream() {
    let tree = LogTree::new();
    tree.must_leveled_for("main").info("hello, backlog");
    tree.must_raw_for("main.process").emit_str("hello, raw backlog");

    let mut reader = tree
        .read(
            "",
            ReadOptions::new()
                .with_backlog(Backlog::All)
                .with_children()
                .with_stream(),
        )
        .unwrap();
    assert_eq!(reader.backlog.len(), 2);

    tree.must_leveled_for("main").info("hello, stream");
    tree.must_raw_for("main.raw").emit_str("hello, raw stream");

    let got = texts(&drain(&mut reader).await);
    assert_eq!(got, vec!["hello, stream", "hello, raw stream"]);
    assert_eq!(reader.missed(), 0);
}

#[tokio::test]
async fn test_stream_unfiltered_by_default() {
    let tree = LogTree::new();
    let mut reader = tree
        .read("a", ReadOptions::new().with_stream().only_raw())
        .unwrap();

    tree.must_leveled_for("a").info("leveled at a");
    tree.must_raw_for("b").emit_str("raw at b");

    let got = texts(&drain(&mut reader).await);
    assert_eq!(got, vec!["leveled at a", "raw at b"]);
}

#[tokio::test]
async fn test_stream_filtered_mode() {
    let tree = tree_with(JournalConfig {
        stream_filtering: StreamFiltering::Filtered,
        ..Default::default()
    });
    let mut reader = tree
        .read("a", ReadOptions::new().with_children().with_stream().only_raw())
        .unwrap();

    tree.must_leveled_for("a").info("leveled at a");
    tree.must_raw_for("a.x").emit_str("raw at a.x");
    tree.must_raw_for("b").emit_str("raw at b");

    let got = texts(&drain(&mut reader).await);
    assert_eq!(got, vec!["raw at a.x"]);
}

#[tokio::test]
async fn test_stream_backpressure() {
    const K: usize = 8;
    let tree = tree_with(JournalConfig {
        stream_buffer: K,
        ..Default::default()
    });
    let mut reader = tree.read("p", ReadOptions::new().with_stream()).unwrap();

    let log = tree.must_leveled_for("p");
    for i in 0..K + 5 {
        log.info(format!("{}", i));
    }
    assert_eq!(reader.missed(), 5);

    let got = texts(&drain(&mut reader).await);
    let want: Vec<String> = (0..K).map(|i| i.to_string()).collect();
    assert_eq!(got, want);

    // Entries fit again once drained.
    log.info("later");
    assert_eq!(reader.recv().await.map(|e| text(&e)), Some("later".to_string()));
    assert_eq!(reader.missed(), 5);
}

#[tokio::test]
async fn test_close_is_lazy() {
    let tree = LogTree::new();
    let mut reader = tree.read("p", ReadOptions::new().with_stream()).unwrap();
    tree.must_raw_for("p").emit_str("before close");
    assert_eq!(tree.journal().subscriber_count(), 1);

    reader.close();
    reader.close();
    assert_eq!(tree.journal().subscriber_count(), 1);

    tree.must_raw_for("p").emit_str("after close");
    assert_eq!(tree.journal().subscriber_count(), 0);

    // Buffered entries remain readable, then the stream ends.
    assert_eq!(reader.recv().await.map(|e| text(&e)), Some("before close".to_string()));
    assert_eq!(reader.recv().await, None);
}

#[tokio::test]
async fn test_drop_closes() {
    let tree = LogTree::new();
    let reader = tree.read("p", ReadOptions::new().with_stream()).unwrap();
    drop(reader);
    assert_eq!(tree.journal().subscriber_count(), 1);

    tree.must_raw_for("p").emit_str("nobody listens");
    assert_eq!(tree.journal().subscriber_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_backlog_and_stream_miss_nothing_under_concurrent_producers() {
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: usize = 200;

    let tree = tree_with(JournalConfig {
        stream_buffer: PRODUCERS * PER_PRODUCER,
        ..JournalConfig::default()
    });
    let producers: Vec<_> = (0..PRODUCERS)
        .map(|t| {
            let log = tree.must_leveled_for(format!("busy.t{t}"));
            std::thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    log.info(format!("t{t} {i}"));
                    std::thread::yield_now();
                }
            })
        })
        .collect();

    while tree.journal().len() < PRODUCERS * 10 {
        tokio::task::yield_now().await;
    }
    let mut reader = tree
        .read(
            "busy",
            ReadOptions::new()
                .with_children()
                .with_backlog(Backlog::All)
                .with_stream(),
        )
        .unwrap();
    for producer in producers {
        producer.join().unwrap();
    }

    let backlog = texts(&reader.backlog);
    let streamed = texts(&drain(&mut reader).await);
    assert_eq!(reader.missed(), 0);

    // Entries appended but not yet fanned out at read time may be in both.
    let seen: HashSet<&String> = backlog.iter().chain(&streamed).collect();
    for t in 0..PRODUCERS {
        for i in 0..PER_PRODUCER {
            let msg = format!("t{t} {i}");
            assert!(seen.contains(&msg), "{msg} neither in backlog nor streamed");
        }
    }
    assert!(backlog.len() + streamed.len() >= PRODUCERS * PER_PRODUCER);

    // Each producer's entries stream in the order they were logged.
    for t in 0..PRODUCERS {
        let prefix = format!("t{t} ");
        let order: Vec<usize> = streamed
            .iter()
            .filter_map(|m| m.strip_prefix(&prefix)?.parse().ok())
            .collect();
        assert!(order.windows(2).all(|w| w[0] < w[1]), "t{t} out of order");
    }
}
