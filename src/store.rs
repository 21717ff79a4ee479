//! Discovered words and the sink they are appended to.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

/// Append-only destination for newly discovered words.
///
/// A call receives one batch; implementations must make the batch durable
/// before returning.
pub trait WordSink: Send {
    fn append(&mut self, words: &[String]) -> io::Result<()>;
}

/// One word per line in a text file.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    file: File,
}

impl FileSink {
    /// Create (or truncate) the output file.
    pub fn create(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Open the output file for appending, keeping what is already there.
    pub fn append_to(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl WordSink for FileSink {
    fn append(&mut self, words: &[String]) -> io::Result<()> {
        // A single write per batch keeps lines whole.
        let mut buf = String::with_capacity(words.iter().map(|w| w.len() + 1).sum());
        for word in words {
            buf.push_str(word);
            buf.push('\n');
        }
        self.file.write_all(buf.as_bytes())?;
        self.file.flush()
    }
}

/// In-memory sink, cloneable so the caller can inspect what was written.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl WordSink for MemorySink {
    fn append(&mut self, words: &[String]) -> io::Result<()> {
        let mut lines = self
            .lines
            .lock()
            .map_err(|_| io::Error::other("memory sink poisoned"))?;
        lines.extend(words.iter().cloned());
        Ok(())
    }
}

/// Read words from an earlier output file, one per line. Missing file yields
/// an empty list.
pub fn load_existing_words(path: &Path) -> io::Result<Vec<String>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut words = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if !line.is_empty() {
            words.push(line);
        }
    }
    Ok(words)
}

struct StoreInner {
    words: HashSet<String>,
    sink: Box<dyn WordSink>,
}

/// The deduplicated set of every word seen so far.
///
/// Ingestion is idempotent: a word is written to the sink at most once no
/// matter how many responses contain it.
pub struct DiscoveryStore {
    inner: Mutex<StoreInner>,
}

impl DiscoveryStore {
    pub fn new(sink: Box<dyn WordSink>) -> Self {
        Self::with_known(sink, Vec::new())
    }

    /// Start from words that are already in the sink (resumed runs).
    pub fn with_known(sink: Box<dyn WordSink>, known: Vec<String>) -> Self {
        let words: HashSet<String> = known.into_iter().collect();
        if !words.is_empty() {
            info!("Resuming with {} known words", words.len());
        }
        Self {
            inner: Mutex::new(StoreInner { words, sink }),
        }
    }

    /// Record `words`, append the new ones to the sink, and return them in
    /// response order.
    pub fn ingest(&self, words: &[String]) -> io::Result<Vec<String>> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| io::Error::other("discovery store poisoned"))?;

        let mut fresh = Vec::new();
        let mut batch_seen = HashSet::new();
        for word in words {
            if !inner.words.contains(word) && batch_seen.insert(word.as_str()) {
                fresh.push(word.clone());
            }
        }
        if fresh.is_empty() {
            return Ok(fresh);
        }

        // Only mark words as known once they are durable in the sink.
        inner.sink.append(&fresh)?;
        inner.words.extend(fresh.iter().cloned());
        debug!("Stored {} new words ({} total)", fresh.len(), inner.words.len());
        Ok(fresh)
    }

    pub fn contains(&self, word: &str) -> bool {
        self.inner
            .lock()
            .map(|inner| inner.words.contains(word))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.words.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All discovered words, sorted.
    pub fn sorted_words(&self) -> Vec<String> {
        let mut words: Vec<String> = self
            .inner
            .lock()
            .map(|inner| inner.words.iter().cloned().collect())
            .unwrap_or_default();
        words.sort();
        words
    }
}
