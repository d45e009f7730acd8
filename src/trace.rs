use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Opt-in JSONL log of layout decisions: one object per line, tagged with a
/// `"type"` field, plus per-type counters flushed as a summary line.
#[derive(Clone)]
pub struct LayoutTrace {
    inner: Arc<Mutex<TraceState>>,
}

struct TraceState {
    writer: Box<dyn Write + Send>,
    counters: BTreeMap<String, u64>,
}

impl LayoutTrace {
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self::from_writer(BufWriter::new(file)))
    }

    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TraceState {
                writer: Box::new(writer),
                counters: BTreeMap::new(),
            })),
        }
    }

    /// Writes `event` flattened next to its type tag. Non-object payloads go
    /// under `"value"`.
    pub fn record<T: Serialize + ?Sized>(&self, kind: &str, event: &T) {
        let mut line = Map::new();
        line.insert("type".to_string(), Value::String(kind.to_string()));
        match serde_json::to_value(event) {
            Ok(Value::Object(fields)) => line.extend(fields),
            Ok(other) => {
                line.insert("value".to_string(), other);
            }
            Err(err) => {
                line.insert("error".to_string(), Value::String(err.to_string()));
            }
        }
        if let Ok(mut state) = self.inner.lock() {
            let entry = state.counters.entry(kind.to_string()).or_insert(0);
            *entry = entry.saturating_add(1);
            let _ = writeln!(state.writer, "{}", Value::Object(line));
        }
    }

    pub fn increment(&self, key: &str, amount: u64) {
        if let Ok(mut state) = self.inner.lock() {
            let entry = state.counters.entry(key.to_string()).or_insert(0);
            *entry = entry.saturating_add(amount);
        }
    }

    /// Emits the counters collected since the last summary and resets them.
    pub fn emit_summary(&self, context: &str) {
        if let Ok(mut state) = self.inner.lock() {
            let counters = std::mem::take(&mut state.counters);
            let json = serde_json::json!({
                "type": "trace.summary",
                "context": context,
                "counts": counters,
            });
            let _ = writeln!(state.writer, "{json}");
        }
    }

    pub fn flush(&self) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = state.writer.flush();
        }
    }
}

impl std::fmt::Debug for LayoutTrace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayoutTrace").finish_non_exhaustive()
    }
}
