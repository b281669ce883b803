use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

/// Keys stamped on every journal line. A payload cannot replace them.
pub const RESERVED_EVENT_KEYS: [&str; 3] = ["type", "session_id", "ts"];

/// Session journal, one compact JSON object per line in `events.jsonl`.
///
/// Clones write to the same file under one lock, so scoped worker threads
/// can share a writer. The file is reopened for every line; a journal that
/// becomes unwritable fails the next `emit` rather than a later one.
#[derive(Debug, Clone)]
pub struct EventWriter {
    path: Arc<PathBuf>,
    session_id: Arc<str>,
    append_lock: Arc<Mutex<()>>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            path: Arc::new(path.into()),
            session_id: Arc::from(session_id.into()),
            append_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Appends one event and returns it as written.
    pub fn emit(&self, event_type: &str, payload: EventPayload) -> Result<Value> {
        let event = stamp_event(payload, event_type, &self.session_id);
        let mut line = serde_json::to_vec(&event)?;
        line.push(b'\n');

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let _guard = self
            .append_lock
            .lock()
            .map_err(|_| anyhow!("journal lock poisoned"))?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path.as_path())
            .and_then(|mut file| file.write_all(&line))
            .with_context(|| format!("failed to append {event_type} to {}", self.path.display()))?;

        Ok(Value::Object(event))
    }
}

fn stamp_event(mut payload: EventPayload, event_type: &str, session_id: &str) -> EventPayload {
    let [type_key, session_key, ts_key] = RESERVED_EVENT_KEYS;
    payload.insert(type_key.to_string(), Value::from(event_type));
    payload.insert(session_key.to_string(), Value::from(session_id));
    payload.insert(ts_key.to_string(), Value::from(now_utc_iso()));
    payload
}

/// Every event in a journal, in write order. Blank lines are skipped.
pub fn read_events(path: &Path) -> Result<Vec<Value>> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("invalid event at {}:{}", path.display(), idx + 1))
        })
        .collect()
}

pub fn read_event_types(path: &Path) -> Result<Vec<String>> {
    Ok(read_events(path)?
        .iter()
        .filter_map(|event| event.get("type").and_then(Value::as_str))
        .map(str::to_string)
        .collect())
}

pub fn map_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

pub fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::DateTime;
    use serde_json::{json, Value};

    use super::{map_object, read_event_types, read_events, EventWriter};

    #[test]
    fn each_event_is_one_stamped_line() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::new(&path, "session-123");

        let emitted = writer.emit("signed_in", map_object(json!({ "uid": "user-1" })))?;
        writer.emit("signed_out", map_object(json!({ "uid": "user-1" })))?;

        let content = fs::read_to_string(&path)?;
        assert_eq!(content.lines().count(), 2);
        assert!(content.ends_with('\n'));

        let events = read_events(&path)?;
        assert_eq!(events[0], emitted);
        assert_eq!(events[0]["type"], "signed_in");
        assert_eq!(events[0]["session_id"], "session-123");
        assert_eq!(events[0]["uid"], "user-1");
        DateTime::parse_from_rfc3339(events[0]["ts"].as_str().unwrap_or(""))?;
        Ok(())
    }

    #[test]
    fn payload_cannot_replace_reserved_keys() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let writer = EventWriter::new(temp.path().join("events.jsonl"), "session-123");

        let emitted = writer.emit(
            "signed_in",
            map_object(json!({ "type": "forged", "session_id": "other", "uid": "user-1" })),
        )?;

        assert_eq!(emitted["type"], "signed_in");
        assert_eq!(emitted["session_id"], "session-123");
        assert_eq!(emitted["uid"], "user-1");
        Ok(())
    }

    #[test]
    fn clones_share_one_journal() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested").join("events.jsonl");
        let writer = EventWriter::new(&path, "session-123");
        let clone = writer.clone();

        let first = std::thread::scope(|scope| {
            scope.spawn(|| writer.emit("one", Default::default())).join()
        });
        let Ok(first) = first else {
            anyhow::bail!("journal thread panicked");
        };
        first?;
        clone.emit("two", Default::default())?;

        assert_eq!(read_event_types(&path)?, vec!["one", "two"]);
        Ok(())
    }

    #[test]
    fn unwritable_journal_fails_the_emit() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        fs::create_dir(&path)?;

        let err = EventWriter::new(&path, "s").emit("one", Default::default()).unwrap_err();
        assert!(format!("{err:#}").contains("failed to append one"));
        Ok(())
    }

    #[test]
    fn malformed_line_reports_its_position() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        fs::write(&path, "{\"type\":\"one\"}\n\nnot json\n")?;

        let err = read_events(&path).unwrap_err();
        assert!(err.to_string().ends_with("events.jsonl:3"));
        assert_eq!(map_object(Value::Null).len(), 0);
        Ok(())
    }
}
