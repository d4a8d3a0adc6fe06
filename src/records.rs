//! Participant records: a local JSON store with CSV export for the crew.
//! Persistence is best effort; a failed save is reported and the game
//! keeps going.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Record {
    pub name: String,
    pub phone: String,
    pub score: u32,
    /// Unix seconds at the time the record was saved.
    pub timestamp: u64,
}

pub struct RecordStore {
    path: PathBuf,
    records: Vec<Record>,
}

impl RecordStore {
    /// Load the store from `path`. A missing or unreadable file starts an
    /// empty store rather than blocking the kiosk.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(records) => records,
                Err(err) => {
                    warn!("ignoring corrupt record file {}: {err}", path.display());
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };
        Self { path, records }
    }

    pub fn add(&mut self, name: &str, phone: &str, score: u32) -> Result<()> {
        self.records.push(Record {
            name: name.trim().to_string(),
            phone: phone.trim().to_string(),
            score,
            timestamp: unix_now(),
        });
        self.save()
    }

    fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.records)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("writing {}", self.path.display()))?;
        Ok(())
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Write every record to a spreadsheet-friendly CSV file.
    pub fn export_csv(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();
        let mut out = String::from("name,phone,score,timestamp\n");
        for r in &self.records {
            out.push_str(&format!(
                "{},{},{},{}\n",
                csv_field(&r.name),
                csv_field(&r.phone),
                r.score,
                r.timestamp
            ));
        }
        std::fs::write(path, out).with_context(|| format!("writing {}", path.display()))?;
        Ok(path.to_path_buf())
    }
}

fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("scream-records-{tag}-{}.json", std::process::id()))
    }

    #[test]
    fn add_persists_and_reloads() {
        let path = temp_path("reload");
        std::fs::remove_file(&path).ok();

        let mut store = RecordStore::load(&path);
        store.add("Ayu", "0812345", 87).unwrap();
        store.add("Bima", "0867890", 100).unwrap();

        let reloaded = RecordStore::load(&path);
        std::fs::remove_file(&path).ok();
        assert_eq!(reloaded.records().len(), 2);
        assert_eq!(reloaded.records()[0].name, "Ayu");
        assert_eq!(reloaded.records()[1].score, 100);
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let path = temp_path("corrupt");
        std::fs::write(&path, "not json at all").unwrap();
        let store = RecordStore::load(&path);
        std::fs::remove_file(&path).ok();
        assert!(store.records().is_empty());
    }

    #[test]
    fn csv_quotes_awkward_fields() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn export_writes_header_and_rows() {
        let path = temp_path("export");
        std::fs::remove_file(&path).ok();
        let mut store = RecordStore::load(&path);
        store.add("Cahya", "0800", 42).unwrap();

        let csv_path = std::env::temp_dir().join(format!(
            "scream-export-{}.csv",
            std::process::id()
        ));
        store.export_csv(&csv_path).unwrap();
        let out = std::fs::read_to_string(&csv_path).unwrap();
        std::fs::remove_file(&path).ok();
        std::fs::remove_file(&csv_path).ok();

        let mut lines = out.lines();
        assert_eq!(lines.next(), Some("name,phone,score,timestamp"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("Cahya,0800,42,"));
    }
}
