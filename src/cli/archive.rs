//! `spqf archive` and `spqf pending`: read-only views of the scheduler store.

use serde_json::Value;
use spqf::praetor::{Deadline, JsonFileStore, PraetorStore};
use spqf::vote::{VoteId, VoteRecord};
use std::path::Path;
use std::time::{Duration, UNIX_EPOCH};

/// One line per archived vote.
pub fn summarize(id: VoteId, record: &Value) -> String {
    match serde_json::from_value::<VoteRecord>(record.clone()) {
        Ok(rec) => format!(
            "#{:<6} {:<12} {:<8} {} ({})",
            id,
            rec.vote.chan(),
            rec.vote.kind().type_str(),
            rec.outcome,
            timestamp(rec.ended),
        ),
        Err(_) => format!("#{:<6} (unreadable record)", id),
    }
}

pub fn describe(deadline: &Deadline) -> String {
    format!("#{:<6} {}", deadline.id, timestamp(deadline.at))
}

fn timestamp(secs: u64) -> String {
    humantime::format_rfc3339_seconds(UNIX_EPOCH + Duration::from_secs(secs)).to_string()
}

pub async fn execute_archive(
    db_dir: &Path,
    id: Option<VoteId>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = JsonFileStore::open(db_dir);
    match id {
        Some(id) => match store.record(id).await? {
            Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
            None => return Err(format!("No archived vote #{}", id).into()),
        },
        None => {
            let records = store.records().await?;
            if records.is_empty() {
                println!("No archived votes");
            }
            for (id, record) in &records {
                println!("{}", summarize(*id, record));
            }
        }
    }
    Ok(())
}

pub async fn execute_pending(db_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let store = JsonFileStore::open(db_dir);
    let pending = store.load_pending().await?;
    if pending.is_empty() {
        println!("No pending deadlines");
    }
    for deadline in &pending {
        println!("{}", describe(deadline));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use spqf::chat::User;
    use spqf::config::ConfigDoc;
    use spqf::vote::{Outcome, Vote, VoteKind};
    use tempfile::TempDir;

    #[test]
    fn test_summarize_record() {
        let vote = Vote::new(
            12,
            VoteKind::Kick {
                target: "troll".into(),
            },
            ConfigDoc::new(),
            "#senate",
            &User::new("alice", "alice.host", "alice"),
            "",
        )
        .unwrap();
        let record = serde_json::to_value(VoteRecord {
            vote,
            outcome: Outcome::Passed { yes: 3, no: 1 },
            ended: 0,
            expires: None,
        })
        .unwrap();

        let line = summarize(12, &record);
        assert!(line.starts_with("#12"));
        assert!(line.contains("#senate"));
        assert!(line.contains("kick"));
        assert!(line.contains("passed (3 yes, 1 no)"));
        assert!(line.contains("1970-01-01T00:00:00Z"));

        assert!(summarize(1, &json!({})).contains("unreadable"));
    }

    #[test]
    fn test_describe_deadline() {
        let line = describe(&Deadline { id: 3, at: 60 });
        assert_eq!(line, "#3      1970-01-01T00:01:00Z");
    }

    #[tokio::test]
    async fn test_missing_archive_entry_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(execute_archive(dir.path(), Some(1)).await.is_err());
        assert!(execute_archive(dir.path(), None).await.is_ok());
        assert!(execute_pending(dir.path()).await.is_ok());
    }
}
