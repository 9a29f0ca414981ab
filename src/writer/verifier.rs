//! Post-write verification
//!
//! Re-reads a committed record and reports fields the remote store dropped or
//! altered. Findings are warnings only; they never undo a successful write.

use std::sync::Arc;
use std::time::Duration;

use crate::errors::EngineError;
use crate::observability::{Event, Logger};
use crate::remote::{with_timeout, RemoteStore};
use crate::schema::{FieldMap, FieldValue};

use super::result::describe;

pub struct PostWriteVerifier {
    remote: Arc<dyn RemoteStore>,
    timeout: Duration,
}

impl PostWriteVerifier {
    pub fn new(remote: Arc<dyn RemoteStore>, timeout: Duration) -> Self {
        Self { remote, timeout }
    }

    /// Returns `(ok, warnings)`; `ok` is true when no warning was raised.
    ///
    /// Fields submitted empty are not checked for emptiness.
    pub async fn verify(&self, record_id: &str, expected: &FieldMap) -> (bool, Vec<String>) {
        let record = match with_timeout(self.timeout, self.remote.get_record(record_id)).await {
            Ok(record) => record,
            Err(e) => {
                let warning = describe(&EngineError::VerificationMismatch(format!(
                    "could not re-read record '{}': {}",
                    record_id, e
                )));
                log_warning(record_id, &warning);
                return (false, vec![warning]);
            }
        };

        let mut warnings = Vec::new();
        for (field, submitted) in expected {
            let mismatch = match record.fields.get(field) {
                None => Some(format!("field '{}' is missing after write", field)),
                Some(actual) if !submitted.is_empty() && actual.is_empty() => {
                    Some(format!("field '{}' is empty after write", field))
                }
                Some(FieldValue::Title(actual)) => match submitted {
                    FieldValue::Title(sent) if sent.trim() != actual.trim() => Some(format!(
                        "field '{}' reads back as '{}', expected '{}'",
                        field, actual, sent
                    )),
                    _ => None,
                },
                Some(_) => None,
            };

            if let Some(message) = mismatch {
                let warning = describe(&EngineError::VerificationMismatch(message));
                log_warning(record_id, &warning);
                warnings.push(warning);
            }
        }

        (warnings.is_empty(), warnings)
    }
}

fn log_warning(record_id: &str, warning: &str) {
    Logger::warn(
        Event::VerifyWarning,
        &[("record_id", record_id), ("warning", warning)],
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{MemoryRemote, SchemaSnapshot};
    use crate::schema::FieldType;

    fn remote() -> Arc<MemoryRemote> {
        Arc::new(
            MemoryRemote::new().with_schema(
                "db-tasks",
                SchemaSnapshot::new()
                    .with_field("Задача", FieldType::Title)
                    .with_field("Статус", FieldType::SingleEnum)
                    .with_field("Срок", FieldType::Date),
            ),
        )
    }

    fn fields() -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("Задача".into(), FieldValue::title("Макет"));
        fields.insert("Статус".into(), FieldValue::select("Done"));
        fields
    }

    #[tokio::test]
    async fn test_matching_record_ok() {
        let remote = remote();
        let record = remote.create_record("db-tasks", &fields()).await.unwrap();
        let verifier = PostWriteVerifier::new(remote, Duration::from_secs(5));

        let (ok, warnings) = verifier.verify(&record.id, &fields()).await;
        assert!(ok);
        assert!(warnings.is_empty());
    }

    #[tokio::test]
    async fn test_blanked_field_warns() {
        let remote = remote();
        remote.blank_on_write("Статус");
        let record = remote.create_record("db-tasks", &fields()).await.unwrap();
        let verifier = PostWriteVerifier::new(remote, Duration::from_secs(5));

        let (ok, warnings) = verifier.verify(&record.id, &fields()).await;
        assert!(!ok);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("SG_VERIFICATION_MISMATCH"));
        assert!(warnings[0].contains("'Статус' is empty"));
    }

    #[tokio::test]
    async fn test_submitted_empty_not_flagged() {
        let remote = remote();
        let mut submitted = fields();
        submitted.insert("Срок".into(), FieldValue::Date(None));
        let record = remote.create_record("db-tasks", &submitted).await.unwrap();
        let verifier = PostWriteVerifier::new(remote, Duration::from_secs(5));

        let (ok, _) = verifier.verify(&record.id, &submitted).await;
        assert!(ok);
    }

    #[tokio::test]
    async fn test_missing_and_title_mismatch() {
        let remote = remote();
        let mut stored = FieldMap::new();
        stored.insert("Задача".into(), FieldValue::title("Макет v2"));
        let record = remote.create_record("db-tasks", &stored).await.unwrap();
        let verifier = PostWriteVerifier::new(remote, Duration::from_secs(5));

        let (ok, warnings) = verifier.verify(&record.id, &fields()).await;
        assert!(!ok);
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().any(|w| w.contains("'Статус' is missing")));
        assert!(warnings.iter().any(|w| w.contains("reads back as 'Макет v2'")));
    }

    #[tokio::test]
    async fn test_reread_failure_is_warning() {
        let remote = remote();
        let record = remote.create_record("db-tasks", &fields()).await.unwrap();
        remote.fail_record_reads(true);
        let verifier = PostWriteVerifier::new(remote, Duration::from_secs(5));

        let (ok, warnings) = verifier.verify(&record.id, &fields()).await;
        assert!(!ok);
        assert!(warnings[0].contains("could not re-read"));
    }
}
