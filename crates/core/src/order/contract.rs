//! Signed-contract upload screening.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use dealerflow_shared::types::ContractFileId;

use super::types::{ContractFile, ContractUpload, RejectedFile, UploadOutcome};
use crate::policy::UploadPolicy;

/// Screens each offered file independently.
///
/// A file is refused if its name is blank, duplicates an earlier file in
/// the same submission or one already on the order, it is empty, it is not
/// strictly smaller than the size limit, or its type is not allowed.
/// Refusing one file never affects the others.
#[must_use]
pub fn screen_uploads(
    files: Vec<ContractUpload>,
    existing: &[ContractFile],
    policy: &UploadPolicy,
    now: DateTime<Utc>,
) -> UploadOutcome {
    let mut seen: HashSet<String> = HashSet::new();
    let on_file: HashSet<&str> = existing.iter().map(|file| file.filename.as_str()).collect();
    let mut outcome = UploadOutcome::default();

    for file in files {
        let filename = file.filename.trim().to_string();
        let reason = if filename.is_empty() {
            Some("filename is required".to_string())
        } else if !seen.insert(filename.clone()) {
            Some("duplicate filename in submission".to_string())
        } else if on_file.contains(filename.as_str()) {
            Some("a file with this name is already attached".to_string())
        } else if file.size == 0 {
            Some("file is empty".to_string())
        } else if file.size >= policy.max_file_size {
            Some(format!(
                "file size {} bytes must be below {} bytes",
                file.size, policy.max_file_size
            ))
        } else if !policy.is_mime_type_allowed(&file.content_type) {
            Some(format!("content type {} is not allowed", file.content_type))
        } else {
            None
        };

        match reason {
            Some(reason) => outcome.rejected.push(RejectedFile { filename, reason }),
            None => outcome.accepted.push(ContractFile {
                id: ContractFileId::new(),
                filename,
                content_type: file.content_type.trim().to_ascii_lowercase(),
                size: file.size,
                storage_ref: file.storage_ref,
                uploaded_at: now,
            }),
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(name: &str, content_type: &str, size: u64) -> ContractUpload {
        ContractUpload {
            filename: name.to_string(),
            content_type: content_type.to_string(),
            size,
            storage_ref: format!("contracts/{name}"),
        }
    }

    #[test]
    fn test_mixed_submission_is_partial() {
        let policy = UploadPolicy::default();
        let outcome = screen_uploads(
            vec![
                upload("signed.pdf", "application/pdf", 2_000),
                upload("photo.jpg", "image/jpeg", 3_000),
                upload("virus.exe", "application/x-msdownload", 10),
                upload("signed.pdf", "application/pdf", 2_000),
                upload("huge.pdf", "application/pdf", UploadPolicy::DEFAULT_MAX_FILE_SIZE),
            ],
            &[],
            &policy,
            Utc::now(),
        );
        assert_eq!(outcome.accepted.len(), 2);
        assert_eq!(outcome.rejected.len(), 3);
        assert_eq!(outcome.rejected[1].reason, "duplicate filename in submission");
    }

    #[test]
    fn test_size_limit_is_exclusive() {
        let policy = UploadPolicy::default();
        let outcome = screen_uploads(
            vec![
                upload("a.pdf", "application/pdf", UploadPolicy::DEFAULT_MAX_FILE_SIZE - 1),
                upload("b.pdf", "application/pdf", 0),
            ],
            &[],
            &policy,
            Utc::now(),
        );
        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(outcome.rejected[0].reason, "file is empty");
    }

    #[test]
    fn test_rejects_names_already_attached() {
        let policy = UploadPolicy::default();
        let first = screen_uploads(
            vec![upload("signed.pdf", "application/pdf", 10)],
            &[],
            &policy,
            Utc::now(),
        );
        let second = screen_uploads(
            vec![upload("signed.pdf", "application/pdf", 10)],
            &first.accepted,
            &policy,
            Utc::now(),
        );
        assert!(second.accepted.is_empty());
        assert_eq!(second.rejected.len(), 1);
    }
}
