//! Artifact classification: push produced files to the object store and
//! collect their descriptors.

use harvest_state::{AgencyMonthlyInfo, BackupDescriptor, ObjectStore};
use tracing::debug;

use crate::error::{IngestError, Result};
use crate::obs;
use crate::report::ExecutionReport;

/// Descriptors for whatever the run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Artifacts {
    pub package: Option<BackupDescriptor>,
    pub backups: Option<Vec<BackupDescriptor>>,
}

impl Artifacts {
    pub fn is_empty(&self) -> bool {
        self.package.is_none() && self.backups.is_none()
    }

    /// Move the descriptors onto `record`.
    pub fn attach_to(self, record: &mut AgencyMonthlyInfo) {
        record.package = self.package;
        record.backups = self.backups;
    }
}

/// Upload the package and back up the raw files listed in `report`.
///
/// The package goes first; if it fails nothing else is attempted. A report
/// with neither makes no object-store call.
pub async fn classify_artifacts(
    report: &ExecutionReport,
    agency_id: &str,
    objects: &dyn ObjectStore,
) -> Result<Artifacts> {
    let mut artifacts = Artifacts::default();

    if let Some(path) = report.package_path() {
        let descriptor = objects
            .upload_file(path, agency_id)
            .await
            .map_err(|source| IngestError::Upload {
                path: path.to_path_buf(),
                source,
            })?;
        obs::emit_artifact_uploaded("package", &descriptor.url, descriptor.size);
        artifacts.package = Some(descriptor);
    }

    let files = report.file_paths();
    if !files.is_empty() {
        let descriptors =
            objects
                .backup(&files, agency_id)
                .await
                .map_err(|source| IngestError::Backup {
                    count: files.len(),
                    source,
                })?;
        for d in &descriptors {
            obs::emit_artifact_uploaded("backup", &d.url, d.size);
        }
        artifacts.backups = Some(descriptors);
    }

    if artifacts.is_empty() {
        debug!("No artifacts to upload");
    }
    Ok(artifacts)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use harvest_state::fakes::MemoryObjectStore;

    use super::*;

    fn report(package: Option<&str>, files: &[&str]) -> ExecutionReport {
        ExecutionReport {
            package: package.map(str::to_string),
            files: files.iter().map(|f| f.to_string()).collect(),
            ..ExecutionReport::default()
        }
    }

    #[tokio::test]
    async fn nothing_to_upload_makes_no_calls() {
        let objects = MemoryObjectStore::new();
        let artifacts = classify_artifacts(&report(Some(""), &[]), "trt13", &objects)
            .await
            .unwrap();

        assert!(artifacts.is_empty());
        assert_eq!(objects.total_calls(), 0);
    }

    #[tokio::test]
    async fn package_and_files_are_uploaded() {
        let objects = MemoryObjectStore::new();
        let artifacts = classify_artifacts(
            &report(Some("/out/pkg.zip"), &["/out/2.html", "/out/1.html"]),
            "TRT13",
            &objects,
        )
        .await
        .unwrap();

        assert_eq!(
            artifacts.package.as_ref().map(|d| d.url.as_str()),
            Some("mem://trt13/pkg.zip")
        );
        let urls: Vec<_> = artifacts
            .backups
            .as_ref()
            .unwrap()
            .iter()
            .map(|d| d.url.as_str())
            .collect();
        assert_eq!(urls, ["mem://trt13/2.html", "mem://trt13/1.html"]);
        assert_eq!(objects.upload_calls(), 1);
        assert_eq!(objects.backup_calls(), 1);
    }

    #[tokio::test]
    async fn package_failure_is_upload_error() {
        let objects = MemoryObjectStore::failing();
        let err = classify_artifacts(
            &report(Some("/out/pkg.zip"), &["/out/a.html"]),
            "trt13",
            &objects,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, IngestError::Upload { .. }));
        assert_eq!(objects.backup_calls(), 0);
    }

    #[tokio::test]
    async fn file_failure_is_backup_error() {
        let objects = MemoryObjectStore::failing();
        let err = classify_artifacts(&report(None, &["/out/a.html"]), "trt13", &objects)
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Backup { count: 1, .. }));
    }

    #[test]
    fn attach_moves_descriptors_onto_record() {
        let mut record = AgencyMonthlyInfo::new("trt13", 1, 2020, Utc::now());
        Artifacts {
            package: Some(BackupDescriptor::for_bytes("mem://p", b"p")),
            backups: Some(vec![]),
        }
        .attach_to(&mut record);

        assert!(record.package.is_some());
        assert_eq!(record.backups, Some(vec![]));
    }
}
