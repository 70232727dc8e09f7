//! Artifact repository: CRUD and guarded status transitions for `artifacts`.
//!
//! Status changes are conditional updates (`... WHERE upload_status = ?`), so
//! the row itself is the single-writer gate for each transition.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use crate::model::{
    AnalysisStatus, AnalysisSummary, Artifact, DocumentMetadata, UploadStatus, VirusScanResult,
    VirusScanStatus,
};

use super::{format_timestamp, from_json, parse_timestamp, to_json, Database, DatabaseError};

fn parse_enum<T>(
    column: &'static str,
    raw: String,
    parse: fn(&str) -> Option<T>,
) -> Result<T, DatabaseError> {
    parse(&raw).ok_or(DatabaseError::UnknownValue { column, value: raw })
}

fn optional_timestamp(raw: Option<String>) -> Result<Option<DateTime<Utc>>, DatabaseError> {
    raw.as_deref().map(parse_timestamp).transpose()
}

fn optional_json<T: serde::de::DeserializeOwned>(
    column: &'static str,
    raw: Option<String>,
) -> Result<Option<T>, DatabaseError> {
    raw.as_deref().map(|s| from_json(column, s)).transpose()
}

fn artifact_from_row(row: &Row<'_>) -> Result<Artifact, DatabaseError> {
    let file_size: i64 = row.get("file_size")?;
    let surface_ids: String = row.get("surface_ids")?;
    Ok(Artifact {
        id: row.get("id")?,
        owner_id: row.get("owner_id")?,
        project_id: row.get("project_id")?,
        storage_key: row.get("storage_key")?,
        original_name: row.get("original_name")?,
        mime_type: row.get("mime_type")?,
        file_size: file_size.max(0) as u64,
        upload_status: parse_enum("upload_status", row.get("upload_status")?, UploadStatus::parse)?,
        processing_error: row.get("processing_error")?,
        analysis_status: parse_enum(
            "analysis_status",
            row.get("analysis_status")?,
            AnalysisStatus::parse,
        )?,
        analysis_error: row.get("analysis_error")?,
        virus_scan_status: parse_enum(
            "virus_scan_status",
            row.get("virus_scan_status")?,
            VirusScanStatus::parse,
        )?,
        virus_scan_result: optional_json("virus_scan_result", row.get("virus_scan_result")?)?,
        metadata: optional_json("metadata", row.get("metadata")?)?,
        analysis_results: optional_json("analysis_results", row.get("analysis_results")?)?,
        surface_ids: from_json("surface_ids", &surface_ids)?,
        surface_generation: row.get("surface_generation")?,
        job_id: row.get("job_id")?,
        created_at: parse_timestamp(&row.get::<_, String>("created_at")?)?,
        updated_at: parse_timestamp(&row.get::<_, String>("updated_at")?)?,
        processed_at: optional_timestamp(row.get("processed_at")?)?,
    })
}

pub(crate) fn find_in(conn: &Connection, id: &str) -> Result<Option<Artifact>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM artifacts WHERE id = ?1")?;
    let mut rows = stmt.query(params![id])?;
    match rows.next()? {
        Some(row) => Ok(Some(artifact_from_row(row)?)),
        None => Ok(None),
    }
}

/// Inserts a new artifact row.
pub fn insert(db: &Database, artifact: &Artifact) -> Result<(), DatabaseError> {
    let virus_scan_result = artifact
        .virus_scan_result
        .as_ref()
        .map(|v| to_json("virus_scan_result", v))
        .transpose()?;
    let metadata = artifact
        .metadata
        .as_ref()
        .map(|m| to_json("metadata", m))
        .transpose()?;
    let analysis_results = artifact
        .analysis_results
        .as_ref()
        .map(|a| to_json("analysis_results", a))
        .transpose()?;
    let surface_ids = to_json("surface_ids", &artifact.surface_ids)?;

    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO artifacts (id, owner_id, project_id, storage_key, original_name,
             mime_type, file_size, upload_status, processing_error, analysis_status,
             analysis_error, virus_scan_status, virus_scan_result, metadata, analysis_results,
             surface_ids, surface_generation, job_id, created_at, updated_at, processed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
             ?17, ?18, ?19, ?20, ?21)",
            params![
                artifact.id,
                artifact.owner_id,
                artifact.project_id,
                artifact.storage_key,
                artifact.original_name,
                artifact.mime_type,
                artifact.file_size as i64,
                artifact.upload_status.as_str(),
                artifact.processing_error,
                artifact.analysis_status.as_str(),
                artifact.analysis_error,
                artifact.virus_scan_status.as_str(),
                virus_scan_result,
                metadata,
                analysis_results,
                surface_ids,
                artifact.surface_generation,
                artifact.job_id,
                format_timestamp(artifact.created_at),
                format_timestamp(artifact.updated_at),
                artifact.processed_at.map(format_timestamp),
            ],
        )?;
        Ok(())
    })
}

/// Finds an artifact by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<Artifact>, DatabaseError> {
    db.with_conn(|conn| find_in(conn, id))
}

/// Finds an artifact only if it belongs to `owner_id`.
pub fn find_owned(
    db: &Database,
    id: &str,
    owner_id: &str,
) -> Result<Option<Artifact>, DatabaseError> {
    Ok(find_by_id(db, id)?.filter(|a| a.owner_id == owner_id))
}

/// Compare-and-swap on `upload_status`. Returns `false` if the row was not in `from`.
pub fn transition_upload(
    db: &Database,
    id: &str,
    from: UploadStatus,
    to: UploadStatus,
) -> Result<bool, DatabaseError> {
    if !from.can_transition_to(to) {
        return Err(DatabaseError::Conflict(format!(
            "upload status cannot move from '{}' to '{}'",
            from.as_str(),
            to.as_str()
        )));
    }
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE artifacts SET upload_status = ?3, updated_at = ?4
             WHERE id = ?1 AND upload_status = ?2",
            params![id, from.as_str(), to.as_str(), format_timestamp(Utc::now())],
        )?;
        Ok(changed == 1)
    })
}

pub fn set_job_id(db: &Database, id: &str, job_id: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE artifacts SET job_id = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, job_id, format_timestamp(Utc::now())],
        )?;
        Ok(())
    })
}

/// Records the scan lifecycle; `result` is set once the scan has a verdict.
pub fn record_scan(
    db: &Database,
    id: &str,
    status: VirusScanStatus,
    result: Option<&VirusScanResult>,
) -> Result<(), DatabaseError> {
    let result = result
        .map(|r| to_json("virus_scan_result", r))
        .transpose()?;
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE artifacts SET virus_scan_status = ?2,
             virus_scan_result = COALESCE(?3, virus_scan_result), updated_at = ?4
             WHERE id = ?1",
            params![id, status.as_str(), result, format_timestamp(Utc::now())],
        )?;
        Ok(())
    })
}

/// `processing → completed` with the probed metadata.
pub fn complete_upload(
    db: &Database,
    id: &str,
    metadata: &DocumentMetadata,
) -> Result<bool, DatabaseError> {
    let metadata = to_json("metadata", metadata)?;
    let now = format_timestamp(Utc::now());
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE artifacts SET upload_status = 'completed', metadata = ?2,
             processing_error = NULL, processed_at = ?3, updated_at = ?3
             WHERE id = ?1 AND upload_status = 'processing'",
            params![id, metadata, now],
        )?;
        Ok(changed == 1)
    })
}

/// `processing → failed` with the reason.
pub fn fail_upload(db: &Database, id: &str, error: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE artifacts SET upload_status = 'failed', processing_error = ?2, updated_at = ?3
             WHERE id = ?1 AND upload_status = 'processing'",
            params![id, error, format_timestamp(Utc::now())],
        )?;
        Ok(changed == 1)
    })
}

/// Moves analysis to `in_progress` on behalf of run `generation_id`.
/// Refuses unless the upload is completed and the scan is clean.
///
/// A later start supersedes an earlier one: only the run whose generation is
/// stamped on the row may finish or fail it.
pub fn start_analysis(
    db: &Database,
    id: &str,
    generation_id: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE artifacts SET analysis_status = 'in_progress', analysis_generation = ?2,
             updated_at = ?3
             WHERE id = ?1 AND upload_status = 'completed' AND virus_scan_status = 'clean'",
            params![id, generation_id, format_timestamp(Utc::now())],
        )?;
        Ok(changed == 1)
    })
}

/// Marks run `generation_id` failed. Attached surfaces and the prior summary
/// are kept. Returns `false` if the run no longer owns the record.
pub fn fail_analysis(
    db: &Database,
    id: &str,
    generation_id: &str,
    error: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE artifacts SET analysis_status = 'failed', analysis_error = ?3, updated_at = ?4
             WHERE id = ?1 AND analysis_status = 'in_progress' AND analysis_generation = ?2",
            params![id, generation_id, error, format_timestamp(Utc::now())],
        )?;
        Ok(changed == 1)
    })
}

/// Attaches a completed generation. Runs inside the caller's transaction and
/// only succeeds for the run that currently owns the record.
pub(crate) fn attach_generation(
    conn: &Connection,
    id: &str,
    generation_id: &str,
    surface_ids: &[String],
    summary: &AnalysisSummary,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE artifacts SET analysis_status = 'completed', analysis_error = NULL,
         surface_ids = ?2, surface_generation = ?3, analysis_results = ?4, updated_at = ?5
         WHERE id = ?1 AND analysis_status = 'in_progress' AND analysis_generation = ?3",
        params![
            id,
            to_json("surface_ids", &surface_ids)?,
            generation_id,
            to_json("analysis_results", summary)?,
            format_timestamp(Utc::now()),
        ],
    )?;
    Ok(changed == 1)
}

/// One page of an owner's artifacts in a project, newest first.
pub fn list_for_project(
    db: &Database,
    owner_id: &str,
    project_id: &str,
    limit: u32,
    offset: u64,
) -> Result<(Vec<Artifact>, u64), DatabaseError> {
    db.with_conn(|conn| {
        let total: u64 = conn.query_row(
            "SELECT COUNT(*) FROM artifacts WHERE owner_id = ?1 AND project_id = ?2",
            params![owner_id, project_id],
            |r| r.get(0),
        )?;

        let mut stmt = conn.prepare(
            "SELECT * FROM artifacts WHERE owner_id = ?1 AND project_id = ?2
             ORDER BY created_at DESC, id ASC LIMIT ?3 OFFSET ?4",
        )?;
        let mut rows = stmt.query(params![owner_id, project_id, limit, offset as i64])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(artifact_from_row(row)?);
        }
        Ok((items, total))
    })
}

/// Deletes the artifact and every surface it ever produced, in one transaction.
/// Returns the number of surfaces removed, or `None` if the artifact was gone.
pub fn delete_with_surfaces(db: &Database, id: &str) -> Result<Option<usize>, DatabaseError> {
    db.with_transaction(|conn| {
        let surfaces = conn.execute("DELETE FROM surfaces WHERE artifact_id = ?1", params![id])?;
        let artifacts = conn.execute("DELETE FROM artifacts WHERE id = ?1", params![id])?;
        Ok((artifacts == 1).then_some(surfaces))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MimeKind;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn sample(owner: &str, key: &str) -> Artifact {
        Artifact::new_pending(owner, "project-1", key, "plan.pdf", MimeKind::Pdf, 2048)
    }

    #[test]
    fn test_insert_and_find() {
        let db = test_db();
        let artifact = sample("owner-1", "blueprints/a.pdf");
        insert(&db, &artifact).unwrap();

        let found = find_by_id(&db, &artifact.id).unwrap().unwrap();
        assert_eq!(found.storage_key, "blueprints/a.pdf");
        assert_eq!(found.upload_status, UploadStatus::Pending);
        assert_eq!(found.file_size, 2048);
        assert!(found.surface_ids.is_empty());
        assert!(found.metadata.is_none());
    }

    #[test]
    fn test_find_owned_hides_other_owners() {
        let db = test_db();
        let artifact = sample("owner-1", "blueprints/a.pdf");
        insert(&db, &artifact).unwrap();

        assert!(find_owned(&db, &artifact.id, "owner-1").unwrap().is_some());
        assert!(find_owned(&db, &artifact.id, "owner-2").unwrap().is_none());
    }

    #[test]
    fn test_transition_is_compare_and_swap() {
        let db = test_db();
        let artifact = sample("o", "blueprints/a.pdf");
        insert(&db, &artifact).unwrap();

        assert!(
            transition_upload(&db, &artifact.id, UploadStatus::Pending, UploadStatus::Processing)
                .unwrap()
        );
        assert!(
            !transition_upload(&db, &artifact.id, UploadStatus::Pending, UploadStatus::Processing)
                .unwrap()
        );
        assert!(matches!(
            transition_upload(&db, &artifact.id, UploadStatus::Pending, UploadStatus::Completed),
            Err(DatabaseError::Conflict(_))
        ));
    }

    #[test]
    fn test_intake_updates() {
        let db = test_db();
        let artifact = sample("o", "blueprints/a.pdf");
        insert(&db, &artifact).unwrap();
        transition_upload(&db, &artifact.id, UploadStatus::Pending, UploadStatus::Processing)
            .unwrap();

        let verdict = VirusScanResult {
            scanned_at: Utc::now(),
            is_clean: true,
            threat_details: None,
        };
        record_scan(&db, &artifact.id, VirusScanStatus::Clean, Some(&verdict)).unwrap();
        let metadata = DocumentMetadata {
            page_count: Some(2),
            ..Default::default()
        };
        assert!(complete_upload(&db, &artifact.id, &metadata).unwrap());
        assert!(!complete_upload(&db, &artifact.id, &metadata).unwrap());

        let found = find_by_id(&db, &artifact.id).unwrap().unwrap();
        assert_eq!(found.upload_status, UploadStatus::Completed);
        assert_eq!(found.virus_scan_status, VirusScanStatus::Clean);
        assert_eq!(found.metadata.unwrap().page_count, Some(2));
        assert!(found.virus_scan_result.unwrap().is_clean);
        assert!(found.processed_at.is_some());
    }

    #[test]
    fn test_start_analysis_requires_completed_clean_upload() {
        let db = test_db();
        let artifact = sample("o", "blueprints/a.pdf");
        insert(&db, &artifact).unwrap();
        assert!(!start_analysis(&db, &artifact.id, "gen-1").unwrap());

        transition_upload(&db, &artifact.id, UploadStatus::Pending, UploadStatus::Processing)
            .unwrap();
        complete_upload(&db, &artifact.id, &DocumentMetadata::default()).unwrap();
        assert!(!start_analysis(&db, &artifact.id, "gen-1").unwrap());

        record_scan(&db, &artifact.id, VirusScanStatus::Clean, None).unwrap();
        assert!(start_analysis(&db, &artifact.id, "gen-1").unwrap());
        let found = find_by_id(&db, &artifact.id).unwrap().unwrap();
        assert_eq!(found.analysis_status, AnalysisStatus::InProgress);
    }

    #[test]
    fn test_superseded_run_cannot_fail_analysis() {
        let db = test_db();
        let artifact = sample("o", "blueprints/a.pdf");
        insert(&db, &artifact).unwrap();
        transition_upload(&db, &artifact.id, UploadStatus::Pending, UploadStatus::Processing)
            .unwrap();
        complete_upload(&db, &artifact.id, &DocumentMetadata::default()).unwrap();
        record_scan(&db, &artifact.id, VirusScanStatus::Clean, None).unwrap();

        assert!(start_analysis(&db, &artifact.id, "gen-1").unwrap());
        assert!(start_analysis(&db, &artifact.id, "gen-2").unwrap());
        assert!(!fail_analysis(&db, &artifact.id, "gen-1", "stale").unwrap());
        let found = find_by_id(&db, &artifact.id).unwrap().unwrap();
        assert_eq!(found.analysis_status, AnalysisStatus::InProgress);
        assert!(found.analysis_error.is_none());

        assert!(fail_analysis(&db, &artifact.id, "gen-2", "detector down").unwrap());
        assert!(!fail_analysis(&db, &artifact.id, "gen-2", "again").unwrap());
        let found = find_by_id(&db, &artifact.id).unwrap().unwrap();
        assert_eq!(found.analysis_status, AnalysisStatus::Failed);
        assert_eq!(found.analysis_error.as_deref(), Some("detector down"));
    }

    #[test]
    fn test_fail_upload_records_error() {
        let db = test_db();
        let artifact = sample("o", "blueprints/a.pdf");
        insert(&db, &artifact).unwrap();
        assert!(!fail_upload(&db, &artifact.id, "object not found").unwrap());

        transition_upload(&db, &artifact.id, UploadStatus::Pending, UploadStatus::Processing)
            .unwrap();
        assert!(fail_upload(&db, &artifact.id, "object not found").unwrap());
        let found = find_by_id(&db, &artifact.id).unwrap().unwrap();
        assert_eq!(found.upload_status, UploadStatus::Failed);
        assert_eq!(found.processing_error.as_deref(), Some("object not found"));
    }

    #[test]
    fn test_list_paginates_newest_first() {
        let db = test_db();
        for i in 0..5 {
            let mut artifact = sample("owner-1", &format!("blueprints/{i}.pdf"));
            artifact.created_at = DateTime::parse_from_rfc3339(&format!("2026-01-0{}T00:00:00Z", i + 1))
                .unwrap()
                .with_timezone(&Utc);
            insert(&db, &artifact).unwrap();
        }
        insert(&db, &sample("owner-2", "blueprints/other.pdf")).unwrap();

        let (page, total) = list_for_project(&db, "owner-1", "project-1", 2, 0).unwrap();
        assert_eq!(total, 5);
        let keys: Vec<_> = page.iter().map(|a| a.storage_key.as_str()).collect();
        assert_eq!(keys, vec!["blueprints/4.pdf", "blueprints/3.pdf"]);

        let (last, _) = list_for_project(&db, "owner-1", "project-1", 2, 4).unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].storage_key, "blueprints/0.pdf");
    }

    #[test]
    fn test_delete_missing_returns_none() {
        let db = test_db();
        assert_eq!(delete_with_surfaces(&db, "missing").unwrap(), None);

        let artifact = sample("o", "blueprints/a.pdf");
        insert(&db, &artifact).unwrap();
        assert_eq!(delete_with_surfaces(&db, &artifact.id).unwrap(), Some(0));
        assert!(find_by_id(&db, &artifact.id).unwrap().is_none());
    }
}
