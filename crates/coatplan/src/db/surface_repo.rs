//! Surface repository.
//!
//! Surfaces are written once per analysis generation and never mutated in
//! place by a re-analysis; only cost recalculation updates a row.

use chrono::Utc;
use rusqlite::{params, Connection, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::model::{AnalysisSummary, CostEstimates, Surface, SurfaceStatus};

use super::{
    artifact_repo, format_timestamp, from_json, parse_timestamp, to_json, Database, DatabaseError,
};

/// Stores a unit-like enum as its bare serde string.
fn enum_to_sql<T: Serialize>(column: &'static str, value: &T) -> Result<String, DatabaseError> {
    match serde_json::to_value(value).map_err(|source| DatabaseError::Json { column, source })? {
        serde_json::Value::String(s) => Ok(s),
        other => Ok(other.to_string()),
    }
}

fn enum_from_sql<T: DeserializeOwned>(column: &'static str, raw: String) -> Result<T, DatabaseError> {
    serde_json::from_value(serde_json::Value::String(raw.clone()))
        .map_err(|_| DatabaseError::UnknownValue { column, value: raw })
}

fn surface_from_row(row: &Row<'_>) -> Result<Surface, DatabaseError> {
    let status: String = row.get("status")?;
    let last_analyzed_at: Option<String> = row.get("last_analyzed_at")?;
    Ok(Surface {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        artifact_id: row.get("artifact_id")?,
        generation_id: row.get("generation_id")?,
        area_number: row.get("area_number")?,
        surface_type: enum_from_sql("surface_type", row.get("surface_type")?)?,
        material: row.get::<_, String>("material")?.into(),
        condition: enum_from_sql("condition", row.get("condition")?)?,
        dimensions: from_json("dimensions", &row.get::<_, String>("dimensions")?)?,
        location: from_json("location", &row.get::<_, String>("location")?)?,
        treatment_type: enum_from_sql("treatment_type", row.get("treatment_type")?)?,
        surface_preparation: from_json(
            "surface_preparation",
            &row.get::<_, String>("surface_preparation")?,
        )?,
        cost_estimates: from_json("cost_estimates", &row.get::<_, String>("cost_estimates")?)?,
        analysis_confidence: row.get("analysis_confidence")?,
        adjacent_areas: from_json("adjacent_areas", &row.get::<_, String>("adjacent_areas")?)?,
        status: SurfaceStatus::parse(&status).ok_or(DatabaseError::UnknownValue {
            column: "status",
            value: status.clone(),
        })?,
        last_analyzed_at: last_analyzed_at.as_deref().map(parse_timestamp).transpose()?,
        created_at: parse_timestamp(&row.get::<_, String>("created_at")?)?,
    })
}

fn insert_in(conn: &Connection, surface: &Surface) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO surfaces (id, project_id, artifact_id, generation_id, area_number,
         surface_type, material, condition, dimensions, location, treatment_type,
         surface_preparation, cost_estimates, analysis_confidence, adjacent_areas, status,
         last_analyzed_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
        params![
            surface.id,
            surface.project_id,
            surface.artifact_id,
            surface.generation_id,
            surface.area_number,
            enum_to_sql("surface_type", &surface.surface_type)?,
            surface.material.as_str(),
            enum_to_sql("condition", &surface.condition)?,
            to_json("dimensions", &surface.dimensions)?,
            to_json("location", &surface.location)?,
            surface.treatment_type.as_str(),
            to_json("surface_preparation", &surface.surface_preparation)?,
            to_json("cost_estimates", &surface.cost_estimates)?,
            surface.analysis_confidence,
            to_json("adjacent_areas", &surface.adjacent_areas)?,
            surface.status.as_str(),
            surface.last_analyzed_at.map(format_timestamp),
            format_timestamp(surface.created_at),
        ],
    )?;
    Ok(())
}

/// Another artifact in the same project whose attached generation already uses `area_number`.
fn attached_owner_of_area(
    conn: &Connection,
    project_id: &str,
    artifact_id: &str,
    area_number: &str,
) -> Result<Option<String>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT s.artifact_id FROM surfaces s
         JOIN artifacts a ON a.id = s.artifact_id AND a.surface_generation = s.generation_id
         WHERE s.project_id = ?1 AND s.artifact_id != ?2 AND s.area_number = ?3
         LIMIT 1",
    )?;
    let mut rows = stmt.query(params![project_id, artifact_id, area_number])?;
    match rows.next()? {
        Some(row) => Ok(Some(row.get(0)?)),
        None => Ok(None),
    }
}

/// Persists one complete generation and attaches it to its artifact, atomically.
///
/// Fails with `Conflict` (and writes nothing) when an area number is already
/// attached to another artifact of the project, or when the artifact is no
/// longer `in_progress`.
pub fn commit_generation(
    db: &Database,
    artifact_id: &str,
    generation_id: &str,
    surfaces: &[Surface],
    summary: &AnalysisSummary,
) -> Result<(), DatabaseError> {
    db.with_transaction(|conn| {
        for surface in surfaces {
            if let Some(other) =
                attached_owner_of_area(conn, &surface.project_id, artifact_id, &surface.area_number)?
            {
                return Err(DatabaseError::Conflict(format!(
                    "area number '{}' is already used by artifact {} in project {}",
                    surface.area_number, other, surface.project_id
                )));
            }
            insert_in(conn, surface)?;
        }

        let ids: Vec<String> = surfaces.iter().map(|s| s.id.clone()).collect();
        if !artifact_repo::attach_generation(conn, artifact_id, generation_id, &ids, summary)? {
            return Err(DatabaseError::Conflict(format!(
                "analysis run {} no longer owns artifact {}",
                generation_id, artifact_id
            )));
        }
        Ok(())
    })
}

/// Finds a surface by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<Surface>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM surfaces WHERE id = ?1")?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(surface_from_row(row)?)),
            None => Ok(None),
        }
    })
}

/// Surfaces of one generation, in area-number order.
pub fn list_by_generation(
    db: &Database,
    artifact_id: &str,
    generation_id: &str,
) -> Result<Vec<Surface>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM surfaces WHERE artifact_id = ?1 AND generation_id = ?2
             ORDER BY area_number ASC",
        )?;
        let mut rows = stmt.query(params![artifact_id, generation_id])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(surface_from_row(row)?);
        }
        Ok(out)
    })
}

/// Every surface row referencing the artifact, across all generations.
pub fn count_by_artifact(db: &Database, artifact_id: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM surfaces WHERE artifact_id = ?1",
            params![artifact_id],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Overwrites the derived cost columns of one surface.
pub fn update_costs(
    db: &Database,
    id: &str,
    costs: &CostEstimates,
) -> Result<bool, DatabaseError> {
    let costs = to_json("cost_estimates", costs)?;
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE surfaces SET cost_estimates = ?2, last_analyzed_at = ?3 WHERE id = ?1",
            params![id, costs, format_timestamp(Utc::now())],
        )?;
        Ok(changed == 1)
    })
}
