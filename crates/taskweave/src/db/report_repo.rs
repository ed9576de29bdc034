//! Report repository: insert and lookup for the `reports` table.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};

#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub id: String,
    pub org_id: String,
    pub project_id: Option<String>,
    pub report_type: String,
    pub period_start: String,
    pub period_end: String,
    pub generated_at: String,
    /// JSON-encoded summary.
    pub summary: String,
}

impl ReportRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            org_id: row.get("org_id")?,
            project_id: row.get("project_id")?,
            report_type: row.get("report_type")?,
            period_start: row.get("period_start")?,
            period_end: row.get("period_end")?,
            generated_at: row.get("generated_at")?,
            summary: row.get("summary")?,
        })
    }
}

pub fn insert(db: &Database, report: &ReportRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO reports (id, org_id, project_id, report_type, period_start, period_end,
             generated_at, summary)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                report.id,
                report.org_id,
                report.project_id,
                report.report_type,
                report.period_start,
                report.period_end,
                report.generated_at,
                report.summary,
            ],
        )?;
        Ok(())
    })
}

pub fn find_by_id(db: &Database, id: &str) -> Result<Option<ReportRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM reports WHERE id = ?1",
                params![id],
                ReportRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Most recent report of a type for an org (and project, `None` = org-wide)
/// generated at or after `since`.
pub fn find_latest(
    db: &Database,
    org_id: &str,
    project_id: Option<&str>,
    report_type: &str,
    since: &str,
) -> Result<Option<ReportRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM reports
                 WHERE org_id = ?1 AND project_id IS ?2 AND report_type = ?3 AND generated_at >= ?4
                 ORDER BY generated_at DESC LIMIT 1",
                params![org_id, project_id, report_type, since],
                ReportRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report(id: &str, generated_at: &str) -> ReportRow {
        ReportRow {
            id: id.to_string(),
            org_id: "org".to_string(),
            project_id: None,
            report_type: "daily".to_string(),
            period_start: "2026-01-01T00:00:00.000000000Z".to_string(),
            period_end: "2026-01-02T00:00:00.000000000Z".to_string(),
            generated_at: generated_at.to_string(),
            summary: "{}".to_string(),
        }
    }

    #[test]
    fn test_insert_and_find() {
        let db = Database::open_in_memory().unwrap();
        let report = sample_report("r1", "2026-01-02T00:00:00.000000000Z");
        insert(&db, &report).unwrap();
        assert_eq!(find_by_id(&db, "r1").unwrap(), Some(report));
        assert_eq!(find_by_id(&db, "r2").unwrap(), None);
    }

    #[test]
    fn test_find_latest_respects_scope_and_since() {
        let db = Database::open_in_memory().unwrap();
        insert(&db, &sample_report("old", "2026-01-01T18:00:00.000000000Z")).unwrap();
        insert(&db, &sample_report("new", "2026-01-02T18:00:00.000000000Z")).unwrap();

        let mut scoped = sample_report("proj", "2026-01-03T18:00:00.000000000Z");
        scoped.project_id = Some("p1".to_string());
        insert(&db, &scoped).unwrap();

        let latest = find_latest(&db, "org", None, "daily", "2026-01-01T00:00:00.000000000Z")
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, "new");

        let latest = find_latest(&db, "org", Some("p1"), "daily", "2026-01-01T00:00:00.000000000Z")
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, "proj");

        assert!(
            find_latest(&db, "org", None, "daily", "2026-01-05T00:00:00.000000000Z")
                .unwrap()
                .is_none()
        );
    }
}
