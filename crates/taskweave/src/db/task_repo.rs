//! Task repository: CRUD operations for the `tasks` table.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A raw task row from the database. Timestamps are fixed-width RFC 3339,
/// `origin_event_ids` is a JSON array.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRow {
    pub id: String,
    pub org_id: String,
    pub project_id: String,
    pub title: String,
    pub description: String,
    pub status: String,
    pub priority: String,
    pub priority_rank: i64,
    pub source: String,
    pub assignee: String,
    pub due_token: Option<String>,
    pub due_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub origin_event_ids: String,
}

impl TaskRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            org_id: row.get("org_id")?,
            project_id: row.get("project_id")?,
            title: row.get("title")?,
            description: row.get("description")?,
            status: row.get("status")?,
            priority: row.get("priority")?,
            priority_rank: row.get("priority_rank")?,
            source: row.get("source")?,
            assignee: row.get("assignee")?,
            due_token: row.get("due_token")?,
            due_date: row.get("due_date")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            origin_event_ids: row.get("origin_event_ids")?,
        })
    }
}

/// Query filter for task listing. Empty fields match everything.
#[derive(Debug, Default, Clone)]
pub struct TaskQuery {
    pub org_id: Option<String>,
    pub project_id: Option<String>,
    pub statuses: Vec<String>,
    pub updated_since: Option<String>,
    pub limit: Option<u64>,
}

/// Inserts a new task row.
pub fn insert(db: &Database, task: &TaskRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO tasks (id, org_id, project_id, title, description, status, priority,
             priority_rank, source, assignee, due_token, due_date, created_at, updated_at,
             origin_event_ids)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                task.id,
                task.org_id,
                task.project_id,
                task.title,
                task.description,
                task.status,
                task.priority,
                task.priority_rank,
                task.source,
                task.assignee,
                task.due_token,
                task.due_date,
                task.created_at,
                task.updated_at,
                task.origin_event_ids,
            ],
        )?;
        Ok(())
    })
}

/// Overwrites a task only if its stored `updated_at` still equals
/// `expected_updated_at`. Returns whether a row was written.
pub fn compare_and_update(
    db: &Database,
    task: &TaskRow,
    expected_updated_at: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE tasks SET title=?2, description=?3, status=?4, priority=?5, priority_rank=?6,
             assignee=?7, due_token=?8, due_date=?9, updated_at=?10, origin_event_ids=?11
             WHERE id=?1 AND updated_at=?12",
            params![
                task.id,
                task.title,
                task.description,
                task.status,
                task.priority,
                task.priority_rank,
                task.assignee,
                task.due_token,
                task.due_date,
                task.updated_at,
                task.origin_event_ids,
                expected_updated_at,
            ],
        )?;
        Ok(changed == 1)
    })
}

/// Finds a task by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<TaskRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM tasks WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], TaskRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Queries tasks, most recently updated first.
pub fn query(db: &Database, filter: &TaskQuery) -> Result<Vec<TaskRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions = Vec::new();
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(ref org_id) = filter.org_id {
            conditions.push(format!("org_id = ?{}", param_values.len() + 1));
            param_values.push(Box::new(org_id.clone()));
        }
        if let Some(ref project_id) = filter.project_id {
            conditions.push(format!("project_id = ?{}", param_values.len() + 1));
            param_values.push(Box::new(project_id.clone()));
        }
        if !filter.statuses.is_empty() {
            let mut placeholders = Vec::with_capacity(filter.statuses.len());
            for status in &filter.statuses {
                placeholders.push(format!("?{}", param_values.len() + 1));
                param_values.push(Box::new(status.clone()));
            }
            conditions.push(format!("status IN ({})", placeholders.join(", ")));
        }
        if let Some(ref since) = filter.updated_since {
            conditions.push(format!("updated_at >= ?{}", param_values.len() + 1));
            param_values.push(Box::new(since.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);
        param_values.push(Box::new(limit));
        let query_sql = format!(
            "SELECT * FROM tasks {} ORDER BY updated_at DESC LIMIT ?{}",
            where_clause,
            param_values.len()
        );

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&query_sql)?;
        let rows: Vec<TaskRow> = stmt
            .query_map(params_ref.as_slice(), TaskRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    })
}

/// Tasks in a project whose `origin_event_ids` contains `event_id`, any status.
pub fn find_by_origin_event(
    db: &Database,
    org_id: &str,
    project_id: &str,
    event_id: &str,
) -> Result<Vec<TaskRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM tasks
             WHERE org_id = ?1 AND project_id = ?2
               AND EXISTS (SELECT 1 FROM json_each(tasks.origin_event_ids) WHERE value = ?3)",
        )?;
        let rows = stmt
            .query_map(params![org_id, project_id, event_id], TaskRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Updates only the status and updated_at of a task. Returns whether the task exists.
pub fn update_status(
    db: &Database,
    id: &str,
    status: &str,
    updated_at: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE tasks SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status, updated_at],
        )?;
        Ok(changed == 1)
    })
}

pub fn delete(db: &Database, id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        Ok(changed == 1)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn sample_task(id: &str) -> TaskRow {
        TaskRow {
            id: id.to_string(),
            org_id: "org".to_string(),
            project_id: "proj".to_string(),
            title: "fix the login bug".to_string(),
            description: "We need to fix the login bug.".to_string(),
            status: "open".to_string(),
            priority: "medium".to_string(),
            priority_rank: 1,
            source: "slack".to_string(),
            assignee: "unassigned".to_string(),
            due_token: None,
            due_date: None,
            created_at: "2026-01-01T00:00:00.000000000Z".to_string(),
            updated_at: "2026-01-01T00:00:00.000000000Z".to_string(),
            origin_event_ids: r#"["e1"]"#.to_string(),
        }
    }

    #[test]
    fn test_insert_and_find() {
        let db = test_db();
        insert(&db, &sample_task("t1")).unwrap();

        let found = find_by_id(&db, "t1").unwrap().unwrap();
        assert_eq!(found, sample_task("t1"));
        assert!(find_by_id(&db, "missing").unwrap().is_none());
    }

    #[test]
    fn test_compare_and_update_checks_token() {
        let db = test_db();
        let original = sample_task("t2");
        insert(&db, &original).unwrap();

        let mut updated = original.clone();
        updated.priority = "high".to_string();
        updated.updated_at = "2026-01-01T00:00:01.000000000Z".to_string();

        assert!(compare_and_update(&db, &updated, &original.updated_at).unwrap());
        // The stored token moved on, so a second writer holding the old one loses.
        assert!(!compare_and_update(&db, &updated, &original.updated_at).unwrap());

        let found = find_by_id(&db, "t2").unwrap().unwrap();
        assert_eq!(found.priority, "high");
    }

    #[test]
    fn test_query_filters() {
        let db = test_db();
        insert(&db, &sample_task("a")).unwrap();

        let mut done = sample_task("b");
        done.status = "done".to_string();
        done.updated_at = "2026-01-02T00:00:00.000000000Z".to_string();
        insert(&db, &done).unwrap();

        let mut other_project = sample_task("c");
        other_project.project_id = "other".to_string();
        insert(&db, &other_project).unwrap();

        let rows = query(
            &db,
            &TaskQuery {
                org_id: Some("org".to_string()),
                project_id: Some("proj".to_string()),
                statuses: vec!["open".to_string(), "in_progress".to_string()],
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "a");

        let rows = query(
            &db,
            &TaskQuery {
                updated_since: Some("2026-01-01T12:00:00.000000000Z".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "b");

        let rows = query(
            &db,
            &TaskQuery {
                limit: Some(2),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_find_by_origin_event() {
        let db = test_db();
        let mut task = sample_task("o1");
        task.status = "done".to_string();
        task.origin_event_ids = r#"["e1","e7"]"#.to_string();
        insert(&db, &task).unwrap();
        insert(&db, &sample_task("o2")).unwrap();

        let rows = find_by_origin_event(&db, "org", "proj", "e7").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "o1");
        assert!(find_by_origin_event(&db, "org", "other", "e7")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_update_status_and_delete() {
        let db = test_db();
        insert(&db, &sample_task("d1")).unwrap();

        assert!(update_status(&db, "d1", "done", "2026-01-03T00:00:00.000000000Z").unwrap());
        assert_eq!(find_by_id(&db, "d1").unwrap().unwrap().status, "done");
        assert!(!update_status(&db, "nope", "done", "2026-01-03T00:00:00.000000000Z").unwrap());

        assert!(delete(&db, "d1").unwrap());
        assert!(!delete(&db, "d1").unwrap());
        assert!(find_by_id(&db, "d1").unwrap().is_none());
    }
}
