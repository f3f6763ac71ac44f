use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::authorization::{AuthRecord, Role};
use crate::models::document::Document;
use crate::models::organization::Organization;
use crate::models::user::User;
use crate::models::wiki::Wiki;

pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, AppError> {
    let s = s.trim();

    // RFC3339 (e.g. 2025-11-19T12:34:56Z), which is what chrono values bind as
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // SQLite CURRENT_TIMESTAMP format, optional fractional seconds
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&naive));
    }

    // chrono's Display form for DateTime<Utc>
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f %z") {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(naive_date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let ndt = naive_date.and_hms_opt(0, 0, 0).ok_or_else(|| AppError::internal("invalid datetime: date out of range"))?;
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    Err(AppError::internal(format!("invalid datetime: {}", s)))
}

fn text(row: &SqliteRow, col: &str) -> Result<String, AppError> {
    row.try_get(col).map_err(|e| AppError::internal(format!("missing {}: {}", col, e)))
}

fn opt_text(row: &SqliteRow, col: &str) -> Result<Option<String>, AppError> {
    row.try_get(col).map_err(|e| AppError::internal(format!("missing {}: {}", col, e)))
}

fn uuid(row: &SqliteRow, col: &str) -> Result<Uuid, AppError> {
    let s = text(row, col)?;
    Uuid::parse_str(&s).map_err(|e| AppError::internal(format!("invalid uuid in {}: {}", col, e)))
}

fn opt_uuid(row: &SqliteRow, col: &str) -> Result<Option<Uuid>, AppError> {
    match opt_text(row, col)? {
        Some(s) if !s.trim().is_empty() => Uuid::parse_str(&s)
            .map(Some)
            .map_err(|e| AppError::internal(format!("invalid uuid in {}: {}", col, e))),
        _ => Ok(None),
    }
}

fn datetime(row: &SqliteRow, col: &str) -> Result<DateTime<Utc>, AppError> {
    parse_datetime(&text(row, col)?)
}

fn flag(row: &SqliteRow, col: &str) -> Result<bool, AppError> {
    let value: i64 = row.try_get(col).map_err(|e| AppError::internal(format!("missing {}: {}", col, e)))?;
    Ok(value != 0)
}

pub fn auth_record_from_row(row: &SqliteRow) -> Result<AuthRecord, AppError> {
    let role: Role = text(row, "role")?
        .parse()
        .map_err(|_| AppError::internal("authorization row carries an unknown role"))?;

    Ok(AuthRecord {
        id: uuid(row, "id")?,
        user_id: uuid(row, "user_id")?,
        organization_id: uuid(row, "organization_id")?,
        wiki_id: opt_uuid(row, "wiki_id")?,
        document_id: opt_uuid(row, "document_id")?,
        role,
        created_at: datetime(row, "created_at")?,
        updated_at: datetime(row, "updated_at")?,
    })
}

pub fn user_from_row(row: &SqliteRow) -> Result<User, AppError> {
    Ok(User {
        id: uuid(row, "id")?,
        name: text(row, "name")?,
        email: opt_text(row, "email")?,
        created_at: datetime(row, "created_at")?,
        updated_at: datetime(row, "updated_at")?,
    })
}

pub fn organization_from_row(row: &SqliteRow) -> Result<Organization, AppError> {
    Ok(Organization {
        id: uuid(row, "id")?,
        name: text(row, "name")?,
        description: opt_text(row, "description")?,
        create_user_id: uuid(row, "create_user_id")?,
        is_personal: flag(row, "is_personal")?,
        created_at: datetime(row, "created_at")?,
        updated_at: datetime(row, "updated_at")?,
    })
}

pub fn wiki_from_row(row: &SqliteRow) -> Result<Wiki, AppError> {
    Ok(Wiki {
        id: uuid(row, "id")?,
        organization_id: uuid(row, "organization_id")?,
        name: text(row, "name")?,
        description: opt_text(row, "description")?,
        create_user_id: uuid(row, "create_user_id")?,
        home_document_id: opt_uuid(row, "home_document_id")?,
        created_at: datetime(row, "created_at")?,
        updated_at: datetime(row, "updated_at")?,
    })
}

pub fn document_from_row(row: &SqliteRow) -> Result<Document, AppError> {
    Ok(Document {
        id: uuid(row, "id")?,
        organization_id: uuid(row, "organization_id")?,
        wiki_id: uuid(row, "wiki_id")?,
        parent_document_id: opt_uuid(row, "parent_document_id")?,
        title: text(row, "title")?,
        create_user_id: uuid(row, "create_user_id")?,
        is_wiki_home: flag(row, "is_wiki_home")?,
        created_at: datetime(row, "created_at")?,
        updated_at: datetime(row, "updated_at")?,
    })
}
