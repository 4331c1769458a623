use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::Local;
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::error::{PosError, PosResult};
use crate::models::{NewStaff, Staff, StaffRole};

/// The authenticated actor, passed explicitly to privileged operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub staff_id: i64,
    pub username: String,
    pub role: StaffRole,
}

impl Session {
    pub fn require_manager(&self, action: &str) -> PosResult<()> {
        if self.role.is_manager() {
            Ok(())
        } else {
            tracing::warn!(staff = %self.username, role = %self.role, action, "permission denied");
            Err(PosError::Unauthorized(format!(
                "{} is not allowed to {}",
                self.role, action
            )))
        }
    }
}

fn hash_password(password: &str) -> PosResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PosError::invalid(format!("cannot hash password: {}", e)))?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

pub fn create_staff(db: &Database, staff: NewStaff) -> PosResult<Staff> {
    let username = staff.username.trim();
    if username.is_empty() {
        return Err(PosError::invalid("username must not be empty"));
    }
    if staff.password.len() < 4 {
        return Err(PosError::invalid("password must be at least 4 characters"));
    }

    let password_hash = hash_password(&staff.password)?;
    let created_at = Local::now().naive_local();

    let conn = db.conn()?;
    conn.execute(
        "INSERT INTO staff (username, display_name, password_hash, role, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![username, staff.display_name, password_hash, staff.role, created_at],
    )?;

    Ok(Staff {
        id: conn.last_insert_rowid(),
        username: username.to_string(),
        display_name: staff.display_name,
        role: staff.role,
        created_at,
    })
}

pub fn list_staff(db: &Database) -> PosResult<Vec<Staff>> {
    let conn = db.conn()?;

    let mut stmt = conn.prepare(
        "SELECT id, username, display_name, role, created_at FROM staff ORDER BY display_name",
    )?;
    let staff = stmt
        .query_map([], |row| {
            Ok(Staff {
                id: row.get(0)?,
                username: row.get(1)?,
                display_name: row.get(2)?,
                role: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(staff)
}

/// Check credentials. A wrong password or unknown user yields `None`.
pub fn authenticate(db: &Database, username: &str, password: &str) -> PosResult<Option<Session>> {
    let conn = db.conn()?;

    let found: Option<(i64, String, StaffRole)> = conn
        .query_row(
            "SELECT id, password_hash, role FROM staff WHERE username = ?1",
            [username.trim()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    match found {
        Some((staff_id, hash, role)) if verify_password(password, &hash) => {
            tracing::info!(staff = username, %role, "staff signed in");
            Ok(Some(Session {
                staff_id,
                username: username.trim().to_string(),
                role,
            }))
        }
        _ => {
            tracing::warn!(staff = username, "sign-in rejected");
            Ok(None)
        }
    }
}
