use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{fmt_ts, parse_ts};
use crate::db::StoreError;
use crate::models::Account;

pub fn insert_account(conn: &Connection, account: &Account) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO accounts (id, email, password_hash, display_name,
         is_active, is_verified, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            account.id.to_string(),
            account.email,
            account.password_hash,
            account.display_name,
            account.is_active as i32,
            account.is_verified as i32,
            fmt_ts(account.created_at),
            fmt_ts(account.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_account(conn: &Connection, id: &Uuid) -> Result<Option<Account>, StoreError> {
    query_account(conn, "id = ?1", params![id.to_string()])
}

pub fn get_account_by_email(
    conn: &Connection,
    email: &str,
) -> Result<Option<Account>, StoreError> {
    query_account(conn, "email = ?1 COLLATE NOCASE", params![email])
}

/// Flip the verified flag. Verification itself (email round trip) is
/// out of scope; this is the hook the verification flow lands on.
pub fn set_account_verified(
    conn: &Connection,
    id: &Uuid,
    verified: bool,
) -> Result<bool, StoreError> {
    let changed = conn.execute(
        "UPDATE accounts SET is_verified = ?1, updated_at = datetime('now')
         WHERE id = ?2",
        params![verified as i32, id.to_string()],
    )?;
    Ok(changed > 0)
}

pub fn set_account_active(
    conn: &Connection,
    id: &Uuid,
    active: bool,
) -> Result<bool, StoreError> {
    let changed = conn.execute(
        "UPDATE accounts SET is_active = ?1, updated_at = datetime('now')
         WHERE id = ?2",
        params![active as i32, id.to_string()],
    )?;
    Ok(changed > 0)
}

fn query_account(
    conn: &Connection,
    predicate: &str,
    args: impl rusqlite::Params,
) -> Result<Option<Account>, StoreError> {
    let sql = format!(
        "SELECT id, email, password_hash, display_name, is_active, is_verified,
                created_at, updated_at
         FROM accounts WHERE {predicate}"
    );
    let mut stmt = conn.prepare(&sql)?;

    let result = stmt.query_row(args, |row| {
        Ok(AccountRow {
            id: row.get::<_, String>(0)?,
            email: row.get::<_, String>(1)?,
            password_hash: row.get::<_, String>(2)?,
            display_name: row.get::<_, String>(3)?,
            is_active: row.get::<_, i32>(4)?,
            is_verified: row.get::<_, i32>(5)?,
            created_at: row.get::<_, String>(6)?,
            updated_at: row.get::<_, String>(7)?,
        })
    });

    match result {
        Ok(row) => Ok(Some(account_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

struct AccountRow {
    id: String,
    email: String,
    password_hash: String,
    display_name: String,
    is_active: i32,
    is_verified: i32,
    created_at: String,
    updated_at: String,
}

fn account_from_row(row: AccountRow) -> Result<Account, StoreError> {
    Ok(Account {
        id: Uuid::parse_str(&row.id)
            .map_err(|e| StoreError::ConstraintViolation(e.to_string()))?,
        email: row.email,
        password_hash: row.password_hash,
        display_name: row.display_name,
        is_active: row.is_active != 0,
        is_verified: row.is_verified != 0,
        created_at: parse_ts(&row.created_at),
        updated_at: parse_ts(&row.updated_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use chrono::Utc;

    fn sample_account(email: &str) -> Account {
        let now = Utc::now();
        Account {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: "$pbkdf2-sha256$stub".to_string(),
            display_name: "Sam Student".to_string(),
            is_active: true,
            is_verified: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn insert_and_fetch_by_id() {
        let conn = open_memory_database().unwrap();
        let account = sample_account("sam@campus.edu");
        insert_account(&conn, &account).unwrap();

        let fetched = get_account(&conn, &account.id).unwrap().unwrap();
        assert_eq!(fetched.email, "sam@campus.edu");
        assert!(fetched.is_active);
        assert!(!fetched.is_verified);
    }

    #[test]
    fn fetch_by_email_is_case_insensitive() {
        let conn = open_memory_database().unwrap();
        let account = sample_account("sam@campus.edu");
        insert_account(&conn, &account).unwrap();

        let fetched = get_account_by_email(&conn, "SAM@Campus.EDU").unwrap();
        assert!(fetched.is_some());
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let conn = open_memory_database().unwrap();
        insert_account(&conn, &sample_account("sam@campus.edu")).unwrap();

        let err = insert_account(&conn, &sample_account("sam@campus.edu")).unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[test]
    fn missing_account_is_none() {
        let conn = open_memory_database().unwrap();
        assert!(get_account(&conn, &Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn verified_flag_updates() {
        let conn = open_memory_database().unwrap();
        let account = sample_account("sam@campus.edu");
        insert_account(&conn, &account).unwrap();

        assert!(set_account_verified(&conn, &account.id, true).unwrap());
        let fetched = get_account(&conn, &account.id).unwrap().unwrap();
        assert!(fetched.is_verified);
    }

    #[test]
    fn deactivation_updates() {
        let conn = open_memory_database().unwrap();
        let account = sample_account("sam@campus.edu");
        insert_account(&conn, &account).unwrap();

        assert!(set_account_active(&conn, &account.id, false).unwrap());
        let fetched = get_account(&conn, &account.id).unwrap().unwrap();
        assert!(!fetched.is_active);
    }
}
