use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{fmt_ts, parse_ts};
use crate::db::StoreError;
use crate::models::{EmergencyContact, HealthProfile};

pub fn insert_profile(conn: &Connection, profile: &HealthProfile) -> Result<(), StoreError> {
    let (p_name, p_phone, p_rel) = contact_cols(&profile.primary_contact);
    let (s_name, s_phone, s_rel) = contact_cols(&profile.secondary_contact);

    conn.execute(
        "INSERT INTO health_profiles (id, account_id, blood_type, allergies, medications,
         conditions, primary_contact_name, primary_contact_phone, primary_contact_relation,
         secondary_contact_name, secondary_contact_phone, secondary_contact_relation,
         residence_building, residence_room, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            profile.id.to_string(),
            profile.account_id.to_string(),
            profile.blood_type,
            list_json(&profile.allergies),
            list_json(&profile.medications),
            list_json(&profile.conditions),
            p_name,
            p_phone,
            p_rel,
            s_name,
            s_phone,
            s_rel,
            profile.residence_building,
            profile.residence_room,
            fmt_ts(profile.created_at),
            fmt_ts(profile.updated_at),
        ],
    )?;
    Ok(())
}

/// Overwrite the mutable fields of an existing profile. Returns `false`
/// when the account has no profile row.
pub fn update_profile(conn: &Connection, profile: &HealthProfile) -> Result<bool, StoreError> {
    let (p_name, p_phone, p_rel) = contact_cols(&profile.primary_contact);
    let (s_name, s_phone, s_rel) = contact_cols(&profile.secondary_contact);

    let changed = conn.execute(
        "UPDATE health_profiles SET blood_type = ?1, allergies = ?2, medications = ?3,
         conditions = ?4, primary_contact_name = ?5, primary_contact_phone = ?6,
         primary_contact_relation = ?7, secondary_contact_name = ?8,
         secondary_contact_phone = ?9, secondary_contact_relation = ?10,
         residence_building = ?11, residence_room = ?12, updated_at = ?13
         WHERE account_id = ?14",
        params![
            profile.blood_type,
            list_json(&profile.allergies),
            list_json(&profile.medications),
            list_json(&profile.conditions),
            p_name,
            p_phone,
            p_rel,
            s_name,
            s_phone,
            s_rel,
            profile.residence_building,
            profile.residence_room,
            fmt_ts(profile.updated_at),
            profile.account_id.to_string(),
        ],
    )?;
    Ok(changed > 0)
}

pub fn get_profile_by_account(
    conn: &Connection,
    account_id: &Uuid,
) -> Result<Option<HealthProfile>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, account_id, blood_type, allergies, medications, conditions,
                primary_contact_name, primary_contact_phone, primary_contact_relation,
                secondary_contact_name, secondary_contact_phone, secondary_contact_relation,
                residence_building, residence_room, created_at, updated_at
         FROM health_profiles WHERE account_id = ?1",
    )?;

    let result = stmt.query_row(params![account_id.to_string()], |row| {
        Ok(ProfileRow {
            id: row.get::<_, String>(0)?,
            account_id: row.get::<_, String>(1)?,
            blood_type: row.get::<_, Option<String>>(2)?,
            allergies: row.get::<_, String>(3)?,
            medications: row.get::<_, String>(4)?,
            conditions: row.get::<_, String>(5)?,
            primary_contact_name: row.get::<_, Option<String>>(6)?,
            primary_contact_phone: row.get::<_, Option<String>>(7)?,
            primary_contact_relation: row.get::<_, Option<String>>(8)?,
            secondary_contact_name: row.get::<_, Option<String>>(9)?,
            secondary_contact_phone: row.get::<_, Option<String>>(10)?,
            secondary_contact_relation: row.get::<_, Option<String>>(11)?,
            residence_building: row.get::<_, Option<String>>(12)?,
            residence_room: row.get::<_, Option<String>>(13)?,
            created_at: row.get::<_, String>(14)?,
            updated_at: row.get::<_, String>(15)?,
        })
    });

    match result {
        Ok(row) => Ok(Some(profile_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn contact_cols(
    contact: &Option<EmergencyContact>,
) -> (Option<String>, Option<String>, Option<String>) {
    match contact {
        Some(c) => (Some(c.name.clone()), Some(c.phone.clone()), c.relation.clone()),
        None => (None, None, None),
    }
}

fn contact_from_cols(
    name: Option<String>,
    phone: Option<String>,
    relation: Option<String>,
) -> Option<EmergencyContact> {
    match (name, phone) {
        (Some(name), Some(phone)) => Some(EmergencyContact { name, phone, relation }),
        _ => None,
    }
}

fn list_json(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

struct ProfileRow {
    id: String,
    account_id: String,
    blood_type: Option<String>,
    allergies: String,
    medications: String,
    conditions: String,
    primary_contact_name: Option<String>,
    primary_contact_phone: Option<String>,
    primary_contact_relation: Option<String>,
    secondary_contact_name: Option<String>,
    secondary_contact_phone: Option<String>,
    secondary_contact_relation: Option<String>,
    residence_building: Option<String>,
    residence_room: Option<String>,
    created_at: String,
    updated_at: String,
}

fn profile_from_row(row: ProfileRow) -> Result<HealthProfile, StoreError> {
    Ok(HealthProfile {
        id: Uuid::parse_str(&row.id)
            .map_err(|e| StoreError::ConstraintViolation(e.to_string()))?,
        account_id: Uuid::parse_str(&row.account_id)
            .map_err(|e| StoreError::ConstraintViolation(e.to_string()))?,
        blood_type: row.blood_type,
        allergies: serde_json::from_str(&row.allergies).unwrap_or_default(),
        medications: serde_json::from_str(&row.medications).unwrap_or_default(),
        conditions: serde_json::from_str(&row.conditions).unwrap_or_default(),
        primary_contact: contact_from_cols(
            row.primary_contact_name,
            row.primary_contact_phone,
            row.primary_contact_relation,
        ),
        secondary_contact: contact_from_cols(
            row.secondary_contact_name,
            row.secondary_contact_phone,
            row.secondary_contact_relation,
        ),
        residence_building: row.residence_building,
        residence_room: row.residence_room,
        created_at: parse_ts(&row.created_at),
        updated_at: parse_ts(&row.updated_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::account::insert_account;
    use crate::db::sqlite::open_memory_database;
    use crate::models::Account;
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

    fn sample_profile(account_id: Uuid) -> HealthProfile {
        let now = Utc::now();
        HealthProfile {
            id: Uuid::new_v4(),
            account_id,
            blood_type: Some("O-".to_string()),
            allergies: vec!["penicillin".to_string()],
            medications: vec![],
            conditions: vec!["asthma".to_string()],
            primary_contact: Some(EmergencyContact {
                name: "Jordan Student".to_string(),
                phone: "+1-765-555-0134".to_string(),
                relation: Some("parent".to_string()),
            }),
            secondary_contact: None,
            residence_building: Some("Hawthorn Hall".to_string()),
            residence_room: Some("214".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn insert_and_fetch_round_trip() {
        let conn = open_memory_database().unwrap();
        let account = sample_account("sam@campus.edu");
        insert_account(&conn, &account).unwrap();

        let profile = sample_profile(account.id);
        insert_profile(&conn, &profile).unwrap();

        let fetched = get_profile_by_account(&conn, &account.id).unwrap().unwrap();
        assert_eq!(fetched.blood_type.as_deref(), Some("O-"));
        assert_eq!(fetched.allergies, vec!["penicillin"]);
        let contact = fetched.primary_contact.unwrap();
        assert_eq!(contact.name, "Jordan Student");
        assert!(fetched.secondary_contact.is_none());
    }

    #[test]
    fn second_profile_for_account_is_rejected() {
        let conn = open_memory_database().unwrap();
        let account = sample_account("sam@campus.edu");
        insert_account(&conn, &account).unwrap();

        insert_profile(&conn, &sample_profile(account.id)).unwrap();
        let err = insert_profile(&conn, &sample_profile(account.id)).unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[test]
    fn update_overwrites_fields() {
        let conn = open_memory_database().unwrap();
        let account = sample_account("sam@campus.edu");
        insert_account(&conn, &account).unwrap();

        let mut profile = sample_profile(account.id);
        insert_profile(&conn, &profile).unwrap();

        profile.blood_type = Some("AB+".to_string());
        profile.allergies = vec![];
        assert!(update_profile(&conn, &profile).unwrap());

        let fetched = get_profile_by_account(&conn, &account.id).unwrap().unwrap();
        assert_eq!(fetched.blood_type.as_deref(), Some("AB+"));
        assert!(fetched.allergies.is_empty());
    }

    #[test]
    fn update_without_profile_returns_false() {
        let conn = open_memory_database().unwrap();
        let account = sample_account("sam@campus.edu");
        insert_account(&conn, &account).unwrap();

        let profile = sample_profile(account.id);
        assert!(!update_profile(&conn, &profile).unwrap());
    }

    #[test]
    fn missing_profile_is_none() {
        let conn = open_memory_database().unwrap();
        assert!(get_profile_by_account(&conn, &Uuid::new_v4()).unwrap().is_none());
    }
}
