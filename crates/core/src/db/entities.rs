// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;

use super::{parse_db, parse_json, parse_timestamp, parse_timestamp_opt, Database};
use crate::changeset::ChangeSet;
use crate::entity::{Entity, EntityKey, EntityKind};
use crate::error::{Error, Result};

const ENTITY_COLUMNS: &str =
    "id, kind, code, fields, field_times, created_at, updated_at, deleted_at";

fn row_to_entity(row: &Row<'_>) -> std::result::Result<Entity, rusqlite::Error> {
    let kind_str: String = row.get(1)?;
    let fields_str: String = row.get(3)?;
    let times_str: String = row.get(4)?;
    let created_str: String = row.get(5)?;
    let updated_str: String = row.get(6)?;
    let deleted_str: Option<String> = row.get(7)?;

    let kind: EntityKind = parse_db(&kind_str, "kind")?;
    Ok(Entity {
        key: EntityKey::new(kind, row.get(0)?),
        code: row.get(2)?,
        fields: parse_json(&fields_str, "fields")?,
        field_times: parse_json(&times_str, "field_times")?,
        created_at: parse_timestamp(&created_str, "created_at")?,
        updated_at: parse_timestamp(&updated_str, "updated_at")?,
        deleted_at: parse_timestamp_opt(deleted_str, "deleted_at")?,
    })
}

pub(crate) fn load_entity(conn: &Connection, key: EntityKey) -> Result<Option<Entity>> {
    let sql = format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE id = ?1 AND kind = ?2");
    let entity = conn
        .query_row(&sql, params![key.local_id, key.kind.as_str()], row_to_entity)
        .optional()?;
    Ok(entity)
}

/// Writes `fields` and `field_times` back for an already loaded entity.
pub(crate) fn store_fields(
    conn: &Connection,
    key: EntityKey,
    fields: &BTreeMap<String, Value>,
    field_times: &BTreeMap<String, DateTime<Utc>>,
    updated_at: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "UPDATE entities SET fields = ?1, field_times = ?2, updated_at = ?3
         WHERE id = ?4 AND kind = ?5",
        params![
            serde_json::to_string(fields)?,
            serde_json::to_string(field_times)?,
            updated_at.to_rfc3339(),
            key.local_id,
            key.kind.as_str(),
        ],
    )?;
    Ok(())
}

impl Database {
    /// Insert a new entity. Every field gets `now` as its change time.
    pub fn insert_entity(
        &self,
        kind: EntityKind,
        code: Option<&str>,
        fields: &ChangeSet,
        now: DateTime<Utc>,
    ) -> Result<Entity> {
        if !kind.is_generic() {
            return Err(Error::InvalidEntityKind(kind.to_string()));
        }
        let values: BTreeMap<String, Value> = fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let times: BTreeMap<String, DateTime<Utc>> =
            values.keys().map(|k| (k.clone(), now)).collect();

        self.conn.execute(
            "INSERT INTO entities (kind, code, fields, field_times, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                kind.as_str(),
                code,
                serde_json::to_string(&values)?,
                serde_json::to_string(&times)?,
                now.to_rfc3339(),
            ],
        )?;
        let key = EntityKey::new(kind, self.conn.last_insert_rowid());

        Ok(Entity {
            key,
            code: code.map(str::to_string),
            fields: values,
            field_times: times,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    /// Get an entity by key.
    pub fn get_entity(&self, key: EntityKey) -> Result<Entity> {
        load_entity(&self.conn, key)?.ok_or(Error::EntityNotFound(key))
    }

    /// Check if an entity exists.
    pub fn entity_exists(&self, key: EntityKey) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM entities WHERE id = ?1 AND kind = ?2",
            params![key.local_id, key.kind.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Find a live entity by merchant code.
    pub fn find_entity_by_code(&self, kind: EntityKind, code: &str) -> Result<Option<Entity>> {
        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM entities
             WHERE kind = ?1 AND code = ?2 AND deleted_at IS NULL
             ORDER BY id LIMIT 1"
        );
        let entity = self
            .conn
            .query_row(&sql, params![kind.as_str(), code], row_to_entity)
            .optional()?;
        Ok(entity)
    }

    /// Apply a local change set, stamping each changed field with `at`.
    ///
    /// Returns the change set with no-op assignments removed.
    pub fn update_entity_fields(
        &self,
        key: EntityKey,
        changes: ChangeSet,
        at: DateTime<Utc>,
    ) -> Result<ChangeSet> {
        let mut entity = self.get_entity(key)?;
        if entity.is_deleted() {
            return Err(Error::EntityDeleted(key));
        }
        let changes = changes.without_noops(&entity.fields);
        if changes.is_empty() {
            return Ok(changes);
        }
        for (field, value) in changes.iter() {
            entity.fields.insert(field.clone(), value.clone());
            entity.field_times.insert(field.clone(), at);
        }
        store_fields(&self.conn, key, &entity.fields, &entity.field_times, at)?;
        Ok(changes)
    }

    /// Tombstone an entity. Rows are never physically removed.
    pub fn tombstone_entity(&self, key: EntityKey, at: DateTime<Utc>) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE entities SET deleted_at = ?1, updated_at = ?1
             WHERE id = ?2 AND kind = ?3 AND deleted_at IS NULL",
            params![at.to_rfc3339(), key.local_id, key.kind.as_str()],
        )?;
        if changed == 0 && !self.entity_exists(key)? {
            return Err(Error::EntityNotFound(key));
        }
        Ok(changed > 0)
    }

    /// List entities of a kind, tombstones included.
    pub fn list_entities(&self, kind: EntityKind) -> Result<Vec<Entity>> {
        let sql = format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE kind = ?1 ORDER BY id");
        let mut stmt = self.conn.prepare(&sql)?;
        let entities = stmt
            .query_map(params![kind.as_str()], row_to_entity)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entities)
    }
}

#[cfg(test)]
#[path = "entities_tests.rs"]
mod tests;
