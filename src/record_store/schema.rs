//! Database schema for the records database.
//!
//! Versions are additive only: each migration adds columns or indices, never drops them.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};
use anyhow::{Context, Result};
use rusqlite::Connection;

// =============================================================================
// Records Table - Version 0
// =============================================================================

const RECORDS_TABLE_V0: Table = Table {
    name: "records",
    columns: &[
        sqlite_column!("item_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("title", &SqlType::Text),
        sqlite_column!("description", &SqlType::Text),
        // JSON arrays
        sqlite_column!("subjects", &SqlType::Text, non_null = true),
        sqlite_column!("contributors", &SqlType::Text, non_null = true),
        sqlite_column!("date_created", &SqlType::Text),
        sqlite_column!("location", &SqlType::Text),
        sqlite_column!("block_number", &SqlType::Integer),
        sqlite_column!("raw_metadata", &SqlType::Text, non_null = true),
        sqlite_column!("content_hash", &SqlType::Text, non_null = true),
        sqlite_column!("first_seen", &SqlType::Integer, non_null = true),
        sqlite_column!("last_updated", &SqlType::Integer, non_null = true),
        sqlite_column!("last_checked", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "images_downloaded",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
    ],
    indices: &[
        ("idx_records_last_checked", "last_checked"),
        ("idx_records_last_updated", "last_updated"),
        ("idx_records_content_hash", "content_hash"),
    ],
};

// =============================================================================
// Records Table - Version 1 (adds page_count)
// =============================================================================

const RECORDS_TABLE_V1: Table = Table {
    name: "records",
    columns: &[
        sqlite_column!("item_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("title", &SqlType::Text),
        sqlite_column!("description", &SqlType::Text),
        sqlite_column!("subjects", &SqlType::Text, non_null = true),
        sqlite_column!("contributors", &SqlType::Text, non_null = true),
        sqlite_column!("date_created", &SqlType::Text),
        sqlite_column!("location", &SqlType::Text),
        sqlite_column!("block_number", &SqlType::Integer),
        sqlite_column!("raw_metadata", &SqlType::Text, non_null = true),
        sqlite_column!("content_hash", &SqlType::Text, non_null = true),
        sqlite_column!("first_seen", &SqlType::Integer, non_null = true),
        sqlite_column!("last_updated", &SqlType::Integer, non_null = true),
        sqlite_column!("last_checked", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "images_downloaded",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("page_count", &SqlType::Integer),
    ],
    indices: &[
        ("idx_records_last_checked", "last_checked"),
        ("idx_records_last_updated", "last_updated"),
        ("idx_records_content_hash", "content_hash"),
        ("idx_records_images_downloaded", "images_downloaded"),
    ],
};

fn migrate_v0_to_v1(conn: &Connection) -> Result<()> {
    let column = RECORDS_TABLE_V1
        .column("page_count")
        .context("page_count missing from records table definition")?;
    conn.execute(
        &format!("ALTER TABLE records ADD COLUMN {}", column.definition()),
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_images_downloaded ON records(images_downloaded)",
        [],
    )?;
    Ok(())
}

pub const RECORDS_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 0,
        tables: &[RECORDS_TABLE_V0],
        migration: None,
    },
    VersionedSchema {
        version: 1,
        tables: &[RECORDS_TABLE_V1],
        migration: Some(migrate_v0_to_v1),
    },
];
