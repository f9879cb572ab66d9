//! SQLite-backed metadata store.
//!
//! # Responsibility
//! - Issue icon/iconfile/tag statements, one connection per operation.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - `(icon_id, file_format, icon_size)` is unique; duplicates surface as the
//!   SQLite constraint violation.
//! - Iconfiles are read back in insertion order, tags sorted by text.

use super::prepared::PreparedWrite;
use super::{MetadataStore, RepoError, RepoResult};
use crate::db::open_connection;
use crate::model::icon::{IconDescriptor, Iconfile, IconfileDescriptor};
use log::info;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;

const REQUIRED_TABLES: [&str; 4] = ["icon", "icon_file", "tag", "icon_to_tags"];

const NOW_MS_SQL: &str = "(CAST(strftime('%s', 'now') AS INTEGER) * 1000)";

/// Metadata store over one SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteIconRepository {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteIconRepository {
    /// Constructs a repository over a bootstrapped database.
    ///
    /// # Errors
    /// - `MissingRequiredTable` when the schema has not been bootstrapped.
    pub fn try_new(path: impl Into<PathBuf>, busy_timeout: Duration) -> RepoResult<Self> {
        let repo = Self {
            path: path.into(),
            busy_timeout,
        };
        let conn = repo.connect()?;
        for table in REQUIRED_TABLES {
            if !table_exists(&conn, table)? {
                return Err(RepoError::MissingRequiredTable(table));
            }
        }
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> RepoResult<Connection> {
        Ok(open_connection(&self.path, self.busy_timeout)?)
    }
}

impl MetadataStore for SqliteIconRepository {
    fn create_icon(
        &self,
        icon_name: &str,
        iconfile: &Iconfile,
        modified_by: &str,
    ) -> RepoResult<PreparedWrite> {
        let pending = PreparedWrite::begin(
            self.connect()?,
            format!("create icon {icon_name} with iconfile {}", iconfile.descriptor()),
        )?;
        let conn = pending.connection();

        conn.execute(
            &format!(
                "INSERT INTO icon (name, modified_by, modified_at) VALUES (?1, ?2, {NOW_MS_SQL});"
            ),
            params![icon_name, modified_by],
        )?;
        insert_iconfile(conn, icon_name, iconfile)?;

        Ok(pending)
    }

    fn add_iconfile_to_icon(
        &self,
        icon_name: &str,
        iconfile: &Iconfile,
        modified_by: &str,
    ) -> RepoResult<PreparedWrite> {
        let pending = PreparedWrite::begin(
            self.connect()?,
            format!("add iconfile {} to icon {icon_name}", iconfile.descriptor()),
        )?;
        let conn = pending.connection();

        insert_iconfile(conn, icon_name, iconfile)?;
        update_modifier(conn, icon_name, modified_by)?;

        Ok(pending)
    }

    fn delete_icon(
        &self,
        icon_name: &str,
        _modified_by: &str,
    ) -> RepoResult<(PreparedWrite, IconDescriptor)> {
        let pending = PreparedWrite::begin(self.connect()?, format!("delete icon {icon_name}"))?;
        let conn = pending.connection();

        let icon = describe_icon_in(conn, icon_name)?;
        for descriptor in &icon.iconfiles {
            delete_iconfile_rows(conn, icon_name, descriptor)?;
        }

        Ok((pending, icon))
    }

    fn delete_iconfile(
        &self,
        icon_name: &str,
        descriptor: &IconfileDescriptor,
        modified_by: &str,
    ) -> RepoResult<PreparedWrite> {
        let pending = PreparedWrite::begin(
            self.connect()?,
            format!("delete iconfile {descriptor} of icon {icon_name}"),
        )?;
        let conn = pending.connection();

        let icon_removed = delete_iconfile_rows(conn, icon_name, descriptor)?;
        if !icon_removed {
            update_modifier(conn, icon_name, modified_by)?;
        }

        Ok(pending)
    }

    fn add_tag(&self, icon_name: &str, tag: &str, modified_by: &str) -> RepoResult<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let icon_id = icon_id(&tx, icon_name)?;
        tx.execute("INSERT OR IGNORE INTO tag (text) VALUES (?1);", [tag])?;
        tx.execute(
            "INSERT OR IGNORE INTO icon_to_tags (icon_id, tag_id)
             SELECT ?1, id FROM tag WHERE text = ?2;",
            params![icon_id, tag],
        )?;
        update_modifier(&tx, icon_name, modified_by)?;

        tx.commit()?;
        info!("event=tag_add module=repo status=ok icon={icon_name} tag={tag}");
        Ok(())
    }

    fn remove_tag(&self, icon_name: &str, tag: &str, modified_by: &str) -> RepoResult<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let icon_id = icon_id(&tx, icon_name)?;
        tx.execute(
            "DELETE FROM icon_to_tags
             WHERE icon_id = ?1
               AND tag_id IN (SELECT id FROM tag WHERE text = ?2);",
            params![icon_id, tag],
        )?;
        update_modifier(&tx, icon_name, modified_by)?;

        tx.commit()?;
        info!("event=tag_remove module=repo status=ok icon={icon_name} tag={tag}");
        Ok(())
    }

    fn get_existing_tags(&self) -> RepoResult<Vec<String>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT text FROM tag ORDER BY text ASC;")?;
        let tags = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tags)
    }

    fn describe_icon(&self, icon_name: &str) -> RepoResult<IconDescriptor> {
        let conn = self.connect()?;
        describe_icon_in(&conn, icon_name)
    }

    fn describe_all_icons(&self) -> RepoResult<Vec<IconDescriptor>> {
        let mut conn = self.connect()?;
        // One read transaction keeps the listing and the per-icon reads on
        // the same snapshot.
        let tx = conn.transaction()?;
        let names = {
            let mut stmt = tx.prepare("SELECT name FROM icon ORDER BY name ASC;")?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            names
        };

        let mut icons = Vec::with_capacity(names.len());
        for name in names {
            icons.push(describe_icon_in(&tx, &name)?);
        }
        Ok(icons)
    }

    fn get_icon_file(
        &self,
        icon_name: &str,
        descriptor: &IconfileDescriptor,
    ) -> RepoResult<Vec<u8>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT f.content
             FROM icon i
             INNER JOIN icon_file f ON f.icon_id = i.id
             WHERE i.name = ?1
               AND f.file_format = ?2
               AND f.icon_size = ?3;",
        )?;
        let mut contents = stmt
            .query_map(
                params![icon_name, descriptor.format, descriptor.size],
                |row| row.get::<_, Vec<u8>>(0),
            )?
            .collect::<Result<Vec<_>, _>>()?;

        match contents.len() {
            0 => Err(RepoError::IconfileNotFound {
                icon_name: icon_name.to_string(),
                descriptor: descriptor.clone(),
            }),
            1 => Ok(contents.remove(0)),
            count => Err(RepoError::TooManyRows {
                icon_name: icon_name.to_string(),
                descriptor: descriptor.clone(),
                count,
            }),
        }
    }
}

fn insert_iconfile(conn: &Connection, icon_name: &str, iconfile: &Iconfile) -> RepoResult<()> {
    let inserted = conn.execute(
        "INSERT INTO icon_file (icon_id, file_format, icon_size, content)
         SELECT id, ?2, ?3, ?4 FROM icon WHERE name = ?1;",
        params![
            icon_name,
            iconfile.format,
            iconfile.size,
            iconfile.content.as_slice()
        ],
    )?;
    if inserted == 0 {
        return Err(RepoError::IconNotFound(icon_name.to_string()));
    }
    Ok(())
}

fn update_modifier(conn: &Connection, icon_name: &str, modified_by: &str) -> RepoResult<()> {
    let changed = conn.execute(
        &format!("UPDATE icon SET modified_by = ?1, modified_at = {NOW_MS_SQL} WHERE name = ?2;"),
        params![modified_by, icon_name],
    )?;
    if changed == 0 {
        return Err(RepoError::IconNotFound(icon_name.to_string()));
    }
    Ok(())
}

fn icon_id(conn: &Connection, icon_name: &str) -> RepoResult<i64> {
    conn.query_row("SELECT id FROM icon WHERE name = ?1;", [icon_name], |row| {
        row.get(0)
    })
    .optional()?
    .ok_or_else(|| RepoError::IconNotFound(icon_name.to_string()))
}

/// Deletes one iconfile row and, when it was the last, the icon row.
///
/// Returns whether the icon row was removed.
fn delete_iconfile_rows(
    conn: &Connection,
    icon_name: &str,
    descriptor: &IconfileDescriptor,
) -> RepoResult<bool> {
    let icon_id = icon_id(conn, icon_name)?;

    let deleted = conn.execute(
        "DELETE FROM icon_file
         WHERE icon_id = ?1 AND file_format = ?2 AND icon_size = ?3;",
        params![icon_id, descriptor.format, descriptor.size],
    )?;
    if deleted == 0 {
        return Err(RepoError::IconfileNotFound {
            icon_name: icon_name.to_string(),
            descriptor: descriptor.clone(),
        });
    }

    let remaining: i64 = conn.query_row(
        "SELECT count(*) FROM icon_file WHERE icon_id = ?1;",
        [icon_id],
        |row| row.get(0),
    )?;
    if remaining > 0 {
        return Ok(false);
    }

    conn.execute("DELETE FROM icon WHERE id = ?1;", [icon_id])?;
    Ok(true)
}

fn describe_icon_in(conn: &Connection, icon_name: &str) -> RepoResult<IconDescriptor> {
    let (icon_id, modified_by): (i64, String) = conn
        .query_row(
            "SELECT id, modified_by FROM icon WHERE name = ?1;",
            [icon_name],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?
        .ok_or_else(|| RepoError::IconNotFound(icon_name.to_string()))?;

    let mut stmt = conn.prepare(
        "SELECT file_format, icon_size FROM icon_file WHERE icon_id = ?1 ORDER BY id ASC;",
    )?;
    let iconfiles = stmt
        .query_map([icon_id], |row| {
            Ok(IconfileDescriptor {
                format: row.get(0)?,
                size: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT t.text
         FROM icon_to_tags it
         INNER JOIN tag t ON t.id = it.tag_id
         WHERE it.icon_id = ?1
         ORDER BY t.text ASC;",
    )?;
    let tags = stmt
        .query_map([icon_id], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(IconDescriptor {
        name: icon_name.to_string(),
        modified_by,
        tags,
        iconfiles,
    })
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}
