//! SQLite implementation of [`Store`].
//!
//! # Invariants
//! - Every table/column name is validated and double-quoted before use.
//! - JSON booleans are stored as `0/1`; arrays and objects as JSON text.
//! - No statement here opens or commits a transaction.

use super::{Link, Store, StoreError, StoreResult};
use crate::model::entity::{Attributes, Record, RowId, PRIMARY_KEY};
use crate::schema::JoinTable;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use serde_json::{Number, Value};

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Store over a borrowed connection.
///
/// Build it over a `rusqlite::Transaction` (via deref) to make one save call
/// atomic.
pub struct SqliteStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn query_records(
        &self,
        table: &str,
        sql: &str,
        binds: Vec<SqlValue>,
    ) -> StoreResult<Vec<Record>> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let mut rows = stmt.query(params_from_iter(binds))?;

        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let mut attributes = Attributes::new();
            for (index, column) in columns.iter().enumerate() {
                attributes.insert(column.clone(), json_from_sql(row.get_ref(index)?));
            }
            let id = attributes
                .get(PRIMARY_KEY)
                .and_then(Value::as_i64)
                .ok_or_else(|| {
                    StoreError::InvalidData(format!(
                        "row in `{table}` has no integer `{PRIMARY_KEY}` column"
                    ))
                })?;
            records.push(Record { id, attributes });
        }
        Ok(records)
    }

    fn row_exists(&self, table: &str, id: RowId) -> StoreResult<bool> {
        let exists: i64 = self.conn.query_row(
            &format!(
                "SELECT EXISTS(SELECT 1 FROM {} WHERE {} = ?1);",
                quote_ident(table)?,
                quote_ident(PRIMARY_KEY)?
            ),
            [id],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }
}

impl Store for SqliteStore<'_> {
    fn create(&self, table: &str, attributes: &Attributes) -> StoreResult<RowId> {
        let table_sql = quote_ident(table)?;
        if attributes.is_empty() {
            self.conn
                .execute(&format!("INSERT INTO {table_sql} DEFAULT VALUES;"), [])?;
        } else {
            let (columns, binds) = split_attributes(attributes)?;
            self.conn.execute(
                &format!(
                    "INSERT INTO {table_sql} ({}) VALUES ({});",
                    columns.join(", "),
                    placeholders(binds.len())
                ),
                params_from_iter(binds),
            )?;
        }

        let id = self.conn.last_insert_rowid();
        debug!("event=store_create module=store status=ok table={table} id={id}");
        Ok(id)
    }

    fn update_by_id(&self, table: &str, id: RowId, attributes: &Attributes) -> StoreResult<()> {
        let changed = if attributes.is_empty() {
            usize::from(self.row_exists(table, id)?)
        } else {
            let (assignments, mut binds) = assignments(attributes)?;
            binds.push(SqlValue::Integer(id));
            self.conn.execute(
                &format!(
                    "UPDATE {} SET {assignments} WHERE {} = ?;",
                    quote_ident(table)?,
                    quote_ident(PRIMARY_KEY)?
                ),
                params_from_iter(binds),
            )?
        };

        if changed == 0 {
            return Err(StoreError::NotFound {
                table: table.to_string(),
                id,
            });
        }
        Ok(())
    }

    fn update_where_id_in(
        &self,
        table: &str,
        ids: &[RowId],
        attributes: &Attributes,
    ) -> StoreResult<usize> {
        if ids.is_empty() || attributes.is_empty() {
            return Ok(0);
        }

        let (assignments, mut binds) = assignments(attributes)?;
        binds.extend(ids.iter().copied().map(SqlValue::Integer));
        let changed = self.conn.execute(
            &format!(
                "UPDATE {} SET {assignments} WHERE {} IN ({});",
                quote_ident(table)?,
                quote_ident(PRIMARY_KEY)?,
                placeholders(ids.len())
            ),
            params_from_iter(binds),
        )?;
        Ok(changed)
    }

    fn delete_by_id(&self, table: &str, id: RowId) -> StoreResult<()> {
        let changed = self.conn.execute(
            &format!(
                "DELETE FROM {} WHERE {} = ?1;",
                quote_ident(table)?,
                quote_ident(PRIMARY_KEY)?
            ),
            [id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                table: table.to_string(),
                id,
            });
        }
        Ok(())
    }

    fn delete_where_id_in(&self, table: &str, ids: &[RowId]) -> StoreResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let changed = self.conn.execute(
            &format!(
                "DELETE FROM {} WHERE {} IN ({});",
                quote_ident(table)?,
                quote_ident(PRIMARY_KEY)?,
                placeholders(ids.len())
            ),
            params_from_iter(ids.iter()),
        )?;
        Ok(changed)
    }

    fn find_by_ids(&self, table: &str, ids: &[RowId]) -> StoreResult<Vec<Record>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let key = quote_ident(PRIMARY_KEY)?;
        self.query_records(
            table,
            &format!(
                "SELECT * FROM {} WHERE {key} IN ({}) ORDER BY {key} ASC;",
                quote_ident(table)?,
                placeholders(ids.len())
            ),
            ids.iter().copied().map(SqlValue::Integer).collect(),
        )
    }

    fn find_where(&self, table: &str, column: &str, value: RowId) -> StoreResult<Vec<Record>> {
        self.query_records(
            table,
            &format!(
                "SELECT * FROM {} WHERE {} = ? ORDER BY {} ASC;",
                quote_ident(table)?,
                quote_ident(column)?,
                quote_ident(PRIMARY_KEY)?
            ),
            vec![SqlValue::Integer(value)],
        )
    }

    fn has_column(&self, table: &str, column: &str) -> StoreResult<bool> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({});", quote_ident(table)?))?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let current: String = row.get(1)?;
            if current == column {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn linked_ids(
        &self,
        join: &JoinTable,
        parent_id: RowId,
        candidates: &[RowId],
    ) -> StoreResult<Vec<RowId>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let (scope, mut binds) = join_scope(join, parent_id)?;
        let related = quote_ident(&join.related_key)?;
        binds.extend(candidates.iter().copied().map(SqlValue::Integer));
        let mut stmt = self.conn.prepare(&format!(
            "SELECT DISTINCT {related} FROM {} WHERE {scope} AND {related} IN ({}) ORDER BY {related} ASC;",
            quote_ident(&join.table)?,
            placeholders(candidates.len())
        ))?;
        let mut rows = stmt.query(params_from_iter(binds))?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            ids.push(row.get(0)?);
        }
        Ok(ids)
    }

    fn links(&self, join: &JoinTable, parent_id: RowId) -> StoreResult<Vec<Link>> {
        let (scope, binds) = join_scope(join, parent_id)?;
        let related = quote_ident(&join.related_key)?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT * FROM {} WHERE {scope} ORDER BY {related} ASC;",
            quote_ident(&join.table)?
        ))?;
        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let mut rows = stmt.query(params_from_iter(binds))?;

        let mut links = Vec::new();
        while let Some(row) = rows.next()? {
            let mut related_id = None;
            let mut attributes = Attributes::new();
            for (index, column) in columns.iter().enumerate() {
                let value = json_from_sql(row.get_ref(index)?);
                if column == &join.related_key {
                    related_id = value.as_i64();
                } else if !join.is_scope_column(column) {
                    attributes.insert(column.clone(), value);
                }
            }
            let related_id = related_id.ok_or_else(|| {
                StoreError::InvalidData(format!(
                    "`{}.{}` is not an integer",
                    join.table, join.related_key
                ))
            })?;
            links.push(Link {
                related_id,
                attributes,
            });
        }
        Ok(links)
    }

    fn attach(&self, join: &JoinTable, parent_id: RowId, links: &[Link]) -> StoreResult<usize> {
        let table = quote_ident(&join.table)?;
        let mut inserted = 0;
        for link in links {
            let mut columns = vec![quote_ident(&join.parent_key)?, quote_ident(&join.related_key)?];
            let mut binds = vec![SqlValue::Integer(parent_id), SqlValue::Integer(link.related_id)];
            if let Some(morph) = &join.morph {
                columns.push(quote_ident(&morph.type_column)?);
                binds.push(SqlValue::Text(morph.type_value.clone()));
            }
            for (column, value) in &link.attributes {
                if join.is_scope_column(column) {
                    continue;
                }
                columns.push(quote_ident(column)?);
                binds.push(json_to_sql(value));
            }

            inserted += self.conn.execute(
                &format!(
                    "INSERT INTO {table} ({}) VALUES ({});",
                    columns.join(", "),
                    placeholders(binds.len())
                ),
                params_from_iter(binds),
            )?;
        }
        Ok(inserted)
    }

    fn detach(
        &self,
        join: &JoinTable,
        parent_id: RowId,
        related_ids: &[RowId],
    ) -> StoreResult<usize> {
        if related_ids.is_empty() {
            return Ok(0);
        }

        let (scope, mut binds) = join_scope(join, parent_id)?;
        binds.extend(related_ids.iter().copied().map(SqlValue::Integer));
        let removed = self.conn.execute(
            &format!(
                "DELETE FROM {} WHERE {scope} AND {} IN ({});",
                quote_ident(&join.table)?,
                quote_ident(&join.related_key)?,
                placeholders(related_ids.len())
            ),
            params_from_iter(binds),
        )?;
        Ok(removed)
    }

    fn update_link(&self, join: &JoinTable, parent_id: RowId, link: &Link) -> StoreResult<bool> {
        let mut writable = link.attributes.clone();
        writable.retain(|column, _| !join.is_scope_column(column));
        if writable.is_empty() {
            return Ok(!self.linked_ids(join, parent_id, &[link.related_id])?.is_empty());
        }

        let (assignments, mut binds) = assignments(&writable)?;
        let (scope, scope_binds) = join_scope(join, parent_id)?;
        binds.extend(scope_binds);
        binds.push(SqlValue::Integer(link.related_id));
        let changed = self.conn.execute(
            &format!(
                "UPDATE {} SET {assignments} WHERE {scope} AND {} = ?;",
                quote_ident(&join.table)?,
                quote_ident(&join.related_key)?
            ),
            params_from_iter(binds),
        )?;
        Ok(changed > 0)
    }
}

/// Validates and double-quotes one identifier.
fn quote_ident(name: &str) -> StoreResult<String> {
    if !IDENTIFIER_RE.is_match(name) {
        return Err(StoreError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{name}\""))
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn split_attributes(attributes: &Attributes) -> StoreResult<(Vec<String>, Vec<SqlValue>)> {
    let mut columns = Vec::with_capacity(attributes.len());
    let mut binds = Vec::with_capacity(attributes.len());
    for (column, value) in attributes {
        columns.push(quote_ident(column)?);
        binds.push(json_to_sql(value));
    }
    Ok((columns, binds))
}

fn assignments(attributes: &Attributes) -> StoreResult<(String, Vec<SqlValue>)> {
    let (columns, binds) = split_attributes(attributes)?;
    let assignments = columns
        .iter()
        .map(|column| format!("{column} = ?"))
        .collect::<Vec<_>>()
        .join(", ");
    Ok((assignments, binds))
}

fn join_scope(join: &JoinTable, parent_id: RowId) -> StoreResult<(String, Vec<SqlValue>)> {
    let mut scope = format!("{} = ?", quote_ident(&join.parent_key)?);
    let mut binds = vec![SqlValue::Integer(parent_id)];
    if let Some(morph) = &join.morph {
        scope.push_str(&format!(" AND {} = ?", quote_ident(&morph.type_column)?));
        binds.push(SqlValue::Text(morph.type_value.clone()));
    }
    Ok((scope, binds))
}

fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => SqlValue::Integer(integer),
            None => number
                .as_f64()
                .map_or(SqlValue::Null, SqlValue::Real),
        },
        Value::String(text) => SqlValue::Text(text.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn json_from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(integer) => Value::from(integer),
        ValueRef::Real(real) => Number::from_f64(real).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::from(bytes.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::{json_from_sql, json_to_sql, placeholders, quote_ident};
    use crate::store::StoreError;
    use rusqlite::types::{Value as SqlValue, ValueRef};
    use serde_json::json;

    #[test]
    fn quote_ident_rejects_injection_attempts() {
        assert_eq!(quote_ident("post_tag").unwrap(), "\"post_tag\"");
        for bad in ["", "1col", "a b", "x\"; DROP TABLE t; --", "a.b"] {
            assert!(
                matches!(quote_ident(bad), Err(StoreError::InvalidIdentifier(_))),
                "{bad}"
            );
        }
    }

    #[test]
    fn placeholders_join_question_marks() {
        assert_eq!(placeholders(3), "?, ?, ?");
        assert_eq!(placeholders(0), "");
    }

    #[test]
    fn json_values_bind_as_sqlite_values() {
        assert_eq!(json_to_sql(&json!(true)), SqlValue::Integer(1));
        assert_eq!(json_to_sql(&json!(2.5)), SqlValue::Real(2.5));
        assert_eq!(json_to_sql(&json!("x")), SqlValue::Text("x".to_string()));
        assert_eq!(
            json_to_sql(&json!({"a": 1})),
            SqlValue::Text("{\"a\":1}".to_string())
        );
        assert_eq!(json_to_sql(&json!(null)), SqlValue::Null);
    }

    #[test]
    fn sqlite_values_read_back_as_json() {
        assert_eq!(json_from_sql(ValueRef::Integer(5)), json!(5));
        assert_eq!(json_from_sql(ValueRef::Text(b"hi")), json!("hi"));
        assert_eq!(json_from_sql(ValueRef::Null), json!(null));
        assert_eq!(json_from_sql(ValueRef::Real(f64::NAN)), json!(null));
    }
}
