#![forbid(unsafe_code)]
//! SQL text generation from resolved entity metadata.
//!
//! Every builder here produces `?` positional placeholders. Dialect differences are limited
//! to the auto-increment directive and the upsert keyword:
//! - [`Dialect::Ansi`]: `AUTO_INCREMENT`, `MERGE INTO`
//! - [`Dialect::Sqlite`]: rowid-alias `INTEGER` identity, `INSERT OR REPLACE INTO`

use repokit_core::{EntityMetadata, ParamValue, PropertyMetadata};

pub use repokit_core::Dialect;

/// Statement terminator appended to DDL.
pub const TERMINATOR: &str = ";";

/// A query template with positional placeholders and its ordered bind values.
/// Built fresh for every invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    sql: String,
    params: Vec<ParamValue>,
}

impl BoundStatement {
    pub fn new(sql: impl Into<String>, params: Vec<ParamValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[ParamValue] {
        &self.params
    }

    pub fn into_parts(self) -> (String, Vec<ParamValue>) {
        (self.sql, self.params)
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn column_definition(property: &PropertyMetadata, dialect: Dialect) -> String {
    if dialect == Dialect::Sqlite && property.is_generated() {
        // An INTEGER primary key is SQLite's rowid alias: the store assigns it.
        return format!("{} INTEGER", property.column());
    }
    let mut def = format!("{} {}", property.column(), property.column_type());
    if !property.is_nullable() {
        def.push_str(" NOT NULL");
    }
    if property.is_generated() {
        def.push_str(" AUTO_INCREMENT");
    }
    def
}

/// Build `CREATE TABLE <table> (<columns>[, PRIMARY KEY (<id>)]);`.
///
/// Columns follow the resolver's property order; the `PRIMARY KEY` clause is present only
/// when the entity has an identity.
pub fn create_table_statement(metadata: &EntityMetadata, dialect: Dialect) -> String {
    let mut definitions: Vec<String> = metadata
        .properties()
        .iter()
        .map(|p| column_definition(p, dialect))
        .collect();
    if let Some(id) = metadata.identity() {
        definitions.push(format!("PRIMARY KEY ({})", id.column()));
    }
    format!(
        "CREATE TABLE {table} ({defs}){term}",
        table = metadata.table(),
        defs = definitions.join(", "),
        term = TERMINATOR
    )
}

/// Build `SELECT * FROM <table>`.
pub fn select_all(metadata: &EntityMetadata) -> String {
    format!("SELECT * FROM {table}", table = metadata.table())
}

/// Build `SELECT * FROM <table> WHERE <column> = ?`.
pub fn select_by_column(metadata: &EntityMetadata, column: &str) -> String {
    format!(
        "SELECT * FROM {table} WHERE {column} = ?",
        table = metadata.table(),
        column = column
    )
}

/// Build the insert-or-replace statement binding every property in resolver order.
pub fn upsert(metadata: &EntityMetadata, dialect: Dialect) -> String {
    let columns: Vec<&str> = metadata.columns().collect();
    let keyword = match dialect {
        Dialect::Ansi => "MERGE INTO",
        Dialect::Sqlite => "INSERT OR REPLACE INTO",
    };
    format!(
        "{keyword} {table} ({cols}) VALUES ({vals})",
        keyword = keyword,
        table = metadata.table(),
        cols = columns.join(", "),
        vals = placeholders(columns.len())
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use repokit_core::{resolve, EntityDescriptor, PropertyDescriptor, StorageType};

    fn person() -> EntityMetadata {
        resolve(
            &EntityDescriptor::new("Person")
                .property(
                    PropertyDescriptor::new("id", StorageType::I64)
                        .nullable()
                        .id()
                        .generated(),
                )
                .property(PropertyDescriptor::new("name", StorageType::Text).nullable())
                .property(PropertyDescriptor::new("age", StorageType::I32)),
        )
        .unwrap()
    }

    #[test]
    fn create_table_ansi() {
        assert_eq!(
            create_table_statement(&person(), Dialect::Ansi),
            "CREATE TABLE PERSON (ID BIGINT AUTO_INCREMENT, NAME VARCHAR(255), AGE INTEGER NOT NULL, PRIMARY KEY (ID));"
        );
    }

    #[test]
    fn create_table_sqlite_uses_rowid_alias() {
        assert_eq!(
            create_table_statement(&person(), Dialect::Sqlite),
            "CREATE TABLE PERSON (ID INTEGER, NAME VARCHAR(255), AGE INTEGER NOT NULL, PRIMARY KEY (ID));"
        );
    }

    #[test]
    fn create_table_without_identity_has_no_primary_key() {
        let m = resolve(
            &EntityDescriptor::new("Log")
                .table("EVENTS")
                .property(PropertyDescriptor::new("message", StorageType::Text))
                .property(PropertyDescriptor::new("ok", StorageType::Bool))
                .property(PropertyDescriptor::new("score", StorageType::F64).nullable()),
        )
        .unwrap();
        assert_eq!(
            create_table_statement(&m, Dialect::Ansi),
            "CREATE TABLE EVENTS (MESSAGE VARCHAR(255) NOT NULL, OK BOOLEAN NOT NULL, SCORE DOUBLE);"
        );
    }

    #[test]
    fn non_generated_identity_keeps_declared_type() {
        let m = resolve(
            &EntityDescriptor::new("Country")
                .property(PropertyDescriptor::new("code", StorageType::Text).id())
                .property(PropertyDescriptor::new("name", StorageType::Text)),
        )
        .unwrap();
        assert_eq!(
            create_table_statement(&m, Dialect::Sqlite),
            "CREATE TABLE COUNTRY (CODE VARCHAR(255) NOT NULL, NAME VARCHAR(255) NOT NULL, PRIMARY KEY (CODE));"
        );
    }

    #[test]
    fn selects() {
        let m = person();
        assert_eq!(select_all(&m), "SELECT * FROM PERSON");
        assert_eq!(
            select_by_column(&m, "NAME"),
            "SELECT * FROM PERSON WHERE NAME = ?"
        );
    }

    #[test]
    fn upsert_per_dialect() {
        let m = person();
        assert_eq!(
            upsert(&m, Dialect::Ansi),
            "MERGE INTO PERSON (ID, NAME, AGE) VALUES (?, ?, ?)"
        );
        assert_eq!(
            upsert(&m, Dialect::Sqlite),
            "INSERT OR REPLACE INTO PERSON (ID, NAME, AGE) VALUES (?, ?, ?)"
        );
    }

    #[test]
    fn bound_statement_parts() {
        let s = BoundStatement::new("SELECT 1", vec![ParamValue::I32(1)]);
        assert_eq!(s.sql(), "SELECT 1");
        assert_eq!(s.params(), &[ParamValue::I32(1)]);
        let (sql, params) = s.into_parts();
        assert_eq!((sql.as_str(), params.len()), ("SELECT 1", 1));
    }
}
