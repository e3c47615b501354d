//! Schema type definitions
//!
//! A database schema is a named, versioned set of tables. Each table declares
//! an ordered column list, a primary key, and zero or more secondary indices.
//! The schema version is monotonic; the back store persists the version it
//! was last opened with.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Declared column types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Boolean,
    DateTime,
    Binary,
}

impl ColumnType {
    /// Returns the type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Real => "real",
            ColumnType::Text => "text",
            ColumnType::Boolean => "boolean",
            ColumnType::DateTime => "datetime",
            ColumnType::Binary => "binary",
        }
    }

    /// Checks whether a value inhabits this type. Null always does;
    /// nullability is enforced separately.
    pub fn admits(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Null)
                | (ColumnType::Integer, Value::Integer(_))
                | (ColumnType::Real, Value::Real(_))
                | (ColumnType::Text, Value::Text(_))
                | (ColumnType::Boolean, Value::Boolean(_))
                | (ColumnType::DateTime, Value::DateTime(_))
                | (ColumnType::Binary, Value::Binary(_))
        )
    }
}

/// A column declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name, unique within the table
    pub name: String,
    /// Declared type
    pub column_type: ColumnType,
    /// Whether null is admitted
    pub nullable: bool,
    /// Whether values must be unique across rows
    pub unique: bool,
}

impl Column {
    /// A non-nullable, non-unique column
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: false,
            unique: false,
        }
    }

    /// Mark this column nullable
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Mark this column unique
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Sort order for an index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexOrder {
    Asc,
    Desc,
}

/// A secondary index declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    /// Index name, unique within the table
    pub name: String,
    /// Indexed columns (single-column in the common case)
    pub columns: Vec<String>,
    /// Whether keys must be unique
    pub unique: bool,
    /// Key order
    pub order: IndexOrder,
}

impl IndexDef {
    /// A non-unique ascending index over one column
    pub fn on(name: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: vec![column.into()],
            unique: false,
            order: IndexOrder::Asc,
        }
    }

    /// Mark this index unique
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// A table declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Stable table name
    pub name: String,
    /// Ordered column list
    pub columns: Vec<Column>,
    /// Primary key column names (may be empty: row-id is the storage key)
    pub primary_key: Vec<String>,
    /// Secondary indices
    pub indices: Vec<IndexDef>,
}

impl TableSchema {
    /// Create a table with the given columns
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
            primary_key: Vec::new(),
            indices: Vec::new(),
        }
    }

    /// Declare the primary key
    pub fn with_primary_key(mut self, columns: Vec<&str>) -> Self {
        self.primary_key = columns.into_iter().map(String::from).collect();
        self
    }

    /// Add a secondary index
    pub fn with_index(mut self, index: IndexDef) -> Self {
        self.indices.push(index);
        self
    }

    /// Look up a column by name
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Returns true if the table declares this column
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Columns carrying a unique constraint: declared unique columns,
    /// unique single-column indices, and a single-column primary key
    pub fn unique_columns(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for c in &self.columns {
            if c.unique {
                out.push(&c.name);
            }
        }
        for idx in &self.indices {
            if idx.unique && idx.columns.len() == 1 {
                let col = idx.columns[0].as_str();
                if !out.contains(&col) {
                    out.push(col);
                }
            }
        }
        if self.primary_key.len() == 1 {
            let pk = self.primary_key[0].as_str();
            if !out.contains(&pk) {
                out.push(pk);
            }
        }
        out
    }

    /// Columns that must not be null: non-nullable declarations and the
    /// primary key
    pub fn not_null_columns(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self
            .columns
            .iter()
            .filter(|c| !c.nullable)
            .map(|c| c.name.as_str())
            .collect();
        for pk in &self.primary_key {
            if !out.contains(&pk.as_str()) {
                out.push(pk);
            }
        }
        out
    }

    /// Validates the declaration itself
    pub fn validate_structure(&self) -> Result<(), String> {
        if self.columns.is_empty() {
            return Err(format!("Table '{}' declares no columns", self.name));
        }
        for pk in &self.primary_key {
            if !self.has_column(pk) {
                return Err(format!(
                    "Table '{}' primary key references unknown column '{}'",
                    self.name, pk
                ));
            }
        }
        for idx in &self.indices {
            for col in &idx.columns {
                if !self.has_column(col) {
                    return Err(format!(
                        "Index '{}' on table '{}' references unknown column '{}'",
                        idx.name, self.name, col
                    ));
                }
            }
        }
        Ok(())
    }
}

/// A complete database schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSchema {
    /// Database name
    pub name: String,
    /// Monotonic schema version
    pub version: u32,
    /// Table declarations
    pub tables: Vec<TableSchema>,
}

impl DatabaseSchema {
    /// Create a schema
    pub fn new(name: impl Into<String>, version: u32, tables: Vec<TableSchema>) -> Self {
        Self {
            name: name.into(),
            version,
            tables,
        }
    }

    /// Look up a table by name
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Returns true if the schema declares this table
    pub fn has_table(&self, name: &str) -> bool {
        self.table(name).is_some()
    }

    /// Validates every table declaration
    pub fn validate_structure(&self) -> Result<(), String> {
        if self.version == 0 {
            return Err("Schema version must be positive".into());
        }
        for table in &self.tables {
            table.validate_structure()?;
        }
        Ok(())
    }
}
