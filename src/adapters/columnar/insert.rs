//! Bulk insert requests

use serde::Deserialize;
use serde_json::{Map, Value};

use super::sql::quote_ident;
use crate::dispatch::{BridgeError, BridgeResult};

/// `{table, database?, columns?, rows}`
#[derive(Debug, Deserialize)]
pub struct InsertRequest {
    pub table: String,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Map<String, Value>>,
}

/// Insert target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub database: String,
    pub table: String,
    /// Whether the database must be spelled out in SQL
    pub qualified: bool,
}

impl TableRef {
    /// Table name as it appears in SQL
    pub fn sql(&self) -> String {
        if self.qualified {
            format!("{}.{}", quote_ident(&self.database), quote_ident(&self.table))
        } else {
            quote_ident(&self.table)
        }
    }
}

/// A validated insert: resolved target, column order and rows
#[derive(Debug)]
pub struct InsertPlan {
    pub target: TableRef,
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
}

impl InsertPlan {
    /// Validate `body` against the adapter's default database
    pub fn from_body(body: &[u8], default_database: &str) -> BridgeResult<Self> {
        let req: InsertRequest = serde_json::from_slice(body)?;
        if req.table.trim().is_empty() {
            return Err(BridgeError::invalid_request("table is required"));
        }
        if req.rows.is_empty() {
            return Err(BridgeError::invalid_request("no rows"));
        }

        let columns = if req.columns.is_empty() {
            infer_columns(&req.rows[0])
        } else {
            req.columns
        };

        let database = req
            .database
            .filter(|db| !db.is_empty())
            .unwrap_or_else(|| default_database.to_string());
        let qualified = database != default_database;

        Ok(Self {
            target: TableRef {
                database,
                table: req.table,
                qualified,
            },
            columns,
            rows: req.rows,
        })
    }

    /// `INSERT INTO <table> (<columns>)`
    pub fn statement(&self) -> String {
        let columns: Vec<String> = self.columns.iter().map(|c| quote_ident(c)).collect();
        format!("INSERT INTO {} ({})", self.target.sql(), columns.join(", "))
    }

    /// Values of `row` in column order; missing keys are null
    pub fn project(&self, row: &Map<String, Value>) -> Vec<Value> {
        self.columns
            .iter()
            .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// Rows as newline-delimited JSON objects restricted to the columns
    pub fn to_ndjson(&self) -> BridgeResult<Vec<u8>> {
        let mut out = Vec::with_capacity(self.rows.len() * 64);
        for row in &self.rows {
            let projected: Map<String, Value> = self
                .columns
                .iter()
                .filter_map(|c| row.get(c).map(|v| (c.clone(), v.clone())))
                .collect();
            serde_json::to_writer(&mut out, &projected)?;
            out.push(b'\n');
        }
        Ok(out)
    }
}

/// Key set of the first row, sorted by name
fn infer_columns(first: &Map<String, Value>) -> Vec<String> {
    let mut columns: Vec<String> = first.keys().cloned().collect();
    columns.sort();
    columns
}
