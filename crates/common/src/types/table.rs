use crate::config::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Bind-parameter syntax expected by a database driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaceholderStyle {
    /// `?` for every parameter (JDBC / ODBC style).
    #[default]
    QuestionMark,
    /// `$1`, `$2`, ... (Postgres wire protocol).
    Numbered,
}

impl PlaceholderStyle {
    /// Render the placeholder for the 1-based parameter `position`.
    pub fn placeholder(&self, position: usize) -> String {
        match self {
            PlaceholderStyle::QuestionMark => "?".to_string(),
            PlaceholderStyle::Numbered => format!("${}", position),
        }
    }
}

/// Table metadata from which the transfer SQL is derived.
///
/// `column_names` defines the positional column order: rows fetched with
/// [`TableDescriptor::fetch_query`] on the source are inserted with the
/// target's [`TableDescriptor::insert_query`] without any name-based
/// reordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub schema_name: String,
    pub table_name: String,
    pub column_names: Vec<String>,
    #[serde(default)]
    pub window_column_name: Option<String>,
    /// Value substituted for `{fmc_window_col}` in window query templates.
    #[serde(default, alias = "fmc_window_col")]
    pub window_column_alias: Option<String>,
}

impl TableDescriptor {
    pub fn new<S: Into<String>>(
        schema_name: impl Into<String>,
        table_name: impl Into<String>,
        column_names: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            schema_name: schema_name.into(),
            table_name: table_name.into(),
            column_names: column_names.into_iter().map(Into::into).collect(),
            window_column_name: None,
            window_column_alias: None,
        }
    }

    pub fn with_window_column(mut self, column: impl Into<String>) -> Self {
        self.window_column_name = Some(column.into());
        self
    }

    pub fn with_window_alias(mut self, alias: impl Into<String>) -> Self {
        self.window_column_alias = Some(alias.into());
        self
    }

    /// Column list must be non-empty and free of duplicates.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.column_names.is_empty() {
            return Err(ConfigError::invalid_table(
                self.get_table_ref(),
                "column_names must not be empty",
            ));
        }
        let mut seen = HashSet::new();
        for column in &self.column_names {
            if !seen.insert(column.as_str()) {
                return Err(ConfigError::invalid_table(
                    self.get_table_ref(),
                    format!("column '{}' is listed more than once", column),
                ));
            }
        }
        Ok(())
    }

    pub fn get_table_ref(&self) -> String {
        format!("{}.{}", self.schema_name, self.table_name)
    }

    fn column_list(&self) -> String {
        self.column_names.join(", ")
    }

    pub fn fetch_query(&self) -> String {
        format!("SELECT {} FROM {}", self.column_list(), self.get_table_ref())
    }

    pub fn windowed_fetch_query(&self) -> Result<String, ConfigError> {
        self.windowed_fetch_query_with(PlaceholderStyle::default())
    }

    /// Select rows strictly newer than the single bound watermark parameter.
    pub fn windowed_fetch_query_with(&self, style: PlaceholderStyle) -> Result<String, ConfigError> {
        let window_column = self
            .window_column_name
            .as_deref()
            .ok_or_else(|| ConfigError::missing_window_column(self.get_table_ref()))?;

        Ok(format!(
            "{} WHERE {} > {}",
            self.fetch_query(),
            window_column,
            style.placeholder(1)
        ))
    }

    pub fn insert_query(&self) -> String {
        self.insert_query_with(PlaceholderStyle::default())
    }

    pub fn insert_query_with(&self, style: PlaceholderStyle) -> String {
        let placeholders = (1..=self.column_names.len())
            .map(|position| style.placeholder(position))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.get_table_ref(),
            self.column_list(),
            placeholders
        )
    }

    pub fn truncate_query(&self) -> String {
        format!("DELETE FROM {}", self.get_table_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders() -> TableDescriptor {
        TableDescriptor::new("sales", "orders", ["id", "amount", "updated_at"])
    }

    #[test]
    fn test_fetch_query_selects_all_columns() {
        assert_eq!(
            orders().fetch_query(),
            "SELECT id, amount, updated_at FROM sales.orders"
        );
    }

    #[test]
    fn test_windowed_fetch_query() {
        let table = orders().with_window_column("cdc_ts");
        assert_eq!(
            table.windowed_fetch_query().unwrap(),
            "SELECT id, amount, updated_at FROM sales.orders WHERE cdc_ts > ?"
        );
        assert_eq!(
            table
                .windowed_fetch_query_with(PlaceholderStyle::Numbered)
                .unwrap(),
            "SELECT id, amount, updated_at FROM sales.orders WHERE cdc_ts > $1"
        );
    }

    #[test]
    fn test_windowed_fetch_query_without_window_column() {
        let err = orders().windowed_fetch_query().unwrap_err();
        assert!(matches!(err, ConfigError::MissingWindowColumn { .. }));
        assert!(err.to_string().contains("sales.orders"));
    }

    #[test]
    fn test_insert_query_keeps_column_order() {
        assert_eq!(
            orders().insert_query(),
            "INSERT INTO sales.orders (id, amount, updated_at) VALUES (?, ?, ?)"
        );
        assert_eq!(
            orders().insert_query_with(PlaceholderStyle::Numbered),
            "INSERT INTO sales.orders (id, amount, updated_at) VALUES ($1, $2, $3)"
        );
    }

    #[test]
    fn test_truncate_and_table_ref() {
        assert_eq!(orders().truncate_query(), "DELETE FROM sales.orders");
        assert_eq!(orders().get_table_ref(), "sales.orders");
    }

    #[test]
    fn test_validate_rejects_empty_and_duplicate_columns() {
        let empty = TableDescriptor::new("s", "t", Vec::<String>::new());
        assert!(matches!(
            empty.validate(),
            Err(ConfigError::InvalidTable { .. })
        ));

        let dup = TableDescriptor::new("s", "t", ["a", "b", "a"]);
        let err = dup.validate().unwrap_err();
        assert!(err.to_string().contains("'a'"));

        assert!(orders().validate().is_ok());
    }

    #[test]
    fn test_deserialize_accepts_fmc_window_col() {
        let table: TableDescriptor = serde_yaml::from_str(
            "
schema_name: dv
table_name: hub_customer
column_names: [customer_id, load_date]
window_column_name: load_date
fmc_window_col: load_cycle_date
",
        )
        .unwrap();
        assert_eq!(table.window_column_name.as_deref(), Some("load_date"));
        assert_eq!(table.window_column_alias.as_deref(), Some("load_cycle_date"));
    }
}
