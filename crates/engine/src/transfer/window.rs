use common::config::error::ConfigError;
use common::types::transfer::TransferUnit;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static TEMPLATE_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{(\w+)\}").expect("template field regex is valid"));

/// Render a window query template for one unit.
///
/// `{object}` becomes the unit's object name and `{fmc_window_col}` the
/// target's window column alias. Other braces are left as written.
pub fn render_window_query(template: &str, unit: &TransferUnit) -> Result<String, ConfigError> {
    let mut missing_alias = false;
    let rendered = TEMPLATE_FIELD.replace_all(template, |caps: &Captures| match &caps[1] {
        "object" => unit.object_name.clone(),
        "fmc_window_col" => match &unit.target.window_column_alias {
            Some(alias) => alias.clone(),
            None => {
                missing_alias = true;
                String::new()
            }
        },
        _ => caps[0].to_string(),
    });

    if missing_alias {
        return Err(ConfigError::invalid_template(
            unit.object_name.as_str(),
            format!(
                "window query uses {{fmc_window_col}} but {} has no fmc_window_col",
                unit.target.get_table_ref()
            ),
        ));
    }
    Ok(rendered.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::types::table::TableDescriptor;

    fn unit(alias: Option<&str>) -> TransferUnit {
        let mut target = TableDescriptor::new("stg", "orders", ["id", "loaded_at"]);
        target.window_column_alias = alias.map(str::to_string);
        TransferUnit::new(
            "orders",
            TableDescriptor::new("erp", "orders", ["id", "updated_at"]).with_window_column("updated_at"),
            target,
        )
    }

    #[test]
    fn test_substitutes_object_and_alias() {
        let sql = render_window_query(
            "SELECT max({fmc_window_col}) FROM stg.{object} WHERE src = '{object}'",
            &unit(Some("loaded_at")),
        )
        .unwrap();
        assert_eq!(sql, "SELECT max(loaded_at) FROM stg.orders WHERE src = 'orders'");
    }

    #[test]
    fn test_alias_only_required_when_referenced() {
        let sql = render_window_query("SELECT max(ts) FROM audit WHERE obj = '{object}'", &unit(None)).unwrap();
        assert_eq!(sql, "SELECT max(ts) FROM audit WHERE obj = 'orders'");

        let err = render_window_query("SELECT max({fmc_window_col}) FROM t", &unit(None)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTemplate { .. }));
    }

    #[test]
    fn test_unknown_fields_are_kept() {
        let sql = render_window_query("SELECT '{other}' FROM {object}", &unit(None)).unwrap();
        assert_eq!(sql, "SELECT '{other}' FROM orders");
    }
}
