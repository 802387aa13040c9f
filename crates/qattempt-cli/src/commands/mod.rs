pub mod init;
pub mod regrade;
pub mod run;
pub mod show;
pub mod validate;

/// Format an optional mark to two decimals, or `-`.
pub(crate) fn format_mark(mark: Option<f64>) -> String {
    mark.map_or_else(|| "-".to_string(), |m| format!("{m:.2}"))
}
