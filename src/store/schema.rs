use crate::catalog::LOCALES;

pub const ITEM_TABLE: &str = "item";

/// A fixed (non-locale) column of the item table
#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub sql_type: &'static str,
    pub required: bool,
}

impl Column {
    const fn new(name: &'static str, sql_type: &'static str) -> Self {
        Self { name, sql_type, required: false }
    }

    const fn required(name: &'static str, sql_type: &'static str) -> Self {
        Self { name, sql_type, required: true }
    }
}

/// Core columns, in row order; per-locale name columns follow them
pub const CORE_COLUMNS: &[Column] = &[
    Column::required("id", "INTEGER"),
    Column::required("name", "TEXT"),
    Column::new("quality", "TEXT"),
    Column::new("icon", "TEXT"),
    Column::new("class", "INTEGER"),
    Column::new("subclass", "INTEGER"),
];

/// All column names in row order, locale columns expanded
pub fn column_names() -> Vec<&'static str> {
    CORE_COLUMNS
        .iter()
        .map(|c| c.name)
        .chain(LOCALES.iter().map(|l| l.column))
        .collect()
}

/// CREATE TABLE for the item table
///
/// `id` is an INTEGER PRIMARY KEY without AUTOINCREMENT, so upstream ids are
/// stored verbatim.
pub fn generate_create_table() -> String {
    let mut columns = Vec::new();

    for col in CORE_COLUMNS {
        let pk = if col.name == "id" { " PRIMARY KEY" } else { "" };
        let null_constraint = if col.required { " NOT NULL" } else { "" };
        columns.push(format!("    {} {}{}{}", col.name, col.sql_type, pk, null_constraint));
    }

    for locale in LOCALES {
        columns.push(format!("    {} TEXT", locale.column));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
        ITEM_TABLE,
        columns.join(",\n")
    )
}

pub fn generate_insert() -> String {
    let columns = column_names();
    let placeholders: Vec<&str> = columns.iter().map(|_| "?").collect();
    format!(
        "INSERT OR IGNORE INTO {} ({}) VALUES ({})",
        ITEM_TABLE,
        columns.join(", "),
        placeholders.join(", ")
    )
}

pub fn generate_select() -> String {
    format!("SELECT {} FROM {}", column_names().join(", "), ITEM_TABLE)
}
