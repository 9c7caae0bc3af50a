use super::aliases::{AliasTable, FieldKey};
use std::collections::BTreeMap;

pub fn normalize_header(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Index of the first header matching any alias, trying aliases in priority order.
/// Duplicate headers are not disambiguated: the leftmost match wins.
pub fn resolve_column(headers: &[String], aliases: &[String]) -> Option<usize> {
    let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
    aliases.iter().find_map(|alias| {
        let want = normalize_header(alias);
        normalized.iter().position(|h| *h == want)
    })
}

/// Field key -> column index, built once per source file.
#[derive(Debug, Clone, Default)]
pub struct ColumnMapping {
    columns: BTreeMap<FieldKey, usize>,
}

impl ColumnMapping {
    pub fn get(&self, key: FieldKey) -> Option<usize> {
        self.columns.get(&key).copied()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = FieldKey> + '_ {
        self.columns.keys().copied()
    }
}

pub struct ColumnResolver<'a> {
    table: &'a AliasTable,
}

impl<'a> ColumnResolver<'a> {
    pub fn new(table: &'a AliasTable) -> Self {
        Self { table }
    }

    pub fn map_columns(&self, headers: &[String]) -> ColumnMapping {
        let mut columns = BTreeMap::new();
        for field in self.table.fields() {
            if let Some(idx) = resolve_column(headers, &field.aliases) {
                columns.insert(field.key, idx);
            }
        }
        ColumnMapping { columns }
    }
}
