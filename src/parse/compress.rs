//! String-compression tables for `(N)` position aliases.
//!
//! Callgrind shortens repeated names by tagging the first occurrence with a
//! numeric alias (`fn=(1) frobnicate`) and referring back by index alone
//! (`fn=(1)`). Three independent tables exist, partitioned by axis:
//! `(fn, 1)` and `(ob, 1)` are distinct bindings. `fl`, `fi` and `fe` share
//! the file table, and the called-position keys map to the same tables as
//! their uncompressed counterparts.

use std::collections::HashMap;
use std::sync::Arc;

use super::classify::PositionKey;

/// Which alias namespace a position key resolves in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Object,
    File,
    Symbol,
}

impl PositionKey {
    /// Table partition for this key.
    pub fn table(&self) -> Table {
        match self {
            PositionKey::Object => Table::Object,
            PositionKey::File | PositionKey::InlineFile | PositionKey::EndFile => Table::File,
            PositionKey::Function => Table::Symbol,
        }
    }
}

/// Why an alias reference could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveError {
    /// Aliased reference `(N)` with no prior definition.
    Missing(u64),
    /// A second naming definition for an already-bound index.
    Duplicate(u64),
}

/// The three write-once alias maps.
#[derive(Debug, Default)]
pub struct CompressionTables {
    object: HashMap<u64, Arc<str>>,
    file: HashMap<u64, Arc<str>>,
    symbol: HashMap<u64, Arc<str>>,
}

impl CompressionTables {
    fn table_mut(&mut self, table: Table) -> &mut HashMap<u64, Arc<str>> {
        match table {
            Table::Object => &mut self.object,
            Table::File => &mut self.file,
            Table::Symbol => &mut self.symbol,
        }
    }

    /// Apply the aliasing contract for one position line and yield the
    /// effective value:
    ///
    /// - index and value present: install the binding, use the value;
    /// - index only: look the binding up;
    /// - value only: use it directly, no table interaction.
    pub fn resolve(
        &mut self,
        table: Table,
        index: Option<u64>,
        value: Option<&str>,
    ) -> Result<Option<Arc<str>>, ResolveError> {
        match (index, value) {
            (Some(index), Some(value)) => {
                let map = self.table_mut(table);
                if map.contains_key(&index) {
                    return Err(ResolveError::Duplicate(index));
                }
                let value: Arc<str> = Arc::from(value);
                map.insert(index, value.clone());
                Ok(Some(value))
            }
            (Some(index), None) => match self.table_mut(table).get(&index) {
                Some(value) => Ok(Some(value.clone())),
                None => Err(ResolveError::Missing(index)),
            },
            (None, Some(value)) => Ok(Some(Arc::from(value))),
            // Neither alias nor value: nothing to yield; the assembler
            // treats the line as a grammar violation.
            (None, None) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_then_reference() {
        let mut tables = CompressionTables::default();
        let defined = tables
            .resolve(Table::Symbol, Some(1), Some("frobnicate"))
            .unwrap()
            .unwrap();
        assert_eq!(defined.as_ref(), "frobnicate");

        let referenced = tables.resolve(Table::Symbol, Some(1), None).unwrap().unwrap();
        assert_eq!(referenced.as_ref(), "frobnicate");
        // Same canonical string, not a copy.
        assert!(Arc::ptr_eq(&defined, &referenced));
    }

    #[test]
    fn test_missing_reference() {
        let mut tables = CompressionTables::default();
        assert_eq!(
            tables.resolve(Table::File, Some(7), None),
            Err(ResolveError::Missing(7))
        );
    }

    #[test]
    fn test_duplicate_definition() {
        let mut tables = CompressionTables::default();
        tables.resolve(Table::Object, Some(2), Some("a.so")).unwrap();
        assert_eq!(
            tables.resolve(Table::Object, Some(2), Some("b.so")),
            Err(ResolveError::Duplicate(2))
        );
    }

    #[test]
    fn test_tables_are_partitioned() {
        let mut tables = CompressionTables::default();
        tables.resolve(Table::Symbol, Some(1), Some("foo")).unwrap();
        tables.resolve(Table::Object, Some(1), Some("prog")).unwrap();
        tables.resolve(Table::File, Some(1), Some("a.c")).unwrap();

        let symbol = tables.resolve(Table::Symbol, Some(1), None).unwrap().unwrap();
        let object = tables.resolve(Table::Object, Some(1), None).unwrap().unwrap();
        let file = tables.resolve(Table::File, Some(1), None).unwrap().unwrap();
        assert_eq!(symbol.as_ref(), "foo");
        assert_eq!(object.as_ref(), "prog");
        assert_eq!(file.as_ref(), "a.c");
    }

    #[test]
    fn test_fife_keys_share_the_file_table() {
        assert_eq!(PositionKey::File.table(), Table::File);
        assert_eq!(PositionKey::InlineFile.table(), Table::File);
        assert_eq!(PositionKey::EndFile.table(), Table::File);
        assert_eq!(PositionKey::Function.table(), Table::Symbol);
        assert_eq!(PositionKey::Object.table(), Table::Object);
    }

    #[test]
    fn test_value_only_skips_tables() {
        let mut tables = CompressionTables::default();
        let value = tables.resolve(Table::Symbol, None, Some("main")).unwrap().unwrap();
        assert_eq!(value.as_ref(), "main");
        // No binding was installed.
        assert_eq!(
            tables.resolve(Table::Symbol, Some(1), None),
            Err(ResolveError::Missing(1))
        );
    }
}
