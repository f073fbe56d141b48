//! Whole-store persistence.
//!
//! Rows and schemas go to two separate files in the data directory. Both are
//! written in full on every dump and must both be present and agree with each
//! other for a load to succeed; there is no partial recovery.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail, ensure};

use crate::codec::{self, Cursor};
use crate::db::Database;
use crate::db_types::{Column, Row, RowId, TableDefinition, TableSchema};
use crate::schema::MAX_TABLES;

pub const DATA_FILE: &str = "data.bin";
pub const METADATA_FILE: &str = "metadata.bin";

const MAGIC: &[u8; 4] = b"TBDB";
const FORMAT_VERSION: u8 = 1;
const KIND_DATA: u8 = b'D';
const KIND_METADATA: u8 = b'M';

#[derive(Debug, Clone)]
pub struct Snapshot {
    dir: PathBuf,
}

impl Snapshot {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn data_path(&self) -> PathBuf {
        self.dir.join(DATA_FILE)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    pub fn dump(&self, db: &Database) -> anyhow::Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating {}", self.dir.display()))?;

        let data = encode_data(db.tables()).context("encoding rows")?;
        let metadata = encode_metadata(db.tables()).context("encoding schemas")?;
        write_atomic(&self.data_path(), &data)?;
        write_atomic(&self.metadata_path(), &metadata)?;
        Ok(())
    }

    pub fn load(&self) -> anyhow::Result<Database> {
        let data_path = self.data_path();
        let metadata_path = self.metadata_path();

        let data = fs::read(&data_path)
            .with_context(|| format!("reading {}", data_path.display()))?;
        let metadata = fs::read(&metadata_path)
            .with_context(|| format!("reading {}", metadata_path.display()))?;

        let rows = decode_data(&data).with_context(|| format!("decoding {}", data_path.display()))?;
        let schemas = decode_metadata(&metadata)
            .with_context(|| format!("decoding {}", metadata_path.display()))?;

        Ok(Database::from_tables(assemble(rows, schemas)?))
    }
}

fn write_header(buf: &mut Vec<u8>, kind: u8, tables: usize) -> anyhow::Result<()> {
    buf.extend_from_slice(MAGIC);
    buf.push(FORMAT_VERSION);
    buf.push(kind);
    codec::write_len(buf, tables)
}

fn read_header(c: &mut Cursor<'_>, kind: u8) -> anyhow::Result<usize> {
    ensure!(&c.bytes::<4>()? == MAGIC, "not a snapshot file");
    let version = c.u8()?;
    ensure!(
        version == FORMAT_VERSION,
        "unsupported snapshot version {version}"
    );
    let found = c.u8()?;
    ensure!(
        found == kind,
        "expected {} snapshot, found kind {found:#04x}",
        kind as char
    );
    let tables = c.u32()? as usize;
    ensure!(tables <= MAX_TABLES, "snapshot holds {tables} tables");
    Ok(tables)
}

fn encode_data(tables: &[TableDefinition]) -> anyhow::Result<Vec<u8>> {
    let mut buf = Vec::new();
    write_header(&mut buf, KIND_DATA, tables.len())?;
    for table in tables {
        codec::write_u64(&mut buf, table.rows.len() as u64);
        for row in &table.rows {
            codec::write_u64(&mut buf, row.id);
            codec::write_len(&mut buf, row.values.len())?;
            for (column_id, value) in &row.values {
                codec::write_u32(&mut buf, *column_id);
                codec::write_value(&mut buf, value)?;
            }
        }
    }
    Ok(buf)
}

fn encode_metadata(tables: &[TableDefinition]) -> anyhow::Result<Vec<u8>> {
    let mut buf = Vec::new();
    write_header(&mut buf, KIND_METADATA, tables.len())?;
    for table in tables {
        codec::write_string(&mut buf, &table.schema.name)?;
        codec::write_len(&mut buf, table.schema.columns.len())?;
        for column in &table.schema.columns {
            codec::write_u32(&mut buf, column.id);
            codec::write_string(&mut buf, &column.name)?;
            buf.push(codec::column_type_tag(column.col_type));
            buf.push(u8::from(column.optional));
        }
    }
    Ok(buf)
}

fn decode_data(bytes: &[u8]) -> anyhow::Result<Vec<Vec<Row>>> {
    let mut c = Cursor::new(bytes);
    let table_count = read_header(&mut c, KIND_DATA)?;

    let mut tables = Vec::with_capacity(table_count);
    for _ in 0..table_count {
        let row_count = c.u64()?;
        let mut rows = Vec::new();
        for _ in 0..row_count {
            let id = c.u64()?;
            let value_count = c.u32()?;
            let mut values = BTreeMap::new();
            for _ in 0..value_count {
                let column_id = c.u32()?;
                let value = c.value()?;
                values.insert(column_id, value);
            }
            rows.push(Row { id, values });
        }
        tables.push(rows);
    }
    c.finish()?;
    Ok(tables)
}

fn decode_metadata(bytes: &[u8]) -> anyhow::Result<Vec<TableSchema>> {
    let mut c = Cursor::new(bytes);
    let table_count = read_header(&mut c, KIND_METADATA)?;

    let mut schemas = Vec::with_capacity(table_count);
    for _ in 0..table_count {
        let name = c.string()?;
        let column_count = c.u32()?;
        let mut columns = Vec::new();
        for _ in 0..column_count {
            columns.push(Column {
                id: c.u32()?,
                name: c.string()?,
                col_type: c.column_type()?,
                optional: c.bool()?,
            });
        }
        schemas.push(TableSchema { name, columns });
    }
    c.finish()?;
    Ok(schemas)
}

/// Pairs rows with their schema and checks the two files describe the same store.
fn assemble(
    rows: Vec<Vec<Row>>,
    schemas: Vec<TableSchema>,
) -> anyhow::Result<Vec<TableDefinition>> {
    ensure!(
        rows.len() == schemas.len(),
        "data holds {} tables but metadata holds {}",
        rows.len(),
        schemas.len()
    );

    let mut tables = Vec::with_capacity(rows.len());
    for (table, (rows, schema)) in rows.into_iter().zip(schemas).enumerate() {
        for (pos, column) in schema.columns.iter().enumerate() {
            if column.id as usize != pos {
                bail!("table {table}: column `{}` has id {} at position {pos}", column.name, column.id);
            }
        }
        for (pos, row) in rows.iter().enumerate() {
            ensure!(
                row.id == pos as RowId,
                "table {table}: row at position {pos} has id {}",
                row.id
            );
            if let Some(column_id) = row
                .values
                .keys()
                .find(|id| schema.column(**id).is_none())
            {
                bail!("table {table}: row {} references unknown column {column_id}", row.id);
            }
            for (column_id, value) in &row.values {
                let declared = schema.columns[*column_id as usize].col_type;
                ensure!(
                    value.column_type() == declared,
                    "table {table}: row {} holds a {} in {declared} column {column_id}",
                    row.id,
                    value.column_type()
                );
            }
        }
        tables.push(TableDefinition { schema, rows });
    }
    Ok(tables)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let tmp = path.with_extension("bin.tmp");
    fs::write(&tmp, bytes).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("renaming into {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::db_types::{ColumnType, Value};

    fn sample() -> Database {
        let mut db = Database::with_default_table();
        db.create_column(0, "name", ColumnType::Text, false).unwrap();
        db.create_column(0, "age", ColumnType::Number, true).unwrap();
        db.create_column(0, "admin", ColumnType::Bool, false).unwrap();
        for (name, age, admin) in [("none", 0, false), ("null", 100, true), ("noname", 42, false)] {
            let values = BTreeMap::from([(0, json!(name)), (1, json!(age)), (2, json!(admin))]);
            db.add_row(0, &values).unwrap();
        }
        // sparse row
        db.add_row(0, &BTreeMap::from([(0, json!("ghost"))])).unwrap();

        let t = db.create_table("empty").unwrap();
        db.create_column(t, "flag", ColumnType::Bool, false).unwrap();
        db
    }

    #[test]
    fn dump_then_load_restores_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = Snapshot::new(dir.path().join("nested"));
        let db = sample();

        snapshot.dump(&db).unwrap();
        let loaded = snapshot.load().unwrap();

        assert_eq!(loaded, db);
        assert_eq!(loaded.tables().len(), 2);
        assert_eq!(loaded.all_rows(0).unwrap().len(), 4);
        assert_eq!(
            loaded.get_row(0, 1).unwrap().columns["age"],
            Value::Number(100.0)
        );
    }

    #[test]
    fn missing_files_fail_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = Snapshot::new(dir.path());
        assert!(snapshot.load().is_err());

        snapshot.dump(&sample()).unwrap();
        fs::remove_file(snapshot.metadata_path()).unwrap();
        assert!(snapshot.load().is_err());
    }

    #[test]
    fn corrupt_data_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = Snapshot::new(dir.path());
        snapshot.dump(&sample()).unwrap();

        let mut bytes = fs::read(snapshot.data_path()).unwrap();
        bytes.truncate(bytes.len() / 2);
        fs::write(snapshot.data_path(), bytes).unwrap();

        let err = snapshot.load().unwrap_err();
        assert!(format!("{err:#}").contains(DATA_FILE));
    }

    #[test]
    fn swapped_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = Snapshot::new(dir.path());
        snapshot.dump(&sample()).unwrap();

        let data = fs::read(snapshot.data_path()).unwrap();
        let metadata = fs::read(snapshot.metadata_path()).unwrap();
        fs::write(snapshot.data_path(), metadata).unwrap();
        fs::write(snapshot.metadata_path(), data).unwrap();

        assert!(snapshot.load().is_err());
    }

    #[test]
    fn table_count_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = Snapshot::new(dir.path());
        snapshot.dump(&sample()).unwrap();
        let data = fs::read(snapshot.data_path()).unwrap();

        snapshot.dump(&Database::with_default_table()).unwrap();
        fs::write(snapshot.data_path(), data).unwrap();

        let err = snapshot.load().unwrap_err();
        assert!(err.to_string().contains("tables"));
    }

    #[test]
    fn rows_referencing_unknown_columns_are_rejected() {
        let mut schema = TableSchema::default();
        schema.columns.push(Column {
            id: 0,
            name: "a".into(),
            col_type: ColumnType::Number,
            optional: false,
        });
        let rows = vec![vec![Row {
            id: 0,
            values: BTreeMap::from([(1, Value::Number(1.0))]),
        }]];
        assert!(assemble(rows, vec![schema.clone()]).is_err());

        let gapped = vec![vec![Row {
            id: 1,
            values: BTreeMap::new(),
        }]];
        assert!(assemble(gapped, vec![schema]).is_err());
    }
}
