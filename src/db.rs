use crate::config::{redact_uri, StoreConfig, StoreLocation};
use crate::data_quality;
use crate::error::{Result, StoreError};
use crate::pipeline::{self, Pipeline};
use crate::record::StartupRecord;
use crate::schema::{SchemaValidator, ValidationError};
use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection};
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

/// Documents fetched per cursor round trip
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Suffixes of the four indexes every collection carries
pub const INDEX_SUFFIXES: [&str; 4] = ["name_unique", "country_idx", "industry_idx", "founded_year_idx"];

const TAG_TABLE_SUFFIX: &str = "_industry";

// ============================================================================
// STORE
// ============================================================================

/// Document store holding startup collections.
///
/// Each collection is a table with one JSON document per row. The fields the
/// queries filter and sort on are mirrored into columns; industry tags go to
/// a side table so a record is indexed once per tag.
pub struct StartupStore {
    conn: Connection,
    validator: SchemaValidator,
}

impl StartupStore {
    /// Open the database named by `config` and check that it answers.
    pub fn connect(config: &StoreConfig) -> Result<Self> {
        let conn = match config.location()? {
            StoreLocation::Memory => Connection::open_in_memory(),
            StoreLocation::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        StoreError::Connection(format!("cannot create {}: {}", parent.display(), e))
                    })?;
                }
                let conn = Connection::open(&path).map_err(|e| {
                    StoreError::Connection(format!("cannot open {}: {}", path.display(), e))
                })?;
                // Crash recovery, as for any long-lived store file
                conn.pragma_update(None, "journal_mode", "WAL")
                    .map_err(|e| StoreError::Connection(e.to_string()))?;
                Ok(conn)
            }
        }
        .map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = StartupStore::from_connection(conn)?;
        info!(uri = %redact_uri(&config.uri), database = %config.database_name, "connected to store");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        StartupStore::connect(&StoreConfig::in_memory())
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = StartupStore {
            conn,
            validator: SchemaValidator::new(),
        };
        store.ping()?;
        store.setup_catalog()?;
        Ok(store)
    }

    /// Replace the validator, e.g. to pin the current year
    pub fn with_validator(mut self, validator: SchemaValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn validator(&self) -> &SchemaValidator {
        &self.validator
    }

    pub fn ping(&self) -> Result<()> {
        self.conn
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map(|_| ())
            .map_err(|e| StoreError::Connection(format!("ping failed: {}", e)))
    }

    fn setup_catalog(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS _collections (
                name TEXT PRIMARY KEY COLLATE NOCASE,
                created_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    /// Handle to a collection, created with its indexes on first use.
    pub fn collection(&self, name: &str) -> Result<Collection<'_>> {
        self.create_collection(name)
    }

    /// Create the collection and its indexes if missing. Idempotent.
    pub fn create_collection(&self, name: &str) -> Result<Collection<'_>> {
        validate_collection_name(name)?;
        let collection = Collection {
            store: self,
            name: name.to_string(),
        };

        if collection.exists()? {
            debug!(collection = name, "collection already exists");
        } else {
            collection.create_tables()?;
            info!(collection = name, "collection created with indexes");
        }

        Ok(collection)
    }

    pub fn list_collections(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT name FROM _collections ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(names)
    }
}

/// Letters, digits and underscores, starting with a letter. Names that
/// would collide with another collection's tag table or indexes, or with
/// SQLite's own `sqlite_` objects, are refused.
fn validate_collection_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let lower = name.to_ascii_lowercase();
    let valid = name.len() <= 64
        && chars.next().map_or(false, |c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !lower.starts_with("sqlite_")
        && !lower.ends_with(TAG_TABLE_SUFFIX)
        && !INDEX_SUFFIXES.iter().any(|suffix| lower.ends_with(&format!("_{}", suffix)));

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidCollection(name.to_string()))
    }
}

// ============================================================================
// FILTER
// ============================================================================

/// Equality and range predicates on the indexed fields. Unset means "any".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub name: Option<String>,
    pub country: Option<String>,
    pub status: Option<String>,
    /// Record carries this industry tag
    pub industry: Option<String>,
    pub founded_from: Option<i32>,
    pub founded_to: Option<i32>,
    pub min_funding: Option<f64>,
    pub max_funding: Option<f64>,
}

impl Filter {
    pub fn all() -> Self {
        Filter::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn industry(mut self, tag: impl Into<String>) -> Self {
        self.industry = Some(tag.into());
        self
    }

    /// Inclusive founding-year range; either end may stay open
    pub fn founded_between(mut self, from: Option<i32>, to: Option<i32>) -> Self {
        self.founded_from = from;
        self.founded_to = to;
        self
    }

    /// Inclusive funding range; either end may stay open
    pub fn funding_between(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_funding = min;
        self.max_funding = max;
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Filter::default()
    }

    /// WHERE fragments (joined with AND) plus their positional parameters
    fn to_sql(&self, collection: &str) -> (Vec<String>, Vec<SqlValue>) {
        let mut clauses = Vec::new();
        let mut params = Vec::new();

        if let Some(name) = &self.name {
            clauses.push("name = ?".to_string());
            params.push(SqlValue::Text(name.clone()));
        }
        if let Some(country) = &self.country {
            clauses.push("country = ?".to_string());
            params.push(SqlValue::Text(country.clone()));
        }
        if let Some(status) = &self.status {
            clauses.push("status = ?".to_string());
            params.push(SqlValue::Text(status.clone()));
        }
        if let Some(tag) = &self.industry {
            clauses.push(format!(
                "EXISTS (SELECT 1 FROM \"{c}_industry\" t WHERE t.startup_id = \"{c}\".id AND t.tag = ?)",
                c = collection
            ));
            params.push(SqlValue::Text(tag.clone()));
        }
        if let Some(from) = self.founded_from {
            clauses.push("founded_year >= ?".to_string());
            params.push(SqlValue::Integer(from.into()));
        }
        if let Some(to) = self.founded_to {
            clauses.push("founded_year <= ?".to_string());
            params.push(SqlValue::Integer(to.into()));
        }
        if let Some(min) = self.min_funding {
            clauses.push("total_funding_usd >= ?".to_string());
            params.push(SqlValue::Real(min));
        }
        if let Some(max) = self.max_funding {
            clauses.push("total_funding_usd <= ?".to_string());
            params.push(SqlValue::Real(max));
        }

        (clauses, params)
    }

    /// Same predicates evaluated against a document. After an unwind stage
    /// `industry` holds a single tag rather than an array; both forms match.
    pub fn matches(&self, doc: &Value) -> bool {
        let str_eq = |field: &str, expected: &Option<String>| {
            expected
                .as_ref()
                .map_or(true, |want| doc[field].as_str() == Some(want.as_str()))
        };

        let industry_ok = self.industry.as_ref().map_or(true, |tag| match &doc["industry"] {
            Value::String(s) => s == tag,
            Value::Array(tags) => tags.iter().any(|t| t.as_str() == Some(tag.as_str())),
            _ => false,
        });

        let year = doc["founded_year"].as_i64();
        let year_ok = self.founded_from.map_or(true, |from| year.map_or(false, |y| y >= i64::from(from)))
            && self.founded_to.map_or(true, |to| year.map_or(false, |y| y <= i64::from(to)));

        let funding = doc["total_funding_usd"].as_f64();
        let funding_ok = self.min_funding.map_or(true, |min| funding.map_or(false, |f| f >= min))
            && self.max_funding.map_or(true, |max| funding.map_or(false, |f| f <= max));

        str_eq("name", &self.name)
            && str_eq("country", &self.country)
            && str_eq("status", &self.status)
            && industry_ok
            && year_ok
            && funding_ok
    }
}

// ============================================================================
// COLLECTION
// ============================================================================

/// Counts from a bulk insert
#[derive(Debug, Default, Serialize)]
pub struct InsertSummary {
    pub inserted: usize,
    pub duplicates: usize,
    /// Input index and reason for each record the validator refused
    #[serde(skip)]
    pub rejected: Vec<(usize, ValidationError)>,
}

#[derive(Debug, Serialize)]
pub struct CollectionStats {
    pub collection: String,
    pub total_documents: i64,
    pub indexes: Vec<String>,
    pub sample_document: Option<Value>,
}

pub struct Collection<'a> {
    store: &'a StartupStore,
    name: String,
}

impl<'a> Collection<'a> {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn conn(&self) -> &'a Connection {
        &self.store.conn
    }

    fn exists(&self) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM _collections WHERE name = ?1",
            [&self.name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn create_tables(&self) -> Result<()> {
        let c = &self.name;
        let tx = self.conn().unchecked_transaction()?;

        tx.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS \"{c}\" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                doc_id TEXT NOT NULL,
                name TEXT NOT NULL,
                founded_year INTEGER NOT NULL,
                country TEXT NOT NULL,
                total_funding_usd REAL NOT NULL,
                status TEXT NOT NULL,
                document TEXT NOT NULL,
                inserted_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS \"{c}_industry\" (
                startup_id INTEGER NOT NULL REFERENCES \"{c}\"(id) ON DELETE CASCADE,
                position INTEGER NOT NULL,
                tag TEXT NOT NULL,
                PRIMARY KEY (startup_id, position)
            );

            CREATE UNIQUE INDEX IF NOT EXISTS \"{c}_name_unique\" ON \"{c}\"(name);
            CREATE INDEX IF NOT EXISTS \"{c}_country_idx\" ON \"{c}\"(country);
            CREATE INDEX IF NOT EXISTS \"{c}_industry_idx\" ON \"{c}_industry\"(tag);
            CREATE INDEX IF NOT EXISTS \"{c}_founded_year_idx\" ON \"{c}\"(founded_year DESC);"
        ))?;

        tx.execute(
            "INSERT OR IGNORE INTO _collections (name, created_at) VALUES (?1, ?2)",
            params![c, Utc::now().to_rfc3339()],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Validate, then insert. Returns the new document id.
    pub fn insert_one(&self, candidate: &Value) -> Result<String> {
        let record = self.store.validator.validate(candidate)?;
        self.write_record(&record)
    }

    /// Insert a typed record. It goes through the validator like any
    /// candidate document; non-finite amounts serialize as null and are
    /// reported missing.
    pub fn insert_record(&self, record: &StartupRecord) -> Result<String> {
        self.insert_one(&record.to_document())
    }

    fn write_record(&self, record: &StartupRecord) -> Result<String> {
        if let Some(sum) = data_quality::funding_mismatch(record) {
            warn!(
                name = %record.name,
                total = record.total_funding_usd,
                rounds = sum,
                "total funding differs from sum of rounds"
            );
        }

        let doc_id = uuid::Uuid::new_v4().to_string();
        let document = serde_json::to_string(record)?;
        let tx = self.conn().unchecked_transaction()?;

        let result = tx.execute(
            &format!(
                "INSERT INTO \"{}\" (doc_id, name, founded_year, country, total_funding_usd, status, document, inserted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                self.name
            ),
            params![
                doc_id,
                record.name,
                record.founded_year,
                record.country,
                record.total_funding_usd,
                record.status.as_str(),
                document,
                Utc::now().to_rfc3339(),
            ],
        );

        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                return Err(StoreError::DuplicateKey {
                    name: record.name.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        let row_id = tx.last_insert_rowid();
        self.write_tags(&tx, row_id, &record.industry)?;
        tx.commit()?;

        debug!(collection = %self.name, name = %record.name, "document inserted");
        Ok(doc_id)
    }

    fn write_tags(&self, conn: &Connection, row_id: i64, tags: &[String]) -> Result<()> {
        let mut stmt = conn.prepare(&format!(
            "INSERT INTO \"{}_industry\" (startup_id, position, tag) VALUES (?1, ?2, ?3)",
            self.name
        ))?;
        for (position, tag) in tags.iter().enumerate() {
            stmt.execute(params![row_id, position as i64, tag])?;
        }
        Ok(())
    }

    /// Insert each candidate, skipping duplicates and invalid records.
    /// Database failures abort the batch; earlier inserts stay.
    pub fn insert_many(&self, candidates: &[Value]) -> Result<InsertSummary> {
        let mut summary = InsertSummary::default();

        for (index, candidate) in candidates.iter().enumerate() {
            match self.insert_one(candidate) {
                Ok(_) => summary.inserted += 1,
                Err(StoreError::DuplicateKey { name }) => {
                    warn!(name = %name, "duplicate entry skipped");
                    summary.duplicates += 1;
                }
                Err(StoreError::Validation(err)) => {
                    warn!(index, error = %err, "record rejected");
                    summary.rejected.push((index, err));
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            collection = %self.name,
            inserted = summary.inserted,
            duplicates = summary.duplicates,
            rejected = summary.rejected.len(),
            "bulk insert finished"
        );
        Ok(summary)
    }

    /// Replace the stored record with the same name, keeping its document id.
    pub fn replace_one(&self, candidate: &Value) -> Result<()> {
        let record = self.store.validator.validate(candidate)?;
        let document = serde_json::to_string(&record)?;
        let tx = self.conn().unchecked_transaction()?;

        let row_id: Option<i64> = tx
            .query_row(
                &format!("SELECT id FROM \"{}\" WHERE name = ?1", self.name),
                [&record.name],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        let row_id = row_id.ok_or_else(|| StoreError::NotFound {
            name: record.name.clone(),
        })?;

        tx.execute(
            &format!(
                "UPDATE \"{}\" SET founded_year = ?1, country = ?2, total_funding_usd = ?3, status = ?4, document = ?5
                 WHERE id = ?6",
                self.name
            ),
            params![
                record.founded_year,
                record.country,
                record.total_funding_usd,
                record.status.as_str(),
                document,
                row_id,
            ],
        )?;
        tx.execute(
            &format!("DELETE FROM \"{}_industry\" WHERE startup_id = ?1", self.name),
            [row_id],
        )?;
        self.write_tags(&tx, row_id, &record.industry)?;
        tx.commit()?;

        Ok(())
    }

    /// Remove the record with this name. `false` if there was none.
    pub fn delete_one(&self, name: &str) -> Result<bool> {
        let removed = self
            .conn()
            .execute(&format!("DELETE FROM \"{}\" WHERE name = ?1", self.name), [name])?;
        Ok(removed > 0)
    }

    /// Lazy cursor over matching records, in insertion order
    pub fn find(&self, filter: &Filter) -> Result<Cursor<'a>> {
        self.find_with_batch_size(filter, DEFAULT_BATCH_SIZE)
    }

    pub fn find_with_batch_size(&self, filter: &Filter, batch_size: usize) -> Result<Cursor<'a>> {
        let (clauses, params) = filter.to_sql(&self.name);
        let mut sql = format!("SELECT id, document FROM \"{}\" WHERE id > ?", self.name);
        for clause in &clauses {
            sql.push_str(" AND ");
            sql.push_str(clause);
        }
        sql.push_str(" ORDER BY id LIMIT ?");

        Ok(Cursor {
            conn: self.conn(),
            sql,
            params,
            last_id: 0,
            batch_size: batch_size.max(1),
            buffer: VecDeque::new(),
            exhausted: false,
        })
    }

    pub fn find_one(&self, name: &str) -> Result<Option<StartupRecord>> {
        self.find(&Filter::all().name(name))?.next().transpose()
    }

    pub fn count_documents(&self, filter: &Filter) -> Result<i64> {
        let (clauses, params) = filter.to_sql(&self.name);
        let mut sql = format!("SELECT COUNT(*) FROM \"{}\"", self.name);
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        let count = self
            .conn()
            .query_row(&sql, params_from_iter(params.iter()), |row| row.get(0))?;
        Ok(count)
    }

    /// Names of this collection's indexes, sorted
    pub fn list_indexes(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn().prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'index' AND tbl_name IN (?1, ?2) AND name NOT LIKE 'sqlite_autoindex%'
             ORDER BY name",
        )?;
        let names = stmt
            .query_map(params![self.name, format!("{}_industry", self.name)], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(names)
    }

    pub fn stats(&self) -> Result<CollectionStats> {
        let sample_document = self
            .conn()
            .query_row(
                &format!("SELECT doc_id, document FROM \"{}\" ORDER BY id LIMIT 1", self.name),
                [],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?
            .map(|(doc_id, document)| -> Result<Value> {
                let mut doc: Value = serde_json::from_str(&document)?;
                doc["_id"] = Value::String(doc_id);
                Ok(doc)
            })
            .transpose()?;

        Ok(CollectionStats {
            collection: self.name.clone(),
            total_documents: self.count_documents(&Filter::all())?,
            indexes: self.list_indexes()?,
            sample_document,
        })
    }

    /// Delete every document. Irreversible. The empty collection and its
    /// indexes are recreated straight away.
    pub fn drop_collection(&self) -> Result<()> {
        let c = &self.name;
        let tx = self.conn().unchecked_transaction()?;
        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS \"{c}_industry\";
             DROP TABLE IF EXISTS \"{c}\";"
        ))?;
        tx.execute("DELETE FROM _collections WHERE name = ?1", [c])?;
        tx.commit()?;

        warn!(collection = %c, "collection dropped");
        self.create_tables()
    }

    /// Run a pipeline; a leading match stage is answered from the indexes.
    pub fn aggregate(&self, pipeline: &Pipeline) -> Result<Vec<Value>> {
        let (filter, stages) = pipeline.split_leading_match();
        let documents = self
            .find(&filter)?
            .map(|record| record.map(|r| r.to_document()));
        pipeline::execute(stages, documents)
    }
}

// ============================================================================
// CURSOR
// ============================================================================

/// Lazy result sequence. Pages through the collection by row id, so nothing
/// beyond the current batch is held in memory.
pub struct Cursor<'a> {
    conn: &'a Connection,
    sql: String,
    params: Vec<SqlValue>,
    last_id: i64,
    batch_size: usize,
    buffer: VecDeque<StartupRecord>,
    exhausted: bool,
}

impl<'a> Cursor<'a> {
    fn fetch_batch(&mut self) -> Result<()> {
        let mut bound = Vec::with_capacity(self.params.len() + 2);
        bound.push(SqlValue::Integer(self.last_id));
        bound.extend(self.params.iter().cloned());
        bound.push(SqlValue::Integer(self.batch_size as i64));

        let mut stmt = self.conn.prepare_cached(&self.sql)?;
        let rows = stmt
            .query_map(params_from_iter(bound.iter()), |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if rows.len() < self.batch_size {
            self.exhausted = true;
        }

        for (id, document) in rows {
            self.last_id = id;
            self.buffer.push_back(serde_json::from_str(&document)?);
        }

        debug!(buffered = self.buffer.len(), last_id = self.last_id, "cursor batch fetched");
        Ok(())
    }
}

impl<'a> Iterator for Cursor<'a> {
    type Item = Result<StartupRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(e) = self.fetch_batch() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Status;
    use crate::schema::Constraint;
    use serde_json::json;

    fn store() -> StartupStore {
        StartupStore::open_in_memory()
            .unwrap()
            .with_validator(SchemaValidator::with_current_year(2026))
    }

    fn startup(name: &str, country: &str, year: i32, industry: &[&str], funding: f64) -> Value {
        json!({
            "name": name,
            "founded_year": year,
            "country": country,
            "industry": industry,
            "total_funding_usd": funding,
            "status": "Operating"
        })
    }

    fn seeded(store: &StartupStore) -> Collection<'_> {
        let coll = store.collection("startups").unwrap();
        coll.insert_one(&startup("Stripe", "USA", 2010, &["FinTech", "Payments"], 2200.0)).unwrap();
        coll.insert_one(&startup("Revolut", "UK", 2015, &["FinTech", "Banking"], 916.0)).unwrap();
        coll.insert_one(&startup("OpenAI", "USA", 2015, &["AI"], 1120.0)).unwrap();
        coll.insert_one(&startup("Grab", "Singapore", 2012, &["Transportation"], 12300.0)).unwrap();
        coll
    }

    fn names(cursor: Cursor<'_>) -> Vec<String> {
        cursor.map(|r| r.unwrap().name).collect()
    }

    #[test]
    fn test_create_collection_builds_indexes() {
        let store = store();
        let coll = store.create_collection("startups").unwrap();

        assert_eq!(
            coll.list_indexes().unwrap(),
            vec![
                "startups_country_idx",
                "startups_founded_year_idx",
                "startups_industry_idx",
                "startups_name_unique",
            ]
        );
        // Second call is a no-op
        store.create_collection("startups").unwrap();
        assert_eq!(store.list_collections().unwrap(), vec!["startups"]);
    }

    #[test]
    fn test_invalid_collection_name() {
        let store = store();
        store.collection("startups").unwrap();
        for bad in [
            "",
            "1abc",
            "drop table",
            "x;--",
            "_hidden",
            "startups_industry",
            "Startups_Industry",
            "startups_country_idx",
            "sqlite_master",
        ] {
            assert!(matches!(store.collection(bad), Err(StoreError::InvalidCollection(_))), "{}", bad);
        }
    }

    #[test]
    fn test_keyword_collection_name_is_quoted() {
        let store = store();
        let coll = store.collection("order").unwrap();
        coll.insert_one(&startup("Stripe", "USA", 2010, &["FinTech"], 1.0)).unwrap();

        assert_eq!(names(coll.find(&Filter::all().industry("FinTech")).unwrap()), vec!["Stripe"]);
        assert_eq!(coll.list_indexes().unwrap().len(), INDEX_SUFFIXES.len());
        coll.drop_collection().unwrap();
        assert_eq!(coll.count_documents(&Filter::all()).unwrap(), 0);
    }

    #[test]
    fn test_insert_record_is_validated() {
        let store = store();
        let coll = store.collection("startups").unwrap();

        let err = coll
            .insert_record(&StartupRecord::new("Ancient", 1800, "USA", 5.0, Status::Operating))
            .unwrap_err();
        assert!(matches!(&err, StoreError::Validation(v) if v.field == "founded_year"), "{:?}", err);

        let err = coll
            .insert_record(&StartupRecord::new("   ", 2015, "USA", 5.0, Status::Operating))
            .unwrap_err();
        assert!(matches!(&err, StoreError::Validation(v) if v.constraint == Constraint::Blank), "{:?}", err);

        let err = coll
            .insert_record(&StartupRecord::new("Broke", 2015, "USA", -5.0, Status::Operating))
            .unwrap_err();
        assert!(matches!(&err, StoreError::Validation(v) if v.constraint == Constraint::Negative), "{:?}", err);

        // NaN serializes as null, so it is missing rather than a duplicate
        let err = coll
            .insert_record(&StartupRecord::new("NaNCo", 2015, "USA", f64::NAN, Status::Operating))
            .unwrap_err();
        assert!(!err.is_duplicate_key());
        assert!(matches!(&err, StoreError::Validation(v) if v.field == "total_funding_usd"), "{:?}", err);

        assert_eq!(coll.count_documents(&Filter::all()).unwrap(), 0);

        coll.insert_record(&StartupRecord::new("Fine", 2015, "USA", 5.0, Status::Operating).with_industry(["AI"]))
            .unwrap();
        assert_eq!(names(coll.find(&Filter::all().industry("AI")).unwrap()), vec!["Fine"]);
    }

    #[test]
    fn test_insert_and_find_one() {
        let store = store();
        let coll = seeded(&store);

        let record = coll.find_one("Revolut").unwrap().unwrap();
        assert_eq!(record.country, "UK");
        assert_eq!(record.industry, vec!["FinTech", "Banking"]);
        assert_eq!(record.employee_count, 0);
        assert!(coll.find_one("Nobody").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let store = store();
        let coll = seeded(&store);
        let before = coll.count_documents(&Filter::all()).unwrap();

        let err = coll
            .insert_one(&startup("Stripe", "Ireland", 2011, &["Payments"], 1.0))
            .unwrap_err();
        assert!(err.is_duplicate_key());
        assert_eq!(coll.count_documents(&Filter::all()).unwrap(), before);
        // Tag table untouched by the failed insert
        assert_eq!(coll.count_documents(&Filter::all().industry("Payments")).unwrap(), 1);
    }

    #[test]
    fn test_invalid_record_never_written() {
        let store = store();
        let coll = store.collection("startups").unwrap();

        let mut bad = startup("Ghost", "USA", 2015, &[], 10.0);
        bad["status"] = json!("Defunct");
        match coll.insert_one(&bad) {
            Err(StoreError::Validation(err)) => {
                assert_eq!(err.field, "status");
                assert!(matches!(err.constraint, Constraint::NotAllowed { .. }));
            }
            other => panic!("expected validation error, got {:?}", other.map(|_| ())),
        }
        assert_eq!(coll.count_documents(&Filter::all()).unwrap(), 0);
    }

    #[test]
    fn test_insert_many_summary() {
        let store = store();
        let coll = store.collection("startups").unwrap();

        let mut bad = startup("Old", "USA", 1850, &[], 10.0);
        bad["founded_year"] = json!(1850);
        let batch = vec![
            startup("A", "USA", 2015, &["AI"], 1.0),
            startup("B", "UK", 2016, &["AI"], 2.0),
            startup("A", "USA", 2015, &["AI"], 1.0),
            bad,
        ];

        let summary = coll.insert_many(&batch).unwrap();
        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(summary.rejected.len(), 1);
        assert_eq!(summary.rejected[0].0, 3);
        assert_eq!(summary.rejected[0].1.field, "founded_year");
    }

    #[test]
    fn test_filters() {
        let store = store();
        let coll = seeded(&store);

        assert_eq!(names(coll.find(&Filter::all().country("USA")).unwrap()), vec!["Stripe", "OpenAI"]);
        assert_eq!(names(coll.find(&Filter::all().industry("FinTech")).unwrap()), vec!["Stripe", "Revolut"]);
        assert_eq!(
            names(coll.find(&Filter::all().founded_between(Some(2012), Some(2015))).unwrap()),
            vec!["Revolut", "OpenAI", "Grab"]
        );
        assert_eq!(
            names(
                coll.find(&Filter::all().industry("FinTech").funding_between(Some(1000.0), None))
                    .unwrap()
            ),
            vec!["Stripe"]
        );
        assert_eq!(coll.count_documents(&Filter::all().status("Closed")).unwrap(), 0);
    }

    #[test]
    fn test_filter_sql_and_document_agree() {
        let store = store();
        let coll = seeded(&store);
        let filters = vec![
            Filter::all(),
            Filter::all().country("USA"),
            Filter::all().industry("FinTech").founded_between(Some(2011), None),
            Filter::all().funding_between(None, Some(1200.0)),
            Filter::all().name("Grab").status("Operating"),
        ];

        let all: Vec<StartupRecord> = coll.find(&Filter::all()).unwrap().map(|r| r.unwrap()).collect();
        for filter in filters {
            let from_sql = names(coll.find(&filter).unwrap());
            let in_memory: Vec<String> = all
                .iter()
                .filter(|r| filter.matches(&r.to_document()))
                .map(|r| r.name.clone())
                .collect();
            assert_eq!(from_sql, in_memory, "{:?}", filter);
        }
    }

    #[test]
    fn test_cursor_pages_lazily() {
        let store = store();
        let coll = store.collection("startups").unwrap();
        for i in 0..7 {
            coll.insert_one(&startup(&format!("S{}", i), "USA", 2000 + i, &["AI"], 1.0)).unwrap();
        }

        let mut cursor = coll.find_with_batch_size(&Filter::all(), 3).unwrap();
        assert_eq!(cursor.next().unwrap().unwrap().name, "S0");
        assert_eq!(cursor.buffer.len(), 2);

        let rest: Vec<String> = cursor.map(|r| r.unwrap().name).collect();
        assert_eq!(rest, vec!["S1", "S2", "S3", "S4", "S5", "S6"]);
    }

    #[test]
    fn test_replace_and_delete() {
        let store = store();
        let coll = seeded(&store);

        let mut updated = startup("Revolut", "UK", 2015, &["Banking", "Crypto"], 1200.0);
        updated["status"] = json!("IPO");
        coll.replace_one(&updated).unwrap();

        let record = coll.find_one("Revolut").unwrap().unwrap();
        assert_eq!(record.status, Status::Ipo);
        assert_eq!(record.total_funding_usd, 1200.0);
        assert_eq!(names(coll.find(&Filter::all().industry("FinTech")).unwrap()), vec!["Stripe"]);
        assert_eq!(names(coll.find(&Filter::all().industry("Crypto")).unwrap()), vec!["Revolut"]);

        let missing = startup("Nobody", "UK", 2015, &[], 1.0);
        assert!(matches!(coll.replace_one(&missing), Err(StoreError::NotFound { .. })));

        assert!(coll.delete_one("Revolut").unwrap());
        assert!(!coll.delete_one("Revolut").unwrap());
        assert_eq!(coll.count_documents(&Filter::all().industry("Crypto")).unwrap(), 0);
        assert_eq!(coll.count_documents(&Filter::all()).unwrap(), 3);
    }

    #[test]
    fn test_drop_collection_keeps_indexes() {
        let store = store();
        let coll = seeded(&store);
        let indexes_before = coll.list_indexes().unwrap();

        coll.drop_collection().unwrap();

        assert_eq!(coll.count_documents(&Filter::all()).unwrap(), 0);
        assert_eq!(coll.find(&Filter::all()).unwrap().count(), 0);
        assert_eq!(coll.list_indexes().unwrap(), indexes_before);
        assert_eq!(indexes_before.len(), INDEX_SUFFIXES.len());

        // Unique index still enforced after recreation
        coll.insert_one(&startup("Stripe", "USA", 2010, &[], 1.0)).unwrap();
        assert!(coll
            .insert_one(&startup("Stripe", "USA", 2010, &[], 1.0))
            .unwrap_err()
            .is_duplicate_key());
    }

    #[test]
    fn test_stats() {
        let store = store();
        let coll = store.collection("startups").unwrap();
        let empty = coll.stats().unwrap();
        assert_eq!(empty.total_documents, 0);
        assert!(empty.sample_document.is_none());

        let coll = seeded(&store);
        let stats = coll.stats().unwrap();
        assert_eq!(stats.total_documents, 4);
        assert_eq!(stats.indexes.len(), 4);
        let sample = stats.sample_document.unwrap();
        assert_eq!(sample["name"], "Stripe");
        assert!(sample["_id"].as_str().unwrap().len() == 36);
    }

    #[test]
    fn test_connect_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            uri: format!("sqlite://{}", dir.path().join("nested").display()),
            database_name: "insights".to_string(),
            collection_name: "startups".to_string(),
        };

        {
            let store = StartupStore::connect(&config).unwrap();
            let coll = store.collection(&config.collection_name).unwrap();
            coll.insert_one(&startup("Persisted", "USA", 2020, &["AI"], 5.0)).unwrap();
        }

        assert!(dir.path().join("nested").join("insights.db").exists());
        let store = StartupStore::connect(&config).unwrap();
        let coll = store.collection("startups").unwrap();
        assert!(coll.find_one("Persisted").unwrap().is_some());
    }

    #[test]
    fn test_connect_bad_uri() {
        let config = StoreConfig {
            uri: "postgres://localhost".to_string(),
            ..StoreConfig::default()
        };
        assert!(matches!(StartupStore::connect(&config), Err(StoreError::Connection(_))));
    }
}
