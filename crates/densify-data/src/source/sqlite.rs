//! SQLite record source.
//!
//! A source database holds the trading calendar, the security universe and
//! one table per job. Date columns are `YYYYMMDD` text (integers are
//! accepted too); period-anchored tables store the report period in their
//! date column. Dates are compared as text so both storage classes order
//! against the bound the same way.

use super::{DEFAULT_PAGE_SIZE, RecordSource};
use crate::error::{DataError, Result};
use densify_panel::{
    AnchorMode, Cell, DateKey, RawRow, RecordBatch, ReportPeriod, SecurityUniverse,
    TradingCalendar, Value,
};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, Row, params};
use std::path::Path;
use tracing::debug;

/// Connection to a source database.
#[derive(Debug)]
pub struct SourceDb {
    conn: Connection,
    page_size: usize,
}

impl SourceDb {
    /// Open an existing source database read-only.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| DataError::SourceUnavailable(format!("{}: {e}", path.display())))?;
        Ok(Self {
            conn,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    /// Create an empty in-memory source (useful for testing).
    pub fn in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    /// Set the number of rows fetched per page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Rows fetched per page.
    pub const fn page_size(&self) -> usize {
        self.page_size
    }

    /// Underlying connection.
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Read the trading calendar from `trade_calendar(trade_date)`.
    pub fn calendar(&self) -> Result<TradingCalendar> {
        let mut stmt = self
            .conn
            .prepare("SELECT trade_date FROM trade_calendar ORDER BY trade_date")
            .map_err(|e| unavailable("trade_calendar", e))?;
        let mut rows = stmt.query([]).map_err(|e| unavailable("trade_calendar", e))?;

        let mut dates = Vec::new();
        while let Some(row) = rows.next().map_err(|e| unavailable("trade_calendar", e))? {
            dates.push(read_date(row.get_ref(0)?)?);
        }
        Ok(TradingCalendar::new(dates))
    }

    /// Read the universe from `security_universe(entity_id, position)`.
    pub fn universe(&self) -> Result<SecurityUniverse> {
        let mut stmt = self
            .conn
            .prepare("SELECT entity_id FROM security_universe ORDER BY position, entity_id")
            .map_err(|e| unavailable("security_universe", e))?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| unavailable("security_universe", e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| unavailable("security_universe", e))?;
        Ok(SecurityUniverse::new(ids))
    }

    /// Record source over one table.
    pub fn table(&self, spec: TableSpec) -> SqliteRecordSource<'_> {
        SqliteRecordSource { db: self, spec }
    }
}

/// Where and how to read one job's records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    /// Table name
    pub table: String,
    /// Entity identifier column
    pub entity_column: String,
    /// Effective-date (or report-period) column
    pub date_column: String,
    /// How records are anchored
    pub anchor: AnchorMode,
    /// Extra SQL predicate rows must satisfy
    pub filter: Option<String>,
    /// Column ordering rows that share an entity and date
    pub tie_order: Option<String>,
    /// Drop entities whose identifier starts with an ASCII letter
    pub exclude_alpha_entities: bool,
}

impl TableSpec {
    /// Point-in-time table keyed by an effective-date column.
    pub fn point_in_time(
        table: impl Into<String>,
        entity_column: impl Into<String>,
        date_column: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            entity_column: entity_column.into(),
            date_column: date_column.into(),
            anchor: AnchorMode::PointInTime,
            filter: None,
            tie_order: None,
            exclude_alpha_entities: false,
        }
    }

    /// Period-anchored table keyed by a report-period column.
    pub fn periodic(
        table: impl Into<String>,
        entity_column: impl Into<String>,
        period_column: impl Into<String>,
    ) -> Self {
        Self {
            anchor: AnchorMode::PeriodStart,
            ..Self::point_in_time(table, entity_column, period_column)
        }
    }

    /// Only read rows matching `predicate`.
    pub fn with_filter(mut self, predicate: impl Into<String>) -> Self {
        self.filter = Some(predicate.into());
        self
    }

    /// Order same-date rows by `column` before insertion order, so the
    /// last row of a tie is the one with the greatest `column`.
    pub fn with_tie_order(mut self, column: impl Into<String>) -> Self {
        self.tie_order = Some(column.into());
        self
    }

    /// Skip entities whose identifier starts with an ASCII letter.
    pub fn excluding_alpha_entities(mut self) -> Self {
        self.exclude_alpha_entities = true;
        self
    }

    fn conditions(&self, entity: &str) -> Vec<String> {
        let mut conditions = Vec::new();
        if let Some(filter) = &self.filter {
            conditions.push(format!("({filter})"));
        }
        if self.exclude_alpha_entities {
            conditions.push(format!("{entity} NOT GLOB '[A-Za-z]*'"));
        }
        conditions
    }

    fn order_by(&self, prefix: &str) -> Result<String> {
        let mut keys = vec![
            format!("{prefix}{}", quote_ident(&self.entity_column)?),
            date_expr(prefix, &self.date_column)?,
        ];
        if let Some(column) = &self.tie_order {
            keys.push(format!("{prefix}{}", quote_ident(column)?));
        }
        keys.push(format!("{prefix}rowid"));
        Ok(keys.join(", "))
    }
}

/// Paginated reader over one table of a [`SourceDb`].
#[derive(Debug)]
pub struct SqliteRecordSource<'a> {
    db: &'a SourceDb,
    spec: TableSpec,
}

impl SqliteRecordSource<'_> {
    /// Table layout.
    pub const fn spec(&self) -> &TableSpec {
        &self.spec
    }

    fn select_sql(&self, factors: &[String]) -> Result<String> {
        let entity = quote_ident(&self.spec.entity_column)?;
        let date = quote_ident(&self.spec.date_column)?;
        let table = quote_ident(&self.spec.table)?;
        let columns = quoted_columns(factors, "")?;

        let mut conditions = vec![format!("{} >= ?1", date_expr("", &self.spec.date_column)?)];
        conditions.extend(self.spec.conditions(&entity));

        Ok(format!(
            "SELECT {entity}, {date}{columns} FROM {table} WHERE {} \
             ORDER BY {} LIMIT ?2 OFFSET ?3",
            conditions.join(" AND "),
            self.spec.order_by("")?
        ))
    }

    fn latest_before_sql(&self, factors: &[String]) -> Result<String> {
        let entity = quote_ident(&self.spec.entity_column)?;
        let date = quote_ident(&self.spec.date_column)?;
        let table = quote_ident(&self.spec.table)?;
        let columns = quoted_columns(factors, "t.")?;

        let inner_date = date_expr("", &self.spec.date_column)?;
        let outer_date = date_expr("t.", &self.spec.date_column)?;

        let conditions = self.spec.conditions(&entity);
        let mut inner = vec![format!("{inner_date} < ?1")];
        inner.extend(conditions.iter().cloned());
        let outer = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        Ok(format!(
            "SELECT t.{entity}, t.{date}{columns} FROM {table} AS t \
             JOIN (SELECT {entity} AS e, MAX({inner_date}) AS d FROM {table} WHERE {} GROUP BY {entity}) AS m \
             ON t.{entity} = m.e AND {outer_date} = m.d{outer} \
             ORDER BY {}",
            inner.join(" AND "),
            self.spec.order_by("t.")?
        ))
    }

    fn read_row(&self, row: &Row<'_>, n_factors: usize) -> Result<RawRow> {
        let entity_id: String = row.get(0)?;
        let raw_date = row.get_ref(1)?;

        let (effective_date, report_period) = match self.spec.anchor {
            AnchorMode::PointInTime => (read_date(raw_date)?, None),
            AnchorMode::PeriodStart => {
                let raw = date_text(raw_date)?;
                (DateKey::parse(&raw)?, Some(ReportPeriod::parse(&raw)?))
            }
        };

        let cells = (0..n_factors)
            .map(|i| read_cell(row.get_ref(i + 2)?))
            .collect::<Result<Vec<_>>>()?;

        Ok(RawRow {
            entity_id,
            effective_date,
            report_period,
            cells,
        })
    }
}

impl RecordSource for SqliteRecordSource<'_> {
    fn fetch(&self, factors: &[String], from: DateKey) -> Result<RecordBatch> {
        let table = &self.spec.table;
        let sql = self.select_sql(factors)?;
        let mut stmt = self.db.conn.prepare(&sql).map_err(|e| unavailable(table, e))?;

        let page_size = self.db.page_size;
        let mut batch = RecordBatch::new(factors.to_vec());
        let mut offset = 0usize;

        loop {
            let mut rows = stmt
                .query(params![from.to_string(), page_size as i64, offset as i64])
                .map_err(|e| unavailable(table, e))?;

            let mut fetched = 0usize;
            while let Some(row) = rows.next().map_err(|e| unavailable(table, e))? {
                batch.push(self.read_row(row, factors.len())?)?;
                fetched += 1;
            }
            debug!(table = %table, offset, rows = fetched, "fetched page");

            if fetched < page_size {
                break;
            }
            offset += fetched;
        }

        Ok(batch)
    }

    fn fetch_latest_before(&self, factors: &[String], before: DateKey) -> Result<RecordBatch> {
        let table = &self.spec.table;
        let sql = self.latest_before_sql(factors)?;
        let mut stmt = self.db.conn.prepare(&sql).map_err(|e| unavailable(table, e))?;
        let mut rows = stmt
            .query(params![before.to_string()])
            .map_err(|e| unavailable(table, e))?;

        let mut batch = RecordBatch::new(factors.to_vec());
        while let Some(row) = rows.next().map_err(|e| unavailable(table, e))? {
            batch.push(self.read_row(row, factors.len())?)?;
        }
        debug!(table = %table, rows = batch.len(), before = %before, "fetched latest rows");
        Ok(batch)
    }
}

fn unavailable(table: &str, err: rusqlite::Error) -> DataError {
    DataError::SourceUnavailable(format!("{table}: {err}"))
}

/// Double-quote an identifier, rejecting anything but `[A-Za-z0-9_]`.
fn quote_ident(name: &str) -> Result<String> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DataError::Schema(format!("invalid identifier: {name:?}")));
    }
    Ok(format!("\"{name}\""))
}

/// `column` as text, so integer and text dates compare alike.
fn date_expr(prefix: &str, column: &str) -> Result<String> {
    Ok(format!("CAST({prefix}{} AS TEXT)", quote_ident(column)?))
}

fn quoted_columns(factors: &[String], prefix: &str) -> Result<String> {
    factors.iter().try_fold(String::new(), |mut acc, f| {
        acc.push_str(", ");
        acc.push_str(prefix);
        acc.push_str(&quote_ident(f)?);
        Ok(acc)
    })
}

fn date_text(value: ValueRef<'_>) -> Result<String> {
    match value {
        ValueRef::Text(bytes) => std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|e| DataError::Schema(format!("date is not UTF-8: {e}"))),
        ValueRef::Integer(n) => Ok(n.to_string()),
        other => Err(DataError::Schema(format!(
            "unsupported date value of type {}",
            other.data_type()
        ))),
    }
}

fn read_date(value: ValueRef<'_>) -> Result<DateKey> {
    Ok(DateKey::parse(&date_text(value)?)?)
}

fn read_cell(value: ValueRef<'_>) -> Result<Cell> {
    match value {
        ValueRef::Null => Ok(Cell::Missing),
        ValueRef::Integer(n) => Ok(Cell::Value(Value::from(n))),
        ValueRef::Real(v) => Ok(Cell::reported(Value::number(v))),
        ValueRef::Text(bytes) => std::str::from_utf8(bytes)
            .map(|s| Cell::Value(Value::from(s)))
            .map_err(|e| DataError::Schema(format!("text value is not UTF-8: {e}"))),
        ValueRef::Blob(_) => Err(DataError::Schema("blob values are not supported".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn source_db() -> SourceDb {
        let db = SourceDb::in_memory().unwrap();
        db.connection()
            .execute_batch(
                "CREATE TABLE trade_calendar (trade_date TEXT NOT NULL);
                 INSERT INTO trade_calendar VALUES ('20160105'), ('20160104'), ('20160106');
                 CREATE TABLE security_universe (entity_id TEXT NOT NULL, position INTEGER NOT NULL);
                 INSERT INTO security_universe VALUES ('000002.SZ', 1), ('000001.SZ', 0);
                 CREATE TABLE ASHAREHOLDERNUMBER (
                     S_INFO_WINDCODE TEXT, ANN_DT TEXT, S_HOLDER_NUM REAL
                 );
                 INSERT INTO ASHAREHOLDERNUMBER VALUES
                     ('000001.SZ', '20151201', 100.0),
                     ('000001.SZ', '20151215', 110.0),
                     ('000001.SZ', '20160105', 120.0),
                     ('000002.SZ', '20160104', NULL),
                     ('000002.SZ', '20160106', 7),
                     ('A00001.SZ', '20160104', 1.0);
                 CREATE TABLE ASHAREANNFINANCIALINDICATOR (
                     S_INFO_WINDCODE TEXT, REPORT_PERIOD TEXT, ROE_DILUTED REAL
                 );
                 INSERT INTO ASHAREANNFINANCIALINDICATOR VALUES
                     ('000001.SZ', '20151231', 0.11),
                     ('000001.SZ', '20160630', 0.05);",
            )
            .unwrap();
        db
    }

    fn holders() -> TableSpec {
        TableSpec::point_in_time("ASHAREHOLDERNUMBER", "S_INFO_WINDCODE", "ANN_DT")
            .excluding_alpha_entities()
    }

    fn factors() -> Vec<String> {
        vec!["S_HOLDER_NUM".to_string()]
    }

    fn key(raw: &str) -> DateKey {
        DateKey::parse(raw).unwrap()
    }

    #[test]
    fn test_calendar_and_universe() {
        let db = source_db();
        let calendar = db.calendar().unwrap();
        assert_eq!(calendar.len(), 3);
        assert_eq!(calendar.first(), Some(key("20160104")));
        let universe = db.universe().unwrap();
        assert_eq!(universe.ids(), &["000001.SZ", "000002.SZ"]);
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(1000)]
    fn test_fetch_is_page_size_independent(#[case] page_size: usize) {
        let db = source_db().with_page_size(page_size);
        let batch = db.table(holders()).fetch(&factors(), key("20151210")).unwrap();

        let rows: Vec<(String, String)> = batch
            .rows()
            .iter()
            .map(|r| (r.entity_id.clone(), r.effective_date.to_string()))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("000001.SZ".to_string(), "20151215".to_string()),
                ("000001.SZ".to_string(), "20160105".to_string()),
                ("000002.SZ".to_string(), "20160104".to_string()),
                ("000002.SZ".to_string(), "20160106".to_string()),
            ]
        );
        assert_eq!(batch.rows()[2].cells, vec![Cell::Missing]);
        assert_eq!(batch.rows()[3].cells, vec![Cell::Value(Value::Number(7.0))]);
    }

    #[test]
    fn test_tie_order_sorts_same_date_rows() {
        let db = source_db();
        db.connection()
            .execute_batch(
                "CREATE TABLE HOLDERS (CODE TEXT, ANN_DT TEXT, END_DT TEXT, N REAL);
                 INSERT INTO HOLDERS VALUES
                     ('000001.SZ', '20160104', '20151231', 2.0),
                     ('000001.SZ', '20160104', '20150930', 1.0);",
            )
            .unwrap();
        let spec = TableSpec::point_in_time("HOLDERS", "CODE", "ANN_DT").with_tie_order("END_DT");
        let batch = db
            .table(spec)
            .fetch(&["N".to_string()], key("20160101"))
            .unwrap();
        let cells: Vec<&Cell> = batch.rows().iter().map(|r| &r.cells[0]).collect();
        assert_eq!(
            cells,
            vec![&Cell::Value(Value::Number(1.0)), &Cell::Value(Value::Number(2.0))]
        );
    }

    #[test]
    fn test_fetch_with_filter() {
        let db = source_db();
        let spec = holders().with_filter("S_HOLDER_NUM > 105");
        let batch = db.table(spec).fetch(&factors(), key("20150101")).unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_fetch_latest_before() {
        let db = source_db();
        let batch = db
            .table(holders())
            .fetch_latest_before(&factors(), key("20160105"))
            .unwrap();
        let rows: Vec<(&str, String)> = batch
            .rows()
            .iter()
            .map(|r| (r.entity_id.as_str(), r.effective_date.to_string()))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("000001.SZ", "20151215".to_string()),
                ("000002.SZ", "20160104".to_string()),
            ]
        );
    }

    #[test]
    fn test_fetch_periodic() {
        let db = source_db();
        let spec =
            TableSpec::periodic("ASHAREANNFINANCIALINDICATOR", "S_INFO_WINDCODE", "REPORT_PERIOD");
        let batch = db
            .table(spec)
            .fetch(&["ROE_DILUTED".to_string()], key("20160101"))
            .unwrap();
        assert_eq!(batch.len(), 1);
        let row = &batch.rows()[0];
        assert_eq!(row.report_period, Some(ReportPeriod::parse("20160630").unwrap()));
    }

    #[test]
    fn test_rejects_bad_identifiers() {
        let db = source_db();
        let spec = TableSpec::point_in_time("t; DROP TABLE x", "S_INFO_WINDCODE", "ANN_DT");
        assert!(matches!(
            db.table(spec).fetch(&factors(), key("20160101")),
            Err(DataError::Schema(_))
        ));
    }

    #[test]
    fn test_missing_table_is_unavailable() {
        let db = source_db();
        let spec = TableSpec::point_in_time("NOPE", "S_INFO_WINDCODE", "ANN_DT");
        assert!(matches!(
            db.table(spec).fetch(&factors(), key("20160101")),
            Err(DataError::SourceUnavailable(_))
        ));
    }

    #[test]
    fn test_read_cell() {
        assert_eq!(read_cell(ValueRef::Null).unwrap(), Cell::Missing);
        assert_eq!(read_cell(ValueRef::Real(f64::NAN)).unwrap(), Cell::Missing);
        assert_eq!(
            read_cell(ValueRef::Text(b"ST")).unwrap(),
            Cell::Value(Value::from("ST"))
        );
        assert!(read_cell(ValueRef::Blob(b"\x00")).is_err());
    }
}
