//! SQLite-backed customer store
//!
//! One connection shared behind a mutex. The same store is handed to the chunk
//! engine as its [`TransactionManager`], so every insert of a chunk lands inside
//! the engine's `BEGIN IMMEDIATE ... COMMIT` and disappears on `ROLLBACK`.

use super::schema;
use super::{CustomerRepository, Result, StoreError};
use crate::customer::Customer;
use crate::framework::transaction::TransactionManager;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

const SELECT_CUSTOMER: &str = r#"
    SELECT id, name, email, phone_number, aadhaar_number_encrypted,
           pan_number_encrypted, state, city
    FROM customers
"#;

pub struct SqliteCustomerStore {
    db: Arc<Mutex<Connection>>,
    staged: AtomicUsize,
    in_transaction: AtomicBool,
}

impl SqliteCustomerStore {
    /// Open (or create) the database file and ensure the schema exists
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::unavailable(format!(
                    "cannot create directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "Opened customer database");
        Self::from_connection(conn)
    }

    /// Private in-memory database, used by dry runs and tests
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        schema::init_schema(&conn)?;

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            staged: AtomicUsize::new(0),
            in_transaction: AtomicBool::new(false),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|e| StoreError::Lock(e.to_string()))
    }

    /// Rows persisted since the last `clear`
    pub fn staged(&self) -> usize {
        self.staged.load(Ordering::SeqCst)
    }
}

fn customer_from_row(row: &Row<'_>) -> rusqlite::Result<Customer> {
    Ok(Customer {
        id: Some(row.get(0)?),
        name: row.get(1)?,
        email: row.get(2)?,
        phone_number: row.get(3)?,
        aadhaar_number: row.get(4)?,
        pan_number: row.get(5)?,
        state: row.get(6)?,
        city: row.get(7)?,
    })
}

impl CustomerRepository for SqliteCustomerStore {
    fn persist(&self, customer: &Customer) -> Result<i64> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare_cached(
            r#"
            INSERT INTO customers (
                name, email, phone_number, state, city,
                aadhaar_number_encrypted, pan_number_encrypted, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )?;
        stmt.execute(params![
            customer.name,
            customer.email,
            customer.phone_number,
            customer.state,
            customer.city,
            customer.aadhaar_number,
            customer.pan_number,
            chrono::Utc::now().to_rfc3339(),
        ])?;

        self.staged.fetch_add(1, Ordering::SeqCst);
        Ok(conn.last_insert_rowid())
    }

    fn flush(&self) -> Result<()> {
        let conn = self.conn()?;

        // SQLite rolls a transaction back on its own after some errors (disk
        // full, I/O). Staged rows would then be gone without any failed insert.
        if self.in_transaction.load(Ordering::SeqCst) && conn.is_autocommit() {
            return Err(StoreError::unavailable(format!(
                "transaction closed before flush; {} staged row(s) lost",
                self.staged()
            )));
        }

        Ok(())
    }

    fn clear(&self) {
        self.staged.store(0, Ordering::SeqCst);
        match self.conn() {
            Ok(conn) => conn.flush_prepared_statement_cache(),
            Err(e) => warn!(error = %e, "Could not clear statement cache"),
        }
    }

    fn count(&self) -> Result<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM customers", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    fn find_by_email(&self, email: &str) -> Result<Option<Customer>> {
        let conn = self.conn()?;
        let sql = format!("{SELECT_CUSTOMER} WHERE email = ?1 ORDER BY id LIMIT 1");
        let customer = conn
            .query_row(&sql, params![email], customer_from_row)
            .optional()?;
        Ok(customer)
    }

    fn list(&self) -> Result<Vec<Customer>> {
        let conn = self.conn()?;
        let sql = format!("{SELECT_CUSTOMER} ORDER BY id");
        let mut stmt = conn.prepare(&sql)?;
        let customers = stmt
            .query_map([], customer_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(customers)
    }
}

impl TransactionManager for SqliteCustomerStore {
    fn begin(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        self.in_transaction.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch("COMMIT")?;
        self.in_transaction.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        let conn = self.conn()?;
        self.in_transaction.store(false, Ordering::SeqCst);
        self.staged.store(0, Ordering::SeqCst);

        if conn.is_autocommit() {
            debug!("No open transaction to roll back");
            return Ok(());
        }
        conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}
