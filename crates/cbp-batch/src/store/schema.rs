//! SQLite schema for imported customers

use rusqlite::Connection;

/// Initialize customer database schema
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS customers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT,
            email TEXT,
            phone_number TEXT,
            state TEXT,
            city TEXT,

            -- Base64 AES ciphertext, never plaintext
            aadhaar_number_encrypted TEXT,
            pan_number_encrypted TEXT,

            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
        [],
    )?;

    // Duplicate-by-email lookups
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_customers_email ON customers(email)",
        [],
    )?;

    Ok(())
}
