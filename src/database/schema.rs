// Database schema for the SQLite backend.
// Statements run one at a time, in order. Triggers make stored records write-once.

pub const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS compliance_records (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        kind TEXT NOT NULL,
        record_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        order_id TEXT NOT NULL,
        timestamp TEXT NOT NULL,
        hash TEXT NOT NULL UNIQUE,
        previous_hash TEXT NOT NULL,
        body TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_compliance_records_user ON compliance_records (user_id, seq)",
    "CREATE INDEX IF NOT EXISTS idx_compliance_records_order ON compliance_records (order_id, seq)",
    "CREATE INDEX IF NOT EXISTS idx_compliance_records_key ON compliance_records (kind, record_id, seq)",
    "CREATE INDEX IF NOT EXISTS idx_compliance_records_timestamp ON compliance_records (timestamp)",
    r#"
    CREATE TRIGGER IF NOT EXISTS compliance_records_no_update
    BEFORE UPDATE ON compliance_records
    BEGIN
        SELECT RAISE(ABORT, 'compliance records are write-once');
    END
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS compliance_records_no_delete
    BEFORE DELETE ON compliance_records
    BEGIN
        SELECT RAISE(ABORT, 'compliance records are write-once');
    END
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS chain_heads (
        user_id TEXT PRIMARY KEY,
        head_hash TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
];
