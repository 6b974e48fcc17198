//! Database migrations - embedded SQL files
//!
//! Migrations are compiled into the binary with include_str!.
//! Each entry is (file name, sql) and entries are applied in order.

/// Main database migrations. New files are NNN_description.sql, appended here in order.
pub const MIGRATIONS: &[(&str, &str)] = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    ("001_initial_schema.sql", include_str!("001_initial_schema.sql")),
    ("002_import_batches.sql", include_str!("002_import_batches.sql")),
];
