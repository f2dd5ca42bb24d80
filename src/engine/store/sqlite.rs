use anyhow::Result;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use r2d2_sqlite::rusqlite::{params, OpenFlags};

use crate::engine::store::{record_id, ZoneStore};
use crate::engine::zone::ZoneDefinition;

/// SQLite-based zone store
pub struct SqliteZoneStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteZoneStore {
    /// Creates a new SQLite zone store with the specified database file path.
    pub fn new(path: &str) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path)
            .with_flags(
                OpenFlags::SQLITE_OPEN_READ_WRITE |
                    OpenFlags::SQLITE_OPEN_CREATE |
                    OpenFlags::SQLITE_OPEN_URI
            )
            .with_init(|c| {
                c.busy_timeout(std::time::Duration::from_millis(500))?;
                c.pragma_update(None, "journal_mode", &"WAL")?;
                c.execute_batch(
                    "CREATE TABLE IF NOT EXISTS zones (
                        id TEXT PRIMARY KEY NOT NULL,
                        name TEXT NOT NULL,
                        latitude REAL NOT NULL,
                        longitude REAL NOT NULL,
                        radius REAL NOT NULL,
                        passive INTEGER NOT NULL DEFAULT 0,
                        icon TEXT,
                        updated_at INTEGER NOT NULL DEFAULT (strftime('%s','now'))
                    );"
                )?;
                Ok(())
            });

        let pool = Pool::builder()
            .max_size(4)
            .connection_timeout(std::time::Duration::from_secs(5))
            .build(manager)?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }
}

impl ZoneStore for SqliteZoneStore {
    fn load_all(&self) -> Result<Vec<ZoneDefinition>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, latitude, longitude, radius, passive, icon FROM zones ORDER BY id",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(ZoneDefinition {
                id: Some(row.get::<_, String>(0)?),
                name: row.get(1)?,
                latitude: row.get(2)?,
                longitude: row.get(3)?,
                radius: row.get(4)?,
                passive: row.get::<_, i64>(5)? != 0,
                icon: row.get(6)?,
            })
        })?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn save(&self, zone: &ZoneDefinition) -> Result<()> {
        let id = record_id(zone)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO zones(id,name,latitude,longitude,radius,passive,icon) VALUES (?1,?2,?3,?4,?5,?6,?7)
             ON CONFLICT(id) DO UPDATE
             SET name=excluded.name, latitude=excluded.latitude, longitude=excluded.longitude,
                 radius=excluded.radius, passive=excluded.passive, icon=excluded.icon,
                 updated_at=strftime('%s','now')",
            params![id, zone.name, zone.latitude, zone.longitude, zone.radius, zone.passive as i64, zone.icon],
        )?;
        Ok(())
    }

    fn remove(&self, id: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM zones WHERE id=?1", params![id])?;
        Ok(())
    }
}
