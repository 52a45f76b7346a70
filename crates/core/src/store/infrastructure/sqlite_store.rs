use std::path::Path;

use rusqlite::{params, Connection};

use crate::shared::bounding_box::BoundingBox;
use crate::store::domain::embedding_store::{EmbeddingStore, StoreError};
use crate::store::domain::records::{
    Appearance, DetectionId, ImageId, PersonId, PersonRecord, StoreStats,
};

/// Three tables: persons hold descriptors as JSON float arrays (a typed,
/// ordered numeric sequence rather than an opaque blob), images are unique
/// by path, detections reference both with enforced foreign keys.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS persons (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    descriptor TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS images (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS detections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    person_id INTEGER NOT NULL REFERENCES persons (id),
    image_id INTEGER NOT NULL REFERENCES images (id),
    box_x REAL NOT NULL,
    box_y REAL NOT NULL,
    box_width REAL NOT NULL,
    box_height REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_detections_person ON detections (person_id);
";

/// SQLite-backed [`EmbeddingStore`].
///
/// Opening a store loads existing state; schema creation uses
/// `IF NOT EXISTS` and destroying data requires an explicit
/// [`EmbeddingStore::reset_schema`] call.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(path)?)
    }

    /// In-memory store for tests and throwaway runs.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }
}

impl EmbeddingStore for SqliteStore {
    fn record_image(&mut self, path: &str) -> Result<ImageId, StoreError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO images (path) VALUES (?1)",
            params![path],
        )?;
        let id = self.conn.query_row(
            "SELECT id FROM images WHERE path = ?1",
            params![path],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn create_person(&mut self, descriptor: &[f32]) -> Result<PersonId, StoreError> {
        let encoded = serde_json::to_string(descriptor)?;
        self.conn.execute(
            "INSERT INTO persons (descriptor) VALUES (?1)",
            params![encoded],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn record_detection(
        &mut self,
        person: PersonId,
        image: ImageId,
        bounds: &BoundingBox,
    ) -> Result<DetectionId, StoreError> {
        let result = self.conn.execute(
            "INSERT INTO detections (person_id, image_id, box_x, box_y, box_width, box_height)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                person,
                image,
                bounds.x,
                bounds.y,
                bounds.width,
                bounds.height
            ],
        );
        match result {
            Ok(_) => Ok(self.conn.last_insert_rowid()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
            {
                Err(StoreError::Referential { person, image })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn is_image_indexed(&self, path: &str) -> Result<bool, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM images WHERE path = ?1",
            params![path],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn list_persons(&self) -> Result<Vec<PersonRecord>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, descriptor FROM persons ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, PersonId>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut persons = Vec::new();
        for row in rows {
            let (id, encoded) = row?;
            let descriptor: Vec<f32> = serde_json::from_str(&encoded)?;
            persons.push(PersonRecord {
                id,
                descriptors: vec![descriptor],
            });
        }
        Ok(persons)
    }

    fn detections_for_person(&self, person: PersonId) -> Result<Vec<Appearance>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT i.path, d.box_x, d.box_y, d.box_width, d.box_height
             FROM detections d
             JOIN images i ON d.image_id = i.id
             WHERE d.person_id = ?1
             ORDER BY d.id ASC",
        )?;
        let rows = stmt.query_map(params![person], |row| {
            Ok(Appearance {
                image_path: row.get(0)?,
                bounding_box: BoundingBox {
                    x: row.get(1)?,
                    y: row.get(2)?,
                    width: row.get(3)?,
                    height: row.get(4)?,
                },
            })
        })?;
        let mut appearances = Vec::new();
        for row in rows {
            appearances.push(row?);
        }
        Ok(appearances)
    }

    fn stats(&self) -> Result<StoreStats, StoreError> {
        let count = |table: &str| -> Result<u64, rusqlite::Error> {
            self.conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                    row.get::<_, i64>(0)
                })
                .map(|n| n as u64)
        };
        Ok(StoreStats {
            persons: count("persons")?,
            images: count("images")?,
            detections: count("detections")?,
        })
    }

    fn reset_schema(&mut self) -> Result<(), StoreError> {
        // Drop order respects foreign key constraints.
        self.conn.execute_batch(
            "DROP TABLE IF EXISTS detections;
             DROP TABLE IF EXISTS persons;
             DROP TABLE IF EXISTS images;",
        )?;
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn in_transaction(
        &mut self,
        f: &mut dyn FnMut(&mut dyn EmbeddingStore) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        self.conn.execute_batch("BEGIN IMMEDIATE;")?;
        match f(self) {
            Ok(()) => {
                self.conn.execute_batch("COMMIT;")?;
                Ok(())
            }
            Err(e) => {
                // Best-effort rollback; the original error is the one worth surfacing.
                let _ = self.conn.execute_batch("ROLLBACK;");
                Err(e)
            }
        }
    }
}
