use std::path::Path;

use anyhow::{bail, Context, Result};
use geo::{BoundingRect, Rect};
use rusqlite::{params, types::Value, Connection, OpenFlags, OptionalExtension};

use crate::{error::IndexError, tile::Crs, util::extent::Extent};

use super::{writer::FeatureSink, ExistingSnapshot, IndexEntry, IndexFormat};

pub mod blob;

/// `GPKG` in ASCII
const APPLICATION_ID: i32 = 0x4750_4B47;

/// GeoPackage 1.3.0
const USER_VERSION: i32 = 10300;

const SCHEMA: &str = r#"
    CREATE TABLE gpkg_spatial_ref_sys (
        srs_name TEXT NOT NULL,
        srs_id INTEGER NOT NULL PRIMARY KEY,
        organization TEXT NOT NULL,
        organization_coordsys_id INTEGER NOT NULL,
        definition TEXT NOT NULL,
        description TEXT
    );
    CREATE TABLE gpkg_contents (
        table_name TEXT NOT NULL PRIMARY KEY,
        data_type TEXT NOT NULL,
        identifier TEXT UNIQUE,
        description TEXT DEFAULT '',
        last_change DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
        min_x DOUBLE,
        min_y DOUBLE,
        max_x DOUBLE,
        max_y DOUBLE,
        srs_id INTEGER,
        CONSTRAINT fk_gc_r_srs_id FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
    );
    CREATE TABLE gpkg_geometry_columns (
        table_name TEXT NOT NULL,
        column_name TEXT NOT NULL,
        geometry_type_name TEXT NOT NULL,
        srs_id INTEGER NOT NULL,
        z TINYINT NOT NULL,
        m TINYINT NOT NULL,
        CONSTRAINT pk_geom_cols PRIMARY KEY (table_name, column_name),
        CONSTRAINT fk_gc_tn FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name),
        CONSTRAINT fk_gc_srs FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys (srs_id)
    );
    INSERT INTO gpkg_spatial_ref_sys VALUES
        ('Undefined cartesian SRS', -1, 'NONE', -1, 'undefined', 'undefined cartesian coordinate reference system'),
        ('Undefined geographic SRS', 0, 'NONE', 0, 'undefined', 'undefined geographic coordinate reference system');
"#;

const WGS84_WKT: &str = r#"GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AXIS["Latitude",NORTH],AXIS["Longitude",EAST],AUTHORITY["EPSG","4326"]]"#;

const WEB_MERCATOR_WKT: &str = r#"PROJCS["WGS 84 / Pseudo-Mercator",GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AUTHORITY["EPSG","4326"]],PROJECTION["Mercator_1SP"],PARAMETER["central_meridian",0],PARAMETER["scale_factor",1],PARAMETER["false_easting",0],PARAMETER["false_northing",0],UNIT["metre",1,AUTHORITY["EPSG","9001"]],AXIS["Easting",EAST],AXIS["Northing",NORTH],EXTENSION["PROJ4","+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +nadgrids=@null +wktext +no_defs"],AUTHORITY["EPSG","3857"]]"#;

/// Writes index entries into a single feature table of a GeoPackage. All
/// writes happen in one transaction that is committed in
/// [`FeatureSink::finish`].
pub struct GeoPackageSink {
    conn: Connection,
    table: String,
    insert_sql: String,
    srs_id: i32,
    extent: Option<Rect>,
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// The feature table is named after the file stem, e.g. `5` for `5.gpkg`
fn table_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "index".to_string())
}

/// Registers the CRS and returns its SRS ID. CRSs without an EPSG code map to
/// the undefined cartesian SRS.
fn register_srs(conn: &Connection, crs: &Crs) -> Result<i32> {
    let Some(code) = crs.epsg() else {
        return Ok(-1);
    };
    let definition = match code {
        4326 => WGS84_WKT,
        3857 => WEB_MERCATOR_WKT,
        _ => "undefined",
    };
    let srs_id = code as i32;
    conn.execute(
        "INSERT OR IGNORE INTO gpkg_spatial_ref_sys \
         (srs_name, srs_id, organization, organization_coordsys_id, definition) \
         VALUES (?1, ?2, 'EPSG', ?2, ?3)",
        params![crs.as_str(), srs_id, definition],
    )?;
    Ok(srs_id)
}

/// Converts a stored value to its string form
fn value_string(value: Value) -> Option<String> {
    match value {
        Value::Text(s) => Some(s),
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(f) => Some(f.to_string()),
        Value::Null | Value::Blob(_) => None,
    }
}

/// Columns of the feature table besides the path field. SQLite compares
/// column names without regard to ASCII case.
const TABLE_COLUMNS: [&str; 6] = ["fid", "geom", "tile_id", "zoom", "row", "col"];

impl FeatureSink for GeoPackageSink {
    const FORMAT: IndexFormat = IndexFormat::GeoPackage;

    fn validate_field_name(field_name: &str) -> Result<()> {
        if field_name.is_empty()
            || TABLE_COLUMNS
                .iter()
                .any(|c| c.eq_ignore_ascii_case(field_name))
        {
            bail!(
                "Invalid path field name `{field_name}'. It clashes with a column of \
                 the GeoPackage feature table."
            );
        }
        Ok(())
    }

    fn load(path: &Path, field_name: &str) -> Result<ExistingSnapshot> {
        let invalid = |reason: String| IndexError::InvalidArtifact {
            path: path.to_path_buf(),
            reason,
        };

        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;

        let table: String = conn
            .query_row(
                "SELECT table_name FROM gpkg_contents \
                 WHERE data_type = 'features' ORDER BY rowid LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| invalid(e.to_string()))?
            .ok_or_else(|| invalid("no feature table".to_string()))?;

        let geometry_column: String = conn
            .query_row(
                "SELECT column_name FROM gpkg_geometry_columns WHERE table_name = ?1",
                params![table],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| invalid(format!("table `{table}' has no geometry column")))?;

        let columns = conn
            .prepare(&format!("PRAGMA table_info({})", quote_identifier(&table)))?
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for field in ["tile_id", "zoom", "row", "col", field_name] {
            if !columns.iter().any(|c| c == field) {
                return Err(IndexError::MissingField {
                    path: path.to_path_buf(),
                    field: field.to_string(),
                }
                .into());
            }
        }

        let sql = format!(
            "SELECT {}, tile_id, zoom, \"row\", col, {} FROM {} ORDER BY rowid",
            quote_identifier(&geometry_column),
            quote_identifier(field_name),
            quote_identifier(&table),
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;

        let mut snapshot = ExistingSnapshot::default();
        while let Some(row) = rows.next()? {
            let data: Option<Vec<u8>> = row.get(0)?;
            let data = data.ok_or_else(|| invalid("feature without geometry".to_string()))?;
            let (geometry, _) = blob::decode(&data).map_err(|e| invalid(e.to_string()))?;

            let field = |i: usize, name: &str| -> Result<String> {
                let v: Value = row.get(i)?;
                value_string(v).ok_or_else(|| {
                    invalid(format!("field `{name}' must be a string or a number")).into()
                })
            };

            snapshot.insert(IndexEntry {
                tile_id: field(1, "tile_id")?,
                zoom: field(2, "zoom")?,
                row: field(3, "row")?,
                col: field(4, "col")?,
                path: field(5, field_name)?,
                geometry,
            });
        }

        Ok(snapshot)
    }

    fn create(path: &Path, crs: &Crs, field_name: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "application_id", APPLICATION_ID)?;
        conn.pragma_update(None, "user_version", USER_VERSION)?;

        conn.execute_batch("BEGIN")?;
        conn.execute_batch(SCHEMA)
            .context("Unable to initialize GeoPackage schema")?;
        let srs_id = register_srs(&conn, crs)?;

        let table = table_name(path);
        conn.execute_batch(&format!(
            "CREATE TABLE {} (\
                fid INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL, \
                geom POLYGON, \
                tile_id TEXT, \
                zoom INTEGER, \
                \"row\" INTEGER, \
                col INTEGER, \
                {} TEXT\
            )",
            quote_identifier(&table),
            quote_identifier(field_name),
        ))?;
        conn.execute(
            "INSERT INTO gpkg_contents (table_name, data_type, identifier, srs_id) \
             VALUES (?1, 'features', ?1, ?2)",
            params![table, srs_id],
        )?;
        conn.execute(
            "INSERT INTO gpkg_geometry_columns \
             (table_name, column_name, geometry_type_name, srs_id, z, m) \
             VALUES (?1, 'geom', 'POLYGON', ?2, 0, 0)",
            params![table, srs_id],
        )?;

        let insert_sql = format!(
            "INSERT INTO {} (geom, tile_id, zoom, \"row\", col, {}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            quote_identifier(&table),
            quote_identifier(field_name),
        );

        Ok(Self {
            conn,
            table,
            insert_sql,
            srs_id,
            extent: None,
        })
    }

    fn write_entry(&mut self, entry: &IndexEntry) -> Result<()> {
        // zoom, row, and col are bound as text, the column affinity turns
        // them into integers
        self.conn.prepare_cached(&self.insert_sql)?.execute(params![
            blob::encode(&entry.geometry, self.srs_id),
            entry.tile_id,
            entry.zoom,
            entry.row,
            entry.col,
            entry.path,
        ])?;
        if let Some(rect) = entry.geometry.bounding_rect() {
            self.extent.include(&rect);
        }
        Ok(())
    }

    fn finish(self) -> Result<()> {
        if let Some(extent) = self.extent {
            self.conn.execute(
                "UPDATE gpkg_contents SET min_x = ?1, min_y = ?2, max_x = ?3, max_y = ?4, \
                 last_change = strftime('%Y-%m-%dT%H:%M:%fZ','now') WHERE table_name = ?5",
                params![
                    extent.min().x,
                    extent.min().y,
                    extent.max().x,
                    extent.max().y,
                    self.table
                ],
            )?;
        }
        self.conn.execute_batch("COMMIT")?;
        self.conn.close().map_err(|(_, e)| e)?;
        Ok(())
    }
}
