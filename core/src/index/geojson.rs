use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use anyhow::Result;
use geo::{Coord, LineString, Polygon};
use serde::{ser::SerializeMap, Deserialize, Serialize, Serializer};
use serde_json::{json, Map, Value};

use crate::{error::IndexError, tile::Crs};

use super::{writer::FeatureSink, ExistingSnapshot, IndexEntry, IndexFormat};

/// Writes index entries as a GeoJSON feature collection. Features are
/// streamed to the file; the collection is completed in [`FeatureSink::finish`].
pub struct GeoJsonSink {
    writer: BufWriter<File>,
    field_name: String,
    empty: bool,
}

#[derive(Serialize)]
struct Feature<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    properties: Properties<'a>,
    geometry: Geometry,
}

/// Properties of a feature in the order `tile_id`, `zoom`, `row`, `col`,
/// path field
struct Properties<'a> {
    entry: &'a IndexEntry,
    field_name: &'a str,
}

impl Serialize for Properties<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(5))?;
        map.serialize_entry("tile_id", &self.entry.tile_id)?;
        map.serialize_entry("zoom", &self.entry.zoom)?;
        map.serialize_entry("row", &self.entry.row)?;
        map.serialize_entry("col", &self.entry.col)?;
        map.serialize_entry(self.field_name, &self.entry.path)?;
        map.end()
    }
}

#[derive(Serialize, Deserialize)]
struct Geometry {
    #[serde(rename = "type")]
    kind: String,
    coordinates: Vec<Vec<Vec<f64>>>,
}

impl From<&Polygon> for Geometry {
    fn from(polygon: &Polygon) -> Self {
        let ring = |ls: &LineString| -> Vec<Vec<f64>> { ls.coords().map(|c| vec![c.x, c.y]).collect() };
        let mut coordinates = vec![ring(polygon.exterior())];
        coordinates.extend(polygon.interiors().iter().map(ring));
        Self {
            kind: "Polygon".to_string(),
            coordinates,
        }
    }
}

impl Geometry {
    fn into_polygon(self) -> Result<Polygon, String> {
        if self.kind != "Polygon" {
            return Err(format!("unexpected geometry type `{}'", self.kind));
        }
        let mut rings = self
            .coordinates
            .into_iter()
            .map(|ring| {
                ring.into_iter()
                    .map(|c| match c[..] {
                        [x, y, ..] => Ok(Coord { x, y }),
                        _ => Err("coordinate with less than two dimensions".to_string()),
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(LineString::new)
            })
            .collect::<Result<Vec<_>, _>>()?
            .into_iter();
        let exterior = rings.next().ok_or("polygon without rings")?;
        Ok(Polygon::new(exterior, rings.collect()))
    }
}

#[derive(Deserialize)]
struct RawFeatureCollection {
    features: Vec<RawFeature>,
}

#[derive(Deserialize)]
struct RawFeature {
    #[serde(default)]
    properties: Option<Map<String, Value>>,
    geometry: Option<Geometry>,
}

/// Converts a stored property to its string form. Numbers are accepted as
/// well as strings.
fn property_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn property(
    properties: &Map<String, Value>,
    name: &str,
    path: &Path,
) -> Result<String, IndexError> {
    match properties.get(name) {
        None | Some(Value::Null) => Err(IndexError::MissingField {
            path: path.to_path_buf(),
            field: name.to_string(),
        }),
        Some(v) => property_string(v).ok_or_else(|| IndexError::InvalidArtifact {
            path: path.to_path_buf(),
            reason: format!("field `{name}' must be a string or a number"),
        }),
    }
}

impl FeatureSink for GeoJsonSink {
    const FORMAT: IndexFormat = IndexFormat::GeoJson;

    fn load(path: &Path, field_name: &str) -> Result<ExistingSnapshot> {
        let reader = BufReader::new(File::open(path)?);
        let collection: RawFeatureCollection =
            serde_json::from_reader(reader).map_err(|e| IndexError::InvalidArtifact {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let mut snapshot = ExistingSnapshot::default();
        for feature in collection.features {
            let properties = feature.properties.unwrap_or_default();
            let geometry = feature
                .geometry
                .ok_or("feature without geometry".to_string())
                .and_then(Geometry::into_polygon)
                .map_err(|reason| IndexError::InvalidArtifact {
                    path: path.to_path_buf(),
                    reason,
                })?;
            snapshot.insert(IndexEntry {
                tile_id: property(&properties, "tile_id", path)?,
                zoom: property(&properties, "zoom", path)?,
                row: property(&properties, "row", path)?,
                col: property(&properties, "col", path)?,
                path: property(&properties, field_name, path)?,
                geometry,
            });
        }
        Ok(snapshot)
    }

    fn create(path: &Path, crs: &Crs, field_name: &str) -> Result<Self> {
        let mut writer = BufWriter::new(File::create(path)?);
        let crs = json!({
            "type": "name",
            "properties": { "name": crs.to_urn() }
        });
        write!(
            writer,
            "{{\n\"type\": \"FeatureCollection\",\n\"crs\": {crs},\n\"features\": ["
        )?;
        Ok(Self {
            writer,
            field_name: field_name.to_string(),
            empty: true,
        })
    }

    fn write_entry(&mut self, entry: &IndexEntry) -> Result<()> {
        let feature = Feature {
            kind: "Feature",
            properties: Properties {
                entry,
                field_name: &self.field_name,
            },
            geometry: Geometry::from(&entry.geometry),
        };
        self.writer
            .write_all(if self.empty { b"\n" } else { b",\n" })?;
        serde_json::to_writer(&mut self.writer, &feature)?;
        self.empty = false;
        Ok(())
    }

    fn finish(mut self) -> Result<()> {
        self.writer.write_all(b"\n]\n}\n")?;
        self.writer.flush()?;
        Ok(())
    }
}
