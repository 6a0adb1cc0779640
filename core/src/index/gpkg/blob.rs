//! Encoding and decoding of polygons as GeoPackage geometry blobs: a
//! `GP` header with an XY envelope followed by a WKB polygon

use geo::{BoundingRect, Coord, LineString, Polygon};
use thiserror::Error;

const MAGIC: &[u8; 2] = b"GP";
const WKB_POLYGON: u32 = 3;

/// Reasons why a geometry blob cannot be decoded
#[derive(Error, Debug, PartialEq, Eq)]
pub enum GeometryBlobError {
    #[error("geometry blob ends unexpectedly")]
    UnexpectedEnd,

    #[error("geometry blob does not start with `GP'")]
    InvalidMagic,

    #[error("unsupported geometry blob version {0}")]
    UnsupportedVersion(u8),

    #[error("invalid envelope indicator {0}")]
    InvalidEnvelope(u8),

    #[error("invalid byte order marker {0}")]
    InvalidByteOrder(u8),

    #[error("geometry blob is empty")]
    Empty,

    #[error("unsupported WKB geometry type {0}. Expected a polygon.")]
    UnsupportedGeometryType(u32),
}

/// Encodes a polygon with the given spatial reference system ID
pub fn encode(polygon: &Polygon, srs_id: i32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(128);
    buf.extend_from_slice(MAGIC);
    buf.push(0); // version

    // little endian, envelope [minx, maxx, miny, maxy]
    buf.push(0b0000_0011);
    buf.extend_from_slice(&srs_id.to_le_bytes());
    if let Some(rect) = polygon.bounding_rect() {
        for v in [rect.min().x, rect.max().x, rect.min().y, rect.max().y] {
            buf.extend_from_slice(&v.to_le_bytes());
        }
    } else {
        for _ in 0..4 {
            buf.extend_from_slice(&f64::NAN.to_le_bytes());
        }
    }

    buf.push(1);
    buf.extend_from_slice(&WKB_POLYGON.to_le_bytes());
    let rings = std::iter::once(polygon.exterior()).chain(polygon.interiors());
    buf.extend_from_slice(&(1 + polygon.interiors().len() as u32).to_le_bytes());
    for ring in rings {
        buf.extend_from_slice(&(ring.0.len() as u32).to_le_bytes());
        for c in ring.coords() {
            buf.extend_from_slice(&c.x.to_le_bytes());
            buf.extend_from_slice(&c.y.to_le_bytes());
        }
    }
    buf
}

/// Decodes a polygon and returns it together with its spatial reference
/// system ID
pub fn decode(blob: &[u8]) -> Result<(Polygon, i32), GeometryBlobError> {
    let mut r = BlobReader::new(blob);

    if r.bytes(2)? != MAGIC {
        return Err(GeometryBlobError::InvalidMagic);
    }
    let version = r.u8()?;
    if version != 0 {
        return Err(GeometryBlobError::UnsupportedVersion(version));
    }

    let flags = r.u8()?;
    r.little_endian = flags & 1 == 1;
    if flags & 0b0001_0000 != 0 {
        return Err(GeometryBlobError::Empty);
    }
    let envelope_len = match (flags >> 1) & 0b111 {
        0 => 0,
        1 => 32,
        2 | 3 => 48,
        4 => 64,
        e => return Err(GeometryBlobError::InvalidEnvelope(e)),
    };
    let srs_id = r.u32()? as i32;
    r.bytes(envelope_len)?;

    r.little_endian = match r.u8()? {
        0 => false,
        1 => true,
        b => return Err(GeometryBlobError::InvalidByteOrder(b)),
    };
    let geometry_type = r.u32()?;
    let dimensions = match geometry_type {
        3 => 2,
        1003 | 2003 => 3,
        3003 => 4,
        t => return Err(GeometryBlobError::UnsupportedGeometryType(t)),
    };

    let ring_count = r.u32()?;
    let mut rings = Vec::new();
    for _ in 0..ring_count {
        let point_count = r.u32()?;
        let mut coords = Vec::new();
        for _ in 0..point_count {
            let x = r.f64()?;
            let y = r.f64()?;
            r.bytes(8 * (dimensions - 2))?;
            coords.push(Coord { x, y });
        }
        rings.push(LineString::new(coords));
    }

    let mut rings = rings.into_iter();
    let exterior = rings.next().ok_or(GeometryBlobError::Empty)?;
    Ok((Polygon::new(exterior, rings.collect()), srs_id))
}

struct BlobReader<'a> {
    data: &'a [u8],
    pos: usize,
    little_endian: bool,
}

impl<'a> BlobReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            little_endian: true,
        }
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8], GeometryBlobError> {
        let end = self.pos + len;
        let r = self
            .data
            .get(self.pos..end)
            .ok_or(GeometryBlobError::UnexpectedEnd)?;
        self.pos = end;
        Ok(r)
    }

    fn u8(&mut self) -> Result<u8, GeometryBlobError> {
        Ok(self.bytes(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, GeometryBlobError> {
        let mut b = [0u8; 4];
        b.copy_from_slice(self.bytes(4)?);
        Ok(if self.little_endian {
            u32::from_le_bytes(b)
        } else {
            u32::from_be_bytes(b)
        })
    }

    fn f64(&mut self) -> Result<f64, GeometryBlobError> {
        let mut b = [0u8; 8];
        b.copy_from_slice(self.bytes(8)?);
        Ok(if self.little_endian {
            f64::from_le_bytes(b)
        } else {
            f64::from_be_bytes(b)
        })
    }
}

#[cfg(test)]
mod tests {
    use assertor::{assert_that, EqualityAssertion};
    use geo::{coord, LineString, Polygon, Rect};
    use pretty_assertions::assert_eq;

    use super::{decode, encode, GeometryBlobError};

    #[test]
    fn header() {
        let polygon = Rect::new(coord! { x: -180.0, y: 0.0 }, coord! { x: -90.0, y: 90.0 })
            .to_polygon();
        let blob = encode(&polygon, 4326);
        assert_eq!(&blob[0..8], &[b'G', b'P', 0, 3, 0xE6, 0x10, 0, 0]);
        assert_eq!(&blob[8..16], &(-180.0f64).to_le_bytes());
        assert_eq!(&blob[16..24], &(-90.0f64).to_le_bytes());
        assert_eq!(&blob[24..32], &0.0f64.to_le_bytes());
        assert_eq!(&blob[32..40], &90.0f64.to_le_bytes());

        // WKB: byte order, type, one ring with five points
        assert_eq!(&blob[40..49], &[1, 3, 0, 0, 0, 1, 0, 0, 0]);
        assert_eq!(&blob[49..53], &[5, 0, 0, 0]);
        assert_that!(blob.len()).is_equal_to(53 + 5 * 16);
    }

    #[test]
    fn decode_encoded() {
        let polygon = Rect::new(coord! { x: 1.5, y: 2.5 }, coord! { x: 3.5, y: 4.5 }).to_polygon();
        let (decoded, srs_id) = decode(&encode(&polygon, 3857)).unwrap();
        assert_eq!(decoded, polygon);
        assert_that!(srs_id).is_equal_to(3857);
    }

    /// Blobs written by other tools may use big endian WKB, no envelope,
    /// and a Z dimension
    #[test]
    fn decode_big_endian_xyz() {
        let mut blob = vec![b'G', b'P', 0, 0b0000_0000];
        blob.extend_from_slice(&4326u32.to_be_bytes());
        blob.push(0);
        blob.extend_from_slice(&1003u32.to_be_bytes());
        blob.extend_from_slice(&1u32.to_be_bytes());
        blob.extend_from_slice(&4u32.to_be_bytes());
        for (x, y) in [(0.0f64, 0.0f64), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)] {
            blob.extend_from_slice(&x.to_be_bytes());
            blob.extend_from_slice(&y.to_be_bytes());
            blob.extend_from_slice(&7.0f64.to_be_bytes());
        }

        let (decoded, srs_id) = decode(&blob).unwrap();
        let expected = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)]),
            vec![],
        );
        assert_eq!(decoded, expected);
        assert_that!(srs_id).is_equal_to(4326);
    }

    #[test]
    fn invalid_blobs() {
        assert_eq!(decode(b"XP\0\x03"), Err(GeometryBlobError::InvalidMagic));
        assert_eq!(decode(b"GP\x01\x03"), Err(GeometryBlobError::UnsupportedVersion(1)));
        assert_eq!(decode(b"GP\0\x0B"), Err(GeometryBlobError::InvalidEnvelope(5)));
        assert_eq!(decode(b"GP\0\x13"), Err(GeometryBlobError::Empty));
        assert_eq!(decode(b"GP\0"), Err(GeometryBlobError::UnexpectedEnd));

        let polygon = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 1.0, y: 1.0 }).to_polygon();
        let mut blob = encode(&polygon, 4326);
        blob[41] = 1; // WKB point
        assert_eq!(decode(&blob), Err(GeometryBlobError::UnsupportedGeometryType(1)));

        blob.truncate(60);
        blob[41] = 3;
        assert_eq!(decode(&blob), Err(GeometryBlobError::UnexpectedEnd));
    }
}
