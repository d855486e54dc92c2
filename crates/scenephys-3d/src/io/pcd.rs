use std::io::{BufRead, BufWriter, Read, Write};
use std::path::Path;

use crate::pointcloud::PointCloud;

const MAX_POINT_STEP: usize = 1024;
const MAX_POINTS: usize = 50_000_000;

/// Error types for the PCD module.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PcdError {
    /// Failed to read or write the PCD file
    #[error("Failed to read PCD file")]
    Io(#[from] std::io::Error),

    /// Unsupported field layout or data encoding
    #[error("Unsupported PCD property: {0}")]
    UnsupportedProperty(String),

    /// Malformed PCD header
    #[error("Malformed PCD header")]
    MalformedHeader,

    /// Malformed point record in the data section
    #[error("Malformed PCD point record at index {0}")]
    MalformedPoint(usize),

    /// Invalid PCD file extension
    #[error("Invalid PCD file extension. Got:{0}")]
    InvalidFileExtension(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PcdEncoding {
    Ascii,
    Binary,
}

/// A single field in a PCD point record.
#[derive(Debug)]
struct PcdField {
    name: String,
    size: usize,
    count: usize,
    kind: char,
}

#[derive(Debug)]
struct PcdHeader {
    fields: Vec<PcdField>,
    num_points: usize,
    encoding: PcdEncoding,
}

impl PcdHeader {
    /// Index of a named field counted in values (ascii) and its byte offset (binary).
    fn locate(&self, name: &str) -> Result<(usize, usize, &PcdField), PcdError> {
        let mut value_index = 0;
        let mut byte_offset = 0;
        for field in &self.fields {
            if field.name == name {
                return Ok((value_index, byte_offset, field));
            }
            value_index += field.count;
            byte_offset += field.size * field.count;
        }
        Err(PcdError::UnsupportedProperty(format!("missing field {name}")))
    }

    fn point_step(&self) -> usize {
        self.fields.iter().map(|f| f.size * f.count).sum()
    }
}

fn parse_header<R: BufRead>(reader: &mut R) -> Result<PcdHeader, PcdError> {
    let mut names: Vec<String> = Vec::new();
    let mut sizes = Vec::new();
    let mut types = Vec::new();
    let mut counts = Vec::new();
    let mut points = None;
    let mut width_height = (None, None);

    let encoding = loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Err(PcdError::MalformedHeader);
        }
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut it = line.split_whitespace();
        let parse_usize = |v: &str| v.parse::<usize>().map_err(|_| PcdError::MalformedHeader);
        match it.next() {
            Some("FIELDS") => names = it.map(String::from).collect(),
            Some("SIZE") => sizes = it.map(parse_usize).collect::<Result<Vec<_>, _>>()?,
            Some("COUNT") => counts = it.map(parse_usize).collect::<Result<Vec<_>, _>>()?,
            Some("TYPE") => {
                types = it
                    .map(|v| v.chars().next().ok_or(PcdError::MalformedHeader))
                    .collect::<Result<Vec<_>, _>>()?
            }
            Some("WIDTH") => width_height.0 = it.next().map(parse_usize).transpose()?,
            Some("HEIGHT") => width_height.1 = it.next().map(parse_usize).transpose()?,
            Some("POINTS") => points = it.next().map(parse_usize).transpose()?,
            Some("DATA") => match it.next() {
                Some("ascii") => break PcdEncoding::Ascii,
                Some("binary") => break PcdEncoding::Binary,
                other => {
                    return Err(PcdError::UnsupportedProperty(format!(
                        "DATA {}",
                        other.unwrap_or_default()
                    )))
                }
            },
            _ => {}
        }
    };

    if names.is_empty() || sizes.len() != names.len() || types.len() != names.len() {
        return Err(PcdError::MalformedHeader);
    }
    if !counts.is_empty() && counts.len() != names.len() {
        return Err(PcdError::MalformedHeader);
    }

    let num_points = match (points, width_height) {
        (Some(n), _) => n,
        (None, (Some(w), Some(h))) => w.checked_mul(h).ok_or(PcdError::MalformedHeader)?,
        _ => return Err(PcdError::MalformedHeader),
    };
    if num_points > MAX_POINTS {
        return Err(PcdError::MalformedHeader);
    }

    let fields = names
        .into_iter()
        .enumerate()
        .map(|(i, name)| PcdField {
            name,
            size: sizes[i],
            // If COUNT is omitted, the PCD format defines a count of 1
            count: counts.get(i).copied().unwrap_or(1),
            kind: types[i],
        })
        .collect::<Vec<_>>();

    let header = PcdHeader {
        fields,
        num_points,
        encoding,
    };
    if header.point_step() > MAX_POINT_STEP {
        return Err(PcdError::MalformedHeader);
    }
    Ok(header)
}

/// Byte offsets and widths of the x, y, z fields.
fn xyz_layout(header: &PcdHeader) -> Result<[(usize, usize, usize); 3], PcdError> {
    let mut layout = [(0, 0, 0); 3];
    for (slot, name) in layout.iter_mut().zip(["x", "y", "z"]) {
        let (value_index, byte_offset, field) = header.locate(name)?;
        if field.kind != 'F' || !(field.size == 4 || field.size == 8) || field.count != 1 {
            return Err(PcdError::UnsupportedProperty(format!(
                "field {name} must be a float scalar"
            )));
        }
        *slot = (value_index, byte_offset, field.size);
    }
    Ok(layout)
}

fn read_float(buf: &[u8], offset: usize, size: usize) -> Option<f64> {
    let slice = buf.get(offset..offset + size)?;
    match size {
        4 => Some(f32::from_le_bytes(slice.try_into().ok()?) as f64),
        8 => Some(f64::from_le_bytes(slice.try_into().ok()?)),
        _ => None,
    }
}

fn read_points<R: BufRead>(reader: &mut R, header: &PcdHeader) -> Result<Vec<[f64; 3]>, PcdError> {
    let layout = xyz_layout(header)?;
    let mut points = Vec::with_capacity(header.num_points);

    match header.encoding {
        PcdEncoding::Binary => {
            let mut buffer = vec![0u8; header.point_step()];
            for index in 0..header.num_points {
                reader.read_exact(&mut buffer)?;
                let mut point = [0.0; 3];
                for (value, (_, offset, size)) in point.iter_mut().zip(layout) {
                    *value =
                        read_float(&buffer, offset, size).ok_or(PcdError::MalformedPoint(index))?;
                }
                points.push(point);
            }
        }
        PcdEncoding::Ascii => {
            let mut lines = reader.lines();
            for index in 0..header.num_points {
                let line = lines.next().ok_or(PcdError::MalformedPoint(index))??;
                let values = line.split_whitespace().collect::<Vec<_>>();
                let mut point = [0.0; 3];
                for (value, (value_index, _, _)) in point.iter_mut().zip(layout) {
                    *value = values
                        .get(value_index)
                        .and_then(|v| v.parse::<f64>().ok())
                        .ok_or(PcdError::MalformedPoint(index))?;
                }
                points.push(point);
            }
        }
    }

    // organized clouds mark missing measurements with NaN
    points.retain(|p| p.iter().all(|v| v.is_finite()));
    Ok(points)
}

/// Read a PCD file holding float `x y z` fields.
///
/// Both `DATA ascii` and `DATA binary` encodings are supported. Any other
/// field (rgb, normals, intensity) is skipped. Non finite points are dropped.
///
/// # Arguments
/// * `path` - Path to a `.pcd` file.
pub fn read_pcd(path: impl AsRef<Path>) -> Result<PointCloud, PcdError> {
    let path = path.as_ref();
    match path.extension() {
        Some(ext) if ext == "pcd" => {}
        Some(ext) => {
            return Err(PcdError::InvalidFileExtension(
                ext.to_string_lossy().to_string(),
            ))
        }
        None => return Err(PcdError::InvalidFileExtension("".into())),
    }

    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);
    let header = parse_header(&mut reader)?;
    let points = read_points(&mut reader, &header)?;

    log::debug!("Read {} points from {}", points.len(), path.display());

    Ok(PointCloud::new(points))
}

/// Write a point cloud as an ascii PCD file with `x y z` fields.
pub fn write_pcd_ascii(path: impl AsRef<Path>, cloud: &PointCloud) -> Result<(), PcdError> {
    let file = std::fs::File::create(path)?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "# .PCD v0.7 - Point Cloud Data file format")?;
    writeln!(writer, "VERSION 0.7")?;
    writeln!(writer, "FIELDS x y z")?;
    writeln!(writer, "SIZE 8 8 8")?;
    writeln!(writer, "TYPE F F F")?;
    writeln!(writer, "COUNT 1 1 1")?;
    writeln!(writer, "WIDTH {}", cloud.len())?;
    writeln!(writer, "HEIGHT 1")?;
    writeln!(writer, "VIEWPOINT 0 0 0 1 0 0 0")?;
    writeln!(writer, "POINTS {}", cloud.len())?;
    writeln!(writer, "DATA ascii")?;
    for p in cloud.points() {
        writeln!(writer, "{} {} {}", p[0], p[1], p[2])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_ascii_header() -> Result<(), PcdError> {
        let data = b"# comment
FIELDS x y z
SIZE 4 4 4
TYPE F F F
COUNT 1 1 1
POINTS 2
DATA ascii
0 0 0
1 2 3
";
        let mut reader = Cursor::new(&data[..]);
        let header = parse_header(&mut reader)?;
        assert_eq!(header.num_points, 2);
        assert_eq!(header.encoding, PcdEncoding::Ascii);
        let points = read_points(&mut reader, &header)?;
        assert_eq!(points, vec![[0.0, 0.0, 0.0], [1.0, 2.0, 3.0]]);
        Ok(())
    }

    #[test]
    fn parses_binary_with_extra_field() -> Result<(), PcdError> {
        let mut data = b"FIELDS x y z rgb
SIZE 4 4 4 4
TYPE F F F U
WIDTH 1
HEIGHT 1
DATA binary
"
        .to_vec();
        for v in [0.5f32, -1.0, 2.0] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        data.extend_from_slice(&0xff0000u32.to_le_bytes());

        let mut reader = Cursor::new(&data[..]);
        let header = parse_header(&mut reader)?;
        let points = read_points(&mut reader, &header)?;
        assert_eq!(points, vec![[0.5, -1.0, 2.0]]);
        Ok(())
    }

    #[test]
    fn rejects_wrong_type_for_xyz() -> Result<(), PcdError> {
        let data = b"FIELDS x y z
SIZE 4 4 4
TYPE I I I
COUNT 1 1 1
POINTS 5
DATA binary";
        let mut reader = Cursor::new(&data[..]);
        let header = parse_header(&mut reader)?;
        assert!(matches!(
            xyz_layout(&header),
            Err(PcdError::UnsupportedProperty(_))
        ));
        Ok(())
    }

    #[test]
    fn rejects_compressed_data() {
        let data = b"FIELDS x y z
SIZE 4 4 4
TYPE F F F
POINTS 5
DATA binary_compressed";
        let mut reader = Cursor::new(&data[..]);
        assert!(parse_header(&mut reader).is_err());
    }

    #[test]
    fn truncated_ascii_is_an_error() -> Result<(), PcdError> {
        let data = b"FIELDS x y z
SIZE 4 4 4
TYPE F F F
POINTS 2
DATA ascii
0 0 0
";
        let mut reader = Cursor::new(&data[..]);
        let header = parse_header(&mut reader)?;
        assert!(matches!(
            read_points(&mut reader, &header),
            Err(PcdError::MalformedPoint(1))
        ));
        Ok(())
    }

    #[test]
    fn write_then_read_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("cube.pcd");
        let cloud = PointCloud::new(vec![[0.125, 0.25, -0.5], [1.0, 1.0, 1.0]]);
        write_pcd_ascii(&path, &cloud)?;
        let read = read_pcd(&path)?;
        assert_eq!(read, cloud);

        let bad = dir.path().join("cube.ply");
        assert!(matches!(
            read_pcd(bad),
            Err(PcdError::InvalidFileExtension(_))
        ));
        Ok(())
    }
}
