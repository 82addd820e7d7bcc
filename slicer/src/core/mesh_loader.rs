//! # Mesh Loading
//!
//! Readers for the mesh formats the slicer accepts and writers for STL.
//! Every reader streams triangles into the same [`Mesh`] insertion path, so
//! Z-quantization, vertex deduplication, and degenerate-face rejection
//! behave identically regardless of the source format.
//!
//! ## Supported Formats
//!
//! - **STL**: ASCII and binary, auto-detected from the file header.
//! - **OBJ**: `v` and `f` lines; everything else is ignored.
//! - **OFF**: header, counts, vertex block, face block.
//! - **3MJ**: JSON mesh interchange, optionally gzip-compressed.
//!
//! 3MF and AMF extensions are recognized but rejected as unsupported.
//!
//! On load the model is releveled so its lowest point sits on the build
//! plate (`minz == 0`).

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use flate2::read::GzDecoder;
use gcode_types::float_fmt;
use geom_types::Vector3;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::mesh::{Mesh, Z_QUANTUM};

/// Errors specific to mesh reading and writing.
#[derive(Debug, Error)]
pub enum MeshLoadError {
    #[error("unsupported mesh format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid STL file: {0}")]
    InvalidStl(String),

    #[error("invalid OBJ file: {0}")]
    InvalidObj(String),

    #[error("invalid OFF file: {0}")]
    InvalidOff(String),

    #[error("invalid 3MJ file: {0}")]
    Invalid3mj(String),

    #[error("mesh I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Detected mesh file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshFormat {
    StlAscii,
    StlBinary,
    Obj,
    Off,
    ThreeMj,
    Unsupported,
}

impl MeshFormat {
    pub fn name(&self) -> &'static str {
        match self {
            MeshFormat::StlAscii => "STL (ASCII)",
            MeshFormat::StlBinary => "STL (Binary)",
            MeshFormat::Obj => "Wavefront OBJ",
            MeshFormat::Off => "OFF",
            MeshFormat::ThreeMj => "3MJ",
            MeshFormat::Unsupported => "unsupported",
        }
    }
}

/// Detects the format of a mesh file from its extension, sniffing the
/// header to split ASCII from binary STL.
pub fn detect_format(path: &Path) -> Result<MeshFormat, MeshLoadError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "stl" => {
            let mut head = [0u8; 80];
            let mut file = File::open(path)?;
            let n = file.read(&mut head)?;
            let head = &head[..n];
            // An ASCII file starts with "solid " and has a short first line.
            if head.starts_with(b"solid ") && head.contains(&b'\n') {
                Ok(MeshFormat::StlAscii)
            } else {
                Ok(MeshFormat::StlBinary)
            }
        }
        "obj" => Ok(MeshFormat::Obj),
        "off" => Ok(MeshFormat::Off),
        "3mj" => Ok(MeshFormat::ThreeMj),
        _ => Ok(MeshFormat::Unsupported),
    }
}

/// Reads a mesh file in any supported format and drops it onto the build
/// plate.
pub fn read_mesh(path: &Path) -> Result<Mesh, MeshLoadError> {
    let format = detect_format(path)?;
    info!("loading model {:?} as {}", path.display(), format.name());
    let mut mesh = match format {
        MeshFormat::StlAscii => read_stl_ascii(path)?,
        MeshFormat::StlBinary => read_stl_binary(path)?,
        MeshFormat::Obj => read_obj(path)?,
        MeshFormat::Off => read_off(path)?,
        MeshFormat::ThreeMj => read_3mj(path)?,
        MeshFormat::Unsupported => {
            return Err(MeshLoadError::UnsupportedFormat(
                path.display().to_string(),
            ))
        }
    };
    mesh.name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    mesh.relevel();
    debug!(
        "loaded {} triangles, {} points",
        mesh.triangle_count(),
        mesh.points.len()
    );
    Ok(mesh)
}

fn parse_floats(words: &[&str]) -> Option<Vec<f64>> {
    words.iter().map(|w| w.parse().ok()).collect()
}

fn read_stl_ascii(path: &Path) -> Result<Mesh, MeshLoadError> {
    let file = File::open(path)?;
    let mut mesh = Mesh::new();
    let mut norm = Vector3::ZERO;
    let mut verts: Vec<[f64; 3]> = Vec::with_capacity(3);
    for line in BufReader::new(file).lines() {
        let line = line?;
        let line = line.trim().to_ascii_lowercase();
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.first().copied() {
            Some("facet") => {
                // "facet normal nx ny nz"
                if words.len() == 5 && words[1] == "normal" {
                    if let Some(vals) = parse_floats(&words[2..]) {
                        norm = Vector3::new(vals[0], vals[1], vals[2]);
                        verts.clear();
                        continue;
                    }
                }
                warn!("skipping malformed facet line: {:?}", line);
                verts.clear();
            }
            Some("vertex") => {
                if let Some(vals) = parse_floats(&words[1..]) {
                    if vals.len() == 3 {
                        verts.push([vals[0], vals[1], vals[2]]);
                        if verts.len() == 3 {
                            mesh.add_triangle([verts[0], verts[1], verts[2]], norm, Z_QUANTUM);
                            verts.clear();
                        }
                        continue;
                    }
                }
                warn!("skipping malformed vertex line: {:?}", line);
            }
            Some("endsolid") => break,
            _ => {}
        }
    }
    if mesh.triangle_count() == 0 {
        return Err(MeshLoadError::InvalidStl("no facets found".to_string()));
    }
    Ok(mesh)
}

fn read_stl_binary(path: &Path) -> Result<Mesh, MeshLoadError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut header = [0u8; 80];
    reader.read_exact(&mut header).map_err(|_| {
        MeshLoadError::InvalidStl("unexpected EOF in binary STL header".to_string())
    })?;
    let count = reader.read_u32::<LittleEndian>().map_err(|_| {
        MeshLoadError::InvalidStl("unexpected EOF reading facet count".to_string())
    })?;
    let mut mesh = Mesh::new();
    for n in 0..count {
        let mut record = [0.0f64; 12];
        for val in &mut record {
            *val = reader.read_f32::<LittleEndian>().map_err(|_| {
                MeshLoadError::InvalidStl(format!("unexpected EOF in facet {}", n))
            })? as f64;
        }
        reader.read_u16::<LittleEndian>().map_err(|_| {
            MeshLoadError::InvalidStl(format!("unexpected EOF in facet {}", n))
        })?;
        let norm = Vector3::new(record[0], record[1], record[2]);
        mesh.add_triangle(
            [
                [record[3], record[4], record[5]],
                [record[6], record[7], record[8]],
                [record[9], record[10], record[11]],
            ],
            norm,
            Z_QUANTUM,
        );
    }
    Ok(mesh)
}

fn read_obj(path: &Path) -> Result<Mesh, MeshLoadError> {
    let file = File::open(path)?;
    let mut mesh = Mesh::new();
    let mut vertices: Vec<[f64; 3]> = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.first().copied() {
            Some("v") => {
                let vals = parse_floats(&words[1..]).filter(|v| v.len() >= 3).ok_or_else(
                    || MeshLoadError::InvalidObj(format!("bad vertex line: {:?}", line)),
                )?;
                vertices.push([vals[0], vals[1], vals[2]]);
            }
            Some("f") => {
                let mut face: Vec<usize> = Vec::with_capacity(words.len() - 1);
                for word in &words[1..] {
                    // "f v", "f v/vt", "f v/vt/vn", and "f v//vn" forms;
                    // only the vertex reference matters here.
                    let vref = word.split('/').next().unwrap_or("");
                    let idx: i64 = vref.parse().map_err(|_| {
                        MeshLoadError::InvalidObj(format!("bad face reference: {:?}", word))
                    })?;
                    let resolved = if idx < 0 {
                        vertices.len() as i64 + idx
                    } else {
                        idx - 1
                    };
                    if resolved < 0 || resolved as usize >= vertices.len() {
                        return Err(MeshLoadError::InvalidObj(format!(
                            "face references missing vertex {}",
                            idx
                        )));
                    }
                    face.push(resolved as usize);
                }
                // Fan-triangulate polygons.
                for i in 1..face.len().saturating_sub(1) {
                    mesh.add_triangle(
                        [vertices[face[0]], vertices[face[i]], vertices[face[i + 1]]],
                        Vector3::ZERO,
                        Z_QUANTUM,
                    );
                }
            }
            _ => {}
        }
    }
    if mesh.triangle_count() == 0 {
        return Err(MeshLoadError::InvalidObj("no faces found".to_string()));
    }
    Ok(mesh)
}

fn read_off(path: &Path) -> Result<Mesh, MeshLoadError> {
    let file = File::open(path)?;
    let mut lines = BufReader::new(file)
        .lines()
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty() && !l.starts_with('#'));
    let header = lines
        .next()
        .ok_or_else(|| MeshLoadError::InvalidOff("empty file".to_string()))?;
    if !header.starts_with("OFF") {
        return Err(MeshLoadError::InvalidOff("missing OFF header".to_string()));
    }
    // Counts may share the header line or follow on their own line.
    let counts_line = {
        let rest = header["OFF".len()..].trim().to_string();
        if rest.is_empty() {
            lines
                .next()
                .ok_or_else(|| MeshLoadError::InvalidOff("missing counts".to_string()))?
        } else {
            rest
        }
    };
    let counts: Vec<usize> = counts_line
        .split_whitespace()
        .map(|w| w.parse().ok())
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| MeshLoadError::InvalidOff("bad counts line".to_string()))?;
    if counts.len() < 2 {
        return Err(MeshLoadError::InvalidOff("bad counts line".to_string()));
    }
    let (nverts, nfaces) = (counts[0], counts[1]);

    let mut vertices: Vec<[f64; 3]> = Vec::with_capacity(nverts);
    for _ in 0..nverts {
        let line = lines
            .next()
            .ok_or_else(|| MeshLoadError::InvalidOff("unexpected EOF in vertices".to_string()))?;
        let vals = parse_floats(&line.split_whitespace().collect::<Vec<_>>())
            .filter(|v| v.len() >= 3)
            .ok_or_else(|| MeshLoadError::InvalidOff(format!("bad vertex line: {:?}", line)))?;
        vertices.push([vals[0], vals[1], vals[2]]);
    }
    let mut mesh = Mesh::new();
    for _ in 0..nfaces {
        let line = lines
            .next()
            .ok_or_else(|| MeshLoadError::InvalidOff("unexpected EOF in faces".to_string()))?;
        let nums: Vec<usize> = line
            .split_whitespace()
            .map(|w| w.parse().ok())
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| MeshLoadError::InvalidOff(format!("bad face line: {:?}", line)))?;
        let (&n, face) = nums
            .split_first()
            .ok_or_else(|| MeshLoadError::InvalidOff(format!("bad face line: {:?}", line)))?;
        if face.len() < n || n < 3 {
            return Err(MeshLoadError::InvalidOff(format!("bad face line: {:?}", line)));
        }
        for &idx in &face[..n] {
            if idx >= vertices.len() {
                return Err(MeshLoadError::InvalidOff(format!(
                    "face references missing vertex {}",
                    idx
                )));
            }
        }
        for i in 1..n - 1 {
            mesh.add_triangle(
                [vertices[face[0]], vertices[face[i]], vertices[face[i + 1]]],
                Vector3::ZERO,
                Z_QUANTUM,
            );
        }
    }
    Ok(mesh)
}

#[derive(Debug, Deserialize)]
struct ThreeMjFile {
    format: String,
    vertices: Vec<ThreeMjVertex>,
    volumes: Vec<ThreeMjVolume>,
}

#[derive(Debug, Deserialize)]
struct ThreeMjVertex {
    c: [f64; 3],
}

#[derive(Debug, Deserialize)]
struct ThreeMjVolume {
    triangles: Vec<ThreeMjTriangle>,
}

#[derive(Debug, Deserialize)]
struct ThreeMjTriangle {
    v: [usize; 3],
}

fn read_3mj(path: &Path) -> Result<Mesh, MeshLoadError> {
    let raw = fs::read(path)?;
    // 3MJ files may be gzip-compressed; sniff the magic.
    let text = if raw.starts_with(&[0x1f, 0x8b]) {
        let mut out = Vec::new();
        GzDecoder::new(raw.as_slice()).read_to_end(&mut out)?;
        out
    } else {
        raw
    };
    let parsed: ThreeMjFile = serde_json::from_slice(&text)
        .map_err(|e| MeshLoadError::Invalid3mj(e.to_string()))?;
    if parsed.format != "3MJ/1.0" {
        return Err(MeshLoadError::Invalid3mj(format!(
            "unsupported format tag {:?}",
            parsed.format
        )));
    }
    let mut mesh = Mesh::new();
    for volume in &parsed.volumes {
        for tri in &volume.triangles {
            let mut verts = [[0.0; 3]; 3];
            for (slot, &vi) in verts.iter_mut().zip(tri.v.iter()) {
                let vertex = parsed.vertices.get(vi).ok_or_else(|| {
                    MeshLoadError::Invalid3mj(format!("triangle references missing vertex {}", vi))
                })?;
                *slot = vertex.c;
            }
            mesh.add_triangle(verts, Vector3::ZERO, Z_QUANTUM);
        }
    }
    Ok(mesh)
}

/// Writes the mesh as binary STL, triangles in deterministic sorted order.
pub fn write_stl_binary(mesh: &Mesh, path: &Path) -> Result<(), MeshLoadError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let mut header = [0u8; 80];
    let tag = b"Binary STL Model";
    header[..tag.len()].copy_from_slice(tag);
    writer.write_all(&header)?;
    writer.write_u32::<LittleEndian>(mesh.triangles.len() as u32)?;
    for idx in mesh.triangles.sorted_indices(&mesh.points) {
        let tri = mesh.triangles.triangle(idx);
        let coords = mesh.triangles.coords(&mesh.points, idx);
        for val in [tri.norm.x, tri.norm.y, tri.norm.z] {
            writer.write_f32::<LittleEndian>(val as f32)?;
        }
        for coord in coords {
            for val in [coord.x, coord.y, coord.z] {
                writer.write_f32::<LittleEndian>(val as f32)?;
            }
        }
        writer.write_u16::<LittleEndian>(0)?;
    }
    Ok(())
}

/// Writes the mesh as ASCII STL, triangles in deterministic sorted order.
pub fn write_stl_ascii(mesh: &Mesh, path: &Path) -> Result<(), MeshLoadError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "solid Model")?;
    for idx in mesh.triangles.sorted_indices(&mesh.points) {
        let tri = mesh.triangles.triangle(idx);
        let coords = mesh.triangles.coords(&mesh.points, idx);
        writeln!(
            writer,
            "  facet normal {} {} {}",
            float_fmt(tri.norm.x),
            float_fmt(tri.norm.y),
            float_fmt(tri.norm.z)
        )?;
        writeln!(writer, "    outer loop")?;
        for coord in coords {
            writeln!(
                writer,
                "      vertex {} {} {}",
                float_fmt(coord.x),
                float_fmt(coord.y),
                float_fmt(coord.z)
            )?;
        }
        writeln!(writer, "    endloop")?;
        writeln!(writer, "  endfacet")?;
    }
    writeln!(writer, "endsolid Model")?;
    Ok(())
}
