//! Media inspection used when building attachment snapshots.
//!
//! Everything here is best effort: a file that cannot be decoded simply has no
//! dimensions and no EXIF findings.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// EXIF data worth warning about before a file is posted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ExifFinding {
    /// A non-undefined orientation tag, e.g. `orientation_rotate_90`.
    Orientation { label: String },
    /// GPS coordinates are embedded.
    Gps { latitude: bool, longitude: bool },
}

pub trait MediaProbe: Send + Sync {
    fn dimensions(&self, path: &Path) -> Option<(u32, u32)>;
    fn exif_findings(&self, path: &Path) -> BTreeSet<ExifFinding>;
    /// Classifies by the original name's extension, then by container magic.
    fn is_probably_video(&self, original_name: &str, path: &Path) -> bool;
}

/// [`MediaProbe`] backed by the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageProbe;

impl MediaProbe for ImageProbe {
    fn dimensions(&self, path: &Path) -> Option<(u32, u32)> {
        match image::image_dimensions(path) {
            Ok(dims) => Some(dims),
            Err(err) => {
                debug!(path = %path.display(), error = %err, "no image dimensions");
                None
            }
        }
    }

    fn exif_findings(&self, path: &Path) -> BTreeSet<ExifFinding> {
        match read_exif(path) {
            Some(raw) => parse_exif(&raw),
            None => BTreeSet::new(),
        }
    }

    fn is_probably_video(&self, original_name: &str, path: &Path) -> bool {
        if has_video_extension(original_name) {
            return true;
        }
        let mut head = [0u8; 12];
        let read = File::open(path)
            .and_then(|mut file| file.read(&mut head))
            .unwrap_or(0);
        has_video_magic(&head[..read])
    }
}

fn read_exif(path: &Path) -> Option<Vec<u8>> {
    use image::ImageDecoder;

    let reader = image::ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .ok()?;
    let mut decoder = reader.into_decoder().ok()?;
    decoder.exif_metadata().ok().flatten()
}

const VIDEO_EXTENSIONS: &[&str] = &["webm", "mp4", "m4v", "mkv", "mov", "avi", "3gp"];

fn has_video_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            VIDEO_EXTENSIONS
                .iter()
                .any(|video| ext.eq_ignore_ascii_case(video))
        })
        .unwrap_or(false)
}

fn has_video_magic(head: &[u8]) -> bool {
    // Matroska/WebM EBML header, or an ISO base media `ftyp` box.
    head.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) || head.get(4..8) == Some(b"ftyp".as_slice())
}

const TAG_ORIENTATION: u16 = 0x0112;
const TAG_GPS_IFD: u16 = 0x8825;
const TAG_GPS_LATITUDE: u16 = 0x0002;
const TAG_GPS_LONGITUDE: u16 = 0x0004;

/// Scans a raw EXIF block (TIFF structure, optionally behind an `Exif\0\0`
/// header) for orientation and GPS tags.
pub fn parse_exif(raw: &[u8]) -> BTreeSet<ExifFinding> {
    let mut findings = BTreeSet::new();
    let tiff = raw.strip_prefix(b"Exif\0\0").unwrap_or(raw);
    let Some(tiff) = Tiff::new(tiff) else {
        return findings;
    };
    let Some(ifd0) = tiff.u32_at(4) else {
        return findings;
    };

    let mut gps_offset = None;
    for entry in tiff.entries(ifd0 as usize) {
        match entry.tag {
            TAG_ORIENTATION => {
                if let Some(label) = tiff.u16_at(entry.value_at).and_then(orientation_label) {
                    findings.insert(ExifFinding::Orientation {
                        label: label.to_string(),
                    });
                }
            }
            TAG_GPS_IFD => gps_offset = tiff.u32_at(entry.value_at),
            _ => {}
        }
    }

    if let Some(offset) = gps_offset {
        let tags: Vec<u16> = tiff.entries(offset as usize).map(|e| e.tag).collect();
        let latitude = tags.contains(&TAG_GPS_LATITUDE);
        let longitude = tags.contains(&TAG_GPS_LONGITUDE);
        if latitude || longitude {
            findings.insert(ExifFinding::Gps {
                latitude,
                longitude,
            });
        }
    }
    findings
}

fn orientation_label(value: u16) -> Option<&'static str> {
    let label = match value {
        1 => "orientation_normal",
        2 => "orientation_flip_horizontal",
        3 => "orientation_rotate_180",
        4 => "orientation_flip_vertical",
        5 => "orientation_transpose",
        6 => "orientation_rotate_90",
        7 => "orientation_transverse",
        8 => "orientation_rotate_270",
        0 => return None,
        _ => "orientation_undefined",
    };
    Some(label)
}

struct Tiff<'a> {
    bytes: &'a [u8],
    little_endian: bool,
}

struct IfdEntry {
    tag: u16,
    value_at: usize,
}

impl<'a> Tiff<'a> {
    fn new(bytes: &'a [u8]) -> Option<Self> {
        let little_endian = match bytes.get(0..2)? {
            b"II" => true,
            b"MM" => false,
            _ => return None,
        };
        let tiff = Self {
            bytes,
            little_endian,
        };
        (tiff.u16_at(2)? == 42).then_some(tiff)
    }

    fn u16_at(&self, at: usize) -> Option<u16> {
        let raw: [u8; 2] = self.bytes.get(at..at + 2)?.try_into().ok()?;
        Some(if self.little_endian {
            u16::from_le_bytes(raw)
        } else {
            u16::from_be_bytes(raw)
        })
    }

    fn u32_at(&self, at: usize) -> Option<u32> {
        let raw: [u8; 4] = self.bytes.get(at..at + 4)?.try_into().ok()?;
        Some(if self.little_endian {
            u32::from_le_bytes(raw)
        } else {
            u32::from_be_bytes(raw)
        })
    }

    /// Entries of the IFD at `offset`; truncated tables yield what fits.
    fn entries(&self, offset: usize) -> impl Iterator<Item = IfdEntry> + '_ {
        let count = self.u16_at(offset).unwrap_or(0) as usize;
        (0..count).map_while(move |i| {
            let at = offset + 2 + i * 12;
            let tag = self.u16_at(at)?;
            self.bytes.get(at..at + 12)?;
            Some(IfdEntry {
                tag,
                value_at: at + 8,
            })
        })
    }
}
