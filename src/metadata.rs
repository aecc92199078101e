//! Tabular metadata extraction for DICOM image folders.
//!
//! Reads the header of every `.dcm` file in a directory and writes one CSV row
//! per readable file. The first column is always `__filename`; the remaining
//! columns are either every attribute keyword seen across the batch or a
//! caller-chosen list. Files that fail to parse are skipped and reported,
//! never fatal.

use crate::{Error, Result};
use log::{info, warn};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Name of the leading CSV column
pub const FILENAME_COLUMN: &str = "__filename";

/// Attributes of the imaging use case, in column order
pub const USECASE_ATTRIBUTES: &[&str] = &[
    "PatientID",
    "PatientName",
    "PatientSex",
    "PatientAge",
    "PatientBirthDate",
    "StudyDate",
    "StudyTime",
    "StudyDescription",
    "StudyInstanceUID",
    "SeriesDescription",
    "SeriesNumber",
    "SeriesInstanceUID",
    "Modality",
    "Manufacturer",
    "ManufacturerModelName",
    "BodyPartExamined",
    "ProtocolName",
    "AcquisitionDate",
    "AcquisitionTime",
    "ImageType",
    "InstanceNumber",
    "Rows",
    "Columns",
    "PixelSpacing",
    "SliceThickness",
    "PhotometricInterpretation",
    "ReferringPhysicianName",
    "AccessionNumber",
    "InstitutionName",
    "SoftwareVersions",
];

/// Reads the attribute map of one file
pub trait MetadataReader {
    fn read(&self, path: &Path) -> Result<BTreeMap<String, String>>;

    /// Whether `keyword` can ever appear in a map returned by `read`
    fn recognizes(&self, _keyword: &str) -> bool {
        true
    }
}

/// Which columns follow `__filename`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AttributeSelection {
    /// Sorted union of every keyword found in the batch
    #[default]
    All,
    /// Exactly these keywords, in this order; missing values are empty
    Selected(Vec<String>),
}

impl AttributeSelection {
    pub fn usecase() -> Self {
        AttributeSelection::Selected(USECASE_ATTRIBUTES.iter().map(|s| s.to_string()).collect())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    pub attributes: AttributeSelection,
    /// Only the first `n` candidate files (in name order)
    pub max_files: Option<usize>,
}

/// A candidate file that was not turned into a row
#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct ExtractReport {
    pub output: PathBuf,
    pub columns: Vec<String>,
    pub rows: usize,
    pub skipped: Vec<SkippedFile>,
}

/// Extract metadata for every `.dcm` file in `dir` into `out_csv`
pub fn extract_metadata(
    dir: impl AsRef<Path>,
    out_csv: impl AsRef<Path>,
    options: &ExtractOptions,
    reader: &dyn MetadataReader,
) -> Result<ExtractReport> {
    let dir = dir.as_ref();
    let out_csv = out_csv.as_ref();

    let mut files = candidate_files(dir)?;
    if let Some(max) = options.max_files {
        files.truncate(max);
    }

    let mut rows: Vec<(String, BTreeMap<String, String>)> = Vec::with_capacity(files.len());
    let mut skipped = Vec::new();
    for path in files {
        match reader.read(&path) {
            Ok(attrs) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                rows.push((name, attrs));
            }
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                skipped.push(SkippedFile {
                    path,
                    reason: e.to_string(),
                });
            }
        }
    }

    if let AttributeSelection::Selected(list) = &options.attributes {
        let mut reported = BTreeSet::new();
        for keyword in list.iter().filter(|k| !reader.recognizes(k.as_str())) {
            if reported.insert(keyword.as_str()) {
                warn!(
                    "Unknown attribute keyword {:?}; its column in {} will be empty",
                    keyword,
                    out_csv.display()
                );
            }
        }
    }

    let attributes: Vec<String> = match &options.attributes {
        AttributeSelection::All => rows
            .iter()
            .flat_map(|(_, attrs)| attrs.keys())
            .filter(|k| k.as_str() != FILENAME_COLUMN)
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect(),
        AttributeSelection::Selected(list) => list.clone(),
    };

    if let Some(parent) = out_csv.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut out = BufWriter::new(fs::File::create(out_csv)?);

    let mut columns = Vec::with_capacity(attributes.len() + 1);
    columns.push(FILENAME_COLUMN.to_string());
    columns.extend(attributes.iter().cloned());
    write_record(&mut out, columns.iter().map(String::as_str))?;

    for (name, attrs) in &rows {
        let values = std::iter::once(name.as_str()).chain(
            attributes
                .iter()
                .map(|a| attrs.get(a).map(String::as_str).unwrap_or("")),
        );
        write_record(&mut out, values)?;
    }
    out.flush()?;

    info!(
        "Wrote metadata for {} files to {} ({} skipped)",
        rows.len(),
        out_csv.display(),
        skipped.len()
    );

    Ok(ExtractReport {
        output: out_csv.to_path_buf(),
        columns,
        rows: rows.len(),
        skipped,
    })
}

fn candidate_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_dcm = path
            .extension()
            .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case("dcm"))
            .unwrap_or(false);
        if is_dcm && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn write_record<'a, W: Write>(out: &mut W, fields: impl Iterator<Item = &'a str>) -> Result<()> {
    let line = fields.map(csv_field).collect::<Vec<_>>().join(",");
    out.write_all(line.as_bytes())?;
    out.write_all(b"\r\n")?;
    Ok(())
}

/// Quote a field when it holds a delimiter, quote or line break
fn csv_field(value: &str) -> Cow<'_, str> {
    if value.contains(|c: char| matches!(c, ',' | '"' | '\r' | '\n')) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

const PREAMBLE_LEN: usize = 128;
const MAGIC: &[u8; 4] = b"DICM";
const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;

const TRANSFER_SYNTAX: (u16, u16) = (0x0002, 0x0010);
const PIXEL_DATA: (u16, u16) = (0x7FE0, 0x0010);
const ITEM: (u16, u16) = (0xFFFE, 0xE000);
const ITEM_END: (u16, u16) = (0xFFFE, 0xE00D);
const SEQUENCE_END: (u16, u16) = (0xFFFE, 0xE0DD);

const IMPLICIT_LITTLE: &str = "1.2.840.10008.1.2";
const EXPLICIT_BIG: &str = "1.2.840.10008.1.2.2";
const DEFLATED: &str = "1.2.840.10008.1.2.1.99";

/// (group, element, VR, keyword)
const DICTIONARY: &[(u16, u16, &str, &str)] = &[
    (0x0008, 0x0005, "CS", "SpecificCharacterSet"),
    (0x0008, 0x0008, "CS", "ImageType"),
    (0x0008, 0x0012, "DA", "InstanceCreationDate"),
    (0x0008, 0x0016, "UI", "SOPClassUID"),
    (0x0008, 0x0018, "UI", "SOPInstanceUID"),
    (0x0008, 0x0020, "DA", "StudyDate"),
    (0x0008, 0x0021, "DA", "SeriesDate"),
    (0x0008, 0x0022, "DA", "AcquisitionDate"),
    (0x0008, 0x0023, "DA", "ContentDate"),
    (0x0008, 0x0030, "TM", "StudyTime"),
    (0x0008, 0x0031, "TM", "SeriesTime"),
    (0x0008, 0x0032, "TM", "AcquisitionTime"),
    (0x0008, 0x0033, "TM", "ContentTime"),
    (0x0008, 0x0050, "SH", "AccessionNumber"),
    (0x0008, 0x0060, "CS", "Modality"),
    (0x0008, 0x0070, "LO", "Manufacturer"),
    (0x0008, 0x0080, "LO", "InstitutionName"),
    (0x0008, 0x0090, "PN", "ReferringPhysicianName"),
    (0x0008, 0x1010, "SH", "StationName"),
    (0x0008, 0x1030, "LO", "StudyDescription"),
    (0x0008, 0x103E, "LO", "SeriesDescription"),
    (0x0008, 0x1090, "LO", "ManufacturerModelName"),
    (0x0010, 0x0010, "PN", "PatientName"),
    (0x0010, 0x0020, "LO", "PatientID"),
    (0x0010, 0x0030, "DA", "PatientBirthDate"),
    (0x0010, 0x0040, "CS", "PatientSex"),
    (0x0010, 0x1010, "AS", "PatientAge"),
    (0x0010, 0x1020, "DS", "PatientSize"),
    (0x0010, 0x1030, "DS", "PatientWeight"),
    (0x0018, 0x0015, "CS", "BodyPartExamined"),
    (0x0018, 0x0050, "DS", "SliceThickness"),
    (0x0018, 0x0060, "DS", "KVP"),
    (0x0018, 0x1020, "LO", "SoftwareVersions"),
    (0x0018, 0x1030, "LO", "ProtocolName"),
    (0x0018, 0x5100, "CS", "PatientPosition"),
    (0x0018, 0x5101, "CS", "ViewPosition"),
    (0x0020, 0x000D, "UI", "StudyInstanceUID"),
    (0x0020, 0x000E, "UI", "SeriesInstanceUID"),
    (0x0020, 0x0010, "SH", "StudyID"),
    (0x0020, 0x0011, "IS", "SeriesNumber"),
    (0x0020, 0x0013, "IS", "InstanceNumber"),
    (0x0020, 0x0032, "DS", "ImagePositionPatient"),
    (0x0020, 0x0037, "DS", "ImageOrientationPatient"),
    (0x0020, 0x0052, "UI", "FrameOfReferenceUID"),
    (0x0020, 0x0060, "CS", "Laterality"),
    (0x0028, 0x0002, "US", "SamplesPerPixel"),
    (0x0028, 0x0004, "CS", "PhotometricInterpretation"),
    (0x0028, 0x0010, "US", "Rows"),
    (0x0028, 0x0011, "US", "Columns"),
    (0x0028, 0x0030, "DS", "PixelSpacing"),
    (0x0028, 0x0100, "US", "BitsAllocated"),
    (0x0028, 0x0101, "US", "BitsStored"),
    (0x0028, 0x0102, "US", "HighBit"),
    (0x0028, 0x0103, "US", "PixelRepresentation"),
    (0x0028, 0x1050, "DS", "WindowCenter"),
    (0x0028, 0x1051, "DS", "WindowWidth"),
    (0x0028, 0x1052, "DS", "RescaleIntercept"),
    (0x0028, 0x1053, "DS", "RescaleSlope"),
];

fn lookup(tag: (u16, u16)) -> Option<(&'static str, &'static str)> {
    DICTIONARY
        .iter()
        .find(|(g, e, _, _)| (*g, *e) == tag)
        .map(|(_, _, vr, kw)| (*vr, *kw))
}

/// Built-in reader for DICOM Part 10 files.
///
/// Handles little-endian transfer syntaxes (explicit or implicit VR). Only
/// top-level attributes with a dictionary keyword are reported; sequences,
/// binary values and the file meta group are left out. Parsing stops at
/// Pixel Data.
#[derive(Debug, Clone, Copy, Default)]
pub struct DicomReader;

impl MetadataReader for DicomReader {
    fn recognizes(&self, keyword: &str) -> bool {
        DICTIONARY.iter().any(|(_, _, _, kw)| *kw == keyword)
    }

    fn read(&self, path: &Path) -> Result<BTreeMap<String, String>> {
        let data = fs::read(path)?;
        parse_dataset(&data)
    }
}

struct Header {
    tag: (u16, u16),
    vr: Option<[u8; 2]>,
    len: u32,
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
    explicit: bool,
}

impl<'a> Cursor<'a> {
    fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                Error::MetadataError(format!("truncated data at offset {}", self.pos))
            })?;
        let data = self.data;
        let bytes = &data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn peek_group(&self) -> Option<u16> {
        self.data
            .get(self.pos..self.pos + 2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]))
    }

    fn header(&mut self) -> Result<Header> {
        let tag = (self.u16()?, self.u16()?);
        // Item and delimiter tags never carry a VR
        if tag.0 == 0xFFFE || !self.explicit {
            return Ok(Header { tag, vr: None, len: self.u32()? });
        }
        let vr_bytes = self.take(2)?;
        let vr = [vr_bytes[0], vr_bytes[1]];
        let len = match &vr {
            b"OB" | b"OD" | b"OF" | b"OL" | b"OW" | b"SQ" | b"UC" | b"UR" | b"UT" | b"UN" => {
                self.take(2)?;
                self.u32()?
            }
            _ => u32::from(self.u16()?),
        };
        Ok(Header { tag, vr: Some(vr), len })
    }

    fn skip_value(&mut self, header: &Header) -> Result<()> {
        if header.len == UNDEFINED_LENGTH {
            self.skip_sequence()
        } else {
            self.take(header.len as usize).map(|_| ())
        }
    }

    /// Skip items up to and including the sequence delimiter
    fn skip_sequence(&mut self) -> Result<()> {
        loop {
            let header = self.header()?;
            match header.tag {
                SEQUENCE_END => return Ok(()),
                ITEM if header.len == UNDEFINED_LENGTH => loop {
                    let inner = self.header()?;
                    if inner.tag == ITEM_END {
                        break;
                    }
                    self.skip_value(&inner)?;
                },
                ITEM => {
                    self.take(header.len as usize)?;
                }
                (g, e) => {
                    return Err(Error::MetadataError(format!(
                        "unexpected ({:04X},{:04X}) inside sequence",
                        g, e
                    )))
                }
            }
        }
    }
}

fn parse_dataset(data: &[u8]) -> Result<BTreeMap<String, String>> {
    if data.len() < PREAMBLE_LEN + MAGIC.len() || &data[PREAMBLE_LEN..PREAMBLE_LEN + 4] != MAGIC {
        return Err(Error::MetadataError("missing DICM magic".into()));
    }
    let mut cursor = Cursor {
        data,
        pos: PREAMBLE_LEN + MAGIC.len(),
        explicit: true,
    };

    // File meta group: always explicit VR little endian
    let mut transfer_syntax = None;
    while cursor.peek_group() == Some(0x0002) {
        let header = cursor.header()?;
        if header.len == UNDEFINED_LENGTH {
            cursor.skip_sequence()?;
            continue;
        }
        let value = cursor.take(header.len as usize)?;
        if header.tag == TRANSFER_SYNTAX {
            transfer_syntax = Some(trim_text(value));
        }
    }

    match transfer_syntax.as_deref() {
        Some(ts @ (EXPLICIT_BIG | DEFLATED)) => {
            return Err(Error::MetadataError(format!("unsupported transfer syntax {}", ts)))
        }
        Some(IMPLICIT_LITTLE) => cursor.explicit = false,
        _ => {}
    }

    let mut attrs = BTreeMap::new();
    while !cursor.at_end() {
        let header = cursor.header()?;
        if header.tag == PIXEL_DATA {
            break;
        }
        if header.len == UNDEFINED_LENGTH {
            cursor.skip_sequence()?;
            continue;
        }
        let value = cursor.take(header.len as usize)?;
        let Some((dict_vr, keyword)) = lookup(header.tag) else {
            continue;
        };
        let vr = header.vr.unwrap_or_else(|| {
            let b = dict_vr.as_bytes();
            [b[0], b[1]]
        });
        if let Some(text) = decode_value(&vr, value) {
            attrs.insert(keyword.to_string(), text);
        }
    }
    Ok(attrs)
}

fn trim_text(value: &[u8]) -> String {
    String::from_utf8_lossy(value)
        .trim_matches(|c| c == '\0' || c == ' ')
        .to_string()
}

/// Text form of a value; `None` for binary and sequence VRs
fn decode_value(vr: &[u8; 2], value: &[u8]) -> Option<String> {
    fn join<T: ToString>(items: impl Iterator<Item = T>) -> String {
        items.map(|v| v.to_string()).collect::<Vec<_>>().join("\\")
    }

    Some(match vr {
        b"AE" | b"AS" | b"CS" | b"DA" | b"DS" | b"DT" | b"IS" | b"LO" | b"LT" | b"PN" | b"SH"
        | b"ST" | b"TM" | b"UC" | b"UI" | b"UR" | b"UT" => trim_text(value),
        b"US" => join(value.chunks_exact(2).map(|b| u16::from_le_bytes([b[0], b[1]]))),
        b"SS" => join(value.chunks_exact(2).map(|b| i16::from_le_bytes([b[0], b[1]]))),
        b"UL" => join(
            value
                .chunks_exact(4)
                .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        ),
        b"SL" => join(
            value
                .chunks_exact(4)
                .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        ),
        b"FL" => join(
            value
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        ),
        b"FD" => join(value.chunks_exact(8).map(|b| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(b);
            f64::from_le_bytes(raw)
        })),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short(tag: (u16, u16), vr: &[u8; 2], value: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&tag.0.to_le_bytes());
        out.extend_from_slice(&tag.1.to_le_bytes());
        out.extend_from_slice(vr);
        out.extend_from_slice(&(value.len() as u16).to_le_bytes());
        out.extend_from_slice(value);
        out
    }

    fn file_with(transfer_syntax: &str, body: &[u8]) -> Vec<u8> {
        let mut ts = transfer_syntax.as_bytes().to_vec();
        if ts.len() % 2 == 1 {
            ts.push(0);
        }
        let mut out = vec![0u8; PREAMBLE_LEN];
        out.extend_from_slice(MAGIC);
        out.extend(short(TRANSFER_SYNTAX, b"UI", &ts));
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn reads_explicit_vr_strings_and_numbers() {
        let mut body = short((0x0008, 0x0060), b"CS", b"CT");
        body.extend(short((0x0010, 0x0010), b"PN", b"Doe^Jane"));
        body.extend(short((0x0028, 0x0010), b"US", &512u16.to_le_bytes()));
        body.extend(short((0x0009, 0x0010), b"LO", b"PRIVATE "));
        let attrs = parse_dataset(&file_with("1.2.840.10008.1.2.1", &body)).unwrap();

        assert_eq!(attrs["Modality"], "CT");
        assert_eq!(attrs["PatientName"], "Doe^Jane");
        assert_eq!(attrs["Rows"], "512");
        assert_eq!(attrs.len(), 3);
    }

    #[test]
    fn reads_implicit_vr_with_dictionary_types() {
        let mut body = Vec::new();
        let elements: [((u16, u16), &[u8]); 2] = [
            ((0x0010, 0x0020), b"P-001 "),
            ((0x0028, 0x0011), &[0x00, 0x01]),
        ];
        for (tag, value) in elements {
            body.extend_from_slice(&tag.0.to_le_bytes());
            body.extend_from_slice(&tag.1.to_le_bytes());
            body.extend_from_slice(&(value.len() as u32).to_le_bytes());
            body.extend_from_slice(value);
        }
        let attrs = parse_dataset(&file_with(IMPLICIT_LITTLE, &body)).unwrap();
        assert_eq!(attrs["PatientID"], "P-001");
        assert_eq!(attrs["Columns"], "256");
    }

    #[test]
    fn skips_undefined_length_sequences_and_stops_at_pixels() {
        let mut body = Vec::new();
        // (0008,1140) SQ, undefined length, one undefined-length item
        body.extend_from_slice(&[0x08, 0x00, 0x40, 0x11]);
        body.extend_from_slice(b"SQ\0\0");
        body.extend_from_slice(&UNDEFINED_LENGTH.to_le_bytes());
        body.extend_from_slice(&[0xFE, 0xFF, 0x00, 0xE0]);
        body.extend_from_slice(&UNDEFINED_LENGTH.to_le_bytes());
        body.extend(short((0x0008, 0x1150), b"UI", b"1.2.3\0"));
        body.extend_from_slice(&[0xFE, 0xFF, 0x0D, 0xE0, 0, 0, 0, 0]);
        body.extend_from_slice(&[0xFE, 0xFF, 0xDD, 0xE0, 0, 0, 0, 0]);
        body.extend(short((0x0008, 0x0060), b"CS", b"MR"));
        // Pixel Data followed by garbage that must not be parsed
        body.extend_from_slice(&[0xE0, 0x7F, 0x10, 0x00]);
        body.extend_from_slice(b"OW\0\0");
        body.extend_from_slice(&UNDEFINED_LENGTH.to_le_bytes());
        body.extend_from_slice(&[0xAB; 7]);

        let attrs = parse_dataset(&file_with("1.2.840.10008.1.2.1", &body)).unwrap();
        assert_eq!(attrs["Modality"], "MR");
        assert_eq!(attrs.len(), 1);
    }

    #[test]
    fn rejects_non_dicom_and_big_endian() {
        assert!(matches!(parse_dataset(b"not a dicom file"), Err(Error::MetadataError(_))));
        let err = parse_dataset(&file_with(EXPLICIT_BIG, &[])).unwrap_err();
        assert!(err.to_string().contains("unsupported transfer syntax"));
    }

    #[test]
    fn truncated_element_is_an_error() {
        let mut body = short((0x0008, 0x0060), b"CS", b"CT");
        body.truncate(body.len() - 1);
        assert!(parse_dataset(&file_with("1.2.840.10008.1.2.1", &body)).is_err());
    }

    #[test]
    fn csv_fields_are_quoted_when_needed() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn usecase_selection_has_thirty_columns() {
        match AttributeSelection::usecase() {
            AttributeSelection::Selected(list) => {
                assert_eq!(list.len(), 30);
                assert_eq!(list[0], "PatientID");
                assert!(list.iter().all(|k| DICTIONARY.iter().any(|(_, _, _, kw)| *kw == k.as_str())));
            }
            AttributeSelection::All => panic!("usecase should select attributes"),
        }
    }

    #[test]
    fn dicom_reader_recognizes_dictionary_keywords_only() {
        assert!(DicomReader.recognizes("Modality"));
        assert!(DicomReader.recognizes("SoftwareVersions"));
        assert!(!DicomReader.recognizes("CodeMeaning"));
        assert!(!DicomReader.recognizes("modality"));
    }

    #[test]
    fn decodes_multi_valued_numbers() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&1.5f64.to_le_bytes());
        raw.extend_from_slice(&2.0f64.to_le_bytes());
        assert_eq!(decode_value(b"FD", &raw).unwrap(), "1.5\\2");
        assert_eq!(decode_value(b"OB", &[1, 2]), None);
    }
}
