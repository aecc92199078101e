//! Folder-level metadata extraction over synthetic DICOM files

use chartshot::metadata::{extract_metadata, AttributeSelection, DicomReader, ExtractOptions, MetadataReader};
use chartshot::Result;
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, Once};

/// Keeps every warning so tests can count what a run reported
struct WarningLog;

static WARNINGS: Mutex<Vec<String>> = Mutex::new(Vec::new());
static LOGGER: WarningLog = WarningLog;
static INIT: Once = Once::new();

impl Log for WarningLog {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Warn
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            WARNINGS.lock().unwrap().push(record.args().to_string());
        }
    }

    fn flush(&self) {}
}

/// Warnings logged so far that mention `dir`; tests run in parallel, so
/// each one only looks at messages about its own fixture directory
fn warnings_about(dir: &Path) -> Vec<String> {
    INIT.call_once(|| {
        log::set_logger(&LOGGER).unwrap();
        log::set_max_level(LevelFilter::Warn);
    });
    let dir = dir.display().to_string();
    WARNINGS
        .lock()
        .unwrap()
        .iter()
        .filter(|m| m.contains(&dir))
        .cloned()
        .collect()
}

fn element(group: u16, elem: u16, vr: &[u8; 2], value: &str) -> Vec<u8> {
    let mut value = value.as_bytes().to_vec();
    if value.len() % 2 == 1 {
        value.push(if vr == b"UI" { 0 } else { b' ' });
    }
    let mut out = Vec::new();
    out.extend_from_slice(&group.to_le_bytes());
    out.extend_from_slice(&elem.to_le_bytes());
    out.extend_from_slice(vr);
    out.extend_from_slice(&(value.len() as u16).to_le_bytes());
    out.extend_from_slice(&value);
    out
}

fn dicom(patient: &str, modality: &str, description: &str) -> Vec<u8> {
    let mut out = vec![0u8; 128];
    out.extend_from_slice(b"DICM");
    out.extend(element(0x0002, 0x0010, b"UI", "1.2.840.10008.1.2.1"));
    out.extend(element(0x0008, 0x0060, b"CS", modality));
    out.extend(element(0x0008, 0x1030, b"LO", description));
    out.extend(element(0x0010, 0x0020, b"LO", patient));
    out
}

fn fixture_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("b.dcm"), dicom("P2", "MR", "Brain")).unwrap();
    fs::write(dir.path().join("a.dcm"), dicom("P1", "CT", "Chest, with contrast")).unwrap();
    fs::write(dir.path().join("C.DCM"), dicom("P3", "CR", "Hand")).unwrap();
    fs::write(dir.path().join("broken.dcm"), b"definitely not dicom").unwrap();
    fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();
    dir
}

fn lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .split("\r\n")
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

#[test]
fn all_attributes_with_skipped_corrupt_file() {
    let dir = fixture_dir();
    let out = dir.path().join("out/meta.csv");
    assert!(warnings_about(dir.path()).is_empty());

    let report = extract_metadata(dir.path(), &out, &ExtractOptions::default(), &DicomReader).unwrap();

    assert_eq!(report.rows, 3);
    assert_eq!(report.skipped.len(), 1);
    assert!(report.skipped[0].path.ends_with("broken.dcm"));

    let lines = lines(&out);
    assert_eq!(lines[0], "__filename,Modality,PatientID,StudyDescription");
    // Sorted by name: "C.DCM" < "a.dcm" < "b.dcm"
    assert_eq!(lines[1], "C.DCM,CR,P3,Hand");
    assert_eq!(lines[2], "a.dcm,CT,P1,\"Chest, with contrast\"");
    assert_eq!(lines[3], "b.dcm,MR,P2,Brain");

    let warnings = warnings_about(dir.path());
    assert_eq!(warnings.len(), 1, "{:?}", warnings);
    assert!(warnings[0].contains("broken.dcm"));
}

#[test]
fn unknown_selected_keywords_are_warned_once() {
    let dir = fixture_dir();
    fs::remove_file(dir.path().join("broken.dcm")).unwrap();
    let out = dir.path().join("coded.csv");
    assert!(warnings_about(dir.path()).is_empty());
    let options = ExtractOptions {
        attributes: AttributeSelection::Selected(vec![
            "PatientID".into(),
            "CodeMeaning".into(),
            "Modality".into(),
            "CodeMeaning".into(),
        ]),
        max_files: None,
    };

    let report = extract_metadata(dir.path(), &out, &options, &DicomReader).unwrap();

    assert_eq!(report.rows, 3);
    assert_eq!(lines(&out)[1], "C.DCM,P3,,CR,");
    let warnings = warnings_about(dir.path());
    assert_eq!(warnings.len(), 1, "{:?}", warnings);
    assert!(warnings[0].contains("CodeMeaning"));
}

#[test]
fn selected_attributes_keep_order_and_blank_missing() {
    let dir = fixture_dir();
    let out = dir.path().join("selected.csv");
    let options = ExtractOptions {
        attributes: AttributeSelection::Selected(vec!["PatientID".into(), "PatientSex".into(), "Modality".into()]),
        max_files: Some(2),
    };

    let report = extract_metadata(dir.path(), &out, &options, &DicomReader).unwrap();

    assert_eq!(report.rows, 2);
    assert_eq!(
        lines(&out),
        vec!["__filename,PatientID,PatientSex,Modality", "C.DCM,P3,,CR", "a.dcm,P1,,CT"]
    );
}

#[test]
fn usecase_header_is_fixed() {
    let dir = fixture_dir();
    let out = dir.path().join("usecase.csv");
    let options = ExtractOptions {
        attributes: AttributeSelection::usecase(),
        max_files: None,
    };

    let report = extract_metadata(dir.path(), &out, &options, &DicomReader).unwrap();

    assert_eq!(report.columns.len(), 31);
    assert_eq!(report.columns[0], "__filename");
    assert!(lines(&out)[0].starts_with("__filename,PatientID,PatientName,PatientSex"));
}

struct FixedReader;

impl MetadataReader for FixedReader {
    fn read(&self, path: &Path) -> Result<BTreeMap<String, String>> {
        let mut attrs = BTreeMap::new();
        attrs.insert("Size".to_string(), fs::metadata(path)?.len().to_string());
        Ok(attrs)
    }
}

#[test]
fn custom_reader_sees_every_candidate() {
    let dir = fixture_dir();
    let out = dir.path().join("sizes.csv");

    let report = extract_metadata(dir.path(), &out, &ExtractOptions::default(), &FixedReader).unwrap();

    assert_eq!(report.rows, 4);
    assert!(report.skipped.is_empty());
    assert_eq!(lines(&out)[0], "__filename,Size");
    assert!(warnings_about(dir.path()).is_empty());
}

#[test]
fn missing_directory_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = extract_metadata(
        dir.path().join("nope"),
        dir.path().join("x.csv"),
        &ExtractOptions::default(),
        &DicomReader,
    );
    assert!(result.is_err());
}
