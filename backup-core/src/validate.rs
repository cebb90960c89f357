//! Artifact validation without side effects.

use crate::envelope::has_envelope_shape;
use crate::kind::ArtifactFormat;
use std::io::{self, Read, Seek};
use zip::ZipArchive;

/// Check that an artifact is structurally usable.
///
/// JSON artifacts must carry both `metadata` and `data`; zip artifacts must
/// open and every entry must decompress with a matching checksum. The whole
/// stream is checked from its start, and the reader is rewound to the start
/// again before returning, whatever the outcome.
pub fn validate_backup<R: Read + Seek>(reader: &mut R, file_name: &str) -> bool {
    if let Err(e) = reader.rewind() {
        tracing::warn!("[Validate] Could not rewind {}: {}", file_name, e);
        return false;
    }

    let valid = match ArtifactFormat::from_name(file_name) {
        Ok(ArtifactFormat::Json) => validate_json(reader),
        Ok(ArtifactFormat::Zip) => validate_zip(reader),
        Err(_) => Err(format!("unsupported file format: {}", file_name)),
    };

    if let Err(e) = reader.rewind() {
        tracing::warn!("[Validate] Could not rewind {}: {}", file_name, e);
    }

    match valid {
        Ok(()) => true,
        Err(reason) => {
            tracing::info!("[Validate] {} rejected: {}", file_name, reason);
            false
        }
    }
}

fn validate_json<R: Read>(reader: &mut R) -> Result<(), String> {
    let value: serde_json::Value = serde_json::from_reader(reader).map_err(|e| e.to_string())?;
    if has_envelope_shape(&value) {
        Ok(())
    } else {
        Err("missing 'metadata' or 'data' section".into())
    }
}

fn validate_zip<R: Read + Seek>(reader: &mut R) -> Result<(), String> {
    let mut archive = ZipArchive::new(reader).map_err(|e| e.to_string())?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| e.to_string())?;
        let name = entry.name().to_string();
        io::copy(&mut entry, &mut io::sink()).map_err(|e| format!("{}: {}", name, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipWriter};

    fn stored_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_json_envelope() {
        let mut ok = Cursor::new(br#"{"metadata": {}, "data": {}}"#.to_vec());
        assert!(validate_backup(&mut ok, "a.json"));

        let mut no_data = Cursor::new(br#"{"metadata": {}}"#.to_vec());
        assert!(!validate_backup(&mut no_data, "a.json"));

        let mut list = Cursor::new(b"[1, 2]".to_vec());
        assert!(!validate_backup(&mut list, "a.json"));

        let mut garbage = Cursor::new(b"not json".to_vec());
        assert!(!validate_backup(&mut garbage, "a.json"));
    }

    #[test]
    fn test_zip_archives() {
        let bytes = stored_zip(&[("database.json", &b"{}"[..]), ("media/a.txt", &b"abc"[..])]);
        assert!(validate_backup(&mut Cursor::new(bytes), "x_full.zip"));

        assert!(!validate_backup(&mut Cursor::new(b"PK not really".to_vec()), "x.zip"));
    }

    #[test]
    fn test_checksum_mismatch_is_invalid() {
        let mut bytes = stored_zip(&[("media/a.txt", &b"payload-payload"[..])]);
        let at = bytes
            .windows(7)
            .position(|w| w == b"payload")
            .unwrap();
        bytes[at] = b'X';
        assert!(!validate_backup(&mut Cursor::new(bytes), "x.zip"));
    }

    #[test]
    fn test_other_extensions_rejected() {
        let mut content = Cursor::new(br#"{"metadata": {}, "data": {}}"#.to_vec());
        assert!(!validate_backup(&mut content, "a.txt"));
    }

    #[test]
    fn test_position_is_restored() {
        let bytes = stored_zip(&[("media/a.txt", &b"abc"[..])]);
        let mut cursor = Cursor::new(bytes);
        assert!(validate_backup(&mut cursor, "a.zip"));
        assert_eq!(cursor.position(), 0);
        assert!(validate_backup(&mut cursor, "a.zip"), "repeatable");

        let mut json = Cursor::new(br#"{"metadata": {}, "data": {}}"#.to_vec());
        assert!(validate_backup(&mut json, "a.json"));
        assert_eq!(json.position(), 0);
    }

    #[test]
    fn test_partially_read_stream_is_checked_from_start() {
        let mut json = Cursor::new(br#"{"metadata": {}, "data": {}}"#.to_vec());
        json.set_position(5);
        assert!(validate_backup(&mut json, "a.json"));
        assert_eq!(json.position(), 0);

        let mut broken = Cursor::new(b"{\"metadata\": {}}".to_vec());
        broken.set_position(3);
        assert!(!validate_backup(&mut broken, "b.json"));
        assert_eq!(broken.position(), 0);
    }
}
