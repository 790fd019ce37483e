//! MXL file handler — reads compressed MusicXML (.mxl) archives.
//!
//! An .mxl file is a ZIP archive containing:
//!   - META-INF/container.xml  — declares the root MusicXML file path
//!   - <rootfile>.xml          — the actual MusicXML content (e.g., score.xml)
//!   - (optional) other files  — images, sounds, etc.

use std::io::{Cursor, Read};
use zip::ZipArchive;

use crate::error::PopulateError;

/// Extract the root MusicXML document from .mxl bytes.
pub fn extract_musicxml_from_mxl(data: &[u8]) -> Result<String, PopulateError> {
    let mut archive = ZipArchive::new(Cursor::new(data))
        .map_err(|e| PopulateError::Archive(format!("cannot open archive: {e}")))?;

    let root_file_path = find_root_file(&mut archive)?;
    log::debug!("mxl root file: {root_file_path}");

    let mut root_file = archive.by_name(&root_file_path).map_err(|e| {
        PopulateError::Archive(format!("root file '{root_file_path}' not found in archive: {e}"))
    })?;
    let mut xml = String::new();
    root_file
        .read_to_string(&mut xml)
        .map_err(|e| PopulateError::Archive(format!("cannot read '{root_file_path}': {e}")))?;
    Ok(xml)
}

/// The root file named by META-INF/container.xml, else the first MusicXML
/// file outside META-INF.
fn find_root_file(archive: &mut ZipArchive<Cursor<&[u8]>>) -> Result<String, PopulateError> {
    let container_xml = match archive.by_name("META-INF/container.xml") {
        Ok(mut container_file) => {
            let mut xml = String::new();
            container_file
                .read_to_string(&mut xml)
                .map_err(|e| PopulateError::Archive(format!("cannot read container.xml: {e}")))?;
            Some(xml)
        }
        Err(_) => None,
    };

    if let Some(xml) = container_xml {
        let doc = roxmltree::Document::parse(&xml)
            .map_err(|e| PopulateError::Archive(format!("container.xml: {e}")))?;
        return doc
            .descendants()
            .filter(|n| n.tag_name().name() == "rootfile")
            .find_map(|n| n.attribute("full-path"))
            .map(String::from)
            .ok_or_else(|| PopulateError::Archive("no rootfile in container.xml".to_string()));
    }

    let names: Vec<String> = (0..archive.len())
        .filter_map(|i| archive.by_index(i).ok().map(|f| f.name().to_string()))
        .collect();
    names
        .iter()
        .find(|name| {
            !name.starts_with("META-INF/") && (name.ends_with(".xml") || name.ends_with(".musicxml"))
        })
        .cloned()
        .ok_or_else(|| PopulateError::Archive(format!("no MusicXML file in archive. Files: {names:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn archive(files: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in files {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn follows_container_rootfile() {
        let data = archive(&[
            (
                "META-INF/container.xml",
                r#"<container><rootfiles><rootfile full-path="music/score.xml"/></rootfiles></container>"#,
            ),
            ("other.xml", "<wrong/>"),
            ("music/score.xml", "<score-partwise/>"),
        ]);
        assert_eq!(extract_musicxml_from_mxl(&data).unwrap(), "<score-partwise/>");
    }

    #[test]
    fn falls_back_to_first_musicxml_file() {
        let data = archive(&[("song.musicxml", "<score-partwise/>")]);
        assert_eq!(extract_musicxml_from_mxl(&data).unwrap(), "<score-partwise/>");
    }

    #[test]
    fn rejects_non_archives() {
        let err = extract_musicxml_from_mxl(b"not a zip").unwrap_err();
        assert!(matches!(err, PopulateError::Archive(_)));
    }
}
