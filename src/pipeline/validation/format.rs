use std::path::Path;

use serde::{Deserialize, Serialize};

use super::dicom;

/// Largest upload accepted, in bytes.
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024; // 50MB

/// File extensions the upload form accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadExtension {
    Dcm,
    Jpg,
    Jpeg,
    Png,
}

impl UploadExtension {
    pub const ALL: [UploadExtension; 4] = [Self::Dcm, Self::Jpg, Self::Png, Self::Jpeg];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dcm => "dcm",
            Self::Jpg => "jpg",
            Self::Jpeg => "jpeg",
            Self::Png => "png",
        }
    }

    /// Parse an extension, with or without the leading dot. Case-insensitive.
    pub fn parse(ext: &str) -> Option<Self> {
        let ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
        Self::ALL.into_iter().find(|candidate| candidate.as_str() == ext)
    }

    /// Extension of an uploaded file name.
    pub fn from_filename(name: &str) -> Option<Self> {
        Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Self::parse)
    }
}

impl std::fmt::Display for UploadExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the leading bytes of an upload look like.
/// Magic bytes don't lie, extensions can be wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SniffedFormat {
    Dicom,
    Jpeg,
    Png,
    Unknown,
}

impl SniffedFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dicom => "dicom",
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Unknown => "unknown",
        }
    }
}

/// Detect the container from magic bytes.
///
/// DICOM without its preamble has no magic and sniffs as `Unknown`; the
/// validator still tries to parse it.
pub fn sniff(bytes: &[u8]) -> SniffedFormat {
    if dicom::has_dicom_magic(bytes) {
        return SniffedFormat::Dicom;
    }
    match bytes {
        // JPEG: starts with FF D8 FF
        [0xFF, 0xD8, 0xFF, ..] => SniffedFormat::Jpeg,
        // PNG: starts with 89 50 4E 47
        [0x89, 0x50, 0x4E, 0x47, ..] => SniffedFormat::Png,
        _ => SniffedFormat::Unknown,
    }
}

/// Sanitize a filename: strip path components, limit length.
pub fn sanitize_filename(original: &str) -> String {
    let name = Path::new(original)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");

    let clean: String = name
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | '\0'))
        .take(255)
        .collect();

    if clean.is_empty() {
        "upload".to_string()
    } else {
        clean
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_case_insensitive() {
        assert_eq!(UploadExtension::parse("JPG"), Some(UploadExtension::Jpg));
        assert_eq!(UploadExtension::parse(".Dcm"), Some(UploadExtension::Dcm));
        assert_eq!(UploadExtension::parse("jpeg"), Some(UploadExtension::Jpeg));
        assert_eq!(UploadExtension::parse("gif"), None);
        assert_eq!(UploadExtension::parse(""), None);
    }

    #[test]
    fn extension_from_filename() {
        assert_eq!(
            UploadExtension::from_filename("scan_01.PNG"),
            Some(UploadExtension::Png)
        );
        assert_eq!(
            UploadExtension::from_filename("/tmp/IM0001.dcm"),
            Some(UploadExtension::Dcm)
        );
        assert_eq!(UploadExtension::from_filename("IM0001"), None);
        assert_eq!(UploadExtension::from_filename("report.pdf"), None);
    }

    #[test]
    fn sniffs_magic_bytes() {
        assert_eq!(sniff(&[0xFF, 0xD8, 0xFF, 0xE0]), SniffedFormat::Jpeg);
        assert_eq!(
            sniff(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A]),
            SniffedFormat::Png
        );
        let mut dicom = vec![0u8; 128];
        dicom.extend_from_slice(b"DICM");
        assert_eq!(sniff(&dicom), SniffedFormat::Dicom);
        assert_eq!(sniff(b"hello"), SniffedFormat::Unknown);
        assert_eq!(sniff(&[]), SniffedFormat::Unknown);
    }

    #[test]
    fn sanitize_filename_strips_paths() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\scans\\a.dcm"), "C:scansa.dcm");
        assert_eq!(sanitize_filename(""), "upload");
        assert_eq!(sanitize_filename("brain.png"), "brain.png");
    }
}
