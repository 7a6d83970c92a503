//! Media classification by file extension

use std::path::Path;

/// Extensions sent as photos
pub const PHOTO_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp"];

/// Extensions sent as streamable videos
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "webm", "flv", "3gp"];

/// Fallback MIME type
pub const OCTET_STREAM: &str = "application/octet-stream";

/// How the remote should render the upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Photo,
    Video,
    Document,
}

/// Extra document metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaAttribute {
    /// Original file name shown to the recipient
    FileName(String),
    /// Video can be played before it is fully downloaded
    SupportsStreaming,
}

/// Classification result for one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDescriptor {
    pub kind: MediaKind,
    pub mime_type: String,
    pub file_name: String,
    pub attributes: Vec<MediaAttribute>,
}

impl MediaDescriptor {
    pub fn supports_streaming(&self) -> bool {
        self.attributes.contains(&MediaAttribute::SupportsStreaming)
    }
}

/// Classify a file by name
pub fn classify(file_name: &str) -> MediaDescriptor {
    let ext = extension(file_name);
    let kind = if PHOTO_EXTENSIONS.contains(&ext.as_str()) {
        MediaKind::Photo
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        MediaKind::Video
    } else {
        MediaKind::Document
    };

    let attributes = match kind {
        MediaKind::Photo => Vec::new(),
        MediaKind::Video => vec![
            MediaAttribute::FileName(file_name.to_string()),
            MediaAttribute::SupportsStreaming,
        ],
        MediaKind::Document => vec![MediaAttribute::FileName(file_name.to_string())],
    };

    MediaDescriptor {
        kind,
        mime_type: mime_type(file_name).to_string(),
        file_name: file_name.to_string(),
        attributes,
    }
}

/// MIME type for a file name, independent of its [`MediaKind`]
pub fn mime_type(file_name: &str) -> &'static str {
    match extension(file_name).as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        _ => OCTET_STREAM,
    }
}

// Text after the last dot of the final component, so ".jpg" counts as a jpg
fn extension(file_name: &str) -> String {
    let base = Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file_name);
    base.rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_photo() {
        let d = classify("holiday.jpg");
        assert_eq!(d.kind, MediaKind::Photo);
        assert_eq!(d.mime_type, "image/jpeg");
        assert!(d.attributes.is_empty());
    }

    #[test]
    fn test_video_streams() {
        let d = classify("clip.mp4");
        assert_eq!(d.kind, MediaKind::Video);
        assert_eq!(d.mime_type, "video/mp4");
        assert!(d.supports_streaming());
        assert!(d.attributes.contains(&MediaAttribute::FileName("clip.mp4".into())));
    }

    #[test]
    fn test_unknown_is_document() {
        for name in ["firmware.bin", "README", "archive.tar.xz"] {
            let d = classify(name);
            assert_eq!(d.kind, MediaKind::Document);
            assert_eq!(d.mime_type, OCTET_STREAM);
            assert_eq!(d.attributes, vec![MediaAttribute::FileName(name.into())]);
        }
    }

    #[test]
    fn test_mime_independent_of_kind() {
        let pdf = classify("paper.pdf");
        assert_eq!(pdf.kind, MediaKind::Document);
        assert_eq!(pdf.mime_type, "application/pdf");

        // Photo kind without a known MIME type
        let bmp = classify("scan.bmp");
        assert_eq!(bmp.kind, MediaKind::Photo);
        assert_eq!(bmp.mime_type, OCTET_STREAM);

        // Video kind without a known MIME type
        let webm = classify("talk.webm");
        assert_eq!(webm.kind, MediaKind::Video);
        assert_eq!(webm.mime_type, OCTET_STREAM);
    }

    #[test]
    fn test_extension_case_insensitive() {
        assert_eq!(classify("IMG_0001.JPG").kind, MediaKind::Photo);
        assert_eq!(mime_type("Movie.MKV"), "video/x-matroska");
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(classify("song.mp3"), classify("song.mp3"));
    }

    #[test]
    fn test_bare_extension() {
        assert_eq!(classify(".jpg").kind, MediaKind::Photo);
        assert_eq!(classify(".mp4").kind, MediaKind::Video);
        assert_eq!(classify(".bin").mime_type, OCTET_STREAM);
    }

    #[test]
    fn test_directories_ignored() {
        assert_eq!(classify("some.dir/notes").kind, MediaKind::Document);
        assert_eq!(extension("some.dir/notes"), "");
    }
}
