//! Filename sanitization and content sniffing for stored objects.

use crate::defaults::AUDIO_EXTENSION;

/// Replace characters that are unsafe in a storage key or a WebDAV path
/// segment. Path separators are replaced, not interpreted.
pub fn sanitize_component(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '/' | '\\' | '<' | '>' | ':' | '"' | '|' | '?' | '*' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Sanitize an uploaded filename for safe storage.
///
/// Any directory components supplied by the client are dropped.
pub fn sanitize_filename(filename: &str) -> String {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let sanitized = sanitize_component(name);

    if sanitized.is_empty() {
        return "unnamed_file".to_string();
    }

    // Truncate if too long (preserve extension)
    if sanitized.len() > 255 {
        if let Some(dot_pos) = sanitized.rfind('.') {
            let ext = &sanitized[dot_pos..];
            let stem = truncate_to_boundary(&sanitized[..dot_pos], 255 - ext.len());
            return format!("{}{}", stem, ext);
        }
        return truncate_to_boundary(&sanitized, 255).to_string();
    }

    sanitized
}

fn truncate_to_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Deterministic name of a produced audio file: `"{title} {artist}.mp3"`,
/// lowercased and sanitized component by component.
pub fn destination_filename(title: &str, artist: &str) -> String {
    format!(
        "{} {}.{}",
        sanitize_component(&title.to_lowercase()),
        sanitize_component(&artist.to_lowercase()),
        AUDIO_EXTENSION
    )
}

/// Sniff the image extension (`png`, `jpeg`, `gif`, `webp`, ...) from magic bytes.
pub fn detect_image_extension(data: &[u8]) -> Option<String> {
    let kind = infer::get(data)?;
    let mime = kind.mime_type();
    mime.strip_prefix("image/").map(str::to_string)
}

/// Sniff a MIME type from magic bytes, falling back to the supplied hint.
pub fn detect_content_type(data: &[u8], fallback: &str) -> String {
    infer::get(data)
        .map(|kind| kind.mime_type().to_string())
        .unwrap_or_else(|| fallback.to_string())
}

/// Extract the extension from an `image/<ext>` content type.
pub fn image_extension_from_content_type(content_type: &str) -> Option<String> {
    let essence = content_type.split(';').next()?.trim();
    essence
        .strip_prefix("image/")
        .filter(|ext| !ext.is_empty())
        .map(str::to_ascii_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_filename_lowercases_both_parts() {
        assert_eq!(destination_filename("Song", "Artist"), "song artist.mp3");
    }

    #[test]
    fn test_destination_filename_replaces_separators() {
        assert_eq!(
            destination_filename("Back In Black", "AC/DC"),
            "back in black ac_dc.mp3"
        );
        assert_eq!(destination_filename("What?", "A:B"), "what_ a_b.mp3");
    }

    #[test]
    fn test_destination_filename_is_deterministic() {
        let a = destination_filename("Título", "Ärtist");
        let b = destination_filename("Título", "Ärtist");
        assert_eq!(a, b);
        assert_eq!(a, "título ärtist.mp3");
    }

    #[test]
    fn test_sanitize_filename_removes_path() {
        assert_eq!(sanitize_filename("/etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\music\\track.flac"), "track.flac");
    }

    #[test]
    fn test_sanitize_filename_handles_empty() {
        assert_eq!(sanitize_filename(""), "unnamed_file");
        assert_eq!(sanitize_filename("   "), "unnamed_file");
    }

    #[test]
    fn test_sanitize_filename_truncates_long_names() {
        let long_name = format!("{}.wav", "é".repeat(300));
        let sanitized = sanitize_filename(&long_name);
        assert!(sanitized.len() <= 255);
        assert!(sanitized.ends_with(".wav"));
    }

    #[test]
    fn test_detect_png_extension() {
        let png = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
        assert_eq!(detect_image_extension(&png).as_deref(), Some("png"));
    }

    #[test]
    fn test_detect_jpeg_extension() {
        let jpeg = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46];
        assert_eq!(detect_image_extension(&jpeg).as_deref(), Some("jpeg"));
    }

    #[test]
    fn test_detect_image_extension_rejects_text() {
        assert_eq!(detect_image_extension(b"plain text"), None);
    }

    #[test]
    fn test_image_extension_from_content_type() {
        assert_eq!(
            image_extension_from_content_type("image/PNG; charset=binary").as_deref(),
            Some("png")
        );
        assert_eq!(image_extension_from_content_type("text/html"), None);
        assert_eq!(image_extension_from_content_type("image/"), None);
    }
}
