//! ID3 tag reading and writing.

use std::io::Cursor;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use id3::frame::{Picture, PictureType};
use id3::{ErrorKind, Tag, TagLike, Version};
use tracing::{debug, warn};

use tuneflow_core::{Artwork, AudioTags, Error, Result, TagEditor, TrackTags};

/// Content group description frame, shown as "Grouping" by most players.
const GROUPING_FRAME: &str = "TIT1";

/// [`TagEditor`] over ID3v2 tags.
#[derive(Debug, Clone, Copy, Default)]
pub struct Id3TagEditor;

impl Id3TagEditor {
    pub fn new() -> Self {
        Self
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl TagEditor for Id3TagEditor {
    fn read_tags(&self, data: &[u8], filename: &str) -> Result<AudioTags> {
        let tag = match Tag::read_from2(Cursor::new(data)) {
            Ok(tag) => tag,
            Err(id3::Error {
                kind: ErrorKind::NoTag,
                ..
            }) => {
                debug!(subsystem = "media", component = "tags", filename, "No ID3 tag");
                return Ok(AudioTags::default());
            }
            Err(e) => {
                warn!(subsystem = "media", component = "tags", filename, error = %e, "Unreadable ID3 tag");
                return Ok(AudioTags::default());
            }
        };

        let artwork_base64 = tag
            .pictures()
            .find(|p| p.picture_type == PictureType::CoverFront)
            .or_else(|| tag.pictures().next())
            .map(|p| STANDARD.encode(&p.data));

        Ok(AudioTags {
            title: non_empty(tag.title()),
            artist: non_empty(tag.artist()),
            album: non_empty(tag.album()),
            grouping: non_empty(tag.get(GROUPING_FRAME).and_then(|f| f.content().text())),
            artwork_base64,
        })
    }

    fn write_tags(&self, path: &Path, tags: &TrackTags, artwork: Option<&Artwork>) -> Result<()> {
        let mut tag = match Tag::read_from_path(path) {
            Ok(tag) => tag,
            Err(id3::Error {
                kind: ErrorKind::NoTag,
                ..
            }) => Tag::new(),
            Err(e) => return Err(Error::Tags(e.to_string())),
        };

        tag.set_title(&tags.title);
        tag.set_artist(&tags.artist);
        tag.set_album(&tags.album);
        if let Some(grouping) = tags.grouping.as_deref().filter(|g| !g.is_empty()) {
            tag.set_text(GROUPING_FRAME, grouping);
        }

        if let Some(artwork) = artwork {
            tag.remove_all_pictures();
            tag.add_frame(Picture {
                mime_type: artwork.mime_type(),
                picture_type: PictureType::CoverFront,
                description: String::new(),
                data: artwork.data.clone(),
            });
        }

        tag.write_to_path(path, Version::Id3v24)
            .map_err(|e| Error::Tags(e.to_string()))
    }
}
