use crate::models::{CdDiscInfo, CdTrackInfo};

pub const DEFAULT_ALBUM_TRACK_FORMAT: &str = "%track% - %title%";
pub const DEFAULT_VARIOUS_TRACK_FORMAT: &str = "%track% - %artist% - %title%";

/// Expands `%artist%`, `%albumartist%`, `%album%`, `%title%`, `%track%`,
/// `%year%` and `%genre%` and makes the result usable as a file name.
pub fn format_title(format: &str, disc: &CdDiscInfo, track: &CdTrackInfo) -> String {
    let artist = if track.artist.is_empty() {
        disc.disc_artist.as_str()
    } else {
        track.artist.as_str()
    };
    let year = if disc.year == 0 {
        String::new()
    } else {
        disc.year.to_string()
    };

    let title = format
        .replace("%albumartist%", &disc.disc_artist)
        .replace("%artist%", artist)
        .replace("%album%", &disc.disc_title)
        .replace("%title%", &track.title)
        .replace("%track%", &format!("{:02}", track.track_number()))
        .replace("%year%", &year)
        .replace("%genre%", &disc.genre);
    sanitize_file_name(&title)
}

pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|ch| match ch {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            ch if ch.is_control() => '_',
            ch => ch,
        })
        .collect();
    let trimmed = cleaned.trim().trim_end_matches('.').trim_end();
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}
