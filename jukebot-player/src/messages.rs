//! Chat message formatting
//!
//! Voice-server chat renders a small HTML subset, so replies are built as
//! tables. Plain-text front ends run the result through `strip_html_tags`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fmt::Write;
use url::Url;

use crate::track::is_url;

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());

const SEARCH_URL: &str = "https://www.youtube.com/results";

/// Status comment shown while nothing plays
pub const NOT_PLAYING: &str = "Not Playing.";

/// Remove anything that looks like an HTML tag
pub fn strip_html_tags(text: &str) -> String {
    HTML_TAG.replace_all(text, "").into_owned()
}

/// Escape text for inclusion in an HTML message
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// HTML table with a heading and optional column headers
#[derive(Debug, Clone)]
pub struct MessageTable {
    html: String,
}

impl MessageTable {
    pub fn new(header: &str, columns: &[&str]) -> Self {
        let mut html = String::new();
        let _ = write!(html, "<h2><b><u>{}</u></b></h2>", header);
        html.push_str("<table align=\"left\" border=\"0\" cellspacing=\"2\" cellpadding=\"0\"><thead>");
        if !columns.is_empty() {
            html.push_str("<tr>");
            for column in columns {
                let _ = write!(html, "<th align=\"left\">{}</th>", column);
            }
            html.push_str("</tr>");
        }
        html.push_str("</thead><tbody>");
        Self { html }
    }

    pub fn add_row(&mut self, cells: &[&str]) -> &mut Self {
        self.html.push_str("<tr>");
        for cell in cells {
            let _ = write!(self.html, "<td><p>{}</p></td>", cell);
        }
        self.html.push_str("</tr>");
        self
    }

    pub fn finish(mut self) -> String {
        self.html.push_str("</tbody></table>");
        self.html
    }
}

/// Link target for a track: the URL itself, or a search for catalog tracks
pub fn track_link(locator: &str, display_name: &str) -> String {
    if is_url(locator) {
        return locator.to_string();
    }
    Url::parse_with_params(SEARCH_URL, &[("search_query", display_name)])
        .map(String::from)
        .unwrap_or_else(|_| SEARCH_URL.to_string())
}

/// "Now Playing" block sent to the channel and used as the status comment
pub fn now_playing(locator: &str, display_name: &str, radio_mode: bool, queued: usize) -> String {
    let mut html = String::from("<h2><u>Now Playing</u></h2><table><tr><td>");
    let _ = write!(
        html,
        "<a href=\"{}\">{}</a></td></tr>",
        escape_html(&track_link(locator, display_name)),
        escape_html(display_name)
    );
    if radio_mode {
        html.push_str("<tr><td><b>Radio</b> Mode: <b>Enabled</b></td></tr>");
    } else {
        let _ = write!(html, "<tr><td><b>{}</b> songs queued</td></tr>", queued);
    }
    html.push_str("</table>");
    html
}

/// Listing rows held per sender for `more` and `less`
#[derive(Debug, Default)]
pub struct ResultPages {
    buffers: HashMap<String, PageBuffer>,
}

#[derive(Debug, Default)]
struct PageBuffer {
    rows: Vec<String>,
    /// Shown window is `rows[start..end]`
    start: usize,
    end: usize,
}

impl ResultPages {
    /// Replace the sender's buffer and return the first page
    ///
    /// # Returns
    /// The rows to show now and how many were held back
    pub fn save(&mut self, sender: &str, rows: Vec<String>, page_size: usize) -> (Vec<String>, usize) {
        let end = page_size.min(rows.len());
        let first = rows[..end].to_vec();
        let extra = rows.len() - end;
        self.buffers
            .insert(sender.to_string(), PageBuffer { rows, start: 0, end });
        (first, extra)
    }

    /// Page forward; `None` when nothing follows the shown rows
    pub fn more(&mut self, sender: &str, page_size: usize) -> Option<Vec<String>> {
        let buffer = self.buffers.get_mut(sender)?;
        if buffer.end >= buffer.rows.len() {
            return None;
        }
        let end = (buffer.end + page_size).min(buffer.rows.len());
        buffer.start = buffer.end;
        buffer.end = end;
        Some(buffer.rows[buffer.start..buffer.end].to_vec())
    }

    /// Page back; `None` when the first page is already shown
    pub fn less(&mut self, sender: &str, page_size: usize) -> Option<Vec<String>> {
        let buffer = self.buffers.get_mut(sender)?;
        if buffer.start == 0 {
            return None;
        }
        buffer.end = buffer.start;
        buffer.start = buffer.start.saturating_sub(page_size);
        Some(buffer.rows[buffer.start..buffer.end].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_html_tags() {
        assert_eq!(
            strip_html_tags("<a href=\"https://x.test/v\">https://x.test/v</a>"),
            "https://x.test/v"
        );
        assert_eq!(strip_html_tags("plain"), "plain");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("a < b & \"c\""), "a &lt; b &amp; &quot;c&quot;");
    }

    #[test]
    fn test_table_layout() {
        let mut table = MessageTable::new("Playlist", &[]);
        table.add_row(&["0: one"]).add_row(&["1: two"]);
        let html = table.finish();
        assert!(html.starts_with("<h2><b><u>Playlist</u></b></h2>"));
        assert!(html.contains("<td><p>0: one</p></td>"));
        assert!(html.ends_with("</tbody></table>"));
    }

    #[test]
    fn test_now_playing_queue_count() {
        let html = now_playing("https://x.test/v", "Song", false, 3);
        assert!(html.contains("href=\"https://x.test/v\""));
        assert!(html.contains("<b>3</b> songs queued"));
        assert!(!html.contains("Radio"));
    }

    #[test]
    fn test_now_playing_radio_and_search_link() {
        let html = now_playing("/music/a.flac", "Artist - Song", true, 0);
        assert!(html.contains("search_query=Artist+-+Song"));
        assert!(html.contains("Mode: <b>Enabled</b>"));
    }

    fn rows(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("row {}", i)).collect()
    }

    #[test]
    fn test_pages_forward_and_back() {
        let mut pages = ResultPages::default();
        let (first, extra) = pages.save("alice", rows(7), 3);
        assert_eq!(first, vec!["row 0", "row 1", "row 2"]);
        assert_eq!(extra, 4);

        assert_eq!(pages.more("alice", 3).unwrap(), vec!["row 3", "row 4", "row 5"]);
        assert_eq!(pages.more("alice", 3).unwrap(), vec!["row 6"]);
        assert_eq!(pages.more("alice", 3), None);

        assert_eq!(pages.less("alice", 3).unwrap(), vec!["row 3", "row 4", "row 5"]);
        assert_eq!(pages.less("alice", 3).unwrap(), vec!["row 0", "row 1", "row 2"]);
        assert_eq!(pages.less("alice", 3), None);
        assert_eq!(pages.more("alice", 3).unwrap(), vec!["row 3", "row 4", "row 5"]);
    }

    #[test]
    fn test_pages_are_per_sender() {
        let mut pages = ResultPages::default();
        pages.save("alice", rows(5), 2);
        let (first, extra) = pages.save("bob", rows(2), 2);
        assert_eq!(first.len(), 2);
        assert_eq!(extra, 0);

        assert_eq!(pages.more("bob", 2), None);
        assert_eq!(pages.more("alice", 2).unwrap(), vec!["row 2", "row 3"]);
        assert_eq!(pages.more("carol", 2), None);
        assert_eq!(pages.less("carol", 2), None);
    }

    #[test]
    fn test_new_save_resets_position() {
        let mut pages = ResultPages::default();
        pages.save("alice", rows(6), 2);
        pages.more("alice", 2);
        pages.save("alice", rows(3), 2);
        assert_eq!(pages.less("alice", 2), None);
        assert_eq!(pages.more("alice", 2).unwrap(), vec!["row 2"]);
    }
}
