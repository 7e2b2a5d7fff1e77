//! Human-facing directory index and file type helpers.

use cardfs_kernel::DirEntry;
use mime_guess::Mime;

/// Render a byte count with two decimals in B, KB, MB or GB.
pub fn format_size(size: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = size as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}

fn extension(name: &str) -> Option<&str> {
    name.rfind('.').map(|dot| &name[dot + 1..])
}

/// Short description of a file's type, from its extension.
pub fn file_type(name: &str) -> String {
    let Some(ext) = extension(name) else {
        return "File".to_string();
    };
    let known = match ext {
        "mp3" => "Audio (MP3)",
        "wav" => "Audio (WAV)",
        "flac" => "Audio (FLAC)",
        "gif" => "Image (GIF)",
        "png" => "Image (PNG)",
        "jpg" => "Image (JPG)",
        "jpeg" => "Image (JPEG)",
        "bmp" => "Image (BMP)",
        "txt" => "Text (TXT)",
        "log" => "Text (LOG)",
        "csv" => "Text (CSV)",
        "html" => "Web (HTML)",
        "css" => "Web (CSS)",
        "js" => "Web (JS)",
        "json" => "Data (JSON)",
        "xml" => "Data (XML)",
        "zip" => "Archive (ZIP)",
        "gz" => "Archive (GZ)",
        "tar" => "Archive (TAR)",
        other => return format!("File ({})", other),
    };
    known.to_string()
}

/// MIME type for a download, from the file extension.
pub fn content_type(name: &str) -> Mime {
    mime_guess::from_path(name).first_or_octet_stream()
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// HTML listing of one directory.
///
/// `href_base` is the URL of the directory without a trailing slash,
/// `title` the path shown in the heading.
pub fn render(href_base: &str, title: &str, entries: &[DirEntry]) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\">");
    html.push_str(&format!("<title>Index of {}</title>", escape_html(title)));
    html.push_str("</head><body>\n");
    html.push_str(&format!("<h1>Index of {}</h1>\n", escape_html(title)));
    html.push_str("<table>\n<tr><th>Name</th><th>Type</th><th>Size</th></tr>\n");

    for entry in entries {
        let mut href = format!("{}/{}", href_base, urlencoding::encode(&entry.name));
        let (kind, size) = if entry.kind.is_dir() {
            href.push('/');
            ("Folder".to_string(), "-".to_string())
        } else {
            (file_type(&entry.name), format_size(entry.size))
        };
        html.push_str(&format!(
            "<tr><td><a href=\"{}\">{}</a></td><td>{}</td><td>{}</td></tr>\n",
            escape_html(&href),
            escape_html(&entry.name),
            escape_html(&kind),
            size
        ));
    }

    html.push_str("</table>\n</body></html>\n");
    html
}
