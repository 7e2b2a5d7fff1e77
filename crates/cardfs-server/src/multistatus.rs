//! WebDAV multi-status rendering.

use cardfs_kernel::FileEntry;

/// Percent-encode each segment of a `/`-joined path.
pub fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// URL of `entry` given the URL of the listed resource.
///
/// `base` carries no trailing slash; an empty entry path is the listed
/// resource itself. Collections end in `/`.
pub fn href(base: &str, entry: &FileEntry) -> String {
    let mut href = if entry.path.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, encode_path(&entry.path))
    };
    if href.is_empty() || (entry.is_directory && !href.ends_with('/')) {
        href.push('/');
    }
    href
}

/// Multi-status document with one `response` per entry.
pub fn render(base: &str, entries: &[FileEntry]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<D:multistatus xmlns:D=\"DAV:\">\n");
    for entry in entries {
        let resource_type = if entry.is_directory {
            "<D:resourcetype><D:collection/></D:resourcetype>"
        } else {
            "<D:resourcetype/>"
        };
        xml.push_str(&format!(
            "<D:response><D:href>{}</D:href><D:propstat><D:prop>{}<D:getcontentlength>{}</D:getcontentlength></D:prop><D:status>HTTP/1.1 200 OK</D:status></D:propstat></D:response>\n",
            href(base, entry),
            resource_type,
            entry.size
        ));
    }
    xml.push_str("</D:multistatus>\n");
    xml
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_href() {
        assert_eq!(href("", &FileEntry::new("a.txt", 12, false)), "/a.txt");
        assert_eq!(href("", &FileEntry::new("sub", 0, true)), "/sub/");
        assert_eq!(href("", &FileEntry::new("", 0, true)), "/");
        assert_eq!(href("/files/sub", &FileEntry::new("b.txt", 4, false)), "/files/sub/b.txt");
        assert_eq!(href("/files/sub", &FileEntry::new("", 0, true)), "/files/sub/");
        assert_eq!(
            href("", &FileEntry::new("My Docs/a&b.txt", 1, false)),
            "/My%20Docs/a%26b.txt"
        );
    }

    #[test]
    fn test_render() {
        let xml = render(
            "",
            &[
                FileEntry::new("a.txt", 12, false),
                FileEntry::new("sub", 0, true),
            ],
        );
        assert_eq!(xml.matches("<D:response>").count(), 2);
        assert!(xml.contains("<D:href>/a.txt</D:href>"));
        assert!(xml.contains("<D:getcontentlength>12</D:getcontentlength>"));
        assert_eq!(xml.matches("<D:collection/>").count(), 1);
        assert!(xml.starts_with("<?xml"));
    }
}
