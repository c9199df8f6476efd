//! Where the listing page comes from.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use tokio::fs;
use url::Url;

use crate::error::Error;

/// A live page to navigate to, a listing page saved to disk, or a file of
/// landing URLs written by an earlier `links` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingSource {
    Url(Url),
    File(PathBuf),
    Links(PathBuf),
}

impl ListingSource {
    /// Interprets a command-line argument.
    ///
    /// Arguments starting with `http://` or `https://` are URLs; anything
    /// else must name an existing `.html`/`.htm` page or `.txt` links file.
    pub fn parse(arg: &str) -> Result<Self, Error> {
        let arg = arg.trim();
        if arg.is_empty() {
            return Err(Error::Usage("listing source is empty".to_string()));
        }

        let lowered = arg.to_ascii_lowercase();
        if lowered.starts_with("http://") || lowered.starts_with("https://") {
            return Url::parse(arg)
                .map(Self::Url)
                .map_err(|e| Error::Usage(format!("invalid listing URL {arg:?}: {e}")));
        }

        let path = Path::new(arg);
        if !path.is_file() {
            return Err(Error::Usage(format!(
                "listing file does not exist: {}",
                path.display()
            )));
        }
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("html" | "htm") => Ok(Self::File(path.to_path_buf())),
            Some("txt") => Ok(Self::Links(path.to_path_buf())),
            _ => Err(Error::Usage(format!(
                "listing file is neither an HTML page nor a .txt links file: {}",
                path.display()
            ))),
        }
    }
}

/// Reads a links file: one absolute landing URL per line, blank lines and
/// surrounding whitespace ignored.
///
/// # Errors
///
/// [`Error::ListingUnavailable`] if the file cannot be read and
/// [`Error::Usage`] for a line that is not an http(s) URL.
pub async fn read_links(path: &Path) -> Result<Vec<Url>, Error> {
    let contents = fs::read_to_string(path)
        .await
        .map_err(|e| Error::ListingUnavailable {
            source_name: path.display().to_string(),
            reason: e.to_string(),
        })?;
    parse_links(&contents).map_err(|reason| {
        Error::Usage(format!("bad links file {}: {reason}", path.display()))
    })
}

fn parse_links(contents: &str) -> Result<Vec<Url>, String> {
    let mut urls = Vec::new();
    for (number, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let url = Url::parse(line).map_err(|e| format!("line {}: {line:?}: {e}", number + 1))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!("line {}: {line:?} is not an http(s) URL", number + 1));
        }
        urls.push(url);
    }
    Ok(urls)
}

impl fmt::Display for ListingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => write!(f, "{url}"),
            Self::File(path) | Self::Links(path) => write!(f, "{}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url() {
        let source = ListingSource::parse("https://unfccc.int/event/cop-29").unwrap();
        assert_eq!(
            source,
            ListingSource::Url(Url::parse("https://unfccc.int/event/cop-29").unwrap())
        );
    }

    #[test]
    fn test_parse_html_file() {
        let dir = tempfile::tempdir().unwrap();
        let page = dir.path().join("documents.HTM");
        std::fs::write(&page, "<html></html>").unwrap();
        let source = ListingSource::parse(page.to_str().unwrap()).unwrap();
        assert_eq!(source, ListingSource::File(page));
    }

    #[test]
    fn test_parse_rejects_missing_file() {
        let err = ListingSource::parse("/definitely/not/here.html").unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
    }

    #[test]
    fn test_parse_links_file() {
        let dir = tempfile::tempdir().unwrap();
        let links = dir.path().join("access_document_links.txt");
        std::fs::write(&links, "https://unfccc.int/documents/1\n").unwrap();
        let source = ListingSource::parse(links.to_str().unwrap()).unwrap();
        assert_eq!(source, ListingSource::Links(links));
    }

    #[test]
    fn test_parse_rejects_other_files() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("decision.pdf");
        std::fs::write(&pdf, "%PDF-1.7").unwrap();
        let err = ListingSource::parse(pdf.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
    }

    #[tokio::test]
    async fn test_read_links_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let links = dir.path().join("links.txt");
        std::fs::write(
            &links,
            "https://unfccc.int/documents/1\n\n   \n  https://unfccc.int/documents/2  \n",
        )
        .unwrap();
        let urls = read_links(&links).await.unwrap();
        let urls: Vec<_> = urls.iter().map(Url::as_str).collect();
        assert_eq!(
            urls,
            ["https://unfccc.int/documents/1", "https://unfccc.int/documents/2"]
        );
    }

    #[tokio::test]
    async fn test_read_links_rejects_bad_lines() {
        let dir = tempfile::tempdir().unwrap();
        let links = dir.path().join("links.txt");
        std::fs::write(&links, "https://unfccc.int/documents/1\n/documents/2\n").unwrap();
        let err = read_links(&links).await.unwrap_err();
        assert!(matches!(err, Error::Usage(reason) if reason.contains("line 2")));

        std::fs::write(&links, "mailto:secretariat@unfccc.int\n").unwrap();
        assert!(matches!(read_links(&links).await, Err(Error::Usage(_))));
    }

    #[tokio::test]
    async fn test_read_links_missing_file_is_unavailable() {
        let err = read_links(Path::new("/definitely/not/here.txt")).await.unwrap_err();
        assert!(matches!(err, Error::ListingUnavailable { .. }));
    }

    #[test]
    fn test_parse_rejects_empty_and_bad_url() {
        assert!(matches!(ListingSource::parse("  "), Err(Error::Usage(_))));
        assert!(matches!(ListingSource::parse("https://"), Err(Error::Usage(_))));
    }
}
