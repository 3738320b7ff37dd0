//! Download manifest produced by a completed archive request.
//!
//! The archive answers a completed request with a shell-script body listing
//! one `https://` URL per retrievable file. The ASCII table dump captured
//! before the search ("the log") lists every matched record; records with no
//! corresponding URL in the script get a zero-byte `.dummy` placeholder so a
//! later run can tell "matched but not delivered" from "never matched".

use std::path::Path;

use regex::Regex;
use tracing::debug;

/// File suffixes the archive delivers (compressed FITS frames and text products).
const FILE_URL_PATTERN: &str = r#"https://[^\s"]+\.(?:fz|txt)"#;

/// Raw frames are named `VCAM.<timestamp>`; this matches one such token.
const CAMERA_TOKEN_PATTERN: &str = r"VCAM.\S+";

/// First `https://` URL inside an HTML attribute of the download link.
const REQUEST_URL_PATTERN: &str = r#"(https://[^"]*)""#;

#[derive(Debug, Clone)]
pub struct Manifest {
    /// Visible label of the download link, used as the script's file name.
    pub script_name: String,
    /// Full body of the download script.
    pub script_body: String,
    /// File URLs in the order they appear in the script body.
    pub files: Vec<String>,
    /// ASCII table dump of the matched records.
    pub log: String,
}

impl Manifest {
    pub fn parse(script_name: String, script_body: String, log: String) -> Self {
        let files = file_urls(&script_body);
        Self {
            script_name,
            script_body,
            files,
            log,
        }
    }
}

/// Extract the secure manifest URL from the download link's outer HTML.
pub(crate) fn request_url(outer_html: &str) -> Option<String> {
    let re = Regex::new(REQUEST_URL_PATTERN).expect("request url regex is valid");
    re.captures(outer_html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// All downloadable file URLs in a script body, in order of appearance.
pub fn file_urls(script_body: &str) -> Vec<String> {
    let re = Regex::new(FILE_URL_PATTERN).expect("file url regex is valid");
    re.find_iter(script_body)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// All camera file tokens in the ASCII log.
pub fn camera_tokens(log: &str) -> Vec<String> {
    let re = Regex::new(CAMERA_TOKEN_PATTERN).expect("camera token regex is valid");
    re.find_iter(log).map(|m| m.as_str().to_string()).collect()
}

/// Write a zero-byte `<token>.dummy` placeholder for every log token that has
/// no substring match among the file URLs. Returns the placeholder names.
pub fn write_dummy_files(
    outdir: &Path,
    log: &str,
    files: &[String],
) -> std::io::Result<Vec<String>> {
    let mut written = Vec::new();
    for token in camera_tokens(log) {
        if files.iter().any(|url| url.contains(&token)) {
            continue;
        }
        let name = format!("{token}.dummy");
        std::fs::write(outdir.join(&name), "")?;
        debug!("{name} written");
        written.push(name);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = "\
#!/bin/sh
# download script
curl https://dataportal.eso.org/api/requests/astro/1234/SAF/VCAM.2017-01-01T00:01:02.345/VCAM.2017-01-01T00:01:02.345.fits.fz
curl https://dataportal.eso.org/api/requests/astro/1234/SAF/VCAM.2017-01-01T00:03:04.567/VCAM.2017-01-01T00:03:04.567.fits.fz
curl https://dataportal.eso.org/api/requests/astro/1234/README.txt
echo done
";

    #[test]
    fn file_urls_in_body_order() {
        let files = file_urls(SCRIPT);
        assert_eq!(files.len(), 3);
        assert!(files[0].contains("VCAM.2017-01-01T00:01:02.345"));
        assert!(files[1].contains("VCAM.2017-01-01T00:03:04.567"));
        assert!(files[2].ends_with("README.txt"));
    }

    #[test]
    fn unrecognized_suffixes_ignored() {
        let files = file_urls("https://example.org/listing.html https://example.org/a.fits.fz");
        assert_eq!(files, vec!["https://example.org/a.fits.fz".to_string()]);
    }

    #[test]
    fn request_url_from_link_attribute() {
        let html = r#"<a id="dl" href="https://dataportal.eso.org/rh/requests/astro/1234">downloadRequest1234script.sh</a>"#;
        assert_eq!(
            request_url(html).as_deref(),
            Some("https://dataportal.eso.org/rh/requests/astro/1234")
        );
        assert!(request_url("<a href=\"/relative\">x</a>").is_none());
    }

    #[test]
    fn camera_tokens_from_log() {
        let log = "id      file\n1       VCAM.2017-01-01T00:01:02.345\n2       VCAM.2017-01-01T00:03:04.567\n";
        let tokens = camera_tokens(log);
        assert_eq!(
            tokens,
            vec![
                "VCAM.2017-01-01T00:01:02.345".to_string(),
                "VCAM.2017-01-01T00:03:04.567".to_string(),
            ]
        );
    }

    #[test]
    fn dummy_written_for_unmatched_token() {
        let dir = tempfile::tempdir().unwrap();
        let log = "VCAM.2017-01-01T00:01:02.345\nVCAM.2017-01-01T09:09:09.999\n";
        let files = vec![
            "https://dataportal.eso.org/SAF/VCAM.2017-01-01T00:01:02.345.fits.fz".to_string(),
        ];

        let written = write_dummy_files(dir.path(), log, &files).unwrap();
        assert_eq!(written, vec!["VCAM.2017-01-01T09:09:09.999.dummy".to_string()]);

        let placeholder = dir.path().join("VCAM.2017-01-01T09:09:09.999.dummy");
        assert_eq!(std::fs::metadata(&placeholder).unwrap().len(), 0);
        assert!(!dir.path().join("VCAM.2017-01-01T00:01:02.345.dummy").exists());
    }

    #[test]
    fn manifest_parse_collects_files() {
        let manifest = Manifest::parse(
            "downloadRequest1234script.sh".to_string(),
            SCRIPT.to_string(),
            "VCAM.2017-01-01T00:01:02.345".to_string(),
        );
        assert_eq!(manifest.files.len(), 3);
        assert_eq!(manifest.script_name, "downloadRequest1234script.sh");
    }
}
