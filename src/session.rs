//! One browser session against the raw-data archive.
//!
//! The archive is driven through its five-page HTML workflow: query form,
//! result table, login, confirmation, request status. [`ArchiveSession`] owns
//! the browser and the one page cursor moving through those states; no two
//! operations may run concurrently against the same session.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::ArchiveOptions;
use crate::error::ArchiveError;
use crate::manifest::{self, Manifest};
use crate::query::QueryParams;
use crate::traits::ArchiveClient;

/// Entry page of the raw-data archive query form.
pub const ARCHIVE_URL: &str = "http://archive.eso.org/eso/eso_archive_main.html";

/// Extra result columns toggled on before searching.
const EXTRA_COLUMNS: [&str; 4] = ["tab_origfile", "tab_obs_name", "tab_ob_id", "tab_rel_date"];

/// Settle time after a click that triggers a page load.
const NAV_SETTLE: Duration = Duration::from_secs(2);
/// Settle time after an on-page action.
const CLICK_SETTLE: Duration = Duration::from_millis(500);
/// Ceiling for the completion-poll backoff.
const POLL_MAX_INTERVAL: Duration = Duration::from_secs(30);

/// True when the page carries an element labelled exactly "Login".
const LOGIN_PRESENT_JS: &str = r#"
    (function() {
        var els = document.querySelectorAll('a, button, input');
        for (var i = 0; i < els.length; i++) {
            var label = els[i].value || els[i].textContent || '';
            if (label.trim() === 'Login') return true;
        }
        return false;
    })()
"#;

/// Clicks the second element labelled "Login" (the first is the form title).
const LOGIN_CLICK_JS: &str = r#"
    (function() {
        var found = 0;
        var els = document.querySelectorAll('a, button, input');
        for (var i = 0; i < els.length; i++) {
            var label = els[i].value || els[i].textContent || '';
            if (label.trim() === 'Login') {
                found++;
                if (found === 2) { els[i].click(); return true; }
            }
        }
        return false;
    })()
"#;

/// Returns the label and outer HTML (NUL-separated) of the first link whose
/// text contains "downloadRequest", or the empty string.
const DOWNLOAD_LINK_JS: &str = r#"
    (function() {
        var links = document.querySelectorAll('a');
        for (var i = 0; i < links.length; i++) {
            var text = (links[i].textContent || '').trim();
            if (text.indexOf('downloadRequest') >= 0) {
                return text + '\u0000' + links[i].outerHTML;
            }
        }
        return '';
    })()
"#;

#[derive(Debug)]
pub struct ArchiveSession {
    options: ArchiveOptions,
    query: QueryParams,
    browser: Option<Browser>,
    page: Option<Arc<Page>>,
}

impl ArchiveSession {
    /// Stage a session from a validated option mapping.
    ///
    /// Query parameters are validated here, before any browser exists; a
    /// malformed night or hour never reaches the network.
    pub fn new(options: ArchiveOptions) -> Result<Self, ArchiveError> {
        let query = QueryParams::from_options(&options)?;
        Ok(Self {
            options,
            query,
            browser: None,
            page: None,
        })
    }

    pub fn options(&self) -> &ArchiveOptions {
        &self.options
    }

    pub fn query(&self) -> &QueryParams {
        &self.query
    }

    /// Night of observation that was staged (YYYYMMDD).
    pub fn nightobs(&self) -> String {
        self.query.nightobs()
    }

    /// Output directory with its template resolved against current values.
    pub fn output(&self) -> std::path::PathBuf {
        self.query.output()
    }

    fn page(&self) -> Result<&Arc<Page>, ArchiveError> {
        self.page
            .as_ref()
            .ok_or_else(|| ArchiveError::BrowserInit("browser is not initialized".into()))
    }

    async fn page_text(&self, page: &Page) -> Result<String, ArchiveError> {
        page.content()
            .await
            .map_err(|e| ArchiveError::Navigation(e.to_string()))
    }

    async fn eval_bool(&self, page: &Page, script: &str) -> Result<bool, ArchiveError> {
        let result = page
            .evaluate(script)
            .await
            .map_err(|e| ArchiveError::JavaScript(e.to_string()))?;
        Ok(result.into_value::<bool>().unwrap_or(false))
    }

    async fn click(&self, page: &Page, selector: &str) -> Result<(), ArchiveError> {
        page.find_element(selector)
            .await
            .map_err(|e| ArchiveError::ElementNotFound(format!("{selector}: {e}")))?
            .click()
            .await
            .map_err(|e| ArchiveError::Navigation(format!("{selector}: {e}")))?;
        Ok(())
    }

    /// Click a button/checkbox addressed by its `value` attribute.
    async fn click_by_value(&self, page: &Page, value: &str) -> Result<(), ArchiveError> {
        self.click(page, &format!("input[value='{value}']")).await
    }

    /// Type into an (empty) text input addressed by name.
    async fn fill_field(&self, page: &Page, name: &str, value: &str) -> Result<(), ArchiveError> {
        let selector = format!("input[name='{name}']");
        page.find_element(&selector)
            .await
            .map_err(|e| ArchiveError::ElementNotFound(format!("{selector}: {e}")))?
            .type_str(value)
            .await
            .map_err(|e| ArchiveError::Navigation(format!("{selector}: {e}")))?;
        Ok(())
    }

    /// Overwrite a text input that carries a server-side default.
    async fn set_field_value(
        &self,
        page: &Page,
        name: &str,
        value: &str,
    ) -> Result<(), ArchiveError> {
        let script = format!(
            r#"(function() {{
                var el = document.querySelector("input[name='{name}']");
                if (!el) return false;
                el.value = {value};
                return true;
            }})()"#,
            name = name,
            value = js_str(value),
        );
        if !self.eval_bool(page, &script).await? {
            return Err(ArchiveError::ElementNotFound(format!("input[name='{name}']")));
        }
        Ok(())
    }

    async fn select_option(
        &self,
        page: &Page,
        name: &str,
        value: &str,
    ) -> Result<(), ArchiveError> {
        let script = format!(
            r#"(function() {{
                var el = document.querySelector("select[name='{name}']");
                if (!el) return false;
                el.value = {value};
                el.dispatchEvent(new Event('change'));
                return true;
            }})()"#,
            name = name,
            value = js_str(value),
        );
        if !self.eval_bool(page, &script).await? {
            return Err(ArchiveError::ElementNotFound(format!("select[name='{name}']")));
        }
        Ok(())
    }

    /// Side trip before the real search: switch the output format to ASCII,
    /// run the search, keep the response text, then restore the HTML format
    /// on the query form. Must not disturb the staged search state.
    async fn capture_log(&self, page: &Page) -> Result<String, ArchiveError> {
        self.select_option(page, "wdbo", "ascii/display").await?;
        self.click(page, "#search").await?;
        sleep(NAV_SETTLE).await;
        let logdata = self.page_text(page).await?;

        page.evaluate("window.history.back()")
            .await
            .map_err(|e| ArchiveError::Navigation(e.to_string()))?;
        sleep(NAV_SETTLE).await;
        self.select_option(page, "wdbo", "html/display").await?;

        Ok(logdata)
    }

    async fn login(&self, page: &Page) -> Result<(), ArchiveError> {
        // The archive accepts anonymous requests in some configurations.
        if !self.eval_bool(page, LOGIN_PRESENT_JS).await? {
            warn!("No login form found");
            return Ok(());
        }

        let username = self.options.username().to_string();
        self.fill_field(page, "username", &username).await?;
        self.fill_field(page, "password", self.options.password()).await?;

        if self.options.debug() {
            self.log_screenshot(page).await;
        }

        if !self.eval_bool(page, LOGIN_CLICK_JS).await? {
            return Err(ArchiveError::ElementNotFound("Login button".into()));
        }
        sleep(NAV_SETTLE).await;

        if self.page_text(page).await?.contains("Login failed") {
            return Err(ArchiveError::LoginFailed { username });
        }

        debug!("Login successful for {username}");
        Ok(())
    }

    /// Full-page screenshot as a data URL in the debug log.
    async fn log_screenshot(&self, page: &Page) {
        if let Ok(shot) = page
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
        {
            use base64::Engine;
            let encoded = base64::engine::general_purpose::STANDARD.encode(&shot);
            debug!("Login screenshot: data:image/png;base64,{encoded}");
        }
    }

    /// Poll the status page until the server-side job reports "Completed".
    ///
    /// Interval and overall timeout come from the `poll_interval` /
    /// `poll_timeout` options; the interval doubles between checks up to
    /// [`POLL_MAX_INTERVAL`].
    async fn wait_completed(&self, page: &Page) -> Result<(), ArchiveError> {
        let timeout = self.options.poll_timeout();
        let mut interval = self.options.poll_interval();
        let start = Instant::now();

        loop {
            if self.page_text(page).await?.contains("Completed") {
                info!("Request completed after {:?}", start.elapsed());
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(ArchiveError::Timeout(format!(
                    "request not completed after {}s",
                    timeout.as_secs()
                )));
            }
            debug!("Request still running, next check in {}s", interval.as_secs());
            sleep(interval).await;
            interval = next_poll_interval(interval);
        }
    }

    async fn find_download_link(&self, page: &Page) -> Result<(String, String), ArchiveError> {
        let result = page
            .evaluate(DOWNLOAD_LINK_JS)
            .await
            .map_err(|e| ArchiveError::JavaScript(e.to_string()))?;
        let raw = result.into_value::<String>().unwrap_or_default();

        match raw.split_once('\u{0}') {
            Some((label, outer)) if !label.is_empty() => {
                Ok((label.to_string(), outer.to_string()))
            }
            _ => Err(ArchiveError::ElementNotFound("downloadRequest link".into())),
        }
    }

    /// Fetch the manifest over plain HTTP, carrying the browser's cookie jar
    /// so the authenticated session is preserved.
    async fn fetch_manifest(&self, page: &Page, url: &str) -> Result<String, ArchiveError> {
        let cookies = page
            .get_cookies()
            .await
            .map_err(|e| ArchiveError::Navigation(e.to_string()))?;
        let cookie_header = cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ");

        let client = reqwest::Client::new();
        let response = client
            .get(url)
            .header(reqwest::header::COOKIE, cookie_header)
            .send()
            .await
            .map_err(|e| ArchiveError::Download(e.to_string()))?
            .error_for_status()
            .map_err(|e| ArchiveError::Download(e.to_string()))?;

        response
            .text()
            .await
            .map_err(|e| ArchiveError::Download(e.to_string()))
    }
}

#[async_trait]
impl ArchiveClient for ArchiveSession {
    async fn initialize(&mut self) -> Result<(), ArchiveError> {
        info!("Launching browser...");

        let mut builder = BrowserConfig::builder()
            .window_size(1280, 800)
            .no_sandbox()
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu");

        if !self.options.headless() {
            builder = builder.with_head();
        }

        let config = builder
            .build()
            .map_err(|e| ArchiveError::BrowserInit(format!("browser config error: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ArchiveError::BrowserInit(e.to_string()))?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                debug!("Browser event: {:?}", event);
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| ArchiveError::BrowserInit(e.to_string()))?;

        debug!("Opening {ARCHIVE_URL}");
        page.goto(ARCHIVE_URL)
            .await
            .map_err(|e| ArchiveError::Navigation(e.to_string()))?;
        page.wait_for_navigation()
            .await
            .map_err(|e| ArchiveError::Navigation(e.to_string()))?;

        self.browser = Some(browser);
        self.page = Some(Arc::new(page));

        info!("Archive query form loaded");
        Ok(())
    }

    async fn apply_query(&mut self) -> Result<(), ArchiveError> {
        let page = self.page()?.clone();
        let query = self.query.clone();

        if let Some(night) = query.night_form_value() {
            debug!("Selecting night {}", query.nightobs());
            self.fill_field(&page, "night", night).await?;
        }
        if let Some(target) = query.target() {
            debug!("Selecting target {target}");
            self.fill_field(&page, "target", target).await?;
        }
        if let Some(resolver) = query.staged_resolver() {
            debug!("Selecting resolver {}", resolver.form_value());
            self.select_option(&page, "resolver", resolver.form_value()).await?;
        }
        if let Some((ra, dec)) = query.coords() {
            debug!("Selecting coordinates {ra} {dec}");
            self.fill_field(&page, "ra", ra).await?;
            self.fill_field(&page, "dec", dec).await?;
        }
        if let Some(instrument) = query.instrument() {
            debug!("Selecting instrument {instrument}");
            for ins in instrument.split(',') {
                self.click_by_value(&page, ins).await?;
            }
        }
        if let Some(hour) = query.staged_starttime() {
            debug!("Selecting start time {hour}");
            self.select_option(&page, "starttime", &hour.to_string()).await?;
        }
        if let Some(hour) = query.staged_endtime() {
            debug!("Selecting end time {hour}");
            self.select_option(&page, "endtime", &hour.to_string()).await?;
        }
        if let Some(rows) = query.staged_rows() {
            debug!("Selecting max rows {rows}");
            self.set_field_value(&page, "max_rows_returned", &rows.to_string()).await?;
        }

        Ok(())
    }

    async fn request(&mut self) -> Result<Option<Manifest>, ArchiveError> {
        let page = self.page()?.clone();
        debug!("Searching and requesting data");

        // Query form - toggle the extra result columns
        for tab in EXTRA_COLUMNS {
            self.click(&page, &format!("input[name='{tab}']")).await?;
        }

        // Query form - capture the ascii table dump before the real search
        let logdata = self.capture_log(&page).await?;

        // Query form - run the search
        self.click(&page, "#search").await?;
        sleep(NAV_SETTLE).await;

        // Result page - an empty result is the normal "no hits" outcome
        if self.page_text(&page).await?.contains("No data returned") {
            error!("No data returned");
            return Ok(None);
        }

        // Result page - mark every row and request the datasets
        self.click(&page, "#ibmarkall").await?;
        sleep(CLICK_SETTLE).await;
        self.click_by_value(&page, "Request marked datasets").await?;
        sleep(NAV_SETTLE).await;

        // Login page - a rejected login ends the run without a manifest
        match self.login(&page).await {
            Ok(()) => {}
            Err(ArchiveError::LoginFailed { username }) => {
                error!("Login unsuccessful for {username}");
                return Ok(None);
            }
            Err(err) => return Err(err),
        }

        // Confirmation page - submit the request
        self.click(&page, "input[name='submit']").await?;
        sleep(NAV_SETTLE).await;

        // Status page - wait for the server-side job
        self.wait_completed(&page).await?;

        let (label, outer_html) = self.find_download_link(&page).await?;
        let url = manifest::request_url(&outer_html).ok_or_else(|| {
            ArchiveError::Navigation(format!("no https url in download link: {outer_html}"))
        })?;

        let script = self.fetch_manifest(&page, &url).await?;

        let outdir = self.query.output();
        std::fs::create_dir_all(&outdir)?;

        std::fs::write(outdir.join(&label), &script)?;
        debug!("{label} written");

        let logname = format!("ESOLOG.{}", self.query.nightobs());
        std::fs::write(outdir.join(&logname), &logdata)?;
        debug!("{logname} written");

        let manifest = Manifest::parse(label, script, logdata);

        // Placeholders for records the archive matched but delivered no file for
        manifest::write_dummy_files(&outdir, &manifest.log, &manifest.files)?;

        Ok(Some(manifest))
    }

    async fn close(&mut self) -> Result<(), ArchiveError> {
        self.page = None;
        if let Some(mut browser) = self.browser.take() {
            info!("Closing browser...");
            if let Err(e) = browser.close().await {
                debug!("Browser close: {e}");
            }
        }
        Ok(())
    }
}

/// Double the poll interval, capped at [`POLL_MAX_INTERVAL`].
fn next_poll_interval(current: Duration) -> Duration {
    (current * 2).min(POLL_MAX_INTERVAL)
}

/// Quote a value as a single-quoted JavaScript string literal.
fn js_str(value: &str) -> String {
    let escaped = value
        .replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace('\n', "\\n");
    format!("'{escaped}'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn options(pairs: &[(&str, &str)]) -> ArchiveOptions {
        let map = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<BTreeMap<_, _>>();
        ArchiveOptions::from_map(map).unwrap()
    }

    #[test]
    fn new_session_has_no_browser() {
        let session = ArchiveSession::new(options(&[("nightobs", "20170101")])).unwrap();
        assert!(session.browser.is_none());
        assert!(session.page.is_none());
        assert_eq!(session.nightobs(), "20170101");
    }

    #[test]
    fn bad_night_fails_before_any_browser() {
        let err = ArchiveSession::new(options(&[("nightobs", "january")])).unwrap_err();
        assert!(matches!(err, ArchiveError::Config { .. }));
    }

    #[test]
    fn output_reflects_staged_values() {
        let session = ArchiveSession::new(options(&[
            ("nightobs", "20170101"),
            ("instrument", "VIRCAM"),
            ("output", "/data/{instrument}/{nightobs}"),
        ]))
        .unwrap();
        assert_eq!(session.output(), PathBuf::from("/data/VIRCAM/20170101"));
    }

    #[test]
    fn poll_interval_doubles_and_caps() {
        let mut interval = Duration::from_secs(2);
        let mut schedule = Vec::new();
        for _ in 0..6 {
            schedule.push(interval.as_secs());
            interval = next_poll_interval(interval);
        }
        assert_eq!(schedule, vec![2, 4, 8, 16, 30, 30]);
    }

    #[test]
    fn js_str_escapes_quotes() {
        assert_eq!(js_str("NGC 253"), "'NGC 253'");
        assert_eq!(js_str("o'brien"), r"'o\'brien'");
        assert_eq!(js_str(r"a\b"), r"'a\\b'");
    }
}
