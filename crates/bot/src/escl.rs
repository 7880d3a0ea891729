//! eSCL capture client
//!
//! Minimal AirScan driver: create a scan job by POSTing the settings
//! document, drain `NextDocument` pages until the scanner reports the
//! document complete, then delete the job. One capture call per acquired
//! device; the engine's lease guarantees exclusivity around it.

use async_trait::async_trait;
use engine::CaptureClient;
use protocol::{CaptureError, DeviceInfo, ScanSettings};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use reqwest::StatusCode;
use std::io::Cursor;
use std::time::Duration;
use tracing::{debug, warn};

const ESCL_NS: &str = "http://schemas.hp.com/imaging/escl/2011/05/03";
const PWG_NS: &str = "http://www.pwg.org/schemas/2010/12/sm";

pub struct EsclClient {
    http: reqwest::Client,
}

impl EsclClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        // Consumer scanners ship self-signed certificates.
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { http })
    }

    async fn create_job(
        &self,
        device: &DeviceInfo,
        settings: &ScanSettings,
    ) -> Result<String, CaptureError> {
        let url = format!("{}/ScanJobs", device.base_url);
        let body = scan_settings_xml(settings)?;

        let response = self
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "text/xml")
            .body(body)
            .send()
            .await
            .map_err(|e| CaptureError::JobCreate(e.to_string()))?;

        if response.status() != StatusCode::CREATED {
            return Err(CaptureError::JobCreate(format!(
                "scanner answered {} to the job request",
                response.status()
            )));
        }

        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                CaptureError::Protocol("job created without a Location header".to_string())
            })?;

        Ok(resolve_location(&device.base_url, location))
    }

    /// Fetch pages until the scanner signals the end of the document with
    /// a 404. A 404 before any page arrived means nothing was scanned.
    async fn drain_pages(&self, job_url: &str) -> Result<Vec<Vec<u8>>, CaptureError> {
        let mut pages = Vec::new();
        loop {
            let url = format!("{}/NextDocument", job_url);
            let response = self
                .http
                .get(&url)
                .send()
                .await
                .map_err(|e| CaptureError::PageTransfer(e.to_string()))?;

            match response.status() {
                StatusCode::OK => {
                    let bytes = response
                        .bytes()
                        .await
                        .map_err(|e| CaptureError::PageTransfer(e.to_string()))?;
                    debug!(page = pages.len(), size = bytes.len(), "Received page");
                    pages.push(bytes.to_vec());
                }
                StatusCode::NOT_FOUND if !pages.is_empty() => break,
                StatusCode::NOT_FOUND => {
                    return Err(CaptureError::PageTransfer(
                        "scanner produced no pages".to_string(),
                    ));
                }
                status => {
                    return Err(CaptureError::PageTransfer(format!(
                        "unexpected status {status} fetching a page"
                    )));
                }
            }
        }
        Ok(pages)
    }
}

#[async_trait]
impl CaptureClient for EsclClient {
    async fn capture(
        &self,
        device: &DeviceInfo,
        settings: &ScanSettings,
    ) -> Result<Vec<Vec<u8>>, CaptureError> {
        let job_url = self.create_job(device, settings).await?;
        debug!(job = %job_url, "Scan job created");

        let result = self.drain_pages(&job_url).await;

        // Best-effort cleanup; the scanner also times jobs out on its own.
        if let Err(e) = self.http.delete(&job_url).send().await {
            warn!(job = %job_url, error = %e, "Scan job cleanup failed");
        }

        result
    }
}

/// Build the eSCL ScanSettings document.
fn scan_settings_xml(settings: &ScanSettings) -> Result<String, CaptureError> {
    let proto = |e: &dyn std::fmt::Display| CaptureError::Protocol(e.to_string());

    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(|e| proto(&e))?;

    let mut root = BytesStart::new("scan:ScanSettings");
    root.push_attribute(("xmlns:scan", ESCL_NS));
    root.push_attribute(("xmlns:pwg", PWG_NS));
    writer.write_event(Event::Start(root)).map_err(|e| proto(&e))?;

    text_element(&mut writer, "pwg:Version", "2.0")?;
    text_element(&mut writer, "pwg:InputSource", settings.input_source.escl_name())?;
    text_element(&mut writer, "scan:ColorMode", &settings.color_mode)?;
    text_element(&mut writer, "pwg:DocumentFormat", &settings.document_format)?;

    writer
        .write_event(Event::End(BytesEnd::new("scan:ScanSettings")))
        .map_err(|e| proto(&e))?;

    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes).map_err(|e| CaptureError::Protocol(e.to_string()))
}

fn text_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    tag: &str,
    value: &str,
) -> Result<(), CaptureError> {
    let proto = |e: &dyn std::fmt::Display| CaptureError::Protocol(e.to_string());

    writer
        .write_event(Event::Start(BytesStart::new(tag)))
        .map_err(|e| proto(&e))?;
    writer
        .write_event(Event::Text(BytesText::new(value)))
        .map_err(|e| proto(&e))?;
    writer
        .write_event(Event::End(BytesEnd::new(tag)))
        .map_err(|e| proto(&e))?;
    Ok(())
}

/// The job Location header may be absolute or a bare path; a path is
/// resolved against the scheme and authority of the device's base URL.
fn resolve_location(base_url: &str, location: &str) -> String {
    if location.starts_with("http://") || location.starts_with("https://") {
        return location.trim_end_matches('/').to_string();
    }

    let origin = match base_url.find("://").map(|i| i + 3) {
        Some(start) => match base_url[start..].find('/') {
            Some(slash) => &base_url[..start + slash],
            None => base_url,
        },
        None => base_url,
    };
    format!("{}/{}", origin, location.trim_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::InputSource;

    #[test]
    fn test_settings_document_carries_the_configuration() {
        let settings = ScanSettings {
            color_mode: "Grayscale8".to_string(),
            input_source: InputSource::Feeder,
            document_format: "image/jpeg".to_string(),
        };
        let xml = scan_settings_xml(&settings).unwrap();

        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<scan:ScanSettings"));
        assert!(xml.contains(ESCL_NS));
        assert!(xml.contains("<pwg:Version>2.0</pwg:Version>"));
        assert!(xml.contains("<pwg:InputSource>Feeder</pwg:InputSource>"));
        assert!(xml.contains("<scan:ColorMode>Grayscale8</scan:ColorMode>"));
        assert!(xml.contains("<pwg:DocumentFormat>image/jpeg</pwg:DocumentFormat>"));
    }

    #[test]
    fn test_resolve_location_absolute_and_path() {
        let base = "http://192.168.1.20:80/eSCL";
        assert_eq!(
            resolve_location(base, "http://192.168.1.20:80/eSCL/ScanJobs/1/"),
            "http://192.168.1.20:80/eSCL/ScanJobs/1"
        );
        assert_eq!(
            resolve_location(base, "/eSCL/ScanJobs/1"),
            "http://192.168.1.20:80/eSCL/ScanJobs/1"
        );
        assert_eq!(
            resolve_location(base, "eSCL/ScanJobs/1"),
            "http://192.168.1.20:80/eSCL/ScanJobs/1"
        );
    }
}
