//! JPEG to PDF assembly
//!
//! Writes the session's scanned pages into a single PDF, one A4 page per
//! image, with the JPEG data embedded as-is via DCTDecode. The subset of
//! the format needed here is fixed: a catalog, a page tree, and per page
//! an image XObject plus a content stream that centers and scales it.

use engine::DocumentAssembler;
use protocol::AssembleError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A4 media box, in PDF points.
const A4_WIDTH: f32 = 595.0;
const A4_HEIGHT: f32 = 842.0;

pub struct JpegPdfAssembler {
    page_width: f32,
    page_height: f32,
}

impl JpegPdfAssembler {
    pub fn a4() -> Self {
        Self {
            page_width: A4_WIDTH,
            page_height: A4_HEIGHT,
        }
    }
}

struct JpegImage {
    bytes: Vec<u8>,
    width: u16,
    height: u16,
}

impl DocumentAssembler for JpegPdfAssembler {
    fn assemble(&self, pages: &[PathBuf], dest: &Path) -> Result<(), AssembleError> {
        if pages.is_empty() {
            return Err(AssembleError::NoPages);
        }

        let mut images = Vec::with_capacity(pages.len());
        for (index, path) in pages.iter().enumerate() {
            let bytes = fs::read(path)?;
            let (width, height) = jpeg_dimensions(&bytes)
                .ok_or_else(|| AssembleError::BadPage(index, "not a baseline JPEG".to_string()))?;
            images.push(JpegImage {
                bytes,
                width,
                height,
            });
        }

        let document = build_pdf(&images, self.page_width, self.page_height);
        debug!(
            pages = images.len(),
            size = document.len(),
            dest = %dest.display(),
            "Writing assembled document"
        );

        if let Err(e) = fs::write(dest, &document) {
            // Do not leave a torn document behind.
            let _ = fs::remove_file(dest);
            return Err(e.into());
        }
        Ok(())
    }
}

/// Serialize the document. Object layout: 1 catalog, 2 page tree, then
/// three objects per page (page, image XObject, content stream).
fn build_pdf(images: &[JpegImage], page_w: f32, page_h: f32) -> Vec<u8> {
    let mut buf: Vec<u8> = Vec::new();
    let mut offsets: Vec<usize> = Vec::new();

    buf.extend_from_slice(b"%PDF-1.4\n");

    let object_count = 2 + images.len() * 3;

    offsets.push(buf.len());
    buf.extend_from_slice(b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n");

    offsets.push(buf.len());
    let kids: Vec<String> = (0..images.len())
        .map(|i| format!("{} 0 R", 3 + i * 3))
        .collect();
    buf.extend(
        format!(
            "2 0 obj\n<< /Type /Pages /Kids [{}] /Count {} >>\nendobj\n",
            kids.join(" "),
            images.len()
        )
        .bytes(),
    );

    for (i, image) in images.iter().enumerate() {
        let page_obj = 3 + i * 3;
        let image_obj = page_obj + 1;
        let content_obj = page_obj + 2;

        offsets.push(buf.len());
        buf.extend(
            format!(
                "{page_obj} 0 obj\n<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {page_w} {page_h}] \
                 /Resources << /XObject << /Im{i} {image_obj} 0 R >> >> /Contents {content_obj} 0 R >>\nendobj\n"
            )
            .bytes(),
        );

        offsets.push(buf.len());
        buf.extend(
            format!(
                "{image_obj} 0 obj\n<< /Type /XObject /Subtype /Image /Width {} /Height {} \
                 /ColorSpace /DeviceRGB /BitsPerComponent 8 /Filter /DCTDecode /Length {} >>\nstream\n",
                image.width,
                image.height,
                image.bytes.len()
            )
            .bytes(),
        );
        buf.extend_from_slice(&image.bytes);
        buf.extend_from_slice(b"\nendstream\nendobj\n");

        let content = placement_stream(image, page_w, page_h, i);
        offsets.push(buf.len());
        buf.extend(
            format!(
                "{content_obj} 0 obj\n<< /Length {} >>\nstream\n{}\nendstream\nendobj\n",
                content.len(),
                content
            )
            .bytes(),
        );
    }

    let xref_offset = buf.len();
    buf.extend(format!("xref\n0 {}\n", object_count + 1).bytes());
    buf.extend_from_slice(b"0000000000 65535 f \n");
    for offset in &offsets {
        buf.extend(format!("{:010} 00000 n \n", offset).bytes());
    }
    buf.extend(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            object_count + 1,
            xref_offset
        )
        .bytes(),
    );

    buf
}

/// Content stream centering the image on the page, scaled to fit while
/// keeping its aspect ratio.
fn placement_stream(image: &JpegImage, page_w: f32, page_h: f32, index: usize) -> String {
    let (iw, ih) = (f32::from(image.width), f32::from(image.height));
    let scale = (page_w / iw).min(page_h / ih);
    let (w, h) = (iw * scale, ih * scale);
    let (x, y) = ((page_w - w) / 2.0, (page_h - h) / 2.0);
    format!("q\n{w:.2} 0 0 {h:.2} {x:.2} {y:.2} cm\n/Im{index} Do\nQ")
}

/// Pull width and height out of a JPEG's start-of-frame marker.
fn jpeg_dimensions(bytes: &[u8]) -> Option<(u16, u16)> {
    if bytes.len() < 4 || bytes[0] != 0xFF || bytes[1] != 0xD8 {
        return None;
    }

    let mut pos = 2;
    while pos + 3 < bytes.len() {
        if bytes[pos] != 0xFF {
            return None;
        }
        let marker = bytes[pos + 1];

        // Standalone markers carry no length field.
        if marker == 0x01 || (0xD0..=0xD8).contains(&marker) {
            pos += 2;
            continue;
        }

        let length = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
        if length < 2 {
            return None;
        }

        // SOF0..SOF15, excluding DHT (C4), JPG (C8) and DAC (CC).
        if (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC) {
            if pos + 9 > bytes.len() {
                return None;
            }
            let height = u16::from_be_bytes([bytes[pos + 5], bytes[pos + 6]]);
            let width = u16::from_be_bytes([bytes[pos + 7], bytes[pos + 8]]);
            return Some((width, height));
        }

        pos += 2 + length;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Smallest structure that carries a SOF0 frame header.
    fn tiny_jpeg(width: u16, height: u16) -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xD8];
        bytes.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x0B, 0x08]);
        bytes.extend_from_slice(&height.to_be_bytes());
        bytes.extend_from_slice(&width.to_be_bytes());
        bytes.extend_from_slice(&[0x01, 0x11, 0x00]);
        bytes.extend_from_slice(&[0xFF, 0xD9]);
        bytes
    }

    #[test]
    fn test_jpeg_dimensions() {
        assert_eq!(jpeg_dimensions(&tiny_jpeg(2480, 3508)), Some((2480, 3508)));
        assert_eq!(jpeg_dimensions(b"not a jpeg"), None);
        assert_eq!(jpeg_dimensions(&[0xFF, 0xD8]), None);
    }

    #[test]
    fn test_jpeg_dimensions_skips_leading_segments() {
        // APP0 before the SOF, as produced by most scanners.
        let mut bytes = vec![0xFF, 0xD8];
        bytes.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x04, 0x4A, 0x46]);
        bytes.extend_from_slice(&tiny_jpeg(100, 200)[2..]);
        assert_eq!(jpeg_dimensions(&bytes), Some((100, 200)));
    }

    #[test]
    fn test_assemble_builds_a_page_per_image() {
        let dir = tempfile::tempdir().unwrap();
        let mut pages = Vec::new();
        for i in 0..2 {
            let path = dir.path().join(format!("page-{i}.jpg"));
            fs::write(&path, tiny_jpeg(100, 140)).unwrap();
            pages.push(path);
        }
        let dest = dir.path().join("out.pdf");

        JpegPdfAssembler::a4().assemble(&pages, &dest).unwrap();

        let document = fs::read(&dest).unwrap();
        assert!(document.starts_with(b"%PDF-1.4"));
        assert!(document.ends_with(b"%%EOF\n"));
        let text = String::from_utf8_lossy(&document);
        assert!(text.contains("/Count 2"));
        assert!(text.contains("/Filter /DCTDecode"));
        assert!(text.contains("/Im0"));
        assert!(text.contains("/Im1"));
    }

    #[test]
    fn test_assemble_rejects_empty_and_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.pdf");
        let assembler = JpegPdfAssembler::a4();

        assert!(matches!(
            assembler.assemble(&[], &dest),
            Err(AssembleError::NoPages)
        ));

        let bad = dir.path().join("bad.jpg");
        fs::write(&bad, b"garbage").unwrap();
        assert!(matches!(
            assembler.assemble(&[bad], &dest),
            Err(AssembleError::BadPage(0, _))
        ));
    }

    #[test]
    fn test_xref_offsets_point_at_objects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.jpg");
        fs::write(&path, tiny_jpeg(10, 10)).unwrap();
        let dest = dir.path().join("out.pdf");
        JpegPdfAssembler::a4().assemble(&[path], &dest).unwrap();

        let document = fs::read(&dest).unwrap();
        let text = String::from_utf8_lossy(&document);

        // Every in-use xref entry must point at "<n> 0 obj".
        let xref_at = text.rfind("\nxref\n").unwrap() + 1;
        let entries: Vec<&str> = text[xref_at..]
            .lines()
            .filter(|line| line.ends_with("n "))
            .collect();
        assert_eq!(entries.len(), 5);
        for (i, entry) in entries.iter().enumerate() {
            let offset: usize = entry.split_whitespace().next().unwrap().parse().unwrap();
            let expected = format!("{} 0 obj", i + 1);
            assert!(document[offset..].starts_with(expected.as_bytes()));
        }
    }
}
