//! services/api/src/adapters/certificate.rs
//!
//! This module contains the PDF certificate renderer, the concrete
//! implementation of the `CertificateService` port from the `core` crate.

use async_trait::async_trait;
use printpdf::{BuiltinFont, Image, ImageTransform, Mm, PdfDocument};
use verifly_core::domain::{Certificate, ImageData};
use verifly_core::ports::{CertificateService, PortError, PortResult};

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;

// Photo placement matches the reference layout: 10mm from the left edge,
// 80mm from the top edge, 50mm wide.
const PHOTO_LEFT_MM: f32 = 10.0;
const PHOTO_TOP_MM: f32 = 80.0;
const PHOTO_WIDTH_MM: f32 = 50.0;
const RENDER_DPI: f32 = 300.0;

/// Renders the verification certificate as a single-page A4 PDF.
#[derive(Clone)]
pub struct PdfCertificateAdapter {
    issuer_line: String,
}

impl PdfCertificateAdapter {
    /// Creates a new `PdfCertificateAdapter` with the configured issuer name.
    pub fn new(issuer_line: String) -> Self {
        Self { issuer_line }
    }
}

#[async_trait]
impl CertificateService for PdfCertificateAdapter {
    /// Builds the certificate: title, issuer line, verified name, verification
    /// id, status line and the verified photo at a fixed position.
    async fn issue(
        &self,
        name: &str,
        verification_id: &str,
        photo: &ImageData,
    ) -> PortResult<Certificate> {
        let (doc, page, layer) = PdfDocument::new(
            "KYC Verification Certificate",
            Mm(PAGE_WIDTH_MM),
            Mm(PAGE_HEIGHT_MM),
            "Layer 1",
        );
        let layer = doc.get_page(page).get_layer(layer);

        let title_font = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let body_font = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        layer.use_text(
            "KYC VERIFICATION CERTIFICATE",
            24.0,
            Mm(30.0),
            Mm(PAGE_HEIGHT_MM - 30.0),
            &title_font,
        );
        layer.use_text(
            format!("Issued by {}", self.issuer_line),
            12.0,
            Mm(80.0),
            Mm(PAGE_HEIGHT_MM - 40.0),
            &body_font,
        );
        layer.use_text(
            format!("Verified Name: {}", name),
            14.0,
            Mm(10.0),
            Mm(PAGE_HEIGHT_MM - 58.0),
            &body_font,
        );
        layer.use_text(
            format!("Verification ID: {}", verification_id),
            14.0,
            Mm(10.0),
            Mm(PAGE_HEIGHT_MM - 66.0),
            &body_font,
        );
        layer.use_text(
            "Status: VERIFIED SUCCESSFUL",
            14.0,
            Mm(10.0),
            Mm(PAGE_HEIGHT_MM - 74.0),
            &body_font,
        );

        let dynamic = printpdf::image_crate::load_from_memory(&photo.bytes)
            .map_err(|e| PortError::Unexpected(format!("failed to decode photo: {}", e)))?;
        let natural_width_mm = dynamic.width() as f32 * 25.4 / RENDER_DPI;
        let natural_height_mm = dynamic.height() as f32 * 25.4 / RENDER_DPI;
        let scale = PHOTO_WIDTH_MM / natural_width_mm;
        let photo_height_mm = natural_height_mm * scale;
        let image = Image::from_dynamic_image(&dynamic);

        // PDF y-coordinates run from the bottom; the layout is from the top.
        image.add_to_layer(
            layer.clone(),
            ImageTransform {
                translate_x: Some(Mm(PHOTO_LEFT_MM)),
                translate_y: Some(Mm(PAGE_HEIGHT_MM - PHOTO_TOP_MM - photo_height_mm)),
                scale_x: Some(scale),
                scale_y: Some(scale),
                dpi: Some(RENDER_DPI),
                ..Default::default()
            },
        );

        let bytes = doc
            .save_to_bytes()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        Ok(Certificate {
            bytes,
            file_name: "KYC_Certificate.pdf".to_string(),
        })
    }
}
