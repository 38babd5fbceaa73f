//! PDF assembly with `lopdf`.
//!
//! Every page is a fixed-size MediaBox holding one JPEG image XObject,
//! drawn at the page's full width and its proportional height, anchored to
//! the top edge.

use crate::config::PageGeometry;
use crate::error::IntakeError;
use crate::export::encode::encode_jpeg;
use crate::export::paginate::PageImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

fn real(v: f64) -> Object {
    Object::Real(v as f32)
}

fn export_err(e: impl std::fmt::Display) -> IntakeError {
    IntakeError::ExportFailed {
        detail: e.to_string(),
    }
}

/// Build a PDF with one page per image, in order.
pub fn build_pdf(
    pages: &[PageImage],
    page: PageGeometry,
    jpeg_quality: u8,
) -> Result<Vec<u8>, IntakeError> {
    if pages.is_empty() {
        return Err(export_err("no pages to export"));
    }

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());

    for p in pages {
        let page_id = add_page(&mut doc, pages_id, p, page, jpeg_quality)?;
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).map_err(export_err)?;
    Ok(out)
}

fn add_page(
    doc: &mut Document,
    parent: ObjectId,
    p: &PageImage,
    page: PageGeometry,
    jpeg_quality: u8,
) -> Result<ObjectId, IntakeError> {
    let jpeg = encode_jpeg(&p.image, jpeg_quality)?;
    let image = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => p.image.width() as i64,
            "Height" => p.image.height() as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8_i64,
            "Filter" => "DCTDecode",
        },
        jpeg,
    )
    .with_compression(false);
    let image_id = doc.add_object(image);

    let top = page.height - p.height;
    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![real(p.width), real(0.0), real(0.0), real(p.height), real(0.0), real(top)],
            ),
            Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(
        dictionary! {},
        content.encode().map_err(export_err)?,
    ));

    Ok(doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => parent,
        "MediaBox" => vec![real(0.0), real(0.0), real(page.width), real(page.height)],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! {
                "Im0" => image_id,
            },
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::paginate::paginate;
    use image::{DynamicImage, RgbImage};

    #[test]
    fn one_pdf_page_per_band() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(200, 1000));
        let page = PageGeometry::new(100.0, 200.0);
        let pages = paginate(&img, page).unwrap();

        let bytes = build_pdf(&pages, page, 90).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));
        let doc = Document::load_mem(&bytes).expect("valid pdf");
        assert_eq!(doc.get_pages().len(), 3);
    }

    #[test]
    fn pages_embed_jpeg_streams() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(60, 40));
        let pages = paginate(&img, PageGeometry::A4).unwrap();
        let bytes = build_pdf(&pages, PageGeometry::A4, 95).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);

        let has_dct = doc.objects.values().any(|o| match o {
            Object::Stream(s) => matches!(
                s.dict.get(b"Filter"),
                Ok(Object::Name(n)) if n == b"DCTDecode"
            ),
            _ => false,
        });
        assert!(has_dct);
    }

    #[test]
    fn empty_page_list_fails() {
        let err = build_pdf(&[], PageGeometry::A4, 95).unwrap_err();
        assert!(matches!(err, IntakeError::ExportFailed { .. }));
    }
}
