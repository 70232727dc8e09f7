//! Builders for detector observations and sample blueprint files.

#![allow(dead_code)]

use coatplan::model::{Condition, Material, SurfaceLocation, SurfaceType};
use coatplan::RawObservation;
use lopdf::{dictionary, Document, Object};

/// Builds a `RawObservation` with sensible defaults (10×8 concrete, fair, floor 1 lobby).
pub struct ObservationBuilder {
    observation: RawObservation,
}

impl ObservationBuilder {
    pub fn new(area_number: &str) -> Self {
        Self {
            observation: RawObservation {
                area_number: area_number.to_string(),
                surface_type: SurfaceType::Standard,
                material: Material::Concrete,
                condition: Condition::Fair,
                width: 10.0,
                height: 8.0,
                area: None,
                unit: None,
                location: SurfaceLocation {
                    floor: 1,
                    room: "Lobby".to_string(),
                    orientation: None,
                },
                confidence: 0.9,
            },
        }
    }

    pub fn material(mut self, material: Material) -> Self {
        self.observation.material = material;
        self
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.observation.condition = condition;
        self
    }

    pub fn dimensions(mut self, width: f64, height: f64) -> Self {
        self.observation.width = width;
        self.observation.height = height;
        self
    }

    pub fn measured_area(mut self, area: f64) -> Self {
        self.observation.area = Some(area);
        self
    }

    pub fn located(mut self, floor: i32, room: &str) -> Self {
        self.observation.location.floor = floor;
        self.observation.location.room = room.to_string();
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.observation.confidence = confidence;
        self
    }

    pub fn build(self) -> RawObservation {
        self.observation
    }
}

/// A small valid PNG.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([240, 240, 240]));
    let mut cursor = std::io::Cursor::new(Vec::new());
    img.write_to(&mut cursor, image::ImageFormat::Png)
        .expect("encode png");
    cursor.into_inner()
}

/// A PDF with `page_count` empty Letter pages.
pub fn pdf_bytes(page_count: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let kids: Vec<Object> = (0..page_count)
        .map(|_| {
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
            })
            .into()
        })
        .collect();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count as i64,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("encode pdf");
    bytes
}
