use crate::models::{DetailField, ProductDetails};

const BASE_INSTRUCTION: &str = "Create a professional fashion product photograph. \
The first image is a clothing item and the second image is a fashion model. \
Dress the model from the second image in the exact clothing item from the first image, \
preserving the garment's design, fabric, texture, pattern and fit. \
Keep the model's face, body shape, skin tone and identity unchanged.";

const CLOSING_INSTRUCTION: &str = "The result must be a single photorealistic, high-resolution image \
that looks like a high-end e-commerce photoshoot, with no text, watermarks or borders.";

/// Builds the instruction sent alongside the two images.
///
/// Output depends only on the scene fragment and the product details, so
/// identical inputs always produce identical text. Blank detail fields are
/// left out; `None` omits the details section altogether.
pub fn build_instruction(scene: &str, details: Option<&ProductDetails>) -> String {
    let mut text = String::from(BASE_INSTRUCTION);
    text.push_str("\n\nSetting: place the model in ");
    text.push_str(scene.trim());
    if !scene.trim_end().ends_with('.') {
        text.push('.');
    }

    let directives: Vec<String> = details
        .map(|d| {
            d.fields()
                .into_iter()
                .filter(|(_, value)| !value.trim().is_empty())
                .map(|(field, value)| directive(field, value.trim()))
                .collect()
        })
        .unwrap_or_default();

    if !directives.is_empty() {
        text.push_str("\n\nProduct details:");
        for line in directives {
            text.push_str("\n- ");
            text.push_str(&line);
        }
    }

    text.push_str("\n\n");
    text.push_str(CLOSING_INSTRUCTION);
    text
}

fn directive(field: DetailField, value: &str) -> String {
    match field {
        DetailField::ProductType => format!("Product type: the garment is a {value}."),
        DetailField::Color => format!("Color: the garment color must be exactly {value}."),
        DetailField::Style => format!("Style: style the outfit in a {value} style."),
        DetailField::ModelPose => format!("Model pose: {value}."),
        DetailField::LightingStyle => format!("Lighting: use {value} lighting."),
        DetailField::ShotType => format!("Shot type: frame the photo as a {value}."),
    }
}
