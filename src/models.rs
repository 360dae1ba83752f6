use serde::{Serialize, Deserialize};
use serde_with::skip_serializing_none;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A selectable model or background.
#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CatalogOption {
    pub id: String,
    #[serde(alias = "label")]
    pub name: String,
    pub image_url: String,
    /// Scene description for backgrounds; absent for models.
    #[serde(default)]
    pub prompt: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ProductDetails {
    pub product_type: String,
    pub color: String,
    pub style: String,
    pub model_pose: String,
    pub lighting_style: String,
    pub shot_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailField {
    ProductType,
    Color,
    Style,
    ModelPose,
    LightingStyle,
    ShotType,
}

impl DetailField {
    pub fn label(self) -> &'static str {
        match self {
            DetailField::ProductType => "product type",
            DetailField::Color => "color",
            DetailField::Style => "style",
            DetailField::ModelPose => "model pose",
            DetailField::LightingStyle => "lighting style",
            DetailField::ShotType => "shot type",
        }
    }
}

impl ProductDetails {
    /// Fields and values in instruction order.
    pub fn fields(&self) -> [(DetailField, &str); 6] {
        [
            (DetailField::ProductType, self.product_type.as_str()),
            (DetailField::Color, self.color.as_str()),
            (DetailField::Style, self.style.as_str()),
            (DetailField::ModelPose, self.model_pose.as_str()),
            (DetailField::LightingStyle, self.lighting_style.as_str()),
            (DetailField::ShotType, self.shot_type.as_str()),
        ]
    }

    pub fn missing_fields(&self) -> Vec<&'static str> {
        self.fields()
            .into_iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(field, _)| field.label())
            .collect()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GenerateRequest {
    pub user_id: String,
    /// Data URL or bare base64.
    pub user_image: String,
    pub model_id: String,
    pub background_id: String,
    #[serde(default)]
    pub product_details: Option<ProductDetails>,
}

#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GenerateResponse {
    pub mime_type: String,
    pub image_base64: String,
    pub record: Option<GenerationRecord>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct GenerationRecord {
    pub id: Uuid,
    pub user_id: String,
    pub image_url: String,
    pub storage_path: String,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
}
