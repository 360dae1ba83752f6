use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use crate::{
    catalog::Catalog,
    error::GenerationError,
    fetcher::ReferenceFetcher,
    media::{preview, EncodedImage},
    models::{CatalogOption, ProductDetails},
    prompt::build_instruction,
};

/// Everything sent to the generative service for one attempt. Built fresh
/// per call and dropped once the call resolves.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub user_image: EncodedImage,
    pub model_image: EncodedImage,
    pub instruction: String,
}

/// Two images plus an instruction in, zero or one image out.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<EncodedImage, GenerationError>;
}

pub struct Orchestrator {
    catalog: Arc<Catalog>,
    fetcher: Arc<dyn ReferenceFetcher>,
    generator: Arc<dyn ImageGenerator>,
    require_product_details: bool,
}

impl Orchestrator {
    pub fn new(
        catalog: Arc<Catalog>,
        fetcher: Arc<dyn ReferenceFetcher>,
        generator: Arc<dyn ImageGenerator>,
    ) -> Self {
        Self { catalog, fetcher, generator, require_product_details: false }
    }

    /// Refuse to generate unless all six product detail fields are filled.
    pub fn with_required_details(mut self, required: bool) -> Self {
        self.require_product_details = required;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Resolves selection ids against the catalog, then runs [`Self::generate`].
    pub async fn generate_by_ids(
        &self,
        user_image: &str,
        model_id: &str,
        background_id: &str,
        details: Option<&ProductDetails>,
    ) -> Result<EncodedImage, GenerationError> {
        let model = self.catalog.resolve_model(model_id)?;
        let background = self.catalog.resolve_background(background_id)?;
        let user_image = EncodedImage::parse(user_image)?;
        self.generate(&user_image, model, background, details).await
    }

    /// Fetches the model reference, composes the instruction and makes exactly
    /// one call to the generator. The reference fetch always completes before
    /// the generator is invoked.
    pub async fn generate(
        &self,
        user_image: &EncodedImage,
        model: &CatalogOption,
        background: &CatalogOption,
        details: Option<&ProductDetails>,
    ) -> Result<EncodedImage, GenerationError> {
        info!(
            model = %model.id,
            background = %background.id,
            details = details.is_some(),
            "🎯 Starting photoshoot generation"
        );

        let result = self.run(user_image, model, background, details).await;
        match &result {
            Ok(image) => info!(model = %model.id, background = %background.id, "✅ Generated {} image: {}", image.mime_type, preview(&image.data)),
            Err(e) => error!(model = %model.id, background = %background.id, kind = e.kind(), "❌ Generation failed: {}", e),
        }
        result
    }

    async fn run(
        &self,
        user_image: &EncodedImage,
        model: &CatalogOption,
        background: &CatalogOption,
        details: Option<&ProductDetails>,
    ) -> Result<EncodedImage, GenerationError> {
        let scene = self.check_preconditions(user_image, background, details)?;

        let model_image = self.fetcher.fetch(&model.image_url).await?;

        let request = GenerationRequest {
            user_image: user_image.clone(),
            model_image,
            instruction: build_instruction(scene, details),
        };
        self.generator.generate(&request).await
    }

    fn check_preconditions<'a>(
        &self,
        user_image: &EncodedImage,
        background: &'a CatalogOption,
        details: Option<&ProductDetails>,
    ) -> Result<&'a str, GenerationError> {
        if user_image.data.trim().is_empty() {
            return Err(GenerationError::Precondition("user image is empty".into()));
        }

        let scene = background
            .prompt
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| GenerationError::Precondition(format!("background '{}' has no scene description", background.id)))?;

        if self.require_product_details {
            let missing = details.map(ProductDetails::missing_fields).unwrap_or_else(|| {
                ProductDetails::default().missing_fields()
            });
            if !missing.is_empty() {
                return Err(GenerationError::Precondition(format!(
                    "product details required, missing: {}",
                    missing.join(", ")
                )));
            }
        }
        Ok(scene)
    }
}
