use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

/// Image payload as a mime type plus standard base64 data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedImage {
    pub mime_type: String,
    pub data: String,
}

impl EncodedImage {
    /// Encodes raw bytes, sniffing the format from magic bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GenerationError> {
        let mime_type = sniff_mime(bytes)
            .ok_or_else(|| GenerationError::Encoding("payload is not a recognized image format".into()))?;
        Ok(Self { mime_type: mime_type.to_string(), data: STANDARD.encode(bytes) })
    }

    /// Accepts `data:<mime>;base64,<data>` or bare base64.
    pub fn parse(text: &str) -> Result<Self, GenerationError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(GenerationError::Precondition("user image is empty".into()));
        }

        let (declared_mime, data) = match text.strip_prefix("data:") {
            Some(rest) => {
                let (header, data) = rest
                    .split_once(',')
                    .ok_or_else(|| GenerationError::Encoding("data URL has no payload".into()))?;
                let header = header
                    .strip_suffix(";base64")
                    .ok_or_else(|| GenerationError::Encoding("data URL is not base64 encoded".into()))?;
                let mime = header.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
                (Some(mime).filter(|m| m.starts_with("image/")), data)
            }
            None => (None, text),
        };

        if data.is_empty() {
            return Err(GenerationError::Precondition("user image is empty".into()));
        }
        let bytes = STANDARD
            .decode(data)
            .map_err(|e| GenerationError::Encoding(format!("invalid base64 image data: {e}")))?;

        let mime_type = declared_mime
            .or_else(|| sniff_mime(&bytes).map(str::to_string))
            .unwrap_or_else(|| "image/png".to_string());
        Ok(Self { mime_type, data: data.to_string() })
    }

    pub fn decode(&self) -> Result<Vec<u8>, GenerationError> {
        STANDARD
            .decode(&self.data)
            .map_err(|e| GenerationError::Encoding(format!("invalid base64 image data: {e}")))
    }

    pub fn file_extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            "image/svg+xml" => "svg",
            _ => "png",
        }
    }
}

pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    image::guess_format(bytes).ok().map(|format| format.to_mime_type())
}

/// Shortens base64 for log lines.
pub fn preview(data: &str) -> String {
    let total = data.chars().count();
    if total > 50 {
        format!("{}...[{} chars total]", data.chars().take(50).collect::<String>(), total)
    } else {
        data.to_string()
    }
}
