use std::collections::HashMap;

use bytes::Bytes;
use chrono::Utc;
use parking_lot::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::{error::GenerationError, media::EncodedImage, models::GenerationRecord};

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub mime_type: String,
    pub bytes: Bytes,
}

/// Object storage plus a record store for generated images.
#[derive(Default)]
pub struct HistoryStore {
    objects: RwLock<HashMap<String, StoredObject>>,
    records: RwLock<HashMap<Uuid, GenerationRecord>>,
}

impl HistoryStore {
    pub fn save(&self, user_id: &str, image: &EncodedImage) -> Result<GenerationRecord, GenerationError> {
        let bytes = Bytes::from(image.decode()?);
        let id = Uuid::new_v4();
        let created_at = Utc::now();
        let mut storage_path = format!(
            "generated/{}/{}.{}",
            sanitize_segment(user_id),
            created_at.timestamp_millis(),
            image.file_extension()
        );

        {
            let mut objects = self.objects.write();
            // Two saves in the same millisecond must not overwrite each other.
            if objects.contains_key(&storage_path) {
                storage_path = format!("generated/{}/{}-{}.{}", sanitize_segment(user_id), created_at.timestamp_millis(), id.simple(), image.file_extension());
            }
            objects.insert(storage_path.clone(), StoredObject { mime_type: image.mime_type.clone(), bytes });
        }

        let record = GenerationRecord {
            id,
            user_id: user_id.to_string(),
            image_url: format!("/api/storage/{storage_path}"),
            storage_path,
            mime_type: image.mime_type.clone(),
            created_at,
        };
        self.records.write().insert(record.id, record.clone());
        info!(user = %user_id, path = %record.storage_path, "💾 Stored generated image");
        Ok(record)
    }

    /// Records for a user, newest first.
    pub fn list_for_user(&self, user_id: &str) -> Vec<GenerationRecord> {
        let mut records: Vec<_> = self
            .records
            .read()
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.storage_path.cmp(&a.storage_path)));
        records
    }

    pub fn object(&self, path: &str) -> Option<StoredObject> {
        self.objects.read().get(path).cloned()
    }
}

fn sanitize_segment(segment: &str) -> String {
    let cleaned: String = segment
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() { "anonymous".to_string() } else { cleaned }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::tests::PNG_BYTES;

    #[test]
    fn save_derives_path_and_url_from_user_and_time() {
        let store = HistoryStore::default();
        let image = EncodedImage::from_bytes(PNG_BYTES).unwrap();

        let record = store.save("user-42", &image).unwrap();
        assert!(record.storage_path.starts_with("generated/user-42/"));
        assert!(record.storage_path.contains(".png"));
        assert_eq!(record.image_url, format!("/api/storage/{}", record.storage_path));

        let object = store.object(&record.storage_path).unwrap();
        assert_eq!(object.mime_type, "image/png");
        assert_eq!(&object.bytes[..], PNG_BYTES);
    }

    #[test]
    fn history_is_per_user_and_newest_first() {
        let store = HistoryStore::default();
        let image = EncodedImage::from_bytes(PNG_BYTES).unwrap();

        let first = store.save("alice", &image).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = store.save("alice", &image).unwrap();
        store.save("bob", &image).unwrap();

        let records = store.list_for_user("alice");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, second.id);
        assert_eq!(records[1].id, first.id);
        assert!(store.list_for_user("carol").is_empty());
    }

    #[test]
    fn same_millisecond_saves_keep_both_objects() {
        let store = HistoryStore::default();
        let image = EncodedImage::from_bytes(PNG_BYTES).unwrap();
        let a = store.save("alice", &image).unwrap();
        let b = store.save("alice", &image).unwrap();
        assert_ne!(a.storage_path, b.storage_path);
        assert!(store.object(&a.storage_path).is_some());
        assert!(store.object(&b.storage_path).is_some());
    }

    #[test]
    fn user_ids_cannot_escape_their_prefix() {
        assert_eq!(sanitize_segment("../etc"), "___etc");
        assert_eq!(sanitize_segment(""), "anonymous");
    }
}
