use crate::database::Store;
use crate::error::{Error, Result};
use crate::models::event::{Event, RECORDING_SAVED};
use crate::models::recording::Recording;
use crate::utils::time::Clock;
use bytes::Bytes;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

pub const ALLOWED_EXTENSIONS: [&str; 5] = ["webm", "mp4", "png", "jpg", "jpeg"];

/// One uploaded frame or clip as received from the multipart body.
#[derive(Debug, Clone)]
pub struct RecordingUpload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

#[derive(Clone)]
pub struct RecordingService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    root: PathBuf,
    max_bytes: usize,
}

impl RecordingService {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        uploads_dir: impl Into<PathBuf>,
        max_bytes: usize,
    ) -> Self {
        Self {
            store,
            clock,
            root: uploads_dir.into().join("recordings"),
            max_bytes,
        }
    }

    pub async fn save(&self, attempt_id: Uuid, upload: RecordingUpload) -> Result<Recording> {
        let attempt = self
            .store
            .get_attempt(attempt_id)
            .await?
            .ok_or_else(|| Error::NotFound("Attempt not found".to_string()))?;

        if upload.bytes.is_empty() {
            return Err(Error::BadRequest("No file provided".to_string()));
        }
        if upload.bytes.len() > self.max_bytes {
            return Err(Error::BadRequest(format!(
                "Recording exceeds the {} byte limit",
                self.max_bytes
            )));
        }
        let ext = file_extension(upload.file_name.as_deref(), upload.content_type.as_deref())
            .ok_or_else(|| {
                Error::BadRequest(format!(
                    "Unsupported recording type, expected one of: {}",
                    ALLOWED_EXTENSIONS.join(", ")
                ))
            })?;

        let now = self.clock.now();
        let file_name = format!("{}_{}.{}", attempt.id, now.timestamp_millis(), ext);
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.root.join(&file_name);
        tokio::fs::write(&path, &upload.bytes).await?;

        let recording = Recording {
            id: Uuid::new_v4(),
            attempt_id: attempt.id,
            local_path: path.to_string_lossy().into_owned(),
            content_type: upload.content_type,
            size_bytes: upload.bytes.len() as i64,
            created_at: now,
        };
        let recording = self.store.insert_recording(&recording).await?;

        self.store
            .append_event(&Event {
                id: Uuid::new_v4(),
                attempt_id: attempt.id,
                event_type: RECORDING_SAVED.to_string(),
                event_data: json!({
                    "recording_id": recording.id,
                    "filename": file_name,
                    "size_bytes": recording.size_bytes,
                }),
                created_at: now,
            })
            .await?;

        tracing::debug!(attempt_id = %attempt.id, file = %file_name, "recording saved");
        Ok(recording)
    }
}

/// Extension from the file name, falling back to the content type. `None`
/// when neither names an allowed type.
pub fn file_extension(file_name: Option<&str>, content_type: Option<&str>) -> Option<&'static str> {
    let from_name = file_name
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.trim().to_ascii_lowercase());
    if let Some(ext) = from_name {
        return ALLOWED_EXTENSIONS.iter().copied().find(|allowed| *allowed == ext);
    }

    let mime = content_type?.split(';').next()?.trim().to_ascii_lowercase();
    match mime.as_str() {
        "video/webm" => Some("webm"),
        "video/mp4" => Some("mp4"),
        "image/png" => Some("png"),
        "image/jpeg" | "image/jpg" => Some("jpg"),
        _ => None,
    }
}
