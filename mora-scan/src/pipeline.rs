//! Encode, encrypt, store and upload a captured frame.
//!
//! ```text
//! Frame ──► PNG ──► AES-256-CBC ──► output store: {filename}.enc
//!                        │
//!                        └────────► bucket: images/{utc}_{filename}
//! ```

use bytes::Bytes;
use chrono::{Local, Utc};
use mora_storage::{create_storage, ObjectStorage, PayloadCipher};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use crate::config::{ScanConfig, UploadPayload};
use crate::error::Result;
use crate::frame::{encode_png, Frame, FrameSource};

/// Where one processed frame ended up.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScanOutcome {
    pub filename: String,
    /// Key of the encrypted copy in the output store, `{filename}.enc`
    pub local_path: String,
    pub object_key: String,
    pub url: String,
}

/// `breast_scan_YYYYmmdd_HHMMSS_micros.png` in local time
pub fn default_filename() -> String {
    Local::now()
        .format("breast_scan_%Y%m%d_%H%M%S_%6f.png")
        .to_string()
}

/// `images/{utc iso-8601 with micros}_{filename}`
pub fn object_key_for(filename: &str) -> String {
    format!(
        "images/{}_{}",
        Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f"),
        filename
    )
}

pub struct ScanPipeline {
    cipher: PayloadCipher,
    output: Arc<dyn ObjectStorage>,
    upload: Arc<dyn ObjectStorage>,
    payload: UploadPayload,
}

impl ScanPipeline {
    pub fn new(
        cipher: PayloadCipher,
        output: Arc<dyn ObjectStorage>,
        upload: Arc<dyn ObjectStorage>,
        payload: UploadPayload,
    ) -> Self {
        Self {
            cipher,
            output,
            upload,
            payload,
        }
    }

    pub fn from_config(config: &ScanConfig) -> Result<Self> {
        let encryption = config.encryption()?;
        let pipeline = Self::new(
            PayloadCipher::new(&encryption),
            create_storage(&config.output)?,
            create_storage(&config.upload)?,
            config.upload_payload,
        );
        tracing::info!(
            key_id = encryption.key_id(),
            output = pipeline.output.backend_name(),
            upload = pipeline.upload.backend_name(),
            payload = ?pipeline.payload,
            "Scan pipeline initialized"
        );
        Ok(pipeline)
    }

    pub fn upload_backend(&self) -> &'static str {
        self.upload.backend_name()
    }

    /// Encode, encrypt, store locally, upload.
    ///
    /// A failed upload leaves the local `.enc` copy in place.
    pub async fn process_and_upload(
        &self,
        frame: Frame,
        filename: Option<String>,
    ) -> Result<ScanOutcome> {
        let started = Instant::now();
        let filename = filename.unwrap_or_else(default_filename);

        let cipher = self.cipher.clone();
        let (png, encrypted) = tokio::task::spawn_blocking(move || {
            let png = encode_png(&frame)?;
            let encrypted = cipher.encrypt(&png);
            Ok::<_, crate::ScanError>((png, encrypted))
        })
        .await??;
        tracing::debug!(
            png_bytes = png.len(),
            encrypted_bytes = encrypted.len(),
            "Frame encoded and encrypted"
        );

        let encrypted = Bytes::from(encrypted);
        let local_path = format!("{}.enc", filename);
        self.output
            .put(&local_path, encrypted.clone(), Some("application/octet-stream"))
            .await?;

        let object_key = object_key_for(&filename);
        let (body, content_type) = match self.payload {
            UploadPayload::Encrypted => (encrypted, "application/octet-stream"),
            UploadPayload::Plain => (Bytes::from(png), "image/png"),
        };
        if let Err(e) = self.upload.put(&object_key, body, Some(content_type)).await {
            tracing::error!(key = %object_key, error = %e, "Scan upload failed");
            metrics::counter!("mora_scan_uploads_total", "outcome" => "error").increment(1);
            return Err(e.into());
        }
        let url = self.upload.public_url(&object_key);

        metrics::counter!("mora_scan_uploads_total", "outcome" => "ok").increment(1);
        metrics::histogram!("mora_scan_process_seconds").record(started.elapsed().as_secs_f64());
        tracing::info!(local = %local_path, url = %url, "Image processed and uploaded");

        Ok(ScanOutcome {
            filename,
            local_path,
            object_key,
            url,
        })
    }

    /// Capture one frame from `source`, then process it.
    pub async fn run_once(
        &self,
        source: &dyn FrameSource,
        filename: Option<String>,
    ) -> Result<ScanOutcome> {
        tracing::info!(source = %source.describe(), "Starting scan pipeline");
        let frame = source.capture().await?;
        self.process_and_upload(frame, filename).await
    }
}
