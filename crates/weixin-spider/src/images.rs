//! Image acquisition: download or decode each image, normalize to PNG,
//! and record the outcome on its [`ImageRef`].

use std::io::Cursor;
use std::path::{Path, PathBuf};

use base64::Engine;
use image::codecs::png::PngEncoder;
use image::DynamicImage;
use reqwest::header::{self, HeaderMap, HeaderValue};
use tokio::io::AsyncWriteExt;

use crate::config::{SpiderConfig, USER_AGENT};
use crate::types::{ImageRef, SpiderError, SpiderResult};

/// Stored filename for the image at `index`.
pub fn image_filename(index: usize) -> String {
    format!("img_{index:03}.png")
}

/// A decoded `data:` locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl DataUrl {
    /// Parse `data:[<media type>][;base64],<data>`.
    pub fn parse(locator: &str) -> SpiderResult<Self> {
        let rest = locator
            .strip_prefix("data:")
            .ok_or_else(|| SpiderError::Validation("not a data: locator".to_string()))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| SpiderError::Validation("data: locator has no payload".to_string()))?;

        let is_base64 = header
            .rsplit(';')
            .next()
            .is_some_and(|p| p.eq_ignore_ascii_case("base64"));
        let media_type = header.split(';').next().unwrap_or_default().to_string();

        let bytes = if is_base64 {
            let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
            base64::engine::general_purpose::STANDARD
                .decode(compact)
                .map_err(|e| SpiderError::Validation(format!("invalid base64 payload: {e}")))?
        } else {
            urlencoding::decode_binary(payload.as_bytes()).into_owned()
        };

        Ok(Self { media_type, bytes })
    }
}

/// Result of PNG normalization.
#[derive(Debug)]
pub enum Normalized {
    Converted(Vec<u8>),
    /// Decoding or encoding failed; the original bytes are kept as-is.
    StoredRaw { bytes: Vec<u8>, reason: String },
}

/// Re-encode arbitrary image bytes as PNG.
///
/// Sources with an alpha channel become RGBA, everything else RGB.
pub fn normalize_image(bytes: Vec<u8>) -> Normalized {
    match encode_png(&bytes) {
        Ok(png) => Normalized::Converted(png),
        Err(e) => Normalized::StoredRaw {
            bytes,
            reason: e.to_string(),
        },
    }
}

fn encode_png(bytes: &[u8]) -> SpiderResult<Vec<u8>> {
    let img = image::load_from_memory(bytes)?;
    let mut buf = Vec::new();
    let encoder = PngEncoder::new(Cursor::new(&mut buf));
    if img.color().has_alpha() {
        img.to_rgba8().write_with_encoder(encoder)?;
    } else {
        DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)?;
    }
    Ok(buf)
}

/// How one image ended up.
#[derive(Debug)]
pub enum ImageOutcome {
    Converted { filename: String, path: PathBuf },
    StoredRaw { filename: String, path: PathBuf, reason: String },
    Failed(SpiderError),
}

impl ImageOutcome {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, ImageOutcome::Failed(_))
    }
}

/// Per-image outcomes from one acquisition pass.
#[derive(Debug, Default)]
pub struct AcquisitionReport {
    pub outcomes: Vec<(usize, ImageOutcome)>,
}

impl AcquisitionReport {
    pub fn resolved(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_resolved()).count()
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }
}

/// Downloads article images one at a time with a polite delay.
pub struct ImageAcquirer {
    client: reqwest::Client,
    delay: std::time::Duration,
}

impl ImageAcquirer {
    pub fn new(config: &SpiderConfig) -> SpiderResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("image/webp,image/apng,image/*,*/*;q=0.8"),
        );
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("zh-CN,zh;q=0.9,en;q=0.8"),
        );
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(config.image_timeout)
            .build()?;
        Ok(Self {
            client,
            delay: config.image_delay,
        })
    }

    /// Acquire every image into `dir`, updating each ref in place.
    ///
    /// Failures are recorded per image and never abort the pass.
    pub async fn acquire_all(&self, images: &mut [ImageRef], dir: &Path) -> AcquisitionReport {
        let mut report = AcquisitionReport::default();
        let total = images.len();

        for (position, image) in images.iter_mut().enumerate() {
            let filename = image_filename(image.index);
            let outcome = self.acquire_one(image, dir, &filename).await;

            match &outcome {
                ImageOutcome::Converted { filename, path } => {
                    tracing::debug!("Image {}/{total} saved as {filename}", image.index);
                    image.mark_resolved(filename.clone(), path.clone());
                }
                ImageOutcome::StoredRaw {
                    filename,
                    path,
                    reason,
                } => {
                    tracing::warn!(
                        "Image {} kept in original encoding ({reason})",
                        image.index
                    );
                    image.mark_resolved(filename.clone(), path.clone());
                }
                ImageOutcome::Failed(e) => {
                    tracing::warn!("{e}");
                    image.mark_failed();
                }
            }
            report.outcomes.push((image.index, outcome));

            if position + 1 < total && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }

        tracing::info!("Images: {}/{} saved", report.resolved(), report.total());
        report
    }

    async fn acquire_one(&self, image: &ImageRef, dir: &Path, filename: &str) -> ImageOutcome {
        let final_path = dir.join(filename);
        let result = if image.is_inline() {
            self.store_inline(image, &final_path).await
        } else {
            self.store_remote(image, &final_path).await
        };

        match result {
            Ok(None) => ImageOutcome::Converted {
                filename: filename.to_string(),
                path: final_path,
            },
            Ok(Some(reason)) => ImageOutcome::StoredRaw {
                filename: filename.to_string(),
                path: final_path,
                reason,
            },
            Err(e) => ImageOutcome::Failed(SpiderError::ImageResolution {
                index: image.index,
                reason: e.to_string(),
            }),
        }
    }

    /// Returns the fallback reason when the raw bytes were stored.
    async fn store_inline(
        &self,
        image: &ImageRef,
        final_path: &Path,
    ) -> SpiderResult<Option<String>> {
        let data = DataUrl::parse(&image.source_locator)?;
        write_normalized(data.bytes, final_path).await
    }

    /// Streams into `<file>.temp` before normalizing. On failure neither
    /// the temp file nor a partial output is left behind.
    async fn store_remote(
        &self,
        image: &ImageRef,
        final_path: &Path,
    ) -> SpiderResult<Option<String>> {
        let temp_path = temp_path_for(final_path);
        let stored = self
            .download_and_store(&image.source_locator, &temp_path, final_path)
            .await;
        if stored.is_err() {
            discard(&temp_path).await;
            discard(final_path).await;
        }
        stored
    }

    async fn download_and_store(
        &self,
        url: &str,
        temp_path: &Path,
        final_path: &Path,
    ) -> SpiderResult<Option<String>> {
        self.download_to(url, temp_path).await?;

        let bytes = tokio::fs::read(temp_path).await?;
        match normalize_image(bytes) {
            Normalized::Converted(png) => {
                tokio::fs::write(final_path, png).await?;
                discard(temp_path).await;
                Ok(None)
            }
            Normalized::StoredRaw { reason, .. } => {
                tokio::fs::rename(temp_path, final_path).await?;
                Ok(Some(reason))
            }
        }
    }

    async fn download_to(&self, url: &str, temp_path: &Path) -> SpiderResult<()> {
        let mut response = self.client.get(url).send().await?.error_for_status()?;
        let mut file = tokio::fs::File::create(temp_path).await?;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }
}

async fn write_normalized(bytes: Vec<u8>, final_path: &Path) -> SpiderResult<Option<String>> {
    let (contents, fallback) = match normalize_image(bytes) {
        Normalized::Converted(png) => (png, None),
        Normalized::StoredRaw { bytes, reason } => (bytes, Some(reason)),
    };
    if let Err(e) = tokio::fs::write(final_path, contents).await {
        discard(final_path).await;
        return Err(e.into());
    }
    Ok(fallback)
}

/// Best-effort removal of a leftover file. Directories are never touched.
async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::debug!("Could not remove {}: {e}", path.display());
        }
    }
}

fn temp_path_for(final_path: &Path) -> PathBuf {
    let mut name = final_path.as_os_str().to_owned();
    name.push(".temp");
    PathBuf::from(name)
}
