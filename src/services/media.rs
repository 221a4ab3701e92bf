//! Uploaded image pipeline
//!
//! Images are decoded, re-encoded to WebP together with a small thumbnail and
//! written to a content-addressed [`MediaStore`].

use std::{
    io::Cursor,
    path::PathBuf,
    sync::Arc,
};

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use sha2::{Digest, Sha256};
use tokio::fs;

use crate::{
    config::MediaConfig,
    error::{AppError, AppResult},
};

/// Storage backend for encoded images
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Store bytes and return the public URL they are served under
    async fn put(&self, data: Vec<u8>, extension: &str) -> AppResult<String>;
}

/// Filesystem store, content-addressed by SHA-256 with two shard levels
pub struct LocalMediaStore {
    root: PathBuf,
    url_prefix: String,
}

impl LocalMediaStore {
    pub fn new(root: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    /// "ab/cd/abcd....ext"
    fn relative_path(hash: &str, extension: &str) -> String {
        format!("{}/{}/{}.{}", &hash[0..2], &hash[2..4], hash, extension)
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn put(&self, data: Vec<u8>, extension: &str) -> AppResult<String> {
        let hash = hex::encode(Sha256::digest(&data));
        let relative = Self::relative_path(&hash, extension);
        let target = self.root.join(&relative);

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to create media directory: {}", e)))?;
        }
        // identical content is already there
        if fs::metadata(&target).await.is_err() {
            fs::write(&target, &data)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to write media file: {}", e)))?;
        }

        Ok(format!("{}/{}", self.url_prefix, relative))
    }
}

/// URLs of a stored image and its thumbnail
#[derive(Debug, Clone, PartialEq)]
pub struct StoredImage {
    pub image_url: String,
    pub image_small: String,
}

fn encode_webp(image: &DynamicImage) -> AppResult<Vec<u8>> {
    // the WebP encoder only takes 8-bit RGB(A)
    let rgba = DynamicImage::ImageRgba8(image.to_rgba8());
    let mut buffer = Vec::new();
    rgba.write_to(&mut Cursor::new(&mut buffer), ImageFormat::WebP)
        .map_err(|e| AppError::Internal(format!("Failed to encode WebP: {}", e)))?;
    Ok(buffer)
}

/// Decode an upload and produce the WebP image and its thumbnail
pub fn encode_webp_pair(data: &[u8], thumbnail_size: u32) -> AppResult<(Vec<u8>, Vec<u8>)> {
    let image = image::load_from_memory(data)
        .map_err(|e| AppError::Validation(format!("Unsupported image: {}", e)))?;
    let full = encode_webp(&image)?;
    let small = encode_webp(&image.thumbnail(thumbnail_size, thumbnail_size))?;
    Ok((full, small))
}

#[derive(Clone)]
pub struct MediaService {
    store: Arc<dyn MediaStore>,
    book_thumbnail_size: u32,
    user_icon_size: u32,
}

impl MediaService {
    pub fn new(store: Arc<dyn MediaStore>, config: &MediaConfig) -> Self {
        Self {
            store,
            book_thumbnail_size: config.book_thumbnail_size,
            user_icon_size: config.user_icon_size,
        }
    }

    pub fn local(config: &MediaConfig) -> Self {
        Self::new(
            Arc::new(LocalMediaStore::new(&config.root, &config.url_prefix)),
            config,
        )
    }

    async fn store(&self, data: Vec<u8>, thumbnail_size: u32) -> AppResult<StoredImage> {
        // decoding and encoding are CPU-bound
        let (full, small) = tokio::task::spawn_blocking(move || encode_webp_pair(&data, thumbnail_size))
            .await
            .map_err(|e| AppError::Internal(format!("Image task failed: {}", e)))??;

        let image_url = self.store.put(full, "webp").await?;
        let image_small = self.store.put(small, "webp").await?;
        Ok(StoredImage {
            image_url,
            image_small,
        })
    }

    pub async fn store_book_image(&self, data: Vec<u8>) -> AppResult<StoredImage> {
        self.store(data, self.book_thumbnail_size).await
    }

    pub async fn store_user_icon(&self, data: Vec<u8>) -> AppResult<StoredImage> {
        self.store(data, self.user_icon_size).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage};
    use mockall::predicate::{always, function};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_pixel(width, height, Rgb([200, 40, 40]));
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    #[test]
    fn test_encode_webp_pair() {
        let (full, small) = encode_webp_pair(&png(120, 80), 20).unwrap();
        let full = image::load_from_memory_with_format(&full, ImageFormat::WebP).unwrap();
        let small = image::load_from_memory_with_format(&small, ImageFormat::WebP).unwrap();
        assert_eq!(full.dimensions(), (120, 80));
        assert!(small.width() <= 20 && small.height() <= 20);
    }

    #[test]
    fn test_rejects_non_images() {
        assert!(encode_webp_pair(b"definitely not an image", 20).is_err());
    }

    #[tokio::test]
    async fn test_store_puts_both_images() {
        let mut store = MockMediaStore::new();
        let mut calls = 0;
        store
            .expect_put()
            .with(always(), function(|ext: &str| ext == "webp"))
            .times(2)
            .returning(move |_, _| {
                calls += 1;
                Ok(format!("/media/{}.webp", calls))
            });

        let service = MediaService::new(Arc::new(store), &MediaConfig::default());
        let stored = service.store_user_icon(png(100, 100)).await.unwrap();
        assert_eq!(stored.image_url, "/media/1.webp");
        assert_eq!(stored.image_small, "/media/2.webp");
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let mut store = MockMediaStore::new();
        store
            .expect_put()
            .returning(|_, _| Err(AppError::Internal("disk full".to_string())));

        let service = MediaService::new(Arc::new(store), &MediaConfig::default());
        assert!(service.store_book_image(png(10, 10)).await.is_err());
    }

    #[test]
    fn test_relative_path_is_sharded() {
        let hash = "abcdef0123";
        assert_eq!(LocalMediaStore::relative_path(hash, "webp"), "ab/cd/abcdef0123.webp");
    }
}
