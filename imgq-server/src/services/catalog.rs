//! Image catalog
//!
//! Owns the `images` table: one-time seed ingestion, lookup, and the
//! display-source rule (remote URL vs. locally served file).

use imgq_common::time::{now, parse_storage, to_storage};
use imgq_common::{Error, Image, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::path::Path;
use tracing::{info, warn};

/// Route prefix under which non-URL images are served
pub const MEDIA_ROUTE: &str = "/media";

/// Source recorded when neither the entry nor the document names one
const UNKNOWN_SOURCE: &str = "unknown";

/// Where a client should fetch an image from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "location", rename_all = "snake_case")]
pub enum DisplaySource {
    /// Absolute `http(s)` URL, used as-is
    Remote(String),
    /// Path relative to the media root
    Local(String),
}

impl DisplaySource {
    /// Link usable from a browser
    pub fn href(&self) -> String {
        match self {
            DisplaySource::Remote(url) => url.clone(),
            DisplaySource::Local(path) => {
                format!("{}/{}", MEDIA_ROUTE, path.trim_start_matches('/'))
            }
        }
    }
}

/// Resolve how an image should be displayed
pub fn display_source(image: &Image) -> DisplaySource {
    let path = image.image_path.as_str();
    if path.starts_with("http://") || path.starts_with("https://") {
        DisplaySource::Remote(path.to_string())
    } else {
        DisplaySource::Local(path.to_string())
    }
}

/// One usable entry of a seed document
#[derive(Debug, Clone, PartialEq)]
pub struct SeedImage {
    /// Position in the seed's `images` array; becomes the image id
    pub index: usize,
    pub source: String,
    pub image_path: String,
    pub image_url: Option<String>,
    pub metadata: Value,
}

/// Identifier for the entry at `index` of the seed array
pub fn seed_image_id(index: usize) -> String {
    format!("{:06}", index)
}

/// Extract the usable entries of a seed document.
///
/// Malformed entries (not an object, or with neither `image_path` nor
/// `image_url`) are logged and skipped; indexes of the remaining entries are
/// preserved so ids stay stable.
pub fn parse_seed(doc: &Value) -> Result<Vec<SeedImage>> {
    let top = doc
        .as_object()
        .ok_or_else(|| Error::Load("Seed document is not a JSON object".to_string()))?;
    let entries = top
        .get("images")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Load("Seed document has no 'images' array".to_string()))?;

    let default_source = top
        .get("flickr_url")
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN_SOURCE);

    let mut shared = Map::new();
    for (key, value) in top {
        if key != "images" {
            shared.insert(key.clone(), value.clone());
        }
    }

    let mut parsed = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let Some(fields) = entry.as_object() else {
            warn!("Skipping seed entry {}: not an object", index);
            continue;
        };

        let image_url = fields
            .get("image_url")
            .and_then(Value::as_str)
            .map(str::to_string);
        let image_path = fields
            .get("image_path")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| image_url.clone());
        let Some(image_path) = image_path else {
            warn!("Skipping seed entry {}: no image_path or image_url", index);
            continue;
        };

        let source = fields
            .get("source")
            .and_then(Value::as_str)
            .unwrap_or(default_source)
            .to_string();

        let mut metadata = shared.clone();
        for (key, value) in fields {
            if key != "image_url" && key != "image_path" {
                metadata.insert(key.clone(), value.clone());
            }
        }

        parsed.push(SeedImage {
            index,
            source,
            image_path,
            image_url,
            metadata: Value::Object(metadata),
        });
    }

    Ok(parsed)
}

/// Decode an `images` row
pub(crate) fn image_from_row(row: &SqliteRow) -> Result<Image> {
    let raw_meta: String = row.try_get("original_meta")?;
    let metadata = serde_json::from_str(&raw_meta).unwrap_or(Value::String(raw_meta));
    let created_at: String = row.try_get("created_at")?;

    Ok(Image {
        id: row.try_get("id")?,
        source: row.try_get("source")?,
        image_path: row.try_get("image_path")?,
        image_url: row.try_get("image_url")?,
        metadata,
        annotation_count: row.try_get("annotation_count")?,
        created_at: parse_storage(&created_at, "images.created_at")?,
    })
}

pub(crate) const IMAGE_COLUMNS: &str =
    "id, source, image_path, image_url, original_meta, annotation_count, created_at";

/// Image catalog service
#[derive(Clone)]
pub struct ImageCatalog {
    db: SqlitePool,
}

impl ImageCatalog {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Number of catalogued images
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM images")
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }

    /// Ingest a seed document.
    ///
    /// No-op when the catalog already holds any image. Returns the number of
    /// images inserted.
    pub async fn load(&self, doc: &Value) -> Result<usize> {
        let existing = self.count().await?;
        if existing > 0 {
            info!("Image catalog already holds {} images, skipping seed", existing);
            return Ok(0);
        }

        let entries = parse_seed(doc)?;
        let created_at = to_storage(&now());

        let mut tx = self.db.begin().await?;
        let mut inserted = 0usize;
        for entry in &entries {
            let metadata = serde_json::to_string(&entry.metadata)
                .map_err(|e| Error::Load(format!("Unserializable metadata: {}", e)))?;
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO images
                    (id, source, image_path, image_url, original_meta, annotation_count, created_at)
                VALUES (?, ?, ?, ?, ?, 0, ?)
                "#,
            )
            .bind(seed_image_id(entry.index))
            .bind(&entry.source)
            .bind(&entry.image_path)
            .bind(&entry.image_url)
            .bind(metadata)
            .bind(&created_at)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected() as usize;
        }
        tx.commit().await?;

        info!("Loaded {} images into catalog", inserted);
        Ok(inserted)
    }

    /// Read and ingest a seed file
    ///
    /// The catalog-populated check runs first, so a missing seed file is not
    /// an error once images exist.
    pub async fn load_from_path(&self, path: &Path) -> Result<usize> {
        let existing = self.count().await?;
        if existing > 0 {
            info!("Image catalog already holds {} images, skipping seed", existing);
            return Ok(0);
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::Load(format!("Cannot read {}: {}", path.display(), e)))?;
        let doc: Value = serde_json::from_str(&content)
            .map_err(|e| Error::Load(format!("Malformed JSON in {}: {}", path.display(), e)))?;

        self.load(&doc).await
    }

    /// Look up an image
    pub async fn find(&self, image_id: &str) -> Result<Option<Image>> {
        let row = sqlx::query(&format!("SELECT {} FROM images WHERE id = ?", IMAGE_COLUMNS))
            .bind(image_id)
            .fetch_optional(&self.db)
            .await?;
        row.as_ref().map(image_from_row).transpose()
    }

    /// Look up an image, failing with `NotFound`
    pub async fn get(&self, image_id: &str) -> Result<Image> {
        self.find(image_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Image {}", image_id)))
    }
}
