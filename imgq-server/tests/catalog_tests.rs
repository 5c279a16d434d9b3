//! Image catalog ingestion tests

mod helpers;

use helpers::*;
use imgq_common::Error;
use imgq_server::services::{display_source, DisplaySource, ImageCatalog};
use serde_json::json;
use std::io::Write;
use tempfile::NamedTempFile;

#[tokio::test]
async fn test_load_assigns_index_ids_and_metadata() {
    let (_dir, pool) = create_test_db().await;
    let catalog = ImageCatalog::new(pool.clone());

    let loaded = catalog.load(&seed_doc(3)).await.unwrap();
    assert_eq!(loaded, 3);
    assert_eq!(catalog.count().await.unwrap(), 3);

    let image = catalog.get("000002").await.unwrap();
    assert_eq!(image.image_path, "img_2.jpg");
    assert_eq!(image.source, "https://flickr.example/album");
    assert_eq!(image.metadata["caption"], "caption 2");
    assert_eq!(image.annotation_count, 0);
    assert_eq!(display_source(&image), DisplaySource::Local("img_2.jpg".into()));
}

#[tokio::test]
async fn test_load_is_noop_when_catalog_populated() {
    let (_dir, pool) = create_test_db().await;
    let catalog = ImageCatalog::new(pool.clone());

    catalog.load(&seed_doc(2)).await.unwrap();
    let second = catalog.load(&seed_doc(5)).await.unwrap();

    assert_eq!(second, 0);
    assert_eq!(catalog.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_malformed_entries_are_skipped() {
    let (_dir, pool) = create_test_db().await;
    let catalog = ImageCatalog::new(pool.clone());

    let doc = json!({
        "images": [
            {"image_url": "https://cdn.example/0.jpg"},
            42,
            {"caption": "nothing to show"},
            {"image_path": "3.jpg", "source": "scanner"}
        ]
    });
    assert_eq!(catalog.load(&doc).await.unwrap(), 2);

    let remote = catalog.get("000000").await.unwrap();
    assert_eq!(remote.source, "unknown");
    assert_eq!(remote.image_url.as_deref(), Some("https://cdn.example/0.jpg"));
    assert!(matches!(display_source(&remote), DisplaySource::Remote(_)));

    assert!(catalog.find("000001").await.unwrap().is_none());
    assert_eq!(catalog.get("000003").await.unwrap().source, "scanner");
}

#[tokio::test]
async fn test_get_unknown_image_is_not_found() {
    let (_dir, pool) = create_test_db().await;
    let result = ImageCatalog::new(pool).get("999999").await;
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_load_from_missing_file_is_load_error() {
    let (dir, pool) = create_test_db().await;
    let result = ImageCatalog::new(pool)
        .load_from_path(&dir.path().join("absent.json"))
        .await;
    assert!(matches!(result, Err(Error::Load(_))));
}

#[tokio::test]
async fn test_load_from_malformed_file_is_load_error() {
    let (_dir, pool) = create_test_db().await;
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{{ not json").unwrap();

    let result = ImageCatalog::new(pool).load_from_path(file.path()).await;
    assert!(matches!(result, Err(Error::Load(_))));
}

#[tokio::test]
async fn test_load_from_file() {
    let (_dir, pool) = create_test_db().await;
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", seed_doc(4)).unwrap();

    let catalog = ImageCatalog::new(pool);
    assert_eq!(catalog.load_from_path(file.path()).await.unwrap(), 4);
    // Populated catalog ignores the file entirely
    assert_eq!(catalog.load_from_path(file.path()).await.unwrap(), 0);
}
