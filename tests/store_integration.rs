//! Store integration tests over a file-backed database.
//!
//! The unit tests in the store module run against in-memory databases;
//! these cover what only a real file shows: WAL mode, persistence across
//! reopen, and the public API surface as an embedder sees it.

use novelkeeper_core::{Book, BookInfo, BookStatus, BookStore, Database, StoreError, Writer};
use tempfile::TempDir;

fn info(title: &str, writer: &str, chapter: &str) -> BookInfo {
    BookInfo {
        title: title.to_string(),
        writer: writer.to_string(),
        kind: "玄幻".to_string(),
        update_date: "2025-06-01".to_string(),
        update_chapter: chapter.to_string(),
    }
}

async fn seed_book(store: &BookStore, site: &str, id: u32, title: &str) -> Book {
    let writer = store.save_writer("天蚕土豆").await.unwrap();
    let mut book = Book::discovered(site, id);
    book.apply_update(&info(title, "天蚕土豆", "第一章"), writer);
    store.create_book(&book).await.unwrap();
    book
}

/// Test that books written before a close are visible after reopening the
/// same file, and that the file runs in WAL mode.
#[tokio::test]
async fn test_database_file_persists_books_across_reopen() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("novelkeeper.db");

    let db = Database::new(&db_path).await.unwrap();
    assert!(db.is_wal_enabled().await.unwrap());
    let store = BookStore::new(db.clone());
    seed_book(&store, "qd", 12, "斗破苍穹").await;
    db.close().await;

    let db = Database::new(&db_path).await.unwrap();
    let store = BookStore::new(db.clone());
    let book = store.find_book_by_id("qd", 12).await.unwrap().unwrap();
    assert_eq!(book.title, "斗破苍穹");
    assert_eq!(book.writer_name(), "天蚕土豆");
    assert_eq!(book.status, BookStatus::InProgress);
    assert!(!book.created_at.is_empty());
    db.close().await;
}

/// Test that id-only lookups resolve to the edition with the highest hash
/// code while explicit lookups still reach the older one.
#[tokio::test]
async fn test_current_edition_resolution_prefers_highest_hash() {
    let dir = TempDir::new().unwrap();
    let db = Database::new(&dir.path().join("editions.db")).await.unwrap();
    let store = BookStore::new(db);

    let first = seed_book(&store, "qd", 12, "旧书名").await;
    let writer = store.save_writer("天蚕土豆").await.unwrap();
    let mut second = first.new_edition(1);
    second.apply_update(&info("新书名", "天蚕土豆", "第一章"), writer);
    store.create_book(&second).await.unwrap();

    let current = store.find_book_by_id("qd", 12).await.unwrap().unwrap();
    assert_eq!(current.hash_code, 1);
    assert_eq!(current.title, "新书名");

    let original = store.find_book_by_id_hash("qd", 12, 0).await.unwrap().unwrap();
    assert_eq!(original.title, "旧书名");

    let working_set = store.find_books_for_update("qd").await.unwrap();
    assert_eq!(working_set.len(), 1, "one current edition per id");
    assert_eq!(working_set[0].hash_code, 1);
}

/// Test that the download working set contains only finished, unarchived
/// current editions.
#[tokio::test]
async fn test_download_working_set_filters_status_and_flag() {
    let dir = TempDir::new().unwrap();
    let db = Database::new(&dir.path().join("sets.db")).await.unwrap();
    let store = BookStore::new(db);

    seed_book(&store, "qd", 1, "连载中").await;

    let mut ended = seed_book(&store, "qd", 2, "已完结").await;
    ended.status = BookStatus::End;
    store.update_book(&ended).await.unwrap();

    let mut archived = seed_book(&store, "qd", 3, "已归档").await;
    archived.status = BookStatus::End;
    archived.is_downloaded = true;
    store.update_book(&archived).await.unwrap();

    store.create_book(&Book::discovered("qd", 4)).await.unwrap();

    let to_download = store.find_books_for_download("qd").await.unwrap();
    assert_eq!(to_download.len(), 1);
    assert_eq!(to_download[0].id, 2);

    let to_update = store.find_books_for_update("qd").await.unwrap();
    assert_eq!(to_update.len(), 4, "every current edition is crawled");
}

/// Test that writers are deduplicated by name across books.
#[tokio::test]
async fn test_save_writer_reuses_existing_row() {
    let dir = TempDir::new().unwrap();
    let db = Database::new(&dir.path().join("writers.db")).await.unwrap();
    let store = BookStore::new(db);

    let first = store.save_writer("天蚕土豆").await.unwrap();
    let again = store.save_writer("天蚕土豆").await.unwrap();
    let other = store.save_writer("我吃西红柿").await.unwrap();

    assert_eq!(first, again);
    assert_ne!(first.id, other.id);
    assert_eq!(other, Writer { id: other.id, name: "我吃西红柿".to_string() });
}

/// Test that error records overwrite per book and clear cleanly.
#[tokio::test]
async fn test_error_records_round_trip_and_clear() {
    let dir = TempDir::new().unwrap();
    let db = Database::new(&dir.path().join("errors.db")).await.unwrap();
    let store = BookStore::new(db);

    let book = seed_book(&store, "qd", 12, "斗破苍穹").await;
    assert!(store.find_error("qd", 12).await.unwrap().is_none());

    store.save_error(&book, Some("fetch failed: HTTP 500")).await.unwrap();
    let record = store.find_error("qd", 12).await.unwrap().unwrap();
    assert_eq!(record.message, "fetch failed: HTTP 500");
    assert_eq!(record.site, "qd");
    assert_eq!(record.id, 12);

    store.save_error(&book, Some("no recognizable book fields")).await.unwrap();
    let record = store.find_error("qd", 12).await.unwrap().unwrap();
    assert_eq!(record.message, "no recognizable book fields");

    store.save_error(&book, None).await.unwrap();
    assert!(store.find_error("qd", 12).await.unwrap().is_none());
}

/// Test the aggregate site summary over a mixed population.
#[tokio::test]
async fn test_stats_summarizes_a_site() {
    let dir = TempDir::new().unwrap();
    let db = Database::new(&dir.path().join("stats.db")).await.unwrap();
    let store = BookStore::new(db);

    // id 1: discovery placeholder with a recorded error
    let placeholder = Book::discovered("qd", 1);
    store.create_book(&placeholder).await.unwrap();
    store.save_error(&placeholder, Some("HTTP 404")).await.unwrap();

    // id 2: healthy in-progress book
    seed_book(&store, "qd", 2, "武动乾坤").await;

    // id 3: two editions, the newer one archived
    let old = seed_book(&store, "qd", 3, "旧书名").await;
    let writer = store.save_writer("天蚕土豆").await.unwrap();
    let mut newer = old.new_edition(1);
    newer.apply_update(&info("新书名", "天蚕土豆", "完本感言"), writer);
    newer.status = BookStatus::End;
    newer.is_downloaded = true;
    store.create_book(&newer).await.unwrap();

    let summary = store.stats("qd").await.unwrap();
    assert_eq!(summary.book_count, 4, "historical editions counted");
    assert_eq!(summary.unique_book_count, 3);
    assert_eq!(summary.error_count, 1);
    assert_eq!(summary.download_count, 1);
    assert_eq!(summary.writer_count, 1);
    assert_eq!(summary.max_book_id, 3);
    assert_eq!(summary.latest_success_id, 3);
    assert_eq!(summary.status_count.get(&BookStatus::Error), Some(&1));
    assert_eq!(summary.status_count.get(&BookStatus::InProgress), Some(&1));
    assert_eq!(summary.status_count.get(&BookStatus::End), Some(&1));

    // Other sites are invisible to the summary
    seed_book(&store, "zongheng", 99, "别站的书").await;
    let summary = store.stats("qd").await.unwrap();
    assert_eq!(summary.book_count, 4);
    assert_eq!(summary.max_book_id, 3);
}

/// Test that every mutable field survives an update round trip.
#[tokio::test]
async fn test_update_book_round_trips_every_field() {
    let dir = TempDir::new().unwrap();
    let db = Database::new(&dir.path().join("update.db")).await.unwrap();
    let store = BookStore::new(db);

    let mut book = seed_book(&store, "qd", 12, "斗破苍穹").await;
    let writer = store.save_writer("我吃西红柿").await.unwrap();
    book.title = "吞噬星空".to_string();
    book.writer = Some(writer.clone());
    book.kind = "科幻".to_string();
    book.update_date = "2025-07-15".to_string();
    book.update_chapter = "第二十章".to_string();
    book.status = BookStatus::End;
    book.is_downloaded = true;
    store.update_book(&book).await.unwrap();

    let stored = store.find_book_by_id_hash("qd", 12, 0).await.unwrap().unwrap();
    assert_eq!(stored.title, "吞噬星空");
    assert_eq!(stored.writer, Some(writer));
    assert_eq!(stored.kind, "科幻");
    assert_eq!(stored.update_date, "2025-07-15");
    assert_eq!(stored.update_chapter, "第二十章");
    assert_eq!(stored.status, BookStatus::End);
    assert!(stored.is_downloaded);
    assert!(!stored.updated_at.is_empty());
}

/// Test that inserting a duplicate edition identity is rejected as a
/// constraint violation rather than silently upserted.
#[tokio::test]
async fn test_duplicate_edition_insert_is_a_constraint_violation() {
    let dir = TempDir::new().unwrap();
    let db = Database::new(&dir.path().join("dup.db")).await.unwrap();
    let store = BookStore::new(db);

    seed_book(&store, "qd", 12, "斗破苍穹").await;
    let error = store
        .create_book(&Book::discovered("qd", 12))
        .await
        .unwrap_err();

    assert!(error.is_constraint_violation(), "got: {error}");
}

/// Test that updating a nonexistent edition reports the missing identity.
#[tokio::test]
async fn test_update_missing_book_reports_not_found() {
    let dir = TempDir::new().unwrap();
    let db = Database::new(&dir.path().join("missing.db")).await.unwrap();
    let store = BookStore::new(db);

    let ghost = Book::discovered("qd", 404);
    let error = store.update_book(&ghost).await.unwrap_err();

    assert!(matches!(error, StoreError::BookNotFound { .. }));
    assert!(error.to_string().contains("qd/404#0"));
}

/// Test that max id tracking ignores other sites and counts placeholders.
#[tokio::test]
async fn test_max_book_id_is_per_site() {
    let dir = TempDir::new().unwrap();
    let db = Database::new(&dir.path().join("maxid.db")).await.unwrap();
    let store = BookStore::new(db);

    assert_eq!(store.max_book_id("qd").await.unwrap(), 0);
    store.create_book(&Book::discovered("qd", 41)).await.unwrap();
    store.create_book(&Book::discovered("zongheng", 900)).await.unwrap();

    assert_eq!(store.max_book_id("qd").await.unwrap(), 41);
    assert_eq!(store.max_book_id("zongheng").await.unwrap(), 900);
}
