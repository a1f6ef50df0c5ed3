use std::fs;
use std::path::Path;

use ingestion_corpus::{CorpusIndexer, IndexError, IndexerConfig, NamingTemplate};
use tempfile::tempdir;

const HEADER: &str = "OrderID,ProductID,ProductName,Amount,Price,Discount\n";

fn touch(dir: &Path, name: &str) {
    fs::write(dir.join(name), HEADER).unwrap();
}

#[test]
fn malformed_names_are_excluded_without_error() {
    let dir = tempdir().unwrap();
    touch(dir.path(), "Shard-1-20210101-00.csv");
    touch(dir.path(), "Shard-2-20210101-00.csv");
    touch(dir.path(), "Shard-abc-20210101-00.csv");
    touch(dir.path(), "Shard-3-20211301-00.csv");
    touch(dir.path(), "notes.txt");

    let (corpus, report) = CorpusIndexer::default()
        .index_with_report(dir.path())
        .expect("scan succeeds");

    assert_eq!(corpus.len(), 2);
    assert_eq!(report.indexed, 2);
    assert_eq!(report.skipped, 2);
    let names: Vec<_> = corpus
        .artifacts()
        .iter()
        .map(|a| a.file_name.as_str())
        .collect();
    assert_eq!(names, ["Shard-1-20210101-00.csv", "Shard-2-20210101-00.csv"]);
}

#[test]
fn timeline_orders_by_hour_then_numeric_shard() {
    let dir = tempdir().unwrap();
    for name in [
        "Shard-10-20210101-01.csv",
        "Shard-2-20210101-01.csv",
        "Shard-10-20210101-00.csv",
        "Shard-2-20210101-00.csv",
        "Shard-1-20201231-23.csv",
    ] {
        touch(dir.path(), name);
    }

    let corpus = CorpusIndexer::default().index(dir.path()).unwrap();
    let order: Vec<_> = corpus
        .artifacts()
        .iter()
        .map(|a| a.file_name.as_str())
        .collect();
    assert_eq!(
        order,
        [
            "Shard-1-20201231-23.csv",
            "Shard-2-20210101-00.csv",
            "Shard-10-20210101-00.csv",
            "Shard-2-20210101-01.csv",
            "Shard-10-20210101-01.csv",
        ]
    );
    assert_eq!(corpus.artifacts()[1].path, dir.path().join("Shard-2-20210101-00.csv"));
}

#[test]
fn empty_source_yields_empty_corpus() {
    let dir = tempdir().unwrap();
    let corpus = CorpusIndexer::default().index(dir.path()).unwrap();
    assert!(corpus.is_empty());
    assert_eq!(corpus.first_timestamp(), None);
}

#[test]
fn subdirectories_matching_the_template_are_ignored() {
    let dir = tempdir().unwrap();
    fs::create_dir(dir.path().join("Shard-1-20210101-00.csv")).unwrap();
    touch(dir.path(), "Shard-2-20210101-00.csv");

    let corpus = CorpusIndexer::default().index(dir.path()).unwrap();
    assert_eq!(corpus.len(), 1);
    assert_eq!(corpus.artifacts()[0].shard_id, 2);
}

#[test]
fn missing_source_is_fatal() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("absent");
    let err = CorpusIndexer::default().index(&missing).unwrap_err();
    match err {
        IndexError::SourceUnavailable { path, .. } => assert_eq!(path, missing),
    }
}

#[test]
fn custom_template_selects_its_own_files() {
    let dir = tempdir().unwrap();
    touch(dir.path(), "Shop-1-20210104-06.csv");
    touch(dir.path(), "Shard-1-20210104-06.csv");

    let indexer = CorpusIndexer::new(IndexerConfig {
        naming: NamingTemplate::new("Shop", "csv"),
    });
    let corpus = indexer.index(dir.path()).unwrap();
    assert_eq!(corpus.len(), 1);
    assert_eq!(corpus.artifacts()[0].file_name, "Shop-1-20210104-06.csv");
}
