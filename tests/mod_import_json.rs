use std::fmt::Write as _;
use std::io::Write;
use std::sync::Arc;

use bson::{Bson, doc};
use bulkload::memstore::MemoryFactory;
use bulkload::options::ImportOptions;
use bulkload::session::Namespace;
use bulkload::{ImportResult, Importer};
use tempfile::NamedTempFile;

fn write_input(data: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(data.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn json_options(file: &NamedTempFile) -> ImportOptions {
    let mut opts = ImportOptions::default();
    opts.db = "test".to_string();
    opts.collection = Some("things".to_string());
    opts.input.file = Some(file.path().to_path_buf());
    opts
}

fn run(opts: ImportOptions, factory: &MemoryFactory) -> ImportResult {
    Importer::new(opts, Arc::new(factory.clone())).unwrap().run()
}

fn ns() -> Namespace {
    Namespace::new("test", "things")
}

#[test]
fn imports_one_document_per_line() {
    let file = write_input("{\"_id\": 1, \"a\": \"x\"}\n{\"_id\": 2, \"a\": \"y\"}\n");
    let factory = MemoryFactory::new();
    let result = run(json_options(&file), &factory);
    assert!(result.error.is_none(), "{:?}", result.error);
    assert_eq!(result.successes, 2);
    assert_eq!(factory.count(&ns()), 2);
}

#[test]
fn decodes_extended_json_wrappers() {
    let file = write_input(
        "{\"_id\": {\"$numberLong\": \"7\"}, \"at\": {\"$date\": {\"$numberLong\": \"1136214245000\"}}, \"gone\": {\"$undefined\": true}}\n",
    );
    let factory = MemoryFactory::new();
    let result = run(json_options(&file), &factory);
    assert!(result.error.is_none(), "{:?}", result.error);
    let docs = factory.documents(&ns());
    assert_eq!(docs[0].get("_id"), Some(&Bson::Int64(7)));
    assert_eq!(
        docs[0].get("at"),
        Some(&Bson::DateTime(bson::DateTime::from_millis(1_136_214_245_000)))
    );
    assert_eq!(docs[0].get("gone"), Some(&Bson::Undefined));
}

#[test]
fn legacy_dialect_reads_old_wrappers() {
    let file = write_input(
        "{\"_id\": 1, \"at\": {\"$date\": 1136214245000}, \"bin\": {\"$binary\": \"aGVsbG8=\", \"$type\": \"00\"}}\n",
    );
    let mut opts = json_options(&file);
    opts.input.legacy = true;
    let factory = MemoryFactory::new();
    let result = run(opts, &factory);
    assert!(result.error.is_none(), "{:?}", result.error);
    let docs = factory.documents(&ns());
    assert!(matches!(docs[0].get("bin"), Some(Bson::Binary(_))));
}

#[test]
fn unknown_wrappers_abort() {
    let file = write_input("{\"a\": {\"$widget\": 1}}\n");
    let factory = MemoryFactory::new();
    let result = run(json_options(&file), &factory);
    assert_eq!(result.successes, 0);
    assert!(matches!(result.error, Some(bulkload::ImportError::UnknownTypeWrapper(_))));
}

#[test]
fn json_array_mode_imports_elements() {
    let file = write_input("[{\"_id\": 1}, {\"_id\": 2}, {\"_id\": 3}]");
    let mut opts = json_options(&file);
    opts.input.json_array = true;
    let factory = MemoryFactory::new();
    let result = run(opts, &factory);
    assert!(result.error.is_none(), "{:?}", result.error);
    assert_eq!(result.successes, 3);
}

#[test]
fn json_array_without_the_flag_is_fatal() {
    let file = write_input("[{\"_id\": 1}, {\"_id\": 2}]");
    let factory = MemoryFactory::new();
    let result = run(json_options(&file), &factory);
    assert_eq!(result.successes, 0);
    assert!(matches!(result.error, Some(bulkload::ImportError::UnexpectedArray)));
}

#[test]
fn non_array_input_in_array_mode_is_fatal() {
    let file = write_input("{\"_id\": 1}");
    let mut opts = json_options(&file);
    opts.input.json_array = true;
    let factory = MemoryFactory::new();
    let result = run(opts, &factory);
    assert!(matches!(result.error, Some(bulkload::ImportError::ExpectedArray)));
}

fn duplicate_id_fixture(total: usize, dup_at: usize) -> NamedTempFile {
    let mut data = String::new();
    for i in 1..=total {
        let id = if i == dup_at { 1 } else { i };
        writeln!(data, "{{\"_id\": {id}}}").unwrap();
    }
    write_input(&data)
}

#[test]
fn one_duplicate_id_costs_one_failure_under_default_policy() {
    let file = duplicate_id_fixture(20_001, 10_001);
    let factory = MemoryFactory::new();
    let result = run(json_options(&file), &factory);
    assert!(result.error.is_none(), "{:?}", result.error);
    assert_eq!(result.successes, 20_000);
    assert_eq!(result.failures, 1);
    assert_eq!(factory.count(&ns()), 20_000);
}

#[test]
fn maintain_insertion_order_stops_at_the_duplicate() {
    let file = duplicate_id_fixture(20_001, 10_001);
    let mut opts = json_options(&file);
    opts.ingest.maintain_insertion_order = true;
    let factory = MemoryFactory::new();
    let result = run(opts, &factory);
    assert!(result.error.is_some());
    assert_eq!(result.successes, 10_000);
    assert_eq!(result.failures, 1);
    assert_eq!(factory.count(&ns()), 10_000);
}

#[test]
fn stop_on_error_reports_the_first_write_error() {
    let file = write_input("{\"_id\": 1}\n{\"_id\": 1}\n{\"_id\": 2}\n");
    let mut opts = json_options(&file);
    opts.ingest.stop_on_error = true;
    let factory = MemoryFactory::new();
    let result = run(opts, &factory);
    assert!(matches!(result.error, Some(bulkload::ImportError::Write(_))));
    assert_eq!(result.failures, 1);
    assert_eq!(result.successes, 2);
}

#[test]
fn maintain_insertion_order_preserves_input_order() {
    let mut data = String::new();
    for i in (0..500).rev() {
        writeln!(data, "{{\"_id\": {i}}}").unwrap();
    }
    let file = write_input(&data);
    let mut opts = json_options(&file);
    opts.ingest.maintain_insertion_order = true;
    let factory = MemoryFactory::new();
    let result = run(opts, &factory);
    assert!(result.error.is_none(), "{:?}", result.error);
    let ids: Vec<i32> =
        factory.documents(&ns()).iter().map(|d| d.get_i32("_id").unwrap()).collect();
    let expected: Vec<i32> = (0..500).rev().collect();
    assert_eq!(ids, expected);
}

#[test]
fn field_order_of_first_appearance_is_preserved() {
    let file = write_input("{\"z\": 1, \"a\": 2, \"m\": {\"q\": 1, \"b\": 2}}\n");
    let factory = MemoryFactory::new();
    let result = run(json_options(&file), &factory);
    assert!(result.error.is_none(), "{:?}", result.error);
    let docs = factory.documents(&ns());
    assert_eq!(docs[0], doc! { "z": 1, "a": 2, "m": { "q": 1, "b": 2 } });
}
