use std::io::Write;
use std::sync::Arc;

use bson::{Bson, Document, doc};
use bulkload::memstore::MemoryFactory;
use bulkload::options::{ImportOptions, InputFormat, ParseGrace};
use bulkload::session::Namespace;
use bulkload::{ImportResult, Importer};
use tempfile::NamedTempFile;

fn write_input(data: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(data.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn csv_options(file: &NamedTempFile) -> ImportOptions {
    let mut opts = ImportOptions::default();
    opts.db = "test".to_string();
    opts.collection = Some("things".to_string());
    opts.input.format = InputFormat::Csv;
    opts.input.file = Some(file.path().to_path_buf());
    opts.input.header_line = true;
    opts
}

fn run(opts: ImportOptions, factory: &MemoryFactory) -> ImportResult {
    Importer::new(opts, Arc::new(factory.clone())).unwrap().run()
}

fn sorted_by_id(factory: &MemoryFactory) -> Vec<Document> {
    let mut docs = factory.documents(&Namespace::new("test", "things"));
    docs.sort_by_key(|d| d.get_i32("_id").unwrap_or(i32::MAX));
    docs
}

#[test]
fn insert_with_ignore_blanks_omits_empty_cells() {
    let file = write_input("_id,b,c\n1,2,\n5,,6e\n7,8,6\n");
    let mut opts = csv_options(&file);
    opts.ingest.ignore_blanks = true;

    let factory = MemoryFactory::new();
    let result = run(opts, &factory);
    assert!(result.error.is_none(), "{:?}", result.error);
    assert_eq!(result.successes, 3);
    assert_eq!(result.failures, 0);
    assert_eq!(
        sorted_by_id(&factory),
        vec![
            doc! { "_id": 1, "b": 2 },
            doc! { "_id": 5, "c": "6e" },
            doc! { "_id": 7, "b": 8, "c": 6 },
        ]
    );
}

#[test]
fn array_index_fields_build_arrays() {
    let file = write_input("_id,a.0,a.1,a.2\n1,2,,4\n");
    let mut opts = csv_options(&file);
    opts.input.use_array_index_fields = true;

    let factory = MemoryFactory::new();
    let result = run(opts, &factory);
    assert!(result.error.is_none(), "{:?}", result.error);
    assert_eq!(sorted_by_id(&factory), vec![doc! { "_id": 1, "a": [2, "", 4] }]);
}

#[test]
fn out_of_order_array_indexes_abort() {
    let file = write_input("_id,a.1,a.0\n1,2,3\n");
    let mut opts = csv_options(&file);
    opts.input.use_array_index_fields = true;

    let factory = MemoryFactory::new();
    let result = run(opts, &factory);
    assert_eq!(result.successes, 0);
    assert_eq!(
        result.error.unwrap().to_string(),
        "array index error with field 'a.1': array indexes in fields must start from 0 and increase sequentially"
    );
}

#[test]
fn mixed_document_and_array_prefixes_abort() {
    let file = write_input("_id,a.a,a.0\n1,2,3\n");
    let mut opts = csv_options(&file);
    opts.input.use_array_index_fields = true;

    let factory = MemoryFactory::new();
    let result = run(opts, &factory);
    assert_eq!(result.successes, 0);
    assert_eq!(result.error.unwrap().to_string(), "fields 'a.a' and 'a.0' are incompatible");
}

#[test]
fn empty_file_with_header_line_surfaces_eof() {
    let file = write_input("");
    let opts = csv_options(&file);

    let factory = MemoryFactory::new();
    let result = run(opts, &factory);
    assert_eq!(result.successes, 0);
    let bulkload::ImportError::Io(io) = result.error.unwrap() else {
        panic!("expected the end-of-stream error");
    };
    assert_eq!(io.kind(), std::io::ErrorKind::UnexpectedEof);
}

#[test]
fn inline_fields_replace_the_header_line() {
    let file = write_input("1,x\n2,y\n");
    let mut opts = csv_options(&file);
    opts.input.header_line = false;
    opts.input.fields = Some("n,s".to_string());

    let factory = MemoryFactory::new();
    let result = run(opts, &factory);
    assert!(result.error.is_none(), "{:?}", result.error);
    assert_eq!(result.successes, 2);
    let docs = factory.documents(&Namespace::new("test", "things"));
    assert!(docs.iter().any(|d| d.get("n") == Some(&Bson::Int32(1))));
}

#[test]
fn typed_columns_coerce_cells() {
    let file = write_input("7,2019-03-30 16:25:02,aGVsbG8=\n");
    let mut opts = csv_options(&file);
    opts.input.header_line = false;
    opts.input.fields = Some(
        "id.int64(),joined.date_ms(yyyy-MM-dd HH:mm:ss),blob.binary(base64)".to_string(),
    );
    opts.input.columns_have_types = true;

    let factory = MemoryFactory::new();
    let result = run(opts, &factory);
    assert!(result.error.is_none(), "{:?}", result.error);
    let docs = factory.documents(&Namespace::new("test", "things"));
    assert_eq!(docs[0].get("id"), Some(&Bson::Int64(7)));
    assert!(matches!(docs[0].get("joined"), Some(Bson::DateTime(_))));
    assert!(matches!(docs[0].get("blob"), Some(Bson::Binary(_))));
}

#[test]
fn tsv_splits_on_tabs() {
    let file = write_input("a\tb\n1\t2\n");
    let mut opts = csv_options(&file);
    opts.input.format = InputFormat::Tsv;

    let factory = MemoryFactory::new();
    let result = run(opts, &factory);
    assert!(result.error.is_none(), "{:?}", result.error);
    assert_eq!(result.successes, 1);
    let docs = factory.documents(&Namespace::new("test", "things"));
    assert_eq!(docs[0].get("b"), Some(&Bson::Int32(2)));
}

#[test]
fn skip_row_grace_counts_failures() {
    let file = write_input("2\nnope\n3\n");
    let mut opts = csv_options(&file);
    opts.input.header_line = false;
    opts.input.fields = Some("n.int32()".to_string());
    opts.input.columns_have_types = true;
    opts.input.parse_grace = ParseGrace::SkipRow;

    let factory = MemoryFactory::new();
    let result = run(opts, &factory);
    assert!(result.error.is_none(), "{:?}", result.error);
    assert_eq!(result.successes, 2);
    assert_eq!(result.failures, 1);
}

#[test]
fn stop_grace_aborts_on_a_bad_cell() {
    let file = write_input("2\nnope\n3\n");
    let mut opts = csv_options(&file);
    opts.input.header_line = false;
    opts.input.fields = Some("n.int32()".to_string());
    opts.input.columns_have_types = true;
    opts.input.parse_grace = ParseGrace::Stop;

    let factory = MemoryFactory::new();
    let result = run(opts, &factory);
    assert!(result.error.is_some());
}

#[test]
fn extra_cells_extend_header_derived_fields() {
    let file = write_input("a\n1,2,3\n");
    let opts = csv_options(&file);

    let factory = MemoryFactory::new();
    let result = run(opts, &factory);
    assert!(result.error.is_none(), "{:?}", result.error);
    let docs = factory.documents(&Namespace::new("test", "things"));
    assert_eq!(docs[0], doc! { "a": 1, "field1": 2, "field2": 3 });
}

#[test]
fn collection_name_falls_back_to_the_file_stem() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("people.csv");
    std::fs::write(&path, "name\nalice\n").unwrap();

    let mut opts = ImportOptions::default();
    opts.db = "test".to_string();
    opts.input.format = InputFormat::Csv;
    opts.input.header_line = true;
    opts.input.file = Some(path);

    let factory = MemoryFactory::new();
    let result = run(opts, &factory);
    assert!(result.error.is_none(), "{:?}", result.error);
    assert_eq!(factory.count(&Namespace::new("test", "people")), 1);
}

#[test]
fn blank_typed_cells_with_ignore_blanks_are_rejected_at_setup() {
    let file = write_input("1\n");
    let mut opts = csv_options(&file);
    opts.input.header_line = false;
    opts.input.fields = Some("n.int32()".to_string());
    opts.input.columns_have_types = true;
    opts.ingest.ignore_blanks = true;

    let factory = MemoryFactory::new();
    let result = run(opts, &factory);
    assert_eq!(result.successes, 0);
    assert!(matches!(result.error, Some(bulkload::ImportError::InvalidOption(_))));
}
