//! Integration tests for drift

use std::io::{Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use tempfile::TempDir;

use drift::source::{InputCompression, VecSource};
use drift::{BulkLoader, LoaderConfig, NdjsonSource, SqlScriptConnection, Value};

/// Shared script buffer, readable after the loader consumed the connection.
#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn read_gzip(path: &Path) -> String {
    let mut decoder = MultiGzDecoder::new(std::fs::File::open(path).unwrap());
    let mut text = String::new();
    decoder.read_to_string(&mut text).unwrap();
    text
}

fn config_yaml(work_dir: &Path, extra: &str) -> String {
    format!(
        r#"
target:
  schema: public
  table: users
  columns:
    - name: ID
      type: NUMBER(38,0)
    - name: NAME
      type: VARCHAR(16777216)
work_directory: "{}"
split_size: 2
{extra}
"#,
        work_dir.display()
    )
}

mod config_tests {
    use super::*;

    #[test]
    fn test_config_yaml_parsing() {
        let dir = TempDir::new().unwrap();
        let yaml = config_yaml(
            dir.path(),
            r#"
location:
  type: internal_stage
  stage_name: landing
on_error: skip_file_percent
error_limit: 10
csv:
  delimiter: "|"
  null_if: "NULL,\\N"
"#,
        );
        let config = LoaderConfig::parse(&yaml).unwrap();

        assert_eq!(config.qualified_table(), "public.users");
        assert_eq!(config.split_size, 2);
        assert_eq!(config.stage_location().to_string(), "@public.landing");
        assert_eq!(config.on_error_policy().clause(), "'SKIP_FILE_10%'");
        assert_eq!(config.null_if_values(), ["NULL", "\\N"]);
        assert_eq!(config.target.columns.len(), 2);
    }

    #[test]
    fn test_unknown_option_is_rejected() {
        let dir = TempDir::new().unwrap();
        let yaml = config_yaml(dir.path(), "split_rows: 10");
        assert!(LoaderConfig::parse(&yaml).is_err());
    }

    #[test]
    fn test_named_stage_requires_name() {
        let dir = TempDir::new().unwrap();
        let yaml = config_yaml(dir.path(), "location:\n  type: internal_stage");
        let err = LoaderConfig::parse(&yaml).unwrap_err();
        assert!(err.to_string().contains("stage"));
    }
}

mod end_to_end_tests {
    use super::*;

    fn write_input(dir: &Path, lines: &[&str]) -> std::path::PathBuf {
        let path = dir.join("input.ndjson.gz");
        let mut encoder = GzEncoder::new(std::fs::File::create(&path).unwrap(), Compression::default());
        for line in lines {
            writeln!(encoder, "{line}").unwrap();
        }
        encoder.finish().unwrap();
        path
    }

    #[tokio::test]
    async fn test_ndjson_to_script() {
        let input_dir = TempDir::new().unwrap();
        let work_dir = TempDir::new().unwrap();
        let input = write_input(
            input_dir.path(),
            &[
                r#"{"id": 1, "name": "a,b"}"#,
                r#"{"id": 2, "name": "say \"hi\""}"#,
                "",
                r#"{"id": 3, "name": null}"#,
            ],
        );

        let config = LoaderConfig::parse(&config_yaml(work_dir.path(), "")).unwrap();
        let mut source = NdjsonSource::open(&input, InputCompression::from_path(&input), None).unwrap();
        let script = SharedBuffer::default();
        let connection = SqlScriptConnection::new(script.clone(), config.target.columns.clone());

        let outcome = BulkLoader::run(config, &mut source, connection).await.unwrap();

        assert_eq!(outcome.rows_written, 3);
        assert_eq!(outcome.files.len(), 2);
        assert_eq!(outcome.files_staged, 2);
        assert_eq!(outcome.files_removed, 0);
        assert!(outcome.files[0].starts_with("users_"));
        assert!(outcome.files[0].ends_with("_0_0_0.gz"));
        assert!(outcome.files[1].ends_with("_0_0_1.gz"));

        let first = read_gzip(&work_dir.path().join(&outcome.files[0]));
        assert_eq!(first, "1,\"a,b\"\n2,\"say \"\"hi\"\"\"\n");
        let second = read_gzip(&work_dir.path().join(&outcome.files[1]));
        assert_eq!(second, "3,\n");

        let text = script.contents();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(
            lines[0],
            "-- DESC TABLE public.users (answered from configuration)"
        );
        assert!(lines[1].starts_with("PUT 'file://"));
        assert!(lines[1].contains(&outcome.files[0]));
        assert!(lines[2].contains(&outcome.files[1]));
        assert!(lines[3].starts_with(&format!(
            "COPY INTO public.users FROM @~/users/ FILES = ('{}', '{}')",
            outcome.files[0], outcome.files[1]
        )));
        assert!(lines[3].contains("ON_ERROR = 'ABORT_STATEMENT' PURGE = TRUE ;"));
        assert_eq!(lines[4], "COMMIT;");
    }

    fn events_yaml(work_dir: &Path) -> String {
        format!(
            r#"
target:
  table: events
  columns:
    - name: ID
      type: NUMBER(38,0)
    - name: CREATED_AT
      type: TIMESTAMP_NTZ(9)
    - name: DAY
      type: DATE
work_directory: "{}"
"#,
            work_dir.display()
        )
    }

    #[tokio::test]
    async fn test_text_values_are_coerced_to_column_types() {
        let input_dir = TempDir::new().unwrap();
        let work_dir = TempDir::new().unwrap();
        let input = write_input(
            input_dir.path(),
            &[
                r#"{"id": "1e3", "created_at": "2024-01-05T10:00:00Z", "day": "2024-01-05T23:00:00"}"#,
                r#"{"id": 7, "created_at": "2024-01-06 08:30:00.25", "day": "2024-01-06"}"#,
                r#"{"id": 8, "created_at": "", "day": null}"#,
            ],
        );

        let config = LoaderConfig::parse(&events_yaml(work_dir.path())).unwrap();
        let mut source = NdjsonSource::open(&input, InputCompression::Gzip, None).unwrap();
        let connection = SqlScriptConnection::new(Vec::new(), config.target.columns.clone());

        let outcome = BulkLoader::run(config, &mut source, connection).await.unwrap();

        let contents = read_gzip(&work_dir.path().join(&outcome.files[0]));
        assert_eq!(
            contents,
            "1000,2024-01-05 10:00:00.000,2024-01-05\n\
             7,2024-01-06 08:30:00.250,2024-01-06\n\
             8,,\n"
        );
    }

    #[tokio::test]
    async fn test_unparsable_timestamp_fails_the_session() {
        let work_dir = TempDir::new().unwrap();
        let config = LoaderConfig::parse(&events_yaml(work_dir.path())).unwrap();
        let mut source = VecSource::new(
            vec!["id".into(), "created_at".into(), "day".into()],
            vec![
                vec![Value::Integer(1), Value::from("2024-01-05T10:00:00Z"), Value::Null],
                vec![Value::Integer(2), Value::from("last tuesday"), Value::Null],
            ],
        );
        let connection = SqlScriptConnection::new(Vec::new(), config.target.columns.clone());

        let err = BulkLoader::run(config, &mut source, connection)
            .await
            .unwrap_err();

        assert_eq!(err.phase(), "mapping");
        let message = err.to_string();
        assert!(message.contains("Row 2"));
        assert!(message.contains("CREATED_AT"));
        assert!(message.contains("last tuesday"));
    }

    #[tokio::test]
    async fn test_rotation_and_error_policy() {
        let work_dir = TempDir::new().unwrap();
        let yaml = config_yaml(work_dir.path(), "on_error: skip_file_percent\nerror_limit: 10");
        let config = LoaderConfig::parse(&yaml).unwrap();
        let rows = (1..=5)
            .map(|i| vec![Value::Integer(i), Value::from(format!("user {i}"))])
            .collect();
        let mut source = VecSource::new(vec!["id".into(), "name".into()], rows);
        let script = SharedBuffer::default();
        let connection = SqlScriptConnection::new(script.clone(), config.target.columns.clone());

        let outcome = BulkLoader::run(config, &mut source, connection).await.unwrap();

        let line_counts: Vec<usize> = outcome
            .files
            .iter()
            .map(|name| read_gzip(&work_dir.path().join(name)).lines().count())
            .collect();
        assert_eq!(line_counts, [2, 2, 1]);

        let text = script.contents();
        assert_eq!(text.lines().filter(|l| l.starts_with("PUT ")).count(), 3);
        let copies: Vec<&str> = text.lines().filter(|l| l.starts_with("COPY INTO")).collect();
        assert_eq!(copies.len(), 1);
        let names: Vec<String> = outcome.files.iter().map(|f| format!("'{f}'")).collect();
        assert!(copies[0].contains(&format!("FILES = ({})", names.join(", "))));
        assert!(copies[0].contains("ON_ERROR = 'SKIP_FILE_10%'"));
    }

    #[tokio::test]
    async fn test_explicit_fields_with_formatting() {
        let work_dir = TempDir::new().unwrap();
        let yaml = config_yaml(
            work_dir.path(),
            r#"
specify_fields: true
fields:
  - stream_field: label
    table_field: NAME
    trim: both
    length: 3
  - stream_field: key
    table_field: ID
"#,
        );
        let config = LoaderConfig::parse(&yaml).unwrap();
        let mut source = VecSource::new(
            vec!["key".into(), "label".into()],
            vec![vec![Value::Integer(7), Value::from("  abcdef  ")]],
        );
        let connection = SqlScriptConnection::new(Vec::new(), config.target.columns.clone());

        let outcome = BulkLoader::run(config, &mut source, connection).await.unwrap();

        let contents = read_gzip(&work_dir.path().join(&outcome.files[0]));
        assert_eq!(contents, "7,abc\n");
    }

    #[tokio::test]
    async fn test_schema_failure_writes_no_files() {
        let work_dir = TempDir::new().unwrap();
        let yaml = config_yaml(work_dir.path(), "");
        let mut config = LoaderConfig::parse(&yaml).unwrap();
        config.target.columns.clear();

        let mut source = VecSource::new(
            vec!["id".into(), "name".into()],
            vec![vec![Value::Integer(1), Value::from("x")]],
        );
        let connection = SqlScriptConnection::new(Vec::new(), Vec::new());

        let err = BulkLoader::run(config, &mut source, connection)
            .await
            .unwrap_err();

        assert_eq!(err.phase(), "schema");
        assert_eq!(std::fs::read_dir(work_dir.path()).unwrap().count(), 0);
    }
}
