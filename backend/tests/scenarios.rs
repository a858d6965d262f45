//! End-to-end runs through the public API: schema → source → pipeline → export.

use reshape::{
    to_delimited, validate_file, Pipeline, PipelineOptions, RunOutcome, Schema, Source,
    Transformation, Validator, ViolationKind,
};
use tempfile::TempDir;

async fn run(schema: &str, csv: &str) -> (Schema, RunOutcome) {
    let schema = Schema::from_json(schema).unwrap();
    let pipeline = Pipeline::new(schema.clone(), Validator::new()).with_options(PipelineOptions {
        workers: 4,
        delimiter: None,
        run_id: None,
    });
    let outcome = pipeline.run(&Source::from_string(csv).unwrap()).await.unwrap();
    (schema, outcome)
}

#[tokio::test]
async fn test_invalid_int_reported_on_its_line() {
    let (_, outcome) = run(
        r#"{
            "0": {"type": "required", "target": "name"},
            "1": {"type": "int", "target": "age"}
        }"#,
        "name,age\nAlice,30\nBob,x",
    )
    .await;

    let RunOutcome::Failed(report) = outcome else {
        panic!("expected failure");
    };
    assert_eq!(report.total(), 1);
    assert!(report.column(0).is_none());

    let diags = report.column(1).unwrap();
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].line, 3);
    assert_eq!(diags[0].kind, ViolationKind::InvalidFormat);
    assert!(diags[0].message.contains("'x'"));
    assert!(report.render().contains("Column 2 has 1 error(s):"));
    assert!(report.render().contains("Error line 3:"));
}

#[tokio::test]
async fn test_trimmed_email_exported_under_target() {
    let (schema, outcome) = run(
        r#"{"0": {"type": "email", "target": "mail", "transformations": [{"action": "trim"}]}}"#,
        "email\n  a@b.com \n",
    )
    .await;

    let RunOutcome::Succeeded(table) = outcome else {
        panic!("expected success");
    };
    assert_eq!(table.rows, vec![vec!["email".to_string()], vec!["a@b.com".to_string()]]);
    assert_eq!(to_delimited(&table.rows, &schema, ',').unwrap(), "mail\na@b.com\n");
}

#[tokio::test]
async fn test_substring_longer_than_value() {
    let (_, outcome) = run(
        r#"{"0": {"type": "required", "target": "code", "transformations": [{"action": "substring", "param": {"start": 0, "size": 3}}]}}"#,
        "code\nhi\n",
    )
    .await;

    let RunOutcome::Succeeded(table) = outcome else {
        panic!("expected success");
    };
    assert_eq!(table.data_rows(), [vec!["hi".to_string()]]);
}

#[tokio::test]
async fn test_equals_lists_allowed_values() {
    let (_, outcome) = run(
        r#"{"0": {"type": "equals", "target": "sex", "equalValues": ["M", "F"]}}"#,
        "sex\nX\n",
    )
    .await;

    let RunOutcome::Failed(report) = outcome else {
        panic!("expected failure");
    };
    let message = &report.column(0).unwrap()[0].message;
    assert!(message.contains("'X'"));
    assert!(message.contains("M"));
    assert!(message.contains("F"));
    assert_eq!(report.column(0).unwrap()[0].kind, ViolationKind::NotAllowed);
}

#[tokio::test]
async fn test_trim_before_int_check() {
    let (_, outcome) = run(
        r#"{"0": {"type": "int", "target": "n", "transformations": [{"action": "trim"}]}}"#,
        "n\n 42 \n",
    )
    .await;
    let RunOutcome::Succeeded(table) = outcome else {
        panic!("expected success");
    };
    assert_eq!(table.data_rows(), [vec!["42".to_string()]]);
}

#[tokio::test]
async fn test_convert_is_case_insensitive_by_default() {
    let (_, outcome) = run(
        r#"{"0": {"type": "equals", "target": "flag", "equalValues": ["x"],
               "transformations": [{"action": "convert", "param": {"map": {"A": "x"}}}]}}"#,
        "flag\na\nA\n",
    )
    .await;
    let RunOutcome::Succeeded(table) = outcome else {
        panic!("expected success");
    };
    assert_eq!(table.data_rows(), [vec!["x".to_string()], vec!["x".to_string()]]);
}

#[tokio::test]
async fn test_columns_without_rules_pass_through() {
    let csv = "a;b;c\n  keep  ;x;\"q;uoted\"\n";
    let (_, outcome) = run(r#"{"1": {"type": "required", "target": "b"}}"#, csv).await;
    let RunOutcome::Succeeded(table) = outcome else {
        panic!("expected success");
    };
    assert_eq!(table.delimiter, ';');
    assert_eq!(
        table.data_rows(),
        [vec!["  keep  ".to_string(), "x".to_string(), "q;uoted".to_string()]]
    );
}

#[tokio::test]
async fn test_unknown_action_rejected_at_load() {
    let err = Schema::from_json(
        r#"{"0": {"type": "required", "target": "a", "transformations": [{"action": "explode"}]}}"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("explode"));
}

#[tokio::test]
async fn test_file_round_trip_with_latin1_source() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("latin.csv");
    // "Zoé" in ISO-8859-1
    let mut bytes = b"name;city\n".to_vec();
    bytes.extend_from_slice(b"Zo\xe9;Paris\n");
    std::fs::write(&path, bytes).unwrap();

    let schema = Schema::from_json(
        r#"{"0": {"type": "required", "target": "who", "transformations": [{"action": "addString", "param": {"addString": "!"}}]}}"#,
    )
    .unwrap();
    let outcome = validate_file(&path, schema.clone(), PipelineOptions::default())
        .await
        .unwrap();
    let RunOutcome::Succeeded(table) = outcome else {
        panic!("expected success");
    };
    assert_eq!(table.encoding, "windows-1252");
    assert_eq!(table.data_rows()[0], vec!["Zoé!".to_string(), "Paris".to_string()]);
}

#[tokio::test]
async fn test_utf8_file_untouched_columns_are_byte_exact() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("names.csv");
    std::fs::write(&path, "id,name\n1,Müller\n2,Åsa\n").unwrap();

    let schema = Schema::from_json(r#"{"0": {"type": "int", "target": "id"}}"#).unwrap();
    let outcome = validate_file(&path, schema.clone(), PipelineOptions::default())
        .await
        .unwrap();
    let RunOutcome::Succeeded(table) = outcome else {
        panic!("expected success");
    };
    assert_eq!(table.encoding, "UTF-8");
    assert_eq!(table.data_rows()[0][1], "Müller");
    assert_eq!(table.data_rows()[1][1], "Åsa");
    assert_eq!(
        to_delimited(&table.rows, &schema, ',').unwrap(),
        "id,name\n1,Müller\n2,Åsa\n"
    );
}

#[test]
fn test_chain_runs_in_declared_order() {
    let chain = vec![
        Transformation::Trim,
        Transformation::After {
            delimiter: ":".to_string(),
        },
        Transformation::AddSuffix {
            text: "-ok".to_string(),
        },
    ];
    let mut row = vec!["  id:42 ".to_string()];
    reshape::apply_chain(&chain, &mut row, 0);
    assert_eq!(row[0], "42-ok");
}
