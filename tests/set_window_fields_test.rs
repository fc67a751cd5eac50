use serde_json::json;

use volga_window_eval::{
    AccumulationStrategy, Document, ErrorKind, SetWindowFieldsSpec, Value, WindowOperator,
    WindowOperatorSpec,
};

const STAGE: &str = r#"{
    "partitionBy": "$store",
    "sortBy": {"day": 1},
    "output": {
        "weekSales": {"$sum": "$sales", "window": {"documents": [-6, 0]}},
        "avgSoFar": {"$avg": "$sales", "window": {"documents": ["unbounded", "current"]}},
        "bestDay": {"$max": "$sales"},
        "days": {"$count": {}}
    }
}"#;

const TUNING: &str = "
strategy: incremental
max_partition_size: 1000
";

fn sales() -> Vec<Document> {
    let mut docs = Vec::new();
    for (store, base) in [("north", 10), ("south", 100)] {
        for day in 0..14 {
            let doc = json!({"store": store, "day": day, "sales": base + (day * 7) % 5});
            docs.push(Document::from_json(doc).unwrap());
        }
    }
    docs
}

#[test]
fn test_stage_from_json_with_yaml_tuning() {
    let spec = SetWindowFieldsSpec::from_json(STAGE).unwrap();
    let tuning = WindowOperatorSpec::from_yaml(TUNING).unwrap();
    assert_eq!(tuning.strategy, AccumulationStrategy::Incremental);

    let op = WindowOperator::try_from_spec(&spec, tuning).unwrap();
    let input = sales();
    let out = op.execute_all(input.clone()).unwrap();
    assert_eq!(out.len(), input.len());

    for (partition_in, partition_out) in input.chunks(14).zip(out.chunks(14)) {
        let values: Vec<i64> = partition_in
            .iter()
            .map(|d| match d.get("sales") {
                Value::Int(v) => *v as i64,
                other => panic!("unexpected sales value {other:?}"),
            })
            .collect();
        let best = *values.iter().max().unwrap();
        for (i, row) in partition_out.iter().enumerate() {
            let week: i64 = values[i.saturating_sub(6)..=i].iter().sum();
            assert_eq!(row.get("weekSales"), &Value::int_or_long(week));
            let so_far: i64 = values[..=i].iter().sum();
            assert_eq!(row.get("avgSoFar"), &Value::Double(so_far as f64 / (i + 1) as f64));
            assert_eq!(row.get("bestDay"), &Value::int_or_long(best));
            assert_eq!(row.get("days"), &Value::Int(14));
        }
    }
}

#[test]
fn test_stage_from_yaml_matches_json() {
    let yaml = "
partitionBy: $store
sortBy:
  day: 1
output:
  weekSales:
    $sum: $sales
    window:
      documents: [-6, 0]
  avgSoFar:
    $avg: $sales
    window:
      documents: [unbounded, current]
  bestDay:
    $max: $sales
  days:
    $count: {}
";
    let from_yaml = SetWindowFieldsSpec::from_yaml(yaml).unwrap();
    let from_json = SetWindowFieldsSpec::from_json(STAGE).unwrap();
    let run = |spec: &SetWindowFieldsSpec| {
        let op = WindowOperator::try_from_spec(spec, WindowOperatorSpec::default()).unwrap();
        serde_json::to_value(op.execute_all(sales()).unwrap()).unwrap()
    };
    assert_eq!(run(&from_yaml), run(&from_json));
}

#[test]
fn test_configuration_errors_are_reported_before_evaluation() {
    let bad = [
        r#"{"output": {"a": {"$sum": "$x"}}}"#,
        r#"{"sortBy": {"x": 1}, "output": {"a": {"$percentile": "$x"}}}"#,
        r#"{"sortBy": {"x": 1}, "output": {"a": {"$sum": "$x", "window": {"documents": [3, 1]}}}}"#,
        r#"{"sortBy": {"x": 1, "y": 1}, "output": {"a": {"$sum": "$x", "window": {"range": [0, 1]}}}}"#,
    ];
    for stage in bad {
        let spec = SetWindowFieldsSpec::from_json(stage).unwrap();
        let err = WindowOperator::try_from_spec(&spec, WindowOperatorSpec::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration, "{stage}: {err}");
    }
}

#[test]
fn test_streamed_output_matches_collected_output() {
    let spec = SetWindowFieldsSpec::from_json(STAGE).unwrap();
    let op = WindowOperator::try_from_spec(&spec, WindowOperatorSpec::default()).unwrap();
    let streamed: Vec<Document> = op.execute(sales()).map(|d| d.unwrap()).collect();
    assert_eq!(streamed, op.execute_all(sales()).unwrap());
}
