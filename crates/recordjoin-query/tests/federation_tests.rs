use recordjoin_query::{ConfigNode, DataError, QueryPart, SourceRegistry};
use serde_json::json;

fn definitions() -> Vec<ConfigNode> {
    let value = json!([
        {
            "NAME": "zentral",
            "TYPE": "table",
            "Schema": ["uid", "Vorname", "Nachname", "Raum"],
            "Schluessel": ["uid"],
            "Data": [
                ["scooper", "Sheldon", "Cooper", "4A"],
                ["lhofstadter", "Leonard", "Hofstadter", "4A"]
            ]
        },
        {
            "NAME": "lokal",
            "TYPE": "table",
            "Schema": ["uid", "Telefon"],
            "Schluessel": ["uid"],
            "Data": [["scooper", "555-0100"]]
        },
        {
            "NAME": "personal",
            "TYPE": "overlay",
            "SOURCE": "zentral",
            "OVERLAY": "lokal",
            "MODE": "so",
            "MATCH": [["uid", "uid"]]
        },
        {
            "NAME": "oeffentlich",
            "TYPE": "schema",
            "SOURCE": "personal",
            "DROP": ["Raum"],
            "RENAME": [["Telefon", "Durchwahl"]]
        }
    ]);

    value
        .as_array()
        .unwrap()
        .iter()
        .map(|v| ConfigNode::from_json("Datenquelle", v).unwrap())
        .collect()
}

#[tokio::test]
async fn test_single_match_against_two_records() {
    let registry = SourceRegistry::with_builtin_factories().await;
    registry.build_all(&definitions()).await.unwrap();

    let source = registry.get_source("zentral").await.unwrap();
    let results = source
        .find(&[QueryPart::new("Vorname", "Sheldon")])
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results.keys(), vec!["scooper"]);
}

#[tokio::test]
async fn test_combinators_from_json_definitions() {
    let registry = SourceRegistry::with_builtin_factories().await;
    registry.build_all(&definitions()).await.unwrap();

    let public = registry.get_source("oeffentlich").await.unwrap();
    assert_eq!(
        public.schema().columns(),
        &["uid", "Vorname", "Nachname", "Durchwahl"]
    );

    let found = public
        .find(&[QueryPart::new("Durchwahl", "555*")])
        .await
        .unwrap();
    assert_eq!(found.keys(), vec!["scooper"]);

    let rows = public
        .get_datasets_by_key(&["lhofstadter".to_string()])
        .await
        .unwrap()
        .to_vec();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("Durchwahl").unwrap(), None);
    assert!(matches!(
        rows[0].get("Raum"),
        Err(DataError::ColumnNotFound(_))
    ));
}

#[tokio::test]
async fn test_union_with_mismatched_schema_is_rejected() {
    let registry = SourceRegistry::with_builtin_factories().await;
    registry.build_all(&definitions()).await.unwrap();

    let union = ConfigNode::from_json(
        "Datenquelle",
        &json!({"NAME": "alle", "TYPE": "union", "SOURCE1": "zentral", "SOURCE2": "lokal"}),
    )
    .unwrap();

    let err = registry.create_source(&union).await.err().unwrap();
    assert!(matches!(err, DataError::InvalidConfiguration(_)));
}
