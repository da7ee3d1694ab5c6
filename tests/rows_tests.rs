//! Row transformation tests

use schema_tools::models::{FieldDefinition, Row, TableDefinition};
use schema_tools::typemap::{GeometryKind, SchemaType};
use serde_json::{Value, json};

fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap()
}

fn parkeervakken() -> TableDefinition {
    TableDefinition::new("parkeervakken")
        .with_field(FieldDefinition::schema_meta())
        .with_field(FieldDefinition::new("id", SchemaType::string()).required())
        .with_field(FieldDefinition::new("aantal", SchemaType::Integer))
        .with_field(FieldDefinition::new("regimes", SchemaType::Object))
        .with_field(FieldDefinition::new("geometry", SchemaType::Geometry(GeometryKind::Geometry)))
}

mod load_tests {
    use super::*;
    use schema_tools::SchemaError;
    use schema_tools::rows::load_rows;

    #[test]
    fn test_point_becomes_ewkt() {
        let input = row(json!({"id": "1", "geometry": {"type": "Point", "coordinates": [1, 2]}}));
        let rows = load_rows(&parkeervakken(), vec![input], 28992).unwrap();
        assert_eq!(rows[0]["geometry"], json!("SRID=28992;POINT (1 2)"));
    }

    #[test]
    fn test_polygon_and_nested_object() {
        let input = row(json!({
            "id": "2",
            "aantal": 3,
            "regimes": [{"soort": "FISCAAL", "dagen": ["ma", "di"]}],
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[0, 0], [10, 0], [10, 5], [0, 0]]]
            }
        }));
        let rows = load_rows(&parkeervakken(), vec![input], 28992).unwrap();
        assert_eq!(
            rows[0]["geometry"],
            json!("SRID=28992;POLYGON ((0 0, 10 0, 10 5, 0 0))")
        );
        assert_eq!(
            rows[0]["regimes"],
            json!(r#"[{"soort":"FISCAAL","dagen":["ma","di"]}]"#)
        );
        assert_eq!(rows[0]["aantal"], json!(3));
    }

    #[test]
    fn test_missing_geometry_is_an_error() {
        let input = row(json!({"id": "3"}));
        assert!(matches!(
            load_rows(&parkeervakken(), vec![input], 28992),
            Err(SchemaError::MissingGeometry { .. })
        ));
    }

    #[test]
    fn test_table_without_geometry_needs_none() {
        let table = TableDefinition::new("tellingen")
            .with_field(FieldDefinition::new("id", SchemaType::Integer).required());
        let rows = load_rows(&table, vec![row(json!({"id": 1}))], 28992).unwrap();
        assert_eq!(rows[0], row(json!({"id": 1})));
    }

    #[test]
    fn test_unreadable_geometry() {
        let input = row(json!({"id": "4", "geometry": "CIRCLE (1 2, 3)"}));
        assert!(matches!(
            load_rows(&parkeervakken(), vec![input], 28992),
            Err(SchemaError::InvalidGeometry { .. })
        ));

        let input = row(json!({"id": "5", "geometry": 12}));
        assert!(matches!(
            load_rows(&parkeervakken(), vec![input], 28992),
            Err(SchemaError::InvalidGeometry { .. })
        ));
    }

    #[test]
    fn test_deeply_nested_geometry_is_invalid() {
        let deep = "GEOMETRYCOLLECTION (".repeat(200_000);
        let input = row(json!({"id": "6", "geometry": deep}));
        assert!(matches!(
            load_rows(&parkeervakken(), vec![input], 28992),
            Err(SchemaError::InvalidGeometry { .. })
        ));
    }
}

mod export_tests {
    use super::*;
    use schema_tools::rows::export_row;

    #[test]
    fn test_decodes_geometry_and_objects() {
        let stored = row(json!({
            "id": "1",
            "regimes": r#"[{"soort":"FISCAAL"}]"#,
            "geometry": "SRID=28992;POINT (1 2)"
        }));
        let exported = export_row(&parkeervakken(), stored);
        assert_eq!(exported["regimes"], json!([{"soort": "FISCAAL"}]));
        assert_eq!(exported["geometry"], json!({"type": "Point", "coordinates": [1.0, 2.0]}));
    }

    #[test]
    fn test_geojson_text_is_decoded() {
        let stored = row(json!({
            "geometry": r#"{"type": "Point", "coordinates": [4.9, 52.37]}"#
        }));
        let exported = export_row(&parkeervakken(), stored);
        assert_eq!(exported["geometry"]["type"], "Point");
    }

    #[test]
    fn test_never_raises() {
        let inputs = [
            json!({"regimes": "{broken"}),
            json!({"regimes": ""}),
            json!({"regimes": null}),
            json!({"geometry": "POINT (1"}),
            json!({"geometry": 42}),
            json!({"aantal_plaatsen": "x"}),
        ];
        for input in inputs {
            let stored = row(input.clone());
            let exported = export_row(&parkeervakken(), stored);
            assert_eq!(exported.len(), 1, "input: {input}");
        }
    }

    #[test]
    fn test_deeply_nested_geometry_passes_through() {
        let deep = "GEOMETRYCOLLECTION (".repeat(200_000);
        let exported = export_row(&parkeervakken(), row(json!({"geometry": deep.clone()})));
        assert_eq!(exported["geometry"], json!(deep));
    }

    #[test]
    fn test_keys_become_display_form() {
        let stored = row(json!({"aantal_plaatsen": 4, "e_type": "E6a"}));
        let exported = export_row(&parkeervakken(), stored);
        assert_eq!(exported["aantalPlaatsen"], json!(4));
        assert_eq!(exported["eType"], json!("E6a"));
    }
}
