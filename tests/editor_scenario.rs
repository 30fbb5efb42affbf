use layout_annotator::geometry::{Point, Rect};
use layout_annotator::settings::Settings;
use layout_annotator::{Config, Editor, EditorMode, Effect, Template, TemplateMode};

fn close(actual: Rect, expected: Rect) -> bool {
    actual
        .to_xywh()
        .iter()
        .zip(expected.to_xywh())
        .all(|(a, e)| (a - e).abs() < 1e-9)
}

#[test]
fn draw_resize_then_undo_restores_drawn_box() {
    let mut editor = Editor::default();
    editor.load_template(Template::new("blank", TemplateMode::Auto, Vec::new()));
    editor.set_mode(EditorMode::Add);

    editor.pointer_down(Point::new(0.1, 0.1));
    editor.pointer_move(Point::new(0.4, 0.3));
    assert_eq!(editor.pointer_up(), Effect::Committed);
    let drawn = editor.region("custom_1").unwrap().rect;
    assert!(close(drawn, Rect::new(0.1, 0.1, 0.3, 0.2)));

    editor.set_mode(EditorMode::View);
    editor.pointer_down(Point::new(0.4, 0.3));
    editor.pointer_move(Point::new(0.5, 0.4));
    assert_eq!(editor.pointer_up(), Effect::Committed);
    let resized = editor.region("custom_1").unwrap().rect;
    assert!(close(resized, Rect::new(0.1, 0.1, 0.4, 0.3)));

    assert!(editor.undo());
    assert!(close(editor.region("custom_1").unwrap().rect, drawn));
    assert!(editor.redo());
    assert!(close(editor.region("custom_1").unwrap().rect, resized));
}

#[tokio::test]
async fn scripted_session_produces_template() {
    let dir = tempfile::tempdir().unwrap();
    let fixtures = dir.path().join("fixtures.json");
    std::fs::write(
        &fixtures,
        r#"{"grids": {"*": {"rows": [0.0, 0.5, 1.0], "cols": [0.0, 0.5, 1.0]}}}"#,
    )
    .unwrap();
    let script = dir.path().join("script.json");
    std::fs::write(
        &script,
        r#"[
            {"op": "enter_table", "id": "table_1"},
            {"op": "move_line", "axis": "cols", "index": 1, "offset": 0.25},
            {"op": "toggle_axis_lock", "axis": "rows"},
            {"op": "commit_table"},
            {"op": "exit_table"},
            {"op": "set_label", "id": "plain_text_1", "label": "Customer"},
            {"op": "place_anchor", "id": "table_1", "corner": "tl", "text": "No.",
             "bounds": [0.125, 0.25, 0.25, 0.3125]},
            {"op": "set_remarks", "id": "table_1", "remarks": "line items"}
        ]"#,
    )
    .unwrap();

    let input = r#"{
        "filename": "form.png",
        "regions": [
            {"type": "table", "x": 0.125, "y": 0.25, "width": 0.75, "height": 0.5},
            {"type": "plain text", "x": 0.125, "y": 0.0625, "width": 0.5, "height": 0.125, "label": null}
        ]
    }"#;
    let config = Config {
        script_path: Some(script.display().to_string()),
        fixtures_path: Some(fixtures.display().to_string()),
        name: Some("Order form".to_string()),
        mode: Some("custom".to_string()),
        ..Config::default()
    };
    let settings = Settings {
        table_snap_tolerance: 4.5,
        table_join_tolerance: 2.5,
        ..Settings::default()
    };
    let output = layout_annotator::run_with_settings(config, settings, Some(input.to_string()))
        .await
        .unwrap();

    insta::assert_snapshot!(output, @r###"
    {
      "name": "Order form",
      "mode": "custom",
      "filename": "form.png",
      "regions": [
        {
          "id": "table_1",
          "type": "table",
          "x": 0.125,
          "y": 0.25,
          "width": 0.75,
          "height": 0.5,
          "label": "Table",
          "remarks": "line items",
          "locked": false,
          "table_settings": {
            "vertical_strategy": "explicit",
            "horizontal_strategy": "explicit",
            "explicit_vertical_lines": [
              0.0,
              0.25,
              1.0
            ],
            "explicit_horizontal_lines": [
              0.0,
              0.5,
              1.0
            ],
            "snap_tolerance": 4.5,
            "join_tolerance": 2.5,
            "vertical_locked": false,
            "horizontal_locked": true
          },
          "positioning": {
            "anchors": {
              "tl": {
                "text": "No.",
                "bounds": [
                  0.125,
                  0.25,
                  0.25,
                  0.3125
                ]
              }
            }
          }
        },
        {
          "id": "plain_text_1",
          "type": "plain text",
          "x": 0.125,
          "y": 0.0625,
          "width": 0.5,
          "height": 0.125,
          "label": "Customer",
          "remarks": "",
          "locked": false
        }
      ]
    }
    "###);
}

#[tokio::test]
async fn failing_script_command_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let fixtures = dir.path().join("fixtures.json");
    std::fs::write(&fixtures, r#"{"failing_regions": ["table_1"]}"#).unwrap();
    let script = dir.path().join("script.json");
    std::fs::write(&script, r#"[{"op": "enter_table", "id": "table_1"}]"#).unwrap();

    let input = r#"{"name": "Stored", "regions": [
        {"id": "table_1", "type": "table", "x": 0.125, "y": 0.25, "width": 0.5, "height": 0.5}
    ]}"#;
    let config = Config {
        script_path: Some(script.display().to_string()),
        fixtures_path: Some(fixtures.display().to_string()),
        ..Config::default()
    };
    let err = layout_annotator::run_with_settings(config, Settings::default(), Some(input.to_string()))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("enter_table"));
}
