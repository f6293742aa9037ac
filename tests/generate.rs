use std::fs;

use hwgen::builtin::{clang_templates, CLANG_HTTP_POST_BODY, CLANG_HTTP_POST_HEADER};
use hwgen::{Channel, HeaderGenerator, TemplateError, TemplateSet};
use pretty_assertions::assert_eq;

const CHANNEL_JSON: &str = r#"{
    "name": "greenhouse",
    "description": "soil and air sensors",
    "format": "json",
    "tags": ["site", "bed"],
    "fields": {"moisture": "int", "air_temp": "float", "pump_on": "boolean", "note": "string"}
}"#;

#[test]
fn test_channel_file_to_header_file() {
    let dir = tempfile::tempdir().unwrap();
    let channel_path = dir.path().join("greenhouse.json");
    let header_path = dir.path().join("greenhouse.h");
    fs::write(&channel_path, CHANNEL_JSON).unwrap();

    let channel = Channel::load(&channel_path).unwrap();
    assert!(channel.validate().is_empty());

    let templates = clang_templates().unwrap();
    let header = HeaderGenerator::new(&templates)
        .include_guard("GREENHOUSE_H")
        .generate(&channel)
        .unwrap();
    fs::write(&header_path, &header).unwrap();

    let written = fs::read_to_string(&header_path).unwrap();
    let expected = concat!(
        "#ifndef GREENHOUSE_H\n",
        "#define GREENHOUSE_H\n",
        "\n",
        "#define HTTP_POST_HEADER \\\n",
        r#""POST /channels/devices/%s/upload?site=%s&bed=%s HTTP/1.1\r\n" \"#,
        "\n",
        r#""Host: %s:8081\r\n" \"#,
        "\n",
        r#""Content-Type: application/json\r\n" \"#,
        "\n",
        r#""AccessToken: abcdefg\r\n" \"#,
        "\n",
        r#""Content-Length: %d\r\n" \"#,
        "\n",
        r#""\r\n""#,
        "\n\n",
        "#define HTTP_POST_BODY \\\n",
        r#""{moisture=%d,air_temp=%f,pump_on=%s,note=%s,}\r\n""#,
        "\n\n",
        "#endif /* GREENHOUSE_H */\n",
    );
    assert_eq!(written, expected);
}

#[test]
fn test_definition_file_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let templates_path = dir.path().join("custom.h");
    fs::write(
        &templates_path,
        concat!(
            "# custom templates\n",
            "#defkey TAG_COUNT\n",
            "#define TAG_COUNT {{ len .Tags }}\\\\n\n",
            "#end\n",
        ),
    )
    .unwrap();

    let templates = TemplateSet::load(&templates_path).unwrap();
    let channel = Channel::from_json(CHANNEL_JSON).unwrap();
    let header = HeaderGenerator::new(&templates)
        .keys(["TAG_COUNT"])
        .generate(&channel)
        .unwrap();
    assert_eq!(header, "#define TAG_COUNT 2\n");

    let err = HeaderGenerator::new(&templates)
        .keys([CLANG_HTTP_POST_HEADER, CLANG_HTTP_POST_BODY])
        .generate(&channel)
        .unwrap_err();
    assert!(matches!(err, TemplateError::UnknownTemplateKey { .. }));
}

#[test]
fn test_missing_files_surface_io_errors() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.h");
    assert!(matches!(
        TemplateSet::load(&missing),
        Err(TemplateError::Io(_))
    ));
    assert!(matches!(Channel::load(&missing), Err(TemplateError::Io(_))));
}
