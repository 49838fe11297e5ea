use msgbridge::config::{
    load_config, parse_config, ConfigError, EndpointKind, MaxTokensField, UsageAccounting,
};
use msgbridge::{should_convert, Converter, EndpointInfo};
use serde_json::{json, Value};

fn example_path() -> String {
    format!("{}/config.example.yaml", env!("CARGO_MANIFEST_DIR"))
}

#[test]
fn example_config_loads() {
    let config = load_config(&example_path()).expect("example config is valid");
    assert_eq!(config.logging.level, "INFO");
    assert!(config.conversion.python_json_fixing.enabled);
    assert_eq!(config.conversion.tool_args_chunk_runes, 10);
    assert_eq!(
        config.conversion.usage_accounting,
        UsageAccounting::Incremental
    );

    let direct = config.endpoint("anthropic-direct").expect("anthropic endpoint");
    assert_eq!(direct.endpoint_type, EndpointKind::Anthropic);
    assert!(!should_convert(direct.endpoint_type));

    let legacy = config.endpoint("legacy-openai").expect("legacy endpoint");
    assert_eq!(legacy.endpoint_type, EndpointKind::OpenAi);
    assert_eq!(legacy.max_tokens_field, MaxTokensField::MaxTokens);
    assert!(config.endpoint("missing").is_none());
}

#[test]
fn configured_endpoint_drives_request_translation() {
    let config = load_config(&example_path()).expect("example config is valid");
    let converter = Converter::new(config.conversion.clone());
    let body = json!({"model": "m", "max_tokens": 32, "messages": [{"role": "user", "content": "hi"}]});

    let legacy = EndpointInfo::from(config.endpoint("legacy-openai").expect("endpoint"));
    let (out, _) = converter
        .convert_request(body.to_string().as_bytes(), legacy)
        .expect("convert");
    let value: Value = serde_json::from_slice(&out).expect("JSON");
    assert_eq!(value["max_tokens"], 32);

    let direct = EndpointInfo::from(config.endpoint("anthropic-direct").expect("endpoint"));
    let raw = body.to_string();
    let (out, ctx) = converter
        .convert_request(raw.as_bytes(), direct)
        .expect("passthrough");
    assert_eq!(&out[..], raw.as_bytes());
    assert_eq!(ctx.endpoint_kind, EndpointKind::Anthropic);
}

#[test]
fn chunk_size_from_config_shapes_tool_deltas() {
    let config = parse_config(
        "conversion:\n  tool_args_chunk_runes: 4\n",
    )
    .expect("valid config");
    let converter = Converter::new(config.conversion);
    let (_, ctx) = converter
        .convert_request(
            br#"{"model":"m","stream":true,"messages":[]}"#,
            EndpointInfo::openai(MaxTokensField::MaxCompletionTokens),
        )
        .expect("convert");

    let chunk = json!({"choices": [{"delta": {"tool_calls": [
        {"index": 0, "id": "call_1", "function": {"name": "Read", "arguments": "{\"p\":\"abcdef\"}"}}
    ]}, "finish_reason": "tool_calls"}]});
    let body = format!("data: {chunk}\n\ndata: [DONE]\n\n");
    let out = converter
        .convert_response(body.as_bytes(), &ctx, true)
        .expect("convert stream");

    let text = std::str::from_utf8(&out).expect("utf-8");
    let pieces: Vec<String> = text
        .split("\n\n")
        .filter_map(|frame| frame.lines().find_map(|l| l.strip_prefix("data: ")))
        .filter_map(|data| serde_json::from_str::<Value>(data).ok())
        .filter(|v| v["delta"]["type"] == "input_json_delta")
        .map(|v| v["delta"]["partial_json"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(pieces, vec!["{\"p\"", ":\"ab", "cdef", "\"}"]);
}

#[test]
fn invalid_documents_are_rejected() {
    let err = parse_config("conversion:\n  tool_args_chunk_runes: 0\n").unwrap_err();
    assert!(matches!(err, ConfigError::Validation(_)));

    let err = parse_config("logging:\n  level: LOUD\n").unwrap_err();
    assert!(matches!(err, ConfigError::Validation(_)));

    let err = parse_config("conversion:\n  usage_accounting: sometimes\n").unwrap_err();
    assert!(matches!(err, ConfigError::Yaml(_)));

    let err = parse_config(
        "endpoints:\n  - name: a\n    endpoint_type: openai\n  - name: a\n    endpoint_type: anthropic\n",
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::Validation(_)));
}
