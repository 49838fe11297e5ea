use msgbridge::config::{ConversionConfig, JsonRepairConfig, MaxTokensField};
use msgbridge::repair::{is_valid_json, looks_like_python_literal, JsonRepair};
use msgbridge::{ConversionContext, Converter, EndpointInfo};
use serde_json::{json, Value};

fn converter_with(fixing: JsonRepairConfig) -> Converter {
    Converter::new(ConversionConfig {
        python_json_fixing: fixing,
        ..ConversionConfig::default()
    })
}

fn streaming_ctx(converter: &Converter) -> ConversionContext {
    let body = json!({
        "model": "m",
        "stream": true,
        "messages": [{"role": "user", "content": "plan"}],
        "tools": [{"name": "TodoWrite", "input_schema": {"type": "object"}}]
    });
    converter
        .convert_request(
            body.to_string().as_bytes(),
            EndpointInfo::openai(MaxTokensField::MaxCompletionTokens),
        )
        .expect("convert request")
        .1
}

fn tool_args_from_stream(out: &[u8]) -> String {
    let text = std::str::from_utf8(out).expect("utf-8");
    let mut args = String::new();
    for frame in text.split("\n\n").filter(|f| !f.is_empty()) {
        let data = frame
            .lines()
            .find_map(|line| line.strip_prefix("data: "))
            .expect("data line");
        let value: Value = serde_json::from_str(data).expect("JSON payload");
        if value["delta"]["type"] == "input_json_delta" {
            args.push_str(value["delta"]["partial_json"].as_str().expect("partial_json"));
        }
    }
    args
}

fn todowrite_stream(fragments: &[&str]) -> String {
    let mut body = String::new();
    for (i, fragment) in fragments.iter().enumerate() {
        let call = if i == 0 {
            json!({"index": 0, "id": "call_todo", "function": {"name": "TodoWrite", "arguments": fragment}})
        } else {
            json!({"index": 0, "function": {"arguments": fragment}})
        };
        let chunk = json!({"choices": [{"index": 0, "delta": {"tool_calls": [call]}}]});
        body.push_str(&format!("data: {chunk}\n\n"));
    }
    body.push_str("data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n\n");
    body.push_str("data: [DONE]\n\n");
    body
}

#[test]
fn detection_and_validation() {
    assert!(looks_like_python_literal("{'a': 'b'}"));
    assert!(looks_like_python_literal("[{'content': 'x'"));
    assert!(!looks_like_python_literal(r#"{"a": "b"}"#));
    assert!(!looks_like_python_literal("it's plain prose"));
    assert!(is_valid_json(r#"{"a": 1}"#));
    assert!(!is_valid_json("   "));
    assert!(!is_valid_json("{'a': 1}"));
}

#[test]
fn valid_json_is_left_alone() {
    let repair = JsonRepair::default();
    let input = r#"{"todos": [{"content": "it's fine"}]}"#;
    let (out, fixed) = repair.fix(input);
    assert!(!fixed);
    assert_eq!(out, input);
}

#[test]
fn only_target_tools_are_repaired() {
    let repair = JsonRepair::new(JsonRepairConfig::default());
    let args = "{'todos': [{'content': 'a', 'status': 'pending'}]}";

    let untouched = repair.repair_tool_arguments("Bash", args);
    assert_eq!(untouched, args);

    let fixed = repair.repair_tool_arguments("TodoWrite", args);
    let value: Value = serde_json::from_str(&fixed).expect("repaired JSON");
    assert_eq!(value["todos"][0]["status"], "pending");
}

#[test]
fn streamed_todowrite_arguments_are_repaired_after_aggregation() {
    let converter = converter_with(JsonRepairConfig::default());
    let ctx = streaming_ctx(&converter);
    let body = todowrite_stream(&[
        "{'todos': [{'content': ",
        "'Write tests', 'status': 'in_progress', ",
        "'id': '1'}]}",
    ]);

    let out = converter
        .convert_response(body.as_bytes(), &ctx, true)
        .expect("convert stream");
    let args = tool_args_from_stream(&out);
    let value: Value = serde_json::from_str(&args).expect("emitted arguments are JSON");
    assert_eq!(
        value,
        json!({"todos": [{"content": "Write tests", "status": "in_progress", "id": "1"}]})
    );
}

#[test]
fn disabled_repair_drops_python_literal_arguments() {
    let converter = converter_with(JsonRepairConfig {
        enabled: false,
        ..JsonRepairConfig::default()
    });
    let ctx = streaming_ctx(&converter);
    let body = todowrite_stream(&["{'todos': [{'content': 'x', 'status': 'pending'}]}"]);

    let out = converter
        .convert_response(body.as_bytes(), &ctx, true)
        .expect("convert stream");
    let text = String::from_utf8(out.to_vec()).expect("utf-8");
    assert!(!text.contains("content_block_start"));
    assert!(text.contains("\"stop_reason\":\"tool_use\""));
}

#[test]
fn python_literal_non_streaming_body_is_repaired() {
    let converter = converter_with(JsonRepairConfig::default());
    let mut ctx = streaming_ctx(&converter);
    ctx.streaming = false;
    let body = "{'id': 'chatcmpl-p', 'model': 'm', 'choices': [{'index': 0, 'message': {'role': 'assistant', 'content': 'Hello'}, 'finish_reason': 'stop'}]}";

    let out = converter
        .convert_response(body.as_bytes(), &ctx, false)
        .expect("repaired response");
    let value: Value = serde_json::from_slice(&out).expect("JSON");
    assert_eq!(value["id"], "msg_chatcmpl-p");
    assert_eq!(value["content"][0]["text"], "Hello");
    assert_eq!(value["stop_reason"], "end_turn");
}
