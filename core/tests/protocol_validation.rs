use crossbridge_core::protocol::{
    decode_envelope, encode_envelope, ApplyInputData, CompleteData, ProgressData, AGENT_SOURCE,
    HOST_SOURCE,
};
use crossbridge_core::{
    is_valid_origin, validate_message, AgentMsg, CellId, HostMsg, ProtocolError, ValidationError,
};
use serde_json::json;

const OWN: &str = "https://puzzles.example";

#[test]
fn progress_accepts_either_count_pair() {
    assert!(validate_message(&json!({"type": "progress", "completed": 10, "total": 100})).is_ok());
    assert!(validate_message(&json!({
        "type": "progress",
        "data": {"filledCells": 3, "totalCells": 9}
    }))
    .is_ok());
}

#[test]
fn progress_without_counts_names_missing_fields() {
    let err = validate_message(&json!({"type": "progress"})).unwrap_err();
    assert_eq!(err.code(), "missing_fields");
    let ValidationError::MissingFields { kind, fields } = err else {
        panic!("unexpected error kind");
    };
    assert_eq!(kind, "progress");
    assert_eq!(fields, vec!["completed", "total"]);
}

#[test]
fn structural_failures_have_codes() {
    assert_eq!(
        validate_message(&json!("progress")).unwrap_err().code(),
        "not_an_object"
    );
    assert_eq!(
        validate_message(&json!({"type": 7})).unwrap_err().code(),
        "missing_type"
    );
    assert!(validate_message(&json!({"type": "something_new"})).is_ok());
}

#[test]
fn origin_allowlist() {
    assert!(is_valid_origin(OWN, OWN, &[] as &[&str]));
    assert!(!is_valid_origin(
        "https://evil.com",
        OWN,
        &["https://good.com"]
    ));
    assert!(is_valid_origin("https://good.com", OWN, &["https://good.com"]));
    assert!(is_valid_origin("https://any.where", OWN, &["*".to_string()]));
    assert!(!is_valid_origin("", "", &[] as &[&str]));
}

#[test]
fn agent_messages_carry_envelope_fields() {
    let message = AgentMsg::Complete(CompleteData {
        completion_time: 1234.0,
        score: 1450,
        hints_used: 1,
    });
    let raw = encode_envelope(&message, Some("daily-42"), 99.0).unwrap();
    assert_eq!(raw["source"], AGENT_SOURCE);
    assert_eq!(raw["type"], "complete");
    assert_eq!(raw["puzzleId"], "daily-42");
    assert_eq!(raw["data"]["completionTime"], 1234.0);
    assert_eq!(raw["data"]["hintsUsed"], 1);
    assert!(validate_message(&raw).is_ok());

    let decoded = decode_envelope::<AgentMsg>(&raw).unwrap().unwrap();
    assert_eq!(decoded.message, message);
    assert_eq!(decoded.puzzle_id.as_deref(), Some("daily-42"));
}

#[test]
fn progress_grid_state_uses_cell_ids() {
    let mut data = ProgressData {
        grid_state: Default::default(),
        progress: 50,
        filled_cells: 1,
        total_cells: 2,
        hints_used: 0,
    };
    data.grid_state
        .insert(CellId::new(4, 12).unwrap(), "Q".to_string());
    let raw = encode_envelope(&AgentMsg::Progress(data), None, 0.0).unwrap();
    assert_eq!(raw["data"]["gridState"]["c004012"], "Q");
}

#[test]
fn host_unit_commands_decode_without_data() {
    let raw = json!({"source": HOST_SOURCE, "type": "GET_STATE", "timestamp": 1.0});
    let decoded = decode_envelope::<HostMsg>(&raw).unwrap().unwrap();
    assert_eq!(decoded.message, HostMsg::GetState);

    let raw = json!({"source": HOST_SOURCE, "type": "reveal_word", "data": null});
    let decoded = decode_envelope::<HostMsg>(&raw).unwrap().unwrap();
    assert_eq!(decoded.message, HostMsg::RevealWord(Default::default()));
}

#[test]
fn host_apply_input_round_trip() {
    let message = HostMsg::ApplyInput(ApplyInputData {
        value: "CA".to_string(),
        word_index: Some(2),
    });
    let raw = encode_envelope(&message, None, 5.0).unwrap();
    assert_eq!(raw["source"], HOST_SOURCE);
    assert_eq!(raw["data"]["wordIndex"], 2);
    let decoded = decode_envelope::<HostMsg>(&raw).unwrap().unwrap();
    assert_eq!(decoded.message, message);
}

#[test]
fn receivers_ignore_unknown_kinds_and_echoes() {
    let unknown = json!({"source": HOST_SOURCE, "type": "dance", "data": {}});
    assert!(decode_envelope::<HostMsg>(&unknown).unwrap().is_none());

    let echo = json!({"source": AGENT_SOURCE, "type": "GET_STATE"});
    assert!(decode_envelope::<HostMsg>(&echo).unwrap().is_none());

    let foreign = json!({"source": "someone-else", "type": "progress", "completed": 1, "total": 2});
    assert!(decode_envelope::<AgentMsg>(&foreign).unwrap().is_none());
}

#[test]
fn malformed_known_kinds_are_rejected() {
    let missing = json!({"source": HOST_SOURCE, "type": "apply_input", "data": {}});
    assert!(matches!(
        decode_envelope::<HostMsg>(&missing),
        Err(ProtocolError::Invalid(_))
    ));

    let bad_cell = json!({
        "source": HOST_SOURCE,
        "type": "apply_cell_update",
        "data": {"cellId": "x12", "value": "A"}
    });
    assert!(matches!(
        decode_envelope::<HostMsg>(&bad_cell),
        Err(ProtocolError::Malformed { .. })
    ));
}

#[test]
fn minimal_valid_messages_decode() {
    let agent = [
        json!({"type": "progress", "completed": 10, "total": 100}),
        json!({"type": "progress", "data": {"filledCells": 3, "totalCells": 9}}),
        json!({"type": "complete", "data": {"completionTime": 61.5, "score": 900}}),
        json!({"type": "hint_used", "hintsUsed": 2}),
        json!({"type": "word_revealed", "data": {"wordIndex": 4}}),
        json!({"type": "letter_validated", "data": {"wordIndex": 1, "isCorrect": false}}),
        json!({"type": "suggest_hint", "wordIndex": 3}),
        json!({"type": "word_selected", "data": {"wordIndex": 0}}),
        json!({"type": "grid_updated", "data": {"gridState": {}}}),
        json!({"type": "iframe_ready"}),
        json!({"type": "dimensions", "height": 480}),
        json!({"type": "cell_update", "data": {"cellId": "c001002", "value": "Q"}}),
    ];
    for mut raw in agent {
        raw["source"] = json!(AGENT_SOURCE);
        assert!(validate_message(&raw).is_ok(), "{raw}");
        let decoded = decode_envelope::<AgentMsg>(&raw);
        assert!(matches!(decoded, Ok(Some(_))), "{raw}: {decoded:?}");
    }

    let host = [
        json!({"type": "LOAD_STATE", "gridState": {"c000000": "A"}}),
        json!({"type": "enable_external_input"}),
        json!({"type": "apply_input", "value": "CAT"}),
        json!({"type": "reveal_letter"}),
        json!({"type": "reveal_word", "data": {}}),
        json!({"type": "apply_cell_update", "cellId": "c000000", "value": ""}),
        json!({"type": "set_multiplayer", "data": {"enabled": true}}),
    ];
    for mut raw in host {
        raw["source"] = json!(HOST_SOURCE);
        assert!(validate_message(&raw).is_ok(), "{raw}");
        let decoded = decode_envelope::<HostMsg>(&raw);
        assert!(matches!(decoded, Ok(Some(_))), "{raw}: {decoded:?}");
    }
}

#[test]
fn progress_completed_total_fills_counts() {
    let raw = json!({
        "source": AGENT_SOURCE,
        "type": "progress",
        "completed": 10,
        "total": 100
    });
    let envelope = decode_envelope::<AgentMsg>(&raw).unwrap().unwrap();
    let AgentMsg::Progress(data) = envelope.message else {
        panic!("expected progress");
    };
    assert_eq!(data.filled_cells, 10);
    assert_eq!(data.total_cells, 100);
    assert_eq!(data.progress, 10);
    assert!(data.grid_state.is_empty());
}
