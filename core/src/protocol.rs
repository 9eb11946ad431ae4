use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::cell_id::CellId;
use crate::puzzle::{progress_percent, Direction, WordDescriptor};
use crate::render_mode::RenderMode;
use crate::validate::{validate_message, ValidationError};

pub const AGENT_SOURCE: &str = "crossbridge-agent";
pub const HOST_SOURCE: &str = "crossbridge-host";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageSource {
    #[serde(rename = "crossbridge-agent")]
    Agent,
    #[serde(rename = "crossbridge-host")]
    Host,
}

impl MessageSource {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageSource::Agent => AGENT_SOURCE,
            MessageSource::Host => HOST_SOURCE,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            AGENT_SOURCE => Some(MessageSource::Agent),
            HOST_SOURCE => Some(MessageSource::Host),
            _ => None,
        }
    }
}

/// The wire shape shared by both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEnvelope {
    pub source: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub puzzle_id: Option<String>,
    #[serde(default)]
    pub timestamp: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<M> {
    pub source: MessageSource,
    pub message: M,
    pub puzzle_id: Option<String>,
    pub timestamp: f64,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("malformed {kind} message: {reason}")]
    Malformed { kind: String, reason: String },
    #[error("message encode failed: {0}")]
    Encode(String),
}

/// A closed set of message kinds flowing in one direction.
pub trait Message: Sized + Serialize + DeserializeOwned {
    /// Every kind this direction understands.
    const KINDS: &'static [&'static str];
    /// Kinds that carry no payload.
    const UNIT_KINDS: &'static [&'static str];
    /// The side that sends this direction.
    const SOURCE: MessageSource;

    fn kind(&self) -> &'static str;

    fn is_known_kind(kind: &str) -> bool {
        Self::KINDS.contains(&kind)
    }

    /// Decodes one known kind. Unknown kinds yield `Ok(None)`.
    fn from_parts(kind: &str, data: Value) -> Result<Option<Self>, ProtocolError> {
        if !Self::is_known_kind(kind) {
            return Ok(None);
        }
        let mut object = Map::new();
        object.insert("type".to_string(), Value::String(kind.to_string()));
        if !Self::UNIT_KINDS.contains(&kind) {
            let data = if data.is_null() {
                Value::Object(Map::new())
            } else {
                data
            };
            object.insert("data".to_string(), data);
        }
        serde_json::from_value(Value::Object(object))
            .map(Some)
            .map_err(|err| ProtocolError::Malformed {
                kind: kind.to_string(),
                reason: err.to_string(),
            })
    }

    fn data(&self) -> Result<Value, ProtocolError> {
        let value = serde_json::to_value(self).map_err(|err| ProtocolError::Encode(err.to_string()))?;
        Ok(match value {
            Value::Object(mut object) => object.remove("data").unwrap_or(Value::Null),
            _ => Value::Null,
        })
    }
}

pub fn encode_envelope<M: Message>(
    message: &M,
    puzzle_id: Option<&str>,
    timestamp: f64,
) -> Result<Value, ProtocolError> {
    let raw = RawEnvelope {
        source: M::SOURCE.as_str().to_string(),
        kind: message.kind().to_string(),
        data: message.data()?,
        puzzle_id: puzzle_id.map(str::to_string),
        timestamp,
    };
    serde_json::to_value(raw).map_err(|err| ProtocolError::Encode(err.to_string()))
}

/// Validates and decodes an inbound message sent by the peer of `M::SOURCE`.
///
/// `Ok(None)` means "ignore silently": the kind is unknown, or the message was
/// not sent by the expected side (including our own echoes).
pub fn decode_envelope<M: Message>(raw: &Value) -> Result<Option<Envelope<M>>, ProtocolError> {
    validate_message(raw)?;
    let source = raw
        .get("source")
        .and_then(Value::as_str)
        .and_then(MessageSource::parse);
    if source != Some(M::SOURCE) {
        return Ok(None);
    }
    let envelope: RawEnvelope =
        serde_json::from_value(raw.clone()).map_err(|err| ProtocolError::Malformed {
            kind: raw
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            reason: err.to_string(),
        })?;
    let Some(message) = M::from_parts(&envelope.kind, payload(raw))? else {
        return Ok(None);
    };
    Ok(Some(Envelope {
        source: M::SOURCE,
        message,
        puzzle_id: envelope.puzzle_id,
        timestamp: envelope.timestamp,
    }))
}

const ENVELOPE_KEYS: [&str; 5] = ["source", "type", "data", "puzzleId", "timestamp"];

/// Payload fields of a raw message: top-level fields overlaid with `data`, the
/// same places [`validate_message`] looks.
fn payload(raw: &Value) -> Value {
    let mut merged = Map::new();
    if let Some(object) = raw.as_object() {
        for (key, value) in object {
            if !ENVELOPE_KEYS.contains(&key.as_str()) {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    if let Some(data) = raw.get("data").and_then(Value::as_object) {
        for (key, value) in data {
            if value.is_null() && merged.contains_key(key) {
                continue;
            }
            merged.insert(key.clone(), value.clone());
        }
    }
    Value::Object(merged)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExternalInputMode {
    /// Native widget is hidden from view but keeps receiving values.
    #[default]
    Hidden,
    /// A floating input is placed over the active word's lead cell.
    Overlay,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "ProgressWire")]
pub struct ProgressData {
    pub grid_state: BTreeMap<CellId, String>,
    pub progress: u32,
    pub filled_cells: usize,
    pub total_cells: usize,
    pub hints_used: u32,
}

/// Inbound progress; counts arrive as `filledCells`/`totalCells` or as
/// `completed`/`total`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProgressWire {
    #[serde(default)]
    grid_state: BTreeMap<CellId, String>,
    #[serde(default)]
    progress: Option<u32>,
    #[serde(default)]
    filled_cells: Option<usize>,
    #[serde(default)]
    total_cells: Option<usize>,
    #[serde(default)]
    completed: Option<usize>,
    #[serde(default)]
    total: Option<usize>,
    #[serde(default)]
    hints_used: u32,
}

impl TryFrom<ProgressWire> for ProgressData {
    type Error = String;

    fn try_from(wire: ProgressWire) -> Result<Self, Self::Error> {
        let (filled_cells, total_cells) = match (wire.filled_cells, wire.total_cells) {
            (Some(filled), Some(total)) => (filled, total),
            _ => match (wire.completed, wire.total) {
                (Some(filled), Some(total)) => (filled, total),
                _ => return Err("progress needs filledCells/totalCells or completed/total".to_string()),
            },
        };
        Ok(Self {
            grid_state: wire.grid_state,
            progress: wire
                .progress
                .unwrap_or_else(|| progress_percent(filled_cells, total_cells)),
            filled_cells,
            total_cells,
            hints_used: wire.hints_used,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteData {
    pub completion_time: f64,
    pub score: u32,
    #[serde(default)]
    pub hints_used: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HintUsedData {
    #[serde(default)]
    pub word_index: Option<usize>,
    #[serde(default)]
    pub cell_id: Option<CellId>,
    pub hints_used: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordRevealedData {
    pub word_index: usize,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub hints_used: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LetterValidatedData {
    pub word_index: usize,
    #[serde(default)]
    pub position: usize,
    #[serde(default)]
    pub letter: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestHintData {
    pub word_index: usize,
    #[serde(default)]
    pub consecutive_errors: u32,
    #[serde(default)]
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordSelectedData {
    pub word_index: usize,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub clue: String,
    #[serde(default)]
    pub length: usize,
    #[serde(default)]
    pub current_fill: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridUpdatedData {
    pub grid_state: BTreeMap<CellId, String>,
    #[serde(default)]
    pub filled_cells: usize,
    #[serde(default)]
    pub total_cells: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IframeReadyData {
    pub width: u32,
    pub height: u32,
    pub words: Vec<WordDescriptor>,
    pub render_mode: RenderMode,
    pub multiplayer: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionsData {
    pub height: f64,
    #[serde(default)]
    pub width: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellUpdateData {
    pub cell_id: CellId,
    pub value: String,
}

/// Embedded document to host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum AgentMsg {
    #[serde(rename = "progress")]
    Progress(ProgressData),
    #[serde(rename = "complete")]
    Complete(CompleteData),
    #[serde(rename = "hint_used")]
    HintUsed(HintUsedData),
    #[serde(rename = "word_revealed")]
    WordRevealed(WordRevealedData),
    #[serde(rename = "letter_validated")]
    LetterValidated(LetterValidatedData),
    #[serde(rename = "suggest_hint")]
    SuggestHint(SuggestHintData),
    #[serde(rename = "word_selected")]
    WordSelected(WordSelectedData),
    #[serde(rename = "grid_updated")]
    GridUpdated(GridUpdatedData),
    #[serde(rename = "iframe_ready")]
    IframeReady(IframeReadyData),
    #[serde(rename = "dimensions")]
    Dimensions(DimensionsData),
    #[serde(rename = "cell_update")]
    CellUpdate(CellUpdateData),
}

impl Message for AgentMsg {
    const KINDS: &'static [&'static str] = &[
        "progress",
        "complete",
        "hint_used",
        "word_revealed",
        "letter_validated",
        "suggest_hint",
        "word_selected",
        "grid_updated",
        "iframe_ready",
        "dimensions",
        "cell_update",
    ];
    const UNIT_KINDS: &'static [&'static str] = &[];
    const SOURCE: MessageSource = MessageSource::Agent;

    fn kind(&self) -> &'static str {
        match self {
            AgentMsg::Progress(_) => "progress",
            AgentMsg::Complete(_) => "complete",
            AgentMsg::HintUsed(_) => "hint_used",
            AgentMsg::WordRevealed(_) => "word_revealed",
            AgentMsg::LetterValidated(_) => "letter_validated",
            AgentMsg::SuggestHint(_) => "suggest_hint",
            AgentMsg::WordSelected(_) => "word_selected",
            AgentMsg::GridUpdated(_) => "grid_updated",
            AgentMsg::IframeReady(_) => "iframe_ready",
            AgentMsg::Dimensions(_) => "dimensions",
            AgentMsg::CellUpdate(_) => "cell_update",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadStateData {
    pub grid_state: BTreeMap<CellId, String>,
    #[serde(default)]
    pub hints_used: Option<u32>,
    #[serde(default)]
    pub start_time: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnableExternalInputData {
    #[serde(default)]
    pub mode: ExternalInputMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyInputData {
    pub value: String,
    #[serde(default)]
    pub word_index: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealData {
    #[serde(default)]
    pub word_index: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetMultiplayerData {
    pub enabled: bool,
}

/// Host to embedded document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum HostMsg {
    #[serde(rename = "GET_STATE")]
    GetState,
    #[serde(rename = "LOAD_STATE")]
    LoadState(LoadStateData),
    #[serde(rename = "enable_external_input")]
    EnableExternalInput(EnableExternalInputData),
    #[serde(rename = "apply_input")]
    ApplyInput(ApplyInputData),
    #[serde(rename = "clear_word")]
    ClearWord,
    #[serde(rename = "backspace")]
    Backspace,
    #[serde(rename = "disable_external_input")]
    DisableExternalInput,
    #[serde(rename = "check_puzzle")]
    CheckPuzzle,
    #[serde(rename = "reveal_letter")]
    RevealLetter(RevealData),
    #[serde(rename = "reveal_word")]
    RevealWord(RevealData),
    #[serde(rename = "apply_cell_update")]
    ApplyCellUpdate(CellUpdateData),
    #[serde(rename = "set_multiplayer")]
    SetMultiplayer(SetMultiplayerData),
}

impl Message for HostMsg {
    const KINDS: &'static [&'static str] = &[
        "GET_STATE",
        "LOAD_STATE",
        "enable_external_input",
        "apply_input",
        "clear_word",
        "backspace",
        "disable_external_input",
        "check_puzzle",
        "reveal_letter",
        "reveal_word",
        "apply_cell_update",
        "set_multiplayer",
    ];
    const UNIT_KINDS: &'static [&'static str] = &[
        "GET_STATE",
        "clear_word",
        "backspace",
        "disable_external_input",
        "check_puzzle",
    ];
    const SOURCE: MessageSource = MessageSource::Host;

    fn kind(&self) -> &'static str {
        match self {
            HostMsg::GetState => "GET_STATE",
            HostMsg::LoadState(_) => "LOAD_STATE",
            HostMsg::EnableExternalInput(_) => "enable_external_input",
            HostMsg::ApplyInput(_) => "apply_input",
            HostMsg::ClearWord => "clear_word",
            HostMsg::Backspace => "backspace",
            HostMsg::DisableExternalInput => "disable_external_input",
            HostMsg::CheckPuzzle => "check_puzzle",
            HostMsg::RevealLetter(_) => "reveal_letter",
            HostMsg::RevealWord(_) => "reveal_word",
            HostMsg::ApplyCellUpdate(_) => "apply_cell_update",
            HostMsg::SetMultiplayer(_) => "set_multiplayer",
        }
    }
}
