pub mod cell_id;
pub mod config;
pub mod engine;
pub mod external_input;
pub mod host_layout;
pub mod protocol;
pub mod puzzle;
pub mod render_mode;
pub mod selection;
pub mod session;
pub mod sizing;
pub mod validate;

pub use cell_id::{CellId, CellIdError, CELL_ID_LEN};
pub use config::{BridgeConfig, HostConfig};
pub use engine::{CellPulse, EngineError, EngineEvent, EntryPoint, LegacyEngine};
pub use protocol::{AgentMsg, Envelope, ExternalInputMode, HostMsg, Message, ProtocolError};
pub use puzzle::{Direction, PuzzleLayout, PuzzleState, WordDescriptor};
pub use render_mode::RenderMode;
pub use session::{BridgeSession, SessionEffect};
pub use validate::{is_valid_origin, validate_message, ValidationError};
