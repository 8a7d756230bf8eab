pub mod machine;
pub mod scheme;
pub mod sink;

pub use machine::{spawn_input_worker, InputStateMachine, PoseAction, PulseTimings};
pub use scheme::{Key, KeyMappingScheme, KeyRole, SchemeError, SchemeRegistry};
pub use sink::{KeyEvent, KeySink, LogKeySink, OscKeySink, RecordingSink};
