//! External encoder integration - command construction and process supervision

mod command;
mod supervisor;

pub use command::{build_command, EncoderCommand, StreamRequest};
pub use supervisor::{EncoderError, EncoderEvent, EncoderOutcome, EncoderSupervisor};
