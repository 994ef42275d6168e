use std::process::ExitCode;

use crate::Error;

pub fn exit_code(err: &Error) -> ExitCode {
    match err {
        Error::InvalidName { .. } => ExitCode::from(64),
        Error::ParseConfig { .. } => ExitCode::from(65),
        Error::InvalidConfig { .. } => ExitCode::from(65),
        Error::ExplicitConfigMissing { .. } => ExitCode::from(66),
        Error::Unsupported { .. } => ExitCode::from(69),
        Error::ExecutionFailure { .. } => ExitCode::from(70),
        Error::RenderJson { .. } => ExitCode::from(70),
        Error::NameConflict { .. } => ExitCode::from(73),
        Error::ReadConfig { .. } => ExitCode::from(74),
        Error::OperationCancelled { .. } => ExitCode::from(130),
    }
}
