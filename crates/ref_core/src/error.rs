use thiserror::Error;
use uuid::Uuid;

use crate::save::SaveError;

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("Invalid match configuration: {0}")]
    InvalidConfiguration(#[from] validator::ValidationErrors),

    #[error("Event '{kind}' requires a team side")]
    MissingTeam { kind: &'static str },

    #[error("Event '{kind}' is recorded by the match flow, not directly")]
    ReservedEvent { kind: &'static str },

    #[error("No match in progress ({phase})")]
    MatchNotActive { phase: crate::lifecycle::LifecyclePhase },

    #[error("Event not found: {0}")]
    EventNotFound(Uuid),

    #[error("Persistence error: {0}")]
    Persistence(#[from] SaveError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings parse error: {0}")]
    SettingsParse(#[from] serde_yaml::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for MatchError {
    fn from(err: serde_json::Error) -> Self {
        MatchError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MatchError>;
