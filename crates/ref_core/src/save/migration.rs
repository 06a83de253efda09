use super::error::SaveError;
use super::format::HistoryFile;
use super::HISTORY_VERSION;
use crate::completed::SCHEMA_VERSION;

/// Migrate history data from older versions to the current version
pub fn migrate_history(mut history: HistoryFile) -> Result<HistoryFile, SaveError> {
    let original_version = history.version;

    history = match history.version {
        0 => migrate_v0_to_v1(history)?,
        1 => history,
        v if v > HISTORY_VERSION => {
            log::warn!("Loading history from future version {} (current: {})", v, HISTORY_VERSION);
            history
        }
        _ => {
            return Err(SaveError::VersionMismatch {
                found: history.version,
                expected: HISTORY_VERSION,
            });
        }
    };

    history.version = HISTORY_VERSION;

    if original_version != HISTORY_VERSION {
        history.update_timestamp();
        log::info!("Migrated history from version {} to {}", original_version, HISTORY_VERSION);
    }

    Ok(history)
}

/// Version 0 files were unsorted, could hold the same match twice and
/// predate per-record schema versions.
fn migrate_v0_to_v1(mut history: HistoryFile) -> Result<HistoryFile, SaveError> {
    log::info!("Migrating history from version 0 to 1");

    for record in history.matches.iter_mut() {
        if record.schema_version == 0 {
            record.schema_version = SCHEMA_VERSION;
        }
    }

    history.sort();
    let before = history.matches.len();
    let mut seen = std::collections::HashSet::new();
    history.matches.retain(|m| seen.insert(m.id));
    if history.matches.len() != before {
        log::warn!("Dropped {} duplicate completed matches", before - history.matches.len());
    }

    Ok(history)
}

pub fn needs_migration(history: &HistoryFile) -> bool {
    history.version < HISTORY_VERSION
}
