use crate::{NativeBookId, ProfileId};

/// Per-book, per-profile reading state.
///
/// Flags are stored by the device as `"0"`/`"1"`. A flag column that was never
/// written reads as `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub book_id: NativeBookId,
    pub profile_id: ProfileId,
    pub completed: Option<bool>,
    pub completed_ts: Option<i64>,
    pub favorite: Option<bool>,
    pub favorite_ts: Option<i64>,
    pub position: Option<String>,
    pub position_ts: Option<i64>,
}

#[derive(sqlx::FromRow)]
pub(crate) struct SettingsRow {
    bookid: i64,
    profileid: i64,
    completed: Option<String>,
    completed_ts: Option<i64>,
    favorite: Option<String>,
    favorite_ts: Option<i64>,
    position: Option<String>,
    position_ts: Option<i64>,
}
impl From<SettingsRow> for Settings {
    fn from(row: SettingsRow) -> Self {
        Self {
            book_id: row.bookid,
            profile_id: row.profileid,
            completed: row.completed.as_deref().map(flag),
            completed_ts: row.completed_ts,
            favorite: row.favorite.as_deref().map(flag),
            favorite_ts: row.favorite_ts,
            position: row.position.filter(|p| !p.is_empty()),
            position_ts: row.position_ts,
        }
    }
}

fn flag(value: &str) -> bool {
    value.trim() == "1"
}

/// Encode a flag the way the device stores it.
pub(crate) fn encode_flag(value: bool) -> i64 {
    i64::from(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_to_model() {
        let row = SettingsRow {
            bookid: 7,
            profileid: 1,
            completed: Some("1".to_string()),
            completed_ts: Some(1_700_000_000),
            favorite: Some("0".to_string()),
            favorite_ts: None,
            position: Some(String::new()),
            position_ts: None,
        };
        let settings = Settings::from(row);
        assert_eq!(settings.completed, Some(true));
        assert_eq!(settings.favorite, Some(false));
        // Empty positions are the same as no position.
        assert!(settings.position.is_none());
    }
}
