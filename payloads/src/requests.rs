use crate::Period;
use crate::responses::Preferences;
use serde::{Deserialize, Serialize};

/// Query parameters for the period-scoped chart endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartQuery {
    pub period: Period,
}

/// Body of a preferences update; the whole preference set is replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePreferences {
    pub preferences: Preferences,
}
