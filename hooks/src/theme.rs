use payloads::responses::Theme;

use crate::preferences::{PreferenceStore, THEME_KEY, load_or, save};

/// The stored theme choice; [`Theme::System`] when nothing is stored.
pub fn stored_theme(store: &dyn PreferenceStore) -> Theme {
    load_or(store, THEME_KEY, Theme::System)
}

/// Store a theme preference. Choosing the system default clears it.
pub fn store_theme(
    store: &dyn PreferenceStore,
    theme: Theme,
) -> anyhow::Result<()> {
    match theme {
        Theme::System => store.remove(THEME_KEY),
        theme => save(store, THEME_KEY, &theme),
    }
}

/// Resolve [`Theme::System`] to light or dark.
pub fn resolve_effective_theme(
    theme: Theme,
    system_prefers_dark: bool,
) -> Theme {
    match theme {
        Theme::System if system_prefers_dark => Theme::Dark,
        Theme::System => Theme::Light,
        theme => theme,
    }
}

/// The theme a toggle switches to from the effective theme.
pub fn toggled(effective: Theme) -> Theme {
    match effective {
        Theme::Light => Theme::Dark,
        Theme::Dark => Theme::Light,
        Theme::System => Theme::Dark,
    }
}
