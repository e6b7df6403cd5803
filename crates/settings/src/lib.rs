pub mod preferences;
pub mod toggle;

pub use preferences::{
    ImportWatcherPreferences, Preferences, PreferencesError, PreferencesStore, PREFERENCES_VERSION,
};
pub use toggle::{FeatureToggle, ListenerId};
