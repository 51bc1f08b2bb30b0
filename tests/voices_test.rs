//! Integration test: persisted voice preferences applied at pick time

use spelldrill::config::Config;
use spelldrill::speech::{Voice, VoiceCatalog};
use std::time::SystemTime;

fn voice(id: &str, name: &str, lang: &str) -> Voice {
    Voice {
        id: id.to_string(),
        name: name.to_string(),
        language: lang.to_string(),
        is_local: true,
        is_default: false,
    }
}

#[test]
fn test_persisted_preference_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let cfg_path = dir.path().join("spelldrill.cfg");

    // The settings flow records a preference and saves
    {
        let mut config = Config::load_from(cfg_path.clone()).unwrap();
        config.set_voice_override("en", "fred");
        config.save().unwrap();
    }

    // A fresh process reads it back and the catalog honors it over the
    // ranked pick
    let config = Config::load_from(cfg_path).unwrap();
    let mut catalog = VoiceCatalog::new(None);
    catalog.install(
        vec![
            voice("ava", "Ava Enhanced", "en-US"),
            voice("fred", "Fred", "en-US"),
        ],
        Some(SystemTime::now()),
    );

    let outcome = catalog.pick_with_override("en-US", config.voice_override("en"));
    assert_eq!(outcome.voice.unwrap().id, "fred");
    assert!(!outcome.override_missing);

    // The preferred voice disappearing falls back to the ranked pick and
    // reports the miss
    catalog.install(vec![voice("ava", "Ava Enhanced", "en-US")], Some(SystemTime::now()));
    let outcome = catalog.pick_with_override("en-US", config.voice_override("en"));
    assert_eq!(outcome.voice.unwrap().id, "ava");
    assert!(outcome.override_missing);
}
