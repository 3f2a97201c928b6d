use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use regex::Regex;
use serde::Deserialize;
use tracing::warn;

use crate::{
    calendar::BotTimezone, domain::Restaurant, errors::Error, truncation::TruncationPolicy,
    Result,
};

/// Typed process configuration: env vars plus the JSON settings file.
#[derive(Clone, Debug)]
pub struct Config {
    // Transport
    pub telegram_bot_token: String,

    // Files
    pub settings_file: PathBuf,
    /// `None` keeps ledgers in memory only.
    pub store_file: Option<PathBuf>,

    // Upstream
    pub fetch_timeout: Duration,
    pub source_deadline: Duration,

    // Truncation
    pub truncation_policy: TruncationPolicy,
    pub sweep_interval: Duration,

    pub settings: Settings,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let settings_file = env_path("LOUNAS_CONFIG").unwrap_or_else(|| PathBuf::from("config.json"));
        let settings = Settings::load(&settings_file)?;

        let store_file = if settings.no_db {
            warn!("Vote ledger persistence is disabled by debug config");
            None
        } else {
            Some(
                env_path("LOUNAS_STORE_FILE")
                    .unwrap_or_else(|| PathBuf::from("/tmp/lounas-ledger.json")),
            )
        };

        let fetch_timeout =
            Duration::from_millis(env_u64("LOUNAS_FETCH_TIMEOUT_MS").unwrap_or(8_000));
        let source_deadline =
            Duration::from_millis(env_u64("LOUNAS_SOURCE_DEADLINE_MS").unwrap_or(20_000));

        let truncation_policy = if env_bool("LOUNAS_TRUNCATE_AT_MIDNIGHT").unwrap_or(false) {
            TruncationPolicy::AtMidnight
        } else {
            let minutes = env_u64("LOUNAS_TRUNCATE_AFTER_MINUTES").unwrap_or(6 * 60);
            TruncationPolicy::After(Duration::from_secs(minutes * 60))
        };
        let sweep_interval =
            Duration::from_secs(env_u64("LOUNAS_SWEEP_INTERVAL_SECS").unwrap_or(300).max(1));

        Ok(Self {
            telegram_bot_token,
            settings_file,
            store_file,
            fetch_timeout,
            source_deadline,
            truncation_policy,
            sweep_interval,
            settings,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataProvider {
    RuokapaikkaFi,
    Mock,
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

/// Validated bot settings (venues, policy flags, text rules).
#[derive(Clone, Debug)]
pub struct Settings {
    pub instance_id: String,
    pub lat_lon: LatLon,
    pub data_provider: DataProvider,
    pub default_restaurants: Vec<Restaurant>,
    pub additional_restaurants: Vec<Restaurant>,
    pub restaurant_display_names: HashMap<Restaurant, String>,
    pub custom_error_messages: HashMap<Restaurant, String>,
    pub git_url: Option<String>,
    pub display_voters: bool,
    pub icons_enabled: bool,
    pub override_icons_url: Option<String>,
    pub announcements: Vec<String>,
    pub admin_users: Vec<i64>,
    /// First matching rule wins.
    pub emoji_rules: Vec<(Regex, String)>,
    pub strip_rules: Vec<Regex>,
    pub open_meteo_url: Option<String>,
    pub limit_to_one_vote_per_user: bool,
    /// Empty means every chat is served.
    pub subscribed_chats: Vec<i64>,
    pub trigger: Regex,
    pub tomorrow_trigger: Regex,
    pub prefetch_cron: String,
    pub cache_sweep_cron: String,
    /// Date keys, cron jobs and midnight truncation all run in this zone.
    pub timezone: BotTimezone,
    pub no_db: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSettings {
    instance_id: Option<String>,
    lat_lon: Option<LatLon>,
    data_provider: Option<String>,
    default_restaurants: Option<Vec<String>>,
    #[serde(default)]
    additional_restaurants: Vec<String>,
    #[serde(default)]
    restaurant_display_names: Vec<(String, String)>,
    #[serde(default)]
    custom_error_messages: Vec<(String, String)>,
    git_url: Option<String>,
    #[serde(default)]
    display_voters: bool,
    #[serde(default)]
    icons_enabled: bool,
    override_icons_url: Option<String>,
    #[serde(default)]
    announcements: Vec<String>,
    #[serde(default)]
    admin_users: Vec<i64>,
    #[serde(default)]
    emoji_rules: Vec<(String, String)>,
    #[serde(default)]
    strip_rules: Vec<String>,
    #[serde(rename = "openMeteoURL", alias = "openMeteoUrl")]
    open_meteo_url: Option<String>,
    #[serde(default)]
    limit_to_one_vote_per_user: bool,
    #[serde(default)]
    subscribed_channels: Vec<i64>,
    trigger: Option<String>,
    prefetch_cron: Option<String>,
    cache_sweep_cron: Option<String>,
    utc_offset_minutes: Option<i32>,
    /// Only read together with `utcOffsetMinutes`.
    eu_summer_time: Option<bool>,
    #[serde(default)]
    debug: RawDebug,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDebug {
    #[serde(default)]
    no_db: bool,
}

const DEFAULT_TRIGGER: &str = r"(?i)!(lounas|ruokaa|nälkä)";
const TOMORROW_TRIGGER: &str = r"(?i)huomenna|tomorrow";

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let txt = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read settings {}: {e}", path.display()))
        })?;
        Self::from_json_str(&txt)
    }

    pub fn from_json_str(txt: &str) -> Result<Self> {
        let raw: RawSettings = serde_json::from_str(txt)
            .map_err(|e| Error::Config(format!("invalid settings json: {e}")))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawSettings) -> Result<Self> {
        let instance_id = raw
            .instance_id
            .and_then(non_empty)
            .ok_or_else(|| required("instanceId"))?;
        let lat_lon = raw.lat_lon.ok_or_else(|| required("latLon"))?;

        let data_provider = match raw.data_provider.as_deref() {
            Some("ruokapaikkaFi") => DataProvider::RuokapaikkaFi,
            Some("mock") => DataProvider::Mock,
            Some(other) => {
                return Err(Error::Config(format!("Unknown data provider {other}")));
            }
            None => return Err(required("dataProvider")),
        };

        let default_restaurants = parse_restaurants(
            &raw.default_restaurants
                .ok_or_else(|| required("defaultRestaurants"))?,
        );
        let additional_restaurants = parse_restaurants(&raw.additional_restaurants)
            .into_iter()
            .filter(|r| !default_restaurants.contains(r))
            .collect();

        let restaurant_display_names = parse_restaurant_map(raw.restaurant_display_names);
        let custom_error_messages = parse_restaurant_map(raw.custom_error_messages);

        let emoji_rules = raw
            .emoji_rules
            .into_iter()
            .map(|(pattern, emoji)| Ok((case_insensitive(&pattern)?, emoji)))
            .collect::<Result<Vec<_>>>()?;
        let strip_rules = raw
            .strip_rules
            .iter()
            .filter(|s| !s.trim().is_empty())
            .map(|s| case_insensitive(s))
            .collect::<Result<Vec<_>>>()?;

        let trigger = match raw.trigger.and_then(non_empty) {
            Some(p) => case_insensitive(&p)?,
            None => compile(DEFAULT_TRIGGER)?,
        };

        let timezone = match raw.utc_offset_minutes {
            Some(minutes) => {
                BotTimezone::from_minutes(minutes, raw.eu_summer_time.unwrap_or(false))
                    .ok_or_else(|| {
                        Error::Config(format!("utcOffsetMinutes {minutes} is out of range"))
                    })?
            }
            None => BotTimezone::helsinki(),
        };

        if raw.debug.no_db {
            warn!("Current configuration has debug options");
        }

        Ok(Self {
            instance_id,
            lat_lon,
            data_provider,
            default_restaurants,
            additional_restaurants,
            restaurant_display_names,
            custom_error_messages,
            git_url: raw.git_url.and_then(non_empty),
            display_voters: raw.display_voters,
            icons_enabled: raw.icons_enabled,
            override_icons_url: raw.override_icons_url.and_then(non_empty),
            announcements: raw.announcements.into_iter().filter_map(non_empty).collect(),
            admin_users: raw.admin_users,
            emoji_rules,
            strip_rules,
            open_meteo_url: raw.open_meteo_url.and_then(non_empty),
            limit_to_one_vote_per_user: raw.limit_to_one_vote_per_user,
            subscribed_chats: raw.subscribed_channels,
            trigger,
            tomorrow_trigger: compile(TOMORROW_TRIGGER)?,
            prefetch_cron: raw
                .prefetch_cron
                .and_then(non_empty)
                .unwrap_or_else(|| "30 10 * * 1-5".to_string()),
            cache_sweep_cron: raw
                .cache_sweep_cron
                .and_then(non_empty)
                .unwrap_or_else(|| "0 0 * * *".to_string()),
            timezone,
            no_db: raw.debug.no_db,
        })
    }

    pub fn accepts_chat(&self, chat_id: i64) -> bool {
        self.subscribed_chats.is_empty() || self.subscribed_chats.contains(&chat_id)
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_users.is_empty() || self.admin_users.contains(&user_id)
    }
}

fn required(name: &str) -> Error {
    Error::Config(format!("Parameter {name} is required"))
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::Config(format!("invalid regex {pattern:?}: {e}")))
}

fn case_insensitive(pattern: &str) -> Result<Regex> {
    compile(&format!("(?i){pattern}"))
}

fn parse_restaurants(keys: &[String]) -> Vec<Restaurant> {
    let mut out = Vec::new();
    for key in keys {
        match key.parse::<Restaurant>() {
            Ok(r) if !out.contains(&r) => out.push(r),
            Ok(_) => {}
            Err(_) => warn!("Ignoring unknown restaurant {key:?} in settings"),
        }
    }
    out
}

fn parse_restaurant_map(pairs: Vec<(String, String)>) -> HashMap<Restaurant, String> {
    pairs
        .into_iter()
        .filter_map(|(k, v)| match k.parse::<Restaurant>() {
            Ok(r) => Some((r, v)),
            Err(_) => {
                warn!("Ignoring unknown restaurant {k:?} in settings");
                None
            }
        })
        .collect()
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key).map(PathBuf::from)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "instanceId": "test",
        "latLon": {"lat": 61.68, "lon": 27.27},
        "dataProvider": "ruokapaikkaFi",
        "defaultRestaurants": ["savo", "talli", "nope", "savo"]
    }"#;

    #[test]
    fn minimal_settings_get_defaults() {
        let s = Settings::from_json_str(MINIMAL).unwrap();
        assert_eq!(s.instance_id, "test");
        assert_eq!(s.data_provider, DataProvider::RuokapaikkaFi);
        assert_eq!(
            s.default_restaurants,
            vec![Restaurant::Savo, Restaurant::Talli]
        );
        assert!(s.additional_restaurants.is_empty());
        assert!(!s.limit_to_one_vote_per_user);
        assert_eq!(s.prefetch_cron, "30 10 * * 1-5");
        assert!(s.trigger.is_match("Onko !LOUNAS jo?"));
        assert!(s.trigger.is_match("!nälkä"));
        assert!(!s.trigger.is_match("lounas"));
        assert!(s.tomorrow_trigger.is_match("!lounas huomenna"));
        assert!(s.accepts_chat(42));
        assert_eq!(s.timezone, BotTimezone::helsinki());
    }

    #[test]
    fn timezone_comes_from_settings() {
        let s = Settings::from_json_str(
            r#"{
                "instanceId": "t",
                "latLon": {"lat": 1, "lon": 2},
                "dataProvider": "mock",
                "defaultRestaurants": ["savo"],
                "utcOffsetMinutes": 60
            }"#,
        )
        .unwrap();
        assert_eq!(s.timezone, BotTimezone::from_minutes(60, false).unwrap());

        let err = Settings::from_json_str(
            r#"{"instanceId":"t","latLon":{"lat":1,"lon":2},"dataProvider":"mock","defaultRestaurants":[],"utcOffsetMinutes":100000}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("utcOffsetMinutes")));
    }

    #[test]
    fn missing_required_setting_is_config_error() {
        let err = Settings::from_json_str(r#"{"instanceId":"x"}"#).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("latLon")));

        let err = Settings::from_json_str(
            r#"{"instanceId":"x","latLon":{"lat":1,"lon":2},"dataProvider":"other","defaultRestaurants":[]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("Unknown data provider")));
    }

    #[test]
    fn rules_and_maps_are_parsed() {
        let s = Settings::from_json_str(
            r#"{
                "instanceId": "t",
                "latLon": {"lat": 1, "lon": 2},
                "dataProvider": "mock",
                "defaultRestaurants": ["savo"],
                "additionalRestaurants": ["august", "savo"],
                "restaurantDisplayNames": [["savo", "Savo"], ["bogus", "x"]],
                "emojiRules": [["kana|broiler", "🐔"]],
                "stripRules": ["^lounas klo", ""],
                "openMeteoURL": "https://api.open-meteo.com/v1/forecast",
                "limitToOneVotePerUser": true,
                "subscribedChannels": [-100],
                "debug": {"noDb": true}
            }"#,
        )
        .unwrap();
        assert_eq!(s.additional_restaurants, vec![Restaurant::August]);
        assert_eq!(s.restaurant_display_names.len(), 1);
        assert!(s.emoji_rules[0].0.is_match("BROILERIA"));
        assert_eq!(s.strip_rules.len(), 1);
        assert!(s.strip_rules[0].is_match("Lounas klo 11"));
        assert!(s.open_meteo_url.is_some());
        assert!(s.limit_to_one_vote_per_user);
        assert!(s.no_db);
        assert!(s.accepts_chat(-100));
        assert!(!s.accepts_chat(1));
    }

    #[test]
    fn invalid_regex_is_rejected() {
        let err = Settings::from_json_str(
            r#"{"instanceId":"x","latLon":{"lat":1,"lon":2},"dataProvider":"mock","defaultRestaurants":[],"stripRules":["("]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
