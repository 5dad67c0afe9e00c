use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

const BUILTIN_DICTIONARY: &str = include_str!("../assets/locales.toml");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Fr,
    Ar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ltr,
    Rtl,
}

impl Locale {
    pub const ALL: [Locale; 3] = [Locale::En, Locale::Fr, Locale::Ar];

    pub fn code(self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Fr => "fr",
            Locale::Ar => "ar",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|locale| locale.code().eq_ignore_ascii_case(code.trim()))
    }

    /// Map a system language tag such as `fr_FR.UTF-8` or `ar-MA` to a
    /// supported locale. Unknown languages fall back to English.
    pub fn from_language_tag(tag: &str) -> Self {
        let language = tag
            .split(|c: char| c == '_' || c == '-' || c == '.' || c == '@')
            .next()
            .unwrap_or_default();
        Self::from_code(language).unwrap_or_default()
    }

    /// Detect the locale from the usual POSIX environment variables.
    pub fn detect() -> Self {
        ["LC_ALL", "LC_MESSAGES", "LANG"]
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|value| !value.trim().is_empty())
            .map(|tag| Self::from_language_tag(&tag))
            .unwrap_or_default()
    }

    pub fn direction(self) -> Direction {
        match self {
            Locale::Ar => Direction::Rtl,
            Locale::En | Locale::Fr => Direction::Ltr,
        }
    }

    pub fn native_name(self) -> &'static str {
        match self {
            Locale::En => "English",
            Locale::Fr => "Français",
            Locale::Ar => "العربية",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.native_name())
    }
}

/// Symbolic keys of every locale-bound string in the interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextKey {
    Title,
    Description,
    Headline1,
    Headline2,
    Subheadline,
    CtaButton,
    ChipBusiness,
    ChipFamily,
    ChipProperty,
    QueryBusiness,
    QueryFamily,
    QueryProperty,
    PlaceholderInput,
    WelcomeMessage,
    ErrorMessage,
}

impl TextKey {
    pub const ALL: [TextKey; 15] = [
        TextKey::Title,
        TextKey::Description,
        TextKey::Headline1,
        TextKey::Headline2,
        TextKey::Subheadline,
        TextKey::CtaButton,
        TextKey::ChipBusiness,
        TextKey::ChipFamily,
        TextKey::ChipProperty,
        TextKey::QueryBusiness,
        TextKey::QueryFamily,
        TextKey::QueryProperty,
        TextKey::PlaceholderInput,
        TextKey::WelcomeMessage,
        TextKey::ErrorMessage,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TextKey::Title => "title",
            TextKey::Description => "description",
            TextKey::Headline1 => "headline1",
            TextKey::Headline2 => "headline2",
            TextKey::Subheadline => "subheadline",
            TextKey::CtaButton => "cta_button",
            TextKey::ChipBusiness => "chip_business",
            TextKey::ChipFamily => "chip_family",
            TextKey::ChipProperty => "chip_property",
            TextKey::QueryBusiness => "query_business",
            TextKey::QueryFamily => "query_family",
            TextKey::QueryProperty => "query_property",
            TextKey::PlaceholderInput => "placeholder_input",
            TextKey::WelcomeMessage => "welcome_message",
            TextKey::ErrorMessage => "error_message",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == key)
    }
}

/// A suggestion chip: a short label and the question it sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Suggestion {
    pub label: TextKey,
    pub query: TextKey,
}

pub const SUGGESTIONS: [Suggestion; 3] = [
    Suggestion {
        label: TextKey::ChipBusiness,
        query: TextKey::QueryBusiness,
    },
    Suggestion {
        label: TextKey::ChipFamily,
        query: TextKey::QueryFamily,
    },
    Suggestion {
        label: TextKey::ChipProperty,
        query: TextKey::QueryProperty,
    },
];

#[derive(Debug, Error)]
pub enum DictionaryError {
    #[error("failed to read locale dictionary {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse locale dictionary: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Locale → key → string tables.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    entries: HashMap<Locale, HashMap<TextKey, String>>,
}

impl Dictionary {
    /// The dictionary compiled into the binary.
    pub fn builtin() -> Self {
        Self::parse(BUILTIN_DICTIONARY).unwrap_or_else(|e| {
            warn!("built-in locale dictionary is invalid: {e}");
            Self::default()
        })
    }

    /// Parse a TOML dictionary with one table per locale code. Unknown
    /// locales and keys are skipped.
    pub fn parse(source: &str) -> Result<Self, DictionaryError> {
        let raw: HashMap<String, HashMap<String, String>> = toml::from_str(source)?;
        let mut entries = HashMap::new();

        for (code, table) in raw {
            let Some(locale) = Locale::from_code(&code) else {
                warn!(locale = %code, "ignoring unsupported locale in dictionary");
                continue;
            };
            let strings: &mut HashMap<TextKey, String> = entries.entry(locale).or_default();
            for (key, value) in table {
                match TextKey::from_key(&key) {
                    Some(text_key) => {
                        strings.insert(text_key, value);
                    }
                    None => debug!(locale = %code, key = %key, "ignoring unknown dictionary key"),
                }
            }
        }

        Ok(Self { entries })
    }

    pub fn load(path: &Path) -> Result<Self, DictionaryError> {
        let source = fs::read_to_string(path).map_err(|source| DictionaryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&source)
    }

    /// Use the dictionary at `path` when present and valid, the built-in one
    /// otherwise.
    pub fn load_or_builtin(path: &Path) -> Self {
        if !path.exists() {
            return Self::builtin();
        }
        match Self::load(path) {
            Ok(dictionary) => dictionary,
            Err(e) => {
                warn!("{e}. Using built-in dictionary.");
                Self::builtin()
            }
        }
    }

    pub fn lookup(&self, locale: Locale, key: TextKey) -> Option<&str> {
        self.entries
            .get(&locale)
            .and_then(|strings| strings.get(&key))
            .map(String::as_str)
    }
}

/// The strings currently shown by the interface.
#[derive(Debug, Clone, Default)]
pub struct UiText {
    values: HashMap<TextKey, String>,
}

impl UiText {
    /// Replace every string the dictionary has for `locale`. Keys the locale
    /// lacks keep whatever was shown before. Returns the missing keys.
    pub fn apply(&mut self, dictionary: &Dictionary, locale: Locale) -> Vec<TextKey> {
        let mut missing = Vec::new();
        for key in TextKey::ALL {
            match dictionary.lookup(locale, key) {
                Some(value) => {
                    self.values.insert(key, value.to_string());
                }
                None => missing.push(key),
            }
        }
        missing
    }

    pub fn get(&self, key: TextKey) -> &str {
        self.values.get(&key).map(String::as_str).unwrap_or_default()
    }
}
