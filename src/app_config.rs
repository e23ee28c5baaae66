//! Application branding config: the remote schema, its normalization, and
//! the partial merge into built-in defaults.

use serde::{Deserialize, Serialize};

/// Live application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub app_title: String,
    pub app_slogan: String,
    pub app_color: String,
    pub app_description: String,
    pub system_instruction: String,
    pub primary_color: String,
    pub welcome_message: String,
    pub webhook_url: String,
    pub temperature: f64,
    /// Absolute URL of the application logo.
    pub app_logo: String,
    /// Absolute URL of the assistant avatar.
    pub bot_logo: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_title: "Portal".into(),
            app_slogan: "Your workspace, one question away.".into(),
            app_color: "#0f172a".into(),
            app_description: "Ask questions about your documents.".into(),
            system_instruction: "You are a helpful assistant.".into(),
            primary_color: "#2563eb".into(),
            welcome_message: "Hello! How can I help you today?".into(),
            webhook_url: String::new(),
            temperature: 0.7,
            app_logo: "/logo.svg".into(),
            bot_logo: "/bot.svg".into(),
        }
    }
}

impl AppConfig {
    /// Overwrite every field the patch carries with a non-empty value.
    ///
    /// Absent fields keep their current value, so merging `{}` is a no-op
    /// and merging the same patch twice equals merging it once.
    /// Returns whether anything changed.
    pub fn merge(&mut self, patch: &AppConfigPatch) -> bool {
        let mut changed = false;
        changed |= overwrite(&mut self.app_title, &patch.app_title);
        changed |= overwrite(&mut self.app_slogan, &patch.app_slogan);
        changed |= overwrite(&mut self.app_color, &patch.app_color);
        changed |= overwrite(&mut self.app_description, &patch.app_description);
        changed |= overwrite(&mut self.system_instruction, &patch.system_instruction);
        changed |= overwrite(&mut self.primary_color, &patch.primary_color);
        changed |= overwrite(&mut self.welcome_message, &patch.welcome_message);
        changed |= overwrite(&mut self.webhook_url, &patch.webhook_url);
        changed |= overwrite(&mut self.app_logo, &patch.app_logo);
        changed |= overwrite(&mut self.bot_logo, &patch.bot_logo);
        if let Some(t) = patch.temperature.filter(|t| t.is_finite()) {
            if self.temperature != t {
                self.temperature = t;
                changed = true;
            }
        }
        changed
    }

    #[must_use]
    pub fn merged(mut self, patch: &AppConfigPatch) -> Self {
        self.merge(patch);
        self
    }
}

fn overwrite(slot: &mut String, value: &Option<String>) -> bool {
    match value.as_deref() {
        Some(v) if !v.trim().is_empty() && slot.as_str() != v => {
            v.clone_into(slot);
            true
        }
        _ => false,
    }
}

/// Subset of [`AppConfig`] fetched from the backend.
///
/// Only fields that were present with a usable value are `Some`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_slogan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub welcome_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_logo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_logo: Option<String>,
}

impl AppConfigPatch {
    /// Number of fields carried.
    #[must_use]
    pub fn len(&self) -> usize {
        [
            &self.app_title,
            &self.app_slogan,
            &self.app_color,
            &self.app_description,
            &self.system_instruction,
            &self.primary_color,
            &self.welcome_message,
            &self.webhook_url,
            &self.app_logo,
            &self.bot_logo,
        ]
        .into_iter()
        .filter(|f| f.is_some())
        .count()
            + usize::from(self.temperature.is_some())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The backend's config record, as sent (snake_case, loosely typed).
#[derive(Debug, Clone, Default, Deserialize)]
#[non_exhaustive]
pub struct RemoteConfig {
    #[serde(default)]
    pub app_title: Option<String>,
    #[serde(default)]
    pub app_slogan: Option<String>,
    #[serde(default)]
    pub app_color: Option<String>,
    #[serde(default)]
    pub app_description: Option<String>,
    #[serde(default)]
    pub system_instruction: Option<String>,
    #[serde(default)]
    pub primary_color: Option<String>,
    #[serde(default)]
    pub welcome_message: Option<String>,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub temperature: Option<RemoteNumber>,
    #[serde(default)]
    pub app_logo: Option<RemoteAsset>,
    #[serde(default)]
    pub bot_logo: Option<RemoteAsset>,
}

/// Decimal fields arrive as numbers or as numeric strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RemoteNumber {
    Number(f64),
    Text(String),
}

impl RemoteNumber {
    #[must_use]
    pub fn value(&self) -> Option<f64> {
        let v = match self {
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse().ok()?,
        };
        v.is_finite().then_some(v)
    }
}

/// Image reference as sent: a bare id/URL, or an expanded file object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RemoteAsset {
    Plain(String),
    Object {
        #[serde(default)]
        id: Option<String>,
    },
}

/// Normalized image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetRef {
    /// Already absolute; used as is.
    Url(String),
    /// Bare asset id, joined to the asset base.
    Id(String),
}

impl AssetRef {
    /// The single normalization point for remote image references.
    /// Empty references normalize to `None`.
    #[must_use]
    pub fn from_remote(remote: &RemoteAsset) -> Option<Self> {
        match remote {
            RemoteAsset::Plain(s) => Self::parse(s),
            RemoteAsset::Object { id } => Self::parse(id.as_deref()?),
        }
    }

    /// Classify a raw reference. Surrounding whitespace is ignored.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        Some(if has_uri_scheme(raw) {
            Self::Url(raw.to_owned())
        } else {
            Self::Id(raw.to_owned())
        })
    }

    #[must_use]
    pub fn resolve(&self, asset_base: &str) -> String {
        match self {
            Self::Url(url) => url.clone(),
            Self::Id(id) => format!("{}/{id}", asset_base.trim_end_matches('/')),
        }
    }
}

/// Resolve an image reference to an absolute URL.
///
/// References starting with a URI scheme pass through; anything else is
/// joined to `asset_base`. Blank references resolve to `None`.
#[must_use]
pub fn resolve_asset(reference: &str, asset_base: &str) -> Option<String> {
    AssetRef::parse(reference).map(|a| a.resolve(asset_base))
}

/// `ALPHA *( ALPHA / DIGIT / "+" / "-" / "." ) ":"` at the start of `s`.
fn has_uri_scheme(s: &str) -> bool {
    let Some((scheme, _)) = s.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

impl RemoteConfig {
    /// Map to the internal schema, dropping absent and empty values and
    /// resolving both image references against `asset_base`.
    #[must_use]
    pub fn into_patch(self, asset_base: &str) -> AppConfigPatch {
        let asset = |r: Option<RemoteAsset>| {
            r.as_ref()
                .and_then(AssetRef::from_remote)
                .map(|a| a.resolve(asset_base))
        };
        AppConfigPatch {
            app_title: non_empty(self.app_title),
            app_slogan: non_empty(self.app_slogan),
            app_color: non_empty(self.app_color),
            app_description: non_empty(self.app_description),
            system_instruction: non_empty(self.system_instruction),
            primary_color: non_empty(self.primary_color),
            welcome_message: non_empty(self.welcome_message),
            webhook_url: non_empty(self.webhook_url),
            temperature: self.temperature.as_ref().and_then(RemoteNumber::value),
            app_logo: asset(self.app_logo),
            bot_logo: asset(self.bot_logo),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
