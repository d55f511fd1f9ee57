//! Numbered action catalog
//!
//! The catalog is fetched once from the server's `/menu` endpoint. When that
//! call fails for any reason the built-in nine-slot menu is used instead.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;

use crate::keypad::Digit;

/// How a menu item is triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActionKind {
    /// Executed immediately, no voice input
    #[default]
    Instant,
    /// Needs a recorded utterance before execution
    VoicePrompted,
}

impl ActionKind {
    /// Map a wire `type`; anything other than `instant` needs voice input
    #[must_use]
    pub fn from_wire(kind: &str) -> Self {
        if kind.trim().eq_ignore_ascii_case("instant") {
            Self::Instant
        } else {
            Self::VoicePrompted
        }
    }
}

/// One entry of the action catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuItem {
    /// Key the item is bound to
    pub key: Digit,
    /// Display label
    pub label: String,
    /// Trigger mode
    pub kind: ActionKind,
    /// Server-side command text, informational only
    pub command: Option<String>,
    /// Prompt shown before recording a voice action
    pub prompt: Option<String>,
}

/// Wire form of `GET /menu`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MenuDescriptor {
    /// Items keyed by their digit as a string
    pub items: HashMap<String, MenuItemDescriptor>,
}

/// Wire form of a single menu item
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MenuItemDescriptor {
    /// Display label; defaults to `Action <key>`
    #[serde(default)]
    pub label: Option<String>,
    /// `instant`, or any other value for a voice-prompted item
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
}

/// Built-in menu used when the server menu is unavailable
const DEFAULT_MENU: &[(u8, &str, ActionKind)] = &[
    (1, "🎯 Focus", ActionKind::Instant),
    (2, "📧 Emails", ActionKind::Instant),
    (3, "📅 Calendar", ActionKind::Instant),
    (4, "🌤️ Weather", ActionKind::Instant),
    (5, "🎤 Chat", ActionKind::VoicePrompted),
    (6, "⏰ Remind", ActionKind::VoicePrompted),
    (7, "📝 Note", ActionKind::VoicePrompted),
    (8, "🔍 Search", ActionKind::VoicePrompted),
    (9, "📰 News", ActionKind::Instant),
];

/// Where the loaded catalog came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuSource {
    /// Fetched from the server
    Remote,
    /// Built-in fallback
    Default,
}

/// Holds the action catalog, keyed and deduplicated by digit
#[derive(Debug, Clone, Default)]
pub struct MenuRegistry {
    items: BTreeMap<Digit, MenuItem>,
    source: Option<MenuSource>,
}

impl MenuRegistry {
    /// Registry populated with the built-in nine slots
    #[must_use]
    pub fn fallback() -> Self {
        let items = DEFAULT_MENU
            .iter()
            .filter_map(|&(key, label, kind)| {
                Digit::new(key).map(|key| {
                    (
                        key,
                        MenuItem {
                            key,
                            label: label.to_string(),
                            kind,
                            command: None,
                            prompt: None,
                        },
                    )
                })
            })
            .collect();

        Self {
            items,
            source: Some(MenuSource::Default),
        }
    }

    /// Build a registry from a server descriptor
    ///
    /// Keys that are not a single digit are skipped. A descriptor with no
    /// usable item yields the built-in menu.
    #[must_use]
    pub fn from_descriptor(descriptor: MenuDescriptor) -> Self {
        let mut items = BTreeMap::new();

        for (raw_key, item) in descriptor.items {
            let Some(key) = Digit::parse(raw_key.trim()) else {
                tracing::warn!(key = %raw_key, "ignoring menu item with non-digit key");
                continue;
            };

            items.insert(
                key,
                MenuItem {
                    key,
                    label: item.label.unwrap_or_else(|| format!("Action {key}")),
                    kind: item
                        .kind
                        .as_deref()
                        .map_or_else(ActionKind::default, ActionKind::from_wire),
                    command: item.command,
                    prompt: item.prompt.filter(|p| !p.trim().is_empty()),
                },
            );
        }

        if items.is_empty() {
            tracing::warn!("server menu had no usable items, using default menu");
            return Self::fallback();
        }

        Self {
            items,
            source: Some(MenuSource::Remote),
        }
    }

    /// Look up the item bound to `key`
    #[must_use]
    pub fn get(&self, key: Digit) -> Option<&MenuItem> {
        self.items.get(&key)
    }

    /// `true` once a remote or fallback catalog has been installed
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        self.source.is_some()
    }

    #[must_use]
    pub const fn source(&self) -> Option<MenuSource> {
        self.source
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items in key order
    pub fn iter(&self) -> impl Iterator<Item = &MenuItem> {
        self.items.values()
    }

    /// Menu text: items `1`..`9` in key order, then the exit entry
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for item in self.items.values().filter(|i| i.key.value() != 0) {
            out.push_str(&format!("{}: {}\n", item.key, item.label));
        }
        out.push_str("0: Exit");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digit(d: u8) -> Digit {
        Digit::new(d).unwrap()
    }

    #[test]
    fn test_fallback_has_nine_slots() {
        let menu = MenuRegistry::fallback();
        assert_eq!(menu.len(), 9);
        assert_eq!(menu.source(), Some(MenuSource::Default));
        assert_eq!(menu.get(digit(5)).unwrap().kind, ActionKind::VoicePrompted);
        assert_eq!(menu.get(digit(1)).unwrap().kind, ActionKind::Instant);
        assert!(menu.get(digit(0)).is_none());
    }

    #[test]
    fn test_descriptor_defaults() {
        let json = r#"{"items": {
            "2": {"label": "Mail", "type": "instant", "command": "check mail"},
            "6": {"type": "voice", "prompt": "What should I remind you about?"},
            "x": {"label": "bogus"},
            "3": {}
        }}"#;
        let descriptor: MenuDescriptor = serde_json::from_str(json).unwrap();
        let menu = MenuRegistry::from_descriptor(descriptor);

        assert_eq!(menu.len(), 3);
        assert_eq!(menu.source(), Some(MenuSource::Remote));

        let six = menu.get(digit(6)).unwrap();
        assert_eq!(six.label, "Action 6");
        assert_eq!(six.kind, ActionKind::VoicePrompted);
        assert_eq!(six.prompt.as_deref(), Some("What should I remind you about?"));

        let three = menu.get(digit(3)).unwrap();
        assert_eq!(three.kind, ActionKind::Instant);
        assert_eq!(
            menu.get(digit(2)).unwrap().command.as_deref(),
            Some("check mail")
        );
    }

    #[test]
    fn test_unknown_type_is_voice_per_item() {
        let json = r#"{"items": {
            "1": {"label": "Lights", "type": "instant"},
            "4": {"label": "Dictate", "type": "text"}
        }}"#;
        let descriptor: MenuDescriptor = serde_json::from_str(json).unwrap();
        let menu = MenuRegistry::from_descriptor(descriptor);

        assert_eq!(menu.source(), Some(MenuSource::Remote));
        assert_eq!(menu.len(), 2);
        assert_eq!(menu.get(digit(1)).unwrap().kind, ActionKind::Instant);
        assert_eq!(menu.get(digit(4)).unwrap().kind, ActionKind::VoicePrompted);
    }

    #[test]
    fn test_empty_descriptor_falls_back() {
        let menu = MenuRegistry::from_descriptor(MenuDescriptor::default());
        assert_eq!(menu.source(), Some(MenuSource::Default));
        assert_eq!(menu.len(), 9);
    }

    #[test]
    fn test_render() {
        let descriptor: MenuDescriptor = serde_json::from_str(
            r#"{"items": {"2": {"label": "B"}, "1": {"label": "A"}}}"#,
        )
        .unwrap();
        let menu = MenuRegistry::from_descriptor(descriptor);
        assert_eq!(menu.render(), "1: A\n2: B\n0: Exit");
    }

    #[test]
    fn test_unloaded_registry() {
        let menu = MenuRegistry::default();
        assert!(!menu.is_loaded());
        assert!(menu.is_empty());
    }
}
