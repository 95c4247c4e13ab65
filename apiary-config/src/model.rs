//! Configuration data model

use apiary_event::new_id;
use apiary_schema::{Placeholders, Value};
use serde::{Deserialize, Serialize};

/// Registry name of the template filter
pub const TEMPLATE_FILTER: &str = "template";

/// Registry name of the Starlark filter
pub const STARLARK_FILTER: &str = "starlark";

/// Registry name of the Lua filter
pub const LUA_FILTER: &str = "lua";

/// Marks a bare filter string as a Starlark script
const STARLARK_ENTRY_MARKER: &str = "def main(";

/// Marks a bare filter string as a Lua script
const LUA_ENTRY_MARKER: &str = "function main(";

/// Complete hive configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HiveConfig {
    #[serde(default)]
    pub bees: Vec<BeeConfig>,

    #[serde(default)]
    pub actions: Vec<ActionConfig>,

    #[serde(default)]
    pub chains: Vec<ChainConfig>,
}

impl HiveConfig {
    pub fn bee(&self, name: &str) -> Option<&BeeConfig> {
        self.bees.iter().find(|b| b.name == name)
    }

    pub fn action(&self, id: &str) -> Option<&ActionConfig> {
        self.actions.iter().find(|a| a.id == id)
    }

    pub fn chain(&self, name: &str) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.name == name)
    }
}

/// Configuration of one bee instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeeConfig {
    /// Unique bee name
    pub name: String,

    /// Factory id the bee is created by
    pub class: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub options: Placeholders,
}

impl BeeConfig {
    pub fn new(name: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            class: class.into(),
            description: String::new(),
            options: Placeholders::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn option(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        let kind = apiary_schema::PlaceholderType::of(&value);
        self.options.set(name, kind, value);
        self
    }
}

/// A reusable action template, referenced by id from chains
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionConfig {
    #[serde(default = "new_id")]
    pub id: String,

    /// Target bee name
    pub bee: String,

    /// Action name
    pub name: String,

    /// Option values; strings are rendered as templates
    #[serde(default)]
    pub options: Placeholders,
}

impl ActionConfig {
    pub fn new(bee: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            bee: bee.into(),
            name: name.into(),
            options: Placeholders::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn option(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        let kind = apiary_schema::PlaceholderType::of(&value);
        self.options.set(name, kind, value);
        self
    }
}

/// Event a chain listens to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventPattern {
    pub bee: String,
    pub name: String,
}

impl EventPattern {
    pub fn new(bee: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            bee: bee.into(),
            name: name.into(),
        }
    }
}

/// How one named input of a filter is pre-processed and interpreted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterOption {
    /// Context key of the subject; empty selects the whole context
    #[serde(default)]
    pub name: String,

    /// Comparison value
    #[serde(default)]
    pub value: Value,

    #[serde(default)]
    pub trimmed: bool,

    #[serde(default)]
    pub case_insensitive: bool,

    /// Negate the predicate's result for this option
    #[serde(default)]
    pub inverse: bool,
}

impl FilterOption {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            ..Self::default()
        }
    }

    pub fn trimmed(mut self) -> Self {
        self.trimmed = true;
        self
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self
    }

    pub fn inverse(mut self) -> Self {
        self.inverse = true;
        self
    }
}

/// A configured filter instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Registry name of the filter
    pub name: String,

    #[serde(default)]
    pub options: Vec<FilterOption>,
}

impl FilterConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: Vec::new(),
        }
    }

    pub fn option(mut self, option: FilterOption) -> Self {
        self.options.push(option);
        self
    }
}

/// A filter given either in full or as a bare template or script source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterSpec {
    Source(String),
    Config(FilterConfig),
}

impl FilterSpec {
    /// The filter configuration this spec stands for
    ///
    /// A bare source selects the `starlark` filter when it contains `def main(`,
    /// the `lua` filter when it contains `function main(`, and the `template`
    /// filter otherwise, with the whole event context as subject.
    pub fn to_config(&self) -> FilterConfig {
        match self {
            FilterSpec::Config(config) => config.clone(),
            FilterSpec::Source(source) => {
                let name = if source.contains(STARLARK_ENTRY_MARKER) {
                    STARLARK_FILTER
                } else if source.contains(LUA_ENTRY_MARKER) {
                    LUA_FILTER
                } else {
                    TEMPLATE_FILTER
                };
                FilterConfig::new(name).option(FilterOption::new("", source.as_str()))
            }
        }
    }
}

impl From<FilterConfig> for FilterSpec {
    fn from(config: FilterConfig) -> Self {
        FilterSpec::Config(config)
    }
}

impl From<&str> for FilterSpec {
    fn from(source: &str) -> Self {
        FilterSpec::Source(source.to_string())
    }
}

/// An action given inline or as a reference into the `actions` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionSpec {
    Reference(String),
    Inline(ActionConfig),
}

impl From<ActionConfig> for ActionSpec {
    fn from(config: ActionConfig) -> Self {
        ActionSpec::Inline(config)
    }
}

impl From<&str> for ActionSpec {
    fn from(id: &str) -> Self {
        ActionSpec::Reference(id.to_string())
    }
}

/// One step of a chain: an optional gate and an optional side effect
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionSpec>,
}

impl ChainElement {
    pub fn filter(filter: impl Into<FilterSpec>) -> Self {
        Self {
            filter: Some(filter.into()),
            action: None,
        }
    }

    pub fn action(action: impl Into<ActionSpec>) -> Self {
        Self {
            filter: None,
            action: Some(action.into()),
        }
    }
}

/// A user-defined rule chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub name: String,

    #[serde(default)]
    pub description: String,

    pub event: EventPattern,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub elements: Vec<ChainElement>,

    /// Short form: filters evaluated before the `actions` list
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<FilterSpec>,

    /// Short form: actions executed once all `filters` passed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionSpec>,
}

impl ChainConfig {
    pub fn new(name: impl Into<String>, event: EventPattern) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            event,
            elements: Vec::new(),
            filters: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn element(mut self, element: ChainElement) -> Self {
        self.elements.push(element);
        self
    }

    /// All steps in evaluation order: `elements`, then `filters`, then `actions`
    pub fn steps(&self) -> Vec<ChainElement> {
        self.elements
            .iter()
            .cloned()
            .chain(self.filters.iter().cloned().map(ChainElement::filter))
            .chain(self.actions.iter().cloned().map(ChainElement::action))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_spec_source_selection() {
        let template = FilterSpec::Source("{{test eq .text \"hi\"}}".into()).to_config();
        assert_eq!(template.name, TEMPLATE_FILTER);
        assert_eq!(template.options.len(), 1);
        assert_eq!(template.options[0].name, "");

        let starlark =
            FilterSpec::Source("def main(text):\n    return text == 'good'".into()).to_config();
        assert_eq!(starlark.name, STARLARK_FILTER);
        assert_eq!(starlark.options[0].name, "");

        let lua = FilterSpec::Source("function main(args) return true end".into()).to_config();
        assert_eq!(lua.name, LUA_FILTER);
    }

    #[test]
    fn test_chain_deserialize_both_forms() {
        let json = r#"{
            "name": "greet",
            "event": {"bee": "irc", "name": "message"},
            "elements": [
                {"filter": {"name": "equals", "options": [{"name": "text", "value": "hi", "inverse": true}]}},
                {"action": {"bee": "log", "name": "log", "options": [{"name": "message", "value": "{{.text}}"}]}}
            ],
            "filters": ["{{test true}}"],
            "actions": ["reply"]
        }"#;
        let chain: ChainConfig = serde_json::from_str(json).unwrap();

        let steps = chain.steps();
        assert_eq!(steps.len(), 4);
        match &steps[0].filter {
            Some(FilterSpec::Config(config)) => assert!(config.options[0].inverse),
            other => panic!("expected filter config, got {:?}", other),
        }
        assert!(matches!(steps[1].action, Some(ActionSpec::Inline(_))));
        assert!(matches!(steps[2].filter, Some(FilterSpec::Source(_))));
        assert!(matches!(&steps[3].action, Some(ActionSpec::Reference(id)) if id == "reply"));
    }

    #[test]
    fn test_action_config_default_id() {
        let action: ActionConfig =
            serde_json::from_str(r#"{"bee": "log", "name": "log"}"#).unwrap();
        assert!(!action.id.is_empty());
    }

    #[test]
    fn test_builders() {
        let bee = BeeConfig::new("ticker", "timebee").option("interval", 5i64);
        assert_eq!(bee.options.bind::<u64>("interval").unwrap(), 5);

        let chain = ChainConfig::new("c", EventPattern::new("ticker", "tick"))
            .element(ChainElement::action(ActionConfig::new("log", "log")));
        assert_eq!(chain.steps().len(), 1);
    }
}
