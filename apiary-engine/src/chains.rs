//! Compiled chain set
//!
//! Chains are resolved once per configuration: action references are looked up,
//! action option templates are parsed, and the chains are indexed by the
//! `(bee, event)` pair they listen to. Problems found along the way are collected
//! as [`ConfigIssue`]s instead of failing the load.

use ahash::AHashMap;
use apiary_config::{ActionConfig, ActionSpec, FilterConfig, HiveConfig, TEMPLATE_FILTER};
use apiary_core::FactoryRegistry;
use apiary_filters::FilterRegistry;
use apiary_schema::{PlaceholderType, Placeholders, Value};
use apiary_template::{expand_test_directive, has_actions, Template, TemplateError};
use std::sync::Arc;
use thiserror::Error;

/// A problem found while loading a configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigIssue {
    #[error("bee {bee}: unknown class {class}")]
    UnknownFactory { bee: String, class: String },

    #[error("bee {0}: name used more than once")]
    DuplicateBee(String),

    #[error("bee {bee}: {message}")]
    BeeStart { bee: String, message: String },

    #[error("chain {chain}: unknown bee {bee}")]
    UnknownBee { chain: String, bee: String },

    #[error("chain {chain}: bee {bee} does not emit {event}")]
    UndeclaredEvent {
        chain: String,
        bee: String,
        event: String,
    },

    #[error("chain {chain}: bee {bee} has no action {action}")]
    UndeclaredAction {
        chain: String,
        bee: String,
        action: String,
    },

    #[error("chain {chain}: action {action} misses mandatory option {option}")]
    MissingActionOption {
        chain: String,
        action: String,
        option: String,
    },

    #[error("chain {chain}: unknown filter {filter}")]
    UnknownFilter { chain: String, filter: String },

    #[error("chain {chain}: unknown action reference {id}")]
    UnknownActionReference { chain: String, id: String },

    #[error("chain {chain}: {error}")]
    Template { chain: String, error: TemplateError },
}

/// An action option ready to be rendered
#[derive(Debug, Clone)]
pub(crate) enum OptionValue {
    Static(Value),
    Template(Arc<Template>),
    Invalid(TemplateError),
}

#[derive(Debug, Clone)]
pub(crate) struct CompiledOption {
    pub name: String,
    pub kind: PlaceholderType,
    pub value: OptionValue,
}

/// Action template with parsed option templates
#[derive(Debug, Clone)]
pub(crate) struct CompiledAction {
    pub bee: String,
    pub name: String,
    pub options: Vec<CompiledOption>,
}

impl CompiledAction {
    fn compile(config: &ActionConfig) -> Self {
        let options = config
            .options
            .iter()
            .map(|option| {
                let value = match &option.value {
                    Value::String(source) if has_actions(source) => {
                        match Template::parse(option.name.as_str(), source.as_str()) {
                            Ok(template) => OptionValue::Template(Arc::new(template)),
                            Err(e) => OptionValue::Invalid(e),
                        }
                    }
                    other => OptionValue::Static(other.clone()),
                };
                CompiledOption {
                    name: option.name.clone(),
                    kind: option.kind,
                    value,
                }
            })
            .collect();

        Self {
            bee: config.bee.clone(),
            name: config.name.clone(),
            options,
        }
    }

    /// Render every templated option against the event data
    ///
    /// Static values keep their declared type; rendered templates are strings.
    pub fn render(&self, data: &Value) -> Result<Placeholders, TemplateError> {
        let mut placeholders = Placeholders::new();
        for option in &self.options {
            let (kind, value) = match &option.value {
                OptionValue::Static(value) => (option.kind, value.clone()),
                OptionValue::Template(template) => {
                    (PlaceholderType::String, Value::String(template.render(data)?))
                }
                OptionValue::Invalid(e) => return Err(e.clone()),
            };
            placeholders.set(option.name.as_str(), kind, value);
        }
        Ok(placeholders)
    }
}

/// One resolved chain element
#[derive(Debug, Clone)]
pub(crate) enum Step {
    Filter(FilterConfig),
    Action(CompiledAction),
    MissingAction(String),
}

/// A chain ready for evaluation
#[derive(Debug, Clone)]
pub struct CompiledChain {
    pub name: String,
    pub(crate) steps: Vec<Step>,
}

impl CompiledChain {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Immutable, indexed set of chains
#[derive(Debug, Default)]
pub struct ChainSet {
    chains: Vec<CompiledChain>,
    index: AHashMap<String, AHashMap<String, Vec<usize>>>,
    issues: Vec<ConfigIssue>,
}

impl ChainSet {
    /// Resolve and index the chains of a configuration
    pub fn compile(config: &HiveConfig, factories: &FactoryRegistry, filters: &FilterRegistry) -> Self {
        let mut set = ChainSet {
            issues: check_bees(config, factories),
            ..ChainSet::default()
        };

        for chain in &config.chains {
            let mut validator = ChainValidator {
                chain: &chain.name,
                config,
                factories,
                issues: &mut set.issues,
            };
            validator.check_event(&chain.event.bee, &chain.event.name);

            let steps = chain
                .steps()
                .into_iter()
                .flat_map(|element| {
                    let filter = element.filter.map(|spec| {
                        let filter = spec.to_config();
                        validator.check_filter(&filter, filters);
                        Step::Filter(filter)
                    });
                    let action = element.action.map(|spec| match resolve_action(&spec, config) {
                        Some(action) => {
                            validator.check_action(action);
                            Step::Action(CompiledAction::compile(action))
                        }
                        None => {
                            let id = match &spec {
                                ActionSpec::Reference(id) => id.clone(),
                                ActionSpec::Inline(action) => action.id.clone(),
                            };
                            validator.issue(|chain| ConfigIssue::UnknownActionReference { chain, id: id.clone() });
                            Step::MissingAction(id)
                        }
                    });
                    filter.into_iter().chain(action)
                })
                .collect();

            let position = set.chains.len();
            set.chains.push(CompiledChain {
                name: chain.name.clone(),
                steps,
            });
            set.index
                .entry(chain.event.bee.clone())
                .or_default()
                .entry(chain.event.name.clone())
                .or_default()
                .push(position);
        }

        set
    }

    /// Chains listening to `event` of `bee`, in configuration order
    pub fn matching<'a>(&'a self, bee: &str, event: &str) -> impl Iterator<Item = &'a CompiledChain> + 'a {
        self.index
            .get(bee)
            .and_then(|events| events.get(event))
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(move |&position| &self.chains[position])
    }

    pub fn chains(&self) -> &[CompiledChain] {
        &self.chains
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Problems found while compiling
    pub fn issues(&self) -> &[ConfigIssue] {
        &self.issues
    }
}

fn resolve_action<'a>(spec: &'a ActionSpec, config: &'a HiveConfig) -> Option<&'a ActionConfig> {
    match spec {
        ActionSpec::Inline(action) => Some(action),
        ActionSpec::Reference(id) => config.action(id),
    }
}

fn check_bees(config: &HiveConfig, factories: &FactoryRegistry) -> Vec<ConfigIssue> {
    let mut issues = Vec::new();
    for (position, bee) in config.bees.iter().enumerate() {
        if config.bees[..position].iter().any(|b| b.name == bee.name) {
            issues.push(ConfigIssue::DuplicateBee(bee.name.clone()));
        }
        if !factories.contains(&bee.class) {
            issues.push(ConfigIssue::UnknownFactory {
                bee: bee.name.clone(),
                class: bee.class.clone(),
            });
        }
    }
    issues
}

struct ChainValidator<'a> {
    chain: &'a str,
    config: &'a HiveConfig,
    factories: &'a FactoryRegistry,
    issues: &'a mut Vec<ConfigIssue>,
}

impl ChainValidator<'_> {
    fn issue(&mut self, make: impl FnOnce(String) -> ConfigIssue) {
        self.issues.push(make(self.chain.to_string()));
    }

    /// Class of a configured bee, if it and its factory exist
    fn class_of(&mut self, bee: &str) -> Option<String> {
        match self.config.bee(bee) {
            Some(config) if self.factories.contains(&config.class) => Some(config.class.clone()),
            Some(_) => None,
            None => {
                self.issue(|chain| ConfigIssue::UnknownBee {
                    chain,
                    bee: bee.to_string(),
                });
                None
            }
        }
    }

    fn check_event(&mut self, bee: &str, event: &str) {
        if let Some(class) = self.class_of(bee) {
            if self.factories.event(&class, event).is_none() {
                self.issue(|chain| ConfigIssue::UndeclaredEvent {
                    chain,
                    bee: bee.to_string(),
                    event: event.to_string(),
                });
            }
        }
    }

    fn check_filter(&mut self, filter: &FilterConfig, filters: &FilterRegistry) {
        if !filters.contains(&filter.name) {
            self.issue(|chain| ConfigIssue::UnknownFilter {
                chain,
                filter: filter.name.clone(),
            });
            return;
        }

        if filter.name == TEMPLATE_FILTER {
            for option in &filter.options {
                if let Some(source) = option.value.as_str() {
                    if let Err(error) = Template::parse("filter", &*expand_test_directive(source)) {
                        self.issue(|chain| ConfigIssue::Template { chain, error });
                    }
                }
            }
        }
    }

    fn check_action(&mut self, action: &ActionConfig) {
        for option in action.options.iter() {
            if let Some(source) = option.value.as_str() {
                if let Err(error) = Template::parse(option.name.as_str(), source) {
                    self.issue(|chain| ConfigIssue::Template { chain, error });
                }
            }
        }

        let Some(class) = self.class_of(&action.bee) else {
            return;
        };
        match self.factories.action(&class, &action.name) {
            None => self.issue(|chain| ConfigIssue::UndeclaredAction {
                chain,
                bee: action.bee.clone(),
                action: action.name.clone(),
            }),
            Some(descriptor) => {
                for option in descriptor.mandatory_options() {
                    if !action.options.contains(option) {
                        self.issue(|chain| ConfigIssue::MissingActionOption {
                            chain,
                            action: action.name.clone(),
                            option: option.to_string(),
                        });
                    }
                }
            }
        }
    }
}
