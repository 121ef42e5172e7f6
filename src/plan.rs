//! Plans: ordered, serializable rule collections with a single execution mode.
//!
//! A plan is either a *pipeline* (every rule chains from the previous main
//! output) or a *graph* (rules name their output slots). The mode is fixed by
//! the first rule that produces an output; sinks produce nothing and fit
//! either mode.
//!
//! ```yaml
//! name: CSV2Parquet
//! description: Reads a CSV file and writes it as parquet
//! mode: pipeline
//! strict: true
//! context:
//!   csv_file_name: books.csv
//! rules:
//!   - ReadCSVFileRule:
//!       file_name: "{context.csv_file_name}"
//!   - WriteParquetFileRule:
//!       file_name: books.parquet
//! ```

use crate::backend::Backend;
use crate::context::Context;
use crate::error::{EtlError, Result, ResultExt};
use crate::rule::Rule;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

/// How a plan routes tables between rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanMode {
    /// Every rule reads and writes the main output
    Pipeline,
    /// Rules write named outputs
    Graph,
}

impl fmt::Display for PlanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pipeline => write!(f, "pipeline"),
            Self::Graph => write!(f, "graph"),
        }
    }
}

impl PlanMode {
    /// The mode a rule requires, or `None` if it produces no output.
    pub fn of<T>(rule: &dyn Rule<T>) -> Option<Self> {
        if !rule.has_output() {
            None
        } else if rule.named_output().is_some() {
            Some(Self::Graph)
        } else {
            Some(Self::Pipeline)
        }
    }
}

/// An advisory finding from [`Plan::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub rule_index: usize,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rule {}: {}", self.rule_index + 1, self.message)
    }
}

/// Plan-level fields of the serialized form.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct PlanHeader {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    mode: Option<PlanMode>,
    #[serde(default)]
    strict: Option<bool>,
    #[serde(default)]
    context: Context,
    #[serde(default)]
    rules: Option<Vec<Value>>,
}

/// An ordered, append-only collection of rules.
pub struct Plan<T> {
    name: Option<String>,
    description: Option<String>,
    mode: Option<PlanMode>,
    strict: Option<bool>,
    context: Context,
    rules: Vec<Box<dyn Rule<T>>>,
}

impl<T> fmt::Debug for Plan<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plan")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("mode", &self.mode)
            .field("strict", &self.strict)
            .field("context", &self.context)
            .field("rules", &self.rules)
            .finish()
    }
}

impl<T> Default for Plan<T> {
    fn default() -> Self {
        Self {
            name: None,
            description: None,
            mode: None,
            strict: None,
            context: Context::default(),
            rules: Vec::new(),
        }
    }
}

impl<T> Clone for Plan<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            description: self.description.clone(),
            mode: self.mode,
            strict: self.strict,
            context: self.context.clone(),
            rules: self.rules.clone(),
        }
    }
}

impl<T> PartialEq for Plan<T> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.description == other.description
            && self.strict == other.strict
            && self.context == other.context
            && self.rules.len() == other.rules.len()
            && self
                .rules
                .iter()
                .zip(&other.rules)
                .all(|(a, b)| a.eq_rule(b.as_ref()))
    }
}

impl<T> Plan<T> {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Fix the mode up front; rules added later must agree with it.
    ///
    /// Has no effect once a rule has set the mode.
    #[must_use]
    pub fn with_mode(mut self, mode: PlanMode) -> Self {
        if self.mode.is_none() {
            self.mode = Some(mode);
        }
        self
    }

    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = Some(strict);
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// The established mode, or `None` while no rule has an opinion.
    pub fn mode(&self) -> Option<PlanMode> {
        self.mode
    }

    /// A hint for callers; rules carry their own `strict` flag.
    pub fn strict(&self) -> Option<bool> {
        self.strict
    }

    /// Context defaults, overridable from the command line.
    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn rules(&self) -> &[Box<dyn Rule<T>>] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Rule<T>> {
        self.rules.iter().map(AsRef::as_ref)
    }

    /// Append a rule.
    ///
    /// # Errors
    ///
    /// [`EtlError::PlanMode`] if the rule contradicts the plan's mode. The
    /// plan is left unchanged.
    pub fn add_rule<R: Rule<T> + 'static>(&mut self, rule: R) -> Result<&mut Self> {
        self.add_boxed(Box::new(rule))
    }

    /// Append an already boxed rule, see [`Plan::add_rule`].
    ///
    /// # Errors
    ///
    /// Same as [`Plan::add_rule`].
    pub fn add_boxed(&mut self, rule: Box<dyn Rule<T>>) -> Result<&mut Self> {
        if let Some(found) = PlanMode::of(rule.as_ref()) {
            match self.mode {
                None => self.mode = Some(found),
                Some(expected) if expected != found => {
                    return Err(EtlError::PlanMode {
                        expected,
                        found,
                        rule: rule_label(rule.as_ref()),
                    });
                }
                Some(_) => {}
            }
        }
        self.rules.push(rule);
        Ok(self)
    }

    /// Check that every named input is seeded or produced by an earlier rule.
    ///
    /// Findings are advisory; the engine runs the plan regardless.
    pub fn validate<S: AsRef<str>>(&self, seeded: &[S]) -> Vec<ValidationError> {
        let mut available: HashSet<&str> = seeded.iter().map(AsRef::as_ref).collect();
        let mut errors = Vec::new();
        for (rule_index, rule) in self.rules.iter().enumerate() {
            for input in rule.inputs().named() {
                if !available.contains(input) {
                    errors.push(ValidationError {
                        rule_index,
                        message: format!(
                            "{} reads named input '{input}' which is neither seeded nor produced by an earlier rule",
                            rule_label(rule.as_ref())
                        ),
                    });
                }
            }
            available.extend(rule.named_outputs());
        }
        errors
    }

    /// The plan as a mapping of its metadata plus the ordered rule dicts.
    ///
    /// # Errors
    ///
    /// [`EtlError::Serialization`] if a rule cannot be encoded.
    pub fn to_dict(&self) -> Result<Value> {
        let rules = self
            .rules
            .iter()
            .map(|rule| rule.to_dict())
            .collect::<Result<Vec<_>>>()?;
        let mut dct = Map::new();
        dct.insert("name".to_owned(), serde_json::to_value(&self.name)?);
        dct.insert("description".to_owned(), serde_json::to_value(&self.description)?);
        dct.insert("mode".to_owned(), serde_json::to_value(self.mode)?);
        dct.insert("strict".to_owned(), serde_json::to_value(self.strict)?);
        dct.insert("context".to_owned(), serde_json::to_value(&self.context)?);
        dct.insert("rules".to_owned(), Value::Array(rules));
        Ok(Value::Object(dct))
    }

    /// # Errors
    ///
    /// Same as [`Plan::to_dict`].
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.to_dict()?)?)
    }

    /// Write the YAML form to `path`.
    ///
    /// # Errors
    ///
    /// Serialization or I/O failures.
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_yaml()?)
            .with_context(|| format!("Failed to write plan to {}", path.display()))
    }

    /// Rebuild a plan, resolving every rule against `backend`.
    ///
    /// Rules are re-added in order, so a serialized plan that mixes modes is
    /// rejected just like one built in code.
    ///
    /// # Errors
    ///
    /// Malformed payloads, unknown plan keys, unknown rule kinds, rule
    /// construction errors and [`EtlError::PlanMode`].
    pub fn from_dict(dct: &Value, backend: &Backend<T>) -> Result<Self> {
        let header: PlanHeader = match dct {
            Value::Null => PlanHeader::default(),
            other => serde_json::from_value(other.clone())?,
        };
        let mut plan = Self {
            name: header.name,
            description: header.description,
            mode: header.mode,
            strict: header.strict,
            context: header.context,
            rules: Vec::new(),
        };
        for rule in header.rules.unwrap_or_default() {
            plan.add_boxed(backend.build(&rule)?)?;
        }
        Ok(plan)
    }

    /// # Errors
    ///
    /// Malformed YAML plus everything [`Plan::from_dict`] can return.
    pub fn from_yaml(yml: &str, backend: &Backend<T>) -> Result<Self> {
        let dct: Value = serde_yaml::from_str(yml)?;
        Self::from_dict(&dct, backend)
    }

    /// Load a plan from a YAML file.
    ///
    /// # Errors
    ///
    /// I/O failures plus everything [`Plan::from_yaml`] can return.
    pub fn from_file(path: impl AsRef<Path>, backend: &Backend<T>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read plan from {}", path.display()))?;
        Self::from_yaml(&contents, backend)
    }
}

fn rule_label<T>(rule: &dyn Rule<T>) -> String {
    match &rule.meta().name {
        Some(name) => format!("{} ({name})", rule.kind()),
        None => rule.kind().to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{AddRule, SinkRule, Table, test_backend};

    #[test]
    fn test_empty_plan_has_no_mode() {
        let plan: Plan<Table> = Plan::new();
        assert!(plan.is_empty());
        assert_eq!(plan.mode(), None);
    }

    #[test]
    fn test_pipeline_then_graph_rejected() {
        let mut plan = Plan::new();
        plan.add_rule(AddRule::new(1)).unwrap();
        let err = plan
            .add_rule(AddRule::new(2).with_named_input("x").with_named_output("y"))
            .unwrap_err();
        match err {
            EtlError::PlanMode {
                expected, found, ..
            } => {
                assert_eq!(expected, PlanMode::Pipeline);
                assert_eq!(found, PlanMode::Graph);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn test_graph_then_pipeline_rejected() {
        let mut plan: Plan<Table> = Plan::new();
        plan.add_rule(AddRule::new(1).with_named_output("a")).unwrap();
        plan.add_rule(AddRule::new(1).with_named_input("a").with_named_output("b"))
            .unwrap();
        assert_eq!(plan.mode(), Some(PlanMode::Graph));
        assert!(matches!(
            plan.add_rule(AddRule::new(1)),
            Err(EtlError::PlanMode { .. })
        ));
    }

    #[test]
    fn test_sinks_have_no_opinion() {
        let mut plan: Plan<Table> = Plan::new();
        plan.add_rule(SinkRule::new()).unwrap();
        assert_eq!(plan.mode(), None);
        plan.add_rule(AddRule::new(1).with_named_output("a")).unwrap();
        plan.add_rule(SinkRule::new()).unwrap();
        assert_eq!(plan.mode(), Some(PlanMode::Graph));
    }

    #[test]
    fn test_explicit_mode_is_enforced() {
        let mut plan: Plan<Table> = Plan::new().with_mode(PlanMode::Graph);
        assert!(plan.add_rule(AddRule::new(1)).is_err());
        plan.add_rule(AddRule::new(1).with_named_output("a")).unwrap();
    }

    #[test]
    fn test_validate_reports_unknown_named_inputs() {
        let mut plan: Plan<Table> = Plan::new();
        plan.add_rule(AddRule::new(1).with_named_input("input").with_named_output("a"))
            .unwrap();
        plan.add_rule(AddRule::new(1).with_named_input("a").with_named_output("b"))
            .unwrap();
        plan.add_rule(AddRule::new(1).with_named_input("zzz").with_named_output("c"))
            .unwrap();

        assert_eq!(plan.validate(&["input"]).len(), 1);
        let errors = plan.validate::<&str>(&[]);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].rule_index, 0);
        assert!(errors[1].to_string().starts_with("Rule 3:"));
    }

    #[test]
    fn test_plan_yaml_round_trip() {
        let backend = test_backend();
        let mut context = Context::new();
        context.insert("batch", 3_i64);
        let mut plan = Plan::new()
            .with_name("plan")
            .with_description("a test plan")
            .with_strict(true)
            .with_context(context);
        plan.add_rule(AddRule::new(1)).unwrap();
        plan.add_rule(SinkRule::new()).unwrap();

        let yml = plan.to_yaml().unwrap();
        assert!(yml.contains("mode: pipeline"));
        let rebuilt = Plan::from_yaml(&yml, &backend).unwrap();
        assert_eq!(rebuilt, plan);
        assert_eq!(rebuilt.mode(), Some(PlanMode::Pipeline));
    }

    #[test]
    fn test_plan_equality_is_order_sensitive() {
        let mut a: Plan<Table> = Plan::new();
        a.add_rule(AddRule::new(1)).unwrap();
        a.add_rule(AddRule::new(2)).unwrap();
        let mut b: Plan<Table> = Plan::new();
        b.add_rule(AddRule::new(2)).unwrap();
        b.add_rule(AddRule::new(1)).unwrap();
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_from_yaml_rejects_mixed_modes() {
        let yml = "rules:\n  - AddRule: {amount: 1}\n  - AddRule: {amount: 1, named_output: y}\n";
        assert!(matches!(
            Plan::from_yaml(yml, &test_backend()),
            Err(EtlError::PlanMode { .. })
        ));
    }

    #[test]
    fn test_from_yaml_rejects_unknown_keys() {
        let yml = "name: x\nrulez: []\n";
        assert!(matches!(
            Plan::from_yaml(yml, &test_backend()),
            Err(EtlError::Serialization(_))
        ));
    }

    #[test]
    fn test_from_yaml_unknown_rule() {
        let yml = "rules:\n  - NoSuchRule: {}\n";
        let err = Plan::from_yaml(yml, &test_backend()).unwrap_err();
        assert!(err.to_string().contains("not found for backend 'test'"));
    }

    #[test]
    fn test_plan_file_round_trip() {
        let path = std::env::temp_dir().join("etl_rules_plan_round_trip.yml");
        let mut plan: Plan<Table> = Plan::new().with_name("file plan");
        plan.add_rule(AddRule::new(5)).unwrap();
        plan.to_file(&path).unwrap();

        let rebuilt = Plan::from_file(&path, &test_backend()).unwrap();
        assert_eq!(rebuilt, plan);
        let _ = std::fs::remove_file(&path);
    }
}
