use owo_colors::OwoColorize;
use serde_json::Value;

/// Per-reconciler resource filter compiled once per watch configuration.
#[derive(Debug, Clone, Default)]
pub struct Selector {
    pub labels: LabelSelector,
    pub fields: FieldSelector,
}

impl Selector {
    pub fn new(label_selectors: &[String], field_selectors: &[String]) -> Self {
        Self {
            labels: LabelSelector::new(label_selectors),
            fields: FieldSelector::new(field_selectors),
        }
    }
}

/// Equality/inequality label requirements, joined into one Kubernetes
/// selector expression and pushed down into the watch. An empty list
/// matches everything.
#[derive(Debug, Clone, Default)]
pub struct LabelSelector {
    expression: Option<String>,
}

impl LabelSelector {
    pub fn new(selectors: &[String]) -> Self {
        let requirements: Vec<&str> = selectors
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        Self {
            expression: (!requirements.is_empty()).then(|| requirements.join(",")),
        }
    }

    pub fn expression(&self) -> Option<&str> {
        self.expression.as_deref()
    }
}

/// Field predicates of the form `path [= | == | !=] value`, evaluated
/// against the JSON form of the object. A bare path matches when the value
/// exists and is neither `null` nor `false`. An empty list matches
/// everything; unparseable expressions are logged and skipped.
#[derive(Debug, Clone, Default)]
pub struct FieldSelector {
    predicates: Vec<FieldPredicate>,
}

impl FieldSelector {
    pub fn new(expressions: &[String]) -> Self {
        let mut predicates = Vec::new();
        for expression in expressions {
            match FieldPredicate::parse(expression) {
                Some(predicate) => predicates.push(predicate),
                None => eprintln!(
                    "{}",
                    format!("skipping unparseable field selector '{expression}'").yellow()
                ),
            }
        }
        Self { predicates }
    }

    pub fn matches(&self, object: &Value) -> bool {
        self.predicates
            .iter()
            .all(|predicate| predicate.matches(object))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FieldOp {
    Exists,
    Eq,
    Ne,
}

#[derive(Debug, Clone)]
struct FieldPredicate {
    path: Vec<String>,
    op: FieldOp,
    value: String,
}

impl FieldPredicate {
    fn parse(expression: &str) -> Option<Self> {
        let expression = expression.trim();
        if expression.is_empty() {
            return None;
        }

        let (raw_path, op, raw_value) = if let Some((path, value)) = expression.split_once("!=") {
            (path, FieldOp::Ne, value)
        } else if let Some((path, value)) = expression.split_once("==") {
            (path, FieldOp::Eq, value)
        } else if let Some((path, value)) = expression.split_once('=') {
            (path, FieldOp::Eq, value)
        } else {
            (expression, FieldOp::Exists, "")
        };

        let path: Vec<String> = raw_path
            .trim()
            .trim_start_matches('.')
            .split('.')
            .map(str::trim)
            .map(str::to_string)
            .collect();
        if path.iter().any(String::is_empty) {
            return None;
        }

        let value = raw_value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value)
            .to_string();

        Some(Self { path, op, value })
    }

    fn matches(&self, object: &Value) -> bool {
        let found = lookup(object, &self.path);
        match self.op {
            FieldOp::Exists => found.is_some_and(truthy),
            FieldOp::Eq => found.is_some_and(|value| text_of(value) == self.value),
            FieldOp::Ne => !found.is_some_and(|value| text_of(value) == self.value),
        }
    }
}

fn lookup<'a>(object: &'a Value, path: &[String]) -> Option<&'a Value> {
    let mut current = object;
    for segment in path {
        current = current.get(segment)?;
    }
    Some(current)
}

fn truthy(value: &Value) -> bool {
    !(value.is_null() || matches!(value, Value::Bool(false)))
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn selectors(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn pod() -> Value {
        json!({
            "metadata": {"name": "web-0", "namespace": "default"},
            "spec": {"nodeName": "node-1"},
            "status": {"phase": "Running", "ready": false},
        })
    }

    #[test]
    fn empty_selectors_match_everything() {
        assert!(FieldSelector::new(&[]).matches(&pod()));
        assert!(LabelSelector::new(&[]).expression().is_none());
    }

    #[test]
    fn label_requirements_are_joined() {
        let labels = LabelSelector::new(&selectors(&["app=web", "tier!=cache"]));
        assert_eq!(labels.expression(), Some("app=web,tier!=cache"));
    }

    #[test]
    fn equality_predicates_compare_the_rendered_value() {
        let fields = FieldSelector::new(&selectors(&["metadata.name=web-0"]));
        assert!(fields.matches(&pod()));
        let fields = FieldSelector::new(&selectors(&[".status.phase == \"Running\""]));
        assert!(fields.matches(&pod()));
        let fields = FieldSelector::new(&selectors(&["status.phase=Pending"]));
        assert!(!fields.matches(&pod()));
    }

    #[test]
    fn inequality_matches_missing_paths() {
        let fields = FieldSelector::new(&selectors(&["status.phase!=Pending"]));
        assert!(fields.matches(&pod()));
        let fields = FieldSelector::new(&selectors(&["metadata.missing!=anything"]));
        assert!(fields.matches(&pod()));
        let fields = FieldSelector::new(&selectors(&["status.phase!=Running"]));
        assert!(!fields.matches(&pod()));
    }

    #[test]
    fn bare_paths_are_truthiness_checks() {
        assert!(FieldSelector::new(&selectors(&["spec.nodeName"])).matches(&pod()));
        assert!(!FieldSelector::new(&selectors(&["status.ready"])).matches(&pod()));
        assert!(!FieldSelector::new(&selectors(&["spec.missing"])).matches(&pod()));
    }

    #[test]
    fn all_predicates_must_hold() {
        let fields = FieldSelector::new(&selectors(&[
            "metadata.namespace=default",
            "status.phase=Running",
        ]));
        assert!(fields.matches(&pod()));
        let fields = FieldSelector::new(&selectors(&[
            "metadata.namespace=default",
            "status.phase=Pending",
        ]));
        assert!(!fields.matches(&pod()));
    }

    #[test]
    fn unparseable_expressions_are_skipped() {
        // Only the malformed expression is dropped; the rest still filter.
        let fields = FieldSelector::new(&selectors(&["..=x", "status.phase=Running"]));
        assert!(fields.matches(&pod()));
        let fields = FieldSelector::new(&selectors(&["..=x", "status.phase=Pending"]));
        assert!(!fields.matches(&pod()));
    }
}
