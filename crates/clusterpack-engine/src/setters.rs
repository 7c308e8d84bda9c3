//! Setter overrides
//!
//! An override writes a new value into a package manifest's setter
//! definition and then rewrites every resource field tagged as deriving from
//! that setter with a `$kpt-set` marker:
//!
//! ```yaml
//! spec:
//!   $kpt-set:
//!     replicas: replicas
//!     image: "nginx:${tag}"
//!   replicas: 3
//!   image: nginx:1.25
//! ```
//!
//! A plain reference replaces the field with the setter's typed value; a
//! pattern reference is re-evaluated against every setter it names.

use clusterpack_core::{
    Kptfile, LoadedPackage, Mapping, Node, Resource, SetBy, SetterDefinition, SetterType,
    SetterValue, Variable, VariableValue, is_kptfile,
};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{EngineError, Result};

static PATTERN_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").expect("valid setter pattern"));

/// A named value to apply to a package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Override {
    pub name: String,
    pub value: VariableValue,
    pub set_by: SetBy,
}

impl Override {
    pub fn new(name: impl Into<String>, value: VariableValue, set_by: SetBy) -> Self {
        Self {
            name: name.into(),
            value,
            set_by,
        }
    }

    pub fn from_variable(variable: &Variable, set_by: SetBy) -> Result<Self> {
        Ok(Self::new(variable.name.clone(), variable.resolve()?, set_by))
    }
}

/// What [`apply`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideOutcome {
    /// The setter was updated and `fields` resource fields rewritten
    Applied { fields: usize },
    /// The manifest declares no such setter
    Skipped,
}

/// Apply one override to a manifest and its sibling resources
pub fn apply(
    kptfile: &mut Kptfile,
    resources: &mut [Resource],
    ov: &Override,
) -> Result<OverrideOutcome> {
    let Some(setter) = kptfile.setter(&ov.name)? else {
        return Ok(OverrideOutcome::Skipped);
    };

    check_value(&setter, &ov.value)?;
    kptfile.set_setter(&ov.name, &ov.value, ov.set_by)?;

    let setters: IndexMap<String, SetterDefinition> = kptfile
        .list_setters()?
        .into_iter()
        .map(|s| (s.name.clone(), s))
        .collect();

    let mut substitution = Substitution {
        name: &ov.name,
        setters: &setters,
        fields: 0,
    };
    for resource in resources.iter_mut().filter(|r| !is_kptfile(r)) {
        substitution.mapping(resource.body_mut())?;
    }

    tracing::debug!(
        setter = %ov.name,
        set_by = %ov.set_by,
        fields = substitution.fields,
        "applied setter override"
    );
    Ok(OverrideOutcome::Applied {
        fields: substitution.fields,
    })
}

/// Apply cluster variables, then package variables, to a loaded package
///
/// Cluster variables naming a setter the package does not declare are
/// skipped; package variables must name a declared setter.
pub fn apply_variables(
    package: &mut LoadedPackage,
    cluster: &[Variable],
    package_variables: &[Variable],
) -> Result<()> {
    for variable in cluster {
        let ov = Override::from_variable(variable, SetBy::ClusterOverride)?;
        if apply(&mut package.kptfile, &mut package.resources, &ov)? == OverrideOutcome::Skipped {
            tracing::trace!(setter = %ov.name, "package does not declare setter, skipping");
        }
    }

    for variable in package_variables {
        let ov = Override::from_variable(variable, SetBy::PackageOverride)?;
        if !package.kptfile.has_setter(&ov.name) {
            return Err(EngineError::MissingSetter { name: ov.name });
        }
        apply(&mut package.kptfile, &mut package.resources, &ov)?;
    }

    Ok(())
}

/// Validate an override against the setter's declared schema
fn check_value(setter: &SetterDefinition, value: &VariableValue) -> Result<()> {
    let expects_list = match setter.schema_type {
        Some(SetterType::Array) => true,
        Some(_) => false,
        None => setter.value.is_list(),
    };

    match value {
        VariableValue::List(_) if !expects_list => Err(EngineError::TypeMismatch {
            name: setter.name.clone(),
            expected: "a scalar value".to_string(),
            actual: "listValues".to_string(),
        }),
        VariableValue::Scalar(_) if expects_list => Err(EngineError::TypeMismatch {
            name: setter.name.clone(),
            expected: "listValues".to_string(),
            actual: "a scalar value".to_string(),
        }),
        VariableValue::List(_) => Ok(()),
        VariableValue::Scalar(v) => {
            let invalid = |schema_type: &str| EngineError::InvalidSetterValue {
                name: setter.name.clone(),
                value: v.clone(),
                schema_type: schema_type.to_string(),
            };
            match setter.schema_type {
                Some(SetterType::Integer) if v.trim().parse::<i64>().is_err() => {
                    return Err(invalid("integer"));
                }
                Some(SetterType::Number) if v.trim().parse::<f64>().is_err() => {
                    return Err(invalid("number"));
                }
                Some(SetterType::Boolean) if v.parse::<bool>().is_err() => {
                    return Err(invalid("boolean"));
                }
                _ => {}
            }
            if !setter.enum_values.is_empty() && !setter.enum_values.contains_key(v) {
                return Err(invalid("enum"));
            }
            Ok(())
        }
    }
}

/// Rewrites fields referencing one setter
struct Substitution<'s> {
    name: &'s str,
    setters: &'s IndexMap<String, SetterDefinition>,
    fields: usize,
}

impl Substitution<'_> {
    fn mapping(&mut self, mapping: &mut Mapping) -> Result<()> {
        let references = mapping.markers().setters.clone();
        for (field, reference) in &references {
            let replacement = if reference == self.name {
                let setter = self.setter(field, reference)?;
                Some(typed_value(setter, mapping.get(field))?)
            } else if self.pattern_references_setter(reference) {
                Some(Node::String(self.expand_pattern(field, reference)?))
            } else {
                None
            };

            if let Some(node) = replacement {
                mapping.insert(field.clone(), node);
                self.fields += 1;
            }
        }

        for (_, value) in mapping.fields_mut() {
            self.node(value)?;
        }
        Ok(())
    }

    fn node(&mut self, node: &mut Node) -> Result<()> {
        match node {
            Node::Mapping(mapping) => self.mapping(mapping),
            Node::Sequence(items) => items.iter_mut().try_for_each(|item| self.node(item)),
            Node::Tagged(tagged) => self.node(&mut tagged.value),
            _ => Ok(()),
        }
    }

    fn setter(&self, field: &str, name: &str) -> Result<&SetterDefinition> {
        self.setters
            .get(name)
            .ok_or_else(|| EngineError::UnknownPatternSetter {
                field: field.to_string(),
                setter: name.to_string(),
            })
    }

    fn pattern_references_setter(&self, reference: &str) -> bool {
        PATTERN_REFERENCE
            .captures_iter(reference)
            .any(|caps| &caps[1] == self.name)
    }

    fn expand_pattern(&self, field: &str, pattern: &str) -> Result<String> {
        let mut out = String::with_capacity(pattern.len());
        let mut last = 0;
        for caps in PATTERN_REFERENCE.captures_iter(pattern) {
            let Some(whole) = caps.get(0) else { continue };
            let name = &caps[1];
            let setter = self.setter(field, name)?;
            let value = setter.value.as_scalar().ok_or_else(|| EngineError::TypeMismatch {
                name: name.to_string(),
                expected: "a scalar setter in pattern".to_string(),
                actual: "a list setter".to_string(),
            })?;
            out.push_str(&pattern[last..whole.start()]);
            out.push_str(value);
            last = whole.end();
        }
        out.push_str(&pattern[last..]);
        Ok(out)
    }
}

/// The node written for a plain setter reference
fn typed_value(setter: &SetterDefinition, current: Option<&Node>) -> Result<Node> {
    let current = current.map(untagged);
    let mismatch = |expected: &str, actual: &str| EngineError::TypeMismatch {
        name: setter.name.clone(),
        expected: expected.to_string(),
        actual: actual.to_string(),
    };

    match &setter.value {
        SetterValue::List(values) => match current {
            None | Some(Node::Null) | Some(Node::Sequence(_)) => Ok(Node::Sequence(
                values.iter().cloned().map(Node::String).collect(),
            )),
            Some(Node::Mapping(_)) => Err(mismatch("a sequence field", "a mapping")),
            Some(_) => Err(mismatch("a sequence field", "a scalar field")),
        },
        SetterValue::Scalar(_) | SetterValue::Enum { .. } => {
            match current {
                Some(Node::Sequence(_)) => return Err(mismatch("a scalar field", "a sequence")),
                Some(Node::Mapping(_)) => return Err(mismatch("a scalar field", "a mapping")),
                _ => {}
            }
            let value = setter.value.as_scalar().unwrap_or_default();
            Ok(scalar_node(setter.schema_type, value, current))
        }
    }
}

fn scalar_node(schema_type: Option<SetterType>, value: &str, current: Option<&Node>) -> Node {
    let number = || value.trim().parse::<serde_yaml::Number>().ok().map(Node::Number);
    let boolean = || value.parse::<bool>().ok().map(Node::Bool);

    let typed = match (schema_type, current) {
        (Some(SetterType::Integer | SetterType::Number), _) => number(),
        (Some(SetterType::Boolean), _) => boolean(),
        (None, Some(Node::Number(_))) => number(),
        (None, Some(Node::Bool(_))) => boolean(),
        _ => None,
    };
    typed.unwrap_or_else(|| Node::String(value.to_string()))
}

fn untagged(node: &Node) -> &Node {
    match node {
        Node::Tagged(tagged) => untagged(&tagged.value),
        other => other,
    }
}
