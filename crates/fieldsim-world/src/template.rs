//! Prebuilt force-field recipes
//!
//! A template fixes a field's condition and expression and binds a few named
//! parameters into its scope. Parameters are either auxiliary variables the
//! template creates (and owns) or existing variables of the owning object.

use fieldsim_core::{Identifier, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ForceFieldKind;

/// Which recipe a force field follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    /// Hand-written condition and expression
    #[default]
    Custom,
    /// Uniform field `mass * g * direction / norm(direction)`
    Gravity,
    /// Newtonian attraction towards the owner
    UniversalGravitation,
    /// Cancels approaching velocity of a body overlapping the owner
    VelocityNeutralize,
    /// Cancels approaching acceleration of a body overlapping the owner
    AccelerationNeutralize,
}

/// Where a template parameter takes its value from
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamSource {
    /// New variable owned by the template, with this initial value
    Auxiliary(Value),
    OwnerMass,
    OwnerPosition,
    OwnerVelocity,
    OwnerRadius,
}

impl ParamSource {
    pub fn is_auxiliary(&self) -> bool {
        matches!(self, ParamSource::Auxiliary(_))
    }

    pub fn needs_owner(&self) -> bool {
        !self.is_auxiliary()
    }
}

const OVERLAP: &str = "type == 2 and norm(pos - center) > 0 and norm(pos - center) < R + TARGET_r";

impl TemplateKind {
    /// Parameters bound into the field scope, in declaration order
    pub fn params(self) -> &'static [(&'static str, ParamSource)] {
        match self {
            TemplateKind::Custom => &[],
            TemplateKind::Gravity => &[
                ("g", ParamSource::Auxiliary(Value::Scalar(9.81))),
                ("direction", ParamSource::Auxiliary(Value::Vector([0.0, -1.0]))),
            ],
            TemplateKind::UniversalGravitation => &[
                ("G", ParamSource::Auxiliary(Value::Scalar(6.6743e-11))),
                ("M", ParamSource::OwnerMass),
                ("center", ParamSource::OwnerPosition),
            ],
            TemplateKind::VelocityNeutralize | TemplateKind::AccelerationNeutralize => &[
                ("center", ParamSource::OwnerPosition),
                ("u", ParamSource::OwnerVelocity),
                ("R", ParamSource::OwnerRadius),
            ],
        }
    }

    /// Whether the template binds variables of an owning object
    pub fn needs_owner(self) -> bool {
        self.params().iter().any(|(_, source)| source.needs_owner())
    }

    /// Kind of field the template produces, `None` for Custom
    pub fn field_kind(self) -> Option<ForceFieldKind> {
        match self {
            TemplateKind::Custom => None,
            TemplateKind::AccelerationNeutralize => Some(ForceFieldKind::Derived),
            _ => Some(ForceFieldKind::Immediate),
        }
    }

    pub fn default_name(self) -> &'static str {
        match self {
            TemplateKind::Custom => "Force Field",
            TemplateKind::Gravity => "Gravity",
            TemplateKind::UniversalGravitation => "Universal Gravitation",
            TemplateKind::VelocityNeutralize => "Contact Velocity",
            TemplateKind::AccelerationNeutralize => "Contact Acceleration",
        }
    }

    /// Condition source, `None` for Custom
    pub fn condition(self) -> Option<String> {
        let source = match self {
            TemplateKind::Custom => return None,
            TemplateKind::Gravity => "true".to_string(),
            TemplateKind::UniversalGravitation => "norm(pos - center) > 0".to_string(),
            TemplateKind::VelocityNeutralize => format!("{OVERLAP} and dot(v - u, pos - center) < 0"),
            TemplateKind::AccelerationNeutralize => format!("{OVERLAP} and dot(a, pos - center) < 0"),
        };
        Some(source)
    }

    /// Expression source, `None` for Custom
    pub fn expression(self) -> Option<&'static str> {
        match self {
            TemplateKind::Custom => None,
            TemplateKind::Gravity => Some("mass * g * direction / norm(direction)"),
            TemplateKind::UniversalGravitation => {
                Some("G * mass * M / norm(center - pos)^2 * unit(center - pos)")
            }
            TemplateKind::VelocityNeutralize => {
                Some("-mass * dot(v - u, unit(pos - center)) * unit(pos - center) / dt")
            }
            TemplateKind::AccelerationNeutralize => {
                Some("-mass * dot(a, unit(pos - center)) * unit(pos - center)")
            }
        }
    }
}

/// Template choice of one field together with its bound parameters
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Template {
    pub kind: TemplateKind,
    /// Parameter name to the variable bound under it
    #[serde(default)]
    pub params: IndexMap<String, Identifier>,
}

impl Template {
    pub fn custom() -> Self {
        Self::default()
    }

    /// Variables created by the template and removed with it
    pub fn auxiliary_vars(&self) -> impl Iterator<Item = &Identifier> + '_ {
        self.kind
            .params()
            .iter()
            .filter(|(_, source)| source.is_auxiliary())
            .filter_map(|(name, _)| self.params.get(*name))
    }

    /// Whether `id` is bound as one of this template's parameters
    pub fn binds(&self, id: &Identifier) -> bool {
        self.params.values().any(|p| p == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsim_core::compile;

    const ALL: [TemplateKind; 5] = [
        TemplateKind::Custom,
        TemplateKind::Gravity,
        TemplateKind::UniversalGravitation,
        TemplateKind::VelocityNeutralize,
        TemplateKind::AccelerationNeutralize,
    ];

    #[test]
    fn test_template_sources_compile() {
        for kind in ALL {
            if let Some(cond) = kind.condition() {
                compile(&cond).unwrap();
            }
            if let Some(expr) = kind.expression() {
                compile(expr).unwrap();
            }
        }
    }

    #[test]
    fn test_templates_only_read_their_params() {
        for kind in ALL {
            let Some(expr) = kind.expression() else { continue };
            let deps = compile(expr).unwrap().dependencies().clone();
            for dep in deps {
                assert!(
                    kind.params().iter().any(|(name, _)| *name == dep),
                    "{kind:?} reads unbound {dep}"
                );
            }
        }
    }

    #[test]
    fn test_owner_requirements() {
        assert!(!TemplateKind::Gravity.needs_owner());
        assert!(TemplateKind::UniversalGravitation.needs_owner());
        assert_eq!(
            TemplateKind::AccelerationNeutralize.field_kind(),
            Some(ForceFieldKind::Derived)
        );
        assert_eq!(TemplateKind::Custom.field_kind(), None);
    }

    #[test]
    fn test_auxiliary_vars() {
        let mut template = Template {
            kind: TemplateKind::UniversalGravitation,
            params: IndexMap::new(),
        };
        template.params.insert("G".into(), "VAR_G".into());
        template.params.insert("M".into(), "VAR_M".into());
        template.params.insert("center".into(), "VAR_P".into());

        let aux: Vec<_> = template.auxiliary_vars().collect();
        assert_eq!(aux, vec![&Identifier::from("VAR_G")]);
        assert!(template.binds(&"VAR_M".into()));
    }
}
