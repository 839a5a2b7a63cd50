//! Model constraints — forced and capped request parameters.
//!
//! Some models reject anything but a fixed sampling temperature (OpenAI's
//! reasoning families, Kimi K2.5), and some providers cap the range they
//! accept. The table is static and read-only; [`apply`] is a pure function
//! returning an adjusted copy of the parameters plus a record of every change.

use margin_core::types::ApiParams;

/// A parameter that a constraint can pin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConstrainedParam {
    Temperature,
    MaxTokens,
}

impl ConstrainedParam {
    pub fn name(&self) -> &'static str {
        match self {
            ConstrainedParam::Temperature => "temperature",
            ConstrainedParam::MaxTokens => "max_tokens",
        }
    }
}

/// A per-model exact value.
#[derive(Clone, Debug)]
pub struct ModelConstraint {
    /// Model name or name prefix (lowercase). `"gpt-5"` matches `"gpt-5-mini"`.
    pub pattern: &'static str,
    pub param: ConstrainedParam,
    pub value: f64,
}

/// All constraints for one provider.
#[derive(Clone, Debug)]
pub struct ProviderConstraints {
    pub provider: &'static str,
    /// Largest temperature the provider accepts.
    pub max_temperature: Option<f64>,
    pub models: &'static [ModelConstraint],
}

/// One change made by [`apply`]. Informational; logged by the request builders.
#[derive(Clone, Debug, PartialEq)]
pub struct Adjustment {
    pub param: &'static str,
    pub from: f64,
    pub to: f64,
    pub reason: Option<&'static str>,
}

/// Reason recorded when a temperature is clamped to the provider cap.
pub const PROVIDER_MAX_REASON: &str = "provider max";

const FIXED_TEMPERATURE: f64 = 1.0;

/// Static constraint table.
pub static MODEL_CONSTRAINTS: &[ProviderConstraints] = &[
    ProviderConstraints {
        provider: "openai",
        max_temperature: None,
        models: &[
            ModelConstraint {
                pattern: "gpt-5",
                param: ConstrainedParam::Temperature,
                value: FIXED_TEMPERATURE,
            },
            ModelConstraint {
                pattern: "o1",
                param: ConstrainedParam::Temperature,
                value: FIXED_TEMPERATURE,
            },
            ModelConstraint {
                pattern: "o3",
                param: ConstrainedParam::Temperature,
                value: FIXED_TEMPERATURE,
            },
            ModelConstraint {
                pattern: "o4",
                param: ConstrainedParam::Temperature,
                value: FIXED_TEMPERATURE,
            },
        ],
    },
    ProviderConstraints {
        provider: "anthropic",
        max_temperature: Some(1.0),
        models: &[],
    },
    // Kimi K2.5 requires temperature = 1.0; the API caps at 1.0 for all models.
    ProviderConstraints {
        provider: "kimi",
        max_temperature: Some(1.0),
        models: &[ModelConstraint {
            pattern: "kimi-k2.5",
            param: ConstrainedParam::Temperature,
            value: FIXED_TEMPERATURE,
        }],
    },
    ProviderConstraints {
        provider: "gemini",
        max_temperature: Some(2.0),
        models: &[],
    },
    ProviderConstraints {
        provider: "mistral",
        max_temperature: Some(1.5),
        models: &[],
    },
];

/// Look up the constraints for a provider.
pub fn find_constraints(provider: &str) -> Option<&'static ProviderConstraints> {
    MODEL_CONSTRAINTS.iter().find(|c| c.provider == provider)
}

fn model_matches(model_lower: &str, pattern: &str) -> bool {
    model_lower == pattern || model_lower.starts_with(pattern)
}

/// Apply the constraint table to `params` for `provider`/`model`.
///
/// Exact per-model values run first and only touch parameters the caller
/// supplied; the provider temperature cap runs second on the already-adjusted
/// value. Unknown providers return the parameters unchanged.
pub fn apply(provider: &str, model: &str, params: &ApiParams) -> (ApiParams, Vec<Adjustment>) {
    match find_constraints(provider) {
        Some(constraints) => apply_constraints(constraints, model, params),
        None => (params.clone(), Vec::new()),
    }
}

/// Apply one provider's constraints, whether from the static table or not.
pub fn apply_constraints(
    constraints: &ProviderConstraints,
    model: &str,
    params: &ApiParams,
) -> (ApiParams, Vec<Adjustment>) {
    let mut adjusted = params.clone();
    let mut adjustments = Vec::new();

    let model_lower = model.to_lowercase();
    for constraint in constraints
        .models
        .iter()
        .filter(|c| model_matches(&model_lower, c.pattern))
    {
        match constraint.param {
            ConstrainedParam::Temperature => {
                if let Some(current) = adjusted.temperature {
                    if current != constraint.value {
                        adjusted.temperature = Some(constraint.value);
                        adjustments.push(Adjustment {
                            param: constraint.param.name(),
                            from: current,
                            to: constraint.value,
                            reason: None,
                        });
                    }
                }
            }
            ConstrainedParam::MaxTokens => {
                let required = constraint.value as u32;
                if let Some(current) = adjusted.max_tokens {
                    if current != required {
                        adjusted.max_tokens = Some(required);
                        adjustments.push(Adjustment {
                            param: constraint.param.name(),
                            from: f64::from(current),
                            to: f64::from(required),
                            reason: None,
                        });
                    }
                }
            }
        }
    }

    if let (Some(max), Some(current)) = (constraints.max_temperature, adjusted.temperature) {
        if current > max {
            adjusted.temperature = Some(max);
            adjustments.push(Adjustment {
                param: ConstrainedParam::Temperature.name(),
                from: current,
                to: max,
                reason: Some(PROVIDER_MAX_REASON),
            });
        }
    }

    (adjusted, adjustments)
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
